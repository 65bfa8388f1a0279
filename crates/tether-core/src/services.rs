//! Boundary traits for the external collaborators.
//!
//! The association engine never owns persistence, group storage, or search.
//! It talks to them through these three traits, which return [`BoxFuture`]s
//! so they can be held as `Arc<dyn Trait>` inside a [`ServiceContext`].
//! Retries, timeouts, and transport concerns belong to the implementations.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::BoxFuture;
use crate::entity::{Entity, EntityType, Memberships};
use crate::query::RelationshipQuery;

/// Failure reported by an external service.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ServiceError {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("request rejected: {0}")]
    Rejected(String),

    #[error("service unavailable: {0}")]
    Unavailable(String),
}

/// Reads and writes entity records.
pub trait EntityStore: Send + Sync {
    /// Fetch the record `id` of the given type.
    fn fetch(
        &self,
        entity_type: EntityType,
        id: &str,
    ) -> BoxFuture<'_, Result<Entity, ServiceError>>;

    /// Persist the record, replacing whatever the store holds for its id.
    fn persist(
        &self,
        entity_type: EntityType,
        entity: &Entity,
    ) -> BoxFuture<'_, Result<(), ServiceError>>;
}

/// Mutates and reads group membership.
pub trait GroupMembership: Send + Sync {
    /// Share `item_id` into `group_id`. `owner_hint` is the item's owner.
    fn add_member(
        &self,
        item_id: &str,
        group_id: &str,
        owner_hint: &str,
    ) -> BoxFuture<'_, Result<(), ServiceError>>;

    /// Unshare `item_id` from `group_id`.
    fn remove_member(&self, item_id: &str, group_id: &str)
    -> BoxFuture<'_, Result<(), ServiceError>>;

    /// Every group `item_id` currently belongs to.
    fn list_memberships(&self, item_id: &str) -> BoxFuture<'_, Result<Memberships, ServiceError>>;
}

/// Result page returned by the search engine.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchResponse {
    /// Total number of matches (not just those in `results`).
    pub total: u64,
    #[serde(default)]
    pub results: Vec<Entity>,
}

/// Executes relationship queries.
pub trait SearchEngine: Send + Sync {
    fn execute(&self, query: &RelationshipQuery)
    -> BoxFuture<'_, Result<SearchResponse, ServiceError>>;
}

/// The external collaborators one association call runs against.
#[derive(Clone)]
pub struct ServiceContext {
    pub entities: Arc<dyn EntityStore>,
    pub groups: Arc<dyn GroupMembership>,
    pub search: Arc<dyn SearchEngine>,
}

impl ServiceContext {
    pub fn new(
        entities: Arc<dyn EntityStore>,
        groups: Arc<dyn GroupMembership>,
        search: Arc<dyn SearchEngine>,
    ) -> Self {
        Self {
            entities,
            groups,
            search,
        }
    }

    /// Use one backend for all three services.
    pub fn from_backend<B>(backend: Arc<B>) -> Self
    where
        B: EntityStore + GroupMembership + SearchEngine + 'static,
    {
        Self {
            entities: backend.clone(),
            groups: backend.clone(),
            search: backend,
        }
    }
}

impl std::fmt::Debug for ServiceContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServiceContext").finish_non_exhaustive()
    }
}
