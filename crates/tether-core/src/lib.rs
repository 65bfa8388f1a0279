#![deny(unsafe_code)]

//! Tether association engine.
//!
//! Manages two-sided parent/child associations between platform records.
//! A parent includes a child by sharing it into the parent's association
//! group; a child claims a parent by carrying a reference tag. The
//! relationship reads as associated only once both halves are present.
//!
//! Persistence, group storage and search are external; the engine reaches
//! them through the traits in [`services`].

use std::future::Future;
use std::pin::Pin;

/// A boxed `Send` future, the return type of the `dyn`-safe service traits.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// The [`Associations`] facade and its pure tag operations.
pub mod engine;
/// Entity records, association references and groups.
pub mod entity;
/// Association error taxonomy.
pub mod error;
/// Static parent/child hierarchy table.
pub mod hierarchy;
/// Identify and reference tag codec.
pub mod keyword;
/// In-memory implementation of the external services.
pub mod memory;
/// Request / accept / break handshake.
pub mod protocol;
/// Relationship queries and the per-perspective view builders.
pub mod query;
/// Boundary traits for the entity store, group membership and search.
pub mod services;
/// Relationship counts.
pub mod stats;

pub use engine::Associations;
pub use entity::{AssociationConfig, AssociationRef, Entity, EntityType, Group, Memberships};
pub use error::AssociationError;
pub use hierarchy::{AssociationHierarchy, HierarchyRegistry, Perspective};
pub use keyword::{AssociationTag, TagKind, TagLimits};
pub use memory::{GroupRecord, MemoryBackend, Snapshot, SnapshotError};
pub use query::{RelationshipQuery, RelationshipView};
pub use services::{
    EntityStore, GroupMembership, SearchEngine, SearchResponse, ServiceContext, ServiceError,
};
pub use stats::{AssociationStats, OwnHalf};
