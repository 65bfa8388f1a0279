//! In-memory backend for all three external services.
//!
//! [`MemoryBackend`] holds a [`Snapshot`] of entities and groups behind a
//! mutex and implements [`EntityStore`], [`GroupMembership`] and
//! [`SearchEngine`] over it. Queries are evaluated directly against the
//! records, so both halves of a handshake become observable the moment they
//! are written. The CLI loads and saves snapshots as JSON.

use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, PoisonError};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::BoxFuture;
use crate::entity::{Entity, EntityType, Group, Memberships};
use crate::query::{Field, RelationshipQuery, TargetKind};
use crate::services::{EntityStore, GroupMembership, SearchEngine, SearchResponse, ServiceError};

/// Errors reading or writing a snapshot file.
#[derive(Debug, thiserror::Error)]
pub enum SnapshotError {
    #[error("failed to access snapshot {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid snapshot {path}: {source}")]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

/// A group and the items shared into it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupRecord {
    pub id: String,
    #[serde(default)]
    pub tags: Vec<String>,
    /// Owner of the group; items with the same owner list it under `admin`.
    #[serde(default)]
    pub owner: String,
    #[serde(default)]
    pub items: Vec<String>,
}

impl GroupRecord {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            tags: Vec::new(),
            owner: String::new(),
            items: Vec::new(),
        }
    }

    pub fn with_tag(mut self, tag: impl Into<String>) -> Self {
        self.tags.push(tag.into());
        self
    }

    pub fn with_owner(mut self, owner: impl Into<String>) -> Self {
        self.owner = owner.into();
        self
    }

    pub fn with_item(mut self, item_id: impl Into<String>) -> Self {
        self.items.push(item_id.into());
        self
    }

    fn as_group(&self) -> Group {
        Group {
            id: self.id.clone(),
            tags: self.tags.clone(),
        }
    }
}

/// The full state of the in-memory model.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Snapshot {
    #[serde(default)]
    pub entities: Vec<Entity>,
    #[serde(default)]
    pub groups: Vec<GroupRecord>,
}

impl Snapshot {
    /// Read a snapshot from a JSON file.
    pub async fn load(path: &Path) -> Result<Self, SnapshotError> {
        let content = tokio::fs::read_to_string(path)
            .await
            .map_err(|source| SnapshotError::Io {
                path: path.to_path_buf(),
                source,
            })?;
        serde_json::from_str(&content).map_err(|source| SnapshotError::Json {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Write the snapshot as pretty-printed JSON.
    pub async fn save(&self, path: &Path) -> Result<(), SnapshotError> {
        let content = serde_json::to_string_pretty(self).map_err(|source| SnapshotError::Json {
            path: path.to_path_buf(),
            source,
        })?;
        tokio::fs::write(path, content)
            .await
            .map_err(|source| SnapshotError::Io {
                path: path.to_path_buf(),
                source,
            })
    }

    pub fn entity(&self, entity_type: EntityType, id: &str) -> Option<&Entity> {
        self.entities
            .iter()
            .find(|e| e.entity_type == entity_type && e.id == id)
    }

    fn group_mut(&mut self, group_id: &str) -> Result<&mut GroupRecord, ServiceError> {
        self.groups
            .iter_mut()
            .find(|g| g.id == group_id)
            .ok_or_else(|| ServiceError::NotFound(format!("group '{group_id}'")))
    }

    /// Values `entity` carries for `field`, as seen by query evaluation.
    fn values_of(&self, entity: &Entity, field: Field) -> Vec<String> {
        match field {
            Field::Type => vec![entity.entity_type.as_str().to_string()],
            Field::Keyword => entity.tags.clone(),
            Field::Id => vec![entity.id.clone()],
            Field::Group => self
                .groups
                .iter()
                .filter(|g| g.items.contains(&entity.id))
                .map(|g| g.id.clone())
                .collect(),
        }
    }

    /// Evaluate `query` against every entity.
    pub fn search(&self, query: &RelationshipQuery) -> SearchResponse {
        if query.target != TargetKind::Item {
            return SearchResponse::default();
        }
        let results: Vec<Entity> = self
            .entities
            .iter()
            .filter(|e| query.matches(|field| self.values_of(e, field)))
            .cloned()
            .collect();
        SearchResponse {
            total: results.len() as u64,
            results,
        }
    }
}

/// Shared in-memory implementation of the external services.
#[derive(Debug, Default)]
pub struct MemoryBackend {
    state: Mutex<Snapshot>,
}

impl MemoryBackend {
    pub fn new(snapshot: Snapshot) -> Self {
        Self {
            state: Mutex::new(snapshot),
        }
    }

    /// A copy of the current state.
    pub fn snapshot(&self) -> Snapshot {
        self.state().clone()
    }

    /// Insert or replace an entity.
    pub fn insert_entity(&self, entity: Entity) {
        upsert(&mut self.state(), entity);
    }

    /// Insert or replace a group.
    pub fn insert_group(&self, group: GroupRecord) {
        let mut state = self.state();
        state.groups.retain(|g| g.id != group.id);
        state.groups.push(group);
    }

    /// Current record for an entity.
    pub fn entity(&self, entity_type: EntityType, id: &str) -> Option<Entity> {
        self.state().entity(entity_type, id).cloned()
    }

    fn state(&self) -> MutexGuard<'_, Snapshot> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

fn upsert(state: &mut Snapshot, entity: Entity) {
    match state
        .entities
        .iter_mut()
        .find(|e| e.entity_type == entity.entity_type && e.id == entity.id)
    {
        Some(existing) => *existing = entity,
        None => state.entities.push(entity),
    }
}

impl EntityStore for MemoryBackend {
    fn fetch(
        &self,
        entity_type: EntityType,
        id: &str,
    ) -> BoxFuture<'_, Result<Entity, ServiceError>> {
        let id = id.to_string();
        Box::pin(async move {
            self.state()
                .entity(entity_type, &id)
                .cloned()
                .ok_or_else(|| ServiceError::NotFound(format!("{entity_type} '{id}'")))
        })
    }

    fn persist(
        &self,
        _entity_type: EntityType,
        entity: &Entity,
    ) -> BoxFuture<'_, Result<(), ServiceError>> {
        let entity = entity.clone();
        Box::pin(async move {
            debug!(entity_id = %entity.id, tags = entity.tags.len(), "Persisting entity");
            upsert(&mut self.state(), entity);
            Ok(())
        })
    }
}

impl GroupMembership for MemoryBackend {
    fn add_member(
        &self,
        item_id: &str,
        group_id: &str,
        _owner_hint: &str,
    ) -> BoxFuture<'_, Result<(), ServiceError>> {
        let item_id = item_id.to_string();
        let group_id = group_id.to_string();
        Box::pin(async move {
            let mut state = self.state();
            if !state.entities.iter().any(|e| e.id == item_id) {
                return Err(ServiceError::NotFound(format!("item '{item_id}'")));
            }
            let group = state.group_mut(&group_id)?;
            if !group.items.contains(&item_id) {
                group.items.push(item_id);
            }
            Ok(())
        })
    }

    fn remove_member(&self, item_id: &str, group_id: &str)
    -> BoxFuture<'_, Result<(), ServiceError>> {
        let item_id = item_id.to_string();
        let group_id = group_id.to_string();
        Box::pin(async move {
            let mut state = self.state();
            state.group_mut(&group_id)?.items.retain(|i| *i != item_id);
            Ok(())
        })
    }

    fn list_memberships(&self, item_id: &str) -> BoxFuture<'_, Result<Memberships, ServiceError>> {
        let item_id = item_id.to_string();
        Box::pin(async move {
            let state = self.state();
            let owner = state
                .entities
                .iter()
                .find(|e| e.id == item_id)
                .map(|e| e.owner.clone())
                .unwrap_or_default();

            let mut memberships = Memberships::default();
            for group in state.groups.iter().filter(|g| g.items.contains(&item_id)) {
                if !owner.is_empty() && group.owner == owner {
                    memberships.admin.push(group.as_group());
                } else {
                    memberships.member.push(group.as_group());
                }
            }
            Ok(memberships)
        })
    }
}

impl SearchEngine for MemoryBackend {
    fn execute(&self, query: &RelationshipQuery)
    -> BoxFuture<'_, Result<SearchResponse, ServiceError>> {
        let query = query.clone();
        Box::pin(async move { Ok(self.state().search(&query)) })
    }
}
