//! Entity, group, and snapshot fixtures.

use std::path::PathBuf;

use tempfile::TempDir;
use tether_core::keyword;
use tether_core::{
    AssociationConfig, Entity, EntityType, Group, GroupRecord, MemoryBackend, Snapshot,
};

/// A provisioned initiative owning association group `group_id`.
pub fn initiative(id: &str, group_id: &str) -> Entity {
    Entity::new(EntityType::Initiative, id)
        .with_owner("alice")
        .with_association(AssociationConfig::for_group(group_id))
}

/// An initiative that has not been provisioned as a parent yet.
pub fn unprovisioned_initiative(id: &str) -> Entity {
    Entity::new(EntityType::Initiative, id).with_owner("alice")
}

pub fn project(id: &str) -> Entity {
    Entity::new(EntityType::Project, id).with_owner("bob")
}

/// The association group of `parent`, tagged with the parent's identify tag.
pub fn association_group(parent: &Entity, group_id: &str) -> Group {
    Group::new(group_id).with_tag(keyword::encode_identify(parent.entity_type, &parent.id))
}

/// A memory backend seeded with initiative `I1` (group `G1`) and projects
/// `P1`, `P2` and `P3`, with no association halves written.
pub fn seeded_backend() -> MemoryBackend {
    let backend = MemoryBackend::default();
    let parent = initiative("I1", "G1");
    backend.insert_group(
        GroupRecord::new("G1")
            .with_owner("alice")
            .with_tag(keyword::encode_identify(parent.entity_type, &parent.id)),
    );
    backend.insert_entity(parent);
    for id in ["P1", "P2", "P3"] {
        backend.insert_entity(project(id));
    }
    backend
}

/// A snapshot written to a temporary file.
///
/// The directory is removed when this value is dropped.
pub struct TempSnapshot {
    pub path: PathBuf,
    _temp_dir: TempDir,
}

impl TempSnapshot {
    pub async fn write(snapshot: &Snapshot) -> Self {
        let temp_dir = TempDir::new().expect("failed to create temp dir");
        let path = temp_dir.path().join("snapshot.json");
        snapshot.save(&path).await.expect("failed to write snapshot");
        Self {
            path,
            _temp_dir: temp_dir,
        }
    }

    pub async fn read(&self) -> Snapshot {
        Snapshot::load(&self.path).await.expect("failed to read snapshot")
    }
}
