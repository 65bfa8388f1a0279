//! Entity, group, and association reference types.
//!
//! Only the subset of a platform record that the association engine reads or
//! mutates is modelled here. Persistence of these records belongs to the
//! external [`EntityStore`](crate::services::EntityStore).

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::AssociationError;
use crate::query::{Field, Filter, Predicate, RelationshipQuery, TargetKind};

/// Closed set of platform record kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntityType {
    Initiative,
    Project,
    Site,
    Page,
    Discussion,
    Content,
    Template,
}

impl EntityType {
    /// Every known entity type.
    pub const ALL: [EntityType; 7] = [
        EntityType::Initiative,
        EntityType::Project,
        EntityType::Site,
        EntityType::Page,
        EntityType::Discussion,
        EntityType::Content,
        EntityType::Template,
    ];

    /// Canonical lowercase name, as used in tags and configuration.
    pub fn as_str(&self) -> &'static str {
        match self {
            EntityType::Initiative => "initiative",
            EntityType::Project => "project",
            EntityType::Site => "site",
            EntityType::Page => "page",
            EntityType::Discussion => "discussion",
            EntityType::Content => "content",
            EntityType::Template => "template",
        }
    }

    /// The search target that records of this type are stored as.
    pub fn target_kind(&self) -> TargetKind {
        // Every participating platform record is item-backed.
        TargetKind::Item
    }
}

impl fmt::Display for EntityType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EntityType {
    type Err = AssociationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        EntityType::ALL
            .into_iter()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| AssociationError::Configuration {
                entity_type: s.to_string(),
            })
    }
}

/// A `{type, id}` pair naming one side of an association.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AssociationRef {
    #[serde(rename = "type")]
    pub entity_type: EntityType,
    pub id: String,
}

impl AssociationRef {
    pub fn new(entity_type: EntityType, id: impl Into<String>) -> Self {
        Self {
            entity_type,
            id: id.into(),
        }
    }
}

impl fmt::Display for AssociationRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} '{}'", self.entity_type, self.id)
    }
}

/// Association settings carried by a provisioned parent entity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssociationConfig {
    /// The group whose members are the children this parent has included.
    pub group_id: String,
    /// Query describing the parent's inclusion scope.
    pub inclusion_query: RelationshipQuery,
    pub schema_version: u32,
}

impl AssociationConfig {
    /// Current provisioning schema.
    pub const SCHEMA_VERSION: u32 = 1;

    /// Standard provisioning: inclusion scope is membership in `group_id`.
    pub fn for_group(group_id: impl Into<String>) -> Self {
        let group_id = group_id.into();
        let inclusion_query = RelationshipQuery::new(TargetKind::Item)
            .with_filter(Filter::and(vec![Predicate::any(Field::Group, [group_id.clone()])]));
        Self {
            group_id,
            inclusion_query,
            schema_version: Self::SCHEMA_VERSION,
        }
    }
}

/// A platform record as seen by the association engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Entity {
    pub id: String,

    #[serde(rename = "type")]
    pub entity_type: EntityType,

    /// Username owning the record.
    #[serde(default)]
    pub owner: String,

    /// Free-text tags. Order is preserved; duplicates are never written.
    #[serde(default)]
    pub tags: Vec<String>,

    /// Present only once the entity has been provisioned as a parent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub association: Option<AssociationConfig>,
}

impl Entity {
    pub fn new(entity_type: EntityType, id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            entity_type,
            owner: String::new(),
            tags: Vec::new(),
            association: None,
        }
    }

    /// Builder: set the owner.
    pub fn with_owner(mut self, owner: impl Into<String>) -> Self {
        self.owner = owner.into();
        self
    }

    /// Builder: replace the tag list.
    pub fn with_tags<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tags = tags.into_iter().map(Into::into).collect();
        self
    }

    /// Builder: provision an association group.
    pub fn with_association(mut self, config: AssociationConfig) -> Self {
        self.association = Some(config);
        self
    }

    /// This entity as an association reference.
    pub fn to_ref(&self) -> AssociationRef {
        AssociationRef::new(self.entity_type, self.id.clone())
    }
}

/// A group record (read-only here).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Group {
    pub id: String,
    #[serde(default)]
    pub tags: Vec<String>,
}

impl Group {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            tags: Vec::new(),
        }
    }

    /// Builder: add a tag.
    pub fn with_tag(mut self, tag: impl Into<String>) -> Self {
        self.tags.push(tag.into());
        self
    }
}

/// The groups an item currently belongs to, bucketed by the caller's role.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Memberships {
    #[serde(default)]
    pub admin: Vec<Group>,
    #[serde(default)]
    pub member: Vec<Group>,
    #[serde(default)]
    pub other: Vec<Group>,
}

impl Memberships {
    /// Iterate over every group regardless of bucket.
    pub fn iter(&self) -> impl Iterator<Item = &Group> {
        self.admin
            .iter()
            .chain(self.member.iter())
            .chain(self.other.iter())
    }

    pub fn is_empty(&self) -> bool {
        self.admin.is_empty() && self.member.is_empty() && self.other.is_empty()
    }
}
