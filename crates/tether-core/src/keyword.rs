//! Association tag codec.
//!
//! Two grammars coexist in a record's tag list:
//!
//! - **identify**: `<type>|<id>`, written by [`add_association_tag`] and carried
//!   by a parent's association group to mark which parent it belongs to;
//! - **reference**: `ref|<type>|<id>`, the child's claim on a parent, written
//!   by the handshake protocol.
//!
//! Both decode through [`AssociationTag::parse`]. Neither grammar is treated
//! as a rewrite of the other; existing tags of either form keep parsing.

use std::fmt;

use tether_config::{LimitPolicy, TagsConfig};
use tracing::warn;

use crate::entity::{AssociationRef, Entity, EntityType};
use crate::error::AssociationError;

/// Leading segment of a reference tag.
pub const REFERENCE_PREFIX: &str = "ref";

/// Segment separator shared by both grammars.
pub const SEPARATOR: char = '|';

/// Advisory ceiling on reference tags of one association type per record.
pub const REFERENCE_SOFT_LIMIT: usize = 50;

/// Hard cap on total tags the platform stores per record.
pub const PLATFORM_TAG_CAP: usize = 128;

const _: () = assert!(REFERENCE_SOFT_LIMIT < PLATFORM_TAG_CAP);

/// Which grammar a tag uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TagKind {
    Identify,
    Reference,
}

/// A decoded association tag.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct AssociationTag {
    pub kind: TagKind,
    pub entity_type: EntityType,
    pub id: String,
}

impl AssociationTag {
    pub fn identify(entity_type: EntityType, id: impl Into<String>) -> Self {
        Self {
            kind: TagKind::Identify,
            entity_type,
            id: id.into(),
        }
    }

    pub fn reference(entity_type: EntityType, id: impl Into<String>) -> Self {
        Self {
            kind: TagKind::Reference,
            entity_type,
            id: id.into(),
        }
    }

    /// Decode either grammar. Anything else (including unknown entity types
    /// and empty ids) is not an association tag.
    pub fn parse(tag: &str) -> Option<Self> {
        let segments: Vec<&str> = tag.split(SEPARATOR).collect();
        let (kind, type_name, id) = match segments.as_slice() {
            [REFERENCE_PREFIX, type_name, id] => (TagKind::Reference, *type_name, *id),
            [type_name, id] => (TagKind::Identify, *type_name, *id),
            _ => return None,
        };
        if id.is_empty() {
            return None;
        }
        let entity_type = type_name.parse().ok()?;
        Some(Self {
            kind,
            entity_type,
            id: id.to_string(),
        })
    }

    /// The `{type, id}` this tag names.
    pub fn target(&self) -> AssociationRef {
        AssociationRef::new(self.entity_type, self.id.clone())
    }
}

impl fmt::Display for AssociationTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.kind {
            TagKind::Identify => write!(f, "{}{SEPARATOR}{}", self.entity_type, self.id),
            TagKind::Reference => write!(
                f,
                "{REFERENCE_PREFIX}{SEPARATOR}{}{SEPARATOR}{}",
                self.entity_type, self.id
            ),
        }
    }
}

pub fn encode_identify(entity_type: EntityType, id: &str) -> String {
    AssociationTag::identify(entity_type, id).to_string()
}

pub fn encode_reference(entity_type: EntityType, id: &str) -> String {
    AssociationTag::reference(entity_type, id).to_string()
}

pub fn parse_reference(tag: &str) -> Option<AssociationRef> {
    AssociationTag::parse(tag)
        .filter(|t| t.kind == TagKind::Reference)
        .map(|t| t.target())
}

pub fn parse_identify(tag: &str) -> Option<AssociationRef> {
    AssociationTag::parse(tag)
        .filter(|t| t.kind == TagKind::Identify)
        .map(|t| t.target())
}

/// Ids claimed by reference tags, optionally restricted to one type.
/// Order of first appearance is kept; repeats are dropped.
pub fn extract_ids(tags: &[String], entity_type: Option<EntityType>) -> Vec<String> {
    let mut ids: Vec<String> = Vec::new();
    for target in tags.iter().filter_map(|t| parse_reference(t)) {
        if entity_type.is_some_and(|ty| ty != target.entity_type) {
            continue;
        }
        if !ids.contains(&target.id) {
            ids.push(target.id);
        }
    }
    ids
}

/// Number of reference tags of `entity_type`.
pub fn count_references(tags: &[String], entity_type: EntityType) -> usize {
    tags.iter()
        .filter_map(|t| parse_reference(t))
        .filter(|r| r.entity_type == entity_type)
        .count()
}

/// Append a reference tag unless already present.
pub fn add(tags: &[String], entity_type: EntityType, id: &str) -> Vec<String> {
    let tag = encode_reference(entity_type, id);
    let mut out = tags.to_vec();
    if !out.contains(&tag) {
        out.push(tag);
    }
    out
}

/// Drop a reference tag; a no-op when absent.
pub fn remove(tags: &[String], entity_type: EntityType, id: &str) -> Vec<String> {
    let tag = encode_reference(entity_type, id);
    tags.iter().filter(|t| **t != tag).cloned().collect()
}

/// Limits applied when a reference tag is added through the protocol.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TagLimits {
    pub reference_limit: usize,
    pub platform_cap: usize,
    pub policy: LimitPolicy,
}

impl Default for TagLimits {
    fn default() -> Self {
        Self {
            reference_limit: REFERENCE_SOFT_LIMIT,
            platform_cap: PLATFORM_TAG_CAP,
            policy: LimitPolicy::Warn,
        }
    }
}

impl From<&TagsConfig> for TagLimits {
    fn from(config: &TagsConfig) -> Self {
        Self {
            reference_limit: config.reference_limit,
            platform_cap: config.platform_cap,
            policy: config.on_limit,
        }
    }
}

/// Add a reference tag to `entity`, enforcing `limits`.
///
/// Returns whether the tag list changed. Re-adding an existing tag is always
/// accepted. Going past the platform cap is always refused; going past the
/// soft limit follows `limits.policy`.
pub fn add_reference_checked(
    entity: &mut Entity,
    target: &AssociationRef,
    limits: &TagLimits,
) -> Result<bool, AssociationError> {
    let tag = encode_reference(target.entity_type, &target.id);
    if entity.tags.contains(&tag) {
        return Ok(false);
    }

    if entity.tags.len() >= limits.platform_cap {
        return Err(AssociationError::TagLimitExceeded {
            entity_type: entity.entity_type,
            id: entity.id.clone(),
            association: target.entity_type,
            count: entity.tags.len(),
            limit: limits.platform_cap,
        });
    }

    let count = count_references(&entity.tags, target.entity_type);
    if count >= limits.reference_limit {
        match limits.policy {
            LimitPolicy::Reject => {
                return Err(AssociationError::TagLimitExceeded {
                    entity_type: entity.entity_type,
                    id: entity.id.clone(),
                    association: target.entity_type,
                    count,
                    limit: limits.reference_limit,
                });
            }
            LimitPolicy::Warn => warn!(
                entity_type = %entity.entity_type,
                entity_id = %entity.id,
                association = %target.entity_type,
                count,
                limit = limits.reference_limit,
                "Reference tag soft limit exceeded"
            ),
        }
    }

    entity.tags.push(tag);
    Ok(true)
}

/// Identify-grammar associations of `entity_type`, in tag order.
pub fn list_associations(entity: &Entity, entity_type: EntityType) -> Vec<AssociationRef> {
    entity
        .tags
        .iter()
        .filter_map(|t| parse_identify(t))
        .filter(|r| r.entity_type == entity_type)
        .collect()
}

/// Add an identify tag in place. The caller persists.
pub fn add_association_tag(entity: &mut Entity, association: &AssociationRef) {
    let tag = encode_identify(association.entity_type, &association.id);
    if !entity.tags.contains(&tag) {
        entity.tags.push(tag);
    }
}

/// Remove an identify tag in place. The caller persists.
pub fn remove_association_tag(entity: &mut Entity, association: &AssociationRef) {
    let tag = encode_identify(association.entity_type, &association.id);
    entity.tags.retain(|t| *t != tag);
}
