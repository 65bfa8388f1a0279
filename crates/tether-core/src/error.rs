//! Error taxonomy for association operations.

use crate::entity::EntityType;
use crate::query::TargetKind;
use crate::services::ServiceError;

/// Errors raised by hierarchy checks, query construction, and the
/// request/accept/break protocol.
///
/// Every variant names the entity types, ids, or group ids involved so the
/// rendered message alone identifies what failed.
#[derive(Debug, thiserror::Error)]
pub enum AssociationError {
    /// The entity type is unknown or has no registered hierarchy.
    #[error("entity type '{entity_type}' has no registered association hierarchy")]
    Configuration { entity_type: String },

    #[error("association between '{from}' and '{to}' is not supported")]
    UnsupportedAssociation { from: EntityType, to: EntityType },

    #[error("{entity_type} '{id}' has no association group provisioned")]
    NotProvisioned { entity_type: EntityType, id: String },

    #[error("failed to add '{item_id}' to association group '{group_id}': {source}")]
    Share {
        item_id: String,
        group_id: String,
        #[source]
        source: ServiceError,
    },

    #[error("failed to remove '{item_id}' from association group '{group_id}': {source}")]
    Unshare {
        item_id: String,
        group_id: String,
        #[source]
        source: ServiceError,
    },

    #[error("failed to fetch {entity_type} '{id}': {source}")]
    Fetch {
        entity_type: EntityType,
        id: String,
        #[source]
        source: ServiceError,
    },

    #[error("failed to persist {entity_type} '{id}': {source}")]
    Persist {
        entity_type: EntityType,
        id: String,
        #[source]
        source: ServiceError,
    },

    #[error("failed to list group memberships of '{id}': {source}")]
    Memberships {
        id: String,
        #[source]
        source: ServiceError,
    },

    #[error("cannot combine a query targeting '{left}' with one targeting '{right}'")]
    Conflict { left: TargetKind, right: TargetKind },

    #[error("cannot negate group predicates {detail}")]
    Unnegatable { detail: String },

    #[error(
        "{entity_type} '{id}' cannot take another '{association}' reference tag \
         ({count} present, limit {limit})"
    )]
    TagLimitExceeded {
        entity_type: EntityType,
        id: String,
        association: EntityType,
        count: usize,
        limit: usize,
    },
}

impl AssociationError {
    /// Whether this error wraps a failed call to an external service.
    pub fn is_external(&self) -> bool {
        matches!(
            self,
            AssociationError::Share { .. }
                | AssociationError::Unshare { .. }
                | AssociationError::Fetch { .. }
                | AssociationError::Persist { .. }
                | AssociationError::Memberships { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_share_message_names_item_and_group() {
        let err = AssociationError::Share {
            item_id: "C2".to_string(),
            group_id: "G1".to_string(),
            source: ServiceError::Rejected("permission denied".to_string()),
        };
        let msg = err.to_string();
        assert!(msg.contains("C2"));
        assert!(msg.contains("G1"));
        assert!(msg.contains("permission denied"));
        assert!(err.is_external());
    }

    #[test]
    fn test_unsupported_names_both_types() {
        let err = AssociationError::UnsupportedAssociation {
            from: EntityType::Project,
            to: EntityType::Site,
        };
        assert_eq!(
            err.to_string(),
            "association between 'project' and 'site' is not supported"
        );
        assert!(!err.is_external());
    }

    #[test]
    fn test_source_chain_is_preserved() {
        use std::error::Error;

        let err = AssociationError::Persist {
            entity_type: EntityType::Project,
            id: "p1".to_string(),
            source: ServiceError::Unavailable("store offline".to_string()),
        };
        let source = err.source().expect("persist error carries its source");
        assert_eq!(source.to_string(), "service unavailable: store offline");
    }
}
