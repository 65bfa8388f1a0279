//! The association engine: the public entry point.
//!
//! [`Associations`] bundles the immutable hierarchy table with the tag limits
//! and statistics policy loaded from configuration. Every operation starts by
//! resolving the pair through the hierarchy, so an unsupported or
//! unregistered pair fails before any external call is made.
//!
//! The protocol operations live in [`protocol`](crate::protocol) and the
//! statistics in [`stats`](crate::stats); both extend this type.

use tether_config::{AppConfig, StatsFailurePolicy};

use crate::entity::{AssociationRef, Entity, EntityType};
use crate::error::AssociationError;
use crate::hierarchy::{HierarchyRegistry, Perspective};
use crate::keyword::{self, TagLimits};
use crate::query::{QueryStrategy, RelationshipQuery, RelationshipView};
use crate::services::ServiceContext;

/// Association operations bound to one hierarchy and policy set.
#[derive(Debug, Clone)]
pub struct Associations {
    pub(crate) registry: HierarchyRegistry,
    pub(crate) limits: TagLimits,
    pub(crate) stats_policy: StatsFailurePolicy,
}

impl Associations {
    /// Create an engine with default limits and statistics policy.
    pub fn new(registry: HierarchyRegistry) -> Self {
        Self {
            registry,
            limits: TagLimits::default(),
            stats_policy: StatsFailurePolicy::default(),
        }
    }

    /// Build the hierarchy and policies from loaded configuration.
    pub fn from_config(config: &AppConfig) -> Result<Self, AssociationError> {
        Ok(Self {
            registry: HierarchyRegistry::from_config(&config.hierarchy)?,
            limits: TagLimits::from(&config.tags),
            stats_policy: config.stats.on_failure,
        })
    }

    /// Builder: override the tag limits.
    pub fn with_limits(mut self, limits: TagLimits) -> Self {
        self.limits = limits;
        self
    }

    /// Builder: override the statistics failure policy.
    pub fn with_stats_policy(mut self, policy: StatsFailurePolicy) -> Self {
        self.stats_policy = policy;
        self
    }

    pub fn registry(&self) -> &HierarchyRegistry {
        &self.registry
    }

    pub fn limits(&self) -> &TagLimits {
        &self.limits
    }

    pub fn is_supported(&self, a: EntityType, b: EntityType) -> Result<bool, AssociationError> {
        self.registry.is_supported(a, b)
    }

    /// Resolve which side `entity` is on, failing for unsupported pairs.
    pub fn perspective(
        &self,
        entity: &Entity,
        association_type: EntityType,
    ) -> Result<Perspective, AssociationError> {
        self.registry.perspective(entity.entity_type, association_type)
    }

    /// Build one relationship view of `entity` against `association_type`.
    ///
    /// `None` means no query applies: the parent is unprovisioned, or the
    /// child-side id set for the view is empty. It is not an error.
    pub async fn build_relationship_query(
        &self,
        entity: &Entity,
        association_type: EntityType,
        view: RelationshipView,
        ctx: &ServiceContext,
    ) -> Result<Option<RelationshipQuery>, AssociationError> {
        let perspective = self.perspective(entity, association_type)?;
        QueryStrategy::for_perspective(perspective)
            .build(entity, association_type, view, ctx)
            .await
    }

    /// Identify-tag associations of `entity` with `association_type`.
    pub fn list_associations(
        &self,
        entity: &Entity,
        association_type: EntityType,
    ) -> Vec<AssociationRef> {
        keyword::list_associations(entity, association_type)
    }

    /// Add an identify tag to `entity`. The caller persists.
    pub fn add_association_tag(&self, entity: &mut Entity, association: &AssociationRef) {
        keyword::add_association_tag(entity, association);
    }

    /// Remove an identify tag from `entity`. The caller persists.
    pub fn remove_association_tag(&self, entity: &mut Entity, association: &AssociationRef) {
        keyword::remove_association_tag(entity, association);
    }
}

impl Default for Associations {
    fn default() -> Self {
        Self::new(HierarchyRegistry::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tether_config::LimitPolicy;

    #[test]
    fn test_from_config_applies_policies() {
        let config = AppConfig::parse(
            r#"
            [tags]
            reference_limit = 3
            on_limit = "reject"

            [stats]
            on_failure = "error"
        "#,
        )
        .unwrap();
        let engine = Associations::from_config(&config).unwrap();
        assert_eq!(engine.limits().reference_limit, 3);
        assert_eq!(engine.limits().policy, LimitPolicy::Reject);
        assert_eq!(engine.stats_policy, StatsFailurePolicy::Error);
        assert!(engine.is_supported(EntityType::Project, EntityType::Initiative).unwrap());
    }

    #[test]
    fn test_from_config_rejects_unknown_type() {
        let config = AppConfig::parse(
            r#"
            [[hierarchy]]
            type = "gadget"
        "#,
        )
        .unwrap();
        assert!(matches!(
            Associations::from_config(&config),
            Err(AssociationError::Configuration { .. })
        ));
    }

    #[test]
    fn test_perspective_uses_entity_type() {
        let engine = Associations::default();
        let project = Entity::new(EntityType::Project, "P1");
        assert_eq!(
            engine.perspective(&project, EntityType::Initiative).unwrap(),
            Perspective::Child
        );
        assert!(engine.perspective(&project, EntityType::Project).is_err());
    }
}
