//! Association hierarchy registry.
//!
//! A static table, built once at startup, declaring for each entity type
//! which types it may parent and which it may be parented by. A pair is
//! supported only when *both* sides declare it, so drift between two types'
//! declarations disables the pair instead of half-enabling it.
//!
//! A type with no entry at all is a configuration error wherever it is
//! looked up. A registered type that simply omits another type is a normal
//! "not supported" answer.

use std::collections::BTreeMap;

use serde::Serialize;
use tether_config::HierarchyConfig;

use crate::entity::EntityType;
use crate::error::AssociationError;

/// Which side of an association an entity is on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Perspective {
    /// Owns the association group; includes children.
    Parent,
    /// Carries reference tags; claims parents.
    Child,
}

/// Declared associations of one entity type.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct AssociationHierarchy {
    pub children: Vec<EntityType>,
    pub parents: Vec<EntityType>,
}

/// Immutable per-type hierarchy table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HierarchyRegistry {
    table: BTreeMap<EntityType, AssociationHierarchy>,
}

impl HierarchyRegistry {
    /// Build from explicit declarations.
    pub fn new(entries: impl IntoIterator<Item = (EntityType, AssociationHierarchy)>) -> Self {
        Self {
            table: entries.into_iter().collect(),
        }
    }

    /// Build from the `[[hierarchy]]` configuration table.
    pub fn from_config(entries: &[HierarchyConfig]) -> Result<Self, AssociationError> {
        let parse_all = |names: &[String]| -> Result<Vec<EntityType>, AssociationError> {
            names.iter().map(|n| n.parse()).collect()
        };

        let mut table = BTreeMap::new();
        for entry in entries {
            let entity_type: EntityType = entry.entity_type.parse()?;
            let hierarchy = AssociationHierarchy {
                children: parse_all(&entry.children)?,
                parents: parse_all(&entry.parents)?,
            };
            if table.insert(entity_type, hierarchy).is_some() {
                return Err(AssociationError::Configuration {
                    entity_type: format!("{entity_type} (declared twice)"),
                });
            }
        }
        Ok(Self { table })
    }

    /// The hierarchy declared for `entity_type`.
    pub fn lookup(
        &self,
        entity_type: EntityType,
    ) -> Result<&AssociationHierarchy, AssociationError> {
        self.table
            .get(&entity_type)
            .ok_or_else(|| AssociationError::Configuration {
                entity_type: entity_type.to_string(),
            })
    }

    /// Look up by name; unknown names are configuration errors too.
    pub fn lookup_name(&self, name: &str) -> Result<&AssociationHierarchy, AssociationError> {
        self.lookup(name.parse()?)
    }

    /// Whether `a` and `b` may associate in either direction.
    pub fn is_supported(&self, a: EntityType, b: EntityType) -> Result<bool, AssociationError> {
        let ha = self.lookup(a)?;
        let hb = self.lookup(b)?;
        let a_parents_b = ha.children.contains(&b) && hb.parents.contains(&a);
        let b_parents_a = hb.children.contains(&a) && ha.parents.contains(&b);
        Ok(a_parents_b || b_parents_a)
    }

    /// Which side `entity_type` is on when associating with `association_type`.
    pub fn perspective(
        &self,
        entity_type: EntityType,
        association_type: EntityType,
    ) -> Result<Perspective, AssociationError> {
        let unsupported = || AssociationError::UnsupportedAssociation {
            from: entity_type,
            to: association_type,
        };
        if !self.is_supported(entity_type, association_type)? {
            return Err(unsupported());
        }
        let own = self.lookup(entity_type)?;
        if own.children.contains(&association_type) {
            Ok(Perspective::Parent)
        } else if own.parents.contains(&association_type) {
            Ok(Perspective::Child)
        } else {
            Err(unsupported())
        }
    }

    /// Registered types in a stable order.
    pub fn types(&self) -> impl Iterator<Item = EntityType> + '_ {
        self.table.keys().copied()
    }
}

impl Default for HierarchyRegistry {
    /// Initiatives parent projects.
    fn default() -> Self {
        Self::new([
            (
                EntityType::Initiative,
                AssociationHierarchy {
                    children: vec![EntityType::Project],
                    parents: Vec::new(),
                },
            ),
            (
                EntityType::Project,
                AssociationHierarchy {
                    children: Vec::new(),
                    parents: vec![EntityType::Initiative],
                },
            ),
        ])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_default_lookup() {
        let registry = HierarchyRegistry::default();
        assert_eq!(
            registry.lookup(EntityType::Initiative).unwrap().children,
            vec![EntityType::Project]
        );
        assert_eq!(
            registry.lookup(EntityType::Project).unwrap().parents,
            vec![EntityType::Initiative]
        );
        assert!(registry.lookup(EntityType::Project).unwrap().children.is_empty());
    }

    #[test]
    fn test_lookup_unknown_is_configuration_error() {
        let registry = HierarchyRegistry::default();
        assert!(matches!(
            registry.lookup_name("unknown"),
            Err(AssociationError::Configuration { .. })
        ));
        assert!(matches!(
            registry.lookup(EntityType::Site),
            Err(AssociationError::Configuration { .. })
        ));
        assert!(registry.lookup_name("initiative").is_ok());
    }

    #[test]
    fn test_is_supported_is_symmetric() {
        let registry = HierarchyRegistry::default();
        let types: Vec<EntityType> = registry.types().collect();
        for a in &types {
            for b in &types {
                assert_eq!(
                    registry.is_supported(*a, *b).unwrap(),
                    registry.is_supported(*b, *a).unwrap(),
                    "{a} / {b}"
                );
            }
        }
        assert!(registry.is_supported(EntityType::Initiative, EntityType::Project).unwrap());
        assert!(!registry.is_supported(EntityType::Project, EntityType::Project).unwrap());
    }

    #[test]
    fn test_one_sided_declaration_is_unsupported() {
        let registry = HierarchyRegistry::new([
            (
                EntityType::Initiative,
                AssociationHierarchy {
                    children: vec![EntityType::Project],
                    parents: Vec::new(),
                },
            ),
            (EntityType::Project, AssociationHierarchy::default()),
        ]);
        assert!(!registry.is_supported(EntityType::Initiative, EntityType::Project).unwrap());
        assert!(!registry.is_supported(EntityType::Project, EntityType::Initiative).unwrap());
        assert!(matches!(
            registry.perspective(EntityType::Initiative, EntityType::Project),
            Err(AssociationError::UnsupportedAssociation { .. })
        ));
    }

    #[test]
    fn test_unregistered_side_is_configuration_error() {
        let registry = HierarchyRegistry::default();
        assert!(matches!(
            registry.is_supported(EntityType::Initiative, EntityType::Site),
            Err(AssociationError::Configuration { .. })
        ));
    }

    #[test]
    fn test_perspective() {
        let registry = HierarchyRegistry::default();
        assert_eq!(
            registry.perspective(EntityType::Initiative, EntityType::Project).unwrap(),
            Perspective::Parent
        );
        assert_eq!(
            registry.perspective(EntityType::Project, EntityType::Initiative).unwrap(),
            Perspective::Child
        );
        assert!(matches!(
            registry.perspective(EntityType::Initiative, EntityType::Initiative),
            Err(AssociationError::UnsupportedAssociation { .. })
        ));
    }

    #[test]
    fn test_from_config_matches_default() {
        let config = tether_config::AppConfig::default();
        let registry = HierarchyRegistry::from_config(&config.hierarchy).unwrap();
        assert_eq!(registry, HierarchyRegistry::default());
    }

    #[test]
    fn test_from_config_rejects_unknown_names() {
        let entries = vec![HierarchyConfig::new("initiative").with_child("widget")];
        let err = HierarchyRegistry::from_config(&entries).unwrap_err();
        assert!(err.to_string().contains("widget"));
    }

    #[test]
    fn test_from_config_extends_table() {
        let entries = vec![
            HierarchyConfig::new("initiative").with_child("project").with_child("site"),
            HierarchyConfig::new("project").with_parent("initiative"),
            HierarchyConfig::new("site").with_parent("initiative"),
        ];
        let registry = HierarchyRegistry::from_config(&entries).unwrap();
        assert!(registry.is_supported(EntityType::Site, EntityType::Initiative).unwrap());
        assert!(!registry.is_supported(EntityType::Site, EntityType::Project).unwrap());
    }
}
