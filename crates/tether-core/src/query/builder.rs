//! Derived relationship views and the two strategies that build them.
//!
//! Each side of an association owns one half of it: the parent owns group
//! membership (*included*), the child owns a reference tag (*referenced*).
//! The four views classify candidates by which halves are present:
//!
//! | View                 | own half | counterpart half |
//! |----------------------|----------|------------------|
//! | `Associated`         | yes      | yes              |
//! | `Pending`            | yes      | no               |
//! | `Requesting`         | no       | yes              |
//! | `AvailableToRequest` | no       | no               |
//!
//! A parent can ask the search engine directly ("children tagged with my
//! reference and in my group"), so [`PredicateStrategy`] pushes the set algebra
//! into the query. A child cannot ask "which parents include me", so
//! [`FetchIntersectStrategy`] fetches the child's groups, intersects id sets
//! locally, and emits an id-membership query.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::entity::{Entity, EntityType, Memberships};
use crate::error::AssociationError;
use crate::hierarchy::Perspective;
use crate::keyword::{self, AssociationTag, TagKind};
use crate::services::ServiceContext;

use super::{Field, Filter, Predicate, RelationshipQuery};

/// One of the four derived relationship views.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum RelationshipView {
    /// Both halves present.
    Associated,
    /// Own half present, counterpart's missing.
    Pending,
    /// Counterpart's half present, own missing.
    Requesting,
    /// Neither half present.
    AvailableToRequest,
}

impl RelationshipView {
    pub const ALL: [RelationshipView; 4] = [
        RelationshipView::Associated,
        RelationshipView::Pending,
        RelationshipView::Requesting,
        RelationshipView::AvailableToRequest,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            RelationshipView::Associated => "associated",
            RelationshipView::Pending => "pending",
            RelationshipView::Requesting => "requesting",
            RelationshipView::AvailableToRequest => "available",
        }
    }
}

impl fmt::Display for RelationshipView {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RelationshipView {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        RelationshipView::ALL
            .into_iter()
            .find(|v| v.as_str() == s)
            .ok_or_else(|| format!("unknown relationship view '{s}'"))
    }
}

// ── Parent perspective ──────────────────────────────────────────────────

/// Builds views for a parent by combining its inclusion scope with a
/// reference-tag predicate on the child type. Makes no external calls.
#[derive(Debug, Clone, Copy, Default)]
pub struct PredicateStrategy;

impl PredicateStrategy {
    /// Returns `None` when the parent has no association group yet.
    pub fn build(
        parent: &Entity,
        child_type: EntityType,
        view: RelationshipView,
    ) -> Result<Option<RelationshipQuery>, AssociationError> {
        let Some(config) = &parent.association else {
            debug!(
                entity_type = %parent.entity_type,
                entity_id = %parent.id,
                "Parent not provisioned, no relationship query"
            );
            return Ok(None);
        };

        let reference = AssociationTag::reference(parent.entity_type, &parent.id).to_string();

        let scope = match view {
            RelationshipView::Associated | RelationshipView::Pending => {
                config.inclusion_query.clone()
            }
            RelationshipView::Requesting | RelationshipView::AvailableToRequest => {
                config.inclusion_query.negate_group_predicates()?
            }
        };

        let claim = match view {
            RelationshipView::Associated | RelationshipView::Requesting => {
                Predicate::any(Field::Keyword, [reference])
            }
            RelationshipView::Pending | RelationshipView::AvailableToRequest => {
                Predicate::not(Field::Keyword, [reference])
            }
        };

        let claimed = RelationshipQuery::for_type(child_type)
            .with_filter(Filter::and(vec![Predicate::types(&[child_type]), claim]));

        scope.combine(claimed).map(Some)
    }
}

// ── Child perspective ───────────────────────────────────────────────────

/// The two id sets a child's views are derived from, in first-seen order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RelationshipSets {
    /// Parents whose association group contains the child.
    pub included: Vec<String>,
    /// Parents the child's reference tags claim.
    pub referenced: Vec<String>,
}

impl RelationshipSets {
    pub fn associated(&self) -> Vec<String> {
        intersect(&self.included, &self.referenced)
    }

    /// Claimed by the child, not yet included by the parent.
    pub fn pending(&self) -> Vec<String> {
        difference(&self.referenced, &self.included)
    }

    /// Included by the parent, not yet claimed by the child.
    pub fn requesting(&self) -> Vec<String> {
        difference(&self.included, &self.referenced)
    }

    /// Every parent with at least one half present.
    pub fn known(&self) -> Vec<String> {
        let mut all = self.included.clone();
        all.extend(difference(&self.referenced, &self.included));
        all
    }
}

fn intersect(left: &[String], right: &[String]) -> Vec<String> {
    left.iter().filter(|id| right.contains(id)).cloned().collect()
}

fn difference(left: &[String], right: &[String]) -> Vec<String> {
    left.iter().filter(|id| !right.contains(id)).cloned().collect()
}

/// Builds views for a child from its live group memberships and its tags.
#[derive(Debug, Clone, Copy, Default)]
pub struct FetchIntersectStrategy;

impl FetchIntersectStrategy {
    /// Parent ids whose association group (identified by the group's own
    /// identify tag) appears in `memberships`.
    pub fn included_by(memberships: &Memberships, parent_type: EntityType) -> Vec<String> {
        let mut ids: Vec<String> = Vec::new();
        for group in memberships.iter() {
            for tag in &group.tags {
                if let Some(parsed) = AssociationTag::parse(tag) {
                    if parsed.kind == TagKind::Identify
                        && parsed.entity_type == parent_type
                        && !ids.contains(&parsed.id)
                    {
                        ids.push(parsed.id);
                    }
                }
            }
        }
        ids
    }

    /// Fetch the child's groups (one external call) and derive both sets.
    pub async fn sets(
        child: &Entity,
        parent_type: EntityType,
        ctx: &ServiceContext,
    ) -> Result<RelationshipSets, AssociationError> {
        let memberships = ctx
            .groups
            .list_memberships(&child.id)
            .await
            .map_err(|source| AssociationError::Memberships {
                id: child.id.clone(),
                source,
            })?;

        let sets = RelationshipSets {
            included: Self::included_by(&memberships, parent_type),
            referenced: keyword::extract_ids(&child.tags, Some(parent_type)),
        };
        debug!(
            entity_id = %child.id,
            parent_type = %parent_type,
            included = sets.included.len(),
            referenced = sets.referenced.len(),
            "Derived relationship sets"
        );
        Ok(sets)
    }

    /// Build a view from already-derived sets.
    ///
    /// A view whose id set is empty yields `None`. For `AvailableToRequest`
    /// that set is every known parent, so a child that knows none gets no
    /// view.
    pub fn build(
        parent_type: EntityType,
        view: RelationshipView,
        sets: &RelationshipSets,
    ) -> Option<RelationshipQuery> {
        let ids = match view {
            RelationshipView::Associated => sets.associated(),
            RelationshipView::Pending => sets.pending(),
            RelationshipView::Requesting => sets.requesting(),
            RelationshipView::AvailableToRequest => {
                let known = sets.known();
                if known.is_empty() {
                    return None;
                }
                return Some(RelationshipQuery::for_type(parent_type).with_filter(Filter::and(
                    vec![Predicate::types(&[parent_type]), Predicate::not(Field::Id, known)],
                )));
            }
        };

        if ids.is_empty() {
            return None;
        }
        Some(
            RelationshipQuery::for_type(parent_type).with_filter(Filter::and(vec![
                Predicate::types(&[parent_type]),
                Predicate::any(Field::Id, ids),
            ])),
        )
    }
}

// ── Strategy selection ──────────────────────────────────────────────────

/// The single entry point call sites use; the perspective picks the variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryStrategy {
    Predicate,
    FetchIntersect,
}

impl QueryStrategy {
    pub fn for_perspective(perspective: Perspective) -> Self {
        match perspective {
            Perspective::Parent => QueryStrategy::Predicate,
            Perspective::Child => QueryStrategy::FetchIntersect,
        }
    }

    /// Build several views of `entity` against `association_type`.
    ///
    /// The child variant fetches memberships once for all requested views.
    pub async fn build_many(
        self,
        entity: &Entity,
        association_type: EntityType,
        views: &[RelationshipView],
        ctx: &ServiceContext,
    ) -> Result<Vec<Option<RelationshipQuery>>, AssociationError> {
        match self {
            QueryStrategy::Predicate => views
                .iter()
                .map(|view| PredicateStrategy::build(entity, association_type, *view))
                .collect(),
            QueryStrategy::FetchIntersect => {
                let sets = FetchIntersectStrategy::sets(entity, association_type, ctx).await?;
                Ok(views
                    .iter()
                    .map(|view| FetchIntersectStrategy::build(association_type, *view, &sets))
                    .collect())
            }
        }
    }

    /// Build a single view.
    pub async fn build(
        self,
        entity: &Entity,
        association_type: EntityType,
        view: RelationshipView,
        ctx: &ServiceContext,
    ) -> Result<Option<RelationshipQuery>, AssociationError> {
        let mut built = self
            .build_many(entity, association_type, &[view], ctx)
            .await?;
        Ok(built.pop().flatten())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entity::{AssociationConfig, Group};
    use crate::query::Match;
    use pretty_assertions::assert_eq;

    fn parent() -> Entity {
        Entity::new(EntityType::Initiative, "I1")
            .with_association(AssociationConfig::for_group("G1"))
    }

    fn sets(included: &[&str], referenced: &[&str]) -> RelationshipSets {
        RelationshipSets {
            included: included.iter().map(|s| s.to_string()).collect(),
            referenced: referenced.iter().map(|s| s.to_string()).collect(),
        }
    }

    #[test]
    fn test_parent_associated_requires_group_and_reference() {
        let query =
            PredicateStrategy::build(&parent(), EntityType::Project, RelationshipView::Associated)
                .unwrap()
                .unwrap();
        assert_eq!(query.filters.len(), 2);
        assert_eq!(query.filters[0].predicates[0], Predicate::any(Field::Group, ["G1"]));
        assert_eq!(
            query.filters[1].predicates,
            vec![
                Predicate::types(&[EntityType::Project]),
                Predicate::any(Field::Keyword, ["ref|initiative|I1"]),
            ]
        );
    }

    #[test]
    fn test_parent_views_cover_the_four_quadrants() {
        let expect = [
            (RelationshipView::Associated, true, true),
            (RelationshipView::Pending, true, false),
            (RelationshipView::Requesting, false, true),
            (RelationshipView::AvailableToRequest, false, false),
        ];
        for (view, in_group, referenced) in expect {
            let query = PredicateStrategy::build(&parent(), EntityType::Project, view)
                .unwrap()
                .unwrap();
            let group = &query.filters[0].predicates[0].matching;
            let keyword = &query.filters[1].predicates[1].matching;
            assert_eq!(matches!(group, Match::Any(_)), in_group, "{view}");
            assert_eq!(matches!(keyword, Match::Any(_)), referenced, "{view}");
        }
    }

    #[test]
    fn test_unprovisioned_parent_yields_none() {
        let bare = Entity::new(EntityType::Initiative, "I1");
        for view in RelationshipView::ALL {
            assert!(
                PredicateStrategy::build(&bare, EntityType::Project, view)
                    .unwrap()
                    .is_none()
            );
        }
    }

    #[test]
    fn test_set_algebra() {
        let s = sets(&["a", "b", "c"], &["b", "c", "d"]);
        assert_eq!(s.associated(), vec!["b", "c"]);
        assert_eq!(s.pending(), vec!["d"]);
        assert_eq!(s.requesting(), vec!["a"]);
        assert_eq!(s.known(), vec!["a", "b", "c", "d"]);
    }

    #[test]
    fn test_child_positive_view_with_empty_set_is_none() {
        let s = sets(&["a"], &[]);
        let build = |view| FetchIntersectStrategy::build(EntityType::Initiative, view, &s);
        assert!(build(RelationshipView::Associated).is_none());
        assert!(build(RelationshipView::Pending).is_none());
        assert!(build(RelationshipView::Requesting).is_some());
    }

    #[test]
    fn test_child_requesting_builds_id_membership() {
        let s = sets(&["a", "b"], &["b"]);
        let query =
            FetchIntersectStrategy::build(EntityType::Initiative, RelationshipView::Requesting, &s)
                .unwrap();
        assert_eq!(
            query.filters[0].predicates,
            vec![
                Predicate::types(&[EntityType::Initiative]),
                Predicate::any(Field::Id, ["a"]),
            ]
        );
    }

    #[test]
    fn test_child_available_excludes_known_parents() {
        let s = sets(&["a"], &["b"]);
        let query = FetchIntersectStrategy::build(
            EntityType::Initiative,
            RelationshipView::AvailableToRequest,
            &s,
        )
        .unwrap();
        assert_eq!(query.filters[0].predicates[1], Predicate::not(Field::Id, ["a", "b"]));
    }

    #[test]
    fn test_child_available_without_known_parents_is_none() {
        let query = FetchIntersectStrategy::build(
            EntityType::Initiative,
            RelationshipView::AvailableToRequest,
            &RelationshipSets::default(),
        );
        assert!(query.is_none());
    }

    #[test]
    fn test_included_by_reads_identify_tags_of_parent_type() {
        let memberships = Memberships {
            admin: vec![Group::new("g1").with_tag("initiative|I1")],
            member: vec![
                Group::new("g2").with_tag("ref|initiative|I9").with_tag("site|S1"),
                Group::new("g3").with_tag("initiative|I2"),
            ],
            other: vec![Group::new("g4").with_tag("initiative|I1")],
        };
        assert_eq!(
            FetchIntersectStrategy::included_by(&memberships, EntityType::Initiative),
            vec!["I1", "I2"]
        );
    }

    #[test]
    fn test_view_names_parse() {
        assert_eq!(
            "available".parse::<RelationshipView>().unwrap(),
            RelationshipView::AvailableToRequest
        );
        assert!("everything".parse::<RelationshipView>().is_err());
    }
}
