//! Relationship queries: construction, combination and negation.
//!
//! A [`RelationshipQuery`] is an abstract description handed to the external
//! [`SearchEngine`](crate::services::SearchEngine). This crate only builds and
//! combines queries; it never executes them (the in-memory reference backend
//! in [`memory`](crate::memory) is the one exception, used for tests and the
//! CLI).
//!
//! ## Shape
//!
//! ```text
//! RelationshipQuery { target: item,
//!   filters: [                       ← every filter must hold (AND)
//!     Filter { operation: AND|OR,    ← how this filter's predicates combine
//!       predicates: [ Predicate { field: group, any: ["g1"] }, ... ] },
//!     ...
//!   ] }
//! ```
//!
//! Serialized with serde, a predicate reads `{"field": "group", "any": ["g1"]}`.

pub mod builder;

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::entity::EntityType;
use crate::error::AssociationError;

pub use builder::{
    FetchIntersectStrategy, PredicateStrategy, QueryStrategy, RelationshipSets, RelationshipView,
};

/// The kind of record a query searches over.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TargetKind {
    Item,
    Group,
    User,
}

impl fmt::Display for TargetKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TargetKind::Item => write!(f, "item"),
            TargetKind::Group => write!(f, "group"),
            TargetKind::User => write!(f, "user"),
        }
    }
}

/// How the predicates of a single filter combine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Operation {
    And,
    Or,
}

impl Operation {
    fn flipped(self) -> Self {
        match self {
            Operation::And => Operation::Or,
            Operation::Or => Operation::And,
        }
    }
}

/// The record attribute a predicate constrains.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Field {
    /// The record's entity type.
    Type,
    /// The record's free-text tags.
    Keyword,
    /// The groups the record is shared into.
    Group,
    /// The record's id.
    Id,
}

/// Value matching mode for a predicate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Match {
    /// At least one of the values is present.
    Any(Vec<String>),
    /// Every value is present.
    All(Vec<String>),
    /// None of the values is present.
    Not(Vec<String>),
}

impl Match {
    /// The values this match refers to.
    pub fn values(&self) -> &[String] {
        match self {
            Match::Any(v) | Match::All(v) | Match::Not(v) => v,
        }
    }

    /// Evaluate against the values a record has for the field.
    pub fn matches(&self, present: &[String]) -> bool {
        let has = |v: &String| present.contains(v);
        match self {
            Match::Any(values) => values.iter().any(has),
            Match::All(values) => values.iter().all(has),
            Match::Not(values) => !values.iter().any(has),
        }
    }
}

/// One constraint on one field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Predicate {
    pub field: Field,
    #[serde(flatten)]
    pub matching: Match,
}

impl Predicate {
    pub fn any<I, S>(field: Field, values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            field,
            matching: Match::Any(values.into_iter().map(Into::into).collect()),
        }
    }

    pub fn all<I, S>(field: Field, values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            field,
            matching: Match::All(values.into_iter().map(Into::into).collect()),
        }
    }

    pub fn not<I, S>(field: Field, values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            field,
            matching: Match::Not(values.into_iter().map(Into::into).collect()),
        }
    }

    /// Restrict to records of the given entity types.
    pub fn types(types: &[EntityType]) -> Self {
        Self::any(Field::Type, types.iter().map(|t| t.as_str()))
    }

    /// Logical negation of a group-membership predicate.
    ///
    /// `all` with zero or several groups has no single-predicate negation.
    fn negate_group(&self) -> Result<Self, AssociationError> {
        let matching = match &self.matching {
            Match::Any(groups) => Match::Not(groups.clone()),
            Match::Not(groups) => Match::Any(groups.clone()),
            Match::All(groups) if groups.len() == 1 => Match::Not(groups.clone()),
            Match::All(groups) => {
                return Err(AssociationError::Unnegatable {
                    detail: format!("requiring all of {groups:?}"),
                });
            }
        };
        Ok(Self {
            field: Field::Group,
            matching,
        })
    }
}

/// A set of predicates combined by one operation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Filter {
    pub operation: Operation,
    pub predicates: Vec<Predicate>,
}

impl Filter {
    pub fn and(predicates: Vec<Predicate>) -> Self {
        Self {
            operation: Operation::And,
            predicates,
        }
    }

    pub fn or(predicates: Vec<Predicate>) -> Self {
        Self {
            operation: Operation::Or,
            predicates,
        }
    }

    fn has_group_predicates(&self) -> bool {
        self.predicates.iter().any(|p| p.field == Field::Group)
    }

    /// Evaluate against a record, given a lookup of its values per field.
    pub fn matches<F>(&self, values_of: F) -> bool
    where
        F: Fn(Field) -> Vec<String>,
    {
        let mut results = self
            .predicates
            .iter()
            .map(|p| p.matching.matches(&values_of(p.field)));
        match self.operation {
            Operation::And => results.all(|r| r),
            Operation::Or => results.any(|r| r),
        }
    }
}

/// An abstract search over one target kind.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelationshipQuery {
    #[serde(rename = "targetEntity")]
    pub target: TargetKind,
    #[serde(default)]
    pub filters: Vec<Filter>,
}

impl RelationshipQuery {
    pub fn new(target: TargetKind) -> Self {
        Self {
            target,
            filters: Vec::new(),
        }
    }

    /// An unconstrained query over the target kind backing `entity_type`.
    pub fn for_type(entity_type: EntityType) -> Self {
        Self::new(entity_type.target_kind())
    }

    /// Builder: append a filter.
    pub fn with_filter(mut self, filter: Filter) -> Self {
        self.filters.push(filter);
        self
    }

    /// Conjoin two queries. Both must search the same target kind.
    pub fn combine(mut self, other: RelationshipQuery) -> Result<Self, AssociationError> {
        if self.target != other.target {
            return Err(AssociationError::Conflict {
                left: self.target,
                right: other.target,
            });
        }
        self.filters.extend(other.filters);
        Ok(self)
    }

    /// Whether any filter constrains group membership.
    pub fn has_group_predicates(&self) -> bool {
        self.filters.iter().any(Filter::has_group_predicates)
    }

    /// Invert the group-membership part of the query. Every other predicate
    /// stays as a scope constraint.
    ///
    /// Group predicates must live in a single filter. Their combination is
    /// negated with De Morgan: `AND [group any a, group any b]` becomes
    /// `OR [group not a, group not b]`. In an `AND` filter that also holds
    /// other predicates, several group predicates are moved into a filter of
    /// their own so the flip does not reach the scope predicates. Group
    /// predicates inside a mixed `OR` filter have no such split and are
    /// refused.
    pub fn negate_group_predicates(&self) -> Result<Self, AssociationError> {
        let grouped = self
            .filters
            .iter()
            .filter(|f| f.has_group_predicates())
            .count();
        if grouped > 1 {
            return Err(AssociationError::Unnegatable {
                detail: format!("spread across {grouped} filters"),
            });
        }

        let mut filters = Vec::with_capacity(self.filters.len() + 1);
        for filter in &self.filters {
            if !filter.has_group_predicates() {
                filters.push(filter.clone());
                continue;
            }

            let (groups, scope): (Vec<&Predicate>, Vec<&Predicate>) = filter
                .predicates
                .iter()
                .partition(|p| p.field == Field::Group);
            let negated = groups
                .iter()
                .map(|p| p.negate_group())
                .collect::<Result<Vec<_>, _>>()?;

            if scope.is_empty() {
                let operation = if negated.len() > 1 {
                    filter.operation.flipped()
                } else {
                    filter.operation
                };
                filters.push(Filter {
                    operation,
                    predicates: negated,
                });
            } else if filter.operation == Operation::Or {
                return Err(AssociationError::Unnegatable {
                    detail: "mixed with other predicates under OR".to_string(),
                });
            } else if let [single] = negated.as_slice() {
                let predicates = filter
                    .predicates
                    .iter()
                    .map(|p| {
                        if p.field == Field::Group {
                            single.clone()
                        } else {
                            p.clone()
                        }
                    })
                    .collect();
                filters.push(Filter::and(predicates));
            } else {
                filters.push(Filter::and(scope.into_iter().cloned().collect()));
                filters.push(Filter::or(negated));
            }
        }

        Ok(Self {
            target: self.target,
            filters,
        })
    }

    /// Evaluate against a record, given a lookup of its values per field.
    pub fn matches<F>(&self, values_of: F) -> bool
    where
        F: Fn(Field) -> Vec<String>,
    {
        self.filters.iter().all(|f| f.matches(&values_of))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn group_scope(group: &str) -> RelationshipQuery {
        RelationshipQuery::new(TargetKind::Item)
            .with_filter(Filter::and(vec![Predicate::any(Field::Group, [group])]))
    }

    #[test]
    fn test_combine_same_target_concatenates_filters() {
        let claim = RelationshipQuery::new(TargetKind::Item)
            .with_filter(Filter::and(vec![Predicate::types(&[EntityType::Project])]));
        let combined = group_scope("g1").combine(claim).unwrap();
        assert_eq!(combined.filters.len(), 2);
        assert_eq!(combined.filters[1].predicates[0].field, Field::Type);
    }

    #[test]
    fn test_combine_different_targets_conflicts() {
        let err = group_scope("g1")
            .combine(RelationshipQuery::new(TargetKind::Group))
            .unwrap_err();
        assert!(matches!(
            err,
            AssociationError::Conflict {
                left: TargetKind::Item,
                right: TargetKind::Group
            }
        ));
        assert!(err.to_string().contains("item"));
        assert!(err.to_string().contains("group"));
    }

    #[test]
    fn test_negate_single_group_predicate() {
        let negated = group_scope("g1").negate_group_predicates().unwrap();
        assert_eq!(
            negated.filters[0].predicates[0],
            Predicate::not(Field::Group, ["g1"])
        );
        assert_eq!(negated.filters[0].operation, Operation::And);
    }

    #[test]
    fn test_negate_is_an_involution_for_any() {
        let original = group_scope("g1");
        let twice = original
            .negate_group_predicates()
            .unwrap()
            .negate_group_predicates()
            .unwrap();
        assert_eq!(twice, original);
    }

    #[test]
    fn test_negate_applies_de_morgan_on_group_only_filter() {
        let query = RelationshipQuery::new(TargetKind::Item).with_filter(Filter::and(vec![
            Predicate::any(Field::Group, ["a"]),
            Predicate::any(Field::Group, ["b"]),
        ]));
        let negated = query.negate_group_predicates().unwrap();
        assert_eq!(negated.filters[0].operation, Operation::Or);
        assert!(
            negated.filters[0]
                .predicates
                .iter()
                .all(|p| matches!(p.matching, Match::Not(_)))
        );
    }

    #[test]
    fn test_negate_leaves_other_predicates_alone() {
        let query = RelationshipQuery::new(TargetKind::Item).with_filter(Filter::and(vec![
            Predicate::types(&[EntityType::Project]),
            Predicate::any(Field::Group, ["g1"]),
        ]));
        let negated = query.negate_group_predicates().unwrap();
        assert_eq!(negated.filters[0].predicates[0], Predicate::types(&[EntityType::Project]));
        assert_eq!(negated.filters[0].operation, Operation::And);
    }

    #[test]
    fn test_negate_rejects_multi_value_all() {
        let query = RelationshipQuery::new(TargetKind::Item)
            .with_filter(Filter::and(vec![Predicate::all(Field::Group, ["a", "b"])]));
        assert!(matches!(
            query.negate_group_predicates(),
            Err(AssociationError::Unnegatable { .. })
        ));
    }

    #[test]
    fn test_negate_splits_groups_out_of_mixed_and_filter() {
        let query = RelationshipQuery::new(TargetKind::Item).with_filter(Filter::and(vec![
            Predicate::types(&[EntityType::Project]),
            Predicate::any(Field::Group, ["a"]),
            Predicate::any(Field::Group, ["b"]),
        ]));
        let negated = query.negate_group_predicates().unwrap();
        assert_eq!(
            negated.filters,
            vec![
                Filter::and(vec![Predicate::types(&[EntityType::Project])]),
                Filter::or(vec![
                    Predicate::not(Field::Group, ["a"]),
                    Predicate::not(Field::Group, ["b"]),
                ]),
            ]
        );
    }

    #[test]
    fn test_negated_mixed_filter_is_complement_within_scope() {
        let query = RelationshipQuery::new(TargetKind::Item).with_filter(Filter::and(vec![
            Predicate::types(&[EntityType::Project]),
            Predicate::any(Field::Group, ["a"]),
            Predicate::any(Field::Group, ["b"]),
        ]));
        let negated = query.negate_group_predicates().unwrap();

        for groups in [vec![], vec!["a"], vec!["b"], vec!["a", "b"]] {
            let values_of = |field: Field| match field {
                Field::Type => vec!["project".to_string()],
                Field::Group => groups.iter().map(|g| g.to_string()).collect(),
                _ => Vec::new(),
            };
            assert_ne!(
                query.matches(values_of),
                negated.matches(values_of),
                "groups {groups:?}"
            );
        }
    }

    #[test]
    fn test_negate_rejects_groups_in_mixed_or_filter() {
        let query = RelationshipQuery::new(TargetKind::Item).with_filter(Filter::or(vec![
            Predicate::types(&[EntityType::Project]),
            Predicate::any(Field::Group, ["a"]),
        ]));
        assert!(matches!(
            query.negate_group_predicates(),
            Err(AssociationError::Unnegatable { .. })
        ));
    }

    #[test]
    fn test_negate_rejects_empty_all() {
        let empty: [&str; 0] = [];
        let query = RelationshipQuery::new(TargetKind::Item)
            .with_filter(Filter::and(vec![Predicate::all(Field::Group, empty)]));
        assert!(matches!(
            query.negate_group_predicates(),
            Err(AssociationError::Unnegatable { .. })
        ));
    }

    #[test]
    fn test_negate_rejects_groups_across_filters() {
        let query = group_scope("a").combine(group_scope("b")).unwrap();
        assert!(query.negate_group_predicates().is_err());
    }

    #[test]
    fn test_match_semantics() {
        let present = vec!["a".to_string(), "b".to_string()];
        assert!(Match::Any(vec!["a".into(), "z".into()]).matches(&present));
        assert!(!Match::All(vec!["a".into(), "z".into()]).matches(&present));
        assert!(Match::All(vec!["a".into(), "b".into()]).matches(&present));
        assert!(Match::Not(vec!["z".into()]).matches(&present));
        assert!(!Match::Not(vec!["b".into()]).matches(&present));
    }

    #[test]
    fn test_or_filter_matches_any_predicate() {
        let filter = Filter::or(vec![
            Predicate::any(Field::Id, ["x"]),
            Predicate::any(Field::Id, ["y"]),
        ]);
        assert!(filter.matches(|_| vec!["y".to_string()]));
        assert!(!filter.matches(|_| vec!["z".to_string()]));
    }

    #[test]
    fn test_query_json_shape() {
        let json = serde_json::to_value(group_scope("g1")).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "targetEntity": "item",
                "filters": [
                    { "operation": "AND", "predicates": [ { "field": "group", "any": ["g1"] } ] }
                ]
            })
        );
        let back: RelationshipQuery = serde_json::from_value(json).unwrap();
        assert_eq!(back, group_scope("g1"));
    }
}
