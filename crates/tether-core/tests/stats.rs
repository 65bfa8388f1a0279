//! Relationship statistics against recording service doubles.

use pretty_assertions::assert_eq;
use tether_config::StatsFailurePolicy;
use tether_core::query::{Field, Match};
use tether_core::{
    AssociationError, Associations, EntityType, Memberships, OwnHalf, RelationshipView,
    ServiceError,
};
use tether_test_utils::fixtures::{association_group, initiative, project, unprovisioned_initiative};
use tether_test_utils::services::{Call, StubServices};

fn is_execute(call: &Call) -> bool {
    matches!(call, Call::Execute { .. })
}

#[tokio::test]
async fn test_parent_stats_sum_three_queries() {
    let (stub, ctx) = StubServices::new().with_search_total(3).into_context();
    let parent = initiative("I1", "G1");

    let stats = Associations::default()
        .get_stats(&parent, EntityType::Project, &ctx)
        .await
        .unwrap();

    assert_eq!(stats.associated, 3);
    assert_eq!(stats.pending, 3);
    assert_eq!(stats.requesting, 3);
    assert_eq!(stats.own_half, OwnHalf::Included(6));
    assert!(stats.degraded.is_empty());
    assert_eq!(stub.count(is_execute), 3);
}

#[tokio::test]
async fn test_single_query_failure_degrades_one_count() {
    // Only the Requesting view negates group membership among the counted views.
    let (stub, ctx) = StubServices::new()
        .with_search_total(2)
        .failing_search_when(|q| {
            q.filters
                .iter()
                .flat_map(|f| &f.predicates)
                .any(|p| p.field == Field::Group && matches!(p.matching, Match::Not(_)))
        })
        .into_context();
    let parent = initiative("I1", "G1");

    let stats = Associations::default()
        .get_stats(&parent, EntityType::Project, &ctx)
        .await
        .unwrap();

    assert_eq!(stats.associated, 2);
    assert_eq!(stats.pending, 2);
    assert_eq!(stats.requesting, 0);
    assert_eq!(stats.degraded, vec![RelationshipView::Requesting]);
    assert_eq!(stub.count(is_execute), 3);
}

#[tokio::test]
async fn test_unprovisioned_parent_counts_zero_without_search() {
    let (stub, ctx) = StubServices::new().with_search_total(9).into_context();
    let parent = unprovisioned_initiative("I1");

    let stats = Associations::default()
        .get_stats(&parent, EntityType::Project, &ctx)
        .await
        .unwrap();

    assert_eq!(stats.own_half, OwnHalf::Included(0));
    assert!(stats.degraded.is_empty());
    assert!(stub.calls().is_empty());
}

#[tokio::test]
async fn test_child_stats_skip_empty_views() {
    let parent = initiative("I1", "G1");
    let memberships = Memberships {
        member: vec![association_group(&parent, "G1")],
        ..Memberships::default()
    };
    let (stub, ctx) = StubServices::new()
        .with_memberships(memberships)
        .with_search_total(1)
        .into_context();
    let child = project("C1").with_tags(["ref|initiative|I1", "ref|initiative|I2"]);

    let stats = Associations::default()
        .get_stats(&child, EntityType::Initiative, &ctx)
        .await
        .unwrap();

    // associated = {I1}, pending = {I2}, requesting = {} (not executed)
    assert_eq!(stats.associated, 1);
    assert_eq!(stats.pending, 1);
    assert_eq!(stats.requesting, 0);
    assert_eq!(stats.own_half, OwnHalf::Referenced(2));
    assert_eq!(stub.count(|c| matches!(c, Call::ListMemberships { .. })), 1);
    assert_eq!(stub.count(is_execute), 2);
}

#[tokio::test]
async fn test_construction_failure_zeroes_by_default() {
    let (stub, ctx) = StubServices::new()
        .failing_memberships(ServiceError::Unavailable("groups offline".to_string()))
        .with_search_total(5)
        .into_context();
    let child = project("C1").with_tags(["ref|initiative|I1"]);

    let stats = Associations::default()
        .get_stats(&child, EntityType::Initiative, &ctx)
        .await
        .unwrap();

    assert_eq!(stats.associated + stats.pending + stats.requesting, 0);
    assert_eq!(stats.own_half, OwnHalf::Referenced(0));
    assert_eq!(stats.degraded.len(), 3);
    assert_eq!(stub.count(is_execute), 0);
}

#[tokio::test]
async fn test_construction_failure_surfaces_under_error_policy() {
    let (_stub, ctx) = StubServices::new()
        .failing_memberships(ServiceError::Unavailable("groups offline".to_string()))
        .into_context();
    let child = project("C1");
    let engine = Associations::default().with_stats_policy(StatsFailurePolicy::Error);

    let err = engine
        .get_stats(&child, EntityType::Initiative, &ctx)
        .await
        .unwrap_err();
    assert!(matches!(err, AssociationError::Memberships { .. }));
    assert!(err.to_string().contains("C1"));
}

#[tokio::test]
async fn test_try_get_stats_ignores_zero_policy() {
    let (_stub, ctx) = StubServices::new()
        .failing_memberships(ServiceError::Unavailable("groups offline".to_string()))
        .into_context();
    let child = project("C1");

    let result = Associations::default()
        .try_get_stats(&child, EntityType::Initiative, &ctx)
        .await;
    assert!(matches!(result, Err(AssociationError::Memberships { .. })));
}

#[tokio::test]
async fn test_unsupported_pair_makes_no_calls() {
    let (stub, ctx) = StubServices::new().into_context();

    let err = Associations::default()
        .get_stats(&project("C1"), EntityType::Project, &ctx)
        .await
        .unwrap_err();
    assert!(matches!(err, AssociationError::UnsupportedAssociation { .. }));

    let err = Associations::default()
        .get_stats(&initiative("I1", "G1"), EntityType::Template, &ctx)
        .await
        .unwrap_err();
    assert!(matches!(err, AssociationError::Configuration { .. }));

    assert!(stub.calls().is_empty());
}
