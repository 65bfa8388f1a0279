//! Relationship statistics.
//!
//! Builds the Associated, Pending and Requesting views of an entity, runs
//! them concurrently against the search engine and tallies the totals.
//!
//! A single failed execution degrades only its own count to zero and is
//! listed in [`AssociationStats::degraded`]. Failure to build the queries at
//! all is handled by the configured [`StatsFailurePolicy`]: `zero` returns an
//! all-zero result (marked fully degraded), `error` propagates.

use serde::Serialize;
use tether_config::StatsFailurePolicy;
use tracing::{debug, warn};

use crate::engine::Associations;
use crate::entity::{Entity, EntityType};
use crate::error::AssociationError;
use crate::hierarchy::Perspective;
use crate::query::{QueryStrategy, RelationshipQuery, RelationshipView};
use crate::services::ServiceContext;

const COUNTED_VIEWS: [RelationshipView; 3] = [
    RelationshipView::Associated,
    RelationshipView::Pending,
    RelationshipView::Requesting,
];

/// The perspective-dependent total of everything on this side's half.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum OwnHalf {
    /// Parent: targets admitted into its association group.
    Included(u64),
    /// Child: parents claimed by its reference tags.
    Referenced(u64),
}

impl OwnHalf {
    fn for_perspective(perspective: Perspective, count: u64) -> Self {
        match perspective {
            Perspective::Parent => OwnHalf::Included(count),
            Perspective::Child => OwnHalf::Referenced(count),
        }
    }

    pub fn count(&self) -> u64 {
        match self {
            OwnHalf::Included(n) | OwnHalf::Referenced(n) => *n,
        }
    }
}

/// Relationship counts for one entity against one association type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AssociationStats {
    pub associated: u64,
    pub pending: u64,
    pub requesting: u64,
    #[serde(flatten)]
    pub own_half: OwnHalf,
    /// Views whose count could not be computed and reads as zero.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub degraded: Vec<RelationshipView>,
}

impl AssociationStats {
    /// All counts zero, nothing degraded.
    pub fn zeroed(perspective: Perspective) -> Self {
        Self {
            associated: 0,
            pending: 0,
            requesting: 0,
            own_half: OwnHalf::for_perspective(perspective, 0),
            degraded: Vec::new(),
        }
    }

    /// All counts zero because none could be computed.
    pub fn unavailable(perspective: Perspective) -> Self {
        Self {
            degraded: COUNTED_VIEWS.to_vec(),
            ..Self::zeroed(perspective)
        }
    }

    pub fn is_degraded(&self) -> bool {
        !self.degraded.is_empty()
    }
}

impl Associations {
    /// Counts for `entity` against `association_type`, applying the
    /// configured failure policy.
    ///
    /// Unsupported or unregistered pairs always fail, before any call.
    pub async fn get_stats(
        &self,
        entity: &Entity,
        association_type: EntityType,
        ctx: &ServiceContext,
    ) -> Result<AssociationStats, AssociationError> {
        let perspective = self.perspective(entity, association_type)?;
        match self.collect_stats(entity, association_type, perspective, ctx).await {
            Ok(stats) => Ok(stats),
            Err(e) if self.stats_policy == StatsFailurePolicy::Zero => {
                warn!(
                    entity_type = %entity.entity_type,
                    entity_id = %entity.id,
                    association_type = %association_type,
                    error = %e,
                    "Stats unavailable, reporting zero"
                );
                Ok(AssociationStats::unavailable(perspective))
            }
            Err(e) => Err(e),
        }
    }

    /// Counts for `entity`, surfacing query construction failures regardless
    /// of the configured policy.
    pub async fn try_get_stats(
        &self,
        entity: &Entity,
        association_type: EntityType,
        ctx: &ServiceContext,
    ) -> Result<AssociationStats, AssociationError> {
        let perspective = self.perspective(entity, association_type)?;
        self.collect_stats(entity, association_type, perspective, ctx)
            .await
    }

    async fn collect_stats(
        &self,
        entity: &Entity,
        association_type: EntityType,
        perspective: Perspective,
        ctx: &ServiceContext,
    ) -> Result<AssociationStats, AssociationError> {
        let queries = QueryStrategy::for_perspective(perspective)
            .build_many(entity, association_type, &COUNTED_VIEWS, ctx)
            .await?;
        let mut queries = queries.into_iter();
        let associated = queries.next().flatten();
        let pending = queries.next().flatten();
        let requesting = queries.next().flatten();

        let (associated, pending, requesting) = tokio::join!(
            count(associated.as_ref(), ctx),
            count(pending.as_ref(), ctx),
            count(requesting.as_ref(), ctx),
        );

        let mut stats = AssociationStats::zeroed(perspective);
        for (view, result) in COUNTED_VIEWS.into_iter().zip([associated, pending, requesting]) {
            let total = match result {
                Some(total) => total,
                None => {
                    stats.degraded.push(view);
                    0
                }
            };
            match view {
                RelationshipView::Associated => stats.associated = total,
                RelationshipView::Pending => stats.pending = total,
                RelationshipView::Requesting => stats.requesting = total,
                RelationshipView::AvailableToRequest => {}
            }
        }
        stats.own_half = OwnHalf::for_perspective(perspective, stats.associated + stats.pending);

        debug!(
            entity_id = %entity.id,
            association_type = %association_type,
            associated = stats.associated,
            pending = stats.pending,
            requesting = stats.requesting,
            degraded = stats.degraded.len(),
            "Computed association stats"
        );
        Ok(stats)
    }
}

/// Total for one query; `None` when execution failed. An absent query
/// matches nothing and is not executed.
async fn count(query: Option<&RelationshipQuery>, ctx: &ServiceContext) -> Option<u64> {
    let query = match query {
        Some(query) => query,
        None => return Some(0),
    };
    match ctx.search.execute(query).await {
        Ok(response) => Some(response.total),
        Err(e) => {
            warn!(error = %e, "Relationship query failed, counting as zero");
            None
        }
    }
}
