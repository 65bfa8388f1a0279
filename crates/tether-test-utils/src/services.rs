//! Recording service doubles.
//!
//! [`StubServices`] implements every service trait, records each call in
//! order, and fails on demand. Use it where a test asserts *which* external
//! calls happen; use [`tether_core::MemoryBackend`] where it asserts on state.

use std::sync::{Arc, Mutex};

use tether_core::query::RelationshipQuery;
use tether_core::{
    BoxFuture, Entity, EntityStore, EntityType, GroupMembership, Memberships, SearchEngine,
    SearchResponse, ServiceContext, ServiceError,
};

/// One recorded external call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    Fetch {
        entity_type: EntityType,
        id: String,
    },
    Persist {
        id: String,
        tags: Vec<String>,
    },
    AddMember {
        item_id: String,
        group_id: String,
        owner_hint: String,
    },
    RemoveMember {
        item_id: String,
        group_id: String,
    },
    ListMemberships {
        item_id: String,
    },
    Execute {
        query: RelationshipQuery,
    },
}

type SearchFailure = Box<dyn Fn(&RelationshipQuery) -> bool + Send + Sync>;

/// Recording, failure-injecting implementation of the three service traits.
#[derive(Default)]
pub struct StubServices {
    calls: Mutex<Vec<Call>>,
    entities: Vec<Entity>,
    memberships: Memberships,
    search_total: u64,
    fail_fetch: Option<ServiceError>,
    fail_share: Option<ServiceError>,
    fail_persist: Option<ServiceError>,
    fail_memberships: Option<ServiceError>,
    fail_search: Option<SearchFailure>,
}

impl StubServices {
    pub fn new() -> Self {
        Self::default()
    }

    /// Entity returned by `fetch` for its type and id.
    pub fn with_entity(mut self, entity: Entity) -> Self {
        self.entities.push(entity);
        self
    }

    /// Memberships returned by `list_memberships` for any item.
    pub fn with_memberships(mut self, memberships: Memberships) -> Self {
        self.memberships = memberships;
        self
    }

    /// Total reported by every successful `execute`.
    pub fn with_search_total(mut self, total: u64) -> Self {
        self.search_total = total;
        self
    }

    pub fn failing_fetch(mut self, error: ServiceError) -> Self {
        self.fail_fetch = Some(error);
        self
    }

    /// Fail both `add_member` and `remove_member`.
    pub fn failing_share(mut self, error: ServiceError) -> Self {
        self.fail_share = Some(error);
        self
    }

    pub fn failing_persist(mut self, error: ServiceError) -> Self {
        self.fail_persist = Some(error);
        self
    }

    pub fn failing_memberships(mut self, error: ServiceError) -> Self {
        self.fail_memberships = Some(error);
        self
    }

    /// Fail `execute` for queries matching `predicate`.
    pub fn failing_search_when<F>(mut self, predicate: F) -> Self
    where
        F: Fn(&RelationshipQuery) -> bool + Send + Sync + 'static,
    {
        self.fail_search = Some(Box::new(predicate));
        self
    }

    /// Share the stub and build a context that routes every service to it.
    pub fn into_context(self) -> (Arc<Self>, ServiceContext) {
        let stub = Arc::new(self);
        let ctx = ServiceContext::from_backend(stub.clone());
        (stub, ctx)
    }

    /// Every call so far, in order.
    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().expect("call log poisoned").clone()
    }

    /// Number of calls matching `predicate`.
    pub fn count(&self, predicate: impl Fn(&Call) -> bool) -> usize {
        self.calls().iter().filter(|c| predicate(c)).count()
    }

    fn record(&self, call: Call) {
        tracing::debug!(?call, "Stub service call");
        self.calls.lock().expect("call log poisoned").push(call);
    }
}

fn outcome(failure: &Option<ServiceError>) -> Result<(), ServiceError> {
    match failure {
        Some(error) => Err(error.clone()),
        None => Ok(()),
    }
}

impl EntityStore for StubServices {
    fn fetch(
        &self,
        entity_type: EntityType,
        id: &str,
    ) -> BoxFuture<'_, Result<Entity, ServiceError>> {
        let id = id.to_string();
        Box::pin(async move {
            self.record(Call::Fetch {
                entity_type,
                id: id.clone(),
            });
            outcome(&self.fail_fetch)?;
            Ok(self
                .entities
                .iter()
                .find(|e| e.entity_type == entity_type && e.id == id)
                .cloned()
                .unwrap_or_else(|| Entity::new(entity_type, id)))
        })
    }

    fn persist(
        &self,
        _entity_type: EntityType,
        entity: &Entity,
    ) -> BoxFuture<'_, Result<(), ServiceError>> {
        let call = Call::Persist {
            id: entity.id.clone(),
            tags: entity.tags.clone(),
        };
        Box::pin(async move {
            self.record(call);
            outcome(&self.fail_persist)
        })
    }
}

impl GroupMembership for StubServices {
    fn add_member(
        &self,
        item_id: &str,
        group_id: &str,
        owner_hint: &str,
    ) -> BoxFuture<'_, Result<(), ServiceError>> {
        let call = Call::AddMember {
            item_id: item_id.to_string(),
            group_id: group_id.to_string(),
            owner_hint: owner_hint.to_string(),
        };
        Box::pin(async move {
            self.record(call);
            outcome(&self.fail_share)
        })
    }

    fn remove_member(&self, item_id: &str, group_id: &str)
    -> BoxFuture<'_, Result<(), ServiceError>> {
        let call = Call::RemoveMember {
            item_id: item_id.to_string(),
            group_id: group_id.to_string(),
        };
        Box::pin(async move {
            self.record(call);
            outcome(&self.fail_share)
        })
    }

    fn list_memberships(&self, item_id: &str) -> BoxFuture<'_, Result<Memberships, ServiceError>> {
        let call = Call::ListMemberships {
            item_id: item_id.to_string(),
        };
        Box::pin(async move {
            self.record(call);
            outcome(&self.fail_memberships)?;
            Ok(self.memberships.clone())
        })
    }
}

impl SearchEngine for StubServices {
    fn execute(&self, query: &RelationshipQuery)
    -> BoxFuture<'_, Result<SearchResponse, ServiceError>> {
        let query = query.clone();
        Box::pin(async move {
            let fails = self.fail_search.as_ref().is_some_and(|f| f(&query));
            self.record(Call::Execute { query });
            if fails {
                return Err(ServiceError::Unavailable("search backend down".to_string()));
            }
            Ok(SearchResponse {
                total: self.search_total,
                results: Vec::new(),
            })
        })
    }
}
