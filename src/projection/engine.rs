//! Projection Engine
//!
//! Generic over a `Projection`'s state type. Builds state by folding stored
//! events, then stays current via a live bus subscription. State is a
//! rebuildable cache, never authoritative — the store is.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use uuid::Uuid;

use crate::bus::{BusError, BusHandler, SharedBus};
use crate::domain::{EventEnvelope, EventType};
use crate::event_store::{EventFilter, EventStore, EventStoreError};

pub trait Projection: Send + Sync + 'static {
    type State: Clone + Send + Sync + Default;

    fn name(&self) -> &'static str;
    fn subscribed_types(&self) -> Vec<EventType>;

    /// Pure fold: given the prior state for an aggregate and a new event,
    /// return the next state. Never mutates `event` or performs I/O.
    fn apply(&self, event: &EventEnvelope, state: Self::State) -> Self::State;
}

pub struct ProjectionEngine<P: Projection> {
    projection: Arc<P>,
    store: EventStore,
    bus: SharedBus,
    state: Arc<RwLock<HashMap<Uuid, P::State>>>,
}

impl<P: Projection> ProjectionEngine<P> {
    pub fn new(projection: P, store: EventStore, bus: SharedBus) -> Self {
        Self {
            projection: Arc::new(projection),
            store,
            bus,
            state: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Fold stored history into state, then subscribe to the live bus for
    /// the same event types so the projection stays current.
    pub async fn initialize(&self) -> Result<(), EventStoreError> {
        self.rebuild().await?;

        let handler: Arc<dyn BusHandler> = Arc::new(ProjectionHandlerAdapter {
            projection: self.projection.clone(),
            state: self.state.clone(),
        });

        for event_type in self.projection.subscribed_types() {
            self.bus.subscribe_type(event_type, handler.clone());
        }

        Ok(())
    }

    /// Clear and rerun the fold over stored history.
    pub async fn rebuild(&self) -> Result<(), EventStoreError> {
        let filter = EventFilter {
            limit: i64::MAX,
            ..EventFilter::new().with_event_types(self.projection.subscribed_types())
        };
        let events = self.store.query(&filter).await?;

        let mut next_state: HashMap<Uuid, P::State> = HashMap::new();
        for event in events {
            let entry = next_state.entry(event.aggregate_id).or_default();
            *entry = self.projection.apply(&event, entry.clone());
        }

        *self.state.write().expect("projection state lock poisoned") = next_state;
        Ok(())
    }

    pub fn query_state(&self, aggregate_id: Uuid) -> Option<P::State> {
        self.state
            .read()
            .expect("projection state lock poisoned")
            .get(&aggregate_id)
            .cloned()
    }

    pub fn all(&self) -> HashMap<Uuid, P::State> {
        self.state.read().expect("projection state lock poisoned").clone()
    }

    pub fn name(&self) -> &'static str {
        self.projection.name()
    }
}

struct ProjectionHandlerAdapter<P: Projection> {
    projection: Arc<P>,
    state: Arc<RwLock<HashMap<Uuid, P::State>>>,
}

#[async_trait]
impl<P: Projection> BusHandler for ProjectionHandlerAdapter<P> {
    async fn handle(&self, event: &EventEnvelope) -> Result<(), BusError> {
        let mut state = self.state.write().expect("projection state lock poisoned");
        let entry = state.entry(event.aggregate_id).or_default();
        *entry = self.projection.apply(event, entry.clone());
        Ok(())
    }

    fn name(&self) -> &str {
        self.projection.name()
    }
}
