//! Event Bus
//!
//! Hybrid dispatcher with a local plane (in-process handler registry keyed
//! by wildcard, event type, or aggregate) and a distributed plane (bridges
//! the store's insertion stream across instances). Every publish path
//! records the event id in the bounded processed-set first; the
//! distributed receiver checks it to drop duplicates.

mod distributed;
mod error;
mod history;
mod processed_set;

pub use distributed::{DistributedBridge, PgNotifyBridge};
pub use error::BusError;
pub use history::HistoryRing;
pub use processed_set::ProcessedSet;

use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, RwLock};
use tokio::sync::Notify;
use uuid::Uuid;

use crate::domain::{Emitter, EventEnvelope, EventPayload, EventType, RiskSeverity};
use crate::event_store::EventStore;

/// Queue depth per subscription before the bus starts dropping the oldest
/// queued event for that subscriber.
pub const SUBSCRIBER_QUEUE_CAPACITY: usize = 1024;

#[async_trait]
pub trait BusHandler: Send + Sync {
    async fn handle(&self, event: &EventEnvelope) -> Result<(), BusError>;
    fn name(&self) -> &str;
}

#[derive(Clone)]
pub enum SubscriptionFilter {
    Wildcard,
    EventType(EventType),
    Aggregate(String, Uuid),
}

impl SubscriptionFilter {
    fn matches(&self, event: &EventEnvelope) -> bool {
        match self {
            SubscriptionFilter::Wildcard => true,
            SubscriptionFilter::EventType(t) => *t == event.event_type,
            SubscriptionFilter::Aggregate(agg_type, agg_id) => {
                *agg_type == event.aggregate_type && *agg_id == event.aggregate_id
            }
        }
    }
}

/// Bounded per-subscription queue. On overflow the oldest queued event is
/// dropped and the drop counter is incremented; the bus surfaces that as a
/// `RISK_DETECTED` event rather than blocking the publisher.
struct SubscriberQueue {
    capacity: usize,
    inner: Mutex<VecDeque<EventEnvelope>>,
    notify: Notify,
    dropped: AtomicU64,
}

impl SubscriberQueue {
    fn new(capacity: usize) -> Self {
        Self {
            capacity,
            inner: Mutex::new(VecDeque::with_capacity(capacity)),
            notify: Notify::new(),
            dropped: AtomicU64::new(0),
        }
    }

    /// Returns `true` if the oldest event had to be dropped to make room.
    fn push(&self, event: EventEnvelope) -> bool {
        let mut overflowed = false;
        {
            let mut queue = self.inner.lock().expect("subscriber queue lock poisoned");
            if queue.len() >= self.capacity {
                queue.pop_front();
                overflowed = true;
                self.dropped.fetch_add(1, Ordering::Relaxed);
            }
            queue.push_back(event);
        }
        self.notify.notify_one();
        overflowed
    }

    async fn pop(&self) -> EventEnvelope {
        loop {
            {
                let mut queue = self.inner.lock().expect("subscriber queue lock poisoned");
                if let Some(event) = queue.pop_front() {
                    return event;
                }
            }
            self.notify.notified().await;
        }
    }
}

struct Subscription {
    id: Uuid,
    filter: SubscriptionFilter,
    queue: Arc<SubscriberQueue>,
    handler_name: String,
}

/// In-process pub/sub fan-out plus the cross-instance bridge hook.
pub struct EventBus {
    subscriptions: RwLock<Vec<Subscription>>,
    processed: ProcessedSet,
    history: HistoryRing,
    store: EventStore,
}

pub type SharedBus = Arc<EventBus>;

impl EventBus {
    pub fn new(store: EventStore, history_size: usize, processed_capacity: usize) -> SharedBus {
        Arc::new(Self {
            subscriptions: RwLock::new(Vec::new()),
            processed: ProcessedSet::new(processed_capacity),
            history: HistoryRing::new(history_size),
            store,
        })
    }

    fn subscribe_with_filter(
        self: &Arc<Self>,
        filter: SubscriptionFilter,
        handler: Arc<dyn BusHandler>,
    ) -> Uuid {
        let id = Uuid::new_v4();
        let queue = Arc::new(SubscriberQueue::new(SUBSCRIBER_QUEUE_CAPACITY));
        let handler_name = handler.name().to_string();

        self.subscriptions.write().expect("subscriptions lock poisoned").push(Subscription {
            id,
            filter,
            queue: queue.clone(),
            handler_name: handler_name.clone(),
        });

        let bus = Arc::downgrade(self);
        tokio::spawn(async move {
            loop {
                let event = queue.pop().await;
                let handler = handler.clone();
                let event_for_handler = event.clone();

                // Run the handler in its own task so a panic can't kill this
                // subscription's dispatch loop; we still await it so this
                // subscriber observes events strictly in publish order.
                let outcome = tokio::spawn(async move { handler.handle(&event_for_handler).await })
                    .await;

                let failure_reason = match outcome {
                    Ok(Ok(())) => None,
                    Ok(Err(e)) => Some(e.to_string()),
                    Err(join_err) => Some(format!("handler panicked: {join_err}")),
                };

                if let Some(reason) = failure_reason {
                    tracing::error!(
                        subscription_id = %id,
                        handler = %handler_name,
                        event_id = %event.event_id,
                        reason = %reason,
                        "subscriber handler failed"
                    );
                    if let Some(bus) = bus.upgrade() {
                        bus.emit_system_risk(
                            format!("handler {handler_name} failed on {}: {reason}", event.event_type),
                            RiskSeverity::High,
                        )
                        .await;
                    }
                }
            }
        });

        id
    }

    pub fn subscribe(self: &Arc<Self>, handler: Arc<dyn BusHandler>) -> Uuid {
        self.subscribe_with_filter(SubscriptionFilter::Wildcard, handler)
    }

    pub fn subscribe_type(self: &Arc<Self>, event_type: EventType, handler: Arc<dyn BusHandler>) -> Uuid {
        self.subscribe_with_filter(SubscriptionFilter::EventType(event_type), handler)
    }

    pub fn subscribe_aggregate(
        self: &Arc<Self>,
        aggregate_type: impl Into<String>,
        aggregate_id: Uuid,
        handler: Arc<dyn BusHandler>,
    ) -> Uuid {
        self.subscribe_with_filter(
            SubscriptionFilter::Aggregate(aggregate_type.into(), aggregate_id),
            handler,
        )
    }

    pub fn unsubscribe(&self, id: Uuid) {
        self.subscriptions
            .write()
            .expect("subscriptions lock poisoned")
            .retain(|s| s.id != id);
    }

    /// Dispatch `event` to every matching local subscription. De-duplicates
    /// via the processed-set first: a duplicate delivery (e.g. from the
    /// distributed bridge) invokes no handler.
    pub async fn publish(self: &Arc<Self>, event: EventEnvelope) {
        if !self.processed.record(event.event_id) {
            tracing::debug!(event_id = %event.event_id, "duplicate delivery suppressed");
            return;
        }

        self.history.push(event.clone());

        let mut overflowed: Vec<(Uuid, String, u64)> = Vec::new();
        {
            let subscriptions = self.subscriptions.read().expect("subscriptions lock poisoned");
            for subscription in subscriptions.iter() {
                if subscription.filter.matches(&event) {
                    if subscription.queue.push(event.clone()) {
                        let dropped = subscription.queue.dropped.load(Ordering::Relaxed);
                        tracing::warn!(
                            subscription_id = %subscription.id,
                            handler = %subscription.handler_name,
                            dropped_total = dropped,
                            "subscriber queue overflow, dropped oldest queued event"
                        );
                        overflowed.push((subscription.id, subscription.handler_name.clone(), dropped));
                    }
                }
            }
        }

        // Emitted outside the read-lock scope above so emit_system_risk's own
        // append+publish can't deadlock against it.
        for (subscription_id, handler_name, dropped_total) in overflowed {
            self.emit_system_risk(
                format!(
                    "subscriber queue overflow on {handler_name} (subscription {subscription_id}): \
                     {dropped_total} event(s) dropped for this subscriber"
                ),
                RiskSeverity::Medium,
            )
            .await;
        }
    }

    pub fn history(&self) -> Vec<EventEnvelope> {
        self.history.snapshot()
    }

    pub fn processed_count(&self) -> usize {
        self.processed.len()
    }

    pub fn subscription_count(&self) -> usize {
        self.subscriptions.read().expect("subscriptions lock poisoned").len()
    }

    /// Append and publish a system-authored `RISK_DETECTED` event, used for
    /// handler failures and queue overflow. Goes through the store like any
    /// other emission so the causal chain stays serialised.
    async fn emit_system_risk(self: &Arc<Self>, reason: String, severity: RiskSeverity) {
        let envelope = EventEnvelope::new(
            "system",
            Uuid::nil(),
            EventPayload::RiskDetected {
                severity,
                reason,
                source: Some("event_bus".to_string()),
            },
            Emitter::System,
            1.0,
            severity == RiskSeverity::Critical,
        );

        match self.store.append(envelope).await {
            Ok(stored) => self.publish(stored).await,
            Err(e) => tracing::error!(error = %e, "failed to append system RISK_DETECTED event"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::EventPayload;
    use std::sync::atomic::AtomicUsize;

    fn sample(event_type_payload: EventPayload) -> EventEnvelope {
        EventEnvelope::new(
            "lead",
            Uuid::new_v4(),
            event_type_payload,
            Emitter::System,
            0.9,
            false,
        )
    }

    #[test]
    fn wildcard_filter_matches_everything() {
        let event = sample(EventPayload::TaskCreated {
            task_id: Uuid::new_v4(),
            title: "t".into(),
        });
        assert!(SubscriptionFilter::Wildcard.matches(&event));
    }

    #[test]
    fn event_type_filter_is_selective() {
        let event = sample(EventPayload::TaskCreated {
            task_id: Uuid::new_v4(),
            title: "t".into(),
        });
        assert!(SubscriptionFilter::EventType(EventType::TaskCreated).matches(&event));
        assert!(!SubscriptionFilter::EventType(EventType::LeadReceived).matches(&event));
    }

    #[test]
    fn aggregate_filter_matches_type_and_id() {
        let aggregate_id = Uuid::new_v4();
        let mut event = sample(EventPayload::TaskCreated {
            task_id: Uuid::new_v4(),
            title: "t".into(),
        });
        event.aggregate_type = "lead".into();
        event.aggregate_id = aggregate_id;

        assert!(SubscriptionFilter::Aggregate("lead".into(), aggregate_id).matches(&event));
        assert!(!SubscriptionFilter::Aggregate("lead".into(), Uuid::new_v4()).matches(&event));
    }

    #[tokio::test]
    async fn subscriber_queue_drops_oldest_on_overflow() {
        let queue = SubscriberQueue::new(2);
        let e1 = sample(EventPayload::TaskCreated { task_id: Uuid::new_v4(), title: "a".into() });
        let e2 = sample(EventPayload::TaskCreated { task_id: Uuid::new_v4(), title: "b".into() });
        let e3 = sample(EventPayload::TaskCreated { task_id: Uuid::new_v4(), title: "c".into() });

        assert!(!queue.push(e1));
        assert!(!queue.push(e2));
        assert!(queue.push(e3.clone()));

        let first = queue.pop().await;
        assert_eq!(first.event_id, e2.event_id);
        let second = queue.pop().await;
        assert_eq!(second.event_id, e3.event_id);
    }

    struct CountingHandler {
        count: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl BusHandler for CountingHandler {
        async fn handle(&self, _event: &EventEnvelope) -> Result<(), BusError> {
            self.count.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }

        fn name(&self) -> &str {
            "counting_handler"
        }
    }

    struct FailingHandler;

    #[async_trait]
    impl BusHandler for FailingHandler {
        async fn handle(&self, _event: &EventEnvelope) -> Result<(), BusError> {
            Err(BusError::Handler("boom".into()))
        }

        fn name(&self) -> &str {
            "failing_handler"
        }
    }
}
