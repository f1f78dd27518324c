//! Distributed plane
//!
//! Bridges the store's insertion stream across instances via Postgres
//! `LISTEN`/`NOTIFY`. Every INSERT into `events` fires `pg_notify('events_channel', event_id)`;
//! this task listens, fetches the full row, and republishes it locally so
//! every instance's handlers observe every event regardless of which
//! instance accepted the original write. The bus's processed-set is the
//! only thing standing between this and double-delivery.

use async_trait::async_trait;
use sqlx::postgres::PgListener;
use uuid::Uuid;

use crate::event_store::EventStore;

use super::{BusError, SharedBus};

pub const NOTIFY_CHANNEL: &str = "events_channel";

#[async_trait]
pub trait DistributedBridge: Send + Sync {
    /// Start listening and forwarding notifications to the local bus.
    /// Returns once the listener connection is established; forwarding
    /// continues on a spawned background task.
    async fn start(&self, bus: SharedBus) -> Result<(), BusError>;
}

/// Postgres `LISTEN`/`NOTIFY`-backed bridge.
pub struct PgNotifyBridge {
    store: EventStore,
}

impl PgNotifyBridge {
    pub fn new(store: EventStore) -> Self {
        Self { store }
    }
}

#[async_trait]
impl DistributedBridge for PgNotifyBridge {
    async fn start(&self, bus: SharedBus) -> Result<(), BusError> {
        let mut listener = PgListener::connect_with(self.store.pool())
            .await
            .map_err(|e| BusError::Bridge(format!("failed to connect listener: {e}")))?;
        listener
            .listen(NOTIFY_CHANNEL)
            .await
            .map_err(|e| BusError::Bridge(format!("failed to listen on {NOTIFY_CHANNEL}: {e}")))?;

        let store = self.store.clone();

        tokio::spawn(async move {
            loop {
                let notification = match listener.recv().await {
                    Ok(n) => n,
                    Err(e) => {
                        tracing::error!(error = %e, "distributed bridge listener error, retrying");
                        tokio::time::sleep(std::time::Duration::from_secs(1)).await;
                        continue;
                    }
                };

                let event_id = match Uuid::parse_str(notification.payload()) {
                    Ok(id) => id,
                    Err(e) => {
                        tracing::error!(error = %e, payload = %notification.payload(), "unparseable notification payload");
                        continue;
                    }
                };

                match store.get_by_id(event_id).await {
                    Ok(Some(event)) => bus.publish(event).await,
                    Ok(None) => tracing::warn!(event_id = %event_id, "notified event not found in store"),
                    Err(e) => tracing::error!(error = %e, event_id = %event_id, "failed to fetch notified event"),
                }
            }
        });

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn notify_channel_name_is_stable() {
        assert_eq!(NOTIFY_CHANNEL, "events_channel");
    }
}
