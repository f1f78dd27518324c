//! Bus Errors

#[derive(Debug, thiserror::Error)]
pub enum BusError {
    #[error("subscription {0} not found")]
    SubscriptionNotFound(uuid::Uuid),

    #[error("distributed bridge error: {0}")]
    Bridge(String),

    #[error("handler failed: {0}")]
    Handler(String),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}
