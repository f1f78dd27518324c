//! Event Store Repository
//!
//! Append-only log with two logical indexes: by aggregate stream (for
//! `stream_aggregate`/replay) and by global sequence (for `query`). Append
//! is the only write path; partial writes are never observable.

use chrono::{DateTime, Utc};
use sqlx::{PgPool, Row};
use std::time::Duration;
use uuid::Uuid;

use crate::domain::{validate, Emitter, EventEnvelope, EventPayload, EventType};

use super::EventStoreError;

/// Filter accepted by `query`. All fields are conjunctive (AND); `None`/empty
/// means "no constraint on this dimension".
#[derive(Debug, Clone, Default)]
pub struct EventFilter {
    pub event_types: Option<Vec<EventType>>,
    pub aggregate_type: Option<String>,
    pub aggregate_id: Option<Uuid>,
    pub correlation_id: Option<Uuid>,
    pub requires_human: Option<bool>,
    pub since: Option<DateTime<Utc>>,
    pub until: Option<DateTime<Utc>>,
    pub limit: i64,
    pub offset: i64,
}

impl EventFilter {
    pub fn new() -> Self {
        Self {
            limit: 100,
            ..Default::default()
        }
    }

    pub fn with_event_types(mut self, types: Vec<EventType>) -> Self {
        self.event_types = Some(types);
        self
    }

    pub fn with_aggregate(mut self, aggregate_type: impl Into<String>, aggregate_id: Uuid) -> Self {
        self.aggregate_type = Some(aggregate_type.into());
        self.aggregate_id = Some(aggregate_id);
        self
    }
}

/// Event Store backed by PostgreSQL.
#[derive(Debug, Clone)]
pub struct EventStore {
    pool: PgPool,
}

impl EventStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Atomically assign the next per-aggregate sequence number and persist
    /// the envelope. Retries a bounded number of times on concurrency
    /// conflict before surfacing `MaxRetriesExceeded`.
    pub async fn append(&self, envelope: EventEnvelope) -> Result<EventEnvelope, EventStoreError> {
        validate(&envelope)?;

        const MAX_RETRIES: u32 = 3;
        for attempt in 0..MAX_RETRIES {
            match self.try_append(envelope.clone()).await {
                Ok(stored) => return Ok(stored),
                Err(EventStoreError::ConcurrencyConflict { .. }) if attempt + 1 < MAX_RETRIES => {
                    let delay = Duration::from_millis(25 * (attempt as u64 + 1));
                    tokio::time::sleep(delay).await;
                    tracing::warn!(
                        aggregate_type = %envelope.aggregate_type,
                        aggregate_id = %envelope.aggregate_id,
                        attempt,
                        "concurrency conflict appending event, retrying"
                    );
                    continue;
                }
                Err(e) => return Err(e),
            }
        }

        Err(EventStoreError::MaxRetriesExceeded)
    }

    async fn try_append(&self, mut envelope: EventEnvelope) -> Result<EventEnvelope, EventStoreError> {
        let mut tx = self.pool.begin().await?;

        let current_max: Option<i64> = sqlx::query_scalar(
            r#"
            SELECT MAX(sequence_number) FROM events
            WHERE aggregate_type = $1 AND aggregate_id = $2
            FOR UPDATE
            "#,
        )
        .bind(&envelope.aggregate_type)
        .bind(envelope.aggregate_id)
        .fetch_one(&mut *tx)
        .await?;

        let next_sequence = current_max.unwrap_or(0) + 1;
        envelope.sequence_number = next_sequence;
        envelope.created_at = Some(Utc::now());

        let payload_json = serde_json::to_value(&envelope.payload)?;
        let metadata_json = serde_json::to_value(&envelope.metadata)?;
        let emitted_by_json = serde_json::to_value(&envelope.emitted_by)?;

        let result = sqlx::query(
            r#"
            INSERT INTO events (
                event_id, event_type, aggregate_type, aggregate_id, sequence_number,
                correlation_id, causation_id, payload, metadata, emitted_by,
                confidence, requires_human, timestamp, created_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14)
            "#,
        )
        .bind(envelope.event_id)
        .bind(envelope.event_type.as_str())
        .bind(&envelope.aggregate_type)
        .bind(envelope.aggregate_id)
        .bind(envelope.sequence_number)
        .bind(envelope.correlation_id)
        .bind(envelope.causation_id)
        .bind(&payload_json)
        .bind(&metadata_json)
        .bind(&emitted_by_json)
        .bind(envelope.confidence)
        .bind(envelope.requires_human)
        .bind(envelope.timestamp)
        .bind(envelope.created_at)
        .execute(&mut *tx)
        .await;

        match result {
            Ok(_) => {
                tx.commit().await?;
                Ok(envelope)
            }
            Err(sqlx::Error::Database(db_err)) if db_err.is_unique_violation() => {
                Err(EventStoreError::ConcurrencyConflict {
                    aggregate_type: envelope.aggregate_type,
                    aggregate_id: envelope.aggregate_id,
                    expected: next_sequence,
                    actual: current_max.unwrap_or(0),
                })
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Events matching `filter`, ordered by global sequence (insertion order) ascending.
    pub async fn query(&self, filter: &EventFilter) -> Result<Vec<EventEnvelope>, EventStoreError> {
        let mut sql = String::from(
            "SELECT event_id, event_type, aggregate_type, aggregate_id, sequence_number, \
             correlation_id, causation_id, payload, metadata, emitted_by, confidence, \
             requires_human, timestamp, created_at FROM events WHERE 1=1",
        );
        let mut bind_idx = 1;
        let mut conditions = Vec::new();

        if filter.aggregate_type.is_some() {
            conditions.push(format!(" AND aggregate_type = ${bind_idx}"));
            bind_idx += 1;
        }
        if filter.aggregate_id.is_some() {
            conditions.push(format!(" AND aggregate_id = ${bind_idx}"));
            bind_idx += 1;
        }
        if filter.correlation_id.is_some() {
            conditions.push(format!(" AND correlation_id = ${bind_idx}"));
            bind_idx += 1;
        }
        if filter.requires_human.is_some() {
            conditions.push(format!(" AND requires_human = ${bind_idx}"));
            bind_idx += 1;
        }
        if filter.since.is_some() {
            conditions.push(format!(" AND timestamp >= ${bind_idx}"));
            bind_idx += 1;
        }
        if filter.until.is_some() {
            conditions.push(format!(" AND timestamp <= ${bind_idx}"));
            bind_idx += 1;
        }
        if let Some(types) = &filter.event_types {
            if !types.is_empty() {
                conditions.push(format!(" AND event_type = ANY(${bind_idx})"));
                bind_idx += 1;
            }
        }

        sql.push_str(&conditions.join(""));
        sql.push_str(&format!(
            " ORDER BY created_at ASC, sequence_number ASC LIMIT ${bind_idx} OFFSET ${}",
            bind_idx + 1
        ));

        let mut query = sqlx::query(&sql);
        if let Some(v) = &filter.aggregate_type {
            query = query.bind(v);
        }
        if let Some(v) = filter.aggregate_id {
            query = query.bind(v);
        }
        if let Some(v) = filter.correlation_id {
            query = query.bind(v);
        }
        if let Some(v) = filter.requires_human {
            query = query.bind(v);
        }
        if let Some(v) = filter.since {
            query = query.bind(v);
        }
        if let Some(v) = filter.until {
            query = query.bind(v);
        }
        if let Some(types) = &filter.event_types {
            if !types.is_empty() {
                let as_strs: Vec<&str> = types.iter().map(|t| t.as_str()).collect();
                query = query.bind(as_strs);
            }
        }
        let query = query.bind(filter.limit).bind(filter.offset);

        let rows = query.fetch_all(&self.pool).await?;
        rows.into_iter().map(row_to_envelope).collect()
    }

    /// Fetch a single event by id, used by the distributed bridge after a
    /// `LISTEN`/`NOTIFY` wakeup.
    pub async fn get_by_id(&self, event_id: Uuid) -> Result<Option<EventEnvelope>, EventStoreError> {
        let row = sqlx::query(
            r#"
            SELECT event_id, event_type, aggregate_type, aggregate_id, sequence_number,
                   correlation_id, causation_id, payload, metadata, emitted_by, confidence,
                   requires_human, timestamp, created_at
            FROM events
            WHERE event_id = $1
            "#,
        )
        .bind(event_id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(row_to_envelope).transpose()
    }

    /// Full ordered history of one aggregate stream from `from_sequence` exclusive.
    pub async fn stream_aggregate(
        &self,
        aggregate_type: &str,
        aggregate_id: Uuid,
        from_sequence: i64,
    ) -> Result<Vec<EventEnvelope>, EventStoreError> {
        let rows = sqlx::query(
            r#"
            SELECT event_id, event_type, aggregate_type, aggregate_id, sequence_number,
                   correlation_id, causation_id, payload, metadata, emitted_by, confidence,
                   requires_human, timestamp, created_at
            FROM events
            WHERE aggregate_type = $1 AND aggregate_id = $2 AND sequence_number > $3
            ORDER BY sequence_number ASC
            "#,
        )
        .bind(aggregate_type)
        .bind(aggregate_id)
        .bind(from_sequence)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(row_to_envelope).collect()
    }

    /// Upsert a snapshot by aggregate; newer sequence wins.
    pub async fn put_snapshot(
        &self,
        aggregate_type: &str,
        aggregate_id: Uuid,
        sequence_number: i64,
        state: &serde_json::Value,
    ) -> Result<(), EventStoreError> {
        sqlx::query(
            r#"
            INSERT INTO snapshots (aggregate_type, aggregate_id, sequence_number, state, created_at)
            VALUES ($1, $2, $3, $4, NOW())
            ON CONFLICT (aggregate_type, aggregate_id) DO UPDATE
            SET sequence_number = EXCLUDED.sequence_number,
                state = EXCLUDED.state,
                created_at = NOW()
            WHERE snapshots.sequence_number < EXCLUDED.sequence_number
            "#,
        )
        .bind(aggregate_type)
        .bind(aggregate_id)
        .bind(sequence_number)
        .bind(state)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    pub async fn get_snapshot(
        &self,
        aggregate_type: &str,
        aggregate_id: Uuid,
    ) -> Result<Option<(i64, serde_json::Value)>, EventStoreError> {
        let row: Option<(i64, serde_json::Value)> = sqlx::query_as(
            r#"
            SELECT sequence_number, state FROM snapshots
            WHERE aggregate_type = $1 AND aggregate_id = $2
            "#,
        )
        .bind(aggregate_type)
        .bind(aggregate_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row)
    }

    /// Raw access for internal callers (e.g. the distributed bridge) that
    /// must hold their own transaction to the same pool.
    pub(crate) fn pool(&self) -> &PgPool {
        &self.pool
    }
}

fn row_to_envelope(row: sqlx::postgres::PgRow) -> Result<EventEnvelope, EventStoreError> {
    let event_type_str: String = row.try_get("event_type")?;
    let event_type = parse_event_type(&event_type_str);

    let payload_json: serde_json::Value = row.try_get("payload")?;
    let payload: EventPayload = serde_json::from_value(payload_json)?;

    let metadata_json: serde_json::Value = row.try_get("metadata")?;
    let metadata = serde_json::from_value(metadata_json)?;

    let emitted_by_json: serde_json::Value = row.try_get("emitted_by")?;
    let emitted_by: Emitter = serde_json::from_value(emitted_by_json)?;

    Ok(EventEnvelope {
        event_id: row.try_get("event_id")?,
        event_type,
        aggregate_type: row.try_get("aggregate_type")?,
        aggregate_id: row.try_get("aggregate_id")?,
        sequence_number: row.try_get("sequence_number")?,
        correlation_id: row.try_get("correlation_id")?,
        causation_id: row.try_get("causation_id")?,
        payload,
        metadata,
        emitted_by,
        confidence: row.try_get("confidence")?,
        requires_human: row.try_get("requires_human")?,
        timestamp: row.try_get("timestamp")?,
        created_at: row.try_get("created_at")?,
    })
}

fn parse_event_type(s: &str) -> EventType {
    // Round-trips through serde's SCREAMING_SNAKE_CASE representation rather
    // than hand-maintaining a second string table.
    serde_json::from_value(serde_json::Value::String(s.to_string()))
        .unwrap_or_else(|_| panic!("unknown event_type in storage: {s}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{EventEnvelope, EventPayload};

    #[test]
    fn event_filter_defaults_to_unbounded_dimensions_limited_page() {
        let filter = EventFilter::new();
        assert!(filter.event_types.is_none());
        assert!(filter.aggregate_type.is_none());
        assert_eq!(filter.limit, 100);
    }

    #[test]
    fn parse_event_type_round_trips() {
        for t in [EventType::LeadReceived, EventType::RiskDetected, EventType::PaymentReceived] {
            assert_eq!(parse_event_type(t.as_str()), t);
        }
    }

    #[test]
    fn with_aggregate_sets_both_fields() {
        let id = Uuid::new_v4();
        let filter = EventFilter::new().with_aggregate("lead", id);
        assert_eq!(filter.aggregate_type.as_deref(), Some("lead"));
        assert_eq!(filter.aggregate_id, Some(id));
    }

    #[test]
    fn envelope_builder_sanity() {
        let envelope = EventEnvelope::new(
            "lead",
            Uuid::new_v4(),
            EventPayload::TaskCreated {
                task_id: Uuid::new_v4(),
                title: "follow up".into(),
            },
            Emitter::System,
            0.8,
            false,
        );
        assert_eq!(envelope.sequence_number, 0);
    }
}
