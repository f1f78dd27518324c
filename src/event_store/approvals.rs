//! Approval Queue
//!
//! Pending approvals materialised by escalation (§4.5). An approval row is
//! created exactly once per escalating event and resolved exactly once.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use uuid::Uuid;

use super::EventStoreError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApprovalStatus {
    Pending,
    Approved,
    Rejected,
    Timeout,
}

impl ApprovalStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ApprovalStatus::Pending => "pending",
            ApprovalStatus::Approved => "approved",
            ApprovalStatus::Rejected => "rejected",
            ApprovalStatus::Timeout => "timeout",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Decision {
    Approved,
    Rejected,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Approval {
    pub approval_id: Uuid,
    pub event_id: Uuid,
    pub agent_id: String,
    pub decision_context: serde_json::Value,
    pub recommended_action: String,
    pub confidence: f64,
    pub status: ApprovalStatus,
    pub timeout_at: DateTime<Utc>,
    pub resolved_by: Option<String>,
    pub resolution_notes: Option<String>,
    pub resolved_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

/// Persistence for the approval queue, backed by the same pool as the event store.
#[derive(Debug, Clone)]
pub struct ApprovalStore {
    pool: PgPool,
}

impl ApprovalStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn create(
        &self,
        event_id: Uuid,
        agent_id: &str,
        decision_context: serde_json::Value,
        recommended_action: &str,
        confidence: f64,
        timeout_at: DateTime<Utc>,
    ) -> Result<Approval, EventStoreError> {
        let approval_id = Uuid::new_v4();
        let now = Utc::now();

        sqlx::query(
            r#"
            INSERT INTO approvals (
                approval_id, event_id, agent_id, decision_context, recommended_action,
                confidence, status, timeout_at, created_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, 'pending', $7, $8)
            "#,
        )
        .bind(approval_id)
        .bind(event_id)
        .bind(agent_id)
        .bind(&decision_context)
        .bind(recommended_action)
        .bind(confidence)
        .bind(timeout_at)
        .bind(now)
        .execute(&self.pool)
        .await?;

        Ok(Approval {
            approval_id,
            event_id,
            agent_id: agent_id.to_string(),
            decision_context,
            recommended_action: recommended_action.to_string(),
            confidence,
            status: ApprovalStatus::Pending,
            timeout_at,
            resolved_by: None,
            resolution_notes: None,
            resolved_at: None,
            created_at: now,
        })
    }

    pub async fn list_pending(&self) -> Result<Vec<Approval>, EventStoreError> {
        let rows = sqlx::query_as::<_, ApprovalRow>(
            r#"
            SELECT approval_id, event_id, agent_id, decision_context, recommended_action,
                   confidence, status, timeout_at, resolved_by, resolution_notes, resolved_at, created_at
            FROM approvals
            WHERE status = 'pending'
            ORDER BY created_at ASC
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(Into::into).collect())
    }

    /// General listing for the approval queue endpoint: filters are
    /// conjunctive and optional, matching `EventFilter`'s convention.
    pub async fn list(
        &self,
        status: Option<ApprovalStatus>,
        agent_id: Option<&str>,
        limit: i64,
    ) -> Result<Vec<Approval>, EventStoreError> {
        let mut sql = String::from(
            "SELECT approval_id, event_id, agent_id, decision_context, recommended_action, \
             confidence, status, timeout_at, resolved_by, resolution_notes, resolved_at, created_at \
             FROM approvals WHERE 1=1",
        );
        let mut bind_idx = 1;
        if status.is_some() {
            sql.push_str(&format!(" AND status = ${bind_idx}"));
            bind_idx += 1;
        }
        if agent_id.is_some() {
            sql.push_str(&format!(" AND agent_id = ${bind_idx}"));
            bind_idx += 1;
        }
        sql.push_str(&format!(" ORDER BY created_at DESC LIMIT ${bind_idx}"));

        let mut query = sqlx::query_as::<_, ApprovalRow>(&sql);
        if let Some(s) = status {
            query = query.bind(s.as_str());
        }
        if let Some(a) = agent_id {
            query = query.bind(a);
        }
        query = query.bind(limit);

        let rows = query.fetch_all(&self.pool).await?;
        Ok(rows.into_iter().map(Into::into).collect())
    }

    pub async fn get(&self, approval_id: Uuid) -> Result<Option<Approval>, EventStoreError> {
        let row = sqlx::query_as::<_, ApprovalRow>(
            r#"
            SELECT approval_id, event_id, agent_id, decision_context, recommended_action,
                   confidence, status, timeout_at, resolved_by, resolution_notes, resolved_at, created_at
            FROM approvals WHERE approval_id = $1
            "#,
        )
        .bind(approval_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(Into::into))
    }

    /// Resolve a pending approval. Fails deterministically if already resolved.
    pub async fn resolve(
        &self,
        approval_id: Uuid,
        decision: Decision,
        resolver: &str,
        notes: Option<String>,
    ) -> Result<Approval, EventStoreError> {
        let status = match decision {
            Decision::Approved => ApprovalStatus::Approved,
            Decision::Rejected => ApprovalStatus::Rejected,
        };

        let result = sqlx::query(
            r#"
            UPDATE approvals
            SET status = $2, resolved_by = $3, resolution_notes = $4, resolved_at = NOW()
            WHERE approval_id = $1 AND status = 'pending'
            "#,
        )
        .bind(approval_id)
        .bind(status.as_str())
        .bind(resolver)
        .bind(&notes)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return match self.get(approval_id).await? {
                Some(_) => Err(EventStoreError::ApprovalAlreadyResolved(approval_id)),
                None => Err(EventStoreError::ApprovalNotFound(approval_id)),
            };
        }

        self.get(approval_id)
            .await?
            .ok_or(EventStoreError::ApprovalNotFound(approval_id))
    }

    /// Transition every pending approval past its deadline to `timeout`.
    /// Returns the approvals that were transitioned, for the caller to emit
    /// a terminal event per row.
    pub async fn sweep_timeouts(&self) -> Result<Vec<Approval>, EventStoreError> {
        let rows = sqlx::query_as::<_, ApprovalRow>(
            r#"
            UPDATE approvals
            SET status = 'timeout', resolved_at = NOW()
            WHERE status = 'pending' AND timeout_at < NOW()
            RETURNING approval_id, event_id, agent_id, decision_context, recommended_action,
                      confidence, status, timeout_at, resolved_by, resolution_notes, resolved_at, created_at
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(Into::into).collect())
    }
}

#[derive(sqlx::FromRow)]
struct ApprovalRow {
    approval_id: Uuid,
    event_id: Uuid,
    agent_id: String,
    decision_context: serde_json::Value,
    recommended_action: String,
    confidence: f64,
    status: String,
    timeout_at: DateTime<Utc>,
    resolved_by: Option<String>,
    resolution_notes: Option<String>,
    resolved_at: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
}

impl From<ApprovalRow> for Approval {
    fn from(row: ApprovalRow) -> Self {
        let status = match row.status.as_str() {
            "pending" => ApprovalStatus::Pending,
            "approved" => ApprovalStatus::Approved,
            "rejected" => ApprovalStatus::Rejected,
            "timeout" => ApprovalStatus::Timeout,
            other => panic!("unknown approval status in storage: {other}"),
        };

        Approval {
            approval_id: row.approval_id,
            event_id: row.event_id,
            agent_id: row.agent_id,
            decision_context: row.decision_context,
            recommended_action: row.recommended_action,
            confidence: row.confidence,
            status,
            timeout_at: row.timeout_at,
            resolved_by: row.resolved_by,
            resolution_notes: row.resolution_notes,
            resolved_at: row.resolved_at,
            created_at: row.created_at,
        }
    }
}
