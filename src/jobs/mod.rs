//! Scheduled Jobs
//!
//! Background sweeps that replace per-item timers for scale: one periodic
//! scan transitions every timed-out approval (and, by extension, the SOP
//! step it carries in its decision context) rather than scheduling a timer
//! per approval.

use std::sync::Arc;
use std::time::Duration;
use tokio::time::interval;

use crate::bus::SharedBus;
use crate::domain::{Emitter, EventPayload, RiskSeverity};
use crate::event_store::{Approval, ApprovalStore, EventStore};
use crate::sop::SopRegistry;

/// Configuration for the job scheduler.
#[derive(Debug, Clone)]
pub struct JobSchedulerConfig {
    /// Interval between approval/SOP-step timeout sweeps (default: 1 minute).
    pub timeout_sweep_interval: Duration,
}

impl Default for JobSchedulerConfig {
    fn default() -> Self {
        Self {
            timeout_sweep_interval: Duration::from_secs(60),
        }
    }
}

/// Runs periodic maintenance tasks: the approval timeout sweep.
pub struct JobScheduler {
    approvals: ApprovalStore,
    store: EventStore,
    bus: SharedBus,
    sops: Arc<SopRegistry>,
    config: JobSchedulerConfig,
}

impl JobScheduler {
    pub fn new(
        approvals: ApprovalStore,
        store: EventStore,
        bus: SharedBus,
        sops: Arc<SopRegistry>,
    ) -> Self {
        Self {
            approvals,
            store,
            bus,
            sops,
            config: JobSchedulerConfig::default(),
        }
    }

    pub fn with_config(
        approvals: ApprovalStore,
        store: EventStore,
        bus: SharedBus,
        sops: Arc<SopRegistry>,
        config: JobSchedulerConfig,
    ) -> Self {
        Self {
            approvals,
            store,
            bus,
            sops,
            config,
        }
    }

    /// Start the scheduler in the background. The returned handle can be
    /// aborted to stop the loop.
    pub fn start(self) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            self.run().await;
        })
    }

    async fn run(&self) {
        tracing::info!("job scheduler started");
        let mut timeout_interval = interval(self.config.timeout_sweep_interval);

        loop {
            timeout_interval.tick().await;
            match self.sweep_timeouts().await {
                Ok(count) if count > 0 => {
                    tracing::info!(count, "swept timed-out approvals");
                }
                Ok(_) => {}
                Err(e) => tracing::error!(error = %e, "approval timeout sweep failed"),
            }
        }
    }

    /// Transition every approval past its deadline to `timeout`, then emit a
    /// terminal event per row. When the approval carries `sop_id`/`step_id`
    /// in its decision context, the SOP's `step_timeout` escalation rule
    /// (if any) is folded into the emitted event's metadata.
    pub async fn sweep_timeouts(&self) -> Result<usize, crate::event_store::EventStoreError> {
        let timed_out = self.approvals.sweep_timeouts().await?;
        for approval in &timed_out {
            self.emit_timeout_event(approval).await;
        }
        Ok(timed_out.len())
    }

    async fn emit_timeout_event(&self, approval: &Approval) {
        let Some(triggering) = self
            .store
            .get_by_id(approval.event_id)
            .await
            .ok()
            .flatten()
        else {
            tracing::warn!(
                approval_id = %approval.approval_id,
                "triggering event for timed-out approval no longer exists"
            );
            return;
        };

        let mut reason = format!(
            "approval {} timed out unresolved ({})",
            approval.approval_id, approval.recommended_action
        );

        if let (Some(sop_id), Some(step_id)) = (
            approval.decision_context.get("sop_id").and_then(|v| v.as_str()),
            approval.decision_context.get("step_id").and_then(|v| v.as_str()),
        ) {
            let resolution_ctx = crate::sop::ResolutionContext::from_event(&triggering);
            if let Some(sop) = self.sops.resolve(&triggering, &resolution_ctx) {
                if sop.id == sop_id {
                    if let Some(rule) = self.sops.escalation_rule_for(&sop, "step_timeout") {
                        reason = format!(
                            "SOP {sop_id} step {step_id} timed out; escalation action: {}",
                            rule.action
                        );
                    }
                }
            }
        }

        let envelope = crate::domain::EventEnvelope::new(
            triggering.aggregate_type.clone(),
            triggering.aggregate_id,
            EventPayload::RiskDetected {
                severity: RiskSeverity::Medium,
                reason,
                source: Some("approval_timeout_sweep".to_string()),
            },
            Emitter::System,
            1.0,
            true,
        )
        .caused_by(&triggering);

        match self.store.append(envelope).await {
            Ok(stored) => self.bus.publish(stored).await,
            Err(e) => tracing::error!(error = %e, "failed to append timeout RISK_DETECTED event"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_sweep_interval_is_one_minute() {
        assert_eq!(JobSchedulerConfig::default().timeout_sweep_interval, Duration::from_secs(60));
    }
}
