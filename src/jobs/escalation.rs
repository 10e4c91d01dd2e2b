//! Auto-escalation background job.
//!
//! Runs a pass on a fixed interval: force-escalates Submitted reports past
//! their deadline and sends one reminder per report approaching it. Every
//! per-report action re-checks current status through the lifecycle engine's
//! CAS, so a human decision that lands first always wins.

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::watch;
use tokio::time::sleep;

use crate::config::Config;
use crate::error::Result;
use crate::repository::{NotificationKind, Notifier, ReportRepository};
use crate::services::LifecycleEngine;

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct PassStats {
    pub escalated: u64,
    pub skipped: u64,
    pub reminders: u64,
}

pub struct EscalationScheduler {
    repo: Arc<dyn ReportRepository>,
    engine: Arc<LifecycleEngine>,
    notifier: Arc<dyn Notifier>,
    config: Arc<Config>,
}

impl EscalationScheduler {
    pub fn new(
        repo: Arc<dyn ReportRepository>,
        engine: Arc<LifecycleEngine>,
        notifier: Arc<dyn Notifier>,
        config: Arc<Config>,
    ) -> Self {
        Self {
            repo,
            engine,
            notifier,
            config,
        }
    }

    /// Run until the shutdown signal flips; an in-flight pass always finishes.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        let interval = Duration::from_secs(self.config.scheduler_interval_secs);
        tracing::info!(
            interval_secs = interval.as_secs(),
            "Starting auto-escalation scheduler"
        );

        loop {
            tokio::select! {
                _ = sleep(interval) => {}
                _ = shutdown.changed() => {
                    tracing::info!("Auto-escalation scheduler shutting down");
                    return;
                }
            }

            let pass_start = Instant::now();
            match self.run_pass(Utc::now()).await {
                Ok(stats) => {
                    tracing::info!(
                        escalated = stats.escalated,
                        skipped = stats.skipped,
                        reminders = stats.reminders,
                        duration_ms = pass_start.elapsed().as_millis(),
                        "Escalation pass completed"
                    );
                }
                Err(e) => {
                    tracing::error!(
                        error = %e,
                        duration_ms = pass_start.elapsed().as_millis(),
                        "Escalation pass failed"
                    );
                }
            }
        }
    }

    /// One pass over due work. The due predicate is idempotent, so a missed
    /// or delayed pass self-corrects on the next run.
    pub async fn run_pass(&self, now: DateTime<Utc>) -> Result<PassStats> {
        let mut stats = PassStats::default();

        for report in self.repo.list_due(now).await? {
            match self.engine.system_escalate(report.id).await {
                Ok(Some(_)) => stats.escalated += 1,
                // A human moved the report between query and write.
                Ok(None) => stats.skipped += 1,
                Err(e) => {
                    tracing::warn!(report_id = %report.id, error = %e, "Auto-escalation failed");
                }
            }
        }

        let lead = ChronoDuration::hours(self.config.reminder_before_escalation_hours);
        for report in self.repo.list_reminder_due(now, lead).await? {
            // Remote reports have no calendar to notify; leave the marker
            // untouched so nothing is consumed without a send.
            let recipient = match report.calendar_id {
                Some(calendar_id) => format!("calendar:{}", calendar_id),
                None => continue,
            };
            // Claim the persisted marker before sending: the notification
            // fires at most once even if two passes overlap.
            if !self.repo.mark_reminded(report.id, now).await? {
                continue;
            }
            if let Err(e) = self
                .notifier
                .send(
                    NotificationKind::EscalationReminder,
                    &recipient,
                    serde_json::json!({
                        "report_id": report.id,
                        "event_id": report.event_id,
                        "deadline": report.deadline,
                    }),
                )
                .await
            {
                tracing::warn!(report_id = %report.id, error = %e, "Reminder notification failed");
            }
            stats.reminders += 1;
        }

        Ok(stats)
    }
}
