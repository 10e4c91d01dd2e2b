//! In-memory report store for tests and local development.
//!
//! All state sits behind one `RwLock`, so conditional writes observe the same
//! one-winner semantics as the Postgres implementation.

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use std::collections::{HashMap, HashSet};
use tokio::sync::RwLock;
use uuid::Uuid;

use super::ReportRepository;
use crate::error::{ReportError, Result};
use crate::models::{EscalationHistory, ForwardStatus, Report, ReportStatus};

#[derive(Default)]
struct Inner {
    reports: HashMap<Uuid, Report>,
    history: Vec<EscalationHistory>,
    blocked: HashSet<String>,
}

#[derive(Default)]
pub struct MemoryReportRepository {
    inner: RwLock<Inner>,
}

impl MemoryReportRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn block_reporter(&self, fingerprint: &str) {
        self.inner.write().await.blocked.insert(fingerprint.to_string());
    }

    /// Test hook: overwrite a stored report unconditionally.
    pub async fn put(&self, report: Report) {
        self.inner.write().await.reports.insert(report.id, report);
    }
}

#[async_trait]
impl ReportRepository for MemoryReportRepository {
    async fn create(&self, report: &Report) -> Result<()> {
        let mut inner = self.inner.write().await;
        // Duplicate check and insert under the same write lock, matching the
        // partial unique index in the Postgres store.
        if !report.status.is_terminal() {
            let outstanding = inner.reports.values().any(|r| {
                r.fingerprint == report.fingerprint
                    && r.event_id == report.event_id
                    && !r.status.is_terminal()
            });
            if outstanding {
                return Err(ReportError::DuplicateReport);
            }
        }
        inner.reports.insert(report.id, report.clone());
        Ok(())
    }

    async fn find(&self, id: Uuid) -> Result<Option<Report>> {
        Ok(self.inner.read().await.reports.get(&id).cloned())
    }

    async fn find_active_by_fingerprint(
        &self,
        fingerprint: &str,
        event_id: Uuid,
    ) -> Result<Option<Report>> {
        Ok(self
            .inner
            .read()
            .await
            .reports
            .values()
            .find(|r| {
                r.fingerprint == fingerprint && r.event_id == event_id && !r.status.is_terminal()
            })
            .cloned())
    }

    async fn claim_verification_token(
        &self,
        token: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<Report>> {
        let mut inner = self.inner.write().await;
        let claimed = inner.reports.values_mut().find(|r| {
            r.verification_token.as_deref() == Some(token)
                && r.verification_expires_at.is_some_and(|exp| exp > now)
        });
        Ok(claimed.map(|report| {
            report.verification_token = None;
            report.verification_expires_at = None;
            report.updated_at = now;
            report.clone()
        }))
    }

    async fn transition(
        &self,
        report: &Report,
        expected: ReportStatus,
        entry: &EscalationHistory,
    ) -> Result<bool> {
        let mut inner = self.inner.write().await;
        match inner.reports.get(&report.id) {
            Some(stored) if stored.status == expected => {
                inner.reports.insert(report.id, report.clone());
                inner.history.push(entry.clone());
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn mark_reminded(&self, report_id: Uuid, at: DateTime<Utc>) -> Result<bool> {
        let mut inner = self.inner.write().await;
        match inner.reports.get_mut(&report_id) {
            Some(r) if r.status == ReportStatus::Submitted && r.reminded_at.is_none() => {
                r.reminded_at = Some(at);
                r.updated_at = at;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn set_forward_status(&self, report_id: Uuid, status: ForwardStatus) -> Result<()> {
        let mut inner = self.inner.write().await;
        if let Some(r) = inner.reports.get_mut(&report_id) {
            r.forward_status = Some(status);
            r.updated_at = Utc::now();
        }
        Ok(())
    }

    async fn append_history(&self, entry: &EscalationHistory) -> Result<()> {
        self.inner.write().await.history.push(entry.clone());
        Ok(())
    }

    async fn history(&self, report_id: Uuid) -> Result<Vec<EscalationHistory>> {
        let inner = self.inner.read().await;
        let mut rows: Vec<_> = inner
            .history
            .iter()
            .filter(|h| h.report_id == report_id)
            .cloned()
            .collect();
        rows.sort_by_key(|h| h.created_at);
        Ok(rows)
    }

    async fn list_due(&self, now: DateTime<Utc>) -> Result<Vec<Report>> {
        Ok(self
            .inner
            .read()
            .await
            .reports
            .values()
            .filter(|r| {
                r.status == ReportStatus::Submitted && r.deadline.is_some_and(|d| d <= now)
            })
            .cloned()
            .collect())
    }

    async fn list_reminder_due(
        &self,
        now: DateTime<Utc>,
        lead: Duration,
    ) -> Result<Vec<Report>> {
        Ok(self
            .inner
            .read()
            .await
            .reports
            .values()
            .filter(|r| {
                r.status == ReportStatus::Submitted
                    && r.reminded_at.is_none()
                    && r.deadline.is_some_and(|d| d > now && d <= now + lead)
            })
            .cloned()
            .collect())
    }

    async fn is_reporter_blocked(&self, fingerprint: &str) -> Result<bool> {
        Ok(self.inner.read().await.blocked.contains(fingerprint))
    }

    async fn reporter_activity_since(
        &self,
        fingerprint: &str,
        since: DateTime<Utc>,
    ) -> Result<(i64, i64)> {
        let inner = self.inner.read().await;
        let recent: Vec<_> = inner
            .reports
            .values()
            .filter(|r| r.fingerprint == fingerprint && r.created_at > since)
            .collect();
        let events: HashSet<_> = recent.iter().map(|r| r.event_id).collect();
        Ok((recent.len() as i64, events.len() as i64))
    }

    async fn distinct_reporters_for_event_since(
        &self,
        event_id: Uuid,
        since: DateTime<Utc>,
    ) -> Result<i64> {
        let inner = self.inner.read().await;
        let reporters: HashSet<_> = inner
            .reports
            .values()
            .filter(|r| r.event_id == event_id && r.created_at > since)
            .map(|r| r.fingerprint.clone())
            .collect();
        Ok(reporters.len() as i64)
    }

    async fn distinct_reported_events_since(
        &self,
        event_ids: &[Uuid],
        since: DateTime<Utc>,
    ) -> Result<i64> {
        let inner = self.inner.read().await;
        let wanted: HashSet<_> = event_ids.iter().copied().collect();
        let reported: HashSet<_> = inner
            .reports
            .values()
            .filter(|r| wanted.contains(&r.event_id) && r.created_at > since)
            .map(|r| r.event_id)
            .collect();
        Ok(reported.len() as i64)
    }

    async fn list_created_between(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<Report>> {
        let mut reports: Vec<_> = self
            .inner
            .read()
            .await
            .reports
            .values()
            .filter(|r| r.created_at >= start && r.created_at < end)
            .cloned()
            .collect();
        reports.sort_by_key(|r| r.created_at);
        Ok(reports)
    }
}
