//! Read-only derived metrics over historical reports. Admin-only, and the
//! range is validated before any query is issued.

use chrono::{DateTime, NaiveDate, Utc};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use uuid::Uuid;

use crate::error::{ReportError, Result};
use crate::models::ReportStatus;
use crate::repository::ReportRepository;
use crate::services::AuthorizationResolver;

const TOP_EVENTS_LIMIT: usize = 10;

#[derive(Debug, Clone, Serialize)]
pub struct TrendBucket {
    pub date: NaiveDate,
    pub count: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct EventReportCount {
    pub event_id: Uuid,
    pub count: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct ReporterVolume {
    pub fingerprint: String,
    pub count: i64,
}

/// Metrics bundle for one [start, end) range
#[derive(Debug, Clone, Serialize)]
pub struct ReportAnalytics {
    pub total: i64,
    pub status_counts: HashMap<String, i64>,
    pub resolution_rate: f64,
    pub average_resolution_hours: Option<f64>,
    pub daily_trend: Vec<TrendBucket>,
    pub top_reported_events: Vec<EventReportCount>,
    pub reporter_volume: Vec<ReporterVolume>,
}

pub struct AnalyticsAggregator {
    repo: Arc<dyn ReportRepository>,
    authz: Arc<AuthorizationResolver>,
}

impl AnalyticsAggregator {
    pub fn new(repo: Arc<dyn ReportRepository>, authz: Arc<AuthorizationResolver>) -> Self {
        Self { repo, authz }
    }

    pub async fn get_analytics(
        &self,
        actor: Uuid,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<ReportAnalytics> {
        self.authz.require_admin(actor).await?;

        if end <= start {
            return Err(ReportError::Validation(
                "endDate must be after startDate".to_string(),
            ));
        }

        let reports = self.repo.list_created_between(start, end).await?;
        let total = reports.len() as i64;

        let mut status_counts: HashMap<String, i64> = HashMap::new();
        let mut daily: HashMap<NaiveDate, i64> = HashMap::new();
        let mut per_event: HashMap<Uuid, i64> = HashMap::new();
        let mut per_reporter: HashMap<String, i64> = HashMap::new();
        let mut terminal_hours: Vec<f64> = Vec::new();

        for report in &reports {
            *status_counts
                .entry(report.status.as_str().to_string())
                .or_insert(0) += 1;
            *daily.entry(report.created_at.date_naive()).or_insert(0) += 1;
            *per_event.entry(report.event_id).or_insert(0) += 1;
            *per_reporter.entry(report.fingerprint.clone()).or_insert(0) += 1;

            if report.status.is_terminal() {
                // The terminal history row carries the decision timestamp;
                // updated_at drifts on later writes (forward status, override).
                let resolved_at = self
                    .repo
                    .history(report.id)
                    .await?
                    .into_iter()
                    .find(|h| h.to_status.is_terminal())
                    .map(|h| h.created_at)
                    .unwrap_or(report.updated_at);
                let hours = (resolved_at - report.created_at).num_seconds() as f64 / 3600.0;
                terminal_hours.push(hours);
            }
        }

        let terminal = status_counts
            .get(ReportStatus::Resolved.as_str())
            .copied()
            .unwrap_or(0)
            + status_counts
                .get(ReportStatus::Dismissed.as_str())
                .copied()
                .unwrap_or(0);
        let resolution_rate = if total > 0 {
            terminal as f64 / total as f64
        } else {
            0.0
        };

        let average_resolution_hours = if terminal_hours.is_empty() {
            None
        } else {
            Some(terminal_hours.iter().sum::<f64>() / terminal_hours.len() as f64)
        };

        let mut daily_trend: Vec<TrendBucket> = daily
            .into_iter()
            .map(|(date, count)| TrendBucket { date, count })
            .collect();
        daily_trend.sort_by_key(|b| b.date);

        let mut top_reported_events: Vec<EventReportCount> = per_event
            .into_iter()
            .map(|(event_id, count)| EventReportCount { event_id, count })
            .collect();
        top_reported_events.sort_by(|a, b| b.count.cmp(&a.count).then(a.event_id.cmp(&b.event_id)));
        top_reported_events.truncate(TOP_EVENTS_LIMIT);

        let mut reporter_volume: Vec<ReporterVolume> = per_reporter
            .into_iter()
            .map(|(fingerprint, count)| ReporterVolume { fingerprint, count })
            .collect();
        reporter_volume.sort_by(|a, b| {
            b.count
                .cmp(&a.count)
                .then_with(|| a.fingerprint.cmp(&b.fingerprint))
        });

        Ok(ReportAnalytics {
            total,
            status_counts,
            resolution_rate,
            average_resolution_hours,
            daily_trend,
            top_reported_events,
            reporter_volume,
        })
    }
}
