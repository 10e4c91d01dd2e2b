//! Abuse-signal heuristics surfaced to reviewers alongside a report.
//!
//! Each flag is a threshold over a sliding window; thresholds and window
//! lengths come from configuration and are not structural to the state
//! machine.

use chrono::{Duration, Utc};
use std::sync::Arc;

use crate::config::Config;
use crate::error::Result;
use crate::models::{PatternFlags, Report};
use crate::repository::{EventDirectory, ReportRepository};

pub struct PatternDetector {
    repo: Arc<dyn ReportRepository>,
    events: Arc<dyn EventDirectory>,
    config: Arc<Config>,
}

impl PatternDetector {
    pub fn new(
        repo: Arc<dyn ReportRepository>,
        events: Arc<dyn EventDirectory>,
        config: Arc<Config>,
    ) -> Self {
        Self {
            repo,
            events,
            config,
        }
    }

    pub async fn flags_for(&self, report: &Report) -> Result<PatternFlags> {
        let now = Utc::now();
        let window_start = now - Duration::hours(self.config.pattern_window_hours);

        // Same reporter hitting many distinct events in a short window.
        let (report_count, event_count) = self
            .repo
            .reporter_activity_since(&report.fingerprint, window_start)
            .await?;
        let has_source_flooding_pattern = report_count
            >= self.config.source_flooding_min_reports
            && event_count >= self.config.source_flooding_min_events;

        // Many distinct reporters converging on one event.
        let reporter_count = self
            .repo
            .distinct_reporters_for_event_since(report.event_id, window_start)
            .await?;
        let has_event_targeting_pattern =
            reporter_count >= self.config.event_targeting_min_reporters;

        // Reports spread across occurrences of the same recurring series.
        let has_instance_pattern = match self.events.get_event(report.event_id).await? {
            Some(event_ref) => match event_ref.series_id {
                Some(series_id) => {
                    let siblings = self.events.events_in_series(series_id).await?;
                    let series_window =
                        now - Duration::hours(self.config.instance_pattern_window_hours);
                    let reported = self
                        .repo
                        .distinct_reported_events_since(&siblings, series_window)
                        .await?;
                    reported >= self.config.instance_pattern_min_events
                }
                None => false,
            },
            None => false,
        };

        Ok(PatternFlags {
            has_source_flooding_pattern,
            has_event_targeting_pattern,
            has_instance_pattern,
        })
    }
}
