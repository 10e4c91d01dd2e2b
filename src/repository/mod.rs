//! Storage and collaborator seams.
//!
//! The lifecycle engine, gateway and scheduler operate on the `Report` value
//! type through `ReportRepository`; they never touch a storage row directly.
//! The CAS contract in [`ReportRepository::transition`] is what realizes the
//! one-winner guarantee for concurrent actions on the same report.

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use serde_json::Value;
use uuid::Uuid;

use crate::error::Result;
use crate::models::{EscalationHistory, ForwardStatus, Report, ReportStatus};

pub mod memory;
pub mod postgres;

pub use memory::MemoryReportRepository;
pub use postgres::PgReportRepository;

#[async_trait]
pub trait ReportRepository: Send + Sync {
    async fn create(&self, report: &Report) -> Result<()>;

    async fn find(&self, id: Uuid) -> Result<Option<Report>>;

    /// Non-terminal report for (fingerprint, event), if one is outstanding.
    async fn find_active_by_fingerprint(
        &self,
        fingerprint: &str,
        event_id: Uuid,
    ) -> Result<Option<Report>>;

    /// Atomically claim the report holding this live (unexpired) token,
    /// clearing both token fields. At most one caller ever gets the report.
    async fn claim_verification_token(
        &self,
        token: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<Report>>;

    /// Conditional write: persist `report` and append `entry` only if the
    /// stored status still equals `expected`. Returns false when another
    /// actor moved the report first.
    async fn transition(
        &self,
        report: &Report,
        expected: ReportStatus,
        entry: &EscalationHistory,
    ) -> Result<bool>;

    /// Set the one-shot reminder marker; false if already set or the report
    /// left Submitted.
    async fn mark_reminded(&self, report_id: Uuid, at: DateTime<Utc>) -> Result<bool>;

    async fn set_forward_status(&self, report_id: Uuid, status: ForwardStatus) -> Result<()>;

    /// History row with no status change (federation forward).
    async fn append_history(&self, entry: &EscalationHistory) -> Result<()>;

    async fn history(&self, report_id: Uuid) -> Result<Vec<EscalationHistory>>;

    /// Submitted reports whose deadline has elapsed.
    async fn list_due(&self, now: DateTime<Utc>) -> Result<Vec<Report>>;

    /// Submitted, unreminded reports within `lead` of their deadline.
    async fn list_reminder_due(&self, now: DateTime<Utc>, lead: Duration) -> Result<Vec<Report>>;

    async fn is_reporter_blocked(&self, fingerprint: &str) -> Result<bool>;

    /// (report count, distinct event count) filed by a fingerprint since `since`.
    async fn reporter_activity_since(
        &self,
        fingerprint: &str,
        since: DateTime<Utc>,
    ) -> Result<(i64, i64)>;

    /// Distinct reporter fingerprints against one event since `since`.
    async fn distinct_reporters_for_event_since(
        &self,
        event_id: Uuid,
        since: DateTime<Utc>,
    ) -> Result<i64>;

    /// Distinct reported events among `event_ids` since `since`.
    async fn distinct_reported_events_since(
        &self,
        event_ids: &[Uuid],
        since: DateTime<Utc>,
    ) -> Result<i64>;

    /// Reports created within [start, end) for analytics.
    async fn list_created_between(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<Report>>;
}

/// Calendar role granted to an account; admins are resolved separately.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CalendarRole {
    Owner,
    Editor,
}

/// Calendar authorization collaborator.
#[async_trait]
pub trait CalendarAccess: Send + Sync {
    async fn review_role(
        &self,
        account_id: Uuid,
        calendar_id: Uuid,
    ) -> Result<Option<CalendarRole>>;

    async fn is_admin(&self, account_id: Uuid) -> Result<bool>;
}

/// Minimal event view the report core needs.
#[derive(Debug, Clone)]
pub struct EventRef {
    pub id: Uuid,
    /// None for remote/federated events
    pub calendar_id: Option<Uuid>,
    pub source_url: Option<String>,
    /// Recurring series this occurrence belongs to, if any
    pub series_id: Option<Uuid>,
}

/// Event lookup collaborator.
#[async_trait]
pub trait EventDirectory: Send + Sync {
    async fn get_event(&self, event_id: Uuid) -> Result<Option<EventRef>>;

    async fn events_in_series(&self, series_id: Uuid) -> Result<Vec<Uuid>>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotificationKind {
    /// One-time verification link for an anonymous reporter
    ReportVerification,
    /// Deadline reminder to the calendar owner
    EscalationReminder,
}

impl NotificationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            NotificationKind::ReportVerification => "report_verification",
            NotificationKind::EscalationReminder => "escalation_reminder",
        }
    }
}

/// Notification collaborator; fire-and-forget from the caller's perspective.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn send(&self, kind: NotificationKind, recipient: &str, data: Value) -> Result<()>;
}

/// Federation transport contract. Signing, retries and delivery confirmation
/// live behind this seam, not in the lifecycle engine.
#[async_trait]
pub trait FederationTransport: Send + Sync {
    /// Deliver a flag activity to the remote instance's administrator actor.
    /// Ok(true) = accepted, Ok(false) = rejected.
    async fn deliver_flag(&self, remote_admin_actor: &str, payload: Value) -> Result<bool>;
}

/// Inbound throttling collaborator with atomic increment-and-compare semantics.
#[async_trait]
pub trait RateLimiter: Send + Sync {
    /// Ok(true) = allowed, Ok(false) = blocked for this window.
    async fn check_and_increment(&self, key: &str, window: Duration, limit: u32) -> Result<bool>;
}
