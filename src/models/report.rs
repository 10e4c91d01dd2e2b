use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use sqlx::FromRow;
use uuid::Uuid;

/// Report status enum with state machine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "report_status", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum ReportStatus {
    PendingVerification,
    Submitted,
    Escalated,
    Resolved,
    Dismissed,
}

impl ReportStatus {
    /// Validate a status transition against the closed graph.
    ///
    /// `Resolved -> Resolved` is the admin override re-decision; every other
    /// self-transition is rejected.
    pub fn can_transition_to(&self, new_status: ReportStatus) -> bool {
        matches!(
            (self, new_status),
            (ReportStatus::PendingVerification, ReportStatus::Submitted)
                | (ReportStatus::Submitted, ReportStatus::Resolved)
                | (ReportStatus::Submitted, ReportStatus::Escalated)
                | (ReportStatus::Escalated, ReportStatus::Resolved)
                | (ReportStatus::Escalated, ReportStatus::Dismissed)
                | (ReportStatus::Resolved, ReportStatus::Resolved)
        )
    }

    /// Terminal reports expect no further action absent an admin override.
    pub fn is_terminal(&self) -> bool {
        matches!(self, ReportStatus::Resolved | ReportStatus::Dismissed)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ReportStatus::PendingVerification => "pending_verification",
            ReportStatus::Submitted => "submitted",
            ReportStatus::Escalated => "escalated",
            ReportStatus::Resolved => "resolved",
            ReportStatus::Dismissed => "dismissed",
        }
    }
}

/// Closed set of report categories
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "report_category", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum ReportCategory {
    Spam,
    Inappropriate,
    Misleading,
    Harassment,
    Other,
}

impl ReportCategory {
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "spam" => Some(ReportCategory::Spam),
            "inappropriate" => Some(ReportCategory::Inappropriate),
            "misleading" => Some(ReportCategory::Misleading),
            "harassment" => Some(ReportCategory::Harassment),
            "other" => Some(ReportCategory::Other),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ReportCategory::Spam => "spam",
            ReportCategory::Inappropriate => "inappropriate",
            ReportCategory::Misleading => "misleading",
            ReportCategory::Harassment => "harassment",
            ReportCategory::Other => "other",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "reporter_type", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum ReporterType {
    Anonymous,
    Authenticated,
    Admin,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "report_priority", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum ReportPriority {
    Low,
    Normal,
    High,
    Urgent,
}

/// Federation forwarding state, set only after an admin forwards the report
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "forward_status", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum ForwardStatus {
    Pending,
    Forwarded,
    Failed,
}

/// Abuse-signal flags computed at read time, never stored
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct PatternFlags {
    pub has_source_flooding_pattern: bool,
    pub has_event_targeting_pattern: bool,
    pub has_instance_pattern: bool,
}

/// One complaint against one event.
///
/// All field mutation happens through the submission gateway (create), the
/// verification subsystem (one transition) and the lifecycle engine (all
/// others); every status change writes exactly one escalation history row.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Report {
    pub id: Uuid,
    pub event_id: Uuid,
    /// None when the event is remote/federated
    pub calendar_id: Option<Uuid>,
    pub category: ReportCategory,
    pub description: String,
    pub reporter_type: ReporterType,
    pub reporter_account_id: Option<Uuid>,
    /// Anonymous reporters only; the raw email is never retained
    pub reporter_email_hash: Option<String>,
    /// Duplicate-detection identity: `acct:<uuid>`, `email:<sha256>` or `admin:<uuid>`
    pub fingerprint: String,
    #[serde(skip_serializing)]
    pub verification_token: Option<String>,
    pub verification_expires_at: Option<DateTime<Utc>>,
    pub status: ReportStatus,
    pub priority: Option<ReportPriority>,
    /// Meaningful only while status = Submitted
    pub deadline: Option<DateTime<Utc>>,
    pub admin_id: Option<Uuid>,
    pub admin_notes: Option<String>,
    pub owner_notes: Option<String>,
    pub reviewer_id: Option<Uuid>,
    pub reviewer_notes: Option<String>,
    pub forward_status: Option<ForwardStatus>,
    /// Persisted "already reminded" marker, set at most once
    pub reminded_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Report {
    /// Anonymous submission: starts at PendingVerification with a single-use token.
    #[allow(clippy::too_many_arguments)]
    pub fn new_anonymous(
        event_id: Uuid,
        calendar_id: Option<Uuid>,
        category: ReportCategory,
        description: String,
        email_hash: String,
        token: String,
        token_ttl_hours: i64,
        deadline_hours: i64,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            event_id,
            calendar_id,
            category,
            description,
            reporter_type: ReporterType::Anonymous,
            reporter_account_id: None,
            reporter_email_hash: Some(email_hash.clone()),
            fingerprint: email_fingerprint_from_hash(&email_hash),
            verification_token: Some(token),
            verification_expires_at: Some(now + Duration::hours(token_ttl_hours)),
            status: ReportStatus::PendingVerification,
            priority: None,
            deadline: Some(now + Duration::hours(deadline_hours)),
            admin_id: None,
            admin_notes: None,
            owner_notes: None,
            reviewer_id: None,
            reviewer_notes: None,
            forward_status: None,
            reminded_at: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Authenticated submission: enters the review queue directly.
    pub fn new_authenticated(
        event_id: Uuid,
        calendar_id: Option<Uuid>,
        category: ReportCategory,
        description: String,
        account_id: Uuid,
        deadline_hours: i64,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            event_id,
            calendar_id,
            category,
            description,
            reporter_type: ReporterType::Authenticated,
            reporter_account_id: Some(account_id),
            reporter_email_hash: None,
            fingerprint: account_fingerprint(account_id),
            verification_token: None,
            verification_expires_at: None,
            status: ReportStatus::Submitted,
            priority: None,
            deadline: Some(now + Duration::hours(deadline_hours)),
            admin_id: None,
            admin_notes: None,
            owner_notes: None,
            reviewer_id: None,
            reviewer_notes: None,
            forward_status: None,
            reminded_at: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Admin-initiated submission: carries priority/deadline/notes, skips verification.
    #[allow(clippy::too_many_arguments)]
    pub fn new_admin(
        event_id: Uuid,
        calendar_id: Option<Uuid>,
        category: ReportCategory,
        description: String,
        admin_id: Uuid,
        priority: ReportPriority,
        deadline: Option<DateTime<Utc>>,
        admin_notes: Option<String>,
        default_deadline_hours: i64,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            event_id,
            calendar_id,
            category,
            description,
            reporter_type: ReporterType::Admin,
            reporter_account_id: Some(admin_id),
            reporter_email_hash: None,
            fingerprint: admin_fingerprint(admin_id),
            verification_token: None,
            verification_expires_at: None,
            status: ReportStatus::Submitted,
            priority: Some(priority),
            deadline: Some(deadline.unwrap_or(now + Duration::hours(default_deadline_hours))),
            admin_id: Some(admin_id),
            admin_notes,
            owner_notes: None,
            reviewer_id: None,
            reviewer_notes: None,
            forward_status: None,
            reminded_at: None,
            created_at: now,
            updated_at: now,
        }
    }
}

/// Fingerprint for an authenticated reporter
pub fn account_fingerprint(account_id: Uuid) -> String {
    format!("acct:{}", account_id)
}

/// Fingerprint for an admin-initiated report
pub fn admin_fingerprint(admin_id: Uuid) -> String {
    format!("admin:{}", admin_id)
}

/// Hash of a claimed reporter email; the only form the email survives in
pub fn email_hash(email: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(email.trim().to_lowercase().as_bytes());
    hex::encode(hasher.finalize())
}

pub fn email_fingerprint_from_hash(hash: &str) -> String {
    format!("email:{}", hash)
}
