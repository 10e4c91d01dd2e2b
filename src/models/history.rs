use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

use super::report::ReportStatus;

/// Role under which a transition was applied
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "reviewer_role", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum ReviewerRole {
    Owner,
    Editor,
    Admin,
    System,
}

impl ReviewerRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReviewerRole::Owner => "owner",
            ReviewerRole::Editor => "editor",
            ReviewerRole::Admin => "admin",
            ReviewerRole::System => "system",
        }
    }
}

/// Decision tags recorded on history rows
pub mod decision {
    pub const RESOLVE: &str = "resolve";
    pub const DISMISS: &str = "dismiss";
    pub const OVERRIDE: &str = "override";
    pub const VERIFIED: &str = "verified";
    pub const AUTO_ESCALATED: &str = "auto_escalated";
    pub const FORWARDED_TO_REMOTE_ADMIN: &str = "forwarded_to_remote_admin";
}

/// Append-only audit row; one per status change, never updated or deleted
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct EscalationHistory {
    pub id: Uuid,
    pub report_id: Uuid,
    pub from_status: ReportStatus,
    pub to_status: ReportStatus,
    /// None for system-triggered rows
    pub reviewer_id: Option<Uuid>,
    pub reviewer_role: ReviewerRole,
    pub decision: String,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl EscalationHistory {
    pub fn new(
        report_id: Uuid,
        from_status: ReportStatus,
        to_status: ReportStatus,
        reviewer_id: Option<Uuid>,
        reviewer_role: ReviewerRole,
        decision: impl Into<String>,
        notes: Option<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            report_id,
            from_status,
            to_status,
            reviewer_id,
            reviewer_role,
            decision: decision.into(),
            notes,
            created_at: Utc::now(),
        }
    }
}
