//! Submission gateway: validates and creates new reports, running duplicate
//! and abuse checks before anything is persisted.

use chrono::{DateTime, Duration, Utc};
use rand::RngCore;
use serde::Deserialize;
use std::sync::Arc;
use uuid::Uuid;
use validator::Validate;

use crate::config::Config;
use crate::error::{ReportError, Result};
use crate::models::{
    account_fingerprint, admin_fingerprint, email_fingerprint_from_hash, email_hash, Report,
    ReportCategory, ReportPriority,
};
use crate::repository::{NotificationKind, Notifier, RateLimiter, ReportRepository};
use crate::services::AuthorizationResolver;

use crate::repository::EventDirectory;

const MAX_DESCRIPTION_CHARS: usize = 2000;

/// Who is filing the report
#[derive(Debug, Clone)]
pub enum Reporter {
    Anonymous {
        email: String,
    },
    Authenticated {
        account_id: Uuid,
    },
    Admin {
        admin_id: Uuid,
        priority: ReportPriority,
        deadline: Option<DateTime<Utc>>,
        admin_notes: Option<String>,
    },
}

#[derive(Debug, Clone)]
pub struct SubmitReportInput {
    pub event_id: Uuid,
    pub category: String,
    pub description: String,
    pub reporter: Reporter,
}

#[derive(Debug, Validate, Deserialize)]
struct AnonymousEmail {
    #[validate(email, length(max = 254))]
    email: String,
}

pub struct SubmissionGateway {
    repo: Arc<dyn ReportRepository>,
    events: Arc<dyn EventDirectory>,
    notifier: Arc<dyn Notifier>,
    limiter: Arc<dyn RateLimiter>,
    authz: Arc<AuthorizationResolver>,
    config: Arc<Config>,
}

impl SubmissionGateway {
    pub fn new(
        repo: Arc<dyn ReportRepository>,
        events: Arc<dyn EventDirectory>,
        notifier: Arc<dyn Notifier>,
        limiter: Arc<dyn RateLimiter>,
        authz: Arc<AuthorizationResolver>,
        config: Arc<Config>,
    ) -> Self {
        Self {
            repo,
            events,
            notifier,
            limiter,
            authz,
            config,
        }
    }

    pub async fn submit(&self, input: SubmitReportInput) -> Result<Report> {
        let category = ReportCategory::parse(&input.category).ok_or_else(|| {
            ReportError::Validation(format!("Unknown report category: {}", input.category))
        })?;

        let description = input.description.trim().to_string();
        if description.is_empty() || description.chars().count() > MAX_DESCRIPTION_CHARS {
            return Err(ReportError::Validation(format!(
                "Description must be 1-{} characters",
                MAX_DESCRIPTION_CHARS
            )));
        }

        // Admin-initiated reports are an admin-only capability; resolve that
        // before touching any report or event state.
        if let Reporter::Admin { admin_id, .. } = &input.reporter {
            self.authz.require_admin(*admin_id).await?;
        }

        let event = self
            .events
            .get_event(input.event_id)
            .await?
            .ok_or(ReportError::EventNotFound(input.event_id))?;

        match input.reporter {
            Reporter::Anonymous { email } => {
                self.submit_anonymous(event.id, event.calendar_id, category, description, email)
                    .await
            }
            Reporter::Authenticated { account_id } => {
                let fingerprint = account_fingerprint(account_id);
                self.check_reporter(&fingerprint, event.id).await?;

                let report = Report::new_authenticated(
                    event.id,
                    event.calendar_id,
                    category,
                    description,
                    account_id,
                    self.config.auto_escalation_hours,
                );
                self.repo.create(&report).await?;
                Ok(report)
            }
            Reporter::Admin {
                admin_id,
                priority,
                deadline,
                admin_notes,
            } => {
                // Duplicate detection keyed by the admin, not a reporter
                // fingerprint; admins may re-open independent complaints.
                let fingerprint = admin_fingerprint(admin_id);
                self.check_reporter(&fingerprint, event.id).await?;

                let report = Report::new_admin(
                    event.id,
                    event.calendar_id,
                    category,
                    description,
                    admin_id,
                    priority,
                    deadline,
                    admin_notes,
                    self.config.admin_report_escalation_hours,
                );
                self.repo.create(&report).await?;
                Ok(report)
            }
        }
    }

    async fn submit_anonymous(
        &self,
        event_id: Uuid,
        calendar_id: Option<Uuid>,
        category: ReportCategory,
        description: String,
        email: String,
    ) -> Result<Report> {
        let email = email.trim().to_string();
        let form = AnonymousEmail {
            email: email.clone(),
        };
        form.validate()
            .map_err(|_| ReportError::Validation("Invalid reporter email address".to_string()))?;

        let hash = email_hash(&email);
        let fingerprint = email_fingerprint_from_hash(&hash);
        self.check_reporter(&fingerprint, event_id).await?;

        // Throttle verification emails per address before minting a token.
        let allowed = self
            .limiter
            .check_and_increment(
                &format!("verify-email:{}", hash),
                Duration::hours(1),
                self.config.verification_emails_per_hour,
            )
            .await?;
        if !allowed {
            return Err(ReportError::EmailRateLimit);
        }

        let token = generate_verification_token();
        let report = Report::new_anonymous(
            event_id,
            calendar_id,
            category,
            description,
            hash,
            token.clone(),
            self.config.verification_token_ttl_hours,
            self.config.auto_escalation_hours,
        );
        self.repo.create(&report).await?;

        // Fire-and-forget: a lost email is recoverable (the reporter files
        // again after the token expires), a lost report is not.
        if let Err(e) = self
            .notifier
            .send(
                NotificationKind::ReportVerification,
                &email,
                serde_json::json!({
                    "report_id": report.id,
                    "event_id": event_id,
                    "token": token,
                    "expires_at": report.verification_expires_at,
                }),
            )
            .await
        {
            tracing::warn!(report_id = %report.id, error = %e, "Verification notification failed");
        }

        Ok(report)
    }

    async fn check_reporter(&self, fingerprint: &str, event_id: Uuid) -> Result<()> {
        if self.repo.is_reporter_blocked(fingerprint).await? {
            return Err(ReportError::ReporterBlocked);
        }
        if self
            .repo
            .find_active_by_fingerprint(fingerprint, event_id)
            .await?
            .is_some()
        {
            return Err(ReportError::DuplicateReport);
        }
        Ok(())
    }
}

/// Opaque, unguessable, fixed-length (64 hex chars) single-use token.
pub fn generate_verification_token() -> String {
    let mut bytes = [0u8; 32];
    rand::thread_rng().fill_bytes(&mut bytes);
    hex::encode(bytes)
}
