//! The lifecycle engine: every status change after verification goes through
//! here, so every change carries its authorization check, its precondition
//! re-check at the moment of write, and exactly one history row.

use chrono::Utc;
use serde::Deserialize;
use std::sync::Arc;
use url::Url;
use uuid::Uuid;

use crate::config::Config;
use crate::error::{ReportError, Result};
use crate::models::{
    decision, EscalationHistory, ForwardStatus, Report, ReportStatus, ReviewerRole,
};
use crate::repository::{EventDirectory, FederationTransport, ReportRepository};
use crate::services::AuthorizationResolver;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OwnerAction {
    Resolve,
    Dismiss,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AdminAction {
    Resolve,
    Dismiss,
    Override,
}

pub struct LifecycleEngine {
    repo: Arc<dyn ReportRepository>,
    events: Arc<dyn EventDirectory>,
    federation: Arc<dyn FederationTransport>,
    authz: Arc<AuthorizationResolver>,
    config: Arc<Config>,
}

impl LifecycleEngine {
    pub fn new(
        repo: Arc<dyn ReportRepository>,
        events: Arc<dyn EventDirectory>,
        federation: Arc<dyn FederationTransport>,
        authz: Arc<AuthorizationResolver>,
        config: Arc<Config>,
    ) -> Self {
        Self {
            repo,
            events,
            federation,
            authz,
            config,
        }
    }

    /// Owner/editor decision on a Submitted report: resolve closes it,
    /// dismiss defers it to an administrator.
    pub async fn owner_action(
        &self,
        actor: Uuid,
        calendar_id: Uuid,
        report_id: Uuid,
        action: OwnerAction,
        notes: &str,
    ) -> Result<Report> {
        // Authorization first; an actor without calendar access learns
        // nothing about the report, including whether it exists.
        let role = self
            .authz
            .require_calendar_reviewer(actor, calendar_id)
            .await?;

        let report = self
            .repo
            .find(report_id)
            .await?
            .ok_or(ReportError::ReportNotFound(report_id))?;

        // A report on another calendar is outside this actor's grant.
        if report.calendar_id != Some(calendar_id) {
            return Err(ReportError::Forbidden);
        }

        let notes = require_notes(notes)?;

        if report.status != ReportStatus::Submitted {
            return Err(ReportError::ReportAlreadyResolved);
        }

        let (to, tag) = match action {
            OwnerAction::Resolve => (ReportStatus::Resolved, decision::RESOLVE),
            OwnerAction::Dismiss => (ReportStatus::Escalated, decision::DISMISS),
        };

        let mut updated = report.clone();
        updated.status = to;
        updated.owner_notes = Some(notes.clone());
        updated.reviewer_id = Some(actor);
        updated.updated_at = Utc::now();

        let entry = EscalationHistory::new(
            report.id,
            ReportStatus::Submitted,
            to,
            Some(actor),
            role,
            tag,
            Some(notes),
        );

        self.apply(&updated, ReportStatus::Submitted, &entry).await?;
        Ok(updated)
    }

    /// Admin decision: resolve (Submitted or Escalated), dismiss (Escalated),
    /// or override (Escalated, or a re-decision on an already-Resolved report).
    pub async fn admin_action(
        &self,
        actor: Uuid,
        report_id: Uuid,
        action: AdminAction,
        notes: &str,
    ) -> Result<Report> {
        self.authz.require_admin(actor).await?;

        let report = self
            .repo
            .find(report_id)
            .await?
            .ok_or(ReportError::ReportNotFound(report_id))?;

        let notes = require_notes(notes)?;

        let (to, tag) = match action {
            AdminAction::Resolve => {
                if !matches!(
                    report.status,
                    ReportStatus::Submitted | ReportStatus::Escalated
                ) {
                    return Err(ReportError::ReportAlreadyResolved);
                }
                (ReportStatus::Resolved, decision::RESOLVE)
            }
            AdminAction::Dismiss => {
                if report.status != ReportStatus::Escalated {
                    return Err(ReportError::ReportAlreadyResolved);
                }
                (ReportStatus::Dismissed, decision::DISMISS)
            }
            AdminAction::Override => {
                if !matches!(
                    report.status,
                    ReportStatus::Escalated | ReportStatus::Resolved
                ) {
                    return Err(ReportError::ReportAlreadyResolved);
                }
                (ReportStatus::Resolved, decision::OVERRIDE)
            }
        };

        let mut updated = report.clone();
        updated.status = to;
        updated.reviewer_id = Some(actor);
        updated.reviewer_notes = Some(notes.clone());
        updated.updated_at = Utc::now();

        // An override on a standing Resolved decision is recorded as a fresh
        // Escalated -> Resolved re-decision in the audit trail.
        let from = if tag == decision::OVERRIDE {
            ReportStatus::Escalated
        } else {
            report.status
        };
        let entry =
            EscalationHistory::new(report.id, from, to, Some(actor), ReviewerRole::Admin, tag, Some(notes));

        self.apply(&updated, report.status, &entry).await?;
        Ok(updated)
    }

    /// Scheduler path: force Submitted -> Escalated on deadline expiry. A
    /// report a human moved since the due query is skipped, never overwritten.
    pub async fn system_escalate(&self, report_id: Uuid) -> Result<Option<Report>> {
        let report = match self.repo.find(report_id).await? {
            Some(r) => r,
            None => return Ok(None),
        };
        if report.status != ReportStatus::Submitted {
            return Ok(None);
        }

        let mut updated = report.clone();
        updated.status = ReportStatus::Escalated;
        updated.updated_at = Utc::now();

        let entry = EscalationHistory::new(
            report.id,
            ReportStatus::Submitted,
            ReportStatus::Escalated,
            None,
            ReviewerRole::System,
            decision::AUTO_ESCALATED,
            None,
        );

        let applied = self
            .repo
            .transition(&updated, ReportStatus::Submitted, &entry)
            .await?;
        if applied {
            tracing::info!(report_id = %report.id, "Report auto-escalated past deadline");
            Ok(Some(updated))
        } else {
            Ok(None)
        }
    }

    /// Forward a complaint about a remote event to the administrator of the
    /// instance that originally published it.
    pub async fn forward_report(&self, actor: Uuid, report_id: Uuid) -> Result<()> {
        self.authz.require_admin(actor).await?;

        let report = self
            .repo
            .find(report_id)
            .await?
            .ok_or(ReportError::ReportNotFound(report_id))?;

        if report.calendar_id.is_some() {
            return Err(ReportError::Validation(
                "Only reports against remote events can be forwarded".to_string(),
            ));
        }

        let event = self
            .events
            .get_event(report.event_id)
            .await?
            .ok_or(ReportError::EventNotFound(report.event_id))?;
        let source_url = event.source_url.ok_or_else(|| {
            ReportError::Validation("Remote event has no source URL to forward to".to_string())
        })?;

        let domain = Url::parse(&source_url)
            .ok()
            .and_then(|u| u.host_str().map(str::to_string))
            .ok_or_else(|| {
                ReportError::Validation(format!("Cannot derive a domain from {}", source_url))
            })?;
        let remote_admin = format!("https://{}/federation/u/admin", domain);

        let payload = serde_json::json!({
            "type": "Flag",
            "report_id": report.id,
            "event_url": source_url,
            "category": report.category.as_str(),
            "description": report.description,
            "from_instance": self.config.instance_domain,
        });

        match self.federation.deliver_flag(&remote_admin, payload).await {
            Ok(true) => {
                let entry = EscalationHistory::new(
                    report.id,
                    report.status,
                    report.status,
                    Some(actor),
                    ReviewerRole::Admin,
                    decision::FORWARDED_TO_REMOTE_ADMIN,
                    Some(format!("forwarded to {}", domain)),
                );
                self.repo.append_history(&entry).await?;
                self.repo
                    .set_forward_status(report.id, ForwardStatus::Pending)
                    .await?;
                tracing::info!(report_id = %report.id, domain = %domain, "Report forwarded to remote admin");
                Ok(())
            }
            Ok(false) => {
                self.repo
                    .set_forward_status(report.id, ForwardStatus::Failed)
                    .await?;
                Err(ReportError::Federation(format!(
                    "{} rejected the flag delivery",
                    domain
                )))
            }
            Err(e) => {
                self.repo
                    .set_forward_status(report.id, ForwardStatus::Failed)
                    .await?;
                Err(ReportError::Federation(e.to_string()))
            }
        }
    }

    /// Ordered audit trail; readable by admins and the report's calendar
    /// reviewers only.
    pub async fn history(&self, actor: Uuid, report_id: Uuid) -> Result<Vec<EscalationHistory>> {
        self.authorize_read(actor, report_id).await?;
        self.repo.history(report_id).await
    }

    /// Reviewer read access to one report.
    pub async fn get_report(&self, actor: Uuid, report_id: Uuid) -> Result<Report> {
        self.authorize_read(actor, report_id).await?;
        self.repo
            .find(report_id)
            .await?
            .ok_or(ReportError::ReportNotFound(report_id))
    }

    async fn authorize_read(&self, actor: Uuid, report_id: Uuid) -> Result<()> {
        if self.authz.is_admin(actor).await? {
            return Ok(());
        }
        // Non-admins must hold calendar access; a missing report yields the
        // same Forbidden as a missing grant.
        let calendar_id = self
            .repo
            .find(report_id)
            .await?
            .and_then(|r| r.calendar_id)
            .ok_or(ReportError::Forbidden)?;
        self.authz
            .require_calendar_reviewer(actor, calendar_id)
            .await?;
        Ok(())
    }

    async fn apply(
        &self,
        updated: &Report,
        expected: ReportStatus,
        entry: &EscalationHistory,
    ) -> Result<()> {
        debug_assert!(entry.from_status.can_transition_to(entry.to_status));
        let applied = self.repo.transition(updated, expected, entry).await?;
        if !applied {
            // Someone else won the race between our read and our write.
            return Err(ReportError::ReportAlreadyResolved);
        }
        Ok(())
    }
}

fn require_notes(notes: &str) -> Result<String> {
    let trimmed = notes.trim();
    if trimmed.is_empty() {
        return Err(ReportError::Validation(
            "Notes are required for this decision".to_string(),
        ));
    }
    Ok(trimmed.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{email_hash, Report, ReportCategory};
    use crate::repository::MemoryReportRepository;
    use crate::testing::{test_config, FixedEvents, RecordingTransport, StaticAccess};

    struct Fixture {
        repo: Arc<MemoryReportRepository>,
        events: Arc<FixedEvents>,
        transport: Arc<RecordingTransport>,
        access: Arc<StaticAccess>,
        engine: LifecycleEngine,
    }

    fn fixture(access: StaticAccess) -> Fixture {
        let repo = Arc::new(MemoryReportRepository::new());
        let events = Arc::new(FixedEvents::with_local_event());
        let transport = Arc::new(RecordingTransport::default());
        let access = Arc::new(access);
        let engine = LifecycleEngine::new(
            repo.clone(),
            events.clone(),
            transport.clone(),
            Arc::new(AuthorizationResolver::new(access.clone())),
            Arc::new(test_config()),
        );
        Fixture {
            repo,
            events,
            transport,
            access,
            engine,
        }
    }

    async fn submitted_report(fx: &Fixture) -> Report {
        let mut report = Report::new_anonymous(
            fx.events.event_id(),
            Some(fx.events.calendar_id()),
            ReportCategory::Spam,
            "This is spam".to_string(),
            email_hash("a@example.com"),
            "e".repeat(64),
            24,
            48,
        );
        report.status = ReportStatus::Submitted;
        report.verification_token = None;
        report.verification_expires_at = None;
        fx.repo.create(&report).await.unwrap();
        report
    }

    #[tokio::test]
    async fn test_owner_resolve_writes_one_history_row() {
        let owner = Uuid::new_v4();
        let fx = fixture(StaticAccess::with_owner(owner));
        let report = submitted_report(&fx).await;

        let updated = fx
            .engine
            .owner_action(
                owner,
                fx.events.calendar_id(),
                report.id,
                OwnerAction::Resolve,
                "handled",
            )
            .await
            .unwrap();

        assert_eq!(updated.status, ReportStatus::Resolved);
        assert_eq!(updated.owner_notes.as_deref(), Some("handled"));

        let history = fx.repo.history(report.id).await.unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].from_status, ReportStatus::Submitted);
        assert_eq!(history[0].to_status, ReportStatus::Resolved);
        assert_eq!(history[0].reviewer_role, ReviewerRole::Owner);
        assert_eq!(history[0].decision, decision::RESOLVE);
    }

    #[tokio::test]
    async fn test_owner_dismiss_escalates_then_admin_resolves() {
        let owner = Uuid::new_v4();
        let admin = Uuid::new_v4();
        let mut access = StaticAccess::with_owner(owner);
        access.add_admin(admin);
        let fx = fixture(access);
        let report = submitted_report(&fx).await;

        let escalated = fx
            .engine
            .owner_action(
                owner,
                fx.events.calendar_id(),
                report.id,
                OwnerAction::Dismiss,
                "not a violation",
            )
            .await
            .unwrap();
        assert_eq!(escalated.status, ReportStatus::Escalated);

        let resolved = fx
            .engine
            .admin_action(admin, report.id, AdminAction::Resolve, "confirmed")
            .await
            .unwrap();
        assert_eq!(resolved.status, ReportStatus::Resolved);
        assert_eq!(resolved.reviewer_notes.as_deref(), Some("confirmed"));

        let history = fx.repo.history(report.id).await.unwrap();
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].decision, decision::DISMISS);
        assert_eq!(history[1].decision, decision::RESOLVE);
        assert_eq!(history[1].reviewer_role, ReviewerRole::Admin);
    }

    #[tokio::test]
    async fn test_blank_notes_rejected_and_status_unchanged() {
        let owner = Uuid::new_v4();
        let fx = fixture(StaticAccess::with_owner(owner));
        let report = submitted_report(&fx).await;

        let err = fx
            .engine
            .owner_action(
                owner,
                fx.events.calendar_id(),
                report.id,
                OwnerAction::Resolve,
                "   ",
            )
            .await
            .unwrap_err();
        assert!(matches!(err, ReportError::Validation(_)));
        assert_eq!(
            fx.repo.find(report.id).await.unwrap().unwrap().status,
            ReportStatus::Submitted
        );
        assert!(fx.repo.history(report.id).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_forbidden_before_not_found() {
        let fx = fixture(StaticAccess::default());
        let stranger = Uuid::new_v4();

        // Unknown report id, unauthorized actor: Forbidden, never NotFound.
        let err = fx
            .engine
            .owner_action(
                stranger,
                fx.events.calendar_id(),
                Uuid::new_v4(),
                OwnerAction::Resolve,
                "notes",
            )
            .await
            .unwrap_err();
        assert!(matches!(err, ReportError::Forbidden));

        let err = fx
            .engine
            .admin_action(stranger, Uuid::new_v4(), AdminAction::Resolve, "notes")
            .await
            .unwrap_err();
        assert!(matches!(err, ReportError::Forbidden));
    }

    #[tokio::test]
    async fn test_owner_cannot_touch_report_on_other_calendar() {
        let owner = Uuid::new_v4();
        let other_calendar = Uuid::new_v4();
        let mut access = StaticAccess::with_owner(owner);
        access.grant_owner(owner, other_calendar);
        let fx = fixture(access);
        let report = submitted_report(&fx).await;

        let err = fx
            .engine
            .owner_action(owner, other_calendar, report.id, OwnerAction::Resolve, "x")
            .await
            .unwrap_err();
        assert!(matches!(err, ReportError::Forbidden));
    }

    #[tokio::test]
    async fn test_editor_role_recorded_in_history() {
        let editor = Uuid::new_v4();
        let fx = fixture(StaticAccess::with_editor(editor));
        let report = submitted_report(&fx).await;

        fx.engine
            .owner_action(
                editor,
                fx.events.calendar_id(),
                report.id,
                OwnerAction::Resolve,
                "cleaned up",
            )
            .await
            .unwrap();

        let history = fx.repo.history(report.id).await.unwrap();
        assert_eq!(history[0].reviewer_role, ReviewerRole::Editor);
    }

    #[tokio::test]
    async fn test_concurrent_owner_actions_one_winner() {
        let owner = Uuid::new_v4();
        let fx = fixture(StaticAccess::with_owner(owner));
        let report = submitted_report(&fx).await;

        fx.engine
            .owner_action(
                owner,
                fx.events.calendar_id(),
                report.id,
                OwnerAction::Resolve,
                "first",
            )
            .await
            .unwrap();

        // Second action raced on the same Submitted report and lost.
        let err = fx
            .engine
            .owner_action(
                owner,
                fx.events.calendar_id(),
                report.id,
                OwnerAction::Dismiss,
                "second",
            )
            .await
            .unwrap_err();
        assert!(matches!(err, ReportError::ReportAlreadyResolved));
        assert_eq!(fx.repo.history(report.id).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_admin_dismiss_requires_escalated() {
        let admin = Uuid::new_v4();
        let fx = fixture(StaticAccess::with_admin(admin));
        let report = submitted_report(&fx).await;

        let err = fx
            .engine
            .admin_action(admin, report.id, AdminAction::Dismiss, "spam wave")
            .await
            .unwrap_err();
        assert!(matches!(err, ReportError::ReportAlreadyResolved));
    }

    #[tokio::test]
    async fn test_admin_override_re_decides_resolved_report() {
        let admin = Uuid::new_v4();
        let fx = fixture(StaticAccess::with_admin(admin));
        let report = submitted_report(&fx).await;

        fx.engine
            .admin_action(admin, report.id, AdminAction::Resolve, "initial decision")
            .await
            .unwrap();
        let overridden = fx
            .engine
            .admin_action(admin, report.id, AdminAction::Override, "reversing on appeal")
            .await
            .unwrap();
        assert_eq!(overridden.status, ReportStatus::Resolved);

        let history = fx.repo.history(report.id).await.unwrap();
        assert_eq!(history.len(), 2);
        assert_eq!(history[1].decision, decision::OVERRIDE);
        assert_eq!(history[1].from_status, ReportStatus::Escalated);
        assert_eq!(history[1].to_status, ReportStatus::Resolved);
    }

    #[tokio::test]
    async fn test_system_escalation_skips_reports_humans_moved() {
        let owner = Uuid::new_v4();
        let fx = fixture(StaticAccess::with_owner(owner));
        let report = submitted_report(&fx).await;

        fx.engine
            .owner_action(
                owner,
                fx.events.calendar_id(),
                report.id,
                OwnerAction::Resolve,
                "done",
            )
            .await
            .unwrap();

        assert!(fx.engine.system_escalate(report.id).await.unwrap().is_none());
        assert_eq!(fx.repo.history(report.id).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_forward_remote_report() {
        let admin = Uuid::new_v4();
        let fx = fixture(StaticAccess::with_admin(admin));

        let remote_event = fx
            .events
            .add_remote_event("https://events.example.org/events/solstice-fair")
            .await;
        let mut report = Report::new_anonymous(
            remote_event,
            None,
            ReportCategory::Misleading,
            "Copied listing with wrong date".to_string(),
            email_hash("b@example.com"),
            "d".repeat(64),
            24,
            48,
        );
        report.status = ReportStatus::Escalated;
        fx.repo.create(&report).await.unwrap();

        fx.engine.forward_report(admin, report.id).await.unwrap();

        let deliveries = fx.transport.deliveries().await;
        assert_eq!(deliveries.len(), 1);
        assert_eq!(
            deliveries[0].0,
            "https://events.example.org/federation/u/admin"
        );

        let stored = fx.repo.find(report.id).await.unwrap().unwrap();
        assert_eq!(stored.forward_status, Some(ForwardStatus::Pending));
        let history = fx.repo.history(report.id).await.unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].decision, decision::FORWARDED_TO_REMOTE_ADMIN);
    }

    #[tokio::test]
    async fn test_forward_local_event_fails_before_delivery() {
        let admin = Uuid::new_v4();
        let fx = fixture(StaticAccess::with_admin(admin));
        let report = submitted_report(&fx).await;

        let err = fx.engine.forward_report(admin, report.id).await.unwrap_err();
        assert!(matches!(err, ReportError::Validation(_)));
        assert!(fx.transport.deliveries().await.is_empty());
    }

    #[tokio::test]
    async fn test_rejected_delivery_marks_failed() {
        let admin = Uuid::new_v4();
        let fx = fixture(StaticAccess::with_admin(admin));
        fx.transport.reject_next().await;

        let remote_event = fx
            .events
            .add_remote_event("https://events.example.org/events/ghost-walk")
            .await;
        let mut report = Report::new_anonymous(
            remote_event,
            None,
            ReportCategory::Spam,
            "Reposted spam event".to_string(),
            email_hash("c@example.com"),
            "c".repeat(64),
            24,
            48,
        );
        report.status = ReportStatus::Escalated;
        fx.repo.create(&report).await.unwrap();

        let err = fx.engine.forward_report(admin, report.id).await.unwrap_err();
        assert!(matches!(err, ReportError::Federation(_)));
        assert_eq!(
            fx.repo.find(report.id).await.unwrap().unwrap().forward_status,
            Some(ForwardStatus::Failed)
        );
    }

    #[tokio::test]
    async fn test_history_read_requires_access() {
        let owner = Uuid::new_v4();
        let fx = fixture(StaticAccess::with_owner(owner));
        let report = submitted_report(&fx).await;

        assert!(fx.engine.history(owner, report.id).await.is_ok());

        let stranger = Uuid::new_v4();
        let err = fx.engine.history(stranger, report.id).await.unwrap_err();
        assert!(matches!(err, ReportError::Forbidden));

        // Unknown report, non-admin reader: still Forbidden, not NotFound.
        let err = fx.engine.history(stranger, Uuid::new_v4()).await.unwrap_err();
        assert!(matches!(err, ReportError::Forbidden));

        let _ = &fx.access;
    }
}
