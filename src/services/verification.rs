//! Email verification: promotes an anonymous report into the review queue.
//!
//! "Token not found" and "token expired" surface as the same error so the
//! endpoint cannot be used as a token-guessing oracle.

use chrono::Utc;
use std::sync::Arc;

use crate::error::{ReportError, Result};
use crate::models::{decision, EscalationHistory, Report, ReportStatus, ReviewerRole};
use crate::repository::ReportRepository;

pub struct VerificationService {
    repo: Arc<dyn ReportRepository>,
}

impl VerificationService {
    pub fn new(repo: Arc<dyn ReportRepository>) -> Self {
        Self { repo }
    }

    pub async fn verify(&self, token: &str) -> Result<Report> {
        let token = token.trim();
        if token.is_empty() {
            return Err(ReportError::InvalidVerificationToken);
        }

        let now = Utc::now();

        // The claim clears the token atomically; of two racing attempts
        // exactly one receives the report here.
        let claimed = self
            .repo
            .claim_verification_token(token, now)
            .await?
            .ok_or(ReportError::InvalidVerificationToken)?;

        let mut verified = claimed.clone();
        verified.status = ReportStatus::Submitted;
        verified.updated_at = now;

        let entry = EscalationHistory::new(
            verified.id,
            ReportStatus::PendingVerification,
            ReportStatus::Submitted,
            None,
            ReviewerRole::System,
            decision::VERIFIED,
            None,
        );

        let applied = self
            .repo
            .transition(&verified, ReportStatus::PendingVerification, &entry)
            .await?;
        if !applied {
            // The report left PendingVerification underneath us; treat like
            // any other consumed token.
            return Err(ReportError::InvalidVerificationToken);
        }

        tracing::info!(report_id = %verified.id, "Anonymous report verified");
        Ok(verified)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{email_hash, Report, ReportCategory};
    use crate::repository::MemoryReportRepository;
    use crate::services::submission::generate_verification_token;
    use chrono::Duration;
    use uuid::Uuid;

    async fn pending_report(repo: &MemoryReportRepository) -> (Report, String) {
        let token = generate_verification_token();
        let report = Report::new_anonymous(
            Uuid::new_v4(),
            Some(Uuid::new_v4()),
            ReportCategory::Spam,
            "This is spam".to_string(),
            email_hash("a@example.com"),
            token.clone(),
            24,
            48,
        );
        repo.create(&report).await.unwrap();
        (report, token)
    }

    #[tokio::test]
    async fn test_verification_promotes_to_submitted() {
        let repo = Arc::new(MemoryReportRepository::new());
        let (report, token) = pending_report(&repo).await;
        let service = VerificationService::new(repo.clone());

        let verified = service.verify(&token).await.unwrap();
        assert_eq!(verified.id, report.id);
        assert_eq!(verified.status, ReportStatus::Submitted);
        assert!(verified.verification_token.is_none());
        assert!(verified.verification_expires_at.is_none());

        let history = repo.history(report.id).await.unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].from_status, ReportStatus::PendingVerification);
        assert_eq!(history[0].to_status, ReportStatus::Submitted);
        assert_eq!(history[0].reviewer_role, ReviewerRole::System);
        assert_eq!(history[0].decision, decision::VERIFIED);
    }

    #[tokio::test]
    async fn test_token_verifies_at_most_once() {
        let repo = Arc::new(MemoryReportRepository::new());
        let (_, token) = pending_report(&repo).await;
        let service = VerificationService::new(repo.clone());

        service.verify(&token).await.unwrap();
        let err = service.verify(&token).await.unwrap_err();
        assert!(matches!(err, ReportError::InvalidVerificationToken));
    }

    #[tokio::test]
    async fn test_unknown_and_expired_tokens_fail_the_same_way() {
        let repo = Arc::new(MemoryReportRepository::new());
        let (mut report, token) = pending_report(&repo).await;
        report.verification_expires_at = Some(Utc::now() - Duration::hours(1));
        repo.put(report).await;
        let service = VerificationService::new(repo);

        let expired = service.verify(&token).await.unwrap_err();
        let unknown = service.verify("deadbeef").await.unwrap_err();
        assert_eq!(expired.to_string(), unknown.to_string());
        assert_eq!(expired.error_name(), unknown.error_name());
    }

    #[tokio::test]
    async fn test_concurrent_verification_has_one_winner() {
        let repo = Arc::new(MemoryReportRepository::new());
        let (_, token) = pending_report(&repo).await;
        let service = Arc::new(VerificationService::new(repo));

        let (a, b) = tokio::join!(
            {
                let s = service.clone();
                let t = token.clone();
                async move { s.verify(&t).await }
            },
            {
                let s = service.clone();
                let t = token.clone();
                async move { s.verify(&t).await }
            }
        );

        assert_eq!(a.is_ok() as u8 + b.is_ok() as u8, 1);
        let loser = if a.is_err() { a } else { b };
        assert!(matches!(
            loser.unwrap_err(),
            ReportError::InvalidVerificationToken
        ));
    }
}
