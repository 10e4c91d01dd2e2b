//! Postgres-backed report store.
//!
//! Conditional writes (`UPDATE … WHERE id = $1 AND status = $2`) carry the
//! optimistic precondition: a concurrent actor that already moved the report
//! leaves `rows_affected = 0` and the caller backs off.

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use sqlx::PgPool;
use std::sync::Arc;
use uuid::Uuid;

use super::ReportRepository;
use crate::error::{ReportError, Result};
use crate::models::{EscalationHistory, ForwardStatus, Report, ReportStatus};

const REPORT_COLUMNS: &str = "id, event_id, calendar_id, category, description, reporter_type, \
     reporter_account_id, reporter_email_hash, fingerprint, verification_token, \
     verification_expires_at, status, priority, deadline, admin_id, admin_notes, owner_notes, \
     reviewer_id, reviewer_notes, forward_status, reminded_at, created_at, updated_at";

pub struct PgReportRepository {
    pool: Arc<PgPool>,
}

impl PgReportRepository {
    pub fn new(pool: Arc<PgPool>) -> Self {
        Self { pool }
    }

    async fn insert_history<'e, E>(entry: &EscalationHistory, executor: E) -> Result<()>
    where
        E: sqlx::Executor<'e, Database = sqlx::Postgres>,
    {
        sqlx::query(
            r#"
            INSERT INTO escalation_history (
                id, report_id, from_status, to_status, reviewer_id,
                reviewer_role, decision, notes, created_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            "#,
        )
        .bind(entry.id)
        .bind(entry.report_id)
        .bind(entry.from_status)
        .bind(entry.to_status)
        .bind(entry.reviewer_id)
        .bind(entry.reviewer_role)
        .bind(&entry.decision)
        .bind(&entry.notes)
        .bind(entry.created_at)
        .execute(executor)
        .await?;
        Ok(())
    }
}

#[async_trait]
impl ReportRepository for PgReportRepository {
    async fn create(&self, report: &Report) -> Result<()> {
        let inserted = sqlx::query(&format!(
            r#"
            INSERT INTO reports ({})
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13,
                    $14, $15, $16, $17, $18, $19, $20, $21, $22, $23)
            "#,
            REPORT_COLUMNS
        ))
        .bind(report.id)
        .bind(report.event_id)
        .bind(report.calendar_id)
        .bind(report.category)
        .bind(&report.description)
        .bind(report.reporter_type)
        .bind(report.reporter_account_id)
        .bind(&report.reporter_email_hash)
        .bind(&report.fingerprint)
        .bind(&report.verification_token)
        .bind(report.verification_expires_at)
        .bind(report.status)
        .bind(report.priority)
        .bind(report.deadline)
        .bind(report.admin_id)
        .bind(&report.admin_notes)
        .bind(&report.owner_notes)
        .bind(report.reviewer_id)
        .bind(&report.reviewer_notes)
        .bind(report.forward_status)
        .bind(report.reminded_at)
        .bind(report.created_at)
        .bind(report.updated_at)
        .execute(&*self.pool)
        .await;

        // The partial unique index on (fingerprint, event_id) over non-terminal
        // rows is the authoritative duplicate check; the gateway's read-side
        // check can race.
        if let Err(e) = inserted {
            if let sqlx::Error::Database(ref db) = e {
                if db.constraint() == Some("idx_reports_active_fingerprint_event") {
                    return Err(ReportError::DuplicateReport);
                }
            }
            return Err(e.into());
        }

        tracing::info!(
            report_id = %report.id,
            event_id = %report.event_id,
            status = %report.status.as_str(),
            "Report created"
        );
        Ok(())
    }

    async fn find(&self, id: Uuid) -> Result<Option<Report>> {
        let report = sqlx::query_as::<_, Report>(&format!(
            "SELECT {} FROM reports WHERE id = $1",
            REPORT_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&*self.pool)
        .await?;
        Ok(report)
    }

    async fn find_active_by_fingerprint(
        &self,
        fingerprint: &str,
        event_id: Uuid,
    ) -> Result<Option<Report>> {
        let report = sqlx::query_as::<_, Report>(&format!(
            r#"
            SELECT {} FROM reports
            WHERE fingerprint = $1 AND event_id = $2
              AND status NOT IN ('resolved', 'dismissed')
            LIMIT 1
            "#,
            REPORT_COLUMNS
        ))
        .bind(fingerprint)
        .bind(event_id)
        .fetch_optional(&*self.pool)
        .await?;
        Ok(report)
    }

    async fn claim_verification_token(
        &self,
        token: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<Report>> {
        // Single conditional UPDATE: two racing claims see exactly one winner.
        let report = sqlx::query_as::<_, Report>(&format!(
            r#"
            UPDATE reports
            SET verification_token = NULL,
                verification_expires_at = NULL,
                updated_at = $2
            WHERE verification_token = $1 AND verification_expires_at > $2
            RETURNING {}
            "#,
            REPORT_COLUMNS
        ))
        .bind(token)
        .bind(now)
        .fetch_optional(&*self.pool)
        .await?;
        Ok(report)
    }

    async fn transition(
        &self,
        report: &Report,
        expected: ReportStatus,
        entry: &EscalationHistory,
    ) -> Result<bool> {
        let mut tx = self.pool.begin().await?;

        let updated = sqlx::query(
            r#"
            UPDATE reports
            SET status = $3,
                deadline = $4,
                owner_notes = $5,
                reviewer_id = $6,
                reviewer_notes = $7,
                verification_token = $8,
                verification_expires_at = $9,
                updated_at = $10
            WHERE id = $1 AND status = $2
            "#,
        )
        .bind(report.id)
        .bind(expected)
        .bind(report.status)
        .bind(report.deadline)
        .bind(&report.owner_notes)
        .bind(report.reviewer_id)
        .bind(&report.reviewer_notes)
        .bind(&report.verification_token)
        .bind(report.verification_expires_at)
        .bind(report.updated_at)
        .execute(&mut *tx)
        .await?
        .rows_affected();

        if updated == 0 {
            tx.rollback().await?;
            return Ok(false);
        }

        Self::insert_history(entry, &mut *tx).await?;
        tx.commit().await?;

        tracing::info!(
            report_id = %report.id,
            from = %entry.from_status.as_str(),
            to = %entry.to_status.as_str(),
            decision = %entry.decision,
            role = %entry.reviewer_role.as_str(),
            "Report transition applied"
        );
        Ok(true)
    }

    async fn mark_reminded(&self, report_id: Uuid, at: DateTime<Utc>) -> Result<bool> {
        let updated = sqlx::query(
            r#"
            UPDATE reports
            SET reminded_at = $2, updated_at = $2
            WHERE id = $1 AND status = 'submitted' AND reminded_at IS NULL
            "#,
        )
        .bind(report_id)
        .bind(at)
        .execute(&*self.pool)
        .await?
        .rows_affected();
        Ok(updated > 0)
    }

    async fn set_forward_status(&self, report_id: Uuid, status: ForwardStatus) -> Result<()> {
        sqlx::query("UPDATE reports SET forward_status = $2, updated_at = $3 WHERE id = $1")
            .bind(report_id)
            .bind(status)
            .bind(Utc::now())
            .execute(&*self.pool)
            .await?;
        Ok(())
    }

    async fn append_history(&self, entry: &EscalationHistory) -> Result<()> {
        Self::insert_history(entry, &*self.pool).await
    }

    async fn history(&self, report_id: Uuid) -> Result<Vec<EscalationHistory>> {
        let rows = sqlx::query_as::<_, EscalationHistory>(
            r#"
            SELECT id, report_id, from_status, to_status, reviewer_id,
                   reviewer_role, decision, notes, created_at
            FROM escalation_history
            WHERE report_id = $1
            ORDER BY created_at ASC
            "#,
        )
        .bind(report_id)
        .fetch_all(&*self.pool)
        .await?;
        Ok(rows)
    }

    async fn list_due(&self, now: DateTime<Utc>) -> Result<Vec<Report>> {
        let reports = sqlx::query_as::<_, Report>(&format!(
            r#"
            SELECT {} FROM reports
            WHERE status = 'submitted' AND deadline <= $1
            ORDER BY deadline ASC
            "#,
            REPORT_COLUMNS
        ))
        .bind(now)
        .fetch_all(&*self.pool)
        .await?;
        Ok(reports)
    }

    async fn list_reminder_due(
        &self,
        now: DateTime<Utc>,
        lead: Duration,
    ) -> Result<Vec<Report>> {
        let reports = sqlx::query_as::<_, Report>(&format!(
            r#"
            SELECT {} FROM reports
            WHERE status = 'submitted'
              AND reminded_at IS NULL
              AND deadline > $1
              AND deadline <= $2
            ORDER BY deadline ASC
            "#,
            REPORT_COLUMNS
        ))
        .bind(now)
        .bind(now + lead)
        .fetch_all(&*self.pool)
        .await?;
        Ok(reports)
    }

    async fn is_reporter_blocked(&self, fingerprint: &str) -> Result<bool> {
        let blocked: bool = sqlx::query_scalar(
            "SELECT EXISTS(SELECT 1 FROM blocked_reporters WHERE fingerprint = $1)",
        )
        .bind(fingerprint)
        .fetch_one(&*self.pool)
        .await?;
        Ok(blocked)
    }

    async fn reporter_activity_since(
        &self,
        fingerprint: &str,
        since: DateTime<Utc>,
    ) -> Result<(i64, i64)> {
        let stats = sqlx::query_as::<_, (i64, i64)>(
            r#"
            SELECT COUNT(*), COUNT(DISTINCT event_id)
            FROM reports
            WHERE fingerprint = $1 AND created_at > $2
            "#,
        )
        .bind(fingerprint)
        .bind(since)
        .fetch_one(&*self.pool)
        .await?;
        Ok(stats)
    }

    async fn distinct_reporters_for_event_since(
        &self,
        event_id: Uuid,
        since: DateTime<Utc>,
    ) -> Result<i64> {
        let count: i64 = sqlx::query_scalar(
            r#"
            SELECT COUNT(DISTINCT fingerprint)
            FROM reports
            WHERE event_id = $1 AND created_at > $2
            "#,
        )
        .bind(event_id)
        .bind(since)
        .fetch_one(&*self.pool)
        .await?;
        Ok(count)
    }

    async fn distinct_reported_events_since(
        &self,
        event_ids: &[Uuid],
        since: DateTime<Utc>,
    ) -> Result<i64> {
        let count: i64 = sqlx::query_scalar(
            r#"
            SELECT COUNT(DISTINCT event_id)
            FROM reports
            WHERE event_id = ANY($1) AND created_at > $2
            "#,
        )
        .bind(event_ids)
        .bind(since)
        .fetch_one(&*self.pool)
        .await?;
        Ok(count)
    }

    async fn list_created_between(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<Report>> {
        let reports = sqlx::query_as::<_, Report>(&format!(
            r#"
            SELECT {} FROM reports
            WHERE created_at >= $1 AND created_at < $2
            ORDER BY created_at ASC
            "#,
            REPORT_COLUMNS
        ))
        .bind(start)
        .bind(end)
        .fetch_all(&*self.pool)
        .await?;
        Ok(reports)
    }
}
