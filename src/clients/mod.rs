//! Default collaborator implementations wired up by the binary: platform-DB
//! lookups for calendars/events, an HTTP federation transport, a log-only
//! notifier for deployments without a mail relay, and an in-process rate
//! limiter.

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;
use serde_json::Value;
use sqlx::PgPool;
use std::sync::Arc;
use uuid::Uuid;

use crate::error::{ReportError, Result};
use crate::repository::{
    CalendarAccess, CalendarRole, EventDirectory, EventRef, FederationTransport,
    NotificationKind, Notifier, RateLimiter,
};

/// Calendar grants resolved from the platform database.
pub struct PgCalendarAccess {
    pool: Arc<PgPool>,
}

impl PgCalendarAccess {
    pub fn new(pool: Arc<PgPool>) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl CalendarAccess for PgCalendarAccess {
    async fn review_role(
        &self,
        account_id: Uuid,
        calendar_id: Uuid,
    ) -> Result<Option<CalendarRole>> {
        let owner: bool = sqlx::query_scalar(
            "SELECT EXISTS(SELECT 1 FROM calendars WHERE id = $1 AND owner_account_id = $2)",
        )
        .bind(calendar_id)
        .bind(account_id)
        .fetch_one(&*self.pool)
        .await?;
        if owner {
            return Ok(Some(CalendarRole::Owner));
        }

        let editor: bool = sqlx::query_scalar(
            "SELECT EXISTS(SELECT 1 FROM calendar_editors WHERE calendar_id = $1 AND account_id = $2)",
        )
        .bind(calendar_id)
        .bind(account_id)
        .fetch_one(&*self.pool)
        .await?;
        Ok(editor.then_some(CalendarRole::Editor))
    }

    async fn is_admin(&self, account_id: Uuid) -> Result<bool> {
        let admin: bool = sqlx::query_scalar(
            "SELECT EXISTS(SELECT 1 FROM accounts WHERE id = $1 AND is_admin)",
        )
        .bind(account_id)
        .fetch_one(&*self.pool)
        .await?;
        Ok(admin)
    }
}

/// Event lookups against the platform database.
pub struct PgEventDirectory {
    pool: Arc<PgPool>,
}

impl PgEventDirectory {
    pub fn new(pool: Arc<PgPool>) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl EventDirectory for PgEventDirectory {
    async fn get_event(&self, event_id: Uuid) -> Result<Option<EventRef>> {
        let row = sqlx::query_as::<_, (Uuid, Option<Uuid>, Option<String>, Option<Uuid>)>(
            "SELECT id, calendar_id, source_url, series_id FROM events WHERE id = $1",
        )
        .bind(event_id)
        .fetch_optional(&*self.pool)
        .await?;
        Ok(row.map(|(id, calendar_id, source_url, series_id)| EventRef {
            id,
            calendar_id,
            source_url,
            series_id,
        }))
    }

    async fn events_in_series(&self, series_id: Uuid) -> Result<Vec<Uuid>> {
        let ids: Vec<Uuid> =
            sqlx::query_scalar("SELECT id FROM events WHERE series_id = $1")
                .bind(series_id)
                .fetch_all(&*self.pool)
                .await?;
        Ok(ids)
    }
}

/// Notifier that only logs. Deployments plug the platform's notification
/// relay in behind the same trait.
#[derive(Default)]
pub struct LoggingNotifier;

#[async_trait]
impl Notifier for LoggingNotifier {
    async fn send(&self, kind: NotificationKind, recipient: &str, data: Value) -> Result<()> {
        tracing::info!(
            kind = kind.as_str(),
            recipient = %recipient,
            data = %data,
            "Notification dispatched"
        );
        Ok(())
    }
}

/// Delivers flag activities to the remote admin actor's inbox over HTTPS.
/// Signing, retries and delivery receipts live with the remote relay.
pub struct HttpFederationTransport {
    client: reqwest::Client,
}

impl Default for HttpFederationTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl HttpFederationTransport {
    pub fn new() -> Self {
        Self {
            client: reqwest::Client::new(),
        }
    }
}

#[async_trait]
impl FederationTransport for HttpFederationTransport {
    async fn deliver_flag(&self, remote_admin_actor: &str, payload: Value) -> Result<bool> {
        let response = self
            .client
            .post(format!("{}/inbox", remote_admin_actor))
            .json(&payload)
            .send()
            .await
            .map_err(|e| ReportError::Federation(e.to_string()))?;
        Ok(response.status().is_success())
    }
}

/// In-process fixed-window counter: each key gets `limit` permits per
/// window, and the window resets wholesale once it elapses.
#[derive(Default)]
pub struct FixedWindowLimiter {
    windows: DashMap<String, (DateTime<Utc>, u32)>,
}

impl FixedWindowLimiter {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl RateLimiter for FixedWindowLimiter {
    async fn check_and_increment(&self, key: &str, window: Duration, limit: u32) -> Result<bool> {
        let now = Utc::now();
        let mut entry = self
            .windows
            .entry(key.to_string())
            .or_insert((now, 0));
        let (started, count) = *entry;
        if now - started >= window {
            *entry = (now, 1);
            return Ok(true);
        }
        if count >= limit {
            return Ok(false);
        }
        *entry = (started, count + 1);
        Ok(true)
    }
}
