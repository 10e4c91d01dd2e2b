//! Shared fakes for unit tests: fixed event/calendar directories, static
//! authorization grants and recording collaborators.

use async_trait::async_trait;
use chrono::Duration;
use serde_json::Value;
use std::collections::{HashMap, HashSet};
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::config::Config;
use crate::error::Result;
use crate::repository::{
    CalendarAccess, CalendarRole, EventDirectory, EventRef, FederationTransport,
    NotificationKind, Notifier, RateLimiter,
};

pub fn default_calendar_id() -> Uuid {
    Uuid::from_u128(0xCA1)
}

pub fn default_event_id() -> Uuid {
    Uuid::from_u128(0xE0E)
}

pub fn test_config() -> Config {
    Config {
        http_port: 0,
        database_url: "postgres://unused".to_string(),
        db_max_connections: 1,
        auto_escalation_hours: 48,
        admin_report_escalation_hours: 24,
        reminder_before_escalation_hours: 12,
        verification_token_ttl_hours: 24,
        verification_emails_per_hour: 5,
        scheduler_interval_secs: 3600,
        source_flooding_min_reports: 5,
        source_flooding_min_events: 3,
        event_targeting_min_reporters: 3,
        instance_pattern_min_events: 3,
        pattern_window_hours: 24,
        instance_pattern_window_hours: 168,
        service_name: "event-report-service".to_string(),
        environment: "test".to_string(),
        instance_domain: "events.test".to_string(),
    }
}

#[derive(Default)]
struct FixedEventsInner {
    events: HashMap<Uuid, EventRef>,
    series: HashMap<Uuid, Vec<Uuid>>,
}

/// Event directory with a known local event plus whatever the test adds.
#[derive(Default)]
pub struct FixedEvents {
    inner: RwLock<FixedEventsInner>,
}

impl FixedEvents {
    pub fn with_local_event() -> Self {
        let fixture = Self::default();
        let event = EventRef {
            id: default_event_id(),
            calendar_id: Some(default_calendar_id()),
            source_url: None,
            series_id: None,
        };
        fixture
            .inner
            .try_write()
            .expect("fresh lock")
            .events
            .insert(event.id, event);
        fixture
    }

    pub fn event_id(&self) -> Uuid {
        default_event_id()
    }

    pub fn calendar_id(&self) -> Uuid {
        default_calendar_id()
    }

    pub async fn add_remote_event(&self, source_url: &str) -> Uuid {
        let id = Uuid::new_v4();
        self.inner.write().await.events.insert(
            id,
            EventRef {
                id,
                calendar_id: None,
                source_url: Some(source_url.to_string()),
                series_id: None,
            },
        );
        id
    }

    /// Register `count` occurrences of one recurring series.
    pub async fn add_series(&self, count: usize) -> Vec<Uuid> {
        let series_id = Uuid::new_v4();
        let mut inner = self.inner.write().await;
        let mut occurrences = Vec::with_capacity(count);
        for _ in 0..count {
            let id = Uuid::new_v4();
            inner.events.insert(
                id,
                EventRef {
                    id,
                    calendar_id: Some(default_calendar_id()),
                    source_url: None,
                    series_id: Some(series_id),
                },
            );
            occurrences.push(id);
        }
        inner.series.insert(series_id, occurrences.clone());
        occurrences
    }
}

#[async_trait]
impl EventDirectory for FixedEvents {
    async fn get_event(&self, event_id: Uuid) -> Result<Option<EventRef>> {
        Ok(self.inner.read().await.events.get(&event_id).cloned())
    }

    async fn events_in_series(&self, series_id: Uuid) -> Result<Vec<Uuid>> {
        Ok(self
            .inner
            .read()
            .await
            .series
            .get(&series_id)
            .cloned()
            .unwrap_or_default())
    }
}

/// Authorization grants declared up front by the test.
#[derive(Default)]
pub struct StaticAccess {
    owners: HashSet<(Uuid, Uuid)>,
    editors: HashSet<(Uuid, Uuid)>,
    admins: HashSet<Uuid>,
}

impl StaticAccess {
    pub fn with_owner(account_id: Uuid) -> Self {
        let mut access = Self::default();
        access.grant_owner(account_id, default_calendar_id());
        access
    }

    pub fn with_editor(account_id: Uuid) -> Self {
        let mut access = Self::default();
        access.editors.insert((account_id, default_calendar_id()));
        access
    }

    pub fn with_admin(account_id: Uuid) -> Self {
        let mut access = Self::default();
        access.admins.insert(account_id);
        access
    }

    pub fn grant_owner(&mut self, account_id: Uuid, calendar_id: Uuid) {
        self.owners.insert((account_id, calendar_id));
    }

    pub fn add_admin(&mut self, account_id: Uuid) {
        self.admins.insert(account_id);
    }
}

#[async_trait]
impl CalendarAccess for StaticAccess {
    async fn review_role(
        &self,
        account_id: Uuid,
        calendar_id: Uuid,
    ) -> Result<Option<CalendarRole>> {
        if self.owners.contains(&(account_id, calendar_id)) {
            Ok(Some(CalendarRole::Owner))
        } else if self.editors.contains(&(account_id, calendar_id)) {
            Ok(Some(CalendarRole::Editor))
        } else {
            Ok(None)
        }
    }

    async fn is_admin(&self, account_id: Uuid) -> Result<bool> {
        Ok(self.admins.contains(&account_id))
    }
}

/// Captures every notification instead of sending it.
#[derive(Default)]
pub struct RecordingNotifier {
    sent: RwLock<Vec<(NotificationKind, String, Value)>>,
}

impl RecordingNotifier {
    pub async fn sent(&self) -> Vec<(NotificationKind, String, Value)> {
        self.sent.read().await.clone()
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn send(&self, kind: NotificationKind, recipient: &str, data: Value) -> Result<()> {
        self.sent
            .write()
            .await
            .push((kind, recipient.to_string(), data));
        Ok(())
    }
}

/// Captures flag deliveries; can be told to reject the next one.
#[derive(Default)]
pub struct RecordingTransport {
    deliveries: RwLock<Vec<(String, Value)>>,
    reject_next: RwLock<bool>,
}

impl RecordingTransport {
    pub async fn deliveries(&self) -> Vec<(String, Value)> {
        self.deliveries.read().await.clone()
    }

    pub async fn reject_next(&self) {
        *self.reject_next.write().await = true;
    }
}

#[async_trait]
impl FederationTransport for RecordingTransport {
    async fn deliver_flag(&self, remote_admin_actor: &str, payload: Value) -> Result<bool> {
        let mut reject = self.reject_next.write().await;
        if *reject {
            *reject = false;
            return Ok(false);
        }
        self.deliveries
            .write()
            .await
            .push((remote_admin_actor.to_string(), payload));
        Ok(true)
    }
}

/// Rate limiter that always allows.
#[derive(Default)]
pub struct UnlimitedLimiter;

#[async_trait]
impl RateLimiter for UnlimitedLimiter {
    async fn check_and_increment(&self, _key: &str, _window: Duration, _limit: u32) -> Result<bool> {
        Ok(true)
    }
}

/// Rate limiter that always blocks.
#[derive(Default)]
pub struct DenyLimiter;

#[async_trait]
impl RateLimiter for DenyLimiter {
    async fn check_and_increment(&self, _key: &str, _window: Duration, _limit: u32) -> Result<bool> {
        Ok(false)
    }
}
