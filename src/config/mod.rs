use serde::Deserialize;
use std::env;

use crate::error::{ReportError, Result};

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    // Server configuration
    pub http_port: u16,

    // Database configuration
    pub database_url: String,
    pub db_max_connections: u32,

    // Escalation deadlines (hours, must be positive)
    pub auto_escalation_hours: i64,
    pub admin_report_escalation_hours: i64,
    pub reminder_before_escalation_hours: i64,

    // Verification
    pub verification_token_ttl_hours: i64,
    pub verification_emails_per_hour: u32,

    // Scheduler
    pub scheduler_interval_secs: u64,

    // Pattern detection thresholds
    pub source_flooding_min_reports: i64,
    pub source_flooding_min_events: i64,
    pub event_targeting_min_reporters: i64,
    pub instance_pattern_min_events: i64,
    pub pattern_window_hours: i64,
    pub instance_pattern_window_hours: i64,

    // Service configuration
    pub service_name: String,
    pub environment: String,
    pub instance_domain: String,
}

fn env_or<T: std::str::FromStr>(key: &str, default: T) -> T {
    env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();

        let config = Self {
            http_port: env_or("HTTP_PORT", 8094),
            database_url: env::var("DATABASE_URL")
                .map_err(|_| ReportError::Config("DATABASE_URL must be set".to_string()))?,
            db_max_connections: env_or("DB_MAX_CONNECTIONS", 20),
            auto_escalation_hours: env_or("AUTO_ESCALATION_HOURS", 48),
            admin_report_escalation_hours: env_or("ADMIN_REPORT_ESCALATION_HOURS", 24),
            reminder_before_escalation_hours: env_or("REMINDER_BEFORE_ESCALATION_HOURS", 12),
            verification_token_ttl_hours: env_or("VERIFICATION_TOKEN_TTL_HOURS", 24),
            verification_emails_per_hour: env_or("VERIFICATION_EMAILS_PER_HOUR", 5),
            scheduler_interval_secs: env_or("SCHEDULER_INTERVAL_SECS", 3600),
            source_flooding_min_reports: env_or("SOURCE_FLOODING_MIN_REPORTS", 5),
            source_flooding_min_events: env_or("SOURCE_FLOODING_MIN_EVENTS", 3),
            event_targeting_min_reporters: env_or("EVENT_TARGETING_MIN_REPORTERS", 3),
            instance_pattern_min_events: env_or("INSTANCE_PATTERN_MIN_EVENTS", 3),
            pattern_window_hours: env_or("PATTERN_WINDOW_HOURS", 24),
            instance_pattern_window_hours: env_or("INSTANCE_PATTERN_WINDOW_HOURS", 168),
            service_name: env::var("SERVICE_NAME")
                .unwrap_or_else(|_| "event-report-service".to_string()),
            environment: env::var("ENVIRONMENT").unwrap_or_else(|_| "development".to_string()),
            instance_domain: env::var("INSTANCE_DOMAIN")
                .unwrap_or_else(|_| "localhost".to_string()),
        };

        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        for (name, value) in [
            ("AUTO_ESCALATION_HOURS", self.auto_escalation_hours),
            (
                "ADMIN_REPORT_ESCALATION_HOURS",
                self.admin_report_escalation_hours,
            ),
            (
                "REMINDER_BEFORE_ESCALATION_HOURS",
                self.reminder_before_escalation_hours,
            ),
            (
                "VERIFICATION_TOKEN_TTL_HOURS",
                self.verification_token_ttl_hours,
            ),
        ] {
            if value <= 0 {
                return Err(ReportError::Config(format!(
                    "{} must be a positive number of hours, got {}",
                    name, value
                )));
            }
        }
        if self.scheduler_interval_secs == 0 {
            return Err(ReportError::Config(
                "SCHEDULER_INTERVAL_SECS must be positive".to_string(),
            ));
        }
        Ok(())
    }
}
