use actix_web::{http::StatusCode, HttpResponse, ResponseError};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ReportError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("{0}")]
    Validation(String),

    #[error("Event not found: {0}")]
    EventNotFound(uuid::Uuid),

    #[error("Report not found: {0}")]
    ReportNotFound(uuid::Uuid),

    /// Covers both unknown and expired tokens so a caller cannot probe which.
    #[error("Invalid or expired verification token")]
    InvalidVerificationToken,

    #[error("A report for this event by this reporter is already under review")]
    DuplicateReport,

    #[error("This reporter has been blocked from filing reports")]
    ReporterBlocked,

    /// Optimistic-concurrency guard: the report moved since it was read.
    #[error("Report has already been reviewed")]
    ReportAlreadyResolved,

    #[error("Forbidden")]
    Forbidden,

    #[error("Too many verification emails requested for this address")]
    EmailRateLimit,

    #[error("Federation delivery failed: {0}")]
    Federation(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl ReportError {
    /// Stable machine-readable name surfaced in the error payload
    pub fn error_name(&self) -> &'static str {
        match self {
            ReportError::Database(_) => "DatabaseError",
            ReportError::Validation(_) => "ValidationError",
            ReportError::EventNotFound(_) => "EventNotFoundError",
            ReportError::ReportNotFound(_) => "ReportNotFoundError",
            ReportError::InvalidVerificationToken => "InvalidVerificationTokenError",
            ReportError::DuplicateReport => "DuplicateReportError",
            ReportError::ReporterBlocked => "ReporterBlockedError",
            ReportError::ReportAlreadyResolved => "ReportAlreadyResolvedError",
            ReportError::Forbidden => "ForbiddenError",
            ReportError::EmailRateLimit => "EmailRateLimitError",
            ReportError::Federation(_) => "FederationError",
            ReportError::Config(_) => "ConfigError",
            ReportError::Internal(_) => "InternalError",
        }
    }
}

impl ResponseError for ReportError {
    fn status_code(&self) -> StatusCode {
        match self {
            ReportError::Validation(_) | ReportError::InvalidVerificationToken => {
                StatusCode::BAD_REQUEST
            }
            ReportError::Forbidden | ReportError::ReporterBlocked => StatusCode::FORBIDDEN,
            ReportError::EventNotFound(_) | ReportError::ReportNotFound(_) => {
                StatusCode::NOT_FOUND
            }
            ReportError::DuplicateReport | ReportError::ReportAlreadyResolved => {
                StatusCode::CONFLICT
            }
            ReportError::EmailRateLimit => StatusCode::TOO_MANY_REQUESTS,
            ReportError::Federation(_) => StatusCode::BAD_GATEWAY,
            ReportError::Database(_) | ReportError::Config(_) | ReportError::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    fn error_response(&self) -> HttpResponse {
        let status = self.status_code();

        // Server-side detail stays in the logs; 5xx responses carry no detail.
        let message = match self {
            ReportError::Database(e) => {
                tracing::error!("Database error: {:?}", e);
                "Internal server error".to_string()
            }
            ReportError::Config(e) => {
                tracing::error!("Configuration error: {}", e);
                "Internal server error".to_string()
            }
            ReportError::Internal(e) => {
                tracing::error!("Internal error: {}", e);
                "Internal server error".to_string()
            }
            ReportError::Federation(e) => {
                tracing::warn!("Federation delivery failed: {}", e);
                self.to_string()
            }
            other => other.to_string(),
        };

        HttpResponse::build(status).json(serde_json::json!({
            "error": message,
            "errorName": self.error_name(),
        }))
    }
}

pub type Result<T> = std::result::Result<T, ReportError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_classes() {
        assert_eq!(
            ReportError::Validation("bad".into()).status_code(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(ReportError::Forbidden.status_code(), StatusCode::FORBIDDEN);
        assert_eq!(
            ReportError::ReportNotFound(uuid::Uuid::new_v4()).status_code(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            ReportError::DuplicateReport.status_code(),
            StatusCode::CONFLICT
        );
        assert_eq!(
            ReportError::EmailRateLimit.status_code(),
            StatusCode::TOO_MANY_REQUESTS
        );
        assert_eq!(
            ReportError::Internal("boom".into()).status_code(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn test_token_errors_are_indistinguishable() {
        // Unknown and expired tokens must surface the same name and message.
        let e = ReportError::InvalidVerificationToken;
        assert_eq!(e.error_name(), "InvalidVerificationTokenError");
        assert_eq!(e.to_string(), "Invalid or expired verification token");
    }

    #[test]
    fn test_error_names_are_stable() {
        assert_eq!(
            ReportError::DuplicateReport.error_name(),
            "DuplicateReportError"
        );
        assert_eq!(
            ReportError::ReportAlreadyResolved.error_name(),
            "ReportAlreadyResolvedError"
        );
        assert_eq!(ReportError::Forbidden.error_name(), "ForbiddenError");
    }
}
