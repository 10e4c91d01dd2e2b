pub mod clients;
pub mod config;
pub mod error;
pub mod handlers;
pub mod jobs;
pub mod models;
pub mod repository;
pub mod services;

#[cfg(test)]
pub mod testing;

// Re-export commonly used types
pub use config::Config;
pub use error::{ReportError, Result};
pub use models::{Report, ReportCategory, ReportPriority, ReportStatus, ReporterType};
pub use services::{
    AnalyticsAggregator, AuthorizationResolver, LifecycleEngine, PatternDetector,
    SubmissionGateway, VerificationService,
};
