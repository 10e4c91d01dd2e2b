pub mod analytics;
pub mod authorization;
pub mod lifecycle;
pub mod patterns;
pub mod submission;
pub mod verification;

pub use analytics::{AnalyticsAggregator, ReportAnalytics};
pub use authorization::AuthorizationResolver;
pub use lifecycle::{AdminAction, LifecycleEngine, OwnerAction};
pub use patterns::PatternDetector;
pub use submission::{Reporter, SubmissionGateway, SubmitReportInput};
pub use verification::VerificationService;
