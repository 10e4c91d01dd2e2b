pub mod escalation;

pub use escalation::{EscalationScheduler, PassStats};
