pub mod reports;

pub use reports::{configure, AccountId, AppState};
