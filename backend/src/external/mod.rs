//! External service integrations

pub mod notifier;
pub mod reporting;

pub use notifier::Notifier;
pub use reporting::{ReportOutcome, ReportingClient};
