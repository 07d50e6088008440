//! Business services for invoicing-service.

pub mod database;
pub mod email;
pub mod metrics;
pub mod usage_reporter;

pub use database::{DashboardStats, Database};
pub use email::EmailService;
pub use usage_reporter::UsageReporter;
