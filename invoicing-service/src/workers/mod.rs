//! Background workers for invoicing-service.

pub mod recurring;

pub use recurring::{start_generation_worker, RecurringGenerator};
