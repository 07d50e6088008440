//! HTTP handlers for invoicing-service.

pub mod clients;
pub mod debt_collections;
pub mod generation_runs;
pub mod health;
pub mod invoices;
pub mod line_items;
pub mod stats;
