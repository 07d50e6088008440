//! Invoicing service: invoices, clients, recurring generation and debt
//! collection tracking.

pub mod config;
pub mod handlers;
pub mod middleware;
pub mod models;
pub mod services;
pub mod startup;
pub mod workers;
