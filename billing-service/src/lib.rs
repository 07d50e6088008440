//! Billing service: subscription state, plan limits and the entitlement gate.

pub mod config;
pub mod handlers;
pub mod middleware;
pub mod models;
pub mod services;
pub mod startup;
