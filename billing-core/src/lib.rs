//! Billing core for a small practice: clients and their rate history,
//! billable sessions, invoices, credit notes and the messages printed on
//! new invoices.
//!
//! [`service::BillingService`] is the entry point; it runs every operation
//! inside one unit of work on a [`store::BillingStore`]. [`api`] exposes the
//! same operations over HTTP.

pub mod api;
pub mod auth;
pub mod billing;
pub mod clock;
pub mod config;
pub mod db;
pub mod delivery;
pub mod error;
pub mod models;
pub mod service;
pub mod store;

pub use error::{BillingError, Result};
pub use service::BillingService;
