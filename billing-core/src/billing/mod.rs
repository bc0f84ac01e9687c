//! Lifecycle rules and amount derivation for the billing graph.
//!
//! Everything here is pure: functions take records in and return decisions
//! or validation messages. Persistence and sequencing live in
//! [`crate::service`].

pub mod crediting;
pub mod eligibility;
pub mod invoicing;
pub mod lifecycle;
pub mod messages;
pub mod rate_history;
pub mod sessions;

pub use eligibility::{Blocker, Deletability};
pub use lifecycle::Lifecycle;
pub use rate_history::{validate_no_overlap, RateChange, RateHistory};
