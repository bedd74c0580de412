#![forbid(unsafe_code)]
#![warn(missing_debug_implementations, rust_2018_idioms)]

//! # Risk - Intent Validation & Portfolio Gates
//!
//! Turns a `DELIVERED` signal delivery into an `APPROVED` or `REJECTED`
//! trade intent: loads per-`UserBroker` portfolio context, runs the fixed
//! gate order (`spec.md` §4.6), sizes the position with a fractional-Kelly
//! stake, and atomically consumes the delivery on approval.

pub mod atr;
pub mod config;
pub mod error;
pub mod gates;
pub mod service;

pub use atr::average_true_range;
pub use config::RiskConfig;
pub use error::RiskError;
pub use gates::{RejectionCode, RiskContext, RiskGate};
pub use service::{ValidationOutcome, ValidationService};
