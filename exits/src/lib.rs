#![forbid(unsafe_code)]
#![warn(missing_debug_implementations, rust_2018_idioms)]

//! # Exits - Exit Condition Detection & Placement
//!
//! Detects exit conditions per tick for open trades (trailing stop,
//! brick-reversal, max holding time), confirms them via the brick-movement
//! accumulator, re-arms episodes, and places the resulting exit order
//! (`spec.md` §4.9). [`service::ExitSignalService`] never writes
//! `exit_signals`/`exit_intents` lifecycle fields directly — those go
//! through [`atlas_sms::SignalManagementService`] — it owns only the
//! broker-facing placement steps and its own in-memory per-trade trackers.

pub mod conditions;
pub mod error;
pub mod events;
pub mod service;
pub mod tracker;

pub use conditions::ExitConfig;
pub use error::ExitsError;
pub use events::ExitsEvent;
pub use service::ExitSignalService;
pub use tracker::BrickTracker;
