#![forbid(unsafe_code)]
#![warn(missing_debug_implementations, rust_2018_idioms)]

//! # Execution - Order Placement Orchestrator
//!
//! Turns an `APPROVED` trade intent into a placed broker order (`spec.md`
//! §4.7): creates the `Trade` row, creates the `Order` row, places it at the
//! broker under a per-`UserBroker` rate limiter and a 10s deadline, and
//! applies the outcome to `trades`/`orders`/`trade_intents`. Every step is
//! idempotent against a crash between any two of them.

pub mod error;
pub mod events;
pub mod orchestrator;
pub mod order_service;

pub use error::ExecutionError;
pub use events::ExecutionEvent;
pub use orchestrator::ExecutionOrchestrator;
pub use order_service::{OrderPlacementService, PLACEMENT_DEADLINE};
