#![forbid(unsafe_code)]
#![warn(missing_debug_implementations, rust_2018_idioms)]

//! # Reconcile - Broker-Truth Reconciliation
//!
//! Two periodic sweeps that keep `orders`/`trades` converged with what the
//! broker actually reports, since `spec.md` §5 makes the reconciler the
//! single writer of post-placement `Order` status updates: a crashed
//! placement, a dropped status callback, or a broker-side state change that
//! never reaches this process any other way all resolve here on the next
//! sweep. [`entry::PendingOrderReconciler`] chases entry orders;
//! [`exit::ExitOrderReconciler`] is identical in structure but chases exit
//! orders, run on an offset schedule so the two sweeps never contend for the
//! same broker's rate limiter at once (`spec.md` §4.10).

pub mod entry;
pub mod error;
pub mod exit;
pub mod status_map;

pub use entry::PendingOrderReconciler;
pub use error::ReconcileError;
pub use exit::ExitOrderReconciler;
