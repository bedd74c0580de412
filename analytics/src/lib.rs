#![forbid(unsafe_code)]
#![warn(missing_debug_implementations, rust_2018_idioms)]

//! # Analytics - Calibration and Portfolio Reporting
//!
//! Pure, dependency-free (beyond `rust_decimal`/`serde`/`chrono`) functions
//! shared by the signal generator (`pWin`/`pFill`/`kelly` at signal
//! construction, `spec.md` §4.4) and the risk module (Kelly-based position
//! sizing, `spec.md` §4.6). Carries no I/O and no `atlas-core`/
//! `atlas-persistence` dependency so it can sit below both without creating a
//! cycle.

pub mod calibration;
pub mod kelly;
pub mod portfolio;
pub mod round;

pub use calibration::{p_fill, p_win, ConfluenceTier};
pub use kelly::{kelly_fraction, position_size};
pub use portfolio::{summarize, ClosedTrade, PortfolioSummary};
pub use round::round_price;
