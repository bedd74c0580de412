#![forbid(unsafe_code)]
#![warn(
    unused,
    clippy::cognitive_complexity,
    unused_extern_crates,
    clippy::unused_self,
    clippy::useless_let_if_seq,
    missing_debug_implementations,
    rust_2018_idioms
)]
#![allow(clippy::type_complexity, clippy::too_many_arguments)]

//! # 🏛️ Core - Shared Foundations of the Atlas Trading Platform
//!
//! Domain primitives shared by every subsystem crate in the workspace: symbol and
//! timeframe types, monetary/probability newtypes, the `Timed<T>` wrapper, the
//! `Sequence` counter, graceful-shutdown traits, and `tracing` logging
//! initialisers. This crate sits at the bottom of the dependency graph (leaves
//! first: `core` → `persistence` → `broker` → `marketdata` → `signals` → `sms` →
//! `risk` → `execution` → `tms` → `exits` → `reconcile`) and therefore never
//! depends on any other workspace crate.
//!
//! ## 🏗️ What lives here vs. elsewhere
//!
//! - **Here**: types every subsystem needs a shared vocabulary for (`Symbol`,
//!   `Direction`, `Timeframe`, `Timed<T>`), process-lifecycle plumbing
//!   (`shutdown`, `logging`).
//! - **Not here**: the top-level error aggregation (`atlas-app::error::AtlasError`)
//!   lives in the composition root, since only it depends on every subsystem's
//!   error type.

pub mod domain;
pub mod event_writer;
pub mod logging;
pub mod shutdown;

pub use domain::*;
pub use event_writer::{bounded, EventDrain, EventWriter};

use derive_more::Constructor;
use serde::{Deserialize, Serialize};

/// A timed value — pairs a value with the UTC instant it was observed or computed.
#[derive(
    Debug,
    Copy,
    Clone,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Deserialize,
    Serialize,
    Constructor,
)]
pub struct Timed<T> {
    pub value: T,
    pub time: chrono::DateTime<chrono::Utc>,
}

/// Monotonically increasing sequence used to order events processed by a
/// single-writer component (candle builder tick loop, SMS writer, TMS writer).
#[derive(
    Debug, Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Deserialize, Serialize, Constructor,
)]
pub struct Sequence(pub u64);

impl Sequence {
    pub fn value(&self) -> u64 {
        self.0
    }

    /// Returns the current sequence and increments the internal counter.
    pub fn fetch_add(&mut self) -> Sequence {
        let current = *self;
        self.0 += 1;
        current
    }
}

/// India Standard Time offset (UTC+05:30, fixed — no daylight-saving transitions),
/// used to extract the `tradingDay` component of signal/exit-episode dedupe keys.
pub fn ist_offset() -> chrono::FixedOffset {
    chrono::FixedOffset::east_opt(5 * 3600 + 30 * 60).expect("valid fixed offset")
}

/// Extracts the IST calendar date for a UTC instant, used as the `tradingDay`
/// component of the signal dedupe key in `spec.md` §4.4's unique index.
pub fn trading_day_ist(at: chrono::DateTime<chrono::Utc>) -> chrono::NaiveDate {
    at.with_timezone(&ist_offset()).date_naive()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn sequence_fetch_add_is_post_increment() {
        let mut seq = Sequence(0);
        assert_eq!(seq.fetch_add().value(), 0);
        assert_eq!(seq.fetch_add().value(), 1);
        assert_eq!(seq.value(), 2);
    }

    #[test]
    fn trading_day_crosses_midnight_utc_into_ist() {
        // 2026-01-14 19:00 UTC == 2026-01-15 00:30 IST
        let at = chrono::Utc.with_ymd_and_hms(2026, 1, 14, 19, 0, 0).unwrap();
        assert_eq!(
            trading_day_ist(at),
            chrono::NaiveDate::from_ymd_opt(2026, 1, 15).unwrap()
        );
    }
}
