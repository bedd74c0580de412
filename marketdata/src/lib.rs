#![forbid(unsafe_code)]
#![warn(missing_debug_implementations, rust_2018_idioms)]

//! # Marketdata - Tick Ingestion and Multi-Timeframe Candle Construction
//!
//! One [`ingest::IngestTask`] per symbol owns that symbol's entry in the
//! [`cache::MarketDataCache`] and its [`candle::CandleBuilder`] partials,
//! enforcing the single-writer-per-symbol discipline `spec.md` §4.3 and §5
//! require. [`dedupe`] filters duplicate wire deliveries before they reach
//! either. [`aggregator`] turns a run of finer-timeframe candles into a
//! coarser one for backfill, and [`recovery`] detects and closes gaps.

pub mod aggregator;
pub mod cache;
pub mod candle;
pub mod dedupe;
pub mod error;
pub mod ingest;
pub mod recovery;

pub use cache::MarketDataCache;
pub use candle::{CandleBuilder, PartialCandle};
pub use dedupe::TickDeduplicator;
pub use error::MarketDataError;
pub use ingest::{IngestTask, TickChannel, TickEvent};
pub use recovery::RecoveryManager;
