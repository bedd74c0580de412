//! # Logging Configuration
//!
//! Standardised `tracing` configuration for the Atlas platform: human-readable
//! output for local development, JSON output for log aggregators, both driven by
//! `RUST_LOG`.
//!
//! ## Usage
//!
//! ```rust,no_run
//! atlas_core::logging::init_logging();
//! tracing::info!("atlas starting");
//! ```
//!
//! ### JSON (aggregators / observability)
//! ```rust,no_run
//! atlas_core::logging::init_json_logging();
//! tracing::info!("atlas starting");
//! ```
//!
//! ```bash
//! export RUST_LOG=info
//! export RUST_LOG=atlas_marketdata=debug,atlas_execution=warn
//! ```

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

fn env_filter() -> tracing_subscriber::EnvFilter {
    tracing_subscriber::EnvFilter::builder()
        .with_default_directive(tracing_subscriber::filter::LevelFilter::INFO.into())
        .from_env_lossy()
}

/// Initialises human-readable logging.
pub fn init_logging() {
    tracing_subscriber::registry()
        .with(env_filter())
        .with(tracing_subscriber::fmt::layer())
        .init()
}

/// Initialises JSON logging, one event object per line, suitable for shipping to
/// a log aggregator.
pub fn init_json_logging() {
    tracing_subscriber::registry()
        .with(env_filter())
        .with(tracing_subscriber::fmt::layer().json().flatten_event(true))
        .init()
}
