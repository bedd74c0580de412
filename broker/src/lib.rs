#![forbid(unsafe_code)]
#![warn(missing_debug_implementations, rust_2018_idioms)]

//! # Broker - DataBroker / OrderBroker Capability Traits
//!
//! Two orthogonal async traits for market-data and order-execution adapters
//! (`spec.md` §4.2), a [`registry::BrokerRegistry`] caching one adapter
//! instance per active `UserBroker`, and in-memory [`mock`] adapters used by
//! higher crates' tests and by paper-trading deployments. Sits below
//! `atlas-persistence` in the dependency order, so every type here is a
//! narrow, non-versioned projection of the row types that crate defines.

pub mod domain;
pub mod error;
pub mod mock;
pub mod registry;
pub mod traits;

pub use domain::{
    BrokerInstrument, BrokerOrderState, BrokerPosition, ConnectionState, HealthSnapshot, OrderRequest,
    OrderStatusSnapshot, PriceType, ProductType, RawCandle, Tick, UserBrokerHandle,
};
pub use error::{DataBrokerError, OrderBrokerError};
pub use registry::BrokerRegistry;
pub use traits::{DataBroker, OrderBroker, TickListener};
