//! Trade Management Service (`spec.md` §4.8): sole writer of the `trades`
//! table, enforcing the documented state machine on every transition.

pub mod error;
pub mod events;
pub mod service;

pub use error::TmsError;
pub use events::TmsEvent;
pub use service::{max_loss_multiplier, min_profit_multiplier, stretch_multiplier, target_multiplier, TradeManagementService};
