//! Shared domain vocabulary: symbols, direction, timeframes, environments.
//!
//! These are the types every subsystem crate imports; none of them carry
//! persistence or broker-wire concerns, which stay at their respective
//! boundaries (`persistence::model`, `broker::wire`).

use derive_more::{Constructor, Display};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Exchange-qualified trading symbol, e.g. `NSE:RELIANCE`.
#[derive(
    Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Deserialize, Serialize, Constructor, Display,
)]
#[display("{exchange}:{code}")]
pub struct Symbol {
    pub exchange: String,
    pub code: String,
}

impl Symbol {
    pub fn new_unchecked(exchange: impl Into<String>, code: impl Into<String>) -> Self {
        Self {
            exchange: exchange.into(),
            code: code.into(),
        }
    }
}

/// Trade direction. `BUY` enters/holds long exposure, `SELL` enters/holds short.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash, Deserialize, Serialize, Display)]
#[cfg_attr(feature = "persistence", derive(sqlx::Type))]
#[cfg_attr(feature = "persistence", sqlx(type_name = "text", rename_all = "UPPERCASE"))]
pub enum Direction {
    #[display("BUY")]
    Buy,
    #[display("SELL")]
    Sell,
}

impl Direction {
    /// The direction of the order that would close a position opened with `self`.
    pub fn opposite(self) -> Self {
        match self {
            Direction::Buy => Direction::Sell,
            Direction::Sell => Direction::Buy,
        }
    }

    pub fn is_long(self) -> bool {
        matches!(self, Direction::Buy)
    }
}

/// The four candle timeframes maintained per symbol (`spec.md` §4.3).
///
/// `Daily` is session-bounded rather than a fixed interval; the other three are
/// fixed intraday intervals expressed in minutes.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash, Deserialize, Serialize, Display)]
pub enum Timeframe {
    #[display("LTF")]
    Ltf,
    #[display("ITF")]
    Itf,
    #[display("HTF")]
    Htf,
    #[display("DAILY")]
    Daily,
}

impl Timeframe {
    /// Fixed intraday interval in minutes; `None` for `Daily`, which is
    /// session-bounded rather than a uniform interval.
    pub const fn interval_minutes(self) -> Option<i64> {
        match self {
            Timeframe::Ltf => Some(1),
            Timeframe::Itf => Some(25),
            Timeframe::Htf => Some(125),
            Timeframe::Daily => None,
        }
    }

    pub const fn all() -> [Timeframe; 4] {
        [Timeframe::Ltf, Timeframe::Itf, Timeframe::Htf, Timeframe::Daily]
    }

    pub const fn intraday() -> [Timeframe; 3] {
        [Timeframe::Ltf, Timeframe::Itf, Timeframe::Htf]
    }
}

/// The role a `UserBroker` plays: exactly one active `Data` broker per tenant,
/// one or more active `Exec` brokers (`spec.md` §3 invariant 1).
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash, Deserialize, Serialize, Display)]
pub enum BrokerRole {
    #[display("DATA")]
    Data,
    #[display("EXEC")]
    Exec,
}

/// Deployment environment for a `UserBroker`; `Paper` is the trivial degenerate
/// `OrderBroker` mentioned in `spec.md` §1 Non-goals.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash, Deserialize, Serialize, Display)]
pub enum Environment {
    #[display("PAPER")]
    Paper,
    #[display("LIVE")]
    Live,
}

/// Opaque newtype identifiers, distinguished at the type level so e.g. a
/// `SignalId` can never be passed where a `TradeId` is expected.
macro_rules! id_newtype {
    ($name:ident) => {
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
        )]
        #[cfg_attr(feature = "persistence", derive(sqlx::Type))]
        #[cfg_attr(feature = "persistence", sqlx(transparent))]
        pub struct $name(pub uuid::Uuid);

        impl $name {
            pub fn new() -> Self {
                Self(uuid::Uuid::new_v4())
            }

            pub fn from_uuid(id: uuid::Uuid) -> Self {
                Self(id)
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

id_newtype!(UserId);
id_newtype!(BrokerId);
id_newtype!(UserBrokerId);
id_newtype!(SessionId);
id_newtype!(SignalId);
id_newtype!(DeliveryId);
id_newtype!(IntentId);
id_newtype!(TradeId);
id_newtype!(OrderId);
id_newtype!(FillId);
id_newtype!(ExitSignalId);
id_newtype!(ExitIntentId);
id_newtype!(PortfolioId);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn direction_opposite_is_involutive() {
        assert_eq!(Direction::Buy.opposite().opposite(), Direction::Buy);
        assert_eq!(Direction::Sell.opposite(), Direction::Buy);
    }

    #[test]
    fn symbol_display_is_exchange_colon_code() {
        let s = Symbol::new_unchecked("NSE", "RELIANCE");
        assert_eq!(s.to_string(), "NSE:RELIANCE");
    }

    #[test]
    fn id_newtypes_are_distinct_random_values() {
        assert_ne!(TradeId::new(), TradeId::new());
    }
}
