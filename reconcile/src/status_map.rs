//! Maps a broker's wire-level order state onto the persistence layer's
//! `OrderStatus` (`spec.md` §6: "status lookups return `{status ∈ {open/placed,
//! complete/filled, cancelled, rejected, partial}, ...}`"). Both reconcilers
//! go through this so the two sweeps never disagree on what a given broker
//! state means for the `Order` row.

use atlas_broker::BrokerOrderState;
use atlas_persistence::model::OrderStatus;

pub fn map_broker_state(state: BrokerOrderState) -> OrderStatus {
    match state {
        BrokerOrderState::Open | BrokerOrderState::Partial => OrderStatus::Open,
        BrokerOrderState::Placed => OrderStatus::Placed,
        BrokerOrderState::Complete => OrderStatus::Complete,
        BrokerOrderState::Cancelled => OrderStatus::Cancelled,
        BrokerOrderState::Rejected => OrderStatus::Rejected,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_fills_map_to_open_not_a_distinct_status() {
        assert_eq!(map_broker_state(BrokerOrderState::Partial), OrderStatus::Open);
        assert_eq!(map_broker_state(BrokerOrderState::Open), OrderStatus::Open);
    }

    #[test]
    fn terminal_states_round_trip() {
        assert_eq!(map_broker_state(BrokerOrderState::Complete), OrderStatus::Complete);
        assert_eq!(map_broker_state(BrokerOrderState::Cancelled), OrderStatus::Cancelled);
        assert_eq!(map_broker_state(BrokerOrderState::Rejected), OrderStatus::Rejected);
    }
}
