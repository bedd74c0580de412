//! Telemetry events emitted by the service (`spec.md` §4.5: "Emits
//! SIGNAL_PUBLISHED / DELIVERY_CREATED events"). These are non-critical
//! observability, not the source of truth — the `signals`/`signal_deliveries`
//! rows are — so they flow through the bounded, drop-oldest
//! [`atlas_core::EventWriter`] rather than an unbounded channel.

use atlas_core::{DeliveryId, ExitSignalId, SignalId};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum SmsEvent {
    SignalPublished { signal_id: SignalId },
    SignalExpired { signal_id: SignalId },
    SignalCancelled { signal_id: SignalId, reason: String },
    DeliveryCreated { delivery_id: DeliveryId, signal_id: SignalId },
    DeliveryExpired { delivery_id: DeliveryId },
    DeliveryRejected { delivery_id: DeliveryId },
    ExitEpisodeGenerated { exit_signal_id: ExitSignalId, episode_id: i64 },
}
