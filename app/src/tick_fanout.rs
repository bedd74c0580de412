//! Fans one `DataBroker` tick stream out to every in-process consumer.
//!
//! `BrokerRegistry::sync_subscriptions` registers exactly one
//! [`atlas_broker::TickListener`] per `UserBroker`/symbol set (`spec.md`
//! §4.2), but two independent subsystems need every tick: the per-symbol
//! [`atlas_marketdata::IngestTask`] (candle building) and
//! [`atlas_exits::ExitSignalService`] (exit-condition detection). This is the
//! single listener registered for every symbol; it looks up the matching
//! ingest channel by symbol and forwards unconditionally to the exits
//! channel, which is cheap to no-op on (`find_open_for_symbol` is empty for
//! most symbols most of the time).

use std::sync::Arc;

use atlas_broker::{Tick, TickListener};
use atlas_core::Symbol;
use atlas_marketdata::TickChannel;
use dashmap::DashMap;
use tokio::sync::mpsc;

#[derive(Default)]
pub struct TickFanout {
    ingest_channels: DashMap<Symbol, TickChannel>,
    exit_sender: Option<mpsc::UnboundedSender<Tick>>,
}

impl std::fmt::Debug for TickFanout {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TickFanout")
            .field("ingest_channels", &self.ingest_channels.len())
            .finish_non_exhaustive()
    }
}

impl TickFanout {
    pub fn new(exit_sender: mpsc::UnboundedSender<Tick>) -> Self {
        Self { ingest_channels: DashMap::new(), exit_sender: Some(exit_sender) }
    }

    pub fn register_ingest_channel(&self, symbol: Symbol, channel: TickChannel) {
        self.ingest_channels.insert(symbol, channel);
    }
}

impl TickListener for TickFanout {
    fn on_tick(&self, tick: Tick) {
        if let Some(channel) = self.ingest_channels.get(&tick.symbol) {
            channel.on_tick(tick.clone());
        }
        if let Some(sender) = &self.exit_sender {
            let _ = sender.send(tick);
        }
    }
}

/// Drains the exit-facing tick stream and feeds
/// [`atlas_exits::ExitSignalService::on_tick`] one tick at a time, in
/// arrival order, mirroring the per-symbol ingest task's ordering guarantee.
pub async fn run_exit_tick_drain(mut receiver: mpsc::UnboundedReceiver<Tick>, exits: Arc<atlas_exits::ExitSignalService>) {
    while let Some(tick) = receiver.recv().await {
        if let Err(err) = exits.on_tick(&tick).await {
            tracing::error!(symbol = %tick.symbol, error = %err, "exit condition evaluation failed for tick");
        }
    }
    tracing::info!("exit tick drain shutting down: channel closed");
}
