//! Per-symbol ingest task: the single writer for a symbol's cache entry and
//! candle partials (`spec.md` §4.3, §5: "ticks are processed in reception
//! order per symbol"; "the ingest task must never block on DB writes").
//!
//! [`TickChannel`] is the synchronous [`TickListener`] registered with a
//! [`atlas_broker::DataBroker`]; it only ever does a non-blocking unbounded
//! send, so the adapter's own async loop is never held up. The *unbounded*
//! channel is deliberate: raw ticks must never be dropped (§5), so they can't
//! share the bounded, drop-oldest [`atlas_core::EventWriter`] used for
//! non-critical telemetry persistence.

use std::sync::Arc;

use atlas_broker::Tick;
use atlas_core::{EventWriter, Symbol, Timeframe};
use atlas_persistence::repo::CandleRepo;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use crate::cache::MarketDataCache;
use crate::candle::CandleBuilder;
use crate::dedupe::TickDeduplicator;
use crate::error::MarketDataError;

/// Non-blocking sink handed to `DataBroker::subscribe_ticks`.
#[derive(Clone)]
pub struct TickChannel {
    sender: mpsc::UnboundedSender<Tick>,
}

impl atlas_broker::TickListener for TickChannel {
    fn on_tick(&self, tick: Tick) {
        // Only fails if the ingest task has shut down; nothing to do but drop.
        let _ = self.sender.send(tick);
    }
}

/// A lightweight, telemetry-only projection of a tick — this, not the tick
/// itself, is what flows through the droppable event queue (`spec.md` §5:
/// "never drop ticks that would change a partial candle", which this event
/// never does — candle state is already updated by the time it's emitted).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TickEvent {
    pub symbol: Symbol,
    pub last_price: rust_decimal::Decimal,
    pub received_ts: chrono::DateTime<chrono::Utc>,
}

impl From<&Tick> for TickEvent {
    fn from(tick: &Tick) -> Self {
        Self {
            symbol: tick.symbol.clone(),
            last_price: tick.last_price,
            received_ts: tick.received_ts,
        }
    }
}

/// Owns one symbol's cache entry and candle partials exclusively; no other
/// task may touch either.
pub struct IngestTask {
    symbol: Symbol,
    cache: Arc<MarketDataCache>,
    candles: CandleRepo,
    dedup: TickDeduplicator,
    builder: CandleBuilder,
    events: EventWriter<TickEvent>,
    receiver: mpsc::UnboundedReceiver<Tick>,
}

impl IngestTask {
    /// Returns the task and the [`TickChannel`] to register with
    /// `DataBroker::subscribe_ticks`; the caller spawns `task.run()`.
    pub fn new(
        symbol: Symbol,
        cache: Arc<MarketDataCache>,
        candles: CandleRepo,
        events: EventWriter<TickEvent>,
    ) -> (Self, TickChannel) {
        let (sender, receiver) = mpsc::unbounded_channel();
        let task = Self {
            symbol,
            cache,
            candles,
            dedup: TickDeduplicator::new(),
            builder: CandleBuilder::new(),
            events,
            receiver,
        };
        (task, TickChannel { sender })
    }

    /// Drains the tick channel until it closes (broker disconnect or
    /// shutdown), processing one tick at a time in arrival order.
    pub async fn run(&mut self) {
        while let Some(tick) = self.receiver.recv().await {
            if let Err(err) = self.process(tick).await {
                tracing::error!(symbol = %self.symbol, error = %err, "failed to process tick");
            }
        }
        tracing::info!(symbol = %self.symbol, "ingest task shutting down: tick channel closed");
    }

    async fn process(&mut self, tick: Tick) -> Result<(), MarketDataError> {
        if !self.dedup.admit(&tick) {
            return Ok(());
        }

        self.cache.update(tick.symbol.clone(), tick.last_price, tick.received_ts);

        let effective_ts = tick.exchange_ts.unwrap_or(tick.received_ts);
        let closed = self.builder.on_tick(effective_ts, tick.last_price, tick.volume);
        for (timeframe, partial) in closed {
            let row = partial.into_row(&self.symbol, timeframe);
            self.persist_closed_candle(timeframe, row).await?;
        }

        if let Err(dropped) = self.events.emit(TickEvent::from(&tick)) {
            tracing::warn!(symbol = %dropped.symbol, "tick-event queue full, dropping oldest non-critical event");
        }

        Ok(())
    }

    async fn persist_closed_candle(
        &self,
        timeframe: Timeframe,
        row: atlas_persistence::model::CandleRow,
    ) -> Result<(), MarketDataError> {
        self.candles.insert(row).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use atlas_core::bounded;
    use rust_decimal_macros::dec;

    #[test]
    fn tick_event_projection_carries_only_telemetry_fields() {
        let tick = Tick {
            symbol: Symbol::new_unchecked("NSE", "RELIANCE"),
            last_price: dec!(2450),
            ltq: 100,
            volume: 100,
            bid: None,
            ask: None,
            exchange_ts: None,
            received_ts: chrono::Utc::now(),
        };
        let event = TickEvent::from(&tick);
        assert_eq!(event.last_price, dec!(2450));
    }

    #[tokio::test]
    async fn event_writer_drop_policy_is_non_fatal_to_ingest() {
        let (writer, mut drain) = bounded::<TickEvent>(1);
        let event = TickEvent {
            symbol: Symbol::new_unchecked("NSE", "RELIANCE"),
            last_price: dec!(2450),
            received_ts: chrono::Utc::now(),
        };
        writer.emit(event.clone()).unwrap();
        assert!(writer.emit(event).is_err());
        assert!(drain.recv().await.is_some());
    }
}
