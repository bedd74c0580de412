//! `TradeManagementService`: sole writer of `trades` (`spec.md` §4.8). Every
//! transition goes through one of these methods, which enforce
//! `TradeRow::can_transition` before calling `VersionedRepository::update`.

use atlas_core::{Direction, EventWriter, PortfolioId, TradeId};
use atlas_persistence::model::{ExitReason, SignalRow, TradeIntentRow, TradeRow, TradeStatus};
use atlas_persistence::repo::TradeRepo;
use atlas_persistence::VersionedRepository;
use chrono::Utc;
use rust_decimal::Decimal;

use crate::error::TmsError;
use crate::events::TmsEvent;

/// Ratios applied to the signal's effective-floor/ceiling zone width to
/// derive a trade's targets at entry, mirroring the MTF generator's own
/// min/target/stretch multiplier defaults (`spec.md` §4.4) as plain
/// functions rather than a dependency on `atlas-signals` — execution and TMS
/// only ever need the ratios, never the zone-detection machinery that
/// computes them.
pub fn min_profit_multiplier() -> Decimal {
    Decimal::ONE
}
pub fn target_multiplier() -> Decimal {
    Decimal::new(2, 0)
}
pub fn stretch_multiplier() -> Decimal {
    Decimal::new(3, 0)
}
pub fn max_loss_multiplier() -> Decimal {
    Decimal::ONE
}

#[derive(Clone)]
pub struct TradeManagementService {
    trades: TradeRepo,
    events: EventWriter<TmsEvent>,
}

impl std::fmt::Debug for TradeManagementService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TradeManagementService").finish_non_exhaustive()
    }
}

impl TradeManagementService {
    pub fn new(trades: TradeRepo, events: EventWriter<TmsEvent>) -> Self {
        Self { trades, events }
    }

    fn emit(&self, event: TmsEvent) {
        if self.events.emit(event).is_err() {
            tracing::warn!("tms event queue full, dropping oldest non-critical event");
        }
    }

    /// Read-only lookup for callers that need to inspect current trade state
    /// before deciding which transition applies, e.g. the reconcilers
    /// (`spec.md` §4.10) picking `mark_open`/`cancel`/`mark_rejected` based
    /// on the trade's current status.
    pub async fn find(&self, trade_id: TradeId) -> Result<Option<TradeRow>, TmsError> {
        Ok(self.trades.find_active_by_id(&trade_id.to_string()).await?)
    }

    /// Opens a `Created` row from an `APPROVED` intent. Targets are derived
    /// from the signal's `effectiveFloor`/`effectiveCeiling` zone width; the
    /// MTF zone snapshot is copied verbatim from the signal row, since the
    /// signal's own zone bounds are never mutated after publication and this
    /// is the only moment they get frozen onto the trade.
    pub async fn create_trade(&self, intent: &TradeIntentRow, signal: &SignalRow, portfolio_id: PortfolioId) -> Result<TradeRow, TmsError> {
        let entry_price = intent.limit_price.unwrap_or(signal.ref_price);
        let entry_qty = intent.calculated_qty;
        let zone_width = (signal.effective_ceiling - signal.effective_floor).abs();

        let (min_profit, target, stretch, max_loss_allowed) = match signal.direction {
            Direction::Buy => (
                entry_price + zone_width * min_profit_multiplier(),
                entry_price + zone_width * target_multiplier(),
                entry_price + zone_width * stretch_multiplier(),
                entry_price - zone_width * max_loss_multiplier(),
            ),
            Direction::Sell => (
                entry_price - zone_width * min_profit_multiplier(),
                entry_price - zone_width * target_multiplier(),
                entry_price - zone_width * stretch_multiplier(),
                entry_price + zone_width * max_loss_multiplier(),
            ),
        };

        let row = TradeRow {
            trade_id: TradeId::new(),
            version: 1,
            intent_id: intent.intent_id,
            portfolio_id,
            user_id: intent.user_id,
            user_broker_id: intent.user_broker_id,
            signal_id: signal.signal_id,
            exchange: signal.exchange.clone(),
            code: signal.code.clone(),
            direction: signal.direction,
            entry_qty,
            entry_price,
            entry_value: entry_price * Decimal::from(entry_qty),
            status: TradeStatus::Created,
            htf_low_at_entry: signal.htf_low,
            htf_high_at_entry: signal.htf_high,
            itf_low_at_entry: signal.itf_low,
            itf_high_at_entry: signal.itf_high,
            ltf_low_at_entry: signal.ltf_low,
            ltf_high_at_entry: signal.ltf_high,
            min_profit,
            target,
            stretch,
            max_loss_allowed,
            trailing_active: false,
            trailing_high_price: None,
            trailing_stop_price: None,
            exit_price: None,
            exit_reason: None,
            exit_qty: None,
            realized_pnl: None,
            holding_minutes: None,
            broker_order_id: None,
            broker_trade_id: None,
            last_broker_update_at: None,
            deleted_at: None,
        };
        let created = self.trades.insert_v1(row).await?;
        self.emit(TmsEvent::TradeCreated { trade_id: created.trade_id });
        Ok(created)
    }

    async fn transition(&self, trade_id: TradeId, to: TradeStatus, mutate: impl FnOnce(&mut TradeRow)) -> Result<TradeRow, TmsError> {
        let current = self
            .trades
            .find_active_by_id(&trade_id.to_string())
            .await?
            .ok_or(TmsError::TradeNotFound(trade_id))?;
        if !TradeRow::can_transition(current.status, to) {
            return Err(TmsError::IllegalTransition { trade_id, from: current.status, to });
        }
        let from = current.status;
        let mut next = current;
        next.version += 1;
        next.status = to;
        mutate(&mut next);
        let updated = self.trades.update(next).await?;
        self.emit(TmsEvent::TradeTransitioned { trade_id, from, to });
        Ok(updated)
    }

    /// `Created -> Pending`: the order was placed at the broker but not yet
    /// confirmed filled (`spec.md` §4.7).
    pub async fn mark_pending(&self, trade_id: TradeId, broker_order_id: String) -> Result<TradeRow, TmsError> {
        let updated = self
            .transition(trade_id, TradeStatus::Pending, |t| {
                t.broker_order_id = Some(broker_order_id.clone());
                t.last_broker_update_at = Some(Utc::now());
            })
            .await?;
        self.emit(TmsEvent::TradePending { trade_id, broker_order_id: updated.broker_order_id.clone().unwrap_or_default() });
        Ok(updated)
    }

    /// `Created -> Rejected`: the broker refused the order outright.
    pub async fn mark_rejected(&self, trade_id: TradeId, reason: String) -> Result<TradeRow, TmsError> {
        let updated = self
            .transition(trade_id, TradeStatus::Rejected, |t| {
                t.last_broker_update_at = Some(Utc::now());
            })
            .await?;
        self.emit(TmsEvent::TradeRejected { trade_id, reason });
        Ok(updated)
    }

    /// `Pending -> Cancelled`: the order was cancelled before any fill, e.g.
    /// reconciliation gave up on a stale unfilled order.
    pub async fn cancel(&self, trade_id: TradeId) -> Result<TradeRow, TmsError> {
        let updated = self
            .transition(trade_id, TradeStatus::Cancelled, |t| {
                t.last_broker_update_at = Some(Utc::now());
            })
            .await?;
        self.emit(TmsEvent::TradeCancelled { trade_id });
        Ok(updated)
    }

    /// `Pending -> Open`: broker confirmed a fill. Entry fields are
    /// overwritten with the actual fill, since the broker's fill price can
    /// legitimately differ from the intent's limit price.
    pub async fn mark_open(
        &self,
        trade_id: TradeId,
        fill_qty: i64,
        fill_price: Decimal,
        broker_trade_id: Option<String>,
    ) -> Result<TradeRow, TmsError> {
        let updated = self
            .transition(trade_id, TradeStatus::Open, |t| {
                t.entry_qty = fill_qty;
                t.entry_price = fill_price;
                t.entry_value = fill_price * Decimal::from(fill_qty);
                t.broker_trade_id = broker_trade_id.clone();
                t.last_broker_update_at = Some(Utc::now());
            })
            .await?;
        self.emit(TmsEvent::TradeOpened { trade_id });
        Ok(updated)
    }

    /// Ratchets the trailing stop (`spec.md` §4.9). Valid from `Open` or
    /// `PartialExit` only — a trade with no live quantity has nothing to
    /// trail.
    pub async fn update_trailing_stop(&self, trade_id: TradeId, high_price: Decimal, stop_price: Decimal) -> Result<TradeRow, TmsError> {
        let current = self
            .trades
            .find_active_by_id(&trade_id.to_string())
            .await?
            .ok_or(TmsError::TradeNotFound(trade_id))?;
        if !matches!(current.status, TradeStatus::Open | TradeStatus::PartialExit) {
            return Err(TmsError::IllegalTransition { trade_id, from: current.status, to: current.status });
        }
        let mut next = current.clone();
        next.version += 1;
        next.trailing_active = true;
        next.trailing_high_price = Some(high_price);
        next.trailing_stop_price = Some(stop_price);
        let updated = self.trades.update(next).await?;
        self.emit(TmsEvent::TrailingStopUpdated { trade_id, stop_price });
        Ok(updated)
    }

    /// Books an exit against the live quantity. Transitions to `Closed` if
    /// the exit consumes the remaining position, otherwise `PartialExit`.
    /// `exit_price`/`realized_pnl` accumulate as running (qty-weighted)
    /// totals across however many partial exits a trade takes, matching the
    /// single-row outcome fields on `TradeRow` rather than a child ledger
    /// table.
    #[allow(clippy::too_many_arguments)]
    pub async fn record_exit(
        &self,
        trade_id: TradeId,
        exit_qty: i64,
        exit_price: Decimal,
        reason: ExitReason,
        realized_pnl_delta: Decimal,
        holding_minutes: i64,
    ) -> Result<TradeRow, TmsError> {
        let current = self
            .trades
            .find_active_by_id(&trade_id.to_string())
            .await?
            .ok_or(TmsError::TradeNotFound(trade_id))?;
        let already_exited = current.exit_qty.unwrap_or(0);
        let remaining = current.entry_qty - already_exited;
        if exit_qty > remaining {
            return Err(TmsError::ExitExceedsPosition { exit_qty, remaining });
        }
        let to = if exit_qty == remaining { TradeStatus::Closed } else { TradeStatus::PartialExit };
        if !TradeRow::can_transition(current.status, to) {
            return Err(TmsError::IllegalTransition { trade_id, from: current.status, to });
        }

        let new_exit_qty = already_exited + exit_qty;
        let weighted_price = match current.exit_price {
            Some(prev) if already_exited > 0 => {
                (prev * Decimal::from(already_exited) + exit_price * Decimal::from(exit_qty)) / Decimal::from(new_exit_qty)
            }
            _ => exit_price,
        };

        let from = current.status;
        let mut next = current;
        next.version += 1;
        next.status = to;
        next.exit_qty = Some(new_exit_qty);
        next.exit_price = Some(weighted_price);
        next.exit_reason = Some(reason);
        next.realized_pnl = Some(next.realized_pnl.unwrap_or(Decimal::ZERO) + realized_pnl_delta);
        next.holding_minutes = Some(holding_minutes);
        next.last_broker_update_at = Some(Utc::now());
        let updated = self.trades.update(next).await?;
        self.emit(TmsEvent::TradeTransitioned { trade_id, from, to });
        self.emit(TmsEvent::TradeExited { trade_id, reason, qty: exit_qty });
        Ok(updated)
    }
}
