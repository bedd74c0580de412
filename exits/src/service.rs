//! `ExitSignalService`: detects exit conditions per tick for open trades,
//! confirms them via brick-movement confirmation, and places the resulting
//! exit order (`spec.md` §4.9). Never writes `exit_signals`/`exit_intents`
//! directly for the signal-lifecycle fields — those go through
//! [`atlas_sms::SignalManagementService`]; this service owns only the
//! broker-facing placement steps and its own in-memory per-trade trackers.

use std::sync::Arc;
use std::time::Duration;

use atlas_broker::{require_order_broker, BrokerRegistry, OrderRequest, PriceType, ProductType, Tick};
use atlas_core::{EventWriter, ExitIntentId, ExitSignalId, OrderId, Symbol, TradeId};
use atlas_persistence::model::{ExitIntentRow, ExitIntentStatus, ExitReason, ExitSignalRow, OrderKind, OrderRow, OrderStatus, ReconcileStatus, TradeRow};
use atlas_persistence::{Repositories, VersionedRepository};
use atlas_sms::{SignalManagementService, SmsError};
use atlas_tms::TradeManagementService;
use chrono::Utc;
use dashmap::DashMap;
use rust_decimal::Decimal;

use crate::conditions::{compute_trailing_update, detect_condition, update_peak_favorable, ExitConfig};
use crate::error::ExitsError;
use crate::events::ExitsEvent;
use crate::tracker::BrickTracker;

/// Deadline for an exit order placement call — tighter than entry's 10s
/// since exits are time-critical (`spec.md` §5).
const EXIT_PLACEMENT_DEADLINE: Duration = Duration::from_secs(10);

#[derive(Debug, Clone)]
struct TradeExitState {
    peak_favorable_price: Decimal,
    active_trigger: Option<ExitReason>,
    tracker: BrickTracker,
    trailing_signal_id: Option<ExitSignalId>,
}

impl TradeExitState {
    fn new(entry_price: Decimal, brick_size: Decimal) -> Self {
        Self {
            peak_favorable_price: entry_price,
            active_trigger: None,
            tracker: BrickTracker::new(brick_size, entry_price),
            trailing_signal_id: None,
        }
    }
}

pub struct ExitSignalService {
    repos: Repositories,
    sms: SignalManagementService,
    tms: TradeManagementService,
    registry: Arc<BrokerRegistry>,
    events: EventWriter<ExitsEvent>,
    config: ExitConfig,
    states: DashMap<TradeId, TradeExitState>,
}

impl std::fmt::Debug for ExitSignalService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExitSignalService").finish_non_exhaustive()
    }
}

impl ExitSignalService {
    pub fn new(
        repos: Repositories,
        sms: SignalManagementService,
        tms: TradeManagementService,
        registry: Arc<BrokerRegistry>,
        events: EventWriter<ExitsEvent>,
        config: ExitConfig,
    ) -> Self {
        Self { repos, sms, tms, registry, events, config, states: DashMap::new() }
    }

    fn emit(&self, event: ExitsEvent) {
        if self.events.emit(event).is_err() {
            tracing::warn!("exits event queue full, dropping oldest non-critical event");
        }
    }

    /// `spec.md` §4.9 inputs: "Ticks for symbols that currently have open
    /// trades, plus a DB-loaded map of open trades" — this re-reads open
    /// trades for the symbol on every tick rather than caching them
    /// in-process, so a restart never needs to rebuild any trade state.
    pub async fn on_tick(&self, tick: &Tick) -> Result<(), ExitsError> {
        let open_trades = self.repos.trades.find_open_for_symbol(&tick.symbol).await?;
        for trade in &open_trades {
            self.evaluate_trade(trade, tick.last_price, tick.received_ts).await?;
        }
        Ok(())
    }

    async fn evaluate_trade(&self, trade: &TradeRow, price: Decimal, now: chrono::DateTime<Utc>) -> Result<(), ExitsError> {
        let mut state = self
            .states
            .get(&trade.trade_id)
            .map(|entry| entry.clone())
            .unwrap_or_else(|| TradeExitState::new(trade.entry_price, self.config.brick_size));

        state.peak_favorable_price = update_peak_favorable(trade.direction, state.peak_favorable_price, price);

        if let Some(update) = compute_trailing_update(trade, price, &self.config) {
            if !trade.trailing_active || trade.trailing_stop_price != Some(update.stop_price) {
                self.tms.update_trailing_stop(trade.trade_id, update.high_price, update.stop_price).await?;
            }
            match state.trailing_signal_id {
                Some(exit_signal_id) => {
                    if self.sms.update_trailing_stop(exit_signal_id, update.stop_price).await.is_err() {
                        tracing::warn!(trade_id = %trade.trade_id, "failed to ratchet trailing exit signal");
                    }
                }
                None => {
                    let favorable = (state.peak_favorable_price - trade.entry_price).abs();
                    match self
                        .sms
                        .generate_exit_episode(trade.trade_id, ExitReason::TrailingStop, price, Decimal::ZERO, favorable, Some(update.stop_price), now)
                        .await
                    {
                        Ok(row) => {
                            state.trailing_signal_id = Some(row.exit_signal_id);
                            self.emit(ExitsEvent::TrailingStopArmed { trade_id: trade.trade_id, exit_signal_id: row.exit_signal_id });
                        }
                        Err(SmsError::InCooldown { .. }) => {}
                        Err(err) => return Err(err.into()),
                    }
                }
            }
        }

        let condition = detect_condition(trade, price, state.peak_favorable_price, now, &self.config);
        let Some(reason) = condition else {
            self.states.insert(trade.trade_id, state);
            return Ok(());
        };

        // Only `BRICK_REVERSAL` needs the brick-movement confirmation
        // accumulator (`spec.md` Glossary "Brick movement") — it's the one
        // reason whose own detection threshold (`brick_reversal_distance`)
        // is a coarse momentum check that benefits from requiring further
        // cumulative movement before firing. `TARGET_HIT`/`STOP_LOSS`/
        // `TRAILING_STOP`/`TIME_BASED` are hard level crossings: they must
        // confirm on the very tick that first crosses the level, not a
        // later tick, so resetting the tracker to that tick's own price
        // and observing it immediately (always zero displacement) would
        // wrongly defer them by at least one tick.
        let (displacement, confirmed) = if reason == ExitReason::BrickReversal {
            if state.active_trigger != Some(reason) {
                state.tracker.reset(price);
            }
            state.tracker.observe(price)
        } else {
            (Decimal::ZERO, true)
        };
        state.active_trigger = Some(reason);
        let existing_signal = if reason == ExitReason::TrailingStop { state.trailing_signal_id } else { None };
        let favorable = (state.peak_favorable_price - trade.entry_price).abs();
        self.states.insert(trade.trade_id, state);

        if !confirmed {
            return Ok(());
        }
        self.trigger_exit(trade, reason, existing_signal, price, displacement, favorable, now).await
    }

    /// `spec.md` §4.9 step 3: confirms the episode (creating it first for
    /// every reason except `TRAILING_STOP`, whose episode was already
    /// created `DETECTED` when trailing armed) and hands off to placement.
    #[allow(clippy::too_many_arguments)]
    async fn trigger_exit(
        &self,
        trade: &TradeRow,
        reason: ExitReason,
        existing_signal: Option<ExitSignalId>,
        price: Decimal,
        brick_movement: Decimal,
        favorable_movement: Decimal,
        now: chrono::DateTime<Utc>,
    ) -> Result<(), ExitsError> {
        let exit_signal_id = match existing_signal {
            Some(id) => id,
            None => {
                let row = match self
                    .sms
                    .generate_exit_episode(trade.trade_id, reason, price, brick_movement, favorable_movement, None, now)
                    .await
                {
                    Ok(row) => row,
                    Err(SmsError::InCooldown { .. }) => return Ok(()),
                    Err(err) => return Err(err.into()),
                };
                row.exit_signal_id
            }
        };

        let confirmed = self.sms.confirm_exit_signal(exit_signal_id).await?;
        self.emit(ExitsEvent::ExitConditionConfirmed { trade_id: trade.trade_id, exit_signal_id, reason });
        self.place_exit_order(trade, &confirmed).await
    }

    /// `spec.md` §4.9 step 3b/4: publishes the signal, opens an `ExitIntent`
    /// with `clientOrderId = exitIntentId`, and places the opposite-direction
    /// order for the remaining open quantity.
    async fn place_exit_order(&self, trade: &TradeRow, exit_signal: &ExitSignalRow) -> Result<(), ExitsError> {
        let published = self.sms.publish_exit_signal(exit_signal.exit_signal_id).await?;

        let remaining = trade.entry_qty - trade.exit_qty.unwrap_or(0);
        if remaining <= 0 {
            return Ok(());
        }

        let cooldown_until = Some(Utc::now() + self.config.cooldown);
        let exit_intent = ExitIntentRow {
            exit_intent_id: ExitIntentId::new(),
            version: 1,
            trade_id: trade.trade_id,
            user_broker_id: trade.user_broker_id,
            exit_reason: published.exit_reason,
            episode_id: published.episode_id,
            calculated_qty: remaining,
            order_type: "MARKET".to_string(),
            limit_price: None,
            status: ExitIntentStatus::Pending,
            broker_order_id: None,
            cooldown_until,
            deleted_at: None,
        };
        let exit_intent = self.repos.exit_intents.insert_v1(exit_intent).await?;

        let broker = match require_order_broker(&self.registry, trade.user_broker_id) {
            Ok(broker) => broker,
            Err(err) => {
                tracing::error!(trade_id = %trade.trade_id, error = %err, "no order broker registered for exit placement");
                return Ok(());
            }
        };

        let req = OrderRequest {
            client_order_id: exit_intent.exit_intent_id.to_string(),
            symbol: Symbol::new_unchecked(trade.exchange.clone(), trade.code.clone()),
            direction: trade.direction.opposite(),
            quantity: remaining,
            price_type: PriceType::Market,
            product_type: ProductType::Intraday,
            limit_price: None,
            trigger_price: None,
        };

        match tokio::time::timeout(EXIT_PLACEMENT_DEADLINE, broker.place_order(req)).await {
            Ok(Ok(broker_order_id)) => self.confirm_exit_placed(trade, exit_intent, broker_order_id).await,
            Ok(Err(err)) => self.fail_exit_intent(trade, exit_intent, err.to_string()).await,
            Err(_elapsed) => {
                tracing::warn!(trade_id = %trade.trade_id, "exit order placement timed out, outcome unknown");
                self.emit(ExitsEvent::ExitOrderTimedOut { trade_id: trade.trade_id, exit_intent_id: exit_intent.exit_intent_id });
                Ok(())
            }
        }
    }

    async fn confirm_exit_placed(&self, trade: &TradeRow, exit_intent: ExitIntentRow, broker_order_id: String) -> Result<(), ExitsError> {
        let order = OrderRow {
            order_id: OrderId::new(),
            version: 1,
            order_type: OrderKind::Exit,
            trade_id: Some(trade.trade_id),
            intent_id: None,
            exit_intent_id: Some(exit_intent.exit_intent_id),
            user_broker_id: trade.user_broker_id,
            exchange: trade.exchange.clone(),
            code: trade.code.clone(),
            direction: trade.direction.opposite(),
            product_type: "INTRADAY".to_string(),
            price_type: "MARKET".to_string(),
            limit_price: None,
            trigger_price: None,
            ordered_qty: exit_intent.calculated_qty,
            filled_qty: 0,
            avg_fill_price: None,
            broker_order_id: Some(broker_order_id.clone()),
            client_order_id: exit_intent.exit_intent_id.to_string(),
            status: OrderStatus::Placed,
            last_broker_update_at: Some(Utc::now()),
            reconcile_status: ReconcileStatus::Pending,
            deleted_at: None,
        };
        self.repos.orders.insert_v1(order).await?;

        let mut next_intent = exit_intent.clone();
        next_intent.version += 1;
        next_intent.status = ExitIntentStatus::Placed;
        next_intent.broker_order_id = Some(broker_order_id.clone());
        self.repos.exit_intents.update(next_intent).await?;

        self.emit(ExitsEvent::ExitOrderPlaced { trade_id: trade.trade_id, exit_intent_id: exit_intent.exit_intent_id, broker_order_id });
        Ok(())
    }

    /// `spec.md` §4.9 step 4: "on reject, mark_failed and leave trade OPEN
    /// (the episode number prevents immediate re-fire; cooldown also
    /// applies)". The `ExitSignal` itself stays `PUBLISHED` — the cooldown
    /// and monotonic episode id are what actually prevent an immediate
    /// re-fire, not a further signal-status transition.
    async fn fail_exit_intent(&self, trade: &TradeRow, exit_intent: ExitIntentRow, reason: String) -> Result<(), ExitsError> {
        let mut next = exit_intent.clone();
        next.version += 1;
        next.status = ExitIntentStatus::Failed;
        self.repos.exit_intents.update(next).await?;
        self.emit(ExitsEvent::ExitOrderRejected { trade_id: trade.trade_id, exit_intent_id: exit_intent.exit_intent_id, reason });
        Ok(())
    }

    /// Periodic sweep (`spec.md` §4.9 step 4 continuation): for every
    /// `PLACED` exit intent whose order has since completed, marks the
    /// `ExitSignal` `EXECUTED` and books the exit against the trade.
    /// `ExitOrderReconciler` (`spec.md` §4.10) keeps `orders`/`trades`
    /// current; this sweep only follows up on SMS's own tables, which no
    /// other crate in the reconciliation path is allowed to write.
    pub async fn reconcile_placed_exits(&self) -> Result<usize, ExitsError> {
        let mut settled = 0;
        for exit_intent in self.repos.exit_intents.find_placed().await? {
            let Some(broker_order_id) = &exit_intent.broker_order_id else { continue };
            let Some(order) = self.repos.orders.find_by_broker_order_id(broker_order_id).await? else { continue };
            if order.status != OrderStatus::Complete {
                continue;
            }

            if let Some(exit_signal) = self
                .repos
                .exit_signals
                .find_for_trade_and_reason(exit_intent.trade_id, exit_intent.exit_reason)
                .await?
                .into_iter()
                .find(|row| row.episode_id == exit_intent.episode_id)
            {
                self.sms.mark_exit_executed(exit_signal.exit_signal_id).await?;
            }

            let mut next = exit_intent.clone();
            next.version += 1;
            next.status = ExitIntentStatus::Filled;
            self.repos.exit_intents.update(next).await?;
            self.states.remove(&exit_intent.trade_id);
            settled += 1;
        }
        Ok(settled)
    }
}
