//! `ValidationService`: the gate runner of `spec.md` §4.6. Consumes a
//! `DELIVERED` [`atlas_persistence::model::SignalDeliveryRow`] and produces a
//! `trade_intents` row, `APPROVED` or `REJECTED`.

use std::sync::Arc;

use atlas_analytics::{kelly_fraction, p_fill, position_size};
use atlas_core::{IntentId, Symbol};
use atlas_persistence::model::{IntentStatus, SignalRow, TradeIntentRow};
use atlas_persistence::{Repositories, VersionedRepository};
use atlas_sms::SignalManagementService;
use chrono::Utc;
use rust_decimal::Decimal;

use crate::atr::average_true_range;
use crate::config::RiskConfig;
use crate::error::RiskError;
use crate::gates::{default_pipeline, RejectionCode, RiskContext};

#[derive(Debug)]
pub struct ValidationOutcome {
    pub intent: TradeIntentRow,
    pub rejection: Option<RejectionCode>,
}

#[derive(Clone)]
pub struct ValidationService {
    repos: Repositories,
    sms: Arc<SignalManagementService>,
    config: RiskConfig,
}

impl ValidationService {
    pub fn new(repos: Repositories, sms: Arc<SignalManagementService>, config: RiskConfig) -> Self {
        Self { repos, sms, config }
    }

    /// Runs the full pipeline for one `DELIVERED` delivery
    /// (`spec.md` §4.6 steps 1-6): loads context, runs the ordered gates,
    /// sizes the position, atomically consumes the delivery, and persists the
    /// resulting intent.
    pub async fn validate_delivery(&self, delivery_id: atlas_core::DeliveryId) -> Result<ValidationOutcome, RiskError> {
        let delivery = self
            .repos
            .signal_deliveries
            .find_active_by_id(&delivery_id.to_string())
            .await?
            .ok_or(RiskError::DeliveryNotFound(delivery_id))?;

        let signal = self
            .repos
            .signals
            .find_active_by_id(&delivery.signal_id.to_string())
            .await?
            .ok_or(RiskError::SignalNotFound(delivery.signal_id))?;

        let user_broker = self
            .repos
            .user_brokers
            .find_active_by_id(&delivery.user_broker_id.to_string())
            .await?
            .ok_or(RiskError::UserBrokerNotFound(delivery.user_broker_id))?;

        let symbol = Symbol::new_unchecked(signal.exchange.clone(), signal.code.clone());
        let ctx = self.build_context(&signal, &user_broker, &symbol).await?;

        let gate_rejection = default_pipeline().into_iter().find_map(|gate| gate.evaluate(&ctx, &self.config).err());

        let qty = if gate_rejection.is_none() {
            position_size(
                ctx.kelly,
                self.config.kelly_fraction_multiplier,
                ctx.equity,
                ctx.entry_price,
                ctx.max_per_trade.min(self.config.per_trade_max_notional),
            )
        } else {
            0
        };

        // Every gate passed but sizing still floored to zero shares — a
        // distinct rejection reason from any gate actually firing.
        let rejection = gate_rejection.or(if qty == 0 { Some(RejectionCode::ZeroQuantityAfterSizing) } else { None });
        let passed = rejection.is_none();
        let intent_id = IntentId::new();

        let intent = if passed {
            let consumed = self.sms.consume_delivery(delivery_id, intent_id).await?;
            if !consumed {
                return Err(RiskError::DeliveryNotFound(delivery_id));
            }
            self.insert_intent(intent_id, &signal, &delivery, &user_broker, qty, true, Vec::new()).await?
        } else {
            let reason = rejection.expect("rejection is Some whenever !passed").to_string();
            self.insert_intent(intent_id, &signal, &delivery, &user_broker, 0, false, vec![reason]).await?
        };

        Ok(ValidationOutcome { intent, rejection })
    }

    #[allow(clippy::too_many_arguments)]
    async fn insert_intent(
        &self,
        intent_id: IntentId,
        signal: &SignalRow,
        delivery: &atlas_persistence::model::SignalDeliveryRow,
        user_broker: &atlas_persistence::model::UserBrokerRow,
        qty: i64,
        passed: bool,
        errors: Vec<String>,
    ) -> Result<TradeIntentRow, RiskError> {
        let row = TradeIntentRow {
            intent_id,
            version: 1,
            signal_id: signal.signal_id,
            signal_delivery_id: delivery.delivery_id,
            user_id: delivery.user_id,
            user_broker_id: user_broker.user_broker_id,
            validation_passed: passed,
            validation_errors: errors,
            calculated_qty: qty,
            limit_price: Some(signal.ref_price),
            order_type: "LIMIT".to_string(),
            product_type: "INTRADAY".to_string(),
            status: if passed { IntentStatus::Approved } else { IntentStatus::Rejected },
            order_id: None,
            trade_id: None,
            executed_at: None,
            deleted_at: None,
        };
        Ok(self.repos.trade_intents.insert_v1(row).await?)
    }

    async fn build_context(
        &self,
        signal: &SignalRow,
        user_broker: &atlas_persistence::model::UserBrokerRow,
        symbol: &Symbol,
    ) -> Result<RiskContext, RiskError> {
        let live_trades = self.repos.trades.find_live_for_user_broker(user_broker.user_broker_id).await?;
        let deployed_capital: Decimal = live_trades.iter().map(|t| t.entry_value).sum();
        let has_existing_position = live_trades.iter().any(|t| t.exchange == symbol.exchange && t.code == symbol.code);

        let since = Utc::now()
            .date_naive()
            .and_hms_opt(0, 0, 0)
            .expect("midnight is a valid time")
            .and_utc();
        let closed_today = self.repos.trades.find_closed_since(user_broker.user_broker_id, since).await?;
        let today_realized_loss: Decimal = closed_today
            .iter()
            .filter_map(|t| t.realized_pnl)
            .filter(|pnl| *pnl < Decimal::ZERO)
            .sum();

        let watchlist = self
            .repos
            .watchlist
            .find_active_by_id(&format!("{}:{}:{}", user_broker.user_broker_id, symbol.exchange, symbol.code))
            .await?;
        let symbol_blocked = !watchlist.as_ref().map(|w| w.enabled).unwrap_or(false);
        let last_tick_age = watchlist.as_ref().and_then(|w| w.last_tick_time).map(|ts| Utc::now() - ts);

        let last_entry = self.repos.trades.find_last_entry_for_symbol(user_broker.user_broker_id, symbol).await?;
        let atr = self
            .fetch_atr(symbol)
            .await?;
        let distance_since_last_entry = last_entry.as_ref().map(|t| (signal.ref_price - t.entry_price).abs());

        let reward_distance = (signal.effective_ceiling - signal.ref_price).abs();
        let risk_distance = (signal.ref_price - signal.effective_floor).abs();
        let reward_risk_ratio = if risk_distance > Decimal::ZERO { reward_distance / risk_distance } else { Decimal::ZERO };
        let kelly = kelly_fraction(signal.p_win, reward_risk_ratio);
        let fill_probability = p_fill(signal.ref_price, signal.entry_low, signal.entry_high);

        Ok(RiskContext {
            equity: user_broker.capital_allocated,
            deployed_capital,
            max_exposure: user_broker.max_exposure,
            max_per_trade: user_broker.max_per_trade,
            max_daily_loss: user_broker.max_daily_loss,
            today_realized_loss,
            has_existing_position,
            broker_enabled: user_broker.enabled,
            symbol_blocked,
            last_tick_age,
            p_win: signal.p_win.min(fill_probability).max(Decimal::ZERO),
            reward_distance,
            risk_distance,
            atr,
            distance_since_last_entry,
            kelly,
            entry_price: signal.ref_price,
        })
    }

    async fn fetch_atr(&self, symbol: &Symbol) -> Result<Option<Decimal>, RiskError> {
        let lookback = self.config.atr_lookback;
        let to = Utc::now();
        let from = to - chrono::Duration::days(lookback as i64 * 2 + 5);
        let candles = self
            .repos
            .candles
            .range(&symbol.exchange, &symbol.code, atlas_core::Timeframe::Itf, from, to)
            .await?;
        Ok(average_true_range(&candles, lookback))
    }
}
