//! Builds and places the broker order for one `APPROVED` trade intent
//! (`spec.md` §4.7 steps 1-5). Every write this performs is guarded by a
//! lookup for work already done, so calling [`OrderPlacementService::place`]
//! twice for the same intent — the normal case after a crash restart — is
//! safe.

use std::time::Duration;

use atlas_broker::{require_order_broker, BrokerRegistry, OrderBrokerError, OrderRequest, PriceType, ProductType};
use atlas_core::{EventWriter, OrderId, PortfolioId, Symbol};
use atlas_integration::RateLimiter;
use atlas_persistence::model::{IntentStatus, OrderKind, OrderRow, OrderStatus, ReconcileStatus, TradeIntentRow, TradeRow};
use atlas_persistence::{Repositories, VersionedRepository};
use atlas_tms::TradeManagementService;
use chrono::Utc;

use crate::error::ExecutionError;
use crate::events::ExecutionEvent;

/// `spec.md` §5: the placement call's broker-call deadline.
pub const PLACEMENT_DEADLINE: Duration = Duration::from_secs(10);

fn parse_price_type(order_type: &str) -> PriceType {
    match order_type {
        "LIMIT" => PriceType::Limit,
        "STOP_LOSS" => PriceType::StopLoss,
        "STOP_LIMIT" => PriceType::StopLimit,
        _ => PriceType::Market,
    }
}

fn parse_product_type(product_type: &str) -> ProductType {
    match product_type {
        "DELIVERY" => ProductType::Delivery,
        _ => ProductType::Intraday,
    }
}

/// Broker rejections that mean the order will never fill and the intent
/// should be failed outright, as opposed to an ambiguous/transient error
/// where the next poll cycle should simply try again.
fn is_terminal_rejection(err: &OrderBrokerError) -> bool {
    matches!(err, OrderBrokerError::InsufficientFunds | OrderBrokerError::InvalidSymbol(_) | OrderBrokerError::AlreadyFilled)
}

#[derive(Clone)]
pub struct OrderPlacementService {
    repos: Repositories,
    registry: std::sync::Arc<BrokerRegistry>,
    tms: TradeManagementService,
    events: EventWriter<ExecutionEvent>,
}

impl std::fmt::Debug for OrderPlacementService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OrderPlacementService").finish_non_exhaustive()
    }
}

impl OrderPlacementService {
    pub fn new(
        repos: Repositories,
        registry: std::sync::Arc<BrokerRegistry>,
        tms: TradeManagementService,
        events: EventWriter<ExecutionEvent>,
    ) -> Self {
        Self { repos, registry, tms, events }
    }

    fn emit(&self, event: ExecutionEvent) {
        if self.events.emit(event).is_err() {
            tracing::warn!("execution event queue full, dropping oldest non-critical event");
        }
    }

    /// Binds the intent to a `Trade` row, creating one in `Created` status if
    /// this is the first attempt (`spec.md` §4.7: "Create the Trade row first
    /// ... this binds intentId<->tradeId and owns the slot even if the
    /// broker call later fails").
    async fn ensure_trade(&self, intent: &TradeIntentRow) -> Result<TradeRow, ExecutionError> {
        if let Some(existing) = self.repos.trades.find_by_intent_id(intent.intent_id).await? {
            return Ok(existing);
        }
        let signal = self
            .repos
            .signals
            .find_active_by_id(&intent.signal_id.to_string())
            .await?
            .ok_or(ExecutionError::SignalNotFound(intent.signal_id))?;
        let portfolio_id = PortfolioId::from_uuid(intent.user_broker_id.0);
        Ok(self.tms.create_trade(intent, &signal, portfolio_id).await?)
    }

    /// The `Order` row, keyed by `clientOrderId = intentId` so a retried poll
    /// after a crash finds the same row instead of placing a duplicate
    /// (`spec.md` §9 Open Questions: one Order per intent, many `OrderFill`s).
    async fn ensure_order(&self, intent: &TradeIntentRow, trade: &TradeRow) -> Result<OrderRow, ExecutionError> {
        let client_order_id = intent.intent_id.to_string();
        if let Some(existing) = self.repos.orders.find_by_client_order_id(&client_order_id).await? {
            return Ok(existing);
        }
        let row = OrderRow {
            order_id: OrderId::new(),
            version: 1,
            order_type: OrderKind::Entry,
            trade_id: Some(trade.trade_id),
            intent_id: Some(intent.intent_id),
            exit_intent_id: None,
            user_broker_id: intent.user_broker_id,
            exchange: trade.exchange.clone(),
            code: trade.code.clone(),
            direction: trade.direction,
            product_type: intent.product_type.clone(),
            price_type: intent.order_type.clone(),
            limit_price: intent.limit_price,
            trigger_price: None,
            ordered_qty: intent.calculated_qty,
            filled_qty: 0,
            avg_fill_price: None,
            broker_order_id: None,
            client_order_id,
            status: OrderStatus::Pending,
            last_broker_update_at: None,
            reconcile_status: ReconcileStatus::Pending,
            deleted_at: None,
        };
        Ok(self.repos.orders.insert_v1(row).await?)
    }

    /// Ensures `intent` has a `Trade` and an `Order`, then places the order at
    /// the broker if it hasn't been placed yet. Returns `Ok(())` for every
    /// outcome the state machine can legally land in — terminal rejection,
    /// ambiguous/timeout (left for the next poll cycle), or confirmed
    /// placement — since those are all handled branches, not failures of this
    /// method. Only persistence/TMS errors propagate as `Err`.
    pub async fn place(&self, intent: &TradeIntentRow, limiter: &RateLimiter) -> Result<(), ExecutionError> {
        let trade = self.ensure_trade(intent).await?;
        let order = self.ensure_order(intent, &trade).await?;

        if order.status != OrderStatus::Pending || order.broker_order_id.is_some() {
            // Already placed by an earlier attempt. From here the order is
            // `PendingOrderReconciler`'s to chase, not ours.
            return Ok(());
        }

        let broker = require_order_broker(&self.registry, intent.user_broker_id)?;
        let req = OrderRequest {
            client_order_id: order.client_order_id.clone(),
            symbol: Symbol::new_unchecked(order.exchange.clone(), order.code.clone()),
            direction: order.direction,
            quantity: order.ordered_qty,
            price_type: parse_price_type(&order.price_type),
            product_type: parse_product_type(&order.product_type),
            limit_price: order.limit_price,
            trigger_price: order.trigger_price,
        };

        let permit = match limiter.acquire_timeout(PLACEMENT_DEADLINE).await {
            Ok(permit) => permit,
            Err(_) => {
                tracing::warn!(intent_id = %intent.intent_id, "rate limiter saturated, deferring placement");
                self.emit(ExecutionEvent::PlacementTimedOut { intent_id: intent.intent_id });
                return Ok(());
            }
        };

        let outcome = tokio::time::timeout(PLACEMENT_DEADLINE, broker.place_order(req)).await;
        drop(permit);

        match outcome {
            Err(_elapsed) => {
                tracing::warn!(intent_id = %intent.intent_id, "order placement timed out, outcome unknown, will retry");
                self.emit(ExecutionEvent::PlacementTimedOut { intent_id: intent.intent_id });
                Ok(())
            }
            Ok(Err(err)) if is_terminal_rejection(&err) => self.reject(intent, &trade, &order, err.to_string()).await,
            Ok(Err(err)) => {
                tracing::warn!(intent_id = %intent.intent_id, error = %err, "order placement outcome ambiguous, will retry");
                self.emit(ExecutionEvent::PlacementAmbiguous { intent_id: intent.intent_id, reason: err.to_string() });
                Ok(())
            }
            Ok(Ok(broker_order_id)) => self.confirm_placed(intent, &trade, order, broker_order_id).await,
        }
    }

    async fn confirm_placed(
        &self,
        intent: &TradeIntentRow,
        trade: &TradeRow,
        order: OrderRow,
        broker_order_id: String,
    ) -> Result<(), ExecutionError> {
        let mut next = order;
        next.version += 1;
        next.status = OrderStatus::Placed;
        next.broker_order_id = Some(broker_order_id.clone());
        next.last_broker_update_at = Some(Utc::now());
        let updated = self.repos.orders.update(next).await?;

        self.tms.mark_pending(trade.trade_id, broker_order_id.clone()).await?;

        let mut next_intent = intent.clone();
        next_intent.version += 1;
        next_intent.status = IntentStatus::Placed;
        next_intent.order_id = Some(updated.order_id);
        next_intent.trade_id = Some(trade.trade_id);
        self.repos.trade_intents.update(next_intent).await?;

        self.emit(ExecutionEvent::OrderPlaced { intent_id: intent.intent_id, order_id: updated.order_id, broker_order_id });
        Ok(())
    }

    async fn reject(&self, intent: &TradeIntentRow, trade: &TradeRow, order: &OrderRow, reason: String) -> Result<(), ExecutionError> {
        let mut next = order.clone();
        next.version += 1;
        next.status = OrderStatus::Rejected;
        next.last_broker_update_at = Some(Utc::now());
        self.repos.orders.update(next).await?;

        self.tms.mark_rejected(trade.trade_id, reason.clone()).await?;

        let mut next_intent = intent.clone();
        next_intent.version += 1;
        next_intent.status = IntentStatus::Failed;
        next_intent.validation_errors.push(reason.clone());
        self.repos.trade_intents.update(next_intent).await?;

        self.emit(ExecutionEvent::OrderRejected { intent_id: intent.intent_id, reason });
        Ok(())
    }
}
