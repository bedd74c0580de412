//! `PendingOrderReconciler` (`spec.md` §4.10): periodically refreshes entry
//! `Order` rows against broker truth and drives the `Trade` transition the
//! fill implies. This is the only writer of a `Trade`'s `Pending -> Open`
//! edge — [`atlas_execution::OrderPlacementService`] stops at `Pending`
//! precisely so this reconciler is the single place that edge fires.

use std::sync::Arc;
use std::time::Duration;

use atlas_broker::{require_order_broker, BrokerRegistry, OrderBrokerError};
use atlas_core::{IntentId, OrderId, UserBrokerId};
use atlas_persistence::model::{IntentStatus, OrderRow, OrderStatus, ReconcileStatus, TradeStatus};
use atlas_persistence::{Repositories, VersionedRepository};
use atlas_tms::TradeManagementService;
use chrono::Utc;
use dashmap::DashMap;
use rust_decimal::Decimal;

use crate::error::ReconcileError;
use crate::status_map::map_broker_state;

/// `spec.md` §4.10: "default 2 min for PLACED, 5 min for OPEN".
const PLACED_STALENESS: chrono::Duration = chrono::Duration::minutes(2);
const OPEN_STALENESS: chrono::Duration = chrono::Duration::minutes(5);

/// `spec.md` §5: "default ... 5s status" broker-call deadline.
const STATUS_DEADLINE: Duration = Duration::from_secs(5);

/// `spec.md` §4.10 step 4: "If broker says NotFound after K retries".
const NOT_FOUND_RETRY_LIMIT: u32 = 3;

const MAX_CONCURRENT_STATUS_CALLS_PER_BROKER: usize = 4;

pub struct PendingOrderReconciler {
    repos: Repositories,
    registry: Arc<BrokerRegistry>,
    tms: TradeManagementService,
    limiters: DashMap<UserBrokerId, atlas_integration::RateLimiter>,
    not_found_counts: DashMap<OrderId, u32>,
}

impl std::fmt::Debug for PendingOrderReconciler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PendingOrderReconciler").finish_non_exhaustive()
    }
}

impl PendingOrderReconciler {
    pub fn new(repos: Repositories, registry: Arc<BrokerRegistry>, tms: TradeManagementService) -> Self {
        Self { repos, registry, tms, limiters: DashMap::new(), not_found_counts: DashMap::new() }
    }

    fn limiter_for(&self, user_broker_id: UserBrokerId) -> atlas_integration::RateLimiter {
        self.limiters
            .entry(user_broker_id)
            .or_insert_with(|| atlas_integration::RateLimiter::new(MAX_CONCURRENT_STATUS_CALLS_PER_BROKER))
            .clone()
    }

    /// One sweep cycle. A single order's failure is logged and does not
    /// abort the rest of the sweep, matching the per-row single-flight model
    /// (`spec.md` §5: "Per-Order row | ... reconciler (status updates,
    /// single-flight per brokerOrderId)").
    pub async fn reconcile_once(&self) -> Result<usize, ReconcileError> {
        let mut stale = self.repos.orders.find_stale(&["PLACED"], PLACED_STALENESS).await?;
        stale.extend(self.repos.orders.find_stale(&["OPEN"], OPEN_STALENESS).await?);

        let mut processed = 0;
        for order in stale {
            if order.order_type != atlas_persistence::model::OrderKind::Entry {
                continue;
            }
            match self.reconcile_order(order).await {
                Ok(changed) => {
                    if changed {
                        processed += 1;
                    }
                }
                Err(err) => tracing::error!(error = %err, "entry order reconciliation failed"),
            }
        }
        Ok(processed)
    }

    async fn reconcile_order(&self, order: OrderRow) -> Result<bool, ReconcileError> {
        let Some(broker_order_id) = order.broker_order_id.clone() else {
            return Err(ReconcileError::MissingBrokerOrderId(order.order_id));
        };
        let broker = require_order_broker(&self.registry, order.user_broker_id)?;
        let limiter = self.limiter_for(order.user_broker_id);

        let permit = match limiter.acquire_timeout(STATUS_DEADLINE).await {
            Ok(permit) => permit,
            Err(_) => {
                tracing::debug!(order_id = %order.order_id, "status rate limiter saturated, deferring to next cycle");
                return Ok(false);
            }
        };
        let outcome = tokio::time::timeout(STATUS_DEADLINE, broker.get_order_status(&broker_order_id)).await;
        drop(permit);

        let snapshot = match outcome {
            Err(_elapsed) => {
                tracing::warn!(order_id = %order.order_id, "order status call timed out, will retry next cycle");
                return Ok(false);
            }
            Ok(Err(OrderBrokerError::NotFound(_))) => {
                return self.handle_not_found(order).await;
            }
            Ok(Err(err)) => {
                tracing::warn!(order_id = %order.order_id, error = %err, "order status call failed, will retry next cycle");
                return Ok(false);
            }
            Ok(Ok(snapshot)) => snapshot,
        };
        self.not_found_counts.remove(&order.order_id);

        let mapped_status = map_broker_state(snapshot.status);
        if mapped_status == order.status && snapshot.filled_qty == order.filled_qty && snapshot.avg_price == order.avg_fill_price {
            return Ok(false);
        }

        let updated = self
            .repos
            .orders
            .apply_broker_snapshot(&order, mapped_status, snapshot.filled_qty, snapshot.avg_price, snapshot.exchange_ts)
            .await?;

        self.apply_trade_transition(&updated, snapshot.avg_price).await?;
        Ok(true)
    }

    /// `spec.md` §4.10 step 3: "apply a transition via TMS / order service".
    /// Only the edges a broker fill/cancel/reject can actually cause are
    /// handled here; a reconciler never invents a trade transition the
    /// broker snapshot doesn't support.
    async fn apply_trade_transition(&self, order: &OrderRow, avg_price: Option<Decimal>) -> Result<(), ReconcileError> {
        let Some(trade_id) = order.trade_id else { return Ok(()) };
        let Some(trade) = self.tms.find(trade_id).await? else {
            return Err(ReconcileError::TradeNotFound { order_id: order.order_id, trade_id });
        };

        match (trade.status, order.status) {
            (TradeStatus::Pending, OrderStatus::Open | OrderStatus::Complete) if order.filled_qty > 0 => {
                let fill_price = avg_price.unwrap_or(trade.entry_price);
                self.tms.mark_open(trade_id, order.filled_qty, fill_price, order.broker_order_id.clone()).await?;
                self.mark_intent_executed(trade.intent_id).await?;
            }
            (TradeStatus::Pending, OrderStatus::Cancelled) => {
                self.tms.cancel(trade_id).await?;
            }
            (TradeStatus::Pending, OrderStatus::Rejected) => {
                self.tms.mark_rejected(trade_id, "broker reported rejection during reconciliation".to_string()).await?;
            }
            _ => {}
        }
        Ok(())
    }

    /// `spec.md` E7: "...Trade transitions PENDING->OPEN, TradeIntent
    /// status=EXECUTED." Mirrors the exit side's
    /// `ExitSignalService::reconcile_placed_exits`, which marks its own
    /// intent row `FILLED` once the order it spawned completes.
    async fn mark_intent_executed(&self, intent_id: IntentId) -> Result<(), ReconcileError> {
        let Some(intent) = self.repos.trade_intents.find_active_by_id(&intent_id.to_string()).await? else {
            return Err(ReconcileError::TradeIntentNotFound(intent_id));
        };
        let mut next = intent.clone();
        next.version += 1;
        next.status = IntentStatus::Executed;
        next.executed_at = Some(Utc::now());
        self.repos.trade_intents.update(next).await?;
        Ok(())
    }

    /// `spec.md` §4.10 step 4. Retry counts live in memory, not the DB: a
    /// reconciler restart simply starts the count over, which only delays
    /// the FAILED verdict by up to one more sweep and never produces a false
    /// positive.
    async fn handle_not_found(&self, order: OrderRow) -> Result<bool, ReconcileError> {
        let attempts = {
            let mut entry = self.not_found_counts.entry(order.order_id).or_insert(0);
            *entry += 1;
            *entry
        };
        if attempts < NOT_FOUND_RETRY_LIMIT {
            tracing::warn!(order_id = %order.order_id, attempts, "broker reports order not found, retrying");
            return Ok(false);
        }

        tracing::error!(order_id = %order.order_id, broker_order_id = ?order.broker_order_id, "order not found after retry limit, marking FAILED/OUT_OF_SYNC");
        let mut next = order.clone();
        next.version += 1;
        next.status = OrderStatus::Expired;
        next.reconcile_status = ReconcileStatus::OutOfSync;
        next.last_broker_update_at = Some(Utc::now());
        self.repos.orders.update(next).await?;
        self.not_found_counts.remove(&order.order_id);
        Ok(true)
    }
}
