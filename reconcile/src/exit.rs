//! `ExitOrderReconciler` (`spec.md` §4.10): "Identical in structure but
//! operates on ExitIntent + its Order; offset in time from the entry
//! reconciler to avoid contention." Keeps `orders`/`trades` current for
//! exit orders; [`atlas_exits::ExitSignalService::reconcile_placed_exits`]
//! is the separate sweep that follows up on SMS's own `exit_intents`/
//! `exit_signals` rows once this reconciler has moved the `Order` to
//! `COMPLETE`.

use std::sync::Arc;
use std::time::Duration;

use atlas_broker::{require_order_broker, BrokerRegistry, OrderBrokerError};
use atlas_core::{Direction, OrderId, UserBrokerId};
use atlas_persistence::model::{OrderKind, OrderRow, OrderStatus, ReconcileStatus, TradeStatus};
use atlas_persistence::{Repositories, VersionedRepository};
use atlas_tms::TradeManagementService;
use chrono::Utc;
use dashmap::DashMap;

use crate::error::ReconcileError;
use crate::status_map::map_broker_state;

const PLACED_STALENESS: chrono::Duration = chrono::Duration::minutes(2);
const OPEN_STALENESS: chrono::Duration = chrono::Duration::minutes(5);
const STATUS_DEADLINE: Duration = Duration::from_secs(5);
const NOT_FOUND_RETRY_LIMIT: u32 = 3;
const MAX_CONCURRENT_STATUS_CALLS_PER_BROKER: usize = 4;

pub struct ExitOrderReconciler {
    repos: Repositories,
    registry: Arc<BrokerRegistry>,
    tms: TradeManagementService,
    limiters: DashMap<UserBrokerId, atlas_integration::RateLimiter>,
    not_found_counts: DashMap<OrderId, u32>,
}

impl std::fmt::Debug for ExitOrderReconciler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExitOrderReconciler").finish_non_exhaustive()
    }
}

impl ExitOrderReconciler {
    pub fn new(repos: Repositories, registry: Arc<BrokerRegistry>, tms: TradeManagementService) -> Self {
        Self { repos, registry, tms, limiters: DashMap::new(), not_found_counts: DashMap::new() }
    }

    fn limiter_for(&self, user_broker_id: UserBrokerId) -> atlas_integration::RateLimiter {
        self.limiters
            .entry(user_broker_id)
            .or_insert_with(|| atlas_integration::RateLimiter::new(MAX_CONCURRENT_STATUS_CALLS_PER_BROKER))
            .clone()
    }

    pub async fn reconcile_once(&self) -> Result<usize, ReconcileError> {
        let mut stale = self.repos.orders.find_stale(&["PLACED"], PLACED_STALENESS).await?;
        stale.extend(self.repos.orders.find_stale(&["OPEN"], OPEN_STALENESS).await?);

        let mut processed = 0;
        for order in stale {
            if order.order_type != OrderKind::Exit {
                continue;
            }
            match self.reconcile_order(order).await {
                Ok(changed) => {
                    if changed {
                        processed += 1;
                    }
                }
                Err(err) => tracing::error!(error = %err, "exit order reconciliation failed"),
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
            Err(_) => return Ok(false),
        };
        let outcome = tokio::time::timeout(STATUS_DEADLINE, broker.get_order_status(&broker_order_id)).await;
        drop(permit);

        let snapshot = match outcome {
            Err(_elapsed) => {
                tracing::warn!(order_id = %order.order_id, "exit order status call timed out, will retry next cycle");
                return Ok(false);
            }
            Ok(Err(OrderBrokerError::NotFound(_))) => return self.handle_not_found(order).await,
            Ok(Err(err)) => {
                tracing::warn!(order_id = %order.order_id, error = %err, "exit order status call failed, will retry next cycle");
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

        self.apply_trade_exit(&updated).await?;
        Ok(true)
    }

    /// Books the exit against the trade once the broker confirms the fill.
    /// `exitReason`/`realized_pnl` come from the trade row the entry
    /// reconciler (or `OrderPlacementService`) already populated at entry —
    /// there is no separate entry-timestamp field on `TradeRow`, so holding
    /// time is measured from `lastBrokerUpdateAt` as last stamped by the
    /// `Pending -> Open` transition.
    async fn apply_trade_exit(&self, order: &OrderRow) -> Result<(), ReconcileError> {
        if order.status != OrderStatus::Complete || order.filled_qty == 0 {
            return Ok(());
        }
        let Some(trade_id) = order.trade_id else { return Ok(()) };
        let Some(exit_intent_id) = order.exit_intent_id else { return Ok(()) };
        let Some(trade) = self.tms.find(trade_id).await? else {
            return Err(ReconcileError::TradeNotFound { order_id: order.order_id, trade_id });
        };
        if !matches!(trade.status, TradeStatus::Open | TradeStatus::PartialExit) {
            return Ok(());
        }
        let Some(exit_intent) = self.repos.exit_intents.find_by_id(exit_intent_id).await? else {
            return Ok(());
        };

        let fill_price = order.avg_fill_price.unwrap_or(trade.entry_price);
        let opened_at = trade.last_broker_update_at.unwrap_or_else(Utc::now);
        let holding_minutes = (Utc::now() - opened_at).num_minutes().max(0);
        let realized_pnl_delta = match trade.direction {
            Direction::Buy => (fill_price - trade.entry_price) * rust_decimal::Decimal::from(order.filled_qty),
            Direction::Sell => (trade.entry_price - fill_price) * rust_decimal::Decimal::from(order.filled_qty),
        };

        self.tms
            .record_exit(trade_id, order.filled_qty, fill_price, exit_intent.exit_reason, realized_pnl_delta, holding_minutes)
            .await?;
        Ok(())
    }

    async fn handle_not_found(&self, order: OrderRow) -> Result<bool, ReconcileError> {
        let attempts = {
            let mut entry = self.not_found_counts.entry(order.order_id).or_insert(0);
            *entry += 1;
            *entry
        };
        if attempts < NOT_FOUND_RETRY_LIMIT {
            tracing::warn!(order_id = %order.order_id, attempts, "broker reports exit order not found, retrying");
            return Ok(false);
        }

        tracing::error!(order_id = %order.order_id, broker_order_id = ?order.broker_order_id, "exit order not found after retry limit, marking FAILED/OUT_OF_SYNC");
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
