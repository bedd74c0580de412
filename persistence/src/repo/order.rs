//! Repositories for `orders` (unified entry/exit) and append-only `order_fills`
//! (`spec.md` §3, §4.7, §4.10).

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::{PgPool, Postgres, Transaction};

use crate::error::PersistenceError;
use crate::model::order::{OrderFillRow, OrderRow, OrderStatus};
use crate::versioned::{
    lock_current_version, map_unique_violation, soft_delete_current, soft_delete_current_in_tx,
    VersionedRepository,
};

const ORDER_COLUMNS: &str = "order_id, version, order_type, trade_id, intent_id, exit_intent_id, \
    user_broker_id, exchange, code, direction, product_type, price_type, limit_price, \
    trigger_price, ordered_qty, filled_qty, avg_fill_price, broker_order_id, client_order_id, \
    status, last_broker_update_at, reconcile_status, deleted_at";

#[derive(Clone)]
pub struct OrderRepo {
    pool: PgPool,
}

impl OrderRepo {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Invariant 5: at most one active order per `clientOrderId`. This is the
    /// idempotency check `OrderPlacementService` consults before calling the
    /// broker again for a retried intent (`spec.md` §4.7).
    pub async fn find_by_client_order_id(&self, client_order_id: &str) -> Result<Option<OrderRow>, PersistenceError> {
        let query = format!("SELECT {ORDER_COLUMNS} FROM orders WHERE client_order_id = $1 AND deleted_at IS NULL");
        Ok(sqlx::query_as::<_, OrderRow>(&query).bind(client_order_id).fetch_optional(&self.pool).await?)
    }

    pub async fn find_by_broker_order_id(&self, broker_order_id: &str) -> Result<Option<OrderRow>, PersistenceError> {
        let query = format!("SELECT {ORDER_COLUMNS} FROM orders WHERE broker_order_id = $1 AND deleted_at IS NULL");
        Ok(sqlx::query_as::<_, OrderRow>(&query).bind(broker_order_id).fetch_optional(&self.pool).await?)
    }

    /// `PendingOrderReconciler`'s sweep query (`spec.md` §4.10): stale orders
    /// awaiting a broker-truth refresh.
    pub async fn find_stale(
        &self,
        statuses: &[&str],
        staleness: chrono::Duration,
    ) -> Result<Vec<OrderRow>, PersistenceError> {
        let cutoff = Utc::now() - staleness;
        let query = format!(
            "SELECT {ORDER_COLUMNS} FROM orders WHERE status = ANY($1) \
             AND COALESCE(last_broker_update_at, '-infinity') < $2 AND deleted_at IS NULL"
        );
        Ok(sqlx::query_as::<_, OrderRow>(&query).bind(statuses).bind(cutoff).fetch_all(&self.pool).await?)
    }

    /// Applies a reconciler-observed broker snapshot as a new version: field-
    /// by-field status/filledQty/avgPrice, plus `lastBrokerUpdateAt` from the
    /// broker's own timestamp (Testable Property 9).
    pub async fn apply_broker_snapshot(
        &self,
        current: &OrderRow,
        status: OrderStatus,
        filled_qty: i64,
        avg_fill_price: Option<Decimal>,
        broker_ts: DateTime<Utc>,
    ) -> Result<OrderRow, PersistenceError> {
        let mut next = current.clone();
        next.version += 1;
        next.status = status;
        next.filled_qty = filled_qty;
        next.avg_fill_price = avg_fill_price;
        next.last_broker_update_at = Some(broker_ts);
        next.reconcile_status = crate::model::order::ReconcileStatus::InSync;
        <Self as VersionedRepository<OrderRow>>::update(self, next).await
    }
}

#[async_trait]
impl VersionedRepository<OrderRow> for OrderRepo {
    fn table_name(&self) -> &'static str {
        "orders"
    }

    async fn find_active_by_id(&self, id: &str) -> Result<Option<OrderRow>, PersistenceError> {
        let order_id: uuid::Uuid = id.parse().map_err(|_| PersistenceError::NotFound(id.to_string()))?;
        let query = format!("SELECT {ORDER_COLUMNS} FROM orders WHERE order_id = $1 AND deleted_at IS NULL");
        Ok(sqlx::query_as::<_, OrderRow>(&query).bind(order_id).fetch_optional(&self.pool).await?)
    }

    async fn find_all_versions(&self, id: &str) -> Result<Vec<OrderRow>, PersistenceError> {
        let order_id: uuid::Uuid = id.parse().map_err(|_| PersistenceError::NotFound(id.to_string()))?;
        let query = format!("SELECT {ORDER_COLUMNS} FROM orders WHERE order_id = $1 ORDER BY version");
        Ok(sqlx::query_as::<_, OrderRow>(&query).bind(order_id).fetch_all(&self.pool).await?)
    }

    async fn insert_v1(&self, entity: OrderRow) -> Result<OrderRow, PersistenceError> {
        let query = format!(
            "INSERT INTO orders ({ORDER_COLUMNS}) \
             VALUES ($1, 1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17, \
             $18, $19, $20, $21, NULL) RETURNING {ORDER_COLUMNS}"
        );
        sqlx::query_as::<_, OrderRow>(&query)
            .bind(entity.order_id)
            .bind(entity.order_type)
            .bind(entity.trade_id)
            .bind(entity.intent_id)
            .bind(entity.exit_intent_id)
            .bind(entity.user_broker_id)
            .bind(&entity.exchange)
            .bind(&entity.code)
            .bind(entity.direction)
            .bind(&entity.product_type)
            .bind(&entity.price_type)
            .bind(entity.limit_price)
            .bind(entity.trigger_price)
            .bind(entity.ordered_qty)
            .bind(entity.filled_qty)
            .bind(entity.avg_fill_price)
            .bind(&entity.broker_order_id)
            .bind(&entity.client_order_id)
            .bind(entity.status)
            .bind(entity.last_broker_update_at)
            .bind(entity.reconcile_status)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| map_unique_violation(&entity.client_order_id, e))
    }

    async fn soft_delete(&self, id: &str) -> Result<(), PersistenceError> {
        soft_delete_current(&self.pool, "orders", "order_id", id).await
    }

    async fn begin(&self) -> Result<Transaction<'static, Postgres>, PersistenceError> {
        Ok(self.pool.begin().await?)
    }

    async fn lock_current_for_update(
        &self,
        tx: &mut Transaction<'static, Postgres>,
        id: &str,
    ) -> Result<Option<i64>, PersistenceError> {
        lock_current_version(tx, "orders", "order_id", id).await
    }

    async fn soft_delete_in_tx(
        &self,
        tx: &mut Transaction<'static, Postgres>,
        id: &str,
    ) -> Result<(), PersistenceError> {
        soft_delete_current_in_tx(tx, "orders", "order_id", id).await
    }

    async fn insert_in_tx(
        &self,
        tx: &mut Transaction<'static, Postgres>,
        entity: OrderRow,
    ) -> Result<OrderRow, PersistenceError> {
        let query = format!(
            "INSERT INTO orders ({ORDER_COLUMNS}) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17, \
             $18, $19, $20, $21, $22, NULL) RETURNING {ORDER_COLUMNS}"
        );
        sqlx::query_as::<_, OrderRow>(&query)
            .bind(entity.order_id)
            .bind(entity.version)
            .bind(entity.order_type)
            .bind(entity.trade_id)
            .bind(entity.intent_id)
            .bind(entity.exit_intent_id)
            .bind(entity.user_broker_id)
            .bind(&entity.exchange)
            .bind(&entity.code)
            .bind(entity.direction)
            .bind(&entity.product_type)
            .bind(&entity.price_type)
            .bind(entity.limit_price)
            .bind(entity.trigger_price)
            .bind(entity.ordered_qty)
            .bind(entity.filled_qty)
            .bind(entity.avg_fill_price)
            .bind(&entity.broker_order_id)
            .bind(&entity.client_order_id)
            .bind(entity.status)
            .bind(entity.last_broker_update_at)
            .bind(entity.reconcile_status)
            .fetch_one(&mut **tx)
            .await
            .map_err(|e| map_unique_violation(&entity.client_order_id, e))
    }
}

/// Append-only; no soft delete, no versioning (`spec.md` §3: `OrderFill` is
/// "Append-only").
#[derive(Clone)]
pub struct OrderFillRepo {
    pool: PgPool,
}

impl OrderFillRepo {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn insert(&self, entity: OrderFillRow) -> Result<OrderFillRow, PersistenceError> {
        Ok(sqlx::query_as::<_, OrderFillRow>(
            "INSERT INTO order_fills (fill_id, order_id, fill_qty, fill_price, fill_ts, broker_fill_id) \
             VALUES ($1, $2, $3, $4, $5, $6) \
             RETURNING fill_id, order_id, fill_qty, fill_price, fill_ts, broker_fill_id",
        )
        .bind(entity.fill_id)
        .bind(entity.order_id)
        .bind(entity.fill_qty)
        .bind(entity.fill_price)
        .bind(entity.fill_ts)
        .bind(&entity.broker_fill_id)
        .fetch_one(&self.pool)
        .await?)
    }

    pub async fn find_for_order(&self, order_id: &str) -> Result<Vec<OrderFillRow>, PersistenceError> {
        let order_id: uuid::Uuid = order_id.parse().map_err(|_| PersistenceError::NotFound(order_id.to_string()))?;
        Ok(sqlx::query_as::<_, OrderFillRow>(
            "SELECT fill_id, order_id, fill_qty, fill_price, fill_ts, broker_fill_id FROM order_fills \
             WHERE order_id = $1 ORDER BY fill_ts",
        )
        .bind(order_id)
        .fetch_all(&self.pool)
        .await?)
    }
}
