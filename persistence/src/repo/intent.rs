//! Repository for `trade_intents`, written by validation/risk (`spec.md` §4.6).

use async_trait::async_trait;
use sqlx::{PgPool, Postgres, Transaction};

use crate::error::PersistenceError;
use crate::model::intent::TradeIntentRow;
use crate::versioned::{
    lock_current_version, map_unique_violation, soft_delete_current, soft_delete_current_in_tx,
    VersionedRepository,
};

const INTENT_COLUMNS: &str = "intent_id, version, signal_id, signal_delivery_id, user_id, \
    user_broker_id, validation_passed, validation_errors, calculated_qty, limit_price, order_type, \
    product_type, status, order_id, trade_id, executed_at, deleted_at";

#[derive(Clone)]
pub struct TradeIntentRepo {
    pool: PgPool,
}

impl TradeIntentRepo {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn find_approved_unplaced(&self, limit: i64) -> Result<Vec<TradeIntentRow>, PersistenceError> {
        let query = format!(
            "SELECT {INTENT_COLUMNS} FROM trade_intents \
             WHERE status = 'APPROVED' AND deleted_at IS NULL ORDER BY version LIMIT $1"
        );
        Ok(sqlx::query_as::<_, TradeIntentRow>(&query).bind(limit).fetch_all(&self.pool).await?)
    }
}

#[async_trait]
impl VersionedRepository<TradeIntentRow> for TradeIntentRepo {
    fn table_name(&self) -> &'static str {
        "trade_intents"
    }

    async fn find_active_by_id(&self, id: &str) -> Result<Option<TradeIntentRow>, PersistenceError> {
        let intent_id: uuid::Uuid = id.parse().map_err(|_| PersistenceError::NotFound(id.to_string()))?;
        let query = format!("SELECT {INTENT_COLUMNS} FROM trade_intents WHERE intent_id = $1 AND deleted_at IS NULL");
        Ok(sqlx::query_as::<_, TradeIntentRow>(&query).bind(intent_id).fetch_optional(&self.pool).await?)
    }

    async fn find_all_versions(&self, id: &str) -> Result<Vec<TradeIntentRow>, PersistenceError> {
        let intent_id: uuid::Uuid = id.parse().map_err(|_| PersistenceError::NotFound(id.to_string()))?;
        let query = format!("SELECT {INTENT_COLUMNS} FROM trade_intents WHERE intent_id = $1 ORDER BY version");
        Ok(sqlx::query_as::<_, TradeIntentRow>(&query).bind(intent_id).fetch_all(&self.pool).await?)
    }

    async fn insert_v1(&self, entity: TradeIntentRow) -> Result<TradeIntentRow, PersistenceError> {
        let query = format!(
            "INSERT INTO trade_intents ({INTENT_COLUMNS}) \
             VALUES ($1, 1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, NULL) \
             RETURNING {INTENT_COLUMNS}"
        );
        sqlx::query_as::<_, TradeIntentRow>(&query)
            .bind(entity.intent_id)
            .bind(entity.signal_id)
            .bind(entity.signal_delivery_id)
            .bind(entity.user_id)
            .bind(entity.user_broker_id)
            .bind(entity.validation_passed)
            .bind(&entity.validation_errors)
            .bind(entity.calculated_qty)
            .bind(entity.limit_price)
            .bind(&entity.order_type)
            .bind(&entity.product_type)
            .bind(entity.status)
            .bind(entity.order_id)
            .bind(entity.trade_id)
            .bind(entity.executed_at)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| map_unique_violation(&entity.intent_id.to_string(), e))
    }

    async fn soft_delete(&self, id: &str) -> Result<(), PersistenceError> {
        soft_delete_current(&self.pool, "trade_intents", "intent_id", id).await
    }

    async fn begin(&self) -> Result<Transaction<'static, Postgres>, PersistenceError> {
        Ok(self.pool.begin().await?)
    }

    async fn lock_current_for_update(
        &self,
        tx: &mut Transaction<'static, Postgres>,
        id: &str,
    ) -> Result<Option<i64>, PersistenceError> {
        lock_current_version(tx, "trade_intents", "intent_id", id).await
    }

    async fn soft_delete_in_tx(
        &self,
        tx: &mut Transaction<'static, Postgres>,
        id: &str,
    ) -> Result<(), PersistenceError> {
        soft_delete_current_in_tx(tx, "trade_intents", "intent_id", id).await
    }

    async fn insert_in_tx(
        &self,
        tx: &mut Transaction<'static, Postgres>,
        entity: TradeIntentRow,
    ) -> Result<TradeIntentRow, PersistenceError> {
        let query = format!(
            "INSERT INTO trade_intents ({INTENT_COLUMNS}) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, NULL) \
             RETURNING {INTENT_COLUMNS}"
        );
        sqlx::query_as::<_, TradeIntentRow>(&query)
            .bind(entity.intent_id)
            .bind(entity.version)
            .bind(entity.signal_id)
            .bind(entity.signal_delivery_id)
            .bind(entity.user_id)
            .bind(entity.user_broker_id)
            .bind(entity.validation_passed)
            .bind(&entity.validation_errors)
            .bind(entity.calculated_qty)
            .bind(entity.limit_price)
            .bind(&entity.order_type)
            .bind(&entity.product_type)
            .bind(entity.status)
            .bind(entity.order_id)
            .bind(entity.trade_id)
            .bind(entity.executed_at)
            .fetch_one(&mut **tx)
            .await
            .map_err(|e| map_unique_violation(&entity.intent_id.to_string(), e))
    }
}
