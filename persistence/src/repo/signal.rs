//! Repositories for `signals` and `signal_deliveries`. Both tables are
//! sole-written by SMS (`spec.md` §4.5); this layer only gives SMS the atomic
//! primitives (`consume_delivery`'s CAS, dedupe-aware insert) it composes.

use async_trait::async_trait;
use chrono::NaiveDate;
use sqlx::{PgPool, Postgres, Transaction};

use crate::error::PersistenceError;
use crate::model::signal::{SignalDeliveryRow, SignalRow};
use crate::versioned::{
    lock_current_version, map_unique_violation, soft_delete_current, soft_delete_current_in_tx,
    VersionedRepository,
};

#[derive(Clone)]
pub struct SignalRepo {
    pool: PgPool,
}

impl SignalRepo {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// The dedupe read behind `persist_and_publish`'s "on duplicate, return the
    /// existing active signal" policy (`spec.md` §4.5), keyed on invariant 3's
    /// partial unique index.
    pub async fn find_active_by_key(
        &self,
        exchange: &str,
        code: &str,
        direction: atlas_core::Direction,
        confluence_type: crate::model::signal::ConfluenceType,
        trading_day: NaiveDate,
        effective_floor: rust_decimal::Decimal,
        effective_ceiling: rust_decimal::Decimal,
    ) -> Result<Option<SignalRow>, PersistenceError> {
        Ok(sqlx::query_as::<_, SignalRow>(
            "SELECT signal_id, version, exchange, code, direction, signal_type, confluence_type, \
             confluence_score, p_win, p_fill, kelly, ref_price, entry_low, entry_high, htf_low, \
             htf_high, itf_low, itf_high, ltf_low, ltf_high, effective_floor, effective_ceiling, \
             trading_day, expires_at, status, deleted_at FROM signals \
             WHERE exchange = $1 AND code = $2 AND direction = $3 AND confluence_type = $4 \
             AND trading_day = $5 AND effective_floor = $6 AND effective_ceiling = $7 \
             AND deleted_at IS NULL",
        )
        .bind(exchange)
        .bind(code)
        .bind(direction)
        .bind(confluence_type)
        .bind(trading_day)
        .bind(effective_floor)
        .bind(effective_ceiling)
        .fetch_optional(&self.pool)
        .await?)
    }
}

const SIGNAL_COLUMNS: &str = "signal_id, version, exchange, code, direction, signal_type, \
    confluence_type, confluence_score, p_win, p_fill, kelly, ref_price, entry_low, entry_high, \
    htf_low, htf_high, itf_low, itf_high, ltf_low, ltf_high, effective_floor, effective_ceiling, \
    trading_day, expires_at, status, deleted_at";

#[async_trait]
impl VersionedRepository<SignalRow> for SignalRepo {
    fn table_name(&self) -> &'static str {
        "signals"
    }

    async fn find_active_by_id(&self, id: &str) -> Result<Option<SignalRow>, PersistenceError> {
        let signal_id: uuid::Uuid = id.parse().map_err(|_| PersistenceError::NotFound(id.to_string()))?;
        let query = format!("SELECT {SIGNAL_COLUMNS} FROM signals WHERE signal_id = $1 AND deleted_at IS NULL");
        Ok(sqlx::query_as::<_, SignalRow>(&query).bind(signal_id).fetch_optional(&self.pool).await?)
    }

    async fn find_all_versions(&self, id: &str) -> Result<Vec<SignalRow>, PersistenceError> {
        let signal_id: uuid::Uuid = id.parse().map_err(|_| PersistenceError::NotFound(id.to_string()))?;
        let query = format!("SELECT {SIGNAL_COLUMNS} FROM signals WHERE signal_id = $1 ORDER BY version");
        Ok(sqlx::query_as::<_, SignalRow>(&query).bind(signal_id).fetch_all(&self.pool).await?)
    }

    async fn insert_v1(&self, entity: SignalRow) -> Result<SignalRow, PersistenceError> {
        // Invariant 2 (effective_floor < effective_ceiling) is enforced by a
        // CHECK constraint in the migration; a violation surfaces here as a
        // generic `Database` error rather than being pre-validated twice.
        let query = format!(
            "INSERT INTO signals ({SIGNAL_COLUMNS}) VALUES ($1, 1, $2, $3, $4, $5, $6, $7, $8, $9, \
             $10, $11, $12, $13, $14, $15, $16, $17, $18, $19, $20, $21, $22, $23, NULL) \
             RETURNING {SIGNAL_COLUMNS}"
        );
        sqlx::query_as::<_, SignalRow>(&query)
            .bind(entity.signal_id)
            .bind(&entity.exchange)
            .bind(&entity.code)
            .bind(entity.direction)
            .bind(&entity.signal_type)
            .bind(entity.confluence_type)
            .bind(entity.confluence_score)
            .bind(entity.p_win)
            .bind(entity.p_fill)
            .bind(entity.kelly)
            .bind(entity.ref_price)
            .bind(entity.entry_low)
            .bind(entity.entry_high)
            .bind(entity.htf_low)
            .bind(entity.htf_high)
            .bind(entity.itf_low)
            .bind(entity.itf_high)
            .bind(entity.ltf_low)
            .bind(entity.ltf_high)
            .bind(entity.effective_floor)
            .bind(entity.effective_ceiling)
            .bind(entity.trading_day)
            .bind(entity.expires_at)
            .bind(entity.status)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| map_unique_violation(&entity.signal_id.to_string(), e))
    }

    async fn soft_delete(&self, id: &str) -> Result<(), PersistenceError> {
        soft_delete_current(&self.pool, "signals", "signal_id", id).await
    }

    async fn begin(&self) -> Result<Transaction<'static, Postgres>, PersistenceError> {
        Ok(self.pool.begin().await?)
    }

    async fn lock_current_for_update(
        &self,
        tx: &mut Transaction<'static, Postgres>,
        id: &str,
    ) -> Result<Option<i64>, PersistenceError> {
        lock_current_version(tx, "signals", "signal_id", id).await
    }

    async fn soft_delete_in_tx(
        &self,
        tx: &mut Transaction<'static, Postgres>,
        id: &str,
    ) -> Result<(), PersistenceError> {
        soft_delete_current_in_tx(tx, "signals", "signal_id", id).await
    }

    async fn insert_in_tx(
        &self,
        tx: &mut Transaction<'static, Postgres>,
        entity: SignalRow,
    ) -> Result<SignalRow, PersistenceError> {
        let query = format!(
            "INSERT INTO signals ({SIGNAL_COLUMNS}) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, \
             $10, $11, $12, $13, $14, $15, $16, $17, $18, $19, $20, $21, $22, $23, $24, NULL) \
             RETURNING {SIGNAL_COLUMNS}"
        );
        sqlx::query_as::<_, SignalRow>(&query)
            .bind(entity.signal_id)
            .bind(entity.version)
            .bind(&entity.exchange)
            .bind(&entity.code)
            .bind(entity.direction)
            .bind(&entity.signal_type)
            .bind(entity.confluence_type)
            .bind(entity.confluence_score)
            .bind(entity.p_win)
            .bind(entity.p_fill)
            .bind(entity.kelly)
            .bind(entity.ref_price)
            .bind(entity.entry_low)
            .bind(entity.entry_high)
            .bind(entity.htf_low)
            .bind(entity.htf_high)
            .bind(entity.itf_low)
            .bind(entity.itf_high)
            .bind(entity.ltf_low)
            .bind(entity.ltf_high)
            .bind(entity.effective_floor)
            .bind(entity.effective_ceiling)
            .bind(entity.trading_day)
            .bind(entity.expires_at)
            .bind(entity.status)
            .fetch_one(&mut **tx)
            .await
            .map_err(|e| map_unique_violation(&entity.signal_id.to_string(), e))
    }
}

#[derive(Clone)]
pub struct SignalDeliveryRepo {
    pool: PgPool,
}

impl SignalDeliveryRepo {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn find_delivered_for_signal(
        &self,
        signal_id: &str,
    ) -> Result<Vec<SignalDeliveryRow>, PersistenceError> {
        let signal_id: uuid::Uuid =
            signal_id.parse().map_err(|_| PersistenceError::NotFound(signal_id.to_string()))?;
        Ok(sqlx::query_as::<_, SignalDeliveryRow>(
            "SELECT delivery_id, version, signal_id, user_broker_id, user_id, status, intent_id, \
             consumed_at, deleted_at FROM signal_deliveries \
             WHERE signal_id = $1 AND status = 'DELIVERED' AND deleted_at IS NULL",
        )
        .bind(signal_id)
        .fetch_all(&self.pool)
        .await?)
    }

    /// Invariant 5a / Testable Property 5: compare-and-set, succeeds only if
    /// the delivery is currently `DELIVERED`. The sole admissible bridge from
    /// signals to intents (`spec.md` §4.5).
    pub async fn consume(
        &self,
        delivery_id: &str,
        intent_id: atlas_core::IntentId,
    ) -> Result<bool, PersistenceError> {
        let delivery_id: uuid::Uuid =
            delivery_id.parse().map_err(|_| PersistenceError::NotFound(delivery_id.to_string()))?;
        let result = sqlx::query(
            "UPDATE signal_deliveries SET status = 'CONSUMED', intent_id = $2, consumed_at = now() \
             WHERE delivery_id = $1 AND status = 'DELIVERED' AND deleted_at IS NULL",
        )
        .bind(delivery_id)
        .bind(intent_id)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() == 1)
    }
}

const DELIVERY_COLUMNS: &str =
    "delivery_id, version, signal_id, user_broker_id, user_id, status, intent_id, consumed_at, deleted_at";

#[async_trait]
impl VersionedRepository<SignalDeliveryRow> for SignalDeliveryRepo {
    fn table_name(&self) -> &'static str {
        "signal_deliveries"
    }

    async fn find_active_by_id(&self, id: &str) -> Result<Option<SignalDeliveryRow>, PersistenceError> {
        let delivery_id: uuid::Uuid = id.parse().map_err(|_| PersistenceError::NotFound(id.to_string()))?;
        let query =
            format!("SELECT {DELIVERY_COLUMNS} FROM signal_deliveries WHERE delivery_id = $1 AND deleted_at IS NULL");
        Ok(sqlx::query_as::<_, SignalDeliveryRow>(&query).bind(delivery_id).fetch_optional(&self.pool).await?)
    }

    async fn find_all_versions(&self, id: &str) -> Result<Vec<SignalDeliveryRow>, PersistenceError> {
        let delivery_id: uuid::Uuid = id.parse().map_err(|_| PersistenceError::NotFound(id.to_string()))?;
        let query = format!("SELECT {DELIVERY_COLUMNS} FROM signal_deliveries WHERE delivery_id = $1 ORDER BY version");
        Ok(sqlx::query_as::<_, SignalDeliveryRow>(&query).bind(delivery_id).fetch_all(&self.pool).await?)
    }

    async fn insert_v1(&self, entity: SignalDeliveryRow) -> Result<SignalDeliveryRow, PersistenceError> {
        let query = format!(
            "INSERT INTO signal_deliveries ({DELIVERY_COLUMNS}) VALUES ($1, 1, $2, $3, $4, $5, $6, $7, NULL) \
             RETURNING {DELIVERY_COLUMNS}"
        );
        sqlx::query_as::<_, SignalDeliveryRow>(&query)
            .bind(entity.delivery_id)
            .bind(entity.signal_id)
            .bind(entity.user_broker_id)
            .bind(entity.user_id)
            .bind(entity.status)
            .bind(entity.intent_id)
            .bind(entity.consumed_at)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| map_unique_violation(&entity.delivery_id.to_string(), e))
    }

    async fn soft_delete(&self, id: &str) -> Result<(), PersistenceError> {
        soft_delete_current(&self.pool, "signal_deliveries", "delivery_id", id).await
    }

    async fn begin(&self) -> Result<Transaction<'static, Postgres>, PersistenceError> {
        Ok(self.pool.begin().await?)
    }

    async fn lock_current_for_update(
        &self,
        tx: &mut Transaction<'static, Postgres>,
        id: &str,
    ) -> Result<Option<i64>, PersistenceError> {
        lock_current_version(tx, "signal_deliveries", "delivery_id", id).await
    }

    async fn soft_delete_in_tx(
        &self,
        tx: &mut Transaction<'static, Postgres>,
        id: &str,
    ) -> Result<(), PersistenceError> {
        soft_delete_current_in_tx(tx, "signal_deliveries", "delivery_id", id).await
    }

    async fn insert_in_tx(
        &self,
        tx: &mut Transaction<'static, Postgres>,
        entity: SignalDeliveryRow,
    ) -> Result<SignalDeliveryRow, PersistenceError> {
        let query = format!(
            "INSERT INTO signal_deliveries ({DELIVERY_COLUMNS}) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, NULL) \
             RETURNING {DELIVERY_COLUMNS}"
        );
        sqlx::query_as::<_, SignalDeliveryRow>(&query)
            .bind(entity.delivery_id)
            .bind(entity.version)
            .bind(entity.signal_id)
            .bind(entity.user_broker_id)
            .bind(entity.user_id)
            .bind(entity.status)
            .bind(entity.intent_id)
            .bind(entity.consumed_at)
            .fetch_one(&mut **tx)
            .await
            .map_err(|e| map_unique_violation(&entity.delivery_id.to_string(), e))
    }
}
