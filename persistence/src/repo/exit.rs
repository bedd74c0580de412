//! Repositories for `exit_signals` and `exit_intents`, sole-written by SMS /
//! the exit service (`spec.md` §4.9).

use async_trait::async_trait;
use atlas_core::{ExitIntentId, TradeId};
use chrono::{DateTime, Utc};
use sqlx::{PgPool, Postgres, Transaction};

use crate::error::PersistenceError;
use crate::model::exit::{ExitIntentRow, ExitSignalRow};
use crate::model::trade::ExitReason;
use crate::versioned::{
    lock_current_version, map_unique_violation, soft_delete_current, soft_delete_current_in_tx,
    VersionedRepository,
};

const EXIT_SIGNAL_COLUMNS: &str = "exit_signal_id, version, trade_id, exit_reason, episode_id, \
    exit_price_at_detection, brick_movement, favorable_movement, trailing_stop_price, status, deleted_at";

#[derive(Clone)]
pub struct ExitSignalRepo {
    pool: PgPool,
}

impl ExitSignalRepo {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// `SMS.generate_exit_episode` (`spec.md` §4.5): returns the next episode
    /// number for `(tradeId, exitReason)` under a row lock taken against the
    /// current max, so two concurrent callers never observe the same value.
    /// Must run inside the caller's transaction alongside the `ExitSignal`
    /// insert that follows.
    pub async fn next_episode_id(
        &self,
        tx: &mut Transaction<'static, Postgres>,
        trade_id: TradeId,
        exit_reason: ExitReason,
    ) -> Result<i64, PersistenceError> {
        let row: Option<(i64,)> = sqlx::query_as(
            "SELECT COALESCE(MAX(episode_id), 0) FROM exit_signals \
             WHERE trade_id = $1 AND exit_reason = $2 FOR UPDATE",
        )
        .bind(trade_id)
        .bind(exit_reason)
        .fetch_optional(&mut **tx)
        .await?;
        Ok(row.map(|r| r.0).unwrap_or(0) + 1)
    }

    /// Testable Property 8: episode ids for a `(tradeId, exitReason)` are a
    /// strictly increasing contiguous sequence starting at 1.
    pub async fn find_for_trade_and_reason(
        &self,
        trade_id: TradeId,
        exit_reason: ExitReason,
    ) -> Result<Vec<ExitSignalRow>, PersistenceError> {
        let query = format!(
            "SELECT {EXIT_SIGNAL_COLUMNS} FROM exit_signals \
             WHERE trade_id = $1 AND exit_reason = $2 ORDER BY episode_id"
        );
        Ok(sqlx::query_as::<_, ExitSignalRow>(&query).bind(trade_id).bind(exit_reason).fetch_all(&self.pool).await?)
    }
}

#[async_trait]
impl VersionedRepository<ExitSignalRow> for ExitSignalRepo {
    fn table_name(&self) -> &'static str {
        "exit_signals"
    }

    async fn find_active_by_id(&self, id: &str) -> Result<Option<ExitSignalRow>, PersistenceError> {
        let exit_signal_id: uuid::Uuid = id.parse().map_err(|_| PersistenceError::NotFound(id.to_string()))?;
        let query = format!("SELECT {EXIT_SIGNAL_COLUMNS} FROM exit_signals WHERE exit_signal_id = $1 AND deleted_at IS NULL");
        Ok(sqlx::query_as::<_, ExitSignalRow>(&query).bind(exit_signal_id).fetch_optional(&self.pool).await?)
    }

    async fn find_all_versions(&self, id: &str) -> Result<Vec<ExitSignalRow>, PersistenceError> {
        let exit_signal_id: uuid::Uuid = id.parse().map_err(|_| PersistenceError::NotFound(id.to_string()))?;
        let query = format!("SELECT {EXIT_SIGNAL_COLUMNS} FROM exit_signals WHERE exit_signal_id = $1 ORDER BY version");
        Ok(sqlx::query_as::<_, ExitSignalRow>(&query).bind(exit_signal_id).fetch_all(&self.pool).await?)
    }

    async fn insert_v1(&self, entity: ExitSignalRow) -> Result<ExitSignalRow, PersistenceError> {
        let query = format!(
            "INSERT INTO exit_signals ({EXIT_SIGNAL_COLUMNS}) \
             VALUES ($1, 1, $2, $3, $4, $5, $6, $7, $8, $9, NULL) RETURNING {EXIT_SIGNAL_COLUMNS}"
        );
        sqlx::query_as::<_, ExitSignalRow>(&query)
            .bind(entity.exit_signal_id)
            .bind(entity.trade_id)
            .bind(entity.exit_reason)
            .bind(entity.episode_id)
            .bind(entity.exit_price_at_detection)
            .bind(entity.brick_movement)
            .bind(entity.favorable_movement)
            .bind(entity.trailing_stop_price)
            .bind(entity.status)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| map_unique_violation(&entity.exit_signal_id.to_string(), e))
    }

    async fn soft_delete(&self, id: &str) -> Result<(), PersistenceError> {
        soft_delete_current(&self.pool, "exit_signals", "exit_signal_id", id).await
    }

    async fn begin(&self) -> Result<Transaction<'static, Postgres>, PersistenceError> {
        Ok(self.pool.begin().await?)
    }

    async fn lock_current_for_update(
        &self,
        tx: &mut Transaction<'static, Postgres>,
        id: &str,
    ) -> Result<Option<i64>, PersistenceError> {
        lock_current_version(tx, "exit_signals", "exit_signal_id", id).await
    }

    async fn soft_delete_in_tx(
        &self,
        tx: &mut Transaction<'static, Postgres>,
        id: &str,
    ) -> Result<(), PersistenceError> {
        soft_delete_current_in_tx(tx, "exit_signals", "exit_signal_id", id).await
    }

    async fn insert_in_tx(
        &self,
        tx: &mut Transaction<'static, Postgres>,
        entity: ExitSignalRow,
    ) -> Result<ExitSignalRow, PersistenceError> {
        let query = format!(
            "INSERT INTO exit_signals ({EXIT_SIGNAL_COLUMNS}) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, NULL) RETURNING {EXIT_SIGNAL_COLUMNS}"
        );
        sqlx::query_as::<_, ExitSignalRow>(&query)
            .bind(entity.exit_signal_id)
            .bind(entity.version)
            .bind(entity.trade_id)
            .bind(entity.exit_reason)
            .bind(entity.episode_id)
            .bind(entity.exit_price_at_detection)
            .bind(entity.brick_movement)
            .bind(entity.favorable_movement)
            .bind(entity.trailing_stop_price)
            .bind(entity.status)
            .fetch_one(&mut **tx)
            .await
            .map_err(|e| map_unique_violation(&entity.exit_signal_id.to_string(), e))
    }
}

const EXIT_INTENT_COLUMNS: &str = "exit_intent_id, version, trade_id, user_broker_id, exit_reason, \
    episode_id, calculated_qty, order_type, limit_price, status, broker_order_id, cooldown_until, deleted_at";

#[derive(Clone)]
pub struct ExitIntentRepo {
    pool: PgPool,
}

impl ExitIntentRepo {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// The DB-backed cooldown mandated by `spec.md` §9 Open Questions ("this
    /// spec mandates the DB timestamp form to survive restart"): an episode
    /// re-arm is blocked while a prior attempt's `cooldown_until` is in the future.
    pub async fn in_cooldown(
        &self,
        trade_id: TradeId,
        exit_reason: ExitReason,
        now: DateTime<Utc>,
    ) -> Result<bool, PersistenceError> {
        let row: Option<(i64,)> = sqlx::query_as(
            "SELECT 1 FROM exit_intents \
             WHERE trade_id = $1 AND exit_reason = $2 AND cooldown_until > $3 AND deleted_at IS NULL \
             LIMIT 1",
        )
        .bind(trade_id)
        .bind(exit_reason)
        .bind(now)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.is_some())
    }

    pub async fn find_by_id(&self, id: ExitIntentId) -> Result<Option<ExitIntentRow>, PersistenceError> {
        let query = format!("SELECT {EXIT_INTENT_COLUMNS} FROM exit_intents WHERE exit_intent_id = $1 AND deleted_at IS NULL");
        Ok(sqlx::query_as::<_, ExitIntentRow>(&query).bind(id).fetch_optional(&self.pool).await?)
    }

    /// Exit intents placed at the broker but not yet known to have filled —
    /// the exit service's own reconciliation sweep (`spec.md` §4.9 step 4)
    /// consults this to transition `exit_signals`/`exit_intents` once their
    /// `Order` completes, since `ExitOrderReconciler` (`spec.md` §4.10) only
    /// owns `orders`/`trades`, not SMS's tables.
    pub async fn find_placed(&self) -> Result<Vec<ExitIntentRow>, PersistenceError> {
        let query = format!("SELECT {EXIT_INTENT_COLUMNS} FROM exit_intents WHERE status = 'PLACED' AND deleted_at IS NULL");
        Ok(sqlx::query_as::<_, ExitIntentRow>(&query).fetch_all(&self.pool).await?)
    }
}

#[async_trait]
impl VersionedRepository<ExitIntentRow> for ExitIntentRepo {
    fn table_name(&self) -> &'static str {
        "exit_intents"
    }

    async fn find_active_by_id(&self, id: &str) -> Result<Option<ExitIntentRow>, PersistenceError> {
        let exit_intent_id: uuid::Uuid = id.parse().map_err(|_| PersistenceError::NotFound(id.to_string()))?;
        let query = format!("SELECT {EXIT_INTENT_COLUMNS} FROM exit_intents WHERE exit_intent_id = $1 AND deleted_at IS NULL");
        Ok(sqlx::query_as::<_, ExitIntentRow>(&query).bind(exit_intent_id).fetch_optional(&self.pool).await?)
    }

    async fn find_all_versions(&self, id: &str) -> Result<Vec<ExitIntentRow>, PersistenceError> {
        let exit_intent_id: uuid::Uuid = id.parse().map_err(|_| PersistenceError::NotFound(id.to_string()))?;
        let query = format!("SELECT {EXIT_INTENT_COLUMNS} FROM exit_intents WHERE exit_intent_id = $1 ORDER BY version");
        Ok(sqlx::query_as::<_, ExitIntentRow>(&query).bind(exit_intent_id).fetch_all(&self.pool).await?)
    }

    async fn insert_v1(&self, entity: ExitIntentRow) -> Result<ExitIntentRow, PersistenceError> {
        let query = format!(
            "INSERT INTO exit_intents ({EXIT_INTENT_COLUMNS}) \
             VALUES ($1, 1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, NULL) RETURNING {EXIT_INTENT_COLUMNS}"
        );
        sqlx::query_as::<_, ExitIntentRow>(&query)
            .bind(entity.exit_intent_id)
            .bind(entity.trade_id)
            .bind(entity.user_broker_id)
            .bind(entity.exit_reason)
            .bind(entity.episode_id)
            .bind(entity.calculated_qty)
            .bind(&entity.order_type)
            .bind(entity.limit_price)
            .bind(entity.status)
            .bind(&entity.broker_order_id)
            .bind(entity.cooldown_until)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| map_unique_violation(&entity.exit_intent_id.to_string(), e))
    }

    async fn soft_delete(&self, id: &str) -> Result<(), PersistenceError> {
        soft_delete_current(&self.pool, "exit_intents", "exit_intent_id", id).await
    }

    async fn begin(&self) -> Result<Transaction<'static, Postgres>, PersistenceError> {
        Ok(self.pool.begin().await?)
    }

    async fn lock_current_for_update(
        &self,
        tx: &mut Transaction<'static, Postgres>,
        id: &str,
    ) -> Result<Option<i64>, PersistenceError> {
        lock_current_version(tx, "exit_intents", "exit_intent_id", id).await
    }

    async fn soft_delete_in_tx(
        &self,
        tx: &mut Transaction<'static, Postgres>,
        id: &str,
    ) -> Result<(), PersistenceError> {
        soft_delete_current_in_tx(tx, "exit_intents", "exit_intent_id", id).await
    }

    async fn insert_in_tx(
        &self,
        tx: &mut Transaction<'static, Postgres>,
        entity: ExitIntentRow,
    ) -> Result<ExitIntentRow, PersistenceError> {
        let query = format!(
            "INSERT INTO exit_intents ({EXIT_INTENT_COLUMNS}) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, NULL) RETURNING {EXIT_INTENT_COLUMNS}"
        );
        sqlx::query_as::<_, ExitIntentRow>(&query)
            .bind(entity.exit_intent_id)
            .bind(entity.version)
            .bind(entity.trade_id)
            .bind(entity.user_broker_id)
            .bind(entity.exit_reason)
            .bind(entity.episode_id)
            .bind(entity.calculated_qty)
            .bind(&entity.order_type)
            .bind(entity.limit_price)
            .bind(entity.status)
            .bind(&entity.broker_order_id)
            .bind(entity.cooldown_until)
            .fetch_one(&mut **tx)
            .await
            .map_err(|e| map_unique_violation(&entity.exit_intent_id.to_string(), e))
    }
}
