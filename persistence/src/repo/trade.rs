//! Repository for `trades`, sole-written by TMS (`spec.md` §4.8).

use async_trait::async_trait;
use atlas_core::Symbol;
use sqlx::{PgPool, Postgres, Transaction};

use crate::error::PersistenceError;
use crate::model::trade::TradeRow;
use crate::versioned::{
    lock_current_version, map_unique_violation, soft_delete_current, soft_delete_current_in_tx,
    VersionedRepository,
};

const TRADE_COLUMNS: &str = "trade_id, version, intent_id, portfolio_id, user_id, user_broker_id, \
    signal_id, exchange, code, direction, entry_qty, entry_price, entry_value, status, \
    htf_low_at_entry, htf_high_at_entry, itf_low_at_entry, itf_high_at_entry, ltf_low_at_entry, \
    ltf_high_at_entry, min_profit, target, stretch, max_loss_allowed, trailing_active, \
    trailing_high_price, trailing_stop_price, exit_price, exit_reason, exit_qty, realized_pnl, \
    holding_minutes, broker_order_id, broker_trade_id, last_broker_update_at, deleted_at";

#[derive(Clone)]
pub struct TradeRepo {
    pool: PgPool,
}

impl TradeRepo {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// The DB-loaded open-trades cache the exit service rebuilds on startup
    /// (`spec.md` §4.9: "never an in-memory-only source of truth").
    pub async fn find_open_for_symbol(&self, symbol: &Symbol) -> Result<Vec<TradeRow>, PersistenceError> {
        let query = format!(
            "SELECT {TRADE_COLUMNS} FROM trades WHERE exchange = $1 AND code = $2 \
             AND status IN ('OPEN', 'PARTIAL_EXIT') AND deleted_at IS NULL"
        );
        Ok(sqlx::query_as::<_, TradeRow>(&query).bind(&symbol.exchange).bind(&symbol.code).fetch_all(&self.pool).await?)
    }

    pub async fn find_all_open(&self) -> Result<Vec<TradeRow>, PersistenceError> {
        let query = format!(
            "SELECT {TRADE_COLUMNS} FROM trades WHERE status IN ('OPEN', 'PARTIAL_EXIT') AND deleted_at IS NULL"
        );
        Ok(sqlx::query_as::<_, TradeRow>(&query).fetch_all(&self.pool).await?)
    }

    pub async fn find_pending_older_than(
        &self,
        staleness: chrono::Duration,
    ) -> Result<Vec<TradeRow>, PersistenceError> {
        let cutoff = chrono::Utc::now() - staleness;
        let query = format!(
            "SELECT {TRADE_COLUMNS} FROM trades WHERE status = 'PENDING' \
             AND COALESCE(last_broker_update_at, '-infinity') < $1 AND deleted_at IS NULL"
        );
        Ok(sqlx::query_as::<_, TradeRow>(&query).bind(cutoff).fetch_all(&self.pool).await?)
    }

    /// Open/pending exposure for a `UserBroker`, the deployed-capital input to
    /// the `EXCEEDS_MAX_EXPOSURE` / `INSUFFICIENT_CAPITAL` gates (`spec.md` §4.6).
    pub async fn find_live_for_user_broker(
        &self,
        user_broker_id: atlas_core::UserBrokerId,
    ) -> Result<Vec<TradeRow>, PersistenceError> {
        let query = format!(
            "SELECT {TRADE_COLUMNS} FROM trades WHERE user_broker_id = $1 \
             AND status IN ('CREATED', 'PENDING', 'OPEN', 'PARTIAL_EXIT') AND deleted_at IS NULL"
        );
        Ok(sqlx::query_as::<_, TradeRow>(&query).bind(user_broker_id).fetch_all(&self.pool).await?)
    }

    /// Closed trades since `since`, the realized-loss input to the
    /// `DAILY_LOSS_CAP_HIT` gate (`spec.md` §4.6).
    pub async fn find_closed_since(
        &self,
        user_broker_id: atlas_core::UserBrokerId,
        since: chrono::DateTime<chrono::Utc>,
    ) -> Result<Vec<TradeRow>, PersistenceError> {
        let query = format!(
            "SELECT {TRADE_COLUMNS} FROM trades WHERE user_broker_id = $1 AND status = 'CLOSED' \
             AND last_broker_update_at >= $2 AND deleted_at IS NULL"
        );
        Ok(sqlx::query_as::<_, TradeRow>(&query).bind(user_broker_id).bind(since).fetch_all(&self.pool).await?)
    }

    /// Looks up the trade bound to an intent, if any. `OrderPlacementService`
    /// consults this before creating a new `Trade` row so a crash-restarted
    /// orchestrator resumes the same intent's placement rather than opening a
    /// second trade for it (`spec.md` §4.7: "Create the Trade row first ...
    /// this binds intentId<->tradeId and owns the slot even if the broker call
    /// later fails").
    pub async fn find_by_intent_id(&self, intent_id: atlas_core::IntentId) -> Result<Option<TradeRow>, PersistenceError> {
        let query = format!("SELECT {TRADE_COLUMNS} FROM trades WHERE intent_id = $1 AND deleted_at IS NULL");
        Ok(sqlx::query_as::<_, TradeRow>(&query).bind(intent_id).fetch_optional(&self.pool).await?)
    }

    /// Most recent live entry for a symbol under a `UserBroker`, consulted by
    /// the averaging gate (`spec.md` §4.6: spacing since the last entry must
    /// clear `multiplier x ATR`).
    pub async fn find_last_entry_for_symbol(
        &self,
        user_broker_id: atlas_core::UserBrokerId,
        symbol: &Symbol,
    ) -> Result<Option<TradeRow>, PersistenceError> {
        let query = format!(
            "SELECT {TRADE_COLUMNS} FROM trades WHERE user_broker_id = $1 AND exchange = $2 AND code = $3 \
             AND status IN ('OPEN', 'PARTIAL_EXIT') AND deleted_at IS NULL \
             ORDER BY version DESC LIMIT 1"
        );
        Ok(sqlx::query_as::<_, TradeRow>(&query)
            .bind(user_broker_id)
            .bind(&symbol.exchange)
            .bind(&symbol.code)
            .fetch_optional(&self.pool)
            .await?)
    }
}

#[async_trait]
impl VersionedRepository<TradeRow> for TradeRepo {
    fn table_name(&self) -> &'static str {
        "trades"
    }

    async fn find_active_by_id(&self, id: &str) -> Result<Option<TradeRow>, PersistenceError> {
        let trade_id: uuid::Uuid = id.parse().map_err(|_| PersistenceError::NotFound(id.to_string()))?;
        let query = format!("SELECT {TRADE_COLUMNS} FROM trades WHERE trade_id = $1 AND deleted_at IS NULL");
        Ok(sqlx::query_as::<_, TradeRow>(&query).bind(trade_id).fetch_optional(&self.pool).await?)
    }

    async fn find_all_versions(&self, id: &str) -> Result<Vec<TradeRow>, PersistenceError> {
        let trade_id: uuid::Uuid = id.parse().map_err(|_| PersistenceError::NotFound(id.to_string()))?;
        let query = format!("SELECT {TRADE_COLUMNS} FROM trades WHERE trade_id = $1 ORDER BY version");
        Ok(sqlx::query_as::<_, TradeRow>(&query).bind(trade_id).fetch_all(&self.pool).await?)
    }

    async fn insert_v1(&self, entity: TradeRow) -> Result<TradeRow, PersistenceError> {
        self.insert_at_version(entity, 1).await
    }

    async fn soft_delete(&self, id: &str) -> Result<(), PersistenceError> {
        soft_delete_current(&self.pool, "trades", "trade_id", id).await
    }

    async fn begin(&self) -> Result<Transaction<'static, Postgres>, PersistenceError> {
        Ok(self.pool.begin().await?)
    }

    async fn lock_current_for_update(
        &self,
        tx: &mut Transaction<'static, Postgres>,
        id: &str,
    ) -> Result<Option<i64>, PersistenceError> {
        lock_current_version(tx, "trades", "trade_id", id).await
    }

    async fn soft_delete_in_tx(
        &self,
        tx: &mut Transaction<'static, Postgres>,
        id: &str,
    ) -> Result<(), PersistenceError> {
        soft_delete_current_in_tx(tx, "trades", "trade_id", id).await
    }

    async fn insert_in_tx(
        &self,
        tx: &mut Transaction<'static, Postgres>,
        entity: TradeRow,
    ) -> Result<TradeRow, PersistenceError> {
        let version = entity.version;
        self.insert_row(tx, entity, version).await
    }
}

impl TradeRepo {
    async fn insert_at_version(&self, entity: TradeRow, version: i64) -> Result<TradeRow, PersistenceError> {
        let query = format!("INSERT INTO trades ({TRADE_COLUMNS}) VALUES ({}) RETURNING {TRADE_COLUMNS}", Self::placeholders());
        sqlx::query_as::<_, TradeRow>(&query)
            .bind(entity.trade_id)
            .bind(version)
            .bind(entity.intent_id)
            .bind(entity.portfolio_id)
            .bind(entity.user_id)
            .bind(entity.user_broker_id)
            .bind(entity.signal_id)
            .bind(&entity.exchange)
            .bind(&entity.code)
            .bind(entity.direction)
            .bind(entity.entry_qty)
            .bind(entity.entry_price)
            .bind(entity.entry_value)
            .bind(entity.status)
            .bind(entity.htf_low_at_entry)
            .bind(entity.htf_high_at_entry)
            .bind(entity.itf_low_at_entry)
            .bind(entity.itf_high_at_entry)
            .bind(entity.ltf_low_at_entry)
            .bind(entity.ltf_high_at_entry)
            .bind(entity.min_profit)
            .bind(entity.target)
            .bind(entity.stretch)
            .bind(entity.max_loss_allowed)
            .bind(entity.trailing_active)
            .bind(entity.trailing_high_price)
            .bind(entity.trailing_stop_price)
            .bind(entity.exit_price)
            .bind(entity.exit_reason)
            .bind(entity.exit_qty)
            .bind(entity.realized_pnl)
            .bind(entity.holding_minutes)
            .bind(&entity.broker_order_id)
            .bind(&entity.broker_trade_id)
            .bind(entity.last_broker_update_at)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| map_unique_violation(&entity.trade_id.to_string(), e))
    }

    async fn insert_row(
        &self,
        tx: &mut Transaction<'static, Postgres>,
        entity: TradeRow,
        version: i64,
    ) -> Result<TradeRow, PersistenceError> {
        let query = format!("INSERT INTO trades ({TRADE_COLUMNS}) VALUES ({}) RETURNING {TRADE_COLUMNS}", Self::placeholders());
        sqlx::query_as::<_, TradeRow>(&query)
            .bind(entity.trade_id)
            .bind(version)
            .bind(entity.intent_id)
            .bind(entity.portfolio_id)
            .bind(entity.user_id)
            .bind(entity.user_broker_id)
            .bind(entity.signal_id)
            .bind(&entity.exchange)
            .bind(&entity.code)
            .bind(entity.direction)
            .bind(entity.entry_qty)
            .bind(entity.entry_price)
            .bind(entity.entry_value)
            .bind(entity.status)
            .bind(entity.htf_low_at_entry)
            .bind(entity.htf_high_at_entry)
            .bind(entity.itf_low_at_entry)
            .bind(entity.itf_high_at_entry)
            .bind(entity.ltf_low_at_entry)
            .bind(entity.ltf_high_at_entry)
            .bind(entity.min_profit)
            .bind(entity.target)
            .bind(entity.stretch)
            .bind(entity.max_loss_allowed)
            .bind(entity.trailing_active)
            .bind(entity.trailing_high_price)
            .bind(entity.trailing_stop_price)
            .bind(entity.exit_price)
            .bind(entity.exit_reason)
            .bind(entity.exit_qty)
            .bind(entity.realized_pnl)
            .bind(entity.holding_minutes)
            .bind(&entity.broker_order_id)
            .bind(&entity.broker_trade_id)
            .bind(entity.last_broker_update_at)
            .fetch_one(&mut **tx)
            .await
            .map_err(|e| map_unique_violation(&entity.trade_id.to_string(), e))
    }

    /// 36 columns in `TRADE_COLUMNS`; 35 are bound (everything through
    /// `last_broker_update_at`) and the trailing `deleted_at` is a literal `NULL`.
    fn placeholders() -> String {
        let mut out = String::new();
        for i in 1..=35 {
            if i > 1 {
                out.push_str(", ");
            }
            out.push('$');
            out.push_str(&i.to_string());
        }
        out.push_str(", NULL");
        out
    }
}
