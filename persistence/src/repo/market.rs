//! Repositories for `instruments`, `watchlist`, `candles`.

use async_trait::async_trait;
use atlas_core::Timeframe;
use chrono::{DateTime, Utc};
use sqlx::{PgPool, Postgres, Transaction};

use crate::error::PersistenceError;
use crate::model::market::{CandleRow, InstrumentRow, WatchlistRow};
use crate::versioned::{
    lock_current_version, map_unique_violation, soft_delete_current, soft_delete_current_in_tx,
    VersionedEntity, VersionedRepository,
};

/// `instruments` business id is `exchange:code`, not a surrogate, so this repo
/// parses the composite back out of `id` rather than a single `uuid::Uuid`.
#[derive(Clone)]
pub struct InstrumentRepo {
    pool: PgPool,
}

impl InstrumentRepo {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    fn split(id: &str) -> Result<(String, String), PersistenceError> {
        id.split_once(':')
            .map(|(e, c)| (e.to_string(), c.to_string()))
            .ok_or_else(|| PersistenceError::NotFound(id.to_string()))
    }
}

#[async_trait]
impl VersionedRepository<InstrumentRow> for InstrumentRepo {
    fn table_name(&self) -> &'static str {
        "instruments"
    }

    async fn find_active_by_id(&self, id: &str) -> Result<Option<InstrumentRow>, PersistenceError> {
        let (exchange, code) = Self::split(id)?;
        Ok(sqlx::query_as::<_, InstrumentRow>(
            "SELECT exchange, code, version, token, lot_size, tick_size, deleted_at FROM instruments \
             WHERE exchange = $1 AND code = $2 AND deleted_at IS NULL",
        )
        .bind(exchange)
        .bind(code)
        .fetch_optional(&self.pool)
        .await?)
    }

    async fn find_all_versions(&self, id: &str) -> Result<Vec<InstrumentRow>, PersistenceError> {
        let (exchange, code) = Self::split(id)?;
        Ok(sqlx::query_as::<_, InstrumentRow>(
            "SELECT exchange, code, version, token, lot_size, tick_size, deleted_at FROM instruments \
             WHERE exchange = $1 AND code = $2 ORDER BY version",
        )
        .bind(exchange)
        .bind(code)
        .fetch_all(&self.pool)
        .await?)
    }

    async fn insert_v1(&self, entity: InstrumentRow) -> Result<InstrumentRow, PersistenceError> {
        sqlx::query_as::<_, InstrumentRow>(
            "INSERT INTO instruments (exchange, code, version, token, lot_size, tick_size) \
             VALUES ($1, $2, 1, $3, $4, $5) \
             RETURNING exchange, code, version, token, lot_size, tick_size, deleted_at",
        )
        .bind(&entity.exchange)
        .bind(&entity.code)
        .bind(&entity.token)
        .bind(entity.lot_size)
        .bind(entity.tick_size)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| map_unique_violation(&entity.business_id(), e))
    }

    async fn soft_delete(&self, id: &str) -> Result<(), PersistenceError> {
        let (exchange, code) = Self::split(id)?;
        let result = sqlx::query(
            "UPDATE instruments SET deleted_at = now() WHERE exchange = $1 AND code = $2 AND deleted_at IS NULL",
        )
        .bind(exchange)
        .bind(code)
        .execute(&self.pool)
        .await?;
        if result.rows_affected() == 0 {
            return Err(PersistenceError::NotFound(id.to_string()));
        }
        Ok(())
    }

    async fn begin(&self) -> Result<Transaction<'static, Postgres>, PersistenceError> {
        Ok(self.pool.begin().await?)
    }

    async fn lock_current_for_update(
        &self,
        tx: &mut Transaction<'static, Postgres>,
        id: &str,
    ) -> Result<Option<i64>, PersistenceError> {
        let (exchange, code) = Self::split(id)?;
        let row: Option<(i64,)> = sqlx::query_as(
            "SELECT version FROM instruments WHERE exchange = $1 AND code = $2 AND deleted_at IS NULL FOR UPDATE",
        )
        .bind(exchange)
        .bind(code)
        .fetch_optional(&mut **tx)
        .await?;
        Ok(row.map(|r| r.0))
    }

    async fn soft_delete_in_tx(
        &self,
        tx: &mut Transaction<'static, Postgres>,
        id: &str,
    ) -> Result<(), PersistenceError> {
        let (exchange, code) = Self::split(id)?;
        sqlx::query(
            "UPDATE instruments SET deleted_at = now() WHERE exchange = $1 AND code = $2 AND deleted_at IS NULL",
        )
        .bind(exchange)
        .bind(code)
        .execute(&mut **tx)
        .await?;
        Ok(())
    }

    async fn insert_in_tx(
        &self,
        tx: &mut Transaction<'static, Postgres>,
        entity: InstrumentRow,
    ) -> Result<InstrumentRow, PersistenceError> {
        sqlx::query_as::<_, InstrumentRow>(
            "INSERT INTO instruments (exchange, code, version, token, lot_size, tick_size) \
             VALUES ($1, $2, $3, $4, $5, $6) \
             RETURNING exchange, code, version, token, lot_size, tick_size, deleted_at",
        )
        .bind(&entity.exchange)
        .bind(&entity.code)
        .bind(entity.version)
        .bind(&entity.token)
        .bind(entity.lot_size)
        .bind(entity.tick_size)
        .fetch_one(&mut **tx)
        .await
        .map_err(|e| map_unique_violation(&entity.business_id(), e))
    }
}

#[derive(Clone)]
pub struct WatchlistRepo {
    pool: PgPool,
}

impl WatchlistRepo {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn active_for_user_broker(
        &self,
        user_broker_id: &str,
    ) -> Result<Vec<WatchlistRow>, PersistenceError> {
        let ub_id: uuid::Uuid = user_broker_id
            .parse()
            .map_err(|_| PersistenceError::NotFound(user_broker_id.to_string()))?;
        Ok(sqlx::query_as::<_, WatchlistRow>(
            "SELECT user_broker_id, exchange, code, version, enabled, last_price, last_tick_time, \
             deleted_at FROM watchlist WHERE user_broker_id = $1 AND enabled AND deleted_at IS NULL",
        )
        .bind(ub_id)
        .fetch_all(&self.pool)
        .await?)
    }

    /// Composition-root startup (`spec.md` §6): every enabled watchlist row
    /// system-wide, so `atlas-app` can start one ingest task per distinct
    /// symbol without iterating tenants one by one.
    pub async fn all_active(&self) -> Result<Vec<WatchlistRow>, PersistenceError> {
        Ok(sqlx::query_as::<_, WatchlistRow>(
            "SELECT user_broker_id, exchange, code, version, enabled, last_price, last_tick_time, \
             deleted_at FROM watchlist WHERE enabled AND deleted_at IS NULL",
        )
        .fetch_all(&self.pool)
        .await?)
    }
}

#[async_trait]
impl VersionedRepository<WatchlistRow> for WatchlistRepo {
    fn table_name(&self) -> &'static str {
        "watchlist"
    }

    async fn find_active_by_id(&self, id: &str) -> Result<Option<WatchlistRow>, PersistenceError> {
        let mut parts = id.splitn(3, ':');
        let (ub, exchange, code) = (
            parts.next().ok_or_else(|| PersistenceError::NotFound(id.to_string()))?,
            parts.next().ok_or_else(|| PersistenceError::NotFound(id.to_string()))?,
            parts.next().ok_or_else(|| PersistenceError::NotFound(id.to_string()))?,
        );
        let ub_id: uuid::Uuid = ub.parse().map_err(|_| PersistenceError::NotFound(id.to_string()))?;
        Ok(sqlx::query_as::<_, WatchlistRow>(
            "SELECT user_broker_id, exchange, code, version, enabled, last_price, last_tick_time, \
             deleted_at FROM watchlist \
             WHERE user_broker_id = $1 AND exchange = $2 AND code = $3 AND deleted_at IS NULL",
        )
        .bind(ub_id)
        .bind(exchange)
        .bind(code)
        .fetch_optional(&self.pool)
        .await?)
    }

    async fn find_all_versions(&self, id: &str) -> Result<Vec<WatchlistRow>, PersistenceError> {
        let mut parts = id.splitn(3, ':');
        let (ub, exchange, code) = (
            parts.next().ok_or_else(|| PersistenceError::NotFound(id.to_string()))?,
            parts.next().ok_or_else(|| PersistenceError::NotFound(id.to_string()))?,
            parts.next().ok_or_else(|| PersistenceError::NotFound(id.to_string()))?,
        );
        let ub_id: uuid::Uuid = ub.parse().map_err(|_| PersistenceError::NotFound(id.to_string()))?;
        Ok(sqlx::query_as::<_, WatchlistRow>(
            "SELECT user_broker_id, exchange, code, version, enabled, last_price, last_tick_time, \
             deleted_at FROM watchlist \
             WHERE user_broker_id = $1 AND exchange = $2 AND code = $3 ORDER BY version",
        )
        .bind(ub_id)
        .bind(exchange)
        .bind(code)
        .fetch_all(&self.pool)
        .await?)
    }

    async fn insert_v1(&self, entity: WatchlistRow) -> Result<WatchlistRow, PersistenceError> {
        sqlx::query_as::<_, WatchlistRow>(
            "INSERT INTO watchlist (user_broker_id, exchange, code, version, enabled, last_price, \
             last_tick_time) VALUES ($1, $2, $3, 1, $4, $5, $6) \
             RETURNING user_broker_id, exchange, code, version, enabled, last_price, last_tick_time, \
             deleted_at",
        )
        .bind(entity.user_broker_id)
        .bind(&entity.exchange)
        .bind(&entity.code)
        .bind(entity.enabled)
        .bind(entity.last_price)
        .bind(entity.last_tick_time)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| map_unique_violation(&entity.business_id(), e))
    }

    async fn soft_delete(&self, id: &str) -> Result<(), PersistenceError> {
        let mut parts = id.splitn(3, ':');
        let (ub, exchange, code) = (
            parts.next().ok_or_else(|| PersistenceError::NotFound(id.to_string()))?,
            parts.next().ok_or_else(|| PersistenceError::NotFound(id.to_string()))?,
            parts.next().ok_or_else(|| PersistenceError::NotFound(id.to_string()))?,
        );
        let ub_id: uuid::Uuid = ub.parse().map_err(|_| PersistenceError::NotFound(id.to_string()))?;
        let result = sqlx::query(
            "UPDATE watchlist SET deleted_at = now() \
             WHERE user_broker_id = $1 AND exchange = $2 AND code = $3 AND deleted_at IS NULL",
        )
        .bind(ub_id)
        .bind(exchange)
        .bind(code)
        .execute(&self.pool)
        .await?;
        if result.rows_affected() == 0 {
            return Err(PersistenceError::NotFound(id.to_string()));
        }
        Ok(())
    }

    async fn begin(&self) -> Result<Transaction<'static, Postgres>, PersistenceError> {
        Ok(self.pool.begin().await?)
    }

    async fn lock_current_for_update(
        &self,
        tx: &mut Transaction<'static, Postgres>,
        id: &str,
    ) -> Result<Option<i64>, PersistenceError> {
        lock_current_version(tx, "watchlist", "user_broker_id", id).await
    }

    async fn soft_delete_in_tx(
        &self,
        tx: &mut Transaction<'static, Postgres>,
        id: &str,
    ) -> Result<(), PersistenceError> {
        soft_delete_current_in_tx(tx, "watchlist", "user_broker_id", id).await
    }

    async fn insert_in_tx(
        &self,
        tx: &mut Transaction<'static, Postgres>,
        entity: WatchlistRow,
    ) -> Result<WatchlistRow, PersistenceError> {
        sqlx::query_as::<_, WatchlistRow>(
            "INSERT INTO watchlist (user_broker_id, exchange, code, version, enabled, last_price, \
             last_tick_time) VALUES ($1, $2, $3, $4, $5, $6, $7) \
             RETURNING user_broker_id, exchange, code, version, enabled, last_price, last_tick_time, \
             deleted_at",
        )
        .bind(entity.user_broker_id)
        .bind(&entity.exchange)
        .bind(&entity.code)
        .bind(entity.version)
        .bind(entity.enabled)
        .bind(entity.last_price)
        .bind(entity.last_tick_time)
        .fetch_one(&mut **tx)
        .await
        .map_err(|e| map_unique_violation(&entity.business_id(), e))
    }
}

/// Candles are append-mostly: each new partial-close produces a fresh active
/// row via `insert_v1`, never `update` (`spec.md` §4.3: "never mutated").
#[derive(Clone)]
pub struct CandleRepo {
    pool: PgPool,
}

impl CandleRepo {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn find_active(
        &self,
        symbol_exchange: &str,
        symbol_code: &str,
        timeframe: Timeframe,
        ts: DateTime<Utc>,
    ) -> Result<Option<CandleRow>, PersistenceError> {
        Ok(sqlx::query_as::<_, CandleRow>(
            "SELECT exchange, code, timeframe, ts, version, open, high, low, close, volume, \
             deleted_at FROM candles \
             WHERE exchange = $1 AND code = $2 AND timeframe = $3 AND ts = $4 AND deleted_at IS NULL",
        )
        .bind(symbol_exchange)
        .bind(symbol_code)
        .bind(timeframe.to_string())
        .bind(ts)
        .fetch_optional(&self.pool)
        .await?)
    }

    /// Historical candles for backfill/aggregation (`spec.md` §4.3 Aggregator).
    pub async fn range(
        &self,
        symbol_exchange: &str,
        symbol_code: &str,
        timeframe: Timeframe,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<CandleRow>, PersistenceError> {
        Ok(sqlx::query_as::<_, CandleRow>(
            "SELECT exchange, code, timeframe, ts, version, open, high, low, close, volume, \
             deleted_at FROM candles \
             WHERE exchange = $1 AND code = $2 AND timeframe = $3 AND ts >= $4 AND ts < $5 \
             AND deleted_at IS NULL ORDER BY ts",
        )
        .bind(symbol_exchange)
        .bind(symbol_code)
        .bind(timeframe.to_string())
        .bind(from)
        .bind(to)
        .fetch_all(&self.pool)
        .await?)
    }

    pub async fn insert(&self, entity: CandleRow) -> Result<CandleRow, PersistenceError> {
        sqlx::query_as::<_, CandleRow>(
            "INSERT INTO candles (exchange, code, timeframe, ts, version, open, high, low, close, \
             volume) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10) \
             RETURNING exchange, code, timeframe, ts, version, open, high, low, close, volume, \
             deleted_at",
        )
        .bind(&entity.exchange)
        .bind(&entity.code)
        .bind(&entity.timeframe)
        .bind(entity.ts)
        .bind(entity.version)
        .bind(entity.open)
        .bind(entity.high)
        .bind(entity.low)
        .bind(entity.close)
        .bind(entity.volume)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| map_unique_violation(&entity.business_id(), e))
    }

    /// Supersedes a prior active candle with a corrected row, same transaction
    /// (`spec.md` §3 Lifecycles: "corrections arrive as a new row").
    pub async fn correct(
        &self,
        current: &CandleRow,
        corrected: CandleRow,
    ) -> Result<CandleRow, PersistenceError> {
        let mut tx = self.pool.begin().await?;
        sqlx::query(
            "UPDATE candles SET deleted_at = now() \
             WHERE exchange = $1 AND code = $2 AND timeframe = $3 AND ts = $4 AND version = $5 \
             AND deleted_at IS NULL",
        )
        .bind(&current.exchange)
        .bind(&current.code)
        .bind(&current.timeframe)
        .bind(current.ts)
        .bind(current.version)
        .execute(&mut *tx)
        .await?;
        let inserted = sqlx::query_as::<_, CandleRow>(
            "INSERT INTO candles (exchange, code, timeframe, ts, version, open, high, low, close, \
             volume) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10) \
             RETURNING exchange, code, timeframe, ts, version, open, high, low, close, volume, \
             deleted_at",
        )
        .bind(&corrected.exchange)
        .bind(&corrected.code)
        .bind(&corrected.timeframe)
        .bind(corrected.ts)
        .bind(corrected.version)
        .bind(corrected.open)
        .bind(corrected.high)
        .bind(corrected.low)
        .bind(corrected.close)
        .bind(corrected.volume)
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| map_unique_violation(&corrected.business_id(), e))?;
        tx.commit().await?;
        Ok(inserted)
    }
}
