//! Repositories for `users`, `brokers`, `user_brokers`, `user_broker_sessions`
//! and `oauth_states`.

use async_trait::async_trait;
use sqlx::{PgPool, Postgres, Transaction};

use crate::error::PersistenceError;
use crate::model::identity::{BrokerRow, OAuthStateRow, UserBrokerRow, UserBrokerSessionRow, UserRow};
use crate::versioned::{
    lock_current_version, map_unique_violation, soft_delete_current, soft_delete_current_in_tx,
    VersionedRepository,
};

#[derive(Clone)]
pub struct UserRepo {
    pool: PgPool,
}

impl UserRepo {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl VersionedRepository<UserRow> for UserRepo {
    fn table_name(&self) -> &'static str {
        "users"
    }

    async fn find_active_by_id(&self, id: &str) -> Result<Option<UserRow>, PersistenceError> {
        let user_id: uuid::Uuid = id.parse().map_err(|_| PersistenceError::NotFound(id.to_string()))?;
        Ok(sqlx::query_as::<_, UserRow>(
            "SELECT user_id, version, email, password_hash, role, deleted_at FROM users \
             WHERE user_id = $1 AND deleted_at IS NULL",
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?)
    }

    async fn find_all_versions(&self, id: &str) -> Result<Vec<UserRow>, PersistenceError> {
        let user_id: uuid::Uuid = id.parse().map_err(|_| PersistenceError::NotFound(id.to_string()))?;
        Ok(sqlx::query_as::<_, UserRow>(
            "SELECT user_id, version, email, password_hash, role, deleted_at FROM users \
             WHERE user_id = $1 ORDER BY version",
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?)
    }

    async fn insert_v1(&self, entity: UserRow) -> Result<UserRow, PersistenceError> {
        sqlx::query_as::<_, UserRow>(
            "INSERT INTO users (user_id, version, email, password_hash, role) \
             VALUES ($1, 1, $2, $3, $4) \
             RETURNING user_id, version, email, password_hash, role, deleted_at",
        )
        .bind(entity.user_id)
        .bind(&entity.email)
        .bind(&entity.password_hash)
        .bind(&entity.role)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| map_unique_violation(&entity.user_id.to_string(), e))
    }

    async fn soft_delete(&self, id: &str) -> Result<(), PersistenceError> {
        soft_delete_current(&self.pool, "users", "user_id", id).await
    }

    async fn begin(&self) -> Result<Transaction<'static, Postgres>, PersistenceError> {
        Ok(self.pool.begin().await?)
    }

    async fn lock_current_for_update(
        &self,
        tx: &mut Transaction<'static, Postgres>,
        id: &str,
    ) -> Result<Option<i64>, PersistenceError> {
        lock_current_version(tx, "users", "user_id", id).await
    }

    async fn soft_delete_in_tx(
        &self,
        tx: &mut Transaction<'static, Postgres>,
        id: &str,
    ) -> Result<(), PersistenceError> {
        soft_delete_current_in_tx(tx, "users", "user_id", id).await
    }

    async fn insert_in_tx(
        &self,
        tx: &mut Transaction<'static, Postgres>,
        entity: UserRow,
    ) -> Result<UserRow, PersistenceError> {
        sqlx::query_as::<_, UserRow>(
            "INSERT INTO users (user_id, version, email, password_hash, role) \
             VALUES ($1, $2, $3, $4, $5) \
             RETURNING user_id, version, email, password_hash, role, deleted_at",
        )
        .bind(entity.user_id)
        .bind(entity.version)
        .bind(&entity.email)
        .bind(&entity.password_hash)
        .bind(&entity.role)
        .fetch_one(&mut **tx)
        .await
        .map_err(|e| map_unique_violation(&entity.user_id.to_string(), e))
    }
}

#[derive(Clone)]
pub struct BrokerRepo {
    pool: PgPool,
}

impl BrokerRepo {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl VersionedRepository<BrokerRow> for BrokerRepo {
    fn table_name(&self) -> &'static str {
        "brokers"
    }

    async fn find_active_by_id(&self, id: &str) -> Result<Option<BrokerRow>, PersistenceError> {
        let broker_id: uuid::Uuid = id.parse().map_err(|_| PersistenceError::NotFound(id.to_string()))?;
        Ok(sqlx::query_as::<_, BrokerRow>(
            "SELECT broker_id, version, broker_code, name, adapter_class, deleted_at FROM brokers \
             WHERE broker_id = $1 AND deleted_at IS NULL",
        )
        .bind(broker_id)
        .fetch_optional(&self.pool)
        .await?)
    }

    async fn find_all_versions(&self, id: &str) -> Result<Vec<BrokerRow>, PersistenceError> {
        let broker_id: uuid::Uuid = id.parse().map_err(|_| PersistenceError::NotFound(id.to_string()))?;
        Ok(sqlx::query_as::<_, BrokerRow>(
            "SELECT broker_id, version, broker_code, name, adapter_class, deleted_at FROM brokers \
             WHERE broker_id = $1 ORDER BY version",
        )
        .bind(broker_id)
        .fetch_all(&self.pool)
        .await?)
    }

    async fn insert_v1(&self, entity: BrokerRow) -> Result<BrokerRow, PersistenceError> {
        sqlx::query_as::<_, BrokerRow>(
            "INSERT INTO brokers (broker_id, version, broker_code, name, adapter_class) \
             VALUES ($1, 1, $2, $3, $4) \
             RETURNING broker_id, version, broker_code, name, adapter_class, deleted_at",
        )
        .bind(entity.broker_id)
        .bind(&entity.broker_code)
        .bind(&entity.name)
        .bind(&entity.adapter_class)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| map_unique_violation(&entity.broker_id.to_string(), e))
    }

    async fn soft_delete(&self, id: &str) -> Result<(), PersistenceError> {
        soft_delete_current(&self.pool, "brokers", "broker_id", id).await
    }

    async fn begin(&self) -> Result<Transaction<'static, Postgres>, PersistenceError> {
        Ok(self.pool.begin().await?)
    }

    async fn lock_current_for_update(
        &self,
        tx: &mut Transaction<'static, Postgres>,
        id: &str,
    ) -> Result<Option<i64>, PersistenceError> {
        lock_current_version(tx, "brokers", "broker_id", id).await
    }

    async fn soft_delete_in_tx(
        &self,
        tx: &mut Transaction<'static, Postgres>,
        id: &str,
    ) -> Result<(), PersistenceError> {
        soft_delete_current_in_tx(tx, "brokers", "broker_id", id).await
    }

    async fn insert_in_tx(
        &self,
        tx: &mut Transaction<'static, Postgres>,
        entity: BrokerRow,
    ) -> Result<BrokerRow, PersistenceError> {
        sqlx::query_as::<_, BrokerRow>(
            "INSERT INTO brokers (broker_id, version, broker_code, name, adapter_class) \
             VALUES ($1, $2, $3, $4, $5) \
             RETURNING broker_id, version, broker_code, name, adapter_class, deleted_at",
        )
        .bind(entity.broker_id)
        .bind(entity.version)
        .bind(&entity.broker_code)
        .bind(&entity.name)
        .bind(&entity.adapter_class)
        .fetch_one(&mut **tx)
        .await
        .map_err(|e| map_unique_violation(&entity.broker_id.to_string(), e))
    }
}

#[derive(Clone)]
pub struct UserBrokerRepo {
    pool: PgPool,
}

impl UserBrokerRepo {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Invariant 1 (`spec.md` §3): the one active DATA `UserBroker` for a tenant.
    pub async fn find_active_data_broker(
        &self,
        user_id: &str,
    ) -> Result<Option<UserBrokerRow>, PersistenceError> {
        let user_id: uuid::Uuid = user_id
            .parse()
            .map_err(|_| PersistenceError::NotFound(user_id.to_string()))?;
        Ok(sqlx::query_as::<_, UserBrokerRow>(
            "SELECT user_broker_id, version, user_id, broker_id, role, environment, enabled, \
             capital_allocated, max_exposure, max_per_trade, max_daily_loss, deleted_at \
             FROM user_brokers \
             WHERE user_id = $1 AND role = 'DATA' AND deleted_at IS NULL",
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?)
    }

    /// Invariant 1: one-or-more active EXEC brokers for a tenant; used by SMS
    /// fan-out (`spec.md` §4.5 `persist_and_publish`).
    pub async fn find_active_exec_brokers(
        &self,
        user_id: &str,
    ) -> Result<Vec<UserBrokerRow>, PersistenceError> {
        let user_id: uuid::Uuid = user_id
            .parse()
            .map_err(|_| PersistenceError::NotFound(user_id.to_string()))?;
        Ok(sqlx::query_as::<_, UserBrokerRow>(
            "SELECT user_broker_id, version, user_id, broker_id, role, environment, enabled, \
             capital_allocated, max_exposure, max_per_trade, max_daily_loss, deleted_at \
             FROM user_brokers \
             WHERE user_id = $1 AND role = 'EXEC' AND enabled AND deleted_at IS NULL",
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?)
    }

    /// `persist_and_publish`'s fan-out policy (`spec.md` §4.5: "all EXEC
    /// brokers for enabled users") — every active, enabled EXEC `UserBroker`
    /// system-wide, not scoped to one tenant.
    pub async fn find_all_active_exec_brokers(&self) -> Result<Vec<UserBrokerRow>, PersistenceError> {
        Ok(sqlx::query_as::<_, UserBrokerRow>(
            "SELECT user_broker_id, version, user_id, broker_id, role, environment, enabled, \
             capital_allocated, max_exposure, max_per_trade, max_daily_loss, deleted_at \
             FROM user_brokers \
             WHERE role = 'EXEC' AND enabled AND deleted_at IS NULL",
        )
        .fetch_all(&self.pool)
        .await?)
    }

    /// Composition-root startup (`spec.md` §6): every active DATA
    /// `UserBroker` system-wide, so `atlas-app` can register one data-feed
    /// adapter and one ingest task per symbol without needing to already
    /// know the tenant set.
    pub async fn find_all_active_data_brokers(&self) -> Result<Vec<UserBrokerRow>, PersistenceError> {
        Ok(sqlx::query_as::<_, UserBrokerRow>(
            "SELECT user_broker_id, version, user_id, broker_id, role, environment, enabled, \
             capital_allocated, max_exposure, max_per_trade, max_daily_loss, deleted_at \
             FROM user_brokers \
             WHERE role = 'DATA' AND enabled AND deleted_at IS NULL",
        )
        .fetch_all(&self.pool)
        .await?)
    }
}

#[async_trait]
impl VersionedRepository<UserBrokerRow> for UserBrokerRepo {
    fn table_name(&self) -> &'static str {
        "user_brokers"
    }

    async fn find_active_by_id(&self, id: &str) -> Result<Option<UserBrokerRow>, PersistenceError> {
        let ub_id: uuid::Uuid = id.parse().map_err(|_| PersistenceError::NotFound(id.to_string()))?;
        Ok(sqlx::query_as::<_, UserBrokerRow>(
            "SELECT user_broker_id, version, user_id, broker_id, role, environment, enabled, \
             capital_allocated, max_exposure, max_per_trade, max_daily_loss, deleted_at \
             FROM user_brokers WHERE user_broker_id = $1 AND deleted_at IS NULL",
        )
        .bind(ub_id)
        .fetch_optional(&self.pool)
        .await?)
    }

    async fn find_all_versions(&self, id: &str) -> Result<Vec<UserBrokerRow>, PersistenceError> {
        let ub_id: uuid::Uuid = id.parse().map_err(|_| PersistenceError::NotFound(id.to_string()))?;
        Ok(sqlx::query_as::<_, UserBrokerRow>(
            "SELECT user_broker_id, version, user_id, broker_id, role, environment, enabled, \
             capital_allocated, max_exposure, max_per_trade, max_daily_loss, deleted_at \
             FROM user_brokers WHERE user_broker_id = $1 ORDER BY version",
        )
        .bind(ub_id)
        .fetch_all(&self.pool)
        .await?)
    }

    async fn insert_v1(&self, entity: UserBrokerRow) -> Result<UserBrokerRow, PersistenceError> {
        sqlx::query_as::<_, UserBrokerRow>(
            "INSERT INTO user_brokers (user_broker_id, version, user_id, broker_id, role, \
             environment, enabled, capital_allocated, max_exposure, max_per_trade, max_daily_loss) \
             VALUES ($1, 1, $2, $3, $4, $5, $6, $7, $8, $9, $10) \
             RETURNING user_broker_id, version, user_id, broker_id, role, environment, enabled, \
             capital_allocated, max_exposure, max_per_trade, max_daily_loss, deleted_at",
        )
        .bind(entity.user_broker_id)
        .bind(entity.user_id)
        .bind(entity.broker_id)
        .bind(entity.role)
        .bind(entity.environment)
        .bind(entity.enabled)
        .bind(entity.capital_allocated)
        .bind(entity.max_exposure)
        .bind(entity.max_per_trade)
        .bind(entity.max_daily_loss)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| map_unique_violation(&entity.user_broker_id.to_string(), e))
    }

    async fn soft_delete(&self, id: &str) -> Result<(), PersistenceError> {
        soft_delete_current(&self.pool, "user_brokers", "user_broker_id", id).await
    }

    async fn begin(&self) -> Result<Transaction<'static, Postgres>, PersistenceError> {
        Ok(self.pool.begin().await?)
    }

    async fn lock_current_for_update(
        &self,
        tx: &mut Transaction<'static, Postgres>,
        id: &str,
    ) -> Result<Option<i64>, PersistenceError> {
        lock_current_version(tx, "user_brokers", "user_broker_id", id).await
    }

    async fn soft_delete_in_tx(
        &self,
        tx: &mut Transaction<'static, Postgres>,
        id: &str,
    ) -> Result<(), PersistenceError> {
        soft_delete_current_in_tx(tx, "user_brokers", "user_broker_id", id).await
    }

    async fn insert_in_tx(
        &self,
        tx: &mut Transaction<'static, Postgres>,
        entity: UserBrokerRow,
    ) -> Result<UserBrokerRow, PersistenceError> {
        sqlx::query_as::<_, UserBrokerRow>(
            "INSERT INTO user_brokers (user_broker_id, version, user_id, broker_id, role, \
             environment, enabled, capital_allocated, max_exposure, max_per_trade, max_daily_loss) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11) \
             RETURNING user_broker_id, version, user_id, broker_id, role, environment, enabled, \
             capital_allocated, max_exposure, max_per_trade, max_daily_loss, deleted_at",
        )
        .bind(entity.user_broker_id)
        .bind(entity.version)
        .bind(entity.user_id)
        .bind(entity.broker_id)
        .bind(entity.role)
        .bind(entity.environment)
        .bind(entity.enabled)
        .bind(entity.capital_allocated)
        .bind(entity.max_exposure)
        .bind(entity.max_per_trade)
        .bind(entity.max_daily_loss)
        .fetch_one(&mut **tx)
        .await
        .map_err(|e| map_unique_violation(&entity.user_broker_id.to_string(), e))
    }
}

#[derive(Clone)]
pub struct UserBrokerSessionRepo {
    pool: PgPool,
}

impl UserBrokerSessionRepo {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Readers always select the latest active row for a `UserBroker`
    /// (`spec.md` §3: "New tokens create a new version").
    pub async fn find_active_for_user_broker(
        &self,
        user_broker_id: &str,
    ) -> Result<Option<UserBrokerSessionRow>, PersistenceError> {
        let ub_id: uuid::Uuid = user_broker_id
            .parse()
            .map_err(|_| PersistenceError::NotFound(user_broker_id.to_string()))?;
        Ok(sqlx::query_as::<_, UserBrokerSessionRow>(
            "SELECT session_id, version, user_broker_id, access_token, token_valid_till, status, \
             deleted_at FROM user_broker_sessions \
             WHERE user_broker_id = $1 AND status = 'ACTIVE' AND deleted_at IS NULL \
             ORDER BY token_valid_till DESC LIMIT 1",
        )
        .bind(ub_id)
        .fetch_optional(&self.pool)
        .await?)
    }
}

#[async_trait]
impl VersionedRepository<UserBrokerSessionRow> for UserBrokerSessionRepo {
    fn table_name(&self) -> &'static str {
        "user_broker_sessions"
    }

    async fn find_active_by_id(
        &self,
        id: &str,
    ) -> Result<Option<UserBrokerSessionRow>, PersistenceError> {
        let session_id: uuid::Uuid = id.parse().map_err(|_| PersistenceError::NotFound(id.to_string()))?;
        Ok(sqlx::query_as::<_, UserBrokerSessionRow>(
            "SELECT session_id, version, user_broker_id, access_token, token_valid_till, status, \
             deleted_at FROM user_broker_sessions WHERE session_id = $1 AND deleted_at IS NULL",
        )
        .bind(session_id)
        .fetch_optional(&self.pool)
        .await?)
    }

    async fn find_all_versions(&self, id: &str) -> Result<Vec<UserBrokerSessionRow>, PersistenceError> {
        let session_id: uuid::Uuid = id.parse().map_err(|_| PersistenceError::NotFound(id.to_string()))?;
        Ok(sqlx::query_as::<_, UserBrokerSessionRow>(
            "SELECT session_id, version, user_broker_id, access_token, token_valid_till, status, \
             deleted_at FROM user_broker_sessions WHERE session_id = $1 ORDER BY version",
        )
        .bind(session_id)
        .fetch_all(&self.pool)
        .await?)
    }

    async fn insert_v1(
        &self,
        entity: UserBrokerSessionRow,
    ) -> Result<UserBrokerSessionRow, PersistenceError> {
        sqlx::query_as::<_, UserBrokerSessionRow>(
            "INSERT INTO user_broker_sessions (session_id, version, user_broker_id, access_token, \
             token_valid_till, status) VALUES ($1, 1, $2, $3, $4, $5) \
             RETURNING session_id, version, user_broker_id, access_token, token_valid_till, status, \
             deleted_at",
        )
        .bind(entity.session_id)
        .bind(entity.user_broker_id)
        .bind(&entity.access_token)
        .bind(entity.token_valid_till)
        .bind(entity.status)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| map_unique_violation(&entity.session_id.to_string(), e))
    }

    async fn soft_delete(&self, id: &str) -> Result<(), PersistenceError> {
        soft_delete_current(&self.pool, "user_broker_sessions", "session_id", id).await
    }

    async fn begin(&self) -> Result<Transaction<'static, Postgres>, PersistenceError> {
        Ok(self.pool.begin().await?)
    }

    async fn lock_current_for_update(
        &self,
        tx: &mut Transaction<'static, Postgres>,
        id: &str,
    ) -> Result<Option<i64>, PersistenceError> {
        lock_current_version(tx, "user_broker_sessions", "session_id", id).await
    }

    async fn soft_delete_in_tx(
        &self,
        tx: &mut Transaction<'static, Postgres>,
        id: &str,
    ) -> Result<(), PersistenceError> {
        soft_delete_current_in_tx(tx, "user_broker_sessions", "session_id", id).await
    }

    async fn insert_in_tx(
        &self,
        tx: &mut Transaction<'static, Postgres>,
        entity: UserBrokerSessionRow,
    ) -> Result<UserBrokerSessionRow, PersistenceError> {
        sqlx::query_as::<_, UserBrokerSessionRow>(
            "INSERT INTO user_broker_sessions (session_id, version, user_broker_id, access_token, \
             token_valid_till, status) VALUES ($1, $2, $3, $4, $5, $6) \
             RETURNING session_id, version, user_broker_id, access_token, token_valid_till, status, \
             deleted_at",
        )
        .bind(entity.session_id)
        .bind(entity.version)
        .bind(entity.user_broker_id)
        .bind(&entity.access_token)
        .bind(entity.token_valid_till)
        .bind(entity.status)
        .fetch_one(&mut **tx)
        .await
        .map_err(|e| map_unique_violation(&entity.session_id.to_string(), e))
    }
}

/// Not versioned: a plain single-row-per-`state` table with a one-shot
/// `used_at` mark (`spec.md` §6).
#[derive(Clone)]
pub struct OAuthStateRepo {
    pool: PgPool,
}

impl OAuthStateRepo {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn insert(&self, row: OAuthStateRow) -> Result<OAuthStateRow, PersistenceError> {
        sqlx::query_as::<_, OAuthStateRow>(
            "INSERT INTO oauth_states (state, user_broker_id, broker_id, expires_at) \
             VALUES ($1, $2, $3, $4) RETURNING state, user_broker_id, broker_id, expires_at, used_at",
        )
        .bind(&row.state)
        .bind(row.user_broker_id)
        .bind(row.broker_id)
        .bind(row.expires_at)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| map_unique_violation(&row.state, e))
    }

    /// Atomically marks `state` used and returns the row, or `None` if it was
    /// already consumed, unknown, or expired — replay-resistant by construction.
    pub async fn consume(&self, state: &str) -> Result<Option<OAuthStateRow>, PersistenceError> {
        Ok(sqlx::query_as::<_, OAuthStateRow>(
            "UPDATE oauth_states SET used_at = now() \
             WHERE state = $1 AND used_at IS NULL AND expires_at > now() \
             RETURNING state, user_broker_id, broker_id, expires_at, used_at",
        )
        .bind(state)
        .fetch_optional(&self.pool)
        .await?)
    }
}
