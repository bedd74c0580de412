//! Generic immutable-versioning transaction pattern (`spec.md` §4.1).
//!
//! Every table in `spec.md` §3 follows the same recipe: composite
//! `(business_id, version)` primary key, `deleted_at` soft delete, uniqueness
//! enforced only `WHERE deleted_at IS NULL`. [`VersionedRepository`] captures the
//! recipe once; concrete repos (`repo::signal`, `repo::trade`, ...) supply only
//! the entity-specific `SELECT`/`INSERT` statements via [`VersionedEntity`] and
//! the required methods below, and get `update`'s soft-delete-then-insert
//! transaction for free.

use crate::error::PersistenceError;
use async_trait::async_trait;
use sqlx::{PgPool, Postgres, Transaction};

/// A row type backed by an immutable-versioned table.
pub trait VersionedEntity: Send + Sync + Sized {
    /// The business identity (stable across versions), as its string form —
    /// kept untyed here so the trait stays generic over whatever newtype each
    /// entity uses (`SignalId`, `TradeId`, ...).
    fn business_id(&self) -> String;

    /// `1` for a row inserted via `insert_v1`; `current + 1` thereafter.
    fn version(&self) -> i64;
}

/// CRUD over one immutable-versioned table.
///
/// Implementors supply the table name and the entity-specific row
/// mapping/insert; [`update`](VersionedRepository::update) is a provided method
/// built from the required ones and needs no entity-specific SQL beyond what
/// `insert_row` already has.
#[async_trait]
pub trait VersionedRepository<E: VersionedEntity>: Send + Sync {
    /// Name of the table, used only for error messages here — concrete repos
    /// hardcode the table name in their own SQL.
    fn table_name(&self) -> &'static str;

    /// `SELECT ... WHERE business_id = $1 AND deleted_at IS NULL`.
    async fn find_active_by_id(&self, id: &str) -> Result<Option<E>, PersistenceError>;

    /// `SELECT ... WHERE business_id = $1 ORDER BY version`.
    async fn find_all_versions(&self, id: &str) -> Result<Vec<E>, PersistenceError>;

    /// Inserts a brand-new business entity at version 1. Implementations map a
    /// partial-unique-index violation from Postgres (`23505`) to
    /// [`PersistenceError::DuplicateActive`].
    async fn insert_v1(&self, entity: E) -> Result<E, PersistenceError>;

    /// Soft-deletes the current active row for `id`, and within the same
    /// transaction inserts `next` (the caller-constructed next version) via
    /// `insert_in_tx`. Returns [`PersistenceError::NotFound`] if nothing is
    /// active, [`PersistenceError::StaleVersion`] if `next.version() !=
    /// current.version() + 1`.
    async fn update(&self, next: E) -> Result<E, PersistenceError> {
        let id = next.business_id();
        let mut tx = self.begin().await?;
        let current = self
            .lock_current_for_update(&mut tx, &id)
            .await?
            .ok_or_else(|| PersistenceError::NotFound(id.clone()))?;
        if next.version() != current + 1 {
            return Err(PersistenceError::StaleVersion {
                id,
                expected: current + 1,
                current,
            });
        }
        self.soft_delete_in_tx(&mut tx, &id).await?;
        let inserted = self.insert_in_tx(&mut tx, next).await?;
        tx.commit().await?;
        Ok(inserted)
    }

    /// Soft-deletes the current active row for `id` without inserting a
    /// replacement (terminal soft delete, e.g. disabling a `Watchlist` row).
    async fn soft_delete(&self, id: &str) -> Result<(), PersistenceError>;

    /// Begins a transaction on the shared pool.
    async fn begin(&self) -> Result<Transaction<'static, Postgres>, PersistenceError>;

    /// Returns the current version for `id` under a `FOR UPDATE` row lock, or
    /// `None` if no active row exists.
    async fn lock_current_for_update(
        &self,
        tx: &mut Transaction<'static, Postgres>,
        id: &str,
    ) -> Result<Option<i64>, PersistenceError>;

    /// Soft-deletes the current active row for `id` within `tx`.
    async fn soft_delete_in_tx(
        &self,
        tx: &mut Transaction<'static, Postgres>,
        id: &str,
    ) -> Result<(), PersistenceError>;

    /// Inserts `entity` (already at the correct next version) within `tx`.
    async fn insert_in_tx(
        &self,
        tx: &mut Transaction<'static, Postgres>,
        entity: E,
    ) -> Result<E, PersistenceError>;
}

/// Locks and returns the current version for `id` in `table`, or `None` if no
/// active row exists. Table/column names are trusted constants supplied by
/// concrete repos, never user input, so building the query with `format!` here
/// avoids hand-writing this lock query sixteen times.
pub async fn lock_current_version(
    tx: &mut Transaction<'static, Postgres>,
    table: &str,
    id_col: &str,
    id: &str,
) -> Result<Option<i64>, PersistenceError> {
    let query = format!("SELECT version FROM {table} WHERE {id_col} = $1 AND deleted_at IS NULL FOR UPDATE");
    let row: Option<(i64,)> = sqlx::query_as(&query).bind(id).fetch_optional(&mut **tx).await?;
    Ok(row.map(|r| r.0))
}

/// Soft-deletes the current active row for `id` within `tx`. A no-op (not an
/// error) if nothing is active — callers that need "must exist" semantics
/// check that themselves via [`lock_current_version`] first.
pub async fn soft_delete_current_in_tx(
    tx: &mut Transaction<'static, Postgres>,
    table: &str,
    id_col: &str,
    id: &str,
) -> Result<(), PersistenceError> {
    let query = format!("UPDATE {table} SET deleted_at = now() WHERE {id_col} = $1 AND deleted_at IS NULL");
    sqlx::query(&query).bind(id).execute(&mut **tx).await?;
    Ok(())
}

/// Soft-deletes the current active row for `id` directly on the pool (outside
/// any caller-managed transaction). Used by the terminal [`VersionedRepository::soft_delete`].
pub async fn soft_delete_current(
    pool: &PgPool,
    table: &str,
    id_col: &str,
    id: &str,
) -> Result<(), PersistenceError> {
    let query = format!("UPDATE {table} SET deleted_at = now() WHERE {id_col} = $1 AND deleted_at IS NULL");
    let result = sqlx::query(&query).bind(id).execute(pool).await?;
    if result.rows_affected() == 0 {
        return Err(PersistenceError::NotFound(id.to_string()));
    }
    Ok(())
}

/// Maps a Postgres unique-violation (`23505`) to [`PersistenceError::DuplicateActive`],
/// passing through every other error unchanged. Used by every `insert_v1` impl.
pub fn map_unique_violation(id: &str, err: sqlx::Error) -> PersistenceError {
    if let sqlx::Error::Database(ref db_err) = err {
        if db_err.code().as_deref() == Some("23505") {
            return PersistenceError::DuplicateActive(id.to_string());
        }
    }
    PersistenceError::Database(err)
}

/// Shared Postgres connection handle, constructed once in `main` and injected
/// into every repository — never a global/static (REDESIGN FLAGS, `spec.md` §9).
#[derive(Debug, Clone)]
pub struct Database {
    pub pool: PgPool,
}

impl Database {
    pub async fn connect(url: &str, max_connections: u32) -> Result<Self, PersistenceError> {
        let pool = sqlx::postgres::PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(url)
            .await?;
        Ok(Self { pool })
    }

    pub async fn migrate(&self) -> Result<(), PersistenceError> {
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .map_err(|e| PersistenceError::Database(sqlx::Error::Migrate(Box::new(e))))
    }
}
