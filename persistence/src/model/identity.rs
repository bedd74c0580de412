//! Tenant / broker-link / session rows (`spec.md` §3).

use atlas_core::{BrokerId, BrokerRole, Environment, SessionId, UserBrokerId, UserId};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use crate::versioned::VersionedEntity;

/// Role within a broker link (`DATA` feeds ticks, `EXEC` places orders).
#[derive(Debug, Clone, Copy, PartialEq, Eq, sqlx::Type, Serialize, Deserialize)]
#[sqlx(type_name = "text", rename_all = "UPPERCASE")]
pub enum DbBrokerRole {
    Data,
    Exec,
}

impl From<BrokerRole> for DbBrokerRole {
    fn from(r: BrokerRole) -> Self {
        match r {
            BrokerRole::Data => DbBrokerRole::Data,
            BrokerRole::Exec => DbBrokerRole::Exec,
        }
    }
}

impl From<DbBrokerRole> for BrokerRole {
    fn from(r: DbBrokerRole) -> Self {
        match r {
            DbBrokerRole::Data => BrokerRole::Data,
            DbBrokerRole::Exec => BrokerRole::Exec,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, sqlx::Type, Serialize, Deserialize)]
#[sqlx(type_name = "text", rename_all = "UPPERCASE")]
pub enum DbEnvironment {
    Paper,
    Live,
}

impl From<Environment> for DbEnvironment {
    fn from(e: Environment) -> Self {
        match e {
            Environment::Paper => DbEnvironment::Paper,
            Environment::Live => DbEnvironment::Live,
        }
    }
}

impl From<DbEnvironment> for Environment {
    fn from(e: DbEnvironment) -> Self {
        match e {
            DbEnvironment::Paper => Environment::Paper,
            DbEnvironment::Live => Environment::Live,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, sqlx::Type, Serialize, Deserialize)]
#[sqlx(type_name = "text", rename_all = "UPPERCASE")]
pub enum SessionStatus {
    Active,
    Expired,
    Revoked,
}

/// `users(userId, email[unique-active], passwordHash, role)`.
///
/// Auth is explicitly out of scope (`spec.md` §1); this row exists only so
/// that `UserBroker`/`Trade`/... can carry a typed `userId` foreign key, it is
/// never written by anything in this workspace.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct UserRow {
    pub user_id: UserId,
    pub version: i64,
    pub email: String,
    pub password_hash: String,
    pub role: String,
    pub deleted_at: Option<DateTime<Utc>>,
}

impl VersionedEntity for UserRow {
    fn business_id(&self) -> String {
        self.user_id.to_string()
    }
    fn version(&self) -> i64 {
        self.version
    }
}

/// `brokers(brokerId, brokerCode[unique-active], name, adapterClass)`.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct BrokerRow {
    pub broker_id: BrokerId,
    pub version: i64,
    pub broker_code: String,
    pub name: String,
    pub adapter_class: String,
    pub deleted_at: Option<DateTime<Utc>>,
}

impl VersionedEntity for BrokerRow {
    fn business_id(&self) -> String {
        self.broker_id.to_string()
    }
    fn version(&self) -> i64 {
        self.version
    }
}

/// `user_brokers(userBrokerId, userId, brokerId, role, environment, enabled,
/// capitalAllocated, maxExposure, maxPerTrade, maxDailyLoss)`.
///
/// Invariant 1 (`spec.md` §3): exactly one active DATA `UserBroker` per
/// tenant, enforced by a partial unique index on `(user_id)` `WHERE role =
/// 'DATA' AND deleted_at IS NULL`.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct UserBrokerRow {
    pub user_broker_id: UserBrokerId,
    pub version: i64,
    pub user_id: UserId,
    pub broker_id: BrokerId,
    pub role: DbBrokerRole,
    pub environment: DbEnvironment,
    pub enabled: bool,
    pub capital_allocated: Decimal,
    pub max_exposure: Decimal,
    pub max_per_trade: Decimal,
    pub max_daily_loss: Decimal,
    pub deleted_at: Option<DateTime<Utc>>,
}

impl VersionedEntity for UserBrokerRow {
    fn business_id(&self) -> String {
        self.user_broker_id.to_string()
    }
    fn version(&self) -> i64 {
        self.version
    }
}

/// `user_broker_sessions(sessionId, userBrokerId, accessToken, tokenValidTill,
/// status)`. A new token is a new version; readers select the latest active row.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct UserBrokerSessionRow {
    pub session_id: SessionId,
    pub version: i64,
    pub user_broker_id: UserBrokerId,
    pub access_token: String,
    pub token_valid_till: DateTime<Utc>,
    pub status: SessionStatus,
    pub deleted_at: Option<DateTime<Utc>>,
}

impl VersionedEntity for UserBrokerSessionRow {
    fn business_id(&self) -> String {
        self.session_id.to_string()
    }
    fn version(&self) -> i64 {
        self.version
    }
}

/// `oauth_states(state PK, userBrokerId, brokerId, expiresAt, usedAt)`.
///
/// Not versioned: a single row per `state`, consumed exactly once via the
/// one-shot `used_at` mark (`spec.md` §6). Lives outside the
/// [`crate::versioned::VersionedRepository`] pattern entirely.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct OAuthStateRow {
    pub state: String,
    pub user_broker_id: UserBrokerId,
    pub broker_id: BrokerId,
    pub expires_at: DateTime<Utc>,
    pub used_at: Option<DateTime<Utc>>,
}
