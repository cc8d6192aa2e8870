//! services/monitor/src/adapters/db.rs
//!
//! This module contains the database adapter, which is the concrete implementation
//! of the `LedgerService` port from the `core` crate. It handles all interactions
//! with the SQLite database using `sqlx`.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use paper_watch_core::domain::{Cadence, SeenMark, Subscription, SubscriptionId, User, UserId};
use paper_watch_core::ports::{LedgerService, PortError, PortResult};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::{FromRow, QueryBuilder, Sqlite, SqlitePool};
use std::collections::HashSet;
use std::str::FromStr;

/// SQLite caps the number of bound parameters per statement.
const IN_LIST_CHUNK: usize = 500;

//=========================================================================================
// The Main Adapter Struct
//=========================================================================================

/// A database adapter that implements the `LedgerService` port.
#[derive(Clone)]
pub struct DbAdapter {
    pool: SqlitePool,
}

impl DbAdapter {
    /// Creates a new `DbAdapter`.
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Opens (and creates if missing) the database behind `database_url`.
    pub async fn connect(database_url: &str) -> Result<Self, sqlx::Error> {
        let options = SqliteConnectOptions::from_str(database_url)?
            .create_if_missing(true)
            .foreign_keys(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await?;
        Ok(Self::new(pool))
    }

    /// A helper function to run database migrations at startup.
    pub async fn run_migrations(&self) -> Result<(), sqlx::migrate::MigrateError> {
        sqlx::migrate!("./migrations").run(&self.pool).await?;
        Ok(())
    }
}

fn unexpected(e: sqlx::Error) -> PortError {
    PortError::Unexpected(e.to_string())
}

/// Maps constraint failures on inserts to their port error.
fn insert_error(e: sqlx::Error, user_id: UserId) -> PortError {
    if let sqlx::Error::Database(db) = &e {
        if db.is_foreign_key_violation() {
            return PortError::ForeignKeyViolation(format!("User {} is not registered", user_id));
        }
    }
    unexpected(e)
}

//=========================================================================================
// "Impure" Database Record Structs
//=========================================================================================

#[derive(FromRow)]
struct UserRecord {
    user_id: i64,
    created_at: DateTime<Utc>,
}
impl UserRecord {
    fn to_domain(self) -> User {
        User {
            user_id: self.user_id,
            created_at: self.created_at,
        }
    }
}

#[derive(FromRow)]
struct SubscriptionRecord {
    id: i64,
    user_id: i64,
    topic: String,
    cadence: String,
    last_checked: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
}
impl SubscriptionRecord {
    fn to_domain(self) -> PortResult<Subscription> {
        let cadence = Cadence::from_str(&self.cadence).map_err(PortError::Unexpected)?;
        Ok(Subscription {
            id: self.id,
            user_id: self.user_id,
            topic: self.topic,
            cadence,
            last_checked: self.last_checked,
            created_at: self.created_at,
        })
    }
}

#[derive(FromRow)]
struct SeenMarkRecord {
    user_id: i64,
    subscription_id: i64,
    item_id: String,
    sent_at: DateTime<Utc>,
}
impl SeenMarkRecord {
    fn to_domain(self) -> SeenMark {
        SeenMark {
            user_id: self.user_id,
            subscription_id: self.subscription_id,
            item_id: self.item_id,
            sent_at: self.sent_at,
        }
    }
}

const SUBSCRIPTION_COLUMNS: &str = "id, user_id, topic, cadence, last_checked, created_at";

//=========================================================================================
// `LedgerService` Trait Implementation
//=========================================================================================

#[async_trait]
impl LedgerService for DbAdapter {
    async fn register_user(&self, user_id: UserId) -> PortResult<User> {
        sqlx::query("INSERT INTO users (user_id, created_at) VALUES (?, ?) ON CONFLICT (user_id) DO NOTHING")
            .bind(user_id)
            .bind(Utc::now())
            .execute(&self.pool)
            .await
            .map_err(unexpected)?;

        let record = sqlx::query_as::<_, UserRecord>(
            "SELECT user_id, created_at FROM users WHERE user_id = ?",
        )
        .bind(user_id)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| match e {
            sqlx::Error::RowNotFound => PortError::NotFound(format!("User {} not found", user_id)),
            _ => unexpected(e),
        })?;

        Ok(record.to_domain())
    }

    async fn create_subscription(
        &self,
        user_id: UserId,
        topic: &str,
        cadence: Cadence,
    ) -> PortResult<SubscriptionId> {
        let topic = topic.trim();
        if topic.is_empty() {
            return Err(PortError::InvalidInput("Subscription topic must not be empty".to_string()));
        }

        let result = sqlx::query(
            "INSERT INTO subscriptions (user_id, topic, cadence, created_at) VALUES (?, ?, ?, ?)",
        )
        .bind(user_id)
        .bind(topic)
        .bind(cadence.as_str())
        .bind(Utc::now())
        .execute(&self.pool)
        .await
        .map_err(|e| insert_error(e, user_id))?;

        Ok(result.last_insert_rowid())
    }

    async fn get_subscription(&self, id: SubscriptionId) -> PortResult<Subscription> {
        let record = sqlx::query_as::<_, SubscriptionRecord>(&format!(
            "SELECT {} FROM subscriptions WHERE id = ?",
            SUBSCRIPTION_COLUMNS
        ))
        .bind(id)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| match e {
            sqlx::Error::RowNotFound => PortError::NotFound(format!("Subscription {} not found", id)),
            _ => unexpected(e),
        })?;
        record.to_domain()
    }

    async fn list_subscriptions(&self, user_id: UserId) -> PortResult<Vec<Subscription>> {
        let records = sqlx::query_as::<_, SubscriptionRecord>(&format!(
            "SELECT {} FROM subscriptions WHERE user_id = ? ORDER BY id ASC",
            SUBSCRIPTION_COLUMNS
        ))
        .bind(user_id)
        .fetch_all(&self.pool)
        .await
        .map_err(unexpected)?;

        records.into_iter().map(|r| r.to_domain()).collect()
    }

    async fn list_all_subscriptions(&self) -> PortResult<Vec<Subscription>> {
        let records = sqlx::query_as::<_, SubscriptionRecord>(&format!(
            "SELECT {} FROM subscriptions",
            SUBSCRIPTION_COLUMNS
        ))
        .fetch_all(&self.pool)
        .await
        .map_err(unexpected)?;

        records.into_iter().map(|r| r.to_domain()).collect()
    }

    async fn delete_subscription(&self, id: SubscriptionId) -> PortResult<bool> {
        let result = sqlx::query("DELETE FROM subscriptions WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(unexpected)?;
        Ok(result.rows_affected() > 0)
    }

    async fn touch_last_checked(&self, id: SubscriptionId, now: DateTime<Utc>) -> PortResult<()> {
        sqlx::query("UPDATE subscriptions SET last_checked = ? WHERE id = ?")
            .bind(now)
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(unexpected)?;
        Ok(())
    }

    async fn mark_seen(
        &self,
        user_id: UserId,
        subscription_id: SubscriptionId,
        item_id: &str,
        now: DateTime<Utc>,
    ) -> PortResult<()> {
        sqlx::query(
            "INSERT INTO seen_marks (user_id, subscription_id, item_id, sent_at) VALUES (?, ?, ?, ?) \
             ON CONFLICT (user_id, item_id) DO NOTHING",
        )
        .bind(user_id)
        .bind(subscription_id)
        .bind(item_id)
        .bind(now)
        .execute(&self.pool)
        .await
        .map_err(|e| insert_error(e, user_id))?;
        Ok(())
    }

    async fn filter_unseen(&self, user_id: UserId, item_ids: &[String]) -> PortResult<Vec<String>> {
        if item_ids.is_empty() {
            return Ok(Vec::new());
        }

        let mut seen = HashSet::new();
        for chunk in item_ids.chunks(IN_LIST_CHUNK) {
            let mut builder: QueryBuilder<Sqlite> =
                QueryBuilder::new("SELECT item_id FROM seen_marks WHERE user_id = ");
            builder.push_bind(user_id);
            builder.push(" AND item_id IN (");
            let mut separated = builder.separated(", ");
            for id in chunk {
                separated.push_bind(id.as_str());
            }
            separated.push_unseparated(")");

            let rows: Vec<String> = builder
                .build_query_scalar::<String>()
                .fetch_all(&self.pool)
                .await
                .map_err(unexpected)?;
            seen.extend(rows);
        }

        Ok(item_ids
            .iter()
            .filter(|id| !seen.contains(*id))
            .cloned()
            .collect())
    }

    async fn list_seen_marks(&self, user_id: UserId) -> PortResult<Vec<SeenMark>> {
        let records = sqlx::query_as::<_, SeenMarkRecord>(
            "SELECT user_id, subscription_id, item_id, sent_at FROM seen_marks WHERE user_id = ? ORDER BY id ASC",
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await
        .map_err(unexpected)?;

        Ok(records.into_iter().map(|r| r.to_domain()).collect())
    }
}
