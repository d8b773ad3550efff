//! Database store for the procurement pipeline
//!
//! One submodule per entity type. Every query function takes a
//! `&mut SqliteConnection` so the workflow engine can run a whole transition
//! inside one transaction; read paths just acquire a pooled connection.

pub mod archive;
pub mod audit;
pub mod calendar;
pub mod notifications;
pub mod protocols;
pub mod requests;
pub mod signatures;
pub mod tasks;
pub mod tenders;
pub mod users;

use chrono::Utc;
use sqlx::pool::PoolConnection;
use sqlx::{Sqlite, SqlitePool, Transaction};
use uuid::Uuid;

use crate::error::{AppError, Result};

/// Database store
#[derive(Clone)]
pub struct Store {
    pool: SqlitePool,
}

impl Store {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn conn(&self) -> Result<PoolConnection<Sqlite>> {
        Ok(self.pool.acquire().await?)
    }

    /// Open a write transaction.
    ///
    /// The lock row is written before anything is read, so the transaction
    /// holds SQLite's write lock from its first statement. A concurrent
    /// writer waits on the busy timeout instead of failing to upgrade a
    /// read lock.
    pub async fn begin(&self) -> Result<Transaction<'static, Sqlite>> {
        let mut tx = self.pool.begin().await?;
        sqlx::query("UPDATE write_lock SET acquired_at = ? WHERE id = 1")
            .bind(Utc::now())
            .execute(&mut *tx)
            .await?;
        Ok(tx)
    }
}

pub(crate) fn parse_uuid(raw: &str, field: &str) -> Result<Uuid> {
    Uuid::parse_str(raw).map_err(|e| AppError::Internal(format!("Invalid {} UUID: {}", field, e)))
}

pub(crate) fn parse_opt_uuid(raw: Option<String>, field: &str) -> Result<Option<Uuid>> {
    raw.map(|s| parse_uuid(&s, field)).transpose()
}

pub(crate) fn parse_field<T>(raw: &str, field: &str) -> Result<T>
where
    T: std::str::FromStr<Err = String>,
{
    raw.parse()
        .map_err(|e| AppError::Internal(format!("Invalid {}: {}", field, e)))
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_uuid_invalid() {
        let err = parse_uuid("not-a-uuid", "request_id").unwrap_err();
        assert!(err.to_string().contains("request_id"));
    }

    #[test]
    fn test_parse_opt_uuid() {
        assert_eq!(parse_opt_uuid(None, "winner_id").unwrap(), None);
        let id = Uuid::new_v4();
        assert_eq!(
            parse_opt_uuid(Some(id.to_string()), "winner_id").unwrap(),
            Some(id)
        );
        assert!(parse_opt_uuid(Some("x".into()), "winner_id").is_err());
    }

    #[tokio::test]
    async fn test_store_begin_and_commit() {
        let store = test_support::setup_test_db().await;
        let tx = store.begin().await.unwrap();
        tx.commit().await.unwrap();

        let mut conn = store.conn().await.unwrap();
        let (acquired_at,): (Option<String>,) =
            sqlx::query_as("SELECT acquired_at FROM write_lock WHERE id = 1")
                .fetch_one(&mut *conn)
                .await
                .unwrap();
        assert!(acquired_at.is_some());
    }
}
