//! User directory used to reach people over Telegram

use chrono::Utc;
use sqlx::SqliteConnection;
use uuid::Uuid;

use super::parse_uuid;
use crate::error::{AppError, Result};
use crate::models::{UpsertUser, User};

pub async fn upsert(conn: &mut SqliteConnection, id: Uuid, input: &UpsertUser) -> Result<User> {
    let now = Utc::now();

    sqlx::query(
        r#"
        INSERT INTO users (id, full_name, telegram_chat_id, created_at, updated_at)
        VALUES (?, ?, ?, ?, ?)
        ON CONFLICT(id) DO UPDATE SET
            full_name = excluded.full_name,
            telegram_chat_id = excluded.telegram_chat_id,
            updated_at = excluded.updated_at
        "#,
    )
    .bind(id.to_string())
    .bind(&input.full_name)
    .bind(input.telegram_chat_id)
    .bind(now)
    .bind(now)
    .execute(&mut *conn)
    .await?;

    Ok(User {
        id,
        full_name: input.full_name.clone(),
        telegram_chat_id: input.telegram_chat_id,
    })
}

pub async fn find(conn: &mut SqliteConnection, id: Uuid) -> Result<Option<User>> {
    let row = sqlx::query_as::<_, UserRow>(
        "SELECT id, full_name, telegram_chat_id FROM users WHERE id = ?",
    )
    .bind(id.to_string())
    .fetch_optional(&mut *conn)
    .await?;

    row.map(|r| r.try_into()).transpose()
}

pub async fn get(conn: &mut SqliteConnection, id: Uuid) -> Result<User> {
    find(conn, id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("User {} not found", id)))
}

pub async fn list(conn: &mut SqliteConnection) -> Result<Vec<User>> {
    let rows = sqlx::query_as::<_, UserRow>(
        "SELECT id, full_name, telegram_chat_id FROM users ORDER BY full_name ASC",
    )
    .fetch_all(&mut *conn)
    .await?;

    rows.into_iter().map(|r| r.try_into()).collect()
}

#[derive(sqlx::FromRow)]
struct UserRow {
    id: String,
    full_name: String,
    telegram_chat_id: Option<i64>,
}

impl TryFrom<UserRow> for User {
    type Error = AppError;

    fn try_from(row: UserRow) -> Result<Self> {
        Ok(User {
            id: parse_uuid(&row.id, "user id")?,
            full_name: row.full_name,
            telegram_chat_id: row.telegram_chat_id,
        })
    }
}
