//! In-app notifications

use chrono::{DateTime, Utc};
use sqlx::SqliteConnection;
use uuid::Uuid;

use super::{parse_field, parse_uuid};
use crate::error::{AppError, Result};
use crate::models::{EntityKind, Notification};

pub async fn insert(
    conn: &mut SqliteConnection,
    recipient_id: Uuid,
    event: &str,
    message: &str,
    entity_kind: EntityKind,
    entity_id: Uuid,
) -> Result<Notification> {
    let id = Uuid::new_v4();
    let now = Utc::now();

    sqlx::query(
        r#"
        INSERT INTO notifications (id, recipient_id, event, message, entity_kind, entity_id, created_at)
        VALUES (?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(id.to_string())
    .bind(recipient_id.to_string())
    .bind(event)
    .bind(message)
    .bind(entity_kind.as_str())
    .bind(entity_id.to_string())
    .bind(now)
    .execute(&mut *conn)
    .await?;

    Ok(Notification {
        id,
        recipient_id,
        event: event.to_string(),
        message: message.to_string(),
        entity_kind,
        entity_id,
        created_at: now,
        read_at: None,
    })
}

pub async fn list_for(
    conn: &mut SqliteConnection,
    recipient_id: Uuid,
    unread_only: bool,
) -> Result<Vec<Notification>> {
    let rows = sqlx::query_as::<_, NotificationRow>(
        r#"
        SELECT id, recipient_id, event, message, entity_kind, entity_id, created_at, read_at
        FROM notifications
        WHERE recipient_id = ? AND (? = 0 OR read_at IS NULL)
        ORDER BY created_at DESC
        "#,
    )
    .bind(recipient_id.to_string())
    .bind(unread_only)
    .fetch_all(&mut *conn)
    .await?;

    rows.into_iter().map(|r| r.try_into()).collect()
}

/// Mark one of the recipient's notifications read
pub async fn mark_read(conn: &mut SqliteConnection, recipient_id: Uuid, id: Uuid) -> Result<()> {
    let result = sqlx::query(
        r#"
        UPDATE notifications SET read_at = COALESCE(read_at, ?)
        WHERE id = ? AND recipient_id = ?
        "#,
    )
    .bind(Utc::now())
    .bind(id.to_string())
    .bind(recipient_id.to_string())
    .execute(&mut *conn)
    .await?;

    if result.rows_affected() == 0 {
        return Err(AppError::NotFound(format!("Notification {} not found", id)));
    }
    Ok(())
}

#[derive(sqlx::FromRow)]
struct NotificationRow {
    id: String,
    recipient_id: String,
    event: String,
    message: String,
    entity_kind: String,
    entity_id: String,
    created_at: DateTime<Utc>,
    read_at: Option<DateTime<Utc>>,
}

impl TryFrom<NotificationRow> for Notification {
    type Error = AppError;

    fn try_from(row: NotificationRow) -> Result<Self> {
        Ok(Notification {
            id: parse_uuid(&row.id, "notification id")?,
            recipient_id: parse_uuid(&row.recipient_id, "recipient_id")?,
            event: row.event,
            message: row.message,
            entity_kind: parse_field(&row.entity_kind, "entity kind")?,
            entity_id: parse_uuid(&row.entity_id, "entity_id")?,
            created_at: row.created_at,
            read_at: row.read_at,
        })
    }
}
