//! Per-user tasks

use chrono::{DateTime, Utc};
use sqlx::SqliteConnection;
use uuid::Uuid;

use super::{parse_field, parse_uuid};
use crate::error::{AppError, Result};
use crate::models::{EntityKind, Task, TaskStatus};

pub async fn insert(
    conn: &mut SqliteConnection,
    assignee_id: Uuid,
    title: &str,
    entity_kind: EntityKind,
    entity_id: Uuid,
) -> Result<Task> {
    let id = Uuid::new_v4();
    let now = Utc::now();

    sqlx::query(
        r#"
        INSERT INTO tasks (id, assignee_id, title, entity_kind, entity_id, status, created_at)
        VALUES (?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(id.to_string())
    .bind(assignee_id.to_string())
    .bind(title)
    .bind(entity_kind.as_str())
    .bind(entity_id.to_string())
    .bind(TaskStatus::Open.as_str())
    .bind(now)
    .execute(&mut *conn)
    .await?;

    Ok(Task {
        id,
        assignee_id,
        title: title.to_string(),
        entity_kind,
        entity_id,
        status: TaskStatus::Open,
        created_at: now,
        completed_at: None,
    })
}

/// Close the assignee's open tasks for an entity. Returns how many closed.
pub async fn complete_for(
    conn: &mut SqliteConnection,
    assignee_id: Uuid,
    entity_kind: EntityKind,
    entity_id: Uuid,
) -> Result<u64> {
    let result = sqlx::query(
        r#"
        UPDATE tasks SET status = ?, completed_at = ?
        WHERE assignee_id = ? AND entity_kind = ? AND entity_id = ? AND status = ?
        "#,
    )
    .bind(TaskStatus::Done.as_str())
    .bind(Utc::now())
    .bind(assignee_id.to_string())
    .bind(entity_kind.as_str())
    .bind(entity_id.to_string())
    .bind(TaskStatus::Open.as_str())
    .execute(&mut *conn)
    .await?;

    Ok(result.rows_affected())
}

/// Close every open task on an entity, e.g. when it is cancelled
pub async fn complete_all_for(
    conn: &mut SqliteConnection,
    entity_kind: EntityKind,
    entity_id: Uuid,
) -> Result<u64> {
    let result = sqlx::query(
        r#"
        UPDATE tasks SET status = ?, completed_at = ?
        WHERE entity_kind = ? AND entity_id = ? AND status = ?
        "#,
    )
    .bind(TaskStatus::Done.as_str())
    .bind(Utc::now())
    .bind(entity_kind.as_str())
    .bind(entity_id.to_string())
    .bind(TaskStatus::Open.as_str())
    .execute(&mut *conn)
    .await?;

    Ok(result.rows_affected())
}

pub async fn list_for(
    conn: &mut SqliteConnection,
    assignee_id: Uuid,
    status: Option<TaskStatus>,
) -> Result<Vec<Task>> {
    let rows = sqlx::query_as::<_, TaskRow>(
        r#"
        SELECT id, assignee_id, title, entity_kind, entity_id, status, created_at, completed_at
        FROM tasks
        WHERE assignee_id = ? AND (? IS NULL OR status = ?)
        ORDER BY created_at ASC
        "#,
    )
    .bind(assignee_id.to_string())
    .bind(status.map(|s| s.as_str()))
    .bind(status.map(|s| s.as_str()))
    .fetch_all(&mut *conn)
    .await?;

    rows.into_iter().map(|r| r.try_into()).collect()
}

#[derive(sqlx::FromRow)]
struct TaskRow {
    id: String,
    assignee_id: String,
    title: String,
    entity_kind: String,
    entity_id: String,
    status: String,
    created_at: DateTime<Utc>,
    completed_at: Option<DateTime<Utc>>,
}

impl TryFrom<TaskRow> for Task {
    type Error = AppError;

    fn try_from(row: TaskRow) -> Result<Self> {
        Ok(Task {
            id: parse_uuid(&row.id, "task id")?,
            assignee_id: parse_uuid(&row.assignee_id, "assignee_id")?,
            title: row.title,
            entity_kind: parse_field(&row.entity_kind, "entity kind")?,
            entity_id: parse_uuid(&row.entity_id, "entity_id")?,
            status: parse_field(&row.status, "task status")?,
            created_at: row.created_at,
            completed_at: row.completed_at,
        })
    }
}
