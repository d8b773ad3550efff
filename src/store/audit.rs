//! Append-only log of status transitions

use chrono::{DateTime, Utc};
use sqlx::SqliteConnection;
use uuid::Uuid;

use super::{parse_field, parse_opt_uuid, parse_uuid};
use crate::error::{AppError, Result};
use crate::models::{AuditEntry, EntityKind};

pub async fn record(
    conn: &mut SqliteConnection,
    entity_kind: EntityKind,
    entity_id: Uuid,
    from_status: Option<&str>,
    to_status: &str,
    actor_id: Option<Uuid>,
) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO audit_log (id, entity_kind, entity_id, from_status, to_status, actor_id, at)
        VALUES (?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(Uuid::new_v4().to_string())
    .bind(entity_kind.as_str())
    .bind(entity_id.to_string())
    .bind(from_status)
    .bind(to_status)
    .bind(actor_id.map(|u| u.to_string()))
    .bind(Utc::now())
    .execute(&mut *conn)
    .await?;

    Ok(())
}

pub async fn list_for(
    conn: &mut SqliteConnection,
    entity_kind: EntityKind,
    entity_id: Uuid,
) -> Result<Vec<AuditEntry>> {
    let rows = sqlx::query_as::<_, AuditRow>(
        r#"
        SELECT id, entity_kind, entity_id, from_status, to_status, actor_id, at
        FROM audit_log
        WHERE entity_kind = ? AND entity_id = ?
        ORDER BY at ASC, rowid ASC
        "#,
    )
    .bind(entity_kind.as_str())
    .bind(entity_id.to_string())
    .fetch_all(&mut *conn)
    .await?;

    rows.into_iter().map(|r| r.try_into()).collect()
}

#[derive(sqlx::FromRow)]
struct AuditRow {
    id: String,
    entity_kind: String,
    entity_id: String,
    from_status: Option<String>,
    to_status: String,
    actor_id: Option<String>,
    at: DateTime<Utc>,
}

impl TryFrom<AuditRow> for AuditEntry {
    type Error = AppError;

    fn try_from(row: AuditRow) -> Result<Self> {
        Ok(AuditEntry {
            id: parse_uuid(&row.id, "audit id")?,
            entity_kind: parse_field(&row.entity_kind, "entity kind")?,
            entity_id: parse_uuid(&row.entity_id, "entity_id")?,
            from_status: row.from_status,
            to_status: row.to_status,
            actor_id: parse_opt_uuid(row.actor_id, "actor_id")?,
            at: row.at,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::test_support::setup_test_db;

    #[tokio::test]
    async fn test_entries_in_insertion_order() {
        let store = setup_test_db().await;
        let mut conn = store.conn().await.unwrap();
        let entity = Uuid::new_v4();
        let actor = Uuid::new_v4();

        record(&mut conn, EntityKind::Request, entity, None, "draft", Some(actor))
            .await
            .unwrap();
        record(&mut conn, EntityKind::Request, entity, Some("draft"), "signed", None)
            .await
            .unwrap();

        let entries = list_for(&mut conn, EntityKind::Request, entity).await.unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].to_status, "draft");
        assert_eq!(entries[0].actor_id, Some(actor));
        assert_eq!(entries[1].from_status.as_deref(), Some("draft"));
    }
}
