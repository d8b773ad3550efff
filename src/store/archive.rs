//! Archived protocols

use chrono::{DateTime, Utc};
use sqlx::SqliteConnection;
use uuid::Uuid;

use super::parse_uuid;
use crate::error::{AppError, Result};
use crate::models::{ArchivedDocument, ArchivedProtocol, Protocol};

pub async fn insert(
    conn: &mut SqliteConnection,
    protocol: &Protocol,
    number: &str,
    documents: Vec<ArchivedDocument>,
) -> Result<ArchivedProtocol> {
    let id = Uuid::new_v4();
    let now = Utc::now();
    let encoded = serde_json::to_string(&documents)
        .map_err(|e| AppError::Internal(format!("Failed to encode documents: {}", e)))?;

    sqlx::query(
        r#"
        INSERT INTO archived_protocols (id, protocol_id, number, title, amount, documents, archived_at)
        VALUES (?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(id.to_string())
    .bind(protocol.id.to_string())
    .bind(number)
    .bind(&protocol.title)
    .bind(protocol.amount)
    .bind(encoded)
    .bind(now)
    .execute(&mut *conn)
    .await?;

    Ok(ArchivedProtocol {
        id,
        protocol_id: protocol.id,
        number: number.to_string(),
        title: protocol.title.clone(),
        amount: protocol.amount,
        documents,
        archived_at: now,
    })
}

pub async fn get(conn: &mut SqliteConnection, id: Uuid) -> Result<ArchivedProtocol> {
    sqlx::query_as::<_, ArchivedRow>(
        r#"
        SELECT id, protocol_id, number, title, amount, documents, archived_at
        FROM archived_protocols
        WHERE id = ?
        "#,
    )
    .bind(id.to_string())
    .fetch_optional(&mut *conn)
    .await?
    .ok_or_else(|| AppError::NotFound(format!("Archived protocol {} not found", id)))?
    .try_into()
}

pub async fn list(conn: &mut SqliteConnection) -> Result<Vec<ArchivedProtocol>> {
    let rows = sqlx::query_as::<_, ArchivedRow>(
        r#"
        SELECT id, protocol_id, number, title, amount, documents, archived_at
        FROM archived_protocols
        ORDER BY archived_at DESC
        "#,
    )
    .fetch_all(&mut *conn)
    .await?;

    rows.into_iter().map(|r| r.try_into()).collect()
}

#[derive(sqlx::FromRow)]
struct ArchivedRow {
    id: String,
    protocol_id: String,
    number: String,
    title: String,
    amount: f64,
    documents: String,
    archived_at: DateTime<Utc>,
}

impl TryFrom<ArchivedRow> for ArchivedProtocol {
    type Error = AppError;

    fn try_from(row: ArchivedRow) -> Result<Self> {
        let documents = serde_json::from_str(&row.documents)
            .map_err(|e| AppError::Internal(format!("Invalid archived documents: {}", e)))?;

        Ok(ArchivedProtocol {
            id: parse_uuid(&row.id, "archive id")?,
            protocol_id: parse_uuid(&row.protocol_id, "protocol_id")?,
            number: row.number,
            title: row.title,
            amount: row.amount,
            documents,
            archived_at: row.archived_at,
        })
    }
}
