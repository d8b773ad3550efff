//! Purchase requests and their items

use chrono::{DateTime, Utc};
use sqlx::SqliteConnection;
use uuid::Uuid;

use super::{parse_field, parse_uuid, signatures};
use crate::error::{AppError, Result};
use crate::models::{EntityKind, NewRequest, Request, RequestItem, RequestStatus};

pub async fn insert(
    conn: &mut SqliteConnection,
    input: &NewRequest,
    created_by: Uuid,
) -> Result<Request> {
    let id = Uuid::new_v4();
    let now = Utc::now();

    sqlx::query(
        r#"
        INSERT INTO requests (id, title, kind, category, status, created_by, created_at, updated_at)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(id.to_string())
    .bind(&input.title)
    .bind(input.kind.as_str())
    .bind(&input.category)
    .bind(RequestStatus::Draft.as_str())
    .bind(created_by.to_string())
    .bind(now)
    .bind(now)
    .execute(&mut *conn)
    .await?;

    let mut items = Vec::with_capacity(input.items.len());
    for (position, item) in input.items.iter().enumerate() {
        let item_id = Uuid::new_v4();
        sqlx::query(
            r#"
            INSERT INTO request_items (id, request_id, position, name, quantity, unit, estimated_price)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(item_id.to_string())
        .bind(id.to_string())
        .bind(position as i64)
        .bind(&item.name)
        .bind(item.quantity)
        .bind(&item.unit)
        .bind(item.estimated_price)
        .execute(&mut *conn)
        .await?;

        items.push(RequestItem {
            id: item_id,
            name: item.name.clone(),
            quantity: item.quantity,
            unit: item.unit.clone(),
            estimated_price: item.estimated_price,
        });
    }

    Ok(Request {
        id,
        title: input.title.clone(),
        kind: input.kind,
        category: input.category.clone(),
        status: RequestStatus::Draft,
        items,
        signatures: Vec::new(),
        created_by,
        signed_at: None,
        created_at: now,
        updated_at: now,
    })
}

pub async fn get(conn: &mut SqliteConnection, id: Uuid) -> Result<Request> {
    let row = sqlx::query_as::<_, RequestRow>(
        r#"
        SELECT id, title, kind, category, status, created_by, signed_at, created_at, updated_at
        FROM requests
        WHERE id = ?
        "#,
    )
    .bind(id.to_string())
    .fetch_optional(&mut *conn)
    .await?
    .ok_or_else(|| AppError::NotFound(format!("Request {} not found", id)))?;

    hydrate(conn, row).await
}

pub async fn list(
    conn: &mut SqliteConnection,
    status: Option<RequestStatus>,
) -> Result<Vec<Request>> {
    let rows = sqlx::query_as::<_, RequestRow>(
        r#"
        SELECT id, title, kind, category, status, created_by, signed_at, created_at, updated_at
        FROM requests
        WHERE ? IS NULL OR status = ?
        ORDER BY created_at DESC
        "#,
    )
    .bind(status.map(|s| s.as_str()))
    .bind(status.map(|s| s.as_str()))
    .fetch_all(&mut *conn)
    .await?;

    let mut out = Vec::with_capacity(rows.len());
    for row in rows {
        out.push(hydrate(conn, row).await?);
    }
    Ok(out)
}

/// Move a request from one status to another.
///
/// Returns false when the request was not in `from`, so a transition fires
/// at most once even if two callers race for it.
pub async fn transition(
    conn: &mut SqliteConnection,
    id: Uuid,
    from: RequestStatus,
    to: RequestStatus,
) -> Result<bool> {
    let now = Utc::now();
    let signed_at = (to == RequestStatus::Signed).then_some(now);

    let result = sqlx::query(
        r#"
        UPDATE requests
        SET status = ?, updated_at = ?, signed_at = COALESCE(?, signed_at)
        WHERE id = ? AND status = ?
        "#,
    )
    .bind(to.as_str())
    .bind(now)
    .bind(signed_at)
    .bind(id.to_string())
    .bind(from.as_str())
    .execute(&mut *conn)
    .await?;

    Ok(result.rows_affected() == 1)
}

async fn hydrate(conn: &mut SqliteConnection, row: RequestRow) -> Result<Request> {
    let id = parse_uuid(&row.id, "request id")?;

    let item_rows = sqlx::query_as::<_, RequestItemRow>(
        r#"
        SELECT id, name, quantity, unit, estimated_price
        FROM request_items
        WHERE request_id = ?
        ORDER BY position ASC
        "#,
    )
    .bind(&row.id)
    .fetch_all(&mut *conn)
    .await?;

    let items = item_rows
        .into_iter()
        .map(|r| r.try_into())
        .collect::<Result<Vec<RequestItem>>>()?;
    let signatures = signatures::list(conn, EntityKind::Request, id).await?;

    Ok(Request {
        id,
        title: row.title,
        kind: parse_field(&row.kind, "request kind")?,
        category: row.category,
        status: parse_field(&row.status, "request status")?,
        items,
        signatures,
        created_by: parse_uuid(&row.created_by, "created_by")?,
        signed_at: row.signed_at,
        created_at: row.created_at,
        updated_at: row.updated_at,
    })
}

#[derive(sqlx::FromRow)]
struct RequestRow {
    id: String,
    title: String,
    kind: String,
    category: String,
    status: String,
    created_by: String,
    signed_at: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

#[derive(sqlx::FromRow)]
struct RequestItemRow {
    id: String,
    name: String,
    quantity: f64,
    unit: String,
    estimated_price: Option<f64>,
}

impl TryFrom<RequestItemRow> for RequestItem {
    type Error = AppError;

    fn try_from(row: RequestItemRow) -> Result<Self> {
        Ok(RequestItem {
            id: parse_uuid(&row.id, "request item id")?,
            name: row.name,
            quantity: row.quantity,
            unit: row.unit,
            estimated_price: row.estimated_price,
        })
    }
}
