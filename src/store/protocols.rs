//! Protocols, their numbering and finance status

use chrono::{DateTime, Utc};
use sqlx::SqliteConnection;
use uuid::Uuid;

use super::{parse_field, parse_opt_uuid, parse_uuid, signatures};
use crate::error::{AppError, Result};
use crate::models::{EntityKind, FinanceStatus, Protocol, ProtocolKind, ProtocolStatus};

/// Fields needed to open a protocol
#[derive(Debug, Clone)]
pub struct ProtocolDraft {
    pub kind: ProtocolKind,
    pub tender_id: Option<Uuid>,
    pub request_id: Uuid,
    pub title: String,
    pub supplier_name: Option<String>,
    pub amount: f64,
}

pub async fn insert(conn: &mut SqliteConnection, draft: ProtocolDraft) -> Result<Protocol> {
    let id = Uuid::new_v4();
    let now = Utc::now();

    sqlx::query(
        r#"
        INSERT INTO protocols (id, kind, tender_id, request_id, title, supplier_name, amount, status, finance_status, created_at)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(id.to_string())
    .bind(draft.kind.as_str())
    .bind(draft.tender_id.map(|u| u.to_string()))
    .bind(draft.request_id.to_string())
    .bind(&draft.title)
    .bind(&draft.supplier_name)
    .bind(draft.amount)
    .bind(ProtocolStatus::Signing.as_str())
    .bind(FinanceStatus::NotSubmitted.as_str())
    .bind(now)
    .execute(&mut *conn)
    .await?;

    Ok(Protocol {
        id,
        kind: draft.kind,
        tender_id: draft.tender_id,
        request_id: draft.request_id,
        title: draft.title,
        supplier_name: draft.supplier_name,
        amount: draft.amount,
        status: ProtocolStatus::Signing,
        finance_status: FinanceStatus::NotSubmitted,
        number: None,
        signatures: Vec::new(),
        created_at: now,
        numbered_at: None,
        submitted_at: None,
        paid_at: None,
    })
}

pub async fn get(conn: &mut SqliteConnection, id: Uuid) -> Result<Protocol> {
    let row = sqlx::query_as::<_, ProtocolRow>(
        r#"
        SELECT id, kind, tender_id, request_id, title, supplier_name, amount, status, finance_status,
               number, created_at, numbered_at, submitted_at, paid_at
        FROM protocols
        WHERE id = ?
        "#,
    )
    .bind(id.to_string())
    .fetch_optional(&mut *conn)
    .await?
    .ok_or_else(|| AppError::NotFound(format!("Protocol {} not found", id)))?;

    hydrate(conn, row).await
}

pub async fn list(
    conn: &mut SqliteConnection,
    finance_status: Option<FinanceStatus>,
) -> Result<Vec<Protocol>> {
    let rows = sqlx::query_as::<_, ProtocolRow>(
        r#"
        SELECT id, kind, tender_id, request_id, title, supplier_name, amount, status, finance_status,
               number, created_at, numbered_at, submitted_at, paid_at
        FROM protocols
        WHERE ? IS NULL OR finance_status = ?
        ORDER BY created_at DESC
        "#,
    )
    .bind(finance_status.map(|s| s.as_str()))
    .bind(finance_status.map(|s| s.as_str()))
    .fetch_all(&mut *conn)
    .await?;

    let mut out = Vec::with_capacity(rows.len());
    for row in rows {
        out.push(hydrate(conn, row).await?);
    }
    Ok(out)
}

/// Conditional status change. False when the protocol was not in `from`.
pub async fn transition(
    conn: &mut SqliteConnection,
    id: Uuid,
    from: ProtocolStatus,
    to: ProtocolStatus,
) -> Result<bool> {
    let result = sqlx::query("UPDATE protocols SET status = ? WHERE id = ? AND status = ?")
        .bind(to.as_str())
        .bind(id.to_string())
        .bind(from.as_str())
        .execute(&mut *conn)
        .await?;

    Ok(result.rows_affected() == 1)
}

/// Conditional finance status change for the submitted and paid steps,
/// stamping the matching timestamp column
pub async fn set_finance_status(
    conn: &mut SqliteConnection,
    id: Uuid,
    from: FinanceStatus,
    to: FinanceStatus,
    at: DateTime<Utc>,
) -> Result<bool> {
    let query = match to {
        FinanceStatus::Submitted => {
            "UPDATE protocols SET finance_status = ?, submitted_at = ? WHERE id = ? AND finance_status = ?"
        }
        FinanceStatus::Paid => {
            "UPDATE protocols SET finance_status = ?, paid_at = ? WHERE id = ? AND finance_status = ?"
        }
        FinanceStatus::NotSubmitted | FinanceStatus::Waiting => {
            return Err(AppError::Internal(format!(
                "finance status {} is set by numbering, not directly",
                to.as_str()
            )));
        }
    };

    let result = sqlx::query(query)
        .bind(to.as_str())
        .bind(at)
        .bind(id.to_string())
        .bind(from.as_str())
        .execute(&mut *conn)
        .await?;

    Ok(result.rows_affected() == 1)
}

/// Reserve the next number for `year`, formatted `{year}/{seq:03}`
pub async fn next_number(conn: &mut SqliteConnection, year: i32) -> Result<String> {
    let seq: i64 = sqlx::query_scalar(
        r#"
        INSERT INTO protocol_counters (year, last_value) VALUES (?, 1)
        ON CONFLICT(year) DO UPDATE SET last_value = last_value + 1
        RETURNING last_value
        "#,
    )
    .bind(year)
    .fetch_one(&mut *conn)
    .await?;

    Ok(format_number(year, seq))
}

pub fn format_number(year: i32, seq: i64) -> String {
    format!("{}/{:03}", year, seq)
}

/// Store the number on a protocol that is ready for it and queue it for finance
pub async fn assign_number(
    conn: &mut SqliteConnection,
    id: Uuid,
    number: &str,
    at: DateTime<Utc>,
) -> Result<bool> {
    let result = sqlx::query(
        r#"
        UPDATE protocols
        SET number = ?, numbered_at = ?, status = ?, finance_status = ?
        WHERE id = ? AND status = ? AND number IS NULL
        "#,
    )
    .bind(number)
    .bind(at)
    .bind(ProtocolStatus::Numbered.as_str())
    .bind(FinanceStatus::Waiting.as_str())
    .bind(id.to_string())
    .bind(ProtocolStatus::ReadyToNumber.as_str())
    .execute(&mut *conn)
    .await?;

    Ok(result.rows_affected() == 1)
}

async fn hydrate(conn: &mut SqliteConnection, row: ProtocolRow) -> Result<Protocol> {
    let id = parse_uuid(&row.id, "protocol id")?;
    let signatures = signatures::list(conn, EntityKind::Protocol, id).await?;

    Ok(Protocol {
        id,
        kind: parse_field(&row.kind, "protocol kind")?,
        tender_id: parse_opt_uuid(row.tender_id, "tender_id")?,
        request_id: parse_uuid(&row.request_id, "request_id")?,
        title: row.title,
        supplier_name: row.supplier_name,
        amount: row.amount,
        status: parse_field(&row.status, "protocol status")?,
        finance_status: parse_field(&row.finance_status, "finance status")?,
        number: row.number,
        signatures,
        created_at: row.created_at,
        numbered_at: row.numbered_at,
        submitted_at: row.submitted_at,
        paid_at: row.paid_at,
    })
}

#[derive(sqlx::FromRow)]
struct ProtocolRow {
    id: String,
    kind: String,
    tender_id: Option<String>,
    request_id: String,
    title: String,
    supplier_name: Option<String>,
    amount: f64,
    status: String,
    finance_status: String,
    number: Option<String>,
    created_at: DateTime<Utc>,
    numbered_at: Option<DateTime<Utc>>,
    submitted_at: Option<DateTime<Utc>>,
    paid_at: Option<DateTime<Utc>>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{NewRequest, RequestKind};
    use crate::store::requests;
    use crate::store::test_support::setup_test_db;

    async fn cash_draft(conn: &mut SqliteConnection) -> ProtocolDraft {
        let request = requests::insert(
            conn,
            &NewRequest {
                title: "Stationery".to_string(),
                kind: RequestKind::Cash,
                category: String::new(),
                items: vec![],
            },
            Uuid::new_v4(),
        )
        .await
        .unwrap();
        ProtocolDraft {
            kind: ProtocolKind::Cash,
            tender_id: None,
            request_id: request.id,
            title: "Stationery".to_string(),
            supplier_name: None,
            amount: 4200.0,
        }
    }

    #[test]
    fn test_format_number() {
        assert_eq!(format_number(2026, 7), "2026/007");
        assert_eq!(format_number(2026, 1234), "2026/1234");
    }

    #[tokio::test]
    async fn test_numbers_are_sequential_per_year() {
        let store = setup_test_db().await;
        let mut conn = store.conn().await.unwrap();

        assert_eq!(next_number(&mut conn, 2026).await.unwrap(), "2026/001");
        assert_eq!(next_number(&mut conn, 2026).await.unwrap(), "2026/002");
        assert_eq!(next_number(&mut conn, 2027).await.unwrap(), "2027/001");
    }

    #[tokio::test]
    async fn test_number_requires_ready_status() {
        let store = setup_test_db().await;
        let mut conn = store.conn().await.unwrap();
        let draft = cash_draft(&mut conn).await;
        let protocol = insert(&mut conn, draft).await.unwrap();

        assert!(!assign_number(&mut conn, protocol.id, "2026/001", Utc::now())
            .await
            .unwrap());

        transition(
            &mut conn,
            protocol.id,
            ProtocolStatus::Signing,
            ProtocolStatus::ReadyToNumber,
        )
        .await
        .unwrap();
        assert!(assign_number(&mut conn, protocol.id, "2026/001", Utc::now())
            .await
            .unwrap());

        let fetched = get(&mut conn, protocol.id).await.unwrap();
        assert_eq!(fetched.status, ProtocolStatus::Numbered);
        assert_eq!(fetched.number.as_deref(), Some("2026/001"));
        assert!(fetched.numbered_at.is_some());
    }

    #[tokio::test]
    async fn test_finance_status_guards_and_stamps() {
        let store = setup_test_db().await;
        let mut conn = store.conn().await.unwrap();
        let draft = cash_draft(&mut conn).await;
        let protocol = insert(&mut conn, draft).await.unwrap();
        let now = Utc::now();

        // Not numbered yet, so nothing is waiting for submission
        assert!(!set_finance_status(
            &mut conn,
            protocol.id,
            FinanceStatus::Waiting,
            FinanceStatus::Submitted,
            now
        )
        .await
        .unwrap());

        transition(
            &mut conn,
            protocol.id,
            ProtocolStatus::Signing,
            ProtocolStatus::ReadyToNumber,
        )
        .await
        .unwrap();
        assign_number(&mut conn, protocol.id, "2026/001", now)
            .await
            .unwrap();
        assert!(set_finance_status(
            &mut conn,
            protocol.id,
            FinanceStatus::Waiting,
            FinanceStatus::Submitted,
            now
        )
        .await
        .unwrap());

        let fetched = get(&mut conn, protocol.id).await.unwrap();
        assert_eq!(fetched.finance_status, FinanceStatus::Submitted);
        assert!(fetched.submitted_at.is_some());
        assert!(fetched.paid_at.is_none());
    }

    #[tokio::test]
    async fn test_waiting_cannot_be_set_directly() {
        let store = setup_test_db().await;
        let mut conn = store.conn().await.unwrap();
        let result = set_finance_status(
            &mut conn,
            Uuid::new_v4(),
            FinanceStatus::NotSubmitted,
            FinanceStatus::Waiting,
            Utc::now(),
        )
        .await;
        assert!(matches!(result, Err(AppError::Internal(_))));
    }

    #[tokio::test]
    async fn test_list_by_finance_status() {
        let store = setup_test_db().await;
        let mut conn = store.conn().await.unwrap();
        let draft = cash_draft(&mut conn).await;
        insert(&mut conn, draft).await.unwrap();

        assert_eq!(list(&mut conn, None).await.unwrap().len(), 1);
        assert_eq!(
            list(&mut conn, Some(FinanceStatus::NotSubmitted))
                .await
                .unwrap()
                .len(),
            1
        );
        assert!(list(&mut conn, Some(FinanceStatus::Paid))
            .await
            .unwrap()
            .is_empty());
    }
}
