//! Tenders and supplier offers

use chrono::{DateTime, Utc};
use sqlx::SqliteConnection;
use uuid::Uuid;

use super::{parse_field, parse_opt_uuid, parse_uuid};
use crate::error::{AppError, Result};
use crate::models::{NewSupplier, Request, Supplier, SupplierPatch, Tender, TenderStatus};

/// Open a tender for a signed transfer request
pub async fn insert_from_request(conn: &mut SqliteConnection, request: &Request) -> Result<Tender> {
    let id = Uuid::new_v4();
    let now = Utc::now();

    sqlx::query(
        r#"
        INSERT INTO tenders (id, request_id, title, category, status, created_at)
        VALUES (?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(id.to_string())
    .bind(request.id.to_string())
    .bind(&request.title)
    .bind(&request.category)
    .bind(TenderStatus::Active.as_str())
    .bind(now)
    .execute(&mut *conn)
    .await?;

    Ok(Tender {
        id,
        request_id: request.id,
        title: request.title.clone(),
        category: request.category.clone(),
        status: TenderStatus::Active,
        suppliers: Vec::new(),
        winner_id: None,
        reserve_winner_id: None,
        created_at: now,
        completed_at: None,
    })
}

pub async fn get(conn: &mut SqliteConnection, id: Uuid) -> Result<Tender> {
    let row = sqlx::query_as::<_, TenderRow>(
        r#"
        SELECT id, request_id, title, category, status, winner_id, reserve_winner_id, created_at, completed_at
        FROM tenders
        WHERE id = ?
        "#,
    )
    .bind(id.to_string())
    .fetch_optional(&mut *conn)
    .await?
    .ok_or_else(|| AppError::NotFound(format!("Tender {} not found", id)))?;

    hydrate(conn, row).await
}

pub async fn list(conn: &mut SqliteConnection, status: Option<TenderStatus>) -> Result<Vec<Tender>> {
    let rows = sqlx::query_as::<_, TenderRow>(
        r#"
        SELECT id, request_id, title, category, status, winner_id, reserve_winner_id, created_at, completed_at
        FROM tenders
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

/// Mark an active tender completed with its winner. False if it was not active.
pub async fn complete(
    conn: &mut SqliteConnection,
    id: Uuid,
    winner_id: Uuid,
    reserve_winner_id: Option<Uuid>,
) -> Result<bool> {
    let result = sqlx::query(
        r#"
        UPDATE tenders
        SET status = ?, winner_id = ?, reserve_winner_id = ?, completed_at = ?
        WHERE id = ? AND status = ?
        "#,
    )
    .bind(TenderStatus::Completed.as_str())
    .bind(winner_id.to_string())
    .bind(reserve_winner_id.map(|u| u.to_string()))
    .bind(Utc::now())
    .bind(id.to_string())
    .bind(TenderStatus::Active.as_str())
    .execute(&mut *conn)
    .await?;

    Ok(result.rows_affected() == 1)
}

pub async fn cancel(conn: &mut SqliteConnection, id: Uuid) -> Result<bool> {
    let result = sqlx::query(
        r#"
        UPDATE tenders SET status = ?, completed_at = ? WHERE id = ? AND status = ?
        "#,
    )
    .bind(TenderStatus::Cancelled.as_str())
    .bind(Utc::now())
    .bind(id.to_string())
    .bind(TenderStatus::Active.as_str())
    .execute(&mut *conn)
    .await?;

    Ok(result.rows_affected() == 1)
}

// Supplier offers

pub async fn insert_supplier(
    conn: &mut SqliteConnection,
    tender_id: Uuid,
    input: &NewSupplier,
    created_by: Uuid,
) -> Result<Supplier> {
    let id = Uuid::new_v4();
    let now = Utc::now();

    sqlx::query(
        r#"
        INSERT INTO suppliers (id, tender_id, company_name, price, price_per_unit, proposal_url, created_by, created_at, updated_at)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(id.to_string())
    .bind(tender_id.to_string())
    .bind(&input.company_name)
    .bind(input.price)
    .bind(input.price_per_unit)
    .bind(&input.proposal_url)
    .bind(created_by.to_string())
    .bind(now)
    .bind(now)
    .execute(&mut *conn)
    .await?;

    Ok(Supplier {
        id,
        tender_id,
        company_name: input.company_name.clone(),
        price: input.price,
        price_per_unit: input.price_per_unit,
        proposal_url: input.proposal_url.clone(),
        created_by,
        created_at: now,
        updated_at: now,
    })
}

pub async fn get_supplier(conn: &mut SqliteConnection, id: Uuid) -> Result<Supplier> {
    let row = sqlx::query_as::<_, SupplierRow>(
        r#"
        SELECT id, tender_id, company_name, price, price_per_unit, proposal_url, created_by, created_at, updated_at
        FROM suppliers
        WHERE id = ?
        "#,
    )
    .bind(id.to_string())
    .fetch_optional(&mut *conn)
    .await?
    .ok_or_else(|| AppError::NotFound(format!("Supplier {} not found", id)))?;

    row.try_into()
}

pub async fn list_suppliers(conn: &mut SqliteConnection, tender_id: Uuid) -> Result<Vec<Supplier>> {
    let rows = sqlx::query_as::<_, SupplierRow>(
        r#"
        SELECT id, tender_id, company_name, price, price_per_unit, proposal_url, created_by, created_at, updated_at
        FROM suppliers
        WHERE tender_id = ?
        ORDER BY price ASC, created_at ASC
        "#,
    )
    .bind(tender_id.to_string())
    .fetch_all(&mut *conn)
    .await?;

    rows.into_iter().map(|r| r.try_into()).collect()
}

/// Apply a patch and return the updated offer
pub async fn update_supplier(
    conn: &mut SqliteConnection,
    id: Uuid,
    patch: &SupplierPatch,
) -> Result<Supplier> {
    let mut supplier = get_supplier(conn, id).await?;
    if let Some(name) = &patch.company_name {
        supplier.company_name = name.clone();
    }
    if let Some(price) = patch.price {
        supplier.price = price;
    }
    if patch.price_per_unit.is_some() {
        supplier.price_per_unit = patch.price_per_unit;
    }
    if patch.proposal_url.is_some() {
        supplier.proposal_url = patch.proposal_url.clone();
    }
    supplier.updated_at = Utc::now();

    sqlx::query(
        r#"
        UPDATE suppliers
        SET company_name = ?, price = ?, price_per_unit = ?, proposal_url = ?, updated_at = ?
        WHERE id = ?
        "#,
    )
    .bind(&supplier.company_name)
    .bind(supplier.price)
    .bind(supplier.price_per_unit)
    .bind(&supplier.proposal_url)
    .bind(supplier.updated_at)
    .bind(id.to_string())
    .execute(&mut *conn)
    .await?;

    Ok(supplier)
}

pub async fn delete_supplier(conn: &mut SqliteConnection, id: Uuid) -> Result<()> {
    sqlx::query("DELETE FROM suppliers WHERE id = ?")
        .bind(id.to_string())
        .execute(&mut *conn)
        .await?;
    Ok(())
}

async fn hydrate(conn: &mut SqliteConnection, row: TenderRow) -> Result<Tender> {
    let id = parse_uuid(&row.id, "tender id")?;
    let suppliers = list_suppliers(conn, id).await?;

    Ok(Tender {
        id,
        request_id: parse_uuid(&row.request_id, "request_id")?,
        title: row.title,
        category: row.category,
        status: parse_field(&row.status, "tender status")?,
        suppliers,
        winner_id: parse_opt_uuid(row.winner_id, "winner_id")?,
        reserve_winner_id: parse_opt_uuid(row.reserve_winner_id, "reserve_winner_id")?,
        created_at: row.created_at,
        completed_at: row.completed_at,
    })
}

#[derive(sqlx::FromRow)]
struct TenderRow {
    id: String,
    request_id: String,
    title: String,
    category: String,
    status: String,
    winner_id: Option<String>,
    reserve_winner_id: Option<String>,
    created_at: DateTime<Utc>,
    completed_at: Option<DateTime<Utc>>,
}

#[derive(sqlx::FromRow)]
struct SupplierRow {
    id: String,
    tender_id: String,
    company_name: String,
    price: f64,
    price_per_unit: Option<f64>,
    proposal_url: Option<String>,
    created_by: String,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<SupplierRow> for Supplier {
    type Error = AppError;

    fn try_from(row: SupplierRow) -> Result<Self> {
        Ok(Supplier {
            id: parse_uuid(&row.id, "supplier id")?,
            tender_id: parse_uuid(&row.tender_id, "tender_id")?,
            company_name: row.company_name,
            price: row.price,
            price_per_unit: row.price_per_unit,
            proposal_url: row.proposal_url,
            created_by: parse_uuid(&row.created_by, "created_by")?,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{NewRequest, RequestKind};
    use crate::store::requests;
    use crate::store::test_support::setup_test_db;

    async fn seeded_tender(conn: &mut SqliteConnection) -> Tender {
        let request = requests::insert(
            conn,
            &NewRequest {
                title: "Chairs".to_string(),
                kind: RequestKind::Transfer,
                category: "furniture".to_string(),
                items: vec![],
            },
            Uuid::new_v4(),
        )
        .await
        .unwrap();
        insert_from_request(conn, &request).await.unwrap()
    }

    fn offer(name: &str, price: f64) -> NewSupplier {
        NewSupplier {
            company_name: name.to_string(),
            price,
            price_per_unit: None,
            proposal_url: None,
        }
    }

    #[tokio::test]
    async fn test_suppliers_sorted_by_price() {
        let store = setup_test_db().await;
        let mut conn = store.conn().await.unwrap();
        let tender = seeded_tender(&mut conn).await;
        let author = Uuid::new_v4();

        insert_supplier(&mut conn, tender.id, &offer("Expensive LLC", 900.0), author)
            .await
            .unwrap();
        insert_supplier(&mut conn, tender.id, &offer("Cheap LLC", 500.0), author)
            .await
            .unwrap();

        let fetched = get(&mut conn, tender.id).await.unwrap();
        assert_eq!(fetched.title, "Chairs");
        assert_eq!(fetched.suppliers.len(), 2);
        assert_eq!(fetched.suppliers[0].company_name, "Cheap LLC");
    }

    #[tokio::test]
    async fn test_update_supplier_patch() {
        let store = setup_test_db().await;
        let mut conn = store.conn().await.unwrap();
        let tender = seeded_tender(&mut conn).await;
        let created = insert_supplier(&mut conn, tender.id, &offer("Acme", 100.0), Uuid::new_v4())
            .await
            .unwrap();

        let patch = SupplierPatch {
            price: Some(80.0),
            proposal_url: Some("https://files.example/acme.pdf".to_string()),
            ..SupplierPatch::default()
        };
        let updated = update_supplier(&mut conn, created.id, &patch).await.unwrap();
        assert_eq!(updated.company_name, "Acme");
        assert_eq!(updated.price, 80.0);

        let fetched = get_supplier(&mut conn, created.id).await.unwrap();
        assert_eq!(fetched.price, 80.0);
        assert_eq!(
            fetched.proposal_url.as_deref(),
            Some("https://files.example/acme.pdf")
        );
    }

    #[tokio::test]
    async fn test_complete_only_once() {
        let store = setup_test_db().await;
        let mut conn = store.conn().await.unwrap();
        let tender = seeded_tender(&mut conn).await;
        let winner = insert_supplier(&mut conn, tender.id, &offer("Acme", 100.0), Uuid::new_v4())
            .await
            .unwrap();

        assert!(complete(&mut conn, tender.id, winner.id, None).await.unwrap());
        assert!(!complete(&mut conn, tender.id, winner.id, None).await.unwrap());
        assert!(!cancel(&mut conn, tender.id).await.unwrap());

        let fetched = get(&mut conn, tender.id).await.unwrap();
        assert_eq!(fetched.status, TenderStatus::Completed);
        assert_eq!(fetched.winner_id, Some(winner.id));
    }

    #[tokio::test]
    async fn test_delete_supplier() {
        let store = setup_test_db().await;
        let mut conn = store.conn().await.unwrap();
        let tender = seeded_tender(&mut conn).await;
        let created = insert_supplier(&mut conn, tender.id, &offer("Acme", 100.0), Uuid::new_v4())
            .await
            .unwrap();

        delete_supplier(&mut conn, created.id).await.unwrap();
        assert!(matches!(
            get_supplier(&mut conn, created.id).await,
            Err(AppError::NotFound(_))
        ));
    }
}
