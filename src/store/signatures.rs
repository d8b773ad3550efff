//! Signatures on requests and protocols

use chrono::{DateTime, Utc};
use sqlx::SqliteConnection;
use uuid::Uuid;

use super::parse_uuid;
use crate::error::Result;
use crate::models::{EntityKind, Signature};
use crate::quorum::SignatureSet;

/// Insert a signature. Returns false when this user already signed the entity.
pub async fn insert(
    conn: &mut SqliteConnection,
    kind: EntityKind,
    entity_id: Uuid,
    user_id: Uuid,
    at: DateTime<Utc>,
) -> Result<bool> {
    let result = sqlx::query(
        r#"
        INSERT OR IGNORE INTO signatures (entity_kind, entity_id, user_id, signed_at)
        VALUES (?, ?, ?, ?)
        "#,
    )
    .bind(kind.as_str())
    .bind(entity_id.to_string())
    .bind(user_id.to_string())
    .bind(at)
    .execute(&mut *conn)
    .await?;

    Ok(result.rows_affected() == 1)
}

pub async fn list(
    conn: &mut SqliteConnection,
    kind: EntityKind,
    entity_id: Uuid,
) -> Result<Vec<Signature>> {
    let rows = sqlx::query_as::<_, SignatureRow>(
        r#"
        SELECT user_id, signed_at
        FROM signatures
        WHERE entity_kind = ? AND entity_id = ?
        ORDER BY signed_at ASC
        "#,
    )
    .bind(kind.as_str())
    .bind(entity_id.to_string())
    .fetch_all(&mut *conn)
    .await?;

    rows.into_iter().map(|r| r.try_into()).collect()
}

pub async fn load_set(
    conn: &mut SqliteConnection,
    kind: EntityKind,
    entity_id: Uuid,
) -> Result<SignatureSet> {
    Ok(list(conn, kind, entity_id).await?.into_iter().collect())
}

#[derive(sqlx::FromRow)]
struct SignatureRow {
    user_id: String,
    signed_at: DateTime<Utc>,
}

impl TryFrom<SignatureRow> for Signature {
    type Error = crate::error::AppError;

    fn try_from(row: SignatureRow) -> Result<Self> {
        Ok(Signature {
            user_id: parse_uuid(&row.user_id, "user_id")?,
            signed_at: row.signed_at,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::test_support::setup_test_db;

    #[tokio::test]
    async fn test_insert_is_idempotent() {
        let store = setup_test_db().await;
        let mut conn = store.conn().await.unwrap();
        let entity = Uuid::new_v4();
        let user = Uuid::new_v4();

        assert!(insert(&mut conn, EntityKind::Request, entity, user, Utc::now())
            .await
            .unwrap());
        assert!(!insert(&mut conn, EntityKind::Request, entity, user, Utc::now())
            .await
            .unwrap());

        let sigs = list(&mut conn, EntityKind::Request, entity).await.unwrap();
        assert_eq!(sigs.len(), 1);
        assert_eq!(sigs[0].user_id, user);
    }

    #[tokio::test]
    async fn test_signatures_scoped_by_kind() {
        let store = setup_test_db().await;
        let mut conn = store.conn().await.unwrap();
        let entity = Uuid::new_v4();
        let user = Uuid::new_v4();

        insert(&mut conn, EntityKind::Request, entity, user, Utc::now())
            .await
            .unwrap();
        assert!(insert(&mut conn, EntityKind::Protocol, entity, user, Utc::now())
            .await
            .unwrap());

        let set = load_set(&mut conn, EntityKind::Protocol, entity).await.unwrap();
        assert_eq!(set.len(), 1);
    }
}
