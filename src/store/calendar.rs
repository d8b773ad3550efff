//! Calendar events

use chrono::{DateTime, NaiveDate, Utc};
use sqlx::SqliteConnection;
use uuid::Uuid;

use super::{parse_opt_uuid, parse_uuid};
use crate::error::{AppError, Result};
use crate::models::CalendarEvent;

pub async fn insert(
    conn: &mut SqliteConnection,
    title: &str,
    date: NaiveDate,
    protocol_id: Option<Uuid>,
) -> Result<CalendarEvent> {
    let id = Uuid::new_v4();
    let now = Utc::now();

    sqlx::query(
        r#"
        INSERT INTO calendar_events (id, title, date, protocol_id, created_at)
        VALUES (?, ?, ?, ?, ?)
        "#,
    )
    .bind(id.to_string())
    .bind(title)
    .bind(date)
    .bind(protocol_id.map(|u| u.to_string()))
    .bind(now)
    .execute(&mut *conn)
    .await?;

    Ok(CalendarEvent {
        id,
        title: title.to_string(),
        date,
        protocol_id,
        created_at: now,
    })
}

/// Events in `[from, to]`, both optional
pub async fn list(
    conn: &mut SqliteConnection,
    from: Option<NaiveDate>,
    to: Option<NaiveDate>,
) -> Result<Vec<CalendarEvent>> {
    let rows = sqlx::query_as::<_, CalendarRow>(
        r#"
        SELECT id, title, date, protocol_id, created_at
        FROM calendar_events
        WHERE (? IS NULL OR date >= ?) AND (? IS NULL OR date <= ?)
        ORDER BY date ASC
        "#,
    )
    .bind(from)
    .bind(from)
    .bind(to)
    .bind(to)
    .fetch_all(&mut *conn)
    .await?;

    rows.into_iter().map(|r| r.try_into()).collect()
}

#[derive(sqlx::FromRow)]
struct CalendarRow {
    id: String,
    title: String,
    date: NaiveDate,
    protocol_id: Option<String>,
    created_at: DateTime<Utc>,
}

impl TryFrom<CalendarRow> for CalendarEvent {
    type Error = AppError;

    fn try_from(row: CalendarRow) -> Result<Self> {
        Ok(CalendarEvent {
            id: parse_uuid(&row.id, "calendar event id")?,
            title: row.title,
            date: row.date,
            protocol_id: parse_opt_uuid(row.protocol_id, "protocol_id")?,
            created_at: row.created_at,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::test_support::setup_test_db;

    #[tokio::test]
    async fn test_list_range() {
        let store = setup_test_db().await;
        let mut conn = store.conn().await.unwrap();
        let day = |d| NaiveDate::from_ymd_opt(2026, 3, d).unwrap();

        insert(&mut conn, "early", day(1), None).await.unwrap();
        insert(&mut conn, "middle", day(15), None).await.unwrap();
        insert(&mut conn, "late", day(30), None).await.unwrap();

        let all = list(&mut conn, None, None).await.unwrap();
        assert_eq!(all.len(), 3);
        assert_eq!(all[0].title, "early");

        let window = list(&mut conn, Some(day(10)), Some(day(20))).await.unwrap();
        assert_eq!(window.len(), 1);
        assert_eq!(window[0].title, "middle");
    }
}
