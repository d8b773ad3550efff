//! Per-user views, the user directory, calendar and audit log

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use chrono::NaiveDate;
use serde::Deserialize;
use std::sync::Arc;
use uuid::Uuid;

use super::Actor;
use crate::error::{AppError, Result};
use crate::models::{
    AuditEntry, CalendarEvent, EntityKind, Notification, Task, TaskStatus, UpsertUser, User,
};
use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct CalendarQuery {
    pub from: Option<NaiveDate>,
    pub to: Option<NaiveDate>,
}

pub async fn calendar(
    State(state): State<Arc<AppState>>,
    Query(query): Query<CalendarQuery>,
) -> Result<Json<Vec<CalendarEvent>>> {
    Ok(Json(state.engine.list_calendar(query.from, query.to).await?))
}

#[derive(Debug, Deserialize)]
pub struct TasksQuery {
    pub status: Option<TaskStatus>,
}

pub async fn tasks(
    State(state): State<Arc<AppState>>,
    Actor(actor): Actor,
    Query(query): Query<TasksQuery>,
) -> Result<Json<Vec<Task>>> {
    Ok(Json(state.engine.list_tasks(actor, query.status).await?))
}

#[derive(Debug, Deserialize)]
pub struct NotificationsQuery {
    #[serde(default)]
    pub unread: bool,
}

pub async fn notifications(
    State(state): State<Arc<AppState>>,
    Actor(actor): Actor,
    Query(query): Query<NotificationsQuery>,
) -> Result<Json<Vec<Notification>>> {
    Ok(Json(
        state.engine.list_notifications(actor, query.unread).await?,
    ))
}

pub async fn mark_read(
    State(state): State<Arc<AppState>>,
    Actor(actor): Actor,
    Path(id): Path<Uuid>,
) -> Result<StatusCode> {
    state.engine.mark_notification_read(actor, id).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn users(State(state): State<Arc<AppState>>) -> Result<Json<Vec<User>>> {
    Ok(Json(state.engine.list_users().await?))
}

/// Users maintain their own directory entry
pub async fn upsert_user(
    State(state): State<Arc<AppState>>,
    Actor(actor): Actor,
    Path(id): Path<Uuid>,
    Json(input): Json<UpsertUser>,
) -> Result<Json<User>> {
    if actor != id {
        return Err(AppError::Forbidden(
            "Можно изменять только свой профиль".to_string(),
        ));
    }
    if input.full_name.trim().is_empty() {
        return Err(AppError::BadRequest("Укажите имя пользователя".to_string()));
    }
    Ok(Json(state.engine.upsert_user(id, input).await?))
}

pub async fn audit(
    State(state): State<Arc<AppState>>,
    Path((kind, id)): Path<(String, Uuid)>,
) -> Result<Json<Vec<AuditEntry>>> {
    let kind: EntityKind = kind.parse().map_err(AppError::BadRequest)?;
    Ok(Json(state.engine.audit_log(kind, id).await?))
}
