use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use serde::Deserialize;
use std::sync::Arc;
use uuid::Uuid;

use super::Actor;
use crate::error::Result;
use crate::models::{NewRequest, Request, RequestStatus};
use crate::workflow::RequestSignOutcome;
use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct ListQuery {
    pub status: Option<RequestStatus>,
}

pub async fn list(
    State(state): State<Arc<AppState>>,
    Query(query): Query<ListQuery>,
) -> Result<Json<Vec<Request>>> {
    Ok(Json(state.engine.list_requests(query.status).await?))
}

pub async fn create(
    State(state): State<Arc<AppState>>,
    Actor(actor): Actor,
    Json(input): Json<NewRequest>,
) -> Result<(StatusCode, Json<Request>)> {
    let request = state.engine.create_request(actor, input).await?;
    Ok((StatusCode::CREATED, Json(request)))
}

pub async fn get(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<Request>> {
    Ok(Json(state.engine.get_request(id).await?))
}

pub async fn sign(
    State(state): State<Arc<AppState>>,
    Actor(actor): Actor,
    Path(id): Path<Uuid>,
) -> Result<Json<RequestSignOutcome>> {
    Ok(Json(state.engine.sign_request(actor, id).await?))
}

pub async fn cancel(
    State(state): State<Arc<AppState>>,
    Actor(actor): Actor,
    Path(id): Path<Uuid>,
) -> Result<Json<Request>> {
    Ok(Json(state.engine.cancel_request(actor, id).await?))
}
