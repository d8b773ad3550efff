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
use crate::models::{NewSupplier, SelectWinner, Supplier, SupplierPatch, Tender, TenderStatus};
use crate::workflow::WinnerOutcome;
use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct ListQuery {
    pub status: Option<TenderStatus>,
}

pub async fn list(
    State(state): State<Arc<AppState>>,
    Query(query): Query<ListQuery>,
) -> Result<Json<Vec<Tender>>> {
    Ok(Json(state.engine.list_tenders(query.status).await?))
}

pub async fn get(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<Tender>> {
    Ok(Json(state.engine.get_tender(id).await?))
}

pub async fn add_supplier(
    State(state): State<Arc<AppState>>,
    Actor(actor): Actor,
    Path(id): Path<Uuid>,
    Json(input): Json<NewSupplier>,
) -> Result<(StatusCode, Json<Supplier>)> {
    let supplier = state.engine.add_supplier(actor, id, input).await?;
    Ok((StatusCode::CREATED, Json(supplier)))
}

pub async fn update_supplier(
    State(state): State<Arc<AppState>>,
    Actor(actor): Actor,
    Path(id): Path<Uuid>,
    Json(patch): Json<SupplierPatch>,
) -> Result<Json<Supplier>> {
    Ok(Json(state.engine.update_supplier(actor, id, patch).await?))
}

pub async fn delete_supplier(
    State(state): State<Arc<AppState>>,
    Actor(actor): Actor,
    Path(id): Path<Uuid>,
) -> Result<StatusCode> {
    state.engine.delete_supplier(actor, id).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn select_winner(
    State(state): State<Arc<AppState>>,
    Actor(actor): Actor,
    Path(id): Path<Uuid>,
    Json(choice): Json<SelectWinner>,
) -> Result<Json<WinnerOutcome>> {
    Ok(Json(state.engine.select_winner(actor, id, choice).await?))
}

pub async fn cancel(
    State(state): State<Arc<AppState>>,
    Actor(actor): Actor,
    Path(id): Path<Uuid>,
) -> Result<Json<Tender>> {
    Ok(Json(state.engine.cancel_tender(actor, id).await?))
}
