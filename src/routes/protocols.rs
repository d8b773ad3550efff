use axum::{
    extract::{Path, Query, State},
    Json,
};
use serde::Deserialize;
use std::sync::Arc;
use uuid::Uuid;

use super::Actor;
use crate::error::Result;
use crate::models::{ArchivedProtocol, FinanceStatus, Protocol};
use crate::workflow::{PaymentOutcome, ProtocolSignOutcome};
use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct ListQuery {
    pub finance_status: Option<FinanceStatus>,
}

pub async fn list(
    State(state): State<Arc<AppState>>,
    Query(query): Query<ListQuery>,
) -> Result<Json<Vec<Protocol>>> {
    Ok(Json(state.engine.list_protocols(query.finance_status).await?))
}

pub async fn get(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<Protocol>> {
    Ok(Json(state.engine.get_protocol(id).await?))
}

pub async fn sign(
    State(state): State<Arc<AppState>>,
    Actor(actor): Actor,
    Path(id): Path<Uuid>,
) -> Result<Json<ProtocolSignOutcome>> {
    Ok(Json(state.engine.sign_protocol(actor, id).await?))
}

pub async fn assign_number(
    State(state): State<Arc<AppState>>,
    Actor(actor): Actor,
    Path(id): Path<Uuid>,
) -> Result<Json<Protocol>> {
    Ok(Json(state.engine.assign_number(actor, id).await?))
}

pub async fn submit(
    State(state): State<Arc<AppState>>,
    Actor(actor): Actor,
    Path(id): Path<Uuid>,
) -> Result<Json<Protocol>> {
    Ok(Json(state.engine.submit_to_finance(actor, id).await?))
}

pub async fn pay(
    State(state): State<Arc<AppState>>,
    Actor(actor): Actor,
    Path(id): Path<Uuid>,
) -> Result<Json<PaymentOutcome>> {
    Ok(Json(state.engine.mark_paid(actor, id).await?))
}

pub async fn list_archive(State(state): State<Arc<AppState>>) -> Result<Json<Vec<ArchivedProtocol>>> {
    Ok(Json(state.engine.list_archive().await?))
}

pub async fn get_archived(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<ArchivedProtocol>> {
    Ok(Json(state.engine.get_archived(id).await?))
}
