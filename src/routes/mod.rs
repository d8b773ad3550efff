//! JSON REST API
//!
//! The acting user comes from the `x-user-id` header. Authentication
//! happens in front of this service; we only read the identity.

mod directory;
mod protocols;
mod requests;
mod tenders;

use axum::{
    async_trait,
    extract::FromRequestParts,
    http::request::Parts,
    routing::{get, patch, post, put},
    Router,
};
use std::sync::Arc;
use uuid::Uuid;

use crate::error::AppError;
use crate::AppState;

pub const USER_HEADER: &str = "x-user-id";

/// The user performing the request
#[derive(Debug, Clone, Copy)]
pub struct Actor(pub Uuid);

#[async_trait]
impl<S> FromRequestParts<S> for Actor
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let value = parts
            .headers
            .get(USER_HEADER)
            .ok_or_else(|| AppError::Unauthorized("Не указан пользователь".to_string()))?;
        let raw = value
            .to_str()
            .map_err(|_| AppError::Unauthorized("Некорректный идентификатор пользователя".to_string()))?;
        Uuid::parse_str(raw.trim())
            .map(Actor)
            .map_err(|_| AppError::Unauthorized("Некорректный идентификатор пользователя".to_string()))
    }
}

pub fn api() -> Router<Arc<AppState>> {
    Router::new()
        .route("/requests", get(requests::list).post(requests::create))
        .route("/requests/:id", get(requests::get))
        .route("/requests/:id/sign", post(requests::sign))
        .route("/requests/:id/cancel", post(requests::cancel))
        .route("/tenders", get(tenders::list))
        .route("/tenders/:id", get(tenders::get))
        .route("/tenders/:id/suppliers", post(tenders::add_supplier))
        .route("/tenders/:id/winner", post(tenders::select_winner))
        .route("/tenders/:id/cancel", post(tenders::cancel))
        .route(
            "/suppliers/:id",
            patch(tenders::update_supplier).delete(tenders::delete_supplier),
        )
        .route("/protocols", get(protocols::list))
        .route("/protocols/:id", get(protocols::get))
        .route("/protocols/:id/sign", post(protocols::sign))
        .route("/protocols/:id/number", post(protocols::assign_number))
        .route("/protocols/:id/submit", post(protocols::submit))
        .route("/protocols/:id/pay", post(protocols::pay))
        .route("/archive", get(protocols::list_archive))
        .route("/archive/:id", get(protocols::get_archived))
        .route("/calendar", get(directory::calendar))
        .route("/tasks", get(directory::tasks))
        .route("/notifications", get(directory::notifications))
        .route("/notifications/:id/read", post(directory::mark_read))
        .route("/users", get(directory::users))
        .route("/users/:id", put(directory::upsert_user))
        .route("/audit/:kind/:id", get(directory::audit))
}
