//! Procurement workflow server - requests, tenders, protocols, finance and archive

pub mod config;
pub mod documents;
pub mod error;
pub mod models;
pub mod notify;
pub mod quorum;
pub mod routes;
pub mod rules;
pub mod store;
pub mod websocket;
pub mod workflow;

use axum::{routing::get, Router};
use sqlx::SqlitePool;
use std::sync::Arc;

use crate::notify::MessageTransport;
use crate::rules::ApprovalRules;
use crate::workflow::WorkflowEngine;

/// Application state shared across handlers
pub struct AppState {
    pub engine: WorkflowEngine,
}

impl AppState {
    pub fn new(
        pool: SqlitePool,
        rules: ApprovalRules,
        transport: Arc<dyn MessageTransport>,
    ) -> Arc<Self> {
        Arc::new(Self {
            engine: WorkflowEngine::new(store::Store::new(pool), rules, transport),
        })
    }
}

/// Full application router without transport layers
pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(health))
        .nest("/api", routes::api())
        .route("/ws", get(websocket::handler))
        .with_state(state)
}

async fn health() -> &'static str {
    "ok"
}
