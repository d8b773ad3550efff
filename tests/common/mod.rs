//! Shared fixtures for integration tests

#![allow(dead_code)]

use async_trait::async_trait;
use procurement::error::Result;
use procurement::models::{NewRequest, NewRequestItem, RequestKind};
use procurement::notify::MessageTransport;
use procurement::rules::ApprovalRules;
use procurement::store::Store;
use procurement::workflow::WorkflowEngine;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::SqlitePool;
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;

pub async fn setup_pool() -> SqlitePool {
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .idle_timeout(None)
        .max_lifetime(None)
        .connect("sqlite::memory:")
        .await
        .expect("Failed to create in-memory database");

    sqlx::migrate!("./migrations")
        .run(&pool)
        .await
        .expect("Failed to run migrations");

    pool
}

/// File-backed pool with several connections, so transactions really overlap
pub async fn setup_file_pool(dir: &Path, connections: u32) -> SqlitePool {
    let options = SqliteConnectOptions::new()
        .filename(dir.join("procurement.db"))
        .create_if_missing(true)
        .busy_timeout(Duration::from_secs(10));
    let pool = SqlitePoolOptions::new()
        .max_connections(connections)
        .connect_with(options)
        .await
        .expect("Failed to create file database");

    sqlx::migrate!("./migrations")
        .run(&pool)
        .await
        .expect("Failed to run migrations");

    pool
}

/// Transport that remembers what it was asked to send
#[derive(Default)]
pub struct RecordingTransport {
    pub sent: Mutex<Vec<(i64, String)>>,
}

impl RecordingTransport {
    pub fn messages(&self) -> Vec<(i64, String)> {
        self.sent.lock().unwrap().clone()
    }
}

#[async_trait]
impl MessageTransport for RecordingTransport {
    async fn send(&self, chat_id: i64, text: &str) -> Result<()> {
        self.sent.lock().unwrap().push((chat_id, text.to_string()));
        Ok(())
    }
}

pub async fn setup_engine() -> (WorkflowEngine, Arc<RecordingTransport>) {
    setup_engine_with(ApprovalRules::default()).await
}

pub async fn setup_engine_with(rules: ApprovalRules) -> (WorkflowEngine, Arc<RecordingTransport>) {
    let pool = setup_pool().await;
    let transport = Arc::new(RecordingTransport::default());
    let engine = WorkflowEngine::new(Store::new(pool), rules, transport.clone());
    (engine, transport)
}

pub async fn setup_file_engine(
    dir: &Path,
    connections: u32,
) -> (WorkflowEngine, Arc<RecordingTransport>) {
    let pool = setup_file_pool(dir, connections).await;
    let transport = Arc::new(RecordingTransport::default());
    let engine = WorkflowEngine::new(Store::new(pool), ApprovalRules::default(), transport.clone());
    (engine, transport)
}

pub fn new_request(kind: RequestKind) -> NewRequest {
    NewRequest {
        title: "Картриджи для принтеров".to_string(),
        kind,
        category: "Оргтехника".to_string(),
        items: vec![
            NewRequestItem {
                name: "Картридж HP 85A".to_string(),
                quantity: 10.0,
                unit: "шт".to_string(),
                estimated_price: Some(2500.0),
            },
            NewRequestItem {
                name: "Бумага A4".to_string(),
                quantity: 5.0,
                unit: "пачка".to_string(),
                estimated_price: Some(400.0),
            },
        ],
    }
}
