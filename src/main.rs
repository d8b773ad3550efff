//! Procurement workflow server

use clap::Parser;
use sqlx::sqlite::SqlitePoolOptions;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use procurement::config::Config;
use procurement::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "procurement=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::parse();

    let pool = SqlitePoolOptions::new()
        .max_connections(config.max_connections)
        .connect_with(config.connect_options()?)
        .await?;

    sqlx::migrate!("./migrations").run(&pool).await?;

    let rules = config.load_rules()?;
    tracing::info!(
        request_signers = rules.request_signers.len(),
        protocol_signers = rules.protocol_signers.len(),
        "approval rules loaded"
    );
    let transport = config.transport()?;
    let state = AppState::new(pool, rules, transport);

    let app = procurement::router(state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive());

    let listener = tokio::net::TcpListener::bind(config.bind_addr).await?;
    tracing::info!("Server listening on {}", listener.local_addr()?);

    axum::serve(listener, app).await?;

    Ok(())
}
