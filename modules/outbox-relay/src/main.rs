use axum::{routing::get, Json, Router};
use event_bus::{EventBus, InMemoryBus, NatsBus};
use outbox::{
    payload_field_resolver, ChangeFeed, OutboxPublisher, PgNotifyFeed, PollFeed, PublisherConfig,
};
use sqlx::postgres::PgPoolOptions;
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tracing_subscriber::EnvFilter;

mod config;

use config::Config;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let config = Config::from_env()?;

    tracing::info!("Connecting to database...");
    let pool = PgPoolOptions::new()
        .max_connections(5)
        .connect(&config.database_url)
        .await?;

    tracing::info!("Running migrations...");
    sqlx::migrate!("./db/migrations").run(&pool).await?;

    let bus: Arc<dyn EventBus> = match config.bus_type.to_lowercase().as_str() {
        "inmemory" => {
            tracing::info!("Using InMemory event bus");
            Arc::new(InMemoryBus::new())
        }
        "nats" => {
            tracing::info!("Connecting to NATS at {}", config.nats_url);
            let client = async_nats::connect(&config.nats_url).await?;
            Arc::new(NatsBus::new(client))
        }
        other => anyhow::bail!("Invalid BUS_TYPE: {other}. Must be 'inmemory' or 'nats'"),
    };

    let (shutdown_tx, shutdown_rx) = tokio::sync::watch::channel(false);

    // Every catalog event payload carries the product id; it doubles as
    // the broker partition key.
    let resolver = payload_field_resolver("product_id");
    let publisher = OutboxPublisher::new(pool.clone(), bus, resolver).with_config(PublisherConfig {
        batch_size: config.batch_size,
        initial_backoff: config.initial_backoff,
        max_backoff: config.max_backoff,
        max_row_attempts: config.max_row_attempts,
    });

    let feeds: Vec<Box<dyn ChangeFeed>> = vec![
        Box::new(PgNotifyFeed::new(pool.clone())),
        Box::new(PollFeed::new(config.poll_interval)),
    ];

    let publisher_task = tokio::spawn(async move {
        tracing::info!("Starting outbox publisher...");
        if let Err(e) = publisher.run(feeds, shutdown_rx).await {
            tracing::error!("Outbox publisher error: {e}");
        }
    });

    let app = Router::new().route("/api/health", get(health)).layer(
        CorsLayer::new()
            .allow_origin(tower_http::cors::Any)
            .allow_methods(tower_http::cors::Any)
            .allow_headers(tower_http::cors::Any),
    );

    let addr: SocketAddr = format!("{}:{}", config.host, config.port).parse()?;
    tracing::info!("Outbox relay listening on {addr}");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    let server = tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, app).await {
            tracing::error!("Health server failed: {e}");
        }
    });

    tokio::signal::ctrl_c().await?;
    tracing::info!("Shutdown signal received");

    // Flip the watch; the publisher finishes the row in flight and exits.
    let _ = shutdown_tx.send(true);
    let _ = publisher_task.await;
    server.abort();

    Ok(())
}

async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "healthy",
        "module": "outbox-relay",
        "version": env!("CARGO_PKG_VERSION")
    }))
}
