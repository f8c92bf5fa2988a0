use axum::{routing::get, Json, Router};
use catalog_search::{IndexManager, IndexSettings, SearchClient};
use event_bus::consumer_retry::RetryConfig;
use event_bus::{EventBus, InMemoryBus, NatsBus};
use search_sync::config::Config;
use search_sync::consumer::run_consumer;
use search_sync::handlers::EventHandlerRegistry;
use sqlx::postgres::PgPoolOptions;
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tracing_subscriber::EnvFilter;

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

    let search = SearchClient::new(&config.elasticsearch_url)?;

    // The index must exist with the right schema before any event is
    // consumed. A schema failure here is fatal: projecting into a
    // misconfigured index would corrupt search results silently.
    let mut index_manager = IndexManager::new(
        Arc::new(search.clone()),
        IndexSettings {
            number_of_shards: config.index_shards,
            number_of_replicas: config.index_replicas,
            refresh_interval: config.index_refresh_interval.clone(),
        },
    );
    index_manager.ensure_index().await?;
    let index_name = index_manager.index_name().to_string();
    tracing::info!(index = %index_name, "Search index ready");

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

    let registry = EventHandlerRegistry::catalog(Arc::new(search), index_name);
    let retry = RetryConfig {
        max_attempts: config.max_attempts,
        initial_backoff: config.initial_backoff,
        max_backoff: config.max_backoff,
    };

    let consumer_pool = pool.clone();
    let consumer_bus = bus.clone();
    let consumer_task = tokio::spawn(async move {
        tracing::info!("Starting search sync consumer...");
        if let Err(e) = run_consumer(consumer_bus, consumer_pool, registry, retry, shutdown_rx).await
        {
            tracing::error!("Search sync consumer error: {e}");
        }
    });

    let app = Router::new().route("/api/health", get(health)).layer(
        CorsLayer::new()
            .allow_origin(tower_http::cors::Any)
            .allow_methods(tower_http::cors::Any)
            .allow_headers(tower_http::cors::Any),
    );

    let addr: SocketAddr = format!("{}:{}", config.host, config.port).parse()?;
    tracing::info!("Search sync listening on {addr}");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    let server = tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, app).await {
            tracing::error!("Health server failed: {e}");
        }
    });

    tokio::signal::ctrl_c().await?;
    tracing::info!("Shutdown signal received");

    // Flip the watch; the consumer finishes the message in flight and exits.
    let _ = shutdown_tx.send(true);
    let _ = consumer_task.await;
    server.abort();

    Ok(())
}

async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "healthy",
        "module": "search-sync",
        "version": env!("CARGO_PKG_VERSION")
    }))
}
