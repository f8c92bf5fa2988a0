use std::env;
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub bus_type: String,
    pub nats_url: String,
    pub elasticsearch_url: String,
    pub host: String,
    pub port: u16,

    pub index_shards: u32,
    pub index_replicas: u32,
    pub index_refresh_interval: String,

    pub max_attempts: u32,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();

        Ok(Self {
            database_url: env::var("DATABASE_URL")?,
            bus_type: env::var("BUS_TYPE").unwrap_or_else(|_| "inmemory".to_string()),
            nats_url: env::var("NATS_URL")
                .unwrap_or_else(|_| "nats://localhost:4222".to_string()),
            elasticsearch_url: env::var("ELASTICSEARCH_URL")
                .unwrap_or_else(|_| "http://localhost:9200".to_string()),

            host: env::var("HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
            port: env::var("PORT")
                .unwrap_or_else(|_| "8092".to_string())
                .parse()?,

            index_shards: env::var("SEARCH_INDEX_SHARDS")
                .unwrap_or_else(|_| "3".to_string())
                .parse()?,
            index_replicas: env::var("SEARCH_INDEX_REPLICAS")
                .unwrap_or_else(|_| "1".to_string())
                .parse()?,
            index_refresh_interval: env::var("SEARCH_INDEX_REFRESH_INTERVAL")
                .unwrap_or_else(|_| "30s".to_string()),

            max_attempts: env::var("SYNC_MAX_ATTEMPTS")
                .unwrap_or_else(|_| "3".to_string())
                .parse()?,
            initial_backoff: Duration::from_millis(
                env::var("SYNC_INITIAL_BACKOFF_MS")
                    .unwrap_or_else(|_| "100".to_string())
                    .parse()?,
            ),
            max_backoff: Duration::from_millis(
                env::var("SYNC_MAX_BACKOFF_MS")
                    .unwrap_or_else(|_| "30000".to_string())
                    .parse()?,
            ),
        })
    }
}
