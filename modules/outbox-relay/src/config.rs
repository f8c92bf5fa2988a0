use std::env;
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub bus_type: String,
    pub nats_url: String,
    pub host: String,
    pub port: u16,

    pub poll_interval: Duration,
    pub batch_size: i64,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
    pub max_row_attempts: i32,
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();

        Ok(Self {
            database_url: env::var("DATABASE_URL")?,
            bus_type: env::var("BUS_TYPE").unwrap_or_else(|_| "inmemory".to_string()),
            nats_url: env::var("NATS_URL")
                .unwrap_or_else(|_| "nats://localhost:4222".to_string()),

            host: env::var("HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
            port: env::var("PORT")
                .unwrap_or_else(|_| "8091".to_string())
                .parse()?,

            poll_interval: Duration::from_millis(
                env::var("OUTBOX_POLL_INTERVAL_MS")
                    .unwrap_or_else(|_| "1000".to_string())
                    .parse()?,
            ),
            batch_size: env::var("OUTBOX_BATCH_SIZE")
                .unwrap_or_else(|_| "100".to_string())
                .parse()?,
            initial_backoff: Duration::from_millis(
                env::var("OUTBOX_INITIAL_BACKOFF_MS")
                    .unwrap_or_else(|_| "200".to_string())
                    .parse()?,
            ),
            max_backoff: Duration::from_millis(
                env::var("OUTBOX_MAX_BACKOFF_MS")
                    .unwrap_or_else(|_| "30000".to_string())
                    .parse()?,
            ),
            max_row_attempts: env::var("OUTBOX_MAX_ROW_ATTEMPTS")
                .unwrap_or_else(|_| "5".to_string())
                .parse()?,
        })
    }
}
