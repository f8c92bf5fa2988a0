//! Log-tailing publisher: drains the outbox into the event bus.

use event_bus::{event_subject, EventBus, IntegrationEvent};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;

use crate::change_feed::ChangeFeed;
use crate::store::{self, OutboxMessage};
use crate::OutboxResult;
use futures::StreamExt;

/// Extracts the partition key (subject entity id) from an event payload.
///
/// Mirrors the capture side's knowledge of payload shapes without making
/// the publisher depend on concrete event types: the hosting binary decides
/// how to find the subject id. Returning `None` marks the row malformed.
pub type SubjectResolver =
    Arc<dyn Fn(&str, &serde_json::Value) -> Option<String> + Send + Sync>;

/// Resolver that reads a top-level string field (e.g. `product_id`) from
/// the payload.
pub fn payload_field_resolver(field: &'static str) -> SubjectResolver {
    Arc::new(move |_event_type, payload| {
        payload
            .get(field)
            .and_then(|v| v.as_str())
            .map(|s| s.to_string())
    })
}

#[derive(Debug, Clone)]
pub struct PublisherConfig {
    /// Max rows fetched per drain pass
    pub batch_size: i64,
    /// Initial backoff after a failed publish (doubles per failure)
    pub initial_backoff: Duration,
    /// Cap on the publish backoff
    pub max_backoff: Duration,
    /// Drain passes a malformed row survives before it is dead-lettered
    pub max_row_attempts: i32,
}

impl Default for PublisherConfig {
    fn default() -> Self {
        Self {
            batch_size: 100,
            initial_backoff: Duration::from_millis(200),
            max_backoff: Duration::from_secs(30),
            max_row_attempts: 5,
        }
    }
}

/// Outcome of attempting one row within a drain pass.
enum RowOutcome {
    /// Broker acked and the row is marked; move to the next row.
    Published,
    /// Row was dead-lettered (malformed); the log is unblocked.
    DeadLettered,
    /// Malformed but still under the attempt budget; stop the batch so
    /// commit order is preserved until it is dead-lettered.
    Deferred,
    /// Broker or database unavailable; stop the batch and back off.
    Transient(String),
}

/// The log-tailing publisher.
///
/// Runs as a single long-lived task per process. Multiple relay instances
/// may run concurrently: the claim-guarded mark in [`store::mark_dispatched`]
/// keeps double publication bounded (at-least-once) without corrupting
/// state.
pub struct OutboxPublisher {
    pool: sqlx::PgPool,
    bus: Arc<dyn EventBus>,
    resolver: SubjectResolver,
    config: PublisherConfig,
}

impl OutboxPublisher {
    pub fn new(pool: sqlx::PgPool, bus: Arc<dyn EventBus>, resolver: SubjectResolver) -> Self {
        Self {
            pool,
            bus,
            resolver,
            config: PublisherConfig::default(),
        }
    }

    pub fn with_config(mut self, config: PublisherConfig) -> Self {
        self.config = config;
        self
    }

    /// Run until the shutdown signal flips.
    ///
    /// Wakes on any signal from any feed (push notification or poll tick)
    /// and drains everything undispatched. Spurious wake-ups just find an
    /// empty batch.
    pub async fn run(
        &self,
        feeds: Vec<Box<dyn ChangeFeed>>,
        mut shutdown: watch::Receiver<bool>,
    ) -> OutboxResult<()> {
        let mut streams = Vec::with_capacity(feeds.len());
        for feed in &feeds {
            streams.push(feed.watch().await?);
        }
        let mut wakeups = futures::stream::select_all(streams);

        tracing::info!(feeds = feeds.len(), "Outbox publisher started");

        loop {
            tokio::select! {
                changed = shutdown.changed() => {
                    // A dropped sender counts as shutdown; without this the
                    // closed channel resolves instantly and the loop spins.
                    if changed.is_err() || *shutdown.borrow() {
                        tracing::info!("Outbox publisher stopping");
                        return Ok(());
                    }
                }
                signal = wakeups.next() => {
                    if signal.is_none() {
                        tracing::warn!("All change feeds ended");
                        return Ok(());
                    }
                    self.drain(&mut shutdown).await;
                }
            }
        }
    }

    /// Publish undispatched rows in commit order until the table is empty,
    /// a transient failure forces a backoff, or shutdown is requested.
    async fn drain(&self, shutdown: &mut watch::Receiver<bool>) {
        let mut backoff = self.config.initial_backoff;

        'outer: loop {
            if *shutdown.borrow() {
                return;
            }

            let batch = match store::fetch_undispatched(&self.pool, self.config.batch_size).await {
                Ok(batch) => batch,
                Err(e) => {
                    tracing::warn!(error = %e, "Failed to read outbox, backing off");
                    if !self.sleep_or_shutdown(backoff, shutdown).await {
                        return;
                    }
                    backoff = std::cmp::min(backoff * 2, self.config.max_backoff);
                    continue;
                }
            };

            if batch.is_empty() {
                return;
            }

            let batch_len = batch.len();
            tracing::debug!(rows = batch_len, "Draining outbox batch");

            for row in batch {
                match self.publish_row(&row).await {
                    RowOutcome::Published | RowOutcome::DeadLettered => {
                        backoff = self.config.initial_backoff;
                    }
                    RowOutcome::Deferred => {
                        // Retried on the next wake-up; order preserved.
                        return;
                    }
                    RowOutcome::Transient(error) => {
                        tracing::warn!(
                            message_id = %row.id,
                            error = %error,
                            backoff_ms = backoff.as_millis(),
                            "Publish failed, retrying row after backoff"
                        );
                        if !self.sleep_or_shutdown(backoff, shutdown).await {
                            return;
                        }
                        backoff = std::cmp::min(backoff * 2, self.config.max_backoff);
                        // Re-fetch from the head: the failed row is still
                        // the oldest undispatched one.
                        continue 'outer;
                    }
                }
            }

            if (batch_len as i64) < self.config.batch_size {
                return;
            }
        }
    }

    async fn publish_row(&self, row: &OutboxMessage) -> RowOutcome {
        let subject_id = match (self.resolver)(&row.event_type, &row.payload) {
            Some(id) => id,
            None => return self.handle_malformed(row, "no subject id in payload").await,
        };

        let envelope = build_envelope(row);
        let bytes = match envelope.to_bytes() {
            Ok(bytes) => bytes,
            Err(e) => return self.handle_malformed(row, &e.to_string()).await,
        };

        let subject = event_subject(&row.event_type, &subject_id);
        if let Err(e) = self.bus.publish(&subject, bytes).await {
            return RowOutcome::Transient(e.to_string());
        }

        // Crash window: broker has the message but the row is still
        // unmarked. Restart republishes it with the same event_id.
        match store::mark_dispatched(&self.pool, row.id).await {
            Ok(true) => {
                tracing::info!(
                    message_id = %row.id,
                    event_type = %row.event_type,
                    subject = %subject,
                    "Outbox row published"
                );
                RowOutcome::Published
            }
            Ok(false) => {
                tracing::debug!(
                    message_id = %row.id,
                    "Row already dispatched by a concurrent relay instance"
                );
                RowOutcome::Published
            }
            Err(e) => RowOutcome::Transient(e.to_string()),
        }
    }

    async fn handle_malformed(&self, row: &OutboxMessage, reason: &str) -> RowOutcome {
        let attempts = match store::record_attempt(&self.pool, row.id).await {
            Ok(attempts) => attempts,
            Err(e) => return RowOutcome::Transient(e.to_string()),
        };

        if attempts >= self.config.max_row_attempts {
            let mut dead = row.clone();
            dead.attempts = attempts;
            match store::dead_letter(&self.pool, &dead, reason).await {
                Ok(()) => RowOutcome::DeadLettered,
                Err(e) => RowOutcome::Transient(e.to_string()),
            }
        } else {
            tracing::warn!(
                message_id = %row.id,
                event_type = %row.event_type,
                attempts,
                max_attempts = self.config.max_row_attempts,
                reason = %reason,
                "Malformed outbox row, deferring"
            );
            RowOutcome::Deferred
        }
    }

    /// Sleep unless shutdown arrives first. Returns `false` on shutdown.
    async fn sleep_or_shutdown(
        &self,
        duration: Duration,
        shutdown: &mut watch::Receiver<bool>,
    ) -> bool {
        tokio::select! {
            _ = tokio::time::sleep(duration) => true,
            changed = shutdown.changed() => changed.is_ok() && !*shutdown.borrow(),
        }
    }
}

/// Rebuild the wire envelope from a persisted row.
///
/// The row id becomes the event id, so however many times a row is
/// republished its envelope is identical and consumers can deduplicate.
fn build_envelope(row: &OutboxMessage) -> IntegrationEvent {
    IntegrationEvent::from_parts(
        row.id,
        row.occurred_at,
        row.event_type.clone(),
        row.payload.clone(),
    )
}
