//! Wake-up sources for the log-tailing publisher.
//!
//! The publisher drains the outbox whenever *any* feed signals. The
//! Postgres notify feed gives low latency; the poll feed guarantees
//! progress when notifications are dropped (they are best-effort and not
//! queued across disconnects).

use async_trait::async_trait;
use futures::stream::{BoxStream, StreamExt};
use sqlx::postgres::PgListener;
use sqlx::PgPool;
use std::time::Duration;

use crate::{OutboxError, OutboxResult};

/// Channel the `catalog_outbox_notify` trigger publishes on.
pub const NOTIFY_CHANNEL: &str = "catalog_outbox";

/// A source of "the outbox may have new rows" signals.
///
/// Signals carry no data; the publisher always re-reads the table, so a
/// coalesced or spurious wake-up is harmless.
#[async_trait]
pub trait ChangeFeed: Send + Sync {
    /// Open an endless stream of wake-up signals.
    async fn watch(&self) -> OutboxResult<BoxStream<'static, ()>>;
}

/// Push feed backed by Postgres LISTEN/NOTIFY.
///
/// The underlying listener reconnects transparently; a reconnect itself
/// yields a wake-up, since notifications sent while disconnected are lost
/// and a drain pass is the only way to catch up.
pub struct PgNotifyFeed {
    pool: PgPool,
    channel: String,
}

impl PgNotifyFeed {
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool,
            channel: NOTIFY_CHANNEL.to_string(),
        }
    }

    pub fn with_channel(pool: PgPool, channel: impl Into<String>) -> Self {
        Self {
            pool,
            channel: channel.into(),
        }
    }
}

#[async_trait]
impl ChangeFeed for PgNotifyFeed {
    async fn watch(&self) -> OutboxResult<BoxStream<'static, ()>> {
        let mut listener = PgListener::connect_with(&self.pool)
            .await
            .map_err(OutboxError::Database)?;
        listener
            .listen(&self.channel)
            .await
            .map_err(OutboxError::Database)?;

        let channel = self.channel.clone();
        let stream = async_stream::stream! {
            loop {
                match listener.try_recv().await {
                    Ok(Some(notification)) => {
                        tracing::trace!(
                            channel = %notification.channel(),
                            "Outbox change notification received"
                        );
                        yield ();
                    }
                    // None means the connection was re-established; anything
                    // notified in between is gone, so force a drain pass.
                    Ok(None) => {
                        tracing::warn!(channel = %channel, "Notify listener reconnected");
                        yield ();
                    }
                    Err(e) => {
                        tracing::warn!(
                            channel = %channel,
                            error = %e,
                            "Notify listener error, retrying"
                        );
                        tokio::time::sleep(Duration::from_secs(1)).await;
                    }
                }
            }
        };

        Ok(stream.boxed())
    }
}

/// Poll fallback: a wake-up on a fixed interval, unconditionally.
pub struct PollFeed {
    interval: Duration,
}

impl PollFeed {
    pub fn new(interval: Duration) -> Self {
        Self { interval }
    }
}

#[async_trait]
impl ChangeFeed for PollFeed {
    async fn watch(&self) -> OutboxResult<BoxStream<'static, ()>> {
        let period = self.interval;
        let stream = async_stream::stream! {
            let mut ticker = tokio::time::interval(period);
            // The first tick fires immediately, which doubles as the
            // startup drain of rows left over from a previous run.
            loop {
                ticker.tick().await;
                yield ();
            }
        };

        Ok(stream.boxed())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn poll_feed_ticks_on_interval() {
        let feed = PollFeed::new(Duration::from_secs(5));
        let mut stream = feed.watch().await.unwrap();

        // Immediate first tick
        assert!(stream.next().await.is_some());

        tokio::time::advance(Duration::from_secs(5)).await;
        assert!(stream.next().await.is_some());
    }
}
