//! # Transactional Outbox
//!
//! Guarantees that every committed catalog write is eventually published to
//! the event bus, without a distributed transaction.
//!
//! ## How the pieces fit
//!
//! 1. **Capture** ([`store::enqueue`]): the business write inserts an outbox
//!    row *on its own transaction's connection*. Commit writes both or
//!    neither; rollback writes neither.
//! 2. **Wake-up** ([`ChangeFeed`]): a database trigger `pg_notify`s a
//!    channel on every insert (push); an interval poll backs it up because
//!    notifications are best-effort and may be dropped.
//! 3. **Drain** ([`OutboxPublisher`]): a single background task reads
//!    undispatched rows in `id` order, publishes each to the bus, and marks
//!    it dispatched only after the broker acknowledged; crash in between
//!    means the row is republished on restart (at-least-once; consumers
//!    must be idempotent).
//!
//! Rows are never deleted here; retention is an operational concern.

mod change_feed;
mod publisher;
pub mod store;

pub use change_feed::{ChangeFeed, PgNotifyFeed, PollFeed};
pub use publisher::{payload_field_resolver, OutboxPublisher, PublisherConfig, SubjectResolver};
pub use store::OutboxMessage;

/// Errors from outbox storage and publishing.
#[derive(Debug, thiserror::Error)]
pub enum OutboxError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("failed to serialize payload: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("change feed error: {0}")]
    ChangeFeed(String),
}

/// Result type for outbox operations.
pub type OutboxResult<T> = Result<T, OutboxError>;
