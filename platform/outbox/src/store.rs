//! Outbox table access: capture, drain, claim, dead-letter.

use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::postgres::PgExecutor;
use sqlx::PgPool;
use uuid::Uuid;

use crate::{OutboxError, OutboxResult};

/// One row of the `catalog_outbox` table.
///
/// `id` is a UUIDv7, so sorting by `id` is commit-time order. It doubles
/// as the event id on the wire, which keeps republished rows deduplicable.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct OutboxMessage {
    pub id: Uuid,
    pub occurred_at: DateTime<Utc>,
    pub event_type: String,
    pub payload: serde_json::Value,
    pub attempts: i32,
    pub dispatched_at: Option<DateTime<Utc>>,
}

/// Append an event to the outbox.
///
/// Pass the business transaction's connection (`&mut *tx`) so the row
/// commits or rolls back together with the mutation it describes. Never
/// call this on a separate connection.
pub async fn enqueue<'e, E, T>(
    executor: E,
    event_type: &str,
    payload: &T,
) -> OutboxResult<Uuid>
where
    E: PgExecutor<'e>,
    T: Serialize,
{
    let id = Uuid::now_v7();
    let payload = serde_json::to_value(payload)?;

    sqlx::query(
        r#"
        INSERT INTO catalog_outbox (id, occurred_at, event_type, payload)
        VALUES ($1, now(), $2, $3)
        "#,
    )
    .bind(id)
    .bind(event_type)
    .bind(&payload)
    .execute(executor)
    .await?;

    tracing::debug!(
        message_id = %id,
        event_type = %event_type,
        "Event enqueued to outbox"
    );

    Ok(id)
}

/// Fetch a batch of undispatched rows in commit order.
pub async fn fetch_undispatched(pool: &PgPool, limit: i64) -> OutboxResult<Vec<OutboxMessage>> {
    let rows = sqlx::query_as::<_, OutboxMessage>(
        r#"
        SELECT id, occurred_at, event_type, payload, attempts, dispatched_at
        FROM catalog_outbox
        WHERE dispatched_at IS NULL
        ORDER BY id ASC
        LIMIT $1
        "#,
    )
    .bind(limit)
    .fetch_all(pool)
    .await?;

    Ok(rows)
}

/// Mark a row dispatched after a confirmed broker acknowledgment.
///
/// Claim-guarded: the `dispatched_at IS NULL` predicate means two relay
/// instances racing on the same row cannot both claim it. Returns `false`
/// when another instance got there first; the duplicate publish that may
/// already have happened is the accepted at-least-once cost.
pub async fn mark_dispatched(pool: &PgPool, message_id: Uuid) -> OutboxResult<bool> {
    let result = sqlx::query(
        r#"
        UPDATE catalog_outbox
        SET dispatched_at = now()
        WHERE id = $1 AND dispatched_at IS NULL
        "#,
    )
    .bind(message_id)
    .execute(pool)
    .await?;

    Ok(result.rows_affected() > 0)
}

/// Record one failed handling attempt for a row. Returns the new count.
pub async fn record_attempt(pool: &PgPool, message_id: Uuid) -> OutboxResult<i32> {
    let attempts: i32 = sqlx::query_scalar(
        r#"
        UPDATE catalog_outbox
        SET attempts = attempts + 1
        WHERE id = $1
        RETURNING attempts
        "#,
    )
    .bind(message_id)
    .fetch_one(pool)
    .await?;

    Ok(attempts)
}

/// Move a malformed row to the dead-letter table and mark it dispatched so
/// it no longer blocks the log.
///
/// Both statements run in one transaction: a dead-lettered row is always
/// preserved before the log is unblocked.
pub async fn dead_letter(pool: &PgPool, message: &OutboxMessage, error: &str) -> OutboxResult<()> {
    let mut tx = pool.begin().await?;

    sqlx::query(
        r#"
        INSERT INTO outbox_dead_letters (message_id, event_type, payload, error, attempts)
        VALUES ($1, $2, $3, $4, $5)
        ON CONFLICT (message_id) DO UPDATE
        SET error = EXCLUDED.error,
            attempts = EXCLUDED.attempts,
            failed_at = now()
        "#,
    )
    .bind(message.id)
    .bind(&message.event_type)
    .bind(&message.payload)
    .bind(error)
    .bind(message.attempts)
    .execute(&mut *tx)
    .await?;

    sqlx::query(
        r#"
        UPDATE catalog_outbox
        SET dispatched_at = now()
        WHERE id = $1 AND dispatched_at IS NULL
        "#,
    )
    .bind(message.id)
    .execute(&mut *tx)
    .await?;

    tx.commit().await.map_err(OutboxError::Database)?;

    tracing::error!(
        message_id = %message.id,
        event_type = %message.event_type,
        attempts = message.attempts,
        error = %error,
        "Outbox row moved to dead letters"
    );

    Ok(())
}
