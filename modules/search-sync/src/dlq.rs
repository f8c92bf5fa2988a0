use sqlx::PgPool;
use uuid::Uuid;

/// Record an event the projector could not apply after all retries.
///
/// `event_id` is `None` when the envelope itself did not parse. Known
/// events re-failing upsert their row, so the table holds one entry per
/// event id with the latest error.
pub async fn record_failed_event(
    pool: &PgPool,
    event_id: Option<Uuid>,
    subject: &str,
    envelope_json: &serde_json::Value,
    error: &str,
    retry_count: i32,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        INSERT INTO sync_failed_events (event_id, subject, envelope_json, error, retry_count)
        VALUES ($1, $2, $3, $4, $5)
        ON CONFLICT (event_id) DO UPDATE
        SET retry_count = EXCLUDED.retry_count,
            error = EXCLUDED.error,
            failed_at = now()
        "#,
    )
    .bind(event_id)
    .bind(subject)
    .bind(envelope_json)
    .bind(error)
    .bind(retry_count)
    .execute(pool)
    .await?;

    tracing::error!(
        event_id = ?event_id,
        subject = %subject,
        retry_count = retry_count,
        error = %error,
        "Event moved to sync dead letters"
    );

    Ok(())
}
