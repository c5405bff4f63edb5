//! Delivery store — persistence for notification records.
//!
//! Every dispatch persists a `pending` row *before* the transport call, so a
//! mid-flight interruption still leaves an auditable record. State
//! transitions after a transport call go through [`DeliveryStore::settle`],
//! which owns the attempts/backoff bookkeeping; the retry path additionally
//! claims records with a conditional update so two concurrent scheduler runs
//! cannot double-send the same row.

use std::collections::HashMap;

use chrono::Utc;
use serde::Serialize;
use sqlx::PgPool;
use uuid::Uuid;

use remesa_common::error::AppError;
use remesa_common::types::{
    Channel, DeliveryState, FailureKind, NotificationKind, NotificationRecord, SendOutcome,
};

use crate::retry::calculate_next_retry;

/// Default retry budget per record.
pub const DEFAULT_MAX_ATTEMPTS: i32 = 3;

/// Fields needed to create a fresh delivery record.
#[derive(Debug, Clone)]
pub struct NewNotification {
    pub user_id: Option<Uuid>,
    pub order_id: Option<Uuid>,
    pub kind: NotificationKind,
    pub channel: Channel,
    pub recipient: String,
    pub message: String,
    pub max_attempts: i32,
}

/// Aggregate counts for the administrative stats endpoint.
#[derive(Debug, Clone, Serialize)]
pub struct DeliveryStats {
    pub total: i64,
    pub by_state: HashMap<String, i64>,
    pub by_channel: HashMap<String, i64>,
}

#[derive(Clone)]
pub struct DeliveryStore {
    pool: PgPool,
}

impl DeliveryStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Insert a `pending` record for one channel of one notification.
    pub async fn create_pending(
        &self,
        new: &NewNotification,
    ) -> Result<NotificationRecord, AppError> {
        let record: NotificationRecord = sqlx::query_as(
            r#"
            INSERT INTO notifications
                (id, user_id, order_id, type_code, channel, recipient, message,
                 state, attempts, max_attempts, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, 'pending', 0, $8, $9)
            RETURNING *
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(new.user_id)
        .bind(new.order_id)
        .bind(new.kind.code())
        .bind(new.channel)
        .bind(&new.recipient)
        .bind(&new.message)
        .bind(new.max_attempts.max(1))
        .bind(Utc::now())
        .fetch_one(&self.pool)
        .await?;

        Ok(record)
    }

    /// Atomically claim a record for dispatch: transition to `sending` only
    /// if it is still `pending`/`failed`. Returns `false` when another run
    /// won the race.
    pub async fn claim_for_sending(&self, id: Uuid) -> Result<bool, AppError> {
        let result = sqlx::query(
            r#"
            UPDATE notifications
            SET state = 'sending', next_retry_at = NULL
            WHERE id = $1 AND state IN ('pending', 'failed')
            "#,
        )
        .bind(id)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Record a transport outcome against a record.
    ///
    /// Increments `attempts` and settles the state:
    /// - success → `sent` (terminal, `next_retry_at` cleared)
    /// - configuration / gone-recipient failure → `failed` (terminal)
    /// - transient failure with budget left → `pending` + new `next_retry_at`
    /// - transient failure with budget exhausted → `failed` (terminal)
    pub async fn settle(
        &self,
        record: &NotificationRecord,
        outcome: &SendOutcome,
    ) -> Result<NotificationRecord, AppError> {
        let attempts = (record.attempts + 1).min(record.max_attempts);

        let (state, next_retry_at, sent_at) = if outcome.success {
            (DeliveryState::Sent, None, Some(Utc::now()))
        } else {
            let terminal = matches!(
                outcome.failure,
                Some(FailureKind::Configuration) | Some(FailureKind::RecipientGone)
            ) || attempts >= record.max_attempts;

            if terminal {
                (DeliveryState::Failed, None, None)
            } else {
                (
                    DeliveryState::Pending,
                    Some(calculate_next_retry(attempts as u32)),
                    None,
                )
            }
        };

        let settled: NotificationRecord = sqlx::query_as(
            r#"
            UPDATE notifications
            SET state = $1,
                attempts = $2,
                next_retry_at = $3,
                sent_at = COALESCE($4, sent_at),
                error_detail = $5,
                provider_message_id = COALESCE($6, provider_message_id)
            WHERE id = $7
            RETURNING *
            "#,
        )
        .bind(state)
        .bind(attempts)
        .bind(next_retry_at)
        .bind(sent_at)
        .bind(&outcome.error)
        .bind(&outcome.provider_message_id)
        .bind(record.id)
        .fetch_one(&self.pool)
        .await?;

        tracing::debug!(
            notification_id = %settled.id,
            channel = %settled.channel,
            state = %settled.state,
            attempts = settled.attempts,
            "Delivery record settled"
        );

        Ok(settled)
    }

    /// Select the batch of records the retry scheduler should re-dispatch:
    /// due, not exhausted, and not push (push lacks the context to retry).
    pub async fn due_for_retry(&self, limit: i64) -> Result<Vec<NotificationRecord>, AppError> {
        let records: Vec<NotificationRecord> = sqlx::query_as(
            r#"
            SELECT * FROM notifications
            WHERE state IN ('pending', 'failed')
              AND next_retry_at IS NOT NULL
              AND next_retry_at <= $1
              AND attempts < max_attempts
              AND channel <> 'push'
            ORDER BY next_retry_at ASC
            LIMIT $2
            "#,
        )
        .bind(Utc::now())
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        Ok(records)
    }

    pub async fn get(&self, id: Uuid) -> Result<NotificationRecord, AppError> {
        let record: Option<NotificationRecord> =
            sqlx::query_as("SELECT * FROM notifications WHERE id = $1")
                .bind(id)
                .fetch_optional(&self.pool)
                .await?;

        record.ok_or_else(|| AppError::NotFound(format!("Notification {} not found", id)))
    }

    /// Administrative listing, newest first.
    pub async fn list(
        &self,
        state: Option<DeliveryState>,
        channel: Option<Channel>,
        limit: i64,
    ) -> Result<Vec<NotificationRecord>, AppError> {
        let records: Vec<NotificationRecord> = sqlx::query_as(
            r#"
            SELECT * FROM notifications
            WHERE ($1::text IS NULL OR state = $1)
              AND ($2::text IS NULL OR channel = $2)
            ORDER BY created_at DESC
            LIMIT $3
            "#,
        )
        .bind(state.map(|s| s.to_string()))
        .bind(channel.map(|c| c.to_string()))
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        Ok(records)
    }

    /// Counts per state and per channel.
    pub async fn stats(&self) -> Result<DeliveryStats, AppError> {
        let rows: Vec<(String, String, i64)> = sqlx::query_as(
            "SELECT state, channel, COUNT(*) FROM notifications GROUP BY state, channel",
        )
        .fetch_all(&self.pool)
        .await?;

        let mut stats = DeliveryStats {
            total: 0,
            by_state: HashMap::new(),
            by_channel: HashMap::new(),
        };
        for (state, channel, count) in rows {
            stats.total += count;
            *stats.by_state.entry(state).or_insert(0) += count;
            *stats.by_channel.entry(channel).or_insert(0) += count;
        }

        Ok(stats)
    }
}
