//! Retry scheduler — re-dispatches due failed/pending records with backoff.
//!
//! Delay grows as `min(30s · 2^attempt, 1h)` plus 0–10% random jitter so a
//! struggling provider is not hammered in lockstep. One invocation processes
//! at most [`RETRY_BATCH_SIZE`] records to completion; records are claimed
//! with an atomic conditional update, so overlapping invocations skip each
//! other's work instead of double-sending.
//!
//! Push records are excluded: the stored record keeps only the rendered
//! text, not the subscription set or structured payload a push needs.

use chrono::{DateTime, Duration, Utc};
use rand::Rng;
use serde::Serialize;
use sqlx::PgPool;
use uuid::Uuid;

use remesa_common::error::AppError;
use remesa_common::types::{
    Channel, DeliveryContext, DeliveryState, NotificationKind, NotificationRecord, Priority,
    RenderedMessage, SendOutcome,
};
use remesa_transports::TransportRegistry;

use crate::store::DeliveryStore;

/// Maximum records re-dispatched per invocation.
pub const RETRY_BATCH_SIZE: i64 = 50;

const BASE_DELAY_SECS: u64 = 30;
const MAX_DELAY_SECS: u64 = 3600;

/// Counters returned by one `process_retry_queue` invocation.
#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct RetryStats {
    pub processed: u32,
    pub succeeded: u32,
    pub failed: u32,
}

/// Backoff delay for the given attempt count, jitter included.
pub fn retry_delay(attempt: u32) -> std::time::Duration {
    let base = BASE_DELAY_SECS
        .saturating_mul(1u64 << attempt.min(20))
        .min(MAX_DELAY_SECS);
    let jitter_ms = (base as f64 * 1000.0 * rand::rng().random_range(0.0..0.1)) as u64;
    std::time::Duration::from_millis(base * 1000 + jitter_ms)
}

/// Absolute timestamp of the next retry for the given attempt count.
pub fn calculate_next_retry(attempt: u32) -> DateTime<Utc> {
    let delay = retry_delay(attempt);
    Utc::now() + Duration::milliseconds(delay.as_millis() as i64)
}

pub struct RetryScheduler {
    store: DeliveryStore,
    transports: TransportRegistry,
}

impl RetryScheduler {
    pub fn new(pool: PgPool, transports: TransportRegistry) -> Self {
        Self {
            store: DeliveryStore::new(pool),
            transports,
        }
    }

    /// Re-dispatch every due record in the batch.
    ///
    /// `failed` counts unsuccessful attempts, whether or not the record kept
    /// retry budget (a still-pending record with a future `next_retry_at`
    /// counts as failed for this invocation).
    pub async fn process_retry_queue(&self) -> Result<RetryStats, AppError> {
        let due = self.store.due_for_retry(RETRY_BATCH_SIZE).await?;
        let mut stats = RetryStats::default();

        for record in due {
            // Lost claims are skipped entirely — another run owns the record.
            if !self.store.claim_for_sending(record.id).await? {
                continue;
            }

            let outcome = self.dispatch(&record).await;
            let settled = self.store.settle(&record, &outcome).await?;

            stats.processed += 1;
            if settled.state == DeliveryState::Sent {
                stats.succeeded += 1;
            } else {
                stats.failed += 1;
            }
        }

        if stats.processed > 0 {
            tracing::info!(
                processed = stats.processed,
                succeeded = stats.succeeded,
                failed = stats.failed,
                "Retry queue processed"
            );
        }

        Ok(stats)
    }

    /// Manually re-dispatch a single record (administrative surface).
    pub async fn retry_record(&self, id: Uuid) -> Result<NotificationRecord, AppError> {
        let record = self.store.get(id).await?;

        if record.channel == Channel::Push {
            return Err(AppError::Validation(
                "push records cannot be re-dispatched without user context".to_string(),
            ));
        }
        if record.attempts >= record.max_attempts {
            return Err(AppError::Validation(format!(
                "record {} has exhausted its {} attempts",
                id, record.max_attempts
            )));
        }
        if !self.store.claim_for_sending(record.id).await? {
            return Err(AppError::Validation(format!(
                "record {} is not in a retryable state",
                id
            )));
        }

        let outcome = self.dispatch(&record).await;
        self.store.settle(&record, &outcome).await
    }

    /// Re-invoke the channel transport with the already-rendered message.
    async fn dispatch(&self, record: &NotificationRecord) -> SendOutcome {
        let Some(kind) = NotificationKind::from_code(&record.type_code) else {
            return SendOutcome::transient(format!(
                "record carries unknown type code '{}'",
                record.type_code
            ));
        };
        let Some(transport) = self.transports.get(record.channel) else {
            return SendOutcome::not_configured(format!(
                "no transport registered for channel {}",
                record.channel
            ));
        };

        let message = RenderedMessage {
            text: record.message.clone(),
            email_subject: None,
            push: None,
        };
        let ctx = DeliveryContext {
            kind,
            priority: Priority::Normal,
            user_id: record.user_id,
            order_id: record.order_id,
            data: serde_json::json!({}),
        };

        transport.send(&record.recipient, &message, &ctx).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retry_delay_within_jitter_bounds() {
        for attempt in 0..6u32 {
            let base = 30u64 * 2u64.pow(attempt);
            let delay = retry_delay(attempt).as_secs_f64();
            assert!(delay >= base as f64, "attempt {}: {} < {}", attempt, delay, base);
            assert!(
                delay <= base as f64 * 1.1 + 0.001,
                "attempt {}: {} > {}",
                attempt,
                delay,
                base as f64 * 1.1
            );
        }
    }

    #[test]
    fn test_retry_delay_caps_at_one_hour() {
        let delay = retry_delay(12).as_secs_f64();
        assert!(delay >= 3600.0);
        assert!(delay <= 3600.0 * 1.1 + 0.001);
    }

    #[test]
    fn test_retry_delay_non_decreasing() {
        // Jitter is at most 10%, so the worst case of attempt n stays below
        // the best case of attempt n+1 until the cap flattens the curve.
        for attempt in 0..5u32 {
            let upper = 30f64 * 2f64.powi(attempt as i32) * 1.1;
            let next_lower = 30f64 * 2f64.powi(attempt as i32 + 1);
            assert!(upper < next_lower);
        }
        for _ in 0..20 {
            assert!(retry_delay(3) <= retry_delay(4));
        }
    }

    #[test]
    fn test_calculate_next_retry_is_in_the_future() {
        let now = Utc::now();
        let next = calculate_next_retry(0);
        assert!(next > now + Duration::seconds(29));
        assert!(next < now + Duration::seconds(34));
    }
}
