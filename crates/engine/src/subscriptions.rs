//! Push subscription service — thin CRUD over `push_subscriptions`.
//!
//! Registration is an upsert on the endpoint: a browser re-registering the
//! same endpoint refreshes its keys and reactivates the row instead of
//! duplicating it.

use sqlx::PgPool;
use uuid::Uuid;

use remesa_common::error::AppError;
use remesa_common::types::PushSubscription;
use remesa_transports::push::cipher;

pub struct PushSubscriptionService;

/// Parameters for registering (or refreshing) a subscription.
#[derive(Debug, Clone, serde::Deserialize)]
pub struct RegisterSubscriptionParams {
    /// Absent for anonymous subscribers.
    pub user_id: Option<Uuid>,
    pub endpoint: String,
    pub p256dh: String,
    pub auth: String,
}

impl PushSubscriptionService {
    /// Upsert a subscription by endpoint.
    pub async fn upsert(
        pool: &PgPool,
        params: &RegisterSubscriptionParams,
    ) -> Result<PushSubscription, AppError> {
        if params.endpoint.trim().is_empty() {
            return Err(AppError::Validation("endpoint must not be empty".to_string()));
        }
        // Reject keys that could never decrypt a message instead of storing
        // them and failing at send time.
        cipher::decode_subscription_keys(&params.p256dh, &params.auth)
            .map_err(|e| AppError::Validation(e.to_string()))?;

        let subscription: PushSubscription = sqlx::query_as(
            r#"
            INSERT INTO push_subscriptions
                (id, user_id, endpoint, p256dh, auth, active, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, true, NOW(), NOW())
            ON CONFLICT (endpoint) DO UPDATE SET
                user_id = excluded.user_id,
                p256dh = excluded.p256dh,
                auth = excluded.auth,
                active = true,
                updated_at = NOW()
            RETURNING *
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(params.user_id)
        .bind(&params.endpoint)
        .bind(&params.p256dh)
        .bind(&params.auth)
        .fetch_one(pool)
        .await?;

        tracing::info!(
            subscription_id = %subscription.id,
            endpoint = %subscription.endpoint,
            "Push subscription registered"
        );

        Ok(subscription)
    }

    /// Mark a subscription inactive by endpoint. Returns true if a row changed.
    pub async fn deactivate(pool: &PgPool, endpoint: &str) -> Result<bool, AppError> {
        let result = sqlx::query(
            "UPDATE push_subscriptions SET active = false, updated_at = NOW() WHERE endpoint = $1",
        )
        .bind(endpoint)
        .execute(pool)
        .await?;

        let changed = result.rows_affected() > 0;
        if changed {
            tracing::info!(endpoint = %endpoint, "Push subscription deactivated");
        }
        Ok(changed)
    }

    /// List a user's active subscriptions, most recently refreshed first.
    pub async fn list_active_for_user(
        pool: &PgPool,
        user_id: Uuid,
    ) -> Result<Vec<PushSubscription>, AppError> {
        let rows: Vec<PushSubscription> = sqlx::query_as(
            r#"
            SELECT * FROM push_subscriptions
            WHERE user_id = $1 AND active = true
            ORDER BY updated_at DESC
            "#,
        )
        .bind(user_id)
        .fetch_all(pool)
        .await?;

        Ok(rows)
    }
}
