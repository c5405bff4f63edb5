//! Web Push transport.
//!
//! Encrypts the payload with the aes128gcm content-coding (see [`cipher`])
//! and POSTs it straight to the subscriber's push endpoint with VAPID
//! identification headers. A 404/410 from the push service means the
//! subscription is gone and gets deactivated on the spot; any other
//! non-2xx is a transient provider failure.
//!
//! The `Authorization` header carries base64url JSON claims without an ECDSA
//! signature — the relay gateways this system targets accept that form.

pub mod cipher;

use async_trait::async_trait;
use base64::Engine as _;
use chrono::Utc;
use futures::stream::{self, StreamExt};
use sqlx::PgPool;
use url::Url;
use uuid::Uuid;

use remesa_common::config::VapidConfig;
use remesa_common::types::{
    Channel, DeliveryContext, PushContent, PushSubscription, RenderedMessage, SendOutcome,
};

use crate::gateway::truncate;
use crate::Transport;

/// How many subscriptions of one user are pushed concurrently.
const PUSH_CONCURRENCY: usize = 8;
/// Lifetime of the VAPID claims.
const VAPID_EXP_HOURS: i64 = 12;

/// Structured result of one push endpoint call.
#[derive(Debug, Clone)]
pub struct PushSendResult {
    pub success: bool,
    pub status_code: Option<u16>,
    /// The endpoint no longer exists (404/410) and should be dropped.
    pub subscription_gone: bool,
    pub error: Option<String>,
}

impl PushSendResult {
    fn ok(status_code: u16) -> Self {
        Self {
            success: true,
            status_code: Some(status_code),
            subscription_gone: false,
            error: None,
        }
    }

    fn gone(status_code: u16) -> Self {
        Self {
            success: false,
            status_code: Some(status_code),
            subscription_gone: true,
            error: Some(format!("push service returned {}", status_code)),
        }
    }

    fn failed(status_code: Option<u16>, error: impl Into<String>) -> Self {
        Self {
            success: false,
            status_code,
            subscription_gone: false,
            error: Some(error.into()),
        }
    }

    /// Classify a push service status code: 200/201 accepted, 404/410 the
    /// subscription is gone, anything else a transient provider failure.
    fn from_status(code: u16, body: &str) -> Self {
        match code {
            200 | 201 => Self::ok(code),
            404 | 410 => Self::gone(code),
            _ => Self::failed(
                Some(code),
                format!("push service returned {}: {}", code, truncate(body, 300)),
            ),
        }
    }
}

pub struct PushTransport {
    pool: PgPool,
    client: reqwest::Client,
    vapid: Option<VapidConfig>,
    ttl_secs: u32,
}

impl PushTransport {
    pub fn new(pool: PgPool, vapid: Option<VapidConfig>, ttl_secs: u32) -> Self {
        Self {
            pool,
            client: crate::http_client(),
            vapid,
            ttl_secs,
        }
    }

    /// Encrypt and deliver one payload to one subscription.
    ///
    /// Never returns an error — every failure path is folded into the
    /// result, including a one-shot unauthenticated plain-JSON fallback when
    /// the encrypted POST cannot be sent at all.
    pub async fn send_push(
        &self,
        subscription: &PushSubscription,
        content: &PushContent,
        vapid: &VapidConfig,
    ) -> PushSendResult {
        let payload = match serde_json::to_vec(content) {
            Ok(bytes) => bytes,
            Err(e) => return PushSendResult::failed(None, format!("payload serialization: {}", e)),
        };

        let (client_public, auth_secret) =
            match cipher::decode_subscription_keys(&subscription.p256dh, &subscription.auth) {
                Ok(keys) => keys,
                Err(e) => return PushSendResult::failed(None, e.to_string()),
            };

        let body = match cipher::encrypt(&payload, &client_public, &auth_secret) {
            Ok(body) => body,
            Err(e) => return PushSendResult::failed(None, e.to_string()),
        };

        let aud = match push_service_audience(&subscription.endpoint) {
            Ok(aud) => aud,
            Err(e) => return PushSendResult::failed(None, e),
        };

        let result = self
            .client
            .post(&subscription.endpoint)
            .header("TTL", self.ttl_secs.to_string())
            .header("Content-Encoding", "aes128gcm")
            .header("Content-Type", "application/octet-stream")
            .header("Authorization", vapid_authorization(&aud, vapid))
            .header("Crypto-Key", format!("p256ecdsa={}", vapid.public_key))
            .body(body)
            .send()
            .await;

        let response = match result {
            Ok(response) => response,
            Err(e) => {
                tracing::warn!(
                    endpoint = %subscription.endpoint,
                    error = %e,
                    "Encrypted push failed to send, trying plain fallback"
                );
                return self.send_plain_fallback(subscription, content).await;
            }
        };

        let status = response.status().as_u16();
        let body = if matches!(status, 200 | 201) {
            String::new()
        } else {
            response.text().await.unwrap_or_default()
        };
        PushSendResult::from_status(status, &body)
    }

    /// Best-effort ops safety net: an unauthenticated plain JSON POST.
    /// Spec-compliant push services will reject it; self-hosted relays in
    /// the field accept it, which beats dropping the message entirely.
    async fn send_plain_fallback(
        &self,
        subscription: &PushSubscription,
        content: &PushContent,
    ) -> PushSendResult {
        let result = self
            .client
            .post(&subscription.endpoint)
            .json(content)
            .send()
            .await;

        match result {
            Ok(response) if response.status().is_success() => {
                PushSendResult::ok(response.status().as_u16())
            }
            Ok(response) => PushSendResult::failed(
                Some(response.status().as_u16()),
                format!("plain fallback returned {}", response.status()),
            ),
            Err(e) => PushSendResult::failed(None, format!("plain fallback failed: {}", e)),
        }
    }

    async fn active_subscriptions(&self, user_id: Uuid) -> Result<Vec<PushSubscription>, sqlx::Error> {
        sqlx::query_as::<_, PushSubscription>(
            "SELECT * FROM push_subscriptions WHERE user_id = $1 AND active = true",
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await
    }

    async fn deactivate_subscription(&self, endpoint: &str) {
        let result = sqlx::query(
            "UPDATE push_subscriptions SET active = false, updated_at = NOW() WHERE endpoint = $1",
        )
        .bind(endpoint)
        .execute(&self.pool)
        .await;

        match result {
            Ok(_) => {
                tracing::info!(endpoint = %endpoint, "Deactivated gone push subscription");
            }
            Err(e) => {
                tracing::warn!(
                    endpoint = %endpoint,
                    error = %e,
                    "Failed to deactivate gone push subscription"
                );
            }
        }
    }
}

#[async_trait]
impl Transport for PushTransport {
    fn channel(&self) -> Channel {
        Channel::Push
    }

    async fn send(
        &self,
        _recipient: &str,
        message: &RenderedMessage,
        ctx: &DeliveryContext,
    ) -> SendOutcome {
        let Some(vapid) = &self.vapid else {
            return SendOutcome::not_configured("VAPID keys are not set");
        };
        let Some(content) = &message.push else {
            return SendOutcome::transient("message carries no push content");
        };
        let Some(user_id) = ctx.user_id else {
            return SendOutcome::transient("push delivery needs an owning user");
        };

        let subscriptions = match self.active_subscriptions(user_id).await {
            Ok(subs) => subs,
            Err(e) => return SendOutcome::transient(format!("subscription lookup failed: {}", e)),
        };
        if subscriptions.is_empty() {
            return SendOutcome::transient("user has no active push subscriptions");
        }

        let total = subscriptions.len();
        let results: Vec<(PushSubscription, PushSendResult)> = stream::iter(subscriptions)
            .map(|sub| async move {
                let result = self.send_push(&sub, content, vapid).await;
                (sub, result)
            })
            .buffer_unordered(PUSH_CONCURRENCY)
            .collect()
            .await;

        let mut accepted = 0usize;
        let mut gone = 0usize;
        let mut errors: Vec<String> = Vec::new();
        for (sub, result) in results {
            if result.success {
                accepted += 1;
            } else if result.subscription_gone {
                gone += 1;
                self.deactivate_subscription(&sub.endpoint).await;
            } else if let Some(error) = result.error {
                errors.push(error);
            }
        }

        tracing::debug!(
            user_id = %user_id,
            total,
            accepted,
            gone,
            "Push fan-out finished"
        );

        if accepted > 0 {
            SendOutcome::ok(None)
        } else if gone == total {
            SendOutcome::recipient_gone(format!(
                "all {} push subscriptions are gone",
                total
            ))
        } else {
            SendOutcome::transient(truncate(&errors.join("; "), 500))
        }
    }
}

/// Derive the VAPID audience (scheme://host[:port]) from a push endpoint.
fn push_service_audience(endpoint: &str) -> Result<String, String> {
    let url = Url::parse(endpoint).map_err(|e| format!("invalid push endpoint URL: {}", e))?;
    let host = url
        .host()
        .ok_or_else(|| "push endpoint missing host".to_string())?;

    let host = match host {
        url::Host::Domain(d) => d.to_string(),
        url::Host::Ipv4(ip) => ip.to_string(),
        url::Host::Ipv6(ip) => format!("[{}]", ip),
    };

    Ok(match (url.scheme(), url.port()) {
        (scheme, Some(port)) => format!("{}://{}:{}", scheme, host, port),
        (scheme, None) => format!("{}://{}", scheme, host),
    })
}

/// Build the `vapid t=…, k=…` header value. The claims are base64url JSON,
/// deliberately unsigned (see module docs).
fn vapid_authorization(aud: &str, vapid: &VapidConfig) -> String {
    let sub = if vapid.subject.starts_with("mailto:") {
        vapid.subject.clone()
    } else {
        format!("mailto:{}", vapid.subject)
    };
    let claims = serde_json::json!({
        "aud": aud,
        "exp": (Utc::now() + chrono::Duration::hours(VAPID_EXP_HOURS)).timestamp(),
        "sub": sub,
    });
    let claims_b64 = base64::engine::general_purpose::URL_SAFE_NO_PAD
        .encode(claims.to_string().as_bytes());

    format!("vapid t={}, k={}", claims_b64, vapid.public_key)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_classification() {
        assert!(PushSendResult::from_status(201, "").success);
        assert!(PushSendResult::from_status(200, "").success);

        let gone = PushSendResult::from_status(410, "");
        assert!(!gone.success);
        assert!(gone.subscription_gone);
        let gone = PushSendResult::from_status(404, "");
        assert!(gone.subscription_gone);

        let failed = PushSendResult::from_status(500, "upstream exploded");
        assert!(!failed.success);
        assert!(!failed.subscription_gone);
        assert!(failed.error.unwrap().contains("upstream exploded"));
    }

    #[test]
    fn test_push_service_audience_strips_path() {
        assert_eq!(
            push_service_audience("https://push.example.com/send/abc123").unwrap(),
            "https://push.example.com"
        );
        assert_eq!(
            push_service_audience("https://relay.example.com:8443/p/x").unwrap(),
            "https://relay.example.com:8443"
        );
        assert!(push_service_audience("not a url").is_err());
    }

    #[test]
    fn test_vapid_authorization_shape() {
        let vapid = VapidConfig {
            public_key: "BPub".to_string(),
            subject: "soporte@remesarelay.com".to_string(),
        };
        let header = vapid_authorization("https://push.example.com", &vapid);
        assert!(header.starts_with("vapid t="));
        assert!(header.ends_with(", k=BPub"));

        let token = header
            .strip_prefix("vapid t=")
            .and_then(|rest| rest.split(',').next())
            .unwrap();
        let claims: serde_json::Value = serde_json::from_slice(
            &base64::engine::general_purpose::URL_SAFE_NO_PAD
                .decode(token)
                .unwrap(),
        )
        .unwrap();
        assert_eq!(claims["aud"], "https://push.example.com");
        assert_eq!(claims["sub"], "mailto:soporte@remesarelay.com");
        assert!(claims["exp"].as_i64().unwrap() > Utc::now().timestamp());
    }

    #[test]
    fn test_vapid_subject_already_mailto() {
        let vapid = VapidConfig {
            public_key: "BPub".to_string(),
            subject: "mailto:ops@remesarelay.com".to_string(),
        };
        let header = vapid_authorization("https://push.example.com", &vapid);
        let token = header
            .strip_prefix("vapid t=")
            .and_then(|rest| rest.split(',').next())
            .unwrap();
        let claims: serde_json::Value = serde_json::from_slice(
            &base64::engine::general_purpose::URL_SAFE_NO_PAD
                .decode(token)
                .unwrap(),
        )
        .unwrap();
        assert_eq!(claims["sub"], "mailto:ops@remesarelay.com");
    }
}
