//! Email transport with pluggable providers.
//!
//! Provider selection follows configuration precedence: Resend when its API
//! key is present, otherwise SendGrid. Both need `EMAIL_FROM`. The HTML body
//! is a fixed branded wrapper around the rendered text, embedding order
//! summary fields and a tracking call-to-action when a link is present.

use async_trait::async_trait;
use std::sync::Arc;

use remesa_common::config::AppConfig;
use remesa_common::types::{Channel, DeliveryContext, RenderedMessage, SendOutcome};

use crate::gateway::truncate;
use crate::Transport;

/// A concrete email delivery backend.
#[async_trait]
pub trait EmailProvider: Send + Sync {
    fn name(&self) -> &'static str;

    async fn send(&self, to: &str, subject: &str, html: &str, text: &str) -> SendOutcome;
}

// ---------------------------------------------------------------------------
// Resend
// ---------------------------------------------------------------------------

pub struct ResendProvider {
    client: reqwest::Client,
    api_key: String,
    from: String,
}

impl ResendProvider {
    pub fn new(api_key: String, from: String) -> Self {
        Self {
            client: crate::http_client(),
            api_key,
            from,
        }
    }
}

#[async_trait]
impl EmailProvider for ResendProvider {
    fn name(&self) -> &'static str {
        "resend"
    }

    async fn send(&self, to: &str, subject: &str, html: &str, text: &str) -> SendOutcome {
        let body = serde_json::json!({
            "from": self.from,
            "to": [to],
            "subject": subject,
            "html": html,
            "text": text,
        });

        let result = self
            .client
            .post("https://api.resend.com/emails")
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await;

        match result {
            Ok(response) if response.status().is_success() => {
                let provider_id = response
                    .json::<serde_json::Value>()
                    .await
                    .ok()
                    .and_then(|v| v.get("id").and_then(|id| id.as_str()).map(String::from));
                SendOutcome::ok(provider_id)
            }
            Ok(response) => {
                let status = response.status();
                let body = response.text().await.unwrap_or_default();
                SendOutcome::transient(format!(
                    "resend returned {}: {}",
                    status,
                    truncate(&body, 300)
                ))
            }
            Err(e) => SendOutcome::transient(format!("resend request failed: {}", e)),
        }
    }
}

// ---------------------------------------------------------------------------
// SendGrid
// ---------------------------------------------------------------------------

pub struct SendGridProvider {
    client: reqwest::Client,
    api_key: String,
    from: String,
}

impl SendGridProvider {
    pub fn new(api_key: String, from: String) -> Self {
        Self {
            client: crate::http_client(),
            api_key,
            from,
        }
    }
}

#[async_trait]
impl EmailProvider for SendGridProvider {
    fn name(&self) -> &'static str {
        "sendgrid"
    }

    async fn send(&self, to: &str, subject: &str, html: &str, text: &str) -> SendOutcome {
        let body = serde_json::json!({
            "personalizations": [{ "to": [{ "email": to }] }],
            "from": { "email": self.from },
            "subject": subject,
            "content": [
                { "type": "text/plain", "value": text },
                { "type": "text/html", "value": html },
            ],
        });

        let result = self
            .client
            .post("https://api.sendgrid.com/v3/mail/send")
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await;

        match result {
            Ok(response) if response.status().is_success() => {
                // SendGrid returns 202 with the id in a header, not the body.
                let provider_id = response
                    .headers()
                    .get("X-Message-Id")
                    .and_then(|v| v.to_str().ok())
                    .map(String::from);
                SendOutcome::ok(provider_id)
            }
            Ok(response) => {
                let status = response.status();
                let body = response.text().await.unwrap_or_default();
                SendOutcome::transient(format!(
                    "sendgrid returned {}: {}",
                    status,
                    truncate(&body, 300)
                ))
            }
            Err(e) => SendOutcome::transient(format!("sendgrid request failed: {}", e)),
        }
    }
}

// ---------------------------------------------------------------------------
// Transport
// ---------------------------------------------------------------------------

pub struct EmailTransport {
    provider: Option<Arc<dyn EmailProvider>>,
}

impl EmailTransport {
    pub fn new(provider: Option<Arc<dyn EmailProvider>>) -> Self {
        Self { provider }
    }

    /// Select a provider by configuration precedence: Resend, then SendGrid.
    pub fn from_config(config: &AppConfig) -> Self {
        let provider: Option<Arc<dyn EmailProvider>> = match (&config.email_from, &config.resend_api_key, &config.sendgrid_api_key) {
            (Some(from), Some(key), _) => {
                Some(Arc::new(ResendProvider::new(key.clone(), from.clone())))
            }
            (Some(from), None, Some(key)) => {
                Some(Arc::new(SendGridProvider::new(key.clone(), from.clone())))
            }
            _ => None,
        };
        Self { provider }
    }
}

#[async_trait]
impl Transport for EmailTransport {
    fn channel(&self) -> Channel {
        Channel::Email
    }

    async fn send(
        &self,
        recipient: &str,
        message: &RenderedMessage,
        ctx: &DeliveryContext,
    ) -> SendOutcome {
        let Some(provider) = &self.provider else {
            return SendOutcome::not_configured("no email provider is configured");
        };

        if !recipient.contains('@') {
            return SendOutcome::transient(format!("'{}' is not an email address", recipient));
        }

        let subject = message
            .email_subject
            .clone()
            .unwrap_or_else(|| "Notificación de tu remesa".to_string());
        let html = branded_html(&message.text, &ctx.data);

        let outcome = provider
            .send(recipient, &subject, &html, &message.text)
            .await;
        if outcome.success {
            tracing::info!(to = %recipient, provider = provider.name(), "Email accepted");
        } else {
            tracing::warn!(
                to = %recipient,
                provider = provider.name(),
                error = ?outcome.error,
                "Email delivery failed"
            );
        }
        outcome
    }
}

/// Wrap the rendered text in the branded HTML layout.
///
/// Embeds the order summary fields present in the data map and a tracking
/// button when `enlace` is set. Missing fields simply collapse their row.
pub fn branded_html(text: &str, data: &serde_json::Value) -> String {
    let mut summary_rows = String::new();
    for (label, key) in [
        ("Código", "codigo"),
        ("Monto", "monto"),
        ("Total con entrega", "total"),
        ("Beneficiario", "beneficiario"),
    ] {
        if let Some(value) = field_text(data, key) {
            summary_rows.push_str(&format!(
                "<tr><td style=\"padding:4px 12px 4px 0;color:#6b7280;\">{}</td>\
                 <td style=\"padding:4px 0;font-weight:600;\">{}</td></tr>",
                label, value
            ));
        }
    }

    let tracking = match field_text(data, "enlace") {
        Some(url) => format!(
            "<p style=\"margin:24px 0;\"><a href=\"{}\" \
             style=\"background:#0e7a3d;color:#ffffff;padding:12px 24px;\
             border-radius:6px;text-decoration:none;\">Seguir mi remesa</a></p>",
            url
        ),
        None => String::new(),
    };

    format!(
        "<!DOCTYPE html>\
         <html><body style=\"margin:0;background:#f3f4f6;font-family:Arial,sans-serif;\">\
         <div style=\"max-width:560px;margin:0 auto;padding:24px;\">\
         <div style=\"background:#0e7a3d;color:#ffffff;padding:16px 24px;\
         border-radius:8px 8px 0 0;font-size:18px;font-weight:700;\">RemesaRelay</div>\
         <div style=\"background:#ffffff;padding:24px;border-radius:0 0 8px 8px;\">\
         <p style=\"font-size:15px;color:#111827;\">{}</p>\
         <table style=\"font-size:14px;border-collapse:collapse;\">{}</table>\
         {}\
         <p style=\"font-size:12px;color:#9ca3af;margin-top:32px;\">\
         Este es un mensaje automático, por favor no respondas a este correo.</p>\
         </div></div></body></html>",
        text, summary_rows, tracking
    )
}

fn field_text(data: &serde_json::Value, key: &str) -> Option<String> {
    data.get(key).and_then(|v| match v {
        serde_json::Value::String(s) => Some(s.clone()),
        serde_json::Value::Number(n) => Some(n.to_string()),
        _ => None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_branded_html_embeds_summary_and_tracking() {
        let data = serde_json::json!({
            "codigo": "RM-2024-00731",
            "monto": 150,
            "beneficiario": "Ana Pérez",
            "enlace": "https://remesarelay.com/t/RM-2024-00731",
        });
        let html = branded_html("Tu remesa va en camino.", &data);
        assert!(html.contains("RM-2024-00731"));
        assert!(html.contains("Ana Pérez"));
        assert!(html.contains("Seguir mi remesa"));
        assert!(html.contains("Tu remesa va en camino."));
    }

    #[test]
    fn test_branded_html_without_tracking_link() {
        let html = branded_html("Hola.", &serde_json::json!({"codigo": "RM-1"}));
        assert!(html.contains("RM-1"));
        assert!(!html.contains("Seguir mi remesa"));
    }
}
