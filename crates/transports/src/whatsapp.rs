//! WhatsApp transport — same gateway protocol as SMS, plus a `wa.me`
//! manual-send link the operations team can use when the gateway is down.

use async_trait::async_trait;
use url::Url;

use remesa_common::config::GatewayConfig;
use remesa_common::types::{Channel, DeliveryContext, RenderedMessage, SendOutcome};

use crate::gateway::{format_recipient, send_via_gateway};
use crate::Transport;

pub struct WhatsappTransport {
    client: reqwest::Client,
    gateway: Option<GatewayConfig>,
}

impl WhatsappTransport {
    pub fn new(gateway: Option<GatewayConfig>) -> Self {
        Self {
            client: crate::http_client(),
            gateway,
        }
    }
}

/// Build a `https://wa.me/<digits>?text=…` link for manual sending.
pub fn manual_send_link(digits: &str, text: &str) -> String {
    let base = format!("https://wa.me/{}", digits);
    match Url::parse(&base) {
        Ok(mut url) => {
            url.query_pairs_mut().append_pair("text", text);
            url.to_string()
        }
        Err(_) => base,
    }
}

#[async_trait]
impl Transport for WhatsappTransport {
    fn channel(&self) -> Channel {
        Channel::Whatsapp
    }

    async fn send(
        &self,
        recipient: &str,
        message: &RenderedMessage,
        _ctx: &DeliveryContext,
    ) -> SendOutcome {
        let to = format_recipient(recipient);
        if to.is_empty() {
            return SendOutcome::transient(format!("recipient '{}' has no digits", recipient));
        }
        let link = manual_send_link(&to, &message.text);

        let Some(gateway) = &self.gateway else {
            return SendOutcome::not_configured("WhatsApp gateway credentials are not set")
                .with_fallback_link(link);
        };

        let outcome = send_via_gateway(&self.client, gateway, &to, &message.text).await;
        if outcome.success {
            tracing::info!(to = %to, "WhatsApp message accepted by gateway");
        } else {
            tracing::warn!(to = %to, error = ?outcome.error, "WhatsApp delivery failed");
        }
        outcome.with_fallback_link(link)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_manual_send_link_encodes_text() {
        let link = manual_send_link("5355512345", "Hola Ana, monto 50");
        assert!(link.starts_with("https://wa.me/5355512345?text="));
        assert!(!link.contains(' '));
    }

    #[test]
    fn test_manual_send_link_plain_digits() {
        let link = manual_send_link("17865551234", "ok");
        assert_eq!(link, "https://wa.me/17865551234?text=ok");
    }
}
