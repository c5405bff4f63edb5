//! SMS transport — delivers via the configured HTTP gateway.

use async_trait::async_trait;

use remesa_common::config::GatewayConfig;
use remesa_common::types::{Channel, DeliveryContext, RenderedMessage, SendOutcome};

use crate::gateway::{format_recipient, send_via_gateway};
use crate::Transport;

pub struct SmsTransport {
    client: reqwest::Client,
    gateway: Option<GatewayConfig>,
}

impl SmsTransport {
    pub fn new(gateway: Option<GatewayConfig>) -> Self {
        Self {
            client: crate::http_client(),
            gateway,
        }
    }
}

#[async_trait]
impl Transport for SmsTransport {
    fn channel(&self) -> Channel {
        Channel::Sms
    }

    async fn send(
        &self,
        recipient: &str,
        message: &RenderedMessage,
        _ctx: &DeliveryContext,
    ) -> SendOutcome {
        let Some(gateway) = &self.gateway else {
            return SendOutcome::not_configured("SMS gateway credentials are not set");
        };

        let to = format_recipient(recipient);
        if to.is_empty() {
            return SendOutcome::transient(format!("recipient '{}' has no digits", recipient));
        }

        let outcome = send_via_gateway(&self.client, gateway, &to, &message.text).await;
        if outcome.success {
            tracing::info!(to = %to, "SMS accepted by gateway");
        } else {
            tracing::warn!(to = %to, error = ?outcome.error, "SMS delivery failed");
        }
        outcome
    }
}
