//! Channel transports for the notification delivery engine.
//!
//! Each delivery channel (SMS, WhatsApp, email, Web Push) implements the
//! [`Transport`] trait; the orchestrator and the retry scheduler dispatch
//! through a [`TransportRegistry`] keyed by channel instead of branching.
//!
//! Transports never return `Err` from their send path — every provider
//! error, network fault, or missing credential folds into a structured
//! [`SendOutcome`](remesa_common::types::SendOutcome).

pub mod email;
pub mod gateway;
pub mod push;
pub mod sms;
pub mod whatsapp;

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use sqlx::PgPool;

use remesa_common::config::AppConfig;
use remesa_common::types::{Channel, DeliveryContext, RenderedMessage, SendOutcome};

/// One delivery channel's send behavior.
#[async_trait]
pub trait Transport: Send + Sync {
    /// The channel this transport serves.
    fn channel(&self) -> Channel;

    /// Deliver a rendered message to a recipient address.
    ///
    /// `recipient` is channel-shaped: a phone number for SMS/WhatsApp, an
    /// email address for email, the owning user id for push.
    async fn send(
        &self,
        recipient: &str,
        message: &RenderedMessage,
        ctx: &DeliveryContext,
    ) -> SendOutcome;
}

/// Channel → implementation map used for dispatch.
#[derive(Clone, Default)]
pub struct TransportRegistry {
    inner: HashMap<Channel, Arc<dyn Transport>>,
}

impl TransportRegistry {
    pub fn new() -> Self {
        Self {
            inner: HashMap::new(),
        }
    }

    /// Build the full production registry from configuration.
    pub fn from_config(config: &AppConfig, pool: PgPool) -> Self {
        Self::new()
            .with(Arc::new(sms::SmsTransport::new(config.sms_gateway.clone())))
            .with(Arc::new(whatsapp::WhatsappTransport::new(
                config.whatsapp_gateway.clone(),
            )))
            .with(Arc::new(email::EmailTransport::from_config(config)))
            .with(Arc::new(push::PushTransport::new(
                pool,
                config.vapid.clone(),
                config.push_ttl_secs,
            )))
    }

    pub fn with(mut self, transport: Arc<dyn Transport>) -> Self {
        self.inner.insert(transport.channel(), transport);
        self
    }

    pub fn get(&self, channel: Channel) -> Option<Arc<dyn Transport>> {
        self.inner.get(&channel).cloned()
    }
}

/// Build a reqwest client with the transport-wide request timeout.
pub(crate) fn http_client() -> reqwest::Client {
    reqwest::Client::builder()
        .timeout(std::time::Duration::from_secs(15))
        .build()
        .unwrap_or_default()
}
