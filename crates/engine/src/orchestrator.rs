//! Notification orchestrator — the public entry point for collaborators.
//!
//! One `send` call: resolve channels (router heuristic or explicit
//! override), render each channel's template, persist a `pending` record
//! *before* the transport call, dispatch, settle. Channels are dispatched
//! sequentially; a failing channel never aborts its siblings, and callers
//! only ever see per-channel results. The only synchronous error is an
//! unknown type code, surfaced before any record exists.

use serde_json::Value;
use sqlx::PgPool;
use uuid::Uuid;

use remesa_common::error::AppError;
use remesa_common::types::{
    Channel, ChannelDelivery, ContactRole, DeliveryContext, NotificationKind, NotificationType,
    RemesaOrder, SendOutcome, User,
};
use remesa_transports::TransportRegistry;

use crate::router::ChannelRouter;
use crate::store::{DEFAULT_MAX_ATTEMPTS, DeliveryStore, NewNotification};
use crate::templates::{TemplateRegistry, render_channel_message};

/// Options modifying a single `send` call.
#[derive(Debug, Clone, Default, serde::Deserialize)]
pub struct SendOptions {
    /// Explicit channel override; `None` applies the router heuristic.
    pub channels: Option<Vec<Channel>>,
    /// Skip the per-user preference filter (ops-critical notifications).
    #[serde(default)]
    pub skip_preferences: bool,
}

pub struct Orchestrator {
    pool: PgPool,
    store: DeliveryStore,
    templates: TemplateRegistry,
    router: ChannelRouter,
    transports: TransportRegistry,
    /// Whether admin fan-out also emails (requires a configured provider).
    admin_email: bool,
}

impl Orchestrator {
    pub fn new(pool: PgPool, transports: TransportRegistry, admin_email: bool) -> Self {
        Self {
            store: DeliveryStore::new(pool.clone()),
            templates: TemplateRegistry::new(pool.clone()),
            router: ChannelRouter::new(),
            pool,
            transports,
            admin_email,
        }
    }

    /// The template cache, exposed for the administrative reload endpoint.
    pub fn templates(&self) -> &TemplateRegistry {
        &self.templates
    }

    /// Render, persist, and dispatch one notification across its channels.
    ///
    /// `recipient` is the contact phone; email/push addresses are resolved
    /// from `data` and the owning user. Push is appended whenever the data
    /// map names an owning `user_id`.
    pub async fn send(
        &self,
        kind: NotificationKind,
        recipient: &str,
        data: Value,
        options: SendOptions,
    ) -> Result<Vec<ChannelDelivery>, AppError> {
        let ntype = self.templates.get(kind.code()).await?;
        let user_id = data_uuid(&data, "user_id");

        let mut channels = match options.channels {
            Some(channels) if !channels.is_empty() => channels,
            _ => self.router.resolve(recipient),
        };
        if user_id.is_some() && !channels.contains(&Channel::Push) {
            channels.push(Channel::Push);
        }
        if !options.skip_preferences
            && let Some(uid) = user_id
        {
            channels = self
                .router
                .filter_by_preferences(&self.pool, uid, channels)
                .await;
        }

        let mut results = Vec::with_capacity(channels.len());
        for channel in channels {
            results.push(
                self.dispatch_channel(&ntype, kind, channel, recipient, user_id, &data)
                    .await,
            );
        }
        Ok(results)
    }

    /// Single-channel convenience: the locale-preferred channel, with one
    /// SMS fallback attempt for unknown prefixes.
    pub async fn send_single(
        &self,
        kind: NotificationKind,
        phone: &str,
        data: Value,
    ) -> Result<ChannelDelivery, AppError> {
        let ntype = self.templates.get(kind.code()).await?;
        let user_id = data_uuid(&data, "user_id");
        let (primary, fallback) = self.router.preferred_with_fallback(phone);

        let first = self
            .dispatch_channel(&ntype, kind, primary, phone, user_id, &data)
            .await;
        if first.success {
            return Ok(first);
        }

        if let Some(fallback) = fallback {
            let second = self
                .dispatch_channel(&ntype, kind, fallback, phone, user_id, &data)
                .await;
            if second.success {
                return Ok(second);
            }
        }
        Ok(first)
    }

    /// Notify one party of a remittance order, binding the order fields
    /// into the template data.
    pub async fn send_order_notification(
        &self,
        kind: NotificationKind,
        order: &RemesaOrder,
        role: ContactRole,
        extra: Option<Value>,
    ) -> Result<Vec<ChannelDelivery>, AppError> {
        let Some(phone) = contact_phone(order, role) else {
            tracing::warn!(order = %order.code, role = %role, "No contact phone for role");
            return Ok(vec![no_contact_result(role)]);
        };

        let mut data = order_data(order, role);
        if let Some(Value::Object(map)) = extra {
            for (key, value) in map {
                data.insert(key, value);
            }
        }

        self.send(kind, &phone, Value::Object(data), SendOptions::default())
            .await
    }

    /// Fan a notification out to every active administrator: push always,
    /// email when a provider is configured.
    pub async fn send_to_admins(
        &self,
        kind: NotificationKind,
        data: Value,
    ) -> Result<Vec<ChannelDelivery>, AppError> {
        let ntype = self.templates.get(kind.code()).await?;

        let admins: Vec<User> =
            sqlx::query_as("SELECT * FROM users WHERE is_admin = true AND active = true")
                .fetch_all(&self.pool)
                .await?;
        if admins.is_empty() {
            tracing::warn!(kind = %kind, "No active administrators to notify");
            return Ok(Vec::new());
        }

        let mut results = Vec::new();
        for admin in &admins {
            results.push(
                self.dispatch_channel(&ntype, kind, Channel::Push, "", Some(admin.id), &data)
                    .await,
            );
            if self.admin_email
                && let Some(email) = &admin.email
            {
                results.push(
                    self.dispatch_channel(&ntype, kind, Channel::Email, email, Some(admin.id), &data)
                        .await,
                );
            }
        }
        Ok(results)
    }

    /// Run one channel end to end: address → render → persist → send →
    /// settle. Every failure folds into the returned result.
    async fn dispatch_channel(
        &self,
        ntype: &NotificationType,
        kind: NotificationKind,
        channel: Channel,
        recipient: &str,
        user_id: Option<Uuid>,
        data: &Value,
    ) -> ChannelDelivery {
        let address = match self.resolve_address(channel, recipient, user_id, data).await {
            Ok(address) => address,
            Err(reason) => return skipped(channel, reason),
        };

        let message = render_channel_message(ntype, channel, data);
        let order_id = data_uuid(data, "order_id");

        let new = NewNotification {
            user_id,
            order_id,
            kind,
            channel,
            recipient: address.clone(),
            message: message.text.clone(),
            max_attempts: DEFAULT_MAX_ATTEMPTS,
        };
        let record = match self.store.create_pending(&new).await {
            Ok(record) => record,
            Err(e) => return skipped(channel, format!("failed to persist record: {}", e)),
        };

        let ctx = DeliveryContext {
            kind,
            priority: ntype.default_priority,
            user_id,
            order_id,
            data: data.clone(),
        };
        let outcome = match self.transports.get(channel) {
            Some(transport) => transport.send(&address, &message, &ctx).await,
            None => SendOutcome::not_configured(format!(
                "no transport registered for channel {}",
                channel
            )),
        };

        match self.store.settle(&record, &outcome).await {
            Ok(settled) => ChannelDelivery {
                channel,
                success: outcome.success,
                record_id: Some(settled.id),
                provider_message_id: settled.provider_message_id,
                error: settled.error_detail,
                fallback_link: outcome.fallback_link,
            },
            Err(e) => {
                tracing::error!(
                    notification_id = %record.id,
                    channel = %channel,
                    error = %e,
                    "Failed to settle delivery record"
                );
                ChannelDelivery {
                    channel,
                    success: outcome.success,
                    record_id: Some(record.id),
                    provider_message_id: outcome.provider_message_id,
                    error: outcome.error,
                    fallback_link: outcome.fallback_link,
                }
            }
        }
    }

    /// Resolve the channel-shaped address for a recipient.
    async fn resolve_address(
        &self,
        channel: Channel,
        recipient: &str,
        user_id: Option<Uuid>,
        data: &Value,
    ) -> Result<String, String> {
        match channel {
            Channel::Sms | Channel::Whatsapp => {
                if recipient.trim().is_empty() {
                    Err("no phone number for recipient".to_string())
                } else {
                    Ok(recipient.to_string())
                }
            }
            Channel::Push => user_id
                .map(|uid| uid.to_string())
                .ok_or_else(|| "push delivery needs an owning user".to_string()),
            Channel::Email => {
                if recipient.contains('@') {
                    return Ok(recipient.to_string());
                }
                if let Some(email) = data.get("email").and_then(|v| v.as_str()) {
                    return Ok(email.to_string());
                }
                if let Some(uid) = user_id
                    && let Some(email) = self.user_email(uid).await
                {
                    return Ok(email);
                }
                Err("no email address for recipient".to_string())
            }
        }
    }

    async fn user_email(&self, user_id: Uuid) -> Option<String> {
        let row: Result<Option<(Option<String>,)>, sqlx::Error> =
            sqlx::query_as("SELECT email FROM users WHERE id = $1")
                .bind(user_id)
                .fetch_optional(&self.pool)
                .await;
        match row {
            Ok(Some((email,))) => email,
            _ => None,
        }
    }
}

/// Result for a channel skipped before any record existed.
fn skipped(channel: Channel, error: String) -> ChannelDelivery {
    ChannelDelivery {
        channel,
        success: false,
        record_id: None,
        provider_message_id: None,
        error: Some(error),
        fallback_link: None,
    }
}

fn no_contact_result(role: ContactRole) -> ChannelDelivery {
    skipped(
        Channel::Whatsapp,
        format!("no contact phone for {} on this order", role),
    )
}

fn contact_phone(order: &RemesaOrder, role: ContactRole) -> Option<String> {
    let phone = match role {
        ContactRole::Sender => Some(order.sender_phone.clone()),
        ContactRole::Beneficiary => Some(order.beneficiary_phone.clone()),
        ContactRole::Courier => order.courier_phone.clone(),
    };
    phone.filter(|p| !p.trim().is_empty())
}

/// Bind the order fields every template can reference.
fn order_data(order: &RemesaOrder, role: ContactRole) -> serde_json::Map<String, Value> {
    let mut data = serde_json::Map::new();
    data.insert("codigo".to_string(), Value::from(order.code.clone()));
    data.insert("monto".to_string(), Value::from(format!("{:.2}", order.amount)));
    data.insert(
        "total".to_string(),
        Value::from(format!("{:.2}", order.delivery_total)),
    );
    data.insert("moneda".to_string(), Value::from(order.currency.clone()));
    data.insert(
        "beneficiario".to_string(),
        Value::from(order.beneficiary_name.clone()),
    );
    if let Some(address) = &order.beneficiary_address {
        data.insert("direccion".to_string(), Value::from(address.clone()));
    }
    if let Some(url) = &order.tracking_url {
        data.insert("enlace".to_string(), Value::from(url.clone()));
    }
    data.insert("order_id".to_string(), Value::from(order.id.to_string()));

    // The greeting name is role-dependent; courier messages lead with the
    // beneficiary they deliver to.
    let nombre = match role {
        ContactRole::Sender => order.sender_name.clone(),
        ContactRole::Beneficiary | ContactRole::Courier => order.beneficiary_name.clone(),
    };
    data.insert("nombre".to_string(), Value::from(nombre));

    if role == ContactRole::Sender
        && let Some(uid) = order.sender_user_id
    {
        data.insert("user_id".to_string(), Value::from(uid.to_string()));
    }
    data
}

fn data_uuid(data: &Value, key: &str) -> Option<Uuid> {
    data.get(key)
        .and_then(|v| v.as_str())
        .and_then(|s| Uuid::parse_str(s).ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_order() -> RemesaOrder {
        RemesaOrder {
            id: Uuid::new_v4(),
            code: "RM-2024-00731".to_string(),
            amount: 150.0,
            delivery_total: 162.5,
            currency: "USD".to_string(),
            sender_name: "Carlos".to_string(),
            sender_phone: "+17865551234".to_string(),
            sender_user_id: Some(Uuid::new_v4()),
            beneficiary_name: "Ana".to_string(),
            beneficiary_phone: "+5355512345".to_string(),
            beneficiary_address: Some("Calle 23 #456, La Habana".to_string()),
            courier_phone: None,
            tracking_url: Some("https://remesarelay.com/t/RM-2024-00731".to_string()),
        }
    }

    #[test]
    fn test_contact_phone_by_role() {
        let order = make_order();
        assert_eq!(
            contact_phone(&order, ContactRole::Sender).as_deref(),
            Some("+17865551234")
        );
        assert_eq!(
            contact_phone(&order, ContactRole::Beneficiary).as_deref(),
            Some("+5355512345")
        );
        assert_eq!(contact_phone(&order, ContactRole::Courier), None);
    }

    #[test]
    fn test_no_contact_result_is_explicit_failure() {
        let result = no_contact_result(ContactRole::Courier);
        assert!(!result.success);
        assert!(result.record_id.is_none());
        assert!(result.error.as_deref().unwrap_or("").contains("courier"));
    }

    #[test]
    fn test_order_data_binds_fields_per_role() {
        let order = make_order();

        let sender = order_data(&order, ContactRole::Sender);
        assert_eq!(sender["nombre"], "Carlos");
        assert_eq!(sender["monto"], "150.00");
        assert_eq!(sender["total"], "162.50");
        assert_eq!(sender["codigo"], "RM-2024-00731");
        assert!(sender.contains_key("user_id"));

        let beneficiary = order_data(&order, ContactRole::Beneficiary);
        assert_eq!(beneficiary["nombre"], "Ana");
        // Only the sender has an account; no push binding for others.
        assert!(!beneficiary.contains_key("user_id"));
    }

    #[test]
    fn test_data_uuid_parses_only_valid_ids() {
        let id = Uuid::new_v4();
        let data = serde_json::json!({"user_id": id.to_string(), "order_id": "nope"});
        assert_eq!(data_uuid(&data, "user_id"), Some(id));
        assert_eq!(data_uuid(&data, "order_id"), None);
        assert_eq!(data_uuid(&data, "missing"), None);
    }
}
