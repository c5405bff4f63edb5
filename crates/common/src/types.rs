use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Delivery channels supported by the notification core.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "text", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum Channel {
    Sms,
    Whatsapp,
    Push,
    Email,
}

impl std::fmt::Display for Channel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Channel::Sms => write!(f, "sms"),
            Channel::Whatsapp => write!(f, "whatsapp"),
            Channel::Push => write!(f, "push"),
            Channel::Email => write!(f, "email"),
        }
    }
}

/// Lifecycle state of a delivery record.
///
/// `sent` and `delivered` are terminal; `failed` is terminal once the retry
/// budget is exhausted. `delivered` is only ever written by external
/// provider-callback collaborators — the core stops at provider acceptance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "text", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum DeliveryState {
    Pending,
    Sending,
    Sent,
    Failed,
    Delivered,
}

impl std::fmt::Display for DeliveryState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DeliveryState::Pending => write!(f, "pending"),
            DeliveryState::Sending => write!(f, "sending"),
            DeliveryState::Sent => write!(f, "sent"),
            DeliveryState::Failed => write!(f, "failed"),
            DeliveryState::Delivered => write!(f, "delivered"),
        }
    }
}

/// Default priority attached to a notification type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "text", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    Low,
    Normal,
    High,
}

impl std::fmt::Display for Priority {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Priority::Low => write!(f, "low"),
            Priority::Normal => write!(f, "normal"),
            Priority::High => write!(f, "high"),
        }
    }
}

/// The closed set of notification type codes emitted by domain collaborators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationKind {
    OrderCreated,
    OrderApproved,
    OrderInTransit,
    OrderDelivered,
    NewRequestAdmin,
    NewCourierAssignment,
    PaymentReceived,
}

impl NotificationKind {
    /// Stable code used as the `notification_types` primary key.
    pub fn code(&self) -> &'static str {
        match self {
            NotificationKind::OrderCreated => "order_created",
            NotificationKind::OrderApproved => "order_approved",
            NotificationKind::OrderInTransit => "order_in_transit",
            NotificationKind::OrderDelivered => "order_delivered",
            NotificationKind::NewRequestAdmin => "new_request_admin",
            NotificationKind::NewCourierAssignment => "new_courier_assignment",
            NotificationKind::PaymentReceived => "payment_received",
        }
    }

    pub fn from_code(code: &str) -> Option<Self> {
        match code {
            "order_created" => Some(NotificationKind::OrderCreated),
            "order_approved" => Some(NotificationKind::OrderApproved),
            "order_in_transit" => Some(NotificationKind::OrderInTransit),
            "order_delivered" => Some(NotificationKind::OrderDelivered),
            "new_request_admin" => Some(NotificationKind::NewRequestAdmin),
            "new_courier_assignment" => Some(NotificationKind::NewCourierAssignment),
            "payment_received" => Some(NotificationKind::PaymentReceived),
            _ => None,
        }
    }
}

impl std::fmt::Display for NotificationKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.code())
    }
}

/// A persisted delivery record — one row per (notification, channel).
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct NotificationRecord {
    pub id: Uuid,
    /// Owning user, when the recipient is a registered account.
    pub user_id: Option<Uuid>,
    /// Domain-object reference (remittance order id); no FK, owned externally.
    pub order_id: Option<Uuid>,
    pub type_code: String,
    pub channel: Channel,
    pub recipient: String,
    /// Rendered message text as handed to the transport.
    pub message: String,
    pub state: DeliveryState,
    pub error_detail: Option<String>,
    pub provider_message_id: Option<String>,
    pub attempts: i32,
    pub max_attempts: i32,
    pub next_retry_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub sent_at: Option<DateTime<Utc>>,
}

/// A notification type definition with per-channel templates.
///
/// Rows are seeded by migration and edited administratively; the engine
/// caches them by code for the process lifetime (reloadable on demand).
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct NotificationType {
    pub code: String,
    pub display_name: String,
    pub default_priority: Priority,
    pub sms_template: Option<String>,
    pub whatsapp_template: Option<String>,
    pub push_title_template: Option<String>,
    pub push_body_template: Option<String>,
    pub email_subject_template: Option<String>,
    pub email_body_template: Option<String>,
}

/// A browser push subscription registered by a client.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct PushSubscription {
    pub id: Uuid,
    /// Absent for anonymous subscribers.
    pub user_id: Option<Uuid>,
    pub endpoint: String,
    /// Client public key, base64url-encoded uncompressed P-256 point.
    pub p256dh: String,
    /// Client auth secret, base64url-encoded 16 bytes.
    pub auth: String,
    pub active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Read model of the externally-owned account table.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct User {
    pub id: Uuid,
    pub name: String,
    pub phone: Option<String>,
    pub email: Option<String>,
    pub is_admin: bool,
    pub active: bool,
    pub notification_prefs: Option<serde_json::Value>,
}

/// Typed representation of a user's `notification_prefs` JSON blob.
///
/// Fields absent from the blob fall back to the channel defaults; a missing
/// or unparsable blob disables filtering entirely (fail-open).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChannelPreferences {
    #[serde(default = "default_true")]
    pub sms: bool,
    #[serde(default = "default_true")]
    pub whatsapp: bool,
    #[serde(default = "default_true")]
    pub push: bool,
    #[serde(default)]
    pub email: bool,
}

fn default_true() -> bool {
    true
}

impl Default for ChannelPreferences {
    fn default() -> Self {
        Self {
            sms: true,
            whatsapp: true,
            push: true,
            email: false,
        }
    }
}

impl ChannelPreferences {
    pub fn allows(&self, channel: Channel) -> bool {
        match channel {
            Channel::Sms => self.sms,
            Channel::Whatsapp => self.whatsapp,
            Channel::Push => self.push,
            Channel::Email => self.email,
        }
    }
}

/// The remittance-order fields collaborators hand to the orchestrator.
///
/// This is a value object bound into template data — the order itself lives
/// in the external business ledger.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RemesaOrder {
    pub id: Uuid,
    /// Human-facing order code (e.g. "RM-2024-00731").
    pub code: String,
    pub amount: f64,
    pub delivery_total: f64,
    pub currency: String,
    pub sender_name: String,
    pub sender_phone: String,
    pub sender_user_id: Option<Uuid>,
    pub beneficiary_name: String,
    pub beneficiary_phone: String,
    pub beneficiary_address: Option<String>,
    pub courier_phone: Option<String>,
    pub tracking_url: Option<String>,
}

/// Which party of an order a notification addresses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContactRole {
    Sender,
    Beneficiary,
    Courier,
}

impl std::fmt::Display for ContactRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ContactRole::Sender => write!(f, "sender"),
            ContactRole::Beneficiary => write!(f, "beneficiary"),
            ContactRole::Courier => write!(f, "courier"),
        }
    }
}

/// Rendered per-channel message content handed to a transport.
#[derive(Debug, Clone, Default)]
pub struct RenderedMessage {
    /// Plain text body — this is what the delivery record stores.
    pub text: String,
    /// Email-only subject line; retries fall back to the type display name.
    pub email_subject: Option<String>,
    /// Push-only structured content.
    pub push: Option<PushContent>,
}

/// Structured Web Push payload content.
#[derive(Debug, Clone, Serialize)]
pub struct PushContent {
    pub title: String,
    pub body: String,
    pub icon: Option<String>,
    pub data: serde_json::Value,
}

/// Invocation-scoped context a transport may need beyond the message text.
#[derive(Debug, Clone)]
pub struct DeliveryContext {
    pub kind: NotificationKind,
    pub priority: Priority,
    pub user_id: Option<Uuid>,
    pub order_id: Option<Uuid>,
    /// The template data map, for channel-specific formatting (email wrapper).
    pub data: serde_json::Value,
}

/// Classification of a failed transport call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// Transport credentials or required config absent — never retried.
    Configuration,
    /// Provider fault (5xx, network, rate limit) — retried with backoff.
    Transient,
    /// The recipient endpoint no longer exists (push 404/410) — terminal.
    RecipientGone,
}

/// Structured result of one transport call. Transports never return `Err`;
/// every failure path folds into this value.
#[derive(Debug, Clone)]
pub struct SendOutcome {
    pub success: bool,
    pub provider_message_id: Option<String>,
    pub error: Option<String>,
    pub failure: Option<FailureKind>,
    /// WhatsApp manual-send fallback link, when the gateway offers one.
    pub fallback_link: Option<String>,
}

impl SendOutcome {
    pub fn ok(provider_message_id: Option<String>) -> Self {
        Self {
            success: true,
            provider_message_id,
            error: None,
            failure: None,
            fallback_link: None,
        }
    }

    pub fn failed(kind: FailureKind, error: impl Into<String>) -> Self {
        Self {
            success: false,
            provider_message_id: None,
            error: Some(error.into()),
            failure: Some(kind),
            fallback_link: None,
        }
    }

    pub fn transient(error: impl Into<String>) -> Self {
        Self::failed(FailureKind::Transient, error)
    }

    pub fn not_configured(error: impl Into<String>) -> Self {
        Self::failed(FailureKind::Configuration, error)
    }

    pub fn recipient_gone(error: impl Into<String>) -> Self {
        Self::failed(FailureKind::RecipientGone, error)
    }

    pub fn with_fallback_link(mut self, link: String) -> Self {
        self.fallback_link = Some(link);
        self
    }
}

/// Per-channel result returned to the caller of the orchestrator.
#[derive(Debug, Clone, Serialize)]
pub struct ChannelDelivery {
    pub channel: Channel,
    pub success: bool,
    /// Persisted record id; `None` when delivery was skipped before a record
    /// existed (e.g. courier without a phone).
    pub record_id: Option<Uuid>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub provider_message_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fallback_link: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_code_round_trip() {
        for kind in [
            NotificationKind::OrderCreated,
            NotificationKind::OrderApproved,
            NotificationKind::OrderInTransit,
            NotificationKind::OrderDelivered,
            NotificationKind::NewRequestAdmin,
            NotificationKind::NewCourierAssignment,
            NotificationKind::PaymentReceived,
        ] {
            assert_eq!(NotificationKind::from_code(kind.code()), Some(kind));
        }
        assert_eq!(NotificationKind::from_code("unknown_thing"), None);
    }

    #[test]
    fn test_preferences_defaults() {
        let prefs: ChannelPreferences = serde_json::from_value(serde_json::json!({})).unwrap();
        assert!(prefs.allows(Channel::Sms));
        assert!(prefs.allows(Channel::Whatsapp));
        assert!(prefs.allows(Channel::Push));
        assert!(!prefs.allows(Channel::Email));
    }

    #[test]
    fn test_preferences_explicit_false_drops_channel() {
        let prefs: ChannelPreferences =
            serde_json::from_value(serde_json::json!({"whatsapp": false, "email": true})).unwrap();
        assert!(!prefs.allows(Channel::Whatsapp));
        assert!(prefs.allows(Channel::Email));
        assert!(prefs.allows(Channel::Sms));
    }
}
