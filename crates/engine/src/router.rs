//! Channel router — decides which channels reach a recipient.
//!
//! The heuristic is phone-prefix based: US numbers get SMS, Cuban numbers
//! get WhatsApp, anything else defaults to WhatsApp (the dominant channel on
//! the receiving side of this corridor). Per-user preferences can drop
//! channels afterwards; preference parsing fails open so a corrupt blob
//! never silences a user entirely.

use sqlx::PgPool;
use uuid::Uuid;

use remesa_common::types::{Channel, ChannelPreferences};

/// Coarse locale classification of a phone number.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PhoneLocale {
    UnitedStates,
    Cuba,
    Unknown,
}

pub struct ChannelRouter;

impl ChannelRouter {
    pub fn new() -> Self {
        Self
    }

    /// Classify a phone number by its country prefix.
    pub fn detect_locale(phone: &str) -> PhoneLocale {
        let digits: String = phone.chars().filter(|c| c.is_ascii_digit()).collect();

        if digits.starts_with("001") || digits.starts_with('1') {
            PhoneLocale::UnitedStates
        } else if digits.starts_with("53") {
            PhoneLocale::Cuba
        } else {
            PhoneLocale::Unknown
        }
    }

    /// Multi-channel heuristic used by the orchestrator's main path.
    pub fn resolve(&self, phone: &str) -> Vec<Channel> {
        match Self::detect_locale(phone) {
            PhoneLocale::UnitedStates => vec![Channel::Sms],
            PhoneLocale::Cuba => vec![Channel::Whatsapp],
            PhoneLocale::Unknown => vec![Channel::Whatsapp],
        }
    }

    /// Single-channel pick with an SMS fallback for unknown prefixes.
    ///
    /// Only the single-channel send helper uses the fallback; the
    /// multi-channel path never adds SMS for unknown numbers.
    pub fn preferred_with_fallback(&self, phone: &str) -> (Channel, Option<Channel>) {
        match Self::detect_locale(phone) {
            PhoneLocale::UnitedStates => (Channel::Sms, None),
            PhoneLocale::Cuba => (Channel::Whatsapp, None),
            PhoneLocale::Unknown => (Channel::Whatsapp, Some(Channel::Sms)),
        }
    }

    /// Drop channels the user disabled in their preference blob.
    ///
    /// A missing user row, absent blob, or unparsable JSON leaves the list
    /// unchanged.
    pub async fn filter_by_preferences(
        &self,
        pool: &PgPool,
        user_id: Uuid,
        channels: Vec<Channel>,
    ) -> Vec<Channel> {
        let row: Result<Option<(Option<serde_json::Value>,)>, sqlx::Error> =
            sqlx::query_as("SELECT notification_prefs FROM users WHERE id = $1")
                .bind(user_id)
                .fetch_optional(pool)
                .await;

        match row {
            Ok(Some((Some(blob),))) => apply_preferences(channels, &blob),
            Ok(_) => channels,
            Err(e) => {
                tracing::warn!(user_id = %user_id, error = %e, "Preference lookup failed");
                channels
            }
        }
    }
}

impl Default for ChannelRouter {
    fn default() -> Self {
        Self::new()
    }
}

/// Pure half of the preference filter, parse failures fail open.
pub fn apply_preferences(channels: Vec<Channel>, blob: &serde_json::Value) -> Vec<Channel> {
    let Ok(prefs) = serde_json::from_value::<ChannelPreferences>(blob.clone()) else {
        return channels;
    };
    channels
        .into_iter()
        .filter(|channel| prefs.allows(*channel))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_detect_locale_us() {
        assert_eq!(
            ChannelRouter::detect_locale("+17865551234"),
            PhoneLocale::UnitedStates
        );
        assert_eq!(
            ChannelRouter::detect_locale("0017865551234"),
            PhoneLocale::UnitedStates
        );
    }

    #[test]
    fn test_detect_locale_cuba() {
        assert_eq!(ChannelRouter::detect_locale("+5355512345"), PhoneLocale::Cuba);
        assert_eq!(
            ChannelRouter::detect_locale("5353 5551 234"),
            PhoneLocale::Cuba
        );
    }

    #[test]
    fn test_detect_locale_unknown() {
        assert_eq!(
            ChannelRouter::detect_locale("+447911123456"),
            PhoneLocale::Unknown
        );
    }

    #[test]
    fn test_resolve_prefers_channel_by_locale() {
        let router = ChannelRouter::new();
        assert_eq!(router.resolve("+17865551234"), vec![Channel::Sms]);
        assert_eq!(router.resolve("+5355512345"), vec![Channel::Whatsapp]);
        assert_eq!(router.resolve("+447911123456"), vec![Channel::Whatsapp]);
    }

    #[test]
    fn test_fallback_only_for_unknown() {
        let router = ChannelRouter::new();
        assert_eq!(
            router.preferred_with_fallback("+17865551234"),
            (Channel::Sms, None)
        );
        assert_eq!(
            router.preferred_with_fallback("+447911123456"),
            (Channel::Whatsapp, Some(Channel::Sms))
        );
    }

    #[test]
    fn test_apply_preferences_drops_disabled() {
        let channels = vec![Channel::Sms, Channel::Whatsapp, Channel::Push];
        let blob = serde_json::json!({"whatsapp": false});
        assert_eq!(
            apply_preferences(channels, &blob),
            vec![Channel::Sms, Channel::Push]
        );
    }

    #[test]
    fn test_apply_preferences_unparsable_fails_open() {
        let channels = vec![Channel::Sms, Channel::Whatsapp];
        let blob = serde_json::json!("not an object");
        assert_eq!(apply_preferences(channels.clone(), &blob), channels);
    }
}
