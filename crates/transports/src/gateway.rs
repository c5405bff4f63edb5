//! Shared plumbing for the SMS and WhatsApp HTTP gateways.
//!
//! Both channels speak the same protocol: a form-encoded POST with HTTP
//! Basic authentication. A 2xx response means the gateway accepted the
//! message (provider-side delivery is not observable from here).

use remesa_common::config::GatewayConfig;
use remesa_common::types::SendOutcome;

/// Normalize a raw phone number to the international digit form gateways
/// expect: strip everything but digits, prepend `1` iff the result is a
/// bare 10-digit national number without a recognized country prefix.
pub fn format_recipient(raw: &str) -> String {
    let digits: String = raw.chars().filter(|c| c.is_ascii_digit()).collect();
    if digits.len() == 10 && !digits.starts_with("53") {
        format!("1{}", digits)
    } else {
        digits
    }
}

/// POST a message through a gateway and fold the response into an outcome.
pub async fn send_via_gateway(
    client: &reqwest::Client,
    gateway: &GatewayConfig,
    to: &str,
    message: &str,
) -> SendOutcome {
    let result = client
        .post(&gateway.url)
        .basic_auth(&gateway.username, Some(&gateway.password))
        .form(&[("to", to), ("message", message)])
        .send()
        .await;

    match result {
        Ok(response) if response.status().is_success() => {
            let provider_id = response
                .json::<serde_json::Value>()
                .await
                .ok()
                .and_then(|body| extract_provider_id(&body));
            SendOutcome::ok(provider_id)
        }
        Ok(response) => {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            SendOutcome::transient(format!(
                "gateway returned {}: {}",
                status,
                truncate(&body, 300)
            ))
        }
        Err(e) => SendOutcome::transient(format!("gateway request failed: {}", e)),
    }
}

/// Pull a message identifier out of a gateway response body.
///
/// Gateways disagree on the field name; `id` and `message_id` cover the
/// deployed ones.
fn extract_provider_id(body: &serde_json::Value) -> Option<String> {
    for key in ["id", "message_id"] {
        if let Some(v) = body.get(key) {
            if let Some(s) = v.as_str() {
                return Some(s.to_string());
            }
            if v.is_number() {
                return Some(v.to_string());
            }
        }
    }
    None
}

/// Cap provider error bodies before they land in a delivery record.
pub(crate) fn truncate(input: &str, max_chars: usize) -> String {
    if input.chars().count() <= max_chars {
        return input.to_string();
    }
    input.chars().take(max_chars).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_recipient_us_national() {
        assert_eq!(format_recipient("(786) 555-1234"), "17865551234");
        assert_eq!(format_recipient("786-555-1234"), "17865551234");
    }

    #[test]
    fn test_format_recipient_already_prefixed() {
        assert_eq!(format_recipient("+1 786 555 1234"), "17865551234");
    }

    #[test]
    fn test_format_recipient_cuban_number_not_prefixed() {
        // 10 digits starting with the 53 country code stay as-is.
        assert_eq!(format_recipient("+5355512345"), "5355512345");
    }

    #[test]
    fn test_format_recipient_strips_non_digits() {
        assert_eq!(format_recipient("+53 5 551-2345"), "5355512345");
    }

    #[test]
    fn test_extract_provider_id_variants() {
        assert_eq!(
            extract_provider_id(&serde_json::json!({"id": "abc-1"})),
            Some("abc-1".to_string())
        );
        assert_eq!(
            extract_provider_id(&serde_json::json!({"message_id": 42})),
            Some("42".to_string())
        );
        assert_eq!(extract_provider_id(&serde_json::json!({"ok": true})), None);
    }

    #[test]
    fn test_truncate_caps_long_bodies() {
        let long = "x".repeat(500);
        assert_eq!(truncate(&long, 300).len(), 300);
        assert_eq!(truncate("short", 300), "short");
    }
}
