//! Template registry — per-type, per-channel message templates.
//!
//! Rows live in `notification_types` and change rarely; the registry loads
//! them lazily and caches by code for the process lifetime. The cache is an
//! explicit object owned by the orchestrator, reloadable on demand — stale
//! reads after a template edit last until `reload` or process restart, which
//! is acceptable for copy changes.

use std::collections::HashMap;
use std::sync::Arc;

use sqlx::PgPool;
use tokio::sync::RwLock;

use remesa_common::error::AppError;
use remesa_common::types::{Channel, NotificationType, PushContent, RenderedMessage};

pub struct TemplateRegistry {
    pool: PgPool,
    cache: RwLock<HashMap<String, Arc<NotificationType>>>,
}

impl TemplateRegistry {
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool,
            cache: RwLock::new(HashMap::new()),
        }
    }

    /// Look up a notification type by code, hitting the database only on the
    /// first request per code.
    pub async fn get(&self, code: &str) -> Result<Arc<NotificationType>, AppError> {
        if let Some(cached) = self.cache.read().await.get(code) {
            return Ok(cached.clone());
        }

        let row = sqlx::query_as::<_, NotificationType>(
            "SELECT * FROM notification_types WHERE code = $1",
        )
        .bind(code)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| AppError::UnknownType(code.to_string()))?;

        let ntype = Arc::new(row);
        self.cache
            .write()
            .await
            .insert(code.to_string(), ntype.clone());
        Ok(ntype)
    }

    /// Drop every cached type so the next lookups re-read the database.
    pub async fn reload(&self) {
        self.cache.write().await.clear();
        tracing::info!("Template cache cleared");
    }
}

/// Substitute `{key}` tokens from the data map.
///
/// Unresolved tokens are left literal — an incomplete data map degrades the
/// message text instead of failing the delivery.
pub fn interpolate(template: &str, data: &serde_json::Value) -> String {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;

    while let Some(start) = rest.find('{') {
        out.push_str(&rest[..start]);
        let token = &rest[start..];
        match token.find('}') {
            Some(end) => {
                let key = &token[1..end];
                match lookup(data, key) {
                    Some(value) => out.push_str(&value),
                    None => out.push_str(&token[..=end]),
                }
                rest = &token[end + 1..];
            }
            None => {
                out.push_str(token);
                return out;
            }
        }
    }

    out.push_str(rest);
    out
}

fn lookup(data: &serde_json::Value, key: &str) -> Option<String> {
    match data.get(key)? {
        serde_json::Value::String(s) => Some(s.clone()),
        serde_json::Value::Number(n) => Some(n.to_string()),
        serde_json::Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

/// Render the message content for one channel.
///
/// A missing template falls back to the type's display name so a channel is
/// never dispatched with an empty body.
pub fn render_channel_message(
    ntype: &NotificationType,
    channel: Channel,
    data: &serde_json::Value,
) -> RenderedMessage {
    let render = |template: &Option<String>| {
        interpolate(template.as_deref().unwrap_or(&ntype.display_name), data)
    };

    match channel {
        Channel::Sms => RenderedMessage {
            text: render(&ntype.sms_template),
            ..Default::default()
        },
        Channel::Whatsapp => RenderedMessage {
            text: render(&ntype.whatsapp_template),
            ..Default::default()
        },
        Channel::Email => RenderedMessage {
            text: render(&ntype.email_body_template),
            email_subject: Some(render(&ntype.email_subject_template)),
            push: None,
        },
        Channel::Push => {
            let body = render(&ntype.push_body_template);
            RenderedMessage {
                text: body.clone(),
                email_subject: None,
                push: Some(PushContent {
                    title: render(&ntype.push_title_template),
                    body,
                    icon: Some("/img/logo-192.png".to_string()),
                    data: data.clone(),
                }),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use remesa_common::types::Priority;

    #[test]
    fn test_interpolate_substitutes_tokens() {
        let data = serde_json::json!({"nombre": "Ana", "monto": 50});
        assert_eq!(
            interpolate("Hola {nombre}, monto {monto}", &data),
            "Hola Ana, monto 50"
        );
    }

    #[test]
    fn test_interpolate_leaves_unresolved_tokens_literal() {
        assert_eq!(
            interpolate("Hi {missing}", &serde_json::json!({})),
            "Hi {missing}"
        );
    }

    #[test]
    fn test_interpolate_unclosed_brace_kept() {
        let data = serde_json::json!({"a": "x"});
        assert_eq!(interpolate("{a} and {rest", &data), "x and {rest");
    }

    #[test]
    fn test_interpolate_ignores_non_scalar_values() {
        let data = serde_json::json!({"obj": {"inner": 1}});
        assert_eq!(interpolate("v={obj}", &data), "v={obj}");
    }

    fn make_type() -> NotificationType {
        NotificationType {
            code: "order_created".to_string(),
            display_name: "Remesa creada".to_string(),
            default_priority: Priority::Normal,
            sms_template: Some("SMS {codigo}".to_string()),
            whatsapp_template: Some("WA {codigo}".to_string()),
            push_title_template: Some("Remesa {codigo}".to_string()),
            push_body_template: Some("Monto {monto}".to_string()),
            email_subject_template: Some("Tu remesa {codigo}".to_string()),
            email_body_template: Some("Hola {nombre}".to_string()),
        }
    }

    #[test]
    fn test_render_per_channel() {
        let ntype = make_type();
        let data = serde_json::json!({"codigo": "RM-1", "monto": 50, "nombre": "Ana"});

        let sms = render_channel_message(&ntype, Channel::Sms, &data);
        assert_eq!(sms.text, "SMS RM-1");
        assert!(sms.push.is_none());

        let email = render_channel_message(&ntype, Channel::Email, &data);
        assert_eq!(email.text, "Hola Ana");
        assert_eq!(email.email_subject.as_deref(), Some("Tu remesa RM-1"));

        let push = render_channel_message(&ntype, Channel::Push, &data);
        let content = push.push.expect("push content");
        assert_eq!(content.title, "Remesa RM-1");
        assert_eq!(content.body, "Monto 50");
        assert_eq!(push.text, "Monto 50");
    }

    #[test]
    fn test_render_missing_template_falls_back_to_display_name() {
        let mut ntype = make_type();
        ntype.sms_template = None;
        let message = render_channel_message(&ntype, Channel::Sms, &serde_json::json!({}));
        assert_eq!(message.text, "Remesa creada");
    }
}
