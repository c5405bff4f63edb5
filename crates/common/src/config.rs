use serde::Deserialize;

/// Credentials for an HTTP messaging gateway (SMS or WhatsApp).
#[derive(Debug, Clone, Deserialize)]
pub struct GatewayConfig {
    pub url: String,
    pub username: String,
    pub password: String,
}

/// Application-server identification for Web Push delivery.
///
/// Only the public key and subject are carried — the claims this system
/// sends are unsigned, so no private key is needed.
#[derive(Debug, Clone, Deserialize)]
pub struct VapidConfig {
    /// base64url-encoded uncompressed P-256 public key (65 bytes).
    pub public_key: String,
    /// Contact subject, sent as `mailto:` in the claims.
    pub subject: String,
}

/// Global application configuration loaded from environment variables.
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    /// PostgreSQL connection string
    pub database_url: String,

    /// Maximum number of PostgreSQL connections in the pool (default: 20)
    pub db_max_connections: u32,

    /// SMS gateway credentials; absent → SMS channel reports a config failure
    pub sms_gateway: Option<GatewayConfig>,

    /// WhatsApp gateway credentials; absent → WhatsApp channel reports a config failure
    pub whatsapp_gateway: Option<GatewayConfig>,

    /// Resend API key — first in the email provider precedence
    pub resend_api_key: Option<String>,

    /// SendGrid API key — used when Resend is not configured
    pub sendgrid_api_key: Option<String>,

    /// Email sender address
    pub email_from: Option<String>,

    /// Web Push VAPID identification; absent → push channel reports a config failure
    pub vapid: Option<VapidConfig>,

    /// TTL header for push messages in seconds (default: 3600)
    pub push_ttl_secs: u32,
}

impl AppConfig {
    /// Load configuration from environment variables.
    pub fn from_env() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();

        Ok(Self {
            database_url: std::env::var("DATABASE_URL")
                .map_err(|_| anyhow::anyhow!("DATABASE_URL environment variable is required"))?,
            db_max_connections: std::env::var("DB_MAX_CONNECTIONS")
                .unwrap_or_else(|_| "20".to_string())
                .parse()
                .map_err(|_| anyhow::anyhow!("DB_MAX_CONNECTIONS must be a valid u32"))?,
            sms_gateway: gateway_from_env("SMS_GATEWAY")?,
            whatsapp_gateway: gateway_from_env("WHATSAPP_GATEWAY")?,
            resend_api_key: optional_var("RESEND_API_KEY"),
            sendgrid_api_key: optional_var("SENDGRID_API_KEY"),
            email_from: optional_var("EMAIL_FROM"),
            vapid: vapid_from_env(),
            push_ttl_secs: std::env::var("PUSH_TTL_SECS")
                .unwrap_or_else(|_| "3600".to_string())
                .parse()
                .map_err(|_| anyhow::anyhow!("PUSH_TTL_SECS must be a valid u32"))?,
        })
    }

    /// Whether an email provider can be selected at all.
    pub fn email_configured(&self) -> bool {
        self.email_from.is_some()
            && (self.resend_api_key.is_some() || self.sendgrid_api_key.is_some())
    }
}

fn optional_var(name: &str) -> Option<String> {
    std::env::var(name)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

/// Read `<PREFIX>_URL` / `<PREFIX>_USERNAME` / `<PREFIX>_PASSWORD` as a unit.
///
/// All three present → configured; all three absent → not configured;
/// anything in between is a startup error rather than a silent half-config.
fn gateway_from_env(prefix: &str) -> anyhow::Result<Option<GatewayConfig>> {
    let url = optional_var(&format!("{}_URL", prefix));
    let username = optional_var(&format!("{}_USERNAME", prefix));
    let password = optional_var(&format!("{}_PASSWORD", prefix));

    match (url, username, password) {
        (None, None, None) => Ok(None),
        (Some(url), Some(username), Some(password)) => Ok(Some(GatewayConfig {
            url,
            username,
            password,
        })),
        _ => anyhow::bail!(
            "{prefix}_URL, {prefix}_USERNAME and {prefix}_PASSWORD must be set together"
        ),
    }
}

fn vapid_from_env() -> Option<VapidConfig> {
    let public_key = optional_var("VAPID_PUBLIC_KEY")?;
    let subject = optional_var("VAPID_SUBJECT")
        .unwrap_or_else(|| "soporte@remesarelay.com".to_string());
    Some(VapidConfig {
        public_key,
        subject,
    })
}
