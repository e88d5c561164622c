use std::env;

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub port: u16,
    pub database_url: String,
    pub default_timezone: String,
    pub twilio_account_sid: String,
    pub twilio_auth_token: String,
    pub twilio_whatsapp_number: String,
    pub stripe_api_base: String,
    pub webhook_tolerance_secs: i64,
}

impl AppConfig {
    pub fn from_env() -> Self {
        Self {
            port: env::var("PORT")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(3000),
            database_url: env::var("DATABASE_URL").unwrap_or_else(|_| "padelyzer.db".to_string()),
            default_timezone: env::var("DEFAULT_TIMEZONE")
                .unwrap_or_else(|_| "America/Mexico_City".to_string()),
            twilio_account_sid: env::var("TWILIO_ACCOUNT_SID").unwrap_or_default(),
            twilio_auth_token: env::var("TWILIO_AUTH_TOKEN").unwrap_or_default(),
            twilio_whatsapp_number: env::var("TWILIO_WHATSAPP_NUMBER").unwrap_or_default(),
            stripe_api_base: env::var("STRIPE_API_BASE")
                .unwrap_or_else(|_| "https://api.stripe.com".to_string()),
            webhook_tolerance_secs: env::var("WEBHOOK_TOLERANCE_SECS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(300),
        }
    }

    /// Whether outbound WhatsApp notifications can be sent at all.
    pub fn messaging_enabled(&self) -> bool {
        !self.twilio_account_sid.is_empty() && !self.twilio_whatsapp_number.is_empty()
    }
}
