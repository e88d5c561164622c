use std::sync::{Arc, Mutex};

use tracing_subscriber::EnvFilter;

use padelyzer::clock::SystemClock;
use padelyzer::config::AppConfig;
use padelyzer::db;
use padelyzer::routes;
use padelyzer::services::gateway::stripe::StripeGatewayFactory;
use padelyzer::services::messaging::twilio::TwilioWhatsAppProvider;
use padelyzer::state::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let config = AppConfig::from_env();

    let conn = db::init_db(&config.database_url)?;

    if config.messaging_enabled() {
        tracing::info!("WhatsApp notifications enabled (from: {})", config.twilio_whatsapp_number);
    } else {
        tracing::warn!("TWILIO_ACCOUNT_SID / TWILIO_WHATSAPP_NUMBER not set, notifications disabled");
    }
    let messaging = TwilioWhatsAppProvider::new(
        config.twilio_account_sid.clone(),
        config.twilio_auth_token.clone(),
        config.twilio_whatsapp_number.clone(),
    );
    let gateways = StripeGatewayFactory::new(config.stripe_api_base.clone());

    let state = Arc::new(AppState {
        db: Arc::new(Mutex::new(conn)),
        config: config.clone(),
        messaging: Arc::new(messaging),
        gateways: Box::new(gateways),
        clock: Arc::new(SystemClock),
    });

    let app = routes::app(state);

    let addr = format!("0.0.0.0:{}", config.port);
    tracing::info!("starting server on {addr}");

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
