pub mod signature;
pub mod stripe;

use std::collections::BTreeMap;

use async_trait::async_trait;
use serde::Deserialize;

use crate::models::PaymentProvider;

pub const STRIPE_PROVIDER_ID: &str = "stripe";

/// Gateway-side lifecycle of an intent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IntentStatus {
    RequiresPaymentMethod,
    RequiresConfirmation,
    RequiresAction,
    Processing,
    RequiresCapture,
    Canceled,
    Succeeded,
}

impl IntentStatus {
    pub fn parse(s: &str) -> Self {
        match s {
            "requires_confirmation" => IntentStatus::RequiresConfirmation,
            "requires_action" => IntentStatus::RequiresAction,
            "processing" => IntentStatus::Processing,
            "requires_capture" => IntentStatus::RequiresCapture,
            "canceled" => IntentStatus::Canceled,
            "succeeded" => IntentStatus::Succeeded,
            _ => IntentStatus::RequiresPaymentMethod,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            IntentStatus::RequiresPaymentMethod => "requires_payment_method",
            IntentStatus::RequiresConfirmation => "requires_confirmation",
            IntentStatus::RequiresAction => "requires_action",
            IntentStatus::Processing => "processing",
            IntentStatus::RequiresCapture => "requires_capture",
            IntentStatus::Canceled => "canceled",
            IntentStatus::Succeeded => "succeeded",
        }
    }

    /// A terminal intent can no longer be confirmed by the client.
    pub fn is_terminal(&self) -> bool {
        matches!(self, IntentStatus::Succeeded | IntentStatus::Canceled)
    }
}

#[derive(Debug, Clone)]
pub struct PaymentIntent {
    pub id: String,
    pub client_secret: Option<String>,
    pub amount: i64,
    pub currency: String,
    pub status: IntentStatus,
}

#[derive(Debug, Clone, Default)]
pub struct CreateIntentParams {
    /// Minor currency units.
    pub amount: i64,
    pub currency: String,
    pub description: String,
    pub receipt_email: Option<String>,
    pub metadata: BTreeMap<String, String>,
}

#[async_trait]
pub trait PaymentGateway: Send + Sync {
    async fn create_intent(&self, params: &CreateIntentParams) -> anyhow::Result<PaymentIntent>;
    async fn retrieve_intent(&self, id: &str) -> anyhow::Result<PaymentIntent>;
}

/// Per-club credentials parsed from a `payment_providers.config` blob.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GatewayCredentials {
    pub secret_key: String,
    #[serde(default)]
    pub public_key: Option<String>,
    #[serde(default)]
    pub webhook_secret: Option<String>,
}

impl GatewayCredentials {
    /// `None` unless the provider is enabled and carries a secret key.
    pub fn from_provider(provider: &PaymentProvider) -> Option<Self> {
        if !provider.enabled {
            return None;
        }
        let creds: GatewayCredentials = serde_json::from_value(provider.config.clone()).ok()?;
        if creds.secret_key.trim().is_empty() {
            return None;
        }
        Some(creds)
    }

    pub fn webhook_secret(&self) -> Option<&str> {
        self.webhook_secret.as_deref().filter(|s| !s.is_empty())
    }
}

/// Builds a short-lived gateway client from one club's credentials.
pub trait GatewayFactory: Send + Sync {
    fn build(&self, credentials: &GatewayCredentials) -> Box<dyn PaymentGateway>;
}

#[cfg(test)]
mod tests {
    use super::*;

    fn provider(enabled: bool, config: serde_json::Value) -> PaymentProvider {
        PaymentProvider {
            id: "pp-1".into(),
            club_id: "club-1".into(),
            provider_id: STRIPE_PROVIDER_ID.into(),
            enabled,
            config,
        }
    }

    #[test]
    fn test_credentials_require_enabled_provider_and_secret() {
        let config = serde_json::json!({"secretKey": "sk_test", "webhookSecret": "whsec"});
        let creds = GatewayCredentials::from_provider(&provider(true, config.clone())).unwrap();
        assert_eq!(creds.secret_key, "sk_test");
        assert_eq!(creds.webhook_secret(), Some("whsec"));

        assert!(GatewayCredentials::from_provider(&provider(false, config)).is_none());
        assert!(GatewayCredentials::from_provider(&provider(
            true,
            serde_json::json!({"secretKey": "  "})
        ))
        .is_none());
        assert!(GatewayCredentials::from_provider(&provider(true, serde_json::json!({}))).is_none());
    }

    #[test]
    fn test_terminal_statuses() {
        assert!(IntentStatus::parse("succeeded").is_terminal());
        assert!(IntentStatus::parse("canceled").is_terminal());
        assert!(!IntentStatus::parse("requires_payment_method").is_terminal());
        assert!(!IntentStatus::parse("processing").is_terminal());
    }
}
