use anyhow::Context;
use async_trait::async_trait;
use serde::Deserialize;

use super::{
    CreateIntentParams, GatewayCredentials, GatewayFactory, IntentStatus, PaymentGateway,
    PaymentIntent,
};

pub struct StripeGateway {
    api_base: String,
    secret_key: String,
    client: reqwest::Client,
}

impl StripeGateway {
    pub fn new(api_base: String, secret_key: String, client: reqwest::Client) -> Self {
        Self {
            api_base,
            secret_key,
            client,
        }
    }
}

#[derive(Deserialize)]
struct StripeIntent {
    id: String,
    client_secret: Option<String>,
    amount: i64,
    currency: String,
    status: String,
}

impl From<StripeIntent> for PaymentIntent {
    fn from(raw: StripeIntent) -> Self {
        Self {
            id: raw.id,
            client_secret: raw.client_secret,
            amount: raw.amount,
            currency: raw.currency,
            status: IntentStatus::parse(&raw.status),
        }
    }
}

#[async_trait]
impl PaymentGateway for StripeGateway {
    async fn create_intent(&self, params: &CreateIntentParams) -> anyhow::Result<PaymentIntent> {
        let url = format!("{}/v1/payment_intents", self.api_base);

        let mut form: Vec<(String, String)> = vec![
            ("amount".into(), params.amount.to_string()),
            ("currency".into(), params.currency.to_lowercase()),
            ("description".into(), params.description.clone()),
            ("automatic_payment_methods[enabled]".into(), "true".into()),
        ];
        if let Some(email) = &params.receipt_email {
            form.push(("receipt_email".into(), email.clone()));
        }
        for (key, value) in &params.metadata {
            form.push((format!("metadata[{key}]"), value.clone()));
        }

        let intent: StripeIntent = self
            .client
            .post(&url)
            .bearer_auth(&self.secret_key)
            .form(&form)
            .send()
            .await
            .context("failed to reach Stripe")?
            .error_for_status()
            .context("Stripe rejected payment intent creation")?
            .json()
            .await
            .context("failed to parse Stripe payment intent")?;

        Ok(intent.into())
    }

    async fn retrieve_intent(&self, id: &str) -> anyhow::Result<PaymentIntent> {
        let url = format!("{}/v1/payment_intents/{id}", self.api_base);

        let intent: StripeIntent = self
            .client
            .get(&url)
            .bearer_auth(&self.secret_key)
            .send()
            .await
            .context("failed to reach Stripe")?
            .error_for_status()
            .context("Stripe rejected payment intent lookup")?
            .json()
            .await
            .context("failed to parse Stripe payment intent")?;

        Ok(intent.into())
    }
}

/// Shares one HTTP connection pool across the per-club clients it builds.
pub struct StripeGatewayFactory {
    api_base: String,
    client: reqwest::Client,
}

impl StripeGatewayFactory {
    pub fn new(api_base: String) -> Self {
        Self {
            api_base: api_base.trim_end_matches('/').to_string(),
            client: reqwest::Client::new(),
        }
    }
}

impl GatewayFactory for StripeGatewayFactory {
    fn build(&self, credentials: &GatewayCredentials) -> Box<dyn PaymentGateway> {
        Box::new(StripeGateway::new(
            self.api_base.clone(),
            credentials.secret_key.clone(),
            self.client.clone(),
        ))
    }
}
