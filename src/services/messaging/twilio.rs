use anyhow::Context;
use async_trait::async_trait;

use super::{whatsapp_address, MessagingProvider};

pub struct TwilioWhatsAppProvider {
    account_sid: String,
    auth_token: String,
    from_number: String,
    client: reqwest::Client,
}

impl TwilioWhatsAppProvider {
    pub fn new(account_sid: String, auth_token: String, from_number: String) -> Self {
        Self {
            account_sid,
            auth_token,
            from_number,
            client: reqwest::Client::new(),
        }
    }
}

#[async_trait]
impl MessagingProvider for TwilioWhatsAppProvider {
    async fn send_message(&self, to: &str, body: &str) -> anyhow::Result<()> {
        anyhow::ensure!(
            !self.account_sid.is_empty() && !self.from_number.is_empty(),
            "Twilio WhatsApp sender is not configured"
        );

        let url = format!(
            "https://api.twilio.com/2010-04-01/Accounts/{}/Messages.json",
            self.account_sid
        );
        let to = whatsapp_address(to);
        let from = whatsapp_address(&self.from_number);

        self.client
            .post(&url)
            .basic_auth(&self.account_sid, Some(&self.auth_token))
            .form(&[("To", to.as_str()), ("From", from.as_str()), ("Body", body)])
            .send()
            .await
            .context("failed to send Twilio WhatsApp message")?
            .error_for_status()
            .context("Twilio API returned error")?;

        Ok(())
    }
}
