pub mod twilio;

use async_trait::async_trait;

#[async_trait]
pub trait MessagingProvider: Send + Sync {
    async fn send_message(&self, to: &str, body: &str) -> anyhow::Result<()>;
}

/// Twilio addresses WhatsApp recipients as `whatsapp:+<E.164>`. Ten-digit
/// numbers are assumed to be Mexican.
pub fn whatsapp_address(phone: &str) -> String {
    let digits: String = phone.chars().filter(|c| c.is_ascii_digit()).collect();
    let e164 = if phone.trim_start().starts_with('+') {
        format!("+{digits}")
    } else if digits.len() == 10 {
        format!("+52{digits}")
    } else {
        format!("+{digits}")
    };
    format!("whatsapp:{e164}")
}
