use std::sync::Arc;

use super::messaging::MessagingProvider;
use super::tasks::spawn_best_effort;
use crate::models::availability::format_time;
use crate::models::Booking;

/// Minor units rendered as `$1,234.50 MXN`.
pub fn format_money(amount: i64, currency: &str) -> String {
    let sign = if amount < 0 { "-" } else { "" };
    let amount = amount.unsigned_abs();
    let whole = (amount / 100).to_string();
    let mut grouped = String::new();
    for (i, ch) in whole.chars().enumerate() {
        if i > 0 && (whole.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(ch);
    }
    format!("{sign}${grouped}.{:02} {currency}", amount % 100)
}

/// Short reference shown to players: last 8 characters of the id, upper-cased.
pub fn booking_code(id: &str) -> String {
    let start = id.len().saturating_sub(8);
    id.get(start..).unwrap_or(id).to_uppercase()
}

pub fn booking_created_message(
    booking: &Booking,
    club_name: &str,
    court_name: &str,
    total: i64,
    payment_link: Option<&str>,
) -> String {
    let payment = match payment_link {
        Some(link) => format!("Completa tu pago aquí: {link}"),
        None => "El pago se realiza en el club al llegar".to_string(),
    };
    format!(
        "🎾 *Reserva registrada - {club_name}*\n\n\
         📅 Fecha: {date}\n\
         ⏰ Hora: {start} - {end}\n\
         🏟️ Cancha: {court_name}\n\
         💰 Total: {total}\n\
         👤 Organizador: {player}\n\n\
         💳 {payment}\n\n\
         Código de reserva: *{code}*",
        date = booking.date.format("%d/%m/%Y"),
        start = format_time(booking.start_time),
        end = format_time(booking.end_time),
        total = format_money(total, &booking.currency),
        player = booking.player_name,
        code = booking_code(&booking.id),
    )
}

/// Fire-and-forget WhatsApp message to the booker.
pub fn notify_booking_created(messaging: Arc<dyn MessagingProvider>, to: String, body: String) {
    spawn_best_effort("booking_notification", async move {
        messaging.send_message(&to, &body).await?;
        tracing::info!(to = %to, "booking notification sent");
        Ok(())
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_money() {
        assert_eq!(format_money(50000, "MXN"), "$500.00 MXN");
        assert_eq!(format_money(123456789, "MXN"), "$1,234,567.89 MXN");
        assert_eq!(format_money(5, "MXN"), "$0.05 MXN");
        assert_eq!(format_money(-1050, "MXN"), "-$10.50 MXN");
    }

    #[test]
    fn test_booking_code() {
        assert_eq!(booking_code("3f2a-9c1d-abcdef12"), "ABCDEF12");
        assert_eq!(booking_code("abc"), "ABC");
    }
}
