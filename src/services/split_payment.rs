use chrono::NaiveDateTime;

use crate::models::{PaymentOwner, PaymentStatus, SplitPayment};

pub const MIN_PARTICIPANTS: u32 = 2;
pub const MAX_PARTICIPANTS: u32 = 50;
pub const DEFAULT_PARTICIPANTS: u32 = 4;

/// Floor division with the remainder added to the first participant, so the
/// slices always sum to `total`.
pub fn split_amounts(total: i64, count: u32) -> Vec<i64> {
    if count == 0 {
        return vec![];
    }
    let n = i64::from(count);
    let share = total / n;
    let remainder = total - share * n;

    let mut amounts = vec![share; count as usize];
    amounts[0] += remainder;
    amounts
}

pub struct Booker<'a> {
    pub name: &'a str,
    pub phone: &'a str,
    pub email: Option<&'a str>,
}

/// Pending slices for `owner`. The first carries the booker's identity, the
/// rest are placeholders named `Jugador N`.
pub fn build_slices(
    owner: PaymentOwner<'_>,
    total: i64,
    count: u32,
    booker: &Booker<'_>,
    now: NaiveDateTime,
) -> Vec<SplitPayment> {
    split_amounts(total, count)
        .into_iter()
        .enumerate()
        .map(|(i, amount)| {
            let (name, phone, email) = if i == 0 {
                (
                    booker.name.to_string(),
                    booker.phone.to_string(),
                    booker.email.unwrap_or_default().to_string(),
                )
            } else {
                (format!("Jugador {}", i + 1), String::new(), String::new())
            };
            let (booking_id, booking_group_id) = match owner {
                PaymentOwner::Booking(id) => (Some(id.to_string()), None),
                PaymentOwner::Group(id) => (None, Some(id.to_string())),
            };
            SplitPayment {
                id: uuid::Uuid::new_v4().to_string(),
                booking_id,
                booking_group_id,
                player_name: name,
                player_phone: phone,
                player_email: email,
                amount,
                status: PaymentStatus::Pending,
                stripe_payment_intent_id: None,
                paid_at: None,
                created_at: now,
                updated_at: now,
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_even_split() {
        assert_eq!(split_amounts(50000, 4), vec![12500, 12500, 12500, 12500]);
    }

    #[test]
    fn test_remainder_goes_to_first() {
        let amounts = split_amounts(50001, 4);
        assert_eq!(amounts, vec![12501, 12500, 12500, 12500]);
        assert_eq!(amounts.iter().sum::<i64>(), 50001);
    }

    #[test]
    fn test_sum_always_matches_total() {
        for total in [1, 7, 999, 50000, 123457] {
            for count in MIN_PARTICIPANTS..=MAX_PARTICIPANTS {
                let amounts = split_amounts(total, count);
                assert_eq!(amounts.len(), count as usize);
                assert_eq!(amounts.iter().sum::<i64>(), total, "{total}/{count}");
            }
        }
    }

    #[test]
    fn test_slices_carry_booker_then_placeholders() {
        let now = NaiveDateTime::parse_from_str("2025-06-10 12:00:00", "%Y-%m-%d %H:%M:%S").unwrap();
        let booker = Booker {
            name: "Ana",
            phone: "5512345678",
            email: Some("ana@example.com"),
        };
        let slices = build_slices(PaymentOwner::Group("g-1"), 60000, 3, &booker, now);
        assert_eq!(slices.len(), 3);
        assert_eq!(slices[0].player_name, "Ana");
        assert_eq!(slices[0].player_email, "ana@example.com");
        assert_eq!(slices[1].player_name, "Jugador 2");
        assert_eq!(slices[2].player_phone, "");
        assert!(slices.iter().all(|s| s.booking_group_id.as_deref() == Some("g-1")));
        assert!(slices.iter().all(|s| s.booking_id.is_none()));
    }
}
