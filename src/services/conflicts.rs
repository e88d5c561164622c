use chrono::NaiveTime;

use crate::errors::AppError;
use crate::models::availability::minutes_of;
use crate::models::{Booking, OperatingHours};

#[derive(Debug, PartialEq, Eq)]
pub enum SchedulingError {
    Closed,
    BeforeOpening { hours: String },
    AfterClosing { hours: String },
    Conflict,
}

impl std::fmt::Display for SchedulingError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SchedulingError::Closed => write!(f, "El club está cerrado en la fecha seleccionada"),
            SchedulingError::BeforeOpening { hours } => {
                write!(
                    f,
                    "La reserva inicia antes de la apertura del club. Horario: {hours}"
                )
            }
            SchedulingError::AfterClosing { hours } => {
                write!(
                    f,
                    "La reserva termina después del cierre del club. Horario: {hours}"
                )
            }
            SchedulingError::Conflict => {
                write!(
                    f,
                    "El horario seleccionado ya está reservado. Por favor elige otro horario"
                )
            }
        }
    }
}

impl From<SchedulingError> for AppError {
    fn from(err: SchedulingError) -> Self {
        match err {
            SchedulingError::Conflict => AppError::Conflict(err.to_string()),
            other => AppError::Validation(other.to_string()),
        }
    }
}

/// Half-open overlap with both intervals padded by `buffer` minutes on the
/// side facing the other.
pub fn overlaps(candidate: (u32, u32), existing: (u32, u32), buffer: u32) -> bool {
    let (start, end) = candidate;
    let (b_start, b_end) = existing;
    start < b_end + buffer && end + buffer > b_start
}

/// First non-cancelled booking that overlaps `[start, end)`.
pub fn find_conflict<'a>(
    start: NaiveTime,
    end: NaiveTime,
    bookings: &'a [Booking],
    buffer: u32,
) -> Option<&'a Booking> {
    let candidate = (minutes_of(start), minutes_of(end));
    bookings
        .iter()
        .filter(|b| !b.is_cancelled())
        .find(|b| overlaps(candidate, b.interval(), buffer))
}

pub fn check_within_hours(
    hours: Option<OperatingHours>,
    start: NaiveTime,
    end: NaiveTime,
) -> Result<(), SchedulingError> {
    let hours = hours.ok_or(SchedulingError::Closed)?;
    if start < hours.start {
        return Err(SchedulingError::BeforeOpening {
            hours: hours.to_human_readable(),
        });
    }
    if end > hours.end {
        return Err(SchedulingError::AfterClosing {
            hours: hours.to_human_readable(),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::availability::parse_time;
    use crate::models::{BookingStatus, PaymentStatus};
    use chrono::{NaiveDate, NaiveDateTime};

    fn t(s: &str) -> NaiveTime {
        parse_time(s).unwrap()
    }

    fn booking(id: &str, start: &str, end: &str, status: BookingStatus) -> Booking {
        let now = NaiveDateTime::parse_from_str("2025-06-01 09:00:00", "%Y-%m-%d %H:%M:%S").unwrap();
        Booking {
            id: id.into(),
            club_id: "club-1".into(),
            court_id: "court-1".into(),
            booking_group_id: None,
            date: NaiveDate::from_ymd_opt(2025, 6, 16).unwrap(),
            start_time: t(start),
            end_time: t(end),
            duration: 90,
            player_id: None,
            player_name: "Ana".into(),
            player_email: None,
            player_phone: "5512345678".into(),
            total_players: 4,
            price: 50000,
            currency: "MXN".into(),
            status,
            payment_status: PaymentStatus::Pending,
            checked_in: false,
            checked_in_at: None,
            checked_in_by: None,
            split_payment_enabled: false,
            split_payment_count: 0,
            notes: None,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn test_overlap_without_buffer() {
        assert!(overlaps((600, 690), (600, 690), 0));
        assert!(overlaps((630, 720), (600, 690), 0));
        assert!(overlaps((540, 630), (600, 690), 0));
        // adjacent intervals do not overlap
        assert!(!overlaps((690, 780), (600, 690), 0));
        assert!(!overlaps((510, 600), (600, 690), 0));
    }

    #[test]
    fn test_buffer_blocks_adjacent_intervals() {
        assert!(overlaps((690, 780), (600, 690), 15));
        assert!(overlaps((510, 600), (600, 690), 15));
        assert!(!overlaps((705, 780), (600, 690), 15));
        assert!(!overlaps((495, 585), (600, 690), 15));
    }

    #[test]
    fn test_cancelled_bookings_never_conflict() {
        let bookings = vec![booking("b1", "10:00", "11:30", BookingStatus::Cancelled)];
        assert!(find_conflict(t("10:00"), t("11:30"), &bookings, 0).is_none());
    }

    #[test]
    fn test_find_conflict_reports_blocking_booking() {
        let bookings = vec![
            booking("b1", "08:00", "09:30", BookingStatus::Confirmed),
            booking("b2", "10:00", "11:30", BookingStatus::Pending),
        ];
        let hit = find_conflict(t("11:00"), t("12:30"), &bookings, 0).unwrap();
        assert_eq!(hit.id, "b2");
        assert!(find_conflict(t("09:30"), t("10:00"), &bookings, 0).is_none());
    }

    #[test]
    fn test_check_within_hours() {
        let hours = Some(OperatingHours::new(t("08:00"), t("22:00")));
        assert_eq!(check_within_hours(hours, t("08:00"), t("09:30")), Ok(()));
        assert_eq!(check_within_hours(hours, t("20:30"), t("22:00")), Ok(()));
        assert!(matches!(
            check_within_hours(hours, t("07:30"), t("09:00")),
            Err(SchedulingError::BeforeOpening { .. })
        ));
        assert!(matches!(
            check_within_hours(hours, t("21:00"), t("22:30")),
            Err(SchedulingError::AfterClosing { .. })
        ));
        assert_eq!(
            check_within_hours(None, t("10:00"), t("11:00")),
            Err(SchedulingError::Closed)
        );
    }

    #[test]
    fn test_conflict_message_mentions_schedule() {
        assert!(SchedulingError::Conflict.to_string().contains("horario"));
    }
}
