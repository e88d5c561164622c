use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use rusqlite::Connection;

use super::conflicts::find_conflict;
use super::slots::{hours_for_date, SlotGenerator};
use crate::clock::local_now;
use crate::db::queries;
use crate::errors::AppError;
use crate::models::{AvailabilitySummary, Booking, BookingRef, OperatingHours, Slot};

pub const MIN_DURATION: u32 = 30;
pub const MAX_DURATION: u32 = 240;

#[derive(Debug)]
pub struct Availability {
    pub slots: Vec<Slot>,
    pub summary: AvailabilitySummary,
    pub hours: Option<OperatingHours>,
}

pub fn validate_duration(duration: u32) -> Result<(), AppError> {
    if duration < MIN_DURATION {
        return Err(AppError::Validation(format!(
            "La duración es muy corta (mínimo {MIN_DURATION} minutos)"
        )));
    }
    if duration > MAX_DURATION {
        return Err(AppError::Validation(format!(
            "La duración es muy larga (máximo {MAX_DURATION} minutos)"
        )));
    }
    Ok(())
}

/// A slot is in the past when its date is before today, or it is today and
/// the start time has already gone by.
pub fn is_past(date: NaiveDate, start: NaiveTime, now: NaiveDateTime) -> bool {
    date < now.date() || (date == now.date() && start < now.time())
}

/// Every candidate slot for one court and date, each marked available unless
/// it conflicts with a live booking or has already started.
pub fn get_availability(
    conn: &Connection,
    club_id: &str,
    court_id: &str,
    date: NaiveDate,
    duration: Option<u32>,
    now: DateTime<Utc>,
    fallback_tz: &str,
) -> Result<Availability, AppError> {
    if queries::get_court(conn, club_id, court_id)?.is_none() {
        return Err(AppError::NotFound("Cancha no encontrada".into()));
    }

    let settings = queries::get_club_settings(conn, club_id)?;
    let duration = duration.unwrap_or(settings.slot_duration);
    validate_duration(duration)?;

    let rules = queries::get_schedule_rules(conn, club_id)?;
    let hours = hours_for_date(&rules, date);
    let bookings = queries::get_active_bookings_for_court(conn, court_id, date)?;
    let local = local_now(now, &settings.timezone, fallback_tz);

    let slots: Vec<Slot> = match hours {
        Some(hours) => SlotGenerator::new(hours, duration)
            .map(|(start, end)| {
                let conflict = find_conflict(start, end, &bookings, settings.buffer_time);
                let past = is_past(date, start, local);
                Slot {
                    start_time: start,
                    end_time: end,
                    available: conflict.is_none() && !past,
                    conflict: conflict.map(BookingRef::from),
                }
            })
            .collect(),
        None => vec![],
    };

    tracing::debug!(
        club_id = %club_id,
        court_id = %court_id,
        date = %date,
        slots = slots.len(),
        "computed availability"
    );

    let summary = AvailabilitySummary::from_slots(&slots, settings.buffer_time, settings.slot_duration);
    Ok(Availability {
        slots,
        summary,
        hours,
    })
}

/// The live booking blocking `[start, end)` on this court, if any.
pub fn is_slot_free(
    conn: &Connection,
    court_id: &str,
    date: NaiveDate,
    start: NaiveTime,
    end: NaiveTime,
    buffer: u32,
) -> anyhow::Result<Option<Booking>> {
    let bookings = queries::get_active_bookings_for_court(conn, court_id, date)?;
    Ok(find_conflict(start, end, &bookings, buffer).cloned())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db;
    use crate::models::availability::parse_time;
    use crate::models::{BookingStatus, Club, ClubSettings, Court, PaymentStatus, ScheduleRule};
    use chrono::TimeZone;

    fn t(s: &str) -> NaiveTime {
        parse_time(s).unwrap()
    }

    fn date() -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 6, 16).unwrap()
    }

    // 2025-06-10 12:00 in Mexico City, days before `date()`
    fn earlier_now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 6, 10, 18, 0, 0).unwrap()
    }

    fn setup() -> Connection {
        let conn = db::init_db(":memory:").unwrap();
        queries::insert_club(
            &conn,
            &Club {
                id: "club-1".into(),
                name: "Club Norte".into(),
                currency: "MXN".into(),
            },
        )
        .unwrap();
        queries::insert_court(
            &conn,
            &Court {
                id: "court-1".into(),
                club_id: "club-1".into(),
                name: "Pista 1".into(),
                active: true,
            },
        )
        .unwrap();
        queries::insert_schedule_rule(
            &conn,
            &ScheduleRule {
                id: "rule-1".into(),
                club_id: "club-1".into(),
                day_of_week: None,
                start_time: t("08:00"),
                end_time: t("22:00"),
                enabled: true,
            },
        )
        .unwrap();
        conn
    }

    fn insert(conn: &Connection, id: &str, start: &str, end: &str, status: BookingStatus) {
        let now = earlier_now().naive_utc();
        queries::insert_booking(
            conn,
            &Booking {
                id: id.into(),
                club_id: "club-1".into(),
                court_id: "court-1".into(),
                booking_group_id: None,
                date: date(),
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
            },
        )
        .unwrap();
    }

    #[test]
    fn test_default_duration_and_first_slots() {
        let conn = setup();
        let avail =
            get_availability(&conn, "club-1", "court-1", date(), None, earlier_now(), "UTC").unwrap();
        assert_eq!(avail.slots[0].start_time, t("08:00"));
        assert_eq!(avail.slots[0].end_time, t("09:30"));
        assert!(avail.slots[0].available);
        assert_eq!(avail.slots[1].start_time, t("08:30"));
        assert_eq!(avail.summary.total, avail.slots.len());
        assert_eq!(avail.summary.slot_duration, 90);
    }

    #[test]
    fn test_confirmed_booking_blocks_and_cancelled_does_not() {
        let conn = setup();
        insert(&conn, "b-cancelled", "10:00", "11:30", BookingStatus::Cancelled);
        let avail =
            get_availability(&conn, "club-1", "court-1", date(), Some(90), earlier_now(), "UTC")
                .unwrap();
        let ten = avail.slots.iter().find(|s| s.start_time == t("10:00")).unwrap();
        assert!(ten.available);

        insert(&conn, "b-confirmed", "10:00", "11:30", BookingStatus::Confirmed);
        let avail =
            get_availability(&conn, "club-1", "court-1", date(), Some(90), earlier_now(), "UTC")
                .unwrap();
        let ten = avail.slots.iter().find(|s| s.start_time == t("10:00")).unwrap();
        assert!(!ten.available);
        assert_eq!(ten.conflict.as_ref().unwrap().id, "b-confirmed");
        let summary = &avail.summary;
        assert_eq!(summary.available + summary.occupied, summary.total);
        // 09:00, 09:30, 10:00, 10:30, 11:00 all touch 10:00-11:30
        assert_eq!(summary.occupied, 5);
    }

    #[test]
    fn test_past_slots_today_are_unavailable() {
        let conn = setup();
        // 2025-06-16 12:10 local (UTC-6)
        let now = Utc.with_ymd_and_hms(2025, 6, 16, 18, 10, 0).unwrap();
        let avail =
            get_availability(&conn, "club-1", "court-1", date(), Some(60), now, "UTC").unwrap();
        for slot in &avail.slots {
            assert_eq!(slot.available, slot.start_time >= t("12:10"), "{:?}", slot);
        }
        assert_eq!(avail.summary.available + avail.summary.occupied, avail.summary.total);
    }

    #[test]
    fn test_unknown_court_is_not_found() {
        let conn = setup();
        let err = get_availability(&conn, "club-1", "nope", date(), None, earlier_now(), "UTC")
            .unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));
    }

    #[test]
    fn test_buffer_applies_to_availability() {
        let conn = setup();
        let mut settings = ClubSettings::defaults_for("club-1");
        settings.buffer_time = 30;
        queries::upsert_club_settings(&conn, &settings).unwrap();
        insert(&conn, "b1", "10:00", "11:00", BookingStatus::Confirmed);

        let avail =
            get_availability(&conn, "club-1", "court-1", date(), Some(60), earlier_now(), "UTC")
                .unwrap();
        let at = |s: &str| avail.slots.iter().find(|x| x.start_time == t(s)).unwrap().available;
        assert!(!at("11:00"));
        assert!(at("11:30"));
        assert!(!at("09:00"));
        assert!(at("08:30"));
        assert_eq!(avail.summary.buffer_time, 30);
    }

    #[test]
    fn test_is_slot_free() {
        let conn = setup();
        insert(&conn, "b1", "10:00", "11:30", BookingStatus::Confirmed);
        assert!(is_slot_free(&conn, "court-1", date(), t("11:30"), t("13:00"), 0)
            .unwrap()
            .is_none());
        assert_eq!(
            is_slot_free(&conn, "court-1", date(), t("11:00"), t("12:30"), 0)
                .unwrap()
                .unwrap()
                .id,
            "b1"
        );
    }

    #[test]
    fn test_too_short_duration_rejected() {
        let conn = setup();
        let err = get_availability(&conn, "club-1", "court-1", date(), Some(15), earlier_now(), "UTC")
            .unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));
    }
}
