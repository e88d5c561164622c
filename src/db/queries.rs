use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use rusqlite::types::Type;
use rusqlite::{params, Connection, Row};

use crate::models::availability::{format_time, TIME_FORMAT};
use crate::models::{
    Booking, BookingGroup, BookingStatus, ClassBooking, Club, ClubSettings, Court,
    DiscountConditions, DiscountKind, DiscountRule, Payment, PaymentMethod, PaymentOwner,
    PaymentProvider, PaymentStatus, Player, PricingRule, ScheduleRule, Session, SplitPayment,
    Transaction, TransactionKind,
};

pub const DATE_FORMAT: &str = "%Y-%m-%d";
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

pub fn format_date(d: NaiveDate) -> String {
    d.format(DATE_FORMAT).to_string()
}

pub fn format_ts(ts: NaiveDateTime) -> String {
    ts.format(TIMESTAMP_FORMAT).to_string()
}

fn conversion_error<E>(idx: usize, e: E) -> rusqlite::Error
where
    E: std::error::Error + Send + Sync + 'static,
{
    rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e))
}

fn date_col(row: &Row, idx: usize) -> rusqlite::Result<NaiveDate> {
    let raw: String = row.get(idx)?;
    NaiveDate::parse_from_str(&raw, DATE_FORMAT).map_err(|e| conversion_error(idx, e))
}

fn time_col(row: &Row, idx: usize) -> rusqlite::Result<NaiveTime> {
    let raw: String = row.get(idx)?;
    NaiveTime::parse_from_str(&raw, TIME_FORMAT).map_err(|e| conversion_error(idx, e))
}

fn ts_col(row: &Row, idx: usize) -> rusqlite::Result<NaiveDateTime> {
    let raw: String = row.get(idx)?;
    NaiveDateTime::parse_from_str(&raw, TIMESTAMP_FORMAT).map_err(|e| conversion_error(idx, e))
}

fn opt_ts_col(row: &Row, idx: usize) -> rusqlite::Result<Option<NaiveDateTime>> {
    let raw: Option<String> = row.get(idx)?;
    raw.map(|s| NaiveDateTime::parse_from_str(&s, TIMESTAMP_FORMAT))
        .transpose()
        .map_err(|e| conversion_error(idx, e))
}

// ── Clubs ──

pub fn insert_club(conn: &Connection, club: &Club) -> anyhow::Result<()> {
    conn.execute(
        "INSERT INTO clubs (id, name, currency) VALUES (?1, ?2, ?3)",
        params![club.id, club.name, club.currency],
    )?;
    Ok(())
}

pub fn get_club(conn: &Connection, id: &str) -> anyhow::Result<Option<Club>> {
    let result = conn.query_row(
        "SELECT id, name, currency FROM clubs WHERE id = ?1",
        params![id],
        |row| {
            Ok(Club {
                id: row.get(0)?,
                name: row.get(1)?,
                currency: row.get(2)?,
            })
        },
    );

    match result {
        Ok(club) => Ok(Some(club)),
        Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
        Err(e) => Err(e.into()),
    }
}

/// Falls back to defaults when the club never saved settings.
pub fn get_club_settings(conn: &Connection, club_id: &str) -> anyhow::Result<ClubSettings> {
    let result = conn.query_row(
        "SELECT club_id, slot_duration, buffer_time, timezone, advance_booking_days
         FROM club_settings WHERE club_id = ?1",
        params![club_id],
        |row| {
            Ok(ClubSettings {
                club_id: row.get(0)?,
                slot_duration: row.get(1)?,
                buffer_time: row.get(2)?,
                timezone: row.get(3)?,
                advance_booking_days: row.get(4)?,
            })
        },
    );

    match result {
        Ok(settings) => Ok(settings),
        Err(rusqlite::Error::QueryReturnedNoRows) => Ok(ClubSettings::defaults_for(club_id)),
        Err(e) => Err(e.into()),
    }
}

pub fn upsert_club_settings(conn: &Connection, settings: &ClubSettings) -> anyhow::Result<()> {
    conn.execute(
        "INSERT INTO club_settings (club_id, slot_duration, buffer_time, timezone, advance_booking_days)
         VALUES (?1, ?2, ?3, ?4, ?5)
         ON CONFLICT(club_id) DO UPDATE SET
           slot_duration = excluded.slot_duration,
           buffer_time = excluded.buffer_time,
           timezone = excluded.timezone,
           advance_booking_days = excluded.advance_booking_days",
        params![
            settings.club_id,
            settings.slot_duration,
            settings.buffer_time,
            settings.timezone,
            settings.advance_booking_days,
        ],
    )?;
    Ok(())
}

// ── Schedule Rules ──

pub fn insert_schedule_rule(conn: &Connection, rule: &ScheduleRule) -> anyhow::Result<()> {
    conn.execute(
        "INSERT INTO schedule_rules (id, club_id, day_of_week, start_time, end_time, enabled)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        params![
            rule.id,
            rule.club_id,
            rule.day_of_week,
            format_time(rule.start_time),
            format_time(rule.end_time),
            rule.enabled,
        ],
    )?;
    Ok(())
}

pub fn get_schedule_rules(conn: &Connection, club_id: &str) -> anyhow::Result<Vec<ScheduleRule>> {
    let mut stmt = conn.prepare(
        "SELECT id, club_id, day_of_week, start_time, end_time, enabled
         FROM schedule_rules WHERE club_id = ?1 ORDER BY created_at DESC",
    )?;
    let rows = stmt.query_map(params![club_id], |row| {
        Ok(ScheduleRule {
            id: row.get(0)?,
            club_id: row.get(1)?,
            day_of_week: row.get(2)?,
            start_time: time_col(row, 3)?,
            end_time: time_col(row, 4)?,
            enabled: row.get(5)?,
        })
    })?;

    let mut rules = vec![];
    for row in rows {
        rules.push(row?);
    }
    Ok(rules)
}

// ── Courts ──

pub fn insert_court(conn: &Connection, court: &Court) -> anyhow::Result<()> {
    conn.execute(
        "INSERT INTO courts (id, club_id, name, active) VALUES (?1, ?2, ?3, ?4)",
        params![court.id, court.club_id, court.name, court.active],
    )?;
    Ok(())
}

/// Only returns the court when it belongs to `club_id`.
pub fn get_court(conn: &Connection, club_id: &str, id: &str) -> anyhow::Result<Option<Court>> {
    let result = conn.query_row(
        "SELECT id, club_id, name, active FROM courts WHERE id = ?1 AND club_id = ?2",
        params![id, club_id],
        |row| {
            Ok(Court {
                id: row.get(0)?,
                club_id: row.get(1)?,
                name: row.get(2)?,
                active: row.get(3)?,
            })
        },
    );

    match result {
        Ok(court) => Ok(Some(court)),
        Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
        Err(e) => Err(e.into()),
    }
}

// ── Payment Providers ──

pub fn upsert_payment_provider(conn: &Connection, provider: &PaymentProvider) -> anyhow::Result<()> {
    let config = serde_json::to_string(&provider.config)?;
    conn.execute(
        "INSERT INTO payment_providers (id, club_id, provider_id, enabled, config)
         VALUES (?1, ?2, ?3, ?4, ?5)
         ON CONFLICT(club_id, provider_id) DO UPDATE SET
           enabled = excluded.enabled,
           config = excluded.config",
        params![
            provider.id,
            provider.club_id,
            provider.provider_id,
            provider.enabled,
            config,
        ],
    )?;
    Ok(())
}

pub fn get_payment_provider(
    conn: &Connection,
    club_id: &str,
    provider_id: &str,
) -> anyhow::Result<Option<PaymentProvider>> {
    let result = conn.query_row(
        "SELECT id, club_id, provider_id, enabled, config
         FROM payment_providers WHERE club_id = ?1 AND provider_id = ?2",
        params![club_id, provider_id],
        |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, bool>(3)?,
                row.get::<_, String>(4)?,
            ))
        },
    );

    match result {
        Ok((id, club_id, provider_id, enabled, config_json)) => {
            let config = serde_json::from_str(&config_json).unwrap_or(serde_json::json!({}));
            Ok(Some(PaymentProvider {
                id,
                club_id,
                provider_id,
                enabled,
                config,
            }))
        }
        Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
        Err(e) => Err(e.into()),
    }
}

// ── Sessions ──

pub fn insert_session(
    conn: &Connection,
    token: &str,
    user_id: &str,
    club_id: &str,
    expires_at: Option<NaiveDateTime>,
) -> anyhow::Result<()> {
    conn.execute(
        "INSERT INTO sessions (token, user_id, club_id, expires_at) VALUES (?1, ?2, ?3, ?4)",
        params![token, user_id, club_id, expires_at.map(format_ts)],
    )?;
    Ok(())
}

/// Expired sessions are treated as absent.
pub fn get_session(
    conn: &Connection,
    token: &str,
    now: NaiveDateTime,
) -> anyhow::Result<Option<Session>> {
    let result = conn.query_row(
        "SELECT user_id, club_id FROM sessions
         WHERE token = ?1 AND (expires_at IS NULL OR expires_at > ?2)",
        params![token, format_ts(now)],
        |row| {
            Ok(Session {
                user_id: row.get(0)?,
                club_id: row.get(1)?,
            })
        },
    );

    match result {
        Ok(session) => Ok(Some(session)),
        Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
        Err(e) => Err(e.into()),
    }
}

// ── Pricing ──

pub fn insert_pricing_rule(conn: &Connection, rule: &PricingRule) -> anyhow::Result<()> {
    conn.execute(
        "INSERT INTO pricing (id, club_id, day_of_week, start_time, end_time, price)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        params![
            rule.id,
            rule.club_id,
            rule.day_of_week,
            format_time(rule.start_time),
            format_time(rule.end_time),
            rule.price,
        ],
    )?;
    Ok(())
}

/// Newest first.
pub fn get_pricing_rules(conn: &Connection, club_id: &str) -> anyhow::Result<Vec<PricingRule>> {
    let mut stmt = conn.prepare(
        "SELECT id, club_id, day_of_week, start_time, end_time, price
         FROM pricing WHERE club_id = ?1 ORDER BY created_at DESC, rowid DESC",
    )?;
    let rows = stmt.query_map(params![club_id], |row| {
        Ok(PricingRule {
            id: row.get(0)?,
            club_id: row.get(1)?,
            day_of_week: row.get(2)?,
            start_time: time_col(row, 3)?,
            end_time: time_col(row, 4)?,
            price: row.get(5)?,
        })
    })?;

    let mut rules = vec![];
    for row in rows {
        rules.push(row?);
    }
    Ok(rules)
}

pub fn insert_discount_rule(
    conn: &Connection,
    id: &str,
    club_id: &str,
    name: &str,
    kind: &str,
    value: i64,
    conditions: &serde_json::Value,
) -> anyhow::Result<()> {
    conn.execute(
        "INSERT INTO discount_rules (id, club_id, name, kind, value, conditions)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        params![id, club_id, name, kind, value, serde_json::to_string(conditions)?],
    )?;
    Ok(())
}

/// Enabled rules only. Rows with an unknown kind are skipped.
pub fn get_discount_rules(conn: &Connection, club_id: &str) -> anyhow::Result<Vec<DiscountRule>> {
    let mut stmt = conn.prepare(
        "SELECT id, name, kind, value, conditions
         FROM discount_rules WHERE club_id = ?1 AND enabled = 1",
    )?;
    let rows = stmt.query_map(params![club_id], |row| {
        Ok((
            row.get::<_, String>(0)?,
            row.get::<_, String>(1)?,
            row.get::<_, String>(2)?,
            row.get::<_, i64>(3)?,
            row.get::<_, String>(4)?,
        ))
    })?;

    let mut rules = vec![];
    for row in rows {
        let (id, name, raw_kind, value, conditions_json) = row?;
        let Some(kind) = DiscountKind::parse(&raw_kind) else {
            tracing::warn!(rule_id = %id, kind = %raw_kind, "skipping discount rule with unknown kind");
            continue;
        };
        let conditions: DiscountConditions =
            serde_json::from_str(&conditions_json).unwrap_or_default();
        rules.push(DiscountRule {
            id,
            name,
            kind,
            value,
            conditions,
        });
    }
    Ok(rules)
}

/// Confirmed or in-progress bookings by a phone number created at or after `since`.
pub fn count_recent_bookings_by_phone(
    conn: &Connection,
    club_id: &str,
    phone: &str,
    since: NaiveDateTime,
) -> anyhow::Result<i64> {
    let count = conn.query_row(
        "SELECT COUNT(*) FROM bookings
         WHERE club_id = ?1 AND player_phone = ?2 AND created_at >= ?3
           AND status IN ('CONFIRMED', 'IN_PROGRESS')",
        params![club_id, phone, format_ts(since)],
        |row| row.get(0),
    )?;
    Ok(count)
}

// ── Players ──

/// Idempotent per (club, phone). Returns the player id.
pub fn upsert_player(
    conn: &Connection,
    club_id: &str,
    name: &str,
    email: Option<&str>,
    phone: &str,
) -> anyhow::Result<String> {
    let id = conn.query_row(
        "INSERT INTO players (id, club_id, name, email, phone)
         VALUES (?1, ?2, ?3, ?4, ?5)
         ON CONFLICT(club_id, phone) DO UPDATE SET
           name = excluded.name,
           email = COALESCE(excluded.email, players.email)
         RETURNING id",
        params![uuid::Uuid::new_v4().to_string(), club_id, name, email, phone],
        |row| row.get(0),
    )?;
    Ok(id)
}

pub fn get_player_by_phone(
    conn: &Connection,
    club_id: &str,
    phone: &str,
) -> anyhow::Result<Option<Player>> {
    let result = conn.query_row(
        "SELECT id, club_id, name, email, phone, total_bookings, total_spent, last_booking_at
         FROM players WHERE club_id = ?1 AND phone = ?2",
        params![club_id, phone],
        |row| {
            Ok(Player {
                id: row.get(0)?,
                club_id: row.get(1)?,
                name: row.get(2)?,
                email: row.get(3)?,
                phone: row.get(4)?,
                total_bookings: row.get(5)?,
                total_spent: row.get(6)?,
                last_booking_at: opt_ts_col(row, 7)?,
            })
        },
    );

    match result {
        Ok(player) => Ok(Some(player)),
        Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
        Err(e) => Err(e.into()),
    }
}

pub fn record_player_booking(
    conn: &Connection,
    player_id: &str,
    amount: i64,
    at: NaiveDateTime,
) -> anyhow::Result<bool> {
    let count = conn.execute(
        "UPDATE players SET
           total_bookings = total_bookings + 1,
           total_spent = total_spent + ?1,
           last_booking_at = ?2
         WHERE id = ?3",
        params![amount, format_ts(at), player_id],
    )?;
    Ok(count > 0)
}

// ── Bookings ──

const BOOKING_COLUMNS: &str = "id, club_id, court_id, booking_group_id, date, start_time, end_time, \
     duration, player_id, player_name, player_email, player_phone, total_players, price, currency, \
     status, payment_status, checked_in, checked_in_at, checked_in_by, split_payment_enabled, \
     split_payment_count, notes, created_at, updated_at";

fn booking_from_row(row: &Row) -> rusqlite::Result<Booking> {
    Ok(Booking {
        id: row.get(0)?,
        club_id: row.get(1)?,
        court_id: row.get(2)?,
        booking_group_id: row.get(3)?,
        date: date_col(row, 4)?,
        start_time: time_col(row, 5)?,
        end_time: time_col(row, 6)?,
        duration: row.get(7)?,
        player_id: row.get(8)?,
        player_name: row.get(9)?,
        player_email: row.get(10)?,
        player_phone: row.get(11)?,
        total_players: row.get(12)?,
        price: row.get(13)?,
        currency: row.get(14)?,
        status: BookingStatus::parse(&row.get::<_, String>(15)?),
        payment_status: PaymentStatus::parse(&row.get::<_, String>(16)?),
        checked_in: row.get(17)?,
        checked_in_at: opt_ts_col(row, 18)?,
        checked_in_by: row.get(19)?,
        split_payment_enabled: row.get(20)?,
        split_payment_count: row.get(21)?,
        notes: row.get(22)?,
        created_at: ts_col(row, 23)?,
        updated_at: ts_col(row, 24)?,
    })
}

/// Fails with a SQLite constraint error carrying "booking overlap" when the
/// overlap trigger refuses the row.
pub fn insert_booking(conn: &Connection, booking: &Booking) -> anyhow::Result<()> {
    conn.execute(
        &format!(
            "INSERT INTO bookings ({BOOKING_COLUMNS})
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17,
                     ?18, ?19, ?20, ?21, ?22, ?23, ?24, ?25)"
        ),
        params![
            booking.id,
            booking.club_id,
            booking.court_id,
            booking.booking_group_id,
            format_date(booking.date),
            format_time(booking.start_time),
            format_time(booking.end_time),
            booking.duration,
            booking.player_id,
            booking.player_name,
            booking.player_email,
            booking.player_phone,
            booking.total_players,
            booking.price,
            booking.currency,
            booking.status.as_str(),
            booking.payment_status.as_str(),
            booking.checked_in,
            booking.checked_in_at.map(format_ts),
            booking.checked_in_by,
            booking.split_payment_enabled,
            booking.split_payment_count,
            booking.notes,
            format_ts(booking.created_at),
            format_ts(booking.updated_at),
        ],
    )?;
    Ok(())
}

/// Club-scoped lookup.
pub fn get_booking(conn: &Connection, club_id: &str, id: &str) -> anyhow::Result<Option<Booking>> {
    let result = conn.query_row(
        &format!("SELECT {BOOKING_COLUMNS} FROM bookings WHERE id = ?1 AND club_id = ?2"),
        params![id, club_id],
        booking_from_row,
    );

    match result {
        Ok(booking) => Ok(Some(booking)),
        Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
        Err(e) => Err(e.into()),
    }
}

pub fn get_booking_by_id(conn: &Connection, id: &str) -> anyhow::Result<Option<Booking>> {
    let result = conn.query_row(
        &format!("SELECT {BOOKING_COLUMNS} FROM bookings WHERE id = ?1"),
        params![id],
        booking_from_row,
    );

    match result {
        Ok(booking) => Ok(Some(booking)),
        Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
        Err(e) => Err(e.into()),
    }
}

/// Non-cancelled bookings on one court for one date, ordered by start.
pub fn get_active_bookings_for_court(
    conn: &Connection,
    court_id: &str,
    date: NaiveDate,
) -> anyhow::Result<Vec<Booking>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {BOOKING_COLUMNS} FROM bookings
         WHERE court_id = ?1 AND date = ?2 AND status != 'CANCELLED'
         ORDER BY start_time ASC"
    ))?;
    let rows = stmt.query_map(params![court_id, format_date(date)], booking_from_row)?;

    let mut bookings = vec![];
    for row in rows {
        bookings.push(row?);
    }
    Ok(bookings)
}

pub fn get_bookings_for_group(conn: &Connection, group_id: &str) -> anyhow::Result<Vec<Booking>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {BOOKING_COLUMNS} FROM bookings WHERE booking_group_id = ?1 ORDER BY court_id"
    ))?;
    let rows = stmt.query_map(params![group_id], booking_from_row)?;

    let mut bookings = vec![];
    for row in rows {
        bookings.push(row?);
    }
    Ok(bookings)
}

pub fn update_booking_status(
    conn: &Connection,
    id: &str,
    status: &BookingStatus,
    payment_status: &PaymentStatus,
    now: NaiveDateTime,
) -> anyhow::Result<bool> {
    let count = conn.execute(
        "UPDATE bookings SET status = ?1, payment_status = ?2, updated_at = ?3 WHERE id = ?4",
        params![status.as_str(), payment_status.as_str(), format_ts(now), id],
    )?;
    Ok(count > 0)
}

pub fn update_booking_payment_status(
    conn: &Connection,
    id: &str,
    payment_status: &PaymentStatus,
    now: NaiveDateTime,
) -> anyhow::Result<bool> {
    let count = conn.execute(
        "UPDATE bookings SET payment_status = ?1, updated_at = ?2 WHERE id = ?3",
        params![payment_status.as_str(), format_ts(now), id],
    )?;
    Ok(count > 0)
}

pub fn mark_booking_checked_in(
    conn: &Connection,
    id: &str,
    by: &str,
    payment_status: &PaymentStatus,
    notes: Option<&str>,
    now: NaiveDateTime,
) -> anyhow::Result<bool> {
    let ts = format_ts(now);
    let count = conn.execute(
        "UPDATE bookings SET
           status = 'IN_PROGRESS',
           payment_status = ?1,
           checked_in = 1,
           checked_in_at = ?2,
           checked_in_by = ?3,
           notes = COALESCE(?4, notes),
           updated_at = ?2
         WHERE id = ?5",
        params![payment_status.as_str(), ts, by, notes, id],
    )?;
    Ok(count > 0)
}

pub fn clear_booking_check_in(conn: &Connection, id: &str, now: NaiveDateTime) -> anyhow::Result<bool> {
    let count = conn.execute(
        "UPDATE bookings SET
           status = 'CONFIRMED',
           checked_in = 0,
           checked_in_at = NULL,
           checked_in_by = NULL,
           updated_at = ?1
         WHERE id = ?2",
        params![format_ts(now), id],
    )?;
    Ok(count > 0)
}

// ── Booking Groups ──

const GROUP_COLUMNS: &str = "id, club_id, name, date, start_time, end_time, duration, player_name, \
     player_email, player_phone, total_price, currency, status, payment_status, \
     split_payment_enabled, split_payment_count, created_at, updated_at";

fn group_from_row(row: &Row) -> rusqlite::Result<BookingGroup> {
    Ok(BookingGroup {
        id: row.get(0)?,
        club_id: row.get(1)?,
        name: row.get(2)?,
        date: date_col(row, 3)?,
        start_time: time_col(row, 4)?,
        end_time: time_col(row, 5)?,
        duration: row.get(6)?,
        player_name: row.get(7)?,
        player_email: row.get(8)?,
        player_phone: row.get(9)?,
        total_price: row.get(10)?,
        currency: row.get(11)?,
        status: BookingStatus::parse(&row.get::<_, String>(12)?),
        payment_status: PaymentStatus::parse(&row.get::<_, String>(13)?),
        split_payment_enabled: row.get(14)?,
        split_payment_count: row.get(15)?,
        created_at: ts_col(row, 16)?,
        updated_at: ts_col(row, 17)?,
    })
}

pub fn insert_booking_group(conn: &Connection, group: &BookingGroup) -> anyhow::Result<()> {
    conn.execute(
        &format!(
            "INSERT INTO booking_groups ({GROUP_COLUMNS})
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17, ?18)"
        ),
        params![
            group.id,
            group.club_id,
            group.name,
            format_date(group.date),
            format_time(group.start_time),
            format_time(group.end_time),
            group.duration,
            group.player_name,
            group.player_email,
            group.player_phone,
            group.total_price,
            group.currency,
            group.status.as_str(),
            group.payment_status.as_str(),
            group.split_payment_enabled,
            group.split_payment_count,
            format_ts(group.created_at),
            format_ts(group.updated_at),
        ],
    )?;
    Ok(())
}

pub fn get_booking_group(
    conn: &Connection,
    club_id: &str,
    id: &str,
) -> anyhow::Result<Option<BookingGroup>> {
    let result = conn.query_row(
        &format!("SELECT {GROUP_COLUMNS} FROM booking_groups WHERE id = ?1 AND club_id = ?2"),
        params![id, club_id],
        group_from_row,
    );

    match result {
        Ok(group) => Ok(Some(group)),
        Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
        Err(e) => Err(e.into()),
    }
}

pub fn get_booking_group_by_id(conn: &Connection, id: &str) -> anyhow::Result<Option<BookingGroup>> {
    let result = conn.query_row(
        &format!("SELECT {GROUP_COLUMNS} FROM booking_groups WHERE id = ?1"),
        params![id],
        group_from_row,
    );

    match result {
        Ok(group) => Ok(Some(group)),
        Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
        Err(e) => Err(e.into()),
    }
}

pub fn update_group_status(
    conn: &Connection,
    id: &str,
    status: &BookingStatus,
    payment_status: &PaymentStatus,
    now: NaiveDateTime,
) -> anyhow::Result<bool> {
    let count = conn.execute(
        "UPDATE booking_groups SET status = ?1, payment_status = ?2, updated_at = ?3 WHERE id = ?4",
        params![status.as_str(), payment_status.as_str(), format_ts(now), id],
    )?;
    Ok(count > 0)
}

pub fn update_group_payment_status(
    conn: &Connection,
    id: &str,
    payment_status: &PaymentStatus,
    now: NaiveDateTime,
) -> anyhow::Result<bool> {
    let count = conn.execute(
        "UPDATE booking_groups SET payment_status = ?1, updated_at = ?2 WHERE id = ?3",
        params![payment_status.as_str(), format_ts(now), id],
    )?;
    Ok(count > 0)
}

// ── Split Payments ──

const SPLIT_COLUMNS: &str = "id, booking_id, booking_group_id, player_name, player_phone, \
     player_email, amount, status, stripe_payment_intent_id, paid_at, created_at, updated_at";

fn split_from_row(row: &Row) -> rusqlite::Result<SplitPayment> {
    Ok(SplitPayment {
        id: row.get(0)?,
        booking_id: row.get(1)?,
        booking_group_id: row.get(2)?,
        player_name: row.get(3)?,
        player_phone: row.get(4)?,
        player_email: row.get(5)?,
        amount: row.get(6)?,
        status: PaymentStatus::parse(&row.get::<_, String>(7)?),
        stripe_payment_intent_id: row.get(8)?,
        paid_at: opt_ts_col(row, 9)?,
        created_at: ts_col(row, 10)?,
        updated_at: ts_col(row, 11)?,
    })
}

pub fn insert_split_payment(conn: &Connection, split: &SplitPayment) -> anyhow::Result<()> {
    conn.execute(
        &format!(
            "INSERT INTO split_payments ({SPLIT_COLUMNS})
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)"
        ),
        params![
            split.id,
            split.booking_id,
            split.booking_group_id,
            split.player_name,
            split.player_phone,
            split.player_email,
            split.amount,
            split.status.as_str(),
            split.stripe_payment_intent_id,
            split.paid_at.map(format_ts),
            format_ts(split.created_at),
            format_ts(split.updated_at),
        ],
    )?;
    Ok(())
}

pub fn get_split_payment(conn: &Connection, id: &str) -> anyhow::Result<Option<SplitPayment>> {
    let result = conn.query_row(
        &format!("SELECT {SPLIT_COLUMNS} FROM split_payments WHERE id = ?1"),
        params![id],
        split_from_row,
    );

    match result {
        Ok(split) => Ok(Some(split)),
        Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
        Err(e) => Err(e.into()),
    }
}

pub fn get_split_payments(
    conn: &Connection,
    owner: PaymentOwner<'_>,
) -> anyhow::Result<Vec<SplitPayment>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {SPLIT_COLUMNS} FROM split_payments WHERE {} = ?1 ORDER BY created_at, rowid",
        owner.column()
    ))?;
    let rows = stmt.query_map(params![owner.id()], split_from_row)?;

    let mut splits = vec![];
    for row in rows {
        splits.push(row?);
    }
    Ok(splits)
}

pub fn update_split_payment_intent(
    conn: &Connection,
    id: &str,
    intent_id: &str,
    now: NaiveDateTime,
) -> anyhow::Result<bool> {
    let count = conn.execute(
        "UPDATE split_payments SET stripe_payment_intent_id = ?1, status = 'processing', updated_at = ?2
         WHERE id = ?3",
        params![intent_id, format_ts(now), id],
    )?;
    Ok(count > 0)
}

pub fn update_split_payment_status(
    conn: &Connection,
    id: &str,
    status: &PaymentStatus,
    paid_at: Option<NaiveDateTime>,
    now: NaiveDateTime,
) -> anyhow::Result<bool> {
    let count = conn.execute(
        "UPDATE split_payments SET status = ?1, paid_at = COALESCE(?2, paid_at), updated_at = ?3
         WHERE id = ?4",
        params![status.as_str(), paid_at.map(format_ts), format_ts(now), id],
    )?;
    Ok(count > 0)
}

// ── Payments ──

const PAYMENT_COLUMNS: &str = "id, booking_id, booking_group_id, amount, currency, method, status, \
     stripe_payment_intent_id, reference, created_at, updated_at";

fn payment_from_row(row: &Row) -> rusqlite::Result<Payment> {
    let method: String = row.get(5)?;
    Ok(Payment {
        id: row.get(0)?,
        booking_id: row.get(1)?,
        booking_group_id: row.get(2)?,
        amount: row.get(3)?,
        currency: row.get(4)?,
        method: PaymentMethod::parse(&method).unwrap_or(PaymentMethod::Transfer),
        status: PaymentStatus::parse(&row.get::<_, String>(6)?),
        stripe_payment_intent_id: row.get(7)?,
        reference: row.get(8)?,
        created_at: ts_col(row, 9)?,
        updated_at: ts_col(row, 10)?,
    })
}

pub fn insert_payment(conn: &Connection, payment: &Payment) -> anyhow::Result<()> {
    conn.execute(
        &format!(
            "INSERT INTO payments ({PAYMENT_COLUMNS})
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)"
        ),
        params![
            payment.id,
            payment.booking_id,
            payment.booking_group_id,
            payment.amount,
            payment.currency,
            payment.method.as_str(),
            payment.status.as_str(),
            payment.stripe_payment_intent_id,
            payment.reference,
            format_ts(payment.created_at),
            format_ts(payment.updated_at),
        ],
    )?;
    Ok(())
}

pub fn get_payments(conn: &Connection, owner: PaymentOwner<'_>) -> anyhow::Result<Vec<Payment>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {PAYMENT_COLUMNS} FROM payments WHERE {} = ?1 ORDER BY created_at DESC, rowid DESC",
        owner.column()
    ))?;
    let rows = stmt.query_map(params![owner.id()], payment_from_row)?;

    let mut payments = vec![];
    for row in rows {
        payments.push(row?);
    }
    Ok(payments)
}

/// The most recent `processing` payment that already has a gateway intent.
pub fn get_processing_payment(
    conn: &Connection,
    owner: PaymentOwner<'_>,
) -> anyhow::Result<Option<Payment>> {
    let result = conn.query_row(
        &format!(
            "SELECT {PAYMENT_COLUMNS} FROM payments
             WHERE {} = ?1 AND status = 'processing' AND stripe_payment_intent_id IS NOT NULL
             ORDER BY created_at DESC, rowid DESC LIMIT 1",
            owner.column()
        ),
        params![owner.id()],
        payment_from_row,
    );

    match result {
        Ok(payment) => Ok(Some(payment)),
        Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
        Err(e) => Err(e.into()),
    }
}

pub fn get_payment_by_intent(conn: &Connection, intent_id: &str) -> anyhow::Result<Option<Payment>> {
    let result = conn.query_row(
        &format!(
            "SELECT {PAYMENT_COLUMNS} FROM payments WHERE stripe_payment_intent_id = ?1
             ORDER BY created_at DESC, rowid DESC LIMIT 1"
        ),
        params![intent_id],
        payment_from_row,
    );

    match result {
        Ok(payment) => Ok(Some(payment)),
        Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
        Err(e) => Err(e.into()),
    }
}

/// Points an existing payment row at a gateway intent and marks it processing.
pub fn attach_payment_intent(
    conn: &Connection,
    payment_id: &str,
    intent_id: &str,
    amount: i64,
    now: NaiveDateTime,
) -> anyhow::Result<bool> {
    let count = conn.execute(
        "UPDATE payments SET
           stripe_payment_intent_id = ?1,
           amount = ?2,
           method = 'STRIPE',
           status = 'processing',
           updated_at = ?3
         WHERE id = ?4",
        params![intent_id, amount, format_ts(now), payment_id],
    )?;
    Ok(count > 0)
}

/// Marks every gateway payment of the owner (method STRIPE or carrying this
/// intent) with `status`. Rows already completed are left alone on failure.
pub fn update_gateway_payments(
    conn: &Connection,
    owner: PaymentOwner<'_>,
    intent_id: &str,
    status: &PaymentStatus,
    now: NaiveDateTime,
) -> anyhow::Result<usize> {
    let count = conn.execute(
        &format!(
            "UPDATE payments SET status = ?1, stripe_payment_intent_id = COALESCE(stripe_payment_intent_id, ?2),
               updated_at = ?3
             WHERE {} = ?4
               AND (method = 'STRIPE' OR stripe_payment_intent_id = ?2)
               AND NOT (status = 'completed' AND ?1 = 'failed')",
            owner.column()
        ),
        params![status.as_str(), intent_id, format_ts(now), owner.id()],
    )?;
    Ok(count)
}

// ── Transactions ──

pub fn transaction_exists(conn: &Connection, reference: &str) -> anyhow::Result<bool> {
    let count: i64 = conn.query_row(
        "SELECT COUNT(*) FROM transactions WHERE reference = ?1",
        params![reference],
        |row| row.get(0),
    )?;
    Ok(count > 0)
}

/// Returns false when a transaction with the same reference already exists.
pub fn insert_transaction(conn: &Connection, tx: &Transaction) -> anyhow::Result<bool> {
    let count = conn.execute(
        "INSERT OR IGNORE INTO transactions
           (id, club_id, booking_id, kind, category, amount, currency, description, reference, date, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
        params![
            tx.id,
            tx.club_id,
            tx.booking_id,
            tx.kind.as_str(),
            tx.category,
            tx.amount,
            tx.currency,
            tx.description,
            tx.reference,
            format_date(tx.date),
            format_ts(tx.created_at),
        ],
    )?;
    Ok(count > 0)
}

pub fn get_transactions_by_reference(
    conn: &Connection,
    reference: &str,
) -> anyhow::Result<Vec<Transaction>> {
    let mut stmt = conn.prepare(
        "SELECT id, club_id, booking_id, kind, category, amount, currency, description, reference, date, created_at
         FROM transactions WHERE reference = ?1",
    )?;
    let rows = stmt.query_map(params![reference], |row| {
        Ok(Transaction {
            id: row.get(0)?,
            club_id: row.get(1)?,
            booking_id: row.get(2)?,
            kind: TransactionKind::parse(&row.get::<_, String>(3)?),
            category: row.get(4)?,
            amount: row.get(5)?,
            currency: row.get(6)?,
            description: row.get(7)?,
            reference: row.get(8)?,
            date: date_col(row, 9)?,
            created_at: ts_col(row, 10)?,
        })
    })?;

    let mut txs = vec![];
    for row in rows {
        txs.push(row?);
    }
    Ok(txs)
}

pub fn count_transactions(conn: &Connection, club_id: &str) -> anyhow::Result<i64> {
    let count = conn.query_row(
        "SELECT COUNT(*) FROM transactions WHERE club_id = ?1",
        params![club_id],
        |row| row.get(0),
    )?;
    Ok(count)
}

// ── Class Bookings ──

const CLASS_COLUMNS: &str = "id, club_id, class_name, date, start_time, end_time, student_name, \
     student_phone, student_email, price, due_amount, payment_status, payment_method";

fn class_from_row(row: &Row) -> rusqlite::Result<ClassBooking> {
    Ok(ClassBooking {
        id: row.get(0)?,
        club_id: row.get(1)?,
        class_name: row.get(2)?,
        date: date_col(row, 3)?,
        start_time: time_col(row, 4)?,
        end_time: time_col(row, 5)?,
        student_name: row.get(6)?,
        student_phone: row.get(7)?,
        student_email: row.get(8)?,
        price: row.get(9)?,
        due_amount: row.get(10)?,
        payment_status: PaymentStatus::parse(&row.get::<_, String>(11)?),
        payment_method: row.get(12)?,
    })
}

pub fn insert_class_booking(conn: &Connection, class: &ClassBooking) -> anyhow::Result<()> {
    conn.execute(
        &format!(
            "INSERT INTO class_bookings ({CLASS_COLUMNS})
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)"
        ),
        params![
            class.id,
            class.club_id,
            class.class_name,
            format_date(class.date),
            format_time(class.start_time),
            format_time(class.end_time),
            class.student_name,
            class.student_phone,
            class.student_email,
            class.price,
            class.due_amount,
            class.payment_status.as_str(),
            class.payment_method,
        ],
    )?;
    Ok(())
}

pub fn get_class_booking(
    conn: &Connection,
    club_id: &str,
    id: &str,
) -> anyhow::Result<Option<ClassBooking>> {
    let result = conn.query_row(
        &format!("SELECT {CLASS_COLUMNS} FROM class_bookings WHERE id = ?1 AND club_id = ?2"),
        params![id, club_id],
        class_from_row,
    );

    match result {
        Ok(class) => Ok(Some(class)),
        Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
        Err(e) => Err(e.into()),
    }
}

pub fn get_class_booking_by_id(conn: &Connection, id: &str) -> anyhow::Result<Option<ClassBooking>> {
    let result = conn.query_row(
        &format!("SELECT {CLASS_COLUMNS} FROM class_bookings WHERE id = ?1"),
        params![id],
        class_from_row,
    );

    match result {
        Ok(class) => Ok(Some(class)),
        Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
        Err(e) => Err(e.into()),
    }
}

pub fn update_class_payment(
    conn: &Connection,
    id: &str,
    payment_status: &PaymentStatus,
    payment_method: Option<&str>,
    now: NaiveDateTime,
) -> anyhow::Result<bool> {
    let count = conn.execute(
        "UPDATE class_bookings SET
           payment_status = ?1,
           payment_method = COALESCE(?2, payment_method),
           updated_at = ?3
         WHERE id = ?4",
        params![payment_status.as_str(), payment_method, format_ts(now), id],
    )?;
    Ok(count > 0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db;

    fn setup() -> Connection {
        let conn = db::init_db(":memory:").unwrap();
        insert_club(
            &conn,
            &Club {
                id: "club-1".into(),
                name: "Club Norte".into(),
                currency: "MXN".into(),
            },
        )
        .unwrap();
        conn
    }

    #[test]
    fn test_settings_fall_back_to_defaults() {
        let conn = setup();
        let settings = get_club_settings(&conn, "club-1").unwrap();
        assert_eq!(settings.slot_duration, 90);
        assert_eq!(settings.buffer_time, 0);
        assert_eq!(settings.advance_booking_days, 90);
    }

    #[test]
    fn test_court_lookup_is_club_scoped() {
        let conn = setup();
        insert_court(
            &conn,
            &Court {
                id: "court-1".into(),
                club_id: "club-1".into(),
                name: "Pista 1".into(),
                active: true,
            },
        )
        .unwrap();
        assert!(get_court(&conn, "club-1", "court-1").unwrap().is_some());
        assert!(get_court(&conn, "club-2", "court-1").unwrap().is_none());
    }

    #[test]
    fn test_upsert_player_is_idempotent_per_phone() {
        let conn = setup();
        let first = upsert_player(&conn, "club-1", "Ana", None, "5512345678").unwrap();
        let second =
            upsert_player(&conn, "club-1", "Ana López", Some("ana@example.com"), "5512345678")
                .unwrap();
        assert_eq!(first, second);

        let player = get_player_by_phone(&conn, "club-1", "5512345678")
            .unwrap()
            .unwrap();
        assert_eq!(player.name, "Ana López");
        assert_eq!(player.email.as_deref(), Some("ana@example.com"));
    }

    #[test]
    fn test_session_expiry() {
        let conn = setup();
        let now = NaiveDateTime::parse_from_str("2025-06-16 12:00:00", TIMESTAMP_FORMAT).unwrap();
        insert_session(
            &conn,
            "tok",
            "user-1",
            "club-1",
            Some(now + chrono::Duration::hours(1)),
        )
        .unwrap();
        assert!(get_session(&conn, "tok", now).unwrap().is_some());
        assert!(get_session(&conn, "tok", now + chrono::Duration::hours(2))
            .unwrap()
            .is_none());
        assert!(get_session(&conn, "other", now).unwrap().is_none());
    }

    #[test]
    fn test_transaction_reference_is_unique() {
        let conn = setup();
        let now = NaiveDateTime::parse_from_str("2025-06-16 12:00:00", TIMESTAMP_FORMAT).unwrap();
        let tx = |id: &str| Transaction {
            id: id.into(),
            club_id: "club-1".into(),
            booking_id: None,
            kind: TransactionKind::Income,
            category: "BOOKING".into(),
            amount: 50000,
            currency: "MXN".into(),
            description: "Pago".into(),
            reference: Some("pi_1".into()),
            date: now.date(),
            created_at: now,
        };
        assert!(insert_transaction(&conn, &tx("t1")).unwrap());
        assert!(!insert_transaction(&conn, &tx("t2")).unwrap());
        assert!(transaction_exists(&conn, "pi_1").unwrap());
        assert_eq!(get_transactions_by_reference(&conn, "pi_1").unwrap().len(), 1);
    }
}
