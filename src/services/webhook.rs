use std::collections::BTreeMap;

use chrono::NaiveDateTime;
use rusqlite::{Connection, TransactionBehavior};
use serde::Deserialize;

use crate::db::queries;
use crate::errors::AppError;
use crate::models::payment::{CATEGORY_BOOKING, CATEGORY_CLASS};
use crate::models::{
    Booking, BookingGroup, BookingStatus, PaymentOwner, PaymentStatus, Transaction,
    TransactionKind,
};

pub const EVENT_SUCCEEDED: &str = "payment_intent.succeeded";
pub const EVENT_FAILED: &str = "payment_intent.payment_failed";
pub const EVENT_REFUNDED: &str = "charge.refunded";

#[derive(Debug, Clone, Deserialize)]
pub struct WebhookEvent {
    #[serde(default)]
    pub id: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub data: EventData,
}

#[derive(Debug, Clone, Deserialize)]
pub struct EventData {
    pub object: EventObject,
}

#[derive(Debug, Clone, Deserialize)]
pub struct EventObject {
    pub id: String,
    #[serde(default)]
    pub amount: i64,
    #[serde(default)]
    pub currency: Option<String>,
    #[serde(default)]
    pub metadata: BTreeMap<String, String>,
}

impl EventObject {
    fn meta(&self, key: &str) -> Option<&str> {
        self.metadata.get(key).map(String::as_str).filter(|v| !v.is_empty())
    }
}

impl WebhookEvent {
    pub fn club_id(&self) -> Option<&str> {
        self.data.object.meta("clubId")
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventOutcome {
    Applied,
    /// The ledger already had this intent; statuses were re-asserted only.
    Duplicate,
    Ignored,
}

/// Which local record an intent belongs to, read from its metadata or, for
/// bookings created elsewhere, from the payment row carrying the intent.
enum Target {
    Split(String),
    Group(String),
    Class(String),
    Booking(String),
}

fn target_of(conn: &Connection, object: &EventObject) -> anyhow::Result<Option<Target>> {
    if let Some(id) = object.meta("splitPaymentId") {
        return Ok(Some(Target::Split(id.to_string())));
    }
    if let Some(id) = object.meta("bookingGroupId") {
        return Ok(Some(Target::Group(id.to_string())));
    }
    if let Some(id) = object.meta("classBookingId") {
        return Ok(Some(Target::Class(id.to_string())));
    }
    if let Some(id) = object.meta("bookingId") {
        return Ok(Some(Target::Booking(id.to_string())));
    }
    Ok(queries::get_payment_by_intent(conn, &object.id)?.and_then(|p| {
        match (p.booking_id, p.booking_group_id) {
            (Some(id), _) => Some(Target::Booking(id)),
            (None, Some(id)) => Some(Target::Group(id)),
            (None, None) => None,
        }
    }))
}

/// Club that owns the record behind `target`, if the record exists.
fn owning_club(conn: &Connection, target: &Target) -> anyhow::Result<Option<String>> {
    let club = match target {
        Target::Split(id) => {
            let Some(split) = queries::get_split_payment(conn, id)? else {
                return Ok(None);
            };
            match split.owner() {
                Some(PaymentOwner::Booking(id)) => {
                    queries::get_booking_by_id(conn, id)?.map(|b| b.club_id)
                }
                Some(PaymentOwner::Group(id)) => {
                    queries::get_booking_group_by_id(conn, id)?.map(|g| g.club_id)
                }
                None => None,
            }
        }
        Target::Group(id) => queries::get_booking_group_by_id(conn, id)?.map(|g| g.club_id),
        Target::Class(id) => queries::get_class_booking_by_id(conn, id)?.map(|c| c.club_id),
        Target::Booking(id) => queries::get_booking_by_id(conn, id)?.map(|b| b.club_id),
    };
    Ok(club)
}

/// Target of the intent, but only when `club_id` owns it. Events signed with
/// one club's secret never touch another club's records.
fn scoped_target(
    conn: &Connection,
    club_id: &str,
    object: &EventObject,
) -> anyhow::Result<Option<Target>> {
    let Some(target) = target_of(conn, object)? else {
        tracing::warn!(intent_id = %object.id, "no local record for intent");
        return Ok(None);
    };
    match owning_club(conn, &target)? {
        Some(owner) if owner == club_id => Ok(Some(target)),
        Some(owner) => {
            tracing::warn!(
                intent_id = %object.id,
                event_club = %club_id,
                record_club = %owner,
                "intent targets a record of another club"
            );
            Ok(None)
        }
        None => {
            tracing::warn!(intent_id = %object.id, "intent target not found");
            Ok(None)
        }
    }
}

/// Applies one verified gateway event. Safe to call repeatedly with the same
/// event: the ledger is keyed on the intent id and status moves are guarded.
pub fn apply_event(
    conn: &mut Connection,
    club_id: &str,
    event: &WebhookEvent,
    now: NaiveDateTime,
) -> Result<EventOutcome, AppError> {
    match event.kind.as_str() {
        EVENT_SUCCEEDED => {
            let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
            let outcome = payment_succeeded(&tx, club_id, &event.data.object, now)?;
            tx.commit()?;
            Ok(outcome)
        }
        EVENT_FAILED => {
            let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
            let outcome = payment_failed(&tx, club_id, &event.data.object, now)?;
            tx.commit()?;
            Ok(outcome)
        }
        EVENT_REFUNDED => {
            tracing::info!(object_id = %event.data.object.id, "refund acknowledged");
            Ok(EventOutcome::Ignored)
        }
        other => {
            tracing::debug!(event_type = %other, "unhandled event type");
            Ok(EventOutcome::Ignored)
        }
    }
}

struct LedgerEntry<'a> {
    club_id: &'a str,
    booking_id: Option<String>,
    category: &'a str,
    amount: i64,
    currency: String,
    description: String,
    date: chrono::NaiveDate,
}

/// Inserts the INCOME entry for `intent_id` unless one already exists.
fn record_income(
    conn: &Connection,
    intent_id: &str,
    entry: LedgerEntry<'_>,
    now: NaiveDateTime,
) -> anyhow::Result<bool> {
    if queries::transaction_exists(conn, intent_id)? {
        tracing::info!(intent_id = %intent_id, "ledger entry already recorded");
        return Ok(false);
    }
    queries::insert_transaction(
        conn,
        &Transaction {
            id: uuid::Uuid::new_v4().to_string(),
            club_id: entry.club_id.to_string(),
            booking_id: entry.booking_id,
            kind: TransactionKind::Income,
            category: entry.category.to_string(),
            amount: entry.amount,
            currency: entry.currency,
            description: entry.description,
            reference: Some(intent_id.to_string()),
            date: entry.date,
            created_at: now,
        },
    )
}

fn paid_amount(object: &EventObject, fallback: i64) -> i64 {
    if object.amount > 0 {
        object.amount
    } else {
        fallback
    }
}

fn paid_currency(object: &EventObject, fallback: &str) -> String {
    object
        .currency
        .as_deref()
        .map(str::to_uppercase)
        .unwrap_or_else(|| fallback.to_string())
}

fn outcome(inserted: bool) -> EventOutcome {
    if inserted {
        EventOutcome::Applied
    } else {
        EventOutcome::Duplicate
    }
}

fn confirm_booking(conn: &Connection, booking: &Booking, now: NaiveDateTime) -> anyhow::Result<()> {
    if booking.is_cancelled() {
        queries::update_booking_payment_status(conn, &booking.id, &PaymentStatus::Completed, now)?;
        tracing::warn!(booking_id = %booking.id, "payment received for cancelled booking");
        return Ok(());
    }
    let status = match booking.status {
        BookingStatus::InProgress => BookingStatus::InProgress,
        _ => BookingStatus::Confirmed,
    };
    queries::update_booking_status(conn, &booking.id, &status, &PaymentStatus::Completed, now)?;
    Ok(())
}

fn confirm_group(conn: &Connection, group: &BookingGroup, now: NaiveDateTime) -> anyhow::Result<()> {
    let status = match group.status {
        BookingStatus::Cancelled => BookingStatus::Cancelled,
        _ => BookingStatus::Confirmed,
    };
    queries::update_group_status(conn, &group.id, &status, &PaymentStatus::Completed, now)?;
    for booking in queries::get_bookings_for_group(conn, &group.id)? {
        confirm_booking(conn, &booking, now)?;
    }
    Ok(())
}

fn payment_succeeded(
    conn: &Connection,
    club_id: &str,
    object: &EventObject,
    now: NaiveDateTime,
) -> anyhow::Result<EventOutcome> {
    let intent_id = object.id.as_str();
    let Some(target) = scoped_target(conn, club_id, object)? else {
        return Ok(EventOutcome::Ignored);
    };

    match target {
        Target::Split(split_id) => {
            let Some(split) = queries::get_split_payment(conn, &split_id)? else {
                tracing::warn!(split_payment_id = %split_id, "split payment not found");
                return Ok(EventOutcome::Ignored);
            };
            if split.status != PaymentStatus::Completed {
                queries::update_split_payment_status(
                    conn,
                    &split.id,
                    &PaymentStatus::Completed,
                    Some(now),
                    now,
                )?;
            }

            let Some(owner) = split.owner() else {
                return Ok(EventOutcome::Ignored);
            };
            let (currency, date, booking_id) = match owner {
                PaymentOwner::Booking(id) => match queries::get_booking_by_id(conn, id)? {
                    Some(b) => (b.currency, b.date, Some(b.id)),
                    None => return Ok(EventOutcome::Ignored),
                },
                PaymentOwner::Group(id) => match queries::get_booking_group_by_id(conn, id)? {
                    Some(g) => (g.currency, g.date, None),
                    None => return Ok(EventOutcome::Ignored),
                },
            };

            let inserted = record_income(
                conn,
                intent_id,
                LedgerEntry {
                    club_id,
                    booking_id,
                    category: CATEGORY_BOOKING,
                    amount: paid_amount(object, split.amount),
                    currency: paid_currency(object, &currency),
                    description: format!("Pago dividido - {}", split.player_name),
                    date,
                },
                now,
            )?;

            let slices = queries::get_split_payments(conn, owner)?;
            if slices.iter().all(|s| s.status == PaymentStatus::Completed) {
                match owner {
                    PaymentOwner::Booking(id) => {
                        if let Some(booking) = queries::get_booking_by_id(conn, id)? {
                            confirm_booking(conn, &booking, now)?;
                        }
                    }
                    PaymentOwner::Group(id) => {
                        if let Some(group) = queries::get_booking_group_by_id(conn, id)? {
                            confirm_group(conn, &group, now)?;
                        }
                    }
                }
                tracing::info!(owner = owner.id(), "all split payments completed");
            }

            tracing::info!(split_payment_id = %split.id, intent_id = %intent_id, "split payment completed");
            Ok(outcome(inserted))
        }
        Target::Group(group_id) => {
            let Some(group) = queries::get_booking_group_by_id(conn, &group_id)? else {
                tracing::warn!(booking_group_id = %group_id, "booking group not found");
                return Ok(EventOutcome::Ignored);
            };
            confirm_group(conn, &group, now)?;
            queries::update_gateway_payments(
                conn,
                PaymentOwner::Group(&group.id),
                intent_id,
                &PaymentStatus::Completed,
                now,
            )?;
            let inserted = record_income(
                conn,
                intent_id,
                LedgerEntry {
                    club_id,
                    booking_id: None,
                    category: CATEGORY_BOOKING,
                    amount: paid_amount(object, group.total_price),
                    currency: paid_currency(object, &group.currency),
                    description: format!("Pago en línea - {}", group.name),
                    date: group.date,
                },
                now,
            )?;
            tracing::info!(booking_group_id = %group.id, intent_id = %intent_id, "group payment completed");
            Ok(outcome(inserted))
        }
        Target::Class(class_id) => {
            let Some(class) = queries::get_class_booking_by_id(conn, &class_id)? else {
                tracing::warn!(class_booking_id = %class_id, "class booking not found");
                return Ok(EventOutcome::Ignored);
            };
            queries::update_class_payment(
                conn,
                &class.id,
                &PaymentStatus::Completed,
                Some("STRIPE"),
                now,
            )?;
            let currency = queries::get_club(conn, &class.club_id)?
                .map(|c| c.currency)
                .unwrap_or_else(|| "MXN".to_string());
            let inserted = record_income(
                conn,
                intent_id,
                LedgerEntry {
                    club_id,
                    booking_id: None,
                    category: CATEGORY_CLASS,
                    amount: paid_amount(object, class.amount_due()),
                    currency: paid_currency(object, &currency),
                    description: format!("Clase {} - {}", class.class_name, class.student_name),
                    date: class.date,
                },
                now,
            )?;
            tracing::info!(class_booking_id = %class.id, intent_id = %intent_id, "class payment completed");
            Ok(outcome(inserted))
        }
        Target::Booking(booking_id) => {
            let Some(booking) = queries::get_booking_by_id(conn, &booking_id)? else {
                tracing::warn!(booking_id = %booking_id, "booking not found");
                return Ok(EventOutcome::Ignored);
            };
            confirm_booking(conn, &booking, now)?;
            queries::update_gateway_payments(
                conn,
                PaymentOwner::Booking(&booking.id),
                intent_id,
                &PaymentStatus::Completed,
                now,
            )?;
            let inserted = record_income(
                conn,
                intent_id,
                LedgerEntry {
                    club_id,
                    booking_id: Some(booking.id.clone()),
                    category: CATEGORY_BOOKING,
                    amount: paid_amount(object, booking.price),
                    currency: paid_currency(object, &booking.currency),
                    description: format!("Pago en línea - {}", booking.player_name),
                    date: booking.date,
                },
                now,
            )?;
            tracing::info!(booking_id = %booking.id, intent_id = %intent_id, "booking payment completed");
            Ok(outcome(inserted))
        }
    }
}

fn fail_booking(conn: &Connection, booking: &Booking, now: NaiveDateTime) -> anyhow::Result<()> {
    if booking.payment_status == PaymentStatus::Completed {
        tracing::warn!(booking_id = %booking.id, "ignoring failure for paid booking");
        return Ok(());
    }
    match booking.status {
        BookingStatus::Cancelled | BookingStatus::InProgress => {
            queries::update_booking_payment_status(conn, &booking.id, &PaymentStatus::Failed, now)?;
        }
        _ => {
            queries::update_booking_status(
                conn,
                &booking.id,
                &BookingStatus::Pending,
                &PaymentStatus::Failed,
                now,
            )?;
        }
    }
    Ok(())
}

fn payment_failed(
    conn: &Connection,
    club_id: &str,
    object: &EventObject,
    now: NaiveDateTime,
) -> anyhow::Result<EventOutcome> {
    let intent_id = object.id.as_str();
    let Some(target) = scoped_target(conn, club_id, object)? else {
        return Ok(EventOutcome::Ignored);
    };

    match target {
        Target::Split(split_id) => {
            if let Some(split) = queries::get_split_payment(conn, &split_id)? {
                if split.status != PaymentStatus::Completed {
                    queries::update_split_payment_status(
                        conn,
                        &split.id,
                        &PaymentStatus::Failed,
                        None,
                        now,
                    )?;
                }
            }
        }
        Target::Group(group_id) => {
            if let Some(group) = queries::get_booking_group_by_id(conn, &group_id)? {
                if group.payment_status != PaymentStatus::Completed {
                    let status = match group.status {
                        BookingStatus::Cancelled => BookingStatus::Cancelled,
                        _ => BookingStatus::Pending,
                    };
                    queries::update_group_status(conn, &group.id, &status, &PaymentStatus::Failed, now)?;
                    for booking in queries::get_bookings_for_group(conn, &group.id)? {
                        fail_booking(conn, &booking, now)?;
                    }
                }
                queries::update_gateway_payments(
                    conn,
                    PaymentOwner::Group(&group.id),
                    intent_id,
                    &PaymentStatus::Failed,
                    now,
                )?;
            }
        }
        Target::Class(class_id) => {
            if let Some(class) = queries::get_class_booking_by_id(conn, &class_id)? {
                if class.payment_status != PaymentStatus::Completed {
                    queries::update_class_payment(conn, &class.id, &PaymentStatus::Failed, None, now)?;
                }
            }
        }
        Target::Booking(booking_id) => {
            if let Some(booking) = queries::get_booking_by_id(conn, &booking_id)? {
                fail_booking(conn, &booking, now)?;
                queries::update_gateway_payments(
                    conn,
                    PaymentOwner::Booking(&booking.id),
                    intent_id,
                    &PaymentStatus::Failed,
                    now,
                )?;
            }
        }
    }

    tracing::info!(intent_id = %intent_id, "payment failure recorded");
    Ok(EventOutcome::Applied)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db;
    use crate::models::availability::parse_time;
    use crate::models::{Club, Court, Payment, PaymentMethod};
    use chrono::NaiveDate;

    fn ts() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2025, 6, 10)
            .unwrap()
            .and_hms_opt(18, 0, 0)
            .unwrap()
    }

    fn booking(id: &str, status: BookingStatus) -> Booking {
        Booking {
            id: id.into(),
            club_id: "club-1".into(),
            court_id: "court-1".into(),
            booking_group_id: None,
            date: NaiveDate::from_ymd_opt(2025, 6, 16).unwrap(),
            start_time: parse_time("10:00").unwrap(),
            end_time: parse_time("11:30").unwrap(),
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
            created_at: ts(),
            updated_at: ts(),
        }
    }

    fn setup() -> Connection {
        let conn = db::init_db(":memory:").unwrap();
        queries::insert_club(
            &conn,
            &Club {
                id: "club-1".into(),
                name: "Club".into(),
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
        conn
    }

    fn event(kind: &str, intent_id: &str, metadata: &[(&str, &str)]) -> WebhookEvent {
        WebhookEvent {
            id: "evt_1".into(),
            kind: kind.into(),
            data: EventData {
                object: EventObject {
                    id: intent_id.into(),
                    amount: 50000,
                    currency: Some("mxn".into()),
                    metadata: metadata
                        .iter()
                        .map(|(k, v)| (k.to_string(), v.to_string()))
                        .collect(),
                },
            },
        }
    }

    #[test]
    fn test_event_parses_from_gateway_json() {
        let raw = r#"{
            "id": "evt_1",
            "type": "payment_intent.succeeded",
            "data": {"object": {"id": "pi_1", "amount": 50000, "currency": "mxn",
                     "metadata": {"clubId": "club-1", "bookingId": "booking-1"}}}
        }"#;
        let event: WebhookEvent = serde_json::from_str(raw).unwrap();
        assert_eq!(event.club_id(), Some("club-1"));
        assert_eq!(event.data.object.amount, 50000);
    }

    #[test]
    fn test_succeeded_is_idempotent() {
        let mut conn = setup();
        queries::insert_booking(&conn, &booking("booking-1", BookingStatus::Pending)).unwrap();
        queries::insert_payment(
            &conn,
            &Payment {
                id: "pay-1".into(),
                booking_id: Some("booking-1".into()),
                booking_group_id: None,
                amount: 50000,
                currency: "MXN".into(),
                method: PaymentMethod::Stripe,
                status: PaymentStatus::Pending,
                stripe_payment_intent_id: None,
                reference: None,
                created_at: ts(),
                updated_at: ts(),
            },
        )
        .unwrap();

        let ev = event(EVENT_SUCCEEDED, "pi_1", &[("clubId", "club-1"), ("bookingId", "booking-1")]);
        assert_eq!(apply_event(&mut conn, "club-1", &ev, ts()).unwrap(), EventOutcome::Applied);
        assert_eq!(apply_event(&mut conn, "club-1", &ev, ts()).unwrap(), EventOutcome::Duplicate);

        let stored = queries::get_booking_by_id(&conn, "booking-1").unwrap().unwrap();
        assert_eq!(stored.status, BookingStatus::Confirmed);
        assert_eq!(stored.payment_status, PaymentStatus::Completed);

        let ledger = queries::get_transactions_by_reference(&conn, "pi_1").unwrap();
        assert_eq!(ledger.len(), 1);
        assert_eq!(ledger[0].amount, 50000);
        assert_eq!(ledger[0].kind, TransactionKind::Income);
        assert_eq!(ledger[0].currency, "MXN");

        let payments = queries::get_payments(&conn, PaymentOwner::Booking("booking-1")).unwrap();
        assert_eq!(payments[0].status, PaymentStatus::Completed);
        assert_eq!(payments[0].stripe_payment_intent_id.as_deref(), Some("pi_1"));
    }

    #[test]
    fn test_cancelled_booking_stays_cancelled_but_is_ledgered() {
        let mut conn = setup();
        queries::insert_booking(&conn, &booking("booking-1", BookingStatus::Cancelled)).unwrap();

        let ev = event(EVENT_SUCCEEDED, "pi_1", &[("clubId", "club-1"), ("bookingId", "booking-1")]);
        apply_event(&mut conn, "club-1", &ev, ts()).unwrap();

        let stored = queries::get_booking_by_id(&conn, "booking-1").unwrap().unwrap();
        assert_eq!(stored.status, BookingStatus::Cancelled);
        assert_eq!(stored.payment_status, PaymentStatus::Completed);
        assert_eq!(queries::get_transactions_by_reference(&conn, "pi_1").unwrap().len(), 1);
    }

    #[test]
    fn test_failure_never_reverts_completed_payment() {
        let mut conn = setup();
        queries::insert_booking(&conn, &booking("booking-1", BookingStatus::Pending)).unwrap();
        let meta = [("clubId", "club-1"), ("bookingId", "booking-1")];

        apply_event(&mut conn, "club-1", &event(EVENT_FAILED, "pi_1", &meta), ts()).unwrap();
        let stored = queries::get_booking_by_id(&conn, "booking-1").unwrap().unwrap();
        assert_eq!(stored.payment_status, PaymentStatus::Failed);
        assert_eq!(stored.status, BookingStatus::Pending);

        apply_event(&mut conn, "club-1", &event(EVENT_SUCCEEDED, "pi_2", &meta), ts()).unwrap();
        apply_event(&mut conn, "club-1", &event(EVENT_FAILED, "pi_1", &meta), ts()).unwrap();
        let stored = queries::get_booking_by_id(&conn, "booking-1").unwrap().unwrap();
        assert_eq!(stored.status, BookingStatus::Confirmed);
        assert_eq!(stored.payment_status, PaymentStatus::Completed);
    }

    #[test]
    fn test_booking_found_through_payment_row() {
        let mut conn = setup();
        queries::insert_booking(&conn, &booking("booking-1", BookingStatus::Pending)).unwrap();
        queries::insert_payment(
            &conn,
            &Payment {
                id: "pay-1".into(),
                booking_id: Some("booking-1".into()),
                booking_group_id: None,
                amount: 50000,
                currency: "MXN".into(),
                method: PaymentMethod::Stripe,
                status: PaymentStatus::Processing,
                stripe_payment_intent_id: Some("pi_9".into()),
                reference: None,
                created_at: ts(),
                updated_at: ts(),
            },
        )
        .unwrap();

        let ev = event(EVENT_SUCCEEDED, "pi_9", &[("clubId", "club-1")]);
        assert_eq!(apply_event(&mut conn, "club-1", &ev, ts()).unwrap(), EventOutcome::Applied);
        let stored = queries::get_booking_by_id(&conn, "booking-1").unwrap().unwrap();
        assert_eq!(stored.status, BookingStatus::Confirmed);
    }

    #[test]
    fn test_split_slices_roll_up_to_booking() {
        let mut conn = setup();
        queries::insert_booking(&conn, &booking("booking-1", BookingStatus::Pending)).unwrap();
        let slices = crate::services::split_payment::build_slices(
            PaymentOwner::Booking("booking-1"),
            50000,
            2,
            &crate::services::split_payment::Booker {
                name: "Ana",
                phone: "5512345678",
                email: None,
            },
            ts(),
        );
        for slice in &slices {
            queries::insert_split_payment(&conn, slice).unwrap();
        }

        for (i, slice) in slices.iter().enumerate() {
            let intent = format!("pi_split_{i}");
            let mut ev = event(
                EVENT_SUCCEEDED,
                &intent,
                &[("clubId", "club-1"), ("bookingId", "booking-1"), ("splitPaymentId", slice.id.as_str())],
            );
            ev.data.object.amount = slice.amount;
            apply_event(&mut conn, "club-1", &ev, ts()).unwrap();

            let stored = queries::get_booking_by_id(&conn, "booking-1").unwrap().unwrap();
            let expected = if i + 1 == slices.len() {
                BookingStatus::Confirmed
            } else {
                BookingStatus::Pending
            };
            assert_eq!(stored.status, expected);
        }

        let stored = queries::get_split_payment(&conn, &slices[0].id).unwrap().unwrap();
        assert_eq!(stored.status, PaymentStatus::Completed);
        assert!(stored.paid_at.is_some());
        assert_eq!(queries::count_transactions(&conn, "club-1").unwrap(), 2);
    }

    #[test]
    fn test_events_never_touch_other_clubs() {
        let mut conn = setup();
        queries::insert_club(
            &conn,
            &Club {
                id: "club-2".into(),
                name: "Otro club".into(),
                currency: "MXN".into(),
            },
        )
        .unwrap();
        queries::insert_court(
            &conn,
            &Court {
                id: "court-9".into(),
                club_id: "club-2".into(),
                name: "Pista 9".into(),
                active: true,
            },
        )
        .unwrap();
        let mut foreign = booking("booking-9", BookingStatus::Pending);
        foreign.club_id = "club-2".into();
        foreign.court_id = "court-9".into();
        queries::insert_booking(&conn, &foreign).unwrap();

        let meta = [("clubId", "club-1"), ("bookingId", "booking-9")];
        let ev = event(EVENT_SUCCEEDED, "pi_x", &meta);
        assert_eq!(apply_event(&mut conn, "club-1", &ev, ts()).unwrap(), EventOutcome::Ignored);
        let ev = event(EVENT_FAILED, "pi_x", &meta);
        assert_eq!(apply_event(&mut conn, "club-1", &ev, ts()).unwrap(), EventOutcome::Ignored);

        let stored = queries::get_booking_by_id(&conn, "booking-9").unwrap().unwrap();
        assert_eq!(stored.status, BookingStatus::Pending);
        assert_eq!(stored.payment_status, PaymentStatus::Pending);
        assert!(queries::get_transactions_by_reference(&conn, "pi_x").unwrap().is_empty());

        let ev = event(EVENT_SUCCEEDED, "pi_y", &[("clubId", "club-2"), ("bookingId", "booking-9")]);
        assert_eq!(apply_event(&mut conn, "club-2", &ev, ts()).unwrap(), EventOutcome::Applied);
        let ledger = queries::get_transactions_by_reference(&conn, "pi_y").unwrap();
        assert_eq!(ledger[0].club_id, "club-2");
    }

    #[test]
    fn test_unhandled_events_are_ignored() {
        let mut conn = setup();
        let ev = event("customer.created", "cus_1", &[("clubId", "club-1")]);
        assert_eq!(apply_event(&mut conn, "club-1", &ev, ts()).unwrap(), EventOutcome::Ignored);
        let ev = event(EVENT_REFUNDED, "ch_1", &[("clubId", "club-1")]);
        assert_eq!(apply_event(&mut conn, "club-1", &ev, ts()).unwrap(), EventOutcome::Ignored);
        assert_eq!(queries::count_transactions(&conn, "club-1").unwrap(), 0);
    }
}
