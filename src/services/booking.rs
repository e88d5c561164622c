use chrono::{DateTime, Duration, NaiveDate, NaiveDateTime, Utc};
use rusqlite::{Connection, TransactionBehavior};
use serde::{Deserialize, Serialize};

use super::availability::{is_slot_free, validate_duration};
use super::conflicts::{check_within_hours, SchedulingError};
use super::players;
use super::pricing::{quote_price, PriceQuote};
use super::slots::hours_for_date;
use super::split_payment::{self, Booker};
use crate::clock::local_now;
use crate::db::queries::{self, DATE_FORMAT};
use crate::errors::AppError;
use crate::models::availability::{minutes_of, parse_time, time_from_minutes};
use crate::models::payment::CATEGORY_BOOKING;
use crate::models::{
    Booking, BookingGroup, BookingStatus, Court, Payment, PaymentMethod, PaymentOwner,
    PaymentStatus, SplitPayment, Transaction, TransactionKind,
};

pub const MIN_PHONE_LEN: usize = 10;
pub const DEFAULT_TOTAL_PLAYERS: u32 = 4;
pub const MAX_TOTAL_PLAYERS: u32 = 8;

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateBookingRequest {
    pub court_id: Option<String>,
    pub court_ids: Option<Vec<String>>,
    pub is_multi_court: Option<bool>,
    pub date: Option<String>,
    pub start_time: Option<String>,
    pub duration: Option<i64>,
    pub player_name: Option<String>,
    pub player_phone: Option<String>,
    pub player_email: Option<String>,
    pub total_players: Option<i64>,
    pub split_payment_enabled: Option<bool>,
    pub split_payment_count: Option<i64>,
    pub notes: Option<String>,
    pub payment_method: Option<String>,
    pub payment_type: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum PaymentChoice {
    Onsite(PaymentMethod),
    Stripe,
}

impl PaymentChoice {
    fn method(&self) -> PaymentMethod {
        match self {
            PaymentChoice::Onsite(method) => method.clone(),
            PaymentChoice::Stripe => PaymentMethod::Stripe,
        }
    }
}

/// A booking request that passed input validation.
#[derive(Debug, Clone)]
pub struct NewBooking {
    pub court_ids: Vec<String>,
    pub date: NaiveDate,
    pub start_time: chrono::NaiveTime,
    pub end_time: chrono::NaiveTime,
    pub duration: u32,
    pub player_name: String,
    pub player_phone: String,
    pub player_email: Option<String>,
    pub total_players: u32,
    pub split_payment_count: Option<u32>,
    pub notes: Option<String>,
    pub payment: PaymentChoice,
}

impl NewBooking {
    pub fn is_multi_court(&self) -> bool {
        self.court_ids.len() > 1
    }
}

fn invalid(msg: &str) -> AppError {
    AppError::Validation(msg.to_string())
}

pub fn parse_date(raw: &str) -> Result<NaiveDate, AppError> {
    let raw = raw.trim();
    if raw.len() != 10 {
        return Err(invalid("Fecha inválida, usa el formato AAAA-MM-DD"));
    }
    NaiveDate::parse_from_str(raw, DATE_FORMAT)
        .map_err(|_| invalid("Fecha inválida, usa el formato AAAA-MM-DD"))
}

fn payment_choice(method: Option<&str>, kind: Option<&str>) -> Result<PaymentChoice, AppError> {
    match method.map(str::trim).unwrap_or("onsite") {
        "stripe" => Ok(PaymentChoice::Stripe),
        "onsite" | "" => Ok(PaymentChoice::Onsite(match kind.map(str::trim) {
            Some("cash") => PaymentMethod::Cash,
            Some("terminal") => PaymentMethod::Terminal,
            _ => PaymentMethod::Transfer,
        })),
        _ => Err(invalid("Método de pago inválido")),
    }
}

impl CreateBookingRequest {
    pub fn validate(self) -> Result<NewBooking, AppError> {
        let court_ids: Vec<String> = match (self.is_multi_court.unwrap_or(false), self.court_ids) {
            (true, Some(ids)) if !ids.is_empty() => ids,
            (true, _) => return Err(invalid("Selecciona al menos una cancha")),
            (false, _) => match self.court_id.filter(|id| !id.trim().is_empty()) {
                Some(id) => vec![id],
                None => return Err(invalid("La cancha es requerida")),
            },
        };
        let mut seen = std::collections::HashSet::new();
        if !court_ids.iter().all(|id| seen.insert(id.as_str())) {
            return Err(invalid("Cancha duplicada en la reserva"));
        }

        let date = parse_date(self.date.as_deref().ok_or_else(|| invalid("La fecha es requerida"))?)?;
        let start_time = self
            .start_time
            .as_deref()
            .and_then(parse_time)
            .ok_or_else(|| invalid("Hora de inicio inválida, usa el formato HH:MM"))?;

        let duration = self.duration.ok_or_else(|| invalid("La duración es requerida"))?;
        let duration = u32::try_from(duration).unwrap_or(0);
        validate_duration(duration)?;
        let end_time = time_from_minutes(minutes_of(start_time) + duration)
            .ok_or_else(|| invalid("La reserva no puede terminar después de medianoche"))?;

        let player_name = self.player_name.unwrap_or_default().trim().to_string();
        if player_name.is_empty() {
            return Err(invalid("El nombre del jugador es requerido"));
        }
        let player_phone = players::normalize_phone(&self.player_phone.unwrap_or_default());
        if player_phone.chars().count() < MIN_PHONE_LEN {
            return Err(invalid("El teléfono debe tener al menos 10 dígitos"));
        }
        let player_email = self
            .player_email
            .map(|e| e.trim().to_string())
            .filter(|e| !e.is_empty());
        if let Some(email) = &player_email {
            if !validator::validate_email(email.as_str()) {
                return Err(invalid("Correo electrónico inválido"));
            }
        }

        let total_players = self.total_players.unwrap_or(i64::from(DEFAULT_TOTAL_PLAYERS));
        if !(1..=i64::from(MAX_TOTAL_PLAYERS)).contains(&total_players) {
            return Err(invalid("El número de jugadores debe estar entre 1 y 8"));
        }

        let split_payment_count = if self.split_payment_enabled.unwrap_or(false) {
            let count = self
                .split_payment_count
                .unwrap_or(i64::from(split_payment::DEFAULT_PARTICIPANTS));
            let range = i64::from(split_payment::MIN_PARTICIPANTS)
                ..=i64::from(split_payment::MAX_PARTICIPANTS);
            if !range.contains(&count) {
                return Err(invalid("El pago dividido debe ser entre 2 y 50 participantes"));
            }
            Some(count as u32)
        } else {
            None
        };

        let payment = payment_choice(self.payment_method.as_deref(), self.payment_type.as_deref())?;

        Ok(NewBooking {
            court_ids,
            date,
            start_time,
            end_time,
            duration,
            player_name,
            player_phone,
            player_email,
            total_players: total_players as u32,
            split_payment_count,
            notes: self.notes.filter(|n| !n.trim().is_empty()),
            payment,
        })
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreatedBooking {
    pub booking: Booking,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub booking_group: Option<BookingGroup>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub bookings: Vec<Booking>,
    pub split_payments: Vec<SplitPayment>,
    pub payment_link: Option<String>,
    pub price: PriceQuote,
    pub message: String,
    #[serde(skip)]
    pub court_names: Vec<String>,
    #[serde(skip)]
    pub club_name: String,
}

fn is_overlap_error(err: &anyhow::Error) -> bool {
    err.chain().any(|cause| cause.to_string().contains("booking overlap"))
}

/// Validates against the club's calendar, re-checks conflicts and writes the
/// booking (or group of bookings) with its payment records in one
/// `BEGIN IMMEDIATE` transaction.
pub fn create_booking(
    conn: &mut Connection,
    club_id: &str,
    req: NewBooking,
    now: DateTime<Utc>,
    fallback_tz: &str,
) -> Result<CreatedBooking, AppError> {
    let club = queries::get_club(conn, club_id)?
        .ok_or_else(|| AppError::NotFound("Club no encontrado".into()))?;
    let settings = queries::get_club_settings(conn, club_id)?;
    let local = local_now(now, &settings.timezone, fallback_tz);

    if req.date.and_time(req.start_time) < local {
        return Err(invalid("No se pueden crear reservas en fechas pasadas"));
    }
    let horizon = local.date() + Duration::days(i64::from(settings.advance_booking_days));
    if req.date > horizon {
        return Err(AppError::Validation(format!(
            "Solo se puede reservar con {} días de anticipación",
            settings.advance_booking_days
        )));
    }

    let rules = queries::get_schedule_rules(conn, club_id)?;
    check_within_hours(hours_for_date(&rules, req.date), req.start_time, req.end_time)?;

    let mut courts: Vec<Court> = Vec::with_capacity(req.court_ids.len());
    for court_id in &req.court_ids {
        let court = queries::get_court(conn, club_id, court_id)?
            .ok_or_else(|| AppError::NotFound("Cancha no encontrada".into()))?;
        if !court.active {
            return Err(invalid("La cancha seleccionada no está disponible"));
        }
        courts.push(court);
    }

    let now_utc = now.naive_utc();
    let quote = quote_price(
        conn,
        club_id,
        req.date,
        req.start_time,
        req.duration,
        Some(&req.player_phone),
        now_utc,
    )?;

    let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

    for court in &courts {
        if let Some(existing) = is_slot_free(
            &tx,
            &court.id,
            req.date,
            req.start_time,
            req.end_time,
            settings.buffer_time,
        )? {
            tracing::info!(
                court_id = %court.id,
                conflicting_booking = %existing.id,
                "booking rejected, slot taken"
            );
            return Err(SchedulingError::Conflict.into());
        }
    }

    let player_id = players::find_or_create(
        &tx,
        club_id,
        &req.player_name,
        req.player_email.as_deref(),
        &req.player_phone,
    );

    let group = if req.is_multi_court() {
        let group = BookingGroup {
            id: uuid::Uuid::new_v4().to_string(),
            club_id: club_id.to_string(),
            name: format!("Reserva múltiple - {}", req.player_name),
            date: req.date,
            start_time: req.start_time,
            end_time: req.end_time,
            duration: req.duration,
            player_name: req.player_name.clone(),
            player_email: req.player_email.clone(),
            player_phone: req.player_phone.clone(),
            total_price: quote.total * courts.len() as i64,
            currency: club.currency.clone(),
            status: BookingStatus::Pending,
            payment_status: PaymentStatus::Pending,
            split_payment_enabled: req.split_payment_count.is_some(),
            split_payment_count: req.split_payment_count.unwrap_or(0),
            created_at: now_utc,
            updated_at: now_utc,
        };
        queries::insert_booking_group(&tx, &group)?;
        Some(group)
    } else {
        None
    };

    let mut bookings = Vec::with_capacity(courts.len());
    for court in &courts {
        let booking = Booking {
            id: uuid::Uuid::new_v4().to_string(),
            club_id: club_id.to_string(),
            court_id: court.id.clone(),
            booking_group_id: group.as_ref().map(|g| g.id.clone()),
            date: req.date,
            start_time: req.start_time,
            end_time: req.end_time,
            duration: req.duration,
            player_id: player_id.clone(),
            player_name: req.player_name.clone(),
            player_email: req.player_email.clone(),
            player_phone: req.player_phone.clone(),
            total_players: req.total_players,
            price: quote.total,
            currency: club.currency.clone(),
            status: BookingStatus::Pending,
            payment_status: PaymentStatus::Pending,
            checked_in: false,
            checked_in_at: None,
            checked_in_by: None,
            split_payment_enabled: group.is_none() && req.split_payment_count.is_some(),
            split_payment_count: if group.is_none() {
                req.split_payment_count.unwrap_or(0)
            } else {
                0
            },
            notes: req.notes.clone(),
            created_at: now_utc,
            updated_at: now_utc,
        };
        if let Err(e) = queries::insert_booking(&tx, &booking) {
            if is_overlap_error(&e) {
                tracing::warn!(court_id = %court.id, "overlap trigger refused booking");
                return Err(SchedulingError::Conflict.into());
            }
            return Err(e.into());
        }
        bookings.push(booking);
    }

    let (owner, payable_id, payable_total) = match (&group, bookings.first()) {
        (Some(g), _) => (PaymentOwner::Group(&g.id), g.id.clone(), g.total_price),
        (None, Some(b)) => (PaymentOwner::Booking(&b.id), b.id.clone(), b.price),
        (None, None) => return Err(invalid("La cancha es requerida")),
    };

    queries::insert_payment(
        &tx,
        &Payment {
            id: uuid::Uuid::new_v4().to_string(),
            booking_id: match owner {
                PaymentOwner::Booking(id) => Some(id.to_string()),
                PaymentOwner::Group(_) => None,
            },
            booking_group_id: match owner {
                PaymentOwner::Group(id) => Some(id.to_string()),
                PaymentOwner::Booking(_) => None,
            },
            amount: payable_total,
            currency: club.currency.clone(),
            method: req.payment.method(),
            status: PaymentStatus::Pending,
            stripe_payment_intent_id: None,
            reference: None,
            created_at: now_utc,
            updated_at: now_utc,
        },
    )?;

    let split_payments = match req.split_payment_count {
        Some(count) => {
            let booker = Booker {
                name: &req.player_name,
                phone: &req.player_phone,
                email: req.player_email.as_deref(),
            };
            let slices = split_payment::build_slices(owner, payable_total, count, &booker, now_utc);
            for slice in &slices {
                queries::insert_split_payment(&tx, slice)?;
            }
            slices
        }
        None => vec![],
    };

    tx.commit()?;

    for booking in &bookings {
        tracing::info!(
            booking_id = %booking.id,
            court_id = %booking.court_id,
            date = %booking.date,
            start = %booking.start_time,
            price = booking.price,
            "booking created"
        );
    }

    let payment_link = match req.payment {
        PaymentChoice::Stripe => Some(format!("/pay/{payable_id}")),
        PaymentChoice::Onsite(_) => None,
    };
    let message = match req.payment {
        PaymentChoice::Stripe => "Reserva creada. Te enviaremos el link de pago por WhatsApp",
        PaymentChoice::Onsite(_) => "Reserva creada exitosamente. Recuerda pagar al llegar al club",
    }
    .to_string();

    let first = bookings
        .first()
        .cloned()
        .ok_or_else(|| AppError::Internal(anyhow::anyhow!("booking list empty after insert")))?;

    Ok(CreatedBooking {
        booking: first,
        bookings: if group.is_some() { bookings } else { vec![] },
        booking_group: group,
        split_payments,
        payment_link,
        price: quote,
        message,
        court_names: courts.into_iter().map(|c| c.name).collect(),
        club_name: club.name,
    })
}

pub fn get_booking(conn: &Connection, club_id: &str, booking_id: &str) -> Result<Booking, AppError> {
    queries::get_booking(conn, club_id, booking_id)?
        .ok_or_else(|| AppError::NotFound("Reserva no encontrada".into()))
}

// ── Check-in ──

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckInRequest {
    pub payment_method: Option<String>,
    pub payment_amount: Option<i64>,
    pub payment_code: Option<String>,
    pub notes: Option<String>,
}

fn onsite_method(raw: &str) -> Option<PaymentMethod> {
    match raw.trim().to_ascii_uppercase().as_str() {
        "CASH" => Some(PaymentMethod::Cash),
        "CARD" => Some(PaymentMethod::Card),
        "TRANSFER" => Some(PaymentMethod::Transfer),
        _ => None,
    }
}

/// Marks the player as arrived. An unpaid booking must come with an on-site
/// payment, which is recorded together with its ledger entry.
pub fn check_in(
    conn: &mut Connection,
    club_id: &str,
    user_id: &str,
    booking_id: &str,
    req: CheckInRequest,
    now: NaiveDateTime,
) -> Result<Booking, AppError> {
    let booking = get_booking(conn, club_id, booking_id)?;
    if booking.is_cancelled() {
        return Err(invalid("No se puede hacer check-in de una reserva cancelada"));
    }
    if booking.checked_in {
        return Err(invalid("La reserva ya tiene check-in registrado"));
    }

    let needs_payment = matches!(
        booking.payment_status,
        PaymentStatus::Pending | PaymentStatus::Failed
    );
    let onsite = match (needs_payment, req.payment_method.as_deref()) {
        (true, None) => {
            return Err(AppError::PaymentRequired(
                "La reserva tiene un pago pendiente. Registra el pago para hacer check-in".into(),
            ))
        }
        (true, Some(raw)) => {
            let method = onsite_method(raw).ok_or_else(|| invalid("Método de pago inválido"))?;
            let amount = req.payment_amount.unwrap_or(booking.price);
            if amount <= 0 {
                return Err(invalid("El monto del pago debe ser mayor a cero"));
            }
            Some((method, amount))
        }
        (false, _) => None,
    };

    let payment_code = req
        .payment_code
        .map(|c| c.trim().to_string())
        .filter(|c| !c.is_empty());
    let payment_status = if onsite.is_some() {
        PaymentStatus::Completed
    } else {
        booking.payment_status.clone()
    };

    let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
    queries::mark_booking_checked_in(
        &tx,
        &booking.id,
        user_id,
        &payment_status,
        req.notes.as_deref(),
        now,
    )?;

    if let Some((method, amount)) = &onsite {
        let amount = *amount;
        queries::insert_payment(
            &tx,
            &Payment {
                id: uuid::Uuid::new_v4().to_string(),
                booking_id: Some(booking.id.clone()),
                booking_group_id: None,
                amount,
                currency: booking.currency.clone(),
                method: method.clone(),
                status: PaymentStatus::Completed,
                stripe_payment_intent_id: None,
                reference: payment_code.clone(),
                created_at: now,
                updated_at: now,
            },
        )?;
        let reference = checkin_reference(&booking.id, payment_code.as_deref());
        let inserted = queries::insert_transaction(
            &tx,
            &Transaction {
                id: uuid::Uuid::new_v4().to_string(),
                club_id: club_id.to_string(),
                booking_id: Some(booking.id.clone()),
                kind: TransactionKind::Income,
                category: CATEGORY_BOOKING.to_string(),
                amount,
                currency: booking.currency.clone(),
                description: format!("Pago en sitio ({}) - {}", method.as_str(), booking.player_name),
                reference: Some(reference.clone()),
                date: booking.date,
                created_at: now,
            },
        )?;
        if !inserted {
            tracing::warn!(booking_id = %booking.id, reference = %reference, "ledger entry already existed");
        }
    }
    tx.commit()?;

    tracing::info!(
        booking_id = %booking.id,
        user_id = %user_id,
        paid_onsite = onsite.is_some(),
        "booking checked in"
    );

    get_booking(conn, club_id, booking_id)
}

/// Ledger reference for an on-site payment. Receipt codes are not unique
/// across bookings, so the booking id is always part of it.
fn checkin_reference(booking_id: &str, payment_code: Option<&str>) -> String {
    match payment_code {
        Some(code) => format!("checkin-{booking_id}-{code}"),
        None => format!("checkin-{booking_id}"),
    }
}

pub fn undo_check_in(
    conn: &Connection,
    club_id: &str,
    booking_id: &str,
    now: NaiveDateTime,
) -> Result<Booking, AppError> {
    let booking = get_booking(conn, club_id, booking_id)?;
    if !booking.checked_in {
        return Err(invalid("La reserva no tiene check-in registrado"));
    }
    queries::clear_booking_check_in(conn, &booking.id, now)?;
    tracing::info!(booking_id = %booking.id, "check-in reverted");
    get_booking(conn, club_id, booking_id)
}

/// Idempotent; bookings are never deleted.
pub fn cancel_booking(
    conn: &Connection,
    club_id: &str,
    booking_id: &str,
    now: NaiveDateTime,
) -> Result<Booking, AppError> {
    let booking = get_booking(conn, club_id, booking_id)?;
    if booking.is_cancelled() {
        return Ok(booking);
    }
    queries::update_booking_status(
        conn,
        &booking.id,
        &BookingStatus::Cancelled,
        &booking.payment_status,
        now,
    )?;
    tracing::info!(booking_id = %booking.id, "booking cancelled");
    get_booking(conn, club_id, booking_id)
}
