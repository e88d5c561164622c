use std::collections::BTreeMap;

use rusqlite::{Connection, TransactionBehavior};
use serde::{Deserialize, Serialize};
use serde_json::json;

use super::gateway::{
    CreateIntentParams, GatewayCredentials, PaymentGateway, PaymentIntent, STRIPE_PROVIDER_ID,
};
use crate::db::queries;
use crate::errors::AppError;
use crate::models::availability::format_time;
use crate::models::{
    Payment, PaymentMethod, PaymentOwner, PaymentStatus, SplitPayment,
};
use crate::state::AppState;

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateIntentRequest {
    pub booking_id: Option<String>,
    pub split_payment_id: Option<String>,
}

/// The record a payment is collected for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PayableRef {
    Booking(String),
    Group(String),
    Class(String),
}

impl PayableRef {
    fn owner(&self) -> Option<PaymentOwner<'_>> {
        match self {
            PayableRef::Booking(id) => Some(PaymentOwner::Booking(id)),
            PayableRef::Group(id) => Some(PaymentOwner::Group(id)),
            PayableRef::Class(_) => None,
        }
    }

    fn metadata_key(&self) -> &'static str {
        match self {
            PayableRef::Booking(_) => "bookingId",
            PayableRef::Group(_) => "bookingGroupId",
            PayableRef::Class(_) => "classBookingId",
        }
    }

    fn id(&self) -> &str {
        match self {
            PayableRef::Booking(id) | PayableRef::Group(id) | PayableRef::Class(id) => id,
        }
    }
}

/// A resolved payable with the projection the gateway call needs.
#[derive(Debug, Clone)]
pub struct Payable {
    pub source: PayableRef,
    pub split: Option<SplitPayment>,
    pub amount: i64,
    pub currency: String,
    pub label: String,
    pub receipt_email: Option<String>,
    pub details: serde_json::Value,
    /// Gateway intent already attached to a `processing` record.
    pub existing_intent: Option<String>,
}

impl Payable {
    fn metadata(&self, club_id: &str) -> BTreeMap<String, String> {
        let mut metadata = BTreeMap::new();
        metadata.insert("clubId".to_string(), club_id.to_string());
        metadata.insert(self.source.metadata_key().to_string(), self.source.id().to_string());
        if let Some(split) = &self.split {
            metadata.insert("splitPaymentId".to_string(), split.id.clone());
        }
        metadata
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IntentResponse {
    pub success: bool,
    pub client_secret: Option<String>,
    pub payment_intent_id: String,
    pub amount: i64,
    pub booking_details: serde_json::Value,
}

fn already_paid() -> AppError {
    AppError::Validation("Este pago ya fue completado".into())
}

fn resolve_split(conn: &Connection, club_id: &str, split_id: &str) -> Result<Payable, AppError> {
    let not_found = || AppError::NotFound("Pago dividido no encontrado".into());
    let split = queries::get_split_payment(conn, split_id)?.ok_or_else(not_found)?;

    let (source, currency, details) = match split.owner() {
        Some(PaymentOwner::Booking(id)) => {
            let booking = queries::get_booking(conn, club_id, id)?.ok_or_else(not_found)?;
            let details = json!({
                "type": "booking",
                "id": booking.id,
                "date": booking.date,
                "startTime": format_time(booking.start_time),
                "endTime": format_time(booking.end_time),
                "playerName": split.player_name,
            });
            (PayableRef::Booking(booking.id), booking.currency, details)
        }
        Some(PaymentOwner::Group(id)) => {
            let group = queries::get_booking_group(conn, club_id, id)?.ok_or_else(not_found)?;
            let details = json!({
                "type": "group",
                "id": group.id,
                "date": group.date,
                "startTime": format_time(group.start_time),
                "endTime": format_time(group.end_time),
                "playerName": split.player_name,
            });
            (PayableRef::Group(group.id), group.currency, details)
        }
        None => return Err(not_found()),
    };

    if split.status == PaymentStatus::Completed {
        return Err(already_paid());
    }

    Ok(Payable {
        amount: split.amount,
        label: format!("Pago dividido - {}", split.player_name),
        receipt_email: Some(split.player_email.clone()).filter(|e| !e.is_empty()),
        existing_intent: match split.status {
            PaymentStatus::Processing => split.stripe_payment_intent_id.clone(),
            _ => None,
        },
        source,
        currency,
        details,
        split: Some(split),
    })
}

fn existing_intent(conn: &Connection, owner: PaymentOwner<'_>) -> Result<Option<String>, AppError> {
    Ok(queries::get_processing_payment(conn, owner)?.and_then(|p| p.stripe_payment_intent_id))
}

/// Booking, then booking group, then class booking, all scoped to the club.
pub fn resolve_payable(
    conn: &Connection,
    club_id: &str,
    req: &CreateIntentRequest,
) -> Result<Payable, AppError> {
    let booking_id = match (&req.split_payment_id, &req.booking_id) {
        (Some(split_id), _) if !split_id.is_empty() => return resolve_split(conn, club_id, split_id),
        (_, Some(id)) if !id.is_empty() => id,
        _ => {
            return Err(AppError::Validation(
                "Se requiere bookingId o splitPaymentId".into(),
            ))
        }
    };

    if let Some(booking) = queries::get_booking(conn, club_id, booking_id)? {
        if booking.payment_status == PaymentStatus::Completed {
            return Err(already_paid());
        }
        if booking.is_cancelled() {
            return Err(AppError::Validation("La reserva está cancelada".into()));
        }
        return Ok(Payable {
            existing_intent: existing_intent(conn, PaymentOwner::Booking(&booking.id))?,
            amount: booking.price,
            currency: booking.currency.clone(),
            label: format!("Reserva de cancha - {}", booking.player_name),
            receipt_email: booking.player_email.clone(),
            details: json!({
                "type": "booking",
                "id": booking.id,
                "date": booking.date,
                "startTime": format_time(booking.start_time),
                "endTime": format_time(booking.end_time),
                "playerName": booking.player_name,
            }),
            source: PayableRef::Booking(booking.id),
            split: None,
        });
    }

    if let Some(group) = queries::get_booking_group(conn, club_id, booking_id)? {
        if group.payment_status == PaymentStatus::Completed {
            return Err(already_paid());
        }
        let courts = queries::get_bookings_for_group(conn, &group.id)?.len();
        return Ok(Payable {
            existing_intent: existing_intent(conn, PaymentOwner::Group(&group.id))?,
            amount: group.total_price,
            currency: group.currency.clone(),
            label: format!("{} ({courts} canchas)", group.name),
            receipt_email: group.player_email.clone(),
            details: json!({
                "type": "group",
                "id": group.id,
                "date": group.date,
                "startTime": format_time(group.start_time),
                "endTime": format_time(group.end_time),
                "playerName": group.player_name,
                "courts": courts,
            }),
            source: PayableRef::Group(group.id),
            split: None,
        });
    }

    if let Some(class) = queries::get_class_booking(conn, club_id, booking_id)? {
        if class.payment_status == PaymentStatus::Completed {
            return Err(already_paid());
        }
        let currency = queries::get_club(conn, club_id)?
            .map(|c| c.currency)
            .unwrap_or_else(|| "MXN".to_string());
        return Ok(Payable {
            existing_intent: None,
            amount: class.amount_due(),
            currency,
            label: format!("Clase - {}", class.class_name),
            receipt_email: class.student_email.clone(),
            details: json!({
                "type": "class",
                "id": class.id,
                "className": class.class_name,
                "date": class.date,
                "startTime": format_time(class.start_time),
                "endTime": format_time(class.end_time),
                "playerName": class.student_name,
            }),
            source: PayableRef::Class(class.id),
            split: None,
        });
    }

    Err(AppError::NotFound("Reserva no encontrada".into()))
}

pub fn load_credentials(conn: &Connection, club_id: &str) -> Result<GatewayCredentials, AppError> {
    queries::get_payment_provider(conn, club_id, STRIPE_PROVIDER_ID)?
        .as_ref()
        .and_then(GatewayCredentials::from_provider)
        .ok_or_else(|| {
            AppError::Configuration("Los pagos en línea no están configurados para este club".into())
        })
}

/// Reuses a live intent, otherwise creates one. A failed lookup of the old
/// intent is logged and treated as gone.
async fn obtain_intent(
    gateway: &dyn PaymentGateway,
    club_id: &str,
    payable: &Payable,
) -> Result<PaymentIntent, AppError> {
    if let Some(intent_id) = &payable.existing_intent {
        match gateway.retrieve_intent(intent_id).await {
            Ok(intent) if !intent.status.is_terminal() => {
                tracing::info!(intent_id = %intent.id, status = intent.status.as_str(), "reusing payment intent");
                return Ok(intent);
            }
            Ok(intent) => {
                tracing::info!(intent_id = %intent.id, status = intent.status.as_str(), "previous intent is terminal, creating a new one");
            }
            Err(e) => {
                tracing::warn!(intent_id = %intent_id, error = %e, "failed to retrieve previous intent");
            }
        }
    }

    let params = CreateIntentParams {
        amount: payable.amount,
        currency: payable.currency.clone(),
        description: payable.label.clone(),
        receipt_email: payable.receipt_email.clone(),
        metadata: payable.metadata(club_id),
    };
    let intent = gateway
        .create_intent(&params)
        .await
        .map_err(|e| AppError::Gateway(format!("{e:#}")))?;
    tracing::info!(
        intent_id = %intent.id,
        payable = payable.source.id(),
        amount = payable.amount,
        "payment intent created"
    );
    Ok(intent)
}

/// Re-reads the payable under the write lock. A webhook may have settled it
/// while the gateway was being called.
fn ensure_still_payable(conn: &Connection, payable: &Payable) -> Result<(), AppError> {
    if let Some(split) = &payable.split {
        let current = queries::get_split_payment(conn, &split.id)?;
        if current.is_some_and(|s| s.status == PaymentStatus::Completed) {
            return Err(already_paid());
        }
        return Ok(());
    }
    match &payable.source {
        PayableRef::Booking(id) => {
            if let Some(booking) = queries::get_booking_by_id(conn, id)? {
                if booking.payment_status == PaymentStatus::Completed {
                    return Err(already_paid());
                }
                if booking.is_cancelled() {
                    return Err(AppError::Validation("La reserva está cancelada".into()));
                }
            }
        }
        PayableRef::Group(id) => {
            let current = queries::get_booking_group_by_id(conn, id)?;
            if current.is_some_and(|g| g.payment_status == PaymentStatus::Completed) {
                return Err(already_paid());
            }
        }
        PayableRef::Class(id) => {
            let current = queries::get_class_booking_by_id(conn, id)?;
            if current.is_some_and(|c| c.payment_status == PaymentStatus::Completed) {
                return Err(already_paid());
            }
        }
    }
    Ok(())
}

/// Attaches the intent to the local records and marks them processing.
pub fn record_intent(
    conn: &mut Connection,
    payable: &Payable,
    intent_id: &str,
    now: chrono::NaiveDateTime,
) -> Result<(), AppError> {
    let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
    if let Err(e) = ensure_still_payable(&tx, payable) {
        tracing::warn!(
            intent_id = %intent_id,
            payable = payable.source.id(),
            "payable settled while the intent was created, leaving records untouched"
        );
        return Err(e);
    }

    if let Some(split) = &payable.split {
        queries::update_split_payment_intent(&tx, &split.id, intent_id, now)?;
        tx.commit()?;
        return Ok(());
    }

    if let Some(owner) = payable.source.owner() {
        let open = queries::get_payments(&tx, owner)?
            .into_iter()
            .find(|p| p.status != PaymentStatus::Completed);
        match open {
            Some(payment) => {
                queries::attach_payment_intent(&tx, &payment.id, intent_id, payable.amount, now)?;
            }
            None => queries::insert_payment(
                &tx,
                &Payment {
                    id: uuid::Uuid::new_v4().to_string(),
                    booking_id: matches!(owner, PaymentOwner::Booking(_)).then(|| owner.id().to_string()),
                    booking_group_id: matches!(owner, PaymentOwner::Group(_))
                        .then(|| owner.id().to_string()),
                    amount: payable.amount,
                    currency: payable.currency.clone(),
                    method: PaymentMethod::Stripe,
                    status: PaymentStatus::Processing,
                    stripe_payment_intent_id: Some(intent_id.to_string()),
                    reference: None,
                    created_at: now,
                    updated_at: now,
                },
            )?,
        }
    }

    match &payable.source {
        PayableRef::Booking(id) => {
            queries::update_booking_payment_status(&tx, id, &PaymentStatus::Processing, now)?;
        }
        PayableRef::Group(id) => {
            queries::update_group_payment_status(&tx, id, &PaymentStatus::Processing, now)?;
        }
        PayableRef::Class(id) => {
            queries::update_class_payment(
                &tx,
                id,
                &PaymentStatus::Processing,
                Some(PaymentMethod::Stripe.as_str()),
                now,
            )?;
        }
    }

    tx.commit()?;
    Ok(())
}

/// Starts (or resumes) online payment for a booking, group, class or split
/// slice. The database lock is released while the gateway is called.
pub async fn create_payment_intent(
    state: &AppState,
    club_id: &str,
    req: CreateIntentRequest,
) -> Result<IntentResponse, AppError> {
    let (payable, credentials) = {
        let conn = state.db()?;
        let payable = resolve_payable(&conn, club_id, &req)?;
        let credentials = load_credentials(&conn, club_id)?;
        (payable, credentials)
    };

    let gateway = state.gateways.build(&credentials);
    let intent = obtain_intent(gateway.as_ref(), club_id, &payable).await?;

    {
        let mut conn = state.db()?;
        record_intent(&mut conn, &payable, &intent.id, state.now_utc())?;
    }

    Ok(IntentResponse {
        success: true,
        client_secret: intent.client_secret,
        payment_intent_id: intent.id,
        amount: payable.amount,
        booking_details: payable.details,
    })
}
