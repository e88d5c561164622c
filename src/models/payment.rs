use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use serde::{Deserialize, Serialize};

use super::availability::hhmm;
use super::booking::PaymentStatus;

/// What a payment or split slice is collected for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PaymentOwner<'a> {
    Booking(&'a str),
    Group(&'a str),
}

impl<'a> PaymentOwner<'a> {
    pub fn column(&self) -> &'static str {
        match self {
            PaymentOwner::Booking(_) => "booking_id",
            PaymentOwner::Group(_) => "booking_group_id",
        }
    }

    pub fn id(&self) -> &'a str {
        match self {
            PaymentOwner::Booking(id) | PaymentOwner::Group(id) => id,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "UPPERCASE")]
pub enum PaymentMethod {
    Stripe,
    Cash,
    Card,
    Transfer,
    Terminal,
    Spei,
}

impl PaymentMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentMethod::Stripe => "STRIPE",
            PaymentMethod::Cash => "CASH",
            PaymentMethod::Card => "CARD",
            PaymentMethod::Transfer => "TRANSFER",
            PaymentMethod::Terminal => "TERMINAL",
            PaymentMethod::Spei => "SPEI",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "STRIPE" => Some(PaymentMethod::Stripe),
            "CASH" => Some(PaymentMethod::Cash),
            "CARD" => Some(PaymentMethod::Card),
            "TRANSFER" => Some(PaymentMethod::Transfer),
            "TERMINAL" => Some(PaymentMethod::Terminal),
            "SPEI" => Some(PaymentMethod::Spei),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Payment {
    pub id: String,
    pub booking_id: Option<String>,
    pub booking_group_id: Option<String>,
    pub amount: i64,
    pub currency: String,
    pub method: PaymentMethod,
    pub status: PaymentStatus,
    pub stripe_payment_intent_id: Option<String>,
    pub reference: Option<String>,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SplitPayment {
    pub id: String,
    pub booking_id: Option<String>,
    pub booking_group_id: Option<String>,
    pub player_name: String,
    pub player_phone: String,
    pub player_email: String,
    pub amount: i64,
    pub status: PaymentStatus,
    pub stripe_payment_intent_id: Option<String>,
    pub paid_at: Option<NaiveDateTime>,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

impl SplitPayment {
    pub fn owner(&self) -> Option<PaymentOwner<'_>> {
        match (&self.booking_group_id, &self.booking_id) {
            (Some(group_id), _) => Some(PaymentOwner::Group(group_id)),
            (None, Some(booking_id)) => Some(PaymentOwner::Booking(booking_id)),
            (None, None) => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "UPPERCASE")]
pub enum TransactionKind {
    Income,
    Expense,
}

impl TransactionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionKind::Income => "INCOME",
            TransactionKind::Expense => "EXPENSE",
        }
    }

    pub fn parse(s: &str) -> Self {
        match s {
            "EXPENSE" => TransactionKind::Expense,
            _ => TransactionKind::Income,
        }
    }
}

/// Immutable ledger entry. At most one per external `reference`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Transaction {
    pub id: String,
    pub club_id: String,
    pub booking_id: Option<String>,
    #[serde(rename = "type")]
    pub kind: TransactionKind,
    pub category: String,
    pub amount: i64,
    pub currency: String,
    pub description: String,
    pub reference: Option<String>,
    pub date: NaiveDate,
    pub created_at: NaiveDateTime,
}

pub const CATEGORY_BOOKING: &str = "BOOKING";
pub const CATEGORY_CLASS: &str = "CLASS";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ClassBooking {
    pub id: String,
    pub club_id: String,
    pub class_name: String,
    pub date: NaiveDate,
    #[serde(with = "hhmm")]
    pub start_time: NaiveTime,
    #[serde(with = "hhmm")]
    pub end_time: NaiveTime,
    pub student_name: String,
    pub student_phone: Option<String>,
    pub student_email: Option<String>,
    pub price: i64,
    pub due_amount: Option<i64>,
    pub payment_status: PaymentStatus,
    pub payment_method: Option<String>,
}

impl ClassBooking {
    /// Outstanding balance if one was recorded, otherwise the class price.
    pub fn amount_due(&self) -> i64 {
        self.due_amount.unwrap_or(self.price)
    }
}
