use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use serde::{Deserialize, Serialize};

use super::availability::{hhmm, minutes_of};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Booking {
    pub id: String,
    pub club_id: String,
    pub court_id: String,
    pub booking_group_id: Option<String>,
    pub date: NaiveDate,
    #[serde(with = "hhmm")]
    pub start_time: NaiveTime,
    #[serde(with = "hhmm")]
    pub end_time: NaiveTime,
    pub duration: u32,
    pub player_id: Option<String>,
    pub player_name: String,
    pub player_email: Option<String>,
    pub player_phone: String,
    pub total_players: u32,
    pub price: i64,
    pub currency: String,
    pub status: BookingStatus,
    pub payment_status: PaymentStatus,
    pub checked_in: bool,
    pub checked_in_at: Option<NaiveDateTime>,
    pub checked_in_by: Option<String>,
    pub split_payment_enabled: bool,
    pub split_payment_count: u32,
    pub notes: Option<String>,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

impl Booking {
    /// `[start, end)` in minutes since midnight.
    pub fn interval(&self) -> (u32, u32) {
        (minutes_of(self.start_time), minutes_of(self.end_time))
    }

    pub fn is_cancelled(&self) -> bool {
        self.status == BookingStatus::Cancelled
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BookingStatus {
    Pending,
    Confirmed,
    InProgress,
    Cancelled,
}

impl BookingStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            BookingStatus::Pending => "PENDING",
            BookingStatus::Confirmed => "CONFIRMED",
            BookingStatus::InProgress => "IN_PROGRESS",
            BookingStatus::Cancelled => "CANCELLED",
        }
    }

    pub fn parse(s: &str) -> Self {
        match s {
            "CONFIRMED" => BookingStatus::Confirmed,
            "IN_PROGRESS" => BookingStatus::InProgress,
            "CANCELLED" => BookingStatus::Cancelled,
            _ => BookingStatus::Pending,
        }
    }
}

/// Mirrors the gateway lifecycle. Shared by bookings, groups, split slices,
/// class bookings and payment records.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum PaymentStatus {
    Pending,
    Processing,
    Completed,
    Failed,
    Refunded,
}

impl PaymentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentStatus::Pending => "pending",
            PaymentStatus::Processing => "processing",
            PaymentStatus::Completed => "completed",
            PaymentStatus::Failed => "failed",
            PaymentStatus::Refunded => "refunded",
        }
    }

    pub fn parse(s: &str) -> Self {
        match s {
            "processing" => PaymentStatus::Processing,
            "completed" => PaymentStatus::Completed,
            "failed" => PaymentStatus::Failed,
            "refunded" => PaymentStatus::Refunded,
            _ => PaymentStatus::Pending,
        }
    }
}

/// Several courts reserved together for the same interval.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct BookingGroup {
    pub id: String,
    pub club_id: String,
    pub name: String,
    pub date: NaiveDate,
    #[serde(with = "hhmm")]
    pub start_time: NaiveTime,
    #[serde(with = "hhmm")]
    pub end_time: NaiveTime,
    pub duration: u32,
    pub player_name: String,
    pub player_email: Option<String>,
    pub player_phone: String,
    pub total_price: i64,
    pub currency: String,
    pub status: BookingStatus,
    pub payment_status: PaymentStatus,
    pub split_payment_enabled: bool,
    pub split_payment_count: u32,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}
