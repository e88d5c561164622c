use chrono::{NaiveDateTime, NaiveTime};
use serde::{Deserialize, Serialize};

use super::availability::{hhmm, OperatingHours};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Club {
    pub id: String,
    pub name: String,
    pub currency: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ClubSettings {
    pub club_id: String,
    pub slot_duration: u32,
    pub buffer_time: u32,
    pub timezone: String,
    pub advance_booking_days: u32,
}

impl ClubSettings {
    pub const DEFAULT_SLOT_DURATION: u32 = 90;
    pub const DEFAULT_TIMEZONE: &'static str = "America/Mexico_City";
    pub const DEFAULT_ADVANCE_DAYS: u32 = 90;

    pub fn defaults_for(club_id: &str) -> Self {
        Self {
            club_id: club_id.to_string(),
            slot_duration: Self::DEFAULT_SLOT_DURATION,
            buffer_time: 0,
            timezone: Self::DEFAULT_TIMEZONE.to_string(),
            advance_booking_days: Self::DEFAULT_ADVANCE_DAYS,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScheduleRule {
    pub id: String,
    pub club_id: String,
    /// 0 = Sunday. `None` applies to every day without a specific rule.
    pub day_of_week: Option<u32>,
    #[serde(with = "hhmm")]
    pub start_time: NaiveTime,
    #[serde(with = "hhmm")]
    pub end_time: NaiveTime,
    pub enabled: bool,
}

impl ScheduleRule {
    pub fn hours(&self) -> OperatingHours {
        OperatingHours::new(self.start_time, self.end_time)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Court {
    pub id: String,
    pub club_id: String,
    pub name: String,
    pub active: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Player {
    pub id: String,
    pub club_id: String,
    pub name: String,
    pub email: Option<String>,
    pub phone: String,
    pub total_bookings: i64,
    pub total_spent: i64,
    pub last_booking_at: Option<NaiveDateTime>,
}

#[derive(Debug, Clone)]
pub struct PricingRule {
    pub id: String,
    pub club_id: String,
    pub day_of_week: Option<u32>,
    pub start_time: NaiveTime,
    pub end_time: NaiveTime,
    /// Hourly price in minor currency units.
    pub price: i64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DiscountKind {
    Frequency,
    HappyHour,
    Volume,
}

impl DiscountKind {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "FREQUENCY" => Some(DiscountKind::Frequency),
            "HAPPY_HOUR" => Some(DiscountKind::HappyHour),
            "VOLUME" => Some(DiscountKind::Volume),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DiscountConditions {
    pub time_window_days: Option<i64>,
    pub min_bookings: Option<i64>,
    #[serde(default)]
    pub days: Vec<String>,
    pub start_time: Option<String>,
    pub end_time: Option<String>,
    pub min_hours: Option<f64>,
}

#[derive(Debug, Clone)]
pub struct DiscountRule {
    pub id: String,
    pub name: String,
    pub kind: DiscountKind,
    /// Percentage off.
    pub value: i64,
    pub conditions: DiscountConditions,
}

/// Per-club gateway configuration row.
#[derive(Debug, Clone)]
pub struct PaymentProvider {
    pub id: String,
    pub club_id: String,
    pub provider_id: String,
    pub enabled: bool,
    pub config: serde_json::Value,
}

#[derive(Debug, Clone)]
pub struct Session {
    pub user_id: String,
    pub club_id: String,
}
