use chrono::{NaiveTime, Timelike};
use serde::{Deserialize, Serialize};

use super::booking::{Booking, BookingStatus};

pub const TIME_FORMAT: &str = "%H:%M";

/// Parses a wall-clock `HH:MM` string.
pub fn parse_time(s: &str) -> Option<NaiveTime> {
    let s = s.trim();
    // chrono accepts single-digit hours; the wire format does not
    if s.len() != 5 {
        return None;
    }
    NaiveTime::parse_from_str(s, TIME_FORMAT).ok()
}

pub fn format_time(t: NaiveTime) -> String {
    t.format(TIME_FORMAT).to_string()
}

pub fn minutes_of(t: NaiveTime) -> u32 {
    t.num_seconds_from_midnight() / 60
}

/// Converts minutes since midnight back to a time of day. `None` past 23:59.
pub fn time_from_minutes(minutes: u32) -> Option<NaiveTime> {
    NaiveTime::from_num_seconds_from_midnight_opt(minutes.checked_mul(60)?, 0)
}

/// Serde adapter for `HH:MM` times on the JSON surface.
pub mod hhmm {
    use chrono::NaiveTime;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(t: &NaiveTime, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&super::format_time(*t))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<NaiveTime, D::Error> {
        let raw = String::deserialize(d)?;
        super::parse_time(&raw)
            .ok_or_else(|| serde::de::Error::custom(format!("invalid time: {raw}")))
    }
}

/// Opening window for one club on one day.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OperatingHours {
    #[serde(with = "hhmm")]
    pub start: NaiveTime,
    #[serde(with = "hhmm")]
    pub end: NaiveTime,
}

impl OperatingHours {
    pub const DEFAULT_OPEN: (u32, u32) = (7, 0);
    pub const DEFAULT_CLOSE: (u32, u32) = (23, 0);

    pub fn new(start: NaiveTime, end: NaiveTime) -> Self {
        Self { start, end }
    }

    pub fn fallback() -> Self {
        Self {
            start: NaiveTime::from_hms_opt(Self::DEFAULT_OPEN.0, Self::DEFAULT_OPEN.1, 0)
                .unwrap_or_default(),
            end: NaiveTime::from_hms_opt(Self::DEFAULT_CLOSE.0, Self::DEFAULT_CLOSE.1, 0)
                .unwrap_or_default(),
        }
    }

    pub fn open_minutes(&self) -> u32 {
        minutes_of(self.start)
    }

    pub fn close_minutes(&self) -> u32 {
        minutes_of(self.end)
    }

    pub fn to_human_readable(&self) -> String {
        format!("{}-{}", format_time(self.start), format_time(self.end))
    }
}

/// The booking that makes a slot unavailable.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct BookingRef {
    pub id: String,
    pub player_name: String,
    #[serde(with = "hhmm")]
    pub start_time: NaiveTime,
    #[serde(with = "hhmm")]
    pub end_time: NaiveTime,
    pub status: BookingStatus,
}

impl From<&Booking> for BookingRef {
    fn from(b: &Booking) -> Self {
        Self {
            id: b.id.clone(),
            player_name: b.player_name.clone(),
            start_time: b.start_time,
            end_time: b.end_time,
            status: b.status.clone(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Slot {
    #[serde(with = "hhmm")]
    pub start_time: NaiveTime,
    #[serde(with = "hhmm")]
    pub end_time: NaiveTime,
    pub available: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub conflict: Option<BookingRef>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct AvailabilitySummary {
    pub total: usize,
    pub available: usize,
    pub occupied: usize,
    pub buffer_time: u32,
    pub slot_duration: u32,
}

impl AvailabilitySummary {
    /// Occupied counts every unavailable slot, whether conflicting or past.
    pub fn from_slots(slots: &[Slot], buffer_time: u32, slot_duration: u32) -> Self {
        let available = slots.iter().filter(|s| s.available).count();
        Self {
            total: slots.len(),
            available,
            occupied: slots.len() - available,
            buffer_time,
            slot_duration,
        }
    }
}
