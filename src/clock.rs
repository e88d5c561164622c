use chrono::{DateTime, NaiveDateTime, Utc};
use chrono_tz::Tz;

/// Source of "now". Production uses the system clock; tests pin it.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

pub struct FixedClock {
    time: DateTime<Utc>,
}

impl FixedClock {
    pub fn new(time: DateTime<Utc>) -> Self {
        Self { time }
    }
}

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        self.time
    }
}

/// Wall-clock time in the club's IANA timezone. Unknown zones fall back to
/// `fallback_tz`, then UTC.
pub fn local_now(now: DateTime<Utc>, tz_name: &str, fallback_tz: &str) -> NaiveDateTime {
    let tz: Tz = match tz_name.parse().or_else(|_| fallback_tz.parse()) {
        Ok(tz) => tz,
        Err(_) => {
            tracing::warn!(timezone = %tz_name, "unknown timezone, using UTC");
            return now.naive_utc();
        }
    };
    now.with_timezone(&tz).naive_local()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_local_now_converts_to_club_zone() {
        // 18:00 UTC is 12:00 in Mexico City (UTC-6, no DST since 2022)
        let now = Utc.with_ymd_and_hms(2025, 6, 16, 18, 0, 0).unwrap();
        let local = local_now(now, "America/Mexico_City", "UTC");
        assert_eq!(local.format("%Y-%m-%d %H:%M").to_string(), "2025-06-16 12:00");
    }

    #[test]
    fn test_unknown_zone_uses_fallback() {
        let now = Utc.with_ymd_and_hms(2025, 6, 16, 18, 0, 0).unwrap();
        let local = local_now(now, "Mars/Olympus", "Europe/Madrid");
        assert_eq!(local.format("%H:%M").to_string(), "20:00");
        let utc = local_now(now, "Mars/Olympus", "Nowhere/Else");
        assert_eq!(utc, now.naive_utc());
    }

    #[test]
    fn test_fixed_clock_is_stable() {
        let at = Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap();
        let clock = FixedClock::new(at);
        assert_eq!(clock.now(), clock.now());
    }
}
