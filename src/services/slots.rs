use chrono::{Datelike, NaiveDate, NaiveTime};

use crate::models::availability::time_from_minutes;
use crate::models::{OperatingHours, ScheduleRule};

/// Candidate starts advance by this many minutes regardless of slot length.
pub const SLOT_STEP_MINUTES: u32 = 30;

/// Lazily yields `(start, end)` pairs inside an opening window. Clone it to
/// restart from the first slot.
#[derive(Debug, Clone)]
pub struct SlotGenerator {
    next_start: u32,
    close: u32,
    duration: u32,
}

impl SlotGenerator {
    pub fn new(hours: OperatingHours, duration: u32) -> Self {
        Self {
            next_start: hours.open_minutes(),
            close: hours.close_minutes(),
            duration,
        }
    }
}

impl Iterator for SlotGenerator {
    type Item = (NaiveTime, NaiveTime);

    fn next(&mut self) -> Option<Self::Item> {
        if self.duration == 0 {
            return None;
        }
        let end = self.next_start + self.duration;
        // the last slot is never clipped to closing time
        if end > self.close {
            return None;
        }
        let slot = (time_from_minutes(self.next_start)?, time_from_minutes(end)?);
        self.next_start += SLOT_STEP_MINUTES;
        Some(slot)
    }
}

/// Opening hours for `date`. An enabled rule for that weekday wins, a disabled
/// one closes the club for the day, then an enabled club-wide rule applies,
/// then the 07:00-23:00 default.
pub fn hours_for_date(rules: &[ScheduleRule], date: NaiveDate) -> Option<OperatingHours> {
    let weekday = date.weekday().num_days_from_sunday();

    let day_rules: Vec<&ScheduleRule> = rules
        .iter()
        .filter(|r| r.day_of_week == Some(weekday))
        .collect();
    if let Some(rule) = day_rules.iter().find(|r| r.enabled) {
        return Some(rule.hours());
    }
    if !day_rules.is_empty() {
        return None;
    }

    match rules.iter().find(|r| r.day_of_week.is_none() && r.enabled) {
        Some(rule) => Some(rule.hours()),
        None => Some(OperatingHours::fallback()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::availability::{format_time, parse_time};

    fn t(s: &str) -> NaiveTime {
        parse_time(s).unwrap()
    }

    fn hours(open: &str, close: &str) -> OperatingHours {
        OperatingHours::new(t(open), t(close))
    }

    fn rule(day: Option<u32>, open: &str, close: &str, enabled: bool) -> ScheduleRule {
        ScheduleRule {
            id: uuid::Uuid::new_v4().to_string(),
            club_id: "club-1".into(),
            day_of_week: day,
            start_time: t(open),
            end_time: t(close),
            enabled,
        }
    }

    #[test]
    fn test_first_slots_step_by_thirty_minutes() {
        let slots: Vec<_> = SlotGenerator::new(hours("08:00", "22:00"), 90)
            .map(|(s, e)| (format_time(s), format_time(e)))
            .collect();
        assert_eq!(slots[0], ("08:00".to_string(), "09:30".to_string()));
        assert_eq!(slots[1], ("08:30".to_string(), "10:00".to_string()));
        assert_eq!(slots.last().unwrap(), &("20:30".to_string(), "22:00".to_string()));
        assert_eq!(slots.len(), 26);
    }

    #[test]
    fn test_does_not_clip_final_slot() {
        let slots: Vec<_> = SlotGenerator::new(hours("08:00", "09:45"), 60).collect();
        // 08:00, 08:30 fit; 09:00-10:00 would pass closing
        assert_eq!(slots.len(), 2);
        assert!(slots.iter().all(|(_, end)| *end <= t("09:45")));
    }

    #[test]
    fn test_duration_longer_than_window_yields_nothing() {
        assert_eq!(SlotGenerator::new(hours("08:00", "09:00"), 90).count(), 0);
        assert_eq!(SlotGenerator::new(hours("08:00", "22:00"), 0).count(), 0);
    }

    #[test]
    fn test_generator_restarts_by_cloning() {
        let gen = SlotGenerator::new(hours("08:00", "12:00"), 60);
        let first: Vec<_> = gen.clone().collect();
        let second: Vec<_> = gen.collect();
        assert_eq!(first, second);
    }

    #[test]
    fn test_hours_resolution_order() {
        // 2025-06-16 is a Monday (1)
        let date = NaiveDate::from_ymd_opt(2025, 6, 16).unwrap();

        assert_eq!(hours_for_date(&[], date), Some(OperatingHours::fallback()));

        let club_wide = rule(None, "09:00", "21:00", true);
        assert_eq!(
            hours_for_date(&[club_wide.clone()], date),
            Some(hours("09:00", "21:00"))
        );

        let monday = rule(Some(1), "08:00", "22:00", true);
        assert_eq!(
            hours_for_date(&[club_wide.clone(), monday], date),
            Some(hours("08:00", "22:00"))
        );

        let closed_monday = rule(Some(1), "08:00", "22:00", false);
        assert_eq!(hours_for_date(&[club_wide.clone(), closed_monday], date), None);

        let tuesday = rule(Some(2), "10:00", "14:00", true);
        assert_eq!(
            hours_for_date(&[club_wide, tuesday], date),
            Some(hours("09:00", "21:00"))
        );
    }
}
