use chrono::{Datelike, Duration, NaiveDate, NaiveDateTime, NaiveTime};
use rusqlite::Connection;
use serde::Serialize;

use crate::db::queries;
use crate::errors::AppError;
use crate::models::availability::{format_time, parse_time};
use crate::models::{DiscountKind, DiscountRule, PricingRule};

const DAY_NAMES: [&str; 7] = [
    "sunday",
    "monday",
    "tuesday",
    "wednesday",
    "thursday",
    "friday",
    "saturday",
];

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PriceQuote {
    pub hourly_rate: i64,
    pub subtotal: i64,
    pub discount: i64,
    pub discount_name: Option<String>,
    pub total: i64,
}

/// Day-specific rules beat club-wide ones; within each, the newest wins.
/// `rules` must already be ordered newest first.
pub fn select_rule(rules: &[PricingRule], weekday: u32, start: NaiveTime) -> Option<&PricingRule> {
    let covers = |r: &&PricingRule| r.start_time <= start && start < r.end_time;
    rules
        .iter()
        .filter(|r| r.day_of_week == Some(weekday))
        .find(covers)
        .or_else(|| rules.iter().filter(|r| r.day_of_week.is_none()).find(covers))
}

/// Hourly rate scaled to `duration` minutes, rounded half up.
pub fn prorate(hourly: i64, duration: u32) -> i64 {
    (hourly * i64::from(duration) + 30) / 60
}

pub fn percent_of(amount: i64, percent: i64) -> i64 {
    (amount * percent + 50) / 100
}

struct DiscountContext<'a> {
    conn: &'a Connection,
    club_id: &'a str,
    phone: &'a str,
    day_name: &'a str,
    start: NaiveTime,
    hours: f64,
    now: NaiveDateTime,
}

fn is_eligible(rule: &DiscountRule, ctx: &DiscountContext<'_>) -> anyhow::Result<bool> {
    let cond = &rule.conditions;
    let eligible = match rule.kind {
        DiscountKind::Frequency => {
            let (Some(window), Some(min)) = (cond.time_window_days, cond.min_bookings) else {
                return Ok(false);
            };
            let since = ctx.now - Duration::days(window);
            queries::count_recent_bookings_by_phone(ctx.conn, ctx.club_id, ctx.phone, since)? >= min
        }
        DiscountKind::HappyHour => {
            let window = cond
                .start_time
                .as_deref()
                .and_then(parse_time)
                .zip(cond.end_time.as_deref().and_then(parse_time));
            match window {
                Some((from, to)) => {
                    cond.days.iter().any(|d| d.eq_ignore_ascii_case(ctx.day_name))
                        && from <= ctx.start
                        && ctx.start < to
                }
                None => false,
            }
        }
        DiscountKind::Volume => cond.min_hours.is_some_and(|min| ctx.hours >= min),
    };
    Ok(eligible)
}

/// Prices one court for one interval. Only the single highest eligible
/// discount applies.
pub fn quote_price(
    conn: &Connection,
    club_id: &str,
    date: NaiveDate,
    start: NaiveTime,
    duration: u32,
    phone: Option<&str>,
    now: NaiveDateTime,
) -> Result<PriceQuote, AppError> {
    let weekday = date.weekday().num_days_from_sunday();
    let rules = queries::get_pricing_rules(conn, club_id)?;

    let rule = select_rule(&rules, weekday, start).ok_or_else(|| {
        AppError::Configuration(format!(
            "No se encontró configuración de precios para el horario {}",
            format_time(start)
        ))
    })?;
    if rule.price <= 0 {
        tracing::error!(club_id = %club_id, rule_id = %rule.id, "pricing rule has no price");
        return Err(AppError::Configuration(
            "Precio no válido configurado. Por favor, contacte al administrador del club".into(),
        ));
    }

    let subtotal = prorate(rule.price, duration);
    let mut quote = PriceQuote {
        hourly_rate: rule.price,
        subtotal,
        discount: 0,
        discount_name: None,
        total: subtotal,
    };

    let Some(phone) = phone else {
        return Ok(quote);
    };

    let mut discounts = queries::get_discount_rules(conn, club_id)?;
    discounts.sort_by(|a, b| b.value.cmp(&a.value));

    let ctx = DiscountContext {
        conn,
        club_id,
        phone,
        day_name: DAY_NAMES[weekday as usize],
        start,
        hours: f64::from(duration) / 60.0,
        now,
    };
    for discount in &discounts {
        if is_eligible(discount, &ctx)? {
            let amount = percent_of(subtotal, discount.value.clamp(0, 100));
            quote.discount = amount;
            quote.discount_name = Some(discount.name.clone());
            quote.total = subtotal - amount;
            tracing::debug!(club_id = %club_id, discount = %discount.name, amount, "discount applied");
            break;
        }
    }

    Ok(quote)
}
