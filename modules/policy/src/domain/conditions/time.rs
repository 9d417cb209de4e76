//! Time-of-day, day-of-week, and validity-window evaluators.
//!
//! Timezones are IANA names; an invalid name falls back to UTC. Hour
//! ranges where `start > end` wrap midnight.

use std::str::FromStr;

use chrono::{Datelike, Timelike, Weekday};
use chrono_tz::Tz;

use crate::domain::model::PolicyContext;

fn zone(timezone: Option<&str>) -> Tz {
    timezone
        .and_then(|name| Tz::from_str(name).ok())
        .unwrap_or(Tz::UTC)
}

/// Is the context timestamp within `[start_hour, end_hour)` local hours?
/// `start == end` means the whole day.
#[must_use]
pub fn in_hour_range(
    ctx: &PolicyContext,
    start_hour: u32,
    end_hour: u32,
    timezone: Option<&str>,
) -> bool {
    let local = ctx.timestamp.with_timezone(&zone(timezone));
    let hour = local.hour();
    match start_hour.cmp(&end_hour) {
        std::cmp::Ordering::Less => hour >= start_hour && hour < end_hour,
        std::cmp::Ordering::Equal => true,
        std::cmp::Ordering::Greater => hour >= start_hour || hour < end_hour,
    }
}

/// Is the local weekday in the allowlist? Day names accept the forms
/// `chrono` parses (`mon`, `monday`, any casing).
#[must_use]
pub fn day_of_week(ctx: &PolicyContext, allowed_days: &[String], timezone: Option<&str>) -> bool {
    let local = ctx.timestamp.with_timezone(&zone(timezone));
    let today = local.weekday();
    allowed_days
        .iter()
        .filter_map(|day| Weekday::from_str(day).ok())
        .any(|day| day == today)
}

/// Is the timestamp within the optional `[from, to]` window?
#[must_use]
pub fn valid_during(
    ctx: &PolicyContext,
    from: Option<chrono::DateTime<chrono::Utc>>,
    to: Option<chrono::DateTime<chrono::Utc>>,
) -> bool {
    if from.is_some_and(|from| ctx.timestamp < from) {
        return false;
    }
    if to.is_some_and(|to| ctx.timestamp > to) {
        return false;
    }
    true
}
