#![forbid(unsafe_code)]

pub mod analysis;
pub mod table;

pub use table::{Align, Table};

use time::format_description::well_known::Rfc3339;
use time::macros::format_description;
use time::{OffsetDateTime, PrimitiveDateTime};

/// Parses server timestamps. Naive ones (no offset) are taken as UTC.
#[must_use]
pub fn parse_timestamp(raw: &str) -> Option<OffsetDateTime> {
    let raw = raw.trim();
    if let Ok(t) = OffsetDateTime::parse(raw, &Rfc3339) {
        return Some(t);
    }
    let iso = format_description!(
        "[year]-[month]-[day]T[hour]:[minute]:[second][optional [.[subsecond]]]"
    );
    let spaced = format_description!(
        "[year]-[month]-[day] [hour]:[minute]:[second][optional [.[subsecond]]]"
    );
    PrimitiveDateTime::parse(raw, iso)
        .or_else(|_| PrimitiveDateTime::parse(raw, spaced))
        .ok()
        .map(PrimitiveDateTime::assume_utc)
}

/// "just now", "5 mins ago", ... up to a week, then the date.
#[must_use]
pub fn format_age(raw: Option<&str>, now: OffsetDateTime) -> String {
    let Some(raw) = raw.filter(|s| !s.trim().is_empty()) else {
        return "-".to_owned();
    };
    let Some(t) = parse_timestamp(raw) else {
        return raw.to_owned();
    };
    let diff = now - t;
    if diff < time::Duration::minutes(1) {
        "just now".to_owned()
    } else if diff < time::Duration::hours(1) {
        plural(diff.whole_minutes(), "min")
    } else if diff < time::Duration::days(1) {
        plural(diff.whole_hours(), "hour")
    } else if diff < time::Duration::days(7) {
        plural(diff.whole_days(), "day")
    } else {
        t.date().to_string()
    }
}

fn plural(n: i64, unit: &str) -> String {
    if n == 1 {
        format!("1 {unit} ago")
    } else {
        format!("{n} {unit}s ago")
    }
}
