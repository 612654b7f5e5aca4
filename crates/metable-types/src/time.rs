//! Timestamps, canonical date formats, and the lenient date parser used as a
//! fallback when stored date text does not match the canonical format.

use std::sync::LazyLock;

use chrono::{
    DateTime, Duration, FixedOffset, NaiveDate, NaiveDateTime, NaiveTime, TimeZone, Utc,
};
use regex::Regex;

/// UTC instant used for publish times, record timestamps and time travel.
pub type Timestamp = DateTime<Utc>;

/// Canonical stored form of date-time values: microseconds plus UTC offset.
pub const DATETIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.6f%z";

/// Canonical stored form of calendar dates.
pub const DATE_FORMAT: &str = "%Y-%m-%d";

static DATE_SHAPE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\d{4}-\d{2}-\d{2}$").expect("valid date regex"));

static RELATIVE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"^(?i)([+-]?\d+)\s*(s|secs?|seconds?|m|mins?|minutes?|h|hours?|d|days?|w|weeks?)$",
    )
    .expect("valid relative regex")
});

/// Current wall-clock instant.
pub fn now() -> Timestamp {
    Utc::now()
}

/// Returns `true` if `text` has the `YYYY-MM-DD` shape.
pub fn is_date_shaped(text: &str) -> bool {
    DATE_SHAPE.is_match(text)
}

/// Render a date-time in [`DATETIME_FORMAT`].
pub fn format_datetime(value: &DateTime<FixedOffset>) -> String {
    value.format(DATETIME_FORMAT).to_string()
}

/// Render a date in [`DATE_FORMAT`].
pub fn format_date(value: &NaiveDate) -> String {
    value.format(DATE_FORMAT).to_string()
}

/// Parse text produced by [`format_datetime`].
pub fn parse_canonical_datetime(text: &str) -> Option<DateTime<FixedOffset>> {
    DateTime::parse_from_str(text, "%Y-%m-%d %H:%M:%S%.f%z").ok()
}

/// Parse text produced by [`format_date`].
pub fn parse_canonical_date(text: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(text, DATE_FORMAT).ok()
}

/// Best-effort date-time parser.
///
/// Accepts RFC 3339, RFC 2822, `Y-m-d H:i:s[.u][offset]`, ISO `T`-separated
/// forms, bare dates (midnight UTC), `@<unix seconds>`, the words `now`,
/// `today`, `yesterday`, `tomorrow`, and relative offsets such as `+1h`,
/// `-30 minutes` or `+2 days` measured from `now`. Naive inputs are read as UTC.
pub fn parse_lenient(text: &str, now: Timestamp) -> Option<DateTime<FixedOffset>> {
    let text = text.trim();
    if text.is_empty() {
        return None;
    }
    let utc = FixedOffset::east_opt(0)?;
    let midnight = |date: NaiveDate| utc.from_utc_datetime(&date.and_time(NaiveTime::MIN));

    match text.to_ascii_lowercase().as_str() {
        "now" => return Some(now.with_timezone(&utc)),
        "today" => return Some(midnight(now.date_naive())),
        "yesterday" => return Some(midnight(now.date_naive() - Duration::days(1))),
        "tomorrow" => return Some(midnight(now.date_naive() + Duration::days(1))),
        _ => {}
    }

    if let Some(caps) = RELATIVE.captures(text) {
        let amount: i64 = caps[1].parse().ok()?;
        let unit = caps[2].to_ascii_lowercase();
        let delta = match unit.chars().next()? {
            's' => Duration::seconds(amount),
            'm' => Duration::minutes(amount),
            'h' => Duration::hours(amount),
            'd' => Duration::days(amount),
            'w' => Duration::weeks(amount),
            _ => return None,
        };
        return Some((now + delta).with_timezone(&utc));
    }

    if let Some(secs) = text.strip_prefix('@') {
        let secs: i64 = secs.parse().ok()?;
        return DateTime::from_timestamp(secs, 0).map(|dt| dt.with_timezone(&utc));
    }

    if let Some(dt) = parse_canonical_datetime(text) {
        return Some(dt);
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(text) {
        return Some(dt);
    }
    if let Ok(dt) = DateTime::parse_from_rfc2822(text) {
        return Some(dt);
    }
    for format in ["%Y-%m-%d %H:%M:%S%.f%:z", "%Y-%m-%dT%H:%M:%S%.f%z"] {
        if let Ok(dt) = DateTime::parse_from_str(text, format) {
            return Some(dt);
        }
    }
    for format in ["%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(text, format) {
            return Some(utc.from_utc_datetime(&naive));
        }
    }
    for format in [DATE_FORMAT, "%Y/%m/%d", "%d %B %Y", "%B %d, %Y"] {
        if let Ok(date) = NaiveDate::parse_from_str(text, format) {
            return Some(midnight(date));
        }
    }
    None
}

/// Best-effort calendar date parser; see [`parse_lenient`].
pub fn parse_lenient_date(text: &str, now: Timestamp) -> Option<NaiveDate> {
    parse_canonical_date(text.trim()).or_else(|| parse_lenient(text, now).map(|dt| dt.date_naive()))
}
