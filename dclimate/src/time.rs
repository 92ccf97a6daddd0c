use std::cmp::Ordering;
use std::fmt;

use chrono::{DateTime, NaiveDate, NaiveDateTime, SecondsFormat, TimeZone, Utc};

use crate::{
    dataset::CoordinateValue,
    errors::{Error, Result},
    helpers::rearrange,
};

/// One endpoint of a caller supplied time range.
///
#[derive(Clone, Debug, PartialEq)]
pub enum TimeValue {
    /// A plain number, compared as-is against numeric time axes and read as epoch milliseconds
    /// against temporal ones.
    Number(f64),
    Date(DateTime<Utc>),
    Text(String),
}

/// A time range whose endpoints share a kind and are in ascending order.
///
#[derive(Clone, Debug, PartialEq)]
pub struct TimeRange {
    pub start: TimeValue,
    pub end: TimeValue,
}

/// How the values of a time coordinate should be compared.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SampleKind {
    Numeric,
    DateLike,
}

impl SampleKind {
    pub fn of(sample: &CoordinateValue) -> Self {
        match sample {
            CoordinateValue::Float(_) | CoordinateValue::Int(_) => SampleKind::Numeric,
            CoordinateValue::Time(_) => SampleKind::DateLike,
            CoordinateValue::Text(text) => {
                if parse_date(text).is_none() && text.trim().parse::<f64>().is_ok() {
                    SampleKind::Numeric
                } else {
                    SampleKind::DateLike
                }
            }
        }
    }
}

impl TimeValue {
    /// Comparable numeric form: numbers as-is, dates as epoch milliseconds.
    pub fn as_millis(&self) -> Option<f64> {
        match self {
            TimeValue::Number(number) => Some(*number),
            TimeValue::Date(date) => Some(to_epoch_millis(date)),
            TimeValue::Text(text) => parse_date(text).map(|date| to_epoch_millis(&date)),
        }
    }

    fn to_number(&self) -> Option<f64> {
        match self {
            TimeValue::Number(number) => Some(*number),
            TimeValue::Date(date) => Some(to_epoch_millis(date)),
            TimeValue::Text(text) => text
                .trim()
                .parse::<f64>()
                .ok()
                .or_else(|| parse_date(text).map(|date| to_epoch_millis(&date))),
        }
    }

    fn to_date(&self) -> Option<DateTime<Utc>> {
        match self {
            TimeValue::Number(number) => from_epoch_millis(*number),
            TimeValue::Date(date) => Some(*date),
            TimeValue::Text(text) => parse_date(text),
        }
    }
}

impl PartialOrd for TimeValue {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        match (self, other) {
            (TimeValue::Number(a), TimeValue::Number(b)) => a.partial_cmp(b),
            (TimeValue::Date(a), TimeValue::Date(b)) => a.partial_cmp(b),
            (TimeValue::Text(a), TimeValue::Text(b)) => a.partial_cmp(b),
            _ => None,
        }
    }
}

impl fmt::Display for TimeValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TimeValue::Number(number) => write!(f, "{number}"),
            TimeValue::Date(date) => write!(f, "{}", to_iso(date)),
            TimeValue::Text(text) => write!(f, "{text}"),
        }
    }
}

impl From<f64> for TimeValue {
    fn from(value: f64) -> Self {
        TimeValue::Number(value)
    }
}

impl From<i64> for TimeValue {
    fn from(value: i64) -> Self {
        TimeValue::Number(value as f64)
    }
}

impl From<DateTime<Utc>> for TimeValue {
    fn from(value: DateTime<Utc>) -> Self {
        TimeValue::Date(value)
    }
}

impl From<&str> for TimeValue {
    fn from(value: &str) -> Self {
        TimeValue::Text(value.to_string())
    }
}

impl From<String> for TimeValue {
    fn from(value: String) -> Self {
        TimeValue::Text(value)
    }
}

impl TimeRange {
    /// Range endpoints as comparable numbers, see `TimeValue::as_millis`.
    pub fn bounds(&self) -> Option<(f64, f64)> {
        Some((self.start.as_millis()?, self.end.as_millis()?))
    }

    /// Inclusive membership test for a comparable value.
    pub fn contains(&self, value: f64) -> bool {
        match self.bounds() {
            Some((start, end)) => start <= value && value <= end,
            None => false,
        }
    }
}

/// Coerce a caller supplied range into the form of `sample`, a value from the time coordinate
/// the range will be applied to.
///
/// Numeric samples coerce both endpoints to numbers, dates falling back to epoch milliseconds.
/// Date-like samples coerce both endpoints to dates. Without a sample, endpoints become ISO-8601
/// strings. A start that sorts after the end is swapped, never rejected.
///
pub fn normalize_time_range(
    start: &TimeValue,
    end: &TimeValue,
    sample: Option<&CoordinateValue>,
) -> Result<TimeRange> {
    let (start, end) = match sample.map(SampleKind::of) {
        Some(SampleKind::Numeric) => (
            TimeValue::Number(start.to_number().ok_or_else(|| not_coercible(start, "a number"))?),
            TimeValue::Number(end.to_number().ok_or_else(|| not_coercible(end, "a number"))?),
        ),
        Some(SampleKind::DateLike) => (
            TimeValue::Date(start.to_date().ok_or_else(|| not_coercible(start, "a date"))?),
            TimeValue::Date(end.to_date().ok_or_else(|| not_coercible(end, "a date"))?),
        ),
        None => {
            let start_date = start.to_date().ok_or_else(|| not_coercible(start, "a date"))?;
            let end_date = end.to_date().ok_or_else(|| not_coercible(end, "a date"))?;
            (TimeValue::Text(to_iso(&start_date)), TimeValue::Text(to_iso(&end_date)))
        }
    };

    let (start, end) = rearrange(start, end);

    Ok(TimeRange { start, end })
}

fn not_coercible(value: &TimeValue, kind: &str) -> Error {
    Error::InvalidTimeRange(format!("cannot interpret '{value}' as {kind}"))
}

/// Parse a date in one of the accepted syntaxes. Values without a zone are taken as UTC.
///
/// Accepted: RFC 3339, `YYYY-MM-DDTHH:MM:SS[.fff]`, `YYYY-MM-DD HH:MM:SS[.fff]`, `YYYY-MM-DD`.
///
pub fn parse_date(text: &str) -> Option<DateTime<Utc>> {
    let text = text.trim();
    if let Ok(date) = DateTime::parse_from_rfc3339(text) {
        return Some(date.with_timezone(&Utc));
    }
    for format in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(text, format) {
            return Some(Utc.from_utc_datetime(&naive));
        }
    }

    NaiveDate::parse_from_str(text, "%Y-%m-%d")
        .ok()
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .map(|naive| Utc.from_utc_datetime(&naive))
}

pub fn to_epoch_millis(date: &DateTime<Utc>) -> f64 {
    date.timestamp_millis() as f64
}

pub fn from_epoch_millis(millis: f64) -> Option<DateTime<Utc>> {
    if !millis.is_finite() {
        return None;
    }
    Utc.timestamp_millis_opt(millis as i64).single()
}

pub fn to_iso(date: &DateTime<Utc>) -> String {
    date.to_rfc3339_opts(SecondsFormat::Millis, true)
}
