//! Parsing of the configured first-fetch lower bound.
//!
//! A category fetched for the first time has no checkpoint, so its window
//! starts at a configured point in time. Operators write that point either
//! relative to now (`"3 days"`, `"12 hours ago"`) or as an absolute time
//! (RFC 3339, `YYYY-MM-DD`, or raw epoch seconds).
//!
//! Relative values are resolved against the [`Clock`](crate::Clock) when the
//! state is seeded, once per category, and the result is stored in the
//! checkpoint so later cycles never re-resolve it.

use std::str::FromStr;

use chrono::{DateTime, Duration, Months, NaiveDate, Utc};

/// Errors from parsing or resolving a first-fetch value.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FirstFetchError {
    /// The input matched none of the accepted formats.
    #[error("unrecognized first fetch time: {0:?}")]
    Unrecognized(String),

    /// The resolved time cannot be represented.
    #[error("first fetch time out of range: {0:?}")]
    OutOfRange(String),
}

/// Unit of a relative first-fetch span.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpanUnit {
    /// Sixty seconds.
    Minute,
    /// Sixty minutes.
    Hour,
    /// Twenty-four hours.
    Day,
    /// Seven days.
    Week,
    /// One calendar month.
    Month,
    /// Twelve calendar months.
    Year,
}

impl SpanUnit {
    fn parse(word: &str) -> Option<Self> {
        let word = word.to_lowercase();
        let singular = word.strip_suffix('s').unwrap_or(&word);
        match singular {
            "minute" | "min" => Some(Self::Minute),
            "hour" | "hr" => Some(Self::Hour),
            "day" => Some(Self::Day),
            "week" => Some(Self::Week),
            "month" => Some(Self::Month),
            "year" => Some(Self::Year),
            _ => None,
        }
    }
}

/// A parsed first-fetch value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FirstFetch {
    /// A span before "now".
    Relative {
        /// Number of units.
        amount: u32,
        /// Unit of the span.
        unit: SpanUnit,
    },
    /// A fixed point in time, epoch seconds.
    Absolute(i64),
}

impl FirstFetch {
    /// Parse a first-fetch expression.
    pub fn parse(input: &str) -> Result<Self, FirstFetchError> {
        let trimmed = input.trim();
        let unrecognized = || FirstFetchError::Unrecognized(input.to_owned());

        if let Ok(epoch) = trimmed.parse::<i64>() {
            return Ok(Self::Absolute(epoch));
        }
        if let Ok(dt) = DateTime::parse_from_rfc3339(trimmed) {
            return Ok(Self::Absolute(dt.timestamp()));
        }
        if let Ok(date) = NaiveDate::parse_from_str(trimmed, "%Y-%m-%d") {
            let midnight = date.and_hms_opt(0, 0, 0).ok_or_else(unrecognized)?;
            return Ok(Self::Absolute(midnight.and_utc().timestamp()));
        }

        let lowered = trimmed.to_lowercase();
        let span = lowered.strip_suffix("ago").map_or(lowered.as_str(), str::trim_end);
        let mut words = span.split_whitespace();
        let (Some(amount), Some(unit), None) = (words.next(), words.next(), words.next()) else {
            return Err(unrecognized());
        };
        let amount = amount.parse::<u32>().map_err(|_e| unrecognized())?;
        let unit = SpanUnit::parse(unit).ok_or_else(unrecognized)?;
        Ok(Self::Relative { amount, unit })
    }

    /// Resolve to epoch seconds given the current time.
    pub fn resolve(&self, now: i64) -> Result<i64, FirstFetchError> {
        let (amount, unit) = match *self {
            Self::Absolute(epoch) => return Ok(epoch),
            Self::Relative { amount, unit } => (amount, unit),
        };
        let out_of_range = || FirstFetchError::OutOfRange(format!("{amount} {unit:?} before {now}"));
        let now_dt = DateTime::<Utc>::from_timestamp(now, 0).ok_or_else(out_of_range)?;
        let amount_i64 = i64::from(amount);

        let resolved = match unit {
            SpanUnit::Minute => Duration::try_minutes(amount_i64).and_then(|d| now_dt.checked_sub_signed(d)),
            SpanUnit::Hour => Duration::try_hours(amount_i64).and_then(|d| now_dt.checked_sub_signed(d)),
            SpanUnit::Day => Duration::try_days(amount_i64).and_then(|d| now_dt.checked_sub_signed(d)),
            SpanUnit::Week => Duration::try_weeks(amount_i64).and_then(|d| now_dt.checked_sub_signed(d)),
            SpanUnit::Month => now_dt.checked_sub_months(Months::new(amount)),
            SpanUnit::Year => amount
                .checked_mul(12)
                .and_then(|months| now_dt.checked_sub_months(Months::new(months))),
        };
        resolved.map(|dt| dt.timestamp()).ok_or_else(out_of_range)
    }
}

impl FromStr for FirstFetch {
    type Err = FirstFetchError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}
