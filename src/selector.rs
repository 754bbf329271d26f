// Selector grammar: free-form tokens to typed entry selections

use crate::entry::Zone;
use crate::error::UsageError;
use chrono::{DateTime, Duration as ChronoDuration, NaiveDate, Utc};
use regex::Regex;
use std::fmt;
use std::sync::LazyLock;
use std::time::Duration;

static ID_POINT: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^\d+$").unwrap());
static ID_RANGE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^(\d+)(?:\.\.|:|-)(\d+)$").unwrap());
static ID_RANGE_EXCLUSIVE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^(\d+)\.\.\.(\d+)$").unwrap());
static RELATIVE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?i)^(-?\d+)([smhdw])$").unwrap());
static DATE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(\d{4}-\d{2}-\d{2})(?:\.\.(\d{4}-\d{2}-\d{2})?|\s+(?i:TO)\s+(\d{4}-\d{2}-\d{2}))?$").unwrap()
});
static SPAN: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?i)^(\d+)([smhdw])?$").unwrap());

/// Which entries of a queue an operation targets
///
/// Selectors are pure descriptions; they never refer to a particular queue.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Selector {
    /// Exactly one id
    IdPoint(i64),
    /// Ids in `low..=high`
    IdRange { low: i64, high: i64 },
    /// Creation times in `from..until`, or `from..` when `until` is `None`
    TimeRange {
        from: DateTime<Utc>,
        until: Option<DateTime<Utc>>,
    },
    /// Everything created at or after the given instant
    RelativeTimeFrom(DateTime<Utc>),
    /// Entry text matching a regular expression
    Pattern(String),
}

impl fmt::Display for Selector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Selector::IdPoint(id) => write!(f, "id {}", id),
            Selector::IdRange { low, high } => write!(f, "ids {}..={}", low, high),
            Selector::TimeRange { from, until: Some(until) } => {
                write!(f, "created {} .. {}", from.to_rfc3339(), until.to_rfc3339())
            }
            Selector::TimeRange { from, until: None } | Selector::RelativeTimeFrom(from) => {
                write!(f, "created since {}", from.to_rfc3339())
            }
            Selector::Pattern(pattern) => write!(f, "/{}/", pattern),
        }
    }
}

/// Parse every token, failing on the first one that is not a selector
pub fn parse_selectors<S: AsRef<str>>(
    tokens: &[S],
    zone: Zone,
    now: DateTime<Utc>,
) -> Result<Vec<Selector>, UsageError> {
    tokens
        .iter()
        .map(|token| parse_selector(token.as_ref(), zone, now))
        .collect()
}

/// Parse a single token
///
/// Recognition order: point id, inclusive id range (`a..b`, `a:b`, `a-b`),
/// exclusive id range (`a...b`), relative time (`30m`, `2d`), date or date range,
/// then `/pattern/`.
pub fn parse_selector(token: &str, zone: Zone, now: DateTime<Utc>) -> Result<Selector, UsageError> {
    let token = token.trim();

    if ID_POINT.is_match(token) {
        return Ok(Selector::IdPoint(parse_id(token, token)?));
    }

    if let Some(caps) = ID_RANGE.captures(token) {
        let low = parse_id(token, &caps[1])?;
        let high = parse_id(token, &caps[2])?;
        if low > high {
            return Err(UsageError::selector(token, format!("range start {} is after end {}", low, high)));
        }
        return Ok(Selector::IdRange { low, high });
    }

    if let Some(caps) = ID_RANGE_EXCLUSIVE.captures(token) {
        let low = parse_id(token, &caps[1])?;
        let high = parse_id(token, &caps[2])?;
        if low >= high {
            return Err(UsageError::selector(
                token,
                format!("exclusive range start {} must be below end {}", low, high),
            ));
        }
        return Ok(Selector::IdRange { low, high: high - 1 });
    }

    if let Some(caps) = RELATIVE.captures(token) {
        let count: i64 = caps[1]
            .parse()
            .map_err(|_| UsageError::selector(token, "count out of range"))?;
        let unit = caps[2].chars().next().unwrap_or('s');
        let from = count
            .checked_mul(unit_seconds(unit))
            .and_then(ChronoDuration::try_seconds)
            .and_then(|span| now.checked_sub_signed(span))
            .ok_or_else(|| UsageError::selector(token, "time span out of range"))?;
        return Ok(Selector::RelativeTimeFrom(from));
    }

    if let Some(caps) = DATE.captures(token) {
        let first = parse_date(token, &caps[1])?;
        let from = start_of_day(token, zone, first)?;
        let last = caps.get(2).or_else(|| caps.get(3));
        let until = match last {
            Some(m) => {
                let last = parse_date(token, m.as_str())?;
                if first > last {
                    return Err(UsageError::selector(
                        token,
                        format!("date range start {} is after end {}", first, last),
                    ));
                }
                let next = last
                    .succ_opt()
                    .ok_or_else(|| UsageError::selector(token, "date out of range"))?;
                Some(start_of_day(token, zone, next)?)
            }
            None => None,
        };
        return Ok(Selector::TimeRange { from, until });
    }

    if token.len() >= 2 && token.starts_with('/') && token.ends_with('/') {
        let pattern = &token[1..token.len() - 1];
        Regex::new(pattern).map_err(|e| UsageError::selector(token, format!("bad pattern: {}", e)))?;
        return Ok(Selector::Pattern(pattern.to_string()));
    }

    Err(UsageError::selector(token, "unrecognized selector"))
}

/// Parse a span such as `90s`, `5m` or `2h`; a bare number means seconds
pub fn parse_span(value: &str) -> Result<Duration, UsageError> {
    let value = value.trim();
    let caps = SPAN
        .captures(value)
        .ok_or_else(|| UsageError::InvalidDuration(value.to_string()))?;
    let count: u64 = caps[1]
        .parse()
        .map_err(|_| UsageError::InvalidDuration(value.to_string()))?;
    let unit = caps.get(2).and_then(|m| m.as_str().chars().next()).unwrap_or('s');
    count
        .checked_mul(unit_seconds(unit) as u64)
        .map(Duration::from_secs)
        .ok_or_else(|| UsageError::InvalidDuration(value.to_string()))
}

fn unit_seconds(unit: char) -> i64 {
    match unit.to_ascii_lowercase() {
        'm' => 60,
        'h' => 60 * 60,
        'd' => 24 * 60 * 60,
        'w' => 7 * 24 * 60 * 60,
        _ => 1,
    }
}

fn parse_id(token: &str, digits: &str) -> Result<i64, UsageError> {
    digits
        .parse()
        .map_err(|_| UsageError::selector(token, format!("id {} out of range", digits)))
}

fn parse_date(token: &str, text: &str) -> Result<NaiveDate, UsageError> {
    NaiveDate::parse_from_str(text, "%Y-%m-%d")
        .map_err(|e| UsageError::selector(token, format!("bad date {}: {}", text, e)))
}

fn start_of_day(token: &str, zone: Zone, date: NaiveDate) -> Result<DateTime<Utc>, UsageError> {
    zone.start_of_day(date)
        .map_err(|e| UsageError::selector(token, e.to_string()))
}
