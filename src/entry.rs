// Queue entries and time zone handling

use chrono::{DateTime, Duration as ChronoDuration, Local, NaiveDate, NaiveDateTime, NaiveTime, TimeZone, Utc};
use eyre::{Result, eyre};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// One unit of work stored in a queue
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Entry {
    pub id: i64,
    pub creation_time: DateTime<Utc>,
    #[serde(rename = "entry")]
    pub text: String,
}

impl Entry {
    /// Map a `(id, creation_time, entry)` row
    pub(crate) fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
        let micros: i64 = row.get(1)?;
        Ok(Entry {
            id: row.get(0)?,
            creation_time: from_micros(micros)?,
            text: row.get(2)?,
        })
    }

    /// FIFO sort key
    pub fn order_key(&self) -> (DateTime<Utc>, i64) {
        (self.creation_time, self.id)
    }
}

/// Time zone used to parse dates and render timestamps
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Zone {
    #[default]
    Local,
    Utc,
}

impl Zone {
    /// First instant of `date` in this zone
    ///
    /// When local midnight falls in a DST gap, the first local time after the gap
    /// is used.
    pub fn start_of_day(self, date: NaiveDate) -> Result<DateTime<Utc>> {
        let naive = date.and_time(NaiveTime::MIN);
        match self {
            Zone::Utc => Ok(Utc.from_utc_datetime(&naive)),
            Zone::Local => first_valid_local(&Local, naive)
                .ok_or_else(|| eyre!("{} has no valid time in the local time zone", date)),
        }
    }

    /// Render a timestamp for humans
    pub fn format(self, time: DateTime<Utc>) -> String {
        const FORMAT: &str = "%Y-%m-%d %H:%M:%S";
        match self {
            Zone::Utc => time.format(FORMAT).to_string(),
            Zone::Local => time.with_timezone(&Local).format(FORMAT).to_string(),
        }
    }
}

impl FromStr for Zone {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "local" => Ok(Zone::Local),
            "utc" => Ok(Zone::Utc),
            other => Err(format!("unknown time zone `{}` (expected local or utc)", other)),
        }
    }
}

impl fmt::Display for Zone {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Zone::Local => write!(f, "local"),
            Zone::Utc => write!(f, "utc"),
        }
    }
}

/// Earliest instant at or after local `naive`, stepping over a DST gap minute by minute
fn first_valid_local<Tz: TimeZone>(zone: &Tz, naive: NaiveDateTime) -> Option<DateTime<Utc>> {
    (0..=MINUTES_PER_DAY)
        .map(|minute| naive + ChronoDuration::minutes(minute))
        .find_map(|candidate| zone.from_local_datetime(&candidate).earliest())
        .map(|t| t.with_timezone(&Utc))
}

const MINUTES_PER_DAY: i64 = 24 * 60;

/// Storage representation of a timestamp
pub(crate) fn to_micros(time: DateTime<Utc>) -> i64 {
    time.timestamp_micros()
}

pub(crate) fn from_micros(micros: i64) -> rusqlite::Result<DateTime<Utc>> {
    DateTime::from_timestamp_micros(micros).ok_or(rusqlite::Error::IntegralValueOutOfRange(1, micros))
}
