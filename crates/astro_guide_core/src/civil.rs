//! crates/astro_guide_core/src/civil.rs
//!
//! Civil date/time components and their conversion to absolute instants.
//!
//! A birth moment is entered as wall-clock components (a calendar date and
//! a time of day) and only becomes an absolute UTC instant once a validated
//! timezone is known. Components are the stored and transmitted form; the
//! instant is derived on demand. Converting the other way is only used for
//! round-tripping values back into editing surfaces.

use chrono::{DateTime, Datelike, NaiveDate, NaiveDateTime, NaiveTime, TimeZone, Timelike, Utc};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};

/// A calendar date without an attached timezone.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CivilDate {
    pub year: i32,
    pub month: u32,
    pub day: u32,
}

impl CivilDate {
    pub fn new(year: i32, month: u32, day: u32) -> Self {
        Self { year, month, day }
    }

    /// Medium display style, e.g. "Dec 10, 1815".
    pub fn display_medium(&self) -> String {
        match NaiveDate::from_ymd_opt(self.year, self.month, self.day) {
            Some(date) => date.format("%b %-d, %Y").to_string(),
            None => format!("{:04}-{:02}-{:02}", self.year, self.month, self.day),
        }
    }
}

/// A time of day without an attached timezone.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CivilTime {
    pub hour: u32,
    pub minute: u32,
    #[serde(default)]
    pub second: u32,
}

impl CivilTime {
    pub fn new(hour: u32, minute: u32, second: u32) -> Self {
        Self {
            hour,
            minute,
            second,
        }
    }

    /// Short display style, e.g. "1:30 PM".
    pub fn display_short(&self) -> String {
        match NaiveTime::from_hms_opt(self.hour, self.minute, self.second) {
            Some(time) => time.format("%-I:%M %p").to_string(),
            None => format!("{:02}:{:02}", self.hour, self.minute),
        }
    }
}

/// Failures when resolving civil components against a timezone.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CivilTimeError {
    #[error("Unknown timezone identifier '{0}'")]
    UnknownTimezone(String),
    #[error("Invalid calendar components {0}")]
    InvalidComponents(String),
    #[error("Local time does not exist in the target timezone")]
    NonexistentLocalTime,
}

fn parse_tz(timezone_id: &str) -> Result<Tz, CivilTimeError> {
    timezone_id
        .parse::<Tz>()
        .map_err(|_| CivilTimeError::UnknownTimezone(timezone_id.to_string()))
}

fn naive_from(date: CivilDate, time: CivilTime) -> Result<NaiveDateTime, CivilTimeError> {
    let d = NaiveDate::from_ymd_opt(date.year, date.month, date.day).ok_or_else(|| {
        CivilTimeError::InvalidComponents(format!(
            "{:04}-{:02}-{:02}",
            date.year, date.month, date.day
        ))
    })?;
    let t = NaiveTime::from_hms_opt(time.hour, time.minute, time.second).ok_or_else(|| {
        CivilTimeError::InvalidComponents(format!(
            "{:02}:{:02}:{:02}",
            time.hour, time.minute, time.second
        ))
    })?;
    Ok(NaiveDateTime::new(d, t))
}

/// Interprets `(date, time)` as wall-clock time in `timezone_id` and returns
/// the absolute UTC instant.
///
/// Ambiguous local times (the repeated hour when clocks fall back) resolve
/// to the earlier instant. Nonexistent local times (the skipped hour when
/// clocks spring forward) slide forward one hour, matching how the host
/// calendar resolves them on the entry side.
pub fn to_utc_instant(
    date: CivilDate,
    time: CivilTime,
    timezone_id: &str,
) -> Result<DateTime<Utc>, CivilTimeError> {
    let tz = parse_tz(timezone_id)?;
    let naive = naive_from(date, time)?;

    if let Some(resolved) = tz.from_local_datetime(&naive).earliest() {
        return Ok(resolved.with_timezone(&Utc));
    }

    let shifted = naive + chrono::Duration::hours(1);
    tz.from_local_datetime(&shifted)
        .earliest()
        .map(|resolved| resolved.with_timezone(&Utc))
        .ok_or(CivilTimeError::NonexistentLocalTime)
}

/// Inverse of [`to_utc_instant`]: the civil components of `instant` as seen
/// on a wall clock in `timezone_id`.
pub fn to_civil_components(
    instant: DateTime<Utc>,
    timezone_id: &str,
) -> Result<(CivilDate, CivilTime), CivilTimeError> {
    let tz = parse_tz(timezone_id)?;
    let local = instant.with_timezone(&tz);
    Ok((
        CivilDate::new(local.year(), local.month(), local.day()),
        CivilTime::new(local.hour(), local.minute(), local.second()),
    ))
}

/// A noon-anchored UTC instant for a date-only value.
///
/// Anchoring at noon keeps the civil day stable under fractional-day
/// arithmetic and display in any zone within twelve hours of UTC.
pub fn date_at_noon_utc(date: CivilDate) -> Result<DateTime<Utc>, CivilTimeError> {
    let naive = naive_from(date, CivilTime::new(12, 0, 0))?;
    Ok(Utc.from_utc_datetime(&naive))
}
