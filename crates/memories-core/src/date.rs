use chrono::{DateTime, Local, NaiveDateTime, Utc};

use crate::error::{Error, Result};

const DATE_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Parse a manifest date such as `2023-07-14 18:02:55 UTC`.
///
/// A numeric offset is honoured, UTC/GMT/Z mean UTC, and any other zone
/// abbreviation is read as host local time (abbreviations are ambiguous).
pub fn parse_capture_date(s: &str) -> Result<DateTime<Utc>> {
    let trimmed = s.trim();
    let invalid = || Error::InvalidDate(s.to_string());

    if let Ok(dt) = DateTime::parse_from_str(trimmed, &format!("{DATE_FORMAT} %z")) {
        return Ok(dt.with_timezone(&Utc));
    }

    let (stamp, zone) = trimmed.rsplit_once(' ').ok_or_else(invalid)?;
    if zone.is_empty() || !zone.chars().all(|c| c.is_ascii_alphabetic()) {
        return Err(invalid());
    }
    let naive = NaiveDateTime::parse_from_str(stamp, DATE_FORMAT).map_err(|_| invalid())?;

    match zone.to_ascii_uppercase().as_str() {
        "UTC" | "GMT" | "Z" => Ok(naive.and_utc()),
        _ => naive
            .and_local_timezone(Local)
            .earliest()
            .map(|local| local.with_timezone(&Utc))
            .ok_or_else(invalid),
    }
}
