use chrono::{NaiveDate, NaiveDateTime};

use super::types::{DateRange, EntityId};
use crate::error::{Result, StatsError};

/// Date formats accepted from callers, tried in order.
const DATE_FORMATS: [&str; 3] = ["%Y-%m-%d", "%d/%m/%Y", "%d-%m-%Y"];
const DATETIME_FORMATS: [&str; 2] = ["%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S"];

/// Helper to require a named parameter that may be absent or blank.
pub fn require<'a>(name: &str, raw: Option<&'a str>) -> Result<&'a str> {
    match raw.map(str::trim) {
        Some(value) if !value.is_empty() => Ok(value),
        _ => Err(StatsError::InvalidInput(format!("missing required parameter '{}'", name))),
    }
}

/// Parse a calendar date. Datetimes are accepted and truncated to their date.
pub fn parse_date(name: &str, raw: &str) -> Result<NaiveDate> {
    let raw = raw.trim();
    for format in DATE_FORMATS {
        if let Ok(date) = NaiveDate::parse_from_str(raw, format) {
            return Ok(date);
        }
    }
    for format in DATETIME_FORMATS {
        if let Ok(datetime) = NaiveDateTime::parse_from_str(raw, format) {
            return Ok(datetime.date());
        }
    }
    Err(StatsError::InvalidInput(format!(
        "parameter '{}' is not a valid date: '{}'",
        name, raw
    )))
}

/// Parse a bed or crop id. Ids are positive integers.
pub fn parse_entity_id(name: &str, raw: &str) -> Result<EntityId> {
    let id: EntityId = raw.trim().parse().map_err(|_| {
        StatsError::InvalidInput(format!("parameter '{}' is not a valid id: '{}'", name, raw))
    })?;
    if id <= 0 {
        return Err(StatsError::InvalidInput(format!(
            "parameter '{}' must be a positive id, got {}",
            name, id
        )));
    }
    Ok(id)
}

/// Parse an inclusive date range. An inverted range is returned as-is.
pub fn parse_date_range(start: &str, end: &str) -> Result<DateRange> {
    Ok(DateRange::new(
        parse_date("start_date", start)?,
        parse_date("end_date", end)?,
    ))
}
