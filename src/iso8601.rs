use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};

/// Local date-time layouts accepted when the text carries no UTC offset.
const NAIVE_FORMATS: &[&str] = &[
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M",
];

/// Parse an ISO-8601 date-time as found in GPX `<time>` elements.
///
/// Values without an offset are taken as UTC, and a bare date means midnight UTC.
/// On failure the error of the RFC 3339 attempt is returned.
pub fn parse_date(text: &str) -> Result<DateTime<Utc>, chrono::ParseError> {
    let text = text.trim();

    let err = match DateTime::parse_from_rfc3339(text) {
        Ok(dt) => return Ok(dt.with_timezone(&Utc)),
        Err(e) => e,
    };

    for fmt in NAIVE_FORMATS {
        if let Ok(naive) = NaiveDateTime::parse_from_str(text, fmt) {
            return Ok(naive.and_utc());
        }
    }

    if let Some(midnight) = NaiveDate::parse_from_str(text, "%Y-%m-%d")
        .ok()
        .and_then(|date| date.and_hms_opt(0, 0, 0))
    {
        return Ok(midnight.and_utc());
    }

    Err(err)
}
