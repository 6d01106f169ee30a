use crate::error::{SyncError, SyncResult};
use chrono::{DateTime, NaiveDateTime, Utc};
use regex::Regex;
use std::sync::LazyLock;

static LAP_TIME_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(\d+):(\d{2})\.(\d{3})$").expect("lap time pattern compiles"));

/// Upload timestamps are published as `dd/mm/YYYY HH:MM`, in UTC.
const UPLOAD_DATE_FORMAT: &str = "%d/%m/%Y %H:%M";

/// Parses `M:SS.mmm` into total milliseconds.
pub fn parse_lap_time(raw: &str) -> SyncResult<u32> {
    let caps = LAP_TIME_PATTERN
        .captures(raw.trim())
        .ok_or_else(|| SyncError::Parse(format!("invalid lap time '{raw}'")))?;

    let field = |idx: usize| -> SyncResult<u32> {
        caps[idx]
            .parse::<u32>()
            .map_err(|e| SyncError::Parse(format!("invalid lap time '{raw}': {e}")))
    };
    let (minutes, seconds, millis) = (field(1)?, field(2)?, field(3)?);
    if seconds >= 60 {
        return Err(SyncError::Parse(format!("invalid lap time '{raw}': seconds out of range")));
    }

    minutes
        .checked_mul(60)
        .and_then(|s| s.checked_add(seconds))
        .and_then(|s| s.checked_mul(1000))
        .and_then(|ms| ms.checked_add(millis))
        .ok_or_else(|| SyncError::Parse(format!("lap time '{raw}' overflows")))
}

/// Formats milliseconds as `MM:SS.mmm`.
pub fn format_lap_time(millis: u32) -> String {
    let (seconds, millis) = (millis / 1000, millis % 1000);
    let (minutes, seconds) = (seconds / 60, seconds % 60);
    format!("{minutes:02}:{seconds:02}.{millis:03}")
}

pub fn parse_upload_date(raw: &str) -> SyncResult<DateTime<Utc>> {
    let raw = raw.trim();
    if let Ok(naive) = NaiveDateTime::parse_from_str(raw, UPLOAD_DATE_FORMAT) {
        return Ok(naive.and_utc());
    }
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| SyncError::Parse(format!("invalid upload date '{raw}': {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_parse_lap_time() {
        assert_eq!(parse_lap_time("1:23.456").unwrap(), 83_456);
        assert_eq!(parse_lap_time("0:59.001").unwrap(), 59_001);
        assert_eq!(parse_lap_time("12:00.000").unwrap(), 720_000);
    }

    #[test]
    fn test_parse_lap_time_rejects_garbage() {
        assert!(parse_lap_time("1:2.456").is_err());
        assert!(parse_lap_time("1:23.45").is_err());
        assert!(parse_lap_time("1:75.000").is_err());
        assert!(parse_lap_time("").is_err());
    }

    #[test]
    fn test_format_lap_time() {
        assert_eq!(format_lap_time(83_456), "01:23.456");
        assert_eq!(format_lap_time(5), "00:00.005");
    }

    #[test]
    fn test_parse_upload_date() {
        let expected = Utc.with_ymd_and_hms(2021, 4, 17, 9, 5, 0).unwrap();
        assert_eq!(parse_upload_date("17/04/2021 09:05").unwrap(), expected);
        assert_eq!(parse_upload_date("2021-04-17T09:05:00Z").unwrap(), expected);
        assert!(parse_upload_date("2021/04/17").is_err());
    }
}
