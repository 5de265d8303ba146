//! Route handlers module.

pub mod catalog;
pub mod config;
pub mod health;
pub mod pool;
pub mod sessions;

use crate::error::{AnalyticsError, AnalyticsResult};
use crate::service::TimeRange;
use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};

/// Parses a time query parameter.
///
/// Accepts RFC 3339, `YYYY-MM-DDTHH:MM[:SS]` (UTC) and `YYYY-MM-DD`
/// (midnight UTC). Empty values count as absent.
pub fn parse_time(
    name: &'static str,
    raw: Option<&str>,
) -> AnalyticsResult<Option<DateTime<Utc>>> {
    let Some(raw) = raw.map(str::trim).filter(|s| !s.is_empty()) else {
        return Ok(None);
    };

    if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
        return Ok(Some(ts.with_timezone(&Utc)));
    }
    for format in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%dT%H:%M"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(raw, format) {
            return Ok(Some(naive.and_utc()));
        }
    }
    if let Ok(date) = NaiveDate::parse_from_str(raw, "%Y-%m-%d") {
        if let Some(midnight) = date.and_hms_opt(0, 0, 0) {
            return Ok(Some(midnight.and_utc()));
        }
    }

    Err(AnalyticsError::InvalidParameter {
        name,
        reason: format!("\"{raw}\" is not a recognized time"),
    })
}

/// Builds a time range from `startTime` and `endTime` parameters.
pub fn time_range(start: Option<&str>, end: Option<&str>) -> AnalyticsResult<TimeRange> {
    Ok(TimeRange::new(
        parse_time("startTime", start)?,
        parse_time("endTime", end)?,
    ))
}

/// Treats an empty query value as absent.
pub fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().filter(|s| !s.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_parse_time_formats() {
        let expected = Utc.with_ymd_and_hms(2026, 2, 11, 9, 30, 0).unwrap();

        assert_eq!(parse_time("t", Some("2026-02-11T09:30:00Z")).unwrap(), Some(expected));
        assert_eq!(parse_time("t", Some("2026-02-11T10:30:00+01:00")).unwrap(), Some(expected));
        assert_eq!(parse_time("t", Some("2026-02-11T09:30:00")).unwrap(), Some(expected));
        assert_eq!(parse_time("t", Some("2026-02-11T09:30")).unwrap(), Some(expected));
        assert_eq!(
            parse_time("t", Some("2026-02-11")).unwrap(),
            Some(Utc.with_ymd_and_hms(2026, 2, 11, 0, 0, 0).unwrap())
        );
    }

    #[test]
    fn test_parse_time_absent_and_invalid() {
        assert_eq!(parse_time("t", None).unwrap(), None);
        assert_eq!(parse_time("t", Some("  ")).unwrap(), None);

        let err = parse_time("startTime", Some("yesterday")).unwrap_err();
        assert!(matches!(err, AnalyticsError::InvalidParameter { name: "startTime", .. }));
    }

    #[test]
    fn test_time_range() {
        let range = time_range(Some("2026-02-11"), None).unwrap();
        assert!(range.start.is_some());
        assert!(range.end.is_none());
        assert!(matches!(
            range.require().unwrap_err(),
            AnalyticsError::MissingParameter("endTime")
        ));
    }
}
