//! Date parsing helpers shared by the wire types.

use chrono::NaiveDate;
use serde::{Deserialize, Deserializer};

/// Parse a log date as the store may send it, keeping only the calendar day.
///
/// Accepts:
/// - YYYY-MM-DD
/// - RFC3339 datetime (the local date part is kept)
/// - Naive datetime YYYY-MM-DDTHH:MM:SS or YYYY-MM-DD HH:MM:SS
pub fn parse_log_date(s: &str) -> Option<NaiveDate> {
    let s = s.trim();
    if let Ok(d) = NaiveDate::parse_from_str(s, "%Y-%m-%d") {
        return Some(d);
    }
    if let Ok(dt) = chrono::DateTime::parse_from_rfc3339(s) {
        return Some(dt.naive_local().date());
    }
    for fmt in ["%Y-%m-%dT%H:%M:%S", "%Y-%m-%d %H:%M:%S"] {
        if let Ok(ndt) = chrono::NaiveDateTime::parse_from_str(s, fmt) {
            return Some(ndt.date());
        }
    }
    None
}

/// Path/body form of a date (`YYYY-MM-DD`).
pub fn format_log_date(date: NaiveDate) -> String {
    date.format("%Y-%m-%d").to_string()
}

pub(crate) fn deserialize_log_date<'de, D>(deserializer: D) -> Result<NaiveDate, D::Error>
where
    D: Deserializer<'de>,
{
    use serde::de::Error;
    let s = String::deserialize(deserializer)?;
    parse_log_date(&s).ok_or_else(|| D::Error::custom(format!("invalid log date: {s}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_log_date_accepts_date_only() {
        let d = parse_log_date("2025-12-15").unwrap();
        assert_eq!(format_log_date(d), "2025-12-15");
    }

    #[test]
    fn parse_log_date_drops_time_of_day() {
        assert_eq!(
            parse_log_date("2025-12-15T23:30:00"),
            NaiveDate::from_ymd_opt(2025, 12, 15)
        );
        assert_eq!(
            parse_log_date("2025-12-15 08:00:00"),
            NaiveDate::from_ymd_opt(2025, 12, 15)
        );
    }

    #[test]
    fn parse_log_date_keeps_local_date_of_rfc3339() {
        assert_eq!(
            parse_log_date("2025-12-15T23:30:00-05:00"),
            NaiveDate::from_ymd_opt(2025, 12, 15)
        );
    }

    #[test]
    fn parse_log_date_rejects_invalid() {
        assert!(parse_log_date("not-a-date").is_none());
        assert!(parse_log_date("2025-02-30").is_none());
    }
}
