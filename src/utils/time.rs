// src/utils/time.rs

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};

/// Gets the current UTC date and time.
pub fn now_utc() -> DateTime<Utc> {
    Utc::now()
}

/// Gets the current timestamp in milliseconds since Unix epoch.
pub fn current_timestamp_ms() -> i64 {
    Utc::now().timestamp_millis()
}

/// Parses the timestamp shapes seen in upstream and store payloads:
/// RFC 3339, `YYYY-MM-DD HH:MM:SS[.f]` (assumed UTC) and bare `YYYY-MM-DD`.
pub fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }
    if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
        return Some(ts.with_timezone(&Utc));
    }
    for format in ["%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S%.f"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(raw, format) {
            return Some(naive.and_utc());
        }
    }
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .map(|naive| naive.and_utc())
}

/// Cross-target sleep: Workers timers on wasm, tokio elsewhere.
#[cfg(target_arch = "wasm32")]
pub async fn sleep_ms(ms: u64) {
    if ms > 0 {
        worker::Delay::from(std::time::Duration::from_millis(ms)).await;
    }
}

#[cfg(not(target_arch = "wasm32"))]
pub async fn sleep_ms(ms: u64) {
    if ms > 0 {
        tokio::time::sleep(tokio::time::Duration::from_millis(ms)).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Datelike, Timelike};

    #[test]
    fn test_parse_rfc3339_with_offset() {
        let ts = parse_timestamp("2024-03-01T12:00:00+02:00").unwrap();
        assert_eq!(ts.hour(), 10);
    }

    #[test]
    fn test_parse_sql_style_and_date_only() {
        let ts = parse_timestamp("2024-03-01 08:15:30").unwrap();
        assert_eq!(ts.minute(), 15);
        let day = parse_timestamp("2024-03-01").unwrap();
        assert_eq!(day.day(), 1);
        assert_eq!(day.hour(), 0);
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert!(parse_timestamp("").is_none());
        assert!(parse_timestamp("not a date").is_none());
        assert!(parse_timestamp("2024-13-45").is_none());
    }
}
