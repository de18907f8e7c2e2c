use chrono::{DateTime, NaiveDate, NaiveDateTime, SecondsFormat, TimeZone, Utc};

pub fn now_ms() -> i64 {
    Utc::now().timestamp_millis()
}

pub fn format_timestamp_ms_iso_millis(value: i64) -> Option<String> {
    Utc.timestamp_millis_opt(value)
        .single()
        .map(|dt| dt.to_rfc3339_opts(SecondsFormat::Millis, true))
}

/// Accepts RFC 3339 or a bare `YYYY-MM-DD` (midnight UTC).
pub fn parse_iso_ms(value: &str) -> Option<i64> {
    let value = value.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(value) {
        return Some(dt.with_timezone(&Utc).timestamp_millis());
    }

    if let Ok(naive) = NaiveDateTime::parse_from_str(value, "%Y-%m-%dT%H:%M:%S") {
        return Some(DateTime::<Utc>::from_naive_utc_and_offset(naive, Utc).timestamp_millis());
    }

    NaiveDate::parse_from_str(value, "%Y-%m-%d")
        .ok()
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .map(|naive| DateTime::<Utc>::from_naive_utc_and_offset(naive, Utc).timestamp_millis())
}

/// UTC calendar day of a timestamp, `YYYY-MM-DD`.
pub fn day_key(value_ms: i64) -> String {
    Utc.timestamp_millis_opt(value_ms)
        .single()
        .unwrap_or_else(Utc::now)
        .format("%Y-%m-%d")
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_and_parse() {
        let iso = format_timestamp_ms_iso_millis(1_700_000_000_123).unwrap();
        assert_eq!(iso, "2023-11-14T22:13:20.123Z");
        assert_eq!(parse_iso_ms(&iso), Some(1_700_000_000_123));
    }

    #[test]
    fn test_parse_date_only() {
        assert_eq!(parse_iso_ms("1970-01-02"), Some(86_400_000));
        assert_eq!(parse_iso_ms("not a date"), None);
    }

    #[test]
    fn test_day_key() {
        assert_eq!(day_key(0), "1970-01-01");
        assert_eq!(day_key(1_700_000_000_000), "2023-11-14");
    }
}
