use chrono::{DateTime, Duration, NaiveDateTime, TimeZone, Utc};

/// Storage timestamp format. All persisted time values use this single
/// portable shape so the SQL date functions can compare them lexically.
const SQL_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Format a timestamp for storage as `YYYY-MM-DD HH:MM:SS` (UTC).
pub fn sql_timestamp(ts: DateTime<Utc>) -> String {
    ts.format(SQL_FORMAT).to_string()
}

/// Storage-format timestamp for "now minus `seconds`". Used to build
/// `created_at=gte.<ts>` window filters.
pub fn window_start(seconds: i64) -> String {
    sql_timestamp(Utc::now() - Duration::seconds(seconds))
}

/// Parse a stored or upstream timestamp. Accepts the storage format, the
/// ISO-8601 'T'-separated form (with or without offset), and RFC 3339.
pub fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
        return Some(ts.with_timezone(&Utc));
    }
    let normalized = raw.replace('T', " ");
    let trimmed = normalized
        .split_once('.')
        .map(|(head, _)| head)
        .unwrap_or(&normalized);
    if let Ok(naive) = NaiveDateTime::parse_from_str(trimmed, SQL_FORMAT) {
        return Some(Utc.from_utc_datetime(&naive));
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn fixed() -> DateTime<Utc> {
        Utc.from_utc_datetime(
            &NaiveDate::from_ymd_opt(2025, 3, 14)
                .unwrap()
                .and_hms_opt(9, 26, 53)
                .unwrap(),
        )
    }

    #[test]
    fn formats_for_storage() {
        assert_eq!(sql_timestamp(fixed()), "2025-03-14 09:26:53");
    }

    #[test]
    fn parses_storage_format() {
        assert_eq!(parse_timestamp("2025-03-14 09:26:53"), Some(fixed()));
    }

    #[test]
    fn parses_iso_with_t_separator() {
        assert_eq!(parse_timestamp("2025-03-14T09:26:53"), Some(fixed()));
        assert_eq!(parse_timestamp("2025-03-14T09:26:53.123"), Some(fixed()));
    }

    #[test]
    fn parses_rfc3339() {
        assert_eq!(parse_timestamp("2025-03-14T09:26:53Z"), Some(fixed()));
        assert_eq!(parse_timestamp("2025-03-14T10:26:53+01:00"), Some(fixed()));
    }

    #[test]
    fn rejects_garbage() {
        assert_eq!(parse_timestamp("not a time"), None);
    }

    #[test]
    fn window_start_is_in_the_past() {
        let start = parse_timestamp(&window_start(3600)).unwrap();
        assert!(start < Utc::now());
    }
}
