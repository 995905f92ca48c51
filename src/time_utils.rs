use chrono::{DateTime, Utc};

/// Current timestamp in UTC.
pub fn now() -> DateTime<Utc> {
    Utc::now()
}

/// Format a timestamp as ISO 8601 for SQLite.
pub fn to_sqlite(dt: &DateTime<Utc>) -> String {
    dt.to_rfc3339()
}

/// Parse an ISO 8601 timestamp from SQLite.
pub fn from_sqlite(s: &str) -> Result<DateTime<Utc>, chrono::ParseError> {
    s.parse::<DateTime<Utc>>()
}
