use chrono::{DateTime, TimeZone, Utc};

pub fn time_millis() -> i64 {
    let time: DateTime<chrono::Utc> = Utc::now();
    time.timestamp_millis()
}

/// Render a millisecond timestamp as RFC 3339; `None` for zero (unset).
pub fn millis_to_rfc3339(millis: i64) -> Option<String> {
    if millis == 0 {
        return None;
    }
    Utc.timestamp_millis_opt(millis).single().map(|t| t.to_rfc3339())
}
