use chrono::{DateTime, FixedOffset, Utc};
use serde_json::{Value, json};

pub const DATE_TIME_TOOL_NAME: &str = "get_current_date_time";

/// Accepts "UTC", "Z", or fixed offsets like "+05:30"/"-08:00". Anything else
/// is unrecognized; the caller falls back to UTC and reports that back.
pub fn parse_time_zone(label: &str) -> Option<FixedOffset> {
    let trimmed = label.trim();
    if trimmed.eq_ignore_ascii_case("utc") || trimmed == "Z" {
        return FixedOffset::east_opt(0);
    }

    let (sign, rest) = match trimmed.chars().next()? {
        '+' => (1i32, &trimmed[1..]),
        '-' => (-1i32, &trimmed[1..]),
        _ => return None,
    };
    let (hours, minutes) = rest.split_once(':')?;
    let hours = hours.parse::<i32>().ok()?;
    let minutes = minutes.parse::<i32>().ok()?;
    if hours > 23 || minutes > 59 || hours < 0 || minutes < 0 {
        return None;
    }

    FixedOffset::east_opt(sign * (hours * 3600 + minutes * 60))
}

pub fn date_time_payload(requested_zone: &str, now_utc: DateTime<Utc>) -> Value {
    match parse_time_zone(requested_zone) {
        Some(offset) => {
            let now = now_utc.with_timezone(&offset);
            json!({
                "current_date": now.format("%Y-%m-%d").to_string(),
                "current_time": now.format("%H:%M:%S").to_string(),
                "time_zone": requested_zone.trim()
            })
        }
        None => json!({
            "current_date": now_utc.format("%Y-%m-%d").to_string(),
            "current_time": now_utc.format("%H:%M:%S").to_string(),
            "time_zone": "UTC"
        }),
    }
}

pub fn date_time_tool_response(args: &Value) -> Value {
    let requested_zone = args
        .get("time_zone")
        .and_then(Value::as_str)
        .unwrap_or("UTC");
    date_time_payload(requested_zone, Utc::now())
}
