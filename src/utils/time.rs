use chrono::{DateTime, Utc};
use mongodb::bson::DateTime as BsonDateTime;

pub fn now_millis() -> i64 {
    Utc::now().timestamp_millis()
}

pub fn bson_from_chrono(at: DateTime<Utc>) -> BsonDateTime {
    BsonDateTime::from_millis(at.timestamp_millis())
}

pub fn chrono_from_bson(at: BsonDateTime) -> DateTime<Utc> {
    DateTime::<Utc>::from_timestamp_millis(at.timestamp_millis()).unwrap_or_default()
}

pub fn to_iso(at: BsonDateTime) -> String {
    chrono_from_bson(at).to_rfc3339()
}

/// Human "last seen" label used on leaderboards.
pub fn format_last_seen(seen: Option<DateTime<Utc>>, now: DateTime<Utc>) -> String {
    let Some(seen) = seen else {
        return "Unknown".to_string();
    };

    let minutes = (now - seen).num_minutes();
    if minutes < 5 {
        return "Just now".to_string();
    }
    if minutes < 60 {
        return format!("{}m ago", minutes);
    }
    let hours = minutes / 60;
    if hours < 24 {
        return format!("{}h ago", hours);
    }
    let days = hours / 24;
    if days < 7 {
        return format!("{}d ago", days);
    }
    seen.format("%Y-%m-%d").to_string()
}
