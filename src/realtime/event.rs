use bytes::Bytes;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Event types the client must not miss; the hub sends them twice.
pub const CRITICAL_EVENTS: [&str; 2] = ["minecraft_linked", "account_unlinked"];

/// A JSON event addressed to one user. Serialized flat, with the kind under
/// the `type` key: `{"type":"stats_updated","mcUUID":"..."}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserEvent {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(flatten)]
    pub data: Map<String, Value>,
}

impl UserEvent {
    pub fn new(kind: impl Into<String>) -> Self {
        UserEvent {
            kind: kind.into(),
            data: Map::new(),
        }
    }

    /// Wraps an arbitrary JSON payload. Objects are merged flat, anything
    /// else lands under `data`.
    pub fn from_value(kind: impl Into<String>, payload: Value) -> Self {
        let mut event = UserEvent::new(kind);
        match payload {
            Value::Object(mut map) => {
                map.remove("type");
                event.data = map;
            }
            Value::Null => {}
            other => {
                event.data.insert("data".to_string(), other);
            }
        }
        event
    }

    pub fn with(mut self, key: &str, value: impl Into<Value>) -> Self {
        if key != "type" {
            self.data.insert(key.to_string(), value.into());
        }
        self
    }

    pub fn is_critical(&self) -> bool {
        CRITICAL_EVENTS.contains(&self.kind.as_str())
    }

    pub fn to_json(&self) -> Value {
        let mut map = self.data.clone();
        map.insert("type".to_string(), Value::String(self.kind.clone()));
        Value::Object(map)
    }

    /// `data: <json>\n\n`
    pub fn frame(&self) -> Bytes {
        Bytes::from(format!("data: {}\n\n", self.to_json()))
    }
}

pub fn heartbeat_frame(timestamp_ms: i64) -> Bytes {
    Bytes::from(format!(": heartbeat {}\n\n", timestamp_ms))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn frame_is_flat_json() {
        let event = UserEvent::new("stats_updated").with("mcUUID", "abc");
        let frame = event.frame();
        let text = std::str::from_utf8(&frame).unwrap();

        assert!(text.starts_with("data: "));
        assert!(text.ends_with("\n\n"));
        let body: Value = serde_json::from_str(text.trim_start_matches("data: ").trim()).unwrap();
        assert_eq!(body, json!({"type": "stats_updated", "mcUUID": "abc"}));
    }

    #[test]
    fn payload_type_key_cannot_override_kind() {
        let event = UserEvent::from_value("notification", json!({"type": "spoof", "message": "hi"}));
        assert_eq!(event.to_json()["type"], "notification");
        assert_eq!(event.to_json()["message"], "hi");
    }

    #[test]
    fn scalar_payload_goes_under_data() {
        let event = UserEvent::from_value("ping", json!(5));
        assert_eq!(event.to_json()["data"], 5);
    }

    #[test]
    fn critical_kinds() {
        assert!(UserEvent::new("minecraft_linked").is_critical());
        assert!(UserEvent::new("account_unlinked").is_critical());
        assert!(!UserEvent::new("stats_updated").is_critical());
    }

    #[test]
    fn deserializes_flattened() {
        let event: UserEvent =
            serde_json::from_value(json!({"type": "notification", "id": "1"})).unwrap();
        assert_eq!(event.kind, "notification");
        assert_eq!(event.data["id"], "1");
    }
}
