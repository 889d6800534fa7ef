use serde_json::Value;

/// One event read from a `text/event-stream` body.
#[derive(Debug, Clone, PartialEq)]
pub struct ClientEvent {
    /// `event:` name, else the JSON payload's `type`, else `"message"`.
    pub kind: String,
    pub id: Option<String>,
    pub data: String,
    pub json: Option<Value>,
}

impl ClientEvent {
    fn from_parts(event_name: Option<String>, id: Option<String>, data: String) -> Self {
        let json: Option<Value> = serde_json::from_str(&data).ok();
        let kind = event_name
            .filter(|name| !name.is_empty())
            .or_else(|| {
                json.as_ref()
                    .and_then(|v| v.get("type"))
                    .and_then(Value::as_str)
                    .map(str::to_string)
            })
            .unwrap_or_else(|| "message".to_string());

        ClientEvent {
            kind,
            id,
            data,
            json,
        }
    }
}

/// Incremental SSE parser. Chunks may split lines and events anywhere.
#[derive(Debug, Default)]
pub struct SseParser {
    buffer: Vec<u8>,
    data_lines: Vec<String>,
    event_name: Option<String>,
    last_event_id: Option<String>,
}

impl SseParser {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn feed(&mut self, chunk: &[u8]) -> Vec<ClientEvent> {
        self.buffer.extend_from_slice(chunk);
        let mut events = Vec::new();

        while let Some(pos) = self.buffer.iter().position(|b| *b == b'\n') {
            let mut line: Vec<u8> = self.buffer.drain(..=pos).collect();
            line.pop();
            if line.last() == Some(&b'\r') {
                line.pop();
            }
            let line = String::from_utf8_lossy(&line);

            if let Some(event) = self.process_line(&line) {
                events.push(event);
            }
        }

        events
    }

    /// Last `id:` seen, kept across events.
    pub fn last_event_id(&self) -> Option<&str> {
        self.last_event_id.as_deref()
    }

    fn process_line(&mut self, line: &str) -> Option<ClientEvent> {
        if line.is_empty() {
            return self.dispatch();
        }
        if line.starts_with(':') {
            return None;
        }

        let (field, value) = match line.split_once(':') {
            Some((field, value)) => (field, value.strip_prefix(' ').unwrap_or(value)),
            None => (line, ""),
        };

        match field {
            "data" => self.data_lines.push(value.to_string()),
            "event" => self.event_name = Some(value.to_string()),
            "id" => self.last_event_id = Some(value.to_string()),
            _ => {}
        }
        None
    }

    fn dispatch(&mut self) -> Option<ClientEvent> {
        let event_name = self.event_name.take();
        if self.data_lines.is_empty() {
            return None;
        }
        let data = std::mem::take(&mut self.data_lines).join("\n");
        Some(ClientEvent::from_parts(
            event_name,
            self.last_event_id.clone(),
            data,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_single_json_event() {
        let mut parser = SseParser::new();
        let events = parser.feed(b"data: {\"type\":\"sse_connected\",\"timestamp\":1}\n\n");

        assert_eq!(events.len(), 1);
        assert_eq!(events[0].kind, "sse_connected");
        assert_eq!(events[0].json.as_ref().unwrap()["timestamp"], 1);
    }

    #[test]
    fn handles_chunks_split_mid_line() {
        let mut parser = SseParser::new();
        assert!(parser.feed(b"data: {\"type\":\"no").is_empty());
        assert!(parser.feed(b"tification\"}\n").is_empty());
        let events = parser.feed(b"\n");

        assert_eq!(events.len(), 1);
        assert_eq!(events[0].kind, "notification");
    }

    #[test]
    fn joins_multi_line_data() {
        let mut parser = SseParser::new();
        let events = parser.feed(b"data: first\ndata: second\n\n");

        assert_eq!(events[0].data, "first\nsecond");
        assert_eq!(events[0].kind, "message");
        assert!(events[0].json.is_none());
    }

    #[test]
    fn ignores_comments_and_heartbeats() {
        let mut parser = SseParser::new();
        let events = parser.feed(b": heartbeat 1700000000000\n\n: just a comment\n\ndata: x\n\n");

        assert_eq!(events.len(), 1);
        assert_eq!(events[0].data, "x");
    }

    #[test]
    fn accepts_crlf_line_endings() {
        let mut parser = SseParser::new();
        let events = parser.feed(b"event: ping\r\nid: 7\r\ndata: {}\r\n\r\n");

        assert_eq!(events.len(), 1);
        assert_eq!(events[0].kind, "ping");
        assert_eq!(events[0].id.as_deref(), Some("7"));
        assert_eq!(parser.last_event_id(), Some("7"));
    }

    #[test]
    fn event_name_wins_over_json_type() {
        let mut parser = SseParser::new();
        let events = parser.feed(b"event: custom\ndata: {\"type\":\"other\"}\n\n");
        assert_eq!(events[0].kind, "custom");
    }

    #[test]
    fn event_name_does_not_leak_into_next_event() {
        let mut parser = SseParser::new();
        let events = parser.feed(b"event: custom\ndata: a\n\ndata: b\n\n");
        assert_eq!(events[0].kind, "custom");
        assert_eq!(events[1].kind, "message");
    }

    #[test]
    fn blank_line_without_data_emits_nothing() {
        let mut parser = SseParser::new();
        assert!(parser.feed(b"event: lonely\n\n\n").is_empty());
    }
}
