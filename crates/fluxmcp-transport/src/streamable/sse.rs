//! Incremental parser for `text/event-stream` bodies, client side.
//!
//! Feeds arbitrary byte chunks; yields complete events at blank-line
//! boundaries. Only the fields the MCP transport uses are kept: `id`,
//! `event`, and `data` (multi-line `data:` fields are joined with `\n`
//! per the SSE specification). Comment lines (`:`) and unknown fields are
//! ignored.

/// One parsed SSE event.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SseEvent {
    /// The `id:` field, if present.
    pub id: Option<String>,
    /// The `event:` field; MCP messages use `message`.
    pub event: Option<String>,
    /// Joined `data:` lines.
    pub data: String,
}

/// Incremental SSE parser.
#[derive(Debug, Default)]
pub struct SseParser {
    buffer: String,
    current: SseEvent,
    data_lines: Vec<String>,
}

impl SseParser {
    /// Fresh parser.
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed a chunk; returns every event completed by it.
    pub fn feed(&mut self, chunk: &str) -> Vec<SseEvent> {
        self.buffer.push_str(chunk);
        let mut events = Vec::new();

        while let Some(newline) = self.buffer.find('\n') {
            let line: String = self.buffer.drain(..=newline).collect();
            let line = line.trim_end_matches('\n').trim_end_matches('\r');

            if line.is_empty() {
                if let Some(event) = self.dispatch() {
                    events.push(event);
                }
                continue;
            }
            if line.starts_with(':') {
                continue;
            }

            let (field, value) = match line.split_once(':') {
                Some((field, value)) => (field, value.strip_prefix(' ').unwrap_or(value)),
                None => (line, ""),
            };
            match field {
                "id" => self.current.id = Some(value.to_string()),
                "event" => self.current.event = Some(value.to_string()),
                "data" => self.data_lines.push(value.to_string()),
                _ => {}
            }
        }

        events
    }

    fn dispatch(&mut self) -> Option<SseEvent> {
        if self.data_lines.is_empty() && self.current == SseEvent::default() {
            return None;
        }
        let mut event = std::mem::take(&mut self.current);
        event.data = std::mem::take(&mut self.data_lines).join("\n");
        Some(event)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn parses_a_complete_event() {
        let mut parser = SseParser::new();
        let events = parser.feed("event: message\nid: 4\ndata: {\"x\":1}\n\n");
        assert_eq!(
            events,
            vec![SseEvent {
                id: Some("4".into()),
                event: Some("message".into()),
                data: "{\"x\":1}".into(),
            }]
        );
    }

    #[test]
    fn handles_chunks_split_mid_line() {
        let mut parser = SseParser::new();
        assert!(parser.feed("data: hel").is_empty());
        assert!(parser.feed("lo\n").is_empty());
        let events = parser.feed("\n");
        assert_eq!(events[0].data, "hello");
    }

    #[test]
    fn joins_multi_line_data() {
        let mut parser = SseParser::new();
        let events = parser.feed("data: a\ndata: b\n\n");
        assert_eq!(events[0].data, "a\nb");
    }

    #[test]
    fn ignores_comments_and_unknown_fields() {
        let mut parser = SseParser::new();
        let events = parser.feed(": keep-alive\nretry: 500\ndata: x\n\n");
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].data, "x");
    }

    #[test]
    fn tolerates_crlf() {
        let mut parser = SseParser::new();
        let events = parser.feed("data: x\r\n\r\n");
        assert_eq!(events[0].data, "x");
    }

    #[test]
    fn blank_lines_without_fields_emit_nothing() {
        let mut parser = SseParser::new();
        assert!(parser.feed("\n\n\n").is_empty());
    }

    #[test]
    fn multiple_events_in_one_chunk() {
        let mut parser = SseParser::new();
        let events = parser.feed("data: 1\n\ndata: 2\n\n");
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].data, "1");
        assert_eq!(events[1].data, "2");
    }
}
