/// A parsed Server-Sent Event.
#[derive(Debug)]
pub struct SseEvent {
    pub event_type: Option<String>,
    pub data: String,
}

/// Incremental SSE parser.
///
/// Events are separated by blank lines; `event:` and `data:` fields
/// accumulate until then. The parser keeps partial-line and partial-event
/// state across `push` calls, so chunk boundaries falling mid-event are
/// handled correctly.
#[derive(Debug, Default)]
pub struct SseParser {
    line_buf: String,
    event_type: Option<String>,
    data: String,
}

impl SseParser {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed a chunk of stream text, returning any events completed by it.
    pub fn push(&mut self, chunk: &str) -> Vec<SseEvent> {
        let mut events = Vec::new();
        self.line_buf.push_str(chunk);
        while let Some(idx) = self.line_buf.find('\n') {
            let line: String = self.line_buf.drain(..=idx).collect();
            self.take_line(line.trim_end_matches(['\n', '\r']), &mut events);
        }
        events
    }

    fn take_line(&mut self, line: &str, out: &mut Vec<SseEvent>) {
        if line.is_empty() {
            // Blank line = end of event
            if !self.data.is_empty() {
                out.push(SseEvent {
                    event_type: self.event_type.take(),
                    data: std::mem::take(&mut self.data),
                });
            }
            self.event_type = None;
        } else if let Some(value) = line.strip_prefix("event:") {
            self.event_type = Some(value.trim().to_string());
        } else if let Some(value) = line.strip_prefix("data:") {
            if !self.data.is_empty() {
                self.data.push('\n');
            }
            self.data.push_str(value.trim_start());
        }
        // Comment lines (":keepalive") and unknown fields are ignored.
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_single_event() {
        let mut parser = SseParser::new();
        let events = parser.push("event: insert\ndata: {\"id\":\"u\"}\n\n");
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].event_type.as_deref(), Some("insert"));
        assert_eq!(events[0].data, "{\"id\":\"u\"}");
    }

    #[test]
    fn parse_multiple_events_in_one_chunk() {
        let mut parser = SseParser::new();
        let events = parser.push("event: insert\ndata: {\"a\":1}\n\nevent: insert\ndata: {\"b\":2}\n\n");
        assert_eq!(events.len(), 2);
    }

    #[test]
    fn parse_event_split_across_chunks() {
        let mut parser = SseParser::new();
        assert!(parser.push("event: ins").is_empty());
        assert!(parser.push("ert\ndata: {\"a\"").is_empty());
        let events = parser.push(":1}\n\n");
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].event_type.as_deref(), Some("insert"));
        assert_eq!(events[0].data, "{\"a\":1}");
    }

    #[test]
    fn parse_multiline_data_joined_with_newline() {
        let mut parser = SseParser::new();
        let events = parser.push("data: line1\ndata: line2\n\n");
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].data, "line1\nline2");
    }

    #[test]
    fn comment_lines_ignored() {
        let mut parser = SseParser::new();
        let events = parser.push(":keepalive\n\ndata: {}\n\n");
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].data, "{}");
    }

    #[test]
    fn crlf_line_endings_accepted() {
        let mut parser = SseParser::new();
        let events = parser.push("event: insert\r\ndata: {}\r\n\r\n");
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].event_type.as_deref(), Some("insert"));
    }

    #[test]
    fn empty_chunk_yields_nothing() {
        let mut parser = SseParser::new();
        assert!(parser.push("").is_empty());
    }
}
