//! Incremental parser for the push stream's `text/event-stream` body.

/// One dispatched SSE block.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SseFrame {
    Event { name: String, data: String },
    Comment(String),
}

#[derive(Debug, Default)]
pub struct SseParser {
    buffer: String,
    event: Option<String>,
    data: Vec<String>,
}

impl SseParser {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed a chunk of the body; returns every frame it completes. Partial
    /// lines are kept until the next chunk.
    pub fn feed(&mut self, chunk: &str) -> Vec<SseFrame> {
        self.buffer.push_str(chunk);
        let mut frames = Vec::new();

        while let Some(end) = self.buffer.find('\n') {
            let line: String = self.buffer.drain(..=end).collect();
            let line = line.trim_end_matches(['\n', '\r']);
            if let Some(frame) = self.process_line(line) {
                frames.push(frame);
            }
        }
        frames
    }

    fn process_line(&mut self, line: &str) -> Option<SseFrame> {
        if line.is_empty() {
            return self.dispatch();
        }
        if let Some(comment) = line.strip_prefix(':') {
            return Some(SseFrame::Comment(comment.trim_start().to_string()));
        }

        let (field, value) = match line.split_once(':') {
            Some((field, value)) => (field, value.strip_prefix(' ').unwrap_or(value)),
            None => (line, ""),
        };
        match field {
            "event" => self.event = Some(value.to_string()),
            "data" => self.data.push(value.to_string()),
            // id and retry are not used by the relay
            _ => {}
        }
        None
    }

    fn dispatch(&mut self) -> Option<SseFrame> {
        let name = self.event.take();
        if self.data.is_empty() {
            return None;
        }
        let data = std::mem::take(&mut self.data).join("\n");
        Some(SseFrame::Event {
            name: name.unwrap_or_else(|| "message".to_string()),
            data,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_named_events() {
        let mut parser = SseParser::new();
        let frames = parser.feed("event: connected\ndata: {\"characterId\":\"A\"}\n\n");
        assert_eq!(
            frames,
            vec![SseFrame::Event {
                name: "connected".into(),
                data: "{\"characterId\":\"A\"}".into(),
            }]
        );
    }

    #[test]
    fn reassembles_across_chunks() {
        let mut parser = SseParser::new();
        assert!(parser.feed("event: name_up").is_empty());
        assert!(parser.feed("date\ndata: {\"name\":").is_empty());
        let frames = parser.feed("\"Aldric\"}\r\n\r\n");
        assert_eq!(
            frames,
            vec![SseFrame::Event {
                name: "name_update".into(),
                data: "{\"name\":\"Aldric\"}".into(),
            }]
        );
    }

    #[test]
    fn comments_and_multiline_data() {
        let mut parser = SseParser::new();
        let frames = parser.feed(": keep-alive\n\ndata: a\ndata: b\n\n");
        assert_eq!(
            frames,
            vec![
                SseFrame::Comment("keep-alive".into()),
                SseFrame::Event {
                    name: "message".into(),
                    data: "a\nb".into(),
                },
            ]
        );
    }

    #[test]
    fn blank_block_dispatches_nothing() {
        let mut parser = SseParser::new();
        assert!(parser.feed("event: orphan\n\n\n").is_empty());
        // The orphaned event name does not leak into the next block
        let frames = parser.feed("data: 1\n\n");
        assert_eq!(
            frames,
            vec![SseFrame::Event {
                name: "message".into(),
                data: "1".into(),
            }]
        );
    }
}
