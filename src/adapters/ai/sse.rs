//! Incremental Server-Sent-Events parsing.
//!
//! Network chunks split SSE frames at arbitrary byte boundaries, so the
//! parser buffers partial lines between `push` calls and only yields
//! complete events.

/// One parsed SSE event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SseEvent {
    /// Value of the `event:` field, when present.
    pub event: Option<String>,
    /// Concatenated `data:` payload.
    pub data: String,
}

/// Buffering SSE parser.
#[derive(Debug, Default)]
pub struct SseParser {
    buffer: String,
    current_event: Option<String>,
    current_data: Vec<String>,
}

impl SseParser {
    /// Creates an empty parser.
    pub fn new() -> Self {
        Self::default()
    }

    /// Feeds raw bytes; returns every event completed by this chunk.
    pub fn push(&mut self, bytes: &[u8]) -> Vec<SseEvent> {
        self.buffer.push_str(&String::from_utf8_lossy(bytes));

        let mut events = Vec::new();
        while let Some(newline) = self.buffer.find('\n') {
            let line: String = self.buffer.drain(..=newline).collect();
            let line = line.trim_end_matches(['\n', '\r']);

            if line.is_empty() {
                // Blank line terminates the event.
                if !self.current_data.is_empty() || self.current_event.is_some() {
                    events.push(SseEvent {
                        event: self.current_event.take(),
                        data: self.current_data.drain(..).collect::<Vec<_>>().join("\n"),
                    });
                }
            } else if let Some(value) = line.strip_prefix("event:") {
                self.current_event = Some(value.trim_start().to_string());
            } else if let Some(value) = line.strip_prefix("data:") {
                self.current_data.push(value.trim_start().to_string());
            }
            // Comment lines and unknown fields are ignored.
        }
        events
    }

    /// Flushes a trailing event that was never terminated by a blank line.
    pub fn finish(&mut self) -> Option<SseEvent> {
        if self.current_data.is_empty() && self.current_event.is_none() {
            return None;
        }
        Some(SseEvent {
            event: self.current_event.take(),
            data: self.current_data.drain(..).collect::<Vec<_>>().join("\n"),
        })
    }
}
