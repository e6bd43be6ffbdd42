/// Events emitted while streaming a chat-completion response.
#[derive(Debug, Clone)]
pub enum StreamEvent {
    /// Incremental text content from the model.
    TextDelta { text: String },
    /// Stream completed successfully.
    Done,
    /// Error during streaming; terminal.
    Error { message: String },
}

/// Parse a single SSE line. SSE frames are `event: <type>\ndata: <json>\n\n`;
/// most providers only emit the `data:` line, some (Anthropic) also emit
/// `event:`.
pub fn parse_sse_line(line: &str) -> Option<SseParsed> {
    if let Some(event_type) = line.strip_prefix("event: ") {
        Some(SseParsed::Event(event_type.to_string()))
    } else {
        line.strip_prefix("data: ")
            .or_else(|| line.strip_prefix("data:"))
            .map(|data| SseParsed::Data(data.trim().to_string()))
    }
}

#[derive(Debug)]
pub enum SseParsed {
    Event(String),
    Data(String),
}

/// Incrementally feeds raw bytes into line-buffered SSE frames.
///
/// Providers stream arbitrary byte chunks that don't respect line boundaries;
/// this accumulates a remainder across calls the same way the provider
/// implementations in this crate do.
#[derive(Default)]
pub struct SseLineBuffer {
    buf: String,
}

impl SseLineBuffer {
    pub fn push(&mut self, chunk: &[u8]) -> Vec<String> {
        let Ok(text) = std::str::from_utf8(chunk) else {
            return Vec::new();
        };
        self.buf.push_str(text);
        let mut lines: Vec<&str> = self.buf.split('\n').collect();
        let remainder = lines.pop().unwrap_or_default().to_string();
        let complete: Vec<String> = lines.into_iter().map(|l| l.to_string()).collect();
        self.buf = remainder;
        complete
    }
}
