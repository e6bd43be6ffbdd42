/// Strips the `<|end|>` hygiene token and truncates at `[END FINAL RESPONSE]`
/// from an incrementally-arriving text stream.
///
/// Both markers can legally straddle two adjacent stream fragments, so a
/// short tail of unflushed text is always held back until enough new input
/// has arrived to prove it isn't the start of a marker.
pub struct MarkerFilter {
    buf: String,
}

const MARKER: &str = "[END FINAL RESPONSE]";
const END_TOKEN: &str = "<|end|>";

pub enum FilterOutcome {
    /// Safe-to-emit text; may be empty if nothing could be flushed yet.
    Fragment(String),
    /// The terminating marker was found; this is the last fragment to emit
    /// before the stream ends.
    Done(String),
}

impl MarkerFilter {
    pub fn new() -> Self {
        Self { buf: String::new() }
    }

    pub fn push(&mut self, text: &str) -> FilterOutcome {
        self.buf.push_str(text);
        self.strip_end_tokens();

        if let Some(idx) = self.buf.find(MARKER) {
            let out = self.buf[..idx].to_string();
            self.buf.clear();
            return FilterOutcome::Done(out);
        }

        let hold = MARKER.len().saturating_sub(1);
        let total_chars = self.buf.chars().count();
        if total_chars > hold {
            let flush_upto = char_boundary_from_end(&self.buf, hold);
            let out = self.buf[..flush_upto].to_string();
            self.buf.drain(..flush_upto);
            FilterOutcome::Fragment(out)
        } else {
            FilterOutcome::Fragment(String::new())
        }
    }

    /// Flush whatever remains once the upstream source has closed.
    pub fn finish(&mut self) -> String {
        self.strip_end_tokens();
        if let Some(idx) = self.buf.find(MARKER) {
            let out = self.buf[..idx].to_string();
            self.buf.clear();
            return out;
        }
        std::mem::take(&mut self.buf)
    }

    fn strip_end_tokens(&mut self) {
        while let Some(idx) = self.buf.find(END_TOKEN) {
            self.buf.replace_range(idx..idx + END_TOKEN.len(), "");
        }
    }
}

impl Default for MarkerFilter {
    fn default() -> Self {
        Self::new()
    }
}

/// Byte offset that leaves exactly `hold_chars` trailing chars unflushed.
fn char_boundary_from_end(s: &str, hold_chars: usize) -> usize {
    let total = s.chars().count();
    if total <= hold_chars {
        return 0;
    }
    let flush_chars = total - hold_chars;
    s.char_indices()
        .nth(flush_chars)
        .map(|(i, _)| i)
        .unwrap_or(s.len())
}

/// Return the suffix after the first `</think>`, else the original text.
pub fn extract_after_think(text: &str) -> &str {
    match text.find("</think>") {
        Some(idx) => &text[idx + "</think>".len()..],
        None => text,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_end_token_within_one_fragment() {
        let mut f = MarkerFilter::new();
        let out = f.push("hello <|end|>world");
        match out {
            FilterOutcome::Fragment(s) => assert_eq!(s, ""),
            FilterOutcome::Done(_) => panic!("unexpected done"),
        }
        let rest = f.finish();
        assert_eq!(rest, "hello world");
    }

    #[test]
    fn truncates_at_marker_and_discards_suffix() {
        let mut f = MarkerFilter::new();
        let _ = f.push("Hello ");
        let _ = f.push("world ");
        match f.push("[END FINAL RESPONSE] trailing garbage") {
            FilterOutcome::Done(s) => assert_eq!(s.trim_end(), "Hello world"),
            FilterOutcome::Fragment(_) => panic!("expected done"),
        }
    }

    #[test]
    fn marker_split_across_fragments_is_still_caught() {
        let mut f = MarkerFilter::new();
        let _ = f.push("answer text [END FINAL ");
        match f.push("RESPONSE] more") {
            FilterOutcome::Done(s) => assert_eq!(s, "answer text "),
            FilterOutcome::Fragment(_) => panic!("expected done"),
        }
    }

    #[test]
    fn extract_after_think_returns_suffix() {
        assert_eq!(extract_after_think("reasoning...</think>final"), "final");
        assert_eq!(extract_after_think("no marker here"), "no marker here");
    }
}
