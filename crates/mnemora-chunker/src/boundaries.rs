use std::sync::OnceLock;

use regex::Regex;

use crate::types::{BoundaryType, Segment};

fn numbered_heading_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?m)^(\d+(?:\.\d+)*)\.\s+\S").unwrap())
}

fn uppercase_header_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?m)^([A-Z][A-Z0-9 \-/&]{3,60})$").unwrap())
}

fn qa_marker_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?mi)^(Question|Solution|Answer)\s*:").unwrap())
}

fn list_item_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?m)^\s*(?:[-*•]|\d+[.)])\s+\S").unwrap())
}

/// One boundary hit: byte offset where a new segment should start, its kind,
/// and the heading depth (1 for `1.`, 2 for `1.1`, 0 otherwise).
struct BoundaryHit {
    offset: usize,
    kind: BoundaryType,
    level: u8,
}

/// Scans `text` for semantic boundary markers and returns them
/// in document order. Paragraph breaks (blank lines) are boundaries of last
/// resort, added only where no stronger boundary already starts a line.
fn detect_boundary_hits(text: &str) -> Vec<BoundaryHit> {
    let mut hits = Vec::new();

    for caps in numbered_heading_pattern().captures_iter(text) {
        let m = caps.get(0).unwrap();
        let level = caps[1].matches('.').count() as u8 + 1;
        hits.push(BoundaryHit { offset: m.start(), kind: BoundaryType::NumberedHeading, level });
    }
    for m in uppercase_header_pattern().find_iter(text) {
        hits.push(BoundaryHit { offset: m.start(), kind: BoundaryType::UppercaseHeader, level: 1 });
    }
    for m in qa_marker_pattern().find_iter(text) {
        hits.push(BoundaryHit { offset: m.start(), kind: BoundaryType::QaMarker, level: 1 });
    }
    for m in list_item_pattern().find_iter(text) {
        hits.push(BoundaryHit { offset: m.start(), kind: BoundaryType::ListItem, level: 1 });
    }

    let mut covered: Vec<usize> = hits.iter().map(|h| h.offset).collect();
    covered.sort_unstable();

    for (idx, _) in text.match_indices("\n\n") {
        let start = idx + 2;
        if start >= text.len() {
            continue;
        }
        let already_covered = covered.iter().any(|&c| c >= idx && c <= start + 1);
        if !already_covered {
            hits.push(BoundaryHit { offset: start, kind: BoundaryType::ParagraphBreak, level: 0 });
        }
    }

    hits.sort_by_key(|h| h.offset);
    hits
}

/// Splits `text` into initial segments at detected boundaries.
/// The text preceding the first boundary (if any) becomes its own untyped
/// segment so no leading content is dropped.
pub(crate) fn segment(text: &str) -> Vec<Segment> {
    if text.trim().is_empty() {
        return Vec::new();
    }

    let hits = detect_boundary_hits(text);
    let mut segments = Vec::new();
    let mut cursor = 0usize;

    for (i, hit) in hits.iter().enumerate() {
        if hit.offset < cursor {
            continue;
        }
        if hit.offset > cursor {
            let chunk = text[cursor..hit.offset].trim();
            if !chunk.is_empty() {
                let (boundary_type, level) = if i == 0 {
                    (None, 0)
                } else {
                    let prev = &hits[i - 1];
                    (Some(prev.kind), prev.level)
                };
                segments.push(Segment { text: chunk.to_string(), boundary_type, level });
            }
        }
        cursor = hit.offset;
    }

    let tail = text[cursor..].trim();
    if !tail.is_empty() {
        let (boundary_type, level) = hits
            .last()
            .map(|h| (Some(h.kind), h.level))
            .unwrap_or((None, 0));
        segments.push(Segment { text: tail.to_string(), boundary_type, level });
    }

    if segments.is_empty() {
        segments.push(Segment { text: text.trim().to_string(), boundary_type: None, level: 0 });
    }

    segments
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn splits_on_numbered_headings() {
        let text = "Intro text.\n\n1. First section body.\n\n1.1 Nested body.\n\n2. Second section body.";
        let segs = segment(text);
        assert!(segs.len() >= 3);
        assert!(segs.iter().any(|s| s.boundary_type == Some(BoundaryType::NumberedHeading) && s.level == 2));
    }

    #[test]
    fn splits_on_qa_markers() {
        let text = "Question: what is the capital?\n\nSolution: Paris is the capital.";
        let segs = segment(text);
        assert!(segs.iter().any(|s| s.boundary_type == Some(BoundaryType::QaMarker)));
    }

    #[test]
    fn empty_input_yields_no_segments() {
        assert!(segment("   \n\n  ").is_empty());
    }
}
