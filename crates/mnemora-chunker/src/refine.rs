use std::sync::OnceLock;

use regex::Regex;

use crate::types::Segment;

pub(crate) const MIN_CHUNK_SIZE: usize = 100;
pub(crate) const MAX_CHUNK_SIZE: usize = 800;
pub(crate) const DENSITY_THRESHOLD: f32 = 3.0;
pub(crate) const TARGET_CHUNK_SIZE: usize = 500;
pub(crate) const OVERLAP: usize = 50;

fn technical_indicator_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"[=+\-*/^%<>]|\b\d+(?:\.\d+)?\b|\$[^$\n]+\$|[A-Z]{2,}\(|\\[a-zA-Z]+").unwrap()
    })
}

fn sentence_end_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"[.!?]+\s+").unwrap())
}

/// Splits on sentence-ending punctuation, keeping the punctuation attached
/// to the sentence it closes (the `regex` crate has no lookbehind, so this
/// walks match boundaries instead of using a lookbehind split).
fn split_sentences(text: &str) -> Vec<&str> {
    let mut out = Vec::new();
    let mut last = 0usize;
    for m in sentence_end_pattern().find_iter(text) {
        out.push(text[last..m.end()].trim());
        last = m.end();
    }
    if last < text.len() {
        out.push(text[last..].trim());
    }
    out.into_iter().filter(|s| !s.is_empty()).collect()
}

/// Technical-indicator density per 100 chars: the refinement
/// trigger for splitting dense, symbol-heavy segments (equations, code,
/// tables) even when they fall under `MAX_CHUNK_SIZE`.
pub(crate) fn density(text: &str) -> f32 {
    if text.is_empty() {
        return 0.0;
    }
    let hits = technical_indicator_pattern().find_iter(text).count() as f32;
    hits / (text.len() as f32 / 100.0)
}

/// Merges adjacent segments while the running segment stays under
/// `MIN_CHUNK_SIZE` and the boundary between them is not a heading (merging
/// across a heading would blend two topics).
pub(crate) fn merge_small_segments(segments: Vec<Segment>) -> Vec<Segment> {
    let mut merged: Vec<Segment> = Vec::new();
    for seg in segments {
        if let Some(last) = merged.last_mut() {
            let compatible = !matches!(
                seg.boundary_type,
                Some(crate::types::BoundaryType::NumberedHeading | crate::types::BoundaryType::UppercaseHeader)
            );
            if last.text.len() < MIN_CHUNK_SIZE && compatible {
                last.text.push('\n');
                last.text.push_str(&seg.text);
                continue;
            }
        }
        merged.push(seg);
    }
    merged
}

/// Splits a segment that is too long or too dense, cascading through
/// sentence boundaries, then clause (comma) boundaries, then a hard
/// character cut.
pub(crate) fn split_down(text: &str) -> Vec<String> {
    if text.len() <= MAX_CHUNK_SIZE && density(text) <= DENSITY_THRESHOLD {
        return vec![text.to_string()];
    }

    let sentences: Vec<&str> = split_sentences(text);
    if sentences.len() > 1 {
        return pack_pieces(&sentences, TARGET_CHUNK_SIZE)
            .into_iter()
            .flat_map(|piece| split_down_if_needed(&piece))
            .collect();
    }

    let clauses: Vec<&str> = text.split(", ").collect();
    if clauses.len() > 1 {
        return pack_pieces(&clauses, TARGET_CHUNK_SIZE)
            .into_iter()
            .flat_map(|piece| split_down_if_needed(&piece))
            .collect();
    }

    hard_cut(text, MAX_CHUNK_SIZE)
}

fn split_down_if_needed(piece: &str) -> Vec<String> {
    if piece.len() > MAX_CHUNK_SIZE {
        hard_cut(piece, MAX_CHUNK_SIZE)
    } else {
        vec![piece.to_string()]
    }
}

fn pack_pieces(pieces: &[&str], target: usize) -> Vec<String> {
    let mut out = Vec::new();
    let mut current = String::new();
    for piece in pieces {
        if !current.is_empty() && current.len() + piece.len() + 1 > target {
            out.push(current.trim().to_string());
            current.clear();
        }
        if !current.is_empty() {
            current.push(' ');
        }
        current.push_str(piece);
    }
    if !current.trim().is_empty() {
        out.push(current.trim().to_string());
    }
    out
}

fn hard_cut(text: &str, max_len: usize) -> Vec<String> {
    let chars: Vec<char> = text.chars().collect();
    if chars.len() <= max_len {
        return vec![text.to_string()];
    }
    let mut out = Vec::new();
    let mut start = 0usize;
    while start < chars.len() {
        let end = (start + max_len).min(chars.len());
        out.push(chars[start..end].iter().collect());
        if end >= chars.len() {
            break;
        }
        start = end.saturating_sub(OVERLAP);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::BoundaryType;

    #[test]
    fn merges_short_segments_until_min_size() {
        let segs = vec![
            Segment { text: "a".repeat(20), boundary_type: None, level: 0 },
            Segment { text: "b".repeat(20), boundary_type: None, level: 0 },
            Segment { text: "c".repeat(20), boundary_type: None, level: 0 },
        ];
        let merged = merge_small_segments(segs);
        assert_eq!(merged.len(), 1);
        assert!(merged[0].text.len() >= MIN_CHUNK_SIZE);
    }

    #[test]
    fn does_not_merge_across_heading_boundary() {
        let segs = vec![
            Segment { text: "short".to_string(), boundary_type: None, level: 0 },
            Segment {
                text: "heading body".to_string(),
                boundary_type: Some(BoundaryType::NumberedHeading),
                level: 1,
            },
        ];
        let merged = merge_small_segments(segs);
        assert_eq!(merged.len(), 2);
    }

    #[test]
    fn splits_long_text_at_sentence_boundaries() {
        let sentence = "This is a reasonably long sentence about nothing in particular. ";
        let text = sentence.repeat(20);
        let pieces = split_down(&text);
        assert!(pieces.len() > 1);
        for piece in &pieces {
            assert!(piece.len() <= MAX_CHUNK_SIZE + OVERLAP);
        }
    }

    #[test]
    fn short_plain_text_is_not_split() {
        let pieces = split_down("a short piece of text");
        assert_eq!(pieces.len(), 1);
    }

    #[test]
    fn dense_short_text_is_split_even_under_max_size() {
        let dense = "x=1+2-3*4/5^6 ".repeat(10);
        assert!(density(&dense) > DENSITY_THRESHOLD);
    }
}
