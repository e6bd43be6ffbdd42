use sha2::{Digest, Sha256};

use crate::boundaries::segment;
use crate::error::Result;
use crate::extract::extract_text;
use crate::normalize::{normalize_whitespace, repair_pdf_artifacts, Protector};
use crate::refine::{density, merge_small_segments, split_down};
use crate::tags::extract_tags;
use crate::types::Chunk;

const MAX_TAGS: usize = 3;

/// Converts raw file bytes into an ordered list of semantically bounded
/// chunks with extracted tags. The pipeline: extract,
/// repair, protect, detect boundaries, segment, refine (merge/split-down),
/// then tag each resulting chunk.
pub fn chunk_file(bytes: &[u8], ext: &str) -> Result<Vec<Chunk>> {
    let raw = extract_text(bytes, ext)?;
    let repaired = repair_pdf_artifacts(&raw);

    let mut protector = Protector::new();
    let protected = protector.protect(&repaired);
    let cleaned = normalize_whitespace(&protected);

    let segments = merge_small_segments(segment(&cleaned));

    let mut chunks = Vec::new();
    for seg in segments {
        let restored = protector.restore(&seg.text);
        for piece in split_down(&restored) {
            if piece.trim().is_empty() {
                continue;
            }
            let tags = extract_tags(&piece, &piece, MAX_TAGS);
            let title = seg.boundary_type.map(|_| first_line(&piece));
            chunks.push(Chunk {
                chunk_id: chunk_id(&piece, chunks.len()),
                density: density(&piece),
                text: piece,
                tags,
                title,
            });
        }
    }

    Ok(chunks)
}

fn first_line(text: &str) -> String {
    text.lines().next().unwrap_or_default().chars().take(80).collect()
}

fn chunk_id(text: &str, index: usize) -> String {
    let mut hasher = Sha256::new();
    hasher.update(text.as_bytes());
    hasher.update(index.to_le_bytes());
    format!("chunk_{}", hex::encode(&hasher.finalize()[..8]))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chunks_plain_text_with_headings() {
        let text = b"1. Introduction\n\nThis section introduces the topic in a short paragraph.\n\n2. Background\n\nThis section covers background details at some length to exercise splitting logic across more than one sentence boundary, repeated here for length. This section covers background details at some length to exercise splitting logic across more than one sentence boundary, repeated here for length.";
        let chunks = chunk_file(text, "txt").unwrap();
        assert!(!chunks.is_empty());
        for c in &chunks {
            assert!(!c.chunk_id.is_empty());
        }
    }

    #[test]
    fn protects_math_and_code_through_the_pipeline() {
        let text = b"Explanation of the formula. $$E = mc^2$$ Then some code: ```fn f() { 1 }``` and more text to pad this out above the minimum chunk size threshold so it is not merged away entirely.";
        let chunks = chunk_file(text, "txt").unwrap();
        let combined: String = chunks.iter().map(|c| c.text.clone()).collect::<Vec<_>>().join(" ");
        assert!(combined.contains("E = mc^2"));
        assert!(combined.contains("fn f() { 1 }"));
    }

    #[test]
    fn empty_input_yields_no_chunks() {
        let chunks = chunk_file(b"", "txt").unwrap();
        assert!(chunks.is_empty());
    }

    #[test]
    fn unsupported_extension_errors() {
        assert!(chunk_file(b"data", "exe").is_err());
    }
}
