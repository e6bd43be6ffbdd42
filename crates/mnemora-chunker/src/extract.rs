use crate::error::{ChunkerError, Result};

/// Extracts raw text from file bytes by extension.
///
/// Binary-format parsing (real PDF/DOCX decoding) sits upstream of this
/// crate's contract — only the chunking pipeline is ours to own. `.pdf`
/// and `.docx` are therefore read as lossy UTF-8 here, on the assumption
/// that a dedicated extractor has already produced text bytes by the time
/// they reach `chunk_file`; `.txt` and `.csv` get a strict decode since
/// those formats are text-native.
pub fn extract_text(bytes: &[u8], ext: &str) -> Result<String> {
    let normalized_ext = ext.trim_start_matches('.').to_lowercase();
    match normalized_ext.as_str() {
        "txt" => String::from_utf8(bytes.to_vec())
            .map_err(|e| ChunkerError::InvalidEncoding(e.to_string())),
        "csv" => extract_csv(bytes),
        "pdf" | "docx" => Ok(String::from_utf8_lossy(bytes).into_owned()),
        other => Err(ChunkerError::UnsupportedExtension(other.to_string())),
    }
}

fn extract_csv(bytes: &[u8]) -> Result<String> {
    let text = String::from_utf8(bytes.to_vec())
        .map_err(|e| ChunkerError::InvalidEncoding(e.to_string()))?;
    let rows: Vec<String> = text
        .lines()
        .map(|line| line.split(',').collect::<Vec<_>>().join(" "))
        .collect();
    Ok(rows.join("\n"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn txt_round_trips_as_is() {
        let out = extract_text(b"hello world", "txt").unwrap();
        assert_eq!(out, "hello world");
    }

    #[test]
    fn csv_joins_fields_with_spaces() {
        let out = extract_text(b"a,b,c\nd,e,f", "csv").unwrap();
        assert_eq!(out, "a b c\nd e f");
    }

    #[test]
    fn unknown_extension_is_rejected() {
        assert!(extract_text(b"data", "exe").is_err());
    }
}
