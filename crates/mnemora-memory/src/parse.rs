use chrono::{DateTime, Utc};
use mnemora_core::types::MemoryType;
use serde::Deserialize;

#[derive(Debug, Deserialize)]
pub struct ParsedEntry {
    pub lossless_restatement: String,
    #[serde(default)]
    pub keywords: Vec<String>,
    #[serde(default)]
    pub timestamp: Option<DateTime<Utc>>,
    #[serde(default)]
    pub location: Option<String>,
    #[serde(default)]
    pub topic: Option<String>,
    #[serde(default)]
    pub persons: Vec<String>,
    #[serde(default)]
    pub entities: Vec<String>,
    #[serde(default)]
    pub memory_type: MemoryType,
}

/// Parses the model's JSON array response, tolerating a surrounding
/// markdown code fence (a common model quirk) by extracting the substring
/// between the first `[` and the last `]`.
pub fn parse_entries(raw: &str) -> Result<Vec<ParsedEntry>, String> {
    let trimmed = raw.trim();
    let start = trimmed.find('[').ok_or("no JSON array start found")?;
    let end = trimmed.rfind(']').ok_or("no JSON array end found")?;
    if end < start {
        return Err("malformed JSON array bounds".to_string());
    }
    let candidate = &trimmed[start..=end];
    serde_json::from_str(candidate).map_err(|e| e.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_plain_json_array() {
        let raw = r#"[{"lossless_restatement": "Alice proposed Starbucks to Bob", "keywords": ["Alice", "Bob"], "persons": ["Alice", "Bob"], "entities": [], "memory_type": "episodic"}]"#;
        let parsed = parse_entries(raw).unwrap();
        assert_eq!(parsed.len(), 1);
        assert_eq!(parsed[0].persons, vec!["Alice", "Bob"]);
    }

    #[test]
    fn tolerates_markdown_fence_wrapping() {
        let raw = "```json\n[{\"lossless_restatement\": \"x\"}]\n```";
        let parsed = parse_entries(raw).unwrap();
        assert_eq!(parsed.len(), 1);
    }

    #[test]
    fn rejects_non_array_text() {
        assert!(parse_entries("I cannot help with that.").is_err());
    }
}
