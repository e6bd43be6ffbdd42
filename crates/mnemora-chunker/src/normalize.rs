use regex::Regex;
use std::sync::OnceLock;

fn cid_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\(cid:\d+\)").unwrap())
}

fn hyphen_linebreak_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(\w)-\n(\w)").unwrap())
}

fn whitespace_run_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"[ \t]+").unwrap())
}

fn blank_line_run_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\n{3,}").unwrap())
}

/// Repairs common PDF-extraction artifacts:
/// leftover `(cid:N)` glyph codes, common ligatures, and words split
/// across a line break by a hyphen.
pub fn repair_pdf_artifacts(text: &str) -> String {
    let no_cid = cid_pattern().replace_all(text, "");
    let de_ligatured = no_cid
        .replace('\u{FB01}', "fi")
        .replace('\u{FB02}', "fl")
        .replace('\u{FB00}', "ff")
        .replace('\u{FB03}', "ffi")
        .replace('\u{FB04}', "ffl");
    hyphen_linebreak_pattern()
        .replace_all(&de_ligatured, "$1$2")
        .into_owned()
}

/// Collapses runs of horizontal whitespace and excessive blank lines.
pub fn normalize_whitespace(text: &str) -> String {
    let collapsed_spaces = whitespace_run_pattern().replace_all(text, " ");
    let collapsed_blanks = blank_line_run_pattern().replace_all(&collapsed_spaces, "\n\n");
    collapsed_blanks
        .lines()
        .map(|line| line.trim_end())
        .collect::<Vec<_>>()
        .join("\n")
        .trim()
        .to_string()
}

const PLACEHOLDER_PREFIX: &str = "\u{0}MNEMORA_PROTECTED_";
const PLACEHOLDER_SUFFIX: &str = "\u{0}";

fn fenced_code_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?s)```.*?```").unwrap())
}

fn math_block_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?s)\$\$.*?\$\$|\$[^\$\n]+\$").unwrap())
}

fn citation_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\[\d+(?:,\s*\d+)*\]|\([A-Z][a-zA-Z]+(?:\s+(?:et al\.|&)\s+[A-Z][a-zA-Z]+)?,\s*\d{4}\)").unwrap())
}

/// Shields math blocks, fenced code, and citation-like patterns with
/// reversible placeholders before whitespace cleanup runs over them, so cleanup cannot mangle formula/code syntax or citation
/// punctuation.
pub struct Protector {
    captured: Vec<String>,
}

impl Protector {
    pub fn new() -> Self {
        Self { captured: Vec::new() }
    }

    pub fn protect(&mut self, text: &str) -> String {
        let mut out = text.to_string();
        for pattern in [fenced_code_pattern(), math_block_pattern(), citation_pattern()] {
            out = self.protect_pattern(&out, pattern);
        }
        out
    }

    fn protect_pattern(&mut self, text: &str, pattern: &Regex) -> String {
        let mut result = String::with_capacity(text.len());
        let mut last = 0;
        for m in pattern.find_iter(text) {
            result.push_str(&text[last..m.start()]);
            let index = self.captured.len();
            self.captured.push(m.as_str().to_string());
            result.push_str(&format!("{PLACEHOLDER_PREFIX}{index}{PLACEHOLDER_SUFFIX}"));
            last = m.end();
        }
        result.push_str(&text[last..]);
        result
    }

    pub fn restore(&self, text: &str) -> String {
        let placeholder = Regex::new(r"\u{0}MNEMORA_PROTECTED_(\d+)\u{0}").unwrap();
        placeholder
            .replace_all(text, |caps: &regex::Captures| {
                let idx: usize = caps[1].parse().unwrap_or(usize::MAX);
                self.captured.get(idx).cloned().unwrap_or_default()
            })
            .into_owned()
    }
}

impl Default for Protector {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn repairs_hyphenated_line_break_and_cid_codes() {
        let text = "inter-\nnational (cid:12) travel";
        let repaired = repair_pdf_artifacts(text);
        assert_eq!(repaired, "international  travel");
    }

    #[test]
    fn normalizes_runs_of_whitespace_and_blank_lines() {
        let text = "a   b\n\n\n\nc";
        assert_eq!(normalize_whitespace(text), "a b\n\nc");
    }

    #[test]
    fn protects_and_restores_fenced_code_unmangled() {
        let mut protector = Protector::new();
        let text = "see ```let x =   1;``` above";
        let protected = protector.protect(text);
        assert!(!protected.contains("```"));
        let cleaned = normalize_whitespace(&protected);
        let restored = protector.restore(&cleaned);
        assert!(restored.contains("let x =   1;"));
    }

    #[test]
    fn protects_citation_patterns() {
        let mut protector = Protector::new();
        let text = "as shown (Smith, 2020) and [3, 4]";
        let protected = protector.protect(text);
        assert!(!protected.contains("Smith"));
        let restored = protector.restore(&protected);
        assert_eq!(restored, text);
    }
}
