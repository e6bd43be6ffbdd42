use mnemora_core::types::Dialogue;

/// Builds the structured transformation prompt for one dialogue window
///. The model is obliged to cover every line of dialogue with no
/// loss, resolve every pronoun, convert relative time references to
/// absolute ISO-8601 timestamps anchored on the dialogue timestamps, and
/// extract keywords/persons/entities/location/topic.
pub fn build_window_prompt(window: &[Dialogue], previous_restatements: &[String]) -> String {
    let mut dialogue_lines = String::new();
    for d in window {
        let ts = d
            .timestamp
            .map(|t| t.to_rfc3339())
            .unwrap_or_else(|| "unknown".to_string());
        dialogue_lines.push_str(&format!("[{ts}] {}: {}\n", d.speaker, d.content));
    }

    let mut previous_section = String::new();
    if !previous_restatements.is_empty() {
        previous_section.push_str("\nPrevious entries already recorded for this agent (avoid duplicating these):\n");
        for p in previous_restatements {
            previous_section.push_str(&format!("- {p}\n"));
        }
    }

    format!(
        "You are converting a window of dialogue into atomic memory entries.\n\
         Cover every piece of information in the dialogue below with no loss.\n\
         Resolve every pronoun to the full name/entity it refers to. Convert every\n\
         relative time expression (\"tomorrow\", \"next week\", \"yesterday\", etc.) into\n\
         an absolute ISO-8601 timestamp using the dialogue timestamps below as anchors.\n\
         Do not use the words he, she, it, they, this, that, yesterday, today, or tomorrow\n\
         anywhere in a restatement.\n\
         {previous_section}\n\
         Dialogue window:\n{dialogue_lines}\n\
         Respond with ONLY a JSON array of entry objects, each shaped as:\n\
         {{\"lossless_restatement\": string, \"keywords\": [string], \"timestamp\": string|null,\n\
         \"location\": string|null, \"topic\": string|null, \"persons\": [string],\n\
         \"entities\": [string], \"memory_type\": \"episodic\"|\"semantic\"|\"procedural\"|\"working\"}}\n"
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prompt_includes_dialogue_and_previous_context() {
        let window = vec![Dialogue::new("Alice", "Bob, let's meet tomorrow")];
        let prompt = build_window_prompt(&window, &["Alice met Bob before".to_string()]);
        assert!(prompt.contains("Alice, let's meet tomorrow") || prompt.contains("Bob, let's meet tomorrow"));
        assert!(prompt.contains("Alice met Bob before"));
        assert!(prompt.contains("pronoun"));
    }
}
