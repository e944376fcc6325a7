//! Source adapters producing ingestion envelopes.
//!
//! The transport bot is an external collaborator; what reaches this crate is
//! already an [`IngestionEnvelope`]. The adapters here cover the remaining
//! inputs: envelope JSON files and the mock web-schedule source used for
//! manual pipeline testing.

use anyhow::{Context, Result};
use chrono::Utc;
use std::path::Path;
use uuid::Uuid;

use crate::models::{EnvelopeMetadata, IngestionEnvelope, SourceType};

/// Parse one envelope or a JSON array of envelopes.
pub fn parse_envelopes(json: &str) -> Result<Vec<IngestionEnvelope>> {
    let trimmed = json.trim_start();
    if trimmed.starts_with('[') {
        Ok(serde_json::from_str(json).context("Failed to parse envelope array")?)
    } else {
        let envelope = serde_json::from_str(json).context("Failed to parse envelope")?;
        Ok(vec![envelope])
    }
}

/// Load envelopes from a JSON file.
pub fn load_envelopes(path: &Path) -> Result<Vec<IngestionEnvelope>> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read envelope file: {}", path.display()))?;
    parse_envelopes(&content)
}

/// Mock web-schedule envelope with static content, for manual testing.
pub fn web_stub_envelope() -> IngestionEnvelope {
    let sample_text = "Course schedule update: Lecture on Monday at 10:00. \
         Homework deadline: submit lab report by next Friday. \
         Resources: https://example.com/syllabus";

    let mut metadata = EnvelopeMetadata {
        timestamp: Some(Utc::now()),
        ..Default::default()
    };
    metadata.extra.insert(
        "source_name".to_string(),
        serde_json::Value::String("Mock Web Schedule".to_string()),
    );

    IngestionEnvelope {
        text: sample_text.to_string(),
        source_type: SourceType::WebSchedule,
        source_id: format!("web_stub:{}", Uuid::new_v4()),
        metadata,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::SenderRole;

    #[test]
    fn test_parse_single_envelope() {
        let json = r#"{
            "text": "Сдать лабу до 20.05",
            "source_type": "telegram",
            "source_id": "123",
            "metadata": {"sender_role": "teacher", "chat_id": "-100", "is_reply": false}
        }"#;
        let envelopes = parse_envelopes(json).unwrap();
        assert_eq!(envelopes.len(), 1);
        assert_eq!(envelopes[0].source_type, SourceType::Telegram);
        assert_eq!(envelopes[0].metadata.sender_role, SenderRole::Teacher);
        assert_eq!(envelopes[0].metadata.chat_id.as_deref(), Some("-100"));
    }

    #[test]
    fn test_parse_array_and_unknown_fields() {
        let json = r#"[
            {"text": "a", "source_type": "telegram", "source_id": "1"},
            {"text": "b", "source_type": "somewhere_new", "source_id": "2",
             "metadata": {"sender_role": "alien", "custom_key": 7}}
        ]"#;
        let envelopes = parse_envelopes(json).unwrap();
        assert_eq!(envelopes.len(), 2);
        // unknown source types and roles degrade, they do not fail
        assert_eq!(envelopes[1].source_type, SourceType::Generic);
        assert_eq!(envelopes[1].metadata.sender_role, SenderRole::Unknown);
        assert!(envelopes[1].metadata.extra.contains_key("custom_key"));
    }

    #[test]
    fn test_web_stub_envelope() {
        let envelope = web_stub_envelope();
        assert_eq!(envelope.source_type, SourceType::WebSchedule);
        assert!(envelope.source_id.starts_with("web_stub:"));
        assert!(envelope.text.contains("https://example.com/syllabus"));
    }

    #[test]
    fn test_web_stub_classifies_heuristically() {
        let envelope = web_stub_envelope();
        let result = crate::heuristics::classify(&envelope.text, SenderRole::Unknown);
        // the stub's "by next Friday" must surface as a relative deadline,
        // not drop through to the keyword-only fallback
        assert_eq!(result.extracted_deadlines.len(), 1);
        assert_eq!(result.extracted_deadlines[0].date, "relative: next friday");
        assert_eq!(result.extracted_links, vec!["https://example.com/syllabus"]);
    }
}
