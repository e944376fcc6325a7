//! Prompt templates for the chat-backend classification strategy.
//!
//! One immutable template per source-type variant. Adding a source type is a
//! variant addition in [`SourceType`], not a string comparison here.

use crate::models::{IngestionEnvelope, SourceType};

/// A rendered prompt: fixed system instruction plus interpolated human turn.
#[derive(Debug, Clone)]
pub struct Prompt {
    pub system: &'static str,
    pub user: String,
}

const TELEGRAM_SYSTEM: &str = "\
You are an intelligent assistant analyzing messages from student Telegram chats.
Your goal is to extract important information and categorize the message.
Determine the category: 'announcement', 'deadline', 'link', or 'other'.
Rate importance from 0 to 10.
Summarize the content briefly in Russian.
Extract any links and deadlines found. Dates use DD.MM.YYYY format.
If the message describes a course task (assignment, lab, exam), provide a short
task_title, task_type ('one_time' or 'periodic') and an action:
'new', 'update', 'cancel', 'completed' or 'info'.
Output a single JSON object:
{
    \"category\": \"...\",
    \"importance_score\": 0,
    \"summary\": \"...\",
    \"extracted_links\": [\"url1\"],
    \"extracted_deadlines\": [{\"date\": \"DD.MM.YYYY\", \"description\": \"...\"}],
    \"task_title\": \"...\",
    \"task_type\": \"one_time\",
    \"action\": \"info\"
}";

const WEB_SCHEDULE_SYSTEM: &str = "\
You are an intelligent assistant analyzing a schedule from a web page.
Extract the schedule details: lectures, deadlines, links.
Summarize briefly in Russian and rate importance from 0 to 10.
Output a single JSON object with keys: category, importance_score, summary,
extracted_links, extracted_deadlines.";

const GENERIC_SYSTEM: &str = "\
Analyze the following text and summarize it briefly in Russian.
Output a single JSON object with keys: category, importance_score, summary,
extracted_links, extracted_deadlines.";

/// Select and render the template for an envelope.
pub fn build_prompt(envelope: &IngestionEnvelope) -> Prompt {
    match envelope.source_type {
        SourceType::Telegram => Prompt {
            system: TELEGRAM_SYSTEM,
            user: format!(
                "Sender Role: {}\nChat: {}\nMessage: {}",
                envelope.metadata.sender_role.as_str(),
                envelope.metadata.chat_title.as_deref().unwrap_or("Private"),
                envelope.text
            ),
        },
        SourceType::WebSchedule => Prompt {
            system: WEB_SCHEDULE_SYSTEM,
            user: format!("Content: {}", envelope.text),
        },
        SourceType::Generic => Prompt {
            system: GENERIC_SYSTEM,
            user: envelope.text.clone(),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{EnvelopeMetadata, SenderRole};

    fn envelope(source_type: SourceType) -> IngestionEnvelope {
        IngestionEnvelope {
            text: "Сдать лабу до пятницы".to_string(),
            source_type,
            source_id: "42".to_string(),
            metadata: EnvelopeMetadata {
                sender_role: SenderRole::Teacher,
                chat_title: Some("Матанализ".to_string()),
                ..Default::default()
            },
        }
    }

    #[test]
    fn test_template_selection() {
        let p = build_prompt(&envelope(SourceType::Telegram));
        assert!(p.system.contains("student Telegram chats"));
        assert!(p.user.contains("Sender Role: teacher"));
        assert!(p.user.contains("Матанализ"));

        let p = build_prompt(&envelope(SourceType::WebSchedule));
        assert!(p.system.contains("analyzing a schedule"));
        assert!(p.user.starts_with("Content:"));

        let p = build_prompt(&envelope(SourceType::Generic));
        assert!(p.system.contains("summarize"));
        assert_eq!(p.user, "Сдать лабу до пятницы");
    }
}
