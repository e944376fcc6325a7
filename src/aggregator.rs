//! Task aggregation: deciding what a classified message does to the
//! knowledge base.
//!
//! One normalized result either creates a new course task, updates an
//! existing one, or attaches as a plain fact. Replies inherit their parent's
//! task deterministically; everything else is matched semantically. All
//! writes are idempotent under redelivery — the storage dedupe keys, not
//! locks, are the correctness backstop.

use anyhow::Result;
use serde_json::json;
use sqlx::SqlitePool;
use std::sync::Arc;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::models::{
    ActionKind, Category, ClassificationResult, CourseTask, EntryType, IngestionEnvelope,
    TaskStatus,
};
use crate::similarity::SimilarityIndex;
use crate::store;

/// Minimum similarity for a search hit to count as the same task.
pub const SIMILARITY_THRESHOLD: f32 = 0.82;

/// Synthesized-title limit for announcement-derived tasks.
const TITLE_LIMIT: usize = 50;

/// What one aggregation round did.
#[derive(Debug, Default)]
pub struct AggregationOutcome {
    pub task_id: Option<String>,
    pub created_task: bool,
    pub entries_created: u64,
}

pub struct TaskAggregator {
    pool: SqlitePool,
    index: Arc<dyn SimilarityIndex>,
}

impl TaskAggregator {
    pub fn new(pool: SqlitePool, index: Arc<dyn SimilarityIndex>) -> Self {
        Self { pool, index }
    }

    /// Run the aggregation state machine for one classified envelope.
    ///
    /// `message_id` is the stored row for `envelope` (see
    /// [`store::upsert_message`]).
    pub async fn process(
        &self,
        message_id: &str,
        envelope: &IngestionEnvelope,
        result: &ClassificationResult,
    ) -> Result<AggregationOutcome> {
        let mut outcome = AggregationOutcome::default();

        // 1. Latest classification, replace-on-reprocess
        store::upsert_analysis(&self.pool, message_id, result).await?;

        // 2. A result with no title never creates or matches a task
        let title = derive_title(result);

        // 3. Replies inherit their parent's task instead of being re-matched
        let inherited = self.inherited_task(envelope).await?;

        let mut target_task_id = inherited.clone();

        if target_task_id.is_none() {
            if let Some(title) = &title {
                let query = format!("{} {}", title, result.summary);

                // 4. Semantic match against known tasks
                target_task_id = self.match_existing(&query, result).await?;

                // 5. No match — create, then publish the vector. The gap
                // between insert and upsert stays narrow: a concurrent
                // duplicate is an accepted soft failure, visible as two
                // tasks rather than corrupted state.
                if target_task_id.is_none() {
                    let task_id = self.create_task(title, result, &query).await?;
                    outcome.created_task = true;
                    target_task_id = Some(task_id);
                }
            }
        }

        // 6. Primary knowledge entry
        if !result.summary.is_empty() {
            let entry_type = match result.category {
                Category::Deadline => EntryType::Deadline,
                Category::Link => EntryType::Link,
                _ if envelope.metadata.is_reply && target_task_id.is_none() => {
                    EntryType::Explanation
                }
                _ => EntryType::Generic,
            };
            let extra = json!({
                "links": result.extracted_links,
                "deadlines": result.extracted_deadlines,
                "action": result.action.as_str(),
            });
            if store::get_or_create_entry(
                &self.pool,
                message_id,
                target_task_id.as_deref(),
                entry_type,
                &result.summary,
                &extra,
            )
            .await?
            {
                outcome.entries_created += 1;
            }
        }

        // 7. Fact entries, idempotent under redelivery
        for link in &result.extracted_links {
            if store::get_or_create_entry(
                &self.pool,
                message_id,
                target_task_id.as_deref(),
                EntryType::Link,
                link,
                &json!({}),
            )
            .await?
            {
                outcome.entries_created += 1;
            }
        }

        for deadline in &result.extracted_deadlines {
            let content = match (deadline.date.is_empty(), deadline.description.is_empty()) {
                (false, false) => format!("{} - {}", deadline.date, deadline.description),
                (false, true) => deadline.date.clone(),
                (true, false) => deadline.description.clone(),
                (true, true) => continue,
            };
            let extra = json!({ "date": deadline.date, "description": deadline.description });
            if store::get_or_create_entry(
                &self.pool,
                message_id,
                target_task_id.as_deref(),
                EntryType::Deadline,
                &content,
                &extra,
            )
            .await?
            {
                outcome.entries_created += 1;
            }
        }

        outcome.task_id = target_task_id;
        Ok(outcome)
    }

    /// Resolve the parent's task for a reply, if the parent has been
    /// processed already. Best-effort: out-of-order delivery across a reply
    /// chain just misses the inheritance.
    async fn inherited_task(&self, envelope: &IngestionEnvelope) -> Result<Option<String>> {
        if !envelope.metadata.is_reply {
            return Ok(None);
        }
        let Some(parent_source_id) = &envelope.metadata.reply_to_source_id else {
            return Ok(None);
        };

        let parent = store::find_message_id(
            &self.pool,
            envelope.source_type,
            parent_source_id,
            envelope.metadata.chat_id.as_deref(),
        )
        .await?;

        let Some(parent_id) = parent else {
            debug!(
                reply_to = %parent_source_id,
                "reply parent not stored yet, skipping context inheritance"
            );
            return Ok(None);
        };

        let task_id = store::find_task_for_message(&self.pool, &parent_id).await?;
        if let Some(task_id) = &task_id {
            info!(task_id = %task_id, "reply inherits parent's task");
        }
        Ok(task_id)
    }

    /// Search the similarity index and resolve hits to stored tasks.
    /// Hits whose key matches no task are index drift: logged and skipped.
    async fn match_existing(
        &self,
        query: &str,
        result: &ClassificationResult,
    ) -> Result<Option<String>> {
        let hits = match self.index.search(query, SIMILARITY_THRESHOLD).await {
            Ok(hits) => hits,
            Err(e) => {
                warn!(error = %e, "similarity search failed, treating as no match");
                return Ok(None);
            }
        };

        for hit in &hits {
            let Some(task) = store::find_task_by_similarity_key(&self.pool, &hit.key).await? else {
                warn!(
                    key = %hit.key,
                    score = hit.score,
                    "similarity hit resolves to no stored task, ignoring"
                );
                continue;
            };

            debug!(task_id = %task.id, score = hit.score, "matched existing task");

            let transition = match result.action {
                ActionKind::Cancel => Some(TaskStatus::Cancelled),
                ActionKind::Completed => Some(TaskStatus::Completed),
                _ => None,
            };
            if let Some(status) = transition {
                if store::update_task_status(&self.pool, &task.id, status).await? {
                    info!(task_id = %task.id, status = status.as_str(), "task status updated");
                } else {
                    debug!(task_id = %task.id, "task already terminal, status unchanged");
                }
            }

            return Ok(Some(task.id));
        }

        Ok(None)
    }

    async fn create_task(
        &self,
        title: &str,
        result: &ClassificationResult,
        index_text: &str,
    ) -> Result<String> {
        let now = chrono::Utc::now().timestamp();
        let task = CourseTask {
            id: Uuid::new_v4().to_string(),
            title: title.to_string(),
            description: result.summary.clone(),
            task_type: result.task_type,
            status: TaskStatus::Active,
            similarity_key: Uuid::new_v4().to_string(),
            created_at: now,
            updated_at: now,
        };

        store::insert_task(&self.pool, &task).await?;
        info!(task_id = %task.id, title = %task.title, "created course task");

        let payload = json!({ "task_id": task.id, "title": task.title });
        if let Err(e) = self
            .index
            .upsert(&task.similarity_key, index_text, payload)
            .await
        {
            // Soft failure: the task exists but carries no usable vector.
            // Future messages will not match it until a re-upsert happens.
            warn!(
                task_id = %task.id,
                error = %e,
                "similarity upsert failed, task persisted without vector"
            );
        }

        Ok(task.id)
    }
}

/// Derive the task title for a result, synthesizing one for significant
/// results the classifier left untitled.
pub fn derive_title(result: &ClassificationResult) -> Option<String> {
    if let Some(title) = &result.task_title {
        return Some(title.clone());
    }

    let significant = result.importance_score >= 4
        || matches!(result.category, Category::Deadline | Category::Announcement);
    if !significant {
        return None;
    }

    match result.category {
        Category::Deadline => Some(match result.extracted_deadlines.first() {
            Some(d) if !d.date.is_empty() => format!("Дедлайн {}", d.date),
            _ => "Дедлайн".to_string(),
        }),
        Category::Announcement => {
            let first_sentence = result
                .summary
                .split(['.', '\n'])
                .next()
                .unwrap_or("")
                .trim();
            if first_sentence.is_empty() {
                None
            } else {
                Some(truncate_chars(first_sentence, TITLE_LIMIT))
            }
        }
        Category::Link => Some("Полезная ссылка".to_string()),
        Category::Other => {
            if result.importance_score >= 6 {
                Some("Важное сообщение".to_string())
            } else {
                None
            }
        }
    }
}

fn truncate_chars(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        let mut t: String = s.chars().take(max).collect();
        t.push('…');
        t
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ActionKind, Deadline, TaskType};

    fn result(category: Category, score: i64) -> ClassificationResult {
        ClassificationResult {
            category,
            importance_score: score,
            task_title: None,
            task_type: TaskType::OneTime,
            action: ActionKind::Info,
            summary: "Сдать лабораторную работу номер три. Подробности в чате.".to_string(),
            extracted_links: Vec::new(),
            extracted_deadlines: Vec::new(),
        }
    }

    #[test]
    fn test_supplied_title_wins() {
        let mut r = result(Category::Other, 0);
        r.task_title = Some("Лаба 3".to_string());
        assert_eq!(derive_title(&r), Some("Лаба 3".to_string()));
    }

    #[test]
    fn test_deadline_title_uses_first_date() {
        let mut r = result(Category::Deadline, 8);
        r.extracted_deadlines = vec![
            Deadline {
                date: "20.05.2024".to_string(),
                description: "лаба".to_string(),
            },
            Deadline {
                date: "21.05.2024".to_string(),
                description: "отчёт".to_string(),
            },
        ];
        assert_eq!(derive_title(&r), Some("Дедлайн 20.05.2024".to_string()));
    }

    #[test]
    fn test_deadline_title_placeholder_without_date() {
        let r = result(Category::Deadline, 8);
        assert_eq!(derive_title(&r), Some("Дедлайн".to_string()));
    }

    #[test]
    fn test_announcement_title_first_sentence() {
        let r = result(Category::Announcement, 6);
        assert_eq!(
            derive_title(&r),
            Some("Сдать лабораторную работу номер три".to_string())
        );
    }

    #[test]
    fn test_announcement_title_truncated() {
        let mut r = result(Category::Announcement, 6);
        r.summary = "а".repeat(80);
        let title = derive_title(&r).unwrap();
        assert_eq!(title.chars().count(), TITLE_LIMIT + 1);
        assert!(title.ends_with('…'));
    }

    #[test]
    fn test_link_label() {
        let r = result(Category::Link, 5);
        assert_eq!(derive_title(&r), Some("Полезная ссылка".to_string()));
    }

    #[test]
    fn test_insignificant_has_no_title() {
        assert_eq!(derive_title(&result(Category::Other, 3)), None);
        assert_eq!(derive_title(&result(Category::Link, 3)), None);
    }

    #[test]
    fn test_other_needs_higher_score() {
        assert_eq!(derive_title(&result(Category::Other, 5)), None);
        assert_eq!(
            derive_title(&result(Category::Other, 6)),
            Some("Важное сообщение".to_string())
        );
    }
}
