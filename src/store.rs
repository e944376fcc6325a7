//! Persistence surface: messages, analysis results, course tasks, and
//! knowledge entries.
//!
//! Uniqueness constraints here are the correctness backstop under
//! at-least-once delivery: the message source identity, the 1:1 analysis
//! row, and the fact-entry dedupe key all make redelivered envelopes
//! converge instead of duplicating.

use anyhow::Result;
use sha2::{Digest, Sha256};
use sqlx::{Row, SqlitePool};
use uuid::Uuid;

use crate::models::{
    ClassificationResult, CourseTask, EntryType, IngestionEnvelope, KnowledgeEntry, SourceType,
    StoredMessage, TaskStatus, TaskType,
};

/// Upsert the raw envelope, keyed by `(source_type, source_id)`. Returns the
/// stable message id.
pub async fn upsert_message(pool: &SqlitePool, envelope: &IngestionEnvelope) -> Result<String> {
    let mut hasher = Sha256::new();
    hasher.update(envelope.source_type.as_str().as_bytes());
    hasher.update(envelope.source_id.as_bytes());
    hasher.update(envelope.text.as_bytes());
    let dedup_hash = format!("{:x}", hasher.finalize());

    let existing_id: Option<String> =
        sqlx::query_scalar("SELECT id FROM messages WHERE source_type = ? AND source_id = ?")
            .bind(envelope.source_type.as_str())
            .bind(&envelope.source_id)
            .fetch_optional(pool)
            .await?;

    let message_id = existing_id.unwrap_or_else(|| Uuid::new_v4().to_string());
    let sent_at = envelope
        .metadata
        .timestamp
        .map(|t| t.timestamp())
        .unwrap_or_else(|| chrono::Utc::now().timestamp());
    let metadata_json = serde_json::to_string(&envelope.metadata)?;

    sqlx::query(
        r#"
        INSERT INTO messages (id, source_type, source_id, chat_id, sender_role, is_reply,
                              reply_to_source_id, text, metadata_json, dedup_hash, sent_at)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        ON CONFLICT(source_type, source_id) DO UPDATE SET
            chat_id = excluded.chat_id,
            sender_role = excluded.sender_role,
            is_reply = excluded.is_reply,
            reply_to_source_id = excluded.reply_to_source_id,
            text = excluded.text,
            metadata_json = excluded.metadata_json,
            dedup_hash = excluded.dedup_hash,
            sent_at = excluded.sent_at
        "#,
    )
    .bind(&message_id)
    .bind(envelope.source_type.as_str())
    .bind(&envelope.source_id)
    .bind(&envelope.metadata.chat_id)
    .bind(envelope.metadata.sender_role.as_str())
    .bind(envelope.metadata.is_reply)
    .bind(&envelope.metadata.reply_to_source_id)
    .bind(&envelope.text)
    .bind(&metadata_json)
    .bind(&dedup_hash)
    .bind(sent_at)
    .execute(pool)
    .await?;

    Ok(message_id)
}

/// Replace-on-reprocess upsert of the latest classification for a message.
pub async fn upsert_analysis(
    pool: &SqlitePool,
    message_id: &str,
    result: &ClassificationResult,
) -> Result<()> {
    let now = chrono::Utc::now().timestamp();

    sqlx::query(
        r#"
        INSERT INTO analysis_results (id, message_id, category, importance_score, task_title,
                                      task_type, action, summary, links_json, deadlines_json,
                                      created_at)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        ON CONFLICT(message_id) DO UPDATE SET
            category = excluded.category,
            importance_score = excluded.importance_score,
            task_title = excluded.task_title,
            task_type = excluded.task_type,
            action = excluded.action,
            summary = excluded.summary,
            links_json = excluded.links_json,
            deadlines_json = excluded.deadlines_json,
            created_at = excluded.created_at
        "#,
    )
    .bind(Uuid::new_v4().to_string())
    .bind(message_id)
    .bind(result.category.as_str())
    .bind(result.importance_score)
    .bind(&result.task_title)
    .bind(result.task_type.as_str())
    .bind(result.action.as_str())
    .bind(&result.summary)
    .bind(serde_json::to_string(&result.extracted_links)?)
    .bind(serde_json::to_string(&result.extracted_deadlines)?)
    .bind(now)
    .execute(pool)
    .await?;

    Ok(())
}

pub async fn insert_task(pool: &SqlitePool, task: &CourseTask) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO course_tasks (id, title, description, task_type, status, similarity_key,
                                  created_at, updated_at)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(&task.id)
    .bind(&task.title)
    .bind(&task.description)
    .bind(task.task_type.as_str())
    .bind(task.status.as_str())
    .bind(&task.similarity_key)
    .bind(task.created_at)
    .bind(task.updated_at)
    .execute(pool)
    .await?;

    Ok(())
}

pub async fn get_task(pool: &SqlitePool, task_id: &str) -> Result<Option<CourseTask>> {
    let row = sqlx::query("SELECT * FROM course_tasks WHERE id = ?")
        .bind(task_id)
        .fetch_optional(pool)
        .await?;
    Ok(row.map(task_from_row).transpose()?)
}

pub async fn find_task_by_similarity_key(
    pool: &SqlitePool,
    key: &str,
) -> Result<Option<CourseTask>> {
    let row = sqlx::query("SELECT * FROM course_tasks WHERE similarity_key = ?")
        .bind(key)
        .fetch_optional(pool)
        .await?;
    Ok(row.map(task_from_row).transpose()?)
}

/// Transition a task's status. Completed and cancelled are terminal: a
/// transition out of them is refused and `false` is returned.
pub async fn update_task_status(
    pool: &SqlitePool,
    task_id: &str,
    status: TaskStatus,
) -> Result<bool> {
    let now = chrono::Utc::now().timestamp();
    let updated = sqlx::query(
        r#"
        UPDATE course_tasks SET status = ?, updated_at = ?
        WHERE id = ? AND status NOT IN ('completed', 'cancelled')
        "#,
    )
    .bind(status.as_str())
    .bind(now)
    .bind(task_id)
    .execute(pool)
    .await?;

    Ok(updated.rows_affected() > 0)
}

/// Get-or-create a knowledge entry under the dedupe key
/// `(message_id, entry_type, content, course_task_id)`. Returns `true` when
/// a new row was created.
pub async fn get_or_create_entry(
    pool: &SqlitePool,
    message_id: &str,
    course_task_id: Option<&str>,
    entry_type: EntryType,
    content: &str,
    extra: &serde_json::Value,
) -> Result<bool> {
    // IS handles the NULL task id; the COALESCE unique index is the backstop
    // against a concurrent insert between this check and ours.
    let existing: Option<String> = sqlx::query_scalar(
        r#"
        SELECT id FROM knowledge_entries
        WHERE message_id = ? AND entry_type = ? AND content = ? AND course_task_id IS ?
        "#,
    )
    .bind(message_id)
    .bind(entry_type.as_str())
    .bind(content)
    .bind(course_task_id)
    .fetch_optional(pool)
    .await?;

    if existing.is_some() {
        return Ok(false);
    }

    let now = chrono::Utc::now().timestamp();
    let inserted = sqlx::query(
        r#"
        INSERT OR IGNORE INTO knowledge_entries
            (id, message_id, course_task_id, entry_type, content, extra_json, created_at)
        VALUES (?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(Uuid::new_v4().to_string())
    .bind(message_id)
    .bind(course_task_id)
    .bind(entry_type.as_str())
    .bind(content)
    .bind(extra.to_string())
    .bind(now)
    .execute(pool)
    .await?;

    Ok(inserted.rows_affected() > 0)
}

/// Resolve the stored message id for a source reference within a chat.
pub async fn find_message_id(
    pool: &SqlitePool,
    source_type: SourceType,
    source_id: &str,
    chat_id: Option<&str>,
) -> Result<Option<String>> {
    let id = sqlx::query_scalar(
        "SELECT id FROM messages WHERE source_type = ? AND source_id = ? AND chat_id IS ?",
    )
    .bind(source_type.as_str())
    .bind(source_id)
    .bind(chat_id)
    .fetch_optional(pool)
    .await?;
    Ok(id)
}

/// Latest task a message's knowledge entries are attached to, if any.
pub async fn find_task_for_message(
    pool: &SqlitePool,
    message_id: &str,
) -> Result<Option<String>> {
    let task_id = sqlx::query_scalar(
        r#"
        SELECT course_task_id FROM knowledge_entries
        WHERE message_id = ? AND course_task_id IS NOT NULL
        ORDER BY created_at DESC, rowid DESC
        LIMIT 1
        "#,
    )
    .bind(message_id)
    .fetch_optional(pool)
    .await?;
    Ok(task_id)
}

pub async fn count_entries_for_message(pool: &SqlitePool, message_id: &str) -> Result<i64> {
    let count = sqlx::query_scalar("SELECT COUNT(*) FROM knowledge_entries WHERE message_id = ?")
        .bind(message_id)
        .fetch_one(pool)
        .await?;
    Ok(count)
}

/// All tasks with their entry counts, newest first.
pub async fn list_tasks(pool: &SqlitePool) -> Result<Vec<(CourseTask, i64)>> {
    let rows = sqlx::query(
        r#"
        SELECT t.*, (SELECT COUNT(*) FROM knowledge_entries e WHERE e.course_task_id = t.id)
               AS entry_count
        FROM course_tasks t
        ORDER BY t.created_at DESC
        "#,
    )
    .fetch_all(pool)
    .await?;

    rows.into_iter()
        .map(|row| {
            let count: i64 = row.get("entry_count");
            Ok((task_from_row(row)?, count))
        })
        .collect()
}

pub async fn list_entries_for_task(
    pool: &SqlitePool,
    task_id: &str,
) -> Result<Vec<KnowledgeEntry>> {
    let rows = sqlx::query(
        "SELECT * FROM knowledge_entries WHERE course_task_id = ? ORDER BY created_at, rowid",
    )
    .bind(task_id)
    .fetch_all(pool)
    .await?;

    rows.into_iter().map(entry_from_row).collect()
}

/// All stored envelopes in chronological order, for replay. Parents come
/// before replies, which context inheritance depends on.
pub async fn load_messages_chronological(pool: &SqlitePool) -> Result<Vec<StoredMessage>> {
    let rows = sqlx::query("SELECT * FROM messages ORDER BY sent_at, rowid")
        .fetch_all(pool)
        .await?;

    rows.into_iter()
        .map(|row| {
            let metadata_json: String = row.get("metadata_json");
            let source_type: String = row.get("source_type");
            Ok(StoredMessage {
                id: row.get("id"),
                envelope: IngestionEnvelope {
                    text: row.get("text"),
                    source_type: SourceType::parse(&source_type),
                    source_id: row.get("source_id"),
                    metadata: serde_json::from_str(&metadata_json).unwrap_or_default(),
                },
                sent_at: row.get("sent_at"),
            })
        })
        .collect()
}

/// Wipe all derived data, keeping the raw messages.
pub async fn wipe_derived(pool: &SqlitePool) -> Result<()> {
    sqlx::query("DELETE FROM knowledge_entries")
        .execute(pool)
        .await?;
    sqlx::query("DELETE FROM analysis_results")
        .execute(pool)
        .await?;
    sqlx::query("DELETE FROM course_tasks").execute(pool).await?;
    Ok(())
}

fn task_from_row(row: sqlx::sqlite::SqliteRow) -> Result<CourseTask> {
    let task_type: String = row.get("task_type");
    let status: String = row.get("status");
    Ok(CourseTask {
        id: row.get("id"),
        title: row.get("title"),
        description: row.get("description"),
        task_type: TaskType::parse(&task_type).unwrap_or(TaskType::OneTime),
        status: TaskStatus::parse(&status).unwrap_or(TaskStatus::Active),
        similarity_key: row.get("similarity_key"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    })
}

fn entry_from_row(row: sqlx::sqlite::SqliteRow) -> Result<KnowledgeEntry> {
    let entry_type: String = row.get("entry_type");
    let entry_type = match entry_type.as_str() {
        "deadline" => EntryType::Deadline,
        "link" => EntryType::Link,
        "explanation" => EntryType::Explanation,
        _ => EntryType::Generic,
    };
    Ok(KnowledgeEntry {
        id: row.get("id"),
        message_id: row.get("message_id"),
        course_task_id: row.get("course_task_id"),
        entry_type,
        content: row.get("content"),
        extra_json: row.get("extra_json"),
        created_at: row.get("created_at"),
    })
}
