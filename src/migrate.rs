use anyhow::Result;
use sqlx::SqlitePool;

/// Create the schema. Idempotent — safe to run on every startup.
pub async fn run_migrations(pool: &SqlitePool) -> Result<()> {
    // Raw envelopes, one row per source message
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS messages (
            id TEXT PRIMARY KEY,
            source_type TEXT NOT NULL,
            source_id TEXT NOT NULL,
            chat_id TEXT,
            sender_role TEXT NOT NULL DEFAULT 'unknown',
            is_reply INTEGER NOT NULL DEFAULT 0,
            reply_to_source_id TEXT,
            text TEXT NOT NULL,
            metadata_json TEXT NOT NULL DEFAULT '{}',
            dedup_hash TEXT NOT NULL,
            sent_at INTEGER NOT NULL,
            UNIQUE(source_type, source_id)
        )
        "#,
    )
    .execute(pool)
    .await?;

    // Latest classification per message, replace-on-reprocess
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS analysis_results (
            id TEXT PRIMARY KEY,
            message_id TEXT NOT NULL UNIQUE,
            category TEXT NOT NULL DEFAULT 'other',
            importance_score INTEGER NOT NULL DEFAULT 0,
            task_title TEXT,
            task_type TEXT NOT NULL DEFAULT 'one_time',
            action TEXT NOT NULL DEFAULT 'info',
            summary TEXT NOT NULL DEFAULT '',
            links_json TEXT NOT NULL DEFAULT '[]',
            deadlines_json TEXT NOT NULL DEFAULT '[]',
            created_at INTEGER NOT NULL,
            FOREIGN KEY (message_id) REFERENCES messages(id)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS course_tasks (
            id TEXT PRIMARY KEY,
            title TEXT NOT NULL,
            description TEXT NOT NULL DEFAULT '',
            task_type TEXT NOT NULL DEFAULT 'one_time',
            status TEXT NOT NULL DEFAULT 'active',
            similarity_key TEXT NOT NULL UNIQUE,
            created_at INTEGER NOT NULL,
            updated_at INTEGER NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS knowledge_entries (
            id TEXT PRIMARY KEY,
            message_id TEXT NOT NULL,
            course_task_id TEXT,
            entry_type TEXT NOT NULL,
            content TEXT NOT NULL,
            extra_json TEXT NOT NULL DEFAULT '{}',
            created_at INTEGER NOT NULL,
            FOREIGN KEY (message_id) REFERENCES messages(id),
            FOREIGN KEY (course_task_id) REFERENCES course_tasks(id)
        )
        "#,
    )
    .execute(pool)
    .await?;

    // Dedupe backstop for fact entries under redelivery. COALESCE folds the
    // nullable task id so unattached facts dedupe too (SQLite UNIQUE treats
    // NULLs as distinct).
    sqlx::query(
        r#"
        CREATE UNIQUE INDEX IF NOT EXISTS idx_entries_dedupe
        ON knowledge_entries(message_id, entry_type, content, COALESCE(course_task_id, ''))
        "#,
    )
    .execute(pool)
    .await?;

    // Vectors backing the local similarity index adapter
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS task_vectors (
            key TEXT PRIMARY KEY,
            embedding BLOB NOT NULL,
            payload_json TEXT NOT NULL DEFAULT '{}',
            updated_at INTEGER NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_messages_sent_at ON messages(sent_at)")
        .execute(pool)
        .await?;
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_entries_message ON knowledge_entries(message_id)")
        .execute(pool)
        .await?;
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_entries_task ON knowledge_entries(course_task_id)")
        .execute(pool)
        .await?;

    Ok(())
}
