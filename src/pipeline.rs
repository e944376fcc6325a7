//! Pipeline orchestration: envelope → classification → aggregation.
//!
//! One invocation per envelope, designed for at-least-once delivery: the
//! whole flow is idempotent, and classification or index failures degrade
//! rather than propagate. Only persistence failures surface to the caller,
//! whose retry is safe.

use anyhow::Result;
use sqlx::SqlitePool;
use tracing::info;

use crate::aggregator::TaskAggregator;
use crate::classifier::Classifier;
use crate::models::{Category, IngestionEnvelope};
use crate::store;

/// What processing one envelope produced.
#[derive(Debug)]
pub struct ProcessReport {
    pub message_id: String,
    pub category: Category,
    pub importance_score: i64,
    pub task_id: Option<String>,
    pub created_task: bool,
    pub entries_created: u64,
}

/// Process one envelope end to end.
pub async fn process_envelope(
    pool: &SqlitePool,
    classifier: &Classifier,
    aggregator: &TaskAggregator,
    envelope: &IngestionEnvelope,
) -> Result<ProcessReport> {
    info!(
        source_type = envelope.source_type.as_str(),
        source_id = %envelope.source_id,
        "processing envelope"
    );

    let message_id = store::upsert_message(pool, envelope).await?;
    let result = classifier.classify(envelope).await;
    let outcome = aggregator.process(&message_id, envelope, &result).await?;

    info!(
        message_id = %message_id,
        category = result.category.as_str(),
        score = result.importance_score,
        task_id = outcome.task_id.as_deref().unwrap_or("-"),
        "envelope processed"
    );

    Ok(ProcessReport {
        message_id,
        category: result.category,
        importance_score: result.importance_score,
        task_id: outcome.task_id,
        created_task: outcome.created_task,
        entries_created: outcome.entries_created,
    })
}
