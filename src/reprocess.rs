//! Full reprocessing: wipe derived data and replay all stored envelopes.
//!
//! Replay runs strictly in chronological order — context inheritance depends
//! on parents being processed before their replies. Per-message failures are
//! logged and skipped so one bad envelope cannot stall the replay.

use anyhow::Result;
use sqlx::SqlitePool;
use std::sync::Arc;
use tracing::{error, info, warn};

use crate::aggregator::TaskAggregator;
use crate::classifier::Classifier;
use crate::pipeline::process_envelope;
use crate::similarity::SimilarityIndex;
use crate::store;

#[derive(Debug, Default)]
pub struct ReprocessReport {
    pub total: usize,
    pub processed: usize,
    pub failed: usize,
}

pub async fn run_reprocess(
    pool: &SqlitePool,
    classifier: &Classifier,
    index: Arc<dyn SimilarityIndex>,
) -> Result<ReprocessReport> {
    info!("starting full reprocessing");

    store::wipe_derived(pool).await?;
    if let Err(e) = index.reset().await {
        warn!(error = %e, "similarity index reset failed, continuing");
    }

    let messages = store::load_messages_chronological(pool).await?;
    let mut report = ReprocessReport {
        total: messages.len(),
        ..Default::default()
    };

    let aggregator = TaskAggregator::new(pool.clone(), index);

    for message in &messages {
        match process_envelope(pool, classifier, &aggregator, &message.envelope).await {
            Ok(_) => report.processed += 1,
            Err(e) => {
                error!(
                    message_id = %message.id,
                    error = %e,
                    "failed to reprocess message, skipping"
                );
                report.failed += 1;
            }
        }
    }

    info!(
        total = report.total,
        processed = report.processed,
        failed = report.failed,
        "reprocessing complete"
    );
    Ok(report)
}
