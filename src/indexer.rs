//! End-to-end indexing runs
//!
//! Wires the fetch orchestrator to the article index: workers push parsed
//! chunk buffers into a bounded queue and a single writer task drains it,
//! committing one upsert transaction per chunk. The bounded queue is the
//! only coupling between the two sides; a full queue blocks the fetchers,
//! a store failure cancels the run.

use std::path::PathBuf;

use bb8::ManageConnection;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use crate::assembler::{self, AssembleOptions};
use crate::config::IndexerConfig;
use crate::error::{Error, Result};
use crate::fetch::{FailedChunk, FetchOrchestrator, OverviewSource};
use crate::overview::OverviewRow;
use crate::store::IndexStore;

/// Outcome of one indexing run
#[derive(Debug, Default)]
pub struct RunReport {
    /// Rows newly written to the index
    pub inserted: u64,
    /// Rows skipped as already indexed
    pub ignored: u64,
    /// Rows parsed from the wire (inserted + ignored, before dedup)
    pub rows_parsed: u64,
    /// Overview lines dropped by the parser
    pub parse_errors: u64,
    /// Chunks that exhausted their retries; re-run a narrower range to fill
    pub failed_chunks: Vec<FailedChunk>,
    /// Whether the run was cancelled
    pub cancelled: bool,
}

impl RunReport {
    /// Process exit code for drivers wrapping the core: 0 success,
    /// 4 partial failure, 5 cancelled
    pub fn exit_code(&self) -> i32 {
        if self.cancelled {
            5
        } else if !self.failed_chunks.is_empty() {
            4
        } else {
            0
        }
    }
}

/// Fetch `[low, high]` of `group` and persist every parsed row
///
/// Row buffers flow through a bounded channel sized to the worker count;
/// the single writer serializes all index writes and commits one
/// transaction per chunk, so partial state after cancellation is always
/// consistent.
///
/// # Errors
///
/// - [`Error::AuthFailed`] when the server rejects credentials mid-run
/// - [`Error::Store`] when a write fails; the run is cancelled and aborts
///
/// Transport failures are not errors here: exhausted chunks are reported
/// in [`RunReport::failed_chunks`] (exit code 4).
pub async fn index_group<M>(
    orchestrator: &FetchOrchestrator<M>,
    store: &IndexStore,
    group: &str,
    low: u64,
    high: u64,
    cancel: CancellationToken,
) -> Result<RunReport>
where
    M: ManageConnection<Error = Error>,
    M::Connection: OverviewSource,
{
    let queue_capacity = orchestrator.settings().max_workers.max(1) as usize;
    let (sink, mut chunk_rx) = mpsc::channel::<Vec<OverviewRow>>(queue_capacity);

    let writer_store = store.clone();
    let writer_cancel = cancel.clone();
    let writer = tokio::spawn(async move {
        let mut inserted = 0u64;
        let mut ignored = 0u64;
        while let Some(batch) = chunk_rx.recv().await {
            match writer_store.upsert_batch(&batch).await {
                Ok(outcome) => {
                    inserted += outcome.inserted;
                    ignored += outcome.ignored;
                }
                Err(e) => {
                    error!("Index write failed, cancelling run: {}", e);
                    writer_cancel.cancel();
                    return Err(e);
                }
            }
        }
        Ok((inserted, ignored))
    });

    let fetch_result = orchestrator
        .fetch_range(group, low, high, sink, cancel.clone())
        .await;

    let writer_result = writer
        .await
        .map_err(|e| Error::Other(format!("Writer task failed: {}", e)))?;

    let fetch_report = fetch_result?;
    let (inserted, ignored) = writer_result?;

    let report = RunReport {
        inserted,
        ignored,
        rows_parsed: fetch_report.rows_parsed,
        parse_errors: fetch_report.parse_errors,
        failed_chunks: fetch_report.failed_chunks,
        cancelled: fetch_report.cancelled,
    };

    info!(
        "Indexed {}: {} inserted, {} ignored, {} parse errors, {} failed chunks{}",
        group,
        report.inserted,
        report.ignored,
        report.parse_errors,
        report.failed_chunks.len(),
        if report.cancelled { " (cancelled)" } else { "" }
    );

    Ok(report)
}

/// Query the index per `config` and write the resulting NZB document(s)
///
/// Returns the paths written under `config.output_path`.
///
/// # Errors
///
/// - [`Error::Config`] for invalid configuration
/// - [`Error::Store`] for query failures
/// - [`Error::Io`] for output failures
pub async fn export_nzbs(store: &IndexStore, config: &IndexerConfig) -> Result<Vec<PathBuf>> {
    config.validate()?;
    let filter = config.query_filter()?;

    let rows = store.query(&filter).await?;
    debug!("NZB export: {} rows matched the filter", rows.len());

    let options = AssembleOptions {
        require_complete_sets: config.require_complete_sets,
        group_by_collection: config.group_by_collection,
    };
    let outcome = assembler::assemble(&rows, &config.group, options);

    assembler::write_documents(&outcome.documents, &config.output_path).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fetch::Chunk;

    #[test]
    fn test_exit_code_success() {
        let report = RunReport::default();
        assert_eq!(report.exit_code(), 0);
    }

    #[test]
    fn test_exit_code_partial_failure() {
        let report = RunReport {
            failed_chunks: vec![FailedChunk {
                chunk: Chunk { low: 1, high: 2 },
                error: "boom".into(),
            }],
            ..Default::default()
        };
        assert_eq!(report.exit_code(), 4);
    }

    #[test]
    fn test_exit_code_cancelled_wins() {
        let report = RunReport {
            cancelled: true,
            failed_chunks: vec![FailedChunk {
                chunk: Chunk { low: 1, high: 2 },
                error: "boom".into(),
            }],
            ..Default::default()
        };
        assert_eq!(report.exit_code(), 5);
    }
}
