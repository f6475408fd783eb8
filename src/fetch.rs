//! Parallel overview fetch orchestration
//!
//! A requested article-number range is partitioned into fixed-size chunks
//! and dispatched across a worker pool. Each worker leases one pooled
//! connection per chunk, selects the target group if the session does not
//! already have it, streams `XOVER` for the chunk range and parses the
//! overview lines. Parsed row buffers flow into a bounded channel; when the
//! channel is full the worker blocks, which is the backpressure that keeps
//! fetch speed matched to the index writer.
//!
//! Chunk ordering is arrival order. Callers must not assume monotonic
//! article numbers on the row stream; the store's `query` re-establishes
//! ordering.

use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::time::Duration;

use bb8::{ManageConnection, Pool, RunError};
use rand::Rng;
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::client::NntpClient;
use crate::commands::GroupInfo;
use crate::error::{Error, Result};
use crate::overview::{OverviewRow, parse_overview_line};

/// A transport session capable of serving overview chunks
///
/// Implemented by [`NntpClient`] for production and by scripted mocks in
/// tests; the orchestrator only ever talks to this surface.
#[async_trait::async_trait]
pub trait OverviewSource: Send {
    /// Select a newsgroup, skipping the round trip when already selected
    async fn select_group(&mut self, group: &str) -> Result<GroupInfo>;

    /// Fetch raw overview lines for an inclusive article-number range
    async fn xover(&mut self, low: u64, high: u64) -> Result<Vec<String>>;

    /// Flag the session so the pool discards it instead of reusing it
    fn mark_broken(&mut self);
}

#[async_trait::async_trait]
impl OverviewSource for NntpClient {
    async fn select_group(&mut self, group: &str) -> Result<GroupInfo> {
        NntpClient::select_group(self, group).await
    }

    async fn xover(&mut self, low: u64, high: u64) -> Result<Vec<String>> {
        NntpClient::xover(self, low, high).await
    }

    fn mark_broken(&mut self) {
        NntpClient::mark_broken(self);
    }
}

/// Configuration for chunk retry behavior
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Maximum number of retry attempts per chunk
    pub max_retries: u32,
    /// Initial backoff duration in milliseconds
    pub initial_backoff_ms: u64,
    /// Backoff multiplier (exponential factor)
    pub backoff_multiplier: f64,
    /// Whether to add +/-25% jitter to prevent thundering herd
    pub jitter: bool,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            initial_backoff_ms: 500,
            backoff_multiplier: 2.0,
            jitter: true,
        }
    }
}

impl RetryPolicy {
    /// Backoff before retry number `retry_index` (0-based)
    pub fn backoff(&self, retry_index: u32) -> Duration {
        let base =
            self.initial_backoff_ms as f64 * self.backoff_multiplier.powi(retry_index as i32);
        let ms = if self.jitter {
            base * rand::thread_rng().gen_range(0.75..=1.25)
        } else {
            base
        };
        Duration::from_millis(ms as u64)
    }
}

/// Tuning for one fetch run
#[derive(Debug, Clone)]
pub struct FetchSettings {
    /// Articles per XOVER request
    pub chunk_size: u64,
    /// Number of parallel workers; match the pool size
    pub max_workers: u32,
    /// Chunk retry behavior
    pub retry: RetryPolicy,
}

impl Default for FetchSettings {
    fn default() -> Self {
        Self {
            chunk_size: 100_000,
            max_workers: 10,
            retry: RetryPolicy::default(),
        }
    }
}

/// One inclusive article-number chunk
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Chunk {
    /// First article number of the chunk
    pub low: u64,
    /// Last article number of the chunk
    pub high: u64,
}

/// A chunk that exhausted its retries, with the last error seen
#[derive(Debug, Clone)]
pub struct FailedChunk {
    /// The article range that could not be fetched
    pub chunk: Chunk,
    /// Display form of the final error
    pub error: String,
}

/// Progress snapshot reported after every processed chunk
#[derive(Debug, Clone, Copy)]
pub struct FetchProgress {
    /// Chunks processed so far (fetched or failed)
    pub chunks_done: usize,
    /// Total chunks in this run
    pub chunks_total: usize,
    /// Rows parsed so far across all workers
    pub rows_so_far: u64,
}

/// Progress callback invoked from worker tasks
pub type ProgressFn = Arc<dyn Fn(FetchProgress) + Send + Sync>;

/// Outcome of a fetch run
#[derive(Debug, Default)]
pub struct FetchReport {
    /// Rows successfully parsed and handed to the sink
    pub rows_parsed: u64,
    /// Overview lines dropped by the parser
    pub parse_errors: u64,
    /// Chunks that exhausted their retries
    pub failed_chunks: Vec<FailedChunk>,
    /// Whether the run was cancelled before all chunks were processed
    pub cancelled: bool,
}

impl FetchReport {
    /// Whether every chunk was fetched and the run was not cancelled
    pub fn is_complete(&self) -> bool {
        self.failed_chunks.is_empty() && !self.cancelled
    }
}

/// Split an inclusive range into chunks of at most `chunk_size` articles
///
/// The last chunk is shorter when the range is not an exact multiple.
pub fn partition_chunks(low: u64, high: u64, chunk_size: u64) -> Vec<Chunk> {
    let mut chunks = Vec::new();
    if low > high || chunk_size == 0 {
        return chunks;
    }

    let mut start = low;
    while start <= high {
        let end = high.min(start.saturating_add(chunk_size - 1));
        chunks.push(Chunk {
            low: start,
            high: end,
        });
        if end == u64::MAX {
            break;
        }
        start = end + 1;
    }
    chunks
}

/// Parallel overview fetcher over a pooled transport
///
/// Generic over the bb8 connection manager so tests can substitute a
/// scripted transport for the NNTP pool.
pub struct FetchOrchestrator<M>
where
    M: ManageConnection<Error = Error>,
    M::Connection: OverviewSource,
{
    pool: Pool<M>,
    settings: FetchSettings,
    on_progress: Option<ProgressFn>,
}

/// Shared progress counters across workers
struct Counters {
    chunks_done: AtomicUsize,
    rows: AtomicU64,
}

/// What a worker did with one chunk
enum ChunkResult {
    /// Rows parsed (possibly zero for a 423 range)
    Rows {
        rows: Vec<OverviewRow>,
        parse_errors: u64,
    },
    /// Retries exhausted
    Failed(FailedChunk),
    /// Abandoned because cancellation was requested
    Cancelled,
    /// The run must abort (authentication rejected)
    Fatal(Error),
}

#[derive(Default)]
struct WorkerOutcome {
    rows_parsed: u64,
    parse_errors: u64,
    failed: Vec<FailedChunk>,
    fatal: Option<Error>,
}

impl<M> FetchOrchestrator<M>
where
    M: ManageConnection<Error = Error>,
    M::Connection: OverviewSource,
{
    /// Create an orchestrator over an existing pool
    pub fn new(pool: Pool<M>, settings: FetchSettings) -> Self {
        Self {
            pool,
            settings,
            on_progress: None,
        }
    }

    /// Install a progress callback, invoked after every processed chunk
    pub fn with_progress(mut self, on_progress: ProgressFn) -> Self {
        self.on_progress = Some(on_progress);
        self
    }

    /// The settings this orchestrator runs with
    pub fn settings(&self) -> &FetchSettings {
        &self.settings
    }

    /// Fetch overview rows for the inclusive range `[low, high]`
    ///
    /// Parsed per-chunk row buffers are delivered through `sink` in arrival
    /// order. The call returns once every chunk has been fetched, failed its
    /// retries, or been abandoned due to cancellation.
    ///
    /// # Errors
    ///
    /// Returns [`Error::AuthFailed`] when the server rejects credentials
    /// mid-run; transport failures are retried and then recorded in
    /// [`FetchReport::failed_chunks`] rather than returned.
    pub async fn fetch_range(
        &self,
        group: &str,
        low: u64,
        high: u64,
        sink: mpsc::Sender<Vec<OverviewRow>>,
        cancel: CancellationToken,
    ) -> Result<FetchReport> {
        let chunks = partition_chunks(low, high, self.settings.chunk_size);
        let chunks_total = chunks.len();
        debug!(
            "Fetching {} in {} chunks of up to {} articles",
            group, chunks_total, self.settings.chunk_size
        );

        let queue = Arc::new(std::sync::Mutex::new(VecDeque::from(chunks)));
        let counters = Arc::new(Counters {
            chunks_done: AtomicUsize::new(0),
            rows: AtomicU64::new(0),
        });

        let worker_count = (self.settings.max_workers as usize).min(chunks_total.max(1));
        let mut workers = JoinSet::new();
        for _ in 0..worker_count {
            let pool = self.pool.clone();
            let group = group.to_string();
            let queue = Arc::clone(&queue);
            let counters = Arc::clone(&counters);
            let sink = sink.clone();
            let cancel = cancel.clone();
            let retry = self.settings.retry.clone();
            let on_progress = self.on_progress.clone();

            workers.spawn(run_worker(
                pool,
                group,
                queue,
                counters,
                sink,
                cancel,
                retry,
                on_progress,
                chunks_total,
            ));
        }
        // Workers hold their own clones; dropping ours lets the writer see
        // end-of-stream as soon as the last worker exits
        drop(sink);

        let mut report = FetchReport::default();
        while let Some(joined) = workers.join_next().await {
            match joined {
                Ok(outcome) => {
                    report.rows_parsed += outcome.rows_parsed;
                    report.parse_errors += outcome.parse_errors;
                    report.failed_chunks.extend(outcome.failed);
                    if let Some(fatal) = outcome.fatal {
                        // First fatal error wins; remaining workers already
                        // saw the cancellation
                        cancel.cancel();
                        while workers.join_next().await.is_some() {}
                        return Err(fatal);
                    }
                }
                Err(e) => warn!("Fetch worker panicked: {}", e),
            }
        }

        report.cancelled = cancel.is_cancelled();
        debug!(
            "Fetch finished: {} rows, {} parse errors, {} failed chunks, cancelled={}",
            report.rows_parsed,
            report.parse_errors,
            report.failed_chunks.len(),
            report.cancelled
        );
        Ok(report)
    }
}

#[allow(clippy::too_many_arguments)]
async fn run_worker<M>(
    pool: Pool<M>,
    group: String,
    queue: Arc<std::sync::Mutex<VecDeque<Chunk>>>,
    counters: Arc<Counters>,
    sink: mpsc::Sender<Vec<OverviewRow>>,
    cancel: CancellationToken,
    retry: RetryPolicy,
    on_progress: Option<ProgressFn>,
    chunks_total: usize,
) -> WorkerOutcome
where
    M: ManageConnection<Error = Error>,
    M::Connection: OverviewSource,
{
    let mut outcome = WorkerOutcome::default();

    loop {
        if cancel.is_cancelled() {
            break;
        }
        let chunk = {
            let mut queue = queue.lock().expect("chunk queue lock poisoned");
            queue.pop_front()
        };
        let Some(chunk) = chunk else { break };

        match fetch_chunk(&pool, &group, chunk, &retry, &cancel).await {
            ChunkResult::Rows { rows, parse_errors } => {
                outcome.parse_errors += parse_errors;
                let row_count = rows.len() as u64;
                // A closed sink means the writer aborted; stop fetching
                if !rows.is_empty() && sink.send(rows).await.is_err() {
                    debug!("Row sink closed, worker exiting");
                    break;
                }
                outcome.rows_parsed += row_count;
                report_progress(&counters, &on_progress, chunks_total, row_count);
            }
            ChunkResult::Failed(failed) => {
                warn!(
                    "Chunk {}-{} failed after retries: {}",
                    failed.chunk.low, failed.chunk.high, failed.error
                );
                outcome.failed.push(failed);
                report_progress(&counters, &on_progress, chunks_total, 0);
            }
            ChunkResult::Cancelled => break,
            ChunkResult::Fatal(e) => {
                cancel.cancel();
                outcome.fatal = Some(e);
                break;
            }
        }
    }

    outcome
}

fn report_progress(
    counters: &Counters,
    on_progress: &Option<ProgressFn>,
    chunks_total: usize,
    new_rows: u64,
) {
    let chunks_done = counters.chunks_done.fetch_add(1, Ordering::Relaxed) + 1;
    let rows_so_far = counters.rows.fetch_add(new_rows, Ordering::Relaxed) + new_rows;
    if let Some(callback) = on_progress {
        callback(FetchProgress {
            chunks_done,
            chunks_total,
            rows_so_far,
        });
    }
}

/// Fetch one chunk with retries, leasing a fresh connection per attempt
async fn fetch_chunk<M>(
    pool: &Pool<M>,
    group: &str,
    chunk: Chunk,
    retry: &RetryPolicy,
    cancel: &CancellationToken,
) -> ChunkResult
where
    M: ManageConnection<Error = Error>,
    M::Connection: OverviewSource,
{
    let mut last_error = String::new();

    for attempt in 0..=retry.max_retries {
        if attempt > 0 {
            let backoff = retry.backoff(attempt - 1);
            debug!(
                "Retry {}/{} for chunk {}-{} in {:?}",
                attempt, retry.max_retries, chunk.low, chunk.high, backoff
            );
            tokio::select! {
                _ = cancel.cancelled() => return ChunkResult::Cancelled,
                _ = tokio::time::sleep(backoff) => {}
            }
        }
        if cancel.is_cancelled() {
            return ChunkResult::Cancelled;
        }

        let mut conn = match pool.get().await {
            Ok(conn) => conn,
            Err(RunError::User(e @ Error::AuthFailed(_))) => return ChunkResult::Fatal(e),
            Err(RunError::User(e)) => {
                last_error = e.to_string();
                continue;
            }
            Err(RunError::TimedOut) => {
                last_error = "timed out waiting for a pooled connection".to_string();
                continue;
            }
        };

        // Race the chunk fetch against cancellation; an aborted read leaves
        // the session mid-response, so the connection must not be reused
        let attempt_result = {
            let fut = async {
                conn.select_group(group).await?;
                conn.xover(chunk.low, chunk.high).await
            };
            tokio::pin!(fut);
            tokio::select! {
                _ = cancel.cancelled() => None,
                result = &mut fut => Some(result),
            }
        };

        let Some(attempt_result) = attempt_result else {
            conn.mark_broken();
            return ChunkResult::Cancelled;
        };

        match attempt_result {
            Ok(lines) => {
                let mut rows = Vec::with_capacity(lines.len());
                let mut parse_errors = 0u64;
                for line in &lines {
                    match parse_overview_line(group, line) {
                        Some(row) => rows.push(row),
                        None => parse_errors += 1,
                    }
                }
                if parse_errors > 0 {
                    warn!(
                        "Dropped {} unparseable overview lines in chunk {}-{}",
                        parse_errors, chunk.low, chunk.high
                    );
                }
                return ChunkResult::Rows { rows, parse_errors };
            }
            Err(Error::NoSuchRange { low, high }) => {
                // Nothing in this range on the server; not an error
                debug!("Server reported no articles in {}-{}", low, high);
                return ChunkResult::Rows {
                    rows: Vec::new(),
                    parse_errors: 0,
                };
            }
            Err(e @ Error::AuthFailed(_)) => return ChunkResult::Fatal(e),
            Err(e) if e.is_retryable() => {
                conn.mark_broken();
                last_error = e.to_string();
            }
            Err(e) => {
                last_error = e.to_string();
                break;
            }
        }
    }

    ChunkResult::Failed(FailedChunk {
        chunk,
        error: last_error,
    })
}
