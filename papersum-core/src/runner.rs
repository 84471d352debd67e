//! Summarization batch runner.
//!
//! Pulls bounded batches of pending work, drives each item through document
//! fetch, synthesis and persistence, and in continuous mode paces batches so
//! that batch starts are at least `batch_interval` apart. The loop drains when
//! a batch produced no successes *and* the work source reports nothing left.

use crate::config::RunnerConfig;
use crate::ports::{DocumentSource, SummarySink, WorkSource};
use crate::synthesizer::ResponseSynthesizer;
use crate::types::{ProcessingOutcome, WorkItem};
use serde::Serialize;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Lifecycle of the runner.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunnerState {
    Idle,
    Running { batch: usize },
    Pacing { wait: Duration },
    Drained,
}

impl std::fmt::Display for RunnerState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RunnerState::Idle => write!(f, "idle"),
            RunnerState::Running { batch } => write!(f, "running batch {}", batch),
            RunnerState::Pacing { wait } => write!(f, "pacing for {}ms", wait.as_millis()),
            RunnerState::Drained => write!(f, "drained"),
        }
    }
}

/// Why a run ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StopReason {
    /// No pending work remains (or single-batch mode finished its batch).
    Drained,
    /// Cancellation was requested.
    Interrupted,
    /// Every pending item has already been attempted in this run.
    Stalled,
    /// The configured batch cap was reached.
    BatchLimit,
}

impl std::fmt::Display for StopReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StopReason::Drained => write!(f, "drained"),
            StopReason::Interrupted => write!(f, "interrupted"),
            StopReason::Stalled => write!(f, "stalled"),
            StopReason::BatchLimit => write!(f, "batch limit reached"),
        }
    }
}

/// Cumulative totals for one run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RunReport {
    pub batches: usize,
    pub successes: usize,
    pub failures: usize,
    pub skipped: usize,
    pub pacing_sleeps: usize,
    pub stop_reason: StopReason,
}

/// Totals for a single batch.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BatchStats {
    /// Items returned by the work source, including ones passed over.
    pub fetched: usize,
    pub successes: usize,
    pub failures: usize,
    pub skipped: usize,
    /// Cancellation stopped the batch before every item was processed.
    pub interrupted: bool,
}

/// Outcome of one item plus whether a completed record was written.
struct ItemReport {
    outcome: ProcessingOutcome,
    completed: bool,
}

pub struct BatchRunner {
    synthesizer: ResponseSynthesizer,
    work: Arc<dyn WorkSource>,
    documents: Arc<dyn DocumentSource>,
    sink: Arc<dyn SummarySink>,
    config: RunnerConfig,
    cancellation: CancellationToken,
    /// Item ids already attempted in this run.
    attempted: HashSet<i64>,
    state: RunnerState,
    batches_started: usize,
}

impl BatchRunner {
    pub fn new(
        synthesizer: ResponseSynthesizer,
        work: Arc<dyn WorkSource>,
        documents: Arc<dyn DocumentSource>,
        sink: Arc<dyn SummarySink>,
        config: RunnerConfig,
    ) -> Self {
        Self {
            synthesizer,
            work,
            documents,
            sink,
            config,
            cancellation: CancellationToken::new(),
            attempted: HashSet::new(),
            state: RunnerState::Idle,
            batches_started: 0,
        }
    }

    /// Get a cancellation token for this runner.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancellation.clone()
    }

    pub fn state(&self) -> RunnerState {
        self.state
    }

    fn set_state(&mut self, next: RunnerState) {
        if self.state != next {
            debug!(from = %self.state, to = %next, "Runner state transition");
            self.state = next;
        }
    }

    /// Process up to `batch_size` pending items and return how many were
    /// summarized and recorded.
    pub async fn run_batch(&mut self, batch_size: usize) -> usize {
        let stats = self.execute_batch(batch_size).await;
        self.set_state(RunnerState::Idle);
        stats.successes
    }

    /// Run one batch, or keep running paced batches until drained when
    /// `continuous` is set.
    pub async fn run(&mut self, continuous: bool) -> RunReport {
        let mut report = RunReport {
            batches: 0,
            successes: 0,
            failures: 0,
            skipped: 0,
            pacing_sleeps: 0,
            stop_reason: StopReason::Drained,
        };

        let stop_reason = loop {
            if self.cancellation.is_cancelled() {
                break StopReason::Interrupted;
            }

            let started = Instant::now();
            let stats = self.execute_batch(self.config.batch_size).await;
            report.batches += 1;
            report.successes += stats.successes;
            report.failures += stats.failures;
            report.skipped += stats.skipped;
            info!(
                batch = report.batches,
                fetched = stats.fetched,
                successes = stats.successes,
                failures = stats.failures,
                skipped = stats.skipped,
                total_successes = report.successes,
                "Batch complete"
            );

            if stats.interrupted {
                break StopReason::Interrupted;
            }
            if !continuous {
                break StopReason::Drained;
            }
            if stats.fetched > 0 && stats.skipped == stats.fetched {
                warn!(
                    items = stats.fetched,
                    "Every pending item was already attempted this run, stopping"
                );
                break StopReason::Stalled;
            }
            if stats.successes == 0 && self.nothing_remaining().await {
                break StopReason::Drained;
            }
            if self
                .config
                .max_batches
                .is_some_and(|max| report.batches >= max)
            {
                break StopReason::BatchLimit;
            }

            let wait = self.config.batch_interval().saturating_sub(started.elapsed());
            self.set_state(RunnerState::Pacing { wait });
            report.pacing_sleeps += 1;
            debug!(wait_ms = wait.as_millis() as u64, "Pacing before next batch");
            tokio::select! {
                _ = tokio::time::sleep(wait) => {}
                _ = self.cancellation.cancelled() => {
                    info!("Cancelled while pacing");
                    break StopReason::Interrupted;
                }
            }
        };

        report.stop_reason = stop_reason;
        self.set_state(if stop_reason == StopReason::Drained {
            RunnerState::Drained
        } else {
            RunnerState::Idle
        });
        info!(
            batches = report.batches,
            successes = report.successes,
            failures = report.failures,
            skipped = report.skipped,
            stop_reason = %report.stop_reason,
            "Run finished"
        );
        report
    }

    /// Ask the work source whether anything is left. Errors count as "maybe".
    async fn nothing_remaining(&self) -> bool {
        match self.work.remaining().await {
            Ok(0) => {
                info!("No pending work remains");
                true
            }
            Ok(remaining) => {
                debug!(remaining, "Work remains after an unproductive batch");
                false
            }
            Err(e) => {
                warn!(error = %e, "Could not count remaining work, assuming some remains");
                false
            }
        }
    }

    async fn execute_batch(&mut self, batch_size: usize) -> BatchStats {
        self.batches_started += 1;
        self.set_state(RunnerState::Running {
            batch: self.batches_started,
        });

        // Ask past the items already attempted so they cannot crowd out fresh work.
        let fetch_limit = batch_size.saturating_add(self.attempted.len());
        let items = match self.work.pending(fetch_limit).await {
            Ok(items) => items,
            Err(e) => {
                error!(error = %e, "Failed to fetch pending work");
                return BatchStats::default();
            }
        };

        let mut stats = BatchStats {
            fetched: items.len(),
            ..BatchStats::default()
        };
        let mut processed = 0;
        for item in &items {
            if processed == batch_size {
                break;
            }
            if self.cancellation.is_cancelled() {
                info!(processed, of = batch_size, "Cancelled between items");
                stats.interrupted = true;
                break;
            }

            let report = self.process_item(item).await;
            match report.outcome {
                ProcessingOutcome::Skipped => stats.skipped += 1,
                _ if report.completed => {
                    processed += 1;
                    stats.successes += 1;
                }
                _ => {
                    processed += 1;
                    stats.failures += 1;
                }
            }
        }
        stats
    }

    async fn process_item(&mut self, item: &WorkItem) -> ItemReport {
        if !self.attempted.insert(item.id) {
            debug!(
                item_id = item.id,
                arxiv_id = item.external_id.as_str(),
                "Item already attempted this run, skipping"
            );
            return ItemReport {
                outcome: ProcessingOutcome::Skipped,
                completed: false,
            };
        }

        info!(
            item_id = item.id,
            arxiv_id = item.external_id.as_str(),
            "Summarizing paper"
        );
        let excerpt = self.fetch_excerpt(item).await;

        let synthesis = match self
            .synthesizer
            .synthesize(&item.title, &item.abstract_text, &excerpt)
            .await
        {
            Ok(synthesis) => synthesis,
            Err(failure) => {
                warn!(
                    item_id = item.id,
                    arxiv_id = item.external_id.as_str(),
                    kind = %failure.kind,
                    attempts = failure.attempts,
                    "Synthesis failed"
                );
                self.record_failure(item, &failure.to_string()).await;
                return ItemReport {
                    outcome: ProcessingOutcome::from_failure(failure.kind),
                    completed: false,
                };
            }
        };

        match self.sink.save_summary(item, &synthesis).await {
            Ok(()) => {
                info!(
                    item_id = item.id,
                    arxiv_id = item.external_id.as_str(),
                    attempts = synthesis.attempts,
                    "Summary recorded"
                );
                ItemReport {
                    outcome: ProcessingOutcome::Success(synthesis.result),
                    completed: true,
                }
            }
            Err(e) => {
                error!(
                    item_id = item.id,
                    arxiv_id = item.external_id.as_str(),
                    error = %e,
                    "Failed to record summary"
                );
                self.record_failure(item, &format!("Failed to save summary: {}", e))
                    .await;
                ItemReport {
                    outcome: ProcessingOutcome::Success(synthesis.result),
                    completed: false,
                }
            }
        }
    }

    /// Fetch the document excerpt. Any failure degrades to an empty excerpt.
    async fn fetch_excerpt(&self, item: &WorkItem) -> String {
        let Some(url) = item.document_url.as_deref() else {
            info!(
                item_id = item.id,
                "No document URL, summarizing from title and abstract"
            );
            return String::new();
        };
        match self.documents.excerpt(url).await {
            Ok(text) if !text.trim().is_empty() => {
                debug!(item_id = item.id, chars = text.chars().count(), "Excerpt fetched");
                text
            }
            Ok(_) => {
                warn!(
                    item_id = item.id,
                    url,
                    "Document had no text, summarizing from title and abstract"
                );
                String::new()
            }
            Err(e) => {
                warn!(
                    item_id = item.id,
                    url,
                    error = %e,
                    "Document unavailable, summarizing from title and abstract"
                );
                String::new()
            }
        }
    }

    /// Write an error record. A failed write abandons the item for this run.
    async fn record_failure(&self, item: &WorkItem, description: &str) {
        if let Err(e) = self.sink.save_failure(item, description).await {
            error!(
                item_id = item.id,
                arxiv_id = item.external_id.as_str(),
                error = %e,
                "Failed to record error, item abandoned for this run"
            );
        }
    }
}
