//! Batch execution with explicit completion tracking.
//!
//! Every item of a batch reports exactly once, success or failure. The batch is
//! finished when the outstanding count reaches zero, never by comparing a shared
//! counter against the batch length.

use crate::error::Result;
use crate::metrics::{BatchKind, PipelineMetrics};
use crate::models::ParallelSettings;
use crate::services::tools::RunMode;
use crate::state::StatusReporter;
use camino::{Utf8Path, Utf8PathBuf};
use std::future::Future;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};

/// How the items of one batch are scheduled
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Schedule {
    /// One item at a time, each awaited before the next starts
    Sequential,
    /// All items launched together
    Unbounded,
    /// Launched together, but items past `initial_launches` wait
    /// `stagger_ms * index` before starting
    Staggered(ParallelSettings),
}

impl Schedule {
    pub fn run_mode(self) -> RunMode {
        match self {
            Self::Sequential => RunMode::Blocking,
            Self::Unbounded | Self::Staggered(_) => RunMode::Detached,
        }
    }

    fn launch_delay(self, index: usize) -> Option<Duration> {
        match self {
            Self::Staggered(pacing) if index >= pacing.initial_launches => {
                Some(Duration::from_millis(pacing.stagger_ms * index as u64))
            }
            _ => None,
        }
    }
}

/// Result of one batch item
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchOutcome {
    pub source: Utf8PathBuf,
    /// Error message, `None` on success
    pub error: Option<String>,
}

impl BatchOutcome {
    pub fn succeeded(&self) -> bool {
        self.error.is_none()
    }
}

/// Outcomes of a whole batch, in completion order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BatchSummary {
    pub total: usize,
    pub outcomes: Vec<BatchOutcome>,
}

impl BatchSummary {
    pub fn succeeded(&self) -> usize {
        self.outcomes.iter().filter(|o| o.succeeded()).count()
    }

    pub fn failed(&self) -> usize {
        self.outcomes.len() - self.succeeded()
    }

    pub fn successes(&self) -> impl Iterator<Item = &Utf8Path> {
        self.outcomes
            .iter()
            .filter(|o| o.succeeded())
            .map(|o| o.source.as_path())
    }
}

/// Shared record of a running batch.
pub struct BatchTracker {
    kind: BatchKind,
    total: usize,
    outstanding: AtomicUsize,
    outcomes: Mutex<Vec<BatchOutcome>>,
}

impl BatchTracker {
    pub fn new(kind: BatchKind, total: usize) -> Self {
        Self {
            kind,
            total,
            outstanding: AtomicUsize::new(total),
            outcomes: Mutex::new(Vec::with_capacity(total)),
        }
    }

    /// Record one finished item.
    ///
    /// # Returns
    /// The number of items completed so far, this one included
    pub fn record(&self, source: Utf8PathBuf, error: Option<String>) -> usize {
        let mut outcomes = self.outcomes.lock().unwrap_or_else(PoisonError::into_inner);
        outcomes.push(BatchOutcome { source, error });
        self.outstanding.fetch_sub(1, Ordering::AcqRel);
        outcomes.len()
    }

    pub fn outstanding(&self) -> usize {
        self.outstanding.load(Ordering::Acquire)
    }

    pub fn is_complete(&self) -> bool {
        self.outstanding() == 0
    }

    /// `round(100 * completed / total)`
    pub fn percent(&self, completed: usize) -> u32 {
        if self.total == 0 {
            return 100;
        }
        ((completed as f64 * 100.0) / self.total as f64).round() as u32
    }

    pub fn into_summary(self) -> BatchSummary {
        BatchSummary {
            total: self.total,
            outcomes: self
                .outcomes
                .into_inner()
                .unwrap_or_else(PoisonError::into_inner),
        }
    }

    fn kind(&self) -> BatchKind {
        self.kind
    }
}

fn verbs(kind: BatchKind) -> (&'static str, &'static str) {
    match kind {
        BatchKind::Extract => ("Extracted", "extract"),
        BatchKind::Decompile => ("Decompiled", "decompile"),
        BatchKind::Compile => ("Compiled", "compile"),
    }
}

/// Heading of the diagnostics block written for a failed item.
pub fn failure_title(kind: BatchKind, source: &Utf8Path) -> String {
    format!("Failed to {} {}", verbs(kind).1, source)
}

/// Status line for one finished item, e.g. `"42% Decompiled <path>"`.
pub fn item_status(kind: BatchKind, percent: u32, source: &Utf8Path, succeeded: bool) -> String {
    if succeeded {
        format!("{}% {} {}", percent, verbs(kind).0, source)
    } else {
        format!("{}% {}", percent, failure_title(kind, source))
    }
}

/// Reporting sinks shared by every item of a batch
#[derive(Clone)]
pub struct BatchContext {
    pub status: StatusReporter,
    pub metrics: Arc<PipelineMetrics>,
}

impl BatchContext {
    fn finish_item(
        &self,
        tracker: &BatchTracker,
        source: Utf8PathBuf,
        result: Result<()>,
        elapsed: Duration,
    ) {
        let kind = tracker.kind();
        self.metrics.record_tool_time(elapsed);
        self.metrics.record_item(kind, result.is_ok());

        let error = match result {
            Ok(()) => None,
            Err(e) => {
                tracing::warn!("{:?} failed for {}: {}", kind, source, e);
                self.status
                    .append_diagnostic(&failure_title(kind, &source), &e.to_string());
                Some(e.to_string())
            }
        };

        let succeeded = error.is_none();
        let status_source = source.clone();
        let completed = tracker.record(source, error);
        self.status.set(item_status(
            kind,
            tracker.percent(completed),
            &status_source,
            succeeded,
        ));
    }
}

/// Run `job` over `items` under `schedule` and wait for every item to report.
///
/// A failed item never stops the batch.
pub async fn run_batch<F, Fut>(
    kind: BatchKind,
    items: Vec<Utf8PathBuf>,
    schedule: Schedule,
    context: &BatchContext,
    job: F,
) -> BatchSummary
where
    F: Fn(Utf8PathBuf, RunMode) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<()>> + Send + 'static,
{
    let tracker = Arc::new(BatchTracker::new(kind, items.len()));
    let mode = schedule.run_mode();

    tracing::info!("Starting {:?} batch of {} items ({:?})", kind, items.len(), schedule);

    if schedule == Schedule::Sequential {
        for item in items {
            let start = Instant::now();
            let result = job(item.clone(), mode).await;
            context.finish_item(&tracker, item, result, start.elapsed());
        }
    } else {
        let job = Arc::new(job);
        let mut tasks = Vec::with_capacity(items.len());

        for (index, item) in items.into_iter().enumerate() {
            let job = job.clone();
            let tracker = tracker.clone();
            let context = context.clone();
            let delay = schedule.launch_delay(index);

            let task = tokio::spawn(async move {
                if let Some(delay) = delay {
                    tokio::time::sleep(delay).await;
                }
                let start = Instant::now();
                let result = job(item.clone(), mode).await;
                context.finish_item(&tracker, item, result, start.elapsed());
            });

            tasks.push(task);
        }

        // Wait for all spawned tasks to complete
        for task in tasks {
            if let Err(e) = task.await {
                tracing::error!("Task join error: {}", e);
            }
        }
    }

    match Arc::try_unwrap(tracker) {
        Ok(tracker) => tracker.into_summary(),
        Err(shared) => {
            // A task panicked while holding a clone; report what was recorded
            let outcomes = shared
                .outcomes
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .clone();
            BatchSummary {
                total: shared.total,
                outcomes,
            }
        }
    }
}
