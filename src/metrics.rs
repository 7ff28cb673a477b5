// Pipeline metrics
//
// Lock-free counters updated by the orchestrator while batches run.

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::time::{Duration, Instant};

/// Counters collected across every pipeline run of a session.
#[derive(Debug)]
pub struct PipelineMetrics {
    pub archives_extracted: AtomicUsize,
    pub extract_failures: AtomicUsize,

    pub files_decompiled: AtomicUsize,
    pub decompile_failures: AtomicUsize,

    pub files_compiled: AtomicUsize,
    pub compile_failures: AtomicUsize,

    pub archives_built: AtomicUsize,

    /// Conflict buckets folded into a single staged file
    pub conflicts_merged: AtomicUsize,

    /// Number of status line writes
    pub status_updates: AtomicU64,

    /// Wall time spent waiting on external tools, in milliseconds
    pub total_tool_time_ms: AtomicU64,

    start_time: Instant,
}

/// Which batch a per-item outcome belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BatchKind {
    Extract,
    Decompile,
    Compile,
}

impl PipelineMetrics {
    pub fn new() -> Self {
        Self {
            archives_extracted: AtomicUsize::new(0),
            extract_failures: AtomicUsize::new(0),
            files_decompiled: AtomicUsize::new(0),
            decompile_failures: AtomicUsize::new(0),
            files_compiled: AtomicUsize::new(0),
            compile_failures: AtomicUsize::new(0),
            archives_built: AtomicUsize::new(0),
            conflicts_merged: AtomicUsize::new(0),
            status_updates: AtomicU64::new(0),
            total_tool_time_ms: AtomicU64::new(0),
            start_time: Instant::now(),
        }
    }

    /// Record one finished batch item
    pub fn record_item(&self, kind: BatchKind, succeeded: bool) {
        let counter = match (kind, succeeded) {
            (BatchKind::Extract, true) => &self.archives_extracted,
            (BatchKind::Extract, false) => &self.extract_failures,
            (BatchKind::Decompile, true) => &self.files_decompiled,
            (BatchKind::Decompile, false) => &self.decompile_failures,
            (BatchKind::Compile, true) => &self.files_compiled,
            (BatchKind::Compile, false) => &self.compile_failures,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_archive_built(&self) {
        self.archives_built.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_conflicts_merged(&self, count: usize) {
        self.conflicts_merged.fetch_add(count, Ordering::Relaxed);
    }

    pub fn record_status_update(&self) {
        self.status_updates.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_tool_time(&self, duration: Duration) {
        self.total_tool_time_ms
            .fetch_add(duration.as_millis() as u64, Ordering::Relaxed);
    }

    /// Get total uptime
    pub fn uptime(&self) -> Duration {
        self.start_time.elapsed()
    }

    /// Total failures across all batch kinds
    pub fn total_failures(&self) -> usize {
        self.extract_failures.load(Ordering::Relaxed)
            + self.decompile_failures.load(Ordering::Relaxed)
            + self.compile_failures.load(Ordering::Relaxed)
    }

    /// Log metrics summary
    pub fn log_summary(&self) {
        tracing::info!("=== Pipeline Metrics Summary ===");
        tracing::info!("Uptime: {:.2}s", self.uptime().as_secs_f64());
        tracing::info!(
            "Extract: {} ok, {} failed",
            self.archives_extracted.load(Ordering::Relaxed),
            self.extract_failures.load(Ordering::Relaxed)
        );
        tracing::info!(
            "Decompile: {} ok, {} failed",
            self.files_decompiled.load(Ordering::Relaxed),
            self.decompile_failures.load(Ordering::Relaxed)
        );
        tracing::info!(
            "Compile: {} ok, {} failed, {} conflicts merged, {} archives built",
            self.files_compiled.load(Ordering::Relaxed),
            self.compile_failures.load(Ordering::Relaxed),
            self.conflicts_merged.load(Ordering::Relaxed),
            self.archives_built.load(Ordering::Relaxed)
        );
        tracing::info!(
            "Tool time: {:.2}s, status updates: {}",
            self.total_tool_time_ms.load(Ordering::Relaxed) as f64 / 1000.0,
            self.status_updates.load(Ordering::Relaxed)
        );
    }
}

impl Default for PipelineMetrics {
    fn default() -> Self {
        Self::new()
    }
}
