//! Status line and diagnostics buffer shared by every pipeline.

use crate::metrics::PipelineMetrics;
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::watch;

/// Text shown before any pipeline has reported anything.
pub const INITIAL_STATUS: &str = "Initializing";

/// Publishes the single-line status text and accumulates tool diagnostics.
///
/// Writes are last-writer-wins; readers either poll [`current()`](Self::current)
/// or await changes on a [`watch::Receiver`].
#[derive(Clone)]
pub struct StatusReporter {
    status_tx: Arc<watch::Sender<String>>,
    diagnostics: Arc<Mutex<String>>,
    metrics: Option<Arc<PipelineMetrics>>,
}

impl StatusReporter {
    pub fn new() -> Self {
        let (status_tx, _) = watch::channel(INITIAL_STATUS.to_string());
        Self {
            status_tx: Arc::new(status_tx),
            diagnostics: Arc::new(Mutex::new(String::new())),
            metrics: None,
        }
    }

    /// Count every status write in `metrics`.
    pub fn with_metrics(mut self, metrics: Arc<PipelineMetrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// Replace the status line.
    pub fn set(&self, text: impl Into<String>) {
        let text = text.into();
        tracing::info!(status = %text);
        self.status_tx.send_replace(text);
        if let Some(metrics) = &self.metrics {
            metrics.record_status_update();
        }
    }

    pub fn current(&self) -> String {
        self.status_tx.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<String> {
        self.status_tx.subscribe()
    }

    /// Append a titled block to the diagnostics buffer.
    ///
    /// Blocks are separated by a blank line so a long batch reads as a list.
    pub fn append_diagnostic(&self, title: &str, detail: &str) {
        let mut buffer = self
            .diagnostics
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        if !buffer.is_empty() {
            buffer.push('\n');
        }
        buffer.push_str(title);
        buffer.push('\n');
        let detail = detail.trim_end();
        if !detail.is_empty() {
            buffer.push_str(detail);
            buffer.push('\n');
        }
    }

    pub fn clear_diagnostics(&self) {
        self.diagnostics
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }

    pub fn diagnostics(&self) -> String {
        self.diagnostics
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl Default for StatusReporter {
    fn default() -> Self {
        Self::new()
    }
}
