//! Pipeline orchestrator.
//!
//! Sequences the three workspace pipelines and the direct file operations:
//!
//! - import: copy archives in, extract, decompile, rebuild the catalog ([`import`])
//! - compile: select, merge conflicts, stage, compile, package ([`compile`])
//! - clear: delete everything under the workspace root and start over
//!
//! Only one pipeline runs at a time. Each entry point claims the workspace through
//! [`StateManager::begin`] before touching anything and fails with
//! [`WorkbenchError::Busy`] when another pipeline holds it.

pub mod batch;
pub mod compile;
pub mod import;

pub use batch::{BatchOutcome, BatchSummary, BatchTracker, Schedule};
pub use compile::{CompileReport, StagedFile};
pub use import::ImportReport;

use crate::error::{Result, WorkbenchError};
use crate::metrics::PipelineMetrics;
use crate::models::{EXML_DIR, MBIN_DIR, ParallelSettings, PipelinePhase, UserConfig};
use crate::services::catalog;
use crate::services::tools::Toolchain;
use crate::state::{StateManager, StatusReporter};
use batch::BatchContext;
use camino::{Utf8Path, Utf8PathBuf};
use std::fs;
use std::sync::Arc;
use walkdir::WalkDir;

/// Outcome of a workspace clear
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ClearReport {
    pub removed: usize,
    /// Paths that could not be deleted, with the reason
    pub failures: Vec<(Utf8PathBuf, String)>,
}

/// Drives the workspace pipelines over a [`Toolchain`].
pub struct Orchestrator<T: Toolchain> {
    state: StateManager,
    status: StatusReporter,
    toolchain: Arc<T>,
    metrics: Arc<PipelineMetrics>,
    parallel: ParallelSettings,
    output_prefix: String,
}

impl<T: Toolchain> Orchestrator<T> {
    /// Create an orchestrator for the workspace held by `state`.
    ///
    /// The workspace root and its `MBINs/` and `EXMLs/` directories are created
    /// if they do not exist yet.
    pub fn new(state: StateManager, toolchain: T) -> Result<Self> {
        let metrics = Arc::new(PipelineMetrics::new());
        let orchestrator = Self {
            state,
            status: StatusReporter::new().with_metrics(metrics.clone()),
            toolchain: Arc::new(toolchain),
            metrics,
            parallel: ParallelSettings::default(),
            output_prefix: "pakbench".to_string(),
        };
        orchestrator.ensure_layout()?;
        Ok(orchestrator)
    }

    /// Apply the pacing and naming settings of a user configuration.
    pub fn with_settings(mut self, config: &UserConfig) -> Self {
        self.parallel = config.parallel;
        self.output_prefix = config.output_prefix.clone();
        self
    }

    pub fn state(&self) -> &StateManager {
        &self.state
    }

    pub fn status(&self) -> &StatusReporter {
        &self.status
    }

    pub fn metrics(&self) -> &Arc<PipelineMetrics> {
        &self.metrics
    }

    pub fn toolchain(&self) -> &T {
        &self.toolchain
    }

    fn work_dir(&self) -> Utf8PathBuf {
        self.state.read(|s| s.work_dir.clone())
    }

    fn batch_context(&self) -> BatchContext {
        BatchContext {
            status: self.status.clone(),
            metrics: self.metrics.clone(),
        }
    }

    /// Schedule for the next batch, fixed when a pipeline starts.
    fn schedule(&self, paced: bool) -> Schedule {
        let multi_threading = self.state.read(|s| s.multi_threading);
        match (multi_threading, paced) {
            (false, _) => Schedule::Sequential,
            (true, false) => Schedule::Unbounded,
            (true, true) => Schedule::Staggered(self.parallel),
        }
    }

    /// Create the workspace root, `MBINs/` and `EXMLs/`.
    pub fn ensure_layout(&self) -> Result<()> {
        let work_dir = self.work_dir();
        for dir in [work_dir.clone(), work_dir.join(MBIN_DIR), work_dir.join(EXML_DIR)] {
            fs::create_dir_all(&dir).map_err(|e| WorkbenchError::fs(&dir, e))?;
        }
        Ok(())
    }

    /// Rebuild the catalog from `EXMLs/` without running any tool.
    pub fn refresh_catalog(&self) -> Result<()> {
        let exml_dir = self.state.read(|s| s.exml_dir());
        let groups = catalog::rebuild(&exml_dir)?;
        self.state.replace_catalog(groups);
        self.status.set(self.state.read(|s| s.ready_status_text()));
        Ok(())
    }

    /// Delete everything under the workspace root, one entry at a time.
    ///
    /// Afterwards the layout is recreated and the catalog, the open file and the
    /// sticky failure set are reset.
    pub async fn clear_workspace(&self) -> Result<ClearReport> {
        let _guard = self.state.begin(PipelinePhase::Clearing)?;
        let work_dir = self.work_dir();

        tracing::info!("Clearing workspace {}", work_dir);
        self.status.set(format!("Clearing {}", work_dir));

        let mut doomed = Vec::new();
        for item in WalkDir::new(&work_dir).min_depth(1).contents_first(true) {
            let item = item?;
            match Utf8PathBuf::from_path_buf(item.path().to_path_buf()) {
                Ok(path) => doomed.push((path, item.file_type().is_dir())),
                Err(path) => tracing::warn!("Skipping non UTF-8 path: {}", path.display()),
            }
        }

        let mut report = ClearReport::default();
        let total = doomed.len();
        for (index, (path, is_dir)) in doomed.into_iter().enumerate() {
            let removed = if is_dir {
                fs::remove_dir(&path)
            } else {
                fs::remove_file(&path)
            };

            let percent = ((index + 1) as f64 * 100.0 / total as f64).round() as u32;
            match removed {
                Ok(()) => {
                    report.removed += 1;
                    self.status.set(format!("{}% Deleted {}", percent, path));
                }
                Err(e) => {
                    tracing::warn!("Failed to delete {}: {}", path, e);
                    self.status
                        .set(format!("{}% Failed to delete {}", percent, path));
                    report.failures.push((path, e.to_string()));
                }
            }
        }

        self.ensure_layout()?;
        self.state.reset_workspace();
        self.status.set(self.state.read(|s| s.ready_status_text()));

        tracing::info!(
            "Workspace cleared: {} removed, {} failed",
            report.removed,
            report.failures.len()
        );

        Ok(report)
    }

    /// Read an entry and make it the active file.
    pub fn open_file(&self, path: &Utf8Path) -> Result<String> {
        let content = fs::read_to_string(path).map_err(|e| WorkbenchError::fs(path, e))?;
        self.state.set_active_file(path.to_path_buf(), content.clone());
        self.status.set(format!("Opened {}", path));
        Ok(content)
    }

    /// Write `content` to the active file.
    pub fn save_active_file(&self, content: &str) -> Result<()> {
        let path = self
            .state
            .read(|s| s.active_file.clone())
            .ok_or(WorkbenchError::NoActiveFile)?;

        fs::write(&path, content).map_err(|e| WorkbenchError::fs(&path, e))?;
        self.state.set_editor_content(content.to_string());
        self.status.set(format!("Saved {}", path));
        Ok(())
    }

    /// Takes effect from the next pipeline run.
    pub fn set_multi_threading(&self, enabled: bool) {
        self.state.set_multi_threading(enabled);
        tracing::info!("Multi-threading {}", if enabled { "enabled" } else { "disabled" });
    }

    /// A file appeared under `EXMLs/`.
    ///
    /// Ignored while importing, since the import rebuilds the catalog when it ends.
    pub fn on_file_created(&self, path: &Utf8Path) -> bool {
        if self.state.phase() == PipelinePhase::Importing {
            tracing::debug!("Ignoring creation of {} during import", path);
            return false;
        }

        let added = self.state.add_entry(path);
        if added {
            self.status.set(format!("Loaded {}", path));
        }
        added
    }

    /// A file disappeared from `EXMLs/`.
    pub fn on_file_removed(&self, path: &Utf8Path) -> usize {
        let removed = self.state.remove_entry(path);
        if removed > 0 {
            if self.state.read(|s| s.active_file.as_deref() == Some(path)) {
                self.state.update(|s| {
                    s.active_file = None;
                    s.editor_content.clear();
                });
            }
            self.status.set(format!("Deleted {}", path));
        }
        removed
    }
}
