//! Import pipeline: copy archives in, extract, decompile, rebuild the catalog.

use super::Orchestrator;
use super::batch::{BatchSummary, run_batch};
use crate::error::{Result, WorkbenchError};
use crate::metrics::BatchKind;
use crate::models::{
    ARCHIVE_EXTENSION, BINARY_MODEL_EXTENSION, EntryKind, PipelinePhase, TEXT_EXTENSION,
    group_name_for_archive, has_extension,
};
use crate::services::catalog;
use crate::services::tools::{RunMode, Toolchain};
use camino::{Utf8Path, Utf8PathBuf};
use regex::Regex;
use std::fs;
use std::sync::LazyLock;

static WHITESPACE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\s").expect("Invalid whitespace regex"));

/// File name an imported archive gets inside the workspace.
///
/// Whitespace is replaced by `.` so that the name survives the tool command lines.
pub fn workspace_archive_name(file_name: &str) -> String {
    WHITESPACE.replace_all(file_name, ".").into_owned()
}

/// Outcome of one import run
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ImportReport {
    /// Archives copied into the workspace root
    pub copied: Vec<Utf8PathBuf>,
    /// Archives that could not be copied, with the reason
    pub copy_failures: Vec<(Utf8PathBuf, String)>,
    pub extract: BatchSummary,
    pub decompile: BatchSummary,
    /// Passthrough files copied into `EXMLs/`
    pub passthrough: usize,
    pub groups: usize,
    pub entries: usize,
}

/// Work found by walking `MBINs/`
#[derive(Debug, Default)]
struct DecompilePlan {
    /// Binary models still to decompile, in walk order
    pending: Vec<Utf8PathBuf>,
    /// (source, destination) pairs of passthrough files not yet in `EXMLs/`
    passthrough: Vec<(Utf8PathBuf, Utf8PathBuf)>,
}

impl<T: Toolchain> Orchestrator<T> {
    /// Import archive files into the workspace.
    ///
    /// With no paths this re-scans the workspace: anything not extracted yet is
    /// extracted, anything not decompiled yet is decompiled, and the catalog is
    /// rebuilt. Per-item failures are reported and never stop the pipeline.
    pub async fn import_archives(&self, archives: &[Utf8PathBuf]) -> Result<ImportReport> {
        let _guard = self.state.begin(PipelinePhase::Importing)?;
        self.ensure_layout()?;

        let mut report = ImportReport::default();
        let work_dir = self.work_dir();

        for archive in archives {
            match self.copy_into_workspace(archive, &work_dir) {
                Ok(Some(copied)) => report.copied.push(copied),
                Ok(None) => {}
                Err(e) => {
                    tracing::warn!("Failed to import {}: {}", archive, e);
                    self.status.set(format!("Failed to import {}", archive));
                    self.status
                        .append_diagnostic(&format!("Failed to import {}", archive), &e.to_string());
                    report.copy_failures.push((archive.clone(), e.to_string()));
                }
            }
        }

        report.extract = self.extract_new_archives(&work_dir).await?;
        report.decompile = self.decompile_pending(&mut report.passthrough).await?;

        let exml_dir = self.state.read(|s| s.exml_dir());
        let groups = catalog::rebuild(&exml_dir)?;
        self.state.replace_catalog(groups);

        let (groups, entries, ready) =
            self.state
                .read(|s| (s.catalog.len(), s.entry_count(), s.ready_status_text()));
        report.groups = groups;
        report.entries = entries;
        self.status.set(ready);

        tracing::info!(
            "Import finished: {} extracted, {} decompiled, {} failures",
            report.extract.succeeded(),
            report.decompile.succeeded(),
            report.extract.failed() + report.decompile.failed() + report.copy_failures.len()
        );

        Ok(report)
    }

    /// Copy one archive into the workspace root under its normalized name.
    ///
    /// # Returns
    /// The destination, or `None` when the archive already is that file
    fn copy_into_workspace(
        &self,
        archive: &Utf8Path,
        work_dir: &Utf8Path,
    ) -> Result<Option<Utf8PathBuf>> {
        let file_name = archive.file_name().ok_or_else(|| {
            WorkbenchError::fs(
                archive,
                std::io::Error::new(std::io::ErrorKind::InvalidInput, "not a file path"),
            )
        })?;
        let destination = work_dir.join(workspace_archive_name(file_name));

        if destination.as_path() == archive {
            return Ok(None);
        }

        self.status.set(format!("Copying {}", archive));
        fs::copy(archive, &destination).map_err(|e| WorkbenchError::fs(archive, e))?;
        tracing::info!("Copied {} to {}", archive, destination);
        Ok(Some(destination))
    }

    /// Archives directly inside the workspace root whose group is not cataloged yet.
    fn archives_to_extract(&self, work_dir: &Utf8Path) -> Result<Vec<Utf8PathBuf>> {
        let known: Vec<String> = self
            .state
            .read(|s| s.catalog.iter().map(|g| g.name.clone()).collect());

        let mut archives = Vec::new();
        for item in fs::read_dir(work_dir).map_err(|e| WorkbenchError::fs(work_dir, e))? {
            let item = item.map_err(|e| WorkbenchError::fs(work_dir, e))?;
            let Ok(path) = Utf8PathBuf::from_path_buf(item.path()) else {
                continue;
            };
            if !path.is_file() || !has_extension(&path, ARCHIVE_EXTENSION) {
                continue;
            }
            match group_name_for_archive(&path) {
                Some(group) if known.contains(&group) => {
                    tracing::debug!("Already extracted: {}", path);
                }
                Some(_) => archives.push(path),
                None => {}
            }
        }

        archives.sort();
        Ok(archives)
    }

    async fn extract_new_archives(&self, work_dir: &Utf8Path) -> Result<BatchSummary> {
        let archives = self.archives_to_extract(work_dir)?;
        if archives.is_empty() {
            return Ok(BatchSummary::default());
        }

        let mbin_dir = self.state.read(|s| s.mbin_dir());
        let toolchain = self.toolchain.clone();

        let summary = run_batch(
            BatchKind::Extract,
            archives,
            self.schedule(false),
            &self.batch_context(),
            move |archive, mode| {
                let toolchain = toolchain.clone();
                let mbin_dir = mbin_dir.clone();
                async move {
                    let group = group_name_for_archive(&archive).unwrap_or_default();
                    let output_dir = mbin_dir.join(group);
                    fs::create_dir_all(&output_dir)
                        .map_err(|e| WorkbenchError::fs(&output_dir, e))?;
                    toolchain.extract(&archive, &output_dir, mode).await?;
                    Ok(())
                }
            },
        )
        .await;

        Ok(summary)
    }

    /// Walk `MBINs/` and split it into decompile work and passthrough copies.
    fn plan_decompile(&self) -> Result<DecompilePlan> {
        let (mbin_dir, exml_dir) = self.state.read(|s| (s.mbin_dir(), s.exml_dir()));
        let mut plan = DecompilePlan::default();

        for path in catalog::walk_files(&mbin_dir)? {
            let Ok(relative) = path.strip_prefix(&mbin_dir) else {
                continue;
            };

            if has_extension(&path, BINARY_MODEL_EXTENSION) {
                if text_target(&mbin_dir, &exml_dir, &path)?.exists() {
                    continue;
                }
                if self.state.is_failed(&path) {
                    tracing::debug!("Not retrying failed decompile: {}", path);
                    continue;
                }
                plan.pending.push(path.clone());
            } else if EntryKind::from_path(&path).is_some_and(EntryKind::is_passthrough) {
                let target = exml_dir.join(relative);
                if !target.exists() {
                    plan.passthrough.push((path.clone(), target));
                }
            }
        }

        Ok(plan)
    }

    async fn decompile_pending(&self, passthrough_copied: &mut usize) -> Result<BatchSummary> {
        let plan = self.plan_decompile()?;

        for (source, target) in &plan.passthrough {
            match copy_file(source, target) {
                Ok(()) => *passthrough_copied += 1,
                Err(e) => {
                    tracing::warn!("Failed to copy {}: {}", source, e);
                    self.status.set(format!("Failed to copy {}", source));
                    self.status
                        .append_diagnostic(&format!("Failed to copy {}", source), &e.to_string());
                }
            }
        }

        if plan.pending.is_empty() {
            return Ok(BatchSummary::default());
        }

        let (mbin_dir, exml_dir) = self.state.read(|s| (s.mbin_dir(), s.exml_dir()));
        let toolchain = self.toolchain.clone();
        let state = self.state.clone();

        let summary = run_batch(
            BatchKind::Decompile,
            plan.pending,
            self.schedule(true),
            &self.batch_context(),
            move |source, mode| {
                let toolchain = toolchain.clone();
                let state = state.clone();
                let target = text_target(&mbin_dir, &exml_dir, &source);
                async move {
                    let result = match target {
                        Ok(target) => decompile_one(&*toolchain, &source, &target, mode).await,
                        Err(e) => Err(e),
                    };
                    if result.is_err() {
                        state.record_failure(&source);
                    }
                    result
                }
            },
        )
        .await;

        Ok(summary)
    }
}

async fn decompile_one<T: Toolchain>(
    toolchain: &T,
    source: &Utf8Path,
    target: &Utf8Path,
    mode: RunMode,
) -> Result<()> {
    if let Some(parent) = target.parent() {
        fs::create_dir_all(parent).map_err(|e| WorkbenchError::fs(parent, e))?;
    }
    if let Err(e) = toolchain.decompile(source, target, mode).await {
        // A tool that reports failure may still have written its output
        discard_output(target);
        return Err(e);
    }
    Ok(())
}

/// `EXMLs/` path a binary model under `MBINs/` decompiles to.
fn text_target(mbin_dir: &Utf8Path, exml_dir: &Utf8Path, source: &Utf8Path) -> Result<Utf8PathBuf> {
    let relative = source.strip_prefix(mbin_dir).map_err(|_| {
        WorkbenchError::fs(
            source,
            std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                format!("not inside {}", mbin_dir),
            ),
        )
    })?;
    Ok(exml_dir.join(relative).with_extension(TEXT_EXTENSION))
}

/// Remove whatever a failed tool run left at `output`.
pub(crate) fn discard_output(output: &Utf8Path) {
    if output.is_file() {
        match fs::remove_file(output) {
            Ok(()) => tracing::debug!("Removed output of failed run: {}", output),
            Err(e) => tracing::warn!("Failed to remove {}: {}", output, e),
        }
    }
}

/// Copy a file, creating the destination's parent directories.
pub(crate) fn copy_file(source: &Utf8Path, target: &Utf8Path) -> Result<()> {
    if let Some(parent) = target.parent() {
        fs::create_dir_all(parent).map_err(|e| WorkbenchError::fs(parent, e))?;
    }
    fs::copy(source, target).map_err(|e| WorkbenchError::fs(source, e))?;
    Ok(())
}
