//! Compile pipeline: selection, conflict merge, staging, compile, packaging.

use super::Orchestrator;
use super::batch::{BatchSummary, run_batch};
use super::import::{copy_file, discard_output};
use crate::error::{Result, WorkbenchError};
use crate::metrics::BatchKind;
use crate::models::{
    ARCHIVE_EXTENSION, BINARY_MODEL_EXTENSION, Entry, EntryKind, PipelinePhase, TEXT_EXTENSION,
    has_extension,
};
use crate::services::tools::{RunMode, Toolchain};
use crate::services::{catalog, exml, merge};
use camino::{Utf8Path, Utf8PathBuf};
use indexmap::IndexMap;
use std::fs;

/// One file of the rebuilt archive, before it is written to staging.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StagedFile {
    /// Path inside the archive
    pub relative_path: Utf8PathBuf,
    pub kind: EntryKind,
    /// Selected entries mapping to `relative_path`, in selection order
    pub sources: Vec<Entry>,
}

impl StagedFile {
    /// More than one selected entry maps to this path.
    pub fn is_conflict(&self) -> bool {
        self.sources.len() > 1
    }

    /// Entries folded into the first source by the merge.
    pub fn merged_from(&self) -> &[Entry] {
        if self.kind.is_mergeable() {
            &self.sources[1..]
        } else {
            &[]
        }
    }
}

/// Group selected entries by the path they occupy inside the archive.
///
/// Entries sharing a path share an extension and therefore a kind. Text buckets
/// are merged in selection order; passthrough buckets keep the last entry.
pub fn plan_staging(exml_dir: &Utf8Path, selected: &[Entry]) -> Vec<StagedFile> {
    let mut staged: IndexMap<Utf8PathBuf, StagedFile> = IndexMap::new();

    for entry in selected {
        let Some(relative_path) = catalog::archive_relative_path(exml_dir, entry) else {
            tracing::warn!("Entry outside its group directory: {}", entry.path);
            continue;
        };

        staged
            .entry(relative_path.clone())
            .or_insert_with(|| StagedFile {
                relative_path,
                kind: entry.kind,
                sources: Vec::new(),
            })
            .sources
            .push(entry.clone());
    }

    staged.into_values().collect()
}

/// Workspace path for a generated archive.
///
/// `<prefix>-<millis>.pak`, with `-<n>` appended until no file has that name.
pub fn unique_archive_path(work_dir: &Utf8Path, prefix: &str, millis: i64) -> Utf8PathBuf {
    let mut candidate = work_dir.join(format!("{}-{}.{}", prefix, millis, ARCHIVE_EXTENSION));
    let mut n = 1;
    while candidate.exists() {
        candidate = work_dir.join(format!("{}-{}-{}.{}", prefix, millis, n, ARCHIVE_EXTENSION));
        n += 1;
    }
    candidate
}

/// Outcome of one compile run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompileReport {
    pub selected: usize,
    /// Text paths assembled from more than one entry
    pub conflicts_merged: usize,
    /// Files written to staging
    pub staged: Vec<Utf8PathBuf>,
    pub staging_failures: Vec<(Utf8PathBuf, String)>,
    pub compile: BatchSummary,
    /// The new archive inside the workspace
    pub archive: Utf8PathBuf,
}

impl<T: Toolchain> Orchestrator<T> {
    /// Build a new archive from the selected entries.
    ///
    /// Fails before any side effect with `Busy` or `NoSelection`. Per-file staging
    /// and compile failures are reported and leave the file out of the archive.
    pub async fn compile_selection(&self) -> Result<CompileReport> {
        let _guard = self.state.begin(PipelinePhase::Compiling)?;

        let (selected, exml_dir, staging_dir, work_dir) = self.state.read(|s| {
            (
                s.selected_entries(),
                s.exml_dir(),
                s.staging_dir(),
                s.work_dir.clone(),
            )
        });
        if selected.is_empty() {
            return Err(WorkbenchError::NoSelection);
        }

        tracing::info!("Compiling {} selected entries", selected.len());

        let plan = plan_staging(&exml_dir, &selected);
        let conflicts_merged = plan
            .iter()
            .filter(|f| f.is_conflict() && f.kind.is_mergeable())
            .count();
        if conflicts_merged > 0 {
            self.status.set(format!(
                "{} conflict{} found, will attempt reconciliation",
                conflicts_merged,
                if conflicts_merged == 1 { "" } else { "s" }
            ));
            self.metrics.record_conflicts_merged(conflicts_merged);
        }

        reset_dir(&staging_dir)?;

        let mut staged = Vec::new();
        let mut staging_failures = Vec::new();
        for file in &plan {
            let target = staging_dir.join(&file.relative_path);
            match stage_file(file, &target) {
                Ok(()) => staged.push(target),
                Err(e) => {
                    tracing::warn!("Failed to stage {}: {}", file.relative_path, e);
                    self.status.set(format!("Failed to stage {}", file.relative_path));
                    self.status.append_diagnostic(
                        &format!("Failed to stage {}", file.relative_path),
                        &e.to_string(),
                    );
                    staging_failures.push((file.relative_path.clone(), e.to_string()));
                }
            }
        }

        let compile = self.compile_staged(&staging_dir).await?;

        let inputs = package_inputs(&staged, &compile);
        let archive = self.package(&staging_dir, &work_dir, &inputs).await?;

        Ok(CompileReport {
            selected: selected.len(),
            conflicts_merged,
            staged,
            staging_failures,
            compile,
            archive,
        })
    }

    /// Compile every staged text file in place, removing the text on success.
    async fn compile_staged(&self, staging_dir: &Utf8Path) -> Result<BatchSummary> {
        let texts: Vec<Utf8PathBuf> = catalog::walk_files(staging_dir)?
            .into_iter()
            .filter(|p| has_extension(p, TEXT_EXTENSION))
            .collect();
        if texts.is_empty() {
            return Ok(BatchSummary::default());
        }

        let toolchain = self.toolchain.clone();
        let summary = run_batch(
            BatchKind::Compile,
            texts,
            self.schedule(true),
            &self.batch_context(),
            move |text, mode| {
                let toolchain = toolchain.clone();
                async move {
                    let binary = text.with_extension(BINARY_MODEL_EXTENSION);
                    if let Err(e) = toolchain.compile(&text, &binary, mode).await {
                        discard_output(&binary);
                        return Err(e);
                    }
                    fs::remove_file(&text).map_err(|e| WorkbenchError::fs(&text, e))?;
                    Ok(())
                }
            },
        )
        .await;

        Ok(summary)
    }

    /// Build the archive from `inputs` and move it into the workspace root.
    async fn package(
        &self,
        staging_dir: &Utf8Path,
        work_dir: &Utf8Path,
        inputs: &[Utf8PathBuf],
    ) -> Result<Utf8PathBuf> {
        if inputs.is_empty() {
            return Err(WorkbenchError::PackagingFailed(
                "nothing left to package".to_string(),
            ));
        }

        let relative: Vec<Utf8PathBuf> = inputs
            .iter()
            .filter_map(|p| p.strip_prefix(staging_dir).ok().map(Utf8Path::to_path_buf))
            .collect();

        self.status.set(format!("Packaging {} files", relative.len()));
        self.toolchain
            .build(staging_dir, &relative, RunMode::Blocking)
            .await
            .map_err(|e| WorkbenchError::PackagingFailed(e.to_string()))?;

        let built = catalog::walk_files(staging_dir)?
            .into_iter()
            .find(|p| has_extension(p, ARCHIVE_EXTENSION))
            .ok_or_else(|| {
                WorkbenchError::PackagingFailed("the build tool produced no archive".to_string())
            })?;

        let destination = unique_archive_path(
            work_dir,
            &self.output_prefix,
            chrono::Utc::now().timestamp_millis(),
        );
        fs::rename(&built, &destination).map_err(|e| WorkbenchError::fs(&built, e))?;

        self.metrics.record_archive_built();
        self.status.set(format!("Archive created at {}", destination));
        tracing::info!("Archive created at {}", destination);

        Ok(destination)
    }
}

/// Files handed to the build tool: staged passthrough files plus the binaries of
/// the text files that compiled. Anything a failed compile left behind is not included.
fn package_inputs(staged: &[Utf8PathBuf], compile: &BatchSummary) -> Vec<Utf8PathBuf> {
    let mut inputs: Vec<Utf8PathBuf> = staged
        .iter()
        .filter(|p| !has_extension(p, TEXT_EXTENSION))
        .cloned()
        .chain(
            compile
                .successes()
                .map(|text| text.with_extension(BINARY_MODEL_EXTENSION)),
        )
        .collect();
    inputs.sort();
    inputs.dedup();
    inputs
}

/// Write one planned file to `target`.
fn stage_file(file: &StagedFile, target: &Utf8Path) -> Result<()> {
    let Some(last) = file.sources.last() else {
        return Err(WorkbenchError::InvalidDocument {
            path: file.relative_path.clone(),
            reason: "no selected entry maps to this path".to_string(),
        });
    };

    if file.kind.is_mergeable() && file.is_conflict() {
        let trees = file
            .sources
            .iter()
            .map(|entry| exml::read_document(&entry.path))
            .collect::<Result<Vec<_>>>()?;
        tracing::debug!(
            "Merging {} sources into {}",
            trees.len(),
            file.relative_path
        );
        exml::write_document(target, &merge::merge(&trees))
    } else {
        copy_file(&last.path, target)
    }
}

/// Remove `dir` with everything in it and create it empty.
fn reset_dir(dir: &Utf8Path) -> Result<()> {
    if dir.exists() {
        fs::remove_dir_all(dir).map_err(|e| WorkbenchError::fs(dir, e))?;
    }
    fs::create_dir_all(dir).map_err(|e| WorkbenchError::fs(dir, e))
}
