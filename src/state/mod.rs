// State management module
//
// StateManager wraps WorkspaceState with thread-safe access using Arc<RwLock<T>>,
// emits change events for the UI layer and owns the pipeline phase.

pub mod status;

pub use status::StatusReporter;

use crate::error::{Result, WorkbenchError};
use crate::models::{ArchiveGroup, PipelinePhase, UserConfig, WorkspaceState};
use crate::services::catalog;
use camino::{Utf8Path, Utf8PathBuf};
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::{Arc, PoisonError, RwLock};
use tokio::sync::broadcast;

/// Change events emitted when state is modified
#[derive(Clone, Debug, PartialEq)]
pub enum StateChange {
    /// The catalog vector was replaced or edited
    CatalogReplaced { groups: usize, entries: usize },

    /// The number of selected entries changed
    SelectionChanged { selected: usize },

    /// A different entry was opened (or the open entry was closed)
    ActiveFileChanged { path: Option<Utf8PathBuf> },

    MultiThreadingChanged { enabled: bool },

    /// The sticky decompile failure set grew or was reset
    FailuresChanged { count: usize },

    /// A pipeline started or finished
    PhaseChanged {
        from: PipelinePhase,
        to: PipelinePhase,
    },

    /// The workspace was cleared
    WorkspaceReset,
}

/// Thread-safe workspace state with event emission and pipeline exclusion.
///
/// - [`read()`](Self::read) / [`snapshot()`](Self::snapshot) for readers
/// - [`update()`](Self::update) for mutations with automatic event emission
/// - [`begin()`](Self::begin) to claim the workspace for one pipeline
pub struct StateManager {
    state: Arc<RwLock<WorkspaceState>>,

    /// Current [`PipelinePhase`] as its `u8` discriminant
    phase: Arc<AtomicU8>,

    state_tx: broadcast::Sender<StateChange>,
}

/// Claim on the workspace held by the running pipeline.
///
/// Dropping the guard returns the workspace to [`PipelinePhase::Idle`], so early
/// returns and errors release it too.
#[must_use = "the workspace is released as soon as the guard is dropped"]
pub struct PhaseGuard {
    manager: StateManager,
    phase: PipelinePhase,
}

impl std::fmt::Debug for PhaseGuard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PhaseGuard")
            .field("phase", &self.phase)
            .finish_non_exhaustive()
    }
}

impl PhaseGuard {
    pub fn phase(&self) -> PipelinePhase {
        self.phase
    }
}

impl Drop for PhaseGuard {
    fn drop(&mut self) {
        self.manager.finish(self.phase);
    }
}

impl StateManager {
    /// Create a new StateManager for the given workspace root
    pub fn new(work_dir: impl Into<Utf8PathBuf>) -> Self {
        let (state_tx, _) = broadcast::channel(100);
        Self {
            state: Arc::new(RwLock::new(WorkspaceState::new(work_dir))),
            phase: Arc::new(AtomicU8::new(PipelinePhase::Idle as u8)),
            state_tx,
        }
    }

    /// Get a read-only snapshot of the current state
    pub fn snapshot(&self) -> WorkspaceState {
        self.state
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Execute a function with read access to the state
    pub fn read<F, R>(&self, f: F) -> R
    where
        F: FnOnce(&WorkspaceState) -> R,
    {
        let state = self.state.read().unwrap_or_else(PoisonError::into_inner);
        f(&state)
    }

    /// Update the state and emit change events
    ///
    /// # Returns
    /// The StateChange events that were emitted
    pub fn update<F>(&self, update_fn: F) -> Vec<StateChange>
    where
        F: FnOnce(&mut WorkspaceState),
    {
        let mut state = self.state.write().unwrap_or_else(PoisonError::into_inner);
        let old_state = state.clone();

        update_fn(&mut state);

        let changes = Self::detect_changes(&old_state, &state);
        drop(state);

        for change in &changes {
            // Ignore send errors - it's OK if no one is listening
            let _ = self.state_tx.send(change.clone());
        }

        changes
    }

    /// Subscribe to state change events
    pub fn subscribe(&self) -> broadcast::Receiver<StateChange> {
        self.state_tx.subscribe()
    }

    fn detect_changes(old: &WorkspaceState, new: &WorkspaceState) -> Vec<StateChange> {
        let mut changes = Vec::new();

        if old.catalog != new.catalog {
            let selection_only = old.catalog.len() == new.catalog.len()
                && old
                    .catalog
                    .iter()
                    .zip(&new.catalog)
                    .all(|(a, b)| a.name == b.name && same_paths(a, b));
            if !selection_only {
                changes.push(StateChange::CatalogReplaced {
                    groups: new.catalog.len(),
                    entries: new.entry_count(),
                });
            }
        }

        let (old_selected, new_selected) =
            (old.selected_entries().len(), new.selected_entries().len());
        if old_selected != new_selected {
            changes.push(StateChange::SelectionChanged {
                selected: new_selected,
            });
        }

        if old.active_file != new.active_file {
            changes.push(StateChange::ActiveFileChanged {
                path: new.active_file.clone(),
            });
        }

        if old.multi_threading != new.multi_threading {
            changes.push(StateChange::MultiThreadingChanged {
                enabled: new.multi_threading,
            });
        }

        if old.failures.len() != new.failures.len() {
            changes.push(StateChange::FailuresChanged {
                count: new.failures.len(),
            });
        }

        changes
    }

    // ===== Pipeline phase =====

    pub fn phase(&self) -> PipelinePhase {
        PipelinePhase::from_u8(self.phase.load(Ordering::Acquire))
    }

    pub fn is_idle(&self) -> bool {
        self.phase() == PipelinePhase::Idle
    }

    /// Claim the workspace for `phase`.
    ///
    /// A single compare-and-swap from Idle; any other current phase yields
    /// [`WorkbenchError::Busy`] and leaves the running pipeline untouched.
    pub fn begin(&self, phase: PipelinePhase) -> Result<PhaseGuard> {
        debug_assert_ne!(phase, PipelinePhase::Idle);

        match self.phase.compare_exchange(
            PipelinePhase::Idle as u8,
            phase as u8,
            Ordering::AcqRel,
            Ordering::Acquire,
        ) {
            Ok(_) => {
                tracing::info!("Pipeline started: {}", phase);
                let _ = self.state_tx.send(StateChange::PhaseChanged {
                    from: PipelinePhase::Idle,
                    to: phase,
                });
                Ok(PhaseGuard {
                    manager: self.clone(),
                    phase,
                })
            }
            Err(current) => {
                let active = PipelinePhase::from_u8(current);
                tracing::warn!("Rejected {} request: {} is in progress", phase, active);
                Err(WorkbenchError::Busy { active })
            }
        }
    }

    fn finish(&self, phase: PipelinePhase) {
        self.phase
            .store(PipelinePhase::Idle as u8, Ordering::Release);
        tracing::info!("Pipeline finished: {}", phase);
        let _ = self.state_tx.send(StateChange::PhaseChanged {
            from: phase,
            to: PipelinePhase::Idle,
        });
    }

    // ===== Catalog =====

    /// Replace the catalog wholesale, carrying group expansion across by name.
    pub fn replace_catalog(&self, mut groups: Vec<ArchiveGroup>) -> Vec<StateChange> {
        self.update(move |state| {
            catalog::carry_expansion(&state.catalog, &mut groups);
            state.catalog = groups;
        })
    }

    /// Add one file to the catalog (see [`catalog::add_entry`]).
    pub fn add_entry(&self, path: &Utf8Path) -> bool {
        let mut added = false;
        self.update(|state| {
            let exml_dir = state.exml_dir();
            added = catalog::add_entry(&mut state.catalog, &exml_dir, path);
        });
        added
    }

    /// Remove every entry for `path`, pruning groups left empty.
    pub fn remove_entry(&self, path: &Utf8Path) -> usize {
        let mut removed = 0;
        self.update(|state| {
            removed = catalog::remove_entry(&mut state.catalog, path);
        });
        removed
    }

    // ===== Selection =====

    /// Flip a group's selection; all of its entries follow.
    pub fn toggle_group_selected(&self, name: &str) -> Vec<StateChange> {
        self.update(|state| {
            if let Some(group) = state.catalog.iter_mut().find(|g| g.name == name) {
                let selected = !group.selected;
                group.selected = selected;
                for entry in &mut group.entries {
                    entry.selected = selected;
                }
            }
        })
    }

    pub fn toggle_entry_selected(&self, path: &Utf8Path) -> Vec<StateChange> {
        self.update(|state| {
            for entry in state
                .catalog
                .iter_mut()
                .flat_map(|g| g.entries.iter_mut())
                .filter(|e| e.path == path)
            {
                entry.selected = !entry.selected;
            }
        })
    }

    pub fn toggle_group_expanded(&self, name: &str) -> Vec<StateChange> {
        self.update(|state| {
            if let Some(group) = state.catalog.iter_mut().find(|g| g.name == name) {
                group.expanded = !group.expanded;
            }
        })
    }

    pub fn selected_status_text(&self) -> String {
        self.read(|s| s.selected_status_text())
    }

    // ===== Active file =====

    pub fn set_active_file(&self, path: Utf8PathBuf, content: String) -> Vec<StateChange> {
        self.update(|state| {
            state.active_file = Some(path);
            state.editor_content = content;
        })
    }

    pub fn set_editor_content(&self, content: String) -> Vec<StateChange> {
        self.update(|state| state.editor_content = content)
    }

    // ===== Settings and failures =====

    pub fn set_multi_threading(&self, enabled: bool) -> Vec<StateChange> {
        self.update(|state| state.multi_threading = enabled)
    }

    /// Add a path to the sticky failure set.
    ///
    /// # Returns
    /// `true` if the path was not already recorded
    pub fn record_failure(&self, path: &Utf8Path) -> bool {
        let mut inserted = false;
        self.update(|state| inserted = state.failures.insert(path.to_path_buf()));
        inserted
    }

    pub fn is_failed(&self, path: &Utf8Path) -> bool {
        self.read(|s| s.failures.contains(path))
    }

    /// Reset everything a workspace clear discards.
    pub fn reset_workspace(&self) -> Vec<StateChange> {
        let mut changes = self.update(|state| {
            state.catalog.clear();
            state.active_file = None;
            state.editor_content.clear();
            state.failures.clear();
        });

        let _ = self.state_tx.send(StateChange::WorkspaceReset);
        changes.push(StateChange::WorkspaceReset);
        changes
    }

    /// Load settings from the user configuration.
    pub fn load_from_user_config(
        &self,
        user_config: &UserConfig,
        work_dir: Utf8PathBuf,
    ) -> Vec<StateChange> {
        self.update(|state| {
            state.work_dir = work_dir;
            state.multi_threading = user_config.multi_threading;

            tracing::info!(
                "Loaded user config: work_dir={}, multi_threading={}",
                state.work_dir,
                state.multi_threading
            );
        })
    }
}

fn same_paths(a: &ArchiveGroup, b: &ArchiveGroup) -> bool {
    a.entries.len() == b.entries.len()
        && a.entries.iter().zip(&b.entries).all(|(x, y)| x.path == y.path)
}

// Make StateManager cloneable for sharing across tasks
impl Clone for StateManager {
    fn clone(&self) -> Self {
        Self {
            state: Arc::clone(&self.state),
            phase: Arc::clone(&self.phase),
            state_tx: self.state_tx.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Entry, EntryKind};

    fn sample_catalog() -> Vec<ArchiveGroup> {
        let mut group = ArchiveGroup::new("_a");
        for name in ["x.exml", "y.dds"] {
            let path = Utf8PathBuf::from(format!("/w/EXMLs/_a/{}", name));
            let kind = EntryKind::from_path(&path).unwrap();
            group.entries.push(Entry::new("_a", path, kind));
        }
        vec![group]
    }

    #[test]
    fn test_new_state_manager() {
        let manager = StateManager::new("/w");
        let state = manager.snapshot();

        assert_eq!(state.work_dir, Utf8PathBuf::from("/w"));
        assert!(state.catalog.is_empty());
        assert!(manager.is_idle());
    }

    #[test]
    fn test_begin_rejects_second_pipeline() {
        let manager = StateManager::new("/w");

        let guard = manager.begin(PipelinePhase::Importing).unwrap();
        assert_eq!(manager.phase(), PipelinePhase::Importing);

        let err = manager.begin(PipelinePhase::Clearing).err().unwrap();
        assert!(matches!(
            err,
            WorkbenchError::Busy {
                active: PipelinePhase::Importing
            }
        ));
        // Rejection must not disturb the running pipeline
        assert_eq!(manager.phase(), PipelinePhase::Importing);

        drop(guard);
        assert!(manager.is_idle());
        assert!(manager.begin(PipelinePhase::Clearing).is_ok());
    }

    #[test]
    fn test_replace_catalog_emits_event() {
        let manager = StateManager::new("/w");
        let changes = manager.replace_catalog(sample_catalog());

        assert_eq!(
            changes,
            vec![StateChange::CatalogReplaced {
                groups: 1,
                entries: 2
            }]
        );
    }

    #[test]
    fn test_replace_catalog_keeps_expansion() {
        let manager = StateManager::new("/w");
        manager.replace_catalog(sample_catalog());
        manager.toggle_group_expanded("_a");

        manager.replace_catalog(sample_catalog());
        assert!(manager.read(|s| s.catalog[0].expanded));
    }

    #[test]
    fn test_toggle_group_selects_entries() {
        let manager = StateManager::new("/w");
        manager.replace_catalog(sample_catalog());

        let changes = manager.toggle_group_selected("_a");
        assert_eq!(changes, vec![StateChange::SelectionChanged { selected: 2 }]);
        assert!(manager.read(|s| s.catalog[0].entries.iter().all(|e| e.selected)));
        assert_eq!(manager.selected_status_text(), "2 files selected");
    }

    #[test]
    fn test_record_failure_is_sticky() {
        let manager = StateManager::new("/w");
        let path = Utf8Path::new("/w/MBINs/_a/x.MBIN");

        assert!(manager.record_failure(path));
        assert!(!manager.record_failure(path));
        assert!(manager.is_failed(path));
    }

    #[test]
    fn test_reset_workspace() {
        let manager = StateManager::new("/w");
        manager.replace_catalog(sample_catalog());
        manager.set_active_file("/w/EXMLs/_a/x.exml".into(), "<Data/>".into());
        manager.record_failure(Utf8Path::new("/w/MBINs/_a/bad.MBIN"));

        let changes = manager.reset_workspace();
        assert!(changes.contains(&StateChange::WorkspaceReset));

        let state = manager.snapshot();
        assert!(state.catalog.is_empty());
        assert!(state.active_file.is_none());
        assert!(state.editor_content.is_empty());
        assert!(state.failures.is_empty());
    }

    #[test]
    fn test_subscribe_to_phase_changes() {
        let manager = StateManager::new("/w");
        let mut rx = manager.subscribe();

        drop(manager.begin(PipelinePhase::Compiling).unwrap());

        assert_eq!(
            rx.try_recv().unwrap(),
            StateChange::PhaseChanged {
                from: PipelinePhase::Idle,
                to: PipelinePhase::Compiling
            }
        );
        assert_eq!(
            rx.try_recv().unwrap(),
            StateChange::PhaseChanged {
                from: PipelinePhase::Compiling,
                to: PipelinePhase::Idle
            }
        );
    }

    #[test]
    fn test_clone_shares_state() {
        let manager1 = StateManager::new("/w");
        let manager2 = manager1.clone();

        manager1.set_multi_threading(true);
        assert!(manager2.read(|s| s.multi_threading));
    }
}
