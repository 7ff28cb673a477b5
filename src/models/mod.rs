//! Data models for the workbench.
//!
//! - [`WorkspaceState`]: the process-wide state (work dir, catalog, active file, failure set)
//! - [`ArchiveGroup`] / [`Entry`]: the catalog tree, grouped by source archive
//! - [`PipelinePhase`]: which pipeline currently owns the workspace
//! - [`UserConfig`]: settings and tool templates loaded from `pakbench.yaml`
//!
//! State updates go through [`StateManager`](crate::state::StateManager) so that
//! readers only ever see complete snapshots.

pub mod config;
pub mod workspace;

pub use config::{ParallelSettings, ToolSettings, ToolSpec, UserConfig};
pub use workspace::{
    ARCHIVE_EXTENSION, ArchiveGroup, BINARY_MODEL_EXTENSION, EXML_DIR, Entry, EntryKind,
    MBIN_DIR, PipelinePhase, STAGING_DIR, TEXT_EXTENSION, WorkspaceState, group_name_for_archive,
    has_extension,
};
