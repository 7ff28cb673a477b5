// PakBench - extract, decompile, edit and repackage game archives
//
// This is the library crate containing the workspace model, the pipelines and the
// external tool plumbing. The binary crate (main.rs) provides a command-line shell.

pub mod config;
pub mod error;
pub mod logging;
pub mod metrics;
pub mod models;
pub mod services;
pub mod state;

// Re-export commonly used types for convenience
pub use config::ConfigManager;
pub use error::{Result, WorkbenchError};
pub use metrics::PipelineMetrics;
pub use models::{ArchiveGroup, Entry, EntryKind, PipelinePhase, UserConfig, WorkspaceState};
pub use services::{CommandToolchain, Orchestrator, ToolRunner, Toolchain};
pub use state::{StateChange, StateManager, StatusReporter};

/// Application version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Application name
pub const APP_NAME: &str = env!("CARGO_PKG_NAME");
