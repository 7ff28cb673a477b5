//! Services module - workspace pipelines and the pieces they are built from.
//!
//! Nothing here depends on a user interface. Every external effect goes through the
//! filesystem, a [`Toolchain`] or the [`StatusReporter`](crate::state::StatusReporter).
//!
//! # Components
//!
//! - [`catalog`]: walks `EXMLs/` and maintains the group/entry tree
//! - [`tools`]: runs the archive tool and the model compiler ([`CommandToolchain`])
//! - [`merge`]: [`StructuredTree`] and the deep merge used for conflicting entries
//! - [`exml`]: reads and writes text entries as structured trees
//! - [`pipeline`]: the [`Orchestrator`] with the import, compile and clear pipelines
//!
//! # Usage Example
//!
//! ```ignore
//! use pakbench::services::{CommandToolchain, Orchestrator, ToolRunner};
//! use pakbench::StateManager;
//!
//! let toolchain = CommandToolchain::new(user_config.tools.clone(), ToolRunner::new());
//! let orchestrator = Orchestrator::new(StateManager::new(work_dir), toolchain)?;
//!
//! orchestrator.import_archives(&["Mod.pak".into()]).await?;
//! orchestrator.state().toggle_group_selected("_Mod");
//! let report = orchestrator.compile_selection().await?;
//! println!("{}", report.archive);
//! ```

pub mod catalog;
pub mod exml;
pub mod merge;
pub mod pipeline;
pub mod tools;

pub use merge::{StructuredTree, merge};
pub use pipeline::{
    BatchOutcome, BatchSummary, ClearReport, CompileReport, ImportReport, Orchestrator, StagedFile,
};
pub use tools::{CommandToolchain, RunMode, ToolCommand, ToolOutput, ToolRunner, Toolchain};
