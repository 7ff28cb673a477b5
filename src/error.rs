//! Error type shared by the catalog, tool runner and pipeline.

use crate::models::PipelinePhase;
use camino::{Utf8Path, Utf8PathBuf};
use std::io;
use std::time::Duration;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, WorkbenchError>;

/// Errors that can occur while managing the workspace
#[derive(Error, Debug)]
pub enum WorkbenchError {
    #[error("Filesystem error at {path}: {source}")]
    Filesystem {
        path: Utf8PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Failed to launch {program}: {source}")]
    ToolLaunch {
        program: String,
        #[source]
        source: io::Error,
    },

    #[error("{program} reported failure (exit code {exit_code:?}): {stderr}")]
    ToolReportedFailure {
        program: String,
        exit_code: Option<i32>,
        stderr: String,
    },

    #[error("{program} timed out after {timeout:?}")]
    ToolTimeout { program: String, timeout: Duration },

    #[error("Invalid document {path}: {reason}")]
    InvalidDocument { path: Utf8PathBuf, reason: String },

    #[error("No files are selected")]
    NoSelection,

    #[error("No files are open")]
    NoActiveFile,

    #[error("Archive failed to build: {0}")]
    PackagingFailed(String),

    #[error("Another operation is already running ({active})")]
    Busy { active: PipelinePhase },
}

impl WorkbenchError {
    /// Wrap an io error with the path it happened on.
    pub fn fs(path: impl AsRef<Utf8Path>, source: io::Error) -> Self {
        Self::Filesystem {
            path: path.as_ref().to_path_buf(),
            source,
        }
    }

    /// Errors raised before an operation had any side effect.
    ///
    /// These are surfaced to the user as blocking errors instead of status lines.
    pub fn is_precondition(&self) -> bool {
        matches!(self, Self::NoSelection | Self::NoActiveFile | Self::Busy { .. })
    }
}

impl From<walkdir::Error> for WorkbenchError {
    fn from(err: walkdir::Error) -> Self {
        let path = err
            .path()
            .map(|p| Utf8PathBuf::from(p.to_string_lossy().into_owned()))
            .unwrap_or_default();
        let source = err
            .into_io_error()
            .unwrap_or_else(|| io::Error::other("filesystem loop detected"));
        Self::Filesystem { path, source }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_precondition_kinds() {
        assert!(WorkbenchError::NoSelection.is_precondition());
        assert!(WorkbenchError::NoActiveFile.is_precondition());
        assert!(
            WorkbenchError::Busy {
                active: PipelinePhase::Importing
            }
            .is_precondition()
        );
        assert!(!WorkbenchError::PackagingFailed("x".into()).is_precondition());
    }

    #[test]
    fn test_busy_message_names_phase() {
        let err = WorkbenchError::Busy {
            active: PipelinePhase::Compiling,
        };
        assert!(err.to_string().contains("compiling"));
    }
}
