//! Shared fixtures for the integration tests.
//!
//! [`FakeToolchain`] stands in for the archive tool and the model compiler. A fake
//! archive is a text manifest, one `relative/path|content` line per file; "extracting"
//! it writes those files. Decompile and compile copy text around, and build writes
//! `out.pak` listing its inputs.
//!
//! Content markers drive failures:
//! - `CORRUPT` makes decompile exit non-zero
//! - `NOISY` makes decompile succeed but write to stderr
//! - `BROKEN` makes compile exit non-zero before writing anything
//! - `PARTIAL` makes compile write its output, then exit non-zero
//! - `WARNS` makes compile write its output and succeed, but write to stderr

#![allow(dead_code)]

use camino::{Utf8Path, Utf8PathBuf};
use pakbench::services::{RunMode, ToolOutput, Toolchain};
use pakbench::{Orchestrator, Result, StateManager, WorkbenchError};
use std::fs;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::TempDir;
use tokio::sync::Notify;

/// Prefix the fake compiler writes in front of the text it "compiles".
pub const COMPILED_PREFIX: &str = "MBIN:";

#[derive(Default)]
pub struct FakeToolchain {
    /// `(tool, input)` for every invocation, in call order
    pub calls: Mutex<Vec<(String, Utf8PathBuf)>>,
    /// Inputs given to the last build
    pub build_inputs: Mutex<Vec<Utf8PathBuf>>,
    pub fail_build: AtomicBool,
    /// Signalled when an extract starts
    pub extract_started: Arc<Notify>,
    /// When set, every extract waits for a notification before running
    pub extract_gate: Option<Arc<Notify>>,
}

impl FakeToolchain {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn gated(gate: Arc<Notify>) -> Self {
        Self {
            extract_gate: Some(gate),
            ..Self::default()
        }
    }

    pub fn calls_for(&self, tool: &str) -> Vec<Utf8PathBuf> {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|(t, _)| t == tool)
            .map(|(_, p)| p.clone())
            .collect()
    }

    fn record(&self, tool: &str, input: &Utf8Path) {
        self.calls
            .lock()
            .unwrap()
            .push((tool.to_string(), input.to_path_buf()));
    }
}

fn output(program: &str, exit_code: i32, stderr: &str) -> ToolOutput {
    ToolOutput {
        program: program.to_string(),
        stdout: String::new(),
        stderr: stderr.to_string(),
        exit_code: Some(exit_code),
        duration: Duration::from_millis(1),
    }
}

fn read(path: &Utf8Path) -> Result<String> {
    fs::read_to_string(path).map_err(|e| WorkbenchError::fs(path, e))
}

fn write(path: &Utf8Path, content: &str) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(|e| WorkbenchError::fs(parent, e))?;
    }
    fs::write(path, content).map_err(|e| WorkbenchError::fs(path, e))
}

impl Toolchain for FakeToolchain {
    async fn extract(
        &self,
        archive: &Utf8Path,
        output_dir: &Utf8Path,
        mode: RunMode,
    ) -> Result<ToolOutput> {
        self.record("extract", archive);
        self.extract_started.notify_one();
        if let Some(gate) = &self.extract_gate {
            gate.notified().await;
        }

        for line in read(archive)?.lines().filter(|l| !l.is_empty()) {
            let (relative, content) = line.split_once('|').unwrap_or((line, ""));
            write(&output_dir.join(relative), content)?;
        }
        output("psarc", 0, "").check(mode)
    }

    async fn decompile(
        &self,
        input: &Utf8Path,
        output_path: &Utf8Path,
        mode: RunMode,
    ) -> Result<ToolOutput> {
        self.record("decompile", input);
        tokio::task::yield_now().await;

        let content = read(input)?;
        if content.contains("CORRUPT") {
            return output("MBINCompiler", 1, "bad header").check(mode);
        }
        write(output_path, &content)?;
        if content.contains("NOISY") {
            return output("MBINCompiler", 0, "warning: unknown field").check(mode);
        }
        output("MBINCompiler", 0, "").check(mode)
    }

    async fn compile(
        &self,
        input: &Utf8Path,
        output_path: &Utf8Path,
        mode: RunMode,
    ) -> Result<ToolOutput> {
        self.record("compile", input);

        let content = read(input)?;
        if content.contains("BROKEN") {
            return output("MBINCompiler", 2, "cannot compile").check(mode);
        }
        write(output_path, &format!("{}{}", COMPILED_PREFIX, content))?;
        if content.contains("PARTIAL") {
            return output("MBINCompiler", 1, "error: truncated output").check(mode);
        }
        if content.contains("WARNS") {
            return output("MBINCompiler", 0, "error: bad field").check(mode);
        }
        output("MBINCompiler", 0, "").check(mode)
    }

    async fn build(
        &self,
        working_dir: &Utf8Path,
        inputs: &[Utf8PathBuf],
        mode: RunMode,
    ) -> Result<ToolOutput> {
        self.record("build", working_dir);
        *self.build_inputs.lock().unwrap() = inputs.to_vec();

        if self.fail_build.load(Ordering::SeqCst) {
            return output("psarc", 1, "archive error").check(mode);
        }
        let listing: Vec<&str> = inputs.iter().map(|p| p.as_str()).collect();
        write(&working_dir.join("out.pak"), &listing.join("\n"))?;
        output("psarc", 0, "").check(mode)
    }
}

/// A temporary workspace with an orchestrator over [`FakeToolchain`].
pub struct Workbench {
    pub orchestrator: Arc<Orchestrator<FakeToolchain>>,
    pub work_dir: Utf8PathBuf,
    /// Where test archives are written before import
    pub downloads: Utf8PathBuf,
    _temp: TempDir,
}

impl Workbench {
    pub fn new() -> Self {
        Self::with_toolchain(FakeToolchain::new())
    }

    pub fn with_toolchain(toolchain: FakeToolchain) -> Self {
        let temp = TempDir::new().unwrap();
        let root = Utf8PathBuf::try_from(temp.path().to_path_buf()).unwrap();
        let work_dir = root.join("work");
        let downloads = root.join("downloads");
        fs::create_dir_all(&downloads).unwrap();

        let orchestrator = Orchestrator::new(StateManager::new(work_dir.clone()), toolchain).unwrap();

        Self {
            orchestrator: Arc::new(orchestrator),
            work_dir,
            downloads,
            _temp: temp,
        }
    }

    pub fn toolchain(&self) -> &FakeToolchain {
        self.orchestrator.toolchain()
    }

    /// Write a fake archive into the downloads directory.
    pub fn archive(&self, name: &str, files: &[(&str, &str)]) -> Utf8PathBuf {
        let manifest: Vec<String> = files
            .iter()
            .map(|(path, content)| format!("{}|{}", path, content))
            .collect();
        let path = self.downloads.join(name);
        fs::write(&path, manifest.join("\n")).unwrap();
        path
    }

    pub fn exml(&self, relative: &str) -> Utf8PathBuf {
        self.work_dir.join("EXMLs").join(relative)
    }

    pub fn mbin(&self, relative: &str) -> Utf8PathBuf {
        self.work_dir.join("MBINs").join(relative)
    }
}
