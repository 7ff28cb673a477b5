//! External tool runner.
//!
//! The archive tool and the model compiler are opaque command-line programs. This
//! module builds their command lines from [`ToolSpec`] templates, runs them with
//! `tokio::process` and normalizes the outcome into a [`ToolOutput`].

use crate::error::{Result, WorkbenchError};
use crate::models::{ToolSettings, ToolSpec};
use camino::{Utf8Path, Utf8PathBuf};
use std::future::Future;
use std::process::Stdio;
use std::time::{Duration, Instant};
use tokio::process::Command;
use tokio::time::timeout;

/// How a tool invocation's result is judged.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunMode {
    /// Awaited to completion before anything else starts; fails only on a
    /// non-zero exit status.
    Blocking,
    /// Runs alongside other invocations; any stderr output also counts as
    /// failure because the wrapped tools do not always set an exit code.
    Detached,
}

/// A fully expanded command line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolCommand {
    pub program: String,
    pub args: Vec<String>,
    pub current_dir: Option<Utf8PathBuf>,
}

impl ToolCommand {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            current_dir: None,
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn current_dir(mut self, dir: impl Into<Utf8PathBuf>) -> Self {
        self.current_dir = Some(dir.into());
        self
    }

    /// Expand a template.
    ///
    /// An argument that is exactly `{inputs}` becomes one argument per input;
    /// `{input}` and `{output}` are substituted anywhere inside an argument.
    pub fn from_spec(
        spec: &ToolSpec,
        input: Option<&Utf8Path>,
        output: Option<&Utf8Path>,
        inputs: &[Utf8PathBuf],
    ) -> Self {
        let mut command = Self::new(spec.program.clone());

        for template in &spec.args {
            if template == "{inputs}" {
                command
                    .args
                    .extend(inputs.iter().map(|p| p.as_str().to_string()));
                continue;
            }

            let mut arg = template.clone();
            if let Some(input) = input {
                arg = arg.replace("{input}", input.as_str());
            }
            if let Some(output) = output {
                arg = arg.replace("{output}", output.as_str());
            }
            command.args.push(arg);
        }

        command
    }

    /// Shell-like rendering for logs; arguments with spaces or quotes are quoted.
    pub fn display(&self) -> String {
        std::iter::once(self.program.as_str())
            .chain(self.args.iter().map(String::as_str))
            .map(quote)
            .collect::<Vec<_>>()
            .join(" ")
    }
}

fn quote(arg: &str) -> String {
    if !arg.is_empty() && !arg.contains([' ', '\t', '"', '\'']) {
        return arg.to_string();
    }
    format!("\"{}\"", arg.replace('"', "\\\""))
}

/// Captured result of one tool invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolOutput {
    pub program: String,
    pub stdout: String,
    pub stderr: String,
    /// `None` when the process was terminated by a signal
    pub exit_code: Option<i32>,
    pub duration: Duration,
}

impl ToolOutput {
    /// Turn a finished invocation into an error when it failed under `mode`.
    pub fn check(self, mode: RunMode) -> Result<Self> {
        let exited_cleanly = self.exit_code == Some(0);
        let stderr_failure = mode == RunMode::Detached && !self.stderr.trim().is_empty();

        if exited_cleanly && !stderr_failure {
            return Ok(self);
        }

        Err(WorkbenchError::ToolReportedFailure {
            program: self.program,
            exit_code: self.exit_code,
            stderr: self.stderr.trim_end().to_string(),
        })
    }
}

/// Spawns tool processes. Arguments go straight to the process, never via a shell.
#[derive(Debug, Clone, Default)]
pub struct ToolRunner {
    timeout: Option<Duration>,
}

impl ToolRunner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Kill any invocation that runs longer than `limit`.
    pub fn with_timeout(mut self, limit: Duration) -> Self {
        self.timeout = Some(limit);
        self
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.timeout
    }

    /// Run `command` to completion and judge the outcome under `mode`.
    pub async fn run(&self, command: &ToolCommand, mode: RunMode) -> Result<ToolOutput> {
        tracing::info!("Executing: {}", command.display());

        let start = Instant::now();

        let mut cmd = Command::new(&command.program);
        cmd.args(&command.args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(dir) = &command.current_dir {
            cmd.current_dir(dir);
        }

        let child = cmd.spawn().map_err(|source| WorkbenchError::ToolLaunch {
            program: command.program.clone(),
            source,
        })?;

        let waited = match self.timeout {
            Some(limit) => timeout(limit, child.wait_with_output()).await.map_err(|_| {
                tracing::warn!("{} timed out after {:?}", command.program, limit);
                WorkbenchError::ToolTimeout {
                    program: command.program.clone(),
                    timeout: limit,
                }
            })?,
            None => child.wait_with_output().await,
        };

        let output = waited.map_err(|source| WorkbenchError::ToolLaunch {
            program: command.program.clone(),
            source,
        })?;

        let result = ToolOutput {
            program: command.program.clone(),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
            exit_code: output.status.code(),
            duration: start.elapsed(),
        };

        tracing::debug!(
            "{} completed in {:.2}s with exit code {:?}",
            result.program,
            result.duration.as_secs_f32(),
            result.exit_code
        );

        result.check(mode)
    }
}

/// The four external operations the pipeline depends on.
///
/// Implementations must leave the files the real tools would produce: `extract`
/// fills `output_dir`, `decompile`/`compile` write `output`, and `build` leaves one
/// archive somewhere under `working_dir`.
pub trait Toolchain: Send + Sync + 'static {
    fn extract(
        &self,
        archive: &Utf8Path,
        output_dir: &Utf8Path,
        mode: RunMode,
    ) -> impl Future<Output = Result<ToolOutput>> + Send;

    fn decompile(
        &self,
        input: &Utf8Path,
        output: &Utf8Path,
        mode: RunMode,
    ) -> impl Future<Output = Result<ToolOutput>> + Send;

    fn compile(
        &self,
        input: &Utf8Path,
        output: &Utf8Path,
        mode: RunMode,
    ) -> impl Future<Output = Result<ToolOutput>> + Send;

    /// `inputs` are relative to `working_dir`.
    fn build(
        &self,
        working_dir: &Utf8Path,
        inputs: &[Utf8PathBuf],
        mode: RunMode,
    ) -> impl Future<Output = Result<ToolOutput>> + Send;
}

/// [`Toolchain`] backed by real processes configured through [`ToolSettings`].
#[derive(Debug, Clone)]
pub struct CommandToolchain {
    tools: ToolSettings,
    runner: ToolRunner,
}

impl CommandToolchain {
    pub fn new(tools: ToolSettings, runner: ToolRunner) -> Self {
        Self { tools, runner }
    }

    pub fn tools(&self) -> &ToolSettings {
        &self.tools
    }
}

impl Toolchain for CommandToolchain {
    async fn extract(
        &self,
        archive: &Utf8Path,
        output_dir: &Utf8Path,
        mode: RunMode,
    ) -> Result<ToolOutput> {
        let command = ToolCommand::from_spec(&self.tools.extract, Some(archive), Some(output_dir), &[]);
        self.runner.run(&command, mode).await
    }

    async fn decompile(
        &self,
        input: &Utf8Path,
        output: &Utf8Path,
        mode: RunMode,
    ) -> Result<ToolOutput> {
        let command = ToolCommand::from_spec(&self.tools.decompile, Some(input), Some(output), &[]);
        self.runner.run(&command, mode).await
    }

    async fn compile(
        &self,
        input: &Utf8Path,
        output: &Utf8Path,
        mode: RunMode,
    ) -> Result<ToolOutput> {
        let command = ToolCommand::from_spec(&self.tools.compile, Some(input), Some(output), &[]);
        self.runner.run(&command, mode).await
    }

    async fn build(
        &self,
        working_dir: &Utf8Path,
        inputs: &[Utf8PathBuf],
        mode: RunMode,
    ) -> Result<ToolOutput> {
        let command =
            ToolCommand::from_spec(&self.tools.build, None, None, inputs).current_dir(working_dir);
        self.runner.run(&command, mode).await
    }
}
