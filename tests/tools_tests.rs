//! Integration tests for ToolRunner and CommandToolchain against real processes
//!
//! These tests use `sh` and therefore only run on Unix.

#![cfg(unix)]

use camino::{Utf8Path, Utf8PathBuf};
use pakbench::models::{ToolSettings, ToolSpec};
use pakbench::services::{CommandToolchain, RunMode, ToolCommand, ToolRunner, Toolchain};
use pakbench::WorkbenchError;
use std::fs;
use std::time::Duration;
use tempfile::TempDir;

fn sh(script: &str) -> ToolCommand {
    ToolCommand::new("sh").arg("-c").arg(script)
}

fn temp_dir() -> (TempDir, Utf8PathBuf) {
    let temp = TempDir::new().unwrap();
    let path = Utf8PathBuf::try_from(temp.path().to_path_buf()).unwrap();
    (temp, path)
}

#[tokio::test]
async fn test_successful_run_captures_stdout() {
    let output = ToolRunner::new()
        .run(&sh("echo hello"), RunMode::Blocking)
        .await
        .unwrap();

    assert_eq!(output.program, "sh");
    assert_eq!(output.stdout.trim(), "hello");
    assert_eq!(output.exit_code, Some(0));
}

#[tokio::test]
async fn test_non_zero_exit_fails_in_both_modes() {
    for mode in [RunMode::Blocking, RunMode::Detached] {
        let err = ToolRunner::new()
            .run(&sh("echo broken >&2; exit 3"), mode)
            .await
            .unwrap_err();

        match err {
            WorkbenchError::ToolReportedFailure {
                exit_code, stderr, ..
            } => {
                assert_eq!(exit_code, Some(3));
                assert_eq!(stderr, "broken");
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }
}

#[tokio::test]
async fn test_stderr_only_fails_detached_runs() {
    let command = sh("echo warning >&2");

    assert!(ToolRunner::new().run(&command, RunMode::Blocking).await.is_ok());
    assert!(matches!(
        ToolRunner::new().run(&command, RunMode::Detached).await,
        Err(WorkbenchError::ToolReportedFailure {
            exit_code: Some(0),
            ..
        })
    ));
}

#[tokio::test]
async fn test_timeout_kills_tool() {
    let runner = ToolRunner::new().with_timeout(Duration::from_millis(200));

    let err = runner
        .run(&sh("sleep 5"), RunMode::Blocking)
        .await
        .unwrap_err();

    assert!(matches!(err, WorkbenchError::ToolTimeout { .. }));
}

#[tokio::test]
async fn test_current_dir_is_applied() {
    let (_temp, dir) = temp_dir();

    let output = ToolRunner::new()
        .run(&sh("pwd").current_dir(&dir), RunMode::Blocking)
        .await
        .unwrap();

    let reported = Utf8PathBuf::from(output.stdout.trim());
    assert_eq!(
        fs::canonicalize(&reported).unwrap(),
        fs::canonicalize(&dir).unwrap()
    );
}

#[tokio::test]
async fn test_arguments_are_not_shell_split() {
    let output = ToolRunner::new()
        .run(
            &sh("printf '%s\\n' \"$0\"").arg("with space"),
            RunMode::Blocking,
        )
        .await
        .unwrap();

    assert_eq!(output.stdout.trim(), "with space");
}

/// A toolchain whose tools are small shell scripts over `cp`.
fn shell_toolchain() -> CommandToolchain {
    let copy = ToolSpec::new("sh", &["-c", "cp \"$0\" \"$1\"", "{input}", "{output}"]);
    let tools = ToolSettings {
        extract: ToolSpec::new("sh", &["-c", "cp \"$0\" \"$1/\"", "{input}", "{output}"]),
        build: ToolSpec::new("sh", &["-c", "cat \"$@\" > out.pak", "build", "{inputs}"]),
        decompile: copy.clone(),
        compile: copy,
    };
    CommandToolchain::new(tools, ToolRunner::new())
}

#[tokio::test]
async fn test_command_toolchain_fills_templates() {
    let (_temp, dir) = temp_dir();
    let toolchain = shell_toolchain();

    let input = dir.join("model one.MBIN");
    fs::write(&input, "<Data/>").unwrap();
    let output = dir.join("model one.exml");

    toolchain
        .decompile(&input, &output, RunMode::Detached)
        .await
        .unwrap();
    assert_eq!(fs::read_to_string(&output).unwrap(), "<Data/>");

    let extracted = dir.join("extracted");
    fs::create_dir_all(&extracted).unwrap();
    toolchain
        .extract(&input, &extracted, RunMode::Blocking)
        .await
        .unwrap();
    assert!(extracted.join("model one.MBIN").is_file());
}

#[tokio::test]
async fn test_command_toolchain_builds_in_working_dir() {
    let (_temp, dir) = temp_dir();
    fs::create_dir_all(dir.join("models")).unwrap();
    fs::write(dir.join("models/a.MBIN"), "A").unwrap();
    fs::write(dir.join("b.dds"), "B").unwrap();

    let inputs = vec![
        Utf8PathBuf::from("models/a.MBIN"),
        Utf8PathBuf::from("b.dds"),
    ];
    shell_toolchain()
        .build(&dir, &inputs, RunMode::Blocking)
        .await
        .unwrap();

    assert_eq!(fs::read_to_string(dir.join("out.pak")).unwrap(), "AB");
}

#[tokio::test]
async fn test_missing_compiler_reports_launch_error() {
    let tools = ToolSettings {
        compile: ToolSpec::new("pakbench-no-such-compiler", &["{input}", "{output}"]),
        ..ToolSettings::default()
    };
    let toolchain = CommandToolchain::new(tools, ToolRunner::new());

    let err = toolchain
        .compile(
            Utf8Path::new("a.exml"),
            Utf8Path::new("a.MBIN"),
            RunMode::Blocking,
        )
        .await
        .unwrap_err();

    assert!(matches!(err, WorkbenchError::ToolLaunch { .. }));
}
