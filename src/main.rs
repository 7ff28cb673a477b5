//! PakBench - extract, decompile, edit and repackage game archives
//!
//! Command-line shell over the workspace pipelines.
//!
//! # Execution Flow
//!
//! 1. Parse arguments and load `pakbench.yaml` from the configuration directory
//! 2. Initialize logging → `<config dir>/logs/pakbench.<date>`
//! 3. Create a tokio runtime for the external tool processes
//! 4. Create the StateManager and Orchestrator, load the catalog from `EXMLs/`
//! 5. Run the requested command and print its outcome
//!
//! Precondition failures (nothing selected, nothing open, workspace busy) are
//! printed to stderr and exit with status 2.

use anyhow::{Context, Result};
use camino::Utf8PathBuf;
use clap::{Parser, Subcommand, ValueEnum};
use pakbench::services::{BatchSummary, CommandToolchain, Orchestrator, ToolRunner};
use pakbench::{APP_NAME, ConfigManager, StateManager, VERSION, WorkbenchError};
use std::process::ExitCode;
use std::time::Duration;

#[derive(Parser)]
#[command(name = "pakbench")]
#[command(version, about = "Extract, decompile, edit and repackage game archives", long_about = None)]
struct Cli {
    /// Directory holding pakbench.yaml and the logs
    #[arg(long, global = true, default_value = "PakBench Data")]
    config_dir: Utf8PathBuf,

    /// Log at debug level
    #[arg(long, global = true)]
    debug: bool,

    /// Mirror the log to the terminal
    #[arg(long, global = true)]
    console: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Copy archives into the workspace, extract and decompile them
    Import {
        #[arg(required = true)]
        paths: Vec<Utf8PathBuf>,
    },

    /// Extract and decompile anything in the workspace not processed yet
    Rescan,

    /// Build a new archive from the selected groups or entries
    Compile {
        /// Group name or entry path; repeat to select more
        #[arg(long = "select", required = true)]
        select: Vec<String>,
    },

    /// Delete everything in the workspace
    Clear,

    /// Print the catalog
    List,

    /// Replace an entry's content with the content of a file
    Save { entry: Utf8PathBuf, file: Utf8PathBuf },

    /// Run tools in parallel (on) or one at a time (off)
    SetThreads { mode: Toggle },
}

#[derive(Clone, Copy, ValueEnum)]
enum Toggle {
    On,
    Off,
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => match e.downcast_ref::<WorkbenchError>() {
            Some(err) if err.is_precondition() => {
                eprintln!("error: {}", err);
                ExitCode::from(2)
            }
            _ => {
                tracing::error!("{:#}", e);
                eprintln!("error: {:#}", e);
                ExitCode::FAILURE
            }
        },
    }
}

fn run(cli: Cli) -> Result<()> {
    let config_manager = ConfigManager::new(&cli.config_dir)?;
    let mut user_config = config_manager.load_user_config()?;

    let log_dir = cli.config_dir.join("logs");
    let _log_guard = pakbench::logging::setup_logging_with_console(
        log_dir.as_str(),
        "pakbench",
        cli.debug || user_config.debug_mode,
        cli.console,
    )?;

    tracing::info!("Starting {} v{}", APP_NAME, VERSION);

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .thread_name("pakbench-worker")
        .build()
        .context("Failed to create tokio runtime")?;

    let work_dir = config_manager.resolve_work_dir(&user_config);
    let state = StateManager::new(work_dir.clone());
    state.load_from_user_config(&user_config, work_dir);

    let mut runner = ToolRunner::new();
    if user_config.tool_timeout_secs > 0 {
        runner = runner.with_timeout(Duration::from_secs(user_config.tool_timeout_secs));
    }
    let toolchain = CommandToolchain::new(user_config.tools.clone(), runner);

    let orchestrator = Orchestrator::new(state, toolchain)?.with_settings(&user_config);
    orchestrator.refresh_catalog()?;

    let command = cli.command;
    let result = runtime.block_on(async {
        match command {
            Command::Import { paths } => {
                let report = orchestrator.import_archives(&paths).await?;
                println!(
                    "Imported {} archive(s), {} copy failure(s)",
                    report.copied.len(),
                    report.copy_failures.len()
                );
                print_batch("extract", &report.extract);
                print_batch("decompile", &report.decompile);
            }
            Command::Rescan => {
                let report = orchestrator.import_archives(&[]).await?;
                print_batch("extract", &report.extract);
                print_batch("decompile", &report.decompile);
            }
            Command::Compile { select } => {
                select_all(&orchestrator, &select);
                let report = orchestrator.compile_selection().await?;
                println!(
                    "{} file(s) staged, {} merged, {} failed to stage",
                    report.staged.len(),
                    report.conflicts_merged,
                    report.staging_failures.len()
                );
                print_batch("compile", &report.compile);
                println!("{}", report.archive);
            }
            Command::Clear => {
                let report = orchestrator.clear_workspace().await?;
                println!(
                    "Removed {} item(s), {} failure(s)",
                    report.removed,
                    report.failures.len()
                );
            }
            Command::List => {
                orchestrator.state().read(|s| {
                    for group in &s.catalog {
                        println!("{}", group.name);
                        for entry in &group.entries {
                            println!("  [{}] {}", entry.kind, entry.path);
                        }
                    }
                });
            }
            Command::Save { entry, file } => {
                let content = std::fs::read_to_string(&file)
                    .with_context(|| format!("Failed to read {}", file))?;
                orchestrator.open_file(&entry)?;
                orchestrator.save_active_file(&content)?;
            }
            Command::SetThreads { mode } => {
                let enabled = matches!(mode, Toggle::On);
                orchestrator.set_multi_threading(enabled);
                user_config.multi_threading = enabled;
                config_manager.save_user_config(&user_config)?;
            }
        }
        anyhow::Ok(())
    });

    println!("{}", orchestrator.status().current());
    let diagnostics = orchestrator.status().diagnostics();
    if !diagnostics.is_empty() {
        eprintln!("{}", diagnostics);
    }

    orchestrator.metrics().log_summary();
    runtime.shutdown_timeout(Duration::from_secs(5));

    result
}

/// Select every group named in `targets`; anything else is taken as an entry path.
fn select_all(orchestrator: &Orchestrator<CommandToolchain>, targets: &[String]) {
    for target in targets {
        let is_group = orchestrator
            .state()
            .read(|s| s.find_group(target).is_some_and(|g| !g.selected));
        if is_group {
            orchestrator.state().toggle_group_selected(target);
            continue;
        }

        let path = Utf8PathBuf::from(target);
        let is_entry = orchestrator.state().read(|s| {
            s.catalog
                .iter()
                .flat_map(|g| &g.entries)
                .any(|e| e.path == path && !e.selected)
        });
        if is_entry {
            orchestrator.state().toggle_entry_selected(&path);
        } else {
            tracing::warn!("Nothing to select for {}", target);
        }
    }
}

fn print_batch(label: &str, summary: &BatchSummary) {
    println!(
        "{}: {} succeeded, {} failed",
        label,
        summary.succeeded(),
        summary.failed()
    );
}
