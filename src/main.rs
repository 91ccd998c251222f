//! projzip - pack project folders into verified zip archives
//!
//! Main entry point for the command-line tool.
//!
//! # Overview
//!
//! Every immediate subdirectory of ROOT that holds a marker file (README.md,
//! package.json, Cargo.toml, ...) is copied without its dependency and build
//! directories, zipped into `ROOT/compressed/<name>.zip`, verified, and then
//! removed. A directory with a `.zipignore` entry is left alone.
//!
//! The binary initializes:
//! - Settings ([`ConfigManager`]: `projzip.yaml` + `PROJZIP_*` environment)
//! - Logging infrastructure (file rotation + console output)
//! - A current-thread tokio runtime for the external zip tools
//! - State management ([`StateManager`]) with a listener thread that reports
//!   progress
//!
//! # Execution Flow
//!
//! 1. Parse arguments, load settings, apply command-line overrides
//! 2. With `--write-config`, save the effective settings and exit
//! 3. Initialize logging → `<log_dir>/projzip.<date>` (platform state
//!    directory unless `log_dir` is set)
//! 4. Probe for `zip`/`unzip`, otherwise use the built-in zip library
//! 5. Run the [`PackWorkflow`] over ROOT
//! 6. Log the summary; exit with 1 if any project failed
//!
//! # Threading
//!
//! - **Main thread**: drives the workflow on the current-thread runtime
//! - **State listener**: background std::thread rendering [`StateChange`] events

use anyhow::{Context, Result};
use camino::Utf8PathBuf;
use clap::Parser;
use projzip::config::{default_config_dir, default_log_dir};
use projzip::logging::{LogOptions, setup_logging};
use projzip::models::{ArchiverPreference, ProgressPhase};
use projzip::services::ArchiveTool;
use projzip::{
    APP_NAME, ConfigManager, ExclusionConfig, OverwriteMode, PackLayout, PackStatus, PackWorkflow,
    StateChange, StateManager, VERSION, WorkflowOptions,
};
use std::process::ExitCode;
use std::sync::Arc;
use std::thread::JoinHandle;
use tokio::sync::broadcast::error::RecvError;

#[derive(Parser, Debug)]
#[command(
    name = "projzip",
    version,
    about = "Pack project folders into verified zip archives and remove the originals"
)]
struct Cli {
    /// Directory whose immediate subdirectories are scanned for projects
    #[arg(required_unless_present = "write_config")]
    root: Option<Utf8PathBuf>,

    /// File extension to leave out of archives (repeatable, e.g. --exclude-ext log)
    #[arg(long = "exclude-ext", value_name = "EXT")]
    exclude_ext: Vec<String>,

    /// Replace existing archives without asking
    #[arg(long, conflicts_with = "no_clobber")]
    force: bool,

    /// Never replace existing archives; such projects fail
    #[arg(long)]
    no_clobber: bool,

    /// Report what would happen without changing anything
    #[arg(long)]
    dry_run: bool,

    /// Archiving backend: auto, command-line or library
    #[arg(long, value_name = "MODE")]
    archiver: Option<ArchiverPreference>,

    /// Directory holding projzip.yaml [default: the platform config directory]
    #[arg(long, env = "PROJZIP_CONFIG_DIR")]
    config_dir: Option<Utf8PathBuf>,

    /// Debug-level logging
    #[arg(long)]
    debug: bool,

    /// Log to file only
    #[arg(long)]
    no_console: bool,

    /// Write the log file as JSON lines
    #[arg(long)]
    log_json: bool,

    /// Save the effective settings to projzip.yaml and exit
    #[arg(long)]
    write_config: bool,
}

fn main() -> Result<ExitCode> {
    let cli = Cli::parse();

    // Nothing is written under the working directory unless asked for: it is
    // often the root being scanned
    let config_dir = match &cli.config_dir {
        Some(dir) => dir.clone(),
        None => default_config_dir()?,
    };
    let config_manager = ConfigManager::new(&config_dir)?;
    let mut settings = config_manager.load_settings()?;
    if let Some(archiver) = cli.archiver {
        settings.archiver = archiver;
    }
    if cli.debug {
        settings.debug_mode = true;
    }

    if cli.write_config {
        settings.excluded_extensions.extend(cli.exclude_ext.iter().cloned());
        config_manager.save_settings(&settings)?;
        println!("Wrote {}", config_manager.settings_path());
        return Ok(ExitCode::SUCCESS);
    }

    let log_dir = match &settings.log_dir {
        Some(dir) => Utf8PathBuf::from(dir),
        None => default_log_dir()?,
    };
    let mut log_options = LogOptions::new(log_dir, "projzip");
    log_options.debug_mode = settings.debug_mode;
    log_options.console_output = !cli.no_console;
    log_options.json = cli.log_json;
    let _log_guard = setup_logging(&log_options)?;

    tracing::info!("Starting {} v{}", APP_NAME, VERSION);

    let root = cli.root.context("ROOT is required")?;
    let root = root
        .canonicalize_utf8()
        .with_context(|| format!("Root directory {} is not accessible", root))?;

    // The pipeline is sequential; one thread is enough for the subprocess calls
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("Failed to create tokio runtime")?;

    let state_manager = Arc::new(StateManager::new());
    let listener = spawn_state_listener(&state_manager);

    let archiver = runtime.block_on(ArchiveTool::negotiate(&settings));
    let exclusions = ExclusionConfig::from_settings(&settings, &cli.exclude_ext);
    let layout = PackLayout::new(root, &settings.archive_dir, &settings.staging_dir);
    let options = WorkflowOptions {
        overwrite: OverwriteMode::from_flags(cli.force, cli.no_clobber),
        dry_run: cli.dry_run,
    };

    let workflow = PackWorkflow::new(layout, exclusions, archiver, Arc::clone(&state_manager))
        .with_options(options);
    let summary = runtime.block_on(workflow.run())?;
    workflow.metrics().log_summary();

    for result in summary.results.iter().filter(|r| r.status == PackStatus::Failed) {
        tracing::error!("FAILED {}: {}", result.candidate, result.message);
    }

    // Dropping the last sender closes the channel and ends the listener
    drop(workflow);
    drop(state_manager);
    if listener.join().is_err() {
        tracing::warn!("State listener thread panicked");
    }

    if summary.has_failures() {
        Ok(ExitCode::FAILURE)
    } else {
        Ok(ExitCode::SUCCESS)
    }
}

/// Render state changes on a background thread until the channel closes
fn spawn_state_listener(state_manager: &Arc<StateManager>) -> JoinHandle<()> {
    let mut rx = state_manager.subscribe();

    std::thread::spawn(move || {
        tracing::debug!("State listener started");

        loop {
            match rx.blocking_recv() {
                Ok(change) => render_change(change),
                Err(RecvError::Closed) => break,
                Err(RecvError::Lagged(skipped)) => {
                    tracing::warn!("State listener lagged, {} events were skipped", skipped);
                }
            }
        }

        tracing::debug!("State listener stopped");
    })
}

fn render_change(change: StateChange) {
    match change {
        StateChange::RunStarted {
            total_candidates,
            dry_run,
        } => {
            let mode = if dry_run { " (dry run)" } else { "" };
            tracing::info!("Processing {} project(s){}", total_candidates, mode);
        }
        StateChange::StageChanged { candidate, stage } => {
            tracing::debug!("{}: {}", candidate, stage);
        }
        StateChange::ProgressUpdated {
            phase: ProgressPhase::Batch,
            current,
            total,
            ..
        } => {
            tracing::info!("Completed {}/{} project(s)", current, total);
        }
        StateChange::ProgressUpdated {
            phase,
            current,
            total,
            label,
        } => {
            tracing::debug!("[{}] {}/{} {}", phase, current, total, label);
        }
        StateChange::CandidateProcessed {
            candidate, status, ..
        } => {
            tracing::debug!("{} -> {}", candidate, status);
        }
        StateChange::RunFinished {
            archived,
            skipped,
            failed,
            planned,
        } => {
            tracing::info!(
                "Finished: {} archived, {} skipped, {} failed, {} planned",
                archived,
                skipped,
                failed,
                planned
            );
        }
        StateChange::StateReset => tracing::debug!("State reset"),
    }
}
