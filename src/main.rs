//! dstsetup - Automated local setup for Don't Starve Together dedicated servers
//!
//! Main entry point for the command-line application.
//!
//! # Overview
//!
//! This binary replaces the setup form with command-line flags. It initializes:
//! - Logging infrastructure (daily file rotation, console output with `--debug`)
//! - Persisted preferences ([`ConfigManager`], `dstsetup Data/dstsetup.yaml`)
//! - Tokio async runtime (4 worker threads for the pipeline and SteamCMD)
//! - State management ([`StateManager`])
//! - The [`Pipeline`] and a [`ConsolePresenter`] for its log entries
//!
//! Threading model:
//! - **Main thread**: drains the pipeline's event channel and prints entries
//! - **Tokio workers**: run the pipeline; filesystem steps use the blocking pool
//!
//! # Execution Flow
//!
//! 1. Parse flags, initialize logging → logs/dstsetup.<date>
//! 2. Load preferences, apply flags (validated at selection time)
//! 3. `--save-only`: persist the preferences and exit
//! 4. Resolve the data root (`--data-root` or `<Documents>/Klei/DoNotStarveTogether`)
//! 5. Start the pipeline on the runtime, present entries until the run ends
//! 6. Shutdown tokio runtime with 5s timeout

use anyhow::{Context, Result, bail};
use camino::Utf8PathBuf;
use clap::Parser;
use dstsetup::config::{self, PreferenceStore};
use dstsetup::models::PipelineConfig;
use dstsetup::services::{MissingSourcePolicy, PathKind, PathValidator};
use dstsetup::ui::ConsolePresenter;
use dstsetup::{
    APP_NAME, ConfigManager, InstallLayout, Pipeline, PipelineOptions, Preferences, StateManager,
    VERSION,
};
use std::io::IsTerminal;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;

/// Set up and launch a local Don't Starve Together dedicated server.
///
/// Path flags are remembered between runs; omitted flags reuse the saved value.
#[derive(Parser, Debug)]
#[command(name = "dstsetup", version, about)]
struct Cli {
    /// Server configuration zip exported from the Klei account page
    #[arg(long, value_name = "ZIP")]
    archive: Option<String>,

    /// SteamCMD install folder (name must end with "steamcmd")
    #[arg(long, value_name = "DIR")]
    steamcmd: Option<String>,

    /// Steam client install folder (name must end with "steam")
    #[arg(long, value_name = "DIR")]
    steam: Option<String>,

    /// World save folder (name must start with "Cluster_")
    #[arg(long, value_name = "DIR")]
    world: Option<String>,

    /// Mirror Workshop and local mods into the server
    #[arg(long, conflicts_with = "no_mods")]
    mods: bool,

    /// Skip mod mirroring
    #[arg(long)]
    no_mods: bool,

    /// Game data folder the archive is extracted into
    #[arg(long, value_name = "DIR")]
    data_root: Option<Utf8PathBuf>,

    /// Fail the run if the Workshop content folder is missing
    #[arg(long)]
    strict_mods: bool,

    /// Seconds to wait for SteamCMD
    #[arg(long, value_name = "SECS", default_value_t = 300)]
    update_timeout: u64,

    /// Folder holding the preferences file
    #[arg(long, value_name = "DIR", default_value = "dstsetup Data")]
    config_dir: Utf8PathBuf,

    /// Folder for log files
    #[arg(long, value_name = "DIR", default_value = "logs")]
    log_dir: Utf8PathBuf,

    /// Debug logging, also echoed to stderr
    #[arg(long)]
    debug: bool,

    /// Save the given paths and exit without running
    #[arg(long)]
    save_only: bool,

    /// Disable colored output
    #[arg(long)]
    no_color: bool,
}

/// Main entry point for the dstsetup command-line application
///
/// # Returns
///
/// - `Ok(())` if the run reached `Done` (or preferences were saved with `--save-only`)
/// - `Err(_)` if initialization failed or the run ended in `Failed`
fn main() -> Result<()> {
    let cli = Cli::parse();

    // Hold the guard for the whole program so buffered log lines are flushed
    let _log_guard =
        dstsetup::logging::setup_logging(&cli.log_dir, dstsetup::logging::LOG_PREFIX, cli.debug, cli.debug)?;

    tracing::info!("Starting {} v{}", APP_NAME, VERSION);

    let config_manager = Arc::new(ConfigManager::new(&cli.config_dir)?);
    let stored = config_manager.load_preferences();
    let prefs = apply_flags(&cli, stored, &PathValidator::new())?;

    if cli.save_only {
        if config::remember(config_manager.as_ref(), &prefs)? {
            println!("Preferences saved to {}", config_manager.preferences_path());
        } else {
            println!("Preferences unchanged");
        }
        return Ok(());
    }

    let data_root = match &cli.data_root {
        Some(root) => root.clone(),
        None => config::default_data_root()?,
    };
    tracing::info!("Game data root: {}", data_root);

    let options = PipelineOptions {
        mods_policy: if cli.strict_mods {
            MissingSourcePolicy::Strict
        } else {
            MissingSourcePolicy::Tolerant
        },
        updater_timeout: Duration::from_secs(cli.update_timeout),
    };

    // Create tokio runtime for the pipeline
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .worker_threads(4)
        .thread_name("dstsetup-worker")
        .build()?;

    tracing::info!("Tokio runtime initialized with {} worker threads", 4);

    let state_manager = StateManager::new();
    let store: Arc<dyn PreferenceStore> = config_manager;
    let pipeline = Pipeline::new(InstallLayout::new(data_root), options, state_manager)
        .with_preference_store(store);

    let (events_tx, events_rx) = mpsc::unbounded_channel();
    let run = pipeline.start(
        PipelineConfig::from_preferences(&prefs),
        events_tx,
        runtime.handle(),
    )?;

    // Blocks until the pipeline drops its sender at the end of the run
    let color = !cli.no_color && std::io::stdout().is_terminal();
    let summary = ConsolePresenter::stdout(color)
        .drain(events_rx)
        .context("Failed to write progress to stdout")?;

    let report = runtime
        .block_on(run)
        .context("Pipeline worker task failed")?;

    runtime.shutdown_timeout(Duration::from_secs(5));

    for server in &report.servers {
        println!(
            "{} shard running as pid {} in {}",
            server.shard, server.pid, server.working_directory
        );
    }

    tracing::info!(
        "Application shutdown complete ({} entries, {} warnings)",
        summary.entries,
        summary.warnings
    );

    if !report.succeeded() {
        bail!(
            "Server setup failed: {}",
            report.error.as_deref().unwrap_or("unknown error")
        );
    }

    Ok(())
}

/// Overlay command-line flags on the stored preferences.
///
/// Folder flags are checked against their naming convention here, before
/// they are stored.
fn apply_flags(cli: &Cli, mut prefs: Preferences, validator: &PathValidator) -> Result<Preferences> {
    if let Some(archive) = &cli.archive {
        prefs.archive_path = archive.trim().to_string();
    }

    let folders = [
        (&cli.steamcmd, PathKind::UpdaterInstall, &mut prefs.updater_install_path),
        (&cli.steam, PathKind::ContentLibrary, &mut prefs.content_library_path),
        (&cli.world, PathKind::WorldFolder, &mut prefs.world_folder_path),
    ];
    for (flag, kind, slot) in folders {
        if let Some(path) = flag {
            let normalized = validator
                .validate(path, kind)
                .with_context(|| format!("Invalid {} folder", kind))?;
            *slot = normalized.into_string();
        }
    }

    if cli.mods {
        prefs.mods_enabled = true;
    } else if cli.no_mods {
        prefs.mods_enabled = false;
    }

    Ok(prefs)
}
