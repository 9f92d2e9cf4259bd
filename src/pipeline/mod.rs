//! The setup pipeline.
//!
//! [`Pipeline`] runs the steps in a fixed order on a tokio worker:
//!
//! ```text
//! Idle → ValidatingInputs → Extracting → Reconciling → CopyingWorld
//!      → MirroringMods (only with mods enabled) → Updating → Launching → Done
//! ```
//!
//! Any step error moves the run to `Failed` with a single terminal error
//! entry. Progress and log entries go out over an unbounded mpsc channel whose
//! receiver belongs to the presentation layer.

pub mod reporter;

use crate::config::PreferenceStore;
use crate::models::{InstallLayout, PipelineConfig, PipelineStage, StepResult};
use crate::services::{
    CopyStats, MirrorSummary, MissingSourcePolicy, PathKind, PathValidator, ReconcileSummary,
    ServerProcessHandle, StepError, UpdateOutcome, UpdateReport, archive, launcher, mods,
    reconcile, tree_copy, updater,
};
use crate::state::StateManager;
use camino::{Utf8Path, Utf8PathBuf};
use indexmap::IndexMap;
use reporter::StepReporter;
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio::runtime::Handle;
use tokio::sync::mpsc::UnboundedSender;
use tokio::task::JoinHandle;

/// Errors raised before a run starts
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PipelineError {
    #[error("A setup run is already in progress")]
    AlreadyRunning,
}

/// Tunables that are not part of the user's per-run input
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PipelineOptions {
    pub mods_policy: MissingSourcePolicy,
    pub updater_timeout: Duration,
}

impl Default for PipelineOptions {
    fn default() -> Self {
        Self {
            mods_policy: MissingSourcePolicy::default(),
            updater_timeout: updater::DEFAULT_UPDATE_TIMEOUT,
        }
    }
}

/// Outcome of one run
///
/// Step outputs are `None` for steps that did not run.
#[derive(Debug, Clone)]
pub struct RunReport {
    pub final_stage: PipelineStage,
    pub progress: u8,
    /// Wall time per executed step, in execution order
    pub step_durations: IndexMap<PipelineStage, Duration>,
    pub extracted_files: Option<usize>,
    pub reconcile: Option<ReconcileSummary>,
    pub world_copy: Option<CopyStats>,
    pub mirror: Option<MirrorSummary>,
    pub update: Option<UpdateReport>,
    pub servers: Vec<ServerProcessHandle>,
    pub warnings: usize,
    /// Message of the error that failed the run
    pub error: Option<String>,
}

impl RunReport {
    fn new() -> Self {
        Self {
            final_stage: PipelineStage::Idle,
            progress: 0,
            step_durations: IndexMap::new(),
            extracted_files: None,
            reconcile: None,
            world_copy: None,
            mirror: None,
            update: None,
            servers: Vec::new(),
            warnings: 0,
            error: None,
        }
    }

    pub fn succeeded(&self) -> bool {
        self.final_stage == PipelineStage::Done
    }
}

/// Releases the run slot when dropped, also when the worker task panics.
struct RunGuard {
    state: StateManager,
    outcome: PipelineStage,
}

impl Drop for RunGuard {
    fn drop(&mut self) {
        self.state.finish_run(self.outcome);
    }
}

/// Sequences the setup steps for one server install.
///
/// Cheap to clone; clones share the same [`StateManager`], so the
/// single-run guard holds across all of them.
#[derive(Clone)]
pub struct Pipeline {
    layout: Arc<InstallLayout>,
    options: PipelineOptions,
    state: StateManager,
    validator: Arc<PathValidator>,
    preferences: Option<Arc<dyn PreferenceStore>>,
}

impl Pipeline {
    pub fn new(layout: InstallLayout, options: PipelineOptions, state: StateManager) -> Self {
        Self {
            layout: Arc::new(layout),
            options,
            state,
            validator: Arc::new(PathValidator::new()),
            preferences: None,
        }
    }

    /// Remember each run's inputs in `store` before the steps execute.
    pub fn with_preference_store(mut self, store: Arc<dyn PreferenceStore>) -> Self {
        self.preferences = Some(store);
        self
    }

    pub fn layout(&self) -> &InstallLayout {
        &self.layout
    }

    pub fn state(&self) -> &StateManager {
        &self.state
    }

    /// Run the pipeline to completion on the current task.
    ///
    /// # Errors
    /// `AlreadyRunning` if another run holds the slot. Step failures are not
    /// errors here; they are reported in the returned [`RunReport`].
    pub async fn run(
        &self,
        config: PipelineConfig,
        events: UnboundedSender<StepResult>,
    ) -> Result<RunReport, PipelineError> {
        let guard = self.begin()?;
        Ok(self.execute(config, events, guard).await)
    }

    /// Spawn the pipeline on `handle` and return immediately.
    ///
    /// The run slot is claimed before spawning, so a second call made while
    /// the first run is active fails right away.
    pub fn start(
        &self,
        config: PipelineConfig,
        events: UnboundedSender<StepResult>,
        handle: &Handle,
    ) -> Result<JoinHandle<RunReport>, PipelineError> {
        let guard = self.begin()?;
        let pipeline = self.clone();
        Ok(handle.spawn(async move { pipeline.execute(config, events, guard).await }))
    }

    fn begin(&self) -> Result<RunGuard, PipelineError> {
        if self.state.try_begin_run().is_none() {
            tracing::warn!("Rejected start request: a run is already active");
            return Err(PipelineError::AlreadyRunning);
        }

        Ok(RunGuard {
            state: self.state.clone(),
            outcome: PipelineStage::Failed,
        })
    }

    async fn execute(
        &self,
        config: PipelineConfig,
        events: UnboundedSender<StepResult>,
        mut guard: RunGuard,
    ) -> RunReport {
        let mut reporter = StepReporter::new(events, self.state.clone());
        let mut report = RunReport::new();
        let started = Instant::now();

        tracing::info!("Starting server setup run (mods enabled: {})", config.mods_enabled);
        self.remember(&config, &mut reporter);

        match self.run_steps(&config, &mut reporter, &mut report).await {
            Ok(()) => {
                report.final_stage = PipelineStage::Done;
                reporter.success(format!(
                    "Server setup complete in {:.1}s",
                    started.elapsed().as_secs_f32()
                ));
            }
            Err(e) => {
                let stage = reporter.stage();
                reporter.error(format!("{} failed: {}", stage.label(), e));
                report.final_stage = PipelineStage::Failed;
                report.error = Some(e.to_string());
            }
        }

        report.progress = reporter.progress();
        report.warnings = reporter.warnings();
        guard.outcome = report.final_stage;

        tracing::info!(
            "Run finished: {} ({} warnings)",
            report.final_stage,
            report.warnings
        );

        report
    }

    fn remember(&self, config: &PipelineConfig, reporter: &mut StepReporter) {
        let Some(store) = &self.preferences else {
            return;
        };

        let previous = store.load();
        let updated = config.to_preferences(&previous);
        if updated == previous {
            return;
        }

        if let Err(e) = store.save(&updated) {
            reporter.warning(format!("Could not save preferences: {:#}", e));
        }
    }

    async fn run_steps(
        &self,
        config: &PipelineConfig,
        reporter: &mut StepReporter,
        report: &mut RunReport,
    ) -> Result<(), StepError> {
        let layout = Arc::clone(&self.layout);

        // Validate
        let step = Instant::now();
        reporter.enter(PipelineStage::ValidatingInputs);
        let inputs = self.validate_inputs(config)?;
        reporter.complete("Inputs validated");
        report
            .step_durations
            .insert(PipelineStage::ValidatingInputs, step.elapsed());

        // Extract
        let step = Instant::now();
        reporter.enter(PipelineStage::Extracting);
        let count = {
            let archive = inputs.archive.clone();
            let target = layout.data_root.clone();
            blocking(move || archive::extract(&archive, &target)).await?
        };
        report.extracted_files = Some(count);
        reporter.complete(format!(
            "Extracted {} files into {}",
            count, layout.data_root
        ));
        report
            .step_durations
            .insert(PipelineStage::Extracting, step.elapsed());

        // Reconcile
        let step = Instant::now();
        reporter.enter(PipelineStage::Reconciling);
        let server_dir = layout.server_dir();
        let summary = {
            let target = server_dir.clone();
            let layout = Arc::clone(&layout);
            blocking(move || reconcile::reconcile(&target, &layout.preserved_file)).await?
        };
        report.reconcile = Some(summary);
        reporter.complete(reconcile_message(&summary, &server_dir, &layout.preserved_file));
        report
            .step_durations
            .insert(PipelineStage::Reconciling, step.elapsed());

        // Copy world
        let step = Instant::now();
        reporter.enter(PipelineStage::CopyingWorld);
        let stats = {
            let source = inputs.world.clone();
            let target = server_dir.clone();
            blocking(move || tree_copy::merge_into(&source, &target)).await?
        };
        report.world_copy = Some(stats);
        reporter.complete(format!(
            "Copied world from {} ({} files, {} folders)",
            inputs.world, stats.files, stats.directories
        ));
        report
            .step_durations
            .insert(PipelineStage::CopyingWorld, step.elapsed());

        // Mods
        match &inputs.content_library {
            Some(library) => {
                let step = Instant::now();
                reporter.enter(PipelineStage::MirroringMods);
                let summary = {
                    let layout = Arc::clone(&layout);
                    let library = library.clone();
                    let updater_install = inputs.updater_install.clone();
                    let policy = self.options.mods_policy;
                    blocking(move || mods::mirror(&layout, &library, &updater_install, policy))
                        .await?
                };
                for warning in &summary.warnings {
                    reporter.warning(warning.clone());
                }
                reporter.complete(format!(
                    "Mirrored {} workshop and {} local mods",
                    summary.workshop_copied, summary.local_copied
                ));
                report.mirror = Some(summary);
                report
                    .step_durations
                    .insert(PipelineStage::MirroringMods, step.elapsed());
            }
            None => {
                reporter.skip(PipelineStage::MirroringMods, "Mods disabled, skipping mod mirroring");
            }
        }

        // Update
        let step = Instant::now();
        reporter.enter(PipelineStage::Updating);
        let executable = layout.updater_executable(&inputs.updater_install);
        let update = updater::run(
            &executable,
            &layout.updater_args(),
            self.options.updater_timeout,
        )
        .await?;
        report_update(&update, reporter);
        report.update = Some(update);
        report
            .step_durations
            .insert(PipelineStage::Updating, step.elapsed());

        // Launch
        let step = Instant::now();
        reporter.enter(PipelineStage::Launching);
        let handles = {
            let executable = layout.server_executable(&inputs.updater_install);
            let working_dir = layout.server_bin_dir(&inputs.updater_install);
            let layout = Arc::clone(&layout);
            blocking(move || launcher::launch(&executable, &working_dir, &layout.cluster_name))
                .await?
        };
        for handle in &handles {
            reporter.info(format!("{} shard started (pid {})", handle.shard, handle.pid));
        }
        report.servers = handles.to_vec();
        reporter.complete("Server shards launched");
        report
            .step_durations
            .insert(PipelineStage::Launching, step.elapsed());

        Ok(())
    }

    /// Check every input before any I/O step runs.
    ///
    /// Order per field: presence, naming convention, existence.
    fn validate_inputs(&self, config: &PipelineConfig) -> Result<ValidatedInputs, StepError> {
        let archive = require(&config.archive_path, "Configuration archive")?;
        if !archive.is_file() {
            return Err(StepError::NotFound {
                what: "Configuration archive",
                path: archive,
            });
        }

        let updater_install = self.existing_dir(
            &config.updater_install_path,
            PathKind::UpdaterInstall,
            "SteamCMD install folder",
        )?;
        let world = self.existing_dir(
            &config.world_folder_path,
            PathKind::WorldFolder,
            "World folder",
        )?;

        let content_library = if config.mods_enabled {
            let library = config
                .content_library_path
                .as_deref()
                .ok_or(StepError::MissingInput {
                    what: "Steam install folder",
                })?;
            Some(self.existing_dir(library, PathKind::ContentLibrary, "Steam install folder")?)
        } else {
            None
        };

        Ok(ValidatedInputs {
            archive,
            updater_install,
            world,
            content_library,
        })
    }

    fn existing_dir(
        &self,
        path: &Utf8Path,
        kind: PathKind,
        what: &'static str,
    ) -> Result<Utf8PathBuf, StepError> {
        require(path, what)?;
        let normalized = self.validator.validate(path.as_str(), kind)?;
        if !normalized.is_dir() {
            return Err(StepError::NotFound {
                what,
                path: normalized,
            });
        }
        Ok(normalized)
    }
}

/// Inputs after validation, with normalized paths
struct ValidatedInputs {
    archive: Utf8PathBuf,
    updater_install: Utf8PathBuf,
    world: Utf8PathBuf,
    content_library: Option<Utf8PathBuf>,
}

fn require(path: &Utf8Path, what: &'static str) -> Result<Utf8PathBuf, StepError> {
    let trimmed = path.as_str().trim();
    if trimmed.is_empty() {
        return Err(StepError::MissingInput { what });
    }
    Ok(Utf8PathBuf::from(trimmed))
}

/// Run a synchronous filesystem step on tokio's blocking pool.
async fn blocking<T, F>(f: F) -> Result<T, StepError>
where
    F: FnOnce() -> Result<T, StepError> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| StepError::Worker(e.to_string()))?
}

fn reconcile_message(summary: &ReconcileSummary, dir: &Utf8Path, preserved: &Utf8Path) -> String {
    if summary.created {
        format!("Created empty server folder {}", dir)
    } else if summary.preserved {
        format!(
            "Cleared {} entries from {}, kept {}",
            summary.removed, dir, preserved
        )
    } else {
        format!(
            "Cleared {} entries from {} ({} not present)",
            summary.removed, dir, preserved
        )
    }
}

/// Turn the updater's report into log entries.
///
/// Stdout lines are informational, stderr lines are warnings. Exit codes and
/// timeouts are warnings too; the run continues to the launch step.
fn report_update(update: &UpdateReport, reporter: &mut StepReporter) {
    for line in &update.stdout.lines {
        reporter.info(line.clone());
    }
    if let Some(note) = update.stdout.omitted_note() {
        reporter.info(note);
    }
    for line in &update.stderr.lines {
        reporter.warning(line.clone());
    }
    if let Some(note) = update.stderr.omitted_note() {
        reporter.warning(note);
    }

    match update.outcome {
        UpdateOutcome::Completed => reporter.complete(format!(
            "Server files validated in {:.1}s",
            update.duration.as_secs_f32()
        )),
        UpdateOutcome::NonZeroExit(code) => {
            reporter.warning(format!(
                "SteamCMD exited with code {}; the update may still have succeeded",
                code
            ));
            reporter.complete("Server update step finished");
        }
        UpdateOutcome::TimedOut(limit) => {
            reporter.warning(format!(
                "SteamCMD did not finish within {}s and keeps running in the background",
                limit.as_secs()
            ));
            reporter.complete("Server update step finished");
        }
    }
}
