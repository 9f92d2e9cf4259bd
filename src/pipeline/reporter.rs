use crate::models::{LogLevel, PipelineStage, StepResult};
use crate::state::StateManager;
use tokio::sync::mpsc::UnboundedSender;

/// Emits [`StepResult`] entries for one run.
///
/// Every entry goes three ways: onto the event channel for the presenter,
/// into `tracing`, and into the [`StateManager`]. A closed channel is not an
/// error; the run continues without a listener.
pub struct StepReporter {
    events: UnboundedSender<StepResult>,
    state: StateManager,
    stage: PipelineStage,
    progress: u8,
    warnings: usize,
}

impl StepReporter {
    pub fn new(events: UnboundedSender<StepResult>, state: StateManager) -> Self {
        Self {
            events,
            state,
            stage: PipelineStage::Idle,
            progress: 0,
            warnings: 0,
        }
    }

    pub fn stage(&self) -> PipelineStage {
        self.stage
    }

    pub fn progress(&self) -> u8 {
        self.progress
    }

    pub fn warnings(&self) -> usize {
        self.warnings
    }

    /// Switch to `stage` and announce it
    pub fn enter(&mut self, stage: PipelineStage) {
        self.stage = stage;
        self.state.enter_stage(stage);
        self.info(format!("{}...", stage.label()));
    }

    /// Mark the current stage as finished, raising progress to its boundary
    pub fn complete(&mut self, message: impl Into<String>) {
        self.advance_to(self.stage.completion_percent());
        self.success(message);
    }

    /// Record a stage that was not run; progress still moves to its boundary
    pub fn skip(&mut self, stage: PipelineStage, message: impl Into<String>) {
        self.stage = stage;
        self.state.enter_stage(stage);
        self.advance_to(stage.completion_percent());
        self.info(message);
    }

    pub fn info(&mut self, message: impl Into<String>) {
        self.emit(LogLevel::Info, message.into());
    }

    pub fn success(&mut self, message: impl Into<String>) {
        self.emit(LogLevel::Success, message.into());
    }

    pub fn warning(&mut self, message: impl Into<String>) {
        self.warnings += 1;
        self.emit(LogLevel::Warning, message.into());
    }

    pub fn error(&mut self, message: impl Into<String>) {
        self.emit(LogLevel::Error, message.into());
    }

    fn advance_to(&mut self, percent: u8) {
        self.progress = self.progress.max(percent);
        self.state.set_progress(self.progress);
    }

    fn emit(&mut self, level: LogLevel, message: String) {
        match level {
            LogLevel::Info | LogLevel::Success => {
                tracing::info!("[{}] {}", self.stage.label(), message)
            }
            LogLevel::Warning => tracing::warn!("[{}] {}", self.stage.label(), message),
            LogLevel::Error => tracing::error!("[{}] {}", self.stage.label(), message),
        }

        if level == LogLevel::Warning {
            self.state.record_warning(&message);
        } else {
            self.state.record_message(&message);
        }

        let entry = StepResult::new(self.stage, self.progress, level, message);
        // Ignore send errors - the presenter may already be gone
        let _ = self.events.send(entry);
    }
}
