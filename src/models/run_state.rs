use chrono::{DateTime, Local};
use std::fmt;

/// Pipeline stages in execution order.
///
/// `Failed` is absorbing and reachable from any running stage. `MirroringMods`
/// is skipped when mods are disabled, but its progress boundary (70) is still
/// reported so progress jumps straight from 50 to 70.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PipelineStage {
    Idle,
    ValidatingInputs,
    Extracting,
    Reconciling,
    CopyingWorld,
    MirroringMods,
    Updating,
    Launching,
    Done,
    Failed,
}

impl PipelineStage {
    /// Progress reported once this stage has completed.
    pub const fn completion_percent(self) -> u8 {
        match self {
            Self::Idle | Self::Failed => 0,
            Self::ValidatingInputs => 10,
            Self::Extracting => 20,
            Self::Reconciling => 35,
            Self::CopyingWorld => 50,
            Self::MirroringMods => 70,
            Self::Updating => 85,
            Self::Launching | Self::Done => 100,
        }
    }

    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Done | Self::Failed)
    }

    pub const fn label(self) -> &'static str {
        match self {
            Self::Idle => "Idle",
            Self::ValidatingInputs => "Validating inputs",
            Self::Extracting => "Extracting archive",
            Self::Reconciling => "Cleaning server folder",
            Self::CopyingWorld => "Copying world",
            Self::MirroringMods => "Mirroring mods",
            Self::Updating => "Updating server",
            Self::Launching => "Launching shards",
            Self::Done => "Done",
            Self::Failed => "Failed",
        }
    }
}

impl fmt::Display for PipelineStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Severity of a log entry shown to the user
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LogLevel {
    Info,
    Success,
    Warning,
    Error,
}

impl LogLevel {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Info => "INFO",
            Self::Success => "SUCCESS",
            Self::Warning => "WARNING",
            Self::Error => "ERROR",
        }
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One structured log entry emitted by the pipeline.
///
/// These travel over the pipeline's event channel to the presentation layer
/// and are never persisted.
#[derive(Debug, Clone, PartialEq)]
pub struct StepResult {
    pub step: PipelineStage,
    pub progress_percent: u8,
    pub status: LogLevel,
    pub message: String,
    pub timestamp: DateTime<Local>,
}

impl StepResult {
    pub fn new(
        step: PipelineStage,
        progress_percent: u8,
        status: LogLevel,
        message: impl Into<String>,
    ) -> Self {
        Self {
            step,
            progress_percent,
            status,
            message: message.into(),
            timestamp: Local::now(),
        }
    }
}

/// Run state shared between the pipeline worker and observers.
///
/// Wrapped by [`StateManager`](crate::state::StateManager); never mutate it
/// directly from outside the manager.
#[derive(Clone, Debug)]
pub struct RunState {
    pub stage: PipelineStage,
    pub progress: u8,
    pub is_running: bool,
    pub warnings: usize,
    pub last_message: Option<String>,
    pub runs_completed: usize,
    pub last_outcome: Option<PipelineStage>,
}

impl Default for RunState {
    fn default() -> Self {
        Self {
            stage: PipelineStage::Idle,
            progress: 0,
            is_running: false,
            warnings: 0,
            last_message: None,
            runs_completed: 0,
            last_outcome: None,
        }
    }
}

impl RunState {
    /// Reset per-run fields at the start of a new run
    pub fn reset_run(&mut self) {
        self.stage = PipelineStage::Idle;
        self.progress = 0;
        self.warnings = 0;
        self.last_message = None;
    }

    /// Whether a new run may be started
    pub fn can_start(&self) -> bool {
        !self.is_running
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ORDER: [PipelineStage; 8] = [
        PipelineStage::Idle,
        PipelineStage::ValidatingInputs,
        PipelineStage::Extracting,
        PipelineStage::Reconciling,
        PipelineStage::CopyingWorld,
        PipelineStage::MirroringMods,
        PipelineStage::Updating,
        PipelineStage::Launching,
    ];

    #[test]
    fn test_completion_percent_is_monotonic() {
        let percents: Vec<u8> = ORDER.iter().map(|s| s.completion_percent()).collect();
        assert_eq!(percents, vec![0, 10, 20, 35, 50, 70, 85, 100]);
        assert!(percents.windows(2).all(|w| w[0] <= w[1]));
    }

    #[test]
    fn test_terminal_stages() {
        assert!(PipelineStage::Done.is_terminal());
        assert!(PipelineStage::Failed.is_terminal());
        assert!(!PipelineStage::Updating.is_terminal());
    }

    #[test]
    fn test_reset_run_keeps_history() {
        let mut state = RunState {
            stage: PipelineStage::Done,
            progress: 100,
            warnings: 3,
            runs_completed: 2,
            last_outcome: Some(PipelineStage::Done),
            ..RunState::default()
        };

        state.reset_run();

        assert_eq!(state.stage, PipelineStage::Idle);
        assert_eq!(state.progress, 0);
        assert_eq!(state.warnings, 0);
        assert_eq!(state.runs_completed, 2);
        assert_eq!(state.last_outcome, Some(PipelineStage::Done));
    }

    #[test]
    fn test_log_level_labels() {
        assert_eq!(LogLevel::Warning.to_string(), "WARNING");
        assert_eq!(LogLevel::Success.as_str(), "SUCCESS");
    }
}
