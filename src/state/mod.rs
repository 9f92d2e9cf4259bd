// State management module
//
// This module provides the StateManager which wraps RunState with thread-safe access
// using Arc<RwLock<T>> and emits change events for observers of a pipeline run.

use crate::models::{PipelineStage, RunState};
use std::sync::{Arc, RwLock};
use tokio::sync::broadcast;

/// Change events emitted when run state is modified
///
/// These events let observers follow a run without polling. The pipeline's
/// log entries travel separately over its own event channel.
#[derive(Clone, Debug, PartialEq)]
pub enum StateChange {
    /// A pipeline run has started
    RunStarted,

    /// The pipeline moved to another stage
    StageChanged { stage: PipelineStage },

    /// Progress has been updated
    ProgressUpdated { percent: u8 },

    /// A tolerated problem was logged
    WarningRecorded { total: usize },

    /// The run reached `Done` or `Failed`
    RunFinished {
        outcome: PipelineStage,
        warnings: usize,
    },

    /// State has been reset
    StateReset,
}

/// Thread-safe run state manager with event emission
///
/// This is the central state component that:
/// - Provides thread-safe access to [`RunState`] via `Arc<RwLock<T>>`
/// - Detects state changes and emits [`StateChange`] events
/// - Enforces that only one pipeline run is active at a time
/// - Supports subscribing to state changes via tokio broadcast channels
///
/// # Related Types
///
/// - [`crate::models::RunState`]: The underlying state structure
/// - [`crate::pipeline::Pipeline`]: Drives the state through a run
pub struct StateManager {
    /// The run state protected by RwLock for thread-safe access
    state: Arc<RwLock<RunState>>,

    /// Broadcast channel for emitting state change events
    state_tx: broadcast::Sender<StateChange>,
}

impl StateManager {
    /// Create a new StateManager with default state
    ///
    /// # Returns
    /// A new StateManager with a broadcast channel buffer of 100 events
    pub fn new() -> Self {
        let (state_tx, _) = broadcast::channel(100);
        Self {
            state: Arc::new(RwLock::new(RunState::default())),
            state_tx,
        }
    }

    /// Get a cloned snapshot of the current state
    pub fn snapshot(&self) -> RunState {
        self.state.read().unwrap().clone()
    }

    /// Execute a function with read access to the state
    ///
    /// # Example
    /// ```ignore
    /// let running = state_manager.read(|state| state.is_running);
    /// ```
    pub fn read<F, R>(&self, f: F) -> R
    where
        F: FnOnce(&RunState) -> R,
    {
        let state = self.state.read().unwrap();
        f(&state)
    }

    /// Update the state and emit change events
    ///
    /// The write lock is held while `update_fn` runs, so check-and-set
    /// sequences inside it are atomic.
    ///
    /// # Returns
    /// A vector of StateChange events that were emitted
    pub fn update<F>(&self, update_fn: F) -> Vec<StateChange>
    where
        F: FnOnce(&mut RunState),
    {
        let mut state = self.state.write().unwrap();
        let old_state = state.clone();

        update_fn(&mut state);

        let changes = Self::detect_changes(&old_state, &state);

        for change in &changes {
            // Ignore send errors - it's OK if no one is listening
            let _ = self.state_tx.send(change.clone());
        }

        changes
    }

    /// Subscribe to state change events
    pub fn subscribe(&self) -> broadcast::Receiver<StateChange> {
        self.state_tx.subscribe()
    }

    fn detect_changes(old: &RunState, new: &RunState) -> Vec<StateChange> {
        let mut changes = Vec::new();

        if !old.is_running && new.is_running {
            changes.push(StateChange::RunStarted);
        }

        if old.stage != new.stage {
            changes.push(StateChange::StageChanged { stage: new.stage });
        }

        if old.progress != new.progress {
            changes.push(StateChange::ProgressUpdated {
                percent: new.progress,
            });
        }

        if new.warnings > old.warnings {
            changes.push(StateChange::WarningRecorded {
                total: new.warnings,
            });
        }

        if old.is_running && !new.is_running {
            changes.push(StateChange::RunFinished {
                outcome: new.last_outcome.unwrap_or(new.stage),
                warnings: new.warnings,
            });
        }

        changes
    }

    /// Claim the single run slot.
    ///
    /// # Returns
    /// `None` if a run is already active; otherwise the events emitted when
    /// the run was marked as started
    pub fn try_begin_run(&self) -> Option<Vec<StateChange>> {
        let mut started = false;
        let changes = self.update(|state| {
            if state.can_start() {
                state.reset_run();
                state.is_running = true;
                started = true;
            }
        });

        started.then_some(changes)
    }

    /// Move to `stage`
    pub fn enter_stage(&self, stage: PipelineStage) -> Vec<StateChange> {
        self.update(|state| {
            state.stage = stage;
        })
    }

    /// Raise progress to `percent`; lower values are ignored so progress never goes back
    pub fn set_progress(&self, percent: u8) -> Vec<StateChange> {
        self.update(|state| {
            state.progress = state.progress.max(percent.min(100));
        })
    }

    /// Remember the latest log message
    pub fn record_message(&self, message: &str) -> Vec<StateChange> {
        self.update(|state| {
            state.last_message = Some(message.to_string());
        })
    }

    /// Count a tolerated problem
    pub fn record_warning(&self, message: &str) -> Vec<StateChange> {
        self.update(|state| {
            state.warnings += 1;
            state.last_message = Some(message.to_string());
        })
    }

    /// Release the run slot with `outcome` (`Done` or `Failed`)
    pub fn finish_run(&self, outcome: PipelineStage) -> Vec<StateChange> {
        self.update(|state| {
            state.stage = outcome;
            state.is_running = false;
            state.last_outcome = Some(outcome);
            state.runs_completed += 1;
            if outcome == PipelineStage::Done {
                state.progress = 100;
            }
        })
    }

    /// Reset per-run state; ignored while a run is active
    pub fn reset(&self) -> Vec<StateChange> {
        if self.read(|s| s.is_running) {
            tracing::warn!("Ignoring state reset while a run is active");
            return Vec::new();
        }

        let mut changes = self.update(|state| {
            state.reset_run();
        });

        let reset_event = StateChange::StateReset;
        let _ = self.state_tx.send(reset_event.clone());
        changes.push(reset_event);

        changes
    }
}

impl Default for StateManager {
    fn default() -> Self {
        Self::new()
    }
}

// Make StateManager cloneable for sharing across threads
impl Clone for StateManager {
    fn clone(&self) -> Self {
        Self {
            state: Arc::clone(&self.state),
            state_tx: self.state_tx.clone(),
        }
    }
}
