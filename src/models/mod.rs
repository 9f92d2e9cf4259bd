//! Data models for dstsetup.
//!
//! - [`Preferences`]: the flat key/value preferences persisted between runs
//! - [`PipelineConfig`]: immutable inputs for one pipeline run
//! - [`InstallLayout`]: fixed relative paths, executable names and the injected data root
//! - [`RunState`]: stage/progress of the current run, wrapped by [`StateManager`](crate::state::StateManager)
//! - [`StepResult`]: structured log entry sent to the presentation layer

pub mod config;
pub mod run_state;

pub use config::{CLIENT_APP_ID, InstallLayout, PipelineConfig, Preferences, SERVER_APP_ID};
pub use run_state::{LogLevel, PipelineStage, RunState, StepResult};
