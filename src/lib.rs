// dstsetup - Automated local setup for Don't Starve Together dedicated servers
//
// This is the library crate containing the setup pipeline and its steps.
// The binary crate (main.rs) provides the command-line entry point.

pub mod config;
pub mod logging;
pub mod models;
pub mod pipeline;
pub mod services;
pub mod state;
pub mod ui;

// Re-export commonly used types for convenience
pub use config::{ConfigManager, PreferenceStore};
pub use models::{InstallLayout, PipelineConfig, PipelineStage, Preferences, StepResult};
pub use pipeline::{Pipeline, PipelineError, PipelineOptions, RunReport};
pub use state::{StateChange, StateManager};

/// Application version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Application name
pub const APP_NAME: &str = env!("CARGO_PKG_NAME");
