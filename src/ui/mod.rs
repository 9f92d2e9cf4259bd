// UI module - console presentation of a pipeline run
//
// This module contains:
// - ConsolePresenter: drains the pipeline's event channel and prints each entry

pub mod console;

pub use console::{ConsolePresenter, PresenterSummary};
