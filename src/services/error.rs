use crate::services::launcher::Shard;
use crate::services::paths::ValidationError;
use camino::Utf8PathBuf;
use std::io;
use thiserror::Error;

/// Errors raised by the pipeline steps.
///
/// Any of these aborts the run at the step that raised it. Conditions the
/// pipeline tolerates (updater exit codes, per-mod copy failures) are not
/// errors; they come back inside the step's report as warnings.
#[derive(Error, Debug)]
pub enum StepError {
    #[error("{what} is not configured")]
    MissingInput { what: &'static str },

    #[error("{what} not found: {path}")]
    NotFound { what: &'static str, path: Utf8PathBuf },

    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("Failed to {action} {path}: {source}")]
    Io {
        action: &'static str,
        path: Utf8PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Invalid archive {path}: {source}")]
    Archive {
        path: Utf8PathBuf,
        #[source]
        source: zip::result::ZipError,
    },

    #[error("Failed to start updater {path}: {source}")]
    UpdateFailed {
        path: Utf8PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Failed to launch {shard} shard: {source}")]
    LaunchFailed {
        shard: Shard,
        #[source]
        source: io::Error,
    },

    #[error("Path is not valid UTF-8: {0}")]
    NonUtf8Path(String),

    #[error("Worker task failed: {0}")]
    Worker(String),
}

impl StepError {
    /// Build a `map_err` adapter for an I/O failure on `path`.
    ///
    /// ```ignore
    /// fs::create_dir_all(dir).map_err(StepError::io("create", dir))?;
    /// ```
    pub fn io(
        action: &'static str,
        path: impl Into<Utf8PathBuf>,
    ) -> impl FnOnce(io::Error) -> Self {
        let path = path.into();
        move |source| Self::Io {
            action,
            path,
            source,
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. } | Self::MissingInput { .. })
    }
}
