//! Naming-convention checks for user-selected folders.
//!
//! The checks are purely lexical. Existence is verified by the pipeline when
//! the path is actually used, so users can pick a folder before it is
//! populated.

use camino::Utf8PathBuf;
use regex::Regex;
use std::fmt;
use thiserror::Error;

/// Which user-selected folder a path is meant to be
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PathKind {
    /// SteamCMD install directory, leaf must end with `steamcmd`
    UpdaterInstall,
    /// Steam client install directory, leaf must end with `steam`
    ContentLibrary,
    /// World save folder, leaf must start with `cluster_`
    WorldFolder,
}

impl PathKind {
    pub const fn rule(self) -> &'static str {
        match self {
            Self::UpdaterInstall => "end with \"steamcmd\"",
            Self::ContentLibrary => "end with \"steam\"",
            Self::WorldFolder => "start with \"cluster_\"",
        }
    }
}

impl fmt::Display for PathKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::UpdaterInstall => "SteamCMD install",
            Self::ContentLibrary => "Steam install",
            Self::WorldFolder => "World",
        })
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("{kind} path is empty")]
    Empty { kind: PathKind },

    #[error("{kind} folder name '{segment}' must {rule} (got {path})", rule = .kind.rule())]
    NamingConventionMismatch {
        kind: PathKind,
        path: String,
        segment: String,
    },
}

/// Validates user-selected paths against the expected folder names.
///
/// Both `\` and `/` are treated as separators regardless of platform, so a
/// Windows path typed on Linux still yields the right final segment.
pub struct PathValidator {
    updater_pattern: Regex,
    library_pattern: Regex,
    world_pattern: Regex,
}

impl PathValidator {
    pub fn new() -> Self {
        Self {
            updater_pattern: Regex::new(r"(?i)steamcmd$").expect("Invalid updater regex"),
            library_pattern: Regex::new(r"(?i)steam$").expect("Invalid library regex"),
            world_pattern: Regex::new(r"(?i)^cluster_").expect("Invalid world regex"),
        }
    }

    /// Check `path` against the convention for `kind`.
    ///
    /// Returns the trimmed path (no surrounding whitespace, no trailing
    /// separators) on success.
    pub fn validate(&self, path: &str, kind: PathKind) -> Result<Utf8PathBuf, ValidationError> {
        let normalized = normalize(path);
        if normalized.is_empty() {
            return Err(ValidationError::Empty { kind });
        }

        let segment = final_segment(normalized);
        let pattern = match kind {
            PathKind::UpdaterInstall => &self.updater_pattern,
            PathKind::ContentLibrary => &self.library_pattern,
            PathKind::WorldFolder => &self.world_pattern,
        };

        if !pattern.is_match(segment) {
            tracing::debug!("Rejected {} path {}: segment '{}'", kind, normalized, segment);
            return Err(ValidationError::NamingConventionMismatch {
                kind,
                path: normalized.to_string(),
                segment: segment.to_string(),
            });
        }

        Ok(Utf8PathBuf::from(normalized))
    }
}

impl Default for PathValidator {
    fn default() -> Self {
        Self::new()
    }
}

fn normalize(path: &str) -> &str {
    path.trim().trim_end_matches(['\\', '/'])
}

fn final_segment(path: &str) -> &str {
    path.rsplit(['\\', '/']).next().unwrap_or(path)
}
