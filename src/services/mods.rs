//! Rebuilds the dedicated server's `mods` folder from the Steam client.
//!
//! Two sources feed the destination:
//! - the workshop cache (`steamapps/workshop/content/322330`), whose folders
//!   are numeric item ids and get a `workshop-` prefix
//! - the client's locally installed mods, merged in unchanged
//!
//! The destination is always deleted and recreated first.

use crate::models::InstallLayout;
use crate::services::error::StepError;
use crate::services::tree_copy;
use camino::{Utf8Path, Utf8PathBuf};
use std::fs;

/// What to do when the workshop cache folder does not exist
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MissingSourcePolicy {
    /// Log a warning and continue with zero workshop items
    #[default]
    Tolerant,
    /// Fail the step with `NotFound` before touching the destination
    Strict,
}

/// Result of a mirror pass
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct MirrorSummary {
    pub workshop_copied: usize,
    pub local_copied: usize,
    pub source_missing: bool,
    /// One entry per tolerated problem, in the order they happened
    pub warnings: Vec<String>,
}

impl MirrorSummary {
    pub fn total(&self) -> usize {
        self.workshop_copied + self.local_copied
    }
}

/// Mirror subscribed and local mods into the server install.
///
/// Per-item copy failures are recorded in [`MirrorSummary::warnings`] and do
/// not stop the loop.
pub fn mirror(
    layout: &InstallLayout,
    content_library: &Utf8Path,
    updater_install: &Utf8Path,
    policy: MissingSourcePolicy,
) -> Result<MirrorSummary, StepError> {
    let workshop = layout.workshop_source(content_library);
    let destination = layout.mods_destination(updater_install);
    let mut summary = MirrorSummary::default();

    let workshop_present = workshop.is_dir();
    if !workshop_present {
        match policy {
            MissingSourcePolicy::Strict => {
                return Err(StepError::NotFound {
                    what: "Steam Workshop content",
                    path: workshop,
                });
            }
            MissingSourcePolicy::Tolerant => {
                tracing::warn!("Workshop content missing at {}", workshop);
                summary.source_missing = true;
                summary.warnings.push(format!(
                    "Steam Workshop content not found at {}, no subscribed mods copied",
                    workshop
                ));
            }
        }
    }

    recreate_dir(&destination)?;

    if workshop_present {
        for (name, path) in top_level_dirs(&workshop, &mut summary.warnings)? {
            let target = destination.join(format!("{}{}", layout.workshop_prefix, name));
            match tree_copy::merge_into(&path, &target) {
                Ok(_) => summary.workshop_copied += 1,
                Err(e) => {
                    tracing::warn!("Failed to copy workshop item {}: {}", name, e);
                    summary
                        .warnings
                        .push(format!("Failed to copy workshop item {}: {}", name, e));
                }
            }
        }
    }

    let local = layout.local_mods_source(content_library);
    if local.is_dir() {
        for (name, path) in top_level_dirs(&local, &mut summary.warnings)? {
            match tree_copy::merge_into(&path, &destination.join(&name)) {
                Ok(_) => summary.local_copied += 1,
                Err(e) => {
                    tracing::warn!("Failed to copy local mod {}: {}", name, e);
                    summary
                        .warnings
                        .push(format!("Failed to copy local mod {}: {}", name, e));
                }
            }
        }
    } else {
        tracing::debug!("No local mods folder at {}", local);
    }

    tracing::info!(
        "Mirrored {} workshop and {} local mods into {}",
        summary.workshop_copied,
        summary.local_copied,
        destination
    );

    Ok(summary)
}

fn recreate_dir(dir: &Utf8Path) -> Result<(), StepError> {
    if dir.exists() {
        fs::remove_dir_all(dir).map_err(StepError::io("remove", dir))?;
    }
    fs::create_dir_all(dir).map_err(StepError::io("create", dir))
}

/// Immediate subdirectories of `dir`, sorted by name. Files are ignored.
fn top_level_dirs(
    dir: &Utf8Path,
    warnings: &mut Vec<String>,
) -> Result<Vec<(String, Utf8PathBuf)>, StepError> {
    let mut dirs = Vec::new();

    for entry in dir.read_dir_utf8().map_err(StepError::io("read", dir))? {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                warnings.push(format!("Skipped unreadable entry in {}: {}", dir, e));
                continue;
            }
        };
        if entry.file_type().map(|t| t.is_dir()).unwrap_or(false) {
            dirs.push((entry.file_name().to_string(), entry.path().to_path_buf()));
        }
    }

    dirs.sort();
    Ok(dirs)
}
