use crate::services::error::StepError;
use camino::{Utf8Path, Utf8PathBuf};
use std::fs;

/// What a reconciliation pass did
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ReconcileSummary {
    /// The target directory did not exist and was created
    pub created: bool,
    /// Top-level entries removed
    pub removed: usize,
    /// The preserved file existed and survived
    pub preserved: bool,
}

/// Sibling backup location for the preserved file: `<target>/<file name>.bak`.
pub fn backup_path(target_dir: &Utf8Path, preserved: &Utf8Path) -> Utf8PathBuf {
    let name = preserved.file_name().unwrap_or(preserved.as_str());
    target_dir.join(format!("{}.bak", name))
}

/// Clear `target_dir` except for the file at `preserved` (relative to it).
///
/// The preserved file is copied to [`backup_path`] before the sweep and moved
/// back afterwards, so it survives even when it lives inside a subdirectory
/// that the sweep removes. Afterwards `target_dir` exists and holds at most
/// the preserved file.
pub fn reconcile(target_dir: &Utf8Path, preserved: &Utf8Path) -> Result<ReconcileSummary, StepError> {
    if !target_dir.exists() {
        fs::create_dir_all(target_dir).map_err(StepError::io("create", target_dir))?;
        tracing::info!("Created server directory {}", target_dir);
        return Ok(ReconcileSummary {
            created: true,
            ..ReconcileSummary::default()
        });
    }

    let preserved_path = target_dir.join(preserved);
    let backup = backup_path(target_dir, preserved);
    let has_preserved = preserved_path.is_file();

    if has_preserved {
        fs::copy(&preserved_path, &backup).map_err(StepError::io("back up", &preserved_path))?;
        tracing::debug!("Backed up {} to {}", preserved_path, backup);
    }

    // Only a top-level preserved file can be skipped in place
    let keep_in_place = if has_preserved && preserved.components().count() == 1 {
        preserved.file_name()
    } else {
        None
    };

    let mut removed = 0;
    let entries = target_dir
        .read_dir_utf8()
        .map_err(StepError::io("read", target_dir))?;

    for entry in entries {
        let entry = entry.map_err(StepError::io("read", target_dir))?;
        let name = entry.file_name();

        if keep_in_place == Some(name) || (has_preserved && entry.path() == backup.as_path()) {
            continue;
        }

        remove_entry(entry.path())?;
        removed += 1;
    }

    if has_preserved {
        if let Some(parent) = preserved_path.parent() {
            fs::create_dir_all(parent).map_err(StepError::io("create", parent))?;
        }
        fs::rename(&backup, &preserved_path).map_err(StepError::io("restore", &preserved_path))?;
    }

    tracing::info!(
        "Reconciled {}: removed {} entries, preserved {}: {}",
        target_dir,
        removed,
        preserved,
        has_preserved
    );

    Ok(ReconcileSummary {
        created: false,
        removed,
        preserved: has_preserved,
    })
}

fn remove_entry(path: &Utf8Path) -> Result<(), StepError> {
    let metadata = fs::symlink_metadata(path).map_err(StepError::io("inspect", path))?;
    if metadata.is_dir() {
        fs::remove_dir_all(path).map_err(StepError::io("remove", path))
    } else {
        fs::remove_file(path).map_err(StepError::io("remove", path))
    }
}
