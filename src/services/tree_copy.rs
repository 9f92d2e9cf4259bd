use crate::services::error::StepError;
use camino::Utf8Path;
use std::fs;
use walkdir::WalkDir;

/// Counts from a merge
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CopyStats {
    pub files: usize,
    pub directories: usize,
}

/// Recursively merge `source_dir` into `dest_dir`.
///
/// Missing directories are created, conflicting files are overwritten and
/// keep the source's modification time, and destination entries without a
/// counterpart in the source are left alone. Running it twice yields the same
/// tree as running it once. Symlinks are followed and copied by content.
pub fn merge_into(source_dir: &Utf8Path, dest_dir: &Utf8Path) -> Result<CopyStats, StepError> {
    if !source_dir.is_dir() {
        return Err(StepError::NotFound {
            what: "Source directory",
            path: source_dir.to_path_buf(),
        });
    }

    fs::create_dir_all(dest_dir).map_err(StepError::io("create", dest_dir))?;

    let mut stats = CopyStats::default();

    for entry in WalkDir::new(source_dir).min_depth(1).follow_links(true) {
        let entry = entry.map_err(|err| {
            let path = err
                .path()
                .and_then(Utf8Path::from_path)
                .unwrap_or(source_dir)
                .to_path_buf();
            StepError::Io {
                action: "read",
                path,
                source: err.into(),
            }
        })?;

        let path = Utf8Path::from_path(entry.path())
            .ok_or_else(|| StepError::NonUtf8Path(entry.path().display().to_string()))?;
        let Ok(relative) = path.strip_prefix(source_dir) else {
            continue;
        };
        let target = dest_dir.join(relative);

        if entry.file_type().is_dir() {
            fs::create_dir_all(&target).map_err(StepError::io("create", &target))?;
            stats.directories += 1;
        } else {
            copy_file(path, &target)?;
            stats.files += 1;
        }
    }

    tracing::debug!(
        "Merged {} into {}: {} files, {} directories",
        source_dir,
        dest_dir,
        stats.files,
        stats.directories
    );

    Ok(stats)
}

fn copy_file(source: &Utf8Path, target: &Utf8Path) -> Result<(), StepError> {
    if let Some(parent) = target.parent() {
        fs::create_dir_all(parent).map_err(StepError::io("create", parent))?;
    }

    fs::copy(source, target).map_err(StepError::io("copy", source))?;

    // Read-only copies can't be reopened for writing; the content is what matters
    let preserved = fs::metadata(source)
        .and_then(|m| m.modified())
        .and_then(|modified| {
            fs::File::options()
                .write(true)
                .open(target)?
                .set_modified(modified)
        });
    if let Err(e) = preserved {
        tracing::debug!("Could not preserve modification time of {}: {}", target, e);
    }

    Ok(())
}
