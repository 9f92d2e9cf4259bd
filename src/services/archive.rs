use crate::services::error::StepError;
use camino::{Utf8Path, Utf8PathBuf};
use std::fs::{self, File};
use std::io;
use zip::ZipArchive;

/// Extract every entry of the zip at `archive_path` into `target_dir`.
///
/// `target_dir` is created if missing. Entries whose names would escape the
/// target (absolute paths, `..`) are skipped. A failure part-way through
/// leaves the files extracted so far in place.
///
/// # Returns
/// The number of files written (directories are not counted)
pub fn extract(archive_path: &Utf8Path, target_dir: &Utf8Path) -> Result<usize, StepError> {
    if !archive_path.is_file() {
        return Err(StepError::NotFound {
            what: "Configuration archive",
            path: archive_path.to_path_buf(),
        });
    }

    fs::create_dir_all(target_dir).map_err(StepError::io("create", target_dir))?;

    let file = File::open(archive_path).map_err(StepError::io("open", archive_path))?;
    let mut archive = ZipArchive::new(file).map_err(|source| StepError::Archive {
        path: archive_path.to_path_buf(),
        source,
    })?;

    let mut extracted = 0;

    for index in 0..archive.len() {
        let mut entry = archive.by_index(index).map_err(|source| StepError::Archive {
            path: archive_path.to_path_buf(),
            source,
        })?;

        let Some(relative) = entry.enclosed_name() else {
            tracing::warn!("Skipping unsafe archive entry: {}", entry.name());
            continue;
        };
        let relative = Utf8PathBuf::from_path_buf(relative)
            .map_err(|p| StepError::NonUtf8Path(p.display().to_string()))?;
        let out_path = target_dir.join(&relative);

        if entry.is_dir() {
            fs::create_dir_all(&out_path).map_err(StepError::io("create", &out_path))?;
            continue;
        }

        if let Some(parent) = out_path.parent() {
            fs::create_dir_all(parent).map_err(StepError::io("create", parent))?;
        }

        let mut out_file = File::create(&out_path).map_err(StepError::io("create", &out_path))?;
        io::copy(&mut entry, &mut out_file).map_err(StepError::io("write", &out_path))?;

        #[cfg(unix)]
        if let Some(mode) = entry.unix_mode() {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(&out_path, fs::Permissions::from_mode(mode))
                .map_err(StepError::io("set permissions on", &out_path))?;
        }

        tracing::debug!("Extracted {}", relative);
        extracted += 1;
    }

    tracing::info!("Extracted {} files from {} into {}", extracted, archive_path, target_dir);
    Ok(extracted)
}
