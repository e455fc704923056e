use std::fs::File;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use crate::common::errors::{BackupError, BackupResult};

/// Prefix of the temporary name used while copying across file systems
const PARTIAL_PREFIX: &str = ".partial-";

/// Move a finished archive into the destination store under the same name.
///
/// The archive only ever appears in the store under its final name once it
/// is complete: a same-filesystem rename is used when possible, otherwise
/// the bytes are copied to a hidden temporary name, synced, and renamed.
/// An existing archive with the same name is never overwritten.
pub fn promote(working_archive: &Path, destination: &Path) -> BackupResult<PathBuf> {
    let fail = |message: String| BackupError::Promotion {
        archive: working_archive.to_path_buf(),
        destination: destination.to_path_buf(),
        message,
    };

    let file_name = working_archive
        .file_name()
        .ok_or_else(|| fail("archive path has no file name".to_string()))?;
    let final_path = destination.join(file_name);

    if final_path.exists() {
        return Err(fail(format!("'{}' already exists", final_path.display())));
    }

    std::fs::create_dir_all(destination)
        .map_err(|e| fail(format!("cannot create destination: {}", e)))?;

    // Try rename first (fast, same filesystem)
    if std::fs::rename(working_archive, &final_path).is_ok() {
        info!(archive = %final_path.display(), "Archive promoted");
        return Ok(final_path);
    }

    // Fallback: copy under a temporary name, then rename into place
    let partial = destination.join(format!("{}{}", PARTIAL_PREFIX, file_name.to_string_lossy()));
    debug!(partial = %partial.display(), "Rename failed, copying across file systems");

    let copied = std::fs::copy(working_archive, &partial)
        .and_then(|_| File::open(&partial)?.sync_all())
        .and_then(|_| std::fs::rename(&partial, &final_path));

    if let Err(e) = copied {
        let _ = std::fs::remove_file(&partial);
        return Err(fail(e.to_string()));
    }

    info!(archive = %final_path.display(), "Archive promoted");
    Ok(final_path)
}

/// Whether a destination entry is a leftover from an interrupted promotion
pub fn is_partial(path: &Path) -> bool {
    path.file_name()
        .map(|n| n.to_string_lossy().starts_with(PARTIAL_PREFIX))
        .unwrap_or(false)
}

/// Remove `.partial-*` files left in the store by an interrupted copy.
/// Returns how many were removed.
pub fn clear_partials(destination: &Path) -> BackupResult<usize> {
    let entries = match std::fs::read_dir(destination) {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(0),
        Err(e) => return Err(BackupError::io(destination, e)),
    };

    let mut removed = 0;
    for entry in entries {
        let path = entry.map_err(|e| BackupError::io(destination, e))?.path();
        if !is_partial(&path) || !path.is_file() {
            continue;
        }
        std::fs::remove_file(&path).map_err(|e| BackupError::io(&path, e))?;
        warn!(path = %path.display(), "Removed leftover partial archive");
        removed += 1;
    }
    Ok(removed)
}
