use std::path::{Path, PathBuf};
use tracing::{debug, warn};

use crate::common::errors::{BackupError, BackupResult};

/// A scratch directory removed exactly once: explicitly through
/// [`ScratchDir::remove`], or on drop if the owner bailed out early.
#[derive(Debug)]
pub struct ScratchDir {
    path: PathBuf,
    removed: bool,
}

impl ScratchDir {
    /// Create the directory (and its parents). Fails if it already exists,
    /// so two runs can never share one.
    pub fn create(path: impl Into<PathBuf>) -> BackupResult<Self> {
        let path = path.into();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| BackupError::io(parent, e))?;
        }
        std::fs::create_dir(&path).map_err(|e| BackupError::io(&path, e))?;
        Ok(Self {
            path,
            removed: false,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Delete the directory tree now
    pub fn remove(mut self) -> BackupResult<()> {
        self.removed = true;
        remove_tree(&self.path)
    }
}

impl Drop for ScratchDir {
    fn drop(&mut self) {
        if self.removed {
            return;
        }
        if let Err(e) = remove_tree(&self.path) {
            warn!(error = %e, "Failed to clean up scratch directory");
        }
    }
}

fn remove_tree(path: &Path) -> BackupResult<()> {
    match std::fs::remove_dir_all(path) {
        Ok(()) => {
            debug!(path = %path.display(), "Removed scratch directory");
            Ok(())
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(BackupError::io(path, e)),
    }
}

/// A file copied into the staging tree during one run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StagingEntry {
    pub source: PathBuf,
    /// Path relative to the common backup root; also the archive entry name
    pub relative: PathBuf,
    pub staged: PathBuf,
    pub size_bytes: u64,
}

/// Copy one matched file into the staging tree.
///
/// The file lands at `staging_root/<path relative to backup_root>`; parent
/// directories are created as needed.
pub fn stage(source: &Path, backup_root: &Path, staging_root: &Path) -> BackupResult<StagingEntry> {
    let relative = source
        .strip_prefix(backup_root)
        .map_err(|_| BackupError::OutsideRoot {
            path: source.to_path_buf(),
            root: backup_root.to_path_buf(),
        })?;

    // A file target equal to the root has no relative name of its own
    let relative = if relative.as_os_str().is_empty() {
        Path::new(source.file_name().unwrap_or(source.as_os_str()))
    } else {
        relative
    };

    let staged = staging_root.join(relative);

    if let Some(parent) = staged.parent() {
        std::fs::create_dir_all(parent).map_err(|e| BackupError::Copy {
            from: source.to_path_buf(),
            to: parent.to_path_buf(),
            source: e,
        })?;
    }

    let size_bytes = std::fs::copy(source, &staged).map_err(|e| BackupError::Copy {
        from: source.to_path_buf(),
        to: staged.clone(),
        source: e,
    })?;

    debug!(from = %source.display(), to = %staged.display(), "Staged file");
    Ok(StagingEntry {
        source: source.to_path_buf(),
        relative: relative.to_path_buf(),
        staged,
        size_bytes,
    })
}
