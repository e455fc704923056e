use std::path::PathBuf;

/// Typed errors for backup operations.
/// `anyhow` is used at the CLI boundary, but the engine needs to know
/// which stage failed and whether the failure is fatal to the run.
#[derive(Debug, thiserror::Error)]
pub enum BackupError {
    /// A configured target does not exist (warning only, never fatal)
    #[error("source path does not exist: '{}'", path.display())]
    MissingSourcePath { path: PathBuf },

    /// A matched file could not be copied into the staging tree
    #[error("failed to copy '{}' to '{}': {source}", from.display(), to.display())]
    Copy {
        from: PathBuf,
        to: PathBuf,
        source: std::io::Error,
    },

    /// A matched file is not below the common backup root
    #[error("'{}' is outside the backup root '{}'", path.display(), root.display())]
    OutsideRoot { path: PathBuf, root: PathBuf },

    /// Directory traversal failed (unreadable directory, dangling link, ...)
    #[error("failed to walk '{}': {source}", path.display())]
    Walk {
        path: PathBuf,
        source: walkdir::Error,
    },

    /// Zip creation failed
    #[error("failed to write archive '{}': {source}", path.display())]
    Archive {
        path: PathBuf,
        source: zip::result::ZipError,
    },

    /// The finished archive could not be placed in the destination store
    #[error("failed to promote '{}' into '{}': {message}", archive.display(), destination.display())]
    Promotion {
        archive: PathBuf,
        destination: PathBuf,
        message: String,
    },

    /// A single destination entry could not be pruned
    #[error("failed to prune '{}': {source}", path.display())]
    Prune {
        path: PathBuf,
        source: std::io::Error,
    },

    /// Another run holds the run lock
    #[error("another backup run is in progress (pid {pid}, lock '{}')", lock.display())]
    AlreadyRunning { pid: u32, lock: PathBuf },

    /// The run identifier is already taken in the working area or destination
    #[error("run '{run_id}' already exists at '{}'", path.display())]
    RunCollision { run_id: String, path: PathBuf },

    /// An invalid filter pattern
    #[error("invalid filter pattern '{pattern}': {source}")]
    Filter {
        pattern: String,
        source: regex::Error,
    },

    /// Generic file system failure with the path that caused it
    #[error("I/O error at '{}': {source}", path.display())]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
}

impl BackupError {
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        BackupError::Io {
            path: path.into(),
            source,
        }
    }
}

pub type BackupResult<T> = std::result::Result<T, BackupError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_includes_paths() {
        let err = BackupError::OutsideRoot {
            path: PathBuf::from("/etc/passwd"),
            root: PathBuf::from("/home"),
        };
        let msg = err.to_string();
        assert!(msg.contains("/etc/passwd"));
        assert!(msg.contains("/home"));
    }
}
