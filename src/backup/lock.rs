use std::fs::{File, OpenOptions, TryLockError};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

use crate::common::errors::{BackupError, BackupResult};

/// Run-level lock: an exclusive OS file lock on `run.lock`, held for as long
/// as this value lives. The file records the owner's PID for diagnostics.
///
/// The lock file itself is never deleted. The kernel drops the lock when the
/// owning process exits, so a crashed run leaves nothing to clean up.
#[derive(Debug)]
pub struct RunLock {
    path: PathBuf,
    file: File,
}

impl RunLock {
    pub fn acquire(path: &Path) -> BackupResult<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| BackupError::io(parent, e))?;
        }

        let mut file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(path)
            .map_err(|e| BackupError::io(path, e))?;

        match file.try_lock() {
            Ok(()) => {}
            Err(TryLockError::WouldBlock) => {
                return Err(BackupError::AlreadyRunning {
                    pid: recorded_pid(&mut file).unwrap_or(0),
                    lock: path.to_path_buf(),
                });
            }
            Err(TryLockError::Error(e)) => return Err(BackupError::io(path, e)),
        }

        file.set_len(0)
            .and_then(|_| file.seek(SeekFrom::Start(0)))
            .and_then(|_| writeln!(file, "{}", std::process::id()))
            .map_err(|e| BackupError::io(path, e))?;

        debug!(lock = %path.display(), "Run lock acquired");
        Ok(Self {
            path: path.to_path_buf(),
            file,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for RunLock {
    fn drop(&mut self) {
        if let Err(e) = self.file.set_len(0) {
            warn!(lock = %self.path.display(), error = %e, "Failed to clear run lock");
        }
        if let Err(e) = self.file.unlock() {
            warn!(lock = %self.path.display(), error = %e, "Failed to release run lock");
        }
    }
}

/// PID written by the current holder; `None` while it has not written one yet
fn recorded_pid(file: &mut File) -> Option<u32> {
    let mut text = String::new();
    file.seek(SeekFrom::Start(0)).ok()?;
    file.read_to_string(&mut text).ok()?;
    text.trim().parse().ok()
}
