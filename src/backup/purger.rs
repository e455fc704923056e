use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};
use tracing::{debug, info, warn};

use crate::common::errors::{BackupError, BackupResult};

const SECS_PER_DAY: u64 = 86_400;

/// Report from a retention pass
#[derive(Debug, Default, Clone, Serialize, Deserialize)]
pub struct PruneReport {
    pub max_age_days: u32,
    pub dry_run: bool,
    pub examined: usize,
    pub pruned: Vec<PrunedEntry>,
    pub bytes_freed: u64,
    pub errors: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PrunedEntry {
    pub path: PathBuf,
    pub age_days: u64,
    pub size_bytes: u64,
}

/// Age in whole days; timestamps in the future count as zero
pub fn age_in_days(modified: SystemTime, now: SystemTime) -> u64 {
    now.duration_since(modified)
        .unwrap_or(Duration::ZERO)
        .as_secs()
        / SECS_PER_DAY
}

/// Delete entries directly under `destination` older than `max_age_days`
pub fn prune(destination: &Path, max_age_days: u32, dry_run: bool) -> BackupResult<PruneReport> {
    prune_at(destination, max_age_days, dry_run, SystemTime::now())
}

/// [`prune`] with an explicit "now".
///
/// An entry is removed when its age strictly exceeds `max_age_days`.
/// Failing to inspect or delete one entry is recorded and the pass moves
/// on; only an unreadable destination directory is an error.
pub fn prune_at(
    destination: &Path,
    max_age_days: u32,
    dry_run: bool,
    now: SystemTime,
) -> BackupResult<PruneReport> {
    prune_with(destination, max_age_days, dry_run, now, remove_entry)
}

fn remove_entry(path: &Path, is_dir: bool) -> std::io::Result<()> {
    if is_dir {
        std::fs::remove_dir_all(path)
    } else {
        std::fs::remove_file(path)
    }
}

fn prune_with<R>(
    destination: &Path,
    max_age_days: u32,
    dry_run: bool,
    now: SystemTime,
    mut remove: R,
) -> BackupResult<PruneReport>
where
    R: FnMut(&Path, bool) -> std::io::Result<()>,
{
    let mut report = PruneReport {
        max_age_days,
        dry_run,
        ..Default::default()
    };

    if !destination.exists() {
        return Ok(report);
    }

    let entries =
        std::fs::read_dir(destination).map_err(|e| BackupError::io(destination, e))?;

    for entry in entries {
        let entry = match entry {
            Ok(e) => e,
            Err(e) => {
                report.errors.push(format!("Failed to read entry: {}", e));
                continue;
            }
        };
        let path = entry.path();
        report.examined += 1;

        let metadata = match std::fs::symlink_metadata(&path) {
            Ok(m) => m,
            Err(e) => {
                report.errors.push(BackupError::Prune { path, source: e }.to_string());
                continue;
            }
        };
        let modified = match metadata.modified() {
            Ok(t) => t,
            Err(e) => {
                report.errors.push(BackupError::Prune { path, source: e }.to_string());
                continue;
            }
        };

        let age_days = age_in_days(modified, now);
        if age_days <= u64::from(max_age_days) {
            debug!(path = %path.display(), age_days, "Within retention window");
            continue;
        }

        let size_bytes = if metadata.is_dir() {
            dir_size(&path)
        } else {
            metadata.len()
        };

        if !dry_run {
            if let Err(e) = remove(&path, metadata.is_dir()) {
                let err = BackupError::Prune { path, source: e };
                warn!(error = %err, "Prune failed for entry");
                report.errors.push(err.to_string());
                continue;
            }
            info!(path = %path.display(), age_days, "Pruned expired backup");
        }

        report.bytes_freed += size_bytes;
        report.pruned.push(PrunedEntry {
            path,
            age_days,
            size_bytes,
        });
    }

    Ok(report)
}

/// Calculate total size of a directory
pub fn dir_size(path: &Path) -> u64 {
    walkdir::WalkDir::new(path)
        .follow_links(false)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
        .map(|e| e.metadata().map(|m| m.len()).unwrap_or(0))
        .sum()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn whole_days_round_down() {
        let now = SystemTime::UNIX_EPOCH + Duration::from_secs(100 * SECS_PER_DAY);
        let day = Duration::from_secs(SECS_PER_DAY);

        assert_eq!(age_in_days(now, now), 0);
        assert_eq!(age_in_days(now - day + Duration::from_secs(1), now), 0);
        assert_eq!(age_in_days(now - day, now), 1);
        assert_eq!(age_in_days(now - day * 31 - Duration::from_secs(3600), now), 31);
    }

    #[test]
    fn future_timestamps_are_fresh() {
        let now = SystemTime::UNIX_EPOCH + Duration::from_secs(SECS_PER_DAY);
        assert_eq!(age_in_days(now + Duration::from_secs(SECS_PER_DAY * 5), now), 0);
    }

    #[test]
    fn failed_removal_does_not_stop_the_pass() {
        let store = tempfile::TempDir::new().unwrap();
        let expired = SystemTime::now() - Duration::from_secs(40 * SECS_PER_DAY);
        for name in ["a.zip", "b.zip", "c.zip"] {
            let path = store.path().join(name);
            std::fs::write(&path, b"zip").unwrap();
            std::fs::File::options()
                .write(true)
                .open(&path)
                .unwrap()
                .set_modified(expired)
                .unwrap();
        }
        std::fs::create_dir(store.path().join("old-dir")).unwrap();
        std::fs::write(store.path().join("fresh.zip"), b"zip").unwrap();

        let report = prune_with(store.path(), 30, false, SystemTime::now(), |path, is_dir| {
            if path.ends_with("b.zip") {
                Err(std::io::Error::new(std::io::ErrorKind::PermissionDenied, "busy"))
            } else {
                remove_entry(path, is_dir)
            }
        })
        .unwrap();

        assert_eq!(report.examined, 5);
        assert_eq!(report.pruned.len(), 2);
        assert_eq!(report.bytes_freed, 6);
        assert_eq!(report.errors.len(), 1);
        assert!(report.errors[0].contains("b.zip"));
        assert!(store.path().join("b.zip").exists());
        assert!(!store.path().join("a.zip").exists());
        assert!(!store.path().join("c.zip").exists());
        assert!(store.path().join("old-dir").exists());
        assert!(store.path().join("fresh.zip").exists());
    }

    #[test]
    fn missing_destination_is_empty_report() {
        let report = prune(Path::new("/definitely/not/here/backsnap"), 30, false).unwrap();
        assert_eq!(report.examined, 0);
        assert!(report.pruned.is_empty());
    }
}
