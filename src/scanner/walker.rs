use std::path::Path;
use tracing::{debug, trace, warn};
use walkdir::WalkDir;

use super::matcher::PathMatcher;
use crate::common::config::Depth;
use crate::common::errors::{BackupError, BackupResult};

/// Counters for one walked target
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct WalkStats {
    /// Files handed to the visitor
    pub visited: usize,
    /// Files rejected by the filters or because they are not regular files
    pub skipped: usize,
    /// The root did not exist
    pub missing: bool,
}

/// Walk `root` and call `visit` for every regular file whose base name
/// passes `matcher`.
///
/// Depth is a descent budget for directories only: files directly under
/// a walked directory are always considered, a subdirectory is entered only
/// while budget remains. A directory root with `Levels(-1)` yields nothing;
/// a file root is never depth-gated. Links are followed by target type and
/// link cycles are skipped with a warning.
///
/// A missing root is a warning, not an error. Any error returned by
/// `visit` stops the walk and is returned as-is.
pub fn walk<F>(root: &Path, depth: Depth, matcher: &PathMatcher, mut visit: F) -> BackupResult<WalkStats>
where
    F: FnMut(&Path) -> BackupResult<()>,
{
    let mut stats = WalkStats::default();

    let metadata = match std::fs::metadata(root) {
        Ok(m) => m,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            warn!(path = %root.display(), "Source path does not exist, skipping");
            stats.missing = true;
            return Ok(stats);
        }
        Err(e) => return Err(BackupError::io(root, e)),
    };

    if !metadata.is_dir() {
        if metadata.is_file() {
            visit_file(root, matcher, &mut visit, &mut stats)?;
        } else {
            warn!(path = %root.display(), "Not a regular file or directory, skipping");
            stats.skipped += 1;
        }
        return Ok(stats);
    }

    let walker = match depth {
        Depth::Unbounded => WalkDir::new(root),
        Depth::Levels(n) if n < 0 => {
            debug!(path = %root.display(), "Recursion budget exhausted, not walking");
            return Ok(stats);
        }
        // Files at walkdir depth k sit k-1 directory descents below the root
        Depth::Levels(n) => WalkDir::new(root).max_depth(n as usize + 1),
    };

    for entry in walker.follow_links(true).min_depth(1) {
        let entry = match entry {
            Ok(e) => e,
            Err(e) => {
                let path = e.path().unwrap_or(root).to_path_buf();
                if e.loop_ancestor().is_some() {
                    warn!(path = %path.display(), "Symlink cycle detected, skipping");
                    continue;
                }
                return Err(BackupError::Walk { path, source: e });
            }
        };

        let file_type = entry.file_type();
        if file_type.is_dir() {
            continue;
        }
        if !file_type.is_file() {
            debug!(path = %entry.path().display(), "Skipping special file");
            stats.skipped += 1;
            continue;
        }

        visit_file(entry.path(), matcher, &mut visit, &mut stats)?;
    }

    Ok(stats)
}

fn visit_file<F>(
    path: &Path,
    matcher: &PathMatcher,
    visit: &mut F,
    stats: &mut WalkStats,
) -> BackupResult<()>
where
    F: FnMut(&Path) -> BackupResult<()>,
{
    let base_name = path
        .file_name()
        .map(|n| n.to_string_lossy())
        .unwrap_or_default();

    if !matcher.matches(&base_name) {
        trace!(path = %path.display(), "Filtered out");
        stats.skipped += 1;
        return Ok(());
    }

    visit(path)?;
    stats.visited += 1;
    Ok(())
}
