use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};
use walkdir::WalkDir;
use zip::write::SimpleFileOptions;
use zip::{AesMode, CompressionMethod, ZipWriter};

use super::staging::ScratchDir;
use crate::common::errors::{BackupError, BackupResult};

pub const ARCHIVE_EXTENSION: &str = "zip";

/// What ended up inside a finished archive
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchiveSummary {
    pub path: PathBuf,
    pub files: usize,
    pub directories: usize,
    pub size_bytes: u64,
}

/// Compress the staging tree into `output`, then delete the staging tree.
///
/// Entry names are relative to the staging root and use `/` separators.
/// The staging tree is removed whether or not compression succeeded; a
/// failure to remove it is logged only. On failure the partial output
/// file is removed too.
pub fn compress(
    staging: ScratchDir,
    output: &Path,
    password: Option<&str>,
) -> BackupResult<ArchiveSummary> {
    let result = write_archive(staging.path(), output, password);

    if let Err(e) = staging.remove() {
        warn!(error = %e, "Failed to remove staging directory after compression");
    }

    match result {
        Ok(summary) => {
            info!(
                archive = %summary.path.display(),
                files = summary.files,
                directories = summary.directories,
                bytes = summary.size_bytes,
                "Archive created"
            );
            Ok(summary)
        }
        Err(e) => {
            if let Err(rm) = std::fs::remove_file(output) {
                if rm.kind() != std::io::ErrorKind::NotFound {
                    warn!(path = %output.display(), error = %rm, "Failed to remove partial archive");
                }
            }
            Err(e)
        }
    }
}

fn write_archive(root: &Path, output: &Path, password: Option<&str>) -> BackupResult<ArchiveSummary> {
    let archive_err = |source: zip::result::ZipError| BackupError::Archive {
        path: output.to_path_buf(),
        source,
    };

    let file = File::create(output).map_err(|e| archive_err(e.into()))?;
    let mut zip = ZipWriter::new(BufWriter::new(file));

    let dir_options = SimpleFileOptions::default().compression_method(CompressionMethod::Stored);
    // 9 is the highest level the default deflate backend accepts
    let base_options = SimpleFileOptions::default()
        .compression_method(CompressionMethod::Deflated)
        .compression_level(Some(9))
        .large_file(true);
    let file_options = match password {
        Some(pw) if !pw.is_empty() => base_options.with_aes_encryption(AesMode::Aes256, pw),
        _ => base_options,
    };

    let mut files = 0usize;
    let mut directories = 0usize;

    // Sorted so identical trees produce identical entry order
    for entry in WalkDir::new(root).min_depth(1).sort_by_file_name() {
        let entry = entry.map_err(|e| archive_err(zip::result::ZipError::Io(e.into())))?;
        let name = entry_name(root, entry.path());

        if entry.file_type().is_dir() {
            zip.add_directory(name.as_str(), dir_options.clone())
                .map_err(archive_err)?;
            directories += 1;
        } else {
            zip.start_file(name.as_str(), file_options.clone())
                .map_err(archive_err)?;
            let mut source = File::open(entry.path()).map_err(|e| archive_err(e.into()))?;
            std::io::copy(&mut source, &mut zip).map_err(|e| archive_err(e.into()))?;
            files += 1;
            debug!(entry = %name, "Added to archive");
        }
    }

    let mut writer = zip.finish().map_err(archive_err)?;
    writer.flush().map_err(|e| archive_err(e.into()))?;
    let file = writer
        .into_inner()
        .map_err(|e| archive_err(e.into_error().into()))?;
    file.sync_all().map_err(|e| archive_err(e.into()))?;

    let size_bytes = std::fs::metadata(output)
        .map(|m| m.len())
        .map_err(|e| archive_err(e.into()))?;

    Ok(ArchiveSummary {
        path: output.to_path_buf(),
        files,
        directories,
        size_bytes,
    })
}

/// Staging-relative entry name with `/` separators
fn entry_name(root: &Path, path: &Path) -> String {
    let relative = path.strip_prefix(root).unwrap_or(path);
    relative
        .components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}
