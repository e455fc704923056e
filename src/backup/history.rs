use anyhow::{Context, Result};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};

use super::engine::RunReport;
use super::promoter;
use super::purger;

/// Append one finished run to the JSONL history log
pub fn append(path: &Path, report: &RunReport) -> Result<()> {
    if let Some(dir) = path.parent() {
        std::fs::create_dir_all(dir)
            .with_context(|| format!("Failed to create history dir: {}", dir.display()))?;
    }

    let line = serde_json::to_string(report).context("Failed to serialize run report")?;

    let mut file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .with_context(|| format!("Failed to open history: {}", path.display()))?;
    writeln!(file, "{}", line)
        .with_context(|| format!("Failed to write history: {}", path.display()))?;

    Ok(())
}

/// Most recent runs first. Lines that fail to parse are skipped.
pub fn read_recent(path: &Path, limit: usize) -> Result<Vec<RunReport>> {
    if !path.exists() {
        return Ok(Vec::new());
    }

    let file = std::fs::File::open(path)
        .with_context(|| format!("Failed to open history: {}", path.display()))?;

    let mut runs: Vec<RunReport> = BufReader::new(file)
        .lines()
        .map_while(|l| l.ok())
        .filter_map(|l| serde_json::from_str(&l).ok())
        .collect();

    runs.reverse();
    runs.truncate(limit);
    Ok(runs)
}

/// An entry currently in the destination store
#[derive(Debug, Clone, serde::Serialize)]
pub struct StoredArchive {
    pub path: PathBuf,
    pub size_bytes: u64,
    pub age_days: u64,
    /// Leftover from an interrupted cross-filesystem promotion
    pub partial: bool,
}

/// List the destination store, newest first
pub fn list_store(destination: &Path) -> Result<Vec<StoredArchive>> {
    if !destination.exists() {
        return Ok(Vec::new());
    }

    let now = std::time::SystemTime::now();
    let mut archives = Vec::new();

    for entry in std::fs::read_dir(destination)
        .with_context(|| format!("Failed to read destination: {}", destination.display()))?
    {
        let entry = entry?;
        let path = entry.path();
        let metadata = entry.metadata()?;
        let age_days = metadata
            .modified()
            .map(|m| purger::age_in_days(m, now))
            .unwrap_or(0);
        let size_bytes = if metadata.is_dir() {
            purger::dir_size(&path)
        } else {
            metadata.len()
        };

        archives.push(StoredArchive {
            partial: promoter::is_partial(&path),
            path,
            size_bytes,
            age_days,
        });
    }

    archives.sort_by(|a, b| a.age_days.cmp(&b.age_days).then(b.path.cmp(&a.path)));
    Ok(archives)
}
