use chrono::{DateTime, Local};
use indicatif::{ProgressBar, ProgressStyle};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{error, info, warn};

use super::archiver::{self, ARCHIVE_EXTENSION};
use super::history;
use super::lock::RunLock;
use super::promoter;
use super::purger::{self, PruneReport};
use super::staging::{self, ScratchDir};
use crate::common::config::{BackupConfig, BackupTarget, Depth};
use crate::common::errors::{BackupError, BackupResult};
use crate::common::format;
use crate::scanner::walker;

/// Format of run identifiers, second resolution in local time
pub const RUN_ID_FORMAT: &str = "%Y%m%d%H%M%S";

/// Pipeline stage a run reached
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Start,
    Staging,
    Archiving,
    Promoting,
    Pruning,
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Stage::Start => write!(f, "start"),
            Stage::Staging => write!(f, "staging"),
            Stage::Archiving => write!(f, "archiving"),
            Stage::Promoting => write!(f, "promoting"),
            Stage::Pruning => write!(f, "pruning"),
        }
    }
}

/// How a run ended
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum RunOutcome {
    /// Archive promoted and retention applied
    Succeeded,
    /// Archive built but never reached the destination store
    Incomplete { stage: Stage, error: String },
    /// Aborted before an archive existed; nothing was promoted or pruned
    Failed { stage: Stage, error: String },
    /// Another run held the lock
    Skipped { reason: String },
}

/// Per-target staging counts
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TargetReport {
    pub path: PathBuf,
    pub depth: Depth,
    pub missing: bool,
    pub files_staged: usize,
    pub files_skipped: usize,
    pub bytes_staged: u64,
}

/// Everything one invocation did, for logging, history and CLI output
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunReport {
    pub run_id: String,
    pub started_at: DateTime<Local>,
    pub finished_at: DateTime<Local>,
    pub outcome: RunOutcome,
    pub targets: Vec<TargetReport>,
    pub files_staged: usize,
    pub bytes_staged: u64,
    /// Promoted archive in the destination store
    pub archive: Option<PathBuf>,
    pub archive_bytes: u64,
    pub prune: Option<PruneReport>,
}

impl RunReport {
    fn new(run_id: String, started_at: DateTime<Local>) -> Self {
        Self {
            run_id,
            started_at,
            finished_at: started_at,
            outcome: RunOutcome::Succeeded,
            targets: Vec::new(),
            files_staged: 0,
            bytes_staged: 0,
            archive: None,
            archive_bytes: 0,
            prune: None,
        }
    }

    pub fn succeeded(&self) -> bool {
        self.outcome == RunOutcome::Succeeded
    }

    pub fn duration_secs(&self) -> f64 {
        (self.finished_at - self.started_at)
            .to_std()
            .map(|d| d.as_secs_f64())
            .unwrap_or(0.0)
    }
}

pub fn run_id_for(time: &DateTime<Local>) -> String {
    time.format(RUN_ID_FORMAT).to_string()
}

pub fn archive_file_name(run_id: &str) -> String {
    format!("{}.{}", run_id, ARCHIVE_EXTENSION)
}

/// Run one backup with `config`. Never panics and never returns an error:
/// every outcome is logged and described by the returned report.
pub fn run_backup(config: &BackupConfig) -> RunReport {
    BackupEngine::new(config).run()
}

type PromoteFn = fn(&Path, &Path) -> BackupResult<PathBuf>;

/// Sequences staging, archiving, promotion and pruning for one run
pub struct BackupEngine<'a> {
    config: &'a BackupConfig,
    show_progress: bool,
    promote: PromoteFn,
}

impl<'a> BackupEngine<'a> {
    pub fn new(config: &'a BackupConfig) -> Self {
        Self {
            config,
            show_progress: false,
            promote: promoter::promote,
        }
    }

    #[cfg(test)]
    fn with_promoter(mut self, promote: PromoteFn) -> Self {
        self.promote = promote;
        self
    }

    pub fn with_progress(mut self, show_progress: bool) -> Self {
        self.show_progress = show_progress;
        self
    }

    pub fn run(&self) -> RunReport {
        self.run_at(Local::now())
    }

    /// Run with an explicit start time (which fixes the run identifier)
    pub fn run_at(&self, started_at: DateTime<Local>) -> RunReport {
        let mut report = RunReport::new(run_id_for(&started_at), started_at);
        info!(run_id = %report.run_id, "Starting backup run");

        let outcome = match RunLock::acquire(&self.config.lock_path()) {
            Ok(_lock) => self.execute(&mut report),
            Err(e @ BackupError::AlreadyRunning { .. }) => {
                warn!(error = %e, "Backup already running, skipping this trigger");
                RunOutcome::Skipped {
                    reason: e.to_string(),
                }
            }
            Err(e) => failed(Stage::Start, e),
        };

        report.outcome = outcome;
        report.finished_at = Local::now();

        if report.succeeded() {
            info!(
                run_id = %report.run_id,
                files = report.files_staged,
                archive = ?report.archive,
                "Backup run finished"
            );
        }

        if let Err(e) = history::append(&self.config.history_path(), &report) {
            warn!(error = %e, "Failed to record run history");
        }

        report
    }

    fn execute(&self, report: &mut RunReport) -> RunOutcome {
        let config = self.config;

        // Start
        let run_dir = match self.start(&report.run_id) {
            Ok(dir) => dir,
            Err(e) => return failed(Stage::Start, e),
        };
        let staging_dir = match ScratchDir::create(run_dir.path().join("files")) {
            Ok(dir) => dir,
            Err(e) => return failed(Stage::Start, e),
        };

        // Staging; on error both scratch directories are dropped and removed
        if let Err(e) = self.stage_targets(staging_dir.path(), report) {
            return failed(Stage::Staging, e);
        }

        // Archiving
        let working_archive = run_dir.path().join(archive_file_name(&report.run_id));
        let summary = match archiver::compress(
            staging_dir,
            &working_archive,
            config.password.as_deref(),
        ) {
            Ok(summary) => summary,
            Err(e) => return failed(Stage::Archiving, e),
        };
        report.archive_bytes = summary.size_bytes;

        // Promoting
        let promoted = (self.promote)(&working_archive, &config.destination_path);
        if let Err(e) = run_dir.remove() {
            warn!(error = %e, "Failed to remove run directory");
        }
        match promoted {
            Ok(path) => report.archive = Some(path),
            Err(e) => {
                error!(error = %e, "Archive promotion failed");
                return RunOutcome::Incomplete {
                    stage: Stage::Promoting,
                    error: e.to_string(),
                };
            }
        }

        // Pruning
        let prune = match purger::prune(&config.destination_path, config.retention_days, false) {
            Ok(prune) => prune,
            Err(e) => {
                warn!(stage = %Stage::Pruning, error = %e, "Retention pass failed");
                PruneReport {
                    max_age_days: config.retention_days,
                    errors: vec![e.to_string()],
                    ..Default::default()
                }
            }
        };
        for e in &prune.errors {
            warn!(error = %e, "Prune error");
        }
        report.prune = Some(prune);

        RunOutcome::Succeeded
    }

    /// Make sure the destination exists and claim a fresh run directory
    fn start(&self, run_id: &str) -> BackupResult<ScratchDir> {
        let destination = &self.config.destination_path;
        std::fs::create_dir_all(destination).map_err(|e| BackupError::io(destination, e))?;
        // Safe under the run lock: no other promotion can be in flight
        promoter::clear_partials(destination)?;

        let final_archive = destination.join(archive_file_name(run_id));
        let run_path = self.config.work_area().join(run_id);
        for taken in [&final_archive, &run_path] {
            if taken.exists() {
                return Err(BackupError::RunCollision {
                    run_id: run_id.to_string(),
                    path: taken.clone(),
                });
            }
        }

        info!(path = %run_path.display(), "Creating backup");
        ScratchDir::create(run_path)
    }

    fn stage_targets(&self, staging_root: &Path, report: &mut RunReport) -> BackupResult<()> {
        let pb = if self.show_progress {
            let pb = ProgressBar::new_spinner();
            pb.set_style(
                ProgressStyle::default_spinner()
                    .template("{spinner:.cyan} {pos} files staged {msg}")
                    .unwrap_or_else(|_| ProgressStyle::default_spinner()),
            );
            Some(pb)
        } else {
            None
        };

        for target in &self.config.paths {
            let target_report = self.stage_target(target, staging_root, pb.as_ref())?;
            report.files_staged += target_report.files_staged;
            report.bytes_staged += target_report.bytes_staged;
            report.targets.push(target_report);
        }

        if let Some(ref pb) = pb {
            pb.finish_and_clear();
        }

        Ok(())
    }

    fn stage_target(
        &self,
        target: &BackupTarget,
        staging_root: &Path,
        pb: Option<&ProgressBar>,
    ) -> BackupResult<TargetReport> {
        let mut target_report = TargetReport {
            path: target.path.clone(),
            depth: target.recursion_depth,
            missing: false,
            files_staged: 0,
            files_skipped: 0,
            bytes_staged: 0,
        };

        info!(path = %target.path.display(), depth = %target.recursion_depth, "Running backup for path");

        if !target.path.exists() {
            let missing = BackupError::MissingSourcePath {
                path: target.path.clone(),
            };
            warn!("{}", missing);
            target_report.missing = true;
            return Ok(target_report);
        }

        let matcher = target.matcher()?;
        let root = &self.config.root_path;
        let mut bytes = 0u64;

        let stats = walker::walk(&target.path, target.recursion_depth, &matcher, |file| {
            let entry = staging::stage(file, root, staging_root)?;
            bytes += entry.size_bytes;
            if let Some(pb) = pb {
                pb.set_message(format::truncate_left(&format::format_path(&entry.source), 40));
                pb.inc(1);
            }
            Ok(())
        })?;

        target_report.files_staged = stats.visited;
        target_report.files_skipped = stats.skipped;
        target_report.bytes_staged = bytes;
        Ok(target_report)
    }
}

fn failed(stage: Stage, e: BackupError) -> RunOutcome {
    error!(%stage, error = %e, "Backup run failed");
    RunOutcome::Failed {
        stage,
        error: e.to_string(),
    }
}
