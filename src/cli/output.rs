use anyhow::{Context, Result};
use colored::*;

use crate::backup::history::StoredArchive;
use crate::backup::{PruneReport, RunOutcome, RunReport};
use crate::common::config::BackupConfig;
use crate::common::format::{self, format_path, format_size};

/// Print a run report in human-readable format
pub fn print_run_report(report: &RunReport) {
    println!();
    println!("{}  backsnap run {}", "📦", report.run_id.bold());
    println!("{}", "─".repeat(60).dimmed());

    for target in &report.targets {
        if target.missing {
            println!(
                "  {} {} {}",
                "⚠".yellow(),
                format_path(&target.path),
                "(missing, skipped)".yellow()
            );
        } else {
            println!(
                "  {} {}  {}  {}",
                "●".green(),
                format_path(&target.path),
                format::format_count(target.files_staged).cyan(),
                format_size(target.bytes_staged).dimmed()
            );
        }
    }

    println!("{}", "─".repeat(60).dimmed());

    match &report.outcome {
        RunOutcome::Succeeded => {
            println!(
                "  {} Backed up {} ({}) in {}",
                "✓".green(),
                format::format_count(report.files_staged),
                format_size(report.bytes_staged),
                format::format_duration(report.duration_secs()).cyan()
            );
            if let Some(ref archive) = report.archive {
                println!(
                    "  {} {} ({})",
                    "→".dimmed(),
                    format_path(archive),
                    format_size(report.archive_bytes)
                );
            }
            if let Some(ref prune) = report.prune {
                print_prune_summary(prune);
            }
        }
        RunOutcome::Incomplete { stage, error } | RunOutcome::Failed { stage, error } => {
            println!("  {} Run failed while {}: {}", "✗".red(), stage, error.red());
        }
        RunOutcome::Skipped { reason } => {
            println!("  {} Skipped: {}", "⏭".yellow(), reason);
        }
    }
    println!();
}

fn print_prune_summary(prune: &PruneReport) {
    if !prune.pruned.is_empty() {
        println!(
            "  {} Pruned {} older than {} days, freed {}",
            "🔥",
            prune.pruned.len(),
            prune.max_age_days,
            format_size(prune.bytes_freed)
        );
    }
    for e in &prune.errors {
        println!("  {} {}", "⚠".yellow(), e.yellow());
    }
}

/// Print a standalone prune report
pub fn print_prune_report(report: &PruneReport) {
    println!();
    let verb = if report.dry_run { "Would prune" } else { "Pruned" };

    if report.pruned.is_empty() {
        println!(
            "  {} Nothing older than {} days ({} entries checked)",
            "✨",
            report.max_age_days,
            report.examined
        );
    } else {
        for entry in &report.pruned {
            println!(
                "  {} {}  {}  {}",
                "•".dimmed(),
                format_path(&entry.path),
                format::format_age_days(entry.age_days).yellow(),
                format_size(entry.size_bytes).dimmed()
            );
        }
        println!();
        println!(
            "  {} {} {} of {}, {}",
            "🔥",
            verb,
            report.pruned.len(),
            report.examined,
            format_size(report.bytes_freed)
        );
    }

    for e in &report.errors {
        println!("  {} {}", "⚠".yellow(), e.yellow());
    }
    println!();
}

/// Print recent runs and the destination store
pub fn print_status(runs: &[RunReport], store: &[StoredArchive], config: &BackupConfig) {
    format::print_header("Recent runs");

    if runs.is_empty() {
        println!("  {}", "No runs recorded yet.".dimmed());
    }
    for run in runs {
        let status = match &run.outcome {
            RunOutcome::Succeeded => "ok".green(),
            RunOutcome::Incomplete { .. } => "incomplete".yellow(),
            RunOutcome::Failed { .. } => "failed".red(),
            RunOutcome::Skipped { .. } => "skipped".dimmed(),
        };
        println!(
            "  {}  {:<10}  {}  {}",
            run.run_id,
            status,
            format::format_count(run.files_staged),
            format::format_duration(run.duration_secs()).dimmed()
        );
    }

    format::print_header(&format!(
        "Destination store ({})",
        format_path(&config.destination_path)
    ));

    if store.is_empty() {
        println!("  {}", "Empty.".dimmed());
    }
    for archive in store {
        let name = archive
            .path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default();
        let marker = if archive.partial {
            " (partial)".yellow()
        } else if archive.age_days > u64::from(config.retention_days) {
            " (expired)".red()
        } else {
            "".normal()
        };
        println!(
            "  {}  {}  {}{}",
            name,
            format_size(archive.size_bytes),
            format::format_age_days(archive.age_days).dimmed(),
            marker
        );
    }

    let total: u64 = store.iter().map(|a| a.size_bytes).sum();
    println!();
    format::print_kv("Total", &format_size(total));
    format::print_kv("Retention", &format!("{} days", config.retention_days));
    println!();
}

/// Print any serializable value as pretty JSON
pub fn print_json<T: serde::Serialize>(value: &T) -> Result<()> {
    let json = serde_json::to_string_pretty(value).context("Failed to serialize output")?;
    println!("{}", json);
    Ok(())
}
