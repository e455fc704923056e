use anyhow::{Context, Result};
use chrono::{DateTime, Local};
use cron::Schedule;
use std::str::FromStr;
use tracing::{info, warn};

use crate::backup::{BackupEngine, RunReport};
use crate::common::config::BackupConfig;

/// Accept classic 5-field crontab lines by prepending a seconds field.
/// 6- and 7-field expressions are passed through.
pub fn normalize_expression(expr: &str) -> String {
    let fields = expr.split_whitespace().count();
    if fields == 5 {
        format!("0 {}", expr.trim())
    } else {
        expr.trim().to_string()
    }
}

pub fn parse_schedule(expr: &str) -> Result<Schedule> {
    Schedule::from_str(&normalize_expression(expr))
        .with_context(|| format!("Invalid schedule expression: '{}'", expr))
}

/// First fire time strictly after `after`
pub fn next_fire(schedule: &Schedule, after: &DateTime<Local>) -> Option<DateTime<Local>> {
    schedule.after(after).next()
}

/// Run once now, then on every fire time of the configured schedule.
///
/// Runs execute one at a time on this thread. Fire times that pass while a
/// run is in progress are skipped; the next one is computed once the run
/// finishes. `on_run` sees every report. Returns only if the schedule has
/// no future fire times.
pub fn run_daemon<F>(config: &BackupConfig, show_progress: bool, mut on_run: F) -> Result<()>
where
    F: FnMut(&RunReport),
{
    let schedule = parse_schedule(&config.schedule)?;
    let engine = BackupEngine::new(config).with_progress(show_progress);

    info!(schedule = %config.schedule, "Backup daemon started");
    on_run(&engine.run());

    loop {
        let now = Local::now();
        let Some(next) = next_fire(&schedule, &now) else {
            warn!(schedule = %config.schedule, "Schedule has no upcoming fire times, stopping");
            return Ok(());
        };

        info!(next = %next.format("%Y-%m-%d %H:%M:%S"), "Next backup scheduled");
        if let Ok(wait) = (next - now).to_std() {
            std::thread::sleep(wait);
        }

        on_run(&engine.run());
    }
}
