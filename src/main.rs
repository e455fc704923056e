use anyhow::Result;
use clap::Parser;
use colored::Colorize;

use backsnap::backup::{self, history, BackupEngine};
use backsnap::cli::args::{Cli, Commands, ConfigAction, OutputFormat};
use backsnap::cli::output;
use backsnap::common::config::BackupConfig;
use backsnap::common::logging;
use backsnap::scheduler;

fn main() -> Result<()> {
    let cli = Cli::parse();

    if cli.no_color {
        colored::control::set_override(false);
    }

    // The daemon always keeps a file log; one-shot commands only on request
    let log_dir = match (&cli.log_dir, &cli.command) {
        (Some(dir), _) => Some(dir.clone()),
        (None, Commands::Daemon) => Some(BackupConfig::logs_dir()),
        (None, _) => None,
    };
    let _log_guard = logging::init(cli.verbose, cli.quiet, log_dir.as_deref())?;

    match cli.command {
        Commands::Run => cmd_run(&cli),
        Commands::Daemon => cmd_daemon(&cli),
        Commands::Prune { days, dry_run } => cmd_prune(&cli, days, dry_run),
        Commands::Status { limit } => cmd_status(&cli, limit),
        Commands::Config { ref action } => cmd_config(&cli, action),

        Commands::Completions { ref shell } => {
            use clap::CommandFactory;
            let mut cmd = Cli::command();
            let shell = match shell {
                backsnap::cli::args::CompletionShell::Bash => clap_complete::Shell::Bash,
                backsnap::cli::args::CompletionShell::Zsh => clap_complete::Shell::Zsh,
                backsnap::cli::args::CompletionShell::Fish => clap_complete::Shell::Fish,
            };
            clap_complete::generate(shell, &mut cmd, "backsnap", &mut std::io::stdout());
            Ok(())
        }
    }
}

fn load_config(cli: &Cli) -> Result<BackupConfig> {
    BackupConfig::load(&cli.config, cli.temp_path.as_deref())
}

// ─── Run ──────────────────────────────────────────────────────────────────────

fn cmd_run(cli: &Cli) -> Result<()> {
    let config = load_config(cli)?;
    let show_progress = !cli.quiet && cli.format == OutputFormat::Human;

    let report = BackupEngine::new(&config).with_progress(show_progress).run();
    print_report(cli, &report)?;

    if !report.succeeded() {
        anyhow::bail!("Backup run {} did not complete", report.run_id);
    }
    Ok(())
}

fn print_report(cli: &Cli, report: &backup::RunReport) -> Result<()> {
    match cli.format {
        OutputFormat::Json => output::print_json(report),
        OutputFormat::Human if cli.quiet => Ok(()),
        OutputFormat::Human => {
            output::print_run_report(report);
            Ok(())
        }
    }
}

// ─── Daemon ───────────────────────────────────────────────────────────────────

fn cmd_daemon(cli: &Cli) -> Result<()> {
    let config = load_config(cli)?;

    if !cli.quiet && cli.format == OutputFormat::Human {
        println!(
            "  {} Backing up on schedule {}",
            "⏰",
            config.schedule.cyan()
        );
    }

    scheduler::run_daemon(&config, false, |report| {
        if let Err(e) = print_report(cli, report) {
            tracing::warn!(error = %e, "Failed to print run report");
        }
    })
}

// ─── Prune ────────────────────────────────────────────────────────────────────

fn cmd_prune(cli: &Cli, days: Option<u32>, dry_run: bool) -> Result<()> {
    let config = load_config(cli)?;
    let max_age_days = days.unwrap_or(config.retention_days);

    let report = backup::prune(&config.destination_path, max_age_days, dry_run)?;

    match cli.format {
        OutputFormat::Json => output::print_json(&report)?,
        OutputFormat::Human if cli.quiet => {}
        OutputFormat::Human => output::print_prune_report(&report),
    }
    Ok(())
}

// ─── Status ───────────────────────────────────────────────────────────────────

fn cmd_status(cli: &Cli, limit: usize) -> Result<()> {
    let config = load_config(cli)?;
    let runs = history::read_recent(&config.history_path(), limit)?;
    let store = history::list_store(&config.destination_path)?;

    match cli.format {
        OutputFormat::Json => output::print_json(&serde_json::json!({
            "runs": runs,
            "store": store,
        })),
        OutputFormat::Human => {
            output::print_status(&runs, &store, &config);
            Ok(())
        }
    }
}

// ─── Config ───────────────────────────────────────────────────────────────────

fn cmd_config(cli: &Cli, action: &ConfigAction) -> Result<()> {
    let config = load_config(cli)?;

    match action {
        ConfigAction::Show => match cli.format {
            OutputFormat::Json => output::print_json(&config.redacted())?,
            OutputFormat::Human => print!("{}", config.redacted().to_yaml()?),
        },
        ConfigAction::Check => {
            let schedule = scheduler::parse_schedule(&config.schedule)?;
            let next = scheduler::next_fire(&schedule, &chrono::Local::now());
            println!(
                "  {} {} is valid ({} targets)",
                "✓".green(),
                cli.config.display(),
                config.paths.len()
            );
            for target in &config.paths {
                if !target.path.exists() {
                    println!(
                        "  {} {} does not exist and will be skipped",
                        "⚠".yellow(),
                        target.path.display()
                    );
                }
            }
            if let Some(next) = next {
                println!("  Next run: {}", next.format("%Y-%m-%d %H:%M:%S").to_string().cyan());
            }
        }
    }
    Ok(())
}
