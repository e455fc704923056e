use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

/// backsnap — scheduled, filtered backups into dated zip archives
#[derive(Parser, Debug)]
#[command(
    name = "backsnap",
    version,
    about = "Scheduled, filtered backups into dated zip archives",
    long_about = "backsnap copies the files matched by your backup.yml into a dated zip\n\
                   archive, moves it into the destination store and prunes old archives.",
    after_help = "EXAMPLES:\n  \
        backsnap run                           Back up now\n  \
        backsnap --config /etc/backup.yml run  Use a specific config\n  \
        backsnap daemon                        Back up on the configured schedule\n  \
        backsnap prune --dry-run               Show which archives would be pruned\n  \
        backsnap status                        Show recent runs and stored archives\n  \
        backsnap config check                  Validate the config"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Path to the YAML config
    #[arg(
        long,
        short,
        global = true,
        env = "BACKUP_YAML_PATH",
        default_value = "./backup.yml",
        value_name = "PATH"
    )]
    pub config: PathBuf,

    /// Parent directory of the working area (overrides `temp_path`)
    #[arg(long, global = true, env = "TEMP_PATH", value_name = "PATH")]
    pub temp_path: Option<PathBuf>,

    /// Also write logs to a daily rolling file in this directory
    #[arg(long, global = true, value_name = "DIR")]
    pub log_dir: Option<PathBuf>,

    /// Output format
    #[arg(long, global = true, default_value = "human")]
    pub format: OutputFormat,

    /// Disable colored output
    #[arg(long, global = true)]
    pub no_color: bool,

    /// Verbose output
    #[arg(long, short, global = true)]
    pub verbose: bool,

    /// Quiet mode — minimal output
    #[arg(long, short, global = true)]
    pub quiet: bool,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run one backup now
    Run,

    /// Run one backup now, then on every tick of the configured schedule
    Daemon,

    /// Apply the retention window to the destination store
    Prune {
        /// Override `retention_days`
        #[arg(long, value_name = "N")]
        days: Option<u32>,

        /// Report what would be deleted without deleting
        #[arg(long)]
        dry_run: bool,
    },

    /// Show recent runs and the destination store
    Status {
        /// Number of runs to show
        #[arg(long, default_value = "10")]
        limit: usize,
    },

    /// Inspect the configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },

    /// Generate shell completions
    Completions {
        /// Shell to generate completions for
        shell: CompletionShell,
    },
}

#[derive(Subcommand, Debug)]
pub enum ConfigAction {
    /// Print the resolved config (password masked)
    Show,
    /// Validate the config and schedule
    Check,
}

#[derive(ValueEnum, Clone, Debug, PartialEq)]
pub enum OutputFormat {
    Human,
    Json,
}

#[derive(ValueEnum, Clone, Debug)]
pub enum CompletionShell {
    Bash,
    Zsh,
    Fish,
}
