use anyhow::{Context, Result};
use std::path::Path;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::prelude::*;
use tracing_subscriber::{fmt, EnvFilter};

/// Default filter directive for a verbosity setting
pub fn default_directive(verbose: bool, quiet: bool) -> &'static str {
    if verbose {
        "backsnap=debug"
    } else if quiet {
        "backsnap=warn"
    } else {
        "backsnap=info"
    }
}

/// Install the global subscriber: stderr always, plus a daily rolling file
/// under `log_dir` when given. `RUST_LOG` overrides the default filter.
///
/// The returned guard flushes the file writer and must be held until exit.
pub fn init(verbose: bool, quiet: bool, log_dir: Option<&Path>) -> Result<Option<WorkerGuard>> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_directive(verbose, quiet)));

    let stderr_layer = fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(false);

    match log_dir {
        Some(dir) => {
            std::fs::create_dir_all(dir)
                .with_context(|| format!("Failed to create log dir: {}", dir.display()))?;
            let appender = tracing_appender::rolling::daily(dir, "backsnap.log");
            let (writer, guard) = tracing_appender::non_blocking(appender);
            tracing_subscriber::registry()
                .with(filter)
                .with(stderr_layer)
                .with(fmt::layer().with_ansi(false).with_writer(writer))
                .try_init()
                .context("Failed to install logger")?;
            Ok(Some(guard))
        }
        None => {
            tracing_subscriber::registry()
                .with(filter)
                .with(stderr_layer)
                .try_init()
                .context("Failed to install logger")?;
            Ok(None)
        }
    }
}
