use std::process::ExitCode;

use clap::{Parser, Subcommand};
use control_core::{ControlConfig, ControlError};
use control_scheduler::SchedulerError;

mod commands;

const LONG_VERSION: &str = concat!(env!("CARGO_PKG_VERSION"), " (", env!("CONTROL_GIT_SHA"), ")");

#[derive(Parser)]
#[command(name = "control")]
#[command(version, long_version = LONG_VERSION)]
#[command(about = "Provision and operate a scheduled job with a SQLite status ledger", long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Config file (default: $CONTROL_CONFIG or ./control.toml)
    #[arg(short, long, global = true)]
    config: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create control.db, logs/ and data/, and print the cron entry
    Init {
        /// Also register the cron entry in the user's crontab
        #[arg(long)]
        install_cron: bool,
    },

    /// Append a status for an entity
    Record {
        /// Entity id
        id: String,

        /// Status label, e.g. processing, completed, failed
        status: String,

        /// Timestamp (default: now, RFC 3339 UTC)
        #[arg(long)]
        at: Option<String>,
    },

    /// Print the latest status of an entity
    Latest {
        /// Entity id
        id: String,
    },

    /// Print an entity's status history, oldest first
    History {
        /// Entity id
        id: String,

        /// Output in JSON format
        #[arg(short, long)]
        json: bool,
    },

    /// List tracked entities with their latest status
    Ids,

    /// Run the workload once, now
    Run,

    /// Run the workload on its schedule until interrupted
    Serve {
        /// Ignore the configured schedule and run every N seconds
        #[arg(long)]
        every: Option<u64>,
    },

    /// Print the cron entry without installing it
    CronLine,
}

#[tokio::main]
async fn main() -> ExitCode {
    // Logs go to stderr: under cron they land in the run log, and stdout
    // stays clean for command output.
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "control=info,control_core=info,control_ledger=info,control_scheduler=info".into()
            }),
        )
        .init();

    match run(Cli::parse()).await {
        Ok(code) => code,
        Err(e) => {
            match error_code(&e) {
                Some(code) => eprintln!("error[{code}]: {e:#}"),
                None => eprintln!("error: {e:#}"),
            }
            ExitCode::FAILURE
        }
    }
}

/// The `ControlError` code behind a failure, if one is in its chain.
fn error_code(err: &anyhow::Error) -> Option<&'static str> {
    err.chain().find_map(|cause| {
        if let Some(e) = cause.downcast_ref::<ControlError>() {
            return Some(e.code());
        }
        match cause.downcast_ref::<SchedulerError>() {
            Some(SchedulerError::Control(e)) => Some(e.code()),
            _ => None,
        }
    })
}

async fn run(cli: Cli) -> anyhow::Result<ExitCode> {
    let config = ControlConfig::load(cli.config.as_deref())?;
    let mut out = std::io::stdout().lock();

    match cli.command {
        Commands::Init { install_cron } => commands::init(&config, install_cron, &mut out).await?,
        Commands::Record { id, status, at } => {
            commands::record(&config, &id, &status, at.as_deref(), &mut out)?
        }
        Commands::Latest { id } => commands::latest(&config, &id, &mut out)?,
        Commands::History { id, json } => commands::history(&config, &id, json, &mut out)?,
        Commands::Ids => commands::ids(&config, &mut out)?,
        Commands::Run => {
            let outcome = commands::run(&config, &mut out).await?;
            if !outcome.succeeded() {
                return Ok(ExitCode::FAILURE);
            }
        }
        Commands::Serve { every } => commands::serve(&config, every).await?,
        Commands::CronLine => commands::cron_line(&config, &mut out)?,
    }
    Ok(ExitCode::SUCCESS)
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Context;

    #[test]
    fn config_failures_carry_their_code() {
        let err = anyhow::Error::new(ControlError::Config("bad toml".to_string()));
        assert_eq!(error_code(&err), Some("CONFIG_ERROR"));

        let err = Err::<(), _>(ControlError::Timezone("Mars/Olympus".to_string()))
            .context("loading schedule")
            .unwrap_err();
        assert_eq!(error_code(&err), Some("TIMEZONE_ERROR"));
    }

    #[test]
    fn codes_are_found_through_scheduler_errors() {
        let io = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "logs/");
        let err = anyhow::Error::new(SchedulerError::Control(ControlError::Io(io)));
        assert_eq!(error_code(&err), Some("IO_ERROR"));
    }

    #[test]
    fn other_failures_have_no_code() {
        let err = anyhow::Error::new(SchedulerError::InvalidSchedule("x".to_string()));
        assert_eq!(error_code(&err), None);
        assert_eq!(error_code(&anyhow::anyhow!("plain")), None);
    }
}
