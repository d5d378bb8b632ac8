use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::PathBuf;
use std::process::Stdio;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{Local, Utc};
use control_core::{config::JobConfig, Layout};
use control_ledger::RunStatus;
use tokio::process::Command;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::error::Result;
use crate::lock::RunLock;
use crate::types::RunOutcome;

/// Something that can be run once per schedule tick.
#[async_trait]
pub trait Workload: Send + Sync {
    /// Label used in logs and outcomes.
    fn name(&self) -> &str;

    /// Run to completion with stdout and stderr going to `log`.
    ///
    /// Returns the exit code, or `None` if the process died from a signal.
    async fn run(&self, log: File) -> std::io::Result<Option<i32>>;
}

/// Runs an external program, e.g. `python3 main.py`, from a fixed directory.
#[derive(Debug, Clone)]
pub struct CommandWorkload {
    name: String,
    program: String,
    args: Vec<String>,
    cwd: PathBuf,
}

impl CommandWorkload {
    pub fn new(
        name: impl Into<String>,
        program: impl Into<String>,
        args: Vec<String>,
        cwd: impl Into<PathBuf>,
    ) -> Self {
        Self {
            name: name.into(),
            program: program.into(),
            args,
            cwd: cwd.into(),
        }
    }

    /// The configured job, run from the environment root.
    pub fn from_config(job: &JobConfig, layout: &Layout) -> Self {
        Self::new(&job.name, &job.program, job.args.clone(), layout.root())
    }
}

#[async_trait]
impl Workload for CommandWorkload {
    fn name(&self) -> &str {
        &self.name
    }

    async fn run(&self, log: File) -> std::io::Result<Option<i32>> {
        let status = Command::new(&self.program)
            .args(&self.args)
            .current_dir(&self.cwd)
            .stdin(Stdio::null())
            .stdout(Stdio::from(log.try_clone()?))
            .stderr(Stdio::from(log))
            .status()
            .await?;
        Ok(status.code())
    }
}

/// Executes one run of a workload: directories, lock, log file, outcome.
pub struct JobRunner {
    layout: Layout,
    workload: Arc<dyn Workload>,
}

impl JobRunner {
    pub fn new(layout: Layout, workload: Arc<dyn Workload>) -> Self {
        Self { layout, workload }
    }

    pub fn layout(&self) -> &Layout {
        &self.layout
    }

    /// Run the workload now.
    ///
    /// Fails with `AlreadyRunning` if another run holds the lock. A workload
    /// that cannot even be started is reported as a `failed` outcome, with
    /// the reason appended to the run log.
    pub async fn run_once(&self) -> Result<RunOutcome> {
        self.layout.ensure_dirs()?;
        let mut lock = RunLock::open(&self.layout.lock_file())?;
        let _guard = lock.try_acquire()?;

        let run_id = Uuid::now_v7().to_string();
        let started_at = Utc::now().to_rfc3339();
        let log_path = self.layout.log_file_for(&Local::now());
        let log = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&log_path)?;

        let job = self.workload.name().to_string();
        info!(%run_id, %job, log = %log_path.display(), "run started");

        let exit_code = match self.workload.run(log.try_clone()?).await {
            Ok(code) => code,
            Err(e) => {
                error!(%run_id, %job, "workload failed to start: {e}");
                if let Err(write_err) = writeln!(&log, "control: failed to start {job}: {e}") {
                    warn!(%run_id, "could not write to run log: {write_err}");
                }
                None
            }
        };

        let status = if exit_code == Some(0) {
            RunStatus::Completed
        } else {
            RunStatus::Failed
        };
        let finished_at = Utc::now().to_rfc3339();

        match status {
            RunStatus::Completed => info!(%run_id, %job, "run completed"),
            _ => warn!(%run_id, %job, ?exit_code, "run failed"),
        }

        Ok(RunOutcome {
            run_id,
            job,
            started_at,
            finished_at,
            exit_code,
            log_path,
            status,
        })
    }
}
