use std::fmt::Display;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, TimeZone, Utc};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use crate::error::Result;
use crate::runner::JobRunner;
use crate::schedule::compute_next_run;
use crate::types::{RunOutcome, Schedule};

/// Longest single sleep; the clock is re-read after each wake so wall-clock
/// jumps and DST changes are picked up.
const MAX_SLEEP: Duration = Duration::from_secs(30);

/// In-process replacement for the cron entry: fires the runner on schedule,
/// at most one run at a time.
pub struct SchedulerEngine<Tz: TimeZone> {
    schedule: Schedule,
    tz: Tz,
    runner: Arc<JobRunner>,
    /// If set, every outcome is sent here.
    outcome_tx: Option<mpsc::Sender<RunOutcome>>,
    in_flight: Arc<AtomicBool>,
    current: Option<JoinHandle<()>>,
}

impl<Tz> SchedulerEngine<Tz>
where
    Tz: TimeZone + Send + Sync + 'static,
    Tz::Offset: Display + Send + Sync,
{
    /// Create an engine that evaluates `schedule` in `tz`.
    ///
    /// Pass `Some(tx)` to receive a copy of every [`RunOutcome`]. The sender
    /// is non-blocking (`try_send`) so a slow consumer never delays a run.
    pub fn new(
        schedule: Schedule,
        tz: Tz,
        runner: Arc<JobRunner>,
        outcome_tx: Option<mpsc::Sender<RunOutcome>>,
    ) -> Self {
        Self {
            schedule,
            tz,
            runner,
            outcome_tx,
            in_flight: Arc::new(AtomicBool::new(false)),
            current: None,
        }
    }

    fn now(&self) -> DateTime<Tz> {
        Utc::now().with_timezone(&self.tz)
    }

    /// Main loop. Runs until `shutdown` broadcasts `true` or the schedule has
    /// no further occurrences, then waits for an in-flight run to finish.
    ///
    /// Only an invalid schedule is an error; failed runs are logged and the
    /// loop carries on.
    pub async fn run(mut self, mut shutdown: watch::Receiver<bool>) -> Result<()> {
        info!(schedule = %self.schedule, "scheduler engine started");

        'schedule: loop {
            let Some(next) = compute_next_run(&self.schedule, &self.now())? else {
                info!("schedule has no further runs");
                break;
            };
            info!(next_run = %next, "next run scheduled");

            loop {
                let now = self.now();
                if now >= next {
                    self.fire();
                    break;
                }
                let wait = (next.clone() - now)
                    .to_std()
                    .unwrap_or(Duration::ZERO)
                    .min(MAX_SLEEP);

                tokio::select! {
                    _ = tokio::time::sleep(wait) => {}
                    changed = shutdown.changed() => {
                        if changed.is_err() || *shutdown.borrow() {
                            info!("scheduler engine shutting down");
                            break 'schedule;
                        }
                    }
                }
            }
        }

        if let Some(current) = self.current.take() {
            if !current.is_finished() {
                info!("waiting for in-flight run to finish");
            }
            if let Err(e) = current.await {
                error!("run task panicked: {e}");
            }
        }
        Ok(())
    }

    /// Start a run unless one is still going.
    fn fire(&mut self) {
        if self.in_flight.swap(true, Ordering::SeqCst) {
            warn!("previous run still in progress, skipping this slot");
            return;
        }

        let runner = Arc::clone(&self.runner);
        let in_flight = Arc::clone(&self.in_flight);
        let outcome_tx = self.outcome_tx.clone();
        self.current = Some(tokio::spawn(async move {
            match runner.run_once().await {
                Ok(outcome) => {
                    if let Some(tx) = outcome_tx {
                        if tx.try_send(outcome).is_err() {
                            warn!("outcome channel full or closed, outcome dropped");
                        }
                    }
                }
                Err(e) => error!("scheduled run did not start: {e}"),
            }
            in_flight.store(false, Ordering::SeqCst);
        }));
    }
}
