//! `control-scheduler` — runs the external workload on a schedule.
//!
//! # Overview
//!
//! Two ways to drive the workload are supported:
//!
//! * **Host cron** — [`crontab::cron_line`] renders the entry and
//!   [`crontab::install`] registers it once, leaving scheduling to the OS.
//! * **In-process** — [`engine::SchedulerEngine`] sleeps until the next
//!   occurrence and launches a run through [`runner::JobRunner`].
//!
//! Either way the workload's output is appended to `logs/YYYYMMDDHHMM.log`.
//! Runs started through [`runner::JobRunner`] also hold the
//! [`lock::RunLock`] and end as `completed` or `failed`.
//!
//! # Schedule variants
//!
//! | Variant    | Behaviour                                  |
//! |------------|--------------------------------------------|
//! | `Daily`    | Fire at HH:MM every day, engine timezone   |
//! | `Interval` | Repeat every N seconds                     |
//! | `Cron`     | Five- or seven-field cron expression       |

pub mod crontab;
pub mod engine;
pub mod error;
pub mod lock;
pub mod runner;
pub mod schedule;
pub mod types;

pub use engine::SchedulerEngine;
pub use error::{Result, SchedulerError};
pub use runner::{CommandWorkload, JobRunner, Workload};
pub use types::{RunOutcome, Schedule};
