use std::io::Write;
use std::sync::Arc;

use anyhow::Context;
use chrono::{Local, SecondsFormat, TimeZone, Utc};
use control_core::{ControlConfig, Layout};
use control_ledger::ControlLedger;
use control_scheduler::{
    crontab, schedule::compute_next_run, CommandWorkload, JobRunner, RunOutcome, Schedule,
    SchedulerEngine,
};
use tokio::sync::watch;
use tracing::info;

fn open_ledger(layout: &Layout) -> anyhow::Result<ControlLedger> {
    ControlLedger::open(layout.database())
        .with_context(|| format!("opening {}", layout.database().display()))
}

fn cron_entry(config: &ControlConfig, layout: &Layout) -> String {
    crontab::cron_line(
        &config.schedule.expression,
        layout.root(),
        &config.job.program,
        &config.job.args,
        layout.logs_dir(),
    )
}

/// Provision the environment. Stops at the first failure.
pub async fn init(
    config: &ControlConfig,
    install_cron: bool,
    out: &mut impl Write,
) -> anyhow::Result<()> {
    let layout = Layout::from_config(&config.paths);

    // Reject a bad schedule before touching the host's crontab.
    let schedule = Schedule::from_expression(&config.schedule.expression);
    compute_next_run(&schedule, &Local::now())
        .with_context(|| format!("schedule '{}'", config.schedule.expression))?;

    open_ledger(&layout)?;
    layout.ensure_dirs().context("creating directories")?;
    info!(root = %layout.root().display(), "environment provisioned");

    let line = cron_entry(config, &layout);
    writeln!(out, "{line}")?;
    if install_cron {
        let added = crontab::install(&line).await.context("installing cron entry")?;
        if added {
            writeln!(out, "cron entry installed")?;
        } else {
            writeln!(out, "cron entry already installed")?;
        }
    }
    Ok(())
}

pub fn record(
    config: &ControlConfig,
    id: &str,
    status: &str,
    at: Option<&str>,
    out: &mut impl Write,
) -> anyhow::Result<()> {
    let ledger = open_ledger(&Layout::from_config(&config.paths))?;
    let last_modified = at
        .map(str::to_string)
        .unwrap_or_else(|| Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true));
    ledger.record_status(id, status, &last_modified)?;
    writeln!(out, "{id}\t{status}\t{last_modified}")?;
    Ok(())
}

pub fn latest(config: &ControlConfig, id: &str, out: &mut impl Write) -> anyhow::Result<()> {
    let ledger = open_ledger(&Layout::from_config(&config.paths))?;
    writeln!(out, "{}", ledger.latest_status(id)?)?;
    Ok(())
}

pub fn history(
    config: &ControlConfig,
    id: &str,
    json: bool,
    out: &mut impl Write,
) -> anyhow::Result<()> {
    let ledger = open_ledger(&Layout::from_config(&config.paths))?;
    let history = ledger.history(id);
    if json {
        let entries = history.to_vec()?;
        writeln!(out, "{}", serde_json::to_string_pretty(&entries)?)?;
        return Ok(());
    }
    for entry in &history {
        let entry = entry?;
        writeln!(out, "{}\t{}", entry.last_modified, entry.status)?;
    }
    Ok(())
}

pub fn ids(config: &ControlConfig, out: &mut impl Write) -> anyhow::Result<()> {
    let ledger = open_ledger(&Layout::from_config(&config.paths))?;
    for record in ledger.tracked_ids()? {
        writeln!(out, "{}\t{}\t{}", record.id, record.status, record.last_modified)?;
    }
    Ok(())
}

fn runner(config: &ControlConfig) -> JobRunner {
    let layout = Layout::from_config(&config.paths);
    let workload = CommandWorkload::from_config(&config.job, &layout);
    JobRunner::new(layout, Arc::new(workload))
}

pub async fn run(config: &ControlConfig, out: &mut impl Write) -> anyhow::Result<RunOutcome> {
    let outcome = runner(config).run_once().await?;
    writeln!(
        out,
        "{}\t{}\t{}",
        outcome.run_id,
        outcome.status,
        outcome.log_path.display()
    )?;
    Ok(outcome)
}

/// Drive the workload from this process until Ctrl-C.
pub async fn serve(config: &ControlConfig, every: Option<u64>) -> anyhow::Result<()> {
    let schedule = match every {
        Some(every_secs) => Schedule::Interval { every_secs },
        None => Schedule::from_expression(&config.schedule.expression),
    };
    let runner = Arc::new(runner(config));
    match config.schedule.tz()? {
        Some(tz) => drive(SchedulerEngine::new(schedule, tz, runner, None)).await,
        None => drive(SchedulerEngine::new(schedule, Local, runner, None)).await,
    }
}

async fn drive<Tz>(engine: SchedulerEngine<Tz>) -> anyhow::Result<()>
where
    Tz: TimeZone + Send + Sync + 'static,
    Tz::Offset: std::fmt::Display + Send + Sync,
{
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("interrupt received");
            let _ = shutdown_tx.send(true);
        }
    });
    engine.run(shutdown_rx).await?;
    Ok(())
}

pub fn cron_line(config: &ControlConfig, out: &mut impl Write) -> anyhow::Result<()> {
    let layout = Layout::from_config(&config.paths);
    writeln!(out, "{}", cron_entry(config, &layout))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use control_core::config::PathsConfig;
    use control_ledger::LedgerError;

    fn config_in(root: &std::path::Path) -> ControlConfig {
        ControlConfig {
            paths: PathsConfig {
                root: root.to_string_lossy().into_owned(),
                ..PathsConfig::default()
            },
            ..ControlConfig::default()
        }
    }

    fn output(buf: Vec<u8>) -> String {
        String::from_utf8(buf).expect("utf8")
    }

    #[tokio::test]
    async fn init_provisions_and_is_repeatable() {
        let tmp = tempfile::tempdir().expect("tempdir");
        let config = config_in(tmp.path());

        let mut out = Vec::new();
        init(&config, false, &mut out).await.expect("first init");
        record(&config, "job1", "pending", Some("t1"), &mut Vec::new()).expect("record");
        init(&config, false, &mut Vec::new()).await.expect("second init");

        assert!(tmp.path().join("control.db").is_file());
        assert!(tmp.path().join("logs").is_dir());
        assert!(tmp.path().join("data").is_dir());
        assert!(output(out).starts_with("0 0 * * * cd "));

        let mut latest_out = Vec::new();
        latest(&config, "job1", &mut latest_out).expect("latest");
        assert_eq!(output(latest_out), "pending\n");
    }

    #[tokio::test]
    async fn init_rejects_bad_schedule_before_provisioning() {
        let tmp = tempfile::tempdir().expect("tempdir");
        let mut config = config_in(tmp.path());
        config.schedule.expression = "every day".to_string();

        assert!(init(&config, false, &mut Vec::new()).await.is_err());
        assert!(!tmp.path().join("control.db").exists());
    }

    #[tokio::test]
    async fn init_accepts_crontab_weekdays() {
        let tmp = tempfile::tempdir().expect("tempdir");
        let mut config = config_in(tmp.path());
        config.schedule.expression = "0 3 * * 0".to_string();

        let mut out = Vec::new();
        init(&config, false, &mut out).await.expect("sunday schedule");
        assert!(output(out).starts_with("0 3 * * 0 cd "));
    }

    #[test]
    fn history_prints_oldest_first() {
        let tmp = tempfile::tempdir().expect("tempdir");
        let config = config_in(tmp.path());
        record(&config, "job1", "done", Some("2024-01-02T00:00:00"), &mut Vec::new())
            .expect("done");
        record(&config, "job1", "pending", Some("2024-01-01T00:00:00"), &mut Vec::new())
            .expect("pending");

        let mut out = Vec::new();
        history(&config, "job1", false, &mut out).expect("history");
        assert_eq!(
            output(out),
            "2024-01-01T00:00:00\tpending\n2024-01-02T00:00:00\tdone\n"
        );
    }

    #[test]
    fn duplicate_record_is_an_error() {
        let tmp = tempfile::tempdir().expect("tempdir");
        let config = config_in(tmp.path());
        record(&config, "job1", "pending", Some("t1"), &mut Vec::new()).expect("first");

        let err = record(&config, "job1", "done", Some("t1"), &mut Vec::new()).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<LedgerError>(),
            Some(LedgerError::DuplicateKey { .. })
        ));
    }

    #[test]
    fn latest_of_unknown_id_fails() {
        let tmp = tempfile::tempdir().expect("tempdir");
        let config = config_in(tmp.path());
        let err = latest(&config, "nobody", &mut Vec::new()).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<LedgerError>(),
            Some(LedgerError::NotFound { .. })
        ));
    }

    #[test]
    fn ids_lists_each_entity_once() {
        let tmp = tempfile::tempdir().expect("tempdir");
        let config = config_in(tmp.path());
        record(&config, "a", "processing", Some("t1"), &mut Vec::new()).expect("a1");
        record(&config, "a", "completed", Some("t2"), &mut Vec::new()).expect("a2");
        record(&config, "b", "failed", Some("t1"), &mut Vec::new()).expect("b1");

        let mut out = Vec::new();
        ids(&config, &mut out).expect("ids");
        assert_eq!(output(out), "a\tcompleted\tt2\nb\tfailed\tt1\n");
    }

    #[test]
    fn default_timestamp_is_rfc3339_utc() {
        let tmp = tempfile::tempdir().expect("tempdir");
        let config = config_in(tmp.path());
        let mut out = Vec::new();
        record(&config, "job1", "pending", None, &mut out).expect("record");
        let line = output(out);
        let ts = line.trim_end().rsplit('\t').next().expect("timestamp");
        assert!(chrono::DateTime::parse_from_rfc3339(ts).is_ok());
        assert!(ts.ends_with('Z'));
    }
}
