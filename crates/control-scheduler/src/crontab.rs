//! Registration of the workload with the host's cron daemon.
//!
//! The entry runs the workload from the environment root and appends its
//! combined stdout/stderr to `logs/YYYYMMDDHHMM.log`, one file per run.

use std::path::Path;
use std::process::Stdio;

use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::{debug, info};

use crate::error::{Result, SchedulerError};

/// Render the crontab entry.
///
/// `%` is special to cron (it ends the command), so every `%` in the
/// command is escaped, wherever it comes from.
pub fn cron_line(
    expression: &str,
    root: &Path,
    program: &str,
    args: &[String],
    logs_dir: &Path,
) -> String {
    let mut command = shell_quote(program);
    for arg in args {
        command.push(' ');
        command.push_str(&shell_quote(arg));
    }
    let command = format!(
        "cd {} && {} >> {}/$(date +%Y%m%d%H%M).log 2>&1",
        shell_quote(&root.to_string_lossy()),
        command,
        shell_quote(&logs_dir.to_string_lossy()),
    );
    format!("{} {}", expression.trim(), command.replace('%', "\\%"))
}

/// Append `line` to an existing crontab.
///
/// Returns `None` when the exact entry is already present, so re-running
/// provisioning never registers the job twice.
pub fn merge_crontab(existing: &str, line: &str) -> Option<String> {
    let line = line.trim();
    if existing.lines().any(|l| l.trim() == line) {
        return None;
    }
    let mut merged = existing.to_string();
    if !merged.is_empty() && !merged.ends_with('\n') {
        merged.push('\n');
    }
    merged.push_str(line);
    merged.push('\n');
    Some(merged)
}

/// Install `line` into the current user's crontab.
///
/// Returns `false` if the entry was already registered.
pub async fn install(line: &str) -> Result<bool> {
    let current = read_crontab().await?;
    let Some(merged) = merge_crontab(&current, line) else {
        info!("cron entry already registered");
        return Ok(false);
    };

    let mut child = Command::new("crontab")
        .arg("-")
        .stdin(Stdio::piped())
        .stdout(Stdio::null())
        .stderr(Stdio::piped())
        .spawn()
        .map_err(|e| SchedulerError::Crontab(format!("cannot run crontab: {e}")))?;

    if let Some(mut stdin) = child.stdin.take() {
        stdin.write_all(merged.as_bytes()).await?;
        stdin.shutdown().await?;
    }

    let output = child.wait_with_output().await?;
    if !output.status.success() {
        return Err(SchedulerError::Crontab(format!(
            "crontab - exited with {}: {}",
            output.status,
            String::from_utf8_lossy(&output.stderr).trim()
        )));
    }
    info!(entry = %line, "cron entry registered");
    Ok(true)
}

/// Current crontab, or empty when the user has none yet.
async fn read_crontab() -> Result<String> {
    let output = Command::new("crontab")
        .arg("-l")
        .output()
        .await
        .map_err(|e| SchedulerError::Crontab(format!("cannot run crontab: {e}")))?;
    if output.status.success() {
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    } else {
        // `crontab -l` exits non-zero with "no crontab for <user>".
        debug!(
            stderr = %String::from_utf8_lossy(&output.stderr).trim(),
            "no existing crontab"
        );
        Ok(String::new())
    }
}

/// Single-quote `s` for `/bin/sh` unless it is made only of safe characters.
fn shell_quote(s: &str) -> String {
    let safe = !s.is_empty()
        && s
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || "/._-+=:,@".contains(c));
    if safe {
        s.to_string()
    } else {
        format!("'{}'", s.replace('\'', r"'\''"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn line_runs_from_root_and_appends_to_dated_log() {
        let line = cron_line(
            "0 0 * * *",
            Path::new("/srv/hospital"),
            "/srv/hospital/.venv/bin/python",
            &["main.py".to_string()],
            Path::new("/srv/hospital/logs"),
        );
        assert_eq!(
            line,
            "0 0 * * * cd /srv/hospital && /srv/hospital/.venv/bin/python main.py \
             >> /srv/hospital/logs/$(date +\\%Y\\%m\\%d\\%H\\%M).log 2>&1"
        );
    }

    #[test]
    fn paths_with_spaces_are_quoted() {
        let line = cron_line(
            "0 0 * * *",
            Path::new("/home/me/my jobs"),
            "python3",
            &["main.py".to_string()],
            Path::new("/home/me/my jobs/logs"),
        );
        assert!(line.contains("cd '/home/me/my jobs' &&"));
        assert!(line.contains(">> '/home/me/my jobs/logs'/$(date"));
    }

    #[test]
    fn every_percent_is_escaped() {
        let line = cron_line(
            "0 0 * * *",
            Path::new("/srv/50%off"),
            "/opt/py%3/bin/python",
            &["--fmt=%d".to_string()],
            Path::new("/srv/50%off/logs"),
        );
        assert_eq!(line.matches('%').count(), line.matches("\\%").count());
        assert!(line.contains("cd '/srv/50\\%off' && "));
        assert!(line.contains("'/opt/py\\%3/bin/python' '--fmt=\\%d'"));
        assert!(line.contains(">> '/srv/50\\%off/logs'/$(date +\\%Y\\%m\\%d\\%H\\%M).log"));
    }

    #[test]
    fn merge_appends_to_existing_entries() {
        let merged = merge_crontab("MAILTO=ops\n5 4 * * * backup", "0 0 * * * job").unwrap();
        assert_eq!(merged, "MAILTO=ops\n5 4 * * * backup\n0 0 * * * job\n");
    }

    #[test]
    fn merge_into_empty_crontab() {
        assert_eq!(merge_crontab("", "0 0 * * * job").unwrap(), "0 0 * * * job\n");
    }

    #[test]
    fn merge_is_idempotent() {
        let once = merge_crontab("", "0 0 * * * job").unwrap();
        assert!(merge_crontab(&once, "0 0 * * * job").is_none());
    }

    #[test]
    fn quote_escapes_single_quotes() {
        assert_eq!(shell_quote("it's"), r"'it'\''s'");
        assert_eq!(shell_quote(""), "''");
    }
}
