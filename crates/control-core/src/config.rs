use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};

use crate::error::{ControlError, Result};

pub const DEFAULT_CONFIG_FILE: &str = "control.toml";
pub const DEFAULT_DB_FILE: &str = "control.db";
pub const DEFAULT_LOGS_DIR: &str = "logs";
pub const DEFAULT_DATA_DIR: &str = "data";
pub const DEFAULT_JOB_NAME: &str = "main";
pub const DEFAULT_PROGRAM: &str = "python3";
pub const DEFAULT_SCRIPT: &str = "main.py";
/// Daily at midnight, host local time.
pub const DEFAULT_CRON: &str = "0 0 * * *";

/// Env var naming an explicit config file.
pub const CONFIG_ENV: &str = "CONTROL_CONFIG";
/// Prefix for env overrides; `__` separates nesting levels,
/// e.g. `CONTROL_PATHS__LOGS_DIR=/var/log/control`.
pub const ENV_PREFIX: &str = "CONTROL_";

/// Top-level config (control.toml + CONTROL_* env overrides).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ControlConfig {
    #[serde(default)]
    pub paths: PathsConfig,
    #[serde(default)]
    pub job: JobConfig,
    #[serde(default)]
    pub schedule: ScheduleConfig,
}

/// Filesystem layout. Relative entries resolve against `root`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PathsConfig {
    #[serde(default = "default_root")]
    pub root: String,
    #[serde(default = "default_database")]
    pub database: String,
    #[serde(default = "default_logs_dir")]
    pub logs_dir: String,
    #[serde(default = "default_data_dir")]
    pub data_dir: String,
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            root: default_root(),
            database: default_database(),
            logs_dir: default_logs_dir(),
            data_dir: default_data_dir(),
        }
    }
}

/// The external workload launched on every scheduled run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobConfig {
    /// Label used in logs and run outcomes.
    #[serde(default = "default_job_name")]
    pub name: String,
    /// Interpreter or executable to launch.
    #[serde(default = "default_program")]
    pub program: String,
    /// Arguments passed verbatim. The workload itself takes no required args.
    #[serde(default = "default_args")]
    pub args: Vec<String>,
}

impl Default for JobConfig {
    fn default() -> Self {
        Self {
            name: default_job_name(),
            program: default_program(),
            args: default_args(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScheduleConfig {
    /// Five-field cron expression (min hour dom month dow).
    #[serde(default = "default_expression")]
    pub expression: String,
    /// IANA timezone name for the in-process scheduler. `None` means host
    /// local time, which is what cron uses.
    #[serde(default)]
    pub timezone: Option<String>,
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            expression: default_expression(),
            timezone: None,
        }
    }
}

impl ScheduleConfig {
    /// Parse the configured timezone, if any.
    pub fn tz(&self) -> Result<Option<chrono_tz::Tz>> {
        match self.timezone.as_deref() {
            None => Ok(None),
            Some(name) => name
                .parse::<chrono_tz::Tz>()
                .map(Some)
                .map_err(|_| ControlError::Timezone(name.to_string())),
        }
    }
}

fn default_root() -> String {
    ".".to_string()
}
fn default_database() -> String {
    DEFAULT_DB_FILE.to_string()
}
fn default_logs_dir() -> String {
    DEFAULT_LOGS_DIR.to_string()
}
fn default_data_dir() -> String {
    DEFAULT_DATA_DIR.to_string()
}
fn default_job_name() -> String {
    DEFAULT_JOB_NAME.to_string()
}
fn default_program() -> String {
    DEFAULT_PROGRAM.to_string()
}
fn default_args() -> Vec<String> {
    vec![DEFAULT_SCRIPT.to_string()]
}
fn default_expression() -> String {
    DEFAULT_CRON.to_string()
}

impl ControlConfig {
    /// Load config from a TOML file with CONTROL_* env var overrides.
    ///
    /// Checks in order:
    ///   1. Explicit path argument
    ///   2. $CONTROL_CONFIG
    ///   3. ./control.toml
    ///
    /// A missing file is not an error; every field has a default.
    pub fn load(config_path: Option<&str>) -> Result<Self> {
        let path = config_path
            .map(String::from)
            .or_else(|| std::env::var(CONFIG_ENV).ok())
            .unwrap_or_else(|| DEFAULT_CONFIG_FILE.to_string());

        Self::figment(&path)
            .extract()
            .map_err(|e| ControlError::Config(e.to_string()))
    }

    fn figment(path: &str) -> Figment {
        Figment::from(Serialized::defaults(ControlConfig::default()))
            .merge(Toml::file(path))
            .merge(Env::prefixed(ENV_PREFIX).ignore(&["CONFIG"]).split("__"))
    }
}
