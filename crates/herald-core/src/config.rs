use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};

pub const DEFAULT_JOB_WORKERS: usize = 1;
pub const DEFAULT_SCHEDULE_WORKERS: usize = 1;
pub const DEFAULT_LEASE_MINUTES: u32 = 30;
pub const DEFAULT_POLL_INTERVAL_SECS: u64 = 5;
pub const DEFAULT_RETRY_MAX_ELAPSED_SECS: u64 = 300; // 5 minutes per executor call / store write
pub const DEFAULT_STARTUP_JITTER_MS: u64 = 50;
pub const DEFAULT_BUSY_TIMEOUT_MS: u64 = 5_000;
pub const DEFAULT_HTTP_TIMEOUT_SECS: u64 = 30;

/// Top-level config (herald.toml + HERALD_* env overrides).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct HeraldConfig {
    /// Overrides the generated `herald_<host>_<pid>` claim owner name.
    #[serde(default)]
    pub node_name: Option<String>,
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub workers: WorkersConfig,
    #[serde(default)]
    pub executor: ExecutorConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    #[serde(default = "default_db_path")]
    pub path: String,
    /// How long a connection waits on a locked database before failing.
    #[serde(default = "default_busy_timeout_ms")]
    pub busy_timeout_ms: u64,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_db_path(),
            busy_timeout_ms: DEFAULT_BUSY_TIMEOUT_MS,
        }
    }
}

/// Worker pool sizing and the timing knobs passed into every worker.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkersConfig {
    #[serde(default = "default_job_workers")]
    pub job_workers: usize,
    #[serde(default = "default_schedule_workers")]
    pub schedule_workers: usize,
    /// Claim duration for jobs and crontab ticks.
    #[serde(default = "default_lease_minutes")]
    pub lease_minutes: u32,
    /// Sleep between cycles that found no work or failed.
    #[serde(default = "default_poll_interval_secs")]
    pub poll_interval_secs: u64,
    /// Budget for each backoff-retried call (execute, complete).
    #[serde(default = "default_retry_max_elapsed_secs")]
    pub retry_max_elapsed_secs: u64,
    /// Upper bound of the random delay between spawning worker tasks.
    #[serde(default = "default_startup_jitter_ms")]
    pub startup_jitter_ms: u64,
}

impl Default for WorkersConfig {
    fn default() -> Self {
        Self {
            job_workers: DEFAULT_JOB_WORKERS,
            schedule_workers: DEFAULT_SCHEDULE_WORKERS,
            lease_minutes: DEFAULT_LEASE_MINUTES,
            poll_interval_secs: DEFAULT_POLL_INTERVAL_SECS,
            retry_max_elapsed_secs: DEFAULT_RETRY_MAX_ELAPSED_SECS,
            startup_jitter_ms: DEFAULT_STARTUP_JITTER_MS,
        }
    }
}

/// Which executor receives claimed jobs.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum ExecutorMode {
    /// POST the payload to the job's target URL.
    #[default]
    Http,
    /// Publish the payload to the job's target SNS topic ARN.
    Sns,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ExecutorConfig {
    #[serde(default)]
    pub mode: ExecutorMode,
    #[serde(default)]
    pub http: HttpExecutorConfig,
    #[serde(default)]
    pub sns: SnsExecutorConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HttpExecutorConfig {
    #[serde(default = "default_http_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for HttpExecutorConfig {
    fn default() -> Self {
        Self {
            timeout_secs: DEFAULT_HTTP_TIMEOUT_SECS,
        }
    }
}

/// SNS settings. Credentials come from the standard AWS provider chain.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SnsExecutorConfig {
    /// AWS region (e.g. "eu-west-2"). Falls back to the provider chain when unset.
    pub region: Option<String>,
    /// Custom endpoint, e.g. LocalStack.
    pub endpoint_url: Option<String>,
}

fn default_job_workers() -> usize {
    DEFAULT_JOB_WORKERS
}
fn default_schedule_workers() -> usize {
    DEFAULT_SCHEDULE_WORKERS
}
fn default_lease_minutes() -> u32 {
    DEFAULT_LEASE_MINUTES
}
fn default_poll_interval_secs() -> u64 {
    DEFAULT_POLL_INTERVAL_SECS
}
fn default_retry_max_elapsed_secs() -> u64 {
    DEFAULT_RETRY_MAX_ELAPSED_SECS
}
fn default_startup_jitter_ms() -> u64 {
    DEFAULT_STARTUP_JITTER_MS
}
fn default_busy_timeout_ms() -> u64 {
    DEFAULT_BUSY_TIMEOUT_MS
}
fn default_http_timeout_secs() -> u64 {
    DEFAULT_HTTP_TIMEOUT_SECS
}
fn default_db_path() -> String {
    let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
    format!("{}/.herald/herald.db", home)
}

impl HeraldConfig {
    /// Load config from a TOML file with HERALD_* env var overrides.
    ///
    /// Checks in order:
    ///   1. Explicit path argument
    ///   2. ~/.herald/herald.toml
    ///
    /// A missing file is not an error: every field has a default. Nested keys
    /// in env vars use a double underscore, e.g. `HERALD_WORKERS__JOB_WORKERS=4`.
    pub fn load(config_path: Option<&str>) -> crate::error::Result<Self> {
        let path = config_path
            .map(String::from)
            .unwrap_or_else(default_config_path);

        let config: Self = Self::figment(&path)
            .extract()
            .map_err(|e| crate::error::HeraldError::Config(e.to_string()))?;
        tracing::debug!(path = %path, "configuration loaded");
        Ok(config)
    }

    fn figment(path: &str) -> Figment {
        Figment::from(Serialized::defaults(HeraldConfig::default()))
            .merge(Toml::file(path))
            .merge(Env::prefixed("HERALD_").split("__"))
    }
}

fn default_config_path() -> String {
    let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
    format!("{}/.herald/herald.toml", home)
}
