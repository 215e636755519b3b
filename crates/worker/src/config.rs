use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use voxline_core::error::CoreError;

/// What [`WorkerPool::stop`](crate::pool::WorkerPool::stop) does with work
/// that has not finished yet.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ShutdownPolicy {
    /// Cancel in-flight jobs and mark every queued job `canceled`.
    #[default]
    Cancel,
    /// Dispatch every queued job, then stop workers once idle.
    Drain,
}

impl FromStr for ShutdownPolicy {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "cancel" => Ok(Self::Cancel),
            "drain" => Ok(Self::Drain),
            other => Err(CoreError::Validation(format!(
                "Unknown shutdown policy '{other}' (expected 'cancel' or 'drain')"
            ))),
        }
    }
}

/// Log line format of the `voxline-worker` binary.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

impl FromStr for LogFormat {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "" | "text" => Ok(Self::Text),
            "json" => Ok(Self::Json),
            other => Err(CoreError::Validation(format!(
                "LOG_FORMAT must be 'text' or 'json', got '{other}'"
            ))),
        }
    }
}

/// Worker pool tuning.
#[derive(Debug, Clone)]
pub struct PoolConfig {
    /// Workers registered at startup, named `worker-1`..`worker-N` (default: `4`).
    pub worker_count: usize,
    /// Queue bound; `None` means unbounded (default).
    pub queue_capacity: Option<usize>,
    /// Upper bound on a single engine call (default: 300s).
    pub job_timeout: Duration,
    /// Period of the status reporter (default: 30s).
    pub status_interval: Duration,
    pub shutdown_policy: ShutdownPolicy,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            worker_count: 4,
            queue_capacity: None,
            job_timeout: Duration::from_secs(300),
            status_interval: Duration::from_secs(30),
            shutdown_policy: ShutdownPolicy::Cancel,
        }
    }
}

impl PoolConfig {
    /// Load configuration from environment variables with defaults.
    ///
    /// | Env Var                | Default  |
    /// |------------------------|----------|
    /// | `WORKER_COUNT`         | `4`      |
    /// | `QUEUE_CAPACITY`       | `0` (unbounded) |
    /// | `JOB_TIMEOUT_SECS`     | `300`    |
    /// | `STATUS_INTERVAL_SECS` | `30`     |
    /// | `SHUTDOWN_POLICY`      | `cancel` |
    pub fn from_env() -> Result<Self, CoreError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, CoreError> {
        let worker_count: usize = parse_var(&lookup, "WORKER_COUNT", 4)?;

        let queue_capacity = match parse_var::<usize>(&lookup, "QUEUE_CAPACITY", 0)? {
            0 => None,
            n => Some(n),
        };

        let job_timeout_secs: u64 = parse_var(&lookup, "JOB_TIMEOUT_SECS", 300)?;
        if job_timeout_secs == 0 {
            return Err(CoreError::Validation(
                "JOB_TIMEOUT_SECS must be greater than zero".into(),
            ));
        }

        let status_interval_secs: u64 = parse_var(&lookup, "STATUS_INTERVAL_SECS", 30)?;
        if status_interval_secs == 0 {
            return Err(CoreError::Validation(
                "STATUS_INTERVAL_SECS must be greater than zero".into(),
            ));
        }

        let shutdown_policy = match lookup("SHUTDOWN_POLICY") {
            Some(raw) => raw.parse()?,
            None => ShutdownPolicy::default(),
        };

        Ok(Self {
            worker_count,
            queue_capacity,
            job_timeout: Duration::from_secs(job_timeout_secs),
            status_interval: Duration::from_secs(status_interval_secs),
            shutdown_policy,
        })
    }
}

/// Full configuration of the `voxline-worker` binary.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    pub pool: PoolConfig,
    /// Text-to-speech program (default: `espeak-ng`).
    pub narrator_command: String,
    /// ffmpeg binary (default: `ffmpeg`).
    pub ffmpeg_path: String,
    /// Root of the local file storage (default: `./storage`).
    pub storage_root: PathBuf,
    /// Optional JSON array of job requests submitted at startup.
    pub jobs_file: Option<PathBuf>,
    pub log_format: LogFormat,
}

impl WorkerConfig {
    /// Load the pool settings plus:
    ///
    /// | Env Var            | Default      |
    /// |--------------------|--------------|
    /// | `NARRATOR_COMMAND` | `espeak-ng`  |
    /// | `FFMPEG_PATH`      | `ffmpeg`     |
    /// | `STORAGE_ROOT`     | `./storage`  |
    /// | `JOBS_FILE`        | unset        |
    /// | `LOG_FORMAT`       | `text`       |
    pub fn from_env() -> Result<Self, CoreError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, CoreError> {
        let pool = PoolConfig::from_lookup(&lookup)?;

        let narrator_command = lookup("NARRATOR_COMMAND").unwrap_or_else(|| "espeak-ng".into());
        let ffmpeg_path = lookup("FFMPEG_PATH").unwrap_or_else(|| "ffmpeg".into());
        let storage_root = lookup("STORAGE_ROOT")
            .unwrap_or_else(|| "./storage".into())
            .into();
        let jobs_file = lookup("JOBS_FILE")
            .filter(|s| !s.trim().is_empty())
            .map(PathBuf::from);

        let log_format = match lookup("LOG_FORMAT") {
            Some(raw) => raw.parse()?,
            None => LogFormat::default(),
        };

        Ok(Self {
            pool,
            narrator_command,
            ffmpeg_path,
            storage_root,
            jobs_file,
            log_format,
        })
    }
}

fn parse_var<T: FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &str,
    default: T,
) -> Result<T, CoreError> {
    match lookup(key) {
        None => Ok(default),
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|_| {
                CoreError::Validation(format!("{key} must be a non-negative integer, got '{raw}'"))
            }),
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use assert_matches::assert_matches;

    use super::*;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn defaults_when_unset() {
        let config = WorkerConfig::from_lookup(lookup(&[])).unwrap();
        assert_eq!(config.pool.worker_count, 4);
        assert_eq!(config.pool.queue_capacity, None);
        assert_eq!(config.pool.job_timeout, Duration::from_secs(300));
        assert_eq!(config.pool.status_interval, Duration::from_secs(30));
        assert_eq!(config.pool.shutdown_policy, ShutdownPolicy::Cancel);
        assert_eq!(config.narrator_command, "espeak-ng");
        assert_eq!(config.ffmpeg_path, "ffmpeg");
        assert_eq!(config.storage_root, PathBuf::from("./storage"));
        assert!(config.jobs_file.is_none());
        assert_eq!(config.log_format, LogFormat::Text);
    }

    #[test]
    fn overrides_are_parsed() {
        let config = WorkerConfig::from_lookup(lookup(&[
            ("WORKER_COUNT", "8"),
            ("QUEUE_CAPACITY", "100"),
            ("JOB_TIMEOUT_SECS", "5"),
            ("SHUTDOWN_POLICY", "Drain"),
            ("JOBS_FILE", "/tmp/jobs.json"),
            ("LOG_FORMAT", "json"),
        ]))
        .unwrap();
        assert_eq!(config.pool.worker_count, 8);
        assert_eq!(config.pool.queue_capacity, Some(100));
        assert_eq!(config.pool.job_timeout, Duration::from_secs(5));
        assert_eq!(config.pool.shutdown_policy, ShutdownPolicy::Drain);
        assert_eq!(config.jobs_file, Some(PathBuf::from("/tmp/jobs.json")));
        assert_eq!(config.log_format, LogFormat::Json);
    }

    #[test]
    fn invalid_values_are_validation_errors() {
        assert_matches!(
            PoolConfig::from_lookup(lookup(&[("WORKER_COUNT", "lots")])),
            Err(CoreError::Validation(msg)) if msg.contains("WORKER_COUNT")
        );
        assert_matches!(
            PoolConfig::from_lookup(lookup(&[("JOB_TIMEOUT_SECS", "0")])),
            Err(CoreError::Validation(_))
        );
        assert_matches!(
            PoolConfig::from_lookup(lookup(&[("SHUTDOWN_POLICY", "abandon")])),
            Err(CoreError::Validation(_))
        );
        assert_matches!(
            WorkerConfig::from_lookup(lookup(&[("LOG_FORMAT", "xml")])),
            Err(CoreError::Validation(_))
        );
    }

    #[test]
    fn log_format_parsing() {
        assert_eq!(" JSON ".parse::<LogFormat>().unwrap(), LogFormat::Json);
        assert_eq!("".parse::<LogFormat>().unwrap(), LogFormat::Text);
        assert_matches!(
            "pretty".parse::<LogFormat>(),
            Err(CoreError::Validation(msg)) if msg.contains("pretty")
        );
    }
}
