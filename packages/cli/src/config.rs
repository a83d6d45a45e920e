//! Runtime configuration.
//!
//! Env vars (a `.env` file is loaded first if present):
//! - `DISTORT_WORKSPACE_ROOT` (default: `./local/operations`)
//! - `DISTORT_QUEUE_CAPACITY` (default: `100`)
//! - `DISTORT_PROGRESS_INTERVAL_SECS` (default: `5`)
//! - `DISTORT_STAGE_TIMEOUT_SECS` (optional, `0` disables)
//! - `FFMPEG_PATH`, `FFPROBE_PATH`, `MAGICK_PATH`
//!
//! Command-line flags override the environment.

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use distort_core::QueueConfig;
use pipeline::ops::Tools;
use workspace::DEFAULT_ROOT;

use crate::cli::Args;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("invalid {key}={value:?}: {reason}")]
    Invalid {
        key: &'static str,
        value: String,
        reason: String,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub struct AppConfig {
    pub workspace_root: PathBuf,
    pub capacity: usize,
    pub progress_interval: Duration,
    pub stage_timeout: Option<Duration>,
    pub tools: Tools,
}

impl AppConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(get: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let value = |key: &str| get(key).and_then(non_empty);

        let workspace_root = value("DISTORT_WORKSPACE_ROOT")
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from(DEFAULT_ROOT));

        let capacity = match value("DISTORT_QUEUE_CAPACITY") {
            Some(raw) => positive("DISTORT_QUEUE_CAPACITY", raw)?,
            None => QueueConfig::default().capacity,
        };

        let progress_interval = match value("DISTORT_PROGRESS_INTERVAL_SECS") {
            Some(raw) => Duration::from_secs(parse("DISTORT_PROGRESS_INTERVAL_SECS", raw)?),
            None => Duration::from_secs(5),
        };

        let stage_timeout = match value("DISTORT_STAGE_TIMEOUT_SECS") {
            Some(raw) => match parse::<u64>("DISTORT_STAGE_TIMEOUT_SECS", raw)? {
                0 => None,
                secs => Some(Duration::from_secs(secs)),
            },
            None => None,
        };

        Ok(Self {
            workspace_root,
            capacity,
            progress_interval,
            stage_timeout,
            tools: Tools::from_lookup(&get),
        })
    }

    /// Apply command-line overrides.
    pub fn with_args(mut self, args: &Args) -> Result<Self, ConfigError> {
        if let Some(root) = &args.workspace {
            self.workspace_root = root.clone();
        }
        if let Some(capacity) = args.capacity {
            self.capacity = positive("--capacity", capacity.to_string())?;
        }
        if let Some(secs) = args.stage_timeout {
            self.stage_timeout = (secs > 0).then(|| Duration::from_secs(secs));
        }
        Ok(self)
    }
}

fn non_empty(value: String) -> Option<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

fn parse<T>(key: &'static str, raw: String) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    raw.parse::<T>().map_err(|e| ConfigError::Invalid {
        key,
        reason: e.to_string(),
        value: raw,
    })
}

fn positive(key: &'static str, raw: String) -> Result<usize, ConfigError> {
    match parse::<usize>(key, raw.clone())? {
        0 => Err(ConfigError::Invalid {
            key,
            value: raw,
            reason: "must be at least 1".to_string(),
        }),
        n => Ok(n),
    }
}
