//! Worker configuration
//!
//! Everything is read once from the environment (after `.env`) at startup.

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use anyhow::{Context, Result};

use crate::pool::PoolConfig;
use crate::queue::keys;

#[derive(Debug, Clone)]
pub struct WorkerConfig {
    pub redis_url: String,
    pub task_queue: String,
    pub result_queue: String,
    /// Parent directory of all task workspaces
    pub workspace_root: PathBuf,
    pub pool: PoolConfig,
    /// Upper bound on one toolchain run; `None` waits forever
    pub compile_timeout: Option<Duration>,
    /// How long one BLPOP waits before returning empty
    pub pull_timeout: Duration,
    /// Pause after an empty pull or a queue error
    pub idle_delay: Duration,
    /// Replacement for the built-in language table
    pub languages_config: Option<PathBuf>,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            redis_url: "redis://localhost:6379".into(),
            task_queue: keys::TASK_QUEUE.into(),
            result_queue: keys::RESULT_QUEUE.into(),
            workspace_root: PathBuf::from("/tmp/judge"),
            pool: PoolConfig::default(),
            compile_timeout: Some(Duration::from_secs(30)),
            pull_timeout: Duration::from_secs(1),
            idle_delay: Duration::from_millis(200),
            languages_config: None,
        }
    }
}

impl WorkerConfig {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from an arbitrary key lookup, falling back to defaults
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let defaults = Self::default();

        let parse = |key: &str| -> Result<Option<u64>> { parse_var(&lookup, key) };

        let pool = PoolConfig {
            min_workers: parse("MIN_WORKERS")?
                .map(|v| v as usize)
                .unwrap_or(defaults.pool.min_workers),
            max_workers: parse("MAX_WORKERS")?
                .map(|v| v as usize)
                .unwrap_or(defaults.pool.max_workers),
            interval: parse("SUPERVISOR_INTERVAL_MS")?
                .map(Duration::from_millis)
                .unwrap_or(defaults.pool.interval),
            scale_step: parse("SCALE_STEP")?
                .map(|v| v as usize)
                .unwrap_or(defaults.pool.scale_step),
        };

        let compile_timeout = match parse("COMPILE_TIMEOUT_SECS")? {
            Some(0) => None,
            Some(secs) => Some(Duration::from_secs(secs)),
            None => defaults.compile_timeout,
        };

        let config = Self {
            redis_url: lookup("REDIS_URL").unwrap_or(defaults.redis_url),
            task_queue: lookup("TASK_QUEUE").unwrap_or(defaults.task_queue),
            result_queue: lookup("RESULT_QUEUE").unwrap_or(defaults.result_queue),
            workspace_root: lookup("WORKSPACE_ROOT")
                .map(PathBuf::from)
                .unwrap_or(defaults.workspace_root),
            pool,
            compile_timeout,
            pull_timeout: parse("PULL_TIMEOUT_SECS")?
                .map(Duration::from_secs)
                .unwrap_or(defaults.pull_timeout),
            idle_delay: parse("IDLE_DELAY_MS")?
                .map(Duration::from_millis)
                .unwrap_or(defaults.idle_delay),
            languages_config: lookup("LANGUAGES_CONFIG").map(PathBuf::from),
        };
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if self.pool.min_workers == 0 {
            anyhow::bail!("MIN_WORKERS must be at least 1");
        }
        if self.pool.min_workers > self.pool.max_workers {
            anyhow::bail!(
                "MIN_WORKERS ({}) exceeds MAX_WORKERS ({})",
                self.pool.min_workers,
                self.pool.max_workers
            );
        }
        if self.pool.interval.is_zero() {
            anyhow::bail!("SUPERVISOR_INTERVAL_MS must be positive");
        }
        Ok(())
    }
}

fn parse_var<T: FromStr>(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> Result<Option<T>>
where
    T::Err: std::error::Error + Send + Sync + 'static,
{
    lookup(key)
        .map(|raw| {
            raw.trim()
                .parse::<T>()
                .with_context(|| format!("Invalid {}: {}", key, raw))
        })
        .transpose()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn from_pairs(pairs: &[(&str, &str)]) -> Result<WorkerConfig> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        WorkerConfig::from_lookup(|key| map.get(key).cloned())
    }

    #[test]
    fn test_defaults() {
        let config = from_pairs(&[]).unwrap();
        assert_eq!(config.pool.min_workers, 5);
        assert_eq!(config.pool.max_workers, 10);
        assert_eq!(config.pool.interval, Duration::from_millis(1000));
        assert_eq!(config.workspace_root, PathBuf::from("/tmp/judge"));
        assert_eq!(config.task_queue, "compile:tasks");
        assert_eq!(config.compile_timeout, Some(Duration::from_secs(30)));
    }

    #[test]
    fn test_overrides() {
        let config = from_pairs(&[
            ("MIN_WORKERS", "2"),
            ("MAX_WORKERS", "4"),
            ("WORKSPACE_ROOT", "/var/judge"),
            ("COMPILE_TIMEOUT_SECS", "0"),
            ("LANGUAGES_CONFIG", "/etc/judge/languages.toml"),
        ])
        .unwrap();
        assert_eq!(config.pool.min_workers, 2);
        assert_eq!(config.pool.max_workers, 4);
        assert_eq!(config.workspace_root, PathBuf::from("/var/judge"));
        assert_eq!(config.compile_timeout, None);
        assert!(config.languages_config.is_some());
    }

    #[test]
    fn test_invalid_values_fail() {
        assert!(from_pairs(&[("MIN_WORKERS", "many")]).is_err());
        assert!(from_pairs(&[("MIN_WORKERS", "0")]).is_err());
        assert!(from_pairs(&[("MIN_WORKERS", "8"), ("MAX_WORKERS", "4")]).is_err());
        assert!(from_pairs(&[("SUPERVISOR_INTERVAL_MS", "0")]).is_err());
    }
}
