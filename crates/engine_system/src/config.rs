//! Scheduler configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::SchedulerError;
use crate::thread_mask::ThreadMask;

/// Thread count used when none is requested.
pub const DEFAULT_THREAD_COUNT: u32 = 8;

/// Default bound on how long shutdown waits for workers to acknowledge.
pub const DEFAULT_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(5);

/// Default worker thread name prefix.
pub const DEFAULT_THREAD_NAME_PREFIX: &str = "system-worker";

/// The environment variable used to override the worker thread count.
pub const THREAD_COUNT_ENV: &str = "ENGINE_THREAD_COUNT";

/// Configuration for a [`SystemScheduler`](crate::SystemScheduler).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    /// Requested worker count. `0` selects [`DEFAULT_THREAD_COUNT`].
    pub max_thread_count: u32,
    /// How long shutdown waits for every worker to acknowledge.
    pub shutdown_timeout: Duration,
    /// Prefix for worker thread names (`{prefix}-{index}`).
    pub thread_name_prefix: String,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            max_thread_count: 0,
            shutdown_timeout: DEFAULT_SHUTDOWN_TIMEOUT,
            thread_name_prefix: DEFAULT_THREAD_NAME_PREFIX.to_string(),
        }
    }
}

impl SchedulerConfig {
    /// Create a config with default settings.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Read the thread count from the `ENGINE_THREAD_COUNT` environment
    /// variable, falling back to the default when it is unset.
    ///
    /// # Errors
    ///
    /// Returns [`SchedulerError::InvalidEnv`] if the variable is set but is
    /// not an unsigned integer.
    pub fn from_env() -> Result<Self, SchedulerError> {
        let config = Self::default();
        match std::env::var(THREAD_COUNT_ENV) {
            Ok(value) => {
                let count = value
                    .trim()
                    .parse::<u32>()
                    .map_err(|_| SchedulerError::InvalidEnv {
                        var: THREAD_COUNT_ENV,
                        value: value.clone(),
                    })?;
                Ok(config.with_max_thread_count(count))
            }
            Err(_) => Ok(config),
        }
    }

    /// Override the requested worker count.
    #[must_use]
    pub fn with_max_thread_count(mut self, count: u32) -> Self {
        self.max_thread_count = count;
        self
    }

    /// Override the shutdown acknowledgement bound.
    #[must_use]
    pub fn with_shutdown_timeout(mut self, timeout: Duration) -> Self {
        self.shutdown_timeout = timeout;
        self
    }

    /// Override the worker thread name prefix.
    #[must_use]
    pub fn with_thread_name_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.thread_name_prefix = prefix.into();
        self
    }

    /// Resolve the number of workers the pool will start.
    ///
    /// # Errors
    ///
    /// Returns [`SchedulerError::ThreadCountExceeded`] if the request is wider
    /// than [`ThreadMask::CAPACITY`].
    pub fn effective_thread_count(&self) -> Result<usize, SchedulerError> {
        let requested = if self.max_thread_count == 0 {
            DEFAULT_THREAD_COUNT
        } else {
            self.max_thread_count
        };
        if requested as usize > ThreadMask::CAPACITY {
            return Err(SchedulerError::ThreadCountExceeded {
                requested,
                max: ThreadMask::CAPACITY as u32,
            });
        }
        Ok(requested as usize)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{Mutex, PoisonError};

    use super::*;

    /// The process environment is global; tests touching it take this lock.
    static ENV_LOCK: Mutex<()> = Mutex::new(());

    fn from_env_with(value: Option<&str>) -> Result<SchedulerConfig, SchedulerError> {
        let _guard = ENV_LOCK.lock().unwrap_or_else(PoisonError::into_inner);
        // SAFETY: every test that reads or writes the variable holds ENV_LOCK.
        unsafe {
            match value {
                Some(value) => std::env::set_var(THREAD_COUNT_ENV, value),
                None => std::env::remove_var(THREAD_COUNT_ENV),
            }
        }
        let config = SchedulerConfig::from_env();
        unsafe { std::env::remove_var(THREAD_COUNT_ENV) };
        config
    }

    #[test]
    fn test_zero_selects_default() {
        let config = SchedulerConfig::new();
        assert_eq!(config.effective_thread_count().unwrap(), 8);
    }

    #[test]
    fn test_explicit_count() {
        let config = SchedulerConfig::new().with_max_thread_count(3);
        assert_eq!(config.effective_thread_count().unwrap(), 3);
    }

    #[test]
    fn test_ceiling_is_inclusive() {
        let config = SchedulerConfig::new().with_max_thread_count(64);
        assert_eq!(config.effective_thread_count().unwrap(), 64);
    }

    #[test]
    fn test_over_ceiling_rejected() {
        let config = SchedulerConfig::new().with_max_thread_count(65);
        assert!(matches!(
            config.effective_thread_count(),
            Err(SchedulerError::ThreadCountExceeded {
                requested: 65,
                max: 64
            })
        ));
    }

    #[test]
    fn test_builder_overrides() {
        let config = SchedulerConfig::new()
            .with_shutdown_timeout(Duration::from_millis(250))
            .with_thread_name_prefix("frame");
        assert_eq!(config.shutdown_timeout, Duration::from_millis(250));
        assert_eq!(config.thread_name_prefix, "frame");
    }

    #[test]
    fn test_deserialize_partial_json_uses_defaults() {
        let config: SchedulerConfig = serde_json::from_str(r#"{ "max_thread_count": 4 }"#).unwrap();
        assert_eq!(config.max_thread_count, 4);
        assert_eq!(config.shutdown_timeout, DEFAULT_SHUTDOWN_TIMEOUT);
        assert_eq!(config.thread_name_prefix, DEFAULT_THREAD_NAME_PREFIX);
    }

    #[test]
    fn test_from_env_unset_uses_default() {
        let config = from_env_with(None).unwrap();
        assert_eq!(config, SchedulerConfig::default());
        assert_eq!(config.effective_thread_count().unwrap(), 8);
    }

    #[test]
    fn test_from_env_overrides_thread_count() {
        let config = from_env_with(Some(" 12 ")).unwrap();
        assert_eq!(config.max_thread_count, 12);
        assert_eq!(config.shutdown_timeout, DEFAULT_SHUTDOWN_TIMEOUT);
    }

    #[test]
    fn test_from_env_rejects_garbage() {
        let err = from_env_with(Some("lots")).unwrap_err();
        assert!(matches!(
            err,
            SchedulerError::InvalidEnv { var, ref value }
                if var == THREAD_COUNT_ENV && value == "lots"
        ));
    }
}
