use core::num::NonZeroUsize;
use std::env;
use thiserror::Error;

/// Environment variable overriding `ExecutorConfig::target_commit_ratio`.
pub const COMMIT_RATIO_ENV: &str = "SOE_COMMIT_RATIO";
/// Environment variable overriding `ExecutorConfig::threads`.
pub const THREADS_ENV: &str = "SOE_THREADS";
/// Environment variable overriding `ExecutorConfig::loopname`.
pub const LOOPNAME_ENV: &str = "SOE_LOOPNAME";

/// Default target commit ratio of the adaptive window.
pub const DEFAULT_COMMIT_RATIO: f64 = 0.8;
const DEFAULT_LOOPNAME: &str = "unnamed";

/// Error returned by `ExecutorConfig::from_env`.
#[derive(Debug, Error, Clone, PartialEq)]
#[non_exhaustive]
pub enum ConfigError {
    /// A variable is set but cannot be parsed.
    #[error("invalid value {value:?} for {var}: {reason}")]
    InvalidValue {
        /// Variable name.
        var: &'static str,
        /// Raw value found in the environment.
        value: String,
        /// What was expected.
        reason: &'static str,
    },
}

/// Tunables of a run.
#[must_use]
#[derive(Debug, Clone, PartialEq)]
pub struct ExecutorConfig {
    target_commit_ratio: f64,
    loopname: String,
    threads: Option<NonZeroUsize>,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            target_commit_ratio: DEFAULT_COMMIT_RATIO,
            loopname: DEFAULT_LOOPNAME.to_owned(),
            threads: None,
        }
    }
}

impl ExecutorConfig {
    /// Defaults overridden by `SOE_COMMIT_RATIO`, `SOE_THREADS` and
    /// `SOE_LOOPNAME` when set.
    ///
    /// # Errors
    /// If a variable is set to something that does not parse.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|var| env::var(var).ok())
    }

    fn from_lookup(lookup: impl Fn(&'static str) -> Option<String>) -> Result<Self, ConfigError> {
        let mut config = Self::default();
        if let Some(value) = lookup(COMMIT_RATIO_ENV) {
            let ratio = value
                .trim()
                .parse::<f64>()
                .ok()
                .filter(|ratio| !ratio.is_nan())
                .ok_or_else(|| ConfigError::InvalidValue {
                    var: COMMIT_RATIO_ENV,
                    value: value.clone(),
                    reason: "expected a number in [0, 1]",
                })?;
            config = config.with_target_commit_ratio(ratio);
        }
        if let Some(value) = lookup(THREADS_ENV) {
            let threads = value
                .trim()
                .parse::<NonZeroUsize>()
                .map_err(|_| ConfigError::InvalidValue {
                    var: THREADS_ENV,
                    value: value.clone(),
                    reason: "expected a positive integer",
                })?;
            config = config.with_threads(threads);
        }
        if let Some(value) = lookup(LOOPNAME_ENV) {
            config = config.with_loopname(value);
        }
        Ok(config)
    }

    /// Target fraction of admitted tasks that should commit per round.
    ///
    /// Clamped into `[0, 1]`; NaN counts as `0`. `0` disables adaptive
    /// windowing: every available task is admitted each round.
    pub fn with_target_commit_ratio(mut self, ratio: f64) -> Self {
        self.target_commit_ratio = if ratio.is_nan() {
            0.0
        } else {
            ratio.clamp(0.0, 1.0)
        };
        self
    }

    /// Diagnostic label used in logs and statistics.
    pub fn with_loopname(mut self, loopname: impl Into<String>) -> Self {
        let loopname = loopname.into();
        self.loopname = if loopname.is_empty() {
            DEFAULT_LOOPNAME.to_owned()
        } else {
            loopname
        };
        self
    }

    /// Run on a dedicated pool of `threads` workers instead of the ambient
    /// rayon pool.
    pub fn with_threads(mut self, threads: NonZeroUsize) -> Self {
        self.threads = Some(threads);
        self
    }

    /// Target commit ratio, already clamped.
    #[must_use]
    pub fn target_commit_ratio(&self) -> f64 {
        self.target_commit_ratio
    }

    /// Diagnostic label.
    #[must_use]
    pub fn loopname(&self) -> &str {
        &self.loopname
    }

    /// Size of the dedicated pool, if any.
    #[must_use]
    pub fn threads(&self) -> Option<NonZeroUsize> {
        self.threads
    }

    /// Whether the adaptive window is in use.
    #[must_use]
    pub fn windowing(&self) -> bool {
        self.target_commit_ratio > 0.0
    }
}
