//! Pruning strategy resolution.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::config::schema::BaseConfig;

const DEFAULT_KEEP_RECENT: u64 = 362_880;
const DEFAULT_INTERVAL: u64 = 10;
const EVERYTHING_KEEP_RECENT: u64 = 2;
const EVERYTHING_INTERVAL: u64 = 10;

/// Named pruning strategy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PruningStrategy {
    /// Keep the last 362880 states, prune every 10 blocks.
    Default,
    /// Archive node: never delete anything.
    Nothing,
    /// Keep only the current and previous state, prune every 10 blocks.
    Everything,
    /// Use `pruning_keep_recent` and `pruning_interval` as given.
    Custom,
}

impl FromStr for PruningStrategy {
    type Err = PruningError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "default" => Ok(Self::Default),
            "nothing" => Ok(Self::Nothing),
            "everything" => Ok(Self::Everything),
            "custom" => Ok(Self::Custom),
            other => Err(PruningError::UnknownStrategy(other.to_string())),
        }
    }
}

impl fmt::Display for PruningStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Default => "default",
            Self::Nothing => "nothing",
            Self::Everything => "everything",
            Self::Custom => "custom",
        })
    }
}

/// Invalid pruning settings.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PruningError {
    #[error("unknown pruning strategy {0}")]
    UnknownStrategy(String),

    #[error("invalid custom pruning options: 'pruning-interval' must not be 0. If you want to disable pruning, select pruning = \"nothing\"")]
    IntervalZero,

    #[error("invalid custom pruning options: 'pruning-interval' must not be less than {EVERYTHING_INTERVAL}")]
    IntervalTooSmall,

    #[error("invalid custom pruning options: 'pruning-keep-recent' must not be less than {EVERYTHING_KEEP_RECENT}")]
    KeepRecentTooSmall,
}

/// Resolved pruning settings handed to the application.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PruningOptions {
    pub strategy: PruningStrategy,
    pub keep_recent: u64,
    pub interval: u64,
}

impl PruningOptions {
    /// Options for a named strategy. `Custom` uses the given values.
    pub fn new(strategy: PruningStrategy, keep_recent: u64, interval: u64) -> Self {
        let (keep_recent, interval) = match strategy {
            PruningStrategy::Default => (DEFAULT_KEEP_RECENT, DEFAULT_INTERVAL),
            PruningStrategy::Nothing => (0, 1),
            PruningStrategy::Everything => (EVERYTHING_KEEP_RECENT, EVERYTHING_INTERVAL),
            PruningStrategy::Custom => (keep_recent, interval),
        };
        Self {
            strategy,
            keep_recent,
            interval,
        }
    }

    /// Check custom values. Named strategies are always valid.
    pub fn validate(&self) -> Result<(), PruningError> {
        if self.strategy == PruningStrategy::Nothing {
            return Ok(());
        }
        if self.interval == 0 {
            return Err(PruningError::IntervalZero);
        }
        if self.interval < EVERYTHING_INTERVAL {
            return Err(PruningError::IntervalTooSmall);
        }
        if self.keep_recent < EVERYTHING_KEEP_RECENT {
            return Err(PruningError::KeepRecentTooSmall);
        }
        Ok(())
    }

    /// Resolve the options described by the base config.
    pub fn from_config(base: &BaseConfig) -> Result<Self, PruningError> {
        let strategy: PruningStrategy = base.pruning.parse()?;
        let opts = Self::new(strategy, base.pruning_keep_recent, base.pruning_interval);
        if strategy == PruningStrategy::Custom {
            opts.validate()?;
        }
        Ok(opts)
    }
}

impl Default for PruningOptions {
    fn default() -> Self {
        Self::new(PruningStrategy::Default, 0, 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base(pruning: &str, keep_recent: u64, interval: u64) -> BaseConfig {
        BaseConfig {
            pruning: pruning.to_string(),
            pruning_keep_recent: keep_recent,
            pruning_interval: interval,
            ..BaseConfig::default()
        }
    }

    #[test]
    fn named_strategies_ignore_custom_values() {
        let opts = PruningOptions::from_config(&base("everything", 0, 0)).unwrap();
        assert_eq!(opts.keep_recent, 2);
        assert_eq!(opts.interval, 10);

        let opts = PruningOptions::from_config(&base("Nothing", 5, 5)).unwrap();
        assert_eq!(opts.strategy, PruningStrategy::Nothing);
        assert_eq!(opts.keep_recent, 0);
    }

    #[test]
    fn custom_values_are_checked() {
        assert_eq!(
            PruningOptions::from_config(&base("custom", 100, 0)),
            Err(PruningError::IntervalZero)
        );
        assert_eq!(
            PruningOptions::from_config(&base("custom", 100, 5)),
            Err(PruningError::IntervalTooSmall)
        );
        assert_eq!(
            PruningOptions::from_config(&base("custom", 1, 10)),
            Err(PruningError::KeepRecentTooSmall)
        );
        let opts = PruningOptions::from_config(&base("custom", 100, 10)).unwrap();
        assert_eq!((opts.keep_recent, opts.interval), (100, 10));
    }

    #[test]
    fn unknown_strategy_is_rejected() {
        assert_eq!(
            PruningOptions::from_config(&base("sometimes", 0, 0)),
            Err(PruningError::UnknownStrategy("sometimes".into()))
        );
    }
}
