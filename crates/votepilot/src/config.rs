//! Run configuration and startup validation.

use std::path::PathBuf;

/// First auxiliary slot's activation threshold (consecutive rounds behind).
pub const DEFAULT_BASE_THRESHOLD: u64 = 20;
/// Threshold increment per additional auxiliary slot.
pub const DEFAULT_THRESHOLD_STEP: u64 = 10;
/// Ceiling on a backoff-stretched standard wait, in seconds.
pub const DEFAULT_MAX_BACKOFF_SECS: u64 = 300;
/// Lead percentage at which backoff starts growing.
pub const DEFAULT_LEAD_THRESHOLD: f64 = 15.0;
/// Default total worker count (primary + auxiliaries).
pub const DEFAULT_MAX_WORKERS: usize = 8;

/// Startup misconfiguration. The only fatal errors in the system — every
/// runtime failure after workers start is recovered locally.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("--max-workers must be at least 1 (got {0})")]
    MaxWorkersTooLow(usize),

    #[error("--start-workers must be at least 1 (got {0})")]
    StartWorkersTooLow(usize),

    #[error("--start-workers ({start}) cannot exceed --max-workers ({max})")]
    StartExceedsMax { start: usize, max: usize },
}

/// Everything a run needs to know, assembled from the CLI in `main`.
#[derive(Debug, Clone)]
pub struct RunConfig {
    /// Poll page URL handed to the submission driver.
    pub poll_url: String,
    /// Two-part name of the entrant being voted for.
    pub target_name: String,
    /// Total workers, primary included.
    pub max_workers: usize,
    /// Workers active from the start (1 = primary only).
    pub start_workers: usize,
    /// Lead percentage that triggers exponential backoff.
    pub lead_threshold: f64,
    /// Cap on a backoff-stretched wait.
    pub max_backoff_secs: u64,
    /// First auxiliary slot threshold.
    pub base_threshold: u64,
    /// Per-slot threshold increment.
    pub threshold_step: u64,
    /// Keep auxiliary workers running regardless of standings.
    pub force_parallel: bool,
    /// Include the leading results in each journal record.
    pub save_top_results: bool,
    pub journal_path: PathBuf,
    pub verification_path: PathBuf,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            poll_url: String::new(),
            target_name: String::new(),
            max_workers: DEFAULT_MAX_WORKERS,
            start_workers: 1,
            lead_threshold: DEFAULT_LEAD_THRESHOLD,
            max_backoff_secs: DEFAULT_MAX_BACKOFF_SECS,
            base_threshold: DEFAULT_BASE_THRESHOLD,
            threshold_step: DEFAULT_THRESHOLD_STEP,
            force_parallel: false,
            save_top_results: false,
            journal_path: PathBuf::from("voting_activity.json"),
            verification_path: PathBuf::from("vote_verification.json"),
        }
    }
}

impl RunConfig {
    /// Validate worker bounds. Called once before any worker starts.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_workers < 1 {
            return Err(ConfigError::MaxWorkersTooLow(self.max_workers));
        }
        if self.start_workers < 1 {
            return Err(ConfigError::StartWorkersTooLow(self.start_workers));
        }
        if self.start_workers > self.max_workers {
            return Err(ConfigError::StartExceedsMax {
                start: self.start_workers,
                max: self.max_workers,
            });
        }
        Ok(())
    }

    /// Number of auxiliary worker slots.
    pub fn aux_slot_count(&self) -> usize {
        self.max_workers.saturating_sub(1)
    }

    /// Activation threshold for auxiliary slot `i` (0-indexed).
    pub fn slot_threshold(&self, i: usize) -> u64 {
        self.base_threshold + i as u64 * self.threshold_step
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = RunConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.aux_slot_count(), 7);
    }

    #[test]
    fn test_slot_thresholds_step_by_ten() {
        let config = RunConfig::default();
        assert_eq!(config.slot_threshold(0), 20);
        assert_eq!(config.slot_threshold(1), 30);
        assert_eq!(config.slot_threshold(6), 80);
    }

    #[test]
    fn test_zero_max_workers_rejected() {
        let config = RunConfig {
            max_workers: 0,
            ..Default::default()
        };
        assert!(matches!(
            config.validate(),
            Err(ConfigError::MaxWorkersTooLow(0))
        ));
    }

    #[test]
    fn test_zero_start_workers_rejected() {
        let config = RunConfig {
            start_workers: 0,
            ..Default::default()
        };
        assert!(matches!(
            config.validate(),
            Err(ConfigError::StartWorkersTooLow(0))
        ));
    }

    #[test]
    fn test_start_exceeding_max_rejected() {
        let config = RunConfig {
            max_workers: 4,
            start_workers: 5,
            ..Default::default()
        };
        assert!(matches!(
            config.validate(),
            Err(ConfigError::StartExceedsMax { start: 5, max: 4 })
        ));
    }

    #[test]
    fn test_primary_only_run_has_no_slots() {
        let config = RunConfig {
            max_workers: 1,
            ..Default::default()
        };
        assert!(config.validate().is_ok());
        assert_eq!(config.aux_slot_count(), 0);
    }
}
