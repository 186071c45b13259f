use std::convert::TryFrom;
use std::time::Duration;

#[derive(Clone, Debug, Default)]
pub struct LeaderOptions {
    /// Byte budget for the entries of a single AppendEntries request.
    pub threshold_network_batch_size: Option<usize>,
    /// Number of released entries that triggers an automatic compaction.
    pub threshold_log_compaction: Option<u64>,
    /// Commit lag after which quick-status reports why the commit index is stuck.
    pub commit_lag_alert_threshold: Option<Duration>,
}

#[derive(Clone, Debug)]
pub struct LeaderOptionsValidated {
    pub threshold_network_batch_size: usize,
    pub threshold_log_compaction: u64,
    pub commit_lag_alert_threshold: Duration,
}

impl LeaderOptionsValidated {
    fn validate(&self) -> Result<(), &'static str> {
        if self.threshold_network_batch_size == 0 {
            return Err("Network batch size threshold must be greater than zero");
        }
        if self.commit_lag_alert_threshold.is_zero() {
            return Err("Commit lag alert threshold must be greater than zero");
        }

        Ok(())
    }
}

impl Default for LeaderOptionsValidated {
    fn default() -> Self {
        LeaderOptionsValidated {
            threshold_network_batch_size: 1024 * 1024,
            threshold_log_compaction: 1000,
            commit_lag_alert_threshold: Duration::from_secs(20),
        }
    }
}

impl TryFrom<LeaderOptions> for LeaderOptionsValidated {
    type Error = &'static str;

    fn try_from(options: LeaderOptions) -> Result<Self, Self::Error> {
        let defaults = LeaderOptionsValidated::default();
        let values = LeaderOptionsValidated {
            threshold_network_batch_size: options
                .threshold_network_batch_size
                .unwrap_or(defaults.threshold_network_batch_size),
            threshold_log_compaction: options
                .threshold_log_compaction
                .unwrap_or(defaults.threshold_log_compaction),
            commit_lag_alert_threshold: options
                .commit_lag_alert_threshold
                .unwrap_or(defaults.commit_lag_alert_threshold),
        };

        values.validate()?;
        Ok(values)
    }
}
