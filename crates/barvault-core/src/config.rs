use std::env;
use std::str::FromStr;
use std::time::Duration;

use time::Weekday;

/// Settings for [`crate::SyncCoordinator`] and [`crate::SyncScheduler`].
#[derive(Debug, Clone, PartialEq)]
pub struct SyncConfig {
    /// Depth of the first fetch for a symbol with no stored bars.
    pub history_years: u16,
    pub max_workers: usize,
    pub quota_window: Duration,
    pub quota_limit: u32,
    pub fetch_timeout: Duration,
    pub cycle_interval: Duration,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            history_years: 15,
            max_workers: 4,
            quota_window: Duration::from_secs(60),
            quota_limit: 30,
            fetch_timeout: Duration::from_secs(30),
            cycle_interval: Duration::from_secs(86_400),
        }
    }
}

impl SyncConfig {
    /// Defaults overlaid with any `BARVAULT_*` variables that parse.
    pub fn from_env() -> Self {
        let mut config = Self::default();
        if let Some(years) = env_value::<u16>("BARVAULT_HISTORY_YEARS") {
            config.history_years = years;
        }
        if let Some(workers) = env_value::<usize>("BARVAULT_MAX_WORKERS") {
            config.max_workers = workers;
        }
        if let Some(seconds) = env_value::<u64>("BARVAULT_FETCH_TIMEOUT_SECS") {
            config.fetch_timeout = Duration::from_secs(seconds);
        }
        if let Some(seconds) = env_value::<u64>("BARVAULT_CYCLE_INTERVAL_SECS") {
            config.cycle_interval = Duration::from_secs(seconds);
        }
        config
    }

    pub fn worker_count(&self) -> usize {
        self.max_workers.max(1)
    }

    pub fn history_days(&self) -> i64 {
        i64::from(self.history_years) * 365
    }
}

/// Calendar rules applied by [`crate::Aggregator`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AggregatorConfig {
    pub week_start: Weekday,
}

impl Default for AggregatorConfig {
    fn default() -> Self {
        Self {
            week_start: Weekday::Monday,
        }
    }
}

fn env_value<T: FromStr>(key: &str) -> Option<T> {
    env::var(key).ok()?.trim().parse().ok()
}
