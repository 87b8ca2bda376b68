use embassy_time::Duration;
use serde::{Deserialize, Serialize};

use crate::scheduler::DEFAULT_SAMPLE_INTERVAL;
use crate::storage::DEFAULT_LOG_FILE;
use crate::storage::gate::DEFAULT_BACKOFF;

#[derive(Serialize, Deserialize, Debug, Default)]
#[serde(bound(deserialize = "'de: 'a"))]
pub struct Config<'a> {
    #[serde(default)]
    pub internet: InternetConfig<'a>,
    #[serde(default)]
    pub logger: LoggerConfig<'a>,
    #[serde(default)]
    pub time_sync: TimeSyncConfig<'a>,
}

#[derive(Serialize, Deserialize, Debug, Default, Clone, Copy)]
pub struct InternetConfig<'a> {
    pub ssid: &'a str,
    pub password: &'a str,
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(default)]
pub struct LoggerConfig<'a> {
    pub sample_interval_secs: u64,
    /// How long a file operation waits when the card is missing.
    pub storage_backoff_ms: u64,
    /// 8.3 name of the log file in the volume's root directory.
    pub log_file: &'a str,
    pub http_port: u16,
}

impl LoggerConfig<'_> {
    pub fn sample_interval(&self) -> Duration {
        Duration::from_secs(self.sample_interval_secs)
    }

    pub fn storage_backoff(&self) -> Duration {
        Duration::from_millis(self.storage_backoff_ms)
    }
}

impl Default for LoggerConfig<'_> {
    fn default() -> Self {
        Self {
            sample_interval_secs: DEFAULT_SAMPLE_INTERVAL.as_secs(),
            storage_backoff_ms: DEFAULT_BACKOFF.as_millis(),
            log_file: DEFAULT_LOG_FILE,
            http_port: 80,
        }
    }
}

/// Network time service settings. Consumed by the platform's SNTP client.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(default)]
pub struct TimeSyncConfig<'a> {
    pub primary_server: &'a str,
    pub alternate_server: &'a str,
    pub refresh_interval_secs: u64,
    /// Query the servers right after boot instead of waiting a full refresh interval.
    pub force_sync_at_wake_up: bool,
}

impl TimeSyncConfig<'_> {
    pub fn refresh_interval(&self) -> Duration {
        Duration::from_secs(self.refresh_interval_secs)
    }

    /// Servers in the order they should be tried.
    pub fn servers(&self) -> [&str; 2] {
        [self.primary_server, self.alternate_server]
    }
}

impl Default for TimeSyncConfig<'_> {
    fn default() -> Self {
        Self {
            primary_server: "ntp.nasa.gov",
            alternate_server: "pool.ntp.org",
            refresh_interval_secs: 1800,
            force_sync_at_wake_up: true,
        }
    }
}
