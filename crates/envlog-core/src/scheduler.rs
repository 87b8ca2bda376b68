use embassy_time::{Duration, Ticker};
use log::{debug, error, info};

use crate::reading::{LogEntry, ReadingStore};
use crate::sampling::MeasurementSource;
use crate::storage::{AppendOutcome, LogVolume, PersistentLog, StorageError, StorageMedium};

/// Default period between logged readings.
pub const DEFAULT_SAMPLE_INTERVAL: Duration = Duration::from_secs(30);

/// Periodic writer: every tick requests a fresh measurement and logs the
/// most recently completed one.
///
/// Appends share the log lock with the control surface, so a tick can wait
/// behind a long `getlog` read.
pub struct LoggingScheduler<'a, T, V, M> {
    source: &'a T,
    store: &'a ReadingStore,
    log: &'a PersistentLog<V, M>,
    interval: Duration,
}

impl<'a, T, V, M> LoggingScheduler<'a, T, V, M>
where
    T: MeasurementSource,
    V: LogVolume,
    M: StorageMedium,
{
    pub fn new(
        source: &'a T,
        store: &'a ReadingStore,
        log: &'a PersistentLog<V, M>,
        interval: Duration,
    ) -> Self {
        Self {
            source,
            store,
            log,
            interval,
        }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// One logging cycle.
    pub async fn tick(&self) -> Result<AppendOutcome, StorageError> {
        self.source.request_measurement();

        // The request above has almost certainly not completed yet
        let reading = self.store.snapshot();
        self.log.append(&LogEntry::from(&reading)).await
    }

    pub async fn run(&self) -> ! {
        info!(
            "Logging to {} every {} s",
            self.log.file_name(),
            self.interval.as_secs()
        );

        // Have a completed reading ready for the first tick
        self.source.request_measurement();

        let mut ticker = Ticker::every(self.interval);
        loop {
            ticker.next().await;

            match self.tick().await {
                Ok(AppendOutcome::Written) => debug!("Logging cycle complete"),
                Ok(AppendOutcome::Skipped) => debug!("Logging cycle skipped, no storage"),
                Err(e) => error!("Logging cycle failed: {}", e),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reading::{Reading, Timestamp};
    use crate::sampling::MeasurementTrigger;
    use crate::storage::{DEFAULT_LOG_FILE, MediumSwitch, RamVolume, StorageGate};
    use chrono::NaiveDate;
    use embassy_futures::block_on;
    use embassy_futures::select::select;
    use embassy_time::{Instant, Timer};

    const BACKOFF: Duration = Duration::from_millis(20);

    fn t1() -> Timestamp {
        NaiveDate::from_ymd_opt(2024, 5, 17)
            .and_then(|d| d.and_hms_opt(14, 30, 0))
            .map(Timestamp::from_naive)
            .unwrap()
    }

    fn file_text(volume: &RamVolume) -> std::string::String {
        std::string::String::from_utf8(volume.contents(DEFAULT_LOG_FILE).unwrap_or_default())
            .unwrap()
    }

    #[test]
    fn test_tick_requests_and_logs_latest_reading() {
        let volume = RamVolume::new();
        let switch = MediumSwitch::new(true);
        let log = PersistentLog::new(&volume, StorageGate::new(&switch, BACKOFF), DEFAULT_LOG_FILE);
        let trigger = MeasurementTrigger::new();
        let store = ReadingStore::new();
        store.update(Reading::new(21.5, 45.0, t1()));

        let scheduler = LoggingScheduler::new(&trigger, &store, &log, DEFAULT_SAMPLE_INTERVAL);
        assert_eq!(block_on(scheduler.tick()), Ok(AppendOutcome::Written));

        assert!(trigger.is_pending());
        assert_eq!(file_text(&volume), "21.50,45.00,05/17/2024 14:30:00\r\n");
    }

    #[test]
    fn test_tick_without_storage_skips_after_backoff() {
        let volume = RamVolume::new();
        let switch = MediumSwitch::new(false);
        let log = PersistentLog::new(&volume, StorageGate::new(&switch, BACKOFF), DEFAULT_LOG_FILE);
        let trigger = MeasurementTrigger::new();
        let store = ReadingStore::new();

        let scheduler = LoggingScheduler::new(&trigger, &store, &log, DEFAULT_SAMPLE_INTERVAL);
        let start = Instant::now();
        assert_eq!(block_on(scheduler.tick()), Ok(AppendOutcome::Skipped));
        assert!(start.elapsed() >= BACKOFF);
        assert_eq!(volume.contents(DEFAULT_LOG_FILE), None);
    }

    #[test]
    fn test_run_appends_once_per_interval() {
        let volume = RamVolume::new();
        let switch = MediumSwitch::new(true);
        let log = PersistentLog::new(&volume, StorageGate::new(&switch, BACKOFF), DEFAULT_LOG_FILE);
        let trigger = MeasurementTrigger::new();
        let store = ReadingStore::new();
        let scheduler =
            LoggingScheduler::new(&trigger, &store, &log, Duration::from_millis(40));

        block_on(select(scheduler.run(), async {
            // Nothing is logged before the first full period, but a
            // measurement is already on its way
            Timer::after(Duration::from_millis(20)).await;
            assert_eq!(volume.contents(DEFAULT_LOG_FILE), None);
            assert!(trigger.is_pending());

            for _ in 0..200 {
                if file_text(&volume).lines().count() >= 3 {
                    break;
                }
                Timer::after(Duration::from_millis(5)).await;
            }
        }));

        let text = file_text(&volume);
        assert!(text.lines().count() >= 3);
        assert!(text.lines().all(|line| line == "0.00,0.00,01/01/0001 00:00:00"));
    }
}
