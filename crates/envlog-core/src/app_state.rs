//! Application-wide state for the logger.
//!
//! Everything the tasks share lives in one [`LoggerContext`]. The platform
//! gives it a `'static` home once at start-up and every task borrows from it.
//! The clock is borrowed rather than owned so the storage driver can stamp
//! files from the same clock.

use log::info;

use crate::config::LoggerConfig;
use crate::control::ControlSurface;
use crate::reading::{ReadingStore, Timestamp};
use crate::sampling::{MeasurementTrigger, SensorSampler};
use crate::scheduler::LoggingScheduler;
use crate::sensors::Sensor;
use crate::storage::{LogVolume, PersistentLog, StorageGate, StorageMedium};
use crate::time_sync::{TimeSyncTracker, WallClock};

pub struct LoggerContext<'c, V, M> {
    pub readings: ReadingStore,
    pub trigger: MeasurementTrigger,
    pub log: PersistentLog<V, M>,
    pub time_sync: TimeSyncTracker,
    pub clock: &'c WallClock,
    config: LoggerConfig<'c>,
}

impl<'c, V: LogVolume, M: StorageMedium> LoggerContext<'c, V, M> {
    pub fn new(volume: V, medium: M, clock: &'c WallClock, config: LoggerConfig<'c>) -> Self {
        let gate = StorageGate::new(medium, config.storage_backoff());

        Self {
            readings: ReadingStore::new(),
            trigger: MeasurementTrigger::new(),
            log: PersistentLog::new(volume, gate, config.log_file),
            time_sync: TimeSyncTracker::new(),
            clock,
            config,
        }
    }

    /// The network time service answered with `now`.
    pub fn on_time_synchronized(&self, now: Timestamp) {
        self.clock.synchronize(now);
        self.time_sync.on_sync_succeeded();
        info!("Clock set to {}", now);
    }

    pub fn on_time_sync_failed(&self, code: i32) {
        self.time_sync.on_sync_failed(code);
    }

    pub fn sampler<S: Sensor>(&self, sensor: S) -> SensorSampler<'_, S, WallClock> {
        SensorSampler::new(sensor, &self.trigger, &self.readings, self.clock)
    }

    pub fn scheduler(&self) -> LoggingScheduler<'_, MeasurementTrigger, V, M> {
        LoggingScheduler::new(
            &self.trigger,
            &self.readings,
            &self.log,
            self.config.sample_interval(),
        )
    }

    pub fn control_surface(&self) -> ControlSurface<'_, MeasurementTrigger, V, M> {
        ControlSurface::new(&self.trigger, &self.readings, &self.log)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::control::{CapturedResponse, LOG_CLEARED_MESSAGE, Operation};
    use crate::sensors::ScriptedSensor;
    use crate::storage::{DEFAULT_LOG_FILE, MediumSwitch, RamVolume};
    use crate::time_sync::Clock;
    use chrono::NaiveDate;
    use core::cell::RefCell;
    use embassy_futures::block_on;
    use embassy_futures::select::select;
    use embassy_time::{Duration, Timer};
    use std::string::String;

    fn config() -> LoggerConfig<'static> {
        LoggerConfig {
            sample_interval_secs: 1,
            storage_backoff_ms: 10,
            ..LoggerConfig::default()
        }
    }

    fn t1() -> Timestamp {
        NaiveDate::from_ymd_opt(2024, 5, 17)
            .and_then(|d| d.and_hms_opt(14, 30, 0))
            .map(Timestamp::from_naive)
            .unwrap()
    }

    fn request<V: LogVolume, M: StorageMedium>(
        context: &LoggerContext<'_, V, M>,
        operation: Operation,
    ) -> String {
        let cell = RefCell::new(None);
        block_on(
            context
                .control_surface()
                .handle(operation, CapturedResponse::new(&cell)),
        )
        .unwrap();
        cell.into_inner().unwrap()
    }

    #[test]
    fn test_time_sync_callbacks() {
        let volume = RamVolume::new();
        let switch = MediumSwitch::new(true);
        let clock = WallClock::new();
        let context = LoggerContext::new(&volume, &switch, &clock, config());

        assert!(!context.time_sync.is_synchronized());
        context.on_time_sync_failed(-2);
        assert!(!context.time_sync.is_synchronized());

        context.on_time_synchronized(t1());
        assert!(context.time_sync.is_synchronized());
        assert!(context.clock.now() >= t1());

        context.on_time_sync_failed(-2);
        assert!(context.time_sync.is_synchronized());
    }

    #[test]
    fn test_completed_sample_is_logged_on_tick() {
        let volume = RamVolume::new();
        let switch = MediumSwitch::new(true);
        let clock = WallClock::new();
        let context = LoggerContext::new(&volume, &switch, &clock, config());
        context.on_time_synchronized(t1());

        let mut sampler = context.sampler(ScriptedSensor::returning(21.5, 45.0));
        let captured = block_on(sampler.measure_once()).unwrap();
        assert!(captured.captured_at >= t1());

        block_on(context.scheduler().tick()).unwrap();

        let log = request(&context, Operation::GetLog);
        assert_eq!(log, std::format!("21.50,45.00,{}\r\n", captured.captured_at));
        assert!(log.starts_with("21.50,45.00,05/17/2024 14:3"));
    }

    #[test]
    fn test_clearlog_then_getlog() {
        let volume = RamVolume::new();
        let switch = MediumSwitch::new(true);
        let clock = WallClock::new();
        let context = LoggerContext::new(&volume, &switch, &clock, config());

        block_on(context.scheduler().tick()).unwrap();
        assert_eq!(request(&context, Operation::ClearLog), LOG_CLEARED_MESSAGE);
        assert_eq!(request(&context, Operation::GetLog), "");
    }

    #[test]
    fn test_removed_card_reports_sentinel() {
        let volume = RamVolume::new();
        let switch = MediumSwitch::new(true);
        let clock = WallClock::new();
        let context = LoggerContext::new(&volume, &switch, &clock, config());

        block_on(context.scheduler().tick()).unwrap();
        switch.remove();
        assert_eq!(request(&context, Operation::GetLog), "No SD card detected.");
    }

    #[test]
    fn test_getreading_before_first_completion() {
        let volume = RamVolume::new();
        let switch = MediumSwitch::new(true);
        let clock = WallClock::new();
        let context = LoggerContext::new(&volume, &switch, &clock, config());

        assert_eq!(
            request(&context, Operation::GetReading),
            "0.00,0.00,01/01/0001 00:00:00"
        );
    }

    #[test]
    fn test_getreading_lags_behind_its_own_request() {
        let volume = RamVolume::new();
        let switch = MediumSwitch::new(true);
        let clock = WallClock::new();
        let context = LoggerContext::new(&volume, &switch, &clock, config());
        let mut sampler = context.sampler(
            ScriptedSensor::returning(25.0, 55.0).with_latency(Duration::from_millis(50)),
        );

        block_on(select(sampler.run(), async {
            // First request is answered with the initial reading
            assert_eq!(
                request(&context, Operation::GetReading),
                "0.00,0.00,01/01/0001 00:00:00"
            );

            Timer::after(Duration::from_millis(200)).await;
            assert!(request(&context, Operation::GetReading).starts_with("25.00,55.00,"));
        }));
    }

    #[test]
    fn test_first_logged_line_is_a_real_reading() {
        let volume = RamVolume::new();
        let switch = MediumSwitch::new(true);
        let clock = WallClock::new();
        let context = LoggerContext::new(&volume, &switch, &clock, config());
        let mut sampler = context.sampler(
            ScriptedSensor::returning(21.5, 45.0).with_latency(Duration::from_millis(50)),
        );
        let scheduler = context.scheduler();

        block_on(select(select(sampler.run(), scheduler.run()), async {
            for _ in 0..150 {
                if volume.contents(DEFAULT_LOG_FILE).is_some() {
                    break;
                }
                Timer::after(Duration::from_millis(10)).await;
            }
        }));

        let log = request(&context, Operation::GetLog);
        let first = log.lines().next().expect("nothing logged");
        assert!(first.starts_with("21.50,45.00,"), "first line was {first}");
    }

    #[test]
    fn test_context_uses_configured_file() {
        let volume = RamVolume::new();
        let switch = MediumSwitch::new(true);
        let clock = WallClock::new();
        let context = LoggerContext::new(
            &volume,
            &switch,
            &clock,
            LoggerConfig {
                log_file: "LAB.LOG",
                ..config()
            },
        );

        block_on(context.scheduler().tick()).unwrap();
        assert!(volume.contents("LAB.LOG").is_some());
        assert_eq!(volume.contents(DEFAULT_LOG_FILE), None);
        assert_eq!(context.scheduler().interval(), Duration::from_secs(1));
    }
}
