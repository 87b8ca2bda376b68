//! Two-stage sensor acquisition.
//!
//! Requesting a measurement only raises a signal; the sampler task picks it
//! up, talks to the sensor and publishes the result into the
//! [`ReadingStore`]. A caller that requests and then immediately reads the
//! store gets the most recently *completed* reading, which may predate its
//! own request.

use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::signal::Signal;
use log::{debug, error, info};

use crate::reading::{Reading, ReadingStore};
use crate::sensors::{Sensor, SensorError};
use crate::time_sync::Clock;

/// Fire-and-forget measurement requests.
pub trait MeasurementSource {
    /// Returns immediately; the result lands in the store some time later.
    fn request_measurement(&self);
}

/// Pending-measurement flag shared by the requesters and the sampler.
///
/// Requests raised while a measurement is already in flight coalesce into a
/// single follow-up measurement.
pub struct MeasurementTrigger {
    signal: Signal<CriticalSectionRawMutex, ()>,
}

impl MeasurementTrigger {
    pub const fn new() -> Self {
        Self {
            signal: Signal::new(),
        }
    }

    /// Wait for the next request and consume it.
    pub async fn wait(&self) {
        self.signal.wait().await;
    }

    pub fn is_pending(&self) -> bool {
        self.signal.signaled()
    }
}

impl Default for MeasurementTrigger {
    fn default() -> Self {
        Self::new()
    }
}

impl MeasurementSource for MeasurementTrigger {
    fn request_measurement(&self) {
        self.signal.signal(());
    }
}

/// Completion side of the acquisition: the only writer of the [`ReadingStore`].
pub struct SensorSampler<'a, S, C> {
    sensor: S,
    trigger: &'a MeasurementTrigger,
    store: &'a ReadingStore,
    clock: &'a C,
}

impl<'a, S: Sensor, C: Clock> SensorSampler<'a, S, C> {
    pub fn new(
        sensor: S,
        trigger: &'a MeasurementTrigger,
        store: &'a ReadingStore,
        clock: &'a C,
    ) -> Self {
        Self {
            sensor,
            trigger,
            store,
            clock,
        }
    }

    /// Measure now, stamp the result at completion and publish it.
    ///
    /// On failure the store keeps its previous reading.
    pub async fn measure_once(&mut self) -> Result<Reading, SensorError> {
        let measurement = self.sensor.measure().await?;
        let reading = Reading::new(
            measurement.temperature_celsius,
            measurement.relative_humidity_percent,
            self.clock.now(),
        );

        self.store.update(reading);
        debug!("Measurement complete: {}", reading);

        Ok(reading)
    }

    /// Serve measurement requests forever.
    pub async fn run(&mut self) -> ! {
        info!("Sensor sampler started");

        loop {
            self.trigger.wait().await;

            if let Err(e) = self.measure_once().await {
                error!("Measurement failed, keeping previous reading: {}", e);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reading::Timestamp;
    use crate::sensors::{ClimateMeasurement, ScriptedSensor};
    use crate::time_sync::FixedClock;
    use chrono::NaiveDate;
    use embassy_futures::block_on;
    use embassy_futures::select::select;
    use embassy_time::{Duration, Timer};

    fn t1() -> Timestamp {
        NaiveDate::from_ymd_opt(2024, 5, 17)
            .and_then(|d| d.and_hms_opt(14, 30, 0))
            .map(Timestamp::from_naive)
            .unwrap()
    }

    fn ok(t: f32, h: f32) -> Result<ClimateMeasurement, SensorError> {
        Ok(ClimateMeasurement {
            temperature_celsius: t,
            relative_humidity_percent: h,
        })
    }

    #[test]
    fn test_measure_once_stamps_and_publishes() {
        let trigger = MeasurementTrigger::new();
        let store = ReadingStore::new();
        let clock = FixedClock(t1());
        let mut sampler =
            SensorSampler::new(ScriptedSensor::returning(21.5, 45.0), &trigger, &store, &clock);

        let reading = block_on(sampler.measure_once()).unwrap();
        assert_eq!(reading, Reading::new(21.5, 45.0, t1()));
        assert_eq!(store.snapshot(), reading);
    }

    #[test]
    fn test_failed_measurement_keeps_previous_reading() {
        let trigger = MeasurementTrigger::new();
        let store = ReadingStore::new();
        let clock = FixedClock(t1());
        let sensor = ScriptedSensor::scripted([
            ok(20.0, 40.0),
            Err(SensorError::ReadFailed {
                sensor: "scripted",
                operation: "measure",
                details: "bus fault",
            }),
        ]);
        let mut sampler = SensorSampler::new(sensor, &trigger, &store, &clock);

        block_on(sampler.measure_once()).unwrap();
        assert!(block_on(sampler.measure_once()).is_err());
        assert_eq!(store.snapshot(), Reading::new(20.0, 40.0, t1()));
        assert_eq!(sampler.sensor.calls, 2);
    }

    #[test]
    fn test_requests_coalesce_while_pending() {
        let trigger = MeasurementTrigger::new();
        assert!(!trigger.is_pending());

        trigger.request_measurement();
        trigger.request_measurement();
        trigger.request_measurement();
        assert!(trigger.is_pending());

        block_on(trigger.wait());
        assert!(!trigger.is_pending());
    }

    #[test]
    fn test_run_serves_requests() {
        let trigger = MeasurementTrigger::new();
        let store = ReadingStore::new();
        let clock = FixedClock(t1());
        let mut sampler =
            SensorSampler::new(ScriptedSensor::returning(18.25, 60.5), &trigger, &store, &clock);

        block_on(select(sampler.run(), async {
            trigger.request_measurement();
            for _ in 0..100 {
                if store.snapshot() != Reading::default() {
                    break;
                }
                Timer::after(Duration::from_millis(5)).await;
            }
        }));

        assert_eq!(store.snapshot(), Reading::new(18.25, 60.5, t1()));
    }

    #[test]
    fn test_burst_of_requests_measures_once() {
        let trigger = MeasurementTrigger::new();
        let store = ReadingStore::new();
        let clock = FixedClock(t1());
        let mut sampler =
            SensorSampler::new(ScriptedSensor::returning(18.25, 60.5), &trigger, &store, &clock);

        trigger.request_measurement();
        trigger.request_measurement();
        trigger.request_measurement();
        block_on(select(sampler.run(), Timer::after(Duration::from_millis(50))));

        assert_eq!(sampler.sensor.calls, 1);
        assert_eq!(store.snapshot(), Reading::new(18.25, 60.5, t1()));
    }

    #[test]
    fn test_request_then_snapshot_sees_previous_completion() {
        let trigger = MeasurementTrigger::new();
        let store = ReadingStore::new();
        let clock = FixedClock(t1());
        let sensor = ScriptedSensor::returning(30.0, 70.0).with_latency(Duration::from_millis(50));
        let mut sampler = SensorSampler::new(sensor, &trigger, &store, &clock);

        block_on(select(sampler.run(), async {
            trigger.request_measurement();
            // The measurement is still in flight
            assert_eq!(store.snapshot(), Reading::default());

            Timer::after(Duration::from_millis(200)).await;
            assert_eq!(store.snapshot(), Reading::new(30.0, 70.0, t1()));
        }));
    }
}
