//! Sensor driver seam.
//!
//! The engine only ever asks for one combined temperature/humidity
//! measurement. Drivers live behind feature flags so hosts without the
//! hardware crates still build.

#[cfg(feature = "sensor-sht40")]
mod sht40;

use core::future::Future;

use thiserror_no_std::Error;

#[cfg(feature = "sensor-sht40")]
pub use sht40::Sht40Sensor;

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum SensorError {
    #[error("{sensor} failed to {operation}: {details}")]
    ReadFailed {
        sensor: &'static str,
        operation: &'static str,
        details: &'static str,
    },
    #[error("{sensor} timed out while trying to {operation}")]
    Timeout {
        sensor: &'static str,
        operation: &'static str,
    },
}

/// One completed measurement, before it is stamped with a capture time.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ClimateMeasurement {
    pub temperature_celsius: f32,
    pub relative_humidity_percent: f32,
}

/// Temperature/humidity sensor.
pub trait Sensor {
    /// Run one measurement to completion.
    fn measure(&mut self) -> impl Future<Output = Result<ClimateMeasurement, SensorError>>;
}

/// Sensor double that replays a script of results, then repeats a fallback.
#[cfg(test)]
pub(crate) struct ScriptedSensor {
    script: std::collections::VecDeque<Result<ClimateMeasurement, SensorError>>,
    fallback: Option<ClimateMeasurement>,
    latency: embassy_time::Duration,
    pub(crate) calls: usize,
}

#[cfg(test)]
impl ScriptedSensor {
    pub(crate) fn returning(temperature_celsius: f32, relative_humidity_percent: f32) -> Self {
        Self {
            script: Default::default(),
            fallback: Some(ClimateMeasurement {
                temperature_celsius,
                relative_humidity_percent,
            }),
            latency: embassy_time::Duration::from_ticks(0),
            calls: 0,
        }
    }

    pub(crate) fn scripted(
        script: impl IntoIterator<Item = Result<ClimateMeasurement, SensorError>>,
    ) -> Self {
        Self {
            script: script.into_iter().collect(),
            fallback: None,
            latency: embassy_time::Duration::from_ticks(0),
            calls: 0,
        }
    }

    pub(crate) fn with_latency(mut self, latency: embassy_time::Duration) -> Self {
        self.latency = latency;
        self
    }
}

#[cfg(test)]
impl Sensor for ScriptedSensor {
    async fn measure(&mut self) -> Result<ClimateMeasurement, SensorError> {
        self.calls += 1;
        if self.latency.as_ticks() > 0 {
            embassy_time::Timer::after(self.latency).await;
        }

        match self.script.pop_front() {
            Some(result) => result,
            None => self.fallback.ok_or(SensorError::Timeout {
                sensor: "scripted",
                operation: "replay measurement",
            }),
        }
    }
}
