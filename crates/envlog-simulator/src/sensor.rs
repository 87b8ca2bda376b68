use embassy_time::{Duration, Timer};
use envlog_core::sensors::{ClimateMeasurement, Sensor, SensorError};

/// How long a synthetic measurement takes, roughly a high-precision SHT40 read.
const MEASUREMENT_LATENCY: Duration = Duration::from_millis(250);

/// Generates synthetic climate readings that vary over time.
pub struct SyntheticSensor {
    /// Seconds of simulated time, advanced on every measurement.
    elapsed_secs: f64,
    step_secs: f64,
}

impl SyntheticSensor {
    pub fn new(step_secs: f64) -> Self {
        Self {
            elapsed_secs: 0.0,
            step_secs,
        }
    }

    fn next_measurement(&mut self) -> ClimateMeasurement {
        self.elapsed_secs += self.step_secs;
        let t = self.elapsed_secs;

        // Temperature: 20–26 °C sinusoidal with slow drift
        let temperature = 23.0 + 3.0 * (t / 1200.0).sin() + 0.5 * (t / 370.0).cos();

        // Humidity: 40–60 % with a different period
        let humidity = 50.0 + 10.0 * (t / 1800.0).sin() + 2.0 * (t / 230.0).cos();

        ClimateMeasurement {
            temperature_celsius: temperature as f32,
            relative_humidity_percent: humidity as f32,
        }
    }
}

impl Sensor for SyntheticSensor {
    async fn measure(&mut self) -> Result<ClimateMeasurement, SensorError> {
        Timer::after(MEASUREMENT_LATENCY).await;
        Ok(self.next_measurement())
    }
}
