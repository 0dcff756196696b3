// Simulated temperature/humidity pair used until the probe drivers are fitted
// and for host runs. Values follow slow sine drifts around a freezer set point.

use std::time::Instant;

use super::{SensorDriver, SensorError};

pub struct SimulatedSensor {
    started: Instant,
    base_temperature: f32,
    base_humidity: f32,
}

impl SimulatedSensor {
    pub fn new() -> Self {
        log::info!("Using simulated temperature/humidity sensor");
        Self {
            started: Instant::now(),
            base_temperature: -18.5,
            base_humidity: 65.0,
        }
    }

    fn elapsed_ms(&self) -> f64 {
        self.started.elapsed().as_millis() as f64
    }
}

impl Default for SimulatedSensor {
    fn default() -> Self {
        Self::new()
    }
}

impl SensorDriver for SimulatedSensor {
    fn read_temperature(&mut self) -> Result<f32, SensorError> {
        let t = self.elapsed_ms();
        let slow_variation = ((t / 300_000.0).sin() * 0.5) as f32;
        let fast_variation = ((t / 20_000.0).sin() * 0.2) as f32;
        Ok(self.base_temperature + slow_variation + fast_variation)
    }

    fn read_humidity(&mut self) -> Result<f32, SensorError> {
        let t = self.elapsed_ms();
        Ok(self.base_humidity + ((t / 120_000.0).cos() * 1.0) as f32)
    }
}
