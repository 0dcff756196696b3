// Sensor abstraction layer for the temperature/humidity pair

use anyhow::{bail, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

pub mod backlog;
pub mod simulated;

pub use backlog::{OfflineBacklog, ReadingStore, StoreError};
pub use simulated::SimulatedSensor;

/// Driver for the temperature/humidity sensor pair.
///
/// Drivers own the bus timeout: a read must give up with `ReadFailed` rather
/// than block past `sensor_timeout_ms`. The sampler cannot interrupt a read in
/// flight; it times the pair afterwards and rejects it with `Timeout` when the
/// two reads together overran the limit.
pub trait SensorDriver: Send {
    /// Degrees Celsius
    fn read_temperature(&mut self) -> Result<f32, SensorError>;

    /// Relative humidity in percent
    fn read_humidity(&mut self) -> Result<f32, SensorError>;
}

#[derive(Debug, Clone, PartialEq)]
pub enum SensorError {
    ReadFailed(&'static str),
    OutOfRange(f32),
    Timeout(Duration),
}

impl fmt::Display for SensorError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SensorError::ReadFailed(what) => write!(f, "{} read failed", what),
            SensorError::OutOfRange(value) => write!(f, "implausible sensor value {}", value),
            SensorError::Timeout(elapsed) => write!(f, "sensor read overran its timeout ({:?})", elapsed),
        }
    }
}

impl std::error::Error for SensorError {}

/// One successful sample of both sensors.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize)]
pub struct Reading {
    pub temperature: f32,
    pub humidity: f32,
    /// Monotonic seconds since boot
    pub timestamp: u64,
}

/// Acceptable ranges for a cold-chain reading.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct AlarmLimits {
    pub temp_min: f32,
    pub temp_max: f32,
    pub humidity_min: f32,
    pub humidity_max: f32,
}

impl Default for AlarmLimits {
    fn default() -> Self {
        Self {
            temp_min: -25.0,
            temp_max: -10.0,
            humidity_min: 40.0,
            humidity_max: 80.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Alarm {
    TemperatureLow(f32),
    TemperatureHigh(f32),
    HumidityLow(f32),
    HumidityHigh(f32),
}

impl fmt::Display for Alarm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Alarm::TemperatureLow(t) => write!(f, "temperature {:.2}°C below limit", t),
            Alarm::TemperatureHigh(t) => write!(f, "temperature {:.2}°C above limit", t),
            Alarm::HumidityLow(h) => write!(f, "humidity {:.2}% below limit", h),
            Alarm::HumidityHigh(h) => write!(f, "humidity {:.2}% above limit", h),
        }
    }
}

impl AlarmLimits {
    pub fn validate(&self) -> Result<()> {
        if self.temp_min >= self.temp_max {
            bail!("alarm temp_min must be below temp_max");
        }
        if self.humidity_min >= self.humidity_max {
            bail!("alarm humidity_min must be below humidity_max");
        }
        Ok(())
    }

    /// Limits are inclusive: a value exactly on a limit is not an alarm.
    pub fn check(&self, reading: &Reading) -> Vec<Alarm> {
        let mut alarms = Vec::new();
        if reading.temperature < self.temp_min {
            alarms.push(Alarm::TemperatureLow(reading.temperature));
        } else if reading.temperature > self.temp_max {
            alarms.push(Alarm::TemperatureHigh(reading.temperature));
        }
        if reading.humidity < self.humidity_min {
            alarms.push(Alarm::HumidityLow(reading.humidity));
        } else if reading.humidity > self.humidity_max {
            alarms.push(Alarm::HumidityHigh(reading.humidity));
        }
        alarms
    }
}
