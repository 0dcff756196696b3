// Sensor sampling task
// Highest priority. Reads the temperature/humidity pair every sample period and
// publishes it to the shared state; update activity never pauses it.

use std::sync::Arc;
use std::time::{Duration, Instant};

use super::{CycleFlow, PeriodicTask};
use crate::config::AgentConfig;
use crate::sensors::{OfflineBacklog, Reading, ReadingStore, SensorDriver, SensorError};
use crate::state::AppState;
use crate::system::RuntimeInfo;

#[derive(Debug, Clone, PartialEq)]
pub enum SampleOutcome {
    /// Startup has not marked the sensors ready yet
    NotReady,
    /// Stored; carries the new reading count
    Recorded(u32),
    Failed(SensorError),
}

pub struct SensorSampler<D: SensorDriver, S: ReadingStore = OfflineBacklog> {
    config: Arc<AgentConfig>,
    state: Arc<AppState>,
    runtime: Arc<dyn RuntimeInfo>,
    driver: D,
    store: S,
}

impl<D: SensorDriver> SensorSampler<D> {
    pub fn new(
        config: Arc<AgentConfig>,
        state: Arc<AppState>,
        runtime: Arc<dyn RuntimeInfo>,
        driver: D,
    ) -> Self {
        Self::with_store(config, state, runtime, driver, OfflineBacklog::new())
    }
}

impl<D: SensorDriver, S: ReadingStore> SensorSampler<D, S> {
    pub fn with_store(
        config: Arc<AgentConfig>,
        state: Arc<AppState>,
        runtime: Arc<dyn RuntimeInfo>,
        driver: D,
        store: S,
    ) -> Self {
        Self {
            config,
            state,
            runtime,
            driver,
            store,
        }
    }

    /// One sampling cycle. A failed read leaves the shared state untouched.
    pub fn sample_once(&mut self) -> SampleOutcome {
        if !self.state.sensors_ready() {
            log::debug!("Sensors not ready, skipping sample");
            return SampleOutcome::NotReady;
        }

        let reading = match self.acquire() {
            Ok(reading) => reading,
            Err(e) => {
                log::warn!("Sensor read failed: {}", e);
                return SampleOutcome::Failed(e);
            }
        };

        let count = self.state.record_reading(reading);
        log::info!(
            "Reading #{} - T:{:.2}°C H:{:.2}%",
            count,
            reading.temperature,
            reading.humidity
        );

        let alarms = self.config.alarm_limits.check(&reading);
        if !alarms.is_empty() {
            for alarm in &alarms {
                log::warn!("ALARM: {}", alarm);
            }
            self.state.record_alarms(alarms.len() as u32);
        }

        if let Err(e) = self.store.save_reading(&reading) {
            log::warn!("Failed to store reading: {}", e);
        }
        self.state
            .record_store_usage(self.store.len(), self.store.overwritten());

        SampleOutcome::Recorded(count)
    }

    fn acquire(&mut self) -> Result<Reading, SensorError> {
        let started = Instant::now();
        let temperature = self.driver.read_temperature()?;
        let humidity = self.driver.read_humidity()?;
        let elapsed = started.elapsed();

        if elapsed > self.config.sensor_timeout() {
            return Err(SensorError::Timeout(elapsed));
        }
        for value in [temperature, humidity] {
            if !value.is_finite() {
                return Err(SensorError::OutOfRange(value));
            }
        }

        Ok(Reading {
            temperature,
            humidity,
            timestamp: self.runtime.monotonic_secs(),
        })
    }
}

impl<D, S> PeriodicTask for SensorSampler<D, S>
where
    D: SensorDriver + 'static,
    S: ReadingStore + 'static,
{
    fn period(&self) -> Duration {
        self.config.sample_period()
    }

    fn run_cycle(&mut self) -> CycleFlow {
        self.sample_once();
        CycleFlow::Continue
    }
}
