// Telemetry task
// Posts the latest reading every send period. Pauses on request of the update
// coordinator; every cycle runs inside a PauseGate cycle guard so the pause can
// be confirmed before a download starts.

use std::sync::Arc;
use std::time::Duration;

use super::{CycleFlow, PauseGate, PeriodicTask};
use crate::config::AgentConfig;
use crate::network::{TelemetryMessage, Transport, TransportError};
use crate::state::AppState;
use crate::system::RuntimeInfo;

#[derive(Debug, Clone, PartialEq)]
pub enum SendOutcome {
    Paused,
    Offline,
    UpdateInProgress,
    NoReading,
    /// Delivered; carries the new send count
    Sent(u32),
    Failed(TransportError),
}

pub struct TelemetryReporter<T: Transport> {
    config: Arc<AgentConfig>,
    state: Arc<AppState>,
    gate: Arc<PauseGate>,
    runtime: Arc<dyn RuntimeInfo>,
    transport: T,
}

impl<T: Transport> TelemetryReporter<T> {
    pub fn new(
        config: Arc<AgentConfig>,
        state: Arc<AppState>,
        gate: Arc<PauseGate>,
        runtime: Arc<dyn RuntimeInfo>,
        transport: T,
    ) -> Self {
        Self {
            config,
            state,
            gate,
            runtime,
            transport,
        }
    }

    pub fn send_once(&mut self) -> SendOutcome {
        let gate = self.gate.clone();
        let Some(_cycle) = gate.enter_cycle() else {
            log::debug!("Telemetry paused for update");
            return SendOutcome::Paused;
        };

        let snapshot = self.state.snapshot();
        if !snapshot.connectivity {
            log::debug!("No connectivity, skipping send");
            return SendOutcome::Offline;
        }
        if snapshot.update_in_progress {
            log::debug!("Update in progress, skipping send");
            return SendOutcome::UpdateInProgress;
        }
        let Some(reading) = snapshot.latest else {
            log::debug!("No reading yet, nothing to send");
            return SendOutcome::NoReading;
        };

        let message = TelemetryMessage {
            device_id: self.config.device_id.clone(),
            device_type: self.config.device_type.clone(),
            firmware_version: self.config.firmware_version.clone(),
            timestamp: reading.timestamp,
            temperature: reading.temperature,
            humidity: reading.humidity,
            reading_count: snapshot.reading_count,
            uptime: self.runtime.monotonic_secs(),
            ota_in_progress: snapshot.update_in_progress,
        };

        match self.transport.post_reading(&message) {
            Ok(()) => {
                let count = self.state.record_send();
                log::info!("Data sent successfully (#{})", count);
                SendOutcome::Sent(count)
            }
            Err(e) => {
                log::warn!("Failed to send data: {}", e);
                SendOutcome::Failed(e)
            }
        }
    }
}

impl<T: Transport + 'static> PeriodicTask for TelemetryReporter<T> {
    fn period(&self) -> Duration {
        self.config.send_period()
    }

    fn run_cycle(&mut self) -> CycleFlow {
        self.send_once();
        CycleFlow::Continue
    }
}
