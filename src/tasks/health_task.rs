// Health monitor task
// Lowest priority. Samples free memory, sets the healthy flag and logs a status
// line. Only ever writes `system_healthy`.

use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;

use super::{CycleFlow, PeriodicTask};
use crate::config::AgentConfig;
use crate::state::AppState;
use crate::system::clock::format_uptime;
use crate::system::RuntimeInfo;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HealthReport {
    /// `None` when the runtime could not report it
    pub free_memory: Option<u64>,
    pub healthy: bool,
    pub reading_count: u32,
    pub send_count: u32,
    pub update_check_count: u32,
    pub alarm_count: u32,
    pub stored_readings: usize,
    pub dropped_readings: u32,
    pub update_in_progress: bool,
    pub connectivity: bool,
    pub uptime: u64,
}

pub struct HealthMonitor {
    config: Arc<AgentConfig>,
    state: Arc<AppState>,
    runtime: Arc<dyn RuntimeInfo>,
}

impl HealthMonitor {
    pub fn new(
        config: Arc<AgentConfig>,
        state: Arc<AppState>,
        runtime: Arc<dyn RuntimeInfo>,
    ) -> Self {
        Self {
            config,
            state,
            runtime,
        }
    }

    pub fn check_once(&self) -> HealthReport {
        let free_memory = self.runtime.free_memory_bytes();
        let threshold = self.config.low_memory_threshold;
        let healthy = free_memory.is_some_and(|free| free >= threshold);
        self.state.set_system_healthy(healthy);

        let snapshot = self.state.snapshot();
        let report = HealthReport {
            free_memory,
            healthy,
            reading_count: snapshot.reading_count,
            send_count: snapshot.send_count,
            update_check_count: snapshot.update_check_count,
            alarm_count: snapshot.alarm_count,
            stored_readings: snapshot.stored_readings,
            dropped_readings: snapshot.dropped_readings,
            update_in_progress: snapshot.update_in_progress,
            connectivity: snapshot.connectivity,
            uptime: self.runtime.monotonic_secs(),
        };

        match free_memory {
            Some(free) if !healthy => {
                log::warn!("Low memory: {} bytes free (threshold {})", free, threshold)
            }
            None => log::warn!("Free memory unavailable, reporting unhealthy"),
            _ => {}
        }
        log::info!(
            "Health - Heap: {} | Readings: {} | Sent: {} | OTA checks: {} | Alarms: {} | Stored: {} ({} dropped) | OTA: {} | WiFi: {} | Up: {}",
            free_memory.map_or_else(|| "n/a".to_string(), |free| free.to_string()),
            report.reading_count,
            report.send_count,
            report.update_check_count,
            report.alarm_count,
            report.stored_readings,
            report.dropped_readings,
            if report.update_in_progress { "active" } else { "idle" },
            if report.connectivity { "up" } else { "down" },
            format_uptime(report.uptime)
        );

        report
    }
}

impl PeriodicTask for HealthMonitor {
    fn period(&self) -> Duration {
        self.config.health_period()
    }

    fn run_cycle(&mut self) -> CycleFlow {
        self.check_once();
        CycleFlow::Continue
    }
}
