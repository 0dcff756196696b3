// Periodic task harness
// Each activity runs on its own thread with its own stack and FreeRTOS priority,
// sleeping between cycles so lower-priority work always gets the CPU.

use anyhow::Result;
use std::thread::{self, JoinHandle};
use std::time::Duration;

pub mod health_task;
pub mod pause;
pub mod sensor_task;
pub mod telemetry_task;
pub mod update_task;

pub use health_task::HealthMonitor;
pub use pause::{PauseGate, SuspendGuard};
pub use sensor_task::SensorSampler;
pub use telemetry_task::TelemetryReporter;
pub use update_task::UpdateCoordinator;

// Task priorities (higher number = higher priority)
pub const PRIORITY_SENSOR: u8 = 5;
pub const PRIORITY_TELEMETRY: u8 = 4;
pub const PRIORITY_UPDATE: u8 = 3;
pub const PRIORITY_CONNECTIVITY: u8 = 2;
pub const PRIORITY_HEALTH: u8 = 1;

// Stack sizes
pub const STACK_SIZE_DEFAULT: usize = 4096;
pub const STACK_SIZE_HTTP: usize = 8192;
pub const STACK_SIZE_OTA: usize = 10240;

// Desktop threads format logs and JSON on the same stack; FreeRTOS sizes are too tight there
#[cfg(not(target_os = "espidf"))]
const HOST_MIN_STACK: usize = 256 * 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CycleFlow {
    Continue,
    /// Leave the loop; only used once a restart has been issued
    Stop,
}

/// A unit of periodic work driven by [`spawn_periodic`].
pub trait PeriodicTask: Send + 'static {
    fn period(&self) -> Duration;

    fn initial_delay(&self) -> Duration {
        Duration::ZERO
    }

    /// One iteration. Must contain its own errors.
    fn run_cycle(&mut self) -> CycleFlow;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TaskSpec {
    pub name: &'static str,
    /// NUL-terminated copy of `name` for the FreeRTOS task table
    pub thread_name: &'static [u8],
    pub priority: u8,
    pub stack_size: usize,
}

impl TaskSpec {
    pub const SENSOR: TaskSpec = TaskSpec {
        name: "sensor_task",
        thread_name: b"sensor_task\0",
        priority: PRIORITY_SENSOR,
        stack_size: STACK_SIZE_DEFAULT,
    };

    pub const TELEMETRY: TaskSpec = TaskSpec {
        name: "data_send_task",
        thread_name: b"data_send_task\0",
        priority: PRIORITY_TELEMETRY,
        stack_size: STACK_SIZE_HTTP,
    };

    pub const UPDATE: TaskSpec = TaskSpec {
        name: "ota_check_task",
        thread_name: b"ota_check_task\0",
        priority: PRIORITY_UPDATE,
        stack_size: STACK_SIZE_OTA,
    };

    pub const CONNECTIVITY: TaskSpec = TaskSpec {
        name: "wifi_monitor",
        thread_name: b"wifi_monitor\0",
        priority: PRIORITY_CONNECTIVITY,
        stack_size: STACK_SIZE_DEFAULT,
    };

    pub const HEALTH: TaskSpec = TaskSpec {
        name: "health_task",
        thread_name: b"health_task\0",
        priority: PRIORITY_HEALTH,
        stack_size: STACK_SIZE_DEFAULT,
    };
}

/// Start `task` on its own thread.
pub fn spawn_periodic<T: PeriodicTask>(spec: TaskSpec, task: T) -> Result<JoinHandle<()>> {
    #[cfg(target_os = "espidf")]
    {
        esp_idf_hal::task::thread::ThreadSpawnConfiguration {
            name: Some(spec.thread_name),
            stack_size: spec.stack_size,
            priority: spec.priority,
            ..Default::default()
        }
        .set()?;
    }

    #[cfg(not(target_os = "espidf"))]
    let stack_size = spec.stack_size.max(HOST_MIN_STACK);
    #[cfg(target_os = "espidf")]
    let stack_size = spec.stack_size;

    let spawned = thread::Builder::new()
        .name(spec.name.to_string())
        .stack_size(stack_size)
        .spawn(move || run_periodic(spec.name, task));

    #[cfg(target_os = "espidf")]
    {
        esp_idf_hal::task::thread::ThreadSpawnConfiguration::default().set()?;
    }

    let handle = spawned?;
    log::info!(
        "Started {} (priority {}, stack {} bytes)",
        spec.name,
        spec.priority,
        spec.stack_size
    );
    Ok(handle)
}

pub(crate) fn run_periodic<T: PeriodicTask>(name: &str, mut task: T) {
    let delay = task.initial_delay();
    if !delay.is_zero() {
        log::info!("{} waiting {:?} before first cycle", name, delay);
        thread::sleep(delay);
    }

    loop {
        if task.run_cycle() == CycleFlow::Stop {
            log::warn!("{} stopped", name);
            break;
        }
        thread::sleep(task.period());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;
    use std::time::Instant;

    struct Counter {
        cycles: Arc<AtomicU32>,
        stop_after: u32,
        delay: Duration,
    }

    impl PeriodicTask for Counter {
        fn period(&self) -> Duration {
            Duration::from_millis(2)
        }

        fn initial_delay(&self) -> Duration {
            self.delay
        }

        fn run_cycle(&mut self) -> CycleFlow {
            let n = self.cycles.fetch_add(1, Ordering::SeqCst) + 1;
            if n >= self.stop_after {
                CycleFlow::Stop
            } else {
                CycleFlow::Continue
            }
        }
    }

    #[test]
    fn loop_runs_until_stop() {
        let cycles = Arc::new(AtomicU32::new(0));
        let task = Counter {
            cycles: cycles.clone(),
            stop_after: 3,
            delay: Duration::ZERO,
        };
        let spec = TaskSpec {
            name: "counter",
            thread_name: b"counter\0",
            priority: PRIORITY_HEALTH,
            stack_size: 64 * 1024,
        };
        spawn_periodic(spec, task).unwrap().join().unwrap();
        assert_eq!(cycles.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn initial_delay_precedes_first_cycle() {
        let cycles = Arc::new(AtomicU32::new(0));
        let task = Counter {
            cycles: cycles.clone(),
            stop_after: 1,
            delay: Duration::from_millis(30),
        };
        let started = Instant::now();
        run_periodic("delayed", task);
        assert!(started.elapsed() >= Duration::from_millis(30));
        assert_eq!(cycles.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn priorities_follow_task_importance() {
        assert!(TaskSpec::SENSOR.priority > TaskSpec::TELEMETRY.priority);
        assert!(TaskSpec::TELEMETRY.priority > TaskSpec::UPDATE.priority);
        assert!(TaskSpec::UPDATE.priority > TaskSpec::HEALTH.priority);
        for spec in [
            TaskSpec::SENSOR,
            TaskSpec::TELEMETRY,
            TaskSpec::UPDATE,
            TaskSpec::CONNECTIVITY,
            TaskSpec::HEALTH,
        ] {
            assert_eq!(spec.thread_name.last(), Some(&0));
            assert_eq!(&spec.thread_name[..spec.thread_name.len() - 1], spec.name.as_bytes());
        }
    }
}
