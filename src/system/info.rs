use super::clock;
use super::RuntimeInfo;

#[cfg(target_os = "espidf")]
pub struct EspRuntime {
    utc_offset_hours: i8,
}

#[cfg(target_os = "espidf")]
impl EspRuntime {
    pub fn new(utc_offset_hours: i8) -> Self {
        Self { utc_offset_hours }
    }
}

#[cfg(target_os = "espidf")]
impl RuntimeInfo for EspRuntime {
    fn free_memory_bytes(&self) -> Option<u64> {
        Some(unsafe { esp_idf_sys::esp_get_free_heap_size() } as u64)
    }

    fn monotonic_secs(&self) -> u64 {
        let micros = unsafe { esp_idf_sys::esp_timer_get_time() };
        (micros / 1_000_000).max(0) as u64
    }

    fn wall_clock_hour(&self) -> Option<u8> {
        clock::current_local_hour(self.utc_offset_hours)
    }
}

/// Desktop stand-in: process uptime and the host's available memory.
#[cfg(not(target_os = "espidf"))]
pub struct HostRuntime {
    boot_time: std::time::Instant,
    system: std::sync::Mutex<sysinfo::System>,
    utc_offset_hours: i8,
}

#[cfg(not(target_os = "espidf"))]
impl HostRuntime {
    pub fn new(utc_offset_hours: i8) -> Self {
        Self {
            boot_time: std::time::Instant::now(),
            system: std::sync::Mutex::new(sysinfo::System::new()),
            utc_offset_hours,
        }
    }
}

#[cfg(not(target_os = "espidf"))]
impl RuntimeInfo for HostRuntime {
    fn free_memory_bytes(&self) -> Option<u64> {
        let mut system = self.system.lock().ok()?;
        system.refresh_memory();
        if system.total_memory() == 0 {
            return None;
        }
        Some(system.available_memory())
    }

    fn monotonic_secs(&self) -> u64 {
        self.boot_time.elapsed().as_secs()
    }

    fn wall_clock_hour(&self) -> Option<u8> {
        clock::current_local_hour(self.utc_offset_hours)
    }
}

#[cfg(all(test, not(target_os = "espidf")))]
mod tests {
    use super::*;

    #[test]
    fn host_runtime_reports_plausible_values() {
        let runtime = HostRuntime::new(0);
        assert!(runtime.monotonic_secs() < 5);
        if let Some(hour) = runtime.wall_clock_hour() {
            assert!(hour < 24);
        }
    }
}
