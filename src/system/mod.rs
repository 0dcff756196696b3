// Runtime facts the tasks need from the platform

pub mod clock;
pub mod info;

#[cfg(target_os = "espidf")]
pub mod storage;

#[cfg(target_os = "espidf")]
pub use info::EspRuntime;
#[cfg(not(target_os = "espidf"))]
pub use info::HostRuntime;

/// Memory, uptime and local time of the running device.
pub trait RuntimeInfo: Send + Sync {
    /// `None` when the query failed; treated as unhealthy
    fn free_memory_bytes(&self) -> Option<u64>;

    /// Seconds since boot
    fn monotonic_secs(&self) -> u64;

    /// Local hour 0-23, `None` until the wall clock has been synchronised
    fn wall_clock_hour(&self) -> Option<u8>;
}
