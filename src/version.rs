// Centralized version information

// Cargo package version from Cargo.toml, reported to the update server and in telemetry
pub const FIRMWARE_VERSION: &str = env!("CARGO_PKG_VERSION");

pub const PRODUCT_NAME: &str = "Ice Pulse Sensor";

// Version info string for logging
pub fn full_version() -> String {
    format!("{} v{}", PRODUCT_NAME, FIRMWARE_VERSION)
}
