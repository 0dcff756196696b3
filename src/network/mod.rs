// Network module - telemetry transport and connectivity

use serde::Serialize;
use std::fmt;

pub mod loopback;

#[cfg(target_os = "espidf")]
pub mod http;
#[cfg(target_os = "espidf")]
pub mod wifi;

pub use loopback::LogTransport;

/// Delivers one telemetry message to the collection endpoint.
pub trait Transport: Send {
    fn post_reading(&mut self, message: &TelemetryMessage) -> Result<(), TransportError>;
}

#[derive(Debug, Clone, PartialEq)]
pub enum TransportError {
    NotConnected,
    Http(u16),
    Io(String),
    Serialize(String),
}

impl fmt::Display for TransportError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransportError::NotConnected => write!(f, "network not connected"),
            TransportError::Http(status) => write!(f, "endpoint answered HTTP {}", status),
            TransportError::Io(e) => write!(f, "transport I/O error: {}", e),
            TransportError::Serialize(e) => write!(f, "payload serialization failed: {}", e),
        }
    }
}

impl std::error::Error for TransportError {}

/// Wire payload posted to the API endpoint as JSON.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct TelemetryMessage {
    pub device_id: String,
    pub device_type: String,
    pub firmware_version: String,
    /// Monotonic seconds of the reading
    pub timestamp: u64,
    pub temperature: f32,
    pub humidity: f32,
    pub reading_count: u32,
    /// Seconds since boot at send time
    pub uptime: u64,
    pub ota_in_progress: bool,
}

impl TelemetryMessage {
    pub fn to_json(&self) -> Result<String, TransportError> {
        serde_json::to_string(self).map_err(|e| TransportError::Serialize(e.to_string()))
    }
}
