// Transport that only logs the payload, for host runs and bench units without an endpoint

use super::{TelemetryMessage, Transport, TransportError};

pub struct LogTransport {
    endpoint: String,
    sent: u32,
}

impl LogTransport {
    pub fn new(endpoint: &str) -> Self {
        Self {
            endpoint: endpoint.to_string(),
            sent: 0,
        }
    }

    pub fn sent(&self) -> u32 {
        self.sent
    }
}

impl Transport for LogTransport {
    fn post_reading(&mut self, message: &TelemetryMessage) -> Result<(), TransportError> {
        if self.endpoint.is_empty() {
            return Err(TransportError::NotConnected);
        }
        let payload = message.to_json()?;
        self.sent += 1;
        log::info!("POST {} ({} bytes): {}", self.endpoint, payload.len(), payload);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn message() -> TelemetryMessage {
        TelemetryMessage {
            device_id: "freezer-01".to_string(),
            device_type: "freezer".to_string(),
            firmware_version: "1.2.0".to_string(),
            timestamp: 60,
            temperature: -18.5,
            humidity: 65.0,
            reading_count: 1,
            uptime: 60,
            ota_in_progress: false,
        }
    }

    #[test]
    fn counts_posts_to_a_configured_endpoint() {
        let mut transport = LogTransport::new("http://localhost:8080/api/readings");
        transport.post_reading(&message()).unwrap();
        transport.post_reading(&message()).unwrap();
        assert_eq!(transport.sent(), 2);
    }

    #[test]
    fn missing_endpoint_is_not_connected() {
        let mut transport = LogTransport::new("");
        assert_eq!(
            transport.post_reading(&message()),
            Err(TransportError::NotConnected)
        );
        assert_eq!(transport.sent(), 0);
    }
}
