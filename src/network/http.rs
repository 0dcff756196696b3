use embedded_svc::http::client::Client;
use embedded_svc::http::Method;
use embedded_svc::io::Write;
use esp_idf_svc::http::client::{Configuration as HttpConfig, EspHttpConnection};
use std::time::Duration;

use super::{TelemetryMessage, Transport, TransportError};

/// POSTs each message as JSON to the API endpoint. A fresh connection per
/// request keeps the socket count at zero between send periods.
pub struct HttpTransport {
    endpoint: String,
    timeout: Duration,
}

impl HttpTransport {
    pub fn new(endpoint: &str, timeout: Duration) -> Self {
        Self {
            endpoint: endpoint.to_string(),
            timeout,
        }
    }
}

fn io_error<E: std::fmt::Debug>(e: E) -> TransportError {
    TransportError::Io(format!("{:?}", e))
}

impl Transport for HttpTransport {
    fn post_reading(&mut self, message: &TelemetryMessage) -> Result<(), TransportError> {
        let payload = message.to_json()?;

        let config = HttpConfig {
            buffer_size: Some(1024),
            timeout: Some(self.timeout),
            ..Default::default()
        };
        let connection = EspHttpConnection::new(&config).map_err(io_error)?;
        let mut client = Client::wrap(connection);

        let content_length = payload.len().to_string();
        let headers = [
            ("Content-Type", "application/json"),
            ("Content-Length", content_length.as_str()),
        ];
        let mut request = client
            .request(Method::Post, &self.endpoint, &headers)
            .map_err(io_error)?;
        request.write_all(payload.as_bytes()).map_err(io_error)?;
        request.flush().map_err(io_error)?;
        let response = request.submit().map_err(io_error)?;

        let status = response.status();
        log::debug!("POST {} -> HTTP {}", self.endpoint, status);
        if (200..300).contains(&status) {
            Ok(())
        } else {
            Err(TransportError::Http(status))
        }
    }
}
