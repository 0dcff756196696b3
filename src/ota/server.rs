use embedded_svc::http::client::Client;
use embedded_svc::http::Method;
use embedded_svc::io::Read;
use esp_idf_svc::http::client::{Configuration as HttpConfig, EspHttpConnection};
use std::time::Duration;

use super::{is_newer, CheckError, UpdateDescriptor, UpdateServer};

// version.json is a few hundred bytes
const MAX_VERSION_INFO: usize = 4096;

/// Reads `<base>/version.json` from the update server.
pub struct HttpUpdateServer {
    version_url: String,
    timeout: Duration,
}

impl HttpUpdateServer {
    pub fn new(base_url: &str, timeout: Duration) -> Self {
        Self {
            version_url: format!("{}/version.json", base_url.trim_end_matches('/')),
            timeout,
        }
    }

    fn fetch_version_info(&self) -> Result<UpdateDescriptor, CheckError> {
        let config = HttpConfig {
            buffer_size: Some(4096),
            timeout: Some(self.timeout),
            ..Default::default()
        };
        let connection =
            EspHttpConnection::new(&config).map_err(|e| CheckError::Io(format!("{:?}", e)))?;
        let mut client = Client::wrap(connection);
        let request = client
            .request(Method::Get, &self.version_url, &[])
            .map_err(|_| CheckError::NotConnected)?;
        let mut response = request
            .submit()
            .map_err(|e| CheckError::Io(format!("{:?}", e)))?;

        if response.status() != 200 {
            return Err(CheckError::Http(response.status()));
        }

        let mut body = Vec::new();
        let mut buf = [0u8; 512];
        loop {
            let bytes_read = response
                .read(&mut buf)
                .map_err(|e| CheckError::Io(format!("{:?}", e)))?;
            if bytes_read == 0 {
                break;
            }
            body.extend_from_slice(&buf[..bytes_read]);
            if body.len() > MAX_VERSION_INFO {
                return Err(CheckError::Malformed("version info too large".to_string()));
            }
        }

        serde_json::from_slice(&body).map_err(|e| CheckError::Malformed(e.to_string()))
    }
}

impl UpdateServer for HttpUpdateServer {
    fn check_for_update(
        &mut self,
        current_version: &str,
    ) -> Result<Option<UpdateDescriptor>, CheckError> {
        let descriptor = self.fetch_version_info()?;
        if is_newer(&descriptor.version, current_version) {
            log::info!(
                "New version available: {} (current: {})",
                descriptor.version,
                current_version
            );
            Ok(Some(descriptor))
        } else {
            log::debug!("Server version {} is not newer", descriptor.version);
            Ok(None)
        }
    }
}
