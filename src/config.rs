use anyhow::{bail, Result};
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::ota::window::UpdateWindow;
use crate::ota::UpdateDescriptor;
use crate::sensors::AlarmLimits;

pub const CONFIG_NAMESPACE: &str = "ice_pulse";
pub const CONFIG_KEY: &str = "config";

/// Host builds read the JSON config from this path when set
pub const CONFIG_PATH_ENV: &str = "ICE_PULSE_CONFIG";

/// Startup configuration, immutable once the tasks are running.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct AgentConfig {
    // Identity
    pub device_id: String,
    pub device_type: String,
    pub firmware_version: String,

    // WiFi settings
    pub wifi_ssid: String,
    pub wifi_password: String,
    pub wifi_max_retry: u32,

    // Endpoints
    pub api_endpoint: String,
    pub api_timeout_ms: u64,
    pub ota_server_url: String,
    pub ota_timeout_ms: u64,

    // Task periods
    pub sample_period_ms: u64,
    pub send_period_ms: u64,
    pub check_period_ms: u64,
    pub health_period_ms: u64,
    pub connectivity_poll_ms: u64,
    pub initial_check_delay_ms: u64,

    // Bounded waits
    pub sensor_timeout_ms: u64,
    pub suspend_timeout_ms: u64,

    // OTA install window, evaluated on local wall-clock time
    pub update_window: UpdateWindow,
    pub utc_offset_hours: i8,

    pub low_memory_threshold: u64,
    pub alarm_limits: AlarmLimits,
    pub log_level: String,

    /// Release the host build's update server offers; ignored on hardware
    #[serde(skip_serializing_if = "Option::is_none")]
    pub simulated_release: Option<UpdateDescriptor>,
}

impl Default for AgentConfig {
    fn default() -> Self {
        // Get WiFi credentials from environment variables set by build.rs
        // These come from wifi_config.h which should NOT be committed to git
        let wifi_ssid = env!("WIFI_SSID");
        let wifi_password = env!("WIFI_PASSWORD");

        Self {
            device_id: "ice-pulse-001".to_string(),
            device_type: "temperature_humidity_sensor".to_string(),
            firmware_version: crate::version::FIRMWARE_VERSION.to_string(),
            wifi_ssid: wifi_ssid.to_string(),
            wifi_password: wifi_password.to_string(),
            wifi_max_retry: 5,
            api_endpoint: "http://localhost:8080/api/v1/sensors/data".to_string(),
            api_timeout_ms: 10_000,
            ota_server_url: "http://localhost:8092".to_string(),
            ota_timeout_ms: 30_000,
            sample_period_ms: 5 * 60 * 1000,
            send_period_ms: 10 * 60 * 1000,
            check_period_ms: 6 * 60 * 60 * 1000,
            health_period_ms: 60 * 1000,
            connectivity_poll_ms: 10 * 1000,
            initial_check_delay_ms: 30 * 1000,
            sensor_timeout_ms: 2_000,
            suspend_timeout_ms: 5_000,
            update_window: UpdateWindow::new(2, 4),
            utc_offset_hours: 0,
            low_memory_threshold: 10_000,
            alarm_limits: AlarmLimits::default(),
            log_level: "info".to_string(),
            simulated_release: None,
        }
    }
}

impl AgentConfig {
    pub fn sample_period(&self) -> Duration {
        Duration::from_millis(self.sample_period_ms)
    }

    pub fn send_period(&self) -> Duration {
        Duration::from_millis(self.send_period_ms)
    }

    pub fn check_period(&self) -> Duration {
        Duration::from_millis(self.check_period_ms)
    }

    pub fn health_period(&self) -> Duration {
        Duration::from_millis(self.health_period_ms)
    }

    pub fn connectivity_poll(&self) -> Duration {
        Duration::from_millis(self.connectivity_poll_ms)
    }

    pub fn initial_check_delay(&self) -> Duration {
        Duration::from_millis(self.initial_check_delay_ms)
    }

    pub fn sensor_timeout(&self) -> Duration {
        Duration::from_millis(self.sensor_timeout_ms)
    }

    pub fn suspend_timeout(&self) -> Duration {
        Duration::from_millis(self.suspend_timeout_ms)
    }

    pub fn api_timeout(&self) -> Duration {
        Duration::from_millis(self.api_timeout_ms)
    }

    pub fn ota_timeout(&self) -> Duration {
        Duration::from_millis(self.ota_timeout_ms)
    }

    /// Reject configurations the tasks cannot run with. Called once at startup.
    pub fn validate(&self) -> Result<()> {
        if self.device_id.trim().is_empty() {
            bail!("device_id must not be empty");
        }
        if self.firmware_version.trim().is_empty() {
            bail!("firmware_version must not be empty");
        }

        let periods = [
            ("sample_period_ms", self.sample_period_ms),
            ("send_period_ms", self.send_period_ms),
            ("check_period_ms", self.check_period_ms),
            ("health_period_ms", self.health_period_ms),
            ("connectivity_poll_ms", self.connectivity_poll_ms),
            ("suspend_timeout_ms", self.suspend_timeout_ms),
        ];
        for (name, value) in periods {
            if value == 0 {
                bail!("{} must be greater than zero", name);
            }
        }

        if self.sensor_timeout_ms >= self.sample_period_ms {
            bail!(
                "sensor_timeout_ms ({}) must be shorter than sample_period_ms ({})",
                self.sensor_timeout_ms,
                self.sample_period_ms
            );
        }

        self.update_window.validate()?;

        if !(-12..=14).contains(&self.utc_offset_hours) {
            bail!("utc_offset_hours {} is not a valid offset", self.utc_offset_hours);
        }

        self.alarm_limits.validate()?;

        if let Some(release) = &self.simulated_release {
            if release.version.trim().is_empty() {
                bail!("simulated_release.version must not be empty");
            }
        }

        Ok(())
    }
}

/// Load the persisted configuration, falling back to compiled defaults.
/// Missing or unreadable blobs are replaced by the defaults.
#[cfg(target_os = "espidf")]
pub fn load_or_default(
    partition: esp_idf_svc::nvs::EspDefaultNvsPartition,
) -> Result<AgentConfig> {
    use crate::system::storage::Storage;

    let mut storage = Storage::new(partition, CONFIG_NAMESPACE)?;
    match storage.read::<AgentConfig>(CONFIG_KEY) {
        Ok(Some(config)) => {
            log::info!("Loaded configuration from NVS");
            return Ok(config);
        }
        Ok(None) => log::info!("No configuration in NVS, using defaults"),
        Err(e) => log::warn!("Failed to load config from NVS: {:?}, using defaults", e),
    }

    let config = AgentConfig::default();
    if let Err(e) = storage.write(CONFIG_KEY, &config) {
        log::warn!("Failed to save default config to NVS: {:?}", e);
    }
    Ok(config)
}

/// Load the configuration file named by `ICE_PULSE_CONFIG`, or the defaults.
#[cfg(not(target_os = "espidf"))]
pub fn load_or_default() -> Result<AgentConfig> {
    match std::env::var(CONFIG_PATH_ENV) {
        Ok(path) => {
            let data = std::fs::read(&path)
                .map_err(|e| anyhow::anyhow!("Failed to read config {}: {}", path, e))?;
            let config = parse(&data)?;
            log::info!("Loaded configuration from {}", path);
            Ok(config)
        }
        Err(_) => {
            log::info!("{} not set, using default configuration", CONFIG_PATH_ENV);
            Ok(AgentConfig::default())
        }
    }
}

pub fn parse(data: &[u8]) -> Result<AgentConfig> {
    let config: AgentConfig = serde_json::from_slice(data)?;
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_follow_device_header() {
        let config = AgentConfig::default();
        assert_eq!(config.device_id, "ice-pulse-001");
        assert_eq!(config.sample_period(), Duration::from_secs(300));
        assert_eq!(config.send_period(), Duration::from_secs(600));
        assert_eq!(config.check_period(), Duration::from_secs(6 * 3600));
        assert_eq!(config.initial_check_delay(), Duration::from_secs(30));
        assert_eq!(config.update_window, UpdateWindow::new(2, 4));
        assert_eq!(config.low_memory_threshold, 10_000);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn partial_json_keeps_defaults() {
        let config = parse(br#"{"device_id":"ice-pulse-042","sample_period_ms":5000}"#).unwrap();
        assert_eq!(config.device_id, "ice-pulse-042");
        assert_eq!(config.sample_period_ms, 5000);
        assert_eq!(config.send_period_ms, AgentConfig::default().send_period_ms);
    }

    #[test]
    fn nested_window_parses() {
        let config =
            parse(br#"{"update_window":{"start_hour":22,"end_hour":3}}"#).unwrap();
        assert_eq!(config.update_window, UpdateWindow::new(22, 3));
    }

    #[test]
    fn simulated_release_is_optional() {
        assert_eq!(AgentConfig::default().simulated_release, None);

        let config = parse(
            br#"{"simulated_release":{"version":"1.3.0","url":"http://localhost:8092/firmware.bin","size":1024,"checksum":"00"}}"#,
        )
        .unwrap();
        let release = config.simulated_release.as_ref().unwrap();
        assert_eq!(release.version, "1.3.0");
        assert_eq!(release.size, 1024);
        assert!(config.validate().is_ok());

        let json = serde_json::to_value(AgentConfig::default()).unwrap();
        assert!(json.get("simulated_release").is_none());
    }

    #[test]
    fn simulated_release_needs_a_version() {
        let mut config = parse(
            br#"{"simulated_release":{"version":"","url":"","size":1,"checksum":""}}"#,
        )
        .unwrap();
        assert!(config.validate().is_err());
        config.simulated_release = None;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn malformed_json_is_an_error() {
        assert!(parse(b"{not json").is_err());
    }

    #[test]
    fn zero_period_is_rejected() {
        let config = AgentConfig {
            send_period_ms: 0,
            ..AgentConfig::default()
        };
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("send_period_ms"));
    }

    #[test]
    fn sensor_timeout_must_be_shorter_than_sample_period() {
        let config = AgentConfig {
            sample_period_ms: 1_000,
            sensor_timeout_ms: 1_000,
            ..AgentConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn empty_device_id_is_rejected() {
        let config = AgentConfig {
            device_id: "  ".to_string(),
            ..AgentConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn out_of_range_window_hour_is_rejected() {
        let config = AgentConfig {
            update_window: UpdateWindow::new(2, 24),
            ..AgentConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn bad_utc_offset_is_rejected() {
        let config = AgentConfig {
            utc_offset_hours: 20,
            ..AgentConfig::default()
        };
        assert!(config.validate().is_err());
    }
}
