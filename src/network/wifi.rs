use anyhow::{bail, Result};
use esp_idf_hal::modem::Modem;
use esp_idf_svc::{
    eventloop::EspSystemEventLoop,
    nvs::EspDefaultNvsPartition,
    sntp::EspSntp,
    wifi::{AuthMethod, BlockingWifi, ClientConfiguration, Configuration, EspWifi},
};
use std::sync::Arc;
use std::time::Duration;

use crate::config::AgentConfig;
use crate::state::AppState;
use crate::tasks::{CycleFlow, PeriodicTask};

/// Owns the station interface and keeps `connectivity` in the shared state
/// current. Runs as the connectivity task once the first association succeeded.
pub struct WifiMonitor {
    wifi: BlockingWifi<EspWifi<'static>>,
    config: Arc<AgentConfig>,
    state: Arc<AppState>,
    sntp: Option<EspSntp<'static>>,
    reconnect_attempts: u32,
}

impl WifiMonitor {
    pub fn new(
        modem: Modem,
        sys_loop: EspSystemEventLoop,
        nvs: EspDefaultNvsPartition,
        config: Arc<AgentConfig>,
        state: Arc<AppState>,
    ) -> Result<Self> {
        let ssid = config.wifi_ssid.as_str();
        let password = config.wifi_password.as_str();
        log::info!("Initializing WiFi for SSID: '{}'", ssid);

        if ssid.is_empty() {
            log::error!("WiFi SSID is empty! Check wifi_config.h");
            bail!("WiFi SSID cannot be empty");
        }

        let mut esp_wifi = EspWifi::new(modem, sys_loop.clone(), Some(nvs))?;
        let cfg = Configuration::Client(ClientConfiguration {
            ssid: ssid
                .try_into()
                .map_err(|_| anyhow::anyhow!("Invalid SSID format: {}", ssid))?,
            password: password
                .try_into()
                .map_err(|_| anyhow::anyhow!("Invalid password format"))?,
            auth_method: if password.is_empty() {
                log::warn!("WiFi password is empty, using open network");
                AuthMethod::None
            } else {
                AuthMethod::WPA2Personal
            },
            ..Default::default()
        });
        esp_wifi.set_configuration(&cfg)?;
        let wifi = BlockingWifi::wrap(esp_wifi, sys_loop)?;

        Ok(Self {
            wifi,
            config,
            state,
            sntp: None,
            reconnect_attempts: 0,
        })
    }

    /// Associate at boot, retrying up to `wifi_max_retry` times.
    pub fn connect(&mut self) -> Result<()> {
        self.wifi.start()?;

        let max_retry = self.config.wifi_max_retry.max(1);
        for attempt in 1..=max_retry {
            log::info!("Connecting to {} (attempt {}/{})", self.config.wifi_ssid, attempt, max_retry);
            match self.try_connect() {
                Ok(()) => {
                    self.on_connected();
                    return Ok(());
                }
                Err(e) => {
                    log::warn!("WiFi connect attempt {} failed: {:?}", attempt, e);
                    std::thread::sleep(Duration::from_secs(1));
                }
            }
        }
        bail!("Failed to connect to {} after {} attempts", self.config.wifi_ssid, max_retry)
    }

    fn try_connect(&mut self) -> Result<()> {
        self.wifi.connect()?;
        self.wifi.wait_netif_up()?;
        Ok(())
    }

    fn on_connected(&mut self) {
        if let Ok(ip_info) = self.wifi.wifi().sta_netif().get_ip_info() {
            log::info!("WiFi connected, IP {}", ip_info.ip);
        }
        if !self.state.set_connectivity(true) && self.reconnect_attempts > 0 {
            log::warn!("WiFi reconnected after {} attempts", self.reconnect_attempts);
        }
        self.reconnect_attempts = 0;

        if self.sntp.is_none() {
            match EspSntp::new_default() {
                Ok(sntp) => {
                    log::info!("SNTP time sync started");
                    self.sntp = Some(sntp);
                }
                Err(e) => log::warn!("Failed to start SNTP: {:?}", e),
            }
        }
    }
}

impl PeriodicTask for WifiMonitor {
    fn period(&self) -> Duration {
        self.config.connectivity_poll()
    }

    fn run_cycle(&mut self) -> CycleFlow {
        let connected = self.wifi.is_connected().unwrap_or(false);
        if connected {
            if !self.state.connectivity() {
                self.on_connected();
            }
            return CycleFlow::Continue;
        }

        if self.state.set_connectivity(false) {
            log::warn!("WiFi disconnected");
        }
        self.reconnect_attempts = self.reconnect_attempts.saturating_add(1);
        log::warn!("WiFi reconnect attempt #{}", self.reconnect_attempts);
        match self.try_connect() {
            Ok(()) => self.on_connected(),
            Err(e) => log::warn!("WiFi reconnect failed: {:?}", e),
        }
        CycleFlow::Continue
    }
}
