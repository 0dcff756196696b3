use anyhow::{Context, Result};
use log::info;
use std::sync::Arc;

use ice_pulse::config::{self, AgentConfig};
use ice_pulse::logging;
use ice_pulse::sensors::SimulatedSensor;
use ice_pulse::state::AppState;
use ice_pulse::system::RuntimeInfo;
use ice_pulse::tasks::{
    spawn_periodic, HealthMonitor, PauseGate, SensorSampler, TaskSpec, TelemetryReporter,
    UpdateCoordinator,
};

#[cfg(target_os = "espidf")]
use esp_idf_sys as _; // Binstart

// Generate ESP-IDF app descriptor
#[cfg(target_os = "espidf")]
#[allow(unexpected_cfgs)]
mod app_desc {
    esp_idf_sys::esp_app_desc!();
}

fn main() -> Result<()> {
    #[cfg(target_os = "espidf")]
    esp_idf_svc::sys::link_patches();

    logging::init_logger().context("Failed to initialize logger")?;
    info!("{} starting", ice_pulse::version::full_version());

    #[cfg(target_os = "espidf")]
    let nvs = esp_idf_svc::nvs::EspDefaultNvsPartition::take()?;

    #[cfg(target_os = "espidf")]
    let config = config::load_or_default(nvs.clone())?;
    #[cfg(not(target_os = "espidf"))]
    let config = config::load_or_default()?;

    config.validate().context("Invalid configuration")?;
    if !logging::set_max_level_from_str(&config.log_level) {
        log::warn!("Unknown log level '{}', keeping default", config.log_level);
    }
    log_config(&config);

    let config = Arc::new(config);
    let state = Arc::new(AppState::new());
    let gate = Arc::new(PauseGate::new());

    #[cfg(target_os = "espidf")]
    let runtime: Arc<dyn RuntimeInfo> =
        Arc::new(ice_pulse::system::EspRuntime::new(config.utc_offset_hours));
    #[cfg(not(target_os = "espidf"))]
    let runtime: Arc<dyn RuntimeInfo> =
        Arc::new(ice_pulse::system::HostRuntime::new(config.utc_offset_hours));

    // Probe drivers are not fitted yet; the simulated pair stands in on both targets
    let sensor = SimulatedSensor::new();
    state.mark_sensors_ready();

    let mut handles = Vec::new();

    #[cfg(target_os = "espidf")]
    {
        use esp_idf_hal::peripherals::Peripherals;
        use esp_idf_svc::eventloop::EspSystemEventLoop;
        use ice_pulse::network::wifi::WifiMonitor;

        let peripherals = Peripherals::take()?;
        let sys_loop = EspSystemEventLoop::take()?;
        let mut wifi = WifiMonitor::new(
            peripherals.modem,
            sys_loop,
            nvs,
            config.clone(),
            state.clone(),
        )?;
        if let Err(e) = wifi.connect() {
            // The monitor keeps retrying; sampling does not need the network
            log::error!("Initial WiFi connection failed: {:?}", e);
        }
        handles.push(spawn_periodic(TaskSpec::CONNECTIVITY, wifi)?);
    }
    #[cfg(not(target_os = "espidf"))]
    state.set_connectivity(true);

    #[cfg(target_os = "espidf")]
    let (transport, server, installer) = (
        ice_pulse::network::http::HttpTransport::new(&config.api_endpoint, config.api_timeout()),
        ice_pulse::ota::server::HttpUpdateServer::new(&config.ota_server_url, config.ota_timeout()),
        ice_pulse::ota::manager::EspOtaInstaller::new(config.ota_timeout()),
    );
    #[cfg(not(target_os = "espidf"))]
    let (transport, server, installer) = (
        ice_pulse::network::LogTransport::new(&config.api_endpoint),
        ice_pulse::ota::SimulatedUpdateServer::from_release(config.simulated_release.clone()),
        ice_pulse::ota::SimulatedInstaller::new(),
    );

    handles.push(spawn_periodic(
        TaskSpec::SENSOR,
        SensorSampler::new(config.clone(), state.clone(), runtime.clone(), sensor),
    )?);
    handles.push(spawn_periodic(
        TaskSpec::TELEMETRY,
        TelemetryReporter::new(
            config.clone(),
            state.clone(),
            gate.clone(),
            runtime.clone(),
            transport,
        ),
    )?);
    handles.push(spawn_periodic(
        TaskSpec::UPDATE,
        UpdateCoordinator::new(
            config.clone(),
            state.clone(),
            gate.clone(),
            runtime.clone(),
            server,
            installer,
        ),
    )?);
    handles.push(spawn_periodic(
        TaskSpec::HEALTH,
        HealthMonitor::new(config.clone(), state.clone(), runtime.clone()),
    )?);

    info!("All tasks started");

    // Tasks only return once a restart has been issued
    for handle in handles {
        if handle.join().is_err() {
            log::error!("A task panicked");
        }
    }
    Ok(())
}

fn log_config(config: &AgentConfig) {
    info!("Device: {} ({})", config.device_id, config.device_type);
    info!(
        "Periods: sample {:?}, send {:?}, update check {:?}, health {:?}",
        config.sample_period(),
        config.send_period(),
        config.check_period(),
        config.health_period()
    );
    info!(
        "Update window {} (UTC{:+}), low memory threshold {} bytes",
        config.update_window, config.utc_offset_hours, config.low_memory_threshold
    );
}
