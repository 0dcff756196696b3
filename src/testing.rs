// Hand-written collaborator fakes shared by the task tests

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::network::{TelemetryMessage, Transport, TransportError};
use crate::ota::{
    CheckError, FirmwareImage, OtaError, OtaInstaller, UpdateDescriptor, UpdateServer,
};
use crate::sensors::{SensorDriver, SensorError};
use crate::state::AppState;
use crate::system::RuntimeInfo;
use crate::tasks::PauseGate;

pub struct FakeRuntime {
    free_memory: Mutex<Option<u64>>,
    secs: AtomicU64,
    hour: Mutex<Option<u8>>,
}

impl FakeRuntime {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            free_memory: Mutex::new(Some(64 * 1024)),
            secs: AtomicU64::new(0),
            hour: Mutex::new(Some(3)),
        })
    }

    pub fn set_free_memory(&self, free: Option<u64>) {
        *self.free_memory.lock().unwrap() = free;
    }

    pub fn set_secs(&self, secs: u64) {
        self.secs.store(secs, Ordering::SeqCst);
    }

    pub fn advance(&self, secs: u64) {
        self.secs.fetch_add(secs, Ordering::SeqCst);
    }

    pub fn set_hour(&self, hour: Option<u8>) {
        *self.hour.lock().unwrap() = hour;
    }
}

impl RuntimeInfo for FakeRuntime {
    fn free_memory_bytes(&self) -> Option<u64> {
        *self.free_memory.lock().unwrap()
    }

    fn monotonic_secs(&self) -> u64 {
        self.secs.load(Ordering::SeqCst)
    }

    fn wall_clock_hour(&self) -> Option<u8> {
        *self.hour.lock().unwrap()
    }
}

/// Replays scripted `(temperature, humidity)` results, then repeats `fallback`.
pub struct ScriptedSensor {
    script: VecDeque<Result<(f32, f32), SensorError>>,
    fallback: (f32, f32),
    pending_humidity: Option<f32>,
    pub delay: Duration,
}

impl ScriptedSensor {
    pub fn steady(temperature: f32, humidity: f32) -> Self {
        Self {
            script: VecDeque::new(),
            fallback: (temperature, humidity),
            pending_humidity: None,
            delay: Duration::ZERO,
        }
    }

    pub fn then(mut self, result: Result<(f32, f32), SensorError>) -> Self {
        self.script.push_back(result);
        self
    }
}

impl SensorDriver for ScriptedSensor {
    fn read_temperature(&mut self) -> Result<f32, SensorError> {
        if !self.delay.is_zero() {
            std::thread::sleep(self.delay);
        }
        let (t, h) = self.script.pop_front().unwrap_or(Ok(self.fallback))?;
        self.pending_humidity = Some(h);
        Ok(t)
    }

    fn read_humidity(&mut self) -> Result<f32, SensorError> {
        self.pending_humidity
            .take()
            .ok_or(SensorError::ReadFailed("humidity"))
    }
}

#[derive(Clone, Default)]
pub struct RecordingTransport {
    pub sent: Arc<Mutex<Vec<TelemetryMessage>>>,
    pub failures_left: Arc<AtomicU32>,
}

impl RecordingTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_next(&self, count: u32) {
        self.failures_left.store(count, Ordering::SeqCst);
    }

    pub fn sent_count(&self) -> usize {
        self.sent.lock().unwrap().len()
    }
}

impl Transport for RecordingTransport {
    fn post_reading(&mut self, message: &TelemetryMessage) -> Result<(), TransportError> {
        let failing = self
            .failures_left
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if failing {
            return Err(TransportError::Http(503));
        }
        self.sent.lock().unwrap().push(message.clone());
        Ok(())
    }
}

pub fn descriptor(version: &str) -> UpdateDescriptor {
    UpdateDescriptor {
        version: version.to_string(),
        url: format!("http://localhost:8092/firmware-{}.bin", version),
        size: 1024,
        checksum: "00".repeat(32),
    }
}

pub struct FakeUpdateServer {
    pub response: Result<Option<UpdateDescriptor>, CheckError>,
    pub calls: Arc<AtomicU32>,
}

impl FakeUpdateServer {
    pub fn offering(version: &str) -> Self {
        Self {
            response: Ok(Some(descriptor(version))),
            calls: Arc::new(AtomicU32::new(0)),
        }
    }

    pub fn nothing() -> Self {
        Self {
            response: Ok(None),
            calls: Arc::new(AtomicU32::new(0)),
        }
    }

    pub fn failing(error: CheckError) -> Self {
        Self {
            response: Err(error),
            calls: Arc::new(AtomicU32::new(0)),
        }
    }
}

impl UpdateServer for FakeUpdateServer {
    fn check_for_update(
        &mut self,
        _current_version: &str,
    ) -> Result<Option<UpdateDescriptor>, CheckError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.response.clone()
    }
}

/// What the installer saw while the download ran
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DownloadObservation {
    pub update_in_progress: bool,
    pub telemetry_paused: bool,
}

#[derive(Clone, Default)]
pub struct InstallerProbe {
    pub downloads: Arc<AtomicU32>,
    pub installs: Arc<AtomicU32>,
    pub restarts: Arc<AtomicU32>,
    pub observed: Arc<Mutex<Vec<DownloadObservation>>>,
}

pub struct FakeInstaller {
    pub download_result: Result<(), OtaError>,
    pub install_result: Result<(), OtaError>,
    pub download_time: Duration,
    pub probe: InstallerProbe,
    watch: Option<(Arc<AppState>, Arc<PauseGate>)>,
}

impl FakeInstaller {
    pub fn succeeding() -> Self {
        Self {
            download_result: Ok(()),
            install_result: Ok(()),
            download_time: Duration::ZERO,
            probe: InstallerProbe::default(),
            watch: None,
        }
    }

    pub fn watching(mut self, state: Arc<AppState>, gate: Arc<PauseGate>) -> Self {
        self.watch = Some((state, gate));
        self
    }
}

impl OtaInstaller for FakeInstaller {
    fn download(&mut self, descriptor: &UpdateDescriptor) -> Result<FirmwareImage, OtaError> {
        self.probe.downloads.fetch_add(1, Ordering::SeqCst);
        if let Some((state, gate)) = &self.watch {
            self.probe.observed.lock().unwrap().push(DownloadObservation {
                update_in_progress: state.update_in_progress(),
                telemetry_paused: gate.is_paused(),
            });
        }
        if !self.download_time.is_zero() {
            std::thread::sleep(self.download_time);
        }
        self.download_result.clone()?;
        Ok(FirmwareImage {
            version: descriptor.version.clone(),
            size: descriptor.size,
            sha256: [0; 32],
        })
    }

    fn install(&mut self, _image: FirmwareImage) -> Result<(), OtaError> {
        self.probe.installs.fetch_add(1, Ordering::SeqCst);
        self.install_result.clone()
    }

    fn restart(&mut self) {
        self.probe.restarts.fetch_add(1, Ordering::SeqCst);
    }
}
