// Firmware update task
// Every check period, after a grace delay at boot, the coordinator asks the
// update server for a newer image. An offer is only acted on inside the install
// window; outside it the offer is dropped and checked again next period.
// Applying an update pauses telemetry through a SuspendGuard, so once past
// Suspending the update flag is cleared and telemetry resumes unless the device
// is restarting. The sensor sampler is never paused.
//
// Idle -> Checking -> NoUpdate -> Idle
//                  -> UpdateAvailable -> GateCheck -> Deferred -> Idle
//                                                  -> Suspending -> Downloading -> Installing -> Restarting
//                                                                 \-> Failed -> Resuming -> Idle

use std::sync::Arc;
use std::time::Duration;

use super::{CycleFlow, PauseGate, PeriodicTask, SuspendGuard};
use crate::config::AgentConfig;
use crate::ota::{is_newer, CheckError, OtaError, OtaInstaller, UpdateDescriptor, UpdateServer};
use crate::state::AppState;
use crate::system::RuntimeInfo;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdatePhase {
    Idle,
    Checking,
    NoUpdate,
    UpdateAvailable,
    GateCheck,
    Deferred,
    Suspending,
    Downloading,
    Installing,
    Resuming,
    Failed,
    Restarting,
}

#[derive(Debug, Clone, PartialEq)]
pub enum UpdateOutcome {
    /// Offline or another attempt holds the update flag; nothing was counted
    Skipped,
    NoUpdate,
    CheckFailed(CheckError),
    /// Outside the install window, or wall clock not yet known
    Deferred { hour: Option<u8> },
    Failed(OtaError),
    Restarting,
}

pub struct UpdateCoordinator<S: UpdateServer, I: OtaInstaller> {
    config: Arc<AgentConfig>,
    state: Arc<AppState>,
    gate: Arc<PauseGate>,
    runtime: Arc<dyn RuntimeInfo>,
    server: S,
    installer: I,
    phase: UpdatePhase,
}

impl<S: UpdateServer, I: OtaInstaller> UpdateCoordinator<S, I> {
    pub fn new(
        config: Arc<AgentConfig>,
        state: Arc<AppState>,
        gate: Arc<PauseGate>,
        runtime: Arc<dyn RuntimeInfo>,
        server: S,
        installer: I,
    ) -> Self {
        Self {
            config,
            state,
            gate,
            runtime,
            server,
            installer,
            phase: UpdatePhase::Idle,
        }
    }

    pub fn phase(&self) -> UpdatePhase {
        self.phase
    }

    fn transition(&mut self, next: UpdatePhase) {
        log::debug!("OTA state {:?} -> {:?}", self.phase, next);
        self.phase = next;
    }

    /// One full pass of the update state machine.
    pub fn check_once(&mut self) -> UpdateOutcome {
        let snapshot = self.state.snapshot();
        if !snapshot.connectivity {
            log::debug!("No connectivity, skipping update check");
            return UpdateOutcome::Skipped;
        }
        if snapshot.update_in_progress {
            log::debug!("Update already in progress, skipping check");
            return UpdateOutcome::Skipped;
        }

        self.transition(UpdatePhase::Checking);
        let current = self.config.firmware_version.clone();
        log::info!("Checking for firmware update (running {})", current);
        let result = self.server.check_for_update(&current);
        let checks = self
            .state
            .record_update_check(self.runtime.monotonic_secs());

        let descriptor = match result {
            Ok(Some(descriptor)) if is_newer(&descriptor.version, &current) => descriptor,
            Ok(_) => {
                self.transition(UpdatePhase::NoUpdate);
                log::info!("Firmware is up to date (check #{})", checks);
                self.transition(UpdatePhase::Idle);
                return UpdateOutcome::NoUpdate;
            }
            Err(e) => {
                log::warn!("Update check #{} failed: {}", checks, e);
                self.transition(UpdatePhase::Idle);
                return UpdateOutcome::CheckFailed(e);
            }
        };

        self.transition(UpdatePhase::UpdateAvailable);
        log::info!(
            "Firmware {} available ({} bytes)",
            descriptor.version,
            descriptor.size
        );

        self.transition(UpdatePhase::GateCheck);
        let window = self.config.update_window;
        let hour = self.runtime.wall_clock_hour();
        match hour {
            Some(h) if window.contains(h) => {}
            Some(h) => {
                self.transition(UpdatePhase::Deferred);
                log::info!(
                    "Outside update window {} (hour {:02}), deferring",
                    window,
                    h
                );
                self.transition(UpdatePhase::Idle);
                return UpdateOutcome::Deferred { hour };
            }
            None => {
                self.transition(UpdatePhase::Deferred);
                log::info!("Wall clock not set yet, deferring update");
                self.transition(UpdatePhase::Idle);
                return UpdateOutcome::Deferred { hour };
            }
        }

        let state = self.state.clone();
        let gate = self.gate.clone();
        self.transition(UpdatePhase::Suspending);
        let Some(guard) = SuspendGuard::engage(&state, &gate) else {
            log::warn!("Update flag already held, abandoning attempt");
            self.transition(UpdatePhase::Idle);
            return UpdateOutcome::Skipped;
        };

        match self.apply(&guard, &descriptor) {
            Ok(()) => {
                self.transition(UpdatePhase::Restarting);
                guard.disarm();
                log::warn!("Firmware {} installed, restarting", descriptor.version);
                self.installer.restart();
                UpdateOutcome::Restarting
            }
            Err(e) => {
                self.transition(UpdatePhase::Failed);
                log::error!("Update to {} failed: {}", descriptor.version, e);
                self.transition(UpdatePhase::Resuming);
                drop(guard);
                self.transition(UpdatePhase::Idle);
                UpdateOutcome::Failed(e)
            }
        }
    }

    fn apply(
        &mut self,
        guard: &SuspendGuard<'_>,
        descriptor: &UpdateDescriptor,
    ) -> Result<(), OtaError> {
        guard.confirm(self.config.suspend_timeout())?;

        self.transition(UpdatePhase::Downloading);
        log::info!("Downloading firmware from {}", descriptor.url);
        let image = self.installer.download(descriptor)?;

        self.transition(UpdatePhase::Installing);
        log::info!("Installing firmware {} ({} bytes)", image.version, image.size);
        self.installer.install(image)
    }
}

impl<S, I> PeriodicTask for UpdateCoordinator<S, I>
where
    S: UpdateServer + 'static,
    I: OtaInstaller + 'static,
{
    fn period(&self) -> Duration {
        self.config.check_period()
    }

    fn initial_delay(&self) -> Duration {
        self.config.initial_check_delay()
    }

    fn run_cycle(&mut self) -> CycleFlow {
        match self.check_once() {
            UpdateOutcome::Restarting => CycleFlow::Stop,
            _ => CycleFlow::Continue,
        }
    }
}
