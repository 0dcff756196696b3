// Cooperative pause between the update coordinator and the telemetry reporter
// The reporter brackets every transmission cycle with PauseGate::enter_cycle.
// The coordinator requests a pause and waits until no cycle is in flight; after
// that no new cycle starts until resume. Both sides decide under the same mutex,
// so a cycle either finished before the pause was confirmed or never starts.

use std::sync::{Condvar, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use crate::ota::OtaError;
use crate::state::AppState;

#[derive(Debug, Default)]
struct GateState {
    pause_requested: bool,
    in_flight: bool,
}

#[derive(Debug, Default)]
pub struct PauseGate {
    state: Mutex<GateState>,
    changed: Condvar,
}

/// Marks a reporter cycle in flight until dropped.
#[must_use]
pub struct CycleGuard<'a> {
    gate: &'a PauseGate,
}

impl Drop for CycleGuard<'_> {
    fn drop(&mut self) {
        self.gate.lock().in_flight = false;
        self.gate.changed.notify_all();
    }
}

impl PauseGate {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, GateState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Reporter side: `None` while paused.
    pub fn enter_cycle(&self) -> Option<CycleGuard<'_>> {
        let mut state = self.lock();
        if state.pause_requested {
            return None;
        }
        state.in_flight = true;
        Some(CycleGuard { gate: self })
    }

    /// Coordinator side: no new cycle starts after this returns.
    pub fn request_pause(&self) {
        self.lock().pause_requested = true;
    }

    /// Wait for an in-flight cycle to finish. Returns false on timeout, in
    /// which case the pause stays requested until `resume`.
    pub fn confirm_paused(&self, timeout: Duration) -> bool {
        let state = self.lock();
        let (state, _) = self
            .changed
            .wait_timeout_while(state, timeout, |s| s.pause_requested && s.in_flight)
            .unwrap_or_else(PoisonError::into_inner);
        state.pause_requested && !state.in_flight
    }

    pub fn resume(&self) {
        self.lock().pause_requested = false;
        self.changed.notify_all();
    }

    /// Pause requested and acknowledged
    pub fn is_paused(&self) -> bool {
        let state = self.lock();
        state.pause_requested && !state.in_flight
    }

    pub fn is_pause_requested(&self) -> bool {
        self.lock().pause_requested
    }
}

/// Holds the update flag and the telemetry pause for one update attempt.
///
/// Engaging sets `update_in_progress` and requests the pause; dropping the
/// guard clears the flag and resumes telemetry on every exit path. Only the
/// restart path calls [`SuspendGuard::disarm`].
pub struct SuspendGuard<'a> {
    state: &'a AppState,
    gate: &'a PauseGate,
    armed: bool,
}

impl<'a> SuspendGuard<'a> {
    /// `None` when another attempt already holds the update flag.
    pub fn engage(state: &'a AppState, gate: &'a PauseGate) -> Option<Self> {
        if !state.begin_update() {
            return None;
        }
        gate.request_pause();
        log::info!("Update in progress, telemetry pause requested");
        Some(Self {
            state,
            gate,
            armed: true,
        })
    }

    /// Block until telemetry has acknowledged the pause.
    pub fn confirm(&self, timeout: Duration) -> Result<(), OtaError> {
        if self.gate.confirm_paused(timeout) {
            log::info!("Telemetry paused");
            Ok(())
        } else {
            Err(OtaError::SuspendTimeout(timeout))
        }
    }

    /// Keep telemetry paused and the flag set; the device is about to reboot.
    pub fn disarm(mut self) {
        self.armed = false;
    }
}

impl Drop for SuspendGuard<'_> {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        self.state.end_update();
        self.gate.resume();
        log::info!("Update finished, telemetry resumed");
    }
}
