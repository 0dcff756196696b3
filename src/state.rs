// Application state shared by the periodic tasks
// One AppState is created at startup and handed to every task behind an Arc.
// All fields sit behind a single mutex so a reading and its timestamp, or the
// update flag and the counters, always change together. No collaborator I/O
// happens while the lock is held.
//
// Field ownership:
// - connectivity: connectivity monitor
// - sensors_ready: startup sequence
// - update_in_progress: update coordinator only, through SuspendGuard
// - system_healthy: health monitor
// - reading fields, reading_count, alarm_count, stored/dropped readings: sensor sampler
// - send_count: telemetry reporter
// - update_check_count, last_update_check: update coordinator

use std::sync::{Mutex, MutexGuard, PoisonError};

use crate::sensors::Reading;

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct StateSnapshot {
    pub connectivity: bool,
    pub sensors_ready: bool,
    pub update_in_progress: bool,
    pub system_healthy: bool,

    // Monotonic counters, saturating rather than wrapping
    pub reading_count: u32,
    pub send_count: u32,
    pub update_check_count: u32,
    pub alarm_count: u32,

    /// Readings held by the offline store
    pub stored_readings: usize,
    /// Readings the offline store dropped to make room
    pub dropped_readings: u32,

    /// `None` until the first successful sample
    pub latest: Option<Reading>,
    /// Monotonic seconds of the most recent update check
    pub last_update_check: Option<u64>,
}

pub struct AppState {
    inner: Mutex<StateSnapshot>,
}

impl AppState {
    /// All flags false, all counters zero, no reading.
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(StateSnapshot::default()),
        }
    }

    // A panicking task must not take the others down with it
    fn lock(&self) -> MutexGuard<'_, StateSnapshot> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn snapshot(&self) -> StateSnapshot {
        *self.lock()
    }

    pub fn connectivity(&self) -> bool {
        self.lock().connectivity
    }

    /// Returns the previous value so callers can log transitions
    pub fn set_connectivity(&self, connected: bool) -> bool {
        std::mem::replace(&mut self.lock().connectivity, connected)
    }

    pub fn sensors_ready(&self) -> bool {
        self.lock().sensors_ready
    }

    pub fn mark_sensors_ready(&self) {
        self.lock().sensors_ready = true;
    }

    pub fn update_in_progress(&self) -> bool {
        self.lock().update_in_progress
    }

    /// Store a sample and bump `reading_count` as one unit. Timestamps never go
    /// backwards. Returns the new count.
    pub fn record_reading(&self, reading: Reading) -> u32 {
        let mut state = self.lock();
        let timestamp = match state.latest {
            Some(previous) => reading.timestamp.max(previous.timestamp),
            None => reading.timestamp,
        };
        state.latest = Some(Reading {
            timestamp,
            ..reading
        });
        state.reading_count = state.reading_count.saturating_add(1);
        state.reading_count
    }

    pub fn record_alarms(&self, count: u32) {
        let mut state = self.lock();
        state.alarm_count = state.alarm_count.saturating_add(count);
    }

    pub fn record_store_usage(&self, held: usize, dropped: u32) {
        let mut state = self.lock();
        state.stored_readings = held;
        state.dropped_readings = dropped;
    }

    pub fn record_send(&self) -> u32 {
        let mut state = self.lock();
        state.send_count = state.send_count.saturating_add(1);
        state.send_count
    }

    pub fn record_update_check(&self, now_secs: u64) -> u32 {
        let mut state = self.lock();
        state.update_check_count = state.update_check_count.saturating_add(1);
        state.last_update_check = Some(now_secs);
        state.update_check_count
    }

    pub fn set_system_healthy(&self, healthy: bool) {
        self.lock().system_healthy = healthy;
    }

    /// false -> true transition of the update flag. Returns false when an
    /// update already holds it.
    pub(crate) fn begin_update(&self) -> bool {
        let mut state = self.lock();
        if state.update_in_progress {
            return false;
        }
        state.update_in_progress = true;
        true
    }

    pub(crate) fn end_update(&self) {
        self.lock().update_in_progress = false;
    }
}

impl Default for AppState {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    fn reading(timestamp: u64) -> Reading {
        Reading {
            temperature: -18.5,
            humidity: 65.0,
            timestamp,
        }
    }

    #[test]
    fn starts_with_everything_cleared() {
        let snapshot = AppState::new().snapshot();
        assert_eq!(snapshot, StateSnapshot::default());
        assert!(snapshot.latest.is_none());
        assert!(!snapshot.update_in_progress);
    }

    #[test]
    fn zero_valued_reading_is_distinct_from_no_reading() {
        let state = AppState::new();
        state.record_reading(Reading {
            temperature: 0.0,
            humidity: 0.0,
            timestamp: 0,
        });
        let snapshot = state.snapshot();
        assert_eq!(snapshot.reading_count, 1);
        assert_eq!(snapshot.latest, Some(Reading::default()));
    }

    #[test]
    fn reading_timestamps_never_go_backwards() {
        let state = AppState::new();
        state.record_reading(reading(100));
        state.record_reading(reading(90));
        assert_eq!(state.snapshot().latest.map(|r| r.timestamp), Some(100));
        state.record_reading(reading(120));
        assert_eq!(state.snapshot().latest.map(|r| r.timestamp), Some(120));
    }

    #[test]
    fn update_flag_has_single_holder() {
        let state = AppState::new();
        assert!(state.begin_update());
        assert!(!state.begin_update());
        state.end_update();
        assert!(state.begin_update());
    }

    #[test]
    fn connectivity_returns_previous_value() {
        let state = AppState::new();
        assert!(!state.set_connectivity(true));
        assert!(state.set_connectivity(false));
        assert!(!state.connectivity());
    }

    #[test]
    fn update_check_records_time() {
        let state = AppState::new();
        assert_eq!(state.record_update_check(42), 1);
        let snapshot = state.snapshot();
        assert_eq!(snapshot.update_check_count, 1);
        assert_eq!(snapshot.last_update_check, Some(42));
    }

    #[test]
    fn concurrent_writers_lose_no_increments() {
        let state = Arc::new(AppState::new());
        let handles: Vec<_> = (0..4)
            .map(|i| {
                let state = state.clone();
                thread::spawn(move || {
                    for n in 0..250 {
                        if i % 2 == 0 {
                            state.record_reading(reading(n));
                        } else {
                            state.record_send();
                        }
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }
        let snapshot = state.snapshot();
        assert_eq!(snapshot.reading_count, 500);
        assert_eq!(snapshot.send_count, 500);
    }

    #[test]
    fn poisoned_lock_is_recovered() {
        let state = Arc::new(AppState::new());
        let poisoner = state.clone();
        let _ = thread::spawn(move || {
            let _guard = poisoner.lock();
            panic!("task crashed while holding state");
        })
        .join();
        state.record_send();
        assert_eq!(state.snapshot().send_count, 1);
    }
}
