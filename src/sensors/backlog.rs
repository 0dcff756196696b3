// Local record of recent readings so data survives short connectivity gaps

use std::fmt;

use super::Reading;

/// Readings kept before the oldest are overwritten
pub const OFFLINE_CAPACITY: usize = 100;

/// Sink for successful samples. Implementations may persist to flash; the
/// sampler only logs failures.
pub trait ReadingStore: Send {
    fn save_reading(&mut self, reading: &Reading) -> Result<(), StoreError>;

    /// Readings currently held
    fn len(&self) -> usize;

    /// Readings dropped to make room since boot
    fn overwritten(&self) -> u32 {
        0
    }

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum StoreError {
    Io(String),
}

impl fmt::Display for StoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StoreError::Io(e) => write!(f, "reading store I/O error: {}", e),
        }
    }
}

impl std::error::Error for StoreError {}

/// Fixed-size in-memory ring of the most recent readings, no allocation after
/// construction.
pub struct OfflineBacklog<const N: usize = OFFLINE_CAPACITY> {
    buffer: [Reading; N],
    head: usize,
    len: usize,
    overwritten: u32,
}

impl<const N: usize> OfflineBacklog<N> {
    pub fn new() -> Self {
        Self {
            buffer: [Reading::default(); N],
            head: 0,
            len: 0,
            overwritten: 0,
        }
    }

    /// Push a new reading, overwriting the oldest if full
    pub fn push(&mut self, reading: Reading) {
        if self.len == N {
            self.overwritten = self.overwritten.saturating_add(1);
        }
        self.buffer[self.head] = reading;
        self.head = (self.head + 1) % N;
        if self.len < N {
            self.len += 1;
        }
    }

}

impl<const N: usize> Default for OfflineBacklog<N> {
    fn default() -> Self {
        Self::new()
    }
}

impl<const N: usize> ReadingStore for OfflineBacklog<N> {
    fn save_reading(&mut self, reading: &Reading) -> Result<(), StoreError> {
        self.push(*reading);
        Ok(())
    }

    fn len(&self) -> usize {
        self.len
    }

    fn overwritten(&self) -> u32 {
        self.overwritten
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn reading(timestamp: u64) -> Reading {
        Reading {
            temperature: -18.0,
            humidity: 60.0,
            timestamp,
        }
    }

    fn stamps<const N: usize>(backlog: &OfflineBacklog<N>) -> Vec<u64> {
        let mut stamps: Vec<u64> = backlog.buffer[..backlog.len]
            .iter()
            .map(|r| r.timestamp)
            .collect();
        stamps.sort_unstable();
        stamps
    }

    #[test]
    fn overwrites_oldest_when_full() {
        let mut backlog: OfflineBacklog<3> = OfflineBacklog::new();
        assert!(backlog.is_empty());

        for ts in 1..=3 {
            backlog.save_reading(&reading(ts)).unwrap();
        }
        assert_eq!(stamps(&backlog), vec![1, 2, 3]);
        assert_eq!(backlog.overwritten(), 0);

        backlog.save_reading(&reading(4)).unwrap();
        assert_eq!(stamps(&backlog), vec![2, 3, 4]);
        assert_eq!(backlog.overwritten(), 1);
        assert_eq!(backlog.len(), 3);
    }

    #[test]
    fn overwrite_count_keeps_climbing() {
        let mut backlog: OfflineBacklog<2> = OfflineBacklog::new();
        for ts in 0..10 {
            backlog.push(reading(ts));
        }
        assert_eq!(backlog.len(), 2);
        assert_eq!(backlog.overwritten(), 8);
        assert_eq!(stamps(&backlog), vec![8, 9]);
    }
}
