// Hour-of-day gate for firmware installs

use anyhow::{bail, Result};
use serde::{Deserialize, Serialize};

/// Permitted install hours, `[start_hour, end_hour)` in local time.
///
/// A window whose start is after its end wraps past midnight (22..3 covers
/// 22:00-02:59). Equal start and end hours leave the whole day open.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct UpdateWindow {
    pub start_hour: u8,
    pub end_hour: u8,
}

impl Default for UpdateWindow {
    fn default() -> Self {
        Self::new(2, 4)
    }
}

impl UpdateWindow {
    pub const fn new(start_hour: u8, end_hour: u8) -> Self {
        Self {
            start_hour,
            end_hour,
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.start_hour > 23 || self.end_hour > 23 {
            bail!(
                "update window {}..{} must use hours 0-23",
                self.start_hour,
                self.end_hour
            );
        }
        Ok(())
    }

    /// `end_hour` is exclusive.
    pub fn contains(&self, hour: u8) -> bool {
        if hour > 23 {
            return false;
        }
        let (start, end) = (self.start_hour, self.end_hour);
        if start == end {
            true
        } else if start < end {
            start <= hour && hour < end
        } else {
            hour >= start || hour < end
        }
    }
}

impl std::fmt::Display for UpdateWindow {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:02}:00-{:02}:00", self.start_hour, self.end_hour)
    }
}
