// Wall-clock helpers shared by the platform runtimes

use std::time::{SystemTime, UNIX_EPOCH};

/// Anything before 2024-01-01 means SNTP has not set the clock yet
pub const MIN_VALID_EPOCH_SECS: u64 = 1_704_067_200;

/// Local hour for a Unix timestamp, or `None` if the clock is clearly unset.
pub fn local_hour(unix_secs: u64, utc_offset_hours: i8) -> Option<u8> {
    if unix_secs < MIN_VALID_EPOCH_SECS {
        return None;
    }
    let utc_hour = ((unix_secs / 3600) % 24) as i64;
    Some((utc_hour + utc_offset_hours as i64).rem_euclid(24) as u8)
}

pub fn current_local_hour(utc_offset_hours: i8) -> Option<u8> {
    let now = SystemTime::now().duration_since(UNIX_EPOCH).ok()?;
    local_hour(now.as_secs(), utc_offset_hours)
}

pub fn format_uptime(total_secs: u64) -> String {
    let hours = total_secs / 3600;
    let minutes = (total_secs % 3600) / 60;
    let seconds = total_secs % 60;

    if hours > 0 {
        format!("{hours:02}:{minutes:02}:{seconds:02}")
    } else {
        format!("{minutes:02}:{seconds:02}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // 2025-03-01 02:30:00 UTC
    const SAMPLE: u64 = 1_740_796_200;

    #[test]
    fn hour_applies_offset_and_wraps() {
        assert_eq!(local_hour(SAMPLE, 0), Some(2));
        assert_eq!(local_hour(SAMPLE, 1), Some(3));
        assert_eq!(local_hour(SAMPLE, -3), Some(23));
        assert_eq!(local_hour(SAMPLE, 14), Some(16));
    }

    #[test]
    fn unsynchronised_clock_has_no_hour() {
        assert_eq!(local_hour(42, 0), None);
        assert_eq!(local_hour(MIN_VALID_EPOCH_SECS - 1, 0), None);
    }

    #[test]
    fn uptime_formats_with_and_without_hours() {
        assert_eq!(format_uptime(65), "01:05");
        assert_eq!(format_uptime(3 * 3600 + 2 * 60 + 1), "03:02:01");
    }
}
