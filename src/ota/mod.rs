// OTA (Over-The-Air) update module

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::cmp::Ordering;
use std::fmt;
use std::time::Duration;

pub mod simulated;
pub mod window;

#[cfg(target_os = "espidf")]
pub mod manager;
#[cfg(target_os = "espidf")]
pub mod server;

pub use simulated::{SimulatedInstaller, SimulatedUpdateServer};
pub use window::UpdateWindow;

// OTA update flow:
// 1. Ask the update server for a version newer than the running one
// 2. Gate on the install window
// 3. Pause telemetry, download and verify the image into the spare partition
// 4. Set boot partition and restart; on any failure resume normal operation

/// Answers whether a newer firmware than `current_version` is published.
pub trait UpdateServer: Send {
    fn check_for_update(
        &mut self,
        current_version: &str,
    ) -> Result<Option<UpdateDescriptor>, CheckError>;
}

/// Fetches and applies firmware images. `install` must be atomic: a failed
/// install leaves the running firmware bootable.
pub trait OtaInstaller: Send {
    fn download(&mut self, descriptor: &UpdateDescriptor) -> Result<FirmwareImage, OtaError>;

    fn install(&mut self, image: FirmwareImage) -> Result<(), OtaError>;

    /// Reboot into the freshly installed image. Does not return on hardware.
    fn restart(&mut self);
}

/// Published release metadata (`version.json` on the update server).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct UpdateDescriptor {
    pub version: String,
    pub url: String,
    pub size: usize,
    /// Hex SHA-256 of the image
    pub checksum: String,
}

/// An image that was downloaded and verified, ready to be made bootable.
#[derive(Debug, Clone, PartialEq)]
pub struct FirmwareImage {
    pub version: String,
    pub size: usize,
    pub sha256: [u8; 32],
}

#[derive(Debug, Clone, PartialEq)]
pub enum CheckError {
    NotConnected,
    Http(u16),
    Io(String),
    Malformed(String),
}

impl fmt::Display for CheckError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CheckError::NotConnected => write!(f, "update server unreachable"),
            CheckError::Http(status) => write!(f, "update server answered HTTP {}", status),
            CheckError::Io(e) => write!(f, "update check I/O error: {}", e),
            CheckError::Malformed(e) => write!(f, "malformed version info: {}", e),
        }
    }
}

impl std::error::Error for CheckError {}

#[derive(Debug, Clone, PartialEq)]
pub enum OtaError {
    NoUpdatePartition,
    InvalidSize(usize),
    Http(u16),
    Io(String),
    ChecksumMismatch,
    WriteFailed,
    ValidationFailed,
    BootPartitionFailed,
    /// `install` called with an image the installer did not stage
    NotStaged,
    /// Telemetry did not confirm its pause in time
    SuspendTimeout(Duration),
}

impl fmt::Display for OtaError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OtaError::NoUpdatePartition => write!(f, "no OTA partition available"),
            OtaError::InvalidSize(size) => write!(f, "invalid firmware size {}", size),
            OtaError::Http(status) => write!(f, "firmware download answered HTTP {}", status),
            OtaError::Io(e) => write!(f, "firmware download I/O error: {}", e),
            OtaError::ChecksumMismatch => write!(f, "firmware checksum mismatch"),
            OtaError::WriteFailed => write!(f, "writing OTA partition failed"),
            OtaError::ValidationFailed => write!(f, "firmware image validation failed"),
            OtaError::BootPartitionFailed => write!(f, "setting boot partition failed"),
            OtaError::NotStaged => write!(f, "image was not staged by this installer"),
            OtaError::SuspendTimeout(t) => write!(f, "telemetry did not pause within {:?}", t),
        }
    }
}

impl std::error::Error for OtaError {}

/// Largest image accepted, the size of one app partition
pub const MAX_IMAGE_SIZE: usize = 4 * 1024 * 1024;

/// Dotted numeric version, `v` prefix and `-`/`+` suffixes ignored.
fn parse_version(version: &str) -> Option<Vec<u64>> {
    let core = version
        .trim()
        .trim_start_matches(['v', 'V'])
        .split(['-', '+'])
        .next()?;
    if core.is_empty() {
        return None;
    }
    core.split('.').map(|part| part.parse::<u64>().ok()).collect()
}

/// True when `candidate` should replace `current`.
pub fn is_newer(candidate: &str, current: &str) -> bool {
    match (parse_version(candidate), parse_version(current)) {
        (Some(mut a), Some(mut b)) => {
            let len = a.len().max(b.len());
            a.resize(len, 0);
            b.resize(len, 0);
            a.cmp(&b) == Ordering::Greater
        }
        _ => candidate.trim() != current.trim(),
    }
}

pub fn to_hex(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{:02x}", b)).collect()
}

/// Incremental SHA-256 over a streamed image.
pub struct ImageDigest {
    hasher: Sha256,
    bytes: usize,
}

impl ImageDigest {
    pub fn new() -> Self {
        Self {
            hasher: Sha256::new(),
            bytes: 0,
        }
    }

    pub fn update(&mut self, chunk: &[u8]) {
        self.hasher.update(chunk);
        self.bytes += chunk.len();
    }

    pub fn bytes(&self) -> usize {
        self.bytes
    }

    /// Compare against the published hex checksum (case-insensitive).
    pub fn finish(self, expected_hex: &str) -> Result<[u8; 32], OtaError> {
        let digest: [u8; 32] = self.hasher.finalize().into();
        if to_hex(&digest).eq_ignore_ascii_case(expected_hex.trim()) {
            Ok(digest)
        } else {
            Err(OtaError::ChecksumMismatch)
        }
    }
}

impl Default for ImageDigest {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn numeric_versions_compare_by_component() {
        assert!(is_newer("1.2.1", "1.2.0"));
        assert!(is_newer("1.10.0", "1.9.9"));
        assert!(is_newer("v2.0", "1.9.9"));
        assert!(!is_newer("1.2.0", "1.2.0"));
        assert!(!is_newer("1.2", "1.2.0"));
        assert!(!is_newer("1.1.9", "1.2.0"));
    }

    #[test]
    fn suffixes_are_ignored() {
        assert!(!is_newer("1.2.0-rc1", "1.2.0"));
        assert!(is_newer("1.3.0+build7", "1.2.0"));
    }

    #[test]
    fn unparsable_versions_fall_back_to_inequality() {
        assert!(is_newer("nightly-abc", "1.2.0"));
        assert!(!is_newer("nightly", "nightly"));
    }

    #[test]
    fn digest_matches_published_checksum() {
        let mut digest = ImageDigest::new();
        digest.update(b"ab");
        digest.update(b"c");
        assert_eq!(digest.bytes(), 3);
        // SHA-256("abc")
        let expected = "BA7816BF8F01CFEA414140DE5DAE2223B00361A396177A9CB410FF61F20015AD";
        let sha = digest.finish(expected).unwrap();
        assert_eq!(to_hex(&sha), expected.to_ascii_lowercase());
    }

    #[test]
    fn digest_rejects_wrong_checksum() {
        let mut digest = ImageDigest::new();
        digest.update(b"abc");
        assert_eq!(digest.finish("00"), Err(OtaError::ChecksumMismatch));
    }

    #[test]
    fn descriptor_parses_version_json() {
        let descriptor: UpdateDescriptor = serde_json::from_str(
            r#"{"version":"1.3.0","url":"http://ota/fw.bin","size":1024,"checksum":"ab"}"#,
        )
        .unwrap();
        assert_eq!(descriptor.version, "1.3.0");
        assert_eq!(descriptor.size, 1024);
    }
}
