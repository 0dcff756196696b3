// Update collaborators for host runs: a server with an optional canned release
// and an installer that only verifies and logs.

use super::{
    is_newer, CheckError, FirmwareImage, ImageDigest, OtaError, OtaInstaller, UpdateDescriptor,
    UpdateServer, MAX_IMAGE_SIZE,
};

/// Reports `offered` whenever it is newer than the running version; reports
/// "no update" otherwise.
pub struct SimulatedUpdateServer {
    offered: Option<UpdateDescriptor>,
}

impl SimulatedUpdateServer {
    pub fn new() -> Self {
        Self { offered: None }
    }

    pub fn offering(descriptor: UpdateDescriptor) -> Self {
        Self::from_release(Some(descriptor))
    }

    /// Offer the configured release, if any
    pub fn from_release(offered: Option<UpdateDescriptor>) -> Self {
        if let Some(release) = &offered {
            log::info!("Simulated update server offering {}", release.version);
        }
        Self { offered }
    }
}

impl Default for SimulatedUpdateServer {
    fn default() -> Self {
        Self::new()
    }
}

impl UpdateServer for SimulatedUpdateServer {
    fn check_for_update(
        &mut self,
        current_version: &str,
    ) -> Result<Option<UpdateDescriptor>, CheckError> {
        Ok(self
            .offered
            .as_ref()
            .filter(|d| is_newer(&d.version, current_version))
            .cloned())
    }
}

/// "Downloads" a zero-filled image of the advertised size and checks it against
/// the advertised checksum. Restart ends the host process.
pub struct SimulatedInstaller {
    staged: Option<FirmwareImage>,
    exit_on_restart: bool,
}

impl SimulatedInstaller {
    pub fn new() -> Self {
        Self {
            staged: None,
            exit_on_restart: true,
        }
    }

    #[cfg(test)]
    pub(crate) fn without_exit() -> Self {
        Self {
            staged: None,
            exit_on_restart: false,
        }
    }
}

impl Default for SimulatedInstaller {
    fn default() -> Self {
        Self::new()
    }
}

impl OtaInstaller for SimulatedInstaller {
    fn download(&mut self, descriptor: &UpdateDescriptor) -> Result<FirmwareImage, OtaError> {
        if descriptor.size == 0 || descriptor.size > MAX_IMAGE_SIZE {
            return Err(OtaError::InvalidSize(descriptor.size));
        }

        let mut digest = ImageDigest::new();
        let chunk = [0u8; 4096];
        let mut remaining = descriptor.size;
        while remaining > 0 {
            let n = remaining.min(chunk.len());
            digest.update(&chunk[..n]);
            remaining -= n;
        }
        let sha256 = digest.finish(&descriptor.checksum)?;

        let image = FirmwareImage {
            version: descriptor.version.clone(),
            size: descriptor.size,
            sha256,
        };
        self.staged = Some(image.clone());
        log::info!("Simulated download of {} complete", descriptor.version);
        Ok(image)
    }

    fn install(&mut self, image: FirmwareImage) -> Result<(), OtaError> {
        match self.staged.take() {
            Some(staged) if staged == image => {
                log::info!("Simulated install of {} complete", image.version);
                Ok(())
            }
            _ => Err(OtaError::NotStaged),
        }
    }

    fn restart(&mut self) {
        log::warn!("Restart requested, exiting simulation");
        if self.exit_on_restart {
            std::process::exit(0);
        }
    }
}
