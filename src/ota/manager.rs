// Writes images into the spare app partition with the raw ESP-IDF OTA API

use core::ffi::c_void;
use embedded_svc::http::client::Client;
use embedded_svc::http::Method;
use embedded_svc::io::Read;
use esp_idf_svc::http::client::{Configuration as HttpConfig, EspHttpConnection};
use esp_idf_sys::{
    esp_ota_abort, esp_ota_begin, esp_ota_end, esp_ota_get_next_update_partition,
    esp_ota_handle_t, esp_ota_set_boot_partition, esp_ota_write, esp_partition_t, esp_restart,
    ESP_OK,
};
use std::time::Duration;

use super::{
    to_hex, FirmwareImage, ImageDigest, OtaError, OtaInstaller, UpdateDescriptor, MAX_IMAGE_SIZE,
};

const CHUNK_SIZE: usize = 4096;

pub struct EspOtaInstaller {
    timeout: Duration,
    /// Partition holding the verified but not yet bootable image
    staged: Option<(FirmwareImage, *const esp_partition_t)>,
}

// The partition pointer refers to the static partition table
unsafe impl Send for EspOtaInstaller {}

impl EspOtaInstaller {
    pub fn new(timeout: Duration) -> Self {
        Self {
            timeout,
            staged: None,
        }
    }

    fn write_image(
        &self,
        descriptor: &UpdateDescriptor,
        handle: esp_ota_handle_t,
    ) -> Result<[u8; 32], OtaError> {
        let config = HttpConfig {
            buffer_size: Some(CHUNK_SIZE),
            timeout: Some(self.timeout),
            ..Default::default()
        };
        let connection =
            EspHttpConnection::new(&config).map_err(|e| OtaError::Io(format!("{:?}", e)))?;
        let mut client = Client::wrap(connection);
        let request = client
            .request(Method::Get, &descriptor.url, &[])
            .map_err(|e| OtaError::Io(format!("{:?}", e)))?;
        let mut response = request
            .submit()
            .map_err(|e| OtaError::Io(format!("{:?}", e)))?;
        if response.status() != 200 {
            return Err(OtaError::Http(response.status()));
        }

        let mut digest = ImageDigest::new();
        let mut buf = [0u8; CHUNK_SIZE];
        let mut last_progress = 0;
        loop {
            let bytes_read = response
                .read(&mut buf)
                .map_err(|e| OtaError::Io(format!("{:?}", e)))?;
            if bytes_read == 0 {
                break;
            }
            if digest.bytes() + bytes_read > descriptor.size {
                return Err(OtaError::InvalidSize(digest.bytes() + bytes_read));
            }

            let result = unsafe {
                esp_ota_write(handle, buf.as_ptr() as *const c_void, bytes_read as _)
            };
            if result != ESP_OK {
                return Err(OtaError::WriteFailed);
            }
            digest.update(&buf[..bytes_read]);

            let progress = digest.bytes() * 100 / descriptor.size;
            if progress >= last_progress + 10 {
                log::info!("OTA progress: {}% ({}/{})", progress, digest.bytes(), descriptor.size);
                last_progress = progress;
            }
        }

        if digest.bytes() != descriptor.size {
            return Err(OtaError::InvalidSize(digest.bytes()));
        }
        digest.finish(&descriptor.checksum)
    }
}

impl OtaInstaller for EspOtaInstaller {
    fn download(&mut self, descriptor: &UpdateDescriptor) -> Result<FirmwareImage, OtaError> {
        if descriptor.size == 0 || descriptor.size > MAX_IMAGE_SIZE {
            return Err(OtaError::InvalidSize(descriptor.size));
        }
        self.staged = None;

        let partition = unsafe { esp_ota_get_next_update_partition(core::ptr::null()) };
        if partition.is_null() {
            return Err(OtaError::NoUpdatePartition);
        }

        let mut handle: esp_ota_handle_t = 0;
        let result = unsafe { esp_ota_begin(partition, descriptor.size as _, &mut handle) };
        if result != ESP_OK {
            return Err(OtaError::WriteFailed);
        }

        let sha256 = match self.write_image(descriptor, handle) {
            Ok(sha256) => sha256,
            Err(e) => {
                unsafe { esp_ota_abort(handle) };
                return Err(e);
            }
        };

        let result = unsafe { esp_ota_end(handle) };
        if result != ESP_OK {
            return Err(OtaError::ValidationFailed);
        }

        log::info!("Firmware {} verified, sha256 {}", descriptor.version, to_hex(&sha256));
        let image = FirmwareImage {
            version: descriptor.version.clone(),
            size: descriptor.size,
            sha256,
        };
        self.staged = Some((image.clone(), partition));
        Ok(image)
    }

    fn install(&mut self, image: FirmwareImage) -> Result<(), OtaError> {
        let partition = match self.staged.take() {
            Some((staged, partition)) if staged == image => partition,
            _ => return Err(OtaError::NotStaged),
        };
        let result = unsafe { esp_ota_set_boot_partition(partition) };
        if result != ESP_OK {
            return Err(OtaError::BootPartitionFailed);
        }
        Ok(())
    }

    fn restart(&mut self) {
        // Let the log line reach the UART
        std::thread::sleep(Duration::from_secs(1));
        unsafe { esp_restart() };
    }
}
