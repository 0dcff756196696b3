use anyhow::Result;
use esp_idf_svc::nvs::{EspDefaultNvsPartition, EspNvs, NvsDefault};
use serde::{Deserialize, Serialize};

// Largest JSON blob kept in NVS
const MAX_BLOB_SIZE: usize = 4096;

/// JSON values stored as NVS blobs under one namespace.
pub struct Storage {
    nvs: EspNvs<NvsDefault>,
}

impl Storage {
    pub fn new(partition: EspDefaultNvsPartition, namespace: &str) -> Result<Self> {
        let nvs = EspNvs::new(partition, namespace, true)?;
        Ok(Self { nvs })
    }

    pub fn read<T: for<'de> Deserialize<'de>>(&self, key: &str) -> Result<Option<T>> {
        let mut buf = vec![0u8; MAX_BLOB_SIZE];
        match self.nvs.get_blob(key, &mut buf)? {
            Some(data) => {
                let value: T = serde_json::from_slice(data)?;
                Ok(Some(value))
            }
            None => Ok(None),
        }
    }

    pub fn write<T: Serialize>(&mut self, key: &str, value: &T) -> Result<()> {
        let data = serde_json::to_vec(value)?;
        self.nvs.set_blob(key, &data)?;
        Ok(())
    }
}
