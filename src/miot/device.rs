//! Device registry.

use crate::error::{ExporterError, Result};
use crate::metrics::traits::DeviceDirectory;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use tracing::{debug, info};

/// A device bound to the account.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceInfo {
    pub name: String,
    pub model: String,
    pub did: String,
    pub token: String,
}

/// An immutable view of the devices known after one fetch.
#[derive(Debug, Default, Clone)]
pub struct DeviceIndex {
    devices: Vec<DeviceInfo>,
    by_did: HashMap<String, usize>,
    by_model: HashMap<String, Vec<usize>>,
}

impl DeviceIndex {
    /// Build an index from records in listing order.
    ///
    /// A did listed twice keeps its first position and its last record.
    pub fn new(records: impl IntoIterator<Item = DeviceInfo>) -> Self {
        let mut index = Self::default();

        for device in records {
            if let Some(&slot) = index.by_did.get(&device.did) {
                index.devices[slot] = device;
                continue;
            }

            let slot = index.devices.len();
            index.by_did.insert(device.did.clone(), slot);
            index
                .by_model
                .entry(device.model.clone())
                .or_default()
                .push(slot);
            index.devices.push(device);
        }

        index
    }

    /// Decode raw device records, failing on the first one missing a required field.
    pub fn from_raw(raw: Vec<serde_json::Value>) -> Result<Self> {
        let records = raw
            .into_iter()
            .enumerate()
            .map(|(position, record)| {
                serde_json::from_value::<DeviceInfo>(record).map_err(|err| {
                    ExporterError::malformed_device(format!("record {}: {}", position, err))
                })
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Self::new(records))
    }

    pub fn get(&self, did: &str) -> Option<&DeviceInfo> {
        self.by_did.get(did).map(|&slot| &self.devices[slot])
    }

    /// All devices of a model, in listing order.
    pub fn devices_by_model(&self, model: &str) -> Vec<&DeviceInfo> {
        self.by_model
            .get(model)
            .map(|slots| slots.iter().map(|&slot| &self.devices[slot]).collect())
            .unwrap_or_default()
    }

    pub fn iter(&self) -> impl Iterator<Item = &DeviceInfo> {
        self.devices.iter()
    }

    pub fn len(&self) -> usize {
        self.devices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.devices.is_empty()
    }
}

/// Holds the current device index and swaps it wholesale on refresh.
#[derive(Debug, Default)]
pub struct DeviceRegistry {
    current: RwLock<Arc<DeviceIndex>>,
}

impl DeviceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fetch the device list and replace the registry contents.
    ///
    /// On failure the previous contents are kept.
    pub async fn refresh<D>(&self, directory: &D) -> Result<Arc<DeviceIndex>>
    where
        D: DeviceDirectory + ?Sized,
    {
        let raw = directory.list_devices().await.map_err(|err| match err {
            ExporterError::MalformedDevice(_) | ExporterError::RegistryFetch(_) => err,
            other => ExporterError::registry_fetch(other.to_string()),
        })?;

        let index = Arc::new(DeviceIndex::from_raw(raw)?);
        debug!(devices = index.len(), "Fetched device list");

        let mut current = self
            .current
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        if current.len() != index.len() {
            info!(
                previous = current.len(),
                current = index.len(),
                "Device registry changed size"
            );
        }
        *current = Arc::clone(&index);

        Ok(index)
    }

    /// The index as of the last successful refresh.
    pub fn snapshot(&self) -> Arc<DeviceIndex> {
        let current = self
            .current
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        Arc::clone(&current)
    }

    /// All known devices of a model, empty if none.
    pub fn devices_by_model(&self, model: &str) -> Vec<DeviceInfo> {
        self.snapshot()
            .devices_by_model(model)
            .into_iter()
            .cloned()
            .collect()
    }

    pub fn get(&self, did: &str) -> Option<DeviceInfo> {
        self.snapshot().get(did).cloned()
    }
}
