use std::collections::HashMap;
use std::sync::Arc;

use ledshow_core::{Device, DeviceName, Reachability, Target};
use tokio::sync::{Mutex, RwLock};

/// Errors for operations on unregistered identities.
#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    #[error("unknown device '{0}'")]
    NotFound(DeviceName),
}

/// Reachability/name filter for fleet listings.
#[derive(Debug, Clone, Default)]
pub struct FleetFilter {
    pub names: Option<Vec<DeviceName>>,
    pub reachability: Option<Vec<Reachability>>,
}

impl FleetFilter {
    fn matches(&self, device: &Device) -> bool {
        if let Some(names) = &self.names
            && !names.contains(&device.name)
        {
            return false;
        }

        if let Some(states) = &self.reachability
            && !states.contains(&device.reachability)
        {
            return false;
        }

        true
    }
}

/// The known fleet membership.
///
/// The registry-wide lock guards only membership; each device carries its own
/// mutex, so concurrent per-device updates (dispatch results, clock sweeps)
/// never serialize against each other.
#[derive(Clone, Default)]
pub struct FleetRegistry {
    inner: Arc<RwLock<HashMap<DeviceName, Arc<Mutex<Device>>>>>,
}

impl FleetRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add or overwrite a device by name. Idempotent; a duplicate register
    /// silently replaces the previous record.
    pub async fn register(&self, device: Device) {
        let mut map = self.inner.write().await;
        map.insert(device.name.clone(), Arc::new(Mutex::new(device)));
    }

    /// Register a device only if its name is not already known, preserving
    /// the runtime state of devices reloaded from storage.
    pub async fn register_if_absent(&self, device: Device) {
        let mut map = self.inner.write().await;
        map.entry(device.name.clone())
            .or_insert_with(|| Arc::new(Mutex::new(device)));
    }

    pub async fn get(&self, name: &DeviceName) -> Option<Arc<Mutex<Device>>> {
        let map = self.inner.read().await;
        map.get(name).cloned()
    }

    /// Resolve a target set to device handles. An explicit unknown name is an
    /// error; `All` on an empty fleet resolves to an empty set.
    pub async fn resolve(
        &self,
        target: &Target,
    ) -> Result<Vec<Arc<Mutex<Device>>>, RegistryError> {
        let map = self.inner.read().await;
        match target {
            Target::All => Ok(map.values().cloned().collect()),
            Target::Devices(names) => names
                .iter()
                .map(|name| {
                    map.get(name)
                        .cloned()
                        .ok_or_else(|| RegistryError::NotFound(name.clone()))
                })
                .collect(),
        }
    }

    /// Snapshot of devices matching the filter, sorted by name.
    pub async fn list(&self, filter: &FleetFilter) -> Vec<Device> {
        let handles: Vec<_> = {
            let map = self.inner.read().await;
            map.values().cloned().collect()
        };

        let mut devices = Vec::with_capacity(handles.len());
        for handle in handles {
            let device = handle.lock().await;
            if filter.matches(&device) {
                devices.push(device.clone());
            }
        }
        devices.sort_by(|a, b| a.name.cmp(&b.name));
        devices
    }

    /// Snapshot of the whole fleet, sorted by name.
    pub async fn snapshot_all(&self) -> Vec<Device> {
        self.list(&FleetFilter::default()).await
    }

    /// Devices are never destroyed, only marked unreachable.
    pub async fn mark_unreachable(&self, name: &DeviceName) -> Result<(), RegistryError> {
        let handle = self
            .get(name)
            .await
            .ok_or_else(|| RegistryError::NotFound(name.clone()))?;
        let mut device = handle.lock().await;
        device.reachability = Reachability::Unreachable;
        Ok(())
    }

    pub async fn len(&self) -> usize {
        self.inner.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.inner.read().await.is_empty()
    }
}
