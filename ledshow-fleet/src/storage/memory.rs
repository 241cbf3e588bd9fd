use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;
use ledshow_core::{Device, DeviceName, ScheduleEntry, ScheduleId};

use crate::storage::{DeviceStore, ScheduleStore};

/// In-memory store implementation.
/// This is primarily intended for testing and as a reference
/// implementation of the store traits.
#[derive(Clone, Default)]
pub struct MemoryStore {
    devices: Arc<Mutex<HashMap<DeviceName, Device>>>,
    entries: Arc<Mutex<HashMap<ScheduleId, ScheduleEntry>>>,
}

/// Error type for MemoryStore
#[derive(Debug)]
pub enum MemoryStoreError {
    MutexPoisoned(String),
}

impl std::error::Error for MemoryStoreError {}

impl fmt::Display for MemoryStoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MemoryStoreError::MutexPoisoned(msg) => write!(f, "Mutex poisoned: {}", msg),
        }
    }
}

impl<T> From<PoisonError<T>> for MemoryStoreError {
    fn from(err: PoisonError<T>) -> Self {
        MemoryStoreError::MutexPoisoned(err.to_string())
    }
}

#[async_trait]
impl DeviceStore for MemoryStore {
    type Error = MemoryStoreError;

    async fn upsert_device(&self, device: &Device) -> Result<(), Self::Error> {
        let mut map = self.devices.lock()?;
        map.insert(device.name.clone(), device.clone());
        Ok(())
    }

    async fn upsert_devices(&self, devices: &[Device]) -> Result<(), Self::Error> {
        let mut map = self.devices.lock()?;
        for device in devices {
            map.insert(device.name.clone(), device.clone());
        }
        Ok(())
    }

    async fn load_devices(&self) -> Result<Vec<Device>, Self::Error> {
        let map = self.devices.lock()?;
        let mut devices: Vec<Device> = map.values().cloned().collect();
        devices.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(devices)
    }
}

#[async_trait]
impl ScheduleStore for MemoryStore {
    type Error = MemoryStoreError;

    async fn upsert_entry(&self, entry: &ScheduleEntry) -> Result<(), Self::Error> {
        let mut map = self.entries.lock()?;
        map.insert(entry.id, entry.clone());
        Ok(())
    }

    async fn remove_entry(&self, id: ScheduleId) -> Result<bool, Self::Error> {
        let mut map = self.entries.lock()?;
        Ok(map.remove(&id).is_some())
    }

    async fn load_entries(&self) -> Result<Vec<ScheduleEntry>, Self::Error> {
        let map = self.entries.lock()?;
        let mut entries: Vec<ScheduleEntry> = map.values().cloned().collect();
        entries.sort_by_key(|e| e.id.0);
        Ok(entries)
    }
}
