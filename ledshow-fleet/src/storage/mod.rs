pub mod memory;
pub mod sqlite;

use async_trait::async_trait;
use ledshow_core::{Device, ScheduleEntry, ScheduleId};

/// Persistence for the fleet membership.
///
/// Reload must be idempotent: upserting the same device twice yields one
/// record, keyed on its stable name.
#[async_trait]
pub trait DeviceStore: Send + Sync + 'static {
    /// Error type specific to this store implementation
    type Error: std::error::Error + Send + Sync + 'static;

    /// Insert or replace a device record by name.
    async fn upsert_device(&self, device: &Device) -> Result<(), Self::Error>;

    /// Insert or replace a batch of device records.
    async fn upsert_devices(&self, devices: &[Device]) -> Result<(), Self::Error>;

    /// Load every persisted device.
    async fn load_devices(&self) -> Result<Vec<Device>, Self::Error>;
}

/// Persistence for pending schedule entries.
#[async_trait]
pub trait ScheduleStore: Send + Sync + 'static {
    /// Error type specific to this store implementation
    type Error: std::error::Error + Send + Sync + 'static;

    /// Insert or replace a schedule entry by id.
    async fn upsert_entry(&self, entry: &ScheduleEntry) -> Result<(), Self::Error>;

    /// Remove an entry. Removing a nonexistent id is a no-op; the return
    /// value says whether anything was actually removed.
    async fn remove_entry(&self, id: ScheduleId) -> Result<bool, Self::Error>;

    /// Load every pending schedule entry.
    async fn load_entries(&self) -> Result<Vec<ScheduleEntry>, Self::Error>;
}
