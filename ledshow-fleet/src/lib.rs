pub mod channel;
pub mod clocksync;
pub mod config;
pub mod dispatch;
pub mod registry;
pub mod remote;
pub mod schedule;
pub mod storage;

pub use channel::mock::{MockBehavior, MockChannel};
pub use channel::ssh::SshChannel;
pub use channel::{ChannelError, CommandChannel, ExecOutput};
pub use config::{
    ChannelConfig, ClockSyncConfig, Config, DispatchConfig, RemoteConfig, ScheduleConfig,
    ServerConfig, StorageConfig,
};
pub use dispatch::Dispatcher;
pub use registry::{FleetFilter, FleetRegistry, RegistryError};
pub use schedule::ScheduleBook;
pub use storage::memory::MemoryStore;
pub use storage::sqlite::SqliteStore;
pub use storage::{DeviceStore, ScheduleStore};
