use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

#[derive(Debug, Deserialize)]
pub struct Config {
    pub server: ServerConfig,
    pub storage: StorageConfig,
    pub channel: ChannelConfig,
    pub dispatch: DispatchConfig,
    pub clocksync: ClockSyncConfig,
    pub schedule: ScheduleConfig,
    pub remote: RemoteConfig,
    /// Seed inventory registered at startup (idempotent).
    #[serde(default)]
    pub devices: Vec<SeedDevice>,
}

#[derive(Debug, Deserialize)]
pub struct ServerConfig {
    /// Address for the daemon HTTP server to listen on
    pub http_addr: SocketAddr,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum StorageConfig {
    Memory,
    Sqlite { path: PathBuf },
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ChannelConfig {
    Ssh {
        /// Remote user (the playbook account on the hats)
        user: String,
        /// ssh ConnectTimeout, seconds
        connect_timeout_secs: u64,
    },
    Mock {
        /// Simulated round trip per command
        latency_ms: u64,
    },
}

#[derive(Debug, Clone, Deserialize)]
pub struct DispatchConfig {
    /// Per-device timeout, seconds
    pub timeout_secs: u64,
    /// Max concurrent in-flight commands per dispatch
    pub pool_size: usize,
}

impl DispatchConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ClockSyncConfig {
    /// Interval between sweeps, seconds
    pub interval_secs: u64,
    /// Max tolerated offset magnitude, milliseconds
    pub threshold_ms: u64,
    /// Offsets older than this are treated as unknown, seconds
    pub staleness_secs: u64,
    /// Per-device timeout for an offset query, seconds
    pub query_timeout_secs: u64,
    /// Issue a corrective step-clock dispatch when a device drifts
    pub step_on_drift: bool,
}

impl ClockSyncConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }

    pub fn query_timeout(&self) -> Duration {
        Duration::from_secs(self.query_timeout_secs)
    }

    pub fn threshold(&self) -> jiff::SignedDuration {
        jiff::SignedDuration::from_millis(self.threshold_ms as i64)
    }

    pub fn staleness(&self) -> jiff::SignedDuration {
        jiff::SignedDuration::from_secs(self.staleness_secs as i64)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ScheduleConfig {
    /// Trigger loop tick, milliseconds
    pub tick_ms: u64,
}

impl ScheduleConfig {
    pub fn tick(&self) -> Duration {
        Duration::from_millis(self.tick_ms)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct RemoteConfig {
    /// Path of the light-show runner on the devices
    pub program: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SeedDevice {
    pub name: String,
    pub addr: String,
}

impl Config {
    pub fn load(path: &Path) -> color_eyre::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        Ok(config)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server: ServerConfig {
                http_addr: "0.0.0.0:8083".parse().unwrap(),
            },
            storage: StorageConfig::Memory,
            channel: ChannelConfig::Ssh {
                user: "pi".to_string(),
                connect_timeout_secs: 5,
            },
            dispatch: DispatchConfig {
                timeout_secs: 10,
                pool_size: 16,
            },
            clocksync: ClockSyncConfig {
                interval_secs: 60,
                threshold_ms: 150,
                staleness_secs: 300,
                query_timeout_secs: 5,
                step_on_drift: false,
            },
            schedule: ScheduleConfig { tick_ms: 1000 },
            remote: RemoteConfig {
                program: "/home/pi/hat/lights.py".to_string(),
            },
            devices: Vec::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn full_config_parses() {
        let toml_src = r#"
            [server]
            http_addr = "0.0.0.0:8083"

            [storage]
            type = "sqlite"
            path = "fleet.db"

            [channel]
            type = "ssh"
            user = "pi"
            connect_timeout_secs = 5

            [dispatch]
            timeout_secs = 10
            pool_size = 8

            [clocksync]
            interval_secs = 30
            threshold_ms = 100
            staleness_secs = 120
            query_timeout_secs = 3
            step_on_drift = true

            [schedule]
            tick_ms = 500

            [remote]
            program = "/home/pi/hat/lights.py"

            [[devices]]
            name = "hat-1"
            addr = "10.0.0.11"

            [[devices]]
            name = "hat-2"
            addr = "10.0.0.12"
        "#;

        let config: Config = toml::from_str(toml_src).unwrap();
        assert!(matches!(config.storage, StorageConfig::Sqlite { .. }));
        assert!(config.clocksync.step_on_drift);
        assert_eq!(config.dispatch.pool_size, 8);
        assert_eq!(config.devices.len(), 2);
        assert_eq!(config.devices[0].name, "hat-1");
    }
}
