use std::fmt;

use serde::{Deserialize, Serialize};
use ulid::Ulid;

// We use `Box<str>` for strings that are written once and read many times.
// This keeps fleet snapshots compact and avoids accidental growth.
type BoxStr = Box<str>;

pub mod command;
pub mod lights;
pub mod schedule;

pub use command::{Command, CommandError, CommandKind, Target};
pub use lights::{LightState, Pattern};
pub use schedule::{ScheduleEntry, TimeSpec, TimeSpecError};

/// Stable identity of a player device: its inventory hostname.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct DeviceName(pub BoxStr);

impl DeviceName {
    pub fn new(name: impl Into<BoxStr>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DeviceName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(&self.0)
    }
}

/// Unique identifier for a schedule entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ScheduleId(pub Ulid);

impl fmt::Display for ScheduleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Last-known reachability of a device over its command channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Reachability {
    Reachable,
    Unreachable,
    Unknown,
}

/// A single clock offset observation for a device, signed seconds
/// relative to the reference time source.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ClockOffset {
    pub seconds: f64,
    pub measured_at: jiff::Timestamp,
}

/// A registered player device in the fleet.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Device {
    /// Stable identity of this device.
    pub name: DeviceName,
    /// Network address the command channel connects to.
    pub addr: BoxStr,
    /// Last-known reachability over the command channel.
    pub reachability: Reachability,
    /// Most recent clock offset observation, if any.
    pub clock: Option<ClockOffset>,
    /// Current light-pattern state.
    pub lights: LightState,
    /// Registration timestamp.
    pub registered_at: jiff::Timestamp,
}

impl Device {
    pub fn new(name: DeviceName, addr: impl Into<BoxStr>) -> Self {
        Self {
            name,
            addr: addr.into(),
            reachability: Reachability::Unknown,
            clock: None,
            lights: LightState::Stopped,
            registered_at: jiff::Timestamp::now(),
        }
    }

    /// Clock offset in seconds, or `None` when no observation exists or the
    /// last observation is older than the staleness window. Stale readings
    /// are treated as unknown, never trusted.
    pub fn clock_offset(
        &self,
        staleness: jiff::SignedDuration,
        now: jiff::Timestamp,
    ) -> Option<f64> {
        let clock = self.clock?;
        if now.duration_since(clock.measured_at) > staleness {
            return None;
        }
        Some(clock.seconds)
    }

    /// Whether the device clock is within `threshold` of the reference.
    /// `None` when the offset is unknown or stale.
    pub fn in_sync(
        &self,
        threshold: jiff::SignedDuration,
        staleness: jiff::SignedDuration,
        now: jiff::Timestamp,
    ) -> Option<bool> {
        let offset = self.clock_offset(staleness, now)?;
        Some(offset.abs() <= threshold.as_secs_f64().abs())
    }
}

/// Per-device outcome of a dispatch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DispatchStatus {
    Succeeded,
    Failed,
    TimedOut,
}

/// One dispatch outcome for one targeted device.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DispatchResult {
    pub device: DeviceName,
    pub status: DispatchStatus,
    /// Error detail for failed or timed-out targets.
    pub detail: Option<BoxStr>,
}

/// Aggregate outcome of a batch dispatch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BatchOutcome {
    AllSucceeded,
    PartialFailure,
    AllFailed,
    NoTargets,
}

impl BatchOutcome {
    /// Process exit code for the operator interface: 0 when every target
    /// succeeded, 2 on partial failure, 1 when all failed or nothing matched.
    pub fn exit_code(self) -> u8 {
        match self {
            BatchOutcome::AllSucceeded => 0,
            BatchOutcome::PartialFailure => 2,
            BatchOutcome::AllFailed | BatchOutcome::NoTargets => 1,
        }
    }
}

/// The collected per-device results of one dispatch call.
#[derive(Debug, Clone, Default)]
pub struct DispatchReport {
    pub results: Vec<DispatchResult>,
}

impl DispatchReport {
    pub fn succeeded(&self) -> usize {
        self.results
            .iter()
            .filter(|r| r.status == DispatchStatus::Succeeded)
            .count()
    }

    pub fn failed(&self) -> usize {
        self.results.len() - self.succeeded()
    }

    pub fn outcome(&self) -> BatchOutcome {
        if self.results.is_empty() {
            return BatchOutcome::NoTargets;
        }
        match self.succeeded() {
            0 => BatchOutcome::AllFailed,
            n if n == self.results.len() => BatchOutcome::AllSucceeded,
            _ => BatchOutcome::PartialFailure,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn report(statuses: &[DispatchStatus]) -> DispatchReport {
        DispatchReport {
            results: statuses
                .iter()
                .enumerate()
                .map(|(i, &status)| DispatchResult {
                    device: DeviceName::new(format!("hat-{i}")),
                    status,
                    detail: None,
                })
                .collect(),
        }
    }

    #[test]
    fn outcome_exit_codes() {
        use DispatchStatus::*;

        assert_eq!(report(&[Succeeded, Succeeded]).outcome().exit_code(), 0);
        assert_eq!(report(&[Succeeded, TimedOut]).outcome().exit_code(), 2);
        assert_eq!(report(&[Failed, TimedOut]).outcome().exit_code(), 1);
        assert_eq!(report(&[]).outcome().exit_code(), 1);
    }

    #[test]
    fn stale_offset_reads_as_unknown() {
        let now = jiff::Timestamp::now();
        let mut device = Device::new(DeviceName::new("hat-1"), "10.0.0.11");
        device.clock = Some(ClockOffset {
            seconds: 0.004,
            measured_at: now - jiff::SignedDuration::from_secs(600),
        });

        let staleness = jiff::SignedDuration::from_secs(120);
        assert_eq!(device.clock_offset(staleness, now), None);
        assert_eq!(
            device.in_sync(jiff::SignedDuration::from_millis(50), staleness, now),
            None
        );

        device.clock = Some(ClockOffset {
            seconds: 0.004,
            measured_at: now - jiff::SignedDuration::from_secs(30),
        });
        assert_eq!(device.clock_offset(staleness, now), Some(0.004));
        assert_eq!(
            device.in_sync(jiff::SignedDuration::from_millis(50), staleness, now),
            Some(true)
        );
        assert_eq!(
            device.in_sync(jiff::SignedDuration::from_millis(1), staleness, now),
            Some(false)
        );
    }
}
