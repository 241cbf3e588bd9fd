use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::command::CommandError;

/// A named light behavior a player hat can display.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Pattern {
    Pilot,
    Breathe,
    Rainbow,
    Exposure,
    Experiment,
}

impl Pattern {
    pub const ALL: [Pattern; 5] = [
        Pattern::Pilot,
        Pattern::Breathe,
        Pattern::Rainbow,
        Pattern::Exposure,
        Pattern::Experiment,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Pattern::Pilot => "pilot",
            Pattern::Breathe => "breathe",
            Pattern::Rainbow => "rainbow",
            Pattern::Exposure => "exposure",
            Pattern::Experiment => "experiment",
        }
    }
}

impl fmt::Display for Pattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

impl FromStr for Pattern {
    type Err = CommandError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Pattern::ALL
            .into_iter()
            .find(|p| p.as_str() == s)
            .ok_or_else(|| CommandError::UnknownPattern(s.to_owned()))
    }
}

/// Per-device light state. A device is either dark or running exactly one
/// pattern; transitions happen only on a successful dispatch of the matching
/// command.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase", tag = "state", content = "pattern")]
pub enum LightState {
    Stopped,
    Running(Pattern),
}

impl fmt::Display for LightState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LightState::Stopped => f.pad("stopped"),
            LightState::Running(p) => f.pad(p.as_str()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::command::CommandKind;

    #[test]
    fn pattern_names_round_trip() {
        for pattern in Pattern::ALL {
            assert_eq!(pattern.as_str().parse::<Pattern>().unwrap(), pattern);
        }
    }

    #[test]
    fn unknown_pattern_rejected() {
        let err = "disco".parse::<Pattern>().unwrap_err();
        assert!(matches!(err, CommandError::UnknownPattern(name) if name == "disco"));
    }

    #[test]
    fn stop_is_universal_and_idempotent() {
        // the stop effect is Stopped regardless of the current state,
        // including when the device is already stopped
        assert_eq!(
            CommandKind::Stop.light_effect(),
            Some(LightState::Stopped)
        );
    }

    #[test]
    fn pattern_commands_set_the_running_state() {
        for pattern in Pattern::ALL {
            let effect = CommandKind::RunPattern { pattern }.light_effect();
            assert_eq!(effect, Some(LightState::Running(pattern)));
        }
    }

    #[test]
    fn power_commands_leave_the_device_dark() {
        assert_eq!(
            CommandKind::Reboot.light_effect(),
            Some(LightState::Stopped)
        );
        assert_eq!(
            CommandKind::Shutdown.light_effect(),
            Some(LightState::Stopped)
        );
        assert_eq!(CommandKind::StepClock.light_effect(), None);
    }
}
