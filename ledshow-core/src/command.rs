use serde::{Deserialize, Serialize};

use crate::lights::{LightState, Pattern};
use crate::DeviceName;

/// Errors raised when operator input does not name a known command.
///
/// The command set is a closed enumeration; unknown names are rejected here,
/// at the boundary, so an unrecognized command can never reach a device or
/// change any light state.
#[derive(Debug, thiserror::Error)]
pub enum CommandError {
    #[error("unknown pattern '{0}'")]
    UnknownPattern(String),

    #[error("unknown command '{0}'")]
    UnknownCommand(String),

    #[error("command '{0}' takes no pattern argument")]
    UnexpectedArgument(String),

    #[error("run-pattern requires a pattern name")]
    MissingPattern,
}

/// The closed set of commands the coordinator can issue to a device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", tag = "kind")]
pub enum CommandKind {
    /// Start a named light pattern.
    RunPattern { pattern: Pattern },
    /// Stop whatever pattern is running. Idempotent.
    Stop,
    /// Force a step adjustment of the device clock.
    StepClock,
    /// Reboot the device.
    Reboot,
    /// Power the device off.
    Shutdown,
}

impl CommandKind {
    /// Parse an operator-supplied command name plus optional pattern argument.
    pub fn parse(name: &str, pattern: Option<&str>) -> Result<Self, CommandError> {
        let kind = match name {
            "run-pattern" => {
                let pattern = pattern.ok_or(CommandError::MissingPattern)?;
                return Ok(CommandKind::RunPattern {
                    pattern: pattern.parse()?,
                });
            }
            "stop" => CommandKind::Stop,
            "step-clock" => CommandKind::StepClock,
            "reboot" => CommandKind::Reboot,
            "shutdown" => CommandKind::Shutdown,
            other => return Err(CommandError::UnknownCommand(other.to_owned())),
        };
        if pattern.is_some() {
            return Err(CommandError::UnexpectedArgument(name.to_owned()));
        }
        Ok(kind)
    }

    /// The light state a device ends up in after this command succeeds.
    /// `None` means the command does not touch the lights.
    pub fn light_effect(self) -> Option<LightState> {
        match self {
            CommandKind::RunPattern { pattern } => Some(LightState::Running(pattern)),
            CommandKind::Stop => Some(LightState::Stopped),
            // a rebooted or powered-off hat comes back dark
            CommandKind::Reboot | CommandKind::Shutdown => Some(LightState::Stopped),
            CommandKind::StepClock => None,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            CommandKind::RunPattern { .. } => "run-pattern",
            CommandKind::Stop => "stop",
            CommandKind::StepClock => "step-clock",
            CommandKind::Reboot => "reboot",
            CommandKind::Shutdown => "shutdown",
        }
    }
}

/// The set of devices a command is aimed at.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Target {
    /// Every registered device.
    All,
    /// An explicit list of device names.
    Devices(Vec<DeviceName>),
}

impl Target {
    /// Build a target from operator arguments: an empty list means the fleet.
    pub fn from_names<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<Box<str>>,
    {
        let names: Vec<DeviceName> = names.into_iter().map(|n| DeviceName(n.into())).collect();
        if names.is_empty() {
            Target::All
        } else {
            Target::Devices(names)
        }
    }
}

/// A command with its target set. Immutable once issued.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Command {
    pub kind: CommandKind,
    pub target: Target,
}

impl Command {
    pub fn new(kind: CommandKind, target: Target) -> Self {
        Self { kind, target }
    }

    pub fn broadcast(kind: CommandKind) -> Self {
        Self {
            kind,
            target: Target::All,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_known_commands() {
        assert_eq!(
            CommandKind::parse("run-pattern", Some("breathe")).unwrap(),
            CommandKind::RunPattern {
                pattern: Pattern::Breathe
            }
        );
        assert_eq!(CommandKind::parse("stop", None).unwrap(), CommandKind::Stop);
        assert_eq!(
            CommandKind::parse("step-clock", None).unwrap(),
            CommandKind::StepClock
        );
    }

    #[test]
    fn parse_rejects_unknown_names() {
        assert!(matches!(
            CommandKind::parse("blink", None),
            Err(CommandError::UnknownCommand(_))
        ));
        assert!(matches!(
            CommandKind::parse("run-pattern", Some("disco")),
            Err(CommandError::UnknownPattern(_))
        ));
        assert!(matches!(
            CommandKind::parse("run-pattern", None),
            Err(CommandError::MissingPattern)
        ));
        assert!(matches!(
            CommandKind::parse("stop", Some("breathe")),
            Err(CommandError::UnexpectedArgument(_))
        ));
    }

    #[test]
    fn empty_target_list_means_the_fleet() {
        assert_eq!(Target::from_names(Vec::<String>::new()), Target::All);
        assert_eq!(
            Target::from_names(["hat-1".to_owned()]),
            Target::Devices(vec![DeviceName::new("hat-1")])
        );
    }
}
