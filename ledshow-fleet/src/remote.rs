use ledshow_core::CommandKind;

use crate::config::RemoteConfig;

/// Renders coordinator commands into the argv executed on a device.
///
/// Pattern commands go through the light-show runner installed by the
/// provisioning layer; clock and power commands use the stock system tools.
#[derive(Debug, Clone)]
pub struct RemoteCommands {
    program: String,
}

impl RemoteCommands {
    pub fn new(config: &RemoteConfig) -> Self {
        Self {
            program: config.program.clone(),
        }
    }

    pub fn argv(&self, kind: CommandKind) -> Vec<String> {
        match kind {
            CommandKind::RunPattern { pattern } => vec![
                self.program.clone(),
                "run".to_string(),
                pattern.to_string(),
            ],
            CommandKind::Stop => vec![self.program.clone(), "stop".to_string()],
            CommandKind::StepClock => vec![
                "sudo".to_string(),
                "chronyc".to_string(),
                "makestep".to_string(),
            ],
            CommandKind::Reboot => vec!["sudo".to_string(), "reboot".to_string()],
            CommandKind::Shutdown => vec!["sudo".to_string(), "poweroff".to_string()],
        }
    }

    /// Offset query against the device's time daemon. Stdout is a single
    /// signed float, seconds ahead of (+) or behind (-) the reference.
    pub fn clock_query(&self) -> Vec<String> {
        vec![
            "chronyc".to_string(),
            "-c".to_string(),
            "tracking".to_string(),
        ]
    }
}

/// Extract the offset seconds from a `chronyc -c tracking` CSV line.
///
/// Field 4 is "Last offset" in seconds. A bare float (as the mock channel
/// produces) is accepted as well.
pub fn parse_offset_seconds(stdout: &str) -> Option<f64> {
    let line = stdout.trim();
    if line.is_empty() {
        return None;
    }
    if let Ok(value) = line.parse::<f64>() {
        return Some(value);
    }
    line.split(',').nth(4)?.trim().parse::<f64>().ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use ledshow_core::Pattern;

    fn remote() -> RemoteCommands {
        RemoteCommands::new(&RemoteConfig {
            program: "/home/pi/hat/lights.py".to_string(),
        })
    }

    #[test]
    fn pattern_commands_use_the_runner() {
        assert_eq!(
            remote().argv(CommandKind::RunPattern {
                pattern: Pattern::Breathe
            }),
            ["/home/pi/hat/lights.py", "run", "breathe"]
        );
        assert_eq!(
            remote().argv(CommandKind::Stop),
            ["/home/pi/hat/lights.py", "stop"]
        );
    }

    #[test]
    fn clock_and_power_commands_use_system_tools() {
        assert_eq!(
            remote().argv(CommandKind::StepClock),
            ["sudo", "chronyc", "makestep"]
        );
        assert_eq!(remote().argv(CommandKind::Reboot), ["sudo", "reboot"]);
        assert_eq!(remote().argv(CommandKind::Shutdown), ["sudo", "poweroff"]);
    }

    #[test]
    fn offset_parsing() {
        assert_eq!(parse_offset_seconds("0.000123\n"), Some(0.000123));
        assert_eq!(parse_offset_seconds("-0.25"), Some(-0.25));
        // chronyc -c tracking CSV: ref id, name, stratum, ref time, offset, ...
        let csv = "A29FC87B,162.159.200.123,3,1756500000.0,-0.000042,0.000150,...";
        assert_eq!(parse_offset_seconds(csv), Some(-0.000042));
        assert_eq!(parse_offset_seconds(""), None);
        assert_eq!(parse_offset_seconds("garbage"), None);
    }
}
