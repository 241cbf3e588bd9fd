use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::{Command, ScheduleId};

/// Errors raised for malformed schedule time specs.
#[derive(Debug, thiserror::Error)]
pub enum TimeSpecError {
    #[error("malformed time spec '{0}': expected at:<timestamp>, in:<duration>, every:<duration> or align:<duration>")]
    UnknownForm(String),

    #[error("invalid timestamp in '{spec}'")]
    InvalidTimestamp {
        spec: String,
        #[source]
        source: jiff::Error,
    },

    #[error("invalid duration in '{spec}'")]
    InvalidDuration {
        spec: String,
        #[source]
        source: jiff::Error,
    },

    #[error("duration in '{0}' must be positive")]
    NonPositive(String),
}

/// When a schedule entry fires.
///
/// `Every` is drift-corrected against the wall clock: fire times are the
/// slots `anchor + k * period`, never "previous fire plus period", so a slow
/// dispatch does not accumulate drift. `Align` is a one-shot fire at the next
/// wall-clock multiple of the modulus (how the fleet lines up a synchronized
/// experiment start on a second-of-minute boundary).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase", tag = "type")]
pub enum TimeSpec {
    At {
        time: jiff::Timestamp,
    },
    Every {
        period: jiff::SignedDuration,
        anchor: jiff::Timestamp,
    },
    Align {
        modulus: jiff::SignedDuration,
    },
}

impl TimeSpec {
    /// Parse an operator time spec relative to `now`.
    pub fn parse(spec: &str, now: jiff::Timestamp) -> Result<Self, TimeSpecError> {
        let (form, rest) = spec
            .split_once(':')
            .ok_or_else(|| TimeSpecError::UnknownForm(spec.to_owned()))?;

        match form {
            "at" => {
                let time =
                    jiff::Timestamp::from_str(rest).map_err(|source| {
                        TimeSpecError::InvalidTimestamp {
                            spec: spec.to_owned(),
                            source,
                        }
                    })?;
                Ok(TimeSpec::At { time })
            }
            "in" => {
                let delay = parse_positive_duration(spec, rest)?;
                Ok(TimeSpec::At { time: now + delay })
            }
            "every" => {
                let period = parse_positive_duration(spec, rest)?;
                Ok(TimeSpec::Every {
                    period,
                    anchor: now,
                })
            }
            "align" => {
                let modulus = parse_positive_duration(spec, rest)?;
                Ok(TimeSpec::Align { modulus })
            }
            _ => Err(TimeSpecError::UnknownForm(spec.to_owned())),
        }
    }

    /// The next time this spec fires at or after `now`, or `None` when it
    /// never fires again. Slot math is done in integer milliseconds.
    pub fn next_fire(&self, now: jiff::Timestamp) -> Option<jiff::Timestamp> {
        match *self {
            // one-shot: an overdue entry fires immediately, once
            TimeSpec::At { time } => Some(time),
            TimeSpec::Every { period, anchor } => {
                let period_ms = period.as_millis() as i64;
                if period_ms <= 0 {
                    return None;
                }
                let now_ms = now.as_millisecond();
                let anchor_ms = anchor.as_millisecond();
                let next_ms = if now_ms < anchor_ms {
                    anchor_ms
                } else {
                    let elapsed = now_ms - anchor_ms;
                    anchor_ms + (elapsed / period_ms + 1) * period_ms
                };
                jiff::Timestamp::from_millisecond(next_ms).ok()
            }
            TimeSpec::Align { modulus } => {
                let modulus_ms = modulus.as_millis() as i64;
                if modulus_ms <= 0 {
                    return None;
                }
                let now_ms = now.as_millisecond();
                let next_ms = (now_ms.div_euclid(modulus_ms) + 1) * modulus_ms;
                jiff::Timestamp::from_millisecond(next_ms).ok()
            }
        }
    }

    /// Recurring specs stay registered after firing; one-shots are removed.
    pub fn is_recurring(&self) -> bool {
        matches!(self, TimeSpec::Every { .. })
    }
}

impl fmt::Display for TimeSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TimeSpec::At { time } => write!(f, "at:{time}"),
            TimeSpec::Every { period, .. } => write!(f, "every:{period}"),
            TimeSpec::Align { modulus } => write!(f, "align:{modulus}"),
        }
    }
}

fn parse_positive_duration(
    spec: &str,
    value: &str,
) -> Result<jiff::SignedDuration, TimeSpecError> {
    let duration =
        jiff::SignedDuration::from_str(value).map_err(|source| TimeSpecError::InvalidDuration {
            spec: spec.to_owned(),
            source,
        })?;
    if duration.is_negative() || duration.is_zero() {
        return Err(TimeSpecError::NonPositive(spec.to_owned()));
    }
    Ok(duration)
}

/// A registered trigger: fire `command` per `when`. One-shot entries are
/// removed once fired; recurring entries stay until explicitly canceled.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScheduleEntry {
    pub id: ScheduleId,
    pub when: TimeSpec,
    pub command: Command,
    pub created_at: jiff::Timestamp,
}

impl ScheduleEntry {
    pub fn new(when: TimeSpec, command: Command) -> Self {
        Self {
            id: ScheduleId(ulid::Ulid::new()),
            when,
            command,
            created_at: jiff::Timestamp::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ts(ms: i64) -> jiff::Timestamp {
        jiff::Timestamp::from_millisecond(ms).unwrap()
    }

    #[test]
    fn parse_forms() {
        let now = ts(1_000_000);

        let at = TimeSpec::parse("at:2026-09-01T00:00:00Z", now).unwrap();
        assert!(matches!(at, TimeSpec::At { .. }));

        let within = TimeSpec::parse("in:30s", now).unwrap();
        assert_eq!(
            within,
            TimeSpec::At {
                time: ts(1_030_000)
            }
        );

        let every = TimeSpec::parse("every:5m", now).unwrap();
        assert!(matches!(every, TimeSpec::Every { .. }));

        let align = TimeSpec::parse("align:60s", now).unwrap();
        assert!(matches!(align, TimeSpec::Align { .. }));
    }

    #[test]
    fn parse_rejects_malformed_specs() {
        let now = ts(0);
        assert!(matches!(
            TimeSpec::parse("tomorrow", now),
            Err(TimeSpecError::UnknownForm(_))
        ));
        assert!(matches!(
            TimeSpec::parse("soon:5m", now),
            Err(TimeSpecError::UnknownForm(_))
        ));
        assert!(matches!(
            TimeSpec::parse("at:not-a-time", now),
            Err(TimeSpecError::InvalidTimestamp { .. })
        ));
        assert!(matches!(
            TimeSpec::parse("every:bogus", now),
            Err(TimeSpecError::InvalidDuration { .. })
        ));
        assert!(matches!(
            TimeSpec::parse("every:0s", now),
            Err(TimeSpecError::NonPositive(_))
        ));
        assert!(matches!(
            TimeSpec::parse("in:-5s", now),
            Err(TimeSpecError::NonPositive(_))
        ));
    }

    #[test]
    fn recurring_slots_do_not_drift() {
        let anchor = ts(10_000);
        let spec = TimeSpec::Every {
            period: jiff::SignedDuration::from_secs(5),
            anchor,
        };

        // before the anchor the first fire is the anchor itself
        assert_eq!(spec.next_fire(ts(3_000)), Some(ts(10_000)));

        // a dispatch that finishes 4.9s into the slot still yields the
        // original grid: 15s, 20s, 25s...
        assert_eq!(spec.next_fire(ts(10_000)), Some(ts(15_000)));
        assert_eq!(spec.next_fire(ts(14_900)), Some(ts(15_000)));
        assert_eq!(spec.next_fire(ts(15_000)), Some(ts(20_000)));

        // missed slots are skipped, not replayed
        assert_eq!(spec.next_fire(ts(27_300)), Some(ts(30_000)));
    }

    #[test]
    fn align_fires_on_the_next_boundary() {
        let spec = TimeSpec::Align {
            modulus: jiff::SignedDuration::from_secs(60),
        };
        assert_eq!(spec.next_fire(ts(61_000)), Some(ts(120_000)));
        // exactly on a boundary aligns to the following one
        assert_eq!(spec.next_fire(ts(120_000)), Some(ts(180_000)));
        assert!(!spec.is_recurring());
    }

    #[test]
    fn one_shot_fires_even_when_overdue() {
        let spec = TimeSpec::At { time: ts(5_000) };
        assert_eq!(spec.next_fire(ts(9_000)), Some(ts(5_000)));
        assert!(!spec.is_recurring());
    }
}
