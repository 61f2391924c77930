use std::fmt;

use thiserror::Error;

/// Which value type a rejected string was meant to be.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum ValueKind {
    TimeOfDay,
    Delay,
}

impl fmt::Display for ValueKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValueKind::TimeOfDay => f.write_str("time-of-day"),
            ValueKind::Delay => f.write_str("delay"),
        }
    }
}

#[derive(Debug, Clone, Error, Eq, PartialEq)]
pub enum ScheduleError {
    #[error("invalid {kind} '{input}'")]
    InvalidFormat { kind: ValueKind, input: String },
}

impl ScheduleError {
    pub(crate) fn invalid(kind: ValueKind, input: &str) -> Self {
        ScheduleError::InvalidFormat {
            kind,
            input: input.to_string(),
        }
    }
}
