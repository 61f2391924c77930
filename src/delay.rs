use std::fmt;
use std::str::FromStr;

use crate::error::{ScheduleError, ValueKind};
use crate::time_of_day::right_aligned_components;

/// Remaining counts above this (and at most zero) render as the "about to
/// fire" marker instead of a dash.
const MARKER_FLOOR_SECS: i64 = -30;

/// A relative duration in whole seconds, split as `hours:minutes:seconds`
/// with no ceiling on hours.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Ord, PartialOrd, Hash, Default)]
pub struct Delay {
    hours: u64,
    minutes: u32,
    seconds: u32,
}

impl Delay {
    pub fn new(hours: u64, minutes: u32, seconds: u32) -> Option<Self> {
        Self::validate(minutes, seconds).then_some(Self {
            hours,
            minutes,
            seconds,
        })
    }

    pub fn validate(minutes: u32, seconds: u32) -> bool {
        minutes <= 59 && seconds <= 59
    }

    /// Same digit scheme as [`TimeOfDay::parse`](crate::TimeOfDay::parse),
    /// without the 23 hour ceiling.
    pub fn parse(input: &str) -> Result<Self, ScheduleError> {
        let (hours, minutes, seconds) = right_aligned_components(input)
            .ok_or_else(|| ScheduleError::invalid(ValueKind::Delay, input))?;
        Self::new(u64::from(hours), minutes, seconds)
            .ok_or_else(|| ScheduleError::invalid(ValueKind::Delay, input))
    }

    pub fn from_seconds(total: u64) -> Self {
        Self {
            hours: total / 3_600,
            minutes: ((total % 3_600) / 60) as u32,
            seconds: (total % 60) as u32,
        }
    }

    /// Rounds to the nearest whole second; negative durations clamp to zero.
    pub fn from_duration(duration: chrono::Duration) -> Self {
        let total = round_to_seconds(duration).max(0);
        Self::from_seconds(total as u64)
    }

    pub fn hours(&self) -> u64 {
        self.hours
    }

    pub fn minutes(&self) -> u32 {
        self.minutes
    }

    pub fn seconds(&self) -> u32 {
        self.seconds
    }

    pub fn total_seconds(&self) -> u64 {
        self.hours * 3_600 + u64::from(self.minutes) * 60 + u64::from(self.seconds)
    }

    pub fn to_duration(&self) -> chrono::Duration {
        let total = i64::try_from(self.total_seconds()).unwrap_or(i64::MAX);
        chrono::Duration::try_seconds(total).unwrap_or(chrono::Duration::MAX)
    }

    pub fn canonical_text(&self) -> String {
        format!("{:02}:{:02}:{:02}", self.hours, self.minutes, self.seconds)
    }

    /// Compact form with leading zero components dropped: `07`, `05:00`,
    /// `01:00:00`. A zero delay renders like a remaining count of zero.
    pub fn display_text(&self) -> String {
        if self.hours > 0 {
            format!("{:02}:{:02}:{:02}", self.hours, self.minutes, self.seconds)
        } else if self.minutes > 0 {
            format!("{:02}:{:02}", self.minutes, self.seconds)
        } else if self.seconds > 0 {
            format!("{:02}", self.seconds)
        } else {
            remaining_text(0)
        }
    }
}

impl fmt::Display for Delay {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.canonical_text())
    }
}

impl FromStr for Delay {
    type Err = ScheduleError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

/// Renders a signed remaining-seconds count for display: the compact delay
/// form while positive, `>> SS <<` from zero down to -29, `--` beyond.
pub fn remaining_text(seconds: i64) -> String {
    if seconds > 0 {
        Delay::from_seconds(seconds as u64).display_text()
    } else if seconds > MARKER_FLOOR_SECS {
        format!(">> {seconds:02} <<")
    } else {
        "--".to_string()
    }
}

/// Nearest whole second, halves away from zero.
pub(crate) fn round_to_seconds(duration: chrono::Duration) -> i64 {
    let millis = duration.num_milliseconds();
    let whole = millis / 1_000;
    let rest = millis % 1_000;
    if rest >= 500 {
        whole + 1
    } else if rest <= -500 {
        whole - 1
    } else {
        whole
    }
}
