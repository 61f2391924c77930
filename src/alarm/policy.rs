//! Tiered alert policy and the per-second debounce in front of it.
//!
//! Alerts get sparser the further away the target is:
//!
//! ```text
//! remaining        alert when
//! [0, 60)          2, 4, 6, 8, 10, 20, 30 s   (alarm at 0)
//! [60, 310)        every minute
//! [310, 910)       every 5 minutes
//! [910, 1810)      every 10 minutes
//! [1810, 10810)    every hour
//! ```

/// Largest backward jump still treated as sampling lag rather than a new
/// countdown.
const MAX_LAG_CORRECTION_SECS: i64 = 10;

#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum AlertTier {
    Countdown,
    Minute,
    FiveMinutes,
    TenMinutes,
    Hourly,
}

#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum TierAction {
    Alarm,
    Alert(AlertTier),
    Rotate,
    Silent,
}

/// Decides what a whole-second boundary means for the active target.
/// `overdue_threshold` is negative; anything below it asks for rotation.
pub fn evaluate(remaining: i64, overdue_threshold: i64) -> TierAction {
    match remaining {
        0 => TierAction::Alarm,
        2 | 4 | 6 | 8 | 10 | 20 | 30 => TierAction::Alert(AlertTier::Countdown),
        r if r < overdue_threshold => TierAction::Rotate,
        r if r < 60 => TierAction::Silent,
        // 300 sits in both the minute and five-minute horizons; report the coarser one.
        r if (300..910).contains(&r) && r % 300 == 0 => {
            TierAction::Alert(AlertTier::FiveMinutes)
        }
        r if r < 310 && r % 60 == 0 => TierAction::Alert(AlertTier::Minute),
        r if (910..1810).contains(&r) && r % 600 == 0 => {
            TierAction::Alert(AlertTier::TenMinutes)
        }
        r if (1810..10810).contains(&r) && r % 3600 == 0 => {
            TierAction::Alert(AlertTier::Hourly)
        }
        _ => TierAction::Silent,
    }
}

/// Lets through at most one value per whole second counted down.
///
/// The first value after a reset passes. After that a value passes only when
/// it is below the lowest value already let through, so a clock stepping
/// backward never repeats a second. A drop of 2..=10 seconds is taken as lag
/// and replayed one second at a time so no tier boundary is skipped.
#[derive(Debug, Default, Clone)]
pub struct Debouncer {
    floor: Option<i64>,
}

impl Debouncer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn observe(&mut self, seconds: i64) -> Option<i64> {
        let Some(floor) = self.floor else {
            self.floor = Some(seconds);
            return Some(seconds);
        };

        let lag = floor - seconds;
        if lag <= 0 {
            return None;
        }
        let current = if lag <= MAX_LAG_CORRECTION_SECS {
            floor - 1
        } else {
            seconds
        };
        self.floor = Some(current);
        Some(current)
    }

    pub fn reset(&mut self) {
        self.floor = None;
    }
}
