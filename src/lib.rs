//! In-memory countdown and alarm scheduler.
//!
//! Targets are times of day (recurring daily) or delays from now (one-shot).
//! A [`Scheduler`] keeps the earliest upcoming target armed, counts down to it,
//! and calls the registered observer with tiered alerts on the way and an
//! alarm at zero.

pub mod alarm;
pub mod delay;
pub mod error;
pub mod logging;
pub mod time_of_day;
pub mod time_provider;

pub use alarm::notify::{DispatchPolicy, Notification};
pub use alarm::policy::{AlertTier, Debouncer, TierAction};
pub use alarm::registry::{ResolvedTarget, Target, TargetRegistry};
pub use alarm::scheduler::{NextSnapshot, Scheduler, SchedulerConfig, SchedulerSnapshot};
pub use delay::{Delay, remaining_text};
pub use error::{ScheduleError, ValueKind};
pub use time_of_day::TimeOfDay;
pub use time_provider::{ManualTimeProvider, SystemTimeProvider, TimeProvider};
