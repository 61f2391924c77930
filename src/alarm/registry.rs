use std::fmt;

use chrono::{DateTime, Local};

use crate::time_of_day::TimeOfDay;

/// Absolute instant a target resolves to once it becomes the active one.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct ResolvedTarget {
    pub instant: DateTime<Local>,
    pub display_text: String,
}

#[derive(Debug, Clone)]
pub struct Target {
    time: TimeOfDay,
    name: String,
    alarm: String,
    only_once: bool,
    fire_at: Option<DateTime<Local>>,
    resolved: Option<ResolvedTarget>,
}

impl Target {
    pub fn new(
        time: TimeOfDay,
        name: impl Into<String>,
        alarm: impl Into<String>,
        only_once: bool,
    ) -> Self {
        Self {
            time,
            name: name.into(),
            alarm: alarm.into(),
            only_once,
            fire_at: None,
            resolved: None,
        }
    }

    pub fn time(&self) -> TimeOfDay {
        self.time
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn alarm(&self) -> &str {
        &self.alarm
    }

    pub fn only_once(&self) -> bool {
        self.only_once
    }

    /// Absolute instant of a one-shot registered from a delay.
    pub fn fire_at(&self) -> Option<DateTime<Local>> {
        self.fire_at
    }

    pub fn resolved(&self) -> Option<&ResolvedTarget> {
        self.resolved.as_ref()
    }

    /// Instant this target fires next as seen from `now`. A fixed `fire_at`
    /// wins over the daily occurrence, even when it is days away.
    pub fn occurrence_after(&self, now: &DateTime<Local>) -> DateTime<Local> {
        self.fire_at.unwrap_or_else(|| self.time.next_occurrence(now))
    }

    pub(crate) fn resolve(&mut self, now: &DateTime<Local>) -> &ResolvedTarget {
        let instant = self.occurrence_after(now);
        self.resolved.insert(ResolvedTarget {
            instant,
            display_text: self.time.canonical_text(),
        })
    }
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:<16} {:<10} ({}) <{}>",
            self.name,
            self.time.canonical_text(),
            self.alarm,
            self.only_once
        )
    }
}

/// Targets keyed by time of day, always held in ascending key order.
#[derive(Debug, Default, Clone)]
pub struct TargetRegistry {
    targets: Vec<Target>,
}

impl TargetRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts a target, or overwrites name, alarm and once-flag of the one
    /// already registered at the same time of day. Returns `true` on insert.
    pub fn upsert(&mut self, time: TimeOfDay, name: &str, alarm: &str, only_once: bool) -> bool {
        self.upsert_with(time, name, alarm, only_once, None)
    }

    /// Like [`upsert`](Self::upsert) for a one-shot that fires at `fire_at`;
    /// `time` must be the time of day of `fire_at`.
    pub fn upsert_one_shot(
        &mut self,
        time: TimeOfDay,
        name: &str,
        alarm: &str,
        fire_at: DateTime<Local>,
    ) -> bool {
        self.upsert_with(time, name, alarm, true, Some(fire_at))
    }

    fn upsert_with(
        &mut self,
        time: TimeOfDay,
        name: &str,
        alarm: &str,
        only_once: bool,
        fire_at: Option<DateTime<Local>>,
    ) -> bool {
        match self.position(&time) {
            Ok(index) => {
                let existing = &mut self.targets[index];
                existing.name = name.to_string();
                existing.alarm = alarm.to_string();
                existing.only_once = only_once;
                existing.fire_at = fire_at;
                existing.resolved = None;
                false
            }
            Err(index) => {
                let mut target = Target::new(time, name, alarm, only_once);
                target.fire_at = fire_at;
                self.targets.insert(index, target);
                true
            }
        }
    }

    /// Removing an absent key is a no-op.
    pub fn remove(&mut self, time: &TimeOfDay) -> Option<Target> {
        let index = self.position(time).ok()?;
        Some(self.targets.remove(index))
    }

    pub fn get(&self, time: &TimeOfDay) -> Option<&Target> {
        let index = self.position(time).ok()?;
        self.targets.get(index)
    }

    pub fn get_mut(&mut self, time: &TimeOfDay) -> Option<&mut Target> {
        let index = self.position(time).ok()?;
        self.targets.get_mut(index)
    }

    pub fn sorted_view(&self) -> &[Target] {
        &self.targets
    }

    /// Key of the target that fires first strictly after `now`. For daily
    /// targets this is the first key after the current time of day, wrapping
    /// to the earliest key; one-shots compete with their own instant. Ties go
    /// to the lower key.
    pub fn next_due(&self, now: &DateTime<Local>) -> Option<TimeOfDay> {
        self.targets
            .iter()
            .min_by_key(|target| target.occurrence_after(now))
            .map(Target::time)
    }

    pub fn len(&self) -> usize {
        self.targets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.targets.is_empty()
    }

    fn position(&self, time: &TimeOfDay) -> Result<usize, usize> {
        self.targets.binary_search_by(|target| target.time.cmp(time))
    }
}
