//! Countdown scheduler: rotation controller, clock loop and alert dispatch.
//!
//! ```text
//!  add/remove ──► registry ──► select_next ──► next
//!                                               │
//!  clock thread (every tick) ── remaining ──► channel ──► dispatch thread
//!                                                            │ debounce
//!                                                            ▼
//!                                   observer ◄── notifier ◄── tier policy
//!                                                            │ overdue
//!                                                            ▼
//!                                                     advance_if_overdue
//! ```
//!
//! The clock thread lives as long as the scheduler. The dispatch thread is
//! started by the clock thread when a target becomes `next` and stopped when
//! `next` goes away.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use chrono::{DateTime, Local, Timelike};
use tracing::{debug, info, trace, warn};

use crate::alarm::notify::{DispatchPolicy, Notification, Notifier, Observer};
use crate::alarm::policy::{self, Debouncer, TierAction};
use crate::alarm::registry::{Target, TargetRegistry};
use crate::delay::{Delay, remaining_text, round_to_seconds};
use crate::error::ScheduleError;
use crate::time_of_day::TimeOfDay;
use crate::time_provider::{SystemTimeProvider, TimeProvider};

pub const DEFAULT_TICK_INTERVAL: Duration = Duration::from_millis(250);
pub const DEFAULT_STARTUP_DELAY: Duration = Duration::from_millis(800);
pub const DEFAULT_OVERDUE_THRESHOLD_SECS: i64 = -15;

const STOP_POLL_SLICE: Duration = Duration::from_millis(50);

#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    pub tick_interval: Duration,
    pub startup_delay: Duration,
    /// Seconds past the fire instant (negative) after which the scheduler
    /// moves on to the next target.
    pub overdue_threshold_secs: i64,
    pub dispatch: DispatchPolicy,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            tick_interval: DEFAULT_TICK_INTERVAL,
            startup_delay: DEFAULT_STARTUP_DELAY,
            overdue_threshold_secs: DEFAULT_OVERDUE_THRESHOLD_SECS,
            dispatch: DispatchPolicy::default(),
        }
    }
}

impl SchedulerConfig {
    pub fn with_tick_interval(mut self, tick_interval: Duration) -> Self {
        self.tick_interval = tick_interval;
        self
    }

    pub fn with_startup_delay(mut self, startup_delay: Duration) -> Self {
        self.startup_delay = startup_delay;
        self
    }

    /// Must be negative; zero or above is raised to -1 so rotation never
    /// runs ahead of the alarm.
    pub fn with_overdue_threshold_secs(mut self, overdue_threshold_secs: i64) -> Self {
        self.overdue_threshold_secs = overdue_threshold_secs;
        self
    }

    pub fn with_dispatch(mut self, dispatch: DispatchPolicy) -> Self {
        self.dispatch = dispatch;
        self
    }
}

#[derive(Debug, Clone, Eq, PartialEq)]
pub struct NextSnapshot {
    pub name: String,
    pub time_text: String,
    pub remaining_secs: Option<i64>,
    pub remaining_text: String,
}

#[derive(Debug, Clone)]
pub struct SchedulerSnapshot {
    pub sampled_at: Option<DateTime<Local>>,
    pub sampled_text: String,
    pub enabled: bool,
    pub armed: bool,
    pub dispatching: bool,
    pub target_count: usize,
    pub next: Option<NextSnapshot>,
}

#[derive(Debug, Clone)]
struct TargetRef {
    time: TimeOfDay,
    instant: DateTime<Local>,
    name: String,
    alarm: String,
}

#[derive(Debug, Clone)]
struct RemainingSample {
    target: TargetRef,
    remaining_secs: i64,
}

struct Dispatcher {
    samples: Sender<RemainingSample>,
    join: JoinHandle<()>,
}

impl Dispatcher {
    /// Closes the sample channel and waits for the loop to drain, unless
    /// called from the dispatch thread itself.
    fn halt(self) {
        drop(self.samples);
        if self.join.thread().id() != thread::current().id() {
            let _ = self.join.join();
        }
    }
}

#[derive(Default)]
struct SchedulerState {
    targets: TargetRegistry,
    next: Option<TimeOfDay>,
    enabled: bool,
    dispatcher: Option<Dispatcher>,
    last_sampled: Option<DateTime<Local>>,
}

impl SchedulerState {
    fn select_next(&mut self, now: &DateTime<Local>) -> Option<TimeOfDay> {
        self.drop_passed_one_shots(now);
        self.next = self.targets.next_due(now);

        match self.next.and_then(|key| self.targets.get_mut(&key)) {
            Some(target) => {
                let resolved = target.resolve(now);
                debug!(
                    title = "timer.select_next",
                    next = %resolved.display_text,
                    at = %resolved.instant,
                    "next target selected"
                );
            }
            None => debug!(title = "timer.select_next", "no targets left"),
        }
        self.next
    }

    fn drop_passed_one_shots(&mut self, now: &DateTime<Local>) {
        let passed: Vec<TimeOfDay> = self
            .targets
            .sorted_view()
            .iter()
            .filter(|target| {
                let instant = target
                    .fire_at()
                    .or_else(|| target.resolved().map(|resolved| resolved.instant));
                target.only_once() && instant.is_some_and(|instant| instant <= *now)
            })
            .map(Target::time)
            .collect();
        for key in passed {
            if let Some(removed) = self.targets.remove(&key) {
                debug!(title = "timer.del_target", target = %removed, "one-shot target retired");
            }
        }
    }

    /// Moves past `key` once it is overdue. Samples for a target that is no
    /// longer `next` are ignored.
    fn advance_if_overdue(
        &mut self,
        key: TimeOfDay,
        remaining_secs: i64,
        overdue_threshold_secs: i64,
        now: &DateTime<Local>,
    ) -> bool {
        if remaining_secs >= overdue_threshold_secs || self.next != Some(key) {
            return false;
        }
        if let Some(target) = self.targets.get(&key)
            && target.only_once()
        {
            if let Some(removed) = self.targets.remove(&key) {
                debug!(title = "timer.del_target", target = %removed, "one-shot target fired");
            }
        }
        self.select_next(now);
        true
    }

    fn next_target(&self) -> Option<&Target> {
        self.next.and_then(|key| self.targets.get(&key))
    }

    fn is_current(&self, target: &TargetRef) -> bool {
        self.enabled
            && self.next == Some(target.time)
            && self
                .next_target()
                .and_then(Target::resolved)
                .is_some_and(|resolved| resolved.instant == target.instant)
    }

    fn remaining_sample(&self, now: &DateTime<Local>) -> Option<RemainingSample> {
        let target = self.next_target()?;
        let resolved = target.resolved()?;
        Some(RemainingSample {
            target: TargetRef {
                time: target.time(),
                instant: resolved.instant,
                name: target.name().to_string(),
                alarm: target.alarm().to_string(),
            },
            remaining_secs: round_to_seconds(resolved.instant - *now),
        })
    }
}

struct Shared {
    config: SchedulerConfig,
    clock: Arc<dyn TimeProvider>,
    state: Mutex<SchedulerState>,
    observer: Arc<Mutex<Observer>>,
    notifier: Mutex<Notifier>,
}

impl Shared {
    fn lock_state(&self) -> MutexGuard<'_, SchedulerState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn notify(&self, notification: Notification) {
        self.notifier
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .notify(notification);
    }

    fn apply_policy(&self, target: &TargetRef, remaining_secs: i64) {
        let action = policy::evaluate(remaining_secs, self.config.overdue_threshold_secs);
        trace!(
            title = "timer.alert_check",
            name = %target.name,
            remaining_secs,
            action = ?action,
            "second boundary"
        );
        match action {
            TierAction::Alarm => {
                info!(title = "timer.alarm", name = %target.name, alarm = %target.alarm, "alarm");
                self.notify(Notification::Alarm {
                    name: target.name.clone(),
                    alarm: target.alarm.clone(),
                });
            }
            TierAction::Alert(tier) => {
                debug!(
                    title = "timer.alert",
                    name = %target.name,
                    remaining_secs,
                    tier = ?tier,
                    "alert"
                );
                self.notify(Notification::Alert {
                    name: target.name.clone(),
                    remaining_secs,
                });
            }
            TierAction::Rotate => {
                let now = self.clock.now();
                let mut state = self.lock_state();
                if state.advance_if_overdue(
                    target.time,
                    remaining_secs,
                    self.config.overdue_threshold_secs,
                    &now,
                ) {
                    debug!(
                        title = "timer.next_target",
                        from = %target.time,
                        "rotated past overdue target"
                    );
                }
            }
            TierAction::Silent => {}
        }
    }
}

/// Countdown/alarm scheduler over a set of daily or one-shot targets.
///
/// Dropping the scheduler stops and joins its threads.
pub struct Scheduler {
    shared: Arc<Shared>,
    stop: Arc<AtomicBool>,
    clock_join: Option<JoinHandle<()>>,
}

impl Scheduler {
    pub fn new(config: SchedulerConfig) -> Self {
        Self::with_time_provider(config, Arc::new(SystemTimeProvider))
    }

    pub fn with_time_provider(mut config: SchedulerConfig, clock: Arc<dyn TimeProvider>) -> Self {
        if config.overdue_threshold_secs >= 0 {
            warn!(
                title = "timer.config",
                overdue_threshold_secs = config.overdue_threshold_secs,
                "overdue threshold must be negative; using -1"
            );
            config.overdue_threshold_secs = -1;
        }
        let observer = Arc::new(Mutex::new(Observer::default()));
        let notifier = Notifier::new(config.dispatch, Arc::clone(&observer));
        let shared = Arc::new(Shared {
            config,
            clock,
            state: Mutex::new(SchedulerState {
                enabled: true,
                ..SchedulerState::default()
            }),
            observer,
            notifier: Mutex::new(notifier),
        });
        let stop = Arc::new(AtomicBool::new(false));
        let shared_for_thread = Arc::clone(&shared);
        let stop_for_thread = Arc::clone(&stop);
        let clock_join = thread::spawn(move || run_clock_loop(shared_for_thread, stop_for_thread));

        Self {
            shared,
            stop,
            clock_join: Some(clock_join),
        }
    }

    pub fn set_alarm_callback<F>(&self, callback: F)
    where
        F: Fn(&str, &str) + Send + Sync + 'static,
    {
        self.lock_observer().set_alarm(Arc::new(callback));
    }

    pub fn set_alert_callback<F>(&self, callback: F)
    where
        F: Fn(&str, i64) + Send + Sync + 'static,
    {
        self.lock_observer().set_alert(Arc::new(callback));
    }

    pub fn add_target_at_time_of_day(
        &self,
        time_text: &str,
        name: &str,
        alarm: &str,
    ) -> Result<(), ScheduleError> {
        debug!(title = "timer.add_target_time", name, time = time_text, alarm, "register");
        let time = TimeOfDay::parse(time_text).inspect_err(|err| {
            debug!(title = "timer.add_target_time", error = %err, "rejected");
        })?;
        let now = self.shared.clock.now();
        self.insert_target(time, name, alarm, None, &now);
        Ok(())
    }

    pub fn add_target_after_delay(
        &self,
        delay_text: &str,
        name: &str,
        alarm: &str,
    ) -> Result<(), ScheduleError> {
        debug!(title = "timer.add_target_delay", name, delay = delay_text, alarm, "register");
        let delay = Delay::parse(delay_text).inspect_err(|err| {
            debug!(title = "timer.add_target_delay", error = %err, "rejected");
        })?;
        let now = self.shared.clock.now();
        let rounded = now + delay.to_duration() + chrono::Duration::milliseconds(500);
        let fire_at = rounded.with_nanosecond(0).unwrap_or(rounded);
        let time = TimeOfDay::from_datetime(&fire_at);
        self.insert_target(time, name, alarm, Some(fire_at), &now);
        Ok(())
    }

    /// Returns whether a target was registered at `time_text`.
    pub fn remove_target(&self, time_text: &str) -> Result<bool, ScheduleError> {
        let time = TimeOfDay::parse(time_text)?;
        let now = self.shared.clock.now();
        let mut state = self.shared.lock_state();
        let Some(removed) = state.targets.remove(&time) else {
            return Ok(false);
        };
        debug!(title = "timer.del_target", target = %removed, "removed");
        if state.enabled {
            state.select_next(&now);
        } else if state.next == Some(time) {
            state.next = None;
        }
        Ok(true)
    }

    /// Re-enables rotation and arms the earliest upcoming target. Idempotent.
    pub fn start(&self) {
        let now = self.shared.clock.now();
        let mut state = self.shared.lock_state();
        if state.enabled && state.next.is_some() {
            return;
        }
        info!(title = "timer.start", targets = state.targets.len(), "start");
        state.enabled = true;
        if !state.targets.is_empty() {
            state.select_next(&now);
        }
    }

    /// Clears `next` and halts alert dispatch; the clock keeps sampling.
    pub fn stop(&self) {
        let dispatcher = {
            let mut state = self.shared.lock_state();
            if !state.enabled && state.dispatcher.is_none() {
                return;
            }
            info!(title = "timer.stop", "stop");
            state.enabled = false;
            state.next = None;
            state.dispatcher.take()
        };
        if let Some(dispatcher) = dispatcher {
            dispatcher.halt();
        }
    }

    pub fn select_next(&self, now: DateTime<Local>) -> Option<Target> {
        let mut state = self.shared.lock_state();
        let key = state.select_next(&now)?;
        state.targets.get(&key).cloned()
    }

    pub fn targets(&self) -> Vec<Target> {
        self.shared.lock_state().targets.sorted_view().to_vec()
    }

    pub fn next_target(&self) -> Option<Target> {
        self.shared.lock_state().next_target().cloned()
    }

    pub fn is_armed(&self) -> bool {
        self.shared.lock_state().next.is_some()
    }

    pub fn is_dispatching(&self) -> bool {
        self.shared.lock_state().dispatcher.is_some()
    }

    pub fn time_provider_label(&self) -> &'static str {
        self.shared.clock.label()
    }

    pub fn snapshot(&self) -> SchedulerSnapshot {
        let state = self.shared.lock_state();
        let sampled_at = state.last_sampled;
        let next = state.next_target().map(|target| {
            let remaining_secs = sampled_at.and_then(|now| {
                target
                    .resolved()
                    .map(|resolved| round_to_seconds(resolved.instant - now))
            });
            NextSnapshot {
                name: target.name().to_string(),
                time_text: target.time().canonical_text(),
                remaining_secs,
                remaining_text: remaining_secs.map_or_else(|| "--".to_string(), remaining_text),
            }
        });
        SchedulerSnapshot {
            sampled_at,
            sampled_text: sampled_at.map_or_else(
                || "--:--:--".to_string(),
                |now| TimeOfDay::from_datetime(&now).canonical_text(),
            ),
            enabled: state.enabled,
            armed: state.next.is_some(),
            dispatching: state.dispatcher.is_some(),
            target_count: state.targets.len(),
            next,
        }
    }

    pub fn shutdown(&mut self) {
        self.stop.store(true, Ordering::Relaxed);
        if let Some(join) = self.clock_join.take() {
            let _ = join.join();
        }
        let dispatcher = self.shared.lock_state().dispatcher.take();
        if let Some(dispatcher) = dispatcher {
            dispatcher.halt();
        }
        self.shared
            .notifier
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .shutdown();
    }

    fn insert_target(
        &self,
        time: TimeOfDay,
        name: &str,
        alarm: &str,
        fire_at: Option<DateTime<Local>>,
        now: &DateTime<Local>,
    ) {
        let mut state = self.shared.lock_state();
        let inserted = match fire_at {
            Some(fire_at) => state.targets.upsert_one_shot(time, name, alarm, fire_at),
            None => state.targets.upsert(time, name, alarm, false),
        };
        if let Some(target) = state.targets.get(&time) {
            debug!(title = "timer.add_target", target = %target, inserted, "registered");
        }
        if state.enabled {
            state.select_next(now);
        }
    }

    fn lock_observer(&self) -> MutexGuard<'_, Observer> {
        self.shared
            .observer
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

impl Drop for Scheduler {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn run_clock_loop(shared: Arc<Shared>, stop: Arc<AtomicBool>) {
    if sleep_unless_stopped(&stop, shared.config.startup_delay) {
        debug!(title = "timer.loop", clock = shared.clock.label(), "clock loop started");
        while !stop.load(Ordering::Relaxed) {
            clock_tick(&shared);
            if !sleep_unless_stopped(&stop, shared.config.tick_interval) {
                break;
            }
        }
    }

    let dispatcher = shared.lock_state().dispatcher.take();
    if let Some(dispatcher) = dispatcher {
        dispatcher.halt();
    }
    debug!(title = "timer.loop", "clock loop stopped");
}

fn clock_tick(shared: &Arc<Shared>) {
    let now = shared.clock.now();
    let halted = {
        let mut state = shared.lock_state();
        state.last_sampled = Some(now);

        if state.enabled && state.next.is_none() && !state.targets.is_empty() {
            state.select_next(&now);
        }

        if state.next.is_some() && state.dispatcher.is_none() {
            state.dispatcher = Some(spawn_dispatcher(shared));
        }
        let halted = if state.next.is_none() {
            state.dispatcher.take()
        } else {
            None
        };

        if let Some(sample) = state.remaining_sample(&now)
            && let Some(dispatcher) = &state.dispatcher
        {
            trace!(
                title = "timer.loop",
                remaining_secs = sample.remaining_secs,
                "sample"
            );
            if dispatcher.samples.send(sample).is_err() {
                warn!(title = "timer.loop", "dispatch loop gone; sample dropped");
            }
        }
        halted
    };

    if let Some(dispatcher) = halted {
        dispatcher.halt();
    }
}

fn spawn_dispatcher(shared: &Arc<Shared>) -> Dispatcher {
    let (samples, receiver) = mpsc::channel();
    let shared_for_thread = Arc::clone(shared);
    let join = thread::spawn(move || run_dispatch_loop(shared_for_thread, receiver));
    Dispatcher { samples, join }
}

fn run_dispatch_loop(shared: Arc<Shared>, samples: Receiver<RemainingSample>) {
    info!(title = "timer.alert_loop", "alert dispatch started");
    let mut debouncer = Debouncer::new();
    let mut current: Option<(TimeOfDay, DateTime<Local>)> = None;
    for sample in samples {
        let key = (sample.target.time, sample.target.instant);
        if current != Some(key) {
            debouncer.reset();
            current = Some(key);
        }
        if !shared.lock_state().is_current(&sample.target) {
            trace!(title = "timer.alert_loop", name = %sample.target.name, "stale sample");
            continue;
        }
        if let Some(remaining_secs) = debouncer.observe(sample.remaining_secs) {
            shared.apply_policy(&sample.target, remaining_secs);
        }
    }
    info!(title = "timer.alert_loop", "alert dispatch stopped");
}

fn sleep_unless_stopped(stop: &AtomicBool, total: Duration) -> bool {
    let mut remaining = total;
    while !remaining.is_zero() {
        if stop.load(Ordering::Relaxed) {
            return false;
        }
        let slice = remaining.min(STOP_POLL_SLICE);
        thread::sleep(slice);
        remaining -= slice;
    }
    !stop.load(Ordering::Relaxed)
}
