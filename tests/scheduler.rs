use std::sync::mpsc::{Receiver, channel};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

use chrono::{Local, TimeZone};
use countdown::{
    DispatchPolicy, ManualTimeProvider, ScheduleError, Scheduler, SchedulerConfig, TimeOfDay,
    ValueKind,
};

#[derive(Debug, PartialEq)]
enum Event {
    Alarm(String, String),
    Alert(String, i64),
}

fn record(scheduler: &Scheduler) -> Receiver<Event> {
    let (sender, receiver) = channel();
    let alarm_sender = Mutex::new(sender.clone());
    let alert_sender = Mutex::new(sender);
    scheduler.set_alarm_callback(move |name, alarm| {
        let _ = alarm_sender
            .lock()
            .expect("lock")
            .send(Event::Alarm(name.to_string(), alarm.to_string()));
    });
    scheduler.set_alert_callback(move |name, remaining| {
        let _ = alert_sender
            .lock()
            .expect("lock")
            .send(Event::Alert(name.to_string(), remaining));
    });
    receiver
}

fn idle_scheduler() -> (Scheduler, Arc<ManualTimeProvider>) {
    let now = Local
        .with_ymd_and_hms(2026, 3, 2, 8, 0, 0)
        .single()
        .expect("valid local time");
    let clock = Arc::new(ManualTimeProvider::new(now));
    let config = SchedulerConfig::default()
        .with_startup_delay(Duration::from_secs(3_600))
        .with_dispatch(DispatchPolicy::Inline);
    (Scheduler::with_time_provider(config, clock.clone()), clock)
}

#[test]
fn one_shot_fires_once_on_the_system_clock() {
    let config = SchedulerConfig::default()
        .with_tick_interval(Duration::from_millis(50))
        .with_startup_delay(Duration::ZERO)
        .with_overdue_threshold_secs(-2)
        .with_dispatch(DispatchPolicy::Inline);
    let scheduler = Scheduler::new(config);
    let events = record(&scheduler);
    scheduler
        .add_target_after_delay("3", "tea", "go")
        .expect("valid delay");
    assert!(scheduler.is_armed());
    assert_eq!(scheduler.time_provider_label(), "SYSTEM_LOCAL");

    let deadline = Instant::now() + Duration::from_secs(15);
    while (scheduler.is_armed() || scheduler.is_dispatching()) && Instant::now() < deadline {
        thread::sleep(Duration::from_millis(50));
    }

    let events: Vec<Event> = events.try_iter().collect();
    let alarms: Vec<&Event> = events
        .iter()
        .filter(|event| matches!(event, Event::Alarm(..)))
        .collect();
    assert_eq!(alarms, [&Event::Alarm("tea".into(), "go".into())]);
    assert!(events.contains(&Event::Alert("tea".into(), 2)), "{events:?}");
    assert!(scheduler.targets().is_empty());
    assert!(!scheduler.is_armed());
    assert!(!scheduler.is_dispatching());
}

#[test]
fn registering_the_same_time_twice_overwrites() {
    let (scheduler, _clock) = idle_scheduler();
    scheduler
        .add_target_at_time_of_day("09:00:00", "first", "a")
        .expect("valid");
    scheduler
        .add_target_at_time_of_day("9:00:00", "second", "b")
        .expect("valid");

    let targets = scheduler.targets();
    assert_eq!(targets.len(), 1);
    assert_eq!(targets[0].name(), "second");
    assert_eq!(targets[0].alarm(), "b");
    assert!(!targets[0].only_once());
}

#[test]
fn remove_target_reselects_the_next_one() {
    let (scheduler, _clock) = idle_scheduler();
    scheduler
        .add_target_at_time_of_day("09:00:00", "nine", "")
        .expect("valid");
    scheduler
        .add_target_at_time_of_day("10:00:00", "ten", "")
        .expect("valid");
    assert_eq!(scheduler.next_target().map(|t| t.name().to_string()), Some("nine".into()));

    assert_eq!(scheduler.remove_target("09:00:00"), Ok(true));
    assert_eq!(scheduler.next_target().map(|t| t.name().to_string()), Some("ten".into()));
    assert_eq!(scheduler.remove_target("09:00:00"), Ok(false));
}

#[test]
fn invalid_input_reports_kind_and_text() {
    let (scheduler, _clock) = idle_scheduler();
    let err = scheduler
        .add_target_after_delay("1:75", "bad", "")
        .expect_err("minutes out of range");
    assert_eq!(
        err,
        ScheduleError::InvalidFormat {
            kind: ValueKind::Delay,
            input: "1:75".into(),
        }
    );
    assert_eq!(err.to_string(), "invalid delay '1:75'");

    let err = TimeOfDay::parse("12:60:00").expect_err("minute out of range");
    assert_eq!(err.to_string(), "invalid time-of-day '12:60:00'");
}

#[test]
fn snapshot_tracks_registration() {
    let (scheduler, _clock) = idle_scheduler();
    let snapshot = scheduler.snapshot();
    assert!(snapshot.enabled);
    assert!(!snapshot.armed);
    assert_eq!(snapshot.target_count, 0);

    scheduler
        .add_target_after_delay("10:00", "pasta", "drain")
        .expect("valid");
    let snapshot = scheduler.snapshot();
    assert!(snapshot.armed);
    assert_eq!(snapshot.target_count, 1);
    assert_eq!(snapshot.next.expect("next").time_text, "08:10:00");

    scheduler.stop();
    assert!(!scheduler.snapshot().armed);
}

#[test]
fn delay_of_more_than_a_day_fires_on_the_right_date() {
    let (scheduler, _clock) = idle_scheduler();
    scheduler
        .add_target_after_delay("25:00:00", "renew", "")
        .expect("valid");
    let next = scheduler.next_target().expect("armed");
    assert!(next.only_once());
    assert_eq!(
        next.fire_at(),
        Local.with_ymd_and_hms(2026, 3, 3, 9, 0, 0).single()
    );
    assert_eq!(
        next.resolved().map(|resolved| resolved.instant),
        Local.with_ymd_and_hms(2026, 3, 3, 9, 0, 0).single()
    );
}
