use std::fs;
use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result, bail};
use serde::Deserialize;

use crate::alarm::notify::DispatchPolicy;
use crate::alarm::scheduler::{
    DEFAULT_OVERDUE_THRESHOLD_SECS, DEFAULT_STARTUP_DELAY, DEFAULT_TICK_INTERVAL, Scheduler,
    SchedulerConfig,
};
use crate::delay::Delay;
use crate::time_of_day::TimeOfDay;

#[derive(Debug, Clone)]
pub struct TargetsConfig {
    pub version: u32,
    pub settings: SchedulerSettings,
    pub targets: Vec<TargetSpec>,
}

#[derive(Debug, Clone, Eq, PartialEq)]
pub struct SchedulerSettings {
    pub tick_interval_ms: u64,
    pub startup_delay_ms: u64,
    pub overdue_threshold_secs: i64,
    pub dispatch: DispatchPolicy,
}

impl Default for SchedulerSettings {
    fn default() -> Self {
        Self {
            tick_interval_ms: DEFAULT_TICK_INTERVAL.as_millis() as u64,
            startup_delay_ms: DEFAULT_STARTUP_DELAY.as_millis() as u64,
            overdue_threshold_secs: DEFAULT_OVERDUE_THRESHOLD_SECS,
            dispatch: DispatchPolicy::default(),
        }
    }
}

impl SchedulerSettings {
    pub fn to_scheduler_config(&self) -> SchedulerConfig {
        SchedulerConfig::default()
            .with_tick_interval(Duration::from_millis(self.tick_interval_ms))
            .with_startup_delay(Duration::from_millis(self.startup_delay_ms))
            .with_overdue_threshold_secs(self.overdue_threshold_secs)
            .with_dispatch(self.dispatch)
    }
}

#[derive(Debug, Clone, Eq, PartialEq)]
pub struct TargetSpec {
    pub name: String,
    pub alarm: String,
    pub schedule: TargetSchedule,
}

#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum TargetSchedule {
    TimeOfDay(TimeOfDay),
    /// Resolved against the clock when registered.
    Delay(Delay),
}

pub fn load_targets_config(path: &Path) -> Result<TargetsConfig> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("unable to read targets file {}", path.display()))?;
    parse_targets_config_text(&content)
}

pub fn parse_targets_config_text(content: &str) -> Result<TargetsConfig> {
    let raw = serde_json::from_str::<TargetsConfigFile>(content).map_err(|err| {
        let line = err.line();
        let column = err.column();
        anyhow::anyhow!("invalid JSON at line {line}, column {column}: {err}")
    })?;

    if raw.version != 1 {
        bail!(
            "unsupported targets file version {}; expected version 1",
            raw.version
        );
    }

    let settings = parse_settings(raw.settings)?;

    let mut targets = Vec::with_capacity(raw.targets.len());
    for target in raw.targets {
        if target.name.trim().is_empty() {
            bail!("every target needs a non-empty name");
        }
        let schedule = match target.schedule {
            TargetScheduleFile::TimeOfDay { time } => TargetSchedule::TimeOfDay(
                TimeOfDay::parse(&time)
                    .with_context(|| format!("target '{}' has a bad time", target.name))?,
            ),
            TargetScheduleFile::Delay { delay } => TargetSchedule::Delay(
                Delay::parse(&delay)
                    .with_context(|| format!("target '{}' has a bad delay", target.name))?,
            ),
        };
        targets.push(TargetSpec {
            name: target.name,
            alarm: target.alarm,
            schedule,
        });
    }

    Ok(TargetsConfig {
        version: raw.version,
        settings,
        targets,
    })
}

fn parse_settings(raw: SettingsFile) -> Result<SchedulerSettings> {
    if raw.tick_interval_ms == 0 {
        bail!("settings.tick_interval_ms must be greater than zero");
    }
    if raw.overdue_threshold_secs >= 0 {
        bail!(
            "settings.overdue_threshold_secs must be negative, got {}",
            raw.overdue_threshold_secs
        );
    }
    let dispatch = match raw.dispatch {
        DispatchModeFile::Inline => DispatchPolicy::Inline,
        DispatchModeFile::Worker => {
            if raw.notify_queue_capacity == 0 {
                bail!("settings.notify_queue_capacity must be greater than zero");
            }
            DispatchPolicy::Worker {
                capacity: raw.notify_queue_capacity,
            }
        }
    };

    Ok(SchedulerSettings {
        tick_interval_ms: raw.tick_interval_ms,
        startup_delay_ms: raw.startup_delay_ms,
        overdue_threshold_secs: raw.overdue_threshold_secs,
        dispatch,
    })
}

/// Registers every target with the scheduler, in file order.
pub fn register_targets(scheduler: &Scheduler, targets: &[TargetSpec]) -> Result<()> {
    for target in targets {
        let registered = match target.schedule {
            TargetSchedule::TimeOfDay(time) => scheduler.add_target_at_time_of_day(
                &time.canonical_text(),
                &target.name,
                &target.alarm,
            ),
            TargetSchedule::Delay(delay) => scheduler.add_target_after_delay(
                &delay.canonical_text(),
                &target.name,
                &target.alarm,
            ),
        };
        registered.with_context(|| format!("failed to register target '{}'", target.name))?;
    }
    Ok(())
}

#[derive(Debug, Deserialize)]
struct TargetsConfigFile {
    version: u32,
    #[serde(default)]
    settings: SettingsFile,
    #[serde(default)]
    targets: Vec<TargetFile>,
}

#[derive(Debug, Deserialize)]
struct SettingsFile {
    #[serde(default = "default_tick_interval_ms")]
    tick_interval_ms: u64,
    #[serde(default = "default_startup_delay_ms")]
    startup_delay_ms: u64,
    #[serde(default = "default_overdue_threshold_secs")]
    overdue_threshold_secs: i64,
    #[serde(default)]
    dispatch: DispatchModeFile,
    #[serde(default = "default_notify_queue_capacity")]
    notify_queue_capacity: usize,
}

impl Default for SettingsFile {
    fn default() -> Self {
        Self {
            tick_interval_ms: default_tick_interval_ms(),
            startup_delay_ms: default_startup_delay_ms(),
            overdue_threshold_secs: default_overdue_threshold_secs(),
            dispatch: DispatchModeFile::default(),
            notify_queue_capacity: default_notify_queue_capacity(),
        }
    }
}

#[derive(Debug, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
enum DispatchModeFile {
    Inline,
    #[default]
    Worker,
}

#[derive(Debug, Deserialize)]
struct TargetFile {
    name: String,
    #[serde(default)]
    alarm: String,
    #[serde(flatten)]
    schedule: TargetScheduleFile,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
enum TargetScheduleFile {
    TimeOfDay { time: String },
    Delay { delay: String },
}

fn default_tick_interval_ms() -> u64 {
    DEFAULT_TICK_INTERVAL.as_millis() as u64
}

fn default_startup_delay_ms() -> u64 {
    DEFAULT_STARTUP_DELAY.as_millis() as u64
}

fn default_overdue_threshold_secs() -> i64 {
    DEFAULT_OVERDUE_THRESHOLD_SECS
}

fn default_notify_queue_capacity() -> usize {
    64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_valid_targets_file() {
        let json = r#"
{
  "version": 1,
  "settings": {
    "tick_interval_ms": 100,
    "overdue_threshold_secs": -20,
    "dispatch": "inline"
  },
  "targets": [
    { "name": "standup", "kind": "time_of_day", "time": "09:30:00", "alarm": "Standup!" },
    { "name": "tea", "kind": "delay", "delay": "5:00" }
  ]
}
"#;

        let config = parse_targets_config_text(json).expect("valid config");
        assert_eq!(config.version, 1);
        assert_eq!(config.settings.tick_interval_ms, 100);
        assert_eq!(config.settings.startup_delay_ms, 800);
        assert_eq!(config.settings.overdue_threshold_secs, -20);
        assert_eq!(config.settings.dispatch, DispatchPolicy::Inline);
        assert_eq!(config.targets.len(), 2);
        assert_eq!(
            config.targets[0].schedule,
            TargetSchedule::TimeOfDay(TimeOfDay::new(9, 30, 0).expect("valid"))
        );
        assert_eq!(config.targets[0].alarm, "Standup!");
        assert_eq!(
            config.targets[1].schedule,
            TargetSchedule::Delay(Delay::new(0, 5, 0).expect("valid"))
        );
        assert_eq!(config.targets[1].alarm, "");
    }

    #[test]
    fn missing_settings_use_defaults() {
        let config = parse_targets_config_text(r#"{ "version": 1 }"#).expect("valid config");
        assert_eq!(config.settings, SchedulerSettings::default());
        assert_eq!(config.settings.dispatch, DispatchPolicy::Worker { capacity: 64 });
        assert!(config.targets.is_empty());

        let scheduler_config = config.settings.to_scheduler_config();
        assert_eq!(scheduler_config.tick_interval, Duration::from_millis(250));
        assert_eq!(scheduler_config.overdue_threshold_secs, -15);
    }

    #[test]
    fn rejects_invalid_time() {
        let json = r#"
{
  "version": 1,
  "targets": [ { "name": "bad", "kind": "time_of_day", "time": "25:00:00" } ]
}
"#;
        let err = parse_targets_config_text(json).expect_err("invalid time should fail");
        let text = format!("{err:#}");
        assert!(text.contains("target 'bad' has a bad time"), "{text}");
        assert!(text.contains("invalid time-of-day '25:00:00'"), "{text}");
    }

    #[test]
    fn rejects_unknown_kind_as_invalid_json() {
        let json = r#"
{
  "version": 1,
  "targets": [ { "name": "odd", "kind": "weekly", "time": "09:00:00" } ]
}
"#;
        let err = parse_targets_config_text(json).expect_err("unknown kind should fail");
        assert!(err.to_string().contains("invalid JSON"));
    }

    #[test]
    fn rejects_bad_versions_and_settings() {
        let err = parse_targets_config_text(r#"{ "version": 2 }"#).expect_err("version");
        assert!(err.to_string().contains("unsupported targets file version 2"));

        let err = parse_targets_config_text(
            r#"{ "version": 1, "settings": { "overdue_threshold_secs": 5 } }"#,
        )
        .expect_err("threshold");
        assert!(err.to_string().contains("must be negative"));

        let err = parse_targets_config_text(
            r#"{ "version": 1, "settings": { "tick_interval_ms": 0 } }"#,
        )
        .expect_err("tick");
        assert!(err.to_string().contains("tick_interval_ms"));

        let err = parse_targets_config_text(
            r#"{ "version": 1, "settings": { "notify_queue_capacity": 0 } }"#,
        )
        .expect_err("capacity");
        assert!(err.to_string().contains("notify_queue_capacity"));
    }

    #[test]
    fn rejects_blank_names() {
        let json = r#"
{ "version": 1, "targets": [ { "name": " ", "kind": "delay", "delay": "10" } ] }
"#;
        let err = parse_targets_config_text(json).expect_err("blank name");
        assert!(err.to_string().contains("non-empty name"));
    }
}
