use std::path::PathBuf;
use std::sync::mpsc::{self, RecvTimeoutError};
use std::time::Duration;

use anyhow::{Context, Result, bail};
use clap::{Parser, ValueEnum};
use tracing::{error, info};

use countdown::alarm::model::{
    SchedulerSettings, TargetSchedule, TargetSpec, load_targets_config, register_targets,
};
use countdown::logging::{self, LogLevel, LogOptions, LogSink};
use countdown::{Delay, Scheduler, TimeOfDay, remaining_text};

const IDLE_POLL: Duration = Duration::from_millis(500);

#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum)]
enum CliLogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl From<CliLogLevel> for LogLevel {
    fn from(value: CliLogLevel) -> Self {
        match value {
            CliLogLevel::Error => LogLevel::Error,
            CliLogLevel::Warn => LogLevel::Warn,
            CliLogLevel::Info => LogLevel::Info,
            CliLogLevel::Debug => LogLevel::Debug,
            CliLogLevel::Trace => LogLevel::Trace,
        }
    }
}

#[derive(Parser, Debug)]
#[command(
    name = "countdown",
    version,
    about = "Countdown alarms for daily and one-shot targets"
)]
struct Cli {
    /// JSON targets file
    #[arg(long)]
    targets: Option<PathBuf>,

    /// Daily target time (HH:MM:SS); repeatable
    #[arg(long = "at", value_name = "TIME")]
    at: Vec<String>,

    /// One-shot target delay from now (HH:MM:SS); repeatable
    #[arg(long = "after", value_name = "DELAY")]
    after: Vec<String>,

    /// Name for targets given with --at/--after
    #[arg(long, default_value = "countdown")]
    name: String,

    /// Alarm payload for targets given with --at/--after
    #[arg(long, default_value = "TaDaa!")]
    alarm: String,

    #[arg(long)]
    tick_ms: Option<u64>,

    #[arg(long, allow_hyphen_values = true)]
    overdue_secs: Option<i64>,

    /// Exit once this many alarms have fired
    #[arg(long)]
    exit_after: Option<u32>,

    /// Validate the targets and print them without scheduling
    #[arg(long)]
    check: bool,

    #[arg(long, value_enum, default_value_t = CliLogLevel::Info)]
    log_level: CliLogLevel,

    #[arg(long)]
    log_stdout: bool,

    #[arg(long, conflicts_with = "log_stdout")]
    log_file: Option<PathBuf>,
}

fn main() {
    if let Err(err) = run() {
        eprintln!("error: {err:#}");
        std::process::exit(1);
    }
}

fn run() -> Result<()> {
    let cli = Cli::parse();
    let sink = match (&cli.log_file, cli.log_stdout) {
        (Some(path), _) => LogSink::File(path.clone()),
        (None, true) => LogSink::Stdout,
        (None, false) => LogSink::Stderr,
    };
    let _log_guard = logging::init(&LogOptions {
        level: cli.log_level.into(),
        sink,
    })?;

    let (mut settings, mut targets) = match &cli.targets {
        Some(path) => {
            let config = load_targets_config(path)
                .with_context(|| format!("failed to load {}", path.display()))?;
            (config.settings, config.targets)
        }
        None => (SchedulerSettings::default(), Vec::new()),
    };
    apply_overrides(&cli, &mut settings)?;
    targets.extend(flag_targets(&cli)?);

    if targets.is_empty() {
        bail!("no targets given; use --targets, --at or --after");
    }

    if cli.check {
        print_targets(&targets);
        println!("Configuration OK");
        return Ok(());
    }

    run_scheduler(&settings, &targets, cli.exit_after)
}

fn apply_overrides(cli: &Cli, settings: &mut SchedulerSettings) -> Result<()> {
    if let Some(tick_ms) = cli.tick_ms {
        if tick_ms == 0 {
            bail!("--tick-ms must be greater than zero");
        }
        settings.tick_interval_ms = tick_ms;
    }
    if let Some(overdue_secs) = cli.overdue_secs {
        if overdue_secs >= 0 {
            bail!("--overdue-secs must be negative");
        }
        settings.overdue_threshold_secs = overdue_secs;
    }
    Ok(())
}

fn flag_targets(cli: &Cli) -> Result<Vec<TargetSpec>> {
    let mut targets = Vec::with_capacity(cli.at.len() + cli.after.len());
    for text in &cli.at {
        let time = TimeOfDay::parse(text).context("invalid --at value")?;
        targets.push(TargetSpec {
            name: cli.name.clone(),
            alarm: cli.alarm.clone(),
            schedule: TargetSchedule::TimeOfDay(time),
        });
    }
    for text in &cli.after {
        let delay = Delay::parse(text).context("invalid --after value")?;
        targets.push(TargetSpec {
            name: cli.name.clone(),
            alarm: cli.alarm.clone(),
            schedule: TargetSchedule::Delay(delay),
        });
    }
    Ok(targets)
}

fn print_targets(targets: &[TargetSpec]) {
    println!("Targets ({}):", targets.len());
    for target in targets {
        let (kind, value) = match target.schedule {
            TargetSchedule::TimeOfDay(time) => ("time_of_day", time.canonical_text()),
            TargetSchedule::Delay(delay) => ("delay", delay.canonical_text()),
        };
        println!(
            "  {:<16} {:<11} {:<10} ({})",
            target.name, kind, value, target.alarm
        );
    }
}

fn run_scheduler(
    settings: &SchedulerSettings,
    targets: &[TargetSpec],
    exit_after: Option<u32>,
) -> Result<()> {
    let scheduler = Scheduler::new(settings.to_scheduler_config());
    let (alarms_tx, alarms_rx) = mpsc::channel::<()>();
    scheduler.set_alarm_callback(move |name, alarm| {
        println!("ALARM {name}: {alarm}");
        let _ = alarms_tx.send(());
    });
    scheduler.set_alert_callback(|name, remaining| {
        println!("ALERT {name} {} ({remaining}s)", remaining_text(remaining));
    });

    register_targets(&scheduler, targets).inspect_err(|err| {
        error!(title = "cli.register", error = %err, "registration failed");
    })?;
    info!(
        title = "cli.run",
        targets = targets.len(),
        clock = scheduler.time_provider_label(),
        "scheduler running"
    );

    let mut fired = 0_u32;
    loop {
        match alarms_rx.recv_timeout(IDLE_POLL) {
            Ok(()) => {
                fired += 1;
                if exit_after.is_some_and(|limit| fired >= limit) {
                    break;
                }
            }
            Err(RecvTimeoutError::Timeout) => {
                let snapshot = scheduler.snapshot();
                if snapshot.target_count == 0 && !snapshot.dispatching {
                    info!(title = "cli.run", "no targets left");
                    break;
                }
            }
            Err(RecvTimeoutError::Disconnected) => break,
        }
    }

    drop(scheduler);
    Ok(())
}
