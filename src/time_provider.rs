use std::sync::Mutex;

use chrono::{DateTime, Local};

/// Source of wall-clock time for the scheduler's clock loop.
pub trait TimeProvider: Send + Sync {
    fn now(&self) -> DateTime<Local>;
    fn label(&self) -> &'static str;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SystemTimeProvider;

impl TimeProvider for SystemTimeProvider {
    fn now(&self) -> DateTime<Local> {
        Local::now()
    }

    fn label(&self) -> &'static str {
        "SYSTEM_LOCAL"
    }
}

/// A clock that only moves when told to. Lets tests pin the rotation and
/// remaining-time arithmetic to a known instant.
#[derive(Debug)]
pub struct ManualTimeProvider {
    current: Mutex<DateTime<Local>>,
}

impl ManualTimeProvider {
    pub fn new(start: DateTime<Local>) -> Self {
        Self {
            current: Mutex::new(start),
        }
    }

    pub fn set(&self, value: DateTime<Local>) {
        let mut guard = self.current.lock().unwrap_or_else(|err| err.into_inner());
        *guard = value;
    }

    pub fn advance(&self, by: chrono::Duration) {
        let mut guard = self.current.lock().unwrap_or_else(|err| err.into_inner());
        *guard += by;
    }
}

impl TimeProvider for ManualTimeProvider {
    fn now(&self) -> DateTime<Local> {
        *self.current.lock().unwrap_or_else(|err| err.into_inner())
    }

    fn label(&self) -> &'static str {
        "MANUAL"
    }
}
