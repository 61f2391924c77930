use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::mpsc::{self, SyncSender, TrySendError};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};

use tracing::{debug, warn};

pub type AlarmCallback = Arc<dyn Fn(&str, &str) + Send + Sync>;
pub type AlertCallback = Arc<dyn Fn(&str, i64) + Send + Sync>;

/// Caller-supplied callbacks. A missing callback swallows its notifications.
#[derive(Clone, Default)]
pub struct Observer {
    alarm: Option<AlarmCallback>,
    alert: Option<AlertCallback>,
}

impl Observer {
    pub fn set_alarm(&mut self, callback: AlarmCallback) {
        self.alarm = Some(callback);
    }

    pub fn set_alert(&mut self, callback: AlertCallback) {
        self.alert = Some(callback);
    }

    fn deliver(&self, notification: &Notification) {
        match notification {
            Notification::Alarm { name, alarm } => {
                if let Some(callback) = &self.alarm {
                    callback(name, alarm);
                }
            }
            Notification::Alert {
                name,
                remaining_secs,
            } => {
                if let Some(callback) = &self.alert {
                    callback(name, *remaining_secs);
                }
            }
        }
    }
}

impl fmt::Debug for Observer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Observer")
            .field("alarm", &self.alarm.is_some())
            .field("alert", &self.alert.is_some())
            .finish()
    }
}

#[derive(Debug, Clone, Eq, PartialEq)]
pub enum Notification {
    Alarm { name: String, alarm: String },
    Alert { name: String, remaining_secs: i64 },
}

/// How notifications leave the dispatch loop.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum DispatchPolicy {
    /// Call the observer on the dispatch thread. Callbacks must return quickly.
    Inline,
    /// Queue to one worker thread. When `capacity` notifications are already
    /// waiting, the new one is dropped.
    Worker { capacity: usize },
}

impl Default for DispatchPolicy {
    fn default() -> Self {
        DispatchPolicy::Worker { capacity: 64 }
    }
}

pub(crate) struct Notifier {
    observer: Arc<Mutex<Observer>>,
    queue: Option<SyncSender<Notification>>,
    worker: Option<JoinHandle<()>>,
}

impl Notifier {
    pub(crate) fn new(policy: DispatchPolicy, observer: Arc<Mutex<Observer>>) -> Self {
        match policy {
            DispatchPolicy::Inline => Self {
                observer,
                queue: None,
                worker: None,
            },
            DispatchPolicy::Worker { capacity } => {
                let (sender, receiver) = mpsc::sync_channel::<Notification>(capacity.max(1));
                let observer_for_thread = Arc::clone(&observer);
                let worker = thread::spawn(move || {
                    for notification in receiver {
                        deliver_guarded(&observer_for_thread, &notification);
                    }
                });
                Self {
                    observer,
                    queue: Some(sender),
                    worker: Some(worker),
                }
            }
        }
    }

    /// Returns `false` when the notification was dropped.
    pub(crate) fn notify(&self, notification: Notification) -> bool {
        let Some(queue) = &self.queue else {
            deliver_guarded(&self.observer, &notification);
            return true;
        };

        match queue.try_send(notification) {
            Ok(()) => true,
            Err(TrySendError::Full(dropped)) => {
                warn!(
                    title = "timer.notify",
                    notification = ?dropped,
                    "notification queue full; dropped"
                );
                false
            }
            Err(TrySendError::Disconnected(dropped)) => {
                debug!(
                    title = "timer.notify",
                    notification = ?dropped,
                    "notifier stopped; dropped"
                );
                false
            }
        }
    }

    pub(crate) fn shutdown(&mut self) {
        self.queue.take();
        if let Some(join) = self.worker.take() {
            let _ = join.join();
        }
    }
}

impl Drop for Notifier {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn deliver_guarded(observer: &Mutex<Observer>, notification: &Notification) {
    let snapshot = observer
        .lock()
        .unwrap_or_else(|err| err.into_inner())
        .clone();
    if panic::catch_unwind(AssertUnwindSafe(|| snapshot.deliver(notification))).is_err() {
        warn!(title = "timer.notify", notification = ?notification, "observer panicked");
    }
}
