//! Per-service runtime state.
//!
//! Exactly one runner mutates a given [`ServiceState`]; everyone else (the
//! fleet, the UI) reads through [`ServiceState::snapshot`], which copies the
//! scalar fields and deep-copies the history rings under the lock. All fields
//! sit behind a single `parking_lot::Mutex` that is never held across an
//! `.await`.

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::fmt;
use tokio_util::sync::CancellationToken;

/// Last N classified errors kept for the details view.
const ERROR_HISTORY_LIMIT: usize = 10;
/// Last N output lines kept for the merged log view.
const LOG_HISTORY_LIMIT: usize = 100;

/// Lifecycle status of a supervised forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    /// Spawned, waiting for the grace window or first output.
    Connecting,
    /// Forwarding; probes pass.
    Online,
    /// Lost the child or the port; waiting out backoff before respawn.
    Reconnecting,
    /// Classified failure; terminal once the reconnect ceiling is hit.
    Error,
    /// Cancelled and torn down.
    Stopped,
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Status::Connecting => write!(f, "CONNECTING"),
            Status::Online => write!(f, "ONLINE"),
            Status::Reconnecting => write!(f, "RECONNECTING"),
            Status::Error => write!(f, "ERROR"),
            Status::Stopped => write!(f, "STOPPED"),
        }
    }
}

/// One classified error event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ErrorEntry {
    pub time: DateTime<Utc>,
    pub message: String,
}

/// One captured output line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogEntry {
    pub time: DateTime<Utc>,
    pub message: String,
    pub is_error: bool,
}

#[derive(Debug)]
struct StateInner {
    status: Status,
    start_time: Option<DateTime<Utc>>,
    online_since: Option<DateTime<Utc>>,
    last_error_at: Option<DateTime<Utc>>,
    reconnect_count: u32,
    last_error: String,
    error_history: VecDeque<ErrorEntry>,
    log_history: VecDeque<LogEntry>,
}

/// Runtime state of one running service, owned for writing by its runner.
pub struct ServiceState {
    pub name: String,
    pub command: String,
    pub local_port: String,
    pub remote_port: String,
    cancel: CancellationToken,
    inner: Mutex<StateInner>,
}

impl ServiceState {
    pub fn new(
        name: String,
        command: String,
        local_port: String,
        remote_port: String,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            name,
            command,
            local_port,
            remote_port,
            cancel,
            inner: Mutex::new(StateInner {
                status: Status::Connecting,
                start_time: None,
                online_since: None,
                last_error_at: None,
                reconnect_count: 0,
                last_error: String::new(),
                error_history: VecDeque::new(),
                log_history: VecDeque::new(),
            }),
        }
    }

    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn status(&self) -> Status {
        self.inner.lock().status
    }

    /// Transition the status. Entering `Online` stamps `online_since`;
    /// the value is retained on the way out so snapshots can still show the
    /// last time the service was up.
    pub fn set_status(&self, status: Status) {
        let mut inner = self.inner.lock();
        inner.status = status;
        if status == Status::Online {
            inner.online_since = Some(Utc::now());
        }
    }

    /// Record the first spawn.
    pub fn mark_started(&self) {
        let mut inner = self.inner.lock();
        if inner.start_time.is_none() {
            inner.start_time = Some(Utc::now());
        }
    }

    /// Classified failure: remember the message in the bounded history,
    /// stamp the time, and move to `Error`.
    pub fn set_error(&self, message: impl Into<String>) {
        let message = message.into();
        let mut inner = self.inner.lock();
        inner.error_history.push_back(ErrorEntry {
            time: Utc::now(),
            message: message.clone(),
        });
        while inner.error_history.len() > ERROR_HISTORY_LIMIT {
            inner.error_history.pop_front();
        }
        inner.last_error = message;
        inner.last_error_at = Some(Utc::now());
        inner.status = Status::Error;
    }

    /// Set the display error without forcing an `Error` transition
    /// (used when moving to `Reconnecting` with a reason).
    pub fn set_error_message(&self, message: impl Into<String>) {
        let mut inner = self.inner.lock();
        inner.last_error = message.into();
        inner.last_error_at = Some(Utc::now());
    }

    pub fn clear_error(&self) {
        let mut inner = self.inner.lock();
        inner.last_error.clear();
    }

    /// Append an output line to the bounded log ring. Blank lines are dropped.
    pub fn push_log(&self, message: impl Into<String>, is_error: bool) {
        let message = message.into();
        if message.trim().is_empty() {
            return;
        }
        let mut inner = self.inner.lock();
        inner.log_history.push_back(LogEntry {
            time: Utc::now(),
            message,
            is_error,
        });
        while inner.log_history.len() > LOG_HISTORY_LIMIT {
            inner.log_history.pop_front();
        }
    }

    /// Count a respawn attempt. Returns the new total.
    pub fn record_reconnect(&self) -> u32 {
        let mut inner = self.inner.lock();
        inner.reconnect_count += 1;
        inner.reconnect_count
    }

    pub fn reconnect_count(&self) -> u32 {
        self.inner.lock().reconnect_count
    }

    /// Consistent copy of the visible fields, safe to hand to the UI.
    pub fn snapshot(&self) -> ServiceSnapshot {
        let inner = self.inner.lock();
        ServiceSnapshot {
            name: self.name.clone(),
            command: self.command.clone(),
            local_port: self.local_port.clone(),
            remote_port: self.remote_port.clone(),
            status: inner.status,
            start_time: inner.start_time,
            online_since: inner.online_since,
            last_error_at: inner.last_error_at,
            reconnect_count: inner.reconnect_count,
            last_error: inner.last_error.clone(),
            error_history: inner.error_history.iter().cloned().collect(),
            log_history: inner.log_history.iter().cloned().collect(),
        }
    }
}

/// Immutable copy of a [`ServiceState`] taken under its lock.
#[derive(Debug, Clone)]
pub struct ServiceSnapshot {
    pub name: String,
    pub command: String,
    pub local_port: String,
    pub remote_port: String,
    pub status: Status,
    pub start_time: Option<DateTime<Utc>>,
    pub online_since: Option<DateTime<Utc>>,
    pub last_error_at: Option<DateTime<Utc>>,
    pub reconnect_count: u32,
    pub last_error: String,
    pub error_history: Vec<ErrorEntry>,
    pub log_history: Vec<LogEntry>,
}

impl ServiceSnapshot {
    /// Timestamp of the newest log line, used by the UI for change detection.
    pub fn latest_log_time(&self) -> Option<DateTime<Utc>> {
        self.log_history.last().map(|e| e.time)
    }
}
