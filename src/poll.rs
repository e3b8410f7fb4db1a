//! Waiting for a submitted task to complete.

use std::sync::{Arc, Condvar, Mutex};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

use crate::error::{Error, Result};
use crate::orchestrator::AppeearsApi;
use crate::session::Session;
use crate::task::TaskHandle;

/// Shortest allowed pause between two status checks.
pub const MIN_POLL_INTERVAL: Duration = Duration::from_secs(30);
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(60);

/// Cooperative cancellation for [`wait_for_task`].
///
/// Clones share state; cancelling any clone wakes a loop sleeping on another.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    inner: Arc<(Mutex<bool>, Condvar)>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        let (flag, cvar) = &*self.inner;
        let mut cancelled = flag.lock().unwrap_or_else(|e| e.into_inner());
        *cancelled = true;
        cvar.notify_all();
    }

    pub fn is_cancelled(&self) -> bool {
        let (flag, _) = &*self.inner;
        *flag.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Sleeps up to `duration`. Returns `true` if cancelled before or during the sleep.
    pub(crate) fn sleep(&self, duration: Duration) -> bool {
        let (flag, cvar) = &*self.inner;
        let guard = flag.lock().unwrap_or_else(|e| e.into_inner());
        let (guard, _) = cvar
            .wait_timeout_while(guard, duration, |cancelled| !*cancelled)
            .unwrap_or_else(|e| e.into_inner());
        *guard
    }
}

/// How [`wait_for_task`] paces and bounds its status checks.
#[derive(Debug, Clone)]
pub struct PollOptions {
    pub(crate) interval: Duration,
    pub(crate) timeout: Option<Duration>,
    pub(crate) max_attempts: Option<u32>,
    pub(crate) cancel: Option<CancelToken>,
}

impl Default for PollOptions {
    fn default() -> Self {
        Self {
            interval: DEFAULT_POLL_INTERVAL,
            timeout: None,
            max_attempts: None,
            cancel: None,
        }
    }
}

impl PollOptions {
    /// Polls every `seconds`, clamped to at least [`MIN_POLL_INTERVAL`].
    pub fn every(seconds: u64) -> Self {
        Self::default().with_interval(Duration::from_secs(seconds))
    }

    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval.max(MIN_POLL_INTERVAL);
        self
    }

    /// Give up once this much time has passed since the first check.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Give up after this many status checks.
    pub fn with_max_attempts(mut self, attempts: u32) -> Self {
        self.max_attempts = Some(attempts);
        self
    }

    pub fn with_cancel_token(mut self, token: CancelToken) -> Self {
        self.cancel = Some(token);
        self
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }
}

/// Checks `task` until the API reports it done.
///
/// The first check happens immediately. A status body in the `error` state ends
/// the wait with [`Error::TaskFailed`]; running out of time or attempts ends it
/// with [`Error::TimedOut`].
pub fn wait_for_task<A: AppeearsApi + ?Sized>(
    api: &A,
    session: &Session,
    task: &TaskHandle,
    options: &PollOptions,
) -> Result<()> {
    let started = Instant::now();
    let cancel = options.cancel.clone().unwrap_or_default();
    let mut attempts: u32 = 0;
    let mut last_state: Option<String> = None;

    loop {
        if cancel.is_cancelled() {
            return Err(Error::Cancelled {
                task_id: task.id().to_string(),
            });
        }

        attempts += 1;
        let status = api.task_status(session, task)?;
        if status.done {
            info!(task_id = task.id(), attempts, "Task done");
            return Ok(());
        }

        if last_state != status.status {
            last_state = status.status.clone();
            info!(
                task_id = task.id(),
                state = last_state.as_deref().unwrap_or("unknown"),
                percent = status.percent(),
                "Task state"
            );
        }

        if status.is_failed() {
            warn!(task_id = task.id(), "Task failed on the server");
            return Err(Error::TaskFailed {
                task_id: task.id().to_string(),
                message: status.message,
            });
        }

        let out_of_attempts = options.max_attempts.is_some_and(|max| attempts >= max);
        let remaining = options
            .timeout
            .map(|limit| limit.saturating_sub(started.elapsed()));
        if out_of_attempts || remaining.is_some_and(|r| r.is_zero()) {
            warn!(task_id = task.id(), attempts, "Gave up waiting for task");
            return Err(Error::TimedOut {
                task_id: task.id().to_string(),
                attempts,
            });
        }

        let pause = remaining.map_or(options.interval, |r| r.min(options.interval));
        debug!(task_id = task.id(), pause_secs = pause.as_secs_f64(), "Waiting before next status check");
        if cancel.sleep(pause) {
            return Err(Error::Cancelled {
                task_id: task.id().to_string(),
            });
        }
    }
}
