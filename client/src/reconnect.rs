//! Reconnect scheduling for one transport.

use relay_protocol::close_code;
use std::future::Future;
use std::time::Duration;

use crate::task::ScheduledTask;

/// Default delay before a reconnect attempt.
pub const DEFAULT_RECONNECT_DELAY: Duration = Duration::from_secs(3);

/// Decides whether a close warrants a reconnect and keeps at most one attempt
/// pending.
#[derive(Debug)]
pub struct Reconnector {
    delay: Duration,
    pending: ScheduledTask,
}

impl Reconnector {
    pub fn new(delay: Duration) -> Self {
        Self {
            delay,
            pending: ScheduledTask::idle(),
        }
    }

    /// A normal close (1000) is final; anything else, including a missing
    /// close code, should be retried.
    pub fn should_reconnect(code: Option<u16>) -> bool {
        code != Some(close_code::NORMAL)
    }

    /// React to a close. Schedules `attempt` after the fixed delay, replacing
    /// any attempt already pending. Returns whether one was scheduled.
    pub fn on_close<F>(&mut self, code: Option<u16>, attempt: F) -> bool
    where
        F: Future<Output = ()> + Send + 'static,
    {
        if !Self::should_reconnect(code) {
            self.pending.cancel();
            return false;
        }
        self.schedule(attempt);
        true
    }

    /// Schedule an attempt unconditionally (after a failed connect).
    pub fn schedule<F>(&mut self, attempt: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        self.pending
            .replace(ScheduledTask::once(self.delay, attempt));
    }

    pub fn cancel(&mut self) {
        self.pending.cancel();
    }

    pub fn is_pending(&self) -> bool {
        self.pending.is_pending()
    }
}

impl Default for Reconnector {
    fn default() -> Self {
        Self::new(DEFAULT_RECONNECT_DELAY)
    }
}
