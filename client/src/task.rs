//! Cancellable timers.
//!
//! Every timer the client runs (heartbeat, reconnect, typing expiry) is a
//! [`ScheduledTask`]. Cancelling or dropping the task aborts it; replacing it
//! cancels the previous one first, so at most one instance of a given timer
//! is ever pending.

use std::future::Future;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{interval, sleep, MissedTickBehavior};

#[derive(Debug, Default)]
pub struct ScheduledTask {
    handle: Option<JoinHandle<()>>,
}

impl ScheduledTask {
    /// A task slot with nothing scheduled.
    pub fn idle() -> Self {
        Self::default()
    }

    /// Run `work` once after `delay`.
    pub fn once<F>(delay: Duration, work: F) -> Self
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let handle = tokio::spawn(async move {
            sleep(delay).await;
            work.await;
        });
        Self {
            handle: Some(handle),
        }
    }

    /// Run `tick` every `period`, first after one full period.
    pub fn every<F>(period: Duration, mut tick: F) -> Self
    where
        F: FnMut() + Send + 'static,
    {
        // tokio panics on a zero period
        let period = period.max(Duration::from_millis(1));
        let handle = tokio::spawn(async move {
            let mut timer = interval(period);
            timer.set_missed_tick_behavior(MissedTickBehavior::Delay);
            // Skip the first immediate tick
            timer.tick().await;
            loop {
                timer.tick().await;
                tick();
            }
        });
        Self {
            handle: Some(handle),
        }
    }

    /// Cancel whatever is pending here and schedule `next` in its place.
    pub fn replace(&mut self, next: ScheduledTask) {
        self.cancel();
        *self = next;
    }

    pub fn cancel(&mut self) {
        if let Some(handle) = self.handle.take() {
            handle.abort();
        }
    }

    /// Whether the task is scheduled and has not yet finished.
    pub fn is_pending(&self) -> bool {
        self.handle.as_ref().is_some_and(|h| !h.is_finished())
    }
}

impl Drop for ScheduledTask {
    fn drop(&mut self) {
        self.cancel();
    }
}
