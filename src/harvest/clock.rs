//! Time source and the bounded "poll until a predicate holds" primitive.
//!
//! Every wait in the harvest protocol goes through [`Poller::until`]: run the
//! check, compare elapsed time to the deadline, nap for one interval, repeat.
//! Nothing blocks without a deadline, and a value that shows up early ends the
//! wait early.

use async_trait::async_trait;
use std::future::Future;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;

#[async_trait]
pub trait Clock: Send + Sync {
    fn now(&self) -> Instant;
    async fn sleep(&self, duration: Duration);
}

/// Wall-clock time backed by the tokio timer.
#[derive(Debug, Default, Clone, Copy)]
pub struct TokioClock;

#[async_trait]
impl Clock for TokioClock {
    fn now(&self) -> Instant {
        Instant::now()
    }

    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}

/// Virtual time: `sleep` advances the clock instantly.
///
/// Lets the harvest loop run deadline-heavy scenarios without waiting on the
/// wall clock.
#[derive(Debug)]
pub struct ManualClock {
    origin: Instant,
    offset: Mutex<Duration>,
}

impl ManualClock {
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
            offset: Mutex::new(Duration::ZERO),
        }
    }

    /// Virtual time elapsed since construction.
    pub fn elapsed(&self) -> Duration {
        *self.offset.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn advance(&self, by: Duration) {
        let mut offset = self.offset.lock().unwrap_or_else(|e| e.into_inner());
        *offset += by;
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Clock for ManualClock {
    fn now(&self) -> Instant {
        self.origin + self.elapsed()
    }

    async fn sleep(&self, duration: Duration) {
        self.advance(duration);
        tokio::task::yield_now().await;
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PollOutcome<T> {
    Ready(T),
    TimedOut,
    Cancelled,
}

#[derive(Clone)]
pub struct Poller {
    clock: Arc<dyn Clock>,
    interval: Duration,
    cancel: CancellationToken,
}

impl std::fmt::Debug for Poller {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Poller")
            .field("interval", &self.interval)
            .field("cancelled", &self.cancel.is_cancelled())
            .finish()
    }
}

/// Shortest nap between checks; a zero interval would never advance time.
pub const MIN_POLL_INTERVAL: Duration = Duration::from_millis(1);

impl Poller {
    pub fn new(clock: Arc<dyn Clock>, interval: Duration, cancel: CancellationToken) -> Self {
        Self {
            clock,
            interval: interval.max(MIN_POLL_INTERVAL),
            cancel,
        }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }

    pub fn cancel_token(&self) -> &CancellationToken {
        &self.cancel
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Run `check` until it yields `Some`, the deadline elapses, or the token fires.
    ///
    /// The check always runs at least once, even with a zero deadline. A check
    /// error ends the poll immediately; callers decide beforehand which errors
    /// are "not yet" (return `Ok(None)`) and which are fatal.
    pub async fn until<T, E, F, Fut>(&self, deadline: Duration, mut check: F) -> Result<PollOutcome<T>, E>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<Option<T>, E>>,
    {
        let started = self.clock.now();
        loop {
            if self.cancel.is_cancelled() {
                return Ok(PollOutcome::Cancelled);
            }
            if let Some(value) = check().await? {
                return Ok(PollOutcome::Ready(value));
            }

            let elapsed = self.clock.now().saturating_duration_since(started);
            if elapsed >= deadline {
                return Ok(PollOutcome::TimedOut);
            }

            let nap = self.interval.min(deadline - elapsed);
            tokio::select! {
                _ = self.cancel.cancelled() => return Ok(PollOutcome::Cancelled),
                _ = self.clock.sleep(nap) => {}
            }
        }
    }
}
