//! Bounded retry loop shared by every wait in a provisioning run.
//!
//! A probe is attempted, and on anything other than [`Probe::Ready`] the
//! poller sleeps for the configured interval before trying again. The loop
//! gives up once another interval would reach the timeout. Probes are never
//! run concurrently.

use std::convert::Infallible;
use std::future::Future;
use std::time::Duration;

use thiserror::Error;
use tokio::time::{Instant, sleep};

/// Interval and deadline for one wait.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct PollSpec {
    /// Delay between consecutive probe attempts.
    pub interval: Duration,
    /// Upper bound on the total wait.
    pub timeout: Duration,
}

impl PollSpec {
    /// Creates a poll specification.
    #[must_use]
    pub const fn new(interval: Duration, timeout: Duration) -> Self {
        Self { interval, timeout }
    }
}

/// Outcome of a single probe attempt.
#[derive(Debug)]
pub enum Probe<T = (), E = Infallible> {
    /// The condition holds; polling stops with this value.
    Ready(T),
    /// Not yet; retry after the interval. Transient probe errors map here.
    Pending,
    /// The resource is permanently unavailable; stop polling at once.
    Halt(E),
}

impl<E> Probe<(), E> {
    /// Maps a boolean check onto [`Probe::Ready`] or [`Probe::Pending`].
    #[must_use]
    pub const fn from_bool(ready: bool) -> Self {
        if ready { Self::Ready(()) } else { Self::Pending }
    }
}

/// Errors returned by [`wait_until`].
#[derive(Debug, Error, Eq, PartialEq)]
pub enum PollError<E> {
    /// The deadline passed before the probe succeeded.
    #[error("gave up after {elapsed:?} (timeout {timeout:?})")]
    Timeout {
        /// Time spent polling.
        elapsed: Duration,
        /// Configured limit.
        timeout: Duration,
    },
    /// The probe asked the poller to stop.
    #[error("polling halted: {0}")]
    Halted(E),
}

/// Repeats `probe` until it reports ready, halts, or time runs out.
///
/// A probe that stays pending for `n` attempts before succeeding returns
/// successfully exactly when `n * spec.interval < spec.timeout`.
///
/// # Errors
///
/// Returns [`PollError::Timeout`] when the deadline is reached and
/// [`PollError::Halted`] when the probe halts.
pub async fn wait_until<T, E, F, Fut>(spec: &PollSpec, mut probe: F) -> Result<T, PollError<E>>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Probe<T, E>>,
{
    let started = Instant::now();
    loop {
        match probe().await {
            Probe::Ready(value) => return Ok(value),
            Probe::Halt(err) => return Err(PollError::Halted(err)),
            Probe::Pending => {}
        }

        let elapsed = started.elapsed();
        if elapsed.saturating_add(spec.interval) >= spec.timeout {
            return Err(PollError::Timeout {
                elapsed,
                timeout: spec.timeout,
            });
        }
        sleep(spec.interval).await;
    }
}
