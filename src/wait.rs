//! Poll the control plane until some object reaches a desired state.

use std::{future::Future, time::Duration};

use snafu::{ResultExt, Snafu};
use tokio::time::{Instant, sleep, timeout_at};

use crate::{
    internal_events::{WaitPolled, WaitTimedOut},
    kubernetes::ControlPlaneError,
    shutdown::ShutdownSignal,
};

/// How often to poll and how long to keep trying.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WaitOptions {
    pub poll_interval: Duration,
    pub timeout: Duration,
}

/// Verdict of a single poll.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Check {
    Ready,
    Pending,
    /// The object can never become ready.
    Failed(String),
}

#[derive(Debug, Snafu)]
pub enum WaitError {
    #[snafu(display("Timed out after {:?} waiting for {}.", timeout, target))]
    TimedOut { target: String, timeout: Duration },
    #[snafu(display("{} will never become ready: {}.", target, reason))]
    Unreachable { target: String, reason: String },
    #[snafu(display("Failed to query {}: {}", target, source))]
    Query {
        target: String,
        source: ControlPlaneError,
    },
    #[snafu(display("Cancelled while waiting for {}.", target))]
    Cancelled { target: String },
}

impl WaitError {
    pub const fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled { .. })
    }
}

/// Calls `fetch` every `options.poll_interval` until `check` accepts the
/// result, and returns that result.
///
/// Gives up with [`WaitError::TimedOut`] once `options.timeout` has elapsed,
/// including when a single `fetch` hangs past the deadline. Query errors
/// are not retried.
pub async fn until<T, F, Fut, P>(
    target: &str,
    options: WaitOptions,
    shutdown: &ShutdownSignal,
    mut fetch: F,
    mut check: P,
) -> Result<T, WaitError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, ControlPlaneError>>,
    P: FnMut(&T) -> Check,
{
    let deadline = deadline_after(options.timeout);
    let timed_out = || {
        emit!(WaitTimedOut {
            target,
            timeout: options.timeout,
        });
        TimedOutSnafu {
            target,
            timeout: options.timeout,
        }
        .fail()
    };

    let mut attempt = 0;
    loop {
        attempt += 1;
        let polled = tokio::select! {
            biased;
            _ = shutdown.cancelled() => return CancelledSnafu { target }.fail(),
            polled = timeout_at(deadline, fetch()) => polled,
        };
        let Ok(status) = polled else {
            return timed_out();
        };
        let status = status.context(QuerySnafu { target })?;

        match check(&status) {
            Check::Ready => return Ok(status),
            Check::Failed(reason) => return UnreachableSnafu { target, reason }.fail(),
            Check::Pending => {
                emit!(WaitPolled { target, attempt });
            }
        }

        let now = Instant::now();
        if now >= deadline {
            return timed_out();
        }
        let pause = options.poll_interval.min(deadline - now);
        tokio::select! {
            biased;
            _ = shutdown.cancelled() => return CancelledSnafu { target }.fail(),
            _ = sleep(pause) => {}
        }
    }
}

/// Instants this far out are as good as never.
const FAR_FUTURE: Duration = Duration::from_secs(100 * 365 * 24 * 60 * 60);

fn deadline_after(timeout: Duration) -> Instant {
    let now = Instant::now();
    now.checked_add(timeout.min(FAR_FUTURE)).unwrap_or(now)
}
