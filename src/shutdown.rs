//! Run-wide cancellation.

use futures::{FutureExt, future};
use stream_cancel::{Trigger, Tripwire};

use crate::signal;

/// Passed to every wait and stream read of a run. Once tripped, those
/// return a cancelled outcome so the caller can still tear down what it
/// launched.
#[derive(Clone)]
pub struct ShutdownSignal {
    tripwire: Option<Tripwire>,
}

impl ShutdownSignal {
    /// Creates a signal tripped by cancelling (or dropping) the returned
    /// [`Trigger`].
    pub fn new() -> (Trigger, Self) {
        let (trigger, tripwire) = Tripwire::new();
        (
            trigger,
            Self {
                tripwire: Some(tripwire),
            },
        )
    }

    /// A signal that never trips.
    pub const fn noop() -> Self {
        Self { tripwire: None }
    }

    /// Resolves once the signal has tripped.
    pub async fn cancelled(&self) {
        match &self.tripwire {
            Some(tripwire) => {
                tripwire.clone().await;
            }
            None => future::pending::<()>().await,
        }
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled().now_or_never().is_some()
    }
}

/// Trips `trigger` on the first termination signal. A second signal exits
/// the process without waiting for teardown.
pub async fn cancel_on_signal(trigger: Trigger) {
    match signal::next_signal().await {
        Ok(_) => {
            info!(message = "Signal received; cancelling run.");
            trigger.cancel();
        }
        Err(error) => {
            error!(message = "Unable to install signal handlers.", %error);
            // Dropping the trigger would cancel the run.
            let _trigger = trigger;
            return future::pending().await;
        }
    }
    if let Ok(received) = signal::next_signal().await {
        error!(message = "Second signal received; exiting immediately.", signal = ?received);
        std::process::exit(exitcode::TEMPFAIL);
    }
}
