use std::time::Duration;

use super::InternalEvent;
use metrics::counter;

#[derive(Debug)]
pub struct WaitPolled<'a> {
    pub target: &'a str,
    pub attempt: usize,
}

impl InternalEvent for WaitPolled<'_> {
    fn emit_logs(&self) {
        trace!(message = "Not ready yet.", target = %self.target, attempt = self.attempt);
    }

    fn emit_metrics(&self) {
        counter!("wait_polls_total").increment(1);
    }
}

#[derive(Debug)]
pub struct WaitTimedOut<'a> {
    pub target: &'a str,
    pub timeout: Duration,
}

impl InternalEvent for WaitTimedOut<'_> {
    fn emit_logs(&self) {
        warn!(
            message = "Gave up waiting.",
            target = %self.target,
            timeout_secs = self.timeout.as_secs_f64(),
        );
    }

    fn emit_metrics(&self) {
        counter!("wait_timeouts_total").increment(1);
    }
}
