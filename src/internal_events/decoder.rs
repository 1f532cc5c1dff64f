use super::InternalEvent;
use metrics::counter;

#[derive(Debug)]
pub struct TestResultReceived<'a> {
    pub test_id: &'a str,
    pub target: &'a str,
    pub success: bool,
}

impl InternalEvent for TestResultReceived<'_> {
    fn emit_logs(&self) {
        trace!(
            message = "Test result received.",
            test_id = %self.test_id,
            target = %self.target,
            success = self.success,
        );
    }

    fn emit_metrics(&self) {
        counter!(
            "test_results_total",
            "test_id" => self.test_id.to_owned(),
            "outcome" => if self.success { "pass" } else { "fail" },
        )
        .increment(1);
    }
}

#[derive(Debug)]
pub struct TestResultDecodeError<'a, E> {
    pub error: &'a E,
}

impl<E: std::fmt::Display> InternalEvent for TestResultDecodeError<'_, E> {
    fn emit_logs(&self) {
        warn!(
            message = "Failed to decode prober output line.",
            error = %self.error,
        );
    }

    fn emit_metrics(&self) {
        counter!("decode_errors_total").increment(1);
    }
}

#[derive(Debug)]
pub struct ResultStreamEnded<'a, T> {
    pub prober: &'a str,
    pub termination: &'a T,
    pub clean: bool,
}

impl<T: std::fmt::Display> InternalEvent for ResultStreamEnded<'_, T> {
    fn emit_logs(&self) {
        if self.clean {
            debug!(
                message = "Result stream ended.",
                prober = %self.prober,
                termination = %self.termination,
            );
        } else {
            warn!(
                message = "Result stream ended without end-of-results marker.",
                prober = %self.prober,
                termination = %self.termination,
            );
        }
    }

    fn emit_metrics(&self) {
        if !self.clean {
            counter!("result_streams_truncated_total").increment(1);
        }
    }
}
