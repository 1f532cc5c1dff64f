//! Observers of a run.

mod console;

pub use console::ConsoleReporter;

use crate::{
    coordinator::StreamReport,
    decoder::{DecodeError, TestResult},
    prober::ProberIdentity,
};

/// Receives the results of each prober as they arrive.
///
/// For every prober that starts running, the coordinator calls
/// [`Reporter::init`] once, then [`Reporter::on_result`] once per stream
/// item in log order, then [`Reporter::finalize`] once. Callbacks run on
/// the task driving the run, so a blocking callback stalls it.
pub trait Reporter {
    fn init(&mut self, prober: &ProberIdentity);

    /// A decoded result, or a line that could not be decoded.
    fn on_result(&mut self, result: &Result<TestResult, DecodeError>);

    fn finalize(&mut self, report: &StreamReport);
}

impl<R: Reporter + ?Sized> Reporter for &mut R {
    fn init(&mut self, prober: &ProberIdentity) {
        (**self).init(prober);
    }

    fn on_result(&mut self, result: &Result<TestResult, DecodeError>) {
        (**self).on_result(result);
    }

    fn finalize(&mut self, report: &StreamReport) {
        (**self).finalize(report);
    }
}
