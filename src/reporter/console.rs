use std::{fmt, io::Write};

use colored::{Color, Colorize};

use super::Reporter;
use crate::{
    coordinator::{RunSummary, StreamReport, VariantOutcome},
    decoder::{DecodeError, TestResult},
    prober::ProberIdentity,
};

/// Renders results as text lines, one per test.
pub struct ConsoleReporter<W> {
    out: W,
    color: bool,
}

impl<W: Write> ConsoleReporter<W> {
    pub const fn new(out: W, color: bool) -> Self {
        Self { out, color }
    }

    pub fn into_inner(self) -> W {
        self.out
    }

    fn paint(&self, text: &str, color: Color) -> String {
        if self.color {
            text.color(color).bold().to_string()
        } else {
            text.to_owned()
        }
    }

    fn line(&mut self, args: fmt::Arguments<'_>) {
        if let Err(error) = self.out.write_fmt(args).and_then(|()| self.out.write_all(b"\n")) {
            warn!(message = "Failed to write report.", %error);
        }
    }

    /// Prints one line per attempted variant.
    pub fn summary(&mut self, summary: &RunSummary) {
        self.line(format_args!(""));
        self.line(format_args!("Summary:"));
        for report in &summary.variants {
            let name = report.variant.display_name;
            let status = if report.is_success() {
                self.paint("ok", Color::Green)
            } else {
                self.paint("FAILED", Color::Red)
            };
            match &report.outcome {
                VariantOutcome::Completed(stream) => self.line(format_args!(
                    "  {:<14}{:<8}{}",
                    name,
                    status,
                    counts(stream)
                )),
                VariantOutcome::Failed(error) => {
                    self.line(format_args!("  {:<14}{:<8}{}", name, status, error))
                }
                VariantOutcome::Cancelled => {
                    self.line(format_args!("  {:<14}{:<8}cancelled", name, status))
                }
            }
        }
        if summary.is_cancelled() {
            let note = self.paint("Run cancelled; remaining variants skipped.", Color::Yellow);
            self.line(format_args!("{}", note));
        }
    }
}

fn counts(report: &StreamReport) -> String {
    format!(
        "{} passed, {} failed, {} malformed ({})",
        report.passed, report.failed, report.malformed, report.termination
    )
}

impl<W: Write> Reporter for ConsoleReporter<W> {
    fn init(&mut self, prober: &ProberIdentity) {
        let title = self.paint(prober.variant.variant().display_name, Color::Cyan);
        self.line(format_args!(
            "{}: {} on {} (pod {}, node {})",
            title, prober.name, prober.node, prober.ip, prober.node_ip
        ));
    }

    fn on_result(&mut self, result: &Result<TestResult, DecodeError>) {
        match result {
            Ok(result) => {
                let verdict = if result.success {
                    self.paint("PASS", Color::Green)
                } else {
                    self.paint("FAIL", Color::Red)
                };
                self.line(format_args!(
                    "  {:<6}{:<20}{:<17}{}",
                    verdict,
                    result.test_id.as_str(),
                    result.target_ip,
                    result.target_name
                ));
            }
            Err(error) => {
                let verdict = self.paint("ERROR", Color::Yellow);
                self.line(format_args!("  {:<6}{}", verdict, error));
            }
        }
    }

    fn finalize(&mut self, report: &StreamReport) {
        self.line(format_args!("  {}", counts(report)));
    }
}
