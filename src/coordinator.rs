//! Sequences a run: fleet readiness, inventory, then one prober per variant.

use std::sync::Arc;

use futures::StreamExt;
use snafu::{ResultExt, Snafu};

use crate::{
    config::Config,
    decoder::{DecodeError, TestResult, Termination},
    fleet::{self, DeployError},
    internal_events::{
        InventoryEmpty, NetcheckCancelled, NetcheckStarted, NetcheckStopped, ResultStreamEnded,
        VariantFailed, VariantStarted,
    },
    inventory::{self, CollectionError, Inventory},
    kubernetes::ControlPlane,
    prober::{self, LaunchError, Prober, RunVariant, SchedulingError},
    reporter::Reporter,
    shutdown::ShutdownSignal,
    wait::WaitError,
};

/// Errors that end the whole run before or between variants.
#[derive(Debug, Snafu)]
pub enum RunError {
    #[snafu(display("Could not deploy the target fleet: {}", source))]
    Deploy { source: DeployError },
    #[snafu(display("Target fleet is not ready: {}", source))]
    Readiness { source: WaitError },
    #[snafu(display("Could not collect the target inventory: {}", source))]
    Collection { source: CollectionError },
    #[snafu(display("Run cancelled before any prober was launched."))]
    Cancelled,
}

impl RunError {
    pub const fn exit_code(&self) -> exitcode::ExitCode {
        match self {
            Self::Cancelled => exitcode::TEMPFAIL,
            Self::Deploy { .. } | Self::Readiness { .. } | Self::Collection { .. } => {
                exitcode::UNAVAILABLE
            }
        }
    }
}

/// Errors confined to one variant.
#[derive(Debug, Snafu)]
pub enum VariantError {
    #[snafu(display("{}", source))]
    Launch { source: LaunchError },
    #[snafu(display("{}", source))]
    Scheduling { source: SchedulingError },
}

/// Tally of one prober's result stream.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct StreamReport {
    pub passed: usize,
    pub failed: usize,
    pub malformed: usize,
    pub termination: Termination,
}

impl StreamReport {
    pub fn record(&mut self, result: &Result<TestResult, DecodeError>) {
        match result {
            Ok(result) if result.success => self.passed += 1,
            Ok(_) => self.failed += 1,
            Err(_) => self.malformed += 1,
        }
    }

    /// Every test passed and the prober wrote its end marker.
    pub const fn is_success(&self) -> bool {
        self.failed == 0 && self.malformed == 0 && self.termination.is_clean()
    }
}

#[derive(Debug)]
pub enum VariantOutcome {
    Completed(StreamReport),
    Failed(VariantError),
    Cancelled,
}

#[derive(Debug)]
pub struct VariantReport {
    pub variant: RunVariant,
    pub outcome: VariantOutcome,
}

impl VariantReport {
    pub const fn is_success(&self) -> bool {
        match &self.outcome {
            VariantOutcome::Completed(report) => report.is_success(),
            VariantOutcome::Failed(_) | VariantOutcome::Cancelled => false,
        }
    }
}

/// Outcome of every variant that was attempted, in order.
#[derive(Debug, Default)]
pub struct RunSummary {
    pub variants: Vec<VariantReport>,
    /// The run was cancelled; later variants were skipped.
    pub cancelled: bool,
}

impl RunSummary {
    pub fn is_success(&self) -> bool {
        !self.cancelled && self.variants.iter().all(VariantReport::is_success)
    }

    pub const fn is_cancelled(&self) -> bool {
        self.cancelled
    }

    pub fn exit_code(&self) -> exitcode::ExitCode {
        if self.cancelled {
            exitcode::TEMPFAIL
        } else if self.is_success() {
            exitcode::OK
        } else {
            exitcode::SOFTWARE
        }
    }
}

pub struct Coordinator {
    control_plane: Arc<dyn ControlPlane>,
    config: Config,
    shutdown: ShutdownSignal,
}

impl Coordinator {
    pub fn new(
        control_plane: Arc<dyn ControlPlane>,
        config: Config,
        shutdown: ShutdownSignal,
    ) -> Self {
        Self {
            control_plane,
            config,
            shutdown,
        }
    }

    /// Runs `variants` one after another, reporting to `reporter`.
    ///
    /// A variant that fails to launch or start is recorded and the run
    /// moves on. Every launched prober is torn down before the next variant
    /// starts, whatever happened to it.
    pub async fn run<R>(
        &self,
        variants: &[RunVariant],
        reporter: &mut R,
    ) -> Result<RunSummary, RunError>
    where
        R: Reporter + ?Sized,
    {
        emit!(NetcheckStarted {
            namespace: &self.config.namespace,
            variants: variants.len(),
        });

        let deployment = if self.config.fleet.deploy {
            Some(
                fleet::deploy(&self.control_plane, &self.config.fleet)
                    .await
                    .context(DeploySnafu)?,
            )
        } else {
            None
        };

        let result = self.run_with_fleet(variants, reporter).await;

        if let Some(deployment) = deployment {
            deployment.delete().await;
        }

        match &result {
            Ok(summary) if summary.is_cancelled() => {
                emit!(NetcheckCancelled);
            }
            Ok(summary) => {
                emit!(NetcheckStopped {
                    success: summary.is_success(),
                });
            }
            Err(RunError::Cancelled) => {
                emit!(NetcheckCancelled);
            }
            Err(_) => {
                emit!(NetcheckStopped { success: false });
            }
        }
        result
    }

    async fn run_with_fleet<R>(
        &self,
        variants: &[RunVariant],
        reporter: &mut R,
    ) -> Result<RunSummary, RunError>
    where
        R: Reporter + ?Sized,
    {
        let fleet_config = &self.config.fleet;
        fleet::await_ready(
            self.control_plane.as_ref(),
            &fleet_config.name,
            self.config.wait.fleet(),
            &self.shutdown,
        )
        .await
        .map_err(|source| {
            if source.is_cancelled() {
                RunError::Cancelled
            } else {
                RunError::Readiness { source }
            }
        })?;

        let selector = fleet_config.selector();
        let inventory = inventory::collect(self.control_plane.as_ref(), &selector)
            .await
            .context(CollectionSnafu)?;
        if inventory.pods.is_empty() {
            emit!(InventoryEmpty {
                selector: &selector
            });
        }

        let mut summary = RunSummary::default();
        for variant in variants {
            if self.shutdown.is_cancelled() {
                summary.cancelled = true;
                break;
            }
            let outcome = self.run_variant(variant, &inventory, reporter).await;
            summary.cancelled = matches!(outcome, VariantOutcome::Cancelled);
            summary.variants.push(VariantReport {
                variant: *variant,
                outcome,
            });
            if summary.cancelled {
                break;
            }
        }
        Ok(summary)
    }

    async fn run_variant<R>(
        &self,
        variant: &RunVariant,
        inventory: &Inventory,
        reporter: &mut R,
    ) -> VariantOutcome
    where
        R: Reporter + ?Sized,
    {
        emit!(VariantStarted {
            variant: variant.id.as_str()
        });

        let launched = prober::launch(
            &self.control_plane,
            &self.config.prober,
            variant,
            inventory,
        )
        .await;
        let mut prober = match launched {
            Ok(prober) => prober,
            Err(source) => return failed(variant, VariantError::Launch { source }),
        };

        let outcome = self.drive(&mut prober, reporter).await;
        prober.teardown().await;
        outcome
    }

    /// Takes a launched prober from scheduling to the end of its results.
    async fn drive<R>(&self, prober: &mut Prober, reporter: &mut R) -> VariantOutcome
    where
        R: Reporter + ?Sized,
    {
        let running = prober
            .await_running(self.config.wait.prober(), &self.shutdown)
            .await
            .cloned();
        let identity = match running {
            Ok(identity) => identity,
            Err(error) if error.is_cancelled() => return VariantOutcome::Cancelled,
            Err(source) => {
                return failed(prober.variant(), VariantError::Scheduling { source });
            }
        };

        reporter.init(&identity);
        let mut report = StreamReport::default();
        let mut results = prober.results();
        loop {
            let item = tokio::select! {
                biased;
                _ = self.shutdown.cancelled() => {
                    report.termination = Termination::Cancelled;
                    break;
                }
                item = results.next() => item,
            };
            let Some(item) = item else {
                report.termination = results.termination().cloned().unwrap_or_default();
                break;
            };
            report.record(&item);
            reporter.on_result(&item);
        }
        reporter.finalize(&report);

        emit!(ResultStreamEnded {
            prober: prober.name(),
            termination: &report.termination,
            clean: report.termination.is_clean(),
        });

        if report.termination == Termination::Cancelled {
            return VariantOutcome::Cancelled;
        }
        prober.mark_completed();
        VariantOutcome::Completed(report)
    }
}

fn failed(variant: &RunVariant, error: VariantError) -> VariantOutcome {
    emit!(VariantFailed {
        variant: variant.id.as_str(),
        error: &error,
    });
    VariantOutcome::Failed(error)
}
