use super::InternalEvent;
use metrics::counter;

#[derive(Debug)]
pub struct NetcheckStarted<'a> {
    pub namespace: &'a str,
    pub variants: usize,
}

impl InternalEvent for NetcheckStarted<'_> {
    fn emit_logs(&self) {
        info!(
            target: "netcheck",
            message = "Netcheck has started.",
            version = env!("CARGO_PKG_VERSION"),
            namespace = %self.namespace,
            variants = self.variants,
        );
    }

    fn emit_metrics(&self) {
        counter!("started_total").increment(1);
    }
}

#[derive(Debug)]
pub struct NetcheckStopped {
    pub success: bool,
}

impl InternalEvent for NetcheckStopped {
    fn emit_logs(&self) {
        info!(
            target: "netcheck",
            message = "Netcheck has stopped.",
            success = self.success,
        );
    }

    fn emit_metrics(&self) {
        counter!("stopped_total").increment(1);
    }
}

#[derive(Debug)]
pub struct NetcheckCancelled;

impl InternalEvent for NetcheckCancelled {
    fn emit_logs(&self) {
        warn!(target: "netcheck", message = "Run cancelled; tearing down launched probers.");
    }

    fn emit_metrics(&self) {
        counter!("cancelled_total").increment(1);
    }
}

#[derive(Debug)]
pub struct VariantStarted<'a> {
    pub variant: &'a str,
}

impl InternalEvent for VariantStarted<'_> {
    fn emit_logs(&self) {
        info!(message = "Starting variant.", variant = %self.variant);
    }
}

#[derive(Debug)]
pub struct VariantFailed<'a, E> {
    pub variant: &'a str,
    pub error: &'a E,
}

impl<E: std::fmt::Display> InternalEvent for VariantFailed<'_, E> {
    fn emit_logs(&self) {
        error!(
            message = "Variant failed; continuing with the next one.",
            variant = %self.variant,
            error = %self.error,
        );
    }

    fn emit_metrics(&self) {
        counter!("variant_errors_total", "variant" => self.variant.to_owned()).increment(1);
    }
}
