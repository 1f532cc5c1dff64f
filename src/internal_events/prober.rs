use super::InternalEvent;
use metrics::counter;

#[derive(Debug)]
pub struct ProberLaunched<'a> {
    pub name: &'a str,
    pub host_network: bool,
}

impl InternalEvent for ProberLaunched<'_> {
    fn emit_logs(&self) {
        debug!(
            message = "Prober pod created.",
            name = %self.name,
            host_network = self.host_network,
        );
    }

    fn emit_metrics(&self) {
        counter!("probers_launched_total").increment(1);
    }
}

#[derive(Debug)]
pub struct ProberRunning<'a> {
    pub name: &'a str,
    pub ip: &'a str,
    pub node: &'a str,
    pub node_ip: &'a str,
}

impl InternalEvent for ProberRunning<'_> {
    fn emit_logs(&self) {
        info!(
            message = "Prober is running.",
            name = %self.name,
            ip = %self.ip,
            node = %self.node,
            node_ip = %self.node_ip,
        );
    }
}

#[derive(Debug)]
pub struct ProberTeardownRequested<'a> {
    pub name: &'a str,
}

impl InternalEvent for ProberTeardownRequested<'_> {
    fn emit_logs(&self) {
        debug!(message = "Requested prober deletion.", name = %self.name);
    }

    fn emit_metrics(&self) {
        counter!("probers_deleted_total").increment(1);
    }
}

#[derive(Debug)]
pub struct ProberTeardownFailed<'a, E> {
    pub name: &'a str,
    pub error: &'a E,
}

impl<E: std::fmt::Display> InternalEvent for ProberTeardownFailed<'_, E> {
    fn emit_logs(&self) {
        error!(
            message = "Failed to delete prober pod.",
            name = %self.name,
            error = %self.error,
        );
    }

    fn emit_metrics(&self) {
        counter!("teardown_errors_total", "kind" => "pod").increment(1);
    }
}

/// Emitted when a prober handle goes away without an explicit teardown,
/// e.g. because the run future was dropped.
#[derive(Debug)]
pub struct ProberDroppedWithoutTeardown<'a> {
    pub name: &'a str,
}

impl InternalEvent for ProberDroppedWithoutTeardown<'_> {
    fn emit_logs(&self) {
        warn!(
            message = "Prober dropped without teardown; scheduling deletion.",
            name = %self.name,
        );
    }
}
