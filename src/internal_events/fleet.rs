use super::InternalEvent;
use metrics::counter;

#[derive(Debug)]
pub struct FleetDeployed<'a> {
    pub name: &'a str,
}

impl InternalEvent for FleetDeployed<'_> {
    fn emit_logs(&self) {
        info!(message = "Target fleet deployed.", name = %self.name);
    }
}

#[derive(Debug)]
pub struct FleetReady<'a> {
    pub name: &'a str,
    pub ready: u32,
}

impl InternalEvent for FleetReady<'_> {
    fn emit_logs(&self) {
        info!(message = "Target fleet is ready.", name = %self.name, ready = self.ready);
    }
}

#[derive(Debug)]
pub struct FleetDeleteFailed<'a, E> {
    pub name: &'a str,
    pub error: &'a E,
}

impl<E: std::fmt::Display> InternalEvent for FleetDeleteFailed<'_, E> {
    fn emit_logs(&self) {
        error!(
            message = "Failed to delete target fleet.",
            name = %self.name,
            error = %self.error,
        );
    }

    fn emit_metrics(&self) {
        counter!("teardown_errors_total", "kind" => "daemonset").increment(1);
    }
}
