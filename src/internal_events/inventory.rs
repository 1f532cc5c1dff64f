use super::InternalEvent;
use metrics::counter;

#[derive(Debug)]
pub struct InventoryCollected {
    pub pods: usize,
    pub nodes: usize,
}

impl InternalEvent for InventoryCollected {
    fn emit_logs(&self) {
        info!(message = "Collected target inventory.", pods = self.pods, nodes = self.nodes);
    }

    fn emit_metrics(&self) {
        counter!("inventory_target_pods_total").increment(self.pods as u64);
        counter!("inventory_target_nodes_total").increment(self.nodes as u64);
    }
}

#[derive(Debug)]
pub struct InventoryEmpty<'a> {
    pub selector: &'a str,
}

impl InternalEvent for InventoryEmpty<'_> {
    fn emit_logs(&self) {
        warn!(
            message = "No target pods matched; probers will have no pods to test.",
            selector = %self.selector,
        );
    }
}
