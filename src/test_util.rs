use std::sync::{Arc, Mutex};

use crate::{
    coordinator::StreamReport,
    decoder::{DecodeError, TestResult},
    inventory::{Inventory, TargetNode, TargetPod},
    kubernetes::{
        FleetStatus, NodeSummary, PodPhase, PodStatusSummary, PodSummary,
        mock::MockControlPlane,
    },
    prober::ProberIdentity,
    reporter::Reporter,
};

pub fn trace_init() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter("netcheck=debug")
        .with_test_writer()
        .try_init();
}

/// Renders `result` the way a prober writes it.
pub fn result_line(result: &TestResult) -> String {
    serde_json::to_string(result).expect("serializable result")
}

pub fn target_pod_summary(name: &str, ip: &str, node: &str) -> PodSummary {
    PodSummary {
        name: name.to_owned(),
        ip: Some(ip.to_owned()),
        node: Some(node.to_owned()),
    }
}

pub fn node_summary(name: &str, ip: &str) -> NodeSummary {
    NodeSummary {
        name: name.to_owned(),
        internal_ip: Some(ip.to_owned()),
    }
}

/// Two workers, each running one target pod.
pub fn inventory() -> Inventory {
    Inventory {
        pods: vec![
            TargetPod {
                name: "netcheck-target-a1".to_owned(),
                ip: "10.244.1.3".parse().unwrap(),
                node: "worker-1".to_owned(),
            },
            TargetPod {
                name: "netcheck-target-b2".to_owned(),
                ip: "10.244.2.3".parse().unwrap(),
                node: "worker-2".to_owned(),
            },
        ],
        nodes: vec![
            TargetNode {
                name: "worker-1".to_owned(),
                ip: "172.18.0.2".parse().unwrap(),
            },
            TargetNode {
                name: "worker-2".to_owned(),
                ip: "172.18.0.3".parse().unwrap(),
            },
        ],
    }
}

/// A control plane whose fleet is ready and whose listings match
/// [`inventory`].
pub fn ready_cluster() -> MockControlPlane {
    let inventory = inventory();
    MockControlPlane::new()
        .with_fleet_statuses([FleetStatus {
            desired: 2,
            ready: 2,
            observed: true,
        }])
        .with_target_pods(
            inventory
                .pods
                .iter()
                .map(|pod| target_pod_summary(&pod.name, &pod.ip.to_string(), &pod.node))
                .collect(),
        )
        .with_nodes(
            inventory
                .nodes
                .iter()
                .map(|node| node_summary(&node.name, &node.ip.to_string()))
                .collect(),
        )
}

pub fn pending_status() -> PodStatusSummary {
    PodStatusSummary {
        phase: PodPhase::Pending,
        ip: None,
        node: None,
        host_ip: None,
    }
}

pub fn status(phase: PodPhase, ip: &str, node: &str, host_ip: &str) -> PodStatusSummary {
    PodStatusSummary {
        phase,
        ip: Some(ip.to_owned()),
        node: Some(node.to_owned()),
        host_ip: Some(host_ip.to_owned()),
    }
}

pub fn running_status(ip: &str, node: &str, host_ip: &str) -> PodStatusSummary {
    status(PodPhase::Running, ip, node, host_ip)
}

#[derive(Debug, Clone, PartialEq)]
pub enum Recorded {
    Init(ProberIdentity),
    Result(Result<TestResult, DecodeError>),
    Finalize(StreamReport),
}

/// Records every callback; clones share the same log.
#[derive(Debug, Clone, Default)]
pub struct RecordingReporter {
    log: Arc<Mutex<Vec<Recorded>>>,
}

impl RecordingReporter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn recorded(&self) -> Vec<Recorded> {
        self.log.lock().expect("reporter log poisoned").clone()
    }

    fn push(&self, entry: Recorded) {
        self.log.lock().expect("reporter log poisoned").push(entry);
    }
}

impl Reporter for RecordingReporter {
    fn init(&mut self, prober: &ProberIdentity) {
        self.push(Recorded::Init(prober.clone()));
    }

    fn on_result(&mut self, result: &Result<TestResult, DecodeError>) {
        self.push(Recorded::Result(result.clone()));
    }

    fn finalize(&mut self, report: &StreamReport) {
        self.push(Recorded::Finalize(report.clone()));
    }
}
