//! The snapshot of targets every prober of a run tests against.

use std::net::{AddrParseError, IpAddr};

use serde::{Deserialize, Serialize};
use snafu::{OptionExt, ResultExt, Snafu};

use crate::{
    internal_events::InventoryCollected,
    kubernetes::{ControlPlane, ControlPlaneError, NodeSummary, PodSummary},
};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TargetPod {
    pub name: String,
    pub ip: IpAddr,
    pub node: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TargetNode {
    pub name: String,
    pub ip: IpAddr,
}

/// Target pods and nodes, in the order the control plane listed them.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Inventory {
    pub pods: Vec<TargetPod>,
    pub nodes: Vec<TargetNode>,
}

#[derive(Debug, Snafu)]
pub enum CollectionError {
    #[snafu(display("Failed to list target pods matching {:?}: {}", selector, source))]
    ListPods {
        selector: String,
        source: ControlPlaneError,
    },
    #[snafu(display("Failed to list nodes: {}", source))]
    ListNodes { source: ControlPlaneError },
    #[snafu(display("{} {:?} has no {}.", kind, name, field))]
    MissingField {
        kind: &'static str,
        name: String,
        field: &'static str,
    },
    #[snafu(display("{} {:?} has an invalid address {:?}: {}", kind, name, address, source))]
    InvalidAddress {
        kind: &'static str,
        name: String,
        address: String,
        source: AddrParseError,
    },
}

impl Inventory {
    /// JSON handed to probers as the `PODS` setting.
    pub fn pods_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(&self.pods)
    }

    /// JSON handed to probers as the `NODES` setting.
    pub fn nodes_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(&self.nodes)
    }
}

fn parse_ip(kind: &'static str, name: &str, address: &str) -> Result<IpAddr, CollectionError> {
    address.parse().context(InvalidAddressSnafu {
        kind,
        name,
        address,
    })
}

impl TryFrom<PodSummary> for TargetPod {
    type Error = CollectionError;

    fn try_from(pod: PodSummary) -> Result<Self, Self::Error> {
        let ip = pod.ip.as_deref().context(MissingFieldSnafu {
            kind: "pod",
            name: &pod.name,
            field: "IP",
        })?;
        let ip = parse_ip("pod", &pod.name, ip)?;
        let node = pod.node.context(MissingFieldSnafu {
            kind: "pod",
            name: &pod.name,
            field: "node",
        })?;
        Ok(Self {
            name: pod.name,
            ip,
            node,
        })
    }
}

impl TryFrom<NodeSummary> for TargetNode {
    type Error = CollectionError;

    fn try_from(node: NodeSummary) -> Result<Self, Self::Error> {
        let ip = node.internal_ip.as_deref().context(MissingFieldSnafu {
            kind: "node",
            name: &node.name,
            field: "internal IP",
        })?;
        let ip = parse_ip("node", &node.name, ip)?;
        Ok(Self { name: node.name, ip })
    }
}

/// Lists the target pods matching `selector` and every node.
///
/// Any target lacking an address fails the whole collection: probers
/// would otherwise test an incomplete topology.
pub async fn collect(
    control_plane: &dyn ControlPlane,
    selector: &str,
) -> Result<Inventory, CollectionError> {
    let pods = control_plane
        .list_pods(selector)
        .await
        .context(ListPodsSnafu { selector })?
        .into_iter()
        .map(TargetPod::try_from)
        .collect::<Result<Vec<_>, _>>()?;
    let nodes = control_plane
        .list_nodes()
        .await
        .context(ListNodesSnafu)?
        .into_iter()
        .map(TargetNode::try_from)
        .collect::<Result<Vec<_>, _>>()?;

    emit!(InventoryCollected {
        pods: pods.len(),
        nodes: nodes.len(),
    });
    Ok(Inventory { pods, nodes })
}
