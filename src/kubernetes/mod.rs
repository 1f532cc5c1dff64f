//! The Kubernetes control plane, as seen by a run.
//!
//! Everything a run needs from the cluster goes through [`ControlPlane`].
//! [`KubeControlPlane`] is the real implementation; tests use the scripted
//! one in `mock`.

use std::{io, time::Duration};

use async_trait::async_trait;
use futures::stream::BoxStream;
use k8s_openapi::api::{apps::v1::DaemonSet, core::v1::Pod};
use snafu::Snafu;

mod client;
#[cfg(test)]
pub(crate) mod mock;

pub use client::{ConnectError, KubeControlPlane};

/// A stream of log lines, without their trailing newlines.
pub type LogLines = BoxStream<'static, io::Result<String>>;

/// Identifies a pod created through the control plane.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PodHandle {
    pub name: String,
}

impl PodHandle {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

/// Rollout state of a fleet (a `DaemonSet`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FleetStatus {
    pub desired: u32,
    pub ready: u32,
    /// Whether the controller has observed the latest spec generation.
    pub observed: bool,
}

impl FleetStatus {
    pub const fn is_ready(&self) -> bool {
        self.observed && self.ready == self.desired
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PodSummary {
    pub name: String,
    pub ip: Option<String>,
    pub node: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeSummary {
    pub name: String,
    pub internal_ip: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PodPhase {
    Pending,
    Running,
    Succeeded,
    Failed,
    Unknown,
}

impl PodPhase {
    pub fn parse(phase: Option<&str>) -> Self {
        match phase {
            Some("Pending") => Self::Pending,
            Some("Running") => Self::Running,
            Some("Succeeded") => Self::Succeeded,
            Some("Failed") => Self::Failed,
            _ => Self::Unknown,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PodStatusSummary {
    pub phase: PodPhase,
    pub ip: Option<String>,
    pub node: Option<String>,
    pub host_ip: Option<String>,
}

#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum ControlPlaneError {
    #[snafu(display("{} {:?} not found.", kind, name))]
    NotFound { kind: &'static str, name: String },
    #[snafu(display("Request for {} {:?} was rejected: {}", kind, name, reason))]
    Rejected {
        kind: &'static str,
        name: String,
        reason: String,
    },
    #[snafu(display("{} {:?} still exists after {:?}.", kind, name, timeout))]
    DeleteTimedOut {
        kind: &'static str,
        name: String,
        timeout: Duration,
    },
    #[snafu(display("Kubernetes API request failed: {}", source))]
    Request { source: kube::Error },
}

impl ControlPlaneError {
    pub const fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }
}

/// Access to the cluster objects a run touches.
///
/// Calls are scoped to the namespace the implementation was built for,
/// except for nodes.
#[async_trait]
pub trait ControlPlane: Send + Sync {
    async fn fleet_status(&self, name: &str) -> Result<FleetStatus, ControlPlaneError>;

    /// Lists pods matching a label `selector`.
    async fn list_pods(&self, selector: &str) -> Result<Vec<PodSummary>, ControlPlaneError>;

    async fn list_nodes(&self) -> Result<Vec<NodeSummary>, ControlPlaneError>;

    async fn create_pod(&self, pod: &Pod) -> Result<PodHandle, ControlPlaneError>;

    async fn create_daemon_set(&self, daemon_set: &DaemonSet) -> Result<(), ControlPlaneError>;

    async fn pod_status(&self, handle: &PodHandle) -> Result<PodStatusSummary, ControlPlaneError>;

    /// Follows the pod's log from the beginning.
    ///
    /// Failing to open the log is reported as the first stream item.
    fn stream_logs(&self, handle: &PodHandle) -> LogLines;

    /// Requests deletion of the pod. When `wait` is false this returns as
    /// soon as the request is accepted. Otherwise it waits, up to a bounded
    /// deadline, for the pod to be gone.
    async fn delete_pod(&self, handle: &PodHandle, wait: bool) -> Result<(), ControlPlaneError>;

    async fn delete_daemon_set(&self, name: &str) -> Result<(), ControlPlaneError>;
}
