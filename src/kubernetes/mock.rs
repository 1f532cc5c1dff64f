//! A scripted control plane.
//!
//! Responses are configured up front; every call is recorded so tests can
//! assert on the exact sequence of control plane operations.

use std::{
    collections::{HashMap, VecDeque},
    io,
    sync::{Mutex, MutexGuard},
};

use async_trait::async_trait;
use futures::{StreamExt, stream};
use k8s_openapi::api::{apps::v1::DaemonSet, core::v1::Pod};

use super::{
    ControlPlane, ControlPlaneError, FleetStatus, LogLines, NodeSummary, PodHandle,
    PodStatusSummary, PodSummary,
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Call {
    FleetStatus(String),
    ListPods(String),
    ListNodes,
    CreatePod(String),
    CreateDaemonSet(String),
    PodStatus(String),
    StreamLogs(String),
    DeletePod(String, bool),
    DeleteDaemonSet(String),
}

/// One line of a scripted pod log.
#[derive(Debug, Clone)]
pub(crate) enum LogLine {
    Line(String),
    /// A transport error while reading.
    Error(String),
}

#[derive(Debug, Clone)]
struct ScriptedLog {
    lines: Vec<LogLine>,
    /// Keep the stream open forever after the scripted lines.
    hang: bool,
}

#[derive(Debug, Default)]
struct State {
    calls: Vec<Call>,
    fleet: VecDeque<FleetStatus>,
    target_pods: Vec<PodSummary>,
    list_pods_rejection: Option<String>,
    nodes: Vec<NodeSummary>,
    list_nodes_rejection: Option<String>,
    create_rejections: HashMap<String, String>,
    delete_rejections: HashMap<String, String>,
    statuses: HashMap<String, VecDeque<Option<PodStatusSummary>>>,
    logs: HashMap<String, ScriptedLog>,
    created_pods: Vec<Pod>,
    created_daemon_sets: Vec<DaemonSet>,
}

#[derive(Debug, Default)]
pub(crate) struct MockControlPlane {
    state: Mutex<State>,
}

/// Pops the next scripted value, repeating the last one once the script
/// is exhausted.
fn next_sticky<T: Clone>(script: &mut VecDeque<T>) -> Option<T> {
    if script.len() > 1 {
        script.pop_front()
    } else {
        script.front().cloned()
    }
}

impl MockControlPlane {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, State> {
        self.state.lock().expect("mock state poisoned")
    }

    pub(crate) fn with_fleet_statuses(
        self,
        statuses: impl IntoIterator<Item = FleetStatus>,
    ) -> Self {
        self.state().fleet = statuses.into_iter().collect();
        self
    }

    pub(crate) fn with_target_pods(self, pods: Vec<PodSummary>) -> Self {
        self.state().target_pods = pods;
        self
    }

    pub(crate) fn with_nodes(self, nodes: Vec<NodeSummary>) -> Self {
        self.state().nodes = nodes;
        self
    }

    pub(crate) fn reject_list_pods(self, reason: &str) -> Self {
        self.state().list_pods_rejection = Some(reason.to_owned());
        self
    }

    pub(crate) fn reject_list_nodes(self, reason: &str) -> Self {
        self.state().list_nodes_rejection = Some(reason.to_owned());
        self
    }

    pub(crate) fn reject_create(self, name: &str, reason: &str) -> Self {
        self.state()
            .create_rejections
            .insert(name.to_owned(), reason.to_owned());
        self
    }

    pub(crate) fn reject_delete(self, name: &str, reason: &str) -> Self {
        self.state()
            .delete_rejections
            .insert(name.to_owned(), reason.to_owned());
        self
    }

    /// Scripts the statuses returned for pod `name`; `None` means the pod
    /// is gone.
    pub(crate) fn with_pod_statuses(
        self,
        name: &str,
        statuses: impl IntoIterator<Item = Option<PodStatusSummary>>,
    ) -> Self {
        self.state()
            .statuses
            .insert(name.to_owned(), statuses.into_iter().collect());
        self
    }

    pub(crate) fn with_log_lines<S: AsRef<str>>(self, name: &str, lines: &[S]) -> Self {
        let lines = lines
            .iter()
            .map(|line| LogLine::Line(line.as_ref().to_owned()))
            .collect();
        self.with_log(name, lines, false)
    }

    pub(crate) fn with_log(self, name: &str, lines: Vec<LogLine>, hang: bool) -> Self {
        self.state()
            .logs
            .insert(name.to_owned(), ScriptedLog { lines, hang });
        self
    }

    pub(crate) fn calls(&self) -> Vec<Call> {
        self.state().calls.clone()
    }

    pub(crate) fn pod_deletions(&self, name: &str) -> usize {
        self.state()
            .calls
            .iter()
            .filter(|call| matches!(call, Call::DeletePod(deleted, _) if deleted == name))
            .count()
    }

    pub(crate) fn created_pod(&self, name: &str) -> Option<Pod> {
        self.state()
            .created_pods
            .iter()
            .find(|pod| pod.metadata.name.as_deref() == Some(name))
            .cloned()
    }

    pub(crate) fn created_daemon_sets(&self) -> Vec<DaemonSet> {
        self.state().created_daemon_sets.clone()
    }

    fn record(&self, call: Call) -> MutexGuard<'_, State> {
        let mut state = self.state();
        state.calls.push(call);
        state
    }
}

fn rejected(kind: &'static str, name: &str, reason: &str) -> ControlPlaneError {
    ControlPlaneError::Rejected {
        kind,
        name: name.to_owned(),
        reason: reason.to_owned(),
    }
}

fn not_found(kind: &'static str, name: &str) -> ControlPlaneError {
    ControlPlaneError::NotFound {
        kind,
        name: name.to_owned(),
    }
}

#[async_trait]
impl ControlPlane for MockControlPlane {
    async fn fleet_status(&self, name: &str) -> Result<FleetStatus, ControlPlaneError> {
        let mut state = self.record(Call::FleetStatus(name.to_owned()));
        next_sticky(&mut state.fleet).ok_or_else(|| not_found("daemonset", name))
    }

    async fn list_pods(&self, selector: &str) -> Result<Vec<PodSummary>, ControlPlaneError> {
        let state = self.record(Call::ListPods(selector.to_owned()));
        match &state.list_pods_rejection {
            Some(reason) => Err(rejected("pod", selector, reason)),
            None => Ok(state.target_pods.clone()),
        }
    }

    async fn list_nodes(&self) -> Result<Vec<NodeSummary>, ControlPlaneError> {
        let state = self.record(Call::ListNodes);
        match &state.list_nodes_rejection {
            Some(reason) => Err(rejected("node", "*", reason)),
            None => Ok(state.nodes.clone()),
        }
    }

    async fn create_pod(&self, pod: &Pod) -> Result<PodHandle, ControlPlaneError> {
        let name = pod.metadata.name.clone().unwrap_or_default();
        let mut state = self.record(Call::CreatePod(name.clone()));
        if let Some(reason) = state.create_rejections.get(&name) {
            return Err(rejected("pod", &name, reason));
        }
        state.created_pods.push(pod.clone());
        Ok(PodHandle::new(name))
    }

    async fn create_daemon_set(&self, daemon_set: &DaemonSet) -> Result<(), ControlPlaneError> {
        let name = daemon_set.metadata.name.clone().unwrap_or_default();
        let mut state = self.record(Call::CreateDaemonSet(name));
        state.created_daemon_sets.push(daemon_set.clone());
        Ok(())
    }

    async fn pod_status(&self, handle: &PodHandle) -> Result<PodStatusSummary, ControlPlaneError> {
        let mut state = self.record(Call::PodStatus(handle.name.clone()));
        state
            .statuses
            .get_mut(&handle.name)
            .and_then(next_sticky)
            .flatten()
            .ok_or_else(|| not_found("pod", &handle.name))
    }

    fn stream_logs(&self, handle: &PodHandle) -> LogLines {
        let state = self.record(Call::StreamLogs(handle.name.clone()));
        let log = state.logs.get(&handle.name).cloned().unwrap_or(ScriptedLog {
            lines: Vec::new(),
            hang: false,
        });
        let lines = stream::iter(log.lines.into_iter().map(|line| match line {
            LogLine::Line(line) => Ok(line),
            LogLine::Error(reason) => Err(io::Error::other(reason)),
        }));
        if log.hang {
            lines.chain(stream::pending()).boxed()
        } else {
            lines.boxed()
        }
    }

    async fn delete_pod(&self, handle: &PodHandle, wait: bool) -> Result<(), ControlPlaneError> {
        let state = self.record(Call::DeletePod(handle.name.clone(), wait));
        match state.delete_rejections.get(&handle.name) {
            Some(reason) => Err(rejected("pod", &handle.name, reason)),
            None => Ok(()),
        }
    }

    async fn delete_daemon_set(&self, name: &str) -> Result<(), ControlPlaneError> {
        self.record(Call::DeleteDaemonSet(name.to_owned()));
        Ok(())
    }
}
