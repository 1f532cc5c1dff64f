//! [`ControlPlane`] over the Kubernetes API.

use std::{future::Future, io, pin::pin, time::Duration};

use async_trait::async_trait;
use futures::{AsyncBufReadExt, StreamExt};
use k8s_openapi::api::{
    apps::v1::DaemonSet,
    core::v1::{Node, Pod},
};
use kube::{
    Api, Client,
    api::{DeleteParams, ListParams, LogParams, PostParams},
    config::KubeConfigOptions,
};
use snafu::{ResultExt, Snafu};

use crate::{
    shutdown::ShutdownSignal,
    wait::{self, Check, WaitError, WaitOptions},
};

use super::{
    ControlPlane, ControlPlaneError, FleetStatus, LogLines, NodeSummary, PodHandle, PodPhase,
    PodStatusSummary, PodSummary,
};

const DELETE_WAIT: WaitOptions = WaitOptions {
    poll_interval: Duration::from_secs(1),
    timeout: Duration::from_secs(60),
};

#[derive(Debug, Snafu)]
pub enum ConnectError {
    #[snafu(display("Unable to load kubeconfig context {:?}: {}", context, source))]
    Kubeconfig {
        context: String,
        source: kube::config::KubeconfigError,
    },
    #[snafu(display("Unable to infer Kubernetes client configuration: {}", source))]
    Infer {
        source: kube::config::InferConfigError,
    },
    #[snafu(display("Unable to build Kubernetes client: {}", source))]
    Client { source: kube::Error },
}

/// A control plane session bound to one kubeconfig context and namespace.
#[derive(Clone)]
pub struct KubeControlPlane {
    client: Client,
    namespace: String,
}

impl KubeControlPlane {
    pub fn new(client: Client, namespace: impl Into<String>) -> Self {
        Self {
            client,
            namespace: namespace.into(),
        }
    }

    /// Connects using the named kubeconfig `context`, or the inferred
    /// configuration (in-cluster or current context) when `None`.
    pub async fn connect(context: Option<&str>, namespace: &str) -> Result<Self, ConnectError> {
        let config = match context {
            Some(context) => {
                let options = KubeConfigOptions {
                    context: Some(context.to_owned()),
                    ..KubeConfigOptions::default()
                };
                kube::Config::from_kubeconfig(&options)
                    .await
                    .context(KubeconfigSnafu { context })?
            }
            None => kube::Config::infer().await.context(InferSnafu)?,
        };
        let client = Client::try_from(config).context(ClientSnafu)?;
        Ok(Self::new(client, namespace))
    }

    fn pods(&self) -> Api<Pod> {
        Api::namespaced(self.client.clone(), &self.namespace)
    }

    fn daemon_sets(&self) -> Api<DaemonSet> {
        Api::namespaced(self.client.clone(), &self.namespace)
    }
}

fn classify(kind: &'static str, name: &str, error: kube::Error) -> ControlPlaneError {
    match error {
        kube::Error::Api(response) if response.code == 404 => ControlPlaneError::NotFound {
            kind,
            name: name.to_owned(),
        },
        kube::Error::Api(response) if matches!(response.code, 403 | 409 | 422) => {
            ControlPlaneError::Rejected {
                kind,
                name: name.to_owned(),
                reason: response.message,
            }
        }
        source => ControlPlaneError::Request { source },
    }
}

/// Polls `exists` until it reports the object gone.
async fn await_gone<F, Fut>(
    kind: &'static str,
    name: &str,
    options: WaitOptions,
    exists: F,
) -> Result<(), ControlPlaneError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<bool, ControlPlaneError>>,
{
    let target = format!("{kind}/{name}");
    let gone = wait::until(
        &target,
        options,
        &ShutdownSignal::noop(),
        exists,
        |&exists| if exists { Check::Pending } else { Check::Ready },
    )
    .await;
    match gone {
        Ok(_) => Ok(()),
        Err(WaitError::Query { source, .. }) => Err(source),
        Err(_) => Err(ControlPlaneError::DeleteTimedOut {
            kind,
            name: name.to_owned(),
            timeout: options.timeout,
        }),
    }
}

fn to_u32(value: i32) -> u32 {
    u32::try_from(value).unwrap_or(0)
}

fn fleet_status(daemon_set: &DaemonSet) -> FleetStatus {
    let Some(status) = daemon_set.status.as_ref() else {
        return FleetStatus::default();
    };
    let observed = match (status.observed_generation, daemon_set.metadata.generation) {
        (Some(observed), Some(generation)) => observed >= generation,
        (_, None) => true,
        (None, Some(_)) => false,
    };
    FleetStatus {
        desired: to_u32(status.desired_number_scheduled),
        ready: to_u32(status.number_ready),
        observed,
    }
}

fn pod_summary(pod: Pod) -> PodSummary {
    PodSummary {
        name: pod.metadata.name.unwrap_or_default(),
        ip: pod.status.and_then(|status| status.pod_ip),
        node: pod.spec.and_then(|spec| spec.node_name),
    }
}

fn node_summary(node: Node) -> NodeSummary {
    let internal_ip = node
        .status
        .and_then(|status| status.addresses)
        .and_then(|addresses| {
            addresses
                .into_iter()
                .find(|address| address.type_ == "InternalIP")
                .map(|address| address.address)
        });
    NodeSummary {
        name: node.metadata.name.unwrap_or_default(),
        internal_ip,
    }
}

fn pod_status_summary(pod: Pod) -> PodStatusSummary {
    let node = pod.spec.and_then(|spec| spec.node_name);
    let status = pod.status.unwrap_or_default();
    PodStatusSummary {
        phase: PodPhase::parse(status.phase.as_deref()),
        ip: status.pod_ip,
        node,
        host_ip: status.host_ip,
    }
}

#[async_trait]
impl ControlPlane for KubeControlPlane {
    async fn fleet_status(&self, name: &str) -> Result<FleetStatus, ControlPlaneError> {
        let daemon_set = self
            .daemon_sets()
            .get(name)
            .await
            .map_err(|error| classify("daemonset", name, error))?;
        Ok(fleet_status(&daemon_set))
    }

    async fn list_pods(&self, selector: &str) -> Result<Vec<PodSummary>, ControlPlaneError> {
        let pods = self
            .pods()
            .list(&ListParams::default().labels(selector))
            .await
            .map_err(|error| classify("pod", selector, error))?;
        Ok(pods.items.into_iter().map(pod_summary).collect())
    }

    async fn list_nodes(&self) -> Result<Vec<NodeSummary>, ControlPlaneError> {
        let api: Api<Node> = Api::all(self.client.clone());
        let nodes = api
            .list(&ListParams::default())
            .await
            .map_err(|error| classify("node", "*", error))?;
        Ok(nodes.items.into_iter().map(node_summary).collect())
    }

    async fn create_pod(&self, pod: &Pod) -> Result<PodHandle, ControlPlaneError> {
        let requested = pod.metadata.name.clone().unwrap_or_default();
        let created = self
            .pods()
            .create(&PostParams::default(), pod)
            .await
            .map_err(|error| classify("pod", &requested, error))?;
        Ok(PodHandle::new(created.metadata.name.unwrap_or(requested)))
    }

    async fn create_daemon_set(&self, daemon_set: &DaemonSet) -> Result<(), ControlPlaneError> {
        let name = daemon_set.metadata.name.clone().unwrap_or_default();
        self.daemon_sets()
            .create(&PostParams::default(), daemon_set)
            .await
            .map_err(|error| classify("daemonset", &name, error))?;
        Ok(())
    }

    async fn pod_status(&self, handle: &PodHandle) -> Result<PodStatusSummary, ControlPlaneError> {
        let pod = self
            .pods()
            .get(&handle.name)
            .await
            .map_err(|error| classify("pod", &handle.name, error))?;
        Ok(pod_status_summary(pod))
    }

    fn stream_logs(&self, handle: &PodHandle) -> LogLines {
        let api = self.pods();
        let name = handle.name.clone();
        Box::pin(async_stream::stream! {
            let params = LogParams {
                follow: true,
                ..LogParams::default()
            };
            match api.log_stream(&name, &params).await {
                Ok(reader) => {
                    let mut lines = pin!(reader.lines());
                    while let Some(line) = lines.next().await {
                        yield line;
                    }
                }
                Err(error) => yield Err(io::Error::other(error)),
            }
        })
    }

    async fn delete_pod(&self, handle: &PodHandle, wait: bool) -> Result<(), ControlPlaneError> {
        let api = self.pods();
        api.delete(&handle.name, &DeleteParams::default())
            .await
            .map_err(|error| classify("pod", &handle.name, error))?;
        if !wait {
            return Ok(());
        }
        await_gone("pod", &handle.name, DELETE_WAIT, || async {
            api.get_opt(&handle.name)
                .await
                .map(|pod| pod.is_some())
                .map_err(|error| classify("pod", &handle.name, error))
        })
        .await
    }

    async fn delete_daemon_set(&self, name: &str) -> Result<(), ControlPlaneError> {
        self.daemon_sets()
            .delete(name, &DeleteParams::background())
            .await
            .map_err(|error| classify("daemonset", name, error))?;
        Ok(())
    }
}
