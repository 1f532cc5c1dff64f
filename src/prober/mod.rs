//! Prober pods: launch, wait until running, stream results, tear down.

use std::{
    fmt,
    net::{AddrParseError, IpAddr},
    sync::Arc,
};

use serde::{Deserialize, Serialize};
use snafu::{OptionExt, ResultExt, Snafu};
use tokio::runtime::Handle;

use crate::{
    config::ProberConfig,
    decoder::{self, ResultStream},
    internal_events::{
        ProberDroppedWithoutTeardown, ProberLaunched, ProberRunning, ProberTeardownFailed,
        ProberTeardownRequested,
    },
    inventory::Inventory,
    kubernetes::{ControlPlane, ControlPlaneError, LogLines, PodHandle, PodPhase, PodStatusSummary},
    shutdown::ShutdownSignal,
    wait::{self, Check, WaitError, WaitOptions},
};

pub mod manifest;

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, clap::ValueEnum,
)]
#[serde(rename_all = "kebab-case")]
pub enum VariantId {
    /// Prober on the pod network.
    PodNetwork,
    /// Prober sharing its node's network namespace.
    HostNetwork,
}

impl VariantId {
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::PodNetwork => "pod-network",
            Self::HostNetwork => "host-network",
        }
    }

    pub const fn variant(&self) -> &'static RunVariant {
        match self {
            Self::PodNetwork => &RunVariant::POD_NETWORK,
            Self::HostNetwork => &RunVariant::HOST_NETWORK,
        }
    }
}

impl fmt::Display for VariantId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How a prober is parameterised for one pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunVariant {
    pub id: VariantId,
    pub display_name: &'static str,
    pub host_network: bool,
    /// Pod name of the prober. Distinct per variant so a prober still being
    /// deleted never collides with the next one.
    pub prober_name: &'static str,
}

impl RunVariant {
    pub const POD_NETWORK: Self = Self {
        id: VariantId::PodNetwork,
        display_name: "Pod network",
        host_network: false,
        prober_name: "netcheck-prober",
    };

    pub const HOST_NETWORK: Self = Self {
        id: VariantId::HostNetwork,
        display_name: "Host network",
        host_network: true,
        prober_name: "netcheck-prober-host",
    };

    pub const fn all() -> [Self; 2] {
        [Self::POD_NETWORK, Self::HOST_NETWORK]
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleState {
    /// Creation was accepted.
    Requested,
    /// Assigned to a node, not running yet.
    Scheduled,
    Running,
    Streaming,
    Completed,
    /// Deletion was requested. Terminal.
    TeardownRequested,
}

/// Where a running prober lives.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProberIdentity {
    pub name: String,
    pub variant: VariantId,
    pub ip: IpAddr,
    pub node: String,
    pub node_ip: IpAddr,
}

#[derive(Debug, Snafu)]
pub enum LaunchError {
    #[snafu(display("Could not render manifest for prober {:?}: {}", name, source))]
    Manifest {
        name: String,
        source: serde_json::Error,
    },
    #[snafu(display("Could not create prober {:?}: {}", name, source))]
    Create {
        name: String,
        source: ControlPlaneError,
    },
}

#[derive(Debug, Snafu)]
pub enum SchedulingError {
    #[snafu(display("Prober {:?} disappeared before it started running.", name))]
    Disappeared { name: String },
    #[snafu(display("Prober {:?} did not start running: {}", name, source))]
    NotRunning { name: String, source: WaitError },
    #[snafu(display("Running prober {:?} reports no {}.", name, field))]
    MissingStatus { name: String, field: &'static str },
    #[snafu(display(
        "Running prober {:?} reports an invalid {} {:?}: {}",
        name,
        field,
        address,
        source
    ))]
    InvalidAddress {
        name: String,
        field: &'static str,
        address: String,
        source: AddrParseError,
    },
}

impl SchedulingError {
    pub const fn is_cancelled(&self) -> bool {
        matches!(self, Self::NotRunning { source, .. } if source.is_cancelled())
    }
}

/// A launched prober pod.
///
/// Call [`Prober::teardown`] once done with it. A prober dropped without
/// teardown still requests its deletion, from a spawned task.
pub struct Prober {
    control_plane: Arc<dyn ControlPlane>,
    handle: PodHandle,
    variant: RunVariant,
    state: LifecycleState,
    identity: Option<ProberIdentity>,
}

/// Creates the prober pod of `variant`, configured with `inventory`.
pub async fn launch(
    control_plane: &Arc<dyn ControlPlane>,
    config: &ProberConfig,
    variant: &RunVariant,
    inventory: &Inventory,
) -> Result<Prober, LaunchError> {
    let name = variant.prober_name;
    let pod = manifest::prober_pod(config, variant, inventory).context(ManifestSnafu { name })?;
    let handle = control_plane
        .create_pod(&pod)
        .await
        .context(CreateSnafu { name })?;

    emit!(ProberLaunched {
        name: &handle.name,
        host_network: variant.host_network,
    });

    Ok(Prober {
        control_plane: Arc::clone(control_plane),
        handle,
        variant: *variant,
        state: LifecycleState::Requested,
        identity: None,
    })
}

fn required<'a>(
    name: &str,
    field: &'static str,
    value: Option<&'a str>,
) -> Result<&'a str, SchedulingError> {
    value.context(MissingStatusSnafu { name, field })
}

fn address(
    name: &str,
    field: &'static str,
    value: Option<&str>,
) -> Result<IpAddr, SchedulingError> {
    let address = required(name, field, value)?;
    address.parse().context(InvalidAddressSnafu {
        name,
        field,
        address,
    })
}

fn identity(
    name: &str,
    variant: VariantId,
    status: &PodStatusSummary,
) -> Result<ProberIdentity, SchedulingError> {
    Ok(ProberIdentity {
        name: name.to_owned(),
        variant,
        ip: address(name, "pod IP", status.ip.as_deref())?,
        node: required(name, "node", status.node.as_deref())?.to_owned(),
        node_ip: address(name, "host IP", status.host_ip.as_deref())?,
    })
}

impl Prober {
    pub fn name(&self) -> &str {
        &self.handle.name
    }

    pub const fn variant(&self) -> &RunVariant {
        &self.variant
    }

    pub const fn state(&self) -> LifecycleState {
        self.state
    }

    /// Set once [`Prober::await_running`] succeeded.
    pub const fn identity(&self) -> Option<&ProberIdentity> {
        self.identity.as_ref()
    }

    /// Polls the pod until it runs, then resolves where it lives.
    ///
    /// A pod that already `Succeeded` counts as running: its log is
    /// complete. A `Failed` or deleted pod never will.
    pub async fn await_running(
        &mut self,
        options: WaitOptions,
        shutdown: &ShutdownSignal,
    ) -> Result<&ProberIdentity, SchedulingError> {
        let target = format!("pod/{}", self.handle.name);
        let control_plane = &self.control_plane;
        let handle = &self.handle;
        let state = &mut self.state;

        let polled = wait::until(
            &target,
            options,
            shutdown,
            || control_plane.pod_status(handle),
            |status| match status.phase {
                PodPhase::Running | PodPhase::Succeeded => Check::Ready,
                PodPhase::Failed => Check::Failed("pod phase is Failed".to_owned()),
                PodPhase::Pending | PodPhase::Unknown => {
                    if status.node.is_some() {
                        *state = LifecycleState::Scheduled;
                    }
                    Check::Pending
                }
            },
        )
        .await;

        let status = match polled {
            Ok(status) => status,
            Err(WaitError::Query { source, .. }) if source.is_not_found() => {
                return DisappearedSnafu { name: self.name() }.fail();
            }
            Err(source) => {
                return Err(SchedulingError::NotRunning {
                    name: self.handle.name.clone(),
                    source,
                });
            }
        };

        let identity = identity(&self.handle.name, self.variant.id, &status)?;
        self.state = LifecycleState::Running;
        emit!(ProberRunning {
            name: &identity.name,
            ip: &identity.ip.to_string(),
            node: &identity.node,
            node_ip: &identity.node_ip.to_string(),
        });
        Ok(self.identity.insert(identity))
    }

    /// Follows the prober's log from the start.
    pub fn results(&mut self) -> ResultStream<LogLines> {
        self.state = LifecycleState::Streaming;
        decoder::decode(self.control_plane.stream_logs(&self.handle))
    }

    pub fn mark_completed(&mut self) {
        self.state = LifecycleState::Completed;
    }

    /// Requests deletion without waiting for the pod to go away.
    ///
    /// A failed deletion is logged, never returned: the run's outcome does
    /// not depend on it.
    pub async fn teardown(mut self) {
        request_deletion(self.control_plane.as_ref(), &self.handle).await;
        self.state = LifecycleState::TeardownRequested;
    }
}

async fn request_deletion(control_plane: &dyn ControlPlane, handle: &PodHandle) {
    match control_plane.delete_pod(handle, false).await {
        Ok(()) => {
            emit!(ProberTeardownRequested { name: &handle.name });
        }
        // Already gone.
        Err(error) if error.is_not_found() => {}
        Err(error) => {
            emit!(ProberTeardownFailed {
                name: &handle.name,
                error: &error,
            });
        }
    }
}

impl Drop for Prober {
    fn drop(&mut self) {
        if self.state == LifecycleState::TeardownRequested {
            return;
        }
        emit!(ProberDroppedWithoutTeardown {
            name: &self.handle.name
        });
        let Ok(runtime) = Handle::try_current() else {
            return;
        };
        let control_plane = Arc::clone(&self.control_plane);
        let handle = self.handle.clone();
        runtime.spawn(async move {
            request_deletion(control_plane.as_ref(), &handle).await;
        });
    }
}

impl fmt::Debug for Prober {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Prober")
            .field("name", &self.handle.name)
            .field("variant", &self.variant.id)
            .field("state", &self.state)
            .field("identity", &self.identity)
            .finish()
    }
}
