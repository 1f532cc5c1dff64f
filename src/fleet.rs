//! The target fleet: the `DaemonSet` whose pods every prober tests against.

use std::{collections::BTreeMap, sync::Arc};

use k8s_openapi::{
    api::{
        apps::v1::{DaemonSet, DaemonSetSpec},
        core::v1::{Container, PodSpec, PodTemplateSpec, Toleration},
    },
    apimachinery::pkg::apis::meta::v1::{LabelSelector, ObjectMeta},
};
use snafu::{ResultExt, Snafu};
use tokio::runtime::Handle;

use crate::{
    config::FleetConfig,
    internal_events::{FleetDeleteFailed, FleetDeployed, FleetReady},
    kubernetes::{ControlPlane, ControlPlaneError, FleetStatus},
    shutdown::ShutdownSignal,
    wait::{self, Check, WaitError, WaitOptions},
};

#[derive(Debug, Snafu)]
pub enum DeployError {
    #[snafu(display("Could not create target fleet {:?}: {}", name, source))]
    CreateFleet {
        name: String,
        source: ControlPlaneError,
    },
}

/// Waits until every desired replica of fleet `name` is ready.
pub async fn await_ready(
    control_plane: &dyn ControlPlane,
    name: &str,
    options: WaitOptions,
    shutdown: &ShutdownSignal,
) -> Result<FleetStatus, WaitError> {
    let target = format!("daemonset/{}", name);
    let status = wait::until(
        &target,
        options,
        shutdown,
        || control_plane.fleet_status(name),
        |status| {
            if status.is_ready() {
                Check::Ready
            } else {
                Check::Pending
            }
        },
    )
    .await?;
    emit!(FleetReady {
        name,
        ready: status.ready,
    });
    Ok(status)
}

/// A `DaemonSet` running one target pod per schedulable node.
pub fn fleet_daemon_set(config: &FleetConfig) -> DaemonSet {
    let labels: BTreeMap<String, String> = config.labels.clone();
    DaemonSet {
        metadata: ObjectMeta {
            name: Some(config.name.clone()),
            labels: Some(labels.clone()),
            ..ObjectMeta::default()
        },
        spec: Some(DaemonSetSpec {
            selector: LabelSelector {
                match_labels: Some(labels.clone()),
                ..LabelSelector::default()
            },
            template: PodTemplateSpec {
                metadata: Some(ObjectMeta {
                    labels: Some(labels),
                    ..ObjectMeta::default()
                }),
                spec: Some(PodSpec {
                    containers: vec![Container {
                        name: "target".to_owned(),
                        image: Some(config.image.clone()),
                        ..Container::default()
                    }],
                    // Control plane nodes are targets too.
                    tolerations: Some(vec![Toleration {
                        operator: Some("Exists".to_owned()),
                        ..Toleration::default()
                    }]),
                    ..PodSpec::default()
                }),
            },
            ..DaemonSetSpec::default()
        }),
        status: None,
    }
}

/// A fleet created for this run. Deleted by [`FleetDeployment::delete`],
/// or from a spawned task if dropped.
pub struct FleetDeployment {
    control_plane: Arc<dyn ControlPlane>,
    name: String,
    deleted: bool,
}

pub async fn deploy(
    control_plane: &Arc<dyn ControlPlane>,
    config: &FleetConfig,
) -> Result<FleetDeployment, DeployError> {
    control_plane
        .create_daemon_set(&fleet_daemon_set(config))
        .await
        .context(CreateFleetSnafu { name: &config.name })?;
    emit!(FleetDeployed { name: &config.name });
    Ok(FleetDeployment {
        control_plane: Arc::clone(control_plane),
        name: config.name.clone(),
        deleted: false,
    })
}

async fn delete_fleet(control_plane: &dyn ControlPlane, name: &str) {
    match control_plane.delete_daemon_set(name).await {
        Ok(()) => {}
        Err(error) if error.is_not_found() => {}
        Err(error) => {
            emit!(FleetDeleteFailed {
                name,
                error: &error,
            });
        }
    }
}

impl FleetDeployment {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub async fn delete(mut self) {
        delete_fleet(self.control_plane.as_ref(), &self.name).await;
        self.deleted = true;
    }
}

impl Drop for FleetDeployment {
    fn drop(&mut self) {
        if self.deleted {
            return;
        }
        let Ok(runtime) = Handle::try_current() else {
            warn!(message = "No runtime left to delete target fleet.", name = %self.name);
            return;
        };
        let control_plane = Arc::clone(&self.control_plane);
        let name = self.name.clone();
        runtime.spawn(async move {
            delete_fleet(control_plane.as_ref(), &name).await;
        });
    }
}
