use std::collections::BTreeMap;

use k8s_openapi::{
    api::core::v1::{Container, EnvVar, EnvVarSource, ObjectFieldSelector, Pod, PodSpec},
    apimachinery::pkg::apis::meta::v1::ObjectMeta,
};

use super::RunVariant;
use crate::{config::ProberConfig, inventory::Inventory};

pub const APP_LABEL: &str = "app.kubernetes.io/name";
pub const APP_NAME: &str = "netcheck-prober";
pub const VARIANT_LABEL: &str = "netcheck/variant";

fn env_value(name: &str, value: String) -> EnvVar {
    EnvVar {
        name: name.to_owned(),
        value: Some(value),
        ..EnvVar::default()
    }
}

fn env_field(name: &str, field_path: &str) -> EnvVar {
    EnvVar {
        name: name.to_owned(),
        value_from: Some(EnvVarSource {
            field_ref: Some(ObjectFieldSelector {
                field_path: field_path.to_owned(),
                ..ObjectFieldSelector::default()
            }),
            ..EnvVarSource::default()
        }),
        ..EnvVar::default()
    }
}

/// Builds the pod running the prober of `variant`.
///
/// The inventory is handed over as JSON in `PODS` and `NODES`; the prober
/// learns its own address, name and node from the downward API.
pub fn prober_pod(
    config: &ProberConfig,
    variant: &RunVariant,
    inventory: &Inventory,
) -> serde_json::Result<Pod> {
    let env = vec![
        env_value("PODS", inventory.pods_json()?),
        env_value("NODES", inventory.nodes_json()?),
        env_field("SELF_IP", "status.podIP"),
        env_field("SELF_POD", "metadata.name"),
        env_field("SELF_NODE", "spec.nodeName"),
    ];

    let labels = BTreeMap::from([
        (APP_LABEL.to_owned(), APP_NAME.to_owned()),
        (VARIANT_LABEL.to_owned(), variant.id.as_str().to_owned()),
    ]);

    Ok(Pod {
        metadata: ObjectMeta {
            name: Some(variant.prober_name.to_owned()),
            labels: Some(labels),
            ..ObjectMeta::default()
        },
        spec: Some(PodSpec {
            containers: vec![Container {
                name: "prober".to_owned(),
                image: Some(config.image.clone()),
                image_pull_policy: config.image_pull_policy.clone(),
                env: Some(env),
                ..Container::default()
            }],
            restart_policy: Some("Never".to_owned()),
            host_network: Some(variant.host_network),
            dns_policy: variant
                .host_network
                .then(|| "ClusterFirstWithHostNet".to_owned()),
            ..PodSpec::default()
        }),
        status: None,
    })
}
