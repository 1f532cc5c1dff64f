//! Run configuration, loaded from TOML and overridden from the command line.

use std::{
    collections::BTreeMap,
    fs,
    path::{Path, PathBuf},
    time::Duration,
};

use serde::{Deserialize, Serialize};
use snafu::{ResultExt, Snafu, ensure};

use crate::{
    prober::{RunVariant, VariantId},
    wait::WaitOptions,
};

#[derive(Debug, Snafu)]
pub enum ConfigError {
    #[snafu(display("Could not read config file {:?}: {}", path, source))]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[snafu(display("Could not parse config: {}", source))]
    Parse { source: toml::de::Error },
    #[snafu(display("Invalid config: {}", reason))]
    Invalid { reason: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    /// Kubeconfig context to use. Defaults to the current context, or the
    /// in-cluster configuration.
    #[serde(default)]
    pub context: Option<String>,

    #[serde(default = "default_namespace")]
    pub namespace: String,

    /// Variants to run, in order.
    #[serde(default = "default_variants")]
    pub variants: Vec<VariantId>,

    #[serde(default)]
    pub fleet: FleetConfig,

    #[serde(default)]
    pub prober: ProberConfig,

    #[serde(default)]
    pub wait: WaitConfig,
}

/// The target fleet: a `DaemonSet` whose pods the probers test against.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FleetConfig {
    #[serde(default = "default_fleet_name")]
    pub name: String,

    /// Labels selecting the target pods. Also applied to deployed fleets.
    #[serde(default = "default_fleet_labels")]
    pub labels: BTreeMap<String, String>,

    /// Create the fleet before the run and delete it afterwards.
    #[serde(default)]
    pub deploy: bool,

    #[serde(default = "default_fleet_image")]
    pub image: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ProberConfig {
    #[serde(default = "default_prober_image")]
    pub image: String,

    #[serde(default)]
    pub image_pull_policy: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct WaitConfig {
    #[serde(default = "default_poll_interval_secs")]
    pub poll_interval_secs: u64,

    #[serde(default = "default_fleet_timeout_secs")]
    pub fleet_timeout_secs: u64,

    #[serde(default = "default_prober_timeout_secs")]
    pub prober_timeout_secs: u64,
}

fn default_namespace() -> String {
    "default".to_owned()
}

fn default_variants() -> Vec<VariantId> {
    RunVariant::all().iter().map(|variant| variant.id).collect()
}

fn default_fleet_name() -> String {
    "netcheck-target".to_owned()
}

fn default_fleet_labels() -> BTreeMap<String, String> {
    BTreeMap::from([("app".to_owned(), "netcheck-target".to_owned())])
}

fn default_fleet_image() -> String {
    "registry.k8s.io/pause:3.9".to_owned()
}

fn default_prober_image() -> String {
    "netcheck/prober:latest".to_owned()
}

/// By default, poll every 2 seconds.
const fn default_poll_interval_secs() -> u64 {
    2
}

/// Pulling images on every node can take a while.
const fn default_fleet_timeout_secs() -> u64 {
    300
}

const fn default_prober_timeout_secs() -> u64 {
    120
}

impl Default for Config {
    fn default() -> Self {
        Self {
            context: None,
            namespace: default_namespace(),
            variants: default_variants(),
            fleet: FleetConfig::default(),
            prober: ProberConfig::default(),
            wait: WaitConfig::default(),
        }
    }
}

impl Default for FleetConfig {
    fn default() -> Self {
        Self {
            name: default_fleet_name(),
            labels: default_fleet_labels(),
            deploy: false,
            image: default_fleet_image(),
        }
    }
}

impl Default for ProberConfig {
    fn default() -> Self {
        Self {
            image: default_prober_image(),
            image_pull_policy: None,
        }
    }
}

impl Default for WaitConfig {
    fn default() -> Self {
        Self {
            poll_interval_secs: default_poll_interval_secs(),
            fleet_timeout_secs: default_fleet_timeout_secs(),
            prober_timeout_secs: default_prober_timeout_secs(),
        }
    }
}

impl Config {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path).context(ReadSnafu { path })?;
        Self::from_toml(&content)
    }

    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        toml::from_str(content).context(ParseSnafu)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        ensure!(
            !self.namespace.is_empty(),
            InvalidSnafu {
                reason: "`namespace` must not be empty"
            }
        );
        ensure!(
            !self.variants.is_empty(),
            InvalidSnafu {
                reason: "at least one variant must be selected"
            }
        );
        ensure!(
            !self.fleet.labels.is_empty(),
            InvalidSnafu {
                reason: "`fleet.labels` must select the target pods"
            }
        );
        ensure!(
            self.wait.poll_interval_secs > 0,
            InvalidSnafu {
                reason: "`wait.poll_interval_secs` must be greater than zero"
            }
        );
        ensure!(
            self.wait.fleet_timeout_secs > 0 && self.wait.prober_timeout_secs > 0,
            InvalidSnafu {
                reason: "wait timeouts must be greater than zero"
            }
        );
        Ok(())
    }

    /// The selected variants in order, each at most once.
    pub fn variants(&self) -> Vec<RunVariant> {
        let mut variants: Vec<RunVariant> = Vec::with_capacity(self.variants.len());
        for id in &self.variants {
            if !variants.iter().any(|variant| variant.id == *id) {
                variants.push(*id.variant());
            }
        }
        variants
    }
}

impl FleetConfig {
    /// Label selector matching the target pods, e.g. `app=netcheck-target`.
    pub fn selector(&self) -> String {
        self.labels
            .iter()
            .map(|(key, value)| format!("{}={}", key, value))
            .collect::<Vec<_>>()
            .join(",")
    }
}

impl WaitConfig {
    pub const fn fleet(&self) -> WaitOptions {
        WaitOptions {
            poll_interval: Duration::from_secs(self.poll_interval_secs),
            timeout: Duration::from_secs(self.fleet_timeout_secs),
        }
    }

    pub const fn prober(&self) -> WaitOptions {
        WaitOptions {
            poll_interval: Duration::from_secs(self.poll_interval_secs),
            timeout: Duration::from_secs(self.prober_timeout_secs),
        }
    }
}

#[cfg(test)]
mod tests {
    use indoc::indoc;

    use super::*;

    #[test]
    fn empty_file_uses_defaults() {
        let config = Config::from_toml("").unwrap();
        assert_eq!(config, Config::default());
        assert_eq!(
            config.variants,
            vec![VariantId::PodNetwork, VariantId::HostNetwork]
        );
        assert_eq!(config.fleet.selector(), "app=netcheck-target");
        assert_eq!(config.wait.fleet().timeout, Duration::from_secs(300));
        assert_eq!(config.wait.prober().timeout, Duration::from_secs(120));
        assert_eq!(config.wait.prober().poll_interval, Duration::from_secs(2));
        config.validate().unwrap();
    }

    #[test]
    fn parses_full_config() {
        let config = Config::from_toml(indoc! {r#"
            context = "kind-netcheck"
            namespace = "netcheck"
            variants = ["host-network"]

            [fleet]
            name = "echo"
            labels = { app = "echo", tier = "test" }
            deploy = true
            image = "nginx:1.27"

            [prober]
            image = "example.org/prober:1.2"
            image_pull_policy = "IfNotPresent"

            [wait]
            poll_interval_secs = 5
            prober_timeout_secs = 60
        "#})
        .unwrap();

        assert_eq!(config.context.as_deref(), Some("kind-netcheck"));
        assert_eq!(config.namespace, "netcheck");
        assert_eq!(config.variants(), vec![RunVariant::HOST_NETWORK]);
        assert_eq!(config.fleet.selector(), "app=echo,tier=test");
        assert!(config.fleet.deploy);
        assert_eq!(
            config.prober.image_pull_policy.as_deref(),
            Some("IfNotPresent")
        );
        assert_eq!(config.wait.fleet_timeout_secs, 300);
        assert_eq!(
            config.wait.prober(),
            WaitOptions {
                poll_interval: Duration::from_secs(5),
                timeout: Duration::from_secs(60),
            }
        );
    }

    #[test]
    fn rejects_unknown_fields() {
        let error = Config::from_toml(indoc! {r#"
            [wait]
            poll_interval = 5
        "#})
        .unwrap_err();
        assert!(matches!(error, ConfigError::Parse { .. }), "{error}");
    }

    #[test]
    fn rejects_unknown_variant() {
        let error = Config::from_toml(r#"variants = ["overlay"]"#).unwrap_err();
        assert!(matches!(error, ConfigError::Parse { .. }));
    }

    #[test]
    fn variants_are_deduplicated_in_order() {
        let config = Config {
            variants: vec![
                VariantId::HostNetwork,
                VariantId::PodNetwork,
                VariantId::HostNetwork,
            ],
            ..Config::default()
        };
        assert_eq!(
            config.variants(),
            vec![RunVariant::HOST_NETWORK, RunVariant::POD_NETWORK]
        );
    }

    #[test]
    fn validation_catches_unusable_settings() {
        let mut config = Config {
            variants: Vec::new(),
            ..Config::default()
        };
        assert!(config.validate().is_err());

        config.variants = vec![VariantId::PodNetwork];
        config.wait.poll_interval_secs = 0;
        assert_eq!(
            config.validate().unwrap_err().to_string(),
            "Invalid config: `wait.poll_interval_secs` must be greater than zero"
        );
    }
}
