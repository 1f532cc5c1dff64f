use std::path::PathBuf;

use clap::{ArgAction, CommandFactory, FromArgMatches, Parser};

use crate::{config::Config, get_version, prober::VariantId};

/// Test pod and node connectivity across a Kubernetes cluster.
#[derive(Parser, Debug)]
#[command(name = "netcheck", rename_all = "kebab-case")]
pub struct Opts {
    /// Read configuration from a TOML file. Flags override its values.
    #[arg(short, long, env = "NETCHECK_CONFIG")]
    pub config: Option<PathBuf>,

    /// Kubeconfig context to use.
    #[arg(long, env = "NETCHECK_CONTEXT")]
    pub context: Option<String>,

    /// Namespace for the target fleet and the probers.
    #[arg(short, long, env = "NETCHECK_NAMESPACE")]
    pub namespace: Option<String>,

    /// Variant to run. Repeat to run several, in order. Defaults to every variant.
    #[arg(long = "variant", value_enum)]
    pub variants: Vec<VariantId>,

    /// Deploy the target fleet before the run and delete it afterwards.
    #[arg(long, env = "NETCHECK_DEPLOY_FLEET")]
    pub deploy_fleet: bool,

    /// Image of the prober pods.
    #[arg(long, env = "NETCHECK_PROBER_IMAGE")]
    pub prober_image: Option<String>,

    /// Seconds between two status polls.
    #[arg(long, value_name = "SECS", env = "NETCHECK_POLL_INTERVAL")]
    pub poll_interval: Option<u64>,

    /// Seconds to wait for the target fleet to become ready.
    #[arg(long, value_name = "SECS", env = "NETCHECK_FLEET_TIMEOUT")]
    pub fleet_timeout: Option<u64>,

    /// Seconds to wait for each prober to start running.
    #[arg(long, value_name = "SECS", env = "NETCHECK_PROBER_TIMEOUT")]
    pub prober_timeout: Option<u64>,

    /// Enable more detailed internal logging. Repeat to increase level. Overridden by `--quiet`.
    #[arg(short, long, action = ArgAction::Count)]
    pub verbose: u8,

    /// Reduce detail of internal logging. Repeat to reduce further. Overrides `--verbose`.
    #[arg(short, long, action = ArgAction::Count)]
    pub quiet: u8,

    /// Set the logging format.
    #[arg(long, default_value = "text", env = "NETCHECK_LOG_FORMAT")]
    pub log_format: LogFormat,

    /// Control when ANSI terminal formatting is used.
    ///
    /// By default `netcheck` will try and detect if `stdout` is a terminal, if it is
    /// ANSI will be enabled. Otherwise it will be disabled.
    #[arg(long, default_value = "auto", env = "NETCHECK_COLOR")]
    pub color: Color,
}

#[derive(clap::ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Color {
    Auto,
    Always,
    Never,
}

#[derive(clap::ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Text,
    Json,
}

impl Opts {
    pub fn get_matches() -> Result<Self, clap::Error> {
        let version = get_version();
        let command = Self::command().version(version);
        Self::from_arg_matches(&command.get_matches())
    }

    pub const fn log_level(&self) -> &'static str {
        match self.quiet {
            0 => match self.verbose {
                0 => "info",
                1 => "debug",
                2..=255 => "trace",
            },
            1 => "warn",
            2 => "error",
            3..=255 => "off",
        }
    }

    /// Applies the flags that were given on top of `config`.
    pub fn apply(&self, config: &mut Config) {
        if let Some(context) = &self.context {
            config.context = Some(context.clone());
        }
        if let Some(namespace) = &self.namespace {
            config.namespace = namespace.clone();
        }
        if !self.variants.is_empty() {
            config.variants = self.variants.clone();
        }
        if self.deploy_fleet {
            config.fleet.deploy = true;
        }
        if let Some(image) = &self.prober_image {
            config.prober.image = image.clone();
        }
        if let Some(secs) = self.poll_interval {
            config.wait.poll_interval_secs = secs;
        }
        if let Some(secs) = self.fleet_timeout {
            config.wait.fleet_timeout_secs = secs;
        }
        if let Some(secs) = self.prober_timeout {
            config.wait.prober_timeout_secs = secs;
        }
    }
}
