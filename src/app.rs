use std::{
    io::{self, IsTerminal},
    sync::Arc,
};

use tokio::runtime::{self, Runtime};

use crate::{
    cli::{Color, LogFormat, Opts},
    config::Config,
    coordinator::Coordinator,
    kubernetes::KubeControlPlane,
    reporter::ConsoleReporter,
    shutdown::{self, ShutdownSignal},
    trace,
};

pub struct Application {
    config: Config,
    color: bool,
    pub runtime: Runtime,
}

impl Application {
    pub fn prepare() -> Result<Self, exitcode::ExitCode> {
        let opts = Opts::get_matches().map_err(|error| {
            // Printing help and version also ends up here.
            let _ = error.print();
            if error.use_stderr() {
                exitcode::USAGE
            } else {
                exitcode::OK
            }
        })?;
        Self::prepare_from_opts(opts)
    }

    pub fn prepare_from_opts(opts: Opts) -> Result<Self, exitcode::ExitCode> {
        let level = std::env::var("NETCHECK_LOG").unwrap_or_else(|_| match opts.log_level() {
            "off" => "off".to_owned(),
            level => [format!("netcheck={}", level), "kube=warn".to_owned()].join(","),
        });

        let color = match opts.color {
            Color::Auto => io::stdout().is_terminal(),
            Color::Always => true,
            Color::Never => false,
        };
        colored::control::set_override(color);

        let json = match opts.log_format {
            LogFormat::Text => false,
            LogFormat::Json => true,
        };

        trace::init(color, json, &level);

        let mut config = match &opts.config {
            Some(path) => {
                info!(message = "Loading config.", path = ?path);
                Config::load(path).map_err(|error| {
                    error!(message = "Configuration error.", %error);
                    exitcode::CONFIG
                })?
            }
            None => Config::default(),
        };
        opts.apply(&mut config);
        config.validate().map_err(|error| {
            error!(message = "Configuration error.", %error);
            exitcode::CONFIG
        })?;

        let runtime = runtime::Builder::new_multi_thread()
            .enable_all()
            .build()
            .map_err(|error| {
                error!(message = "Unable to create async runtime.", %error);
                exitcode::OSERR
            })?;

        Ok(Self {
            config,
            color,
            runtime,
        })
    }

    /// Runs to completion and returns the process exit code.
    pub fn run(self) -> exitcode::ExitCode {
        let Self {
            config,
            color,
            runtime,
        } = self;

        runtime.block_on(async move {
            let control_plane =
                match KubeControlPlane::connect(config.context.as_deref(), &config.namespace).await
                {
                    Ok(control_plane) => Arc::new(control_plane),
                    Err(error) => {
                        error!(message = "Unable to connect to the cluster.", %error);
                        return exitcode::UNAVAILABLE;
                    }
                };

            let (trigger, shutdown) = ShutdownSignal::new();
            tokio::spawn(shutdown::cancel_on_signal(trigger));

            let variants = config.variants();
            let coordinator = Coordinator::new(control_plane, config, shutdown);
            let mut reporter = ConsoleReporter::new(io::stdout(), color);

            match coordinator.run(&variants, &mut reporter).await {
                Ok(summary) => {
                    reporter.summary(&summary);
                    summary.exit_code()
                }
                Err(error) => {
                    error!(message = "Run failed.", %error);
                    error.exit_code()
                }
            }
        })
    }
}
