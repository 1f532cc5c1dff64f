//! Network connectivity checks for Kubernetes clusters.
//!
//! A run waits for the target fleet, snapshots the target pods and nodes,
//! then launches one prober pod per network-mode variant and reports every
//! result the prober writes to its log.

#[macro_use]
extern crate tracing;

#[macro_use]
pub mod internal_events;

pub mod app;
pub mod cli;
pub mod config;
pub mod coordinator;
pub mod decoder;
pub mod fleet;
pub mod inventory;
pub mod kubernetes;
pub mod prober;
pub mod reporter;
pub mod shutdown;
pub mod signal;
pub mod trace;
pub mod wait;

#[cfg(test)]
pub(crate) mod test_util;

pub use coordinator::{Coordinator, RunError, RunSummary};
pub use inventory::Inventory;
pub use prober::{RunVariant, VariantId};
pub use reporter::Reporter;

/// Returns the version string reported by `--version`.
pub fn get_version() -> String {
    let pkg_version = env!("CARGO_PKG_VERSION");
    let target = option_env!("TARGET").unwrap_or("unknown-target");
    format!("{} ({})", pkg_version, target)
}
