//! The core process: binds the transport, serves the dispatcher, and owns
//! the instance lock and discovery file for the lifetime of one run.

pub mod daemon;

use anyhow::{Context, Result};
use kagan_core::config::Config;
use kagan_core::lockfile::{self, AcquireResult, InstanceLease};
use tracing::{error, info};

use daemon::Daemon;

/// Acquires the single-instance lock, loads configuration, and blocks
/// serving requests until shutdown. Shared by the `kagan-core` binary and
/// the `kagan core start` CLI subcommand so there is exactly one startup
/// sequence (spec §4.1/§6).
pub async fn start_blocking() -> Result<()> {
    let lease = InstanceLease {
        pid: std::process::id(),
        started_at: chrono::Utc::now().to_rfc3339(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    };
    match lockfile::acquire_instance_lock(&lease).context("failed to acquire instance lock")? {
        AcquireResult::Acquired => {}
        AcquireResult::AlreadyRunning(existing) => {
            anyhow::bail!(
                "kagan core is already running (pid={})\n\nHint: use `kagan reset` to stop it first.",
                existing.pid
            );
        }
    }

    let result = run().await;

    if let Err(e) = &result {
        error!(error = %e, "core exited with error");
    }
    lockfile::release_instance_lock();
    lockfile::remove_endpoint();
    result
}

async fn run() -> Result<()> {
    let config = Config::load().unwrap_or_else(|e| {
        tracing::warn!(error = %e, "failed to load config, using defaults");
        Config::default()
    });

    info!(pid = std::process::id(), version = env!("CARGO_PKG_VERSION"), "kagan core starting");

    let daemon = Daemon::bootstrap(config).await.context("failed to bootstrap core")?;
    daemon.run().await
}
