//! The core daemon binary (`kagan-core`): acquires the single-instance
//! lock, loads configuration, and runs the transport accept loop until
//! shutdown.

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    kagan_telemetry::logging::init_logging("kagan-core", "info");
    kagan_daemon::start_blocking().await
}
