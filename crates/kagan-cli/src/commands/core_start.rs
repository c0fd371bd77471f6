//! `kagan core start`: blocking host, identical startup sequence to the
//! `kagan-core` binary (§4.1, §6).

pub async fn run() -> anyhow::Result<()> {
    kagan_daemon::start_blocking().await
}
