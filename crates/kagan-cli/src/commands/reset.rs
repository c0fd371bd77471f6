//! `kagan reset [--force]` (§6): stop the core with SIGTERM→SIGKILL
//! escalation, then remove the config/data/cache/worktree roots. Reports
//! partial delete failures rather than claiming full success.

use std::io::Write;
use std::time::Duration;

use kagan_core::config::{cache_dir, config_dir, data_dir, worktree_base};
use kagan_core::lockfile;

const SIGTERM_GRACE: Duration = Duration::from_secs(5);
const SIGTERM_POLL: Duration = Duration::from_millis(100);

pub async fn run(force: bool) -> anyhow::Result<()> {
    if !force && !confirm("This stops the kagan core and deletes all of its data. Continue? [y/N] ")? {
        println!("aborted");
        return Ok(());
    }

    stop_running_core().await;
    lockfile::release_instance_lock();
    lockfile::remove_endpoint();

    let roots = [
        ("config", config_dir()),
        ("data", data_dir()),
        ("cache", cache_dir()),
        ("worktrees", worktree_base()),
    ];

    let mut failures = Vec::new();
    for (label, path) in roots {
        if !path.exists() {
            continue;
        }
        if let Err(e) = std::fs::remove_dir_all(&path) {
            failures.push(format!("{label} ({}): {e}", path.display()));
        }
    }

    if failures.is_empty() {
        println!("reset complete");
        Ok(())
    } else {
        for f in &failures {
            eprintln!("failed to remove {f}");
        }
        anyhow::bail!("reset completed with {} unremoved path(s)", failures.len());
    }
}

async fn stop_running_core() {
    let Some(lease) = lockfile::read_lease() else {
        return;
    };
    if !pid_alive(lease.pid) {
        return;
    }

    send_signal(lease.pid, SignalKind::Term);

    let deadline = tokio::time::Instant::now() + SIGTERM_GRACE;
    while pid_alive(lease.pid) {
        if tokio::time::Instant::now() >= deadline {
            send_signal(lease.pid, SignalKind::Kill);
            break;
        }
        tokio::time::sleep(SIGTERM_POLL).await;
    }
}

enum SignalKind {
    Term,
    Kill,
}

#[cfg(unix)]
fn send_signal(pid: u32, kind: SignalKind) {
    let sig = match kind {
        SignalKind::Term => libc::SIGTERM,
        SignalKind::Kill => libc::SIGKILL,
    };
    // SAFETY: sends a standard termination signal to a pid we read from our
    // own lease file.
    unsafe { libc::kill(pid as i32, sig) };
}

#[cfg(not(unix))]
fn send_signal(_pid: u32, _kind: SignalKind) {}

#[cfg(unix)]
fn pid_alive(pid: u32) -> bool {
    // SAFETY: signal 0 checks existence without sending a signal.
    unsafe { libc::kill(pid as i32, 0) == 0 }
}

#[cfg(not(unix))]
fn pid_alive(_pid: u32) -> bool {
    true
}

fn confirm(prompt: &str) -> anyhow::Result<bool> {
    print!("{prompt}");
    std::io::stdout().flush()?;
    let mut line = String::new();
    std::io::stdin().read_line(&mut line)?;
    Ok(matches!(line.trim().to_lowercase().as_str(), "y" | "yes"))
}
