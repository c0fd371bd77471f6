//! Single-instance enforcement and discovery for the daemon.
//!
//! Four artifacts live under `{locks_dir}`/`{runtime_dir}` (§6):
//! - `kagan.lock` — the OS advisory lock. Exactly one daemon may hold it.
//! - `core.lease.json` — records which PID holds the lock, for diagnostics.
//! - `core.start.lock` — serializes concurrent launchers (e.g. two CLI
//!   invocations racing to start the daemon); stale after 60s.
//! - `core.endpoint.json` — discovery descriptor clients read to find the
//!   transport, auth token, and PID of the running instance.
//!
//! ## Race safety
//!
//! `kagan.lock` and `core.start.lock` are both created with
//! `O_CREAT | O_EXCL`, so two processes racing to create them have exactly
//! one winner; the loser checks whether the holder's PID is alive and, if
//! not, removes the stale file and retries.

use serde::{Deserialize, Serialize};
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use crate::config::{locks_dir, runtime_dir};

const START_LOCK_STALE_AFTER: Duration = Duration::from_secs(60);

// ---------------------------------------------------------------------------
// kagan.lock — instance lock
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InstanceLease {
    pub pid: u32,
    pub started_at: String,
    pub version: String,
}

pub enum AcquireResult {
    Acquired,
    AlreadyRunning(InstanceLease),
}

pub fn instance_lock_path() -> PathBuf {
    locks_dir().join("kagan.lock")
}

pub fn lease_path() -> PathBuf {
    runtime_dir().join("core.lease.json")
}

/// Atomically take `kagan.lock` and write `core.lease.json`. A stale lock
/// left by a crashed process is removed and retried once.
pub fn acquire_instance_lock(lease: &InstanceLease) -> std::io::Result<AcquireResult> {
    for attempt in 0..2 {
        let path = instance_lock_path();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        match OpenOptions::new().write(true).create_new(true).open(&path) {
            Ok(mut file) => {
                write!(file, "{}", lease.pid)?;
                file.sync_all()?;
                write_lease(lease)?;
                return Ok(AcquireResult::Acquired);
            }
            Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
                match read_lease() {
                    Some(existing) if pid_alive(existing.pid) => {
                        return Ok(AcquireResult::AlreadyRunning(existing));
                    }
                    _ => {
                        tracing::info!("removing stale instance lock");
                        let _ = std::fs::remove_file(&path);
                        let _ = std::fs::remove_file(lease_path());
                        if attempt == 1 {
                            return Err(std::io::Error::new(
                                std::io::ErrorKind::WouldBlock,
                                "failed to acquire instance lock after stale cleanup",
                            ));
                        }
                        continue;
                    }
                }
            }
            Err(e) => return Err(e),
        }
    }
    unreachable!("loop always returns")
}

pub fn release_instance_lock() {
    let _ = std::fs::remove_file(instance_lock_path());
    let _ = std::fs::remove_file(lease_path());
}

fn write_lease(lease: &InstanceLease) -> std::io::Result<()> {
    let path = lease_path();
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let json = serde_json::to_string_pretty(lease)?;
    std::fs::write(path, json)
}

pub fn read_lease() -> Option<InstanceLease> {
    let content = std::fs::read_to_string(lease_path()).ok()?;
    serde_json::from_str(&content).ok()
}

// ---------------------------------------------------------------------------
// core.start.lock — launcher serialization
// ---------------------------------------------------------------------------

pub fn start_lock_path() -> PathBuf {
    runtime_dir().join("core.start.lock")
}

pub enum StartLockResult {
    Acquired(StartLockGuard),
    HeldByLiveLauncher,
}

/// RAII guard over `core.start.lock`; removes the file on drop.
pub struct StartLockGuard {
    path: PathBuf,
}

impl Drop for StartLockGuard {
    fn drop(&mut self) {
        let _ = std::fs::remove_file(&self.path);
    }
}

/// Acquire `core.start.lock`, treating a lock file older than 60s as stale
/// regardless of whether its owning PID is still alive — a launcher that
/// hangs past that window has already failed its job.
pub fn acquire_start_lock() -> std::io::Result<StartLockResult> {
    let path = start_lock_path();
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    match OpenOptions::new().write(true).create_new(true).open(&path) {
        Ok(mut file) => {
            write!(file, "{}", std::process::id())?;
            Ok(StartLockResult::Acquired(StartLockGuard { path }))
        }
        Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
            if is_start_lock_stale(&path) {
                let _ = std::fs::remove_file(&path);
                let mut file = OpenOptions::new().write(true).create_new(true).open(&path)?;
                write!(file, "{}", std::process::id())?;
                Ok(StartLockResult::Acquired(StartLockGuard { path }))
            } else {
                Ok(StartLockResult::HeldByLiveLauncher)
            }
        }
        Err(e) => Err(e),
    }
}

fn is_start_lock_stale(path: &Path) -> bool {
    let Ok(meta) = std::fs::metadata(path) else {
        return true;
    };
    let Ok(modified) = meta.modified() else {
        return true;
    };
    SystemTime::now()
        .duration_since(modified)
        .map(|age| age > START_LOCK_STALE_AFTER)
        .unwrap_or(false)
}

// ---------------------------------------------------------------------------
// core.endpoint.json — discovery
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransportKind {
    Socket,
    Tcp,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EndpointDescriptor {
    pub transport: TransportKind,
    pub address: String,
    pub port: Option<u16>,
    pub pid: u32,
    pub token: String,
    pub handshake_token: Option<String>,
}

pub fn endpoint_path() -> PathBuf {
    runtime_dir().join("core.endpoint.json")
}

pub fn write_endpoint(descriptor: &EndpointDescriptor) -> std::io::Result<()> {
    let path = endpoint_path();
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let json = serde_json::to_string_pretty(descriptor)?;
    std::fs::write(path, json)
}

pub fn read_endpoint() -> Option<EndpointDescriptor> {
    let content = std::fs::read_to_string(endpoint_path()).ok()?;
    serde_json::from_str(&content).ok()
}

pub fn remove_endpoint() {
    let _ = std::fs::remove_file(endpoint_path());
}

// ---------------------------------------------------------------------------
// PID liveness
// ---------------------------------------------------------------------------

#[cfg(unix)]
fn pid_alive(pid: u32) -> bool {
    // SAFETY: signal 0 checks existence without sending a signal.
    unsafe { libc::kill(pid as i32, 0) == 0 }
}

#[cfg(not(unix))]
fn pid_alive(_pid: u32) -> bool {
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    // These tests mutate process-wide env vars that steer path resolution,
    // so they must not run concurrently with each other.
    static ENV_GUARD: Mutex<()> = Mutex::new(());

    fn with_isolated_dirs<F: FnOnce()>(f: F) {
        let _guard = ENV_GUARD.lock().unwrap();
        let dir = tempfile::tempdir().unwrap();
        std::env::set_var("XDG_STATE_HOME", dir.path());
        std::env::set_var("KAGAN_DATA_DIR", dir.path());
        f();
        std::env::remove_var("XDG_STATE_HOME");
        std::env::remove_var("KAGAN_DATA_DIR");
    }

    #[test]
    fn current_pid_is_alive() {
        assert!(pid_alive(std::process::id()));
    }

    #[test]
    fn bogus_pid_is_dead() {
        assert!(!pid_alive(4_000_000));
    }

    #[test]
    fn acquire_instance_lock_then_detect_running() {
        with_isolated_dirs(|| {
            let lease = InstanceLease {
                pid: std::process::id(),
                started_at: "2026-01-01T00:00:00Z".into(),
                version: "0.1.0".into(),
            };
            match acquire_instance_lock(&lease).unwrap() {
                AcquireResult::Acquired => {}
                AcquireResult::AlreadyRunning(_) => panic!("should have acquired"),
            }
            match acquire_instance_lock(&lease).unwrap() {
                AcquireResult::AlreadyRunning(existing) => {
                    assert_eq!(existing.pid, std::process::id())
                }
                AcquireResult::Acquired => panic!("second acquire should see live holder"),
            }
            release_instance_lock();
        });
    }

    #[test]
    fn stale_instance_lock_is_recovered() {
        with_isolated_dirs(|| {
            let dead = InstanceLease {
                pid: 4_000_000,
                started_at: "2026-01-01T00:00:00Z".into(),
                version: "0.1.0".into(),
            };
            let path = instance_lock_path();
            std::fs::create_dir_all(path.parent().unwrap()).unwrap();
            std::fs::write(&path, "4000000").unwrap();
            std::fs::write(lease_path(), serde_json::to_string(&dead).unwrap()).unwrap();

            let live = InstanceLease {
                pid: std::process::id(),
                started_at: "2026-01-01T00:00:01Z".into(),
                version: "0.1.0".into(),
            };
            match acquire_instance_lock(&live).unwrap() {
                AcquireResult::Acquired => {}
                AcquireResult::AlreadyRunning(_) => panic!("stale lock should be recovered"),
            }
            release_instance_lock();
        });
    }

    #[test]
    fn endpoint_roundtrips() {
        with_isolated_dirs(|| {
            let descriptor = EndpointDescriptor {
                transport: TransportKind::Socket,
                address: "/tmp/kagan/core.sock".into(),
                port: None,
                pid: std::process::id(),
                token: "a".repeat(64),
                handshake_token: Some("b".repeat(64)),
            };
            write_endpoint(&descriptor).unwrap();
            let read = read_endpoint().unwrap();
            assert_eq!(read.address, descriptor.address);
            assert_eq!(read.token, descriptor.token);
            remove_endpoint();
            assert!(read_endpoint().is_none());
        });
    }

    #[test]
    fn start_lock_blocks_second_live_launcher() {
        with_isolated_dirs(|| {
            let guard = match acquire_start_lock().unwrap() {
                StartLockResult::Acquired(g) => g,
                StartLockResult::HeldByLiveLauncher => panic!("should have acquired"),
            };
            match acquire_start_lock().unwrap() {
                StartLockResult::HeldByLiveLauncher => {}
                StartLockResult::Acquired(_) => panic!("second launcher should be blocked"),
            }
            drop(guard);
            match acquire_start_lock().unwrap() {
                StartLockResult::Acquired(_) => {}
                StartLockResult::HeldByLiveLauncher => panic!("lock should be free after drop"),
            }
        });
    }
}
