//! The core process (§4.1, §5): acquires the instance lock, binds the
//! transport, publishes the discovery file, and runs the accept loop until
//! asked to shut down.

use std::sync::Arc;

use anyhow::{Context, Result};
use kagan_automation::AutomationScheduler;
use kagan_core::config::{Config, SharedConfig};
use kagan_core::db::Db;
use kagan_core::event_bus::EventBus;
use kagan_core::lockfile::{self, EndpointDescriptor, TransportKind};
use kagan_core::worktree_manager::WorktreeManager;
use kagan_ipc::transport::{generate_token, Listener};
use kagan_ipc::Dispatcher;
use kagan_jobs::job_service::JobService;
use kagan_jobs::shutdown::ShutdownSignal;
use tracing::{error, info, warn};

/// Resolves once `signal` has been triggered, whether that happened before
/// or after this call — a plain `subscribe().recv()` would hang forever if
/// the trigger fired before we subscribed.
async fn wait_for_shutdown(signal: &ShutdownSignal) {
    if signal.is_shutting_down() {
        return;
    }
    let mut rx = signal.subscribe();
    let _ = rx.recv().await;
}

/// Everything the core process owns for the lifetime of one run.
pub struct Daemon {
    config: SharedConfig,
    db: Arc<Db>,
    bus: Arc<EventBus>,
    worktrees: Arc<WorktreeManager>,
    automation: Arc<AutomationScheduler>,
    dispatcher: Arc<Dispatcher>,
    shutdown: ShutdownSignal,
}

impl Daemon {
    /// Opens (creating if absent) the primary database, builds the service
    /// graph, and generates the per-request bearer token. Does not bind a
    /// transport yet — call [`Daemon::run`] for that.
    pub async fn bootstrap(config: Config) -> Result<Self> {
        let db_path = kagan_core::config::db_path();
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("failed to create {}", parent.display()))?;
        }
        let db = Arc::new(
            Db::open(&db_path)
                .await
                .with_context(|| format!("failed to open database at {}", db_path.display()))?,
        );
        let bus = Arc::new(EventBus::new());
        let worktrees = Arc::new(WorktreeManager::new(kagan_core::config::worktree_base()));
        let job_service = JobService::new(db.clone(), bus.clone());
        let shared_config = SharedConfig::new(config);
        let automation = Arc::new(AutomationScheduler::new(
            shared_config.clone(),
            shared_config.current().general.max_concurrent_agents as usize,
        ));
        let bearer_token = generate_token();
        let dispatcher = Arc::new(Dispatcher::with_runtime(
            bearer_token,
            db.clone(),
            bus.clone(),
            worktrees.clone(),
            job_service,
            automation.clone(),
        ));

        Ok(Self {
            config: shared_config,
            db,
            bus,
            worktrees,
            automation,
            dispatcher,
            shutdown: ShutdownSignal::new(),
        })
    }

    pub fn shutdown_handle(&self) -> ShutdownSignal {
        self.shutdown.clone()
    }

    pub fn config(&self) -> Arc<Config> {
        self.config.current()
    }

    /// The automation scheduler backing this run's `RuntimeQuiesce` handle.
    pub fn automation(&self) -> Arc<AutomationScheduler> {
        self.automation.clone()
    }

    /// Binds the platform transport, writes the discovery file, and serves
    /// connections until the shutdown signal fires. On return, the endpoint
    /// file and instance lock have already been cleaned up.
    pub async fn run(self) -> Result<()> {
        let force_tcp = std::env::var("KAGAN_FORCE_TCP").is_ok();
        let listener = if cfg!(unix) && !force_tcp {
            let socket_path = kagan_core::config::runtime_dir().join("core.sock");
            Listener::bind_unix(&socket_path)
                .await
                .context("failed to bind unix socket transport")?
        } else {
            Listener::bind_tcp().await.context("failed to bind tcp transport")?
        };

        let descriptor = match &listener {
            Listener::Unix { path, .. } => EndpointDescriptor {
                transport: TransportKind::Socket,
                address: path.to_string_lossy().into_owned(),
                port: None,
                pid: std::process::id(),
                token: self.dispatcher_token(),
                handshake_token: None,
            },
            Listener::Tcp { handshake_token, .. } => EndpointDescriptor {
                transport: TransportKind::Tcp,
                address: "127.0.0.1".to_string(),
                port: listener.local_port(),
                pid: std::process::id(),
                token: self.dispatcher_token(),
                handshake_token: Some(handshake_token.clone()),
            },
        };
        lockfile::write_endpoint(&descriptor).context("failed to write discovery file")?;
        info!(transport = ?descriptor.transport, address = %descriptor.address, port = ?descriptor.port, "core ready");

        let listener = Arc::new(listener);
        let accept_shutdown = self.shutdown.clone();
        let dispatcher = self.dispatcher.clone();
        let accept_handle = tokio::spawn(async move {
            accept_loop(listener, dispatcher, accept_shutdown).await;
        });

        wait_for_termination(&self.shutdown).await;
        info!("shutdown requested, draining connections");

        let _ = accept_handle.await;
        self.quiesce().await;

        lockfile::remove_endpoint();
        lockfile::release_instance_lock();
        info!("core stopped");
        Ok(())
    }

    fn dispatcher_token(&self) -> String {
        // The dispatcher owns the canonical copy; re-derive nothing here —
        // callers only need it once, to build the discovery descriptor.
        self.dispatcher.bearer_token().to_string()
    }

    /// §5 shutdown sequence, steps 2-3: cancel running automation and await
    /// bounded quiesce before disposing the DB handle.
    async fn quiesce(&self) {
        self.automation.shutdown_all().await;
    }
}

async fn accept_loop(listener: Arc<Listener>, dispatcher: Arc<Dispatcher>, shutdown: ShutdownSignal) {
    loop {
        let accepted = tokio::select! {
            result = listener.accept() => result,
            _ = wait_for_shutdown(&shutdown) => {
                info!("accept loop stopping");
                return;
            }
        };

        match accepted {
            Ok(conn) => {
                let dispatcher = dispatcher.clone();
                let shutdown = shutdown.clone();
                tokio::spawn(async move {
                    serve_connection(conn, dispatcher, shutdown).await;
                });
            }
            Err(e) => {
                warn!(error = %e, "failed to accept connection");
            }
        }
    }
}

async fn serve_connection(
    mut conn: kagan_ipc::transport::Connection,
    dispatcher: Arc<Dispatcher>,
    shutdown: ShutdownSignal,
) {
    let mut session_id: Option<String> = None;
    loop {
        let request = tokio::select! {
            result = conn.read_request() => result,
            _ = wait_for_shutdown(&shutdown) => return,
        };

        let request = match request {
            Ok(r) => r,
            Err(e) => {
                if !matches!(e, kagan_ipc::transport::TransportError::Closed) {
                    warn!(error = %e, "connection closed due to transport error");
                }
                break;
            }
        };
        session_id.get_or_insert_with(|| request.session_id.clone());

        let response = dispatcher.handle(request).await;
        if conn.write_response(&response).await.is_err() {
            break;
        }
    }

    if let Some(session_id) = session_id {
        dispatcher.release_session(&session_id);
    }
}

#[cfg(unix)]
async fn wait_for_termination(shutdown: &ShutdownSignal) {
    use tokio::signal::unix::{signal, SignalKind};

    let mut sigterm = match signal(SignalKind::terminate()) {
        Ok(s) => s,
        Err(e) => {
            error!(error = %e, "failed to install SIGTERM handler");
            wait_for_shutdown(&shutdown).await;
            return;
        }
    };

    tokio::select! {
        _ = tokio::signal::ctrl_c() => info!("ctrl-c received"),
        _ = sigterm.recv() => info!("SIGTERM received"),
        _ = wait_for_shutdown(&shutdown) => {}
    }
    shutdown.trigger();
}

#[cfg(not(unix))]
async fn wait_for_termination(shutdown: &ShutdownSignal) {
    tokio::select! {
        _ = tokio::signal::ctrl_c() => info!("ctrl-c received"),
        _ = wait_for_shutdown(&shutdown) => {}
    }
    shutdown.trigger();
}
