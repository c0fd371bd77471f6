//! Automation Scheduler (§4.9): the per-task AUTO runtime. Owns exactly one
//! running coding-agent process per `task_id`, enforces the workspace-wide
//! concurrency cap and the per-task iteration cap, and exposes the quiesce
//! handshake the merge service needs before it touches a worktree.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use kagan_core::config::SharedConfig;
use kagan_core::types::{CliType, Task};
use kagan_ipc::services::merge::RuntimeQuiesce;
use kagan_sessions::pty_pool::PtyPool;
use kagan_sessions::session::AgentSession;
use tokio::sync::Mutex;
use tokio::time::Instant;
use uuid::Uuid;

use crate::state_machine::{AgentEvent, AgentState, AgentStateMachine};

const STOP_QUIESCE_POLL: Duration = Duration::from_millis(100);
const STOP_QUIESCE_WINDOW: Duration = Duration::from_secs(10);

struct TaskRuntime {
    session: AgentSession,
    sm: AgentStateMachine,
    /// Set when this iteration is a read-only review pass rather than a
    /// normal write-enabled AUTO iteration.
    reviewing: bool,
}

/// Per-task AUTO runtime. One instance is shared by the dispatcher (for
/// `tasks.*`/`jobs.cancel`) and the merge service (via [`RuntimeQuiesce`]).
pub struct AutomationScheduler {
    config: SharedConfig,
    pool: PtyPool,
    tasks: Mutex<HashMap<Uuid, TaskRuntime>>,
    iterations: Mutex<HashMap<Uuid, u32>>,
    merge_lock: Arc<Mutex<()>>,
}

impl AutomationScheduler {
    pub fn new(config: SharedConfig, max_ptys: usize) -> Self {
        Self {
            config,
            pool: PtyPool::new(max_ptys),
            tasks: Mutex::new(HashMap::new()),
            iterations: Mutex::new(HashMap::new()),
            merge_lock: Arc::new(Mutex::new(())),
        }
    }

    /// The shared merge lock primitive (§4.9, §4.10): automation must
    /// release its hold before a merge flow proceeds.
    pub fn merge_lock(&self) -> Arc<Mutex<()>> {
        self.merge_lock.clone()
    }

    /// `reset_iterations`: used by rejection retry to give a task a fresh
    /// iteration budget.
    pub async fn reset_iterations(&self, task_id: Uuid) {
        self.iterations.lock().await.insert(task_id, 0);
    }

    /// Spawns the coding-agent process for `task` in `workdir`. Returns
    /// `true` if an agent was actually spawned, `false` if the task is
    /// already running, the task is at its iteration cap, the workspace is
    /// at its concurrency cap, or the task carries no recognised
    /// `agent_backend`. `review` marks this iteration as a read-only review
    /// pass (`is_reviewing` will report it as such).
    pub async fn spawn_for_task(&self, task: &Task, workdir: &str, review: bool) -> bool {
        let cfg = self.config.current();
        let mut tasks = self.tasks.lock().await;

        if tasks.contains_key(&task.id) {
            tracing::debug!(task_id = %task.id, "automation already running for task");
            return false;
        }

        let running = tasks
            .values()
            .filter(|rt| rt.sm.state() == AgentState::Active)
            .count();
        if running >= cfg.general.max_concurrent_agents as usize {
            tracing::warn!(task_id = %task.id, running, cap = cfg.general.max_concurrent_agents, "automation scheduler at capacity");
            return false;
        }

        {
            let mut iterations = self.iterations.lock().await;
            let count = iterations.entry(task.id).or_insert(0);
            if *count >= cfg.general.max_iterations {
                tracing::warn!(task_id = %task.id, iterations = *count, cap = cfg.general.max_iterations, "task hit its iteration cap");
                return false;
            }
            *count += 1;
        }

        let cli_type = match task.agent_backend.as_deref().and_then(CliType::parse) {
            Some(c) => c,
            None => {
                tracing::warn!(task_id = %task.id, agent_backend = ?task.agent_backend, "no recognised agent_backend, cannot spawn automation");
                return false;
            }
        };

        let agent_id = Uuid::new_v4();
        let session = match AgentSession::spawn(&self.pool, agent_id, &cli_type, &task.title, workdir).await {
            Ok(session) => session,
            Err(err) => {
                tracing::error!(task_id = %task.id, error = %err, "failed to spawn agent session");
                return false;
            }
        };

        let mut sm = AgentStateMachine::new();
        let _ = sm.transition(AgentEvent::Start);
        let _ = sm.transition(AgentEvent::Spawned);

        tracing::info!(task_id = %task.id, agent_id = %agent_id, cli = cli_type.as_str(), review, "automation spawned");
        tasks.insert(task.id, TaskRuntime { session, sm, reviewing: review });
        true
    }

    /// `is_running(task_id)`.
    pub async fn is_running(&self, task_id: Uuid) -> bool {
        let tasks = self.tasks.lock().await;
        tasks
            .get(&task_id)
            .map(|rt| rt.sm.state() == AgentState::Active && rt.session.is_alive())
            .unwrap_or(false)
    }

    /// `is_reviewing(task_id)`.
    pub async fn is_reviewing(&self, task_id: Uuid) -> bool {
        let tasks = self.tasks.lock().await;
        tasks.get(&task_id).map(|rt| rt.reviewing).unwrap_or(false)
    }

    /// Stops every running task's automation, awaiting each quiesce window
    /// in turn. Used at core shutdown so no agent process outlives the
    /// process that spawned it.
    pub async fn shutdown_all(&self) {
        let running: Vec<Uuid> = self.tasks.lock().await.keys().copied().collect();
        for task_id in running {
            if !self.stop_task(task_id).await {
                tracing::warn!(task_id = %task_id, "automation did not quiesce before shutdown");
            }
        }
    }

    /// `stop_task(task_id)`: cooperatively cancels the in-flight iteration
    /// and awaits a quiesce window. Returns `true` once `is_running` is
    /// false; `false` if the window expired while the process was still
    /// alive (callers such as `jobs.cancel` report `STOP_PENDING`).
    pub async fn stop_task(&self, task_id: Uuid) -> bool {
        {
            let mut tasks = self.tasks.lock().await;
            match tasks.get_mut(&task_id) {
                Some(rt) => {
                    if rt.sm.can_transition(AgentEvent::Stop) {
                        let _ = rt.sm.transition(AgentEvent::Stop);
                    }
                    let _ = rt.session.kill();
                }
                None => return true,
            }
        }

        let deadline = Instant::now() + STOP_QUIESCE_WINDOW;
        loop {
            if !self.is_running(task_id).await {
                self.tasks.lock().await.remove(&task_id);
                return true;
            }
            if Instant::now() >= deadline {
                tracing::warn!(task_id = %task_id, "stop_task quiesce window expired");
                return false;
            }
            tokio::time::sleep(STOP_QUIESCE_POLL).await;
        }
    }
}

#[async_trait]
impl RuntimeQuiesce for AutomationScheduler {
    async fn stop_task(&self, task_id: Uuid) {
        // Inherent method of the same name takes priority in method
        // resolution; this just adapts it to the fire-and-forget signature
        // the merge service's quiesce handshake expects.
        self.stop_task(task_id).await;
    }

    async fn is_running(&self, task_id: Uuid) -> bool {
        self.is_running(task_id).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kagan_core::config::Config;
    use kagan_core::types::{Project, TaskType};

    fn scheduler() -> AutomationScheduler {
        AutomationScheduler::new(SharedConfig::new(Config::default()), 4)
    }

    fn task_with_backend(backend: Option<&str>) -> Task {
        let project = Project::new("demo").unwrap();
        let mut task = Task::new(project.id, "t", TaskType::Auto);
        task.agent_backend = backend.map(|s| s.to_string());
        task
    }

    #[tokio::test]
    async fn spawn_without_agent_backend_is_refused() {
        let scheduler = scheduler();
        let task = task_with_backend(None);
        assert!(!scheduler.spawn_for_task(&task, "/tmp", false).await);
    }

    #[tokio::test]
    async fn unknown_agent_backend_is_refused() {
        let scheduler = scheduler();
        let task = task_with_backend(Some("not-a-real-cli"));
        assert!(!scheduler.spawn_for_task(&task, "/tmp", false).await);
    }

    #[tokio::test]
    async fn iteration_cap_of_zero_blocks_spawn_even_with_a_valid_backend() {
        let mut cfg = Config::default();
        cfg.general.max_iterations = 1;
        let scheduler = AutomationScheduler::new(SharedConfig::new(cfg), 4);
        let task = task_with_backend(Some("claude"));

        // First call consumes the single allowed iteration before the spawn
        // itself fails (claude binary is not present in the test sandbox),
        // so the iteration counter is observably at cap afterwards.
        let _ = scheduler.spawn_for_task(&task, "/tmp", false).await;
        let iterations = scheduler.iterations.lock().await;
        assert_eq!(iterations.get(&task.id).copied(), Some(1));
    }

    #[tokio::test]
    async fn reset_iterations_clears_the_counter() {
        let scheduler = scheduler();
        let task = task_with_backend(Some("claude"));
        scheduler.iterations.lock().await.insert(task.id, 10);
        scheduler.reset_iterations(task.id).await;
        assert_eq!(scheduler.iterations.lock().await.get(&task.id).copied(), Some(0));
    }

    #[tokio::test]
    async fn is_running_and_is_reviewing_are_false_for_unknown_task() {
        let scheduler = scheduler();
        let id = Uuid::new_v4();
        assert!(!scheduler.is_running(id).await);
        assert!(!scheduler.is_reviewing(id).await);
    }

    #[tokio::test]
    async fn stop_task_on_an_unknown_task_is_a_no_op_success() {
        let scheduler = scheduler();
        assert!(scheduler.stop_task(Uuid::new_v4()).await);
    }
}
