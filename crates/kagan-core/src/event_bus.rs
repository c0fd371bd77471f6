//! In-process domain event bus.
//!
//! Every mutation that a client might be polling for (`tasks.wait`,
//! `jobs.wait`) publishes here instead of the dispatcher threading a
//! callback through every service. Subscribers that fall behind just miss
//! old events — `tokio::sync::broadcast::Receiver::recv` surfaces a `Lagged`
//! error they can treat as "re-fetch the current state and keep waiting".

use chrono::{DateTime, Utc};
use tokio::sync::broadcast;
use uuid::Uuid;

use crate::types::{JobStatus, TaskStatus};

const CHANNEL_CAPACITY: usize = 1024;

#[derive(Debug, Clone)]
pub enum Event {
    TaskCreated {
        task_id: Uuid,
        project_id: Uuid,
    },
    TaskChanged {
        task_id: Uuid,
        project_id: Uuid,
        status: TaskStatus,
        updated_at: DateTime<Utc>,
    },
    TaskDeleted {
        task_id: Uuid,
        project_id: Uuid,
    },
    JobChanged {
        job_id: Uuid,
        task_id: Uuid,
        status: JobStatus,
        updated_at: DateTime<Utc>,
    },
    MergeCompleted {
        task_id: Uuid,
        success: bool,
    },
    WorkspaceClosed {
        workspace_id: Uuid,
    },
}

impl Event {
    pub fn task_id(&self) -> Option<Uuid> {
        match self {
            Event::TaskCreated { task_id, .. }
            | Event::TaskChanged { task_id, .. }
            | Event::TaskDeleted { task_id, .. }
            | Event::JobChanged { task_id, .. }
            | Event::MergeCompleted { task_id, .. } => Some(*task_id),
            Event::WorkspaceClosed { .. } => None,
        }
    }

    pub fn job_id(&self) -> Option<Uuid> {
        match self {
            Event::JobChanged { job_id, .. } => Some(*job_id),
            _ => None,
        }
    }
}

/// Cheaply cloneable handle; every service that mutates state holds one.
#[derive(Clone)]
pub struct EventBus {
    sender: broadcast::Sender<Event>,
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

impl EventBus {
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(CHANNEL_CAPACITY);
        Self { sender }
    }

    pub fn publish(&self, event: Event) {
        // No active subscribers is not an error — `tasks.wait` callers may
        // simply not be connected yet.
        let _ = self.sender.send(event);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.sender.subscribe()
    }
}

/// Waits for the next event matching `predicate`, or for `timeout` to
/// elapse. Lagged receivers are resubscribed transparently since callers
/// only care about "did a matching event occur", not total ordering.
pub async fn wait_for<F>(
    bus: &EventBus,
    timeout: std::time::Duration,
    mut predicate: F,
) -> Option<Event>
where
    F: FnMut(&Event) -> bool,
{
    let mut rx = bus.subscribe();
    let deadline = tokio::time::Instant::now() + timeout;
    loop {
        let remaining = deadline.saturating_duration_since(tokio::time::Instant::now());
        if remaining.is_zero() {
            return None;
        }
        match tokio::time::timeout(remaining, rx.recv()).await {
            Ok(Ok(event)) => {
                if predicate(&event) {
                    return Some(event);
                }
            }
            Ok(Err(broadcast::error::RecvError::Lagged(_))) => continue,
            Ok(Err(broadcast::error::RecvError::Closed)) => return None,
            Err(_elapsed) => return None,
        }
    }
}
