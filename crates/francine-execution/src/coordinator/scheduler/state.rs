use std::time::{Duration, Instant};

use serde::Serialize;

use crate::id::{DispatchId, SessionName, TaskName, WorkerName};
use crate::task::{Task, TaskKind};

/// Resolves resource affinity for producing tasks.
pub trait WorkerLookup {
    /// Returns a live worker holding a warm cache for the session, if any,
    /// and moves it to the back of the affinity order.
    fn take_cached_worker(&mut self, session: &SessionName) -> Option<WorkerName>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "state", content = "kind", rename_all = "camelCase")]
pub enum WorkerState {
    Free,
    Busy(TaskKind),
}

#[derive(Debug, Clone)]
pub struct InFlightTask {
    pub task: Task,
    pub worker: WorkerName,
    pub dispatch: DispatchId,
    pub dispatched_at: Instant,
}

/// A task assigned to a worker, to be sent with a `run` request.
#[derive(Debug, Clone)]
pub struct TaskDispatch {
    pub worker: WorkerName,
    pub task: Task,
    pub dispatch: DispatchId,
}

/// A timer to set for checking whether an in-flight task has timed out.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TimeoutProbe {
    pub task: TaskName,
    pub dispatch: DispatchId,
    pub delay: Duration,
}

#[derive(Debug)]
pub enum TimeoutCheck {
    /// The task has timed out and its worker has left the pool.
    Expired(InFlightTask),
    /// The task may still run for the given duration.
    Remaining(Duration),
    /// The dispatch is no longer in flight.
    Stale,
}
