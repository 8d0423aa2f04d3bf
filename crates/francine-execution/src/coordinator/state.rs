use serde::Serialize;

use crate::coordinator::scheduler::WorkerState;
use crate::id::{ExecutionName, TaskName, WorkerName};

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkerSnapshot {
    pub name: WorkerName,
    pub host: String,
    pub port: u16,
    pub resource_port: u16,
    /// Whether the worker takes part in scheduling.
    pub alive: bool,
    /// The number of unanswered pings, or `None` if the worker is condemned.
    pub outstanding_pongs: Option<u32>,
    pub state: Option<WorkerState>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ClusterSnapshot {
    pub coordinator_port: Option<u16>,
    pub workers: Vec<WorkerSnapshot>,
    pub pending_tasks: usize,
    pub in_flight_tasks: Vec<TaskName>,
    pub running_executions: Vec<ExecutionName>,
}
