use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::id::{ExecutionName, SessionName, TaskName, WorkerName};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TaskKind {
    Producing,
    Reducing,
}

impl fmt::Display for TaskKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TaskKind::Producing => write!(f, "PRODUCING"),
            TaskKind::Reducing => write!(f, "REDUCING"),
        }
    }
}

/// Where a producing task obtains the session resources from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResourceSource {
    /// The session declares no resources.
    None,
    /// The resources are fetched from their original location.
    External,
    /// The resources are copied from a worker that already holds them.
    Cached(WorkerName),
}

/// A weighted partial result that is consumed by a reducing task.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReduceInput {
    pub task: TaskName,
    pub worker: WorkerName,
    pub weight: u64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskPayload {
    Producing { seed: u64, source: ResourceSource },
    Reducing { inputs: Vec<ReduceInput> },
}

#[derive(Debug, Clone, PartialEq)]
pub struct Task {
    pub name: TaskName,
    pub session: SessionName,
    pub execution: ExecutionName,
    pub payload: TaskPayload,
    pub timeout: Duration,
}

impl Task {
    pub fn kind(&self) -> TaskKind {
        match self.payload {
            TaskPayload::Producing { .. } => TaskKind::Producing,
            TaskPayload::Reducing { .. } => TaskKind::Reducing,
        }
    }

    /// The number of producing units the task result is expected to represent.
    pub fn expected_weight(&self) -> u64 {
        match &self.payload {
            TaskPayload::Producing { .. } => 1,
            TaskPayload::Reducing { inputs } => inputs.iter().map(|x| x.weight).sum(),
        }
    }
}
