use std::time::{Duration, Instant};

use serde::Serialize;

use crate::id::{ExecutionName, SessionName};
use crate::task::{ReduceInput, Task};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ExecutionState {
    /// Only one producing task runs until the session resources are cached on a worker.
    Fetching,
    /// Producing tasks fan out and their outputs are reduced in intermediate groups.
    Producing,
    FinalReducing,
    Finished,
    Failed,
}

impl ExecutionState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, ExecutionState::Finished | ExecutionState::Failed)
    }
}

/// What the execution controller needs to know about the rest of the coordinator
/// when it decides what to run next.
#[derive(Debug, Clone, Copy)]
pub struct AdvanceContext {
    /// Whether a live worker holds a warm resource cache for the session.
    pub cache_warm: bool,
    pub now: Instant,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ExecutionAction {
    Enqueue(Task),
    /// Applies a new timeout to the pending and running producing tasks.
    AdjustTimeout(Duration),
    Finish(ReduceInput),
    Fail(String),
}

/// The inputs of a reducing task, kept for retrying the task.
#[derive(Debug, Clone)]
pub(super) struct ReduceGroup {
    pub inputs: Vec<ReduceInput>,
    pub attempts: usize,
}

impl ReduceGroup {
    pub fn new(inputs: Vec<ReduceInput>) -> Self {
        Self {
            inputs,
            attempts: 0,
        }
    }

    pub fn weight(&self) -> u64 {
        self.inputs.iter().map(|x| x.weight).sum()
    }
}

/// Phase times in milliseconds.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionTime {
    pub fetching: u64,
    pub producing: u64,
    pub reducing: u64,
    /// The wall-clock time from creation to the terminal state.
    pub total: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionSnapshot {
    pub name: ExecutionName,
    pub session_name: SessionName,
    pub parallel: u64,
    pub state: ExecutionState,
    pub progress: u64,
    pub time: ExecutionTime,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<ReduceInput>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}
