mod core;
mod options;
mod state;

use std::collections::{HashMap, HashSet};
use std::time::{Duration, Instant};

pub use options::ExecutionOptions;
use state::ReduceGroup;
pub use state::{AdvanceContext, ExecutionAction, ExecutionSnapshot, ExecutionState, ExecutionTime};

use crate::id::{ExecutionName, SessionName, TaskName};
use crate::task::ReduceInput;

/// Drives one execution from its first producing task to the final reduction.
///
/// Lost work is never restarted as a whole. A failed producing task, an intermediate
/// reduction that incorporates less weight than it was given, or an intermediate reduction
/// that fails too often all increase the producing target by the missing weight,
/// so that new producing tasks regenerate exactly the missing contribution.
pub struct ExecutionController {
    options: ExecutionOptions,
    name: ExecutionName,
    session: SessionName,
    parallel: u64,
    /// Whether the session declares external resources to fetch.
    fetch_resources: bool,
    state: ExecutionState,
    reducing_unit: usize,
    producing_fail_limit: u64,
    producing_target: u64,
    /// The number of finished producing tasks, including failed ones.
    producing_finished: u64,
    producing_failed: u64,
    producing_in_flight: HashSet<TaskName>,
    unreduced: Vec<ReduceInput>,
    intermediate_reducing: HashMap<TaskName, ReduceGroup>,
    reduced: Vec<ReduceInput>,
    final_reducing: Option<(TaskName, ReduceGroup)>,
    producing_timeout: Duration,
    timeout_adapted: bool,
    next_seed: u64,
    next_task: u64,
    last_failure: Option<String>,
    time: ExecutionTime,
    started_at: Instant,
    result: Option<ReduceInput>,
    error: Option<String>,
}

impl ExecutionController {
    pub fn new(
        options: ExecutionOptions,
        name: ExecutionName,
        session: SessionName,
        parallel: u64,
        fetch_resources: bool,
        now: Instant,
    ) -> Self {
        let reducing_unit = ((parallel as f64).sqrt().floor() as usize).max(1);
        let producing_fail_limit =
            ((parallel as f64 * options.producing_fail_ratio).floor() as u64).max(1);
        let producing_timeout = options.task_timeout;
        let state = if fetch_resources {
            ExecutionState::Fetching
        } else {
            ExecutionState::Producing
        };
        Self {
            options,
            name,
            session,
            parallel,
            fetch_resources,
            state,
            reducing_unit,
            producing_fail_limit,
            producing_target: parallel,
            producing_finished: 0,
            producing_failed: 0,
            producing_in_flight: HashSet::new(),
            unreduced: vec![],
            intermediate_reducing: HashMap::new(),
            reduced: vec![],
            final_reducing: None,
            producing_timeout,
            timeout_adapted: false,
            next_seed: 1,
            next_task: 1,
            last_failure: None,
            time: ExecutionTime::default(),
            started_at: now,
            result: None,
            error: None,
        }
    }
}
