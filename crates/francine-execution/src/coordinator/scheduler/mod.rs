mod core;
mod options;
mod state;

use std::collections::VecDeque;

use indexmap::IndexMap;
pub use options::TaskSchedulerOptions;
pub use state::{InFlightTask, TaskDispatch, TimeoutCheck, TimeoutProbe, WorkerLookup, WorkerState};

use crate::id::{DispatchId, IdGenerator, TaskName, WorkerName};
use crate::task::{Task, TaskKind};

/// The pending task queue and the free/busy partition of the live workers.
pub struct TaskScheduler {
    options: TaskSchedulerOptions,
    pending: VecDeque<Task>,
    in_flight: IndexMap<TaskName, InFlightTask>,
    free: VecDeque<WorkerName>,
    busy: IndexMap<WorkerName, TaskKind>,
    dispatch_id_generator: IdGenerator<DispatchId>,
}

impl TaskScheduler {
    pub fn new(options: TaskSchedulerOptions) -> Self {
        Self {
            options,
            pending: VecDeque::new(),
            in_flight: IndexMap::new(),
            free: VecDeque::new(),
            busy: IndexMap::new(),
            dispatch_id_generator: IdGenerator::new(),
        }
    }
}
