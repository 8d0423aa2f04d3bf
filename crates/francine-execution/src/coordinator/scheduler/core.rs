use std::time::{Duration, Instant};

use log::{debug, warn};

use crate::coordinator::scheduler::state::{
    InFlightTask, TaskDispatch, TimeoutCheck, TimeoutProbe, WorkerLookup, WorkerState,
};
use crate::coordinator::scheduler::TaskScheduler;
use crate::error::ExecutionResult;
use crate::id::{DispatchId, ExecutionName, TaskName, WorkerName};
use crate::task::{ResourceSource, Task, TaskKind, TaskPayload};

impl TaskScheduler {
    /// Adds the task to the pending queue.
    /// Reducing tasks may overtake pending producing tasks so that partial results
    /// are drained early.
    pub fn enqueue(&mut self, task: Task) {
        if self.options.prioritize_reducing && task.kind() == TaskKind::Reducing {
            let position = self
                .pending
                .iter()
                .position(|x| x.kind() == TaskKind::Producing);
            if let Some(position) = position {
                self.pending.insert(position, task);
                return;
            }
        }
        self.pending.push_back(task);
    }

    /// Pairs pending tasks with free workers in queue order until either runs out.
    pub fn dispatch(
        &mut self,
        lookup: &mut dyn WorkerLookup,
        now: Instant,
    ) -> ExecutionResult<Vec<TaskDispatch>> {
        let mut out = vec![];
        while !self.pending.is_empty() && !self.free.is_empty() {
            let (Some(mut task), Some(worker)) = (self.pending.pop_front(), self.free.pop_front())
            else {
                break;
            };
            Self::assign_affinity(&mut task, lookup);
            let dispatch = self.dispatch_id_generator.next()?;
            debug!(
                "dispatching {} task {} to worker {worker}",
                task.kind(),
                task.name
            );
            self.busy.insert(worker.clone(), task.kind());
            self.in_flight.insert(
                task.name.clone(),
                InFlightTask {
                    task: task.clone(),
                    worker: worker.clone(),
                    dispatch,
                    dispatched_at: now,
                },
            );
            out.push(TaskDispatch {
                worker,
                task,
                dispatch,
            });
        }
        Ok(out)
    }

    fn assign_affinity(task: &mut Task, lookup: &mut dyn WorkerLookup) {
        if let TaskPayload::Producing { source, .. } = &mut task.payload {
            if *source == ResourceSource::External {
                if let Some(worker) = lookup.take_cached_worker(&task.session) {
                    *source = ResourceSource::Cached(worker);
                }
            }
        }
    }

    /// Removes the finished or failed task reported by the worker
    /// and returns the worker to the free pool.
    /// Reports that do not match the in-flight dispatch are ignored.
    pub fn complete_task(&mut self, worker: &WorkerName, task: &TaskName) -> Option<InFlightTask> {
        match self.in_flight.get(task) {
            Some(x) if &x.worker == worker => {}
            Some(x) => {
                warn!(
                    "ignored report of task {task} from worker {worker}, which was dispatched to {}",
                    x.worker
                );
                return None;
            }
            None => {
                debug!("ignored report of task {task} that is not in flight");
                return None;
            }
        }
        let entry = self.in_flight.shift_remove(task)?;
        if self.busy.shift_remove(worker).is_some() {
            self.free.push_back(worker.clone());
        }
        Some(entry)
    }

    pub fn in_flight_task(&self, task: &TaskName) -> Option<&InFlightTask> {
        self.in_flight.get(task)
    }

    pub fn in_flight_tasks(&self) -> impl Iterator<Item = &InFlightTask> {
        self.in_flight.values()
    }

    /// Checks the dispatch against the current timeout of its task.
    /// An expired task is removed together with its worker, which stays out of the pool
    /// until it is added back by [`TaskScheduler::update_worker_pool`].
    pub fn expire_task(&mut self, task: &TaskName, dispatch: DispatchId, now: Instant) -> TimeoutCheck {
        let Some(entry) = self.in_flight.get(task) else {
            return TimeoutCheck::Stale;
        };
        if entry.dispatch != dispatch {
            return TimeoutCheck::Stale;
        }
        let elapsed = now.saturating_duration_since(entry.dispatched_at);
        if elapsed < entry.task.timeout {
            return TimeoutCheck::Remaining(entry.task.timeout - elapsed);
        }
        match self.abort_task(task, dispatch) {
            Some(entry) => TimeoutCheck::Expired(entry),
            None => TimeoutCheck::Stale,
        }
    }

    /// Removes the dispatch whose worker could not run it, and drops the worker from the pool.
    pub fn abort_task(&mut self, task: &TaskName, dispatch: DispatchId) -> Option<InFlightTask> {
        if self.in_flight.get(task)?.dispatch != dispatch {
            return None;
        }
        let entry = self.in_flight.shift_remove(task)?;
        self.busy.shift_remove(&entry.worker);
        self.free.retain(|x| x != &entry.worker);
        Some(entry)
    }

    /// Reconciles the worker pool against the live workers.
    /// New workers join the free pool, and busy workers keep their task kind.
    /// The in-flight tasks of the workers that left are returned.
    pub fn update_worker_pool<'a>(
        &mut self,
        members: impl IntoIterator<Item = &'a WorkerName>,
    ) -> Vec<InFlightTask> {
        let members = members.into_iter().collect::<Vec<_>>();
        self.free.retain(|x| members.contains(&x));
        let lost = self
            .busy
            .keys()
            .filter(|x| !members.contains(x))
            .cloned()
            .collect::<Vec<_>>();
        for worker in &lost {
            self.busy.shift_remove(worker);
        }
        let orphans = self
            .in_flight
            .iter()
            .filter(|(_, x)| lost.contains(&x.worker))
            .map(|(name, _)| name.clone())
            .collect::<Vec<_>>();
        let orphans = orphans
            .into_iter()
            .filter_map(|x| self.in_flight.shift_remove(&x))
            .collect();
        for worker in members {
            if !self.busy.contains_key(worker) && !self.free.contains(worker) {
                self.free.push_back(worker.clone());
            }
        }
        orphans
    }

    /// Drops the pending tasks of the execution and returns how many were dropped.
    pub fn exclude_execution(&mut self, execution: &ExecutionName) -> usize {
        let before = self.pending.len();
        self.pending.retain(|x| &x.execution != execution);
        before - self.pending.len()
    }

    /// Applies a new timeout to the pending and in-flight producing tasks of the execution.
    /// A probe is returned for every in-flight task so that a shorter timeout takes effect.
    pub fn retime_execution(
        &mut self,
        execution: &ExecutionName,
        timeout: Duration,
        now: Instant,
    ) -> Vec<TimeoutProbe> {
        let producing = |task: &Task| {
            &task.execution == execution && task.kind() == TaskKind::Producing
        };
        for task in self.pending.iter_mut().filter(|x| producing(x)) {
            task.timeout = timeout;
        }
        self.in_flight
            .values_mut()
            .filter(|x| producing(&x.task))
            .map(|x| {
                x.task.timeout = timeout;
                let elapsed = now.saturating_duration_since(x.dispatched_at);
                TimeoutProbe {
                    task: x.task.name.clone(),
                    dispatch: x.dispatch,
                    delay: timeout.saturating_sub(elapsed),
                }
            })
            .collect()
    }

    pub fn worker_state(&self, worker: &WorkerName) -> Option<WorkerState> {
        if let Some(kind) = self.busy.get(worker) {
            Some(WorkerState::Busy(*kind))
        } else if self.free.contains(worker) {
            Some(WorkerState::Free)
        } else {
            None
        }
    }

    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    pub fn pending_tasks(&self) -> impl Iterator<Item = &Task> {
        self.pending.iter()
    }
}
