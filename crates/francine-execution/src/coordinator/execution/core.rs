use std::mem;
use std::time::Duration;

use log::{debug, info, warn};

use crate::coordinator::execution::state::{
    AdvanceContext, ExecutionAction, ExecutionSnapshot, ExecutionState, ReduceGroup,
};
use crate::coordinator::execution::ExecutionController;
use crate::id::{ExecutionName, SessionName, TaskName, WorkerName};
use crate::task::{ReduceInput, ResourceSource, Task, TaskPayload};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ReduceStage {
    Intermediate,
    Final,
}

impl ExecutionController {
    pub fn name(&self) -> &ExecutionName {
        &self.name
    }

    pub fn session(&self) -> &SessionName {
        &self.session
    }

    pub fn state(&self) -> ExecutionState {
        self.state
    }

    pub fn is_terminal(&self) -> bool {
        self.state.is_terminal()
    }

    /// Issues the first producing tasks.
    pub fn start(&mut self, ctx: &AdvanceContext) -> Vec<ExecutionAction> {
        info!(
            "execution {} started with parallel = {}",
            self.name, self.parallel
        );
        self.advance(ctx)
    }

    /// Handles the successful completion of a task reported by the worker.
    /// The weight is the number of producing units incorporated by a reducing task.
    pub fn task_finished(
        &mut self,
        task: &TaskName,
        worker: &WorkerName,
        elapsed: Duration,
        weight: Option<u64>,
        ctx: &AdvanceContext,
    ) -> Vec<ExecutionAction> {
        if self.is_terminal() {
            return vec![];
        }
        let mut actions = vec![];
        if self.producing_in_flight.remove(task) {
            self.time.producing += elapsed_millis(elapsed);
            self.producing_finished += 1;
            if self.state == ExecutionState::Fetching {
                self.state = ExecutionState::Producing;
            }
            self.unreduced.push(ReduceInput {
                task: task.clone(),
                worker: worker.clone(),
                weight: 1,
            });
            if !self.timeout_adapted {
                self.timeout_adapted = true;
                self.producing_timeout = elapsed
                    .saturating_mul(2)
                    .max(self.options.task_min_timeout);
                debug!(
                    "execution {} producing timeout is now {:?}",
                    self.name, self.producing_timeout
                );
                actions.push(ExecutionAction::AdjustTimeout(self.producing_timeout));
            }
        } else if let Some(group) = self.intermediate_reducing.remove(task) {
            self.time.reducing += elapsed_millis(elapsed);
            let expected = group.weight();
            let weight = weight.unwrap_or(expected).min(expected);
            if weight > 0 {
                self.reduced.push(ReduceInput {
                    task: task.clone(),
                    worker: worker.clone(),
                    weight,
                });
            }
            if weight < expected {
                warn!(
                    "intermediate reducing task {task} incorporated weight {weight} out of {expected}"
                );
                self.producing_target += expected - weight;
            }
        } else if self.is_final_reducing(task) {
            let Some((_, group)) = self.final_reducing.take() else {
                return vec![];
            };
            self.time.reducing += elapsed_millis(elapsed);
            let expected = group.weight();
            let weight = weight.unwrap_or(expected).min(expected);
            let output = ReduceInput {
                task: task.clone(),
                worker: worker.clone(),
                weight,
            };
            if weight == expected {
                return self.finish(output, ctx);
            }
            warn!(
                "final reducing task {task} incorporated weight {weight} out of {expected}"
            );
            if weight > 0 {
                self.reduced.push(output);
            }
            self.producing_target += expected - weight;
            self.state = ExecutionState::Producing;
        } else {
            debug!("ignored finished task {task} of execution {}", self.name);
            return vec![];
        }
        actions.extend(self.advance(ctx));
        actions
    }

    /// Handles a failed task, whether the failure is reported by the worker
    /// or injected by the coordinator.
    pub fn task_failed(
        &mut self,
        task: &TaskName,
        reason: &str,
        ctx: &AdvanceContext,
    ) -> Vec<ExecutionAction> {
        if self.is_terminal() {
            return vec![];
        }
        let mut actions = vec![];
        if self.producing_in_flight.remove(task) {
            warn!("producing task {task} failed: {reason}");
            self.producing_finished += 1;
            self.producing_failed += 1;
            self.producing_target += 1;
        } else if let Some(mut group) = self.intermediate_reducing.remove(task) {
            warn!("intermediate reducing task {task} failed: {reason}");
            group.attempts += 1;
            if group.attempts <= self.options.reducing_max_retries {
                actions.push(self.start_reducing(group, ReduceStage::Intermediate));
            } else {
                self.producing_target += group.weight();
            }
        } else if self.is_final_reducing(task) {
            let Some((_, mut group)) = self.final_reducing.take() else {
                return vec![];
            };
            warn!("final reducing task {task} failed: {reason}");
            group.attempts += 1;
            if group.attempts > self.options.reducing_max_retries {
                return self.fail(reason.to_string(), ctx);
            }
            return vec![self.start_reducing(group, ReduceStage::Final)];
        } else {
            debug!("ignored failed task {task} of execution {}", self.name);
            return vec![];
        }
        self.last_failure = Some(reason.to_string());
        actions.extend(self.advance(ctx));
        actions
    }

    /// Handles the report that a worker has fetched the session resources for the task.
    pub fn fetching_finished(
        &mut self,
        task: &TaskName,
        elapsed: Duration,
        ctx: &AdvanceContext,
    ) -> Vec<ExecutionAction> {
        if self.is_terminal() || !self.producing_in_flight.contains(task) {
            return vec![];
        }
        self.time.fetching += elapsed_millis(elapsed);
        if self.state == ExecutionState::Fetching {
            self.state = ExecutionState::Producing;
        }
        self.advance(ctx)
    }

    pub fn snapshot(&self) -> ExecutionSnapshot {
        ExecutionSnapshot {
            name: self.name.clone(),
            session_name: self.session.clone(),
            parallel: self.parallel,
            state: self.state,
            progress: self.producing_finished - self.producing_failed,
            time: self.time,
            result: self.result.clone(),
            error: self.error.clone(),
        }
    }

    /// Moves the execution forward after any change of its counters.
    fn advance(&mut self, ctx: &AdvanceContext) -> Vec<ExecutionAction> {
        if self.is_terminal() {
            return vec![];
        }
        if self.producing_failed > self.producing_fail_limit {
            let reason = self
                .last_failure
                .clone()
                .unwrap_or_else(|| "too many producing tasks failed".to_string());
            return self.fail(reason, ctx);
        }
        if self.final_reducing.is_some() {
            return vec![];
        }

        let mut actions = vec![];
        if self.unreduced.len() >= self.reducing_unit
            || (self.producing_done() && !self.unreduced.is_empty())
        {
            let group = ReduceGroup::new(mem::take(&mut self.unreduced));
            actions.push(self.start_reducing(group, ReduceStage::Intermediate));
        }

        if self.producing_done() && self.intermediate_reducing.is_empty() {
            if self.reduced.is_empty() {
                return self.fail("no producing result to reduce".to_string(), ctx);
            }
            self.state = ExecutionState::FinalReducing;
            let group = ReduceGroup::new(mem::take(&mut self.reduced));
            actions.push(self.start_reducing(group, ReduceStage::Final));
            return actions;
        }

        let in_flight = self.producing_in_flight.len() as u64;
        let mut count = self
            .producing_target
            .saturating_sub(self.producing_finished)
            .saturating_sub(in_flight);
        if self.fetch_resources && (self.state == ExecutionState::Fetching || !ctx.cache_warm) {
            count = if in_flight == 0 { count.min(1) } else { 0 };
        }
        for _ in 0..count {
            actions.push(self.start_producing());
        }
        actions
    }

    fn producing_done(&self) -> bool {
        self.producing_finished >= self.producing_target && self.producing_in_flight.is_empty()
    }

    fn is_final_reducing(&self, task: &TaskName) -> bool {
        self.final_reducing
            .as_ref()
            .is_some_and(|(name, _)| name == task)
    }

    fn next_task_name(&mut self) -> TaskName {
        let name = format!("{}-task{}", self.name, self.next_task);
        self.next_task += 1;
        name.into()
    }

    fn start_producing(&mut self) -> ExecutionAction {
        let name = self.next_task_name();
        let seed = self.next_seed;
        self.next_seed += 1;
        let source = if self.fetch_resources {
            ResourceSource::External
        } else {
            ResourceSource::None
        };
        self.producing_in_flight.insert(name.clone());
        ExecutionAction::Enqueue(Task {
            name,
            session: self.session.clone(),
            execution: self.name.clone(),
            payload: TaskPayload::Producing { seed, source },
            timeout: self.producing_timeout,
        })
    }

    fn start_reducing(&mut self, group: ReduceGroup, stage: ReduceStage) -> ExecutionAction {
        let name = self.next_task_name();
        let task = Task {
            name: name.clone(),
            session: self.session.clone(),
            execution: self.name.clone(),
            payload: TaskPayload::Reducing {
                inputs: group.inputs.clone(),
            },
            timeout: self.options.task_timeout,
        };
        match stage {
            ReduceStage::Intermediate => {
                self.intermediate_reducing.insert(name, group);
            }
            ReduceStage::Final => {
                self.final_reducing = Some((name, group));
            }
        }
        ExecutionAction::Enqueue(task)
    }

    fn finish(&mut self, output: ReduceInput, ctx: &AdvanceContext) -> Vec<ExecutionAction> {
        self.state = ExecutionState::Finished;
        self.time.total = elapsed_millis(ctx.now.saturating_duration_since(self.started_at));
        info!(
            "execution {} finished; fetching: {}ms producing: {}ms reducing: {}ms total: {}ms",
            self.name, self.time.fetching, self.time.producing, self.time.reducing, self.time.total
        );
        self.result = Some(output.clone());
        vec![ExecutionAction::Finish(output)]
    }

    fn fail(&mut self, reason: String, ctx: &AdvanceContext) -> Vec<ExecutionAction> {
        self.state = ExecutionState::Failed;
        self.time.total = elapsed_millis(ctx.now.saturating_duration_since(self.started_at));
        warn!("execution {} failed: {reason}", self.name);
        self.error = Some(reason.clone());
        vec![ExecutionAction::Fail(reason)]
    }
}

fn elapsed_millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

#[cfg(test)]
mod tests {
    use std::time::Instant;

    use francine_common::config::AppConfig;

    use super::*;
    use crate::coordinator::execution::ExecutionOptions;
    use crate::coordinator::CoordinatorOptions;
    use crate::error::ExecutionResult;
    use crate::task::TaskKind;

    struct Harness {
        controller: ExecutionController,
        ctx: AdvanceContext,
        /// The tasks enqueued so far and not yet reported.
        queue: Vec<Task>,
        adjusted: Vec<Duration>,
        outcome: Option<Result<ReduceInput, String>>,
    }

    impl Harness {
        fn new(parallel: u64, fetch_resources: bool) -> ExecutionResult<Self> {
            let options = CoordinatorOptions::try_from(&AppConfig::load(None)?)?;
            let now = Instant::now();
            let controller = ExecutionController::new(
                ExecutionOptions::from(&options),
                ExecutionName::from("e1"),
                SessionName::from("s1"),
                parallel,
                fetch_resources,
                now,
            );
            let mut harness = Self {
                controller,
                ctx: AdvanceContext {
                    cache_warm: false,
                    now,
                },
                queue: vec![],
                adjusted: vec![],
                outcome: None,
            };
            let actions = harness.controller.start(&harness.ctx);
            harness.apply(actions);
            Ok(harness)
        }

        fn apply(&mut self, actions: Vec<ExecutionAction>) {
            for action in actions {
                match action {
                    ExecutionAction::Enqueue(task) => self.queue.push(task),
                    ExecutionAction::AdjustTimeout(timeout) => self.adjusted.push(timeout),
                    ExecutionAction::Finish(output) => {
                        assert!(self.outcome.is_none());
                        self.outcome = Some(Ok(output));
                    }
                    ExecutionAction::Fail(reason) => {
                        assert!(self.outcome.is_none());
                        self.outcome = Some(Err(reason));
                    }
                }
            }
        }

        fn pending(&self, kind: TaskKind) -> Vec<TaskName> {
            self.queue
                .iter()
                .filter(|x| x.kind() == kind)
                .map(|x| x.name.clone())
                .collect()
        }

        fn take(&mut self, name: &TaskName) -> Task {
            let position = self.queue.iter().position(|x| &x.name == name);
            match position {
                Some(position) => self.queue.remove(position),
                None => panic!("task {name} is not enqueued"),
            }
        }

        /// Reports the task as finished with the full expected weight.
        fn finish(&mut self, name: &TaskName) {
            let weight = self.take(name).expected_weight();
            self.finish_with_weight(name, weight);
        }

        fn finish_with_weight(&mut self, name: &TaskName, weight: u64) {
            let actions = self.controller.task_finished(
                name,
                &WorkerName::from("w1"),
                Duration::from_secs(2),
                Some(weight),
                &self.ctx,
            );
            self.apply(actions);
        }

        fn fail(&mut self, name: &TaskName) {
            self.take(name);
            let actions = self.controller.task_failed(name, "timeout", &self.ctx);
            self.apply(actions);
        }

        /// Finishes every enqueued task, in order, until nothing is left to run.
        fn drain(&mut self) {
            while let Some(task) = self.queue.first() {
                let name = task.name.clone();
                self.finish(&name);
            }
        }
    }

    fn inputs(task: &Task) -> Vec<u64> {
        match &task.payload {
            TaskPayload::Reducing { inputs } => inputs.iter().map(|x| x.weight).collect(),
            TaskPayload::Producing { .. } => vec![],
        }
    }

    #[test]
    fn test_small_execution_without_failures() -> ExecutionResult<()> {
        let mut h = Harness::new(4, false)?;
        let producing = h.pending(TaskKind::Producing);
        assert_eq!(producing.len(), 4);
        assert_eq!(h.controller.state(), ExecutionState::Producing);

        h.finish(&producing[0]);
        assert!(h.pending(TaskKind::Reducing).is_empty());
        h.finish(&producing[1]);
        let reducing = h.pending(TaskKind::Reducing);
        assert_eq!(reducing.len(), 1);
        h.finish(&producing[2]);
        h.finish(&producing[3]);
        let reducing = h.pending(TaskKind::Reducing);
        assert_eq!(reducing.len(), 2);
        for task in h.queue.iter() {
            assert_eq!(inputs(task), vec![1, 1]);
        }

        h.finish(&reducing[0]);
        assert_eq!(h.pending(TaskKind::Reducing).len(), 1);
        h.finish(&reducing[1]);
        assert_eq!(h.controller.state(), ExecutionState::FinalReducing);
        let final_reducing = h.pending(TaskKind::Reducing);
        assert_eq!(final_reducing.len(), 1);
        assert_eq!(inputs(&h.queue[0]), vec![2, 2]);

        h.finish(&final_reducing[0]);
        assert_eq!(h.controller.state(), ExecutionState::Finished);
        let result = h.outcome.clone().and_then(|x| x.ok());
        assert_eq!(result.map(|x| x.weight), Some(4));
        let snapshot = h.controller.snapshot();
        assert_eq!(snapshot.progress, 4);
        assert_eq!(snapshot.time.producing, 8000);
        assert_eq!(snapshot.time.reducing, 6000);
        Ok(())
    }

    #[test]
    fn test_producing_failure_is_compensated() -> ExecutionResult<()> {
        let mut h = Harness::new(4, false)?;
        let producing = h.pending(TaskKind::Producing);
        h.finish(&producing[0]);
        h.fail(&producing[1]);
        assert!(h.outcome.is_none());
        // The failed unit is replaced by a fifth producing task.
        let replacement = h.pending(TaskKind::Producing);
        assert_eq!(replacement.len(), 3);
        assert!(!producing.contains(&replacement[2]));
        h.drain();
        let result = h.outcome.clone().and_then(|x| x.ok());
        assert_eq!(result.map(|x| x.weight), Some(4));
        Ok(())
    }

    #[test]
    fn test_fail_limit_terminates_execution() -> ExecutionResult<()> {
        let mut h = Harness::new(4, false)?;
        let producing = h.pending(TaskKind::Producing);
        h.fail(&producing[0]);
        assert!(h.outcome.is_none());
        h.fail(&producing[1]);
        assert_eq!(h.outcome, Some(Err("timeout".to_string())));
        assert_eq!(h.controller.state(), ExecutionState::Failed);
        assert_eq!(h.controller.snapshot().error.as_deref(), Some("timeout"));

        // Reports after the terminal state have no effect.
        let actions = h.controller.task_finished(
            &producing[2],
            &WorkerName::from("w1"),
            Duration::from_secs(1),
            Some(1),
            &h.ctx,
        );
        assert!(actions.is_empty());
        Ok(())
    }

    #[test]
    fn test_intermediate_partial_weight() -> ExecutionResult<()> {
        let mut h = Harness::new(4, false)?;
        let producing = h.pending(TaskKind::Producing);
        h.finish(&producing[0]);
        h.finish(&producing[1]);
        let reducing = h.pending(TaskKind::Reducing);
        h.take(&reducing[0]);
        h.finish_with_weight(&reducing[0], 1);
        // One replacement unit is scheduled for the missing weight.
        assert_eq!(h.pending(TaskKind::Producing).len(), 3);
        h.drain();
        let result = h.outcome.clone().and_then(|x| x.ok());
        assert_eq!(result.map(|x| x.weight), Some(4));
        Ok(())
    }

    #[test]
    fn test_final_reducing_short_weight() -> ExecutionResult<()> {
        let mut h = Harness::new(4, false)?;
        for name in h.pending(TaskKind::Producing) {
            h.finish(&name);
        }
        for name in h.pending(TaskKind::Reducing) {
            h.finish(&name);
        }
        let final_reducing = h.pending(TaskKind::Reducing);
        assert_eq!(final_reducing.len(), 1);
        h.take(&final_reducing[0]);
        h.finish_with_weight(&final_reducing[0], 3);
        assert_eq!(h.controller.state(), ExecutionState::Producing);
        assert!(h.outcome.is_none());
        assert_eq!(h.pending(TaskKind::Producing).len(), 1);

        h.drain();
        let result = h.outcome.clone().and_then(|x| x.ok());
        assert_eq!(result.map(|x| x.weight), Some(4));
        Ok(())
    }

    #[test]
    fn test_reducing_retries() -> ExecutionResult<()> {
        let mut h = Harness::new(4, false)?;
        for name in h.pending(TaskKind::Producing) {
            h.finish(&name);
        }
        // An intermediate group is retried three times before it is regenerated.
        let first = h.pending(TaskKind::Reducing)[0].clone();
        h.fail(&first);
        for _ in 0..3 {
            let retry = h.pending(TaskKind::Reducing);
            assert_eq!(retry.len(), 2);
            h.fail(&retry[1]);
        }
        assert_eq!(h.pending(TaskKind::Reducing).len(), 1);
        assert_eq!(h.pending(TaskKind::Producing).len(), 2);
        assert!(h.outcome.is_none());

        for name in h.pending(TaskKind::Producing) {
            h.finish(&name);
        }
        for name in h.pending(TaskKind::Reducing) {
            h.finish(&name);
        }
        let final_reducing = h.pending(TaskKind::Reducing);
        assert_eq!(final_reducing.len(), 1);
        assert_eq!(inputs(&h.queue[0]), vec![2, 2]);

        // The final reduction fails for good after three retries.
        for _ in 0..4 {
            assert!(h.outcome.is_none());
            let name = h.pending(TaskKind::Reducing)[0].clone();
            h.fail(&name);
        }
        assert_eq!(h.outcome, Some(Err("timeout".to_string())));
        assert!(h.queue.is_empty());
        Ok(())
    }

    #[test]
    fn test_fetching_throttles_producing() -> ExecutionResult<()> {
        let mut h = Harness::new(9, true)?;
        assert_eq!(h.controller.state(), ExecutionState::Fetching);
        let producing = h.pending(TaskKind::Producing);
        assert_eq!(producing.len(), 1);
        assert!(matches!(
            h.queue[0].payload,
            TaskPayload::Producing {
                seed: 1,
                source: ResourceSource::External
            }
        ));

        // A failed fetch is replaced by another single producing task.
        h.ctx.cache_warm = false;
        h.fail(&producing[0]);
        assert_eq!(h.controller.state(), ExecutionState::Fetching);
        let producing = h.pending(TaskKind::Producing);
        assert_eq!(producing.len(), 1);

        h.ctx.cache_warm = true;
        let actions =
            h.controller
                .fetching_finished(&producing[0], Duration::from_millis(500), &h.ctx);
        h.apply(actions);
        assert_eq!(h.controller.state(), ExecutionState::Producing);
        // Nine of the ten units are left once the failed one is replaced.
        assert_eq!(h.pending(TaskKind::Producing).len(), 9);
        assert_eq!(h.controller.snapshot().time.fetching, 500);
        Ok(())
    }

    #[test]
    fn test_adaptive_timeout() -> ExecutionResult<()> {
        let mut h = Harness::new(16, false)?;
        let producing = h.pending(TaskKind::Producing);
        assert!(h.queue.iter().all(|x| x.timeout == Duration::from_secs(300)));
        h.finish(&producing[0]);
        assert_eq!(h.adjusted, vec![Duration::from_secs(4)]);
        h.fail(&producing[1]);
        let replacement = h.queue.last().map(|x| (x.kind(), x.timeout));
        assert_eq!(
            replacement,
            Some((TaskKind::Producing, Duration::from_secs(4)))
        );
        h.finish(&producing[2]);
        assert_eq!(h.adjusted.len(), 1);
        Ok(())
    }

    #[test]
    fn test_unknown_task_is_ignored() -> ExecutionResult<()> {
        let mut h = Harness::new(4, false)?;
        let unknown = TaskName::from("e2-task1");
        let actions = h.controller.task_finished(
            &unknown,
            &WorkerName::from("w1"),
            Duration::from_secs(1),
            Some(1),
            &h.ctx,
        );
        assert!(actions.is_empty());
        let actions = h.controller.task_failed(&unknown, "timeout", &h.ctx);
        assert!(actions.is_empty());
        assert_eq!(h.controller.snapshot().progress, 0);
        Ok(())
    }
}
