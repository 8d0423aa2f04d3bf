use std::mem;
use std::sync::Arc;
use std::time::{Duration, Instant};

use francine_server::actor::{ActorAction, ActorContext};
use log::{debug, error, info, warn};
use tokio::sync::oneshot;

use crate::cluster::WorkerInstance;
use crate::coordinator::actor::CoordinatorActor;
use crate::coordinator::execution::{
    AdvanceContext, ExecutionAction, ExecutionController, ExecutionOptions, ExecutionSnapshot,
};
use crate::coordinator::registry::PongOutcome;
use crate::coordinator::scheduler::{TaskDispatch, TimeoutCheck};
use crate::coordinator::session::{ExecutionRequest, SessionOptions};
use crate::coordinator::state::{ClusterSnapshot, WorkerSnapshot};
use crate::coordinator::CoordinatorEvent;
use crate::error::{ExecutionError, ExecutionResult};
use crate::id::{DispatchId, ExecutionName, SessionName, TaskName, WorkerName};
use crate::protocol::{
    PingParams, ReduceInputMessage, ResourceSourceMessage, TaskMessage, WorkerLog,
};
use crate::task::{ResourceSource, Task, TaskPayload};

impl CoordinatorActor {
    pub(super) fn handle_server_ready(
        &mut self,
        _ctx: &mut ActorContext<Self>,
        port: u16,
        signal: oneshot::Sender<()>,
    ) -> ActorAction {
        let server = mem::take(&mut self.server);
        self.server = match server.ready(signal, port) {
            Ok(x) => x,
            Err(e) => return ActorAction::fail(e),
        };
        info!("coordinator server is ready on port {port}");
        ActorAction::Continue
    }

    pub(super) fn handle_reconcile_workers(&mut self, ctx: &mut ActorContext<Self>) -> ActorAction {
        let provider = Arc::clone(&self.provider);
        let handle = ctx.handle().clone();
        ctx.spawn(async move {
            let instances = provider.list_instances().await;
            let _ = handle
                .send(CoordinatorEvent::InstancesListed { instances })
                .await;
        });
        ctx.send_with_delay(
            CoordinatorEvent::ReconcileWorkers,
            self.options().manage_interval,
        );
        ActorAction::Continue
    }

    pub(super) fn handle_instances_listed(
        &mut self,
        ctx: &mut ActorContext<Self>,
        instances: ExecutionResult<Vec<WorkerInstance>>,
    ) -> ActorAction {
        let instances = match instances {
            Ok(x) => x,
            Err(e) => return ActorAction::warn(format!("failed to list worker instances: {e}")),
        };
        let outcome = self.registry.reconcile(instances);
        let master = self.coordinator_address();
        for instance in outcome.pings {
            let transport = Arc::clone(&self.transport);
            let params = PingParams {
                worker_name: instance.name.clone(),
                master: master.clone(),
            };
            ctx.spawn(async move {
                // The missing pong is what counts, so the error is only logged.
                if let Err(e) = transport.ping(&instance, params).await {
                    debug!("failed to ping worker {}: {e}", instance.name);
                }
            });
        }
        for name in outcome.removed {
            info!("worker {name} left the cluster");
        }
        for name in outcome.condemned {
            warn!("worker {name} is condemned after missing too many pongs");
            if self.options().destroy_zombies {
                let provider = Arc::clone(&self.provider);
                ctx.spawn(async move {
                    if let Err(e) = provider.destroy_instance(&name).await {
                        error!("failed to destroy worker instance {name}: {e}");
                    }
                });
            }
        }
        self.sync_worker_pool(ctx);
        self.dispatch_tasks(ctx);
        ActorAction::Continue
    }

    pub(super) fn handle_pong(
        &mut self,
        ctx: &mut ActorContext<Self>,
        worker: WorkerName,
        logs: Vec<WorkerLog>,
        cached_sessions: Vec<SessionName>,
    ) -> ActorAction {
        for entry in logs {
            info!("[{worker}] {}: {}", entry.from, entry.message);
        }
        match self.registry.pong(&worker, &cached_sessions) {
            PongOutcome::Registered => {
                info!("worker {worker} is registered");
                self.sync_worker_pool(ctx);
                self.dispatch_tasks(ctx);
            }
            PongOutcome::Alive | PongOutcome::Ignored => {}
        }
        ActorAction::Continue
    }

    pub(super) fn handle_task_finished(
        &mut self,
        ctx: &mut ActorContext<Self>,
        worker: WorkerName,
        task: TaskName,
        elapsed: Duration,
        weight: Option<u64>,
        cached_sessions: Option<Vec<SessionName>>,
    ) -> ActorAction {
        if let Some(sessions) = cached_sessions {
            self.registry.update_caches(&worker, &sessions);
        }
        let Some(entry) = self.scheduler.complete_task(&worker, &task) else {
            return ActorAction::Continue;
        };
        debug!("task {task} finished on worker {worker} in {elapsed:?}");
        let advance = self.advance_context(&entry.task.session);
        if let Some(execution) = self.executions.get_mut(&entry.task.execution) {
            let actions = execution.task_finished(&task, &worker, elapsed, weight, &advance);
            self.apply_execution_actions(ctx, &entry.task.execution, actions);
        }
        self.dispatch_tasks(ctx);
        ActorAction::Continue
    }

    pub(super) fn handle_fetching_finished(
        &mut self,
        ctx: &mut ActorContext<Self>,
        worker: WorkerName,
        task: TaskName,
        elapsed: Duration,
        cached_sessions: Option<Vec<SessionName>>,
    ) -> ActorAction {
        if let Some(sessions) = cached_sessions {
            self.registry.update_caches(&worker, &sessions);
        }
        let (session, execution) = match self.scheduler.in_flight_task(&task) {
            Some(x) if x.worker == worker => (x.task.session.clone(), x.task.execution.clone()),
            _ => {
                debug!("ignored fetching report of task {task} from worker {worker}");
                return ActorAction::Continue;
            }
        };
        debug!("worker {worker} fetched the resources of session {session} in {elapsed:?}");
        self.registry.mark_cached(&worker, &session);
        let advance = self.advance_context(&session);
        if let Some(controller) = self.executions.get_mut(&execution) {
            let actions = controller.fetching_finished(&task, elapsed, &advance);
            self.apply_execution_actions(ctx, &execution, actions);
        }
        self.dispatch_tasks(ctx);
        ActorAction::Continue
    }

    pub(super) fn handle_task_failed(
        &mut self,
        ctx: &mut ActorContext<Self>,
        worker: WorkerName,
        task: TaskName,
        reason: String,
    ) -> ActorAction {
        let Some(entry) = self.scheduler.complete_task(&worker, &task) else {
            return ActorAction::Continue;
        };
        self.fail_task(ctx, &entry.task, &reason);
        self.dispatch_tasks(ctx);
        ActorAction::Continue
    }

    pub(super) fn handle_dispatch_failed(
        &mut self,
        ctx: &mut ActorContext<Self>,
        worker: WorkerName,
        task: TaskName,
        dispatch: DispatchId,
        reason: String,
    ) -> ActorAction {
        let Some(entry) = self.scheduler.abort_task(&task, dispatch) else {
            return ActorAction::Continue;
        };
        warn!("failed to dispatch task {task} to worker {worker}: {reason}");
        self.registry.evict(&worker);
        self.fail_task(ctx, &entry.task, &reason);
        self.dispatch_tasks(ctx);
        ActorAction::Continue
    }

    pub(super) fn handle_probe_task_timeout(
        &mut self,
        ctx: &mut ActorContext<Self>,
        task: TaskName,
        dispatch: DispatchId,
    ) -> ActorAction {
        match self.scheduler.expire_task(&task, dispatch, Instant::now()) {
            TimeoutCheck::Stale => {}
            TimeoutCheck::Remaining(delay) => {
                ctx.send_with_delay(CoordinatorEvent::ProbeTaskTimeout { task, dispatch }, delay);
            }
            TimeoutCheck::Expired(entry) => {
                warn!("task {task} timed out on worker {}", entry.worker);
                self.registry.evict(&entry.worker);
                self.fail_task(ctx, &entry.task, "timeout");
                self.dispatch_tasks(ctx);
            }
        }
        ActorAction::Continue
    }

    pub(super) fn handle_create_session(
        &mut self,
        _ctx: &mut ActorContext<Self>,
        options: SessionOptions,
        result: oneshot::Sender<ExecutionResult<SessionName>>,
    ) -> ActorAction {
        let name: SessionName = self.name_generator.next("session");
        self.registry.track_session(name.clone());
        self.sessions.create_session(name.clone(), options);
        let _ = result.send(Ok(name));
        ActorAction::Continue
    }

    pub(super) fn handle_delete_session(
        &mut self,
        ctx: &mut ActorContext<Self>,
        name: SessionName,
        owner: Option<String>,
        result: oneshot::Sender<ExecutionResult<()>>,
    ) -> ActorAction {
        if let Err(e) = self.sessions.delete_session(&name, owner.as_deref()) {
            let _ = result.send(Err(e));
            return ActorAction::Continue;
        }
        for worker in self.registry.untrack_session(&name) {
            let Some(instance) = self.registry.instance(&worker).cloned() else {
                continue;
            };
            let transport = Arc::clone(&self.transport);
            let session = name.clone();
            ctx.spawn(async move {
                if let Err(e) = transport.delete_cache(&instance, &session).await {
                    warn!(
                        "failed to delete the cache of session {session} on worker {}: {e}",
                        instance.name
                    );
                }
            });
        }
        let _ = result.send(Ok(()));
        ActorAction::Continue
    }

    pub(super) fn handle_create_execution(
        &mut self,
        ctx: &mut ActorContext<Self>,
        request: ExecutionRequest,
        result: oneshot::Sender<ExecutionResult<ExecutionSnapshot>>,
    ) -> ActorAction {
        let name: ExecutionName = self.name_generator.next("execution");
        let fetch_resources = match self.sessions.begin_execution(&request, name.clone()) {
            Ok(session) => session.has_resources(),
            Err(e) => {
                let _ = result.send(Err(e));
                return ActorAction::Continue;
            }
        };
        let advance = self.advance_context(&request.session);
        let mut execution = ExecutionController::new(
            ExecutionOptions::from(self.options()),
            name.clone(),
            request.session,
            request.parallel,
            fetch_resources,
            advance.now,
        );
        let actions = execution.start(&advance);
        let snapshot = execution.snapshot();
        self.executions.insert(name.clone(), execution);
        self.apply_execution_actions(ctx, &name, actions);
        self.dispatch_tasks(ctx);
        let _ = result.send(Ok(snapshot));
        ActorAction::Continue
    }

    pub(super) fn handle_get_execution(
        &mut self,
        _ctx: &mut ActorContext<Self>,
        name: ExecutionName,
        result: oneshot::Sender<ExecutionResult<ExecutionSnapshot>>,
    ) -> ActorAction {
        let out = self
            .executions
            .get(&name)
            .map(|x| x.snapshot())
            .ok_or_else(|| ExecutionError::invalid(format!("no such execution: {name}")));
        let _ = result.send(out);
        ActorAction::Continue
    }

    pub(super) fn handle_resolve_result(
        &mut self,
        _ctx: &mut ActorContext<Self>,
        name: ExecutionName,
        result: oneshot::Sender<ExecutionResult<(WorkerInstance, TaskName)>>,
    ) -> ActorAction {
        let _ = result.send(self.resolve_result(&name));
        ActorAction::Continue
    }

    pub(super) fn handle_observe_cluster(
        &mut self,
        _ctx: &mut ActorContext<Self>,
        result: oneshot::Sender<ClusterSnapshot>,
    ) -> ActorAction {
        let workers = self
            .registry
            .workers()
            .map(|x| WorkerSnapshot {
                name: x.instance.name.clone(),
                host: x.instance.host.clone(),
                port: x.instance.port,
                resource_port: x.instance.resource_port,
                alive: x.registered,
                outstanding_pongs: x.outstanding_pongs(),
                state: self.scheduler.worker_state(&x.instance.name),
            })
            .collect();
        let snapshot = ClusterSnapshot {
            coordinator_port: self.server.port(),
            workers,
            pending_tasks: self.scheduler.pending_len(),
            in_flight_tasks: self
                .scheduler
                .in_flight_tasks()
                .map(|x| x.task.name.clone())
                .collect(),
            running_executions: self
                .executions
                .values()
                .filter(|x| !x.is_terminal())
                .map(|x| x.name().clone())
                .collect(),
        };
        let _ = result.send(snapshot);
        ActorAction::Continue
    }

    fn resolve_result(&self, name: &ExecutionName) -> ExecutionResult<(WorkerInstance, TaskName)> {
        let execution = self
            .executions
            .get(name)
            .ok_or_else(|| ExecutionError::invalid(format!("no such execution: {name}")))?;
        let Some(output) = execution.snapshot().result else {
            return Err(ExecutionError::invalid(format!(
                "execution {name} has no result"
            )));
        };
        let instance = self.registry.instance(&output.worker).ok_or_else(|| {
            ExecutionError::WorkerUnavailable(format!(
                "worker {} holding the result of execution {name} is gone",
                output.worker
            ))
        })?;
        Ok((instance.clone(), output.task))
    }

    fn advance_context(&self, session: &SessionName) -> AdvanceContext {
        AdvanceContext {
            cache_warm: self.registry.cache_warm(session),
            now: Instant::now(),
        }
    }

    /// Makes the scheduler worker pool match the live workers in the registry.
    /// The tasks running on workers that are no longer live are failed.
    fn sync_worker_pool(&mut self, ctx: &mut ActorContext<Self>) {
        let orphans = self
            .scheduler
            .update_worker_pool(self.registry.live_workers());
        for orphan in orphans {
            warn!(
                "task {} is lost with worker {}",
                orphan.task.name, orphan.worker
            );
            self.fail_task(ctx, &orphan.task, "worker lost");
        }
    }

    fn fail_task(&mut self, ctx: &mut ActorContext<Self>, task: &Task, reason: &str) {
        let advance = self.advance_context(&task.session);
        if let Some(execution) = self.executions.get_mut(&task.execution) {
            let actions = execution.task_failed(&task.name, reason, &advance);
            self.apply_execution_actions(ctx, &task.execution, actions);
        }
    }

    fn apply_execution_actions(
        &mut self,
        ctx: &mut ActorContext<Self>,
        execution: &ExecutionName,
        actions: Vec<ExecutionAction>,
    ) {
        for action in actions {
            match action {
                ExecutionAction::Enqueue(task) => self.scheduler.enqueue(task),
                ExecutionAction::AdjustTimeout(timeout) => {
                    let probes = self
                        .scheduler
                        .retime_execution(execution, timeout, Instant::now());
                    for probe in probes {
                        ctx.send_with_delay(
                            CoordinatorEvent::ProbeTaskTimeout {
                                task: probe.task,
                                dispatch: probe.dispatch,
                            },
                            probe.delay,
                        );
                    }
                }
                ExecutionAction::Finish(output) => {
                    info!(
                        "execution {execution} finished with task {} on worker {}",
                        output.task, output.worker
                    );
                    self.end_execution(execution);
                }
                ExecutionAction::Fail(reason) => {
                    warn!("execution {execution} failed: {reason}");
                    self.end_execution(execution);
                }
            }
        }
    }

    fn end_execution(&mut self, execution: &ExecutionName) {
        if let Some(controller) = self.executions.get(execution) {
            self.sessions.end_execution(controller.session(), execution);
        }
        let dropped = self.scheduler.exclude_execution(execution);
        if dropped > 0 {
            debug!("dropped {dropped} pending task(s) of execution {execution}");
        }
    }

    fn dispatch_tasks(&mut self, ctx: &mut ActorContext<Self>) {
        let dispatches = match self.scheduler.dispatch(&mut self.registry, Instant::now()) {
            Ok(x) => x,
            Err(e) => {
                error!("failed to dispatch tasks: {e}");
                return;
            }
        };
        for dispatch in dispatches {
            self.run_task(ctx, dispatch);
        }
    }

    fn run_task(&mut self, ctx: &mut ActorContext<Self>, dispatch: TaskDispatch) {
        let TaskDispatch {
            worker,
            task,
            dispatch,
        } = dispatch;
        let prepared = self
            .registry
            .instance(&worker)
            .cloned()
            .ok_or_else(|| ExecutionError::WorkerUnavailable(format!("unknown worker {worker}")))
            .and_then(|instance| Ok((instance, self.build_task_message(&task)?)));
        let (instance, message) = match prepared {
            Ok(x) => x,
            Err(e) => {
                ctx.send(CoordinatorEvent::DispatchFailed {
                    worker,
                    task: task.name,
                    dispatch,
                    reason: format!("dispatch failed: {e}"),
                });
                return;
            }
        };
        ctx.send_with_delay(
            CoordinatorEvent::ProbeTaskTimeout {
                task: task.name.clone(),
                dispatch,
            },
            task.timeout,
        );
        let transport = Arc::clone(&self.transport);
        let handle = ctx.handle().clone();
        ctx.spawn(async move {
            if let Err(e) = transport.run(&instance, message).await {
                let event = CoordinatorEvent::DispatchFailed {
                    worker,
                    task: task.name,
                    dispatch,
                    reason: format!("dispatch failed: {e}"),
                };
                let _ = handle.send(event).await;
            }
        });
    }

    fn build_task_message(&self, task: &Task) -> ExecutionResult<TaskMessage> {
        let session = self.sessions.get(&task.session).ok_or_else(|| {
            ExecutionError::internal(format!("no session {} for task {}", task.session, task.name))
        })?;
        let mut message = TaskMessage {
            name: task.name.clone(),
            kind: task.kind(),
            execution_name: task.execution.clone(),
            session: session.message(),
            seed: None,
            source: None,
            inputs: vec![],
        };
        match &task.payload {
            TaskPayload::Producing { seed, source } => {
                message.seed = Some(*seed);
                message.source = match source {
                    ResourceSource::None => None,
                    ResourceSource::External => Some(ResourceSourceMessage::Original),
                    ResourceSource::Cached(worker) => Some(match self.registry.instance(worker) {
                        Some(x) => ResourceSourceMessage::Worker {
                            worker: x.address(),
                        },
                        None => ResourceSourceMessage::Original,
                    }),
                };
            }
            TaskPayload::Reducing { inputs } => {
                for input in inputs {
                    let Some(instance) = self.registry.instance(&input.worker) else {
                        warn!(
                            "omitted input {} of task {} since worker {} is gone",
                            input.task, task.name, input.worker
                        );
                        continue;
                    };
                    message.inputs.push(ReduceInputMessage {
                        task_name: input.task.clone(),
                        weight: input.weight,
                        worker: instance.address(),
                    });
                }
            }
        }
        Ok(message)
    }
}
