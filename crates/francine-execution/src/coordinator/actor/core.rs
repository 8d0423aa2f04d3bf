use std::mem;

use async_trait::async_trait;
use francine_server::actor::{Actor, ActorAction, ActorContext};
use indexmap::IndexMap;

use crate::coordinator::actor::{CoordinatorActor, CoordinatorActorOptions};
use crate::coordinator::registry::{WorkerRegistry, WorkerRegistryOptions};
use crate::coordinator::scheduler::{TaskScheduler, TaskSchedulerOptions};
use crate::coordinator::session::SessionManager;
use crate::coordinator::{CoordinatorEvent, CoordinatorOptions};
use crate::id::NameGenerator;
use crate::rpc::ServerMonitor;

#[async_trait]
impl Actor for CoordinatorActor {
    type Message = CoordinatorEvent;
    type Options = CoordinatorActorOptions;

    fn new(options: CoordinatorActorOptions) -> Self {
        let CoordinatorActorOptions {
            options,
            transport,
            provider,
        } = options;
        Self {
            registry: WorkerRegistry::new(WorkerRegistryOptions::from(&options)),
            scheduler: TaskScheduler::new(TaskSchedulerOptions::from(&options)),
            options,
            server: ServerMonitor::new(),
            transport,
            provider,
            sessions: SessionManager::new(),
            executions: IndexMap::new(),
            name_generator: NameGenerator::new(),
        }
    }

    fn start(&mut self, ctx: &mut ActorContext<Self>) {
        let addr = (
            self.options().listen_host.clone(),
            self.options().listen_port,
        );
        let server = mem::take(&mut self.server);
        self.server = server.start(Self::serve(ctx.handle().clone(), addr));
        ctx.send(CoordinatorEvent::ReconcileWorkers);
    }

    fn receive(&mut self, ctx: &mut ActorContext<Self>, message: CoordinatorEvent) -> ActorAction {
        match message {
            CoordinatorEvent::ServerReady { port, signal } => {
                self.handle_server_ready(ctx, port, signal)
            }
            CoordinatorEvent::ReconcileWorkers => self.handle_reconcile_workers(ctx),
            CoordinatorEvent::InstancesListed { instances } => {
                self.handle_instances_listed(ctx, instances)
            }
            CoordinatorEvent::Pong {
                worker,
                logs,
                cached_sessions,
            } => self.handle_pong(ctx, worker, logs, cached_sessions),
            CoordinatorEvent::TaskFinished {
                worker,
                task,
                elapsed,
                weight,
                cached_sessions,
            } => self.handle_task_finished(ctx, worker, task, elapsed, weight, cached_sessions),
            CoordinatorEvent::FetchingFinished {
                worker,
                task,
                elapsed,
                cached_sessions,
            } => self.handle_fetching_finished(ctx, worker, task, elapsed, cached_sessions),
            CoordinatorEvent::TaskFailed {
                worker,
                task,
                reason,
            } => self.handle_task_failed(ctx, worker, task, reason),
            CoordinatorEvent::DispatchFailed {
                worker,
                task,
                dispatch,
                reason,
            } => self.handle_dispatch_failed(ctx, worker, task, dispatch, reason),
            CoordinatorEvent::ProbeTaskTimeout { task, dispatch } => {
                self.handle_probe_task_timeout(ctx, task, dispatch)
            }
            CoordinatorEvent::CreateSession { options, result } => {
                self.handle_create_session(ctx, options, result)
            }
            CoordinatorEvent::DeleteSession {
                name,
                owner,
                result,
            } => self.handle_delete_session(ctx, name, owner, result),
            CoordinatorEvent::CreateExecution { request, result } => {
                self.handle_create_execution(ctx, request, result)
            }
            CoordinatorEvent::GetExecution { name, result } => {
                self.handle_get_execution(ctx, name, result)
            }
            CoordinatorEvent::ResolveResult { name, result } => {
                self.handle_resolve_result(ctx, name, result)
            }
            CoordinatorEvent::ObserveCluster { result } => self.handle_observe_cluster(ctx, result),
            CoordinatorEvent::Shutdown => ActorAction::Stop,
        }
    }

    async fn stop(self) {
        self.server.stop().await;
    }
}

impl CoordinatorActor {
    pub(super) fn options(&self) -> &CoordinatorOptions {
        &self.options
    }
}
