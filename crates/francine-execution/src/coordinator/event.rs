use std::borrow::Cow;
use std::time::Duration;

use francine_telemetry::common::{SpanAssociation, SpanAttribute};
use tokio::sync::oneshot;

use crate::cluster::WorkerInstance;
use crate::coordinator::execution::ExecutionSnapshot;
use crate::coordinator::session::{ExecutionRequest, SessionOptions};
use crate::coordinator::state::ClusterSnapshot;
use crate::error::ExecutionResult;
use crate::id::{DispatchId, ExecutionName, SessionName, TaskName, WorkerName};
use crate::protocol::{FailedParams, FinishKind, FinishParams, PongParams, WorkerLog};

pub enum CoordinatorEvent {
    ServerReady {
        /// The local port that the coordinator server listens on.
        port: u16,
        signal: oneshot::Sender<()>,
    },
    ReconcileWorkers,
    InstancesListed {
        instances: ExecutionResult<Vec<WorkerInstance>>,
    },
    Pong {
        worker: WorkerName,
        logs: Vec<WorkerLog>,
        cached_sessions: Vec<SessionName>,
    },
    TaskFinished {
        worker: WorkerName,
        task: TaskName,
        elapsed: Duration,
        weight: Option<u64>,
        cached_sessions: Option<Vec<SessionName>>,
    },
    FetchingFinished {
        worker: WorkerName,
        task: TaskName,
        elapsed: Duration,
        cached_sessions: Option<Vec<SessionName>>,
    },
    TaskFailed {
        worker: WorkerName,
        task: TaskName,
        reason: String,
    },
    DispatchFailed {
        worker: WorkerName,
        task: TaskName,
        dispatch: DispatchId,
        reason: String,
    },
    ProbeTaskTimeout {
        task: TaskName,
        dispatch: DispatchId,
    },
    CreateSession {
        options: SessionOptions,
        result: oneshot::Sender<ExecutionResult<SessionName>>,
    },
    DeleteSession {
        name: SessionName,
        owner: Option<String>,
        result: oneshot::Sender<ExecutionResult<()>>,
    },
    CreateExecution {
        request: ExecutionRequest,
        result: oneshot::Sender<ExecutionResult<ExecutionSnapshot>>,
    },
    GetExecution {
        name: ExecutionName,
        result: oneshot::Sender<ExecutionResult<ExecutionSnapshot>>,
    },
    ResolveResult {
        name: ExecutionName,
        result: oneshot::Sender<ExecutionResult<(WorkerInstance, TaskName)>>,
    },
    ObserveCluster {
        result: oneshot::Sender<ClusterSnapshot>,
    },
    Shutdown,
}

impl From<PongParams> for CoordinatorEvent {
    fn from(params: PongParams) -> Self {
        CoordinatorEvent::Pong {
            worker: params.worker_name,
            logs: params.logs,
            cached_sessions: params.cached_session_names,
        }
    }
}

impl From<FinishParams> for CoordinatorEvent {
    fn from(params: FinishParams) -> Self {
        let elapsed = Duration::from_millis(params.elapsed_time);
        match params.kind {
            FinishKind::Task => CoordinatorEvent::TaskFinished {
                worker: params.worker_name,
                task: params.task_name,
                elapsed,
                weight: params.weight,
                cached_sessions: params.cached_session_names,
            },
            FinishKind::Fetching => CoordinatorEvent::FetchingFinished {
                worker: params.worker_name,
                task: params.task_name,
                elapsed,
                cached_sessions: params.cached_session_names,
            },
        }
    }
}

impl From<FailedParams> for CoordinatorEvent {
    fn from(params: FailedParams) -> Self {
        CoordinatorEvent::TaskFailed {
            worker: params.worker_name,
            task: params.task_name,
            reason: params.reason,
        }
    }
}

impl SpanAssociation for CoordinatorEvent {
    fn name(&self) -> Cow<'static, str> {
        let name = match self {
            CoordinatorEvent::ServerReady { .. } => "ServerReady",
            CoordinatorEvent::ReconcileWorkers => "ReconcileWorkers",
            CoordinatorEvent::InstancesListed { .. } => "InstancesListed",
            CoordinatorEvent::Pong { .. } => "Pong",
            CoordinatorEvent::TaskFinished { .. } => "TaskFinished",
            CoordinatorEvent::FetchingFinished { .. } => "FetchingFinished",
            CoordinatorEvent::TaskFailed { .. } => "TaskFailed",
            CoordinatorEvent::DispatchFailed { .. } => "DispatchFailed",
            CoordinatorEvent::ProbeTaskTimeout { .. } => "ProbeTaskTimeout",
            CoordinatorEvent::CreateSession { .. } => "CreateSession",
            CoordinatorEvent::DeleteSession { .. } => "DeleteSession",
            CoordinatorEvent::CreateExecution { .. } => "CreateExecution",
            CoordinatorEvent::GetExecution { .. } => "GetExecution",
            CoordinatorEvent::ResolveResult { .. } => "ResolveResult",
            CoordinatorEvent::ObserveCluster { .. } => "ObserveCluster",
            CoordinatorEvent::Shutdown => "Shutdown",
        };
        name.into()
    }

    fn properties(&self) -> impl IntoIterator<Item = (Cow<'static, str>, Cow<'static, str>)> {
        let mut p: Vec<(&'static str, String)> = vec![];
        match self {
            CoordinatorEvent::ServerReady { port, signal: _ } => {
                p.push((SpanAttribute::CLUSTER_COORDINATOR_PORT, port.to_string()));
            }
            CoordinatorEvent::InstancesListed { instances } => {
                if let Ok(instances) = instances {
                    p.push((SpanAttribute::CLUSTER_WORKER_COUNT, instances.len().to_string()));
                }
            }
            CoordinatorEvent::Pong { worker, .. } => {
                p.push((SpanAttribute::CLUSTER_WORKER_NAME, worker.to_string()));
            }
            CoordinatorEvent::TaskFinished {
                worker,
                task,
                elapsed,
                weight,
                cached_sessions: _,
            } => {
                p.push((SpanAttribute::CLUSTER_WORKER_NAME, worker.to_string()));
                p.push((SpanAttribute::EXECUTION_TASK_NAME, task.to_string()));
                p.push((
                    SpanAttribute::EXECUTION_TASK_ELAPSED_MS,
                    elapsed.as_millis().to_string(),
                ));
                if let Some(weight) = weight {
                    p.push((SpanAttribute::EXECUTION_TASK_WEIGHT, weight.to_string()));
                }
            }
            CoordinatorEvent::FetchingFinished {
                worker,
                task,
                elapsed,
                cached_sessions: _,
            } => {
                p.push((SpanAttribute::CLUSTER_WORKER_NAME, worker.to_string()));
                p.push((SpanAttribute::EXECUTION_TASK_NAME, task.to_string()));
                p.push((
                    SpanAttribute::EXECUTION_TASK_ELAPSED_MS,
                    elapsed.as_millis().to_string(),
                ));
            }
            CoordinatorEvent::TaskFailed {
                worker,
                task,
                reason,
            } => {
                p.push((SpanAttribute::CLUSTER_WORKER_NAME, worker.to_string()));
                p.push((SpanAttribute::EXECUTION_TASK_NAME, task.to_string()));
                p.push((SpanAttribute::EXECUTION_TASK_REASON, reason.clone()));
            }
            CoordinatorEvent::DispatchFailed {
                worker,
                task,
                dispatch,
                reason,
            } => {
                p.push((SpanAttribute::CLUSTER_WORKER_NAME, worker.to_string()));
                p.push((SpanAttribute::EXECUTION_TASK_NAME, task.to_string()));
                p.push((SpanAttribute::EXECUTION_DISPATCH_ID, dispatch.to_string()));
                p.push((SpanAttribute::EXECUTION_TASK_REASON, reason.clone()));
            }
            CoordinatorEvent::ProbeTaskTimeout { task, dispatch } => {
                p.push((SpanAttribute::EXECUTION_TASK_NAME, task.to_string()));
                p.push((SpanAttribute::EXECUTION_DISPATCH_ID, dispatch.to_string()));
            }
            CoordinatorEvent::DeleteSession { name, .. } => {
                p.push((SpanAttribute::EXECUTION_SESSION_NAME, name.to_string()));
            }
            CoordinatorEvent::CreateExecution { request, result: _ } => {
                p.push((
                    SpanAttribute::EXECUTION_SESSION_NAME,
                    request.session.to_string(),
                ));
                p.push((SpanAttribute::EXECUTION_PARALLEL, request.parallel.to_string()));
            }
            CoordinatorEvent::GetExecution { name, result: _ }
            | CoordinatorEvent::ResolveResult { name, result: _ } => {
                p.push((SpanAttribute::EXECUTION_NAME, name.to_string()));
            }
            CoordinatorEvent::ReconcileWorkers
            | CoordinatorEvent::CreateSession { .. }
            | CoordinatorEvent::ObserveCluster { .. }
            | CoordinatorEvent::Shutdown => {}
        }
        p.into_iter().map(|(k, v)| (k.into(), v.into()))
    }
}
