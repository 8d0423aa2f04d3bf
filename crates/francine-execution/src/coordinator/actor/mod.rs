mod core;
mod handler;
mod rpc;

use std::sync::Arc;

use indexmap::IndexMap;

use crate::cluster::ClusterProvider;
use crate::coordinator::execution::ExecutionController;
use crate::coordinator::registry::WorkerRegistry;
use crate::coordinator::scheduler::TaskScheduler;
use crate::coordinator::session::SessionManager;
use crate::coordinator::CoordinatorOptions;
use crate::id::{ExecutionName, NameGenerator};
use crate::rpc::ServerMonitor;
use crate::transport::WorkerTransport;

pub struct CoordinatorActorOptions {
    pub options: CoordinatorOptions,
    pub transport: Arc<dyn WorkerTransport>,
    pub provider: Arc<dyn ClusterProvider>,
}

/// Hosts the worker registry, the task scheduler, and the execution controllers.
/// Each of them is mutated only while the actor processes a message.
pub struct CoordinatorActor {
    options: CoordinatorOptions,
    server: ServerMonitor,
    transport: Arc<dyn WorkerTransport>,
    provider: Arc<dyn ClusterProvider>,
    registry: WorkerRegistry,
    scheduler: TaskScheduler,
    sessions: SessionManager,
    executions: IndexMap<ExecutionName, ExecutionController>,
    name_generator: NameGenerator,
}
