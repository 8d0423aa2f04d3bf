mod actor;
mod client;
pub(crate) mod entrypoint;
mod event;
mod execution;
mod options;
mod registry;
mod scheduler;
mod server;
mod session;
mod state;

pub use actor::{CoordinatorActor, CoordinatorActorOptions};
pub use client::Coordinator;
pub use event::CoordinatorEvent;
pub use execution::{ExecutionSnapshot, ExecutionState, ExecutionTime};
pub use options::CoordinatorOptions;
pub use scheduler::WorkerState;
pub use session::{ExecutionRequest, SessionOptions};
pub use state::{ClusterSnapshot, WorkerSnapshot};
