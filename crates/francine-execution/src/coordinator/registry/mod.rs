mod core;
mod options;
mod state;

use std::collections::{HashMap, VecDeque};

use indexmap::IndexMap;
pub use options::WorkerRegistryOptions;
pub use state::{PongOutcome, ReconcileOutcome, WorkerDescriptor, WorkerLiveness};

use crate::id::{SessionName, WorkerName};

/// The authoritative set of known workers and their liveness.
pub struct WorkerRegistry {
    options: WorkerRegistryOptions,
    /// The workers in the latest instance list of the cluster provider.
    /// A worker takes part in scheduling only after it is registered by a pong.
    workers: IndexMap<WorkerName, WorkerDescriptor>,
    /// The workers holding a warm resource cache for each session.
    /// The worker to use next for resource affinity is at the front.
    session_caches: HashMap<SessionName, VecDeque<WorkerName>>,
}

impl WorkerRegistry {
    pub fn new(options: WorkerRegistryOptions) -> Self {
        Self {
            options,
            workers: IndexMap::new(),
            session_caches: HashMap::new(),
        }
    }
}
