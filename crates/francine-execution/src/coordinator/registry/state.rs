use crate::cluster::WorkerInstance;
use crate::id::WorkerName;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerLiveness {
    /// The number of pings sent without a pong in reply.
    Waiting(u32),
    /// The worker missed too many pongs and is never pinged again.
    Condemned,
}

#[derive(Debug, Clone)]
pub struct WorkerDescriptor {
    pub instance: WorkerInstance,
    pub liveness: WorkerLiveness,
    /// Whether the worker is part of the live set used for scheduling.
    pub registered: bool,
}

impl WorkerDescriptor {
    pub fn new(instance: WorkerInstance) -> Self {
        Self {
            instance,
            liveness: WorkerLiveness::Waiting(0),
            registered: false,
        }
    }

    pub fn outstanding_pongs(&self) -> Option<u32> {
        match self.liveness {
            WorkerLiveness::Waiting(n) => Some(n),
            WorkerLiveness::Condemned => None,
        }
    }
}

#[derive(Debug, Default)]
pub struct ReconcileOutcome {
    /// The workers to ping in this round.
    pub pings: Vec<WorkerInstance>,
    /// The workers condemned in this round.
    pub condemned: Vec<WorkerName>,
    /// The registered workers that left the live set in this round.
    pub removed: Vec<WorkerName>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PongOutcome {
    /// The worker joined the live set.
    Registered,
    /// The worker was already in the live set.
    Alive,
    /// The worker is unknown or condemned.
    Ignored,
}
