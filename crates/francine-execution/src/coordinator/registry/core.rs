use std::collections::VecDeque;

use indexmap::IndexMap;
use log::{debug, warn};

use crate::cluster::WorkerInstance;
use crate::coordinator::registry::state::{
    PongOutcome, ReconcileOutcome, WorkerDescriptor, WorkerLiveness,
};
use crate::coordinator::registry::WorkerRegistry;
use crate::coordinator::scheduler::WorkerLookup;
use crate::id::{SessionName, WorkerName};

impl WorkerRegistry {
    /// Reconciles the registry against the latest instance list of the cluster provider.
    /// Every worker that is still listed and not condemned is pinged once per round.
    pub fn reconcile(&mut self, instances: Vec<WorkerInstance>) -> ReconcileOutcome {
        let mut outcome = ReconcileOutcome::default();
        let listed = instances
            .into_iter()
            .map(|x| (x.name.clone(), x))
            .collect::<IndexMap<_, _>>();

        let gone = self
            .workers
            .keys()
            .filter(|name| !listed.contains_key(*name))
            .cloned()
            .collect::<Vec<_>>();
        for name in gone {
            if let Some(worker) = self.workers.shift_remove(&name) {
                self.purge_caches(&name);
                if worker.registered {
                    outcome.removed.push(name);
                }
            }
        }

        let threshold = self.options.waiting_pong_timeout;
        for (name, instance) in listed {
            let worker = self
                .workers
                .entry(name.clone())
                .or_insert_with(|| WorkerDescriptor::new(instance.clone()));
            match worker.liveness {
                WorkerLiveness::Condemned => {}
                WorkerLiveness::Waiting(n) if n >= threshold => {
                    worker.liveness = WorkerLiveness::Condemned;
                    if worker.registered {
                        worker.registered = false;
                        outcome.removed.push(name.clone());
                    }
                    outcome.condemned.push(name);
                }
                WorkerLiveness::Waiting(n) => {
                    worker.instance = instance;
                    worker.liveness = WorkerLiveness::Waiting(n + 1);
                    outcome.pings.push(worker.instance.clone());
                }
            }
        }
        for name in &outcome.condemned {
            self.purge_caches(name);
        }
        outcome
    }

    /// Records a pong from the worker, with the full set of sessions it holds a cache for.
    pub fn pong(&mut self, name: &WorkerName, cached_sessions: &[SessionName]) -> PongOutcome {
        let Some(worker) = self.workers.get_mut(name) else {
            warn!("ignored pong from unknown worker {name}");
            return PongOutcome::Ignored;
        };
        let outcome = match worker.liveness {
            WorkerLiveness::Condemned => {
                debug!("ignored pong from condemned worker {name}");
                return PongOutcome::Ignored;
            }
            WorkerLiveness::Waiting(n) => {
                worker.liveness = WorkerLiveness::Waiting(n.saturating_sub(1));
                if worker.registered {
                    PongOutcome::Alive
                } else {
                    worker.registered = true;
                    PongOutcome::Registered
                }
            }
        };
        self.update_caches(name, cached_sessions);
        outcome
    }

    /// Removes the worker from the live set until its next pong.
    pub fn evict(&mut self, name: &WorkerName) -> bool {
        match self.workers.get_mut(name) {
            Some(worker) if worker.registered => {
                worker.registered = false;
                true
            }
            _ => false,
        }
    }

    pub fn is_alive(&self, name: &WorkerName) -> bool {
        self.workers.get(name).is_some_and(|x| x.registered)
    }

    pub fn live_workers(&self) -> impl Iterator<Item = &WorkerName> {
        self.workers
            .iter()
            .filter(|(_, x)| x.registered)
            .map(|(name, _)| name)
    }

    pub fn workers(&self) -> impl Iterator<Item = &WorkerDescriptor> {
        self.workers.values()
    }

    pub fn instance(&self, name: &WorkerName) -> Option<&WorkerInstance> {
        self.workers.get(name).map(|x| &x.instance)
    }

    pub fn track_session(&mut self, session: SessionName) {
        self.session_caches.entry(session).or_default();
    }

    /// Stops tracking the session and returns the workers that cache it.
    pub fn untrack_session(&mut self, session: &SessionName) -> Vec<WorkerName> {
        self.session_caches
            .remove(session)
            .map(Vec::from)
            .unwrap_or_default()
    }

    /// Replaces the set of sessions that the worker is known to cache.
    /// Sessions that are not tracked are ignored.
    pub fn update_caches(&mut self, name: &WorkerName, cached_sessions: &[SessionName]) {
        for (session, workers) in self.session_caches.iter_mut() {
            let cached = cached_sessions.contains(session);
            let position = workers.iter().position(|x| x == name);
            match (cached, position) {
                (true, None) => workers.push_back(name.clone()),
                (false, Some(position)) => {
                    workers.remove(position);
                }
                _ => {}
            }
        }
    }

    /// Records that the worker has just fetched the session resources.
    pub fn mark_cached(&mut self, name: &WorkerName, session: &SessionName) {
        if let Some(workers) = self.session_caches.get_mut(session) {
            if !workers.contains(name) {
                workers.push_back(name.clone());
            }
        }
    }

    pub fn cached_workers(&self, session: &SessionName) -> Option<&VecDeque<WorkerName>> {
        self.session_caches.get(session)
    }

    /// Whether any live worker holds a warm cache for the session.
    pub fn cache_warm(&self, session: &SessionName) -> bool {
        self.session_caches
            .get(session)
            .is_some_and(|workers| workers.iter().any(|x| self.is_alive(x)))
    }

    fn purge_caches(&mut self, name: &WorkerName) {
        for workers in self.session_caches.values_mut() {
            workers.retain(|x| x != name);
        }
    }
}

impl WorkerLookup for WorkerRegistry {
    /// Picks the live cached worker that was used least recently,
    /// and moves it to the back of the list.
    fn take_cached_worker(&mut self, session: &SessionName) -> Option<WorkerName> {
        let workers = self.session_caches.get_mut(session)?;
        let position = workers
            .iter()
            .position(|x| self.workers.get(x).is_some_and(|w| w.registered))?;
        let name = workers.remove(position)?;
        workers.push_back(name.clone());
        Some(name)
    }
}
