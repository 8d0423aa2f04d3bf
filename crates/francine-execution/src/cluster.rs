use std::sync::Mutex;

use async_trait::async_trait;
use francine_common::config::StaticWorkerConfig;
use indexmap::IndexMap;
use log::info;

use crate::error::ExecutionResult;
use crate::id::WorkerName;
use crate::protocol::WorkerAddress;

/// A worker instance as reported by the cluster provider.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkerInstance {
    pub name: WorkerName,
    pub host: String,
    pub port: u16,
    pub resource_port: u16,
}

impl WorkerInstance {
    pub fn address(&self) -> WorkerAddress {
        WorkerAddress {
            host: self.host.clone(),
            port: self.port,
            resource_port: self.resource_port,
        }
    }
}

impl From<&StaticWorkerConfig> for WorkerInstance {
    fn from(config: &StaticWorkerConfig) -> Self {
        Self {
            name: WorkerName::from(config.name.as_str()),
            host: config.host.clone(),
            port: config.port,
            resource_port: config.resource_port,
        }
    }
}

/// The source of truth for which worker instances exist.
#[async_trait]
pub trait ClusterProvider: Send + Sync + 'static {
    async fn list_instances(&self) -> ExecutionResult<Vec<WorkerInstance>>;
    async fn destroy_instance(&self, name: &WorkerName) -> ExecutionResult<()>;
}

/// A cluster provider for a fixed set of workers.
/// A destroyed instance is no longer listed.
pub struct StaticClusterProvider {
    instances: Mutex<IndexMap<WorkerName, WorkerInstance>>,
}

impl StaticClusterProvider {
    pub fn new(instances: impl IntoIterator<Item = WorkerInstance>) -> Self {
        let instances = instances
            .into_iter()
            .map(|x| (x.name.clone(), x))
            .collect();
        Self {
            instances: Mutex::new(instances),
        }
    }

    pub fn from_config(workers: &[StaticWorkerConfig]) -> Self {
        Self::new(workers.iter().map(WorkerInstance::from))
    }
}

#[async_trait]
impl ClusterProvider for StaticClusterProvider {
    async fn list_instances(&self) -> ExecutionResult<Vec<WorkerInstance>> {
        let instances = self.instances.lock()?;
        Ok(instances.values().cloned().collect())
    }

    async fn destroy_instance(&self, name: &WorkerName) -> ExecutionResult<()> {
        let mut instances = self.instances.lock()?;
        if instances.shift_remove(name).is_some() {
            info!("static worker instance {name} is destroyed");
        }
        Ok(())
    }
}
