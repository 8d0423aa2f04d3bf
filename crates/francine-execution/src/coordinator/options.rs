use std::time::Duration;

use francine_common::config::AppConfig;

use crate::error::{ExecutionError, ExecutionResult};

#[readonly::make]
#[derive(Debug, Clone)]
pub struct CoordinatorOptions {
    pub listen_host: String,
    pub listen_port: u16,
    pub external_host: String,
    pub external_port: Option<u16>,
    pub manage_interval: Duration,
    pub waiting_pong_timeout: u32,
    pub destroy_zombies: bool,
    pub prioritize_reducing: bool,
    pub task_timeout: Duration,
    pub task_min_timeout: Duration,
    pub reducing_max_retries: usize,
    pub producing_fail_ratio: f64,
}

impl TryFrom<&AppConfig> for CoordinatorOptions {
    type Error = ExecutionError;

    fn try_from(config: &AppConfig) -> ExecutionResult<Self> {
        config.validate()?;
        Ok(Self {
            listen_host: config.coordinator.listen_host.clone(),
            listen_port: config.coordinator.listen_port,
            external_host: config.coordinator.external_host.clone(),
            external_port: config.coordinator.external_port,
            manage_interval: Duration::from_secs(config.cluster.manage_interval_secs),
            waiting_pong_timeout: config.cluster.waiting_pong_timeout,
            destroy_zombies: config.cluster.destroy_zombies,
            prioritize_reducing: config.scheduler.prioritize_reducing,
            task_timeout: Duration::from_secs(config.execution.task_timeout_secs),
            task_min_timeout: Duration::from_secs(config.execution.task_min_timeout_secs),
            reducing_max_retries: config.execution.reducing_max_retries,
            producing_fail_ratio: config.execution.producing_fail_ratio,
        })
    }
}
