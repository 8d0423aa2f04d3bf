use std::path::Path;

use figment::providers::{Env, Format, Toml};
use figment::Figment;
use serde::{Deserialize, Serialize};

use crate::error::{CommonError, CommonResult};

const DEFAULT_CONFIG: &str = include_str!("default.toml");

const ENV_PREFIX: &str = "FRANCINE__";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub coordinator: CoordinatorConfig,
    pub cluster: ClusterConfig,
    pub scheduler: SchedulerConfig,
    pub execution: ExecutionConfig,
    pub rpc: RpcConfig,
    pub telemetry: TelemetryConfig,
}

impl AppConfig {
    /// Loads the configuration from the built-in defaults, an optional TOML file,
    /// and environment variables such as `FRANCINE__CLUSTER__MANAGE_INTERVAL_SECS`.
    pub fn load(path: Option<&Path>) -> CommonResult<Self> {
        let mut figment = Figment::from(Toml::string(DEFAULT_CONFIG));
        if let Some(path) = path {
            figment = figment.merge(Toml::file_exact(path));
        }
        let config: Self = figment
            .admerge(Env::prefixed(ENV_PREFIX).map(|p| p.as_str().replace("__", ".").into()))
            .extract()?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> CommonResult<()> {
        if self.cluster.manage_interval_secs == 0 {
            return Err(CommonError::invalid(
                "cluster manage interval must be positive",
            ));
        }
        if self.cluster.waiting_pong_timeout == 0 {
            return Err(CommonError::invalid(
                "cluster waiting pong timeout must be positive",
            ));
        }
        if self.execution.task_timeout_secs == 0 {
            return Err(CommonError::invalid("task timeout must be positive"));
        }
        if !(0.0..=1.0).contains(&self.execution.producing_fail_ratio) {
            return Err(CommonError::invalid(format!(
                "producing fail ratio must be between 0 and 1: {}",
                self.execution.producing_fail_ratio
            )));
        }
        for worker in &self.cluster.workers {
            if worker.name.is_empty() {
                return Err(CommonError::missing("static worker name"));
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CoordinatorConfig {
    pub listen_host: String,
    pub listen_port: u16,
    /// The host that workers use to reach the coordinator.
    pub external_host: String,
    /// The port that workers use to reach the coordinator.
    /// The listen port is used if this is not set.
    #[serde(default)]
    pub external_port: Option<u16>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClusterConfig {
    pub manage_interval_secs: u64,
    /// The number of unanswered pings after which a worker is condemned.
    pub waiting_pong_timeout: u32,
    /// Whether condemned workers are destroyed via the cluster provider.
    pub destroy_zombies: bool,
    #[serde(default)]
    pub workers: Vec<StaticWorkerConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StaticWorkerConfig {
    pub name: String,
    pub host: String,
    #[serde(default = "default_worker_port")]
    pub port: u16,
    #[serde(default = "default_worker_resource_port")]
    pub resource_port: u16,
}

fn default_worker_port() -> u16 {
    5000
}

fn default_worker_resource_port() -> u16 {
    9000
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerConfig {
    /// Whether reducing tasks are queued ahead of pending producing tasks.
    pub prioritize_reducing: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionConfig {
    pub task_timeout_secs: u64,
    pub task_min_timeout_secs: u64,
    pub reducing_max_retries: usize,
    pub producing_fail_ratio: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RpcConfig {
    pub connect_timeout_secs: u64,
    pub request_timeout_secs: u64,
    pub retry_strategy: RetryStrategy,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RetryStrategy {
    Fixed(FixedRetryStrategy),
    ExponentialBackoff(ExponentialBackoffRetryStrategy),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FixedRetryStrategy {
    pub max_count: usize,
    pub delay_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExponentialBackoffRetryStrategy {
    pub max_count: usize,
    pub initial_delay_secs: u64,
    pub max_delay_secs: u64,
    pub factor: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelemetryConfig {
    /// Whether fastrace spans are printed to the console.
    pub trace_to_console: bool,
}
