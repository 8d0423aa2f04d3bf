use std::time::Duration;

use async_trait::async_trait;
use fastrace::future::FutureExt;
use fastrace::Span;
use francine_common::config::RpcConfig;
use francine_server::retry::RetryStrategy;
use log::debug;

use crate::cluster::WorkerInstance;
use crate::error::{ExecutionError, ExecutionResult};
use crate::id::{SessionName, TaskName};
use crate::protocol::{method, DeleteCacheParams, PingParams, TaskMessage};
use crate::rpc::{ClientOptions, RpcClient};

/// The coordinator's view of the calls it can make to a worker.
#[async_trait]
pub trait WorkerTransport: Send + Sync + 'static {
    async fn ping(&self, worker: &WorkerInstance, params: PingParams) -> ExecutionResult<()>;
    async fn run(&self, worker: &WorkerInstance, task: TaskMessage) -> ExecutionResult<()>;
    async fn delete_cache(
        &self,
        worker: &WorkerInstance,
        session: &SessionName,
    ) -> ExecutionResult<()>;
    /// Pulls the artifact of a finished task from the worker's result port.
    async fn fetch_result(
        &self,
        worker: &WorkerInstance,
        task: &TaskName,
    ) -> ExecutionResult<Vec<u8>>;
}

#[derive(Debug, Clone)]
pub struct RpcTransportOptions {
    pub connect_timeout: Duration,
    pub request_timeout: Duration,
    pub retry_strategy: RetryStrategy,
}

impl From<&RpcConfig> for RpcTransportOptions {
    fn from(config: &RpcConfig) -> Self {
        Self {
            connect_timeout: Duration::from_secs(config.connect_timeout_secs),
            request_timeout: Duration::from_secs(config.request_timeout_secs),
            retry_strategy: RetryStrategy::from(&config.retry_strategy),
        }
    }
}

pub struct RpcWorkerTransport {
    options: RpcTransportOptions,
    http: reqwest::Client,
}

impl RpcWorkerTransport {
    pub fn new(options: RpcTransportOptions) -> Self {
        Self {
            options,
            http: reqwest::Client::new(),
        }
    }

    fn client(&self, worker: &WorkerInstance) -> RpcClient {
        RpcClient::new(ClientOptions {
            host: worker.host.clone(),
            port: worker.port,
            connect_timeout: self.options.connect_timeout,
            request_timeout: self.options.request_timeout,
        })
    }
}

#[async_trait]
impl WorkerTransport for RpcWorkerTransport {
    async fn ping(&self, worker: &WorkerInstance, params: PingParams) -> ExecutionResult<()> {
        self.client(worker).call(method::PING, &params).await?;
        Ok(())
    }

    async fn run(&self, worker: &WorkerInstance, task: TaskMessage) -> ExecutionResult<()> {
        let client = self.client(worker);
        let span = Span::enter_with_local_parent("RpcWorkerTransport::run");
        self.options
            .retry_strategy
            .run(
                || {
                    let client = client.clone();
                    let task = task.clone();
                    async move { client.call(method::RUN, &task).await }
                },
                ExecutionError::is_retryable,
            )
            .in_span(span)
            .await?;
        Ok(())
    }

    async fn delete_cache(
        &self,
        worker: &WorkerInstance,
        session: &SessionName,
    ) -> ExecutionResult<()> {
        let params = DeleteCacheParams {
            session_name: session.clone(),
        };
        self.client(worker)
            .call(method::DELETE_CACHE, &params)
            .await?;
        Ok(())
    }

    async fn fetch_result(
        &self,
        worker: &WorkerInstance,
        task: &TaskName,
    ) -> ExecutionResult<Vec<u8>> {
        let url = format!(
            "http://{}:{}/results/{}",
            worker.host, worker.resource_port, task
        );
        debug!("fetching result from {url}");
        let response = self.http.get(&url).send().await?;
        if !response.status().is_success() {
            return Err(ExecutionError::WorkerUnavailable(format!(
                "{url} returned {}",
                response.status()
            )));
        }
        Ok(response.bytes().await?.to_vec())
    }
}
