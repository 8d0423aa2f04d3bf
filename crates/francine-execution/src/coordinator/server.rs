use async_trait::async_trait;
use francine_server::actor::ActorHandle;
use log::debug;
use serde::de::DeserializeOwned;
use serde_json::json;

use crate::coordinator::actor::CoordinatorActor;
use crate::coordinator::CoordinatorEvent;
use crate::error::{ExecutionError, ExecutionResult};
use crate::protocol::{method, FailedParams, FinishParams, PongParams};
use crate::rpc::RpcHandler;

/// Turns the requests from workers into coordinator events.
pub struct CoordinatorServer {
    handle: ActorHandle<CoordinatorActor>,
}

impl CoordinatorServer {
    pub fn new(handle: ActorHandle<CoordinatorActor>) -> Self {
        Self { handle }
    }

    async fn forward<P>(&self, params: serde_json::Value) -> ExecutionResult<serde_json::Value>
    where
        P: DeserializeOwned + std::fmt::Debug + Into<CoordinatorEvent> + Send,
    {
        let params: P = serde_json::from_value(params)?;
        debug!("{params:?}");
        self.handle.send(params.into()).await?;
        Ok(json!({}))
    }
}

#[async_trait]
impl RpcHandler for CoordinatorServer {
    async fn handle(
        &self,
        method: &str,
        params: serde_json::Value,
    ) -> ExecutionResult<serde_json::Value> {
        match method {
            method::PONG => self.forward::<PongParams>(params).await,
            method::FINISH => self.forward::<FinishParams>(params).await,
            method::FAILED => self.forward::<FailedParams>(params).await,
            _ => Err(ExecutionError::invalid(format!("unknown method: {method}"))),
        }
    }
}
