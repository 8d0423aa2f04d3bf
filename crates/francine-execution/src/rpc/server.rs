use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;
use log::{debug, warn};
use tokio::io::BufReader;
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinSet;

use crate::error::{ExecutionError, ExecutionResult};
use crate::rpc::codec::{read_frame, write_frame, RpcRequest, RpcResponse};

#[async_trait]
pub trait RpcHandler: Send + Sync + 'static {
    async fn handle(
        &self,
        method: &str,
        params: serde_json::Value,
    ) -> ExecutionResult<serde_json::Value>;
}

/// Accepts connections until the shutdown future completes.
/// Each connection may carry any number of requests, answered in order.
pub async fn serve(
    listener: TcpListener,
    handler: Arc<dyn RpcHandler>,
    shutdown: impl Future<Output = ()>,
) -> ExecutionResult<()> {
    tokio::pin!(shutdown);
    let mut connections = JoinSet::new();
    loop {
        tokio::select! {
            _ = &mut shutdown => break,
            accepted = listener.accept() => {
                let (stream, peer) = match accepted {
                    Ok(x) => x,
                    Err(e) => {
                        warn!("failed to accept RPC connection: {e}");
                        continue;
                    }
                };
                let handler = Arc::clone(&handler);
                connections.spawn(async move {
                    if let Err(e) = handle_connection(stream, handler).await {
                        debug!("RPC connection from {peer} closed with error: {e}");
                    }
                });
            }
        }
        while connections.try_join_next().is_some() {}
    }
    connections.shutdown().await;
    Ok(())
}

async fn handle_connection(stream: TcpStream, handler: Arc<dyn RpcHandler>) -> ExecutionResult<()> {
    let (reader, mut writer) = stream.into_split();
    let mut reader = BufReader::new(reader);
    loop {
        let request = match read_frame::<_, RpcRequest>(&mut reader).await {
            Ok(Some(x)) => x,
            Ok(None) => return Ok(()),
            Err(ExecutionError::JsonError(e)) => {
                warn!("ignored malformed RPC request: {e}");
                continue;
            }
            Err(e) => return Err(e),
        };
        let response = match handler.handle(&request.method, request.params).await {
            Ok(result) => RpcResponse::ok(request.id, result),
            Err(e) => RpcResponse::error(request.id, e.to_string()),
        };
        write_frame(&mut writer, &response).await?;
    }
}
