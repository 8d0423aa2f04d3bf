use std::time::Duration;

use log::debug;
use serde::Serialize;
use tokio::io::BufReader;
use tokio::net::TcpStream;

use crate::error::{ExecutionError, ExecutionResult};
use crate::rpc::codec::{read_frame, write_frame, RpcRequest, RpcResponse};

#[derive(Debug, Clone)]
pub struct ClientOptions {
    pub host: String,
    pub port: u16,
    pub connect_timeout: Duration,
    pub request_timeout: Duration,
}

/// A client that opens one connection per call.
/// Workers come and go, so no connection is kept between calls.
#[derive(Debug, Clone)]
pub struct RpcClient {
    options: ClientOptions,
}

impl RpcClient {
    pub fn new(options: ClientOptions) -> Self {
        Self { options }
    }

    pub async fn call<P: Serialize>(
        &self,
        method: &str,
        params: &P,
    ) -> ExecutionResult<serde_json::Value> {
        let addr = (self.options.host.as_str(), self.options.port);
        let stream = match tokio::time::timeout(self.options.connect_timeout, TcpStream::connect(addr))
            .await
        {
            Ok(Ok(x)) => x,
            Ok(Err(e)) => {
                return Err(ExecutionError::ConnectionError(format!(
                    "{}:{}: {e}",
                    self.options.host, self.options.port
                )))
            }
            Err(_) => {
                return Err(ExecutionError::ConnectionError(format!(
                    "{}:{}: connect timed out",
                    self.options.host, self.options.port
                )))
            }
        };
        let (reader, mut writer) = stream.into_split();
        let mut reader = BufReader::new(reader);
        let request = RpcRequest {
            id: 1,
            method: method.to_string(),
            params: serde_json::to_value(params)?,
        };
        debug!(
            "calling {method} on {}:{}",
            self.options.host, self.options.port
        );
        let response = tokio::time::timeout(self.options.request_timeout, async {
            write_frame(&mut writer, &request).await?;
            read_frame::<_, RpcResponse>(&mut reader).await
        })
        .await??;
        let Some(response) = response else {
            return Err(ExecutionError::RpcError(format!(
                "connection closed before {method} response"
            )));
        };
        if response.id != request.id {
            return Err(ExecutionError::RpcError(format!(
                "unexpected response ID {} for {method}",
                response.id
            )));
        }
        response.into_result()
    }
}
