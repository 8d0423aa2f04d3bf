use std::sync::Arc;

use francine_server::actor::ActorHandle;
use log::info;
use tokio::net::{TcpListener, ToSocketAddrs};

use crate::coordinator::actor::CoordinatorActor;
use crate::coordinator::server::CoordinatorServer;
use crate::coordinator::CoordinatorEvent;
use crate::error::ExecutionResult;
use crate::protocol::CoordinatorAddress;

impl CoordinatorActor {
    pub(super) async fn serve(
        handle: ActorHandle<Self>,
        addr: impl ToSocketAddrs,
    ) -> ExecutionResult<()> {
        let listener = TcpListener::bind(addr).await?;
        let port = listener.local_addr()?.port();
        let (tx, rx) = tokio::sync::oneshot::channel();
        let server = CoordinatorServer::new(handle.clone());

        handle
            .send(CoordinatorEvent::ServerReady { port, signal: tx })
            .await?;

        crate::rpc::serve(listener, Arc::new(server), async {
            let _ = rx.await;
        })
        .await?;
        info!("coordinator server stopped");
        Ok(())
    }

    /// The address that workers use to reach the coordinator.
    pub(super) fn coordinator_address(&self) -> CoordinatorAddress {
        let port = self
            .options()
            .external_port
            .or(self.server.port())
            .unwrap_or(self.options().listen_port);
        CoordinatorAddress {
            host: self.options().external_host.clone(),
            port,
        }
    }
}
