use std::future::Future;

use log::warn;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;

use crate::error::{ExecutionError, ExecutionResult};

pub enum ServerMonitor {
    Stopped,
    Pending {
        handle: JoinHandle<ExecutionResult<()>>,
    },
    Running {
        /// The shutdown signal to send to the server.
        signal: oneshot::Sender<()>,
        /// The join handle of the server task.
        handle: JoinHandle<ExecutionResult<()>>,
        /// The local port that the server listens on.
        port: u16,
    },
}

impl Default for ServerMonitor {
    fn default() -> Self {
        Self::new()
    }
}

impl ServerMonitor {
    pub fn new() -> Self {
        Self::Stopped
    }

    pub fn start(self, f: impl Future<Output = ExecutionResult<()>> + Send + 'static) -> Self {
        match self {
            Self::Stopped => {}
            Self::Pending { handle } | Self::Running { handle, .. } => {
                warn!("restarting the server that has already started");
                handle.abort();
            }
        }
        Self::Pending {
            handle: tokio::spawn(f),
        }
    }

    pub fn ready(self, signal: oneshot::Sender<()>, port: u16) -> ExecutionResult<Self> {
        match self {
            Self::Pending { handle } => Ok(Self::Running {
                signal,
                handle,
                port,
            }),
            _ => Err(ExecutionError::internal(
                "the server must be in pending state before it can be ready",
            )),
        }
    }

    pub async fn stop(self) {
        match self {
            Self::Stopped => {}
            Self::Pending { handle } => {
                handle.abort();
            }
            Self::Running {
                signal,
                handle,
                port: _,
            } => {
                let _ = signal.send(());
                match handle.await {
                    Ok(Err(e)) => warn!("server stopped with error: {e}"),
                    Err(e) => warn!("failed to join the server task: {e}"),
                    Ok(Ok(())) => {}
                }
            }
        }
    }

    pub fn port(&self) -> Option<u16> {
        match self {
            Self::Running { port, .. } => Some(*port),
            _ => None,
        }
    }
}
