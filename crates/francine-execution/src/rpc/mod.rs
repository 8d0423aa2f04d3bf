mod client;
mod codec;
mod monitor;
mod server;

pub use client::{ClientOptions, RpcClient};
pub use codec::{RpcRequest, RpcResponse};
pub use monitor::ServerMonitor;
pub use server::{serve, RpcHandler};
