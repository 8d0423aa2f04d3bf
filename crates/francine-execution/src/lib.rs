pub mod cluster;
pub mod coordinator;
pub mod error;
pub mod id;
pub mod protocol;
pub mod rpc;
pub mod task;
pub mod transport;

pub use coordinator::entrypoint::run_coordinator;
