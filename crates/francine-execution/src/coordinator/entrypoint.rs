use francine_common::config::AppConfig;
use francine_server::actor::ActorSystem;
use log::info;

use crate::coordinator::Coordinator;
use crate::error::ExecutionResult;

/// Runs the coordinator until the process receives Ctrl-C.
pub async fn run_coordinator(config: &AppConfig) -> ExecutionResult<()> {
    let mut system = ActorSystem::new();
    let coordinator = Coordinator::from_config(&mut system, config)?;
    info!(
        "coordinator started with {} static worker(s)",
        config.cluster.workers.len()
    );
    tokio::signal::ctrl_c().await?;
    info!("shutting down the coordinator");
    coordinator.shutdown().await?;
    system.join().await;
    Ok(())
}
