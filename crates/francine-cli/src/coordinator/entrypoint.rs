use std::path::Path;

use francine_common::config::AppConfig;
use francine_telemetry::telemetry::{init_telemetry, shutdown_telemetry, ResourceOptions};

pub fn run_master(path: Option<&Path>) -> Result<(), Box<dyn std::error::Error>> {
    let config = AppConfig::load(path)?;
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?;

    runtime.block_on(async {
        let resource = ResourceOptions { kind: "master" };
        init_telemetry(&config.telemetry, resource)
    })?;

    runtime.block_on(francine_execution::run_coordinator(&config))?;

    shutdown_telemetry();

    Ok(())
}
