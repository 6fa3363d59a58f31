mod bootstrap;
mod error;
mod shutdown;

use bootstrap::Services;
use shutdown::Shutdown;

/// Drives cycles back-to-back until [`Shutdown::should_shutdown`] flips,
/// with a short pause between cycles so an otherwise idle node doesn't spin
/// a worker at 100%.
async fn run_cycle_loop(services: Services, shutdown: std::sync::Arc<Shutdown>) {
    services.job_manager.start_execution();
    loop {
        services.job_manager.invoke_cycle_and_wait().await;
        if shutdown.should_shutdown() {
            break;
        }
        tokio::time::sleep(std::time::Duration::from_millis(10)).await;
    }
    services.job_manager.stop_execution();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    hive_common::tracing_setup::init_tracing("hive_node=info,hive_common=info,hive_net=info,hive_services=info");

    let config = hive_common::ConfigLoader::default().load()?;
    tracing::info!(?config, "loaded configuration");

    let services = Services::new(&config).await?;
    tracing::info!(node_id = %services.node_id, "node started");

    let shutdown = Shutdown::new();
    shutdown.watch_signals();

    run_cycle_loop(services, shutdown).await;

    tracing::info!("node shut down");
    Ok(())
}
