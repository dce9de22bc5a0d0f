use bootstrap::{LifecycleManager, ServiceGraph, ServicesConfig};
use std::process::ExitCode;
use tokio::sync::watch;

use server::config::services_config_path;
use server::services;

#[actix_web::main]
async fn main() -> ExitCode {
    // Load .env file if it exists (for development)
    // Try loading from current directory first, then from server/ directory
    if dotenvy::dotenv().is_err() {
        dotenvy::from_filename("server/.env").ok();
    }

    env_logger::init_from_env(env_logger::Env::default().default_filter_or("info"));

    log::info!("Starting identity server...");

    let config_path = services_config_path();
    let config = match ServicesConfig::load_from_file(&config_path) {
        Ok(config) => config,
        Err(e) => {
            log::error!("{}", e);
            eprintln!("Hint: Set SERVICES_CONFIG environment variable or run from the workspace root");
            return ExitCode::FAILURE;
        }
    };
    let phase_timeout = config.phase_timeout();

    let graph = match ServiceGraph::build(config.services) {
        Ok(graph) => graph,
        Err(e) => {
            log::error!("Invalid service graph in '{}': {}", config_path.display(), e);
            return ExitCode::FAILURE;
        }
    };
    log::info!("Service start order: {}", graph.linear_ordering().join(" -> "));

    let manager = LifecycleManager::new(services::registry()).with_phase_timeout(phase_timeout);

    // Ctrl-C while services are still coming up aborts the bootstrap.
    let (abort_tx, abort_rx) = watch::channel(false);
    let interrupt = tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            let _ = abort_tx.send(true);
        }
    });

    let running = match manager.bootstrap_until(&graph, abort_rx).await {
        Ok(running) => running,
        Err(e) => {
            log::error!("Bootstrap failed: {}", e);
            for failure in e.rollback_failures() {
                log::error!("Rollback: {}", failure);
            }
            return ExitCode::FAILURE;
        }
    };
    interrupt.abort();

    log::info!(
        "Running services: {} (Ctrl-C to stop)",
        running.names().join(", ")
    );
    if let Err(e) = tokio::signal::ctrl_c().await {
        log::error!("Failed to listen for shutdown signal: {}", e);
    }

    log::info!("Shutting down...");
    if let Err(e) = running.shutdown().await {
        for failure in &e.failures {
            log::error!("Shutdown: {}", failure);
        }
    }

    ExitCode::SUCCESS
}
