//! Composition Operator
//!
//! Main entry point for the operator. Sets up the Kubernetes client,
//! starts the owner index watcher and the CRD controllers, and runs the
//! reconciliation loops.

use std::sync::Arc;

use kube::Client;
use tokio::signal;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use composition_operator::{
    config::OperatorConfig,
    controllers::{self, Context},
    metrics,
    owner_index::{self, OwnerIndex},
};

/// Default metrics port
const METRICS_PORT: u16 = 8080;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    init_tracing();

    info!("Starting Composition Operator");

    // Create Kubernetes client
    let client = Client::try_default().await?;
    info!("Connected to Kubernetes API server");

    // Explicit configuration shared by both controllers
    let config = OperatorConfig::default();
    let index = Arc::new(OwnerIndex::new(&config));
    let context = Arc::new(Context::new(client.clone(), config, index.clone()));

    // Start metrics server
    let metrics_handle = tokio::spawn(metrics::serve(METRICS_PORT));
    info!("Metrics server starting on port {}", METRICS_PORT);

    // Keep the child-to-composition index current
    let index_watcher = tokio::spawn(owner_index::run_index_watcher(client.clone(), index));

    // Run both controllers concurrently
    let composition_controller =
        controllers::run_composition_controller(client.clone(), context.clone());
    let component_controller = controllers::run_component_controller(client.clone(), context.clone());

    // Handle graceful shutdown
    tokio::select! {
        _ = composition_controller => {
            error!("Composition controller exited unexpectedly");
        }
        _ = component_controller => {
            error!("Component controller exited unexpectedly");
        }
        _ = index_watcher => {
            error!("Owner index watcher exited unexpectedly");
        }
        _ = metrics_handle => {
            error!("Metrics server exited unexpectedly");
        }
        _ = shutdown_signal() => {
            info!("Received shutdown signal, stopping operator");
        }
    }

    info!("Composition Operator stopped");
    Ok(())
}

/// Initialize tracing subscriber
fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,kube=warn,hyper=warn"));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer().json())
        .init();
}

/// Wait for shutdown signal (SIGTERM or SIGINT)
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install CTRL+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received CTRL+C signal");
        }
        _ = terminate => {
            info!("Received SIGTERM signal");
        }
    }
}
