//! klaudio Kubernetes Operator
//!
//! Main entry point for the operator. Sets up the Kubernetes client,
//! registers the CRD controllers, and runs the reconciliation loops.

use std::sync::Arc;

use kube::Client;
use tokio::signal;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use klaudio_operator::{
    controllers::{self, Context},
    metrics,
};

/// Default metrics port
const METRICS_PORT: u16 = 8080;

/// Placement policy published on Ready ResourceRefs when the environment
/// does not override it
const DEFAULT_PLACEMENTS: &str = "account-1";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    init_tracing();

    info!("Starting klaudio operator");

    // Create Kubernetes client
    let client = Client::try_default().await?;
    info!("Connected to Kubernetes API server");

    // Create shared context
    let placements = placements_from_env();
    info!(placements = ?placements, "Resolved placement policy");
    let context = Arc::new(Context::new(client.clone(), placements));

    // Start metrics server
    let metrics_handle = tokio::spawn(metrics::serve(METRICS_PORT));
    info!("Metrics server starting on port {}", METRICS_PORT);

    // Run all controllers concurrently
    let resource_ref_controller =
        controllers::run_resource_ref_controller(client.clone(), context.clone());
    let resource_group_controller =
        controllers::run_resource_group_controller(client.clone(), context.clone());
    let deployment_controller =
        controllers::run_deployment_controller(client.clone(), context.clone());
    let resource_controller =
        controllers::run_resource_controller(client.clone(), context.clone());
    let namespace_controller =
        controllers::run_namespace_controller(client.clone(), context.clone());

    // Handle graceful shutdown
    tokio::select! {
        _ = resource_ref_controller => {
            error!("ResourceRef controller exited unexpectedly");
        }
        _ = resource_group_controller => {
            error!("ResourceGroup controller exited unexpectedly");
        }
        _ = deployment_controller => {
            error!("ResourceGroupDeployment controller exited unexpectedly");
        }
        _ = resource_controller => {
            error!("Resource controller exited unexpectedly");
        }
        _ = namespace_controller => {
            error!("Namespace controller exited unexpectedly");
        }
        _ = metrics_handle => {
            error!("Metrics server exited unexpectedly");
        }
        _ = shutdown_signal() => {
            info!("Received shutdown signal, stopping operator");
        }
    }

    info!("klaudio operator stopped");
    Ok(())
}

/// JSON logs filtered through RUST_LOG; chatty dependencies default to warn
fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,kube=warn,hyper=warn"));
    let format = tracing_subscriber::fmt::layer().json();

    tracing_subscriber::registry().with(filter).with(format).init();
}

/// Placement policy from KLAUDIO_PLACEMENTS, comma-separated
fn placements_from_env() -> Vec<String> {
    std::env::var("KLAUDIO_PLACEMENTS")
        .unwrap_or_else(|_| DEFAULT_PLACEMENTS.to_string())
        .split(',')
        .map(str::trim)
        .filter(|placement| !placement.is_empty())
        .map(String::from)
        .collect()
}

/// Resolves once SIGTERM or CTRL+C arrives
async fn shutdown_signal() {
    #[cfg(unix)]
    {
        let mut sigterm = signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("SIGTERM handler installation failed");
        tokio::select! {
            _ = signal::ctrl_c() => info!("CTRL+C received"),
            _ = sigterm.recv() => info!("SIGTERM received"),
        }
    }

    #[cfg(not(unix))]
    {
        signal::ctrl_c()
            .await
            .expect("CTRL+C handler installation failed");
        info!("CTRL+C received");
    }
}
