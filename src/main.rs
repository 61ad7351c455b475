//! Router static DNS operator
//!
//! Main entry point for the operator. Registers the DNS CRD, resolves the
//! router settings, and runs the DNS controller next to the metrics server.

use std::sync::Arc;

use kube::Client;
use tokio::signal;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use pikube_dns_operator::{
    adapters::RouterSettings,
    controllers::{self, Context},
    crd, metrics,
    router::RouterClient,
};

/// Default metrics port
const DEFAULT_METRICS_PORT: u16 = 8080;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    init_tracing();

    info!("Starting pikube DNS operator");

    // Create Kubernetes client
    let client = Client::try_default().await?;
    info!("Connected to Kubernetes API server");

    // The CRD must exist before the controller starts watching
    crd::ensure_crd(client.clone()).await?;

    let settings = RouterSettings::from_env()?;
    match settings.resolve() {
        Ok(cfg) => info!(router = %cfg.host, verify_tls = cfg.verify_tls, "Router configured"),
        Err(e) => warn!(
            error = %e,
            "Router settings incomplete, DNS resources will fail until fixed"
        ),
    }

    let router = Arc::new(RouterClient::new()?);
    let context = Arc::new(Context::new(client.clone(), router, settings));

    // Start metrics server
    let metrics_port = metrics_port()?;
    let metrics_handle = tokio::spawn(metrics::serve(metrics_port));
    info!("Metrics server starting on port {}", metrics_port);

    let dns_controller = controllers::run_dns_controller(client.clone(), context.clone());

    // Handle graceful shutdown
    tokio::select! {
        _ = dns_controller => {
            error!("DNS controller exited unexpectedly");
        }
        _ = metrics_handle => {
            error!("Metrics server exited unexpectedly");
        }
        _ = shutdown_signal() => {
            info!("Received shutdown signal, stopping operator");
        }
    }

    metrics::OPERATOR_HEALTH.set(0.0);
    info!("pikube DNS operator stopped");
    Ok(())
}

/// Metrics port from `METRICS_PORT`, or the default
fn metrics_port() -> anyhow::Result<u16> {
    match std::env::var("METRICS_PORT") {
        Ok(raw) if !raw.is_empty() => raw
            .parse()
            .map_err(|e| anyhow::anyhow!("Invalid METRICS_PORT '{}': {}", raw, e)),
        _ => Ok(DEFAULT_METRICS_PORT),
    }
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
