//! Operator entrypoint: loads the controller configuration, then runs the
//! extension controller and the admission webhook server side by side.

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context as _;
use clap::Parser;
use kube::Client;
use tokio_util::sync::CancellationToken;
use tracing::info;
use tracing_subscriber::EnvFilter;

use authn_operator::config::ControllerConfig;
use authn_operator::controller::run_extension_controller;
use authn_operator::webhook::{serve, WebhookState};

/// Provides cluster authentication and authorization in managed clusters
#[derive(Parser)]
#[command(name = "authn-operator")]
#[command(about = "Cluster authentication extension operator")]
#[command(version)]
struct Options {
    /// Path to the mounted controller configuration file
    #[arg(
        long,
        env = "AUTHN_OPERATOR_CONFIG",
        default_value = "/etc/authn-operator/config.yaml"
    )]
    config: String,

    /// Bind address of the mutating admission webhook server
    #[arg(long, default_value = "0.0.0.0:10250")]
    webhook_bind: SocketAddr,

    /// Run the controller without the admission webhook server
    #[arg(long)]
    disable_webhook: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let options = Options::parse();

    let config = ControllerConfig::from_mounted_file(&options.config)
        .with_context(|| format!("loading configuration from {}", options.config))?;
    config.validate().context("validating configuration")?;
    let config = Arc::new(config);

    info!(variant = ?config.variant, "configuration loaded");

    let client = Client::try_default()
        .await
        .context("creating kubernetes client")?;

    let shutdown = CancellationToken::new();
    {
        let shutdown = shutdown.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                info!("shutdown signal received");
                shutdown.cancel();
            }
        });
    }

    let controller_handle = tokio::spawn({
        let client = client.clone();
        let config = config.clone();
        let shutdown = shutdown.clone();
        async move { run_extension_controller(client, config, shutdown).await }
    });

    if options.disable_webhook {
        controller_handle.await??;
        return Ok(());
    }

    let webhook_handle = tokio::spawn({
        let state = Arc::new(WebhookState {
            client,
            config: config.clone(),
        });
        let addr = options.webhook_bind;
        async move { serve(state, addr).await }
    });

    let (controller_result, webhook_result) =
        tokio::try_join!(controller_handle, webhook_handle).context("task join error")?;
    controller_result?;
    webhook_result?;

    Ok(())
}
