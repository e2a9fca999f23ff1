//! Workspaces Operator - Jupyter workspaces on Kubernetes

use clap::Parser;
use kube::Client;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use workspaces_operator::config::{Cli, Command, ControllerConfig};
use workspaces_operator::controller_runner::{build_usage_controllers, build_workspace_controllers};
use workspaces_operator::crds::{crds_yaml, ensure_crds_installed};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();

    if cli.crd {
        println!("{}", crds_yaml()?);
        return Ok(());
    }

    match cli.command {
        Some(Command::Controller) | None => run_controller(cli.controller).await,
    }
}

async fn run_controller(config: ControllerConfig) -> anyhow::Result<()> {
    tracing::info!("Workspaces controller starting...");

    let client = Client::try_default()
        .await
        .map_err(|e| anyhow::anyhow!("Failed to create Kubernetes client: {}", e))?;

    if config.skip_crd_install {
        tracing::info!("Skipping CRD installation");
    } else {
        ensure_crds_installed(&client).await?;
    }

    let timing = config.timing();
    tracing::info!(?timing, "Starting controllers:");
    let mut controllers =
        build_workspace_controllers(client.clone(), timing, config.compliance_enabled());
    controllers.extend(build_usage_controllers(client, timing));

    // Each controller stops on SIGTERM/SIGINT
    futures::future::join_all(controllers).await;

    tracing::info!("Workspaces controller shutting down");
    Ok(())
}
