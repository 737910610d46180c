use std::sync::Arc;

use clap::Parser;
use kube::Client;
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use pgcluster_operator::config::ApplyPolicyArgs;
use pgcluster_operator::controller::{ApplyPolicyRequest, apply_policies};
use pgcluster_operator::health::{HealthState, run_health_server};
use pgcluster_operator::{Cli, Command, OperatorConfig, build_context, run_controllers};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Install the TLS crypto provider before any TLS operations
    if rustls::crypto::aws_lc_rs::default_provider()
        .install_default()
        .is_err()
        && rustls::crypto::CryptoProvider::get_default().is_none()
    {
        return Err("Failed to install rustls crypto provider and no provider is available".into());
    }

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("pgcluster_operator=info".parse()?)
                .add_directive("kube=info".parse()?),
        )
        .init();

    let cli = Cli::parse();

    let client = Client::try_default().await?;
    info!("Connected to Kubernetes cluster");

    match cli.command {
        Some(Command::ApplyPolicy(args)) => apply_policy(client, &cli.operator, args).await,
        Some(Command::Run) | None => run(client, cli.operator).await,
    }
}

async fn run(client: Client, config: OperatorConfig) -> Result<(), Box<dyn std::error::Error>> {
    info!(
        namespace = config.namespace().unwrap_or("all"),
        resync_secs = config.resync_period_secs,
        "Starting pgcluster-operator"
    );

    let health_state = Arc::new(HealthState::new());

    // Probes should answer before the watches are established
    let health_handle = {
        let health_state = health_state.clone();
        let port = config.health_port;
        tokio::spawn(async move {
            if let Err(e) = run_health_server(health_state, port).await {
                error!("Health server error: {}", e);
            }
        })
    };

    let ctx = Arc::new(build_context(
        client.clone(),
        &config,
        Some(health_state.clone()),
    ));
    let shutdown = CancellationToken::new();

    let mut controllers = {
        let shutdown = shutdown.clone();
        let config = config.clone();
        tokio::spawn(async move { run_controllers(client, ctx, &config, shutdown).await })
    };

    tokio::select! {
        result = &mut controllers => {
            return match result {
                Ok(Ok(())) => {
                    warn!("Watch loops exited");
                    Ok(())
                }
                Ok(Err(e)) => {
                    error!(error = %e, "Watch loops aborted");
                    Err(e.into())
                }
                Err(e) => {
                    error!("Controller task panicked: {}", e);
                    Err(e.into())
                }
            };
        }
        result = health_handle => {
            if let Err(e) = result {
                error!("Health server task panicked: {}", e);
            }
            shutdown.cancel();
        }
        _ = shutdown_signal() => {
            info!("Received shutdown signal, initiating graceful shutdown...");
            health_state.set_ready(false).await;
            shutdown.cancel();
        }
    }

    // Give in-flight workflows time to complete
    let grace = config.shutdown_grace_period();
    info!("Waiting up to {}s for watch loops to stop...", grace.as_secs());
    if tokio::time::timeout(grace, &mut controllers).await.is_err() {
        warn!("Grace period elapsed before every watch loop stopped");
    }

    info!("Operator stopped");
    Ok(())
}

async fn apply_policy(
    client: Client,
    config: &OperatorConfig,
    args: ApplyPolicyArgs,
) -> Result<(), Box<dyn std::error::Error>> {
    let ctx = build_context(client, config, None);
    let request = ApplyPolicyRequest {
        namespace: args.namespace,
        policies: args.policies,
        selector: args.selector,
        dry_run: args.dry_run,
        username: args.username,
    };

    let results = apply_policies(&ctx, &request).await?;
    if request.dry_run {
        for target in &results.targets {
            println!("{target}");
        }
        return Ok(());
    }
    for pair in &results.applied {
        println!("applied {} to {}", pair.policy, pair.cluster);
    }
    for pair in &results.skipped {
        println!("{} already applied to {}", pair.policy, pair.cluster);
    }
    Ok(())
}

/// Wait for shutdown signal (SIGTERM or SIGINT)
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
