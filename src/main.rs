// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

use anyhow::{anyhow, Context as _, Result};
use clap::Parser;
use kube_hosts_sync::{
    aliases::AliasTable,
    config::{CredentialMode, Settings},
    constants::{ENV_LOG_FORMAT, TOKIO_THREAD_NAME, TOKIO_WORKER_THREADS},
    context::{connect, Context},
    watch::{run_route_driver, run_service_driver},
};
use std::future::Future;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, error, info};

/// Keeps a hosts file and a rendered index in sync with cluster Services.
#[derive(Debug, Parser)]
#[command(name = "kube-hosts-sync", version, about)]
struct Cli {
    /// Kubeconfig file to use; implies LOCAL credentials
    #[arg(long, value_name = "PATH")]
    kubeconfig: Option<PathBuf>,
}

impl Cli {
    fn credentials(&self, settings: &Settings) -> CredentialMode {
        if self.kubeconfig.is_some() {
            CredentialMode::Local
        } else {
            settings.credentials
        }
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Build Tokio runtime with custom thread names
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(TOKIO_WORKER_THREADS)
        .thread_name(TOKIO_THREAD_NAME)
        .enable_all()
        .build()?;

    runtime.block_on(async_main(cli))
}

fn init_logging() {
    // Respects RUST_LOG if set, otherwise defaults to INFO level.
    // RUST_LOG_FORMAT=json switches to structured output.
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));

    let log_format = std::env::var(ENV_LOG_FORMAT).unwrap_or_else(|_| "text".to_string());

    match log_format.to_lowercase().as_str() {
        "json" => {
            tracing_subscriber::fmt()
                .with_env_filter(env_filter)
                .with_file(true)
                .with_line_number(true)
                .with_thread_names(true)
                .with_target(false)
                .json()
                .init();
        }
        _ => {
            tracing_subscriber::fmt()
                .with_env_filter(env_filter)
                .with_file(true)
                .with_line_number(true)
                .with_thread_names(true)
                .with_target(false)
                .with_ansi(true)
                .compact()
                .init();
        }
    }
}

async fn async_main(cli: Cli) -> Result<()> {
    init_logging();
    info!("Starting hosts sync daemon");

    let settings = Settings::from_env().context("Invalid configuration")?;
    debug!(settings = ?settings, "Resolved settings");

    let aliases = AliasTable::load(&settings.alias_mapping_path)
        .context("Failed to load alias mapping document")?;
    info!(sources = aliases.len(), "Alias mappings loaded");

    let client = connect(cli.credentials(&settings), cli.kubeconfig.as_deref())
        .await
        .context("Failed to initialize Kubernetes client")?;
    debug!("Kubernetes client initialized successfully");

    let context = Arc::new(Context::new(client, settings, aliases));
    run(context, shutdown_signal()).await
}

/// Purge, drive both watches until `shutdown` resolves, then quiesce.
///
/// The drivers never return on their own; if one does, the hosts file is still
/// quiesced and the exit is reported as an error. A failed quiesce is reported
/// as an error too.
async fn run<F>(context: Arc<Context>, shutdown: F) -> Result<()>
where
    F: Future<Output = Result<()>>,
{
    let reconciler = context.reconciler.clone();
    if let Err(err) = reconciler.purge_managed_range().await {
        error!(error = %err, "Failed to purge managed hosts entries at startup");
    }

    info!("Starting watch drivers");
    let outcome = tokio::select! {
        () = run_service_driver(context.clone()) => {
            error!("CRITICAL: Service driver exited unexpectedly");
            Err(anyhow!("Service driver exited unexpectedly"))
        }
        () = run_route_driver(context.clone()) => {
            error!("CRITICAL: Ingress driver exited unexpectedly");
            Err(anyhow!("Ingress driver exited unexpectedly"))
        }
        result = shutdown => result,
    };

    let removed = reconciler
        .quiesce()
        .await
        .context("Failed to purge managed hosts entries on shutdown")?;
    info!(removed, "Hosts file quiesced, exiting");

    outcome
}

/// Resolves on SIGINT or SIGTERM.
async fn shutdown_signal() -> Result<()> {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        let mut sigterm =
            signal(SignalKind::terminate()).context("Failed to install SIGTERM handler")?;
        tokio::select! {
            result = tokio::signal::ctrl_c() => {
                result.context("Failed to listen for SIGINT")?;
                info!("Received SIGINT, shutting down");
            }
            _ = sigterm.recv() => {
                info!("Received SIGTERM, shutting down");
            }
        }
    }

    #[cfg(not(unix))]
    {
        tokio::signal::ctrl_c()
            .await
            .context("Failed to listen for Ctrl+C")?;
        info!("Received Ctrl+C, shutting down");
    }

    Ok(())
}
