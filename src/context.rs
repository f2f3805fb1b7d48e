// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Shared context for the watch drivers.
//!
//! Both drivers receive an `Arc<Context>` holding:
//! - Kubernetes client
//! - Resolved runtime settings
//! - The reconciler that owns the hosts file, the store and the renderer
//!
//! Credential selection also lives here: in-cluster service account, or a
//! kubeconfig file when running outside the cluster.

use crate::aliases::AliasTable;
use crate::config::{CredentialMode, Settings};
use crate::constants::DEFAULT_KUBECONFIG_RELATIVE_PATH;
use crate::errors::ConfigError;
use crate::hosts::HostsFileAdapter;
use crate::reconciler::Reconciler;
use crate::render::OutputRenderer;
use kube::config::{KubeConfigOptions, Kubeconfig};
use kube::Client;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info};

/// Shared context passed to both drivers.
#[derive(Clone)]
pub struct Context {
    /// Kubernetes client for the watch streams
    pub client: Client,

    /// Settings resolved at startup
    pub settings: Settings,

    /// Reconciler shared by both drivers
    pub reconciler: Arc<Reconciler>,
}

impl Context {
    #[must_use]
    pub fn new(client: Client, settings: Settings, aliases: AliasTable) -> Self {
        let reconciler = Arc::new(build_reconciler(&settings, aliases));
        Self {
            client,
            settings,
            reconciler,
        }
    }
}

/// Wire a [`Reconciler`] from settings and a loaded alias table.
#[must_use]
pub fn build_reconciler(settings: &Settings, aliases: AliasTable) -> Reconciler {
    Reconciler::new(
        HostsFileAdapter::new(settings.hosts_path.clone(), settings.managed_range),
        Arc::new(aliases),
        OutputRenderer::new(
            settings.template_path.clone(),
            settings.output_path.clone(),
            settings.default_route_host.clone(),
        ),
    )
}

/// Kubeconfig file to load, or `None` for in-cluster credentials.
///
/// An explicit path always selects it. Otherwise `Local` mode falls back to
/// `$HOME/.kube/config`.
///
/// # Errors
///
/// Returns [`ConfigError::Credentials`] in `Local` mode when no explicit path
/// is given and `home` is unknown.
pub fn kubeconfig_path(
    mode: CredentialMode,
    explicit: Option<&Path>,
    home: Option<&Path>,
) -> Result<Option<PathBuf>, ConfigError> {
    if let Some(path) = explicit {
        return Ok(Some(path.to_path_buf()));
    }
    match mode {
        CredentialMode::Cluster => Ok(None),
        CredentialMode::Local => home
            .map(|home| Some(home.join(DEFAULT_KUBECONFIG_RELATIVE_PATH)))
            .ok_or_else(|| {
                ConfigError::Credentials(
                    "HOME is not set, cannot locate the default kubeconfig".to_string(),
                )
            }),
    }
}

/// Build a Kubernetes client for the selected credentials.
///
/// # Errors
///
/// Returns [`ConfigError::Credentials`] when the service account or kubeconfig
/// cannot be loaded, or the client cannot be constructed.
pub async fn connect(mode: CredentialMode, explicit: Option<&Path>) -> Result<Client, ConfigError> {
    let home = std::env::var_os("HOME").map(PathBuf::from);
    let config = match kubeconfig_path(mode, explicit, home.as_deref())? {
        None => {
            debug!("Using in-cluster service account credentials");
            kube::Config::incluster().map_err(|e| ConfigError::Credentials(e.to_string()))?
        }
        Some(path) => {
            info!(path = %path.display(), "Using kubeconfig credentials");
            let kubeconfig = Kubeconfig::read_from(&path).map_err(|e| {
                ConfigError::Credentials(format!("{}: {e}", path.display()))
            })?;
            kube::Config::from_custom_kubeconfig(kubeconfig, &KubeConfigOptions::default())
                .await
                .map_err(|e| ConfigError::Credentials(format!("{}: {e}", path.display())))?
        }
    };

    Client::try_from(config).map_err(|e| ConfigError::Credentials(e.to_string()))
}

#[cfg(test)]
#[path = "context_tests.rs"]
mod context_tests;
