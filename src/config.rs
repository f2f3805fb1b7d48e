// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Environment-driven runtime settings.
//!
//! Every setting is optional and falls back to a default from
//! [`crate::constants`]. The loader is built on a lookup function so tests can
//! inject values without touching the process environment.

use crate::constants::{
    DEFAULT_ALIAS_MAPPING_PATH, DEFAULT_CLUSTER_IP_CIDR, DEFAULT_HOSTS_PATH, DEFAULT_INGRESS_HOST,
    DEFAULT_OUTPUT_PATH, DEFAULT_RESYNC_INTERVAL_SECS, DEFAULT_TEMPLATE_PATH,
    ENV_ALIAS_MAPPING_PATH, ENV_CLUSTER_IP_CIDR, ENV_DEFAULT_INGRESS_HOST, ENV_HOSTS_PATH,
    ENV_KUBECONFIG_MODE, ENV_OUTPUT_PATH, ENV_RESYNC_INTERVAL_SECS, ENV_TEMPLATE_PATH,
};
use crate::errors::ConfigError;
use ipnet::IpNet;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

/// How Kubernetes credentials are obtained.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum CredentialMode {
    /// Service account token mounted into the pod
    #[default]
    Cluster,
    /// A kubeconfig file on the local filesystem
    Local,
}

impl FromStr for CredentialMode {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.to_ascii_uppercase().as_str() {
            "CLUSTER" => Ok(Self::Cluster),
            "LOCAL" => Ok(Self::Local),
            _ => Err("expected CLUSTER or LOCAL".to_string()),
        }
    }
}

/// Runtime settings resolved once at startup.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Settings {
    pub alias_mapping_path: PathBuf,
    pub template_path: PathBuf,
    pub output_path: PathBuf,
    pub hosts_path: PathBuf,
    pub default_route_host: String,
    /// Address range whose hosts entries belong to this daemon
    pub managed_range: IpNet,
    pub credentials: CredentialMode,
    pub resync_interval: Duration,
}

impl Settings {
    /// Resolve settings from the process environment.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidValue`] when a variable is set to an unusable value.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Resolve settings through an arbitrary variable lookup.
    ///
    /// Empty values are treated as unset.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidValue`] when a variable is set to an unusable value.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |name: &str| lookup(name).filter(|value| !value.trim().is_empty());
        let path = |name: &str, default: &str| {
            PathBuf::from(get(name).unwrap_or_else(|| default.to_string()))
        };

        let managed_range = parse_or_default(get(ENV_CLUSTER_IP_CIDR), ENV_CLUSTER_IP_CIDR, || {
            DEFAULT_CLUSTER_IP_CIDR.parse::<IpNet>().map_err(|e| e.to_string())
        })?;
        let credentials = parse_or_default(get(ENV_KUBECONFIG_MODE), ENV_KUBECONFIG_MODE, || {
            Ok(CredentialMode::default())
        })?;
        let resync_secs: u64 = parse_or_default(
            get(ENV_RESYNC_INTERVAL_SECS),
            ENV_RESYNC_INTERVAL_SECS,
            || Ok(DEFAULT_RESYNC_INTERVAL_SECS),
        )?;
        if resync_secs == 0 {
            return Err(ConfigError::InvalidValue {
                variable: ENV_RESYNC_INTERVAL_SECS.to_string(),
                value: "0".to_string(),
                reason: "interval must be greater than zero".to_string(),
            });
        }

        Ok(Self {
            alias_mapping_path: path(ENV_ALIAS_MAPPING_PATH, DEFAULT_ALIAS_MAPPING_PATH),
            template_path: path(ENV_TEMPLATE_PATH, DEFAULT_TEMPLATE_PATH),
            output_path: path(ENV_OUTPUT_PATH, DEFAULT_OUTPUT_PATH),
            hosts_path: path(ENV_HOSTS_PATH, DEFAULT_HOSTS_PATH),
            default_route_host: get(ENV_DEFAULT_INGRESS_HOST)
                .unwrap_or_else(|| DEFAULT_INGRESS_HOST.to_string()),
            managed_range,
            credentials,
            resync_interval: Duration::from_secs(resync_secs),
        })
    }
}

fn parse_or_default<T, D>(raw: Option<String>, variable: &str, default: D) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
    D: FnOnce() -> Result<T, String>,
{
    let invalid = |value: String, reason: String| ConfigError::InvalidValue {
        variable: variable.to_string(),
        value,
        reason,
    };

    match raw {
        Some(value) => value
            .trim()
            .parse::<T>()
            .map_err(|e| invalid(value.clone(), e.to_string())),
        None => default().map_err(|reason| invalid(String::new(), reason)),
    }
}

#[cfg(test)]
#[path = "config_tests.rs"]
mod config_tests;
