// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Global constants for the hosts synchronizer.
//!
//! This module contains all numeric and string constants used throughout the codebase.
//! Constants are organized by category for easy maintenance.

// ============================================================================
// Environment Variable Names
// ============================================================================

/// Path of the YAML alias mapping document
pub const ENV_ALIAS_MAPPING_PATH: &str = "ALIAS_MAPPING_PATH";

/// Path of the tera template used for the rendered index
pub const ENV_TEMPLATE_PATH: &str = "TEMPLATE_PATH";

/// Destination path of the rendered index
pub const ENV_OUTPUT_PATH: &str = "OUTPUT_PATH";

/// Path of the hosts file kept in sync
pub const ENV_HOSTS_PATH: &str = "HOSTS_PATH";

/// Route host shown for namespaces without an Ingress
pub const ENV_DEFAULT_INGRESS_HOST: &str = "DEFAULT_INGRESS_HOST";

/// Address range owned by this daemon inside the hosts file
pub const ENV_CLUSTER_IP_CIDR: &str = "CLUSTER_IP_CIDR";

/// Credential selection (`CLUSTER` or `LOCAL`)
pub const ENV_KUBECONFIG_MODE: &str = "KUBECONFIG_MODE";

/// Interval between full resyncs, in seconds
pub const ENV_RESYNC_INTERVAL_SECS: &str = "RESYNC_INTERVAL_SECS";

/// Log output format (`text` or `json`)
pub const ENV_LOG_FORMAT: &str = "RUST_LOG_FORMAT";

// ============================================================================
// Configuration Defaults
// ============================================================================

/// Default alias mapping document location
pub const DEFAULT_ALIAS_MAPPING_PATH: &str = "/alias/mappings.yaml";

/// Default template location
pub const DEFAULT_TEMPLATE_PATH: &str = "/tmp/index.md.tpl";

/// Default rendered index location
pub const DEFAULT_OUTPUT_PATH: &str = "/data/index.md";

/// Default hosts file location
pub const DEFAULT_HOSTS_PATH: &str = "/etc/hosts";

/// Default route host for namespaces without an Ingress
pub const DEFAULT_INGRESS_HOST: &str = "istio";

/// Default Service cluster IP range (kubeadm default)
pub const DEFAULT_CLUSTER_IP_CIDR: &str = "10.96.0.0/12";

/// Kubeconfig location relative to `$HOME` in `LOCAL` mode
pub const DEFAULT_KUBECONFIG_RELATIVE_PATH: &str = ".kube/config";

// ============================================================================
// Kind Names
// ============================================================================

/// Kind name for `Service` resources
pub const KIND_SERVICE: &str = "Service";

/// Kind name for `Ingress` resources
pub const KIND_INGRESS: &str = "Ingress";

// ============================================================================
// Watch Loop Constants
// ============================================================================

/// Full resync interval (5 minutes)
pub const DEFAULT_RESYNC_INTERVAL_SECS: u64 = 300;

/// Delay before a watch stream that ended is started again
pub const WATCH_RESTART_DELAY_SECS: u64 = 5;

/// Service `clusterIP` value used by headless services
pub const HEADLESS_CLUSTER_IP: &str = "None";

// ============================================================================
// Runtime Constants
// ============================================================================

/// Number of worker threads for Tokio runtime
pub const TOKIO_WORKER_THREADS: usize = 2;

/// Thread name for Tokio worker threads
pub const TOKIO_THREAD_NAME: &str = "hosts-sync";
