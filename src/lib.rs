// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! # kube-hosts-sync - Kubernetes Services into a hosts file
//!
//! kube-hosts-sync watches Services and Ingresses across every namespace of a
//! cluster and keeps two local artifacts in sync with them:
//!
//! - a hosts file, where each Service is published as `name.namespace` (plus
//!   any configured alias targets) at its cluster IP
//! - a human-readable index rendered from a user-supplied template
//!
//! ## Overview
//!
//! Only hosts entries whose address falls in the managed cluster IP range are
//! ever changed. That range is purged at startup and again on shutdown, so the
//! file never keeps stale cluster addresses across restarts.
//!
//! ## Modules
//!
//! - [`hosts`] - Hosts file parsing, mutation and atomic persistence
//! - [`store`] - In-memory store of the latest known records
//! - [`reconciler`] - Applies resource events to the hosts file, store and output
//! - [`render`] - Template rendering of the index document
//! - [`watch`] - Watch drivers feeding kube events into the reconciler
//! - [`context`] - Shared context and credential selection
//!
//! ## Example
//!
//! ```rust,no_run
//! use kube_hosts_sync::config::Settings;
//! use kube_hosts_sync::aliases::AliasTable;
//! use kube_hosts_sync::context::build_reconciler;
//! use kube_hosts_sync::records::ServiceRecord;
//!
//! # async fn example() -> anyhow::Result<()> {
//! let settings = Settings::from_env()?;
//! let aliases = AliasTable::load(&settings.alias_mapping_path)?;
//! let reconciler = build_reconciler(&settings, aliases);
//!
//! reconciler.purge_managed_range().await?;
//! reconciler
//!     .apply_service(ServiceRecord::new("default", "api", "10.96.0.20".parse().ok()))
//!     .await?;
//! # Ok(())
//! # }
//! ```

pub mod aliases;
pub mod config;
pub mod constants;
pub mod context;
pub mod errors;
pub mod fs_util;
pub mod hosts;
pub mod reconciler;
pub mod records;
pub mod render;
pub mod store;
pub mod watch;
