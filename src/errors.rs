// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Error types for the hosts synchronizer.
//!
//! This module provides specialized error types for:
//! - Startup configuration (environment settings, alias document, credentials)
//! - Hosts file load/flush failures
//! - Template rendering and output writes
//!
//! [`ReconcileError`] is what a single reconciliation attempt returns. Render
//! failures never appear there: they are logged by the reconciler and retried on
//! the next trigger.

use std::path::PathBuf;
use thiserror::Error;

/// Errors raised while building the startup configuration.
///
/// Every variant is fatal: the watch loops are never started.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// An environment variable holds a value that cannot be used
    #[error("Invalid value '{value}' for {variable}: {reason}")]
    InvalidValue {
        /// The environment variable name
        variable: String,
        /// The rejected value
        value: String,
        /// Why the value was rejected
        reason: String,
    },

    /// The alias mapping document could not be read
    #[error("Failed to read alias mapping document {}: {source}", path.display())]
    AliasDocumentUnreadable {
        /// Path of the alias document
        path: PathBuf,
        /// Underlying I/O error
        #[source]
        source: std::io::Error,
    },

    /// The alias mapping document is not valid YAML for the expected shape
    #[error("Malformed alias mapping document {}: {source}", path.display())]
    AliasDocumentMalformed {
        /// Path of the alias document
        path: PathBuf,
        /// Underlying YAML error
        #[source]
        source: serde_yaml::Error,
    },

    /// Kubernetes credentials could not be resolved
    #[error("Failed to resolve Kubernetes credentials: {0}")]
    Credentials(String),
}

/// Errors raised while loading or persisting the hosts file.
#[derive(Error, Debug)]
pub enum HostsError {
    /// The hosts file could not be read
    #[error("Failed to load hosts file {}: {source}", path.display())]
    Load {
        /// Path of the hosts file
        path: PathBuf,
        /// Underlying I/O error
        #[source]
        source: std::io::Error,
    },

    /// The hosts file could not be written back
    #[error("Failed to flush hosts file {}: {source}", path.display())]
    Flush {
        /// Path of the hosts file
        path: PathBuf,
        /// Underlying I/O error
        #[source]
        source: std::io::Error,
    },
}

/// Errors raised while rendering the output document.
#[derive(Error, Debug)]
pub enum RenderError {
    /// The template file could not be read
    #[error("Failed to read template {}: {source}", path.display())]
    TemplateUnreadable {
        /// Path of the template
        path: PathBuf,
        /// Underlying I/O error
        #[source]
        source: std::io::Error,
    },

    /// Tera failed to parse or execute the template
    #[error("Template error: {0}")]
    Template(#[from] tera::Error),

    /// The rendered document could not be written
    #[error("Failed to write rendered output {}: {source}", path.display())]
    Write {
        /// Destination path
        path: PathBuf,
        /// Underlying I/O error
        #[source]
        source: std::io::Error,
    },
}

/// Error returned by a single reconciliation attempt.
#[derive(Error, Debug)]
pub enum ReconcileError {
    /// Hosts file I/O failed; the mutation was not persisted
    #[error(transparent)]
    Hosts(#[from] HostsError),
}

impl ReconcileError {
    /// Returns a short machine-friendly reason code, used as a log field.
    #[must_use]
    pub fn reason(&self) -> &'static str {
        match self {
            Self::Hosts(HostsError::Load { .. }) => "HostsLoadFailed",
            Self::Hosts(HostsError::Flush { .. }) => "HostsFlushFailed",
        }
    }
}

#[cfg(test)]
#[path = "errors_tests.rs"]
mod errors_tests;
