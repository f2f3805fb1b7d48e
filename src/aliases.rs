// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Static alias expansion table.
//!
//! The table is loaded once at startup from a YAML document of the form:
//!
//! ```yaml
//! mappings:
//!   - source: svc-a.ns1
//!     targets:
//!       - alpha.internal
//!       - beta.internal
//! ```
//!
//! A service whose derived hostname equals `source` is additionally published
//! under every target. The table is never mutated after load.

use crate::errors::ConfigError;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use tracing::{debug, warn};

/// One entry of the alias mapping document.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AliasMapping {
    pub source: String,
    #[serde(default)]
    pub targets: Vec<String>,
}

/// The alias mapping document as stored on disk.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AliasDocument {
    #[serde(default)]
    pub mappings: Vec<AliasMapping>,
}

/// Read-only lookup from source alias to its ordered targets.
#[derive(Clone, Debug, Default)]
pub struct AliasTable {
    targets: HashMap<String, Vec<String>>,
}

impl AliasTable {
    /// Load the alias table from a YAML document on disk.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::AliasDocumentUnreadable`] if the file cannot be read and
    /// [`ConfigError::AliasDocumentMalformed`] if it does not parse.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path).map_err(|source| {
            ConfigError::AliasDocumentUnreadable {
                path: path.to_path_buf(),
                source,
            }
        })?;
        let document: AliasDocument =
            serde_yaml::from_str(&raw).map_err(|source| ConfigError::AliasDocumentMalformed {
                path: path.to_path_buf(),
                source,
            })?;

        let table = Self::from_document(document);
        debug!(
            path = %path.display(),
            sources = table.len(),
            "Loaded alias mapping document"
        );
        Ok(table)
    }

    /// Build the table from an already parsed document.
    ///
    /// The first mapping for a given source wins; later duplicates are ignored.
    /// Targets keep their document order with repeats removed.
    #[must_use]
    pub fn from_document(document: AliasDocument) -> Self {
        let mut targets: HashMap<String, Vec<String>> = HashMap::new();

        for mapping in document.mappings {
            let source = mapping.source.trim().to_string();
            if source.is_empty() {
                warn!("Ignoring alias mapping with an empty source");
                continue;
            }
            if targets.contains_key(&source) {
                warn!(
                    source = %source,
                    "Duplicate alias mapping source, keeping the first definition"
                );
                continue;
            }

            let mut ordered: Vec<String> = Vec::with_capacity(mapping.targets.len());
            for target in mapping.targets {
                let target = target.trim().to_string();
                if !target.is_empty() && target != source && !ordered.contains(&target) {
                    ordered.push(target);
                }
            }
            targets.insert(source, ordered);
        }

        Self { targets }
    }

    /// Targets configured for `source`, empty when there is no mapping.
    #[must_use]
    pub fn targets(&self, source: &str) -> &[String] {
        self.targets.get(source).map(Vec::as_slice).unwrap_or_default()
    }

    /// Number of configured sources.
    #[must_use]
    pub fn len(&self) -> usize {
        self.targets.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.targets.is_empty()
    }
}

#[cfg(test)]
#[path = "aliases_tests.rs"]
mod aliases_tests;
