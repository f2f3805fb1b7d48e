// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! In-memory resource store.
//!
//! Holds the latest known [`ServiceRecord`] and [`RouteRecord`] per identity,
//! grouped by namespace. Both indexes sit behind one lock, so a
//! [`RenderSnapshot`] is always a consistent view across the two kinds and never
//! contains a half-applied upsert.

use crate::records::{RouteRecord, ServiceRecord};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use tokio::sync::RwLock;

/// Identity of a namespaced object.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ObjectKey {
    pub namespace: String,
    pub name: String,
}

impl ObjectKey {
    #[must_use]
    pub fn new(namespace: &str, name: &str) -> Self {
        Self {
            namespace: namespace.to_string(),
            name: name.to_string(),
        }
    }

    #[must_use]
    pub fn of<R: Record>(record: &R) -> Self {
        Self::new(record.namespace(), record.name())
    }
}

impl fmt::Display for ObjectKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.namespace, self.name)
    }
}

/// Records of one kind: namespace → name → record.
#[derive(Debug)]
pub struct Index<R>(BTreeMap<String, BTreeMap<String, R>>);

impl<R> Default for Index<R> {
    fn default() -> Self {
        Self(BTreeMap::new())
    }
}

impl<R: Clone> Index<R> {
    fn grouped(&self) -> BTreeMap<String, Vec<R>> {
        self.0
            .iter()
            .map(|(namespace, by_name)| (namespace.clone(), by_name.values().cloned().collect()))
            .collect()
    }
}

/// Both indexes, guarded together by the store lock.
#[derive(Debug, Default)]
pub struct Indexes {
    pub(crate) services: Index<ServiceRecord>,
    pub(crate) routes: Index<RouteRecord>,
}

/// A kind of record the store can hold.
pub trait Record: Clone + Send + Sync + 'static {
    /// Kubernetes kind name, used in logs
    const KIND: &'static str;

    fn namespace(&self) -> &str;

    fn name(&self) -> &str;

    fn index(indexes: &Indexes) -> &Index<Self>;

    fn index_mut(indexes: &mut Indexes) -> &mut Index<Self>;
}

/// Thread-safe store of the latest known records.
#[derive(Debug, Default)]
pub struct ResourceStore {
    indexes: RwLock<Indexes>,
}

impl ResourceStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace the record for its identity, returning the previous one.
    pub async fn upsert<R: Record>(&self, record: R) -> Option<R> {
        let mut indexes = self.indexes.write().await;
        R::index_mut(&mut indexes)
            .0
            .entry(record.namespace().to_string())
            .or_default()
            .insert(record.name().to_string(), record)
    }

    /// Remove the record for an identity, returning it if it was known.
    pub async fn delete<R: Record>(&self, namespace: &str, name: &str) -> Option<R> {
        let mut indexes = self.indexes.write().await;
        let by_namespace = &mut R::index_mut(&mut indexes).0;
        let by_name = by_namespace.get_mut(namespace)?;
        let removed = by_name.remove(name);
        if by_name.is_empty() {
            by_namespace.remove(namespace);
        }
        removed
    }

    pub async fn get<R: Record>(&self, namespace: &str, name: &str) -> Option<R> {
        let indexes = self.indexes.read().await;
        R::index(&indexes)
            .0
            .get(namespace)
            .and_then(|by_name| by_name.get(name))
            .cloned()
    }

    /// Identities of every stored record of kind `R`.
    pub async fn identities<R: Record>(&self) -> BTreeSet<ObjectKey> {
        let indexes = self.indexes.read().await;
        R::index(&indexes)
            .0
            .iter()
            .flat_map(|(namespace, by_name)| {
                by_name.keys().map(move |name| ObjectKey::new(namespace, name))
            })
            .collect()
    }

    /// Every stored record of kind `R`, ordered by namespace then name.
    pub async fn list<R: Record>(&self) -> Vec<R> {
        let indexes = self.indexes.read().await;
        R::index(&indexes)
            .0
            .values()
            .flat_map(|by_name| by_name.values().cloned())
            .collect()
    }

    /// Copy the current state of both kinds into a [`RenderSnapshot`].
    pub async fn snapshot(&self, default_route_host: &str) -> RenderSnapshot {
        let indexes = self.indexes.read().await;
        RenderSnapshot {
            services: indexes.services.grouped(),
            routes: indexes.routes.grouped(),
            default_route_host: default_route_host.to_string(),
            generated_at: Utc::now(),
        }
    }
}

/// Point-in-time copy of the store handed to the renderer.
#[derive(Clone, Debug, Serialize)]
pub struct RenderSnapshot {
    pub services: BTreeMap<String, Vec<ServiceRecord>>,
    pub routes: BTreeMap<String, Vec<RouteRecord>>,
    pub default_route_host: String,
    pub generated_at: DateTime<Utc>,
}

/// Records of one namespace, as exposed to templates.
#[derive(Debug, Serialize)]
pub struct NamespaceView<'a> {
    pub name: &'a str,
    pub services: &'a [ServiceRecord],
    pub routes: &'a [RouteRecord],
}

impl RenderSnapshot {
    /// Every namespace holding at least one record, sorted by name.
    #[must_use]
    pub fn namespaces(&self) -> Vec<NamespaceView<'_>> {
        let names: BTreeSet<&str> = self
            .services
            .keys()
            .chain(self.routes.keys())
            .map(String::as_str)
            .collect();

        names
            .into_iter()
            .map(|name| NamespaceView {
                name,
                services: self.services.get(name).map(Vec::as_slice).unwrap_or_default(),
                routes: self.routes.get(name).map(Vec::as_slice).unwrap_or_default(),
            })
            .collect()
    }
}

#[cfg(test)]
#[path = "store_tests.rs"]
mod store_tests;
