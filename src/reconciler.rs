// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Event reconciliation.
//!
//! The [`Reconciler`] turns one service or route event into hosts-file
//! mutations, a store update and a render of the output document. It is shared
//! between the watch drivers behind an `Arc`; every piece of mutable state it
//! owns is guarded by its own lock.
//!
//! # Hostname publication
//!
//! A service `name` in `namespace` is published as `name.namespace` plus every
//! alias target configured for that hostname, all at the service's cluster IP.
//! Deleting the service removes the same set from its last stored address.
//! Addresses outside the managed range are stored and rendered but never
//! written to the hosts file.

use crate::aliases::AliasTable;
use crate::errors::{HostsError, ReconcileError, RenderError};
use crate::hosts::HostsFileAdapter;
use crate::records::{RouteRecord, ServiceRecord};
use crate::render::OutputRenderer;
use crate::store::{ObjectKey, ResourceStore};
use std::net::IpAddr;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

/// Whether a reconciliation renders the output document when it finishes.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Render {
    Now,
    /// The caller renders once after a batch, e.g. at the end of a relist
    Deferred,
}

/// What a single reconciliation did.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ReconcileOutcome {
    /// The hosts file was rewritten
    pub hosts_changed: bool,
    /// Hostnames published or withdrawn, alias targets included
    pub hostnames: usize,
}

/// Hostnames whose removal failed on I/O, retried at the next resync.
#[derive(Clone, Debug, PartialEq, Eq)]
struct PendingRemoval {
    address: IpAddr,
    hostnames: Vec<String>,
}

/// Applies resource events to the hosts file, the store and the output.
pub struct Reconciler {
    hosts: HostsFileAdapter,
    store: ResourceStore,
    aliases: Arc<AliasTable>,
    renderer: OutputRenderer,
    render_lock: Mutex<()>,
    pending_removals: Mutex<Vec<PendingRemoval>>,
}

impl Reconciler {
    #[must_use]
    pub fn new(
        hosts: HostsFileAdapter,
        aliases: Arc<AliasTable>,
        renderer: OutputRenderer,
    ) -> Self {
        Self {
            hosts,
            store: ResourceStore::new(),
            aliases,
            renderer,
            render_lock: Mutex::new(()),
            pending_removals: Mutex::new(Vec::new()),
        }
    }

    #[must_use]
    pub fn store(&self) -> &ResourceStore {
        &self.store
    }

    #[must_use]
    pub fn hosts(&self) -> &HostsFileAdapter {
        &self.hosts
    }

    /// Publish a service and render.
    ///
    /// # Errors
    ///
    /// Returns [`ReconcileError::Hosts`] when the hosts file cannot be loaded or
    /// flushed. The record is stored regardless, so the next resync retries, and
    /// the names at a previous address are queued for removal.
    pub async fn apply_service(
        &self,
        record: ServiceRecord,
    ) -> Result<ReconcileOutcome, ReconcileError> {
        self.reconcile_service(record, Render::Now).await
    }

    /// Withdraw a service and render. Unknown identities are a no-op.
    ///
    /// # Errors
    ///
    /// Returns [`ReconcileError::Hosts`] when the hosts file cannot be loaded or
    /// flushed. The removal is queued and retried at the next resync.
    pub async fn delete_service(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<ReconcileOutcome, ReconcileError> {
        self.remove_service(namespace, name, Render::Now).await
    }

    /// Store a route and render. Routes never touch the hosts file.
    pub async fn apply_route(&self, record: RouteRecord) -> ReconcileOutcome {
        self.reconcile_route(record, Render::Now).await
    }

    /// Forget a route and render.
    pub async fn delete_route(&self, namespace: &str, name: &str) -> ReconcileOutcome {
        self.remove_route(namespace, name, Render::Now).await
    }

    pub(crate) async fn reconcile_service(
        &self,
        record: ServiceRecord,
        render: Render,
    ) -> Result<ReconcileOutcome, ReconcileError> {
        let key = ObjectKey::of(&record);
        let hostnames = self.published_names(&record.hostname);
        let address = record.address.filter(|address| self.is_managed(&key, *address));

        if record.address.is_none() {
            warn!(
                service = %key,
                "Service has no usable cluster IP, publishing without an address"
            );
        }

        let managed = self.hosts.managed_range();
        let previous = self.store.upsert(record).await;
        let stale = previous
            .and_then(|previous| previous.address)
            .filter(|previous| address != Some(*previous) && managed.contains(previous));

        let result = self
            .hosts
            .transaction(|file| {
                let mut changed = false;
                if let Some(stale) = stale {
                    changed |= file.remove(stale, hostnames.as_slice());
                }
                if let Some(address) = address {
                    for hostname in &hostnames {
                        changed |= file.add(address, hostname);
                    }
                }
                changed
            })
            .await;

        self.finish(render).await;

        let hosts_changed = match result {
            Ok(changed) => changed.unwrap_or(false),
            Err(err) => {
                // The store already points at the new address; remember the old one
                if let Some(stale) = stale {
                    self.queue_removal(stale, hostnames).await;
                }
                return Err(err.into());
            }
        };
        if hosts_changed {
            info!(
                service = %key,
                address = ?address,
                hostnames = hostnames.len(),
                "Published service hostnames"
            );
        } else {
            debug!(service = %key, "Service hostnames already up to date");
        }

        Ok(ReconcileOutcome {
            hosts_changed,
            hostnames: hostnames.len(),
        })
    }

    pub(crate) async fn remove_service(
        &self,
        namespace: &str,
        name: &str,
        render: Render,
    ) -> Result<ReconcileOutcome, ReconcileError> {
        let key = ObjectKey::new(namespace, name);
        let Some(removed) = self.store.delete::<ServiceRecord>(namespace, name).await else {
            debug!(service = %key, "Delete for unknown service, nothing to do");
            return Ok(ReconcileOutcome::default());
        };

        let hostnames = self.published_names(&removed.hostname);
        let managed = self.hosts.managed_range();
        let Some(address) = removed.address.filter(|address| managed.contains(address)) else {
            self.finish(render).await;
            return Ok(ReconcileOutcome {
                hosts_changed: false,
                hostnames: hostnames.len(),
            });
        };

        let result = self
            .hosts
            .transaction(|file| file.remove(address, hostnames.as_slice()))
            .await;

        self.finish(render).await;

        let hosts_changed = match result {
            Ok(changed) => changed.unwrap_or(false),
            Err(err) => {
                self.queue_removal(address, hostnames).await;
                return Err(err.into());
            }
        };

        info!(
            service = %key,
            address = %address,
            hostnames = hostnames.len(),
            "Withdrew service hostnames"
        );

        Ok(ReconcileOutcome {
            hosts_changed,
            hostnames: hostnames.len(),
        })
    }

    pub(crate) async fn reconcile_route(
        &self,
        record: RouteRecord,
        render: Render,
    ) -> ReconcileOutcome {
        debug!(route = %ObjectKey::of(&record), "Storing route");
        self.store.upsert(record).await;
        self.finish(render).await;
        ReconcileOutcome::default()
    }

    pub(crate) async fn remove_route(
        &self,
        namespace: &str,
        name: &str,
        render: Render,
    ) -> ReconcileOutcome {
        let key = ObjectKey::new(namespace, name);
        if self.store.delete::<RouteRecord>(namespace, name).await.is_none() {
            debug!(route = %key, "Delete for unknown route, nothing to do");
            return ReconcileOutcome::default();
        }
        debug!(route = %key, "Forgot route");
        self.finish(render).await;
        ReconcileOutcome::default()
    }

    /// Re-publish every stored service and retry queued removals in one hosts
    /// transaction, then render.
    ///
    /// # Errors
    ///
    /// Returns [`ReconcileError::Hosts`] when the hosts file cannot be loaded or
    /// flushed. Queued removals stay queued in that case.
    pub async fn resync_services(&self) -> Result<ReconcileOutcome, ReconcileError> {
        let pending = std::mem::take(&mut *self.pending_removals.lock().await);
        let publications: Vec<(IpAddr, Vec<String>)> = self
            .store
            .list::<ServiceRecord>()
            .await
            .into_iter()
            .filter_map(|record| {
                let key = ObjectKey::of(&record);
                let address = record.address.filter(|address| self.is_managed(&key, *address))?;
                Some((address, self.published_names(&record.hostname)))
            })
            .collect();

        let result = self
            .hosts
            .transaction(|file| {
                let mut changed = false;
                for removal in &pending {
                    changed |= file.remove(removal.address, removal.hostnames.as_slice());
                }
                for (address, hostnames) in &publications {
                    for hostname in hostnames {
                        changed |= file.add(*address, hostname);
                    }
                }
                changed
            })
            .await;

        self.finish(Render::Now).await;

        let hosts_changed = match result {
            Ok(changed) => changed.unwrap_or(false),
            Err(err) => {
                self.pending_removals.lock().await.extend(pending);
                return Err(err.into());
            }
        };

        let hostnames = publications.iter().map(|(_, names)| names.len()).sum();
        if hosts_changed {
            info!(
                services = publications.len(),
                retried_removals = pending.len(),
                "Resync repaired hosts file"
            );
        } else {
            debug!(services = publications.len(), "Resync found hosts file up to date");
        }

        Ok(ReconcileOutcome {
            hosts_changed,
            hostnames,
        })
    }

    /// Render the output document from a fresh snapshot.
    ///
    /// Renders are serialized and the snapshot is taken inside the lock, so an
    /// older snapshot never overwrites a newer one.
    ///
    /// # Errors
    ///
    /// Returns a [`RenderError`] if the template or the destination fails.
    pub async fn render_output(&self) -> Result<(), RenderError> {
        let _guard = self.render_lock.lock().await;
        let snapshot = self.store.snapshot(self.renderer.default_route_host()).await;
        let renderer = self.renderer.clone();
        tokio::task::spawn_blocking(move || renderer.render(&snapshot))
            .await
            .map_err(|err| RenderError::Write {
                path: self.renderer.output_path().to_path_buf(),
                source: err.into(),
            })?
    }

    /// Remove every managed entry from the hosts file, keeping it open for
    /// updates. Called once before the drivers start.
    ///
    /// # Errors
    ///
    /// Returns a [`HostsError`] when the hosts file cannot be loaded or flushed.
    pub async fn purge_managed_range(&self) -> Result<usize, HostsError> {
        self.hosts.purge().await
    }

    /// Stop all further hosts updates and remove every managed entry.
    ///
    /// Safe to call concurrently with in-flight reconciliation and more than once.
    ///
    /// # Errors
    ///
    /// Returns a [`HostsError`] when the hosts file cannot be loaded or flushed.
    pub async fn quiesce(&self) -> Result<usize, HostsError> {
        self.hosts.close_and_purge().await
    }

    async fn queue_removal(&self, address: IpAddr, hostnames: Vec<String>) {
        debug!(
            address = %address,
            hostnames = hostnames.len(),
            "Queued hosts removal for next resync"
        );
        self.pending_removals
            .lock()
            .await
            .push(PendingRemoval { address, hostnames });
    }

    fn published_names(&self, hostname: &str) -> Vec<String> {
        std::iter::once(hostname.to_string())
            .chain(self.aliases.targets(hostname).iter().cloned())
            .collect()
    }

    fn is_managed(&self, key: &ObjectKey, address: IpAddr) -> bool {
        let managed = self.hosts.managed_range();
        if managed.contains(&address) {
            return true;
        }
        warn!(
            service = %key,
            address = %address,
            range = %managed,
            "Cluster IP outside the managed range, not writing it to the hosts file"
        );
        false
    }

    async fn finish(&self, render: Render) {
        if render == Render::Now {
            self.render_logged().await;
        }
    }

    pub(crate) async fn render_logged(&self) {
        if let Err(err) = self.render_output().await {
            warn!(
                error = %err,
                path = %self.renderer.output_path().display(),
                "Failed to render output document"
            );
        }
    }
}

#[cfg(test)]
#[path = "reconciler_tests.rs"]
mod reconciler_tests;
