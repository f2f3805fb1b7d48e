// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Watch drivers for Services and Ingresses.
//!
//! Each driver consumes a kube watcher stream for one kind across all
//! namespaces and feeds every event into the shared [`Reconciler`]. The stream
//! is converted into [`ResourceEvent`]s first, so the driving loop can be
//! exercised with any stream in tests.
//!
//! A relist (initial list, or a re-list after the watch expired) is applied
//! without rendering. When it completes, stored identities that were not
//! re-listed are deleted and the output is rendered once.

use crate::constants::{KIND_INGRESS, KIND_SERVICE, WATCH_RESTART_DELAY_SECS};
use crate::context::Context;
use crate::errors::ReconcileError;
use crate::reconciler::{ReconcileOutcome, Reconciler, Render};
use crate::records::{RouteRecord, ServiceRecord};
use crate::store::{ObjectKey, Record};
use futures::{Stream, StreamExt, TryStreamExt};
use k8s_openapi::api::core::v1::Service;
use k8s_openapi::api::networking::v1::Ingress;
use kube::api::Api;
use kube::runtime::watcher::{self, watcher, Event};
use kube::runtime::WatchStreamExt;
use kube::Resource;
use serde::de::DeserializeOwned;
use std::collections::BTreeSet;
use std::fmt::{Debug, Display};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, error, info, warn};

/// One change notification for a watched kind.
#[derive(Clone, Debug, PartialEq)]
pub enum ResourceEvent<R> {
    /// The object was added or modified
    Applied(R),
    /// The object was deleted
    Deleted(R),
    /// A full relist is starting
    RelistStarted,
    /// One object of the relist in progress
    Relisted(R),
    /// The relist is complete
    RelistDone,
}

fn from_watcher<K, R>(event: Event<K>) -> ResourceEvent<R>
where
    R: for<'a> From<&'a K>,
{
    match event {
        Event::Apply(object) => ResourceEvent::Applied(R::from(&object)),
        Event::Delete(object) => ResourceEvent::Deleted(R::from(&object)),
        Event::Init => ResourceEvent::RelistStarted,
        Event::InitApply(object) => ResourceEvent::Relisted(R::from(&object)),
        Event::InitDone => ResourceEvent::RelistDone,
    }
}

/// A record kind the drivers know how to reconcile.
pub trait WatchedKind: Record + Debug {
    /// Apply one object.
    fn apply(
        reconciler: &Reconciler,
        record: Self,
        render: Render,
    ) -> impl Future<Output = Result<ReconcileOutcome, ReconcileError>> + Send;

    /// Delete one identity.
    fn delete(
        reconciler: &Reconciler,
        namespace: &str,
        name: &str,
        render: Render,
    ) -> impl Future<Output = Result<ReconcileOutcome, ReconcileError>> + Send;

    /// Periodic resync of everything stored for this kind.
    fn resync(
        reconciler: &Reconciler,
    ) -> impl Future<Output = Result<ReconcileOutcome, ReconcileError>> + Send;
}

impl WatchedKind for ServiceRecord {
    async fn apply(
        reconciler: &Reconciler,
        record: Self,
        render: Render,
    ) -> Result<ReconcileOutcome, ReconcileError> {
        reconciler.reconcile_service(record, render).await
    }

    async fn delete(
        reconciler: &Reconciler,
        namespace: &str,
        name: &str,
        render: Render,
    ) -> Result<ReconcileOutcome, ReconcileError> {
        reconciler.remove_service(namespace, name, render).await
    }

    async fn resync(reconciler: &Reconciler) -> Result<ReconcileOutcome, ReconcileError> {
        reconciler.resync_services().await
    }
}

impl WatchedKind for RouteRecord {
    async fn apply(
        reconciler: &Reconciler,
        record: Self,
        render: Render,
    ) -> Result<ReconcileOutcome, ReconcileError> {
        Ok(reconciler.reconcile_route(record, render).await)
    }

    async fn delete(
        reconciler: &Reconciler,
        namespace: &str,
        name: &str,
        render: Render,
    ) -> Result<ReconcileOutcome, ReconcileError> {
        Ok(reconciler.remove_route(namespace, name, render).await)
    }

    async fn resync(reconciler: &Reconciler) -> Result<ReconcileOutcome, ReconcileError> {
        reconciler.render_logged().await;
        Ok(ReconcileOutcome::default())
    }
}

/// Watch every object of kind `K` and map the events into records.
///
/// Transport errors are retried with the watcher's default backoff and still
/// surface as `Err` items.
pub fn watch_events<K, R>(
    api: Api<K>,
    config: watcher::Config,
) -> impl Stream<Item = Result<ResourceEvent<R>, watcher::Error>> + Send
where
    K: Resource + Clone + DeserializeOwned + Debug + Send + 'static,
    R: for<'a> From<&'a K> + Send + 'static,
{
    watcher(api, config)
        .default_backoff()
        .map_ok(from_watcher::<K, R>)
}

/// Consume `events` until the stream ends.
///
/// Stream errors are logged and skipped. Reconciliation errors are logged and
/// left for the periodic resync, which runs every `resync_interval`.
pub async fn drive_stream<R, S, E>(
    reconciler: &Reconciler,
    events: S,
    resync_interval: Duration,
) where
    R: WatchedKind,
    S: Stream<Item = Result<ResourceEvent<R>, E>>,
    E: Display,
{
    let mut events = std::pin::pin!(events);
    let mut resync = tokio::time::interval_at(Instant::now() + resync_interval, resync_interval);
    resync.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut relist: Option<BTreeSet<ObjectKey>> = None;

    loop {
        tokio::select! {
            event = events.next() => match event {
                Some(Ok(event)) => handle_event(reconciler, event, &mut relist).await,
                Some(Err(err)) => warn!(kind = R::KIND, error = %err, "Watch stream error"),
                None => {
                    info!(kind = R::KIND, "Watch stream ended");
                    return;
                }
            },
            _ = resync.tick() => {
                debug!(kind = R::KIND, "Periodic resync");
                log_failure::<R>(None, R::resync(reconciler).await);
            }
        }
    }
}

async fn handle_event<R: WatchedKind>(
    reconciler: &Reconciler,
    event: ResourceEvent<R>,
    relist: &mut Option<BTreeSet<ObjectKey>>,
) {
    match event {
        ResourceEvent::Applied(record) => {
            let key = ObjectKey::of(&record);
            log_failure::<R>(Some(&key), R::apply(reconciler, record, Render::Now).await);
        }
        ResourceEvent::Deleted(record) => {
            let key = ObjectKey::of(&record);
            log_failure::<R>(
                Some(&key),
                R::delete(reconciler, &key.namespace, &key.name, Render::Now).await,
            );
        }
        ResourceEvent::RelistStarted => {
            debug!(kind = R::KIND, "Relist started");
            *relist = Some(BTreeSet::new());
        }
        ResourceEvent::Relisted(record) => {
            let key = ObjectKey::of(&record);
            if let Some(seen) = relist.as_mut() {
                seen.insert(key.clone());
            }
            log_failure::<R>(Some(&key), R::apply(reconciler, record, Render::Deferred).await);
        }
        ResourceEvent::RelistDone => {
            if let Some(seen) = relist.take() {
                let vanished: Vec<ObjectKey> = reconciler
                    .store()
                    .identities::<R>()
                    .await
                    .into_iter()
                    .filter(|key| !seen.contains(key))
                    .collect();
                for key in &vanished {
                    log_failure::<R>(
                        Some(key),
                        R::delete(reconciler, &key.namespace, &key.name, Render::Deferred).await,
                    );
                }
                info!(
                    kind = R::KIND,
                    listed = seen.len(),
                    removed = vanished.len(),
                    "Relist complete"
                );
            }
            reconciler.render_logged().await;
        }
    }
}

fn log_failure<R: WatchedKind>(
    key: Option<&ObjectKey>,
    result: Result<ReconcileOutcome, ReconcileError>,
) {
    if let Err(err) = result {
        error!(
            kind = R::KIND,
            object = %key.map(ToString::to_string).unwrap_or_default(),
            reason = err.reason(),
            error = %err,
            "Reconciliation failed, will retry at next resync"
        );
    }
}

/// Drive the watch for kind `K` forever, restarting it whenever it ends.
pub async fn run_driver<K, R>(
    reconciler: Arc<Reconciler>,
    api: Api<K>,
    resync_interval: Duration,
) where
    K: Resource + Clone + DeserializeOwned + Debug + Send + 'static,
    R: WatchedKind + for<'a> From<&'a K>,
{
    loop {
        info!(kind = R::KIND, "Starting watch");
        let events = watch_events::<K, R>(api.clone(), watcher::Config::default());
        drive_stream(&reconciler, events, resync_interval).await;

        warn!(
            kind = R::KIND,
            delay_secs = WATCH_RESTART_DELAY_SECS,
            "Restarting watch"
        );
        tokio::time::sleep(Duration::from_secs(WATCH_RESTART_DELAY_SECS)).await;
    }
}

/// Watch Services in every namespace.
pub async fn run_service_driver(context: Arc<Context>) {
    info!("Starting {} driver", KIND_SERVICE);
    let api = Api::<Service>::all(context.client.clone());
    run_driver::<Service, ServiceRecord>(
        context.reconciler.clone(),
        api,
        context.settings.resync_interval,
    )
    .await;
}

/// Watch Ingresses in every namespace.
pub async fn run_route_driver(context: Arc<Context>) {
    info!("Starting {} driver", KIND_INGRESS);
    let api = Api::<Ingress>::all(context.client.clone());
    run_driver::<Ingress, RouteRecord>(
        context.reconciler.clone(),
        api,
        context.settings.resync_interval,
    )
    .await;
}

#[cfg(test)]
#[path = "watch_tests.rs"]
mod watch_tests;
