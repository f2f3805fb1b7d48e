// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Records kept for each watched Kubernetes object.
//!
//! A record carries only what the reconciler and the rendered index need, and is
//! cheap to clone into a snapshot.

use crate::constants::{HEADLESS_CLUSTER_IP, KIND_INGRESS, KIND_SERVICE};
use crate::store::{Index, Indexes, Record};
use k8s_openapi::api::core::v1::Service;
use k8s_openapi::api::networking::v1::{Ingress, IngressRule};
use kube::ResourceExt;
use serde::Serialize;
use std::net::IpAddr;
use tracing::warn;

/// One port exposed by a Service.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ServicePortRecord {
    pub name: Option<String>,
    pub port: i32,
    pub protocol: Option<String>,
}

/// Latest known state of a Service.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ServiceRecord {
    pub namespace: String,
    pub name: String,
    /// Derived hostname, `<name>.<namespace>`
    pub hostname: String,
    /// Cluster IP; `None` for headless, unassigned or unparseable addresses
    pub address: Option<IpAddr>,
    pub service_type: Option<String>,
    pub ports: Vec<ServicePortRecord>,
}

impl ServiceRecord {
    #[must_use]
    pub fn new(namespace: &str, name: &str, address: Option<IpAddr>) -> Self {
        Self {
            namespace: namespace.to_string(),
            name: name.to_string(),
            hostname: derived_hostname(name, namespace),
            address,
            service_type: None,
            ports: Vec::new(),
        }
    }
}

/// Hostname published for a Service.
#[must_use]
pub fn derived_hostname(name: &str, namespace: &str) -> String {
    format!("{name}.{namespace}")
}

/// Parse a Service `clusterIP` value.
///
/// Headless (`None`) and empty values yield `None` silently; anything else that
/// is not an IP address yields `None` with a warning.
#[must_use]
pub fn parse_cluster_ip(raw: Option<&str>) -> Option<IpAddr> {
    let value = raw.map(str::trim).filter(|v| !v.is_empty())?;
    if value == HEADLESS_CLUSTER_IP {
        return None;
    }
    match value.parse::<IpAddr>() {
        Ok(address) => Some(address),
        Err(e) => {
            warn!(cluster_ip = value, error = %e, "Ignoring unparseable cluster IP");
            None
        }
    }
}

impl From<&Service> for ServiceRecord {
    fn from(service: &Service) -> Self {
        let namespace = service.namespace().unwrap_or_default();
        let name = service.name_any();
        let spec = service.spec.as_ref();

        let mut record = Self::new(
            &namespace,
            &name,
            parse_cluster_ip(spec.and_then(|s| s.cluster_ip.as_deref())),
        );
        record.service_type = spec.and_then(|s| s.type_.clone());
        record.ports = spec
            .and_then(|s| s.ports.as_ref())
            .map(|ports| {
                ports
                    .iter()
                    .map(|p| ServicePortRecord {
                        name: p.name.clone(),
                        port: p.port,
                        protocol: p.protocol.clone(),
                    })
                    .collect()
            })
            .unwrap_or_default();
        record
    }
}

/// Latest known state of an Ingress.
///
/// The rules are passed through to the rendered index untouched.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct RouteRecord {
    pub namespace: String,
    pub name: String,
    pub ingress_class: Option<String>,
    pub rules: Vec<IngressRule>,
}

impl RouteRecord {
    #[must_use]
    pub fn new(namespace: &str, name: &str, rules: Vec<IngressRule>) -> Self {
        Self {
            namespace: namespace.to_string(),
            name: name.to_string(),
            ingress_class: None,
            rules,
        }
    }
}

impl From<&Ingress> for RouteRecord {
    fn from(ingress: &Ingress) -> Self {
        let spec = ingress.spec.as_ref();
        let mut record = Self::new(
            &ingress.namespace().unwrap_or_default(),
            &ingress.name_any(),
            spec.and_then(|s| s.rules.clone()).unwrap_or_default(),
        );
        record.ingress_class = spec.and_then(|s| s.ingress_class_name.clone());
        record
    }
}

impl Record for ServiceRecord {
    const KIND: &'static str = KIND_SERVICE;

    fn namespace(&self) -> &str {
        &self.namespace
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn index(indexes: &Indexes) -> &Index<Self> {
        &indexes.services
    }

    fn index_mut(indexes: &mut Indexes) -> &mut Index<Self> {
        &mut indexes.services
    }
}

impl Record for RouteRecord {
    const KIND: &'static str = KIND_INGRESS;

    fn namespace(&self) -> &str {
        &self.namespace
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn index(indexes: &Indexes) -> &Index<Self> {
        &indexes.routes
    }

    fn index_mut(indexes: &mut Indexes) -> &mut Index<Self> {
        &mut indexes.routes
    }
}

#[cfg(test)]
#[path = "records_tests.rs"]
mod records_tests;
