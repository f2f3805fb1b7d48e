// Common test utilities for integration tests

#![allow(dead_code)]

use k8s_openapi::api::core::v1::Service;
use kube::client::Client;
use kube_hosts_sync::config::Settings;
use serde_json::json;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

/// Hosts file content that does not belong to the daemon
pub const EXTERNAL_HOSTS: &str = "\
# Managed by the node image
127.0.0.1\tlocalhost
::1\tlocalhost ip6-localhost ip6-loopback
192.168.1.10   nas.lan    # home storage
";

/// Get a Kubernetes client or skip the test if not in a cluster
pub async fn get_kube_client_or_skip() -> Option<Client> {
    match Client::try_default().await {
        Ok(client) => Some(client),
        Err(e) => {
            eprintln!("Skipping integration test: no reachable Kubernetes cluster: {e}");
            None
        }
    }
}

/// Path of the template shipped with the repository
pub fn demo_template() -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR")).join("demos/index.md.tera")
}

/// Settings rooted in `dir`, with `hosts` seeded from `hosts_content`
pub fn settings_in(dir: &TempDir, hosts_content: &str) -> Settings {
    let hosts_path = dir.path().join("hosts");
    std::fs::write(&hosts_path, hosts_content).expect("seed hosts file");

    let mut settings = Settings::from_lookup(|_| None).expect("default settings");
    settings.hosts_path = hosts_path;
    settings.template_path = demo_template();
    settings.output_path = dir.path().join("index.md");
    settings
}

/// Build a Service as the API server would return it
pub fn service(namespace: &str, name: &str, cluster_ip: &str) -> Service {
    serde_json::from_value(json!({
        "apiVersion": "v1",
        "kind": "Service",
        "metadata": {
            "name": name,
            "namespace": namespace
        },
        "spec": {
            "clusterIP": cluster_ip,
            "type": "ClusterIP",
            "ports": [{ "name": "http", "port": 80, "protocol": "TCP" }]
        }
    }))
    .expect("valid Service")
}

pub fn read(path: &Path) -> String {
    std::fs::read_to_string(path).expect("readable file")
}
