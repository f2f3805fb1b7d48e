// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Unit tests for reconciler.rs

#[cfg(test)]
mod tests {
    use super::super::*;
    use crate::aliases::{AliasDocument, AliasMapping};
    use crate::hosts::HostsFile;
    use ipnet::IpNet;
    use k8s_openapi::api::networking::v1::IngressRule;
    use std::path::PathBuf;
    use tempfile::TempDir;

    const HOSTS: &str = "127.0.0.1 localhost\n192.168.1.10 nas.lan\n";
    const TEMPLATE: &str = "{% for ns in namespaces %}{{ ns.name }}:\
{% for svc in ns.services %} {{ svc.hostname }}{% if svc.address %}@{{ svc.address }}{% endif %}{% endfor %}\
{% if ns.routes | length == 0 %} route={{ default_route_host }}{% endif %}\n{% endfor %}";

    struct Fixture {
        dir: TempDir,
        reconciler: Reconciler,
    }

    impl Fixture {
        fn hosts_path(&self) -> PathBuf {
            self.dir.path().join("hosts")
        }

        fn output_path(&self) -> PathBuf {
            self.dir.path().join("index.md")
        }

        fn hosts_content(&self) -> String {
            std::fs::read_to_string(self.hosts_path()).unwrap()
        }

        fn hosts_file(&self) -> HostsFile {
            HostsFile::load(&self.hosts_path(), managed()).unwrap()
        }

        fn output(&self) -> String {
            std::fs::read_to_string(self.output_path()).unwrap()
        }
    }

    fn managed() -> IpNet {
        "10.96.0.0/12".parse().unwrap()
    }

    fn ip(value: &str) -> IpAddr {
        value.parse().unwrap()
    }

    fn aliases() -> AliasTable {
        AliasTable::from_document(AliasDocument {
            mappings: vec![AliasMapping {
                source: "svc-a.ns1".to_string(),
                targets: vec!["alpha.internal".to_string(), "beta.internal".to_string()],
            }],
        })
    }

    fn fixture_with(dir: TempDir, template: Option<&str>) -> Fixture {
        let hosts_path = dir.path().join("hosts");
        let template_path = dir.path().join("index.md.tpl");
        std::fs::write(&hosts_path, HOSTS).unwrap();
        if let Some(template) = template {
            std::fs::write(&template_path, template).unwrap();
        }

        let reconciler = Reconciler::new(
            HostsFileAdapter::new(hosts_path, managed()),
            Arc::new(aliases()),
            OutputRenderer::new(template_path, dir.path().join("index.md"), "istio".into()),
        );
        Fixture { dir, reconciler }
    }

    fn fixture() -> Fixture {
        fixture_with(TempDir::new().unwrap(), Some(TEMPLATE))
    }

    fn service(namespace: &str, name: &str, address: Option<&str>) -> ServiceRecord {
        ServiceRecord::new(namespace, name, address.map(ip))
    }

    fn addresses(file: &HostsFile, hostname: &str) -> Vec<IpAddr> {
        file.addresses_of(hostname)
    }

    #[tokio::test]
    async fn test_apply_publishes_hostname_and_alias_targets() {
        let fx = fixture();

        let outcome = fx
            .reconciler
            .apply_service(service("ns1", "svc-a", Some("10.100.0.5")))
            .await
            .unwrap();

        assert!(outcome.hosts_changed);
        assert_eq!(outcome.hostnames, 3);
        let file = fx.hosts_file();
        for hostname in ["svc-a.ns1", "alpha.internal", "beta.internal"] {
            assert_eq!(addresses(&file, hostname), vec![ip("10.100.0.5")]);
        }
        assert!(fx.hosts_content().starts_with(HOSTS));
        assert_eq!(fx.output(), "ns1: svc-a.ns1@10.100.0.5 route=istio\n");
    }

    #[tokio::test]
    async fn test_apply_without_alias_publishes_only_derived_hostname() {
        let fx = fixture();

        let outcome = fx
            .reconciler
            .apply_service(service("ns2", "svc-b", Some("10.100.0.6")))
            .await
            .unwrap();

        assert_eq!(outcome.hostnames, 1);
        assert_eq!(fx.hosts_content(), format!("{HOSTS}10.100.0.6 svc-b.ns2\n"));
    }

    #[tokio::test]
    async fn test_reapply_is_idempotent() {
        let fx = fixture();
        let record = service("ns1", "svc-a", Some("10.100.0.5"));
        fx.reconciler.apply_service(record.clone()).await.unwrap();
        let first = fx.hosts_content();

        let outcome = fx.reconciler.apply_service(record).await.unwrap();

        assert!(!outcome.hosts_changed);
        assert_eq!(fx.hosts_content(), first);
    }

    #[tokio::test]
    async fn test_delete_removes_hostname_and_alias_targets() {
        let fx = fixture();
        fx.reconciler
            .apply_service(service("ns1", "svc-a", Some("10.100.0.5")))
            .await
            .unwrap();

        let outcome = fx.reconciler.delete_service("ns1", "svc-a").await.unwrap();

        assert!(outcome.hosts_changed);
        assert_eq!(fx.hosts_content(), HOSTS);
        assert!(fx.reconciler.store().get::<ServiceRecord>("ns1", "svc-a").await.is_none());
        assert_eq!(fx.output(), "");
    }

    #[tokio::test]
    async fn test_delete_keeps_alias_target_claimed_by_another_address() {
        let fx = fixture();
        fx.reconciler
            .apply_service(service("ns1", "svc-a", Some("10.100.0.5")))
            .await
            .unwrap();
        fx.reconciler
            .hosts()
            .transaction(|file| file.add(ip("10.100.0.9"), "alpha.internal"))
            .await
            .unwrap();

        fx.reconciler.delete_service("ns1", "svc-a").await.unwrap();

        let file = fx.hosts_file();
        assert_eq!(addresses(&file, "alpha.internal"), vec![ip("10.100.0.9")]);
        assert!(addresses(&file, "beta.internal").is_empty());
        assert!(addresses(&file, "svc-a.ns1").is_empty());
    }

    #[tokio::test]
    async fn test_delete_unknown_service_is_noop() {
        let fx = fixture();

        let outcome = fx.reconciler.delete_service("ns1", "ghost").await.unwrap();

        assert_eq!(outcome, ReconcileOutcome::default());
        assert_eq!(fx.hosts_content(), HOSTS);
        assert!(!fx.output_path().exists());
    }

    #[tokio::test]
    async fn test_address_change_moves_every_hostname() {
        let fx = fixture();
        fx.reconciler
            .apply_service(service("ns1", "svc-a", Some("10.100.0.5")))
            .await
            .unwrap();

        fx.reconciler
            .apply_service(service("ns1", "svc-a", Some("10.100.0.8")))
            .await
            .unwrap();

        let file = fx.hosts_file();
        for hostname in ["svc-a.ns1", "alpha.internal", "beta.internal"] {
            assert_eq!(addresses(&file, hostname), vec![ip("10.100.0.8")]);
        }
        assert!(!fx.hosts_content().contains("10.100.0.5"));
    }

    #[tokio::test]
    async fn test_address_becoming_empty_unmaps_previous_address() {
        let fx = fixture();
        fx.reconciler
            .apply_service(service("ns1", "svc-a", Some("10.100.0.5")))
            .await
            .unwrap();

        let outcome = fx
            .reconciler
            .apply_service(service("ns1", "svc-a", None))
            .await
            .unwrap();

        assert!(outcome.hosts_changed);
        assert_eq!(fx.hosts_content(), HOSTS);
        let stored: ServiceRecord = fx.reconciler.store().get("ns1", "svc-a").await.unwrap();
        assert_eq!(stored.address, None);
        assert_eq!(fx.output(), "ns1: svc-a.ns1 route=istio\n");
    }

    #[tokio::test]
    async fn test_address_outside_managed_range_is_not_written() {
        let fx = fixture();

        let outcome = fx
            .reconciler
            .apply_service(service("ns1", "edge", Some("192.168.50.1")))
            .await
            .unwrap();

        assert!(!outcome.hosts_changed);
        assert_eq!(fx.hosts_content(), HOSTS);
        assert_eq!(fx.output(), "ns1: edge.ns1@192.168.50.1 route=istio\n");

        fx.reconciler.delete_service("ns1", "edge").await.unwrap();
        assert_eq!(fx.hosts_content(), HOSTS);
    }

    #[tokio::test]
    async fn test_routes_never_touch_hosts_file() {
        let fx = fixture();
        fx.reconciler
            .apply_service(service("shop", "web", Some("10.100.0.7")))
            .await
            .unwrap();
        let before = fx.hosts_content();

        fx.reconciler
            .apply_route(RouteRecord::new(
                "shop",
                "web",
                vec![IngressRule {
                    host: Some("shop.example.com".to_string()),
                    http: None,
                }],
            ))
            .await;

        assert_eq!(fx.hosts_content(), before);
        assert_eq!(fx.output(), "shop: web.shop@10.100.0.7\n");

        fx.reconciler.delete_route("shop", "web").await;
        assert_eq!(fx.hosts_content(), before);
        assert_eq!(fx.output(), "shop: web.shop@10.100.0.7 route=istio\n");
    }

    #[tokio::test]
    async fn test_render_failure_does_not_fail_apply() {
        let fx = fixture_with(TempDir::new().unwrap(), None);

        let outcome = fx
            .reconciler
            .apply_service(service("ns1", "svc-a", Some("10.100.0.5")))
            .await
            .unwrap();

        assert!(outcome.hosts_changed);
        assert!(!fx.output_path().exists());
        assert!(fx.reconciler.render_output().await.is_err());
    }

    #[tokio::test]
    async fn test_missing_hosts_file_fails_apply_but_keeps_record() {
        let fx = fixture();
        std::fs::remove_file(fx.hosts_path()).unwrap();

        let err = fx
            .reconciler
            .apply_service(service("ns1", "svc-a", Some("10.100.0.5")))
            .await
            .unwrap_err();

        assert_eq!(err.reason(), "HostsLoadFailed");
        assert!(fx.reconciler.store().get::<ServiceRecord>("ns1", "svc-a").await.is_some());
        assert_eq!(fx.output(), "ns1: svc-a.ns1@10.100.0.5 route=istio\n");
    }

    #[tokio::test]
    async fn test_failed_removal_is_retried_at_resync() {
        let fx = fixture();
        fx.reconciler
            .apply_service(service("ns1", "svc-b", Some("10.100.0.6")))
            .await
            .unwrap();
        let published = fx.hosts_content();
        std::fs::remove_file(fx.hosts_path()).unwrap();

        assert!(fx.reconciler.delete_service("ns1", "svc-b").await.is_err());
        std::fs::write(fx.hosts_path(), &published).unwrap();
        let outcome = fx.reconciler.resync_services().await.unwrap();

        assert!(outcome.hosts_changed);
        assert_eq!(fx.hosts_content(), HOSTS);
    }

    #[tokio::test]
    async fn test_failed_address_change_then_delete_cleans_old_address() {
        let fx = fixture();
        fx.reconciler
            .apply_service(service("ns1", "svc-b", Some("10.100.0.1")))
            .await
            .unwrap();
        let published = fx.hosts_content();
        std::fs::remove_file(fx.hosts_path()).unwrap();

        assert!(fx
            .reconciler
            .apply_service(service("ns1", "svc-b", Some("10.100.0.2")))
            .await
            .is_err());
        std::fs::write(fx.hosts_path(), &published).unwrap();
        fx.reconciler.delete_service("ns1", "svc-b").await.unwrap();
        assert_eq!(addresses(&fx.hosts_file(), "svc-b.ns1"), vec![ip("10.100.0.1")]);

        fx.reconciler.resync_services().await.unwrap();

        assert!(addresses(&fx.hosts_file(), "svc-b.ns1").is_empty());
        assert_eq!(fx.hosts_content(), HOSTS);
    }

    #[tokio::test]
    async fn test_failed_address_change_converges_at_resync() {
        let fx = fixture();
        fx.reconciler
            .apply_service(service("ns1", "svc-a", Some("10.100.0.1")))
            .await
            .unwrap();
        let published = fx.hosts_content();
        std::fs::remove_file(fx.hosts_path()).unwrap();

        assert!(fx
            .reconciler
            .apply_service(service("ns1", "svc-a", None))
            .await
            .is_err());
        std::fs::write(fx.hosts_path(), &published).unwrap();
        fx.reconciler.resync_services().await.unwrap();

        let file = fx.hosts_file();
        for hostname in ["svc-a.ns1", "alpha.internal", "beta.internal"] {
            assert!(addresses(&file, hostname).is_empty(), "{hostname} still mapped");
        }
        assert_eq!(fx.hosts_content(), HOSTS);
    }

    #[tokio::test]
    async fn test_resync_repairs_external_tampering() {
        let fx = fixture();
        fx.reconciler
            .apply_service(service("ns1", "svc-a", Some("10.100.0.5")))
            .await
            .unwrap();
        let published = fx.hosts_content();
        std::fs::write(fx.hosts_path(), HOSTS).unwrap();

        let outcome = fx.reconciler.resync_services().await.unwrap();

        assert!(outcome.hosts_changed);
        assert_eq!(outcome.hostnames, 3);
        assert_eq!(fx.hosts_content(), published);

        let again = fx.reconciler.resync_services().await.unwrap();
        assert!(!again.hosts_changed);
    }

    #[tokio::test]
    async fn test_quiesce_purges_and_stops_updates() {
        let fx = fixture();
        fx.reconciler
            .apply_service(service("ns1", "svc-a", Some("10.100.0.5")))
            .await
            .unwrap();

        assert_eq!(fx.reconciler.quiesce().await.unwrap(), 1);
        assert_eq!(fx.hosts_content(), HOSTS);

        let outcome = fx
            .reconciler
            .apply_service(service("ns2", "svc-b", Some("10.100.0.6")))
            .await
            .unwrap();
        assert!(!outcome.hosts_changed);
        assert_eq!(fx.hosts_content(), HOSTS);

        assert_eq!(fx.reconciler.quiesce().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_startup_purge_keeps_external_entries() {
        let fx = fixture();
        std::fs::write(
            fx.hosts_path(),
            format!("{HOSTS}10.100.0.99 leftover.ns9\n"),
        )
        .unwrap();

        assert_eq!(fx.reconciler.purge_managed_range().await.unwrap(), 1);

        assert_eq!(fx.hosts_content(), HOSTS);
        fx.reconciler
            .apply_service(service("ns1", "svc-b", Some("10.100.0.6")))
            .await
            .unwrap();
        assert!(fx.hosts_content().contains("10.100.0.6 svc-b.ns1"));
    }

    #[tokio::test]
    async fn test_last_event_wins_per_identity() {
        let fx = fixture();
        let events: Vec<Option<&str>> = vec![
            Some("10.100.0.1"),
            Some("10.100.0.2"),
            None,
            Some("10.100.0.3"),
            Some("10.100.0.4"),
        ];

        for address in events {
            fx.reconciler
                .apply_service(service("ns3", "api", address))
                .await
                .unwrap();
        }

        let file = fx.hosts_file();
        assert_eq!(addresses(&file, "api.ns3"), vec![ip("10.100.0.4")]);
        assert_eq!(
            fx.hosts_content(),
            format!("{HOSTS}10.100.0.4 api.ns3\n")
        );
    }

    #[tokio::test]
    async fn test_deferred_render_leaves_output_untouched() {
        let fx = fixture();

        fx.reconciler
            .reconcile_service(service("ns1", "svc-a", Some("10.100.0.5")), Render::Deferred)
            .await
            .unwrap();
        fx.reconciler
            .reconcile_route(RouteRecord::new("ns1", "web", Vec::new()), Render::Deferred)
            .await;

        assert!(!fx.output_path().exists());
        fx.reconciler.render_logged().await;
        assert_eq!(fx.output(), "ns1: svc-a.ns1@10.100.0.5\n");
    }
}
