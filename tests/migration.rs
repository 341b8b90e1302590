//! Integration-style tests for the zone migration pipeline, exercised
//! against an in-process mock PowerDNS API rather than a live server.

use std::time::Duration;

use pdns_zone_migrate::diff::DiffOptions;
use pdns_zone_migrate::migrate::{Migrator, MigratorOptions};
use pdns_zone_migrate::sanitize::SanitizeOptions;
use pdns_zone_migrate::types::{ConnectionDescriptor, MigratorAction, ZoneName};
use pdns_zone_migrate::ApiClient;
use serde_json::json;
use tokio_util::sync::CancellationToken;
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

async fn client_for(server: &MockServer) -> ApiClient {
    let desc = ConnectionDescriptor::new(server.uri(), "test-key");
    ApiClient::new(&desc).expect("client builds")
}

fn migrator_opts() -> MigratorOptions {
    MigratorOptions {
        recreate: false,
        dry_run: false,
        sanitize: SanitizeOptions::default(),
        diff: DiffOptions::default(),
    }
}

/// Scenario A — fresh create: source has a full zone, target has none.
#[tokio::test]
async fn fresh_create_posts_full_rrset_list() {
    let source = MockServer::start().await;
    let target = MockServer::start().await;

    let zone_body = json!({
        "name": "example.com.",
        "kind": "Native",
        "rrsets": [
            {"name": "example.com.", "type": "SOA", "ttl": 3600, "records": [{"content": "ns1.example.com. hostmaster.example.com. 1 3600 600 604800 300", "disabled": false}]},
            {"name": "example.com.", "type": "NS", "ttl": 3600, "records": [
                {"content": "ns1.example.com.", "disabled": false},
                {"content": "ns2.example.com.", "disabled": false}
            ]},
            {"name": "www.example.com.", "type": "A", "ttl": 300, "records": [{"content": "1.2.3.4", "disabled": false}]}
        ]
    });

    Mock::given(method("GET"))
        .and(path("/api/v1/servers/localhost/zones/example.com."))
        .and(header("X-API-Key", "test-key"))
        .respond_with(ResponseTemplate::new(200).set_body_json(zone_body))
        .mount(&source)
        .await;

    Mock::given(method("GET"))
        .and(path("/api/v1/servers/localhost/zones/example.com."))
        .respond_with(ResponseTemplate::new(404).set_body_json(json!({"error": "Not Found"})))
        .mount(&target)
        .await;

    Mock::given(method("POST"))
        .and(path("/api/v1/servers/localhost/zones"))
        .respond_with(ResponseTemplate::new(201))
        .mount(&target)
        .await;

    let migrator = Migrator::new(client_for(&source).await, client_for(&target).await, migrator_opts());
    let zone = ZoneName::new("example.com.");
    let result = migrator.run(&zone, &CancellationToken::new()).await.unwrap();

    assert_eq!(result.action, MigratorAction::CreateZone);
    assert_eq!(result.changes.len(), 3);
}

/// Scenario B — idempotent no-op: source and target already agree.
#[tokio::test]
async fn identical_zones_yield_noop() {
    let source = MockServer::start().await;
    let target = MockServer::start().await;

    let zone_body = json!({
        "name": "a.test.",
        "kind": "Native",
        "rrsets": [
            {"name": "a.test.", "type": "A", "ttl": 300, "records": [{"content": "1.2.3.4", "disabled": false}]}
        ]
    });

    for server in [&source, &target] {
        Mock::given(method("GET"))
            .and(path("/api/v1/servers/localhost/zones/a.test."))
            .respond_with(ResponseTemplate::new(200).set_body_json(zone_body.clone()))
            .mount(server)
            .await;
    }

    let migrator = Migrator::new(client_for(&source).await, client_for(&target).await, migrator_opts());
    let zone = ZoneName::new("a.test.");
    let result = migrator.run(&zone, &CancellationToken::new()).await.unwrap();

    assert_eq!(result.action, MigratorAction::Noop);
    assert!(result.changes.is_empty());
}

/// Scenario C — SOA serial drift: ignored under `--ignore-soa-serial`,
/// otherwise produces a single REPLACE of the SOA.
#[tokio::test]
async fn soa_serial_drift_respects_ignore_flag() {
    for (ignore_soa_serial, expect_patch) in [(true, false), (false, true)] {
        let source = MockServer::start().await;
        let target = MockServer::start().await;

        let source_zone = json!({
            "name": "drift.test.",
            "kind": "Native",
            "rrsets": [
                {"name": "drift.test.", "type": "SOA", "ttl": 3600, "records": [
                    {"content": "ns1.drift.test. hostmaster.drift.test. 2024010101 3600 600 604800 300", "disabled": false}
                ]}
            ]
        });
        let target_zone = json!({
            "name": "drift.test.",
            "kind": "Native",
            "rrsets": [
                {"name": "drift.test.", "type": "SOA", "ttl": 3600, "records": [
                    {"content": "ns1.drift.test. hostmaster.drift.test. 2023120500 3600 600 604800 300", "disabled": false}
                ]}
            ]
        });

        Mock::given(method("GET"))
            .and(path("/api/v1/servers/localhost/zones/drift.test."))
            .respond_with(ResponseTemplate::new(200).set_body_json(source_zone))
            .mount(&source)
            .await;
        Mock::given(method("GET"))
            .and(path("/api/v1/servers/localhost/zones/drift.test."))
            .respond_with(ResponseTemplate::new(200).set_body_json(target_zone))
            .mount(&target)
            .await;
        Mock::given(method("PATCH"))
            .and(path("/api/v1/servers/localhost/zones/drift.test."))
            .respond_with(ResponseTemplate::new(204))
            .mount(&target)
            .await;

        let mut opts = migrator_opts();
        opts.diff.ignore_soa_serial = ignore_soa_serial;
        let migrator = Migrator::new(client_for(&source).await, client_for(&target).await, opts);
        let zone = ZoneName::new("drift.test.");
        let result = migrator.run(&zone, &CancellationToken::new()).await.unwrap();

        if expect_patch {
            assert_eq!(result.action, MigratorAction::PatchZone, "ignore={ignore_soa_serial}");
            assert_eq!(result.changes.len(), 1);
        } else {
            assert_eq!(result.action, MigratorAction::Noop, "ignore={ignore_soa_serial}");
        }
    }
}

/// Scenario E — TXT escape normalization: source and target carry the same
/// three bytes escaped differently (decimal vs. octal `\NNN` triplets).
/// With `--normalize-txt-escapes`: NOOP. Without: one REPLACE.
#[tokio::test]
async fn txt_escape_drift_respects_normalize_flag() {
    for (normalize_txt_escapes, expect_patch) in [(true, false), (false, true)] {
        let source = MockServer::start().await;
        let target = MockServer::start().await;

        let source_zone = json!({
            "name": "txt.test.",
            "kind": "Native",
            "rrsets": [
                {"name": "txt.test.", "type": "TXT", "ttl": 300, "records": [
                    {"content": "\"\\239\\191\\189\"", "disabled": false}
                ]}
            ]
        });
        let target_zone = json!({
            "name": "txt.test.",
            "kind": "Native",
            "rrsets": [
                {"name": "txt.test.", "type": "TXT", "ttl": 300, "records": [
                    {"content": "\"\\357\\277\\275\"", "disabled": false}
                ]}
            ]
        });

        Mock::given(method("GET"))
            .and(path("/api/v1/servers/localhost/zones/txt.test."))
            .respond_with(ResponseTemplate::new(200).set_body_json(source_zone))
            .mount(&source)
            .await;
        Mock::given(method("GET"))
            .and(path("/api/v1/servers/localhost/zones/txt.test."))
            .respond_with(ResponseTemplate::new(200).set_body_json(target_zone))
            .mount(&target)
            .await;
        Mock::given(method("PATCH"))
            .and(path("/api/v1/servers/localhost/zones/txt.test."))
            .respond_with(ResponseTemplate::new(204))
            .mount(&target)
            .await;

        let mut opts = migrator_opts();
        opts.sanitize.normalize_txt_escapes = normalize_txt_escapes;
        let migrator = Migrator::new(client_for(&source).await, client_for(&target).await, opts);
        let zone = ZoneName::new("txt.test.");
        let result = migrator.run(&zone, &CancellationToken::new()).await.unwrap();

        if expect_patch {
            assert_eq!(result.action, MigratorAction::PatchZone, "normalize={normalize_txt_escapes}");
            assert_eq!(result.changes.len(), 1);
        } else {
            assert_eq!(result.action, MigratorAction::Noop, "normalize={normalize_txt_escapes}");
        }
    }
}

/// Dry-run probes and diffs the target but never mutates it.
#[tokio::test]
async fn dry_run_skips_target_mutations() {
    let source = MockServer::start().await;
    let target = MockServer::start().await;

    let zone_body = json!({
        "name": "dry.test.",
        "kind": "Native",
        "rrsets": [
            {"name": "dry.test.", "type": "A", "ttl": 300, "records": [{"content": "9.9.9.9", "disabled": false}]}
        ]
    });

    Mock::given(method("GET"))
        .and(path("/api/v1/servers/localhost/zones/dry.test."))
        .respond_with(ResponseTemplate::new(200).set_body_json(zone_body))
        .mount(&source)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/v1/servers/localhost/zones/dry.test."))
        .respond_with(ResponseTemplate::new(404))
        .mount(&target)
        .await;
    // Deliberately no POST mock on target: a dry run must never call it.

    let mut opts = migrator_opts();
    opts.dry_run = true;
    let migrator = Migrator::new(client_for(&source).await, client_for(&target).await, opts);
    let zone = ZoneName::new("dry.test.");
    let result = migrator.run(&zone, &CancellationToken::new()).await.unwrap();

    assert_eq!(result.action, MigratorAction::CreateZone);
    assert_eq!(result.changes.len(), 1);
}

/// A cancelled token aborts an in-flight migration instead of retrying.
#[tokio::test]
async fn cancellation_short_circuits_retry() {
    let source = MockServer::start().await;
    let target = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/api/v1/servers/localhost/zones/slow.test."))
        .respond_with(ResponseTemplate::new(500).set_delay(Duration::from_millis(200)))
        .mount(&source)
        .await;

    let migrator = Migrator::new(client_for(&source).await, client_for(&target).await, migrator_opts());
    let cancel = CancellationToken::new();
    cancel.cancel();

    let zone = ZoneName::new("slow.test.");
    let err = migrator.run(&zone, &cancel).await.unwrap_err();
    assert!(matches!(err, pdns_zone_migrate::Error::Cancelled));
}
