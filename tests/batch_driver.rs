//! Integration-style tests for the batch driver's concurrency, ordering,
//! and error-policy semantics, against in-process mock PowerDNS servers.

use std::time::Duration;

use pdns_zone_migrate::batch::{BatchDriverOptions, BatchOutcomeKind, OnError};
use pdns_zone_migrate::diff::DiffOptions;
use pdns_zone_migrate::migrate::MigratorOptions;
use pdns_zone_migrate::sanitize::SanitizeOptions;
use pdns_zone_migrate::types::{ConnectionDescriptor, ZoneName};
use pdns_zone_migrate::{ApiClient, BatchDriver};
use serde_json::json;
use tokio_util::sync::CancellationToken;
use wiremock::matchers::{method, path_regex};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn migrator_opts() -> MigratorOptions {
    MigratorOptions {
        recreate: false,
        dry_run: false,
        sanitize: SanitizeOptions::default(),
        diff: DiffOptions::default(),
    }
}

async fn client_for(server: &MockServer) -> ApiClient {
    let desc = ConnectionDescriptor::new(server.uri(), "test-key");
    ApiClient::new(&desc).expect("client builds")
}

/// Scenario F — batch with stop-on-error. `z2` fails non-retriably; the
/// batch stops dispatching new work, and every input zone still gets a
/// result entry in input order.
#[tokio::test]
async fn stop_on_error_aborts_remaining_zones() {
    let source = MockServer::start().await;
    let target = MockServer::start().await;

    let zone_body = json!({
        "name": "placeholder.",
        "kind": "Native",
        "rrsets": [{"name": "placeholder.", "type": "A", "ttl": 300, "records": [{"content": "1.1.1.1", "disabled": false}]}]
    });

    // z1, z3, z4 succeed fetch/probe/create; z2's source fetch 400s.
    for name in ["z1.test.", "z3.test.", "z4.test."] {
        Mock::given(method("GET"))
            .and(path_regex(format!("/zones/{name}$")))
            .respond_with(ResponseTemplate::new(200).set_body_json(zone_body.clone()))
            .mount(&source)
            .await;
    }
    Mock::given(method("GET"))
        .and(path_regex("/zones/z2.test.$"))
        .respond_with(ResponseTemplate::new(400).set_body_json(json!({"error": "bad zone"})))
        .mount(&source)
        .await;

    Mock::given(method("GET"))
        .and(path_regex(".*"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&target)
        .await;
    Mock::given(method("POST"))
        .and(path_regex(".*"))
        .respond_with(ResponseTemplate::new(201))
        .mount(&target)
        .await;

    let driver = BatchDriver::new(
        client_for(&source).await,
        client_for(&target).await,
        migrator_opts(),
        BatchDriverOptions {
            concurrency: 2,
            on_error: OnError::Stop,
            graceful_timeout: Duration::from_secs(5),
            progress_interval: Duration::ZERO,
        },
    );

    let zones: Vec<ZoneName> = ["z1.test.", "z2.test.", "z3.test.", "z4.test."]
        .into_iter()
        .map(ZoneName::new)
        .collect();

    let summary = driver.run(zones.clone(), CancellationToken::new(), |_| {}).await;

    assert_eq!(summary.results.len(), 4);
    for (result, zone) in summary.results.iter().zip(&zones) {
        assert_eq!(&result.zone, zone, "result order must match input order");
    }
    assert!(matches!(summary.outcome, BatchOutcomeKind::StoppedOnError(_, _)));
    assert_eq!(pdns_zone_migrate::exit_code(&summary), 2);
}

/// Under `on_error = Continue`, a failing zone does not stop the others.
#[tokio::test]
async fn continue_on_error_runs_every_zone() {
    let source = MockServer::start().await;
    let target = MockServer::start().await;

    let zone_body = json!({
        "name": "placeholder.",
        "kind": "Native",
        "rrsets": [{"name": "placeholder.", "type": "A", "ttl": 300, "records": [{"content": "1.1.1.1", "disabled": false}]}]
    });

    Mock::given(method("GET"))
        .and(path_regex("/zones/ok1.test.$"))
        .respond_with(ResponseTemplate::new(200).set_body_json(zone_body.clone()))
        .mount(&source)
        .await;
    Mock::given(method("GET"))
        .and(path_regex("/zones/bad.test.$"))
        .respond_with(ResponseTemplate::new(400))
        .mount(&source)
        .await;
    Mock::given(method("GET"))
        .and(path_regex("/zones/ok2.test.$"))
        .respond_with(ResponseTemplate::new(200).set_body_json(zone_body.clone()))
        .mount(&source)
        .await;

    Mock::given(method("GET"))
        .and(path_regex(".*"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&target)
        .await;
    Mock::given(method("POST"))
        .and(path_regex(".*"))
        .respond_with(ResponseTemplate::new(201))
        .mount(&target)
        .await;

    let driver = BatchDriver::new(
        client_for(&source).await,
        client_for(&target).await,
        migrator_opts(),
        BatchDriverOptions {
            concurrency: 3,
            on_error: OnError::Continue,
            graceful_timeout: Duration::ZERO,
            progress_interval: Duration::ZERO,
        },
    );

    let zones: Vec<ZoneName> = ["ok1.test.", "bad.test.", "ok2.test."]
        .into_iter()
        .map(ZoneName::new)
        .collect();

    let summary = driver.run(zones, CancellationToken::new(), |_| {}).await;

    assert_eq!(summary.results.len(), 3);
    assert_eq!(summary.succeeded_count(), 2);
    assert_eq!(summary.failed_count(), 1);
    assert!(matches!(summary.outcome, BatchOutcomeKind::Completed));
    assert_eq!(pdns_zone_migrate::exit_code(&summary), 1);
}
