//! End-to-end discovery runs: real client, real store, mocked portal.

mod support;

use std::sync::Arc;

use chrono::Utc;
use duesync_common::Admission;
use duesync_core::ports::{DueStore, LinkCache};
use duesync_core::{DiscoveryConfig, DiscoveryPipeline};
use duesync_domain::config::FetchFlags;
use serde_json::json;
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use support::{client_stack, due_body, lockout_body, mock_portal, sqlite_store, DUE_NUMBER, INVOICE_KEY};

fn discovery_config(workers: usize) -> DiscoveryConfig {
    DiscoveryConfig { workers, flags: FetchFlags::none(), ..DiscoveryConfig::default() }
}

async fn mount_lookup(server: &MockServer, key: &str, dues: &[&str]) {
    let body: Vec<_> = dues
        .iter()
        .map(|due| json!({"rel": due, "href": format!("https://example/due/{due}")}))
        .collect();
    Mock::given(method("GET"))
        .and(path("/due/api/ext/due"))
        .and(query_param("nota-fiscal", key))
        .respond_with(ResponseTemplate::new(200).set_body_json(body))
        .mount(server)
        .await;
}

async fn mount_due(server: &MockServer, numero: &str, situacao: &str, revision: &str) {
    Mock::given(method("GET"))
        .and(path(format!("/due/api/ext/due/numero-da-due/{numero}")))
        .respond_with(ResponseTemplate::new(200).set_body_json(due_body(numero, situacao, revision)))
        .mount(server)
        .await;
}

#[tokio::test]
async fn discovery_with_no_due_found_writes_nothing() {
    let server = mock_portal().await;
    mount_lookup(&server, INVOICE_KEY, &[]).await;

    let dir = TempDir::new().expect("temp dir");
    let (_db, store, links) = sqlite_store(&dir);
    links.insert_invoice_keys(&[INVOICE_KEY.to_string()]).await.expect("seeded");

    let (_gate, client) = client_stack(&server.uri(), 100);
    let pipeline = DiscoveryPipeline::new(
        client,
        Arc::clone(&store) as Arc<dyn DueStore>,
        Arc::clone(&links) as Arc<dyn LinkCache>,
        discovery_config(3),
    );

    let report = pipeline.run(&CancellationToken::new()).await.expect("run");

    assert_eq!(report.candidates, 1);
    assert_eq!(report.no_due, 1);
    assert_eq!(report.fetched, 0);
    assert_eq!(report.links_written, 0);
    assert!(report.errors.is_empty());

    let lookup_calls = server
        .received_requests()
        .await
        .expect("requests recorded")
        .iter()
        .filter(|r| r.url.query().unwrap_or("").contains("nota-fiscal"))
        .count();
    assert_eq!(lookup_calls, 1);
    assert!(store.due_revision(DUE_NUMBER).await.expect("query").is_none());
    assert!(links.get(INVOICE_KEY).await.expect("query").is_none());
}

#[tokio::test]
async fn discovery_persists_one_due_with_flags_off() {
    let server = mock_portal().await;
    mount_lookup(&server, INVOICE_KEY, &[DUE_NUMBER]).await;
    mount_due(&server, DUE_NUMBER, "REGISTRADA", "2024-03-01T10:00:00-03:00").await;

    let dir = TempDir::new().expect("temp dir");
    let (db, store, links) = sqlite_store(&dir);
    links.insert_invoice_keys(&[INVOICE_KEY.to_string()]).await.expect("seeded");

    let (_gate, client) = client_stack(&server.uri(), 100);
    let pipeline = DiscoveryPipeline::new(
        client,
        Arc::clone(&store) as Arc<dyn DueStore>,
        Arc::clone(&links) as Arc<dyn LinkCache>,
        discovery_config(3),
    );

    let report = pipeline.run(&CancellationToken::new()).await.expect("run");

    assert_eq!(report.fetched, 1);
    assert_eq!(report.links_written, 1);

    // Two API calls: lookup + principal (auxiliary flags are off).
    let api_calls = server
        .received_requests()
        .await
        .expect("requests recorded")
        .iter()
        .filter(|r| r.url.path().starts_with("/due/"))
        .count();
    assert_eq!(api_calls, 2);

    let revision = store.due_revision(DUE_NUMBER).await.expect("query").expect("stored");
    assert_eq!(revision.data_de_registro.as_deref(), Some("2024-03-01T10:00:00-03:00"));
    assert_eq!(links.get(INVOICE_KEY).await.expect("query"), Some(DUE_NUMBER.to_string()));

    let conn = db.get_connection().expect("connection");
    for (table, expected) in
        [("due_principal", 1i64), ("due_itens", 1), ("due_eventos_historico", 1), ("nf_due_vinculo", 1)]
    {
        let count: i64 = conn
            .query_row(&format!("SELECT COUNT(*) FROM {table}"), [], |r| r.get(0))
            .expect("count");
        assert_eq!(count, expected, "{table}");
    }
}

#[tokio::test]
async fn lockout_mid_run_persists_the_rest_and_blocks_the_gate() {
    let server = mock_portal().await;
    let keys = [INVOICE_KEY.to_string(), "2".repeat(44), "3".repeat(44)];
    let dues = ["24BR0000000001", "24BR0000000002", "24BR0000000003"];
    for (key, due) in keys.iter().zip(dues.iter()) {
        mount_lookup(&server, key, &[due]).await;
    }
    mount_due(&server, dues[0], "REGISTRADA", "2024-03-01T10:00:00-03:00").await;
    mount_due(&server, dues[1], "REGISTRADA", "2024-03-01T10:00:00-03:00").await;
    let release = Utc::now() + chrono::Duration::minutes(2);
    // Delayed so the two healthy fetches are admitted before the lock-out
    // lands; the gate then blocks only future admissions.
    Mock::given(method("GET"))
        .and(path(format!("/due/api/ext/due/numero-da-due/{}", dues[2])))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(lockout_body(release))
                .set_delay(std::time::Duration::from_millis(300)),
        )
        .mount(&server)
        .await;

    let dir = TempDir::new().expect("temp dir");
    let (_db, store, links) = sqlite_store(&dir);
    links.insert_invoice_keys(&keys).await.expect("seeded");

    let (gate, client) = client_stack(&server.uri(), 20);
    let pipeline = DiscoveryPipeline::new(
        client,
        Arc::clone(&store) as Arc<dyn DueStore>,
        Arc::clone(&links) as Arc<dyn LinkCache>,
        discovery_config(3),
    );

    let report = pipeline.run(&CancellationToken::new()).await.expect("run");

    // The two healthy DUEs landed; the locked one is recorded as an error.
    assert_eq!(report.fetched, 2);
    assert_eq!(report.errors.len(), 1);
    assert_eq!(report.errors[0].label, "rate_locked");
    assert!(store.due_revision(dues[0]).await.expect("query").is_some());
    assert!(store.due_revision(dues[1]).await.expect("query").is_some());
    assert!(store.due_revision(dues[2]).await.expect("query").is_none());

    // Subsequent admissions wait until the provider-specified release.
    match gate.try_admit() {
        Admission::Locked(until) => {
            assert!((until - release).num_seconds().abs() <= 1);
        }
        other => panic!("expected a locked gate, got {other:?}"),
    }
}

#[tokio::test]
async fn second_run_skips_linked_invoices_entirely() {
    let server = mock_portal().await;
    mount_lookup(&server, INVOICE_KEY, &[DUE_NUMBER]).await;
    mount_due(&server, DUE_NUMBER, "REGISTRADA", "2024-03-01T10:00:00-03:00").await;

    let dir = TempDir::new().expect("temp dir");
    let (_db, store, links) = sqlite_store(&dir);
    links.insert_invoice_keys(&[INVOICE_KEY.to_string()]).await.expect("seeded");

    let (_gate, client) = client_stack(&server.uri(), 100);
    let pipeline = DiscoveryPipeline::new(
        client,
        Arc::clone(&store) as Arc<dyn DueStore>,
        Arc::clone(&links) as Arc<dyn LinkCache>,
        discovery_config(2),
    );

    let cancel = CancellationToken::new();
    pipeline.run(&cancel).await.expect("first run");
    let calls_after_first =
        server.received_requests().await.expect("requests recorded").len();

    let report = pipeline.run(&cancel).await.expect("second run");
    let calls_after_second =
        server.received_requests().await.expect("requests recorded").len();

    assert_eq!(report.candidates, 0);
    assert_eq!(
        calls_after_first, calls_after_second,
        "a linked invoice key must not generate any network call"
    );
}
