//! Wire-level behavior of the Siscomex client: classification, token
//! refresh on rejection, and lock-out handling.

mod support;

use chrono::Utc;
use duesync_common::Admission;
use duesync_core::ports::SiscomexGateway;
use duesync_domain::DueSyncError;
use serde_json::json;
use tokio_util::sync::CancellationToken;
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, ResponseTemplate};

use support::{client_stack, due_body, lockout_body, mock_portal, DUE_NUMBER, INVOICE_KEY};

fn due_path() -> String {
    format!("/due/api/ext/due/numero-da-due/{DUE_NUMBER}")
}

#[tokio::test]
async fn fetches_and_decodes_a_due() {
    let server = mock_portal().await;
    Mock::given(method("GET"))
        .and(path(due_path()))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(due_body(DUE_NUMBER, "REGISTRADA", "2024-03-01T10:00:00-03:00")),
        )
        .mount(&server)
        .await;

    let (_gate, client) = client_stack(&server.uri(), 100);
    let due = client.fetch_due(DUE_NUMBER, &CancellationToken::new()).await.expect("due");

    assert_eq!(due.numero.as_deref(), Some(DUE_NUMBER));
    assert_eq!(due.itens.len(), 1);
    assert_eq!(due.situacao.as_deref(), Some("REGISTRADA"));
}

#[tokio::test]
async fn lookup_returns_all_due_numbers() {
    let server = mock_portal().await;
    Mock::given(method("GET"))
        .and(path("/due/api/ext/due"))
        .and(query_param("nota-fiscal", INVOICE_KEY))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            {"rel": "24BR0000000001", "href": "https://example/due/24BR0000000001"},
            {"rel": "24BR0000000002", "href": "https://example/due/24BR0000000002"},
            {"rel": "24BR0000000001", "href": "https://example/due/24BR0000000001"}
        ])))
        .mount(&server)
        .await;

    let (_gate, client) = client_stack(&server.uri(), 100);
    let dues =
        client.lookup_due_numbers(INVOICE_KEY, &CancellationToken::new()).await.expect("dues");

    assert_eq!(dues, vec!["24BR0000000001".to_string(), "24BR0000000002".to_string()]);
}

#[tokio::test]
async fn empty_lookup_is_not_an_error() {
    let server = mock_portal().await;
    Mock::given(method("GET"))
        .and(path("/due/api/ext/due"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .mount(&server)
        .await;

    let (_gate, client) = client_stack(&server.uri(), 100);
    let dues =
        client.lookup_due_numbers(INVOICE_KEY, &CancellationToken::new()).await.expect("empty");
    assert!(dues.is_empty());
}

#[tokio::test]
async fn token_rejection_invalidates_and_retries_once() {
    let server = mock_portal().await;
    // First call rejected, second accepted after the re-auth.
    Mock::given(method("GET"))
        .and(path(due_path()))
        .respond_with(ResponseTemplate::new(401))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path(due_path()))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(due_body(DUE_NUMBER, "REGISTRADA", "2024-03-01T10:00:00-03:00")),
        )
        .mount(&server)
        .await;

    let (_gate, client) = client_stack(&server.uri(), 100);
    let due = client.fetch_due(DUE_NUMBER, &CancellationToken::new()).await.expect("due");
    assert_eq!(due.numero.as_deref(), Some(DUE_NUMBER));

    let auth_calls = server
        .received_requests()
        .await
        .expect("requests recorded")
        .iter()
        .filter(|r| r.url.path().contains("autenticar"))
        .count();
    assert_eq!(auth_calls, 2, "one initial exchange plus one re-auth");
}

#[tokio::test]
async fn not_found_is_permanent() {
    let server = mock_portal().await;
    Mock::given(method("GET"))
        .and(path(due_path()))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;

    let (_gate, client) = client_stack(&server.uri(), 100);
    let err =
        client.fetch_due(DUE_NUMBER, &CancellationToken::new()).await.expect_err("must fail");
    assert!(matches!(err, DueSyncError::Permanent(_)));
}

#[tokio::test]
async fn server_errors_and_throttling_are_transient() {
    let server = mock_portal().await;
    Mock::given(method("GET"))
        .and(path(due_path()))
        .respond_with(ResponseTemplate::new(503))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path(due_path()))
        .respond_with(ResponseTemplate::new(422))
        .mount(&server)
        .await;

    let (_gate, client) = client_stack(&server.uri(), 100);
    let cancel = CancellationToken::new();

    let err = client.fetch_due(DUE_NUMBER, &cancel).await.expect_err("503 fails");
    assert!(matches!(err, DueSyncError::Transient(_)));

    let err = client.fetch_due(DUE_NUMBER, &cancel).await.expect_err("422 fails");
    assert!(matches!(err, DueSyncError::Transient(_)));
}

#[tokio::test]
async fn lockout_body_fails_the_call_and_blocks_the_gate() {
    let server = mock_portal().await;
    let release = Utc::now() + chrono::Duration::minutes(10);
    // The portal reports lock-outs under a 200.
    Mock::given(method("GET"))
        .and(path(due_path()))
        .respond_with(ResponseTemplate::new(200).set_body_json(lockout_body(release)))
        .mount(&server)
        .await;

    let (gate, client) = client_stack(&server.uri(), 100);
    let err =
        client.fetch_due(DUE_NUMBER, &CancellationToken::new()).await.expect_err("locked");

    let until = match err {
        DueSyncError::RateLocked { until } => until,
        other => panic!("expected RateLocked, got {other:?}"),
    };
    // Second precision is lost in the message round trip.
    assert!((until - release).num_seconds().abs() <= 1);

    // Every subsequent admission waits until the release instant.
    match gate.try_admit() {
        Admission::Locked(blocked_until) => assert_eq!(blocked_until, until),
        other => panic!("expected a locked gate, got {other:?}"),
    }

    // No retry happened inside the client: one DUE request total.
    let due_calls = server
        .received_requests()
        .await
        .expect("requests recorded")
        .iter()
        .filter(|r| r.url.path().contains("numero-da-due"))
        .count();
    assert_eq!(due_calls, 1);
}

#[tokio::test]
async fn probe_decodes_only_revision_and_situation() {
    let server = mock_portal().await;
    Mock::given(method("GET"))
        .and(path(due_path()))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(due_body(DUE_NUMBER, "AVERBADA_SEM_DIVERGENCIA", "2024-03-02T12:00:00-03:00")),
        )
        .mount(&server)
        .await;

    let (_gate, client) = client_stack(&server.uri(), 100);
    let probe =
        client.probe_revision(DUE_NUMBER, &CancellationToken::new()).await.expect("probe");

    assert_eq!(probe.data_de_registro.as_deref(), Some("2024-03-02T12:00:00-03:00"));
    assert_eq!(probe.situacao.as_deref(), Some("AVERBADA_SEM_DIVERGENCIA"));
}

#[tokio::test]
async fn every_call_consumes_one_gate_slot() {
    let server = mock_portal().await;
    Mock::given(method("GET"))
        .and(path(due_path()))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(due_body(DUE_NUMBER, "REGISTRADA", "2024-03-01T10:00:00-03:00")),
        )
        .mount(&server)
        .await;

    let (gate, client) = client_stack(&server.uri(), 100);
    let cancel = CancellationToken::new();
    let before = gate.in_window();
    client.fetch_due(DUE_NUMBER, &cancel).await.expect("due");
    client.fetch_due(DUE_NUMBER, &cancel).await.expect("due");
    // Two DUE calls plus the single credential exchange.
    assert_eq!(gate.in_window() - before, 3);
}
