//! Shared fixtures for the infra integration tests: a mocked upstream with
//! a working credential exchange, and a temp-file SQLite store.
#![allow(dead_code)] // each test binary uses a different subset

use std::sync::Arc;

use chrono::Utc;
use duesync_common::RateGate;
use duesync_domain::config::{AuthConfig, CredentialsConfig, UpstreamConfig};
use duesync_domain::situation::SituationPartition;
use duesync_infra::{DbManager, SiscomexClient, SqliteDueStore, SqliteLinkCache, TokenAuthority};
use serde_json::{json, Value};
use tempfile::TempDir;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

pub const INVOICE_KEY: &str = "12345678901234567890123456789012345678901234";
pub const DUE_NUMBER: &str = "24BR0000000001";

/// Start a mock portal with a working credential exchange mounted.
pub async fn mock_portal() -> MockServer {
    let server = MockServer::start().await;
    let expiration = (Utc::now() + chrono::Duration::hours(1)).timestamp_millis();
    Mock::given(method("POST"))
        .and(path("/portal/api/autenticar/chave-acesso"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("set-token", "Bearer test-token")
                .insert_header("x-csrf-token", "test-csrf")
                .insert_header("x-csrf-expiration", expiration.to_string().as_str()),
        )
        .mount(&server)
        .await;
    server
}

pub fn upstream_config(server_uri: &str) -> UpstreamConfig {
    UpstreamConfig {
        base_url: format!("{server_uri}/due/api/ext/due"),
        auth_url: format!("{server_uri}/portal/api/autenticar/chave-acesso"),
        ..UpstreamConfig::default()
    }
}

/// Gate + authority + client against the mock portal.
pub fn client_stack(
    server_uri: &str,
    safe_limit: u32,
) -> (Arc<RateGate>, Arc<SiscomexClient>) {
    let upstream = upstream_config(server_uri);
    let gate = Arc::new(RateGate::new(safe_limit));
    let credentials = CredentialsConfig {
        client_id: "test-client".to_string(),
        client_secret: "test-secret".to_string(),
    };
    let auth = Arc::new(
        TokenAuthority::new(
            &upstream,
            credentials,
            AuthConfig { min_interval: std::time::Duration::ZERO, ..AuthConfig::default() },
            Arc::clone(&gate),
        )
        .expect("authority builds"),
    );
    let client =
        Arc::new(SiscomexClient::new(&upstream, Arc::clone(&gate), auth).expect("client builds"));
    (gate, client)
}

/// Migrated store over a temp-file database. The TempDir must outlive the
/// returned handles.
pub fn sqlite_store(dir: &TempDir) -> (Arc<DbManager>, Arc<SqliteDueStore>, Arc<SqliteLinkCache>) {
    let db = Arc::new(DbManager::new(dir.path().join("duesync.db"), 4).expect("db manager"));
    db.run_migrations().expect("migrations");
    let store = Arc::new(SqliteDueStore::new(Arc::clone(&db), SituationPartition::default()));
    let links = Arc::new(SqliteLinkCache::new(Arc::clone(&db)));
    (db, store, links)
}

/// Minimal DUE document with one item and one history event.
pub fn due_body(numero: &str, situacao: &str, revision: &str) -> Value {
    json!({
        "numero": numero,
        "chaveDeAcesso": INVOICE_KEY,
        "dataDeRegistro": revision,
        "situacao": situacao,
        "canal": "VERDE",
        "valorTotalMercadoria": 15000.50,
        "itens": [
            {
                "numero": 1,
                "descricaoDaMercadoria": "Cafe em graos",
                "pesoLiquidoTotal": 1200.5,
                "ncm": {"codigo": "09011110"}
            }
        ],
        "eventosDoHistorico": [
            {
                "dataEHoraDoEvento": revision,
                "evento": "Registro da DUE",
                "responsavel": "EXPORTADOR"
            }
        ]
    })
}

/// Lock-out body with a release clock time rendered in -03:00.
pub fn lockout_body(release_utc: chrono::DateTime<Utc>) -> Value {
    let offset = chrono::FixedOffset::west_opt(3 * 3600).expect("static offset");
    let local = release_utc.with_timezone(&offset);
    json!({
        "code": "PUCX-ER1001",
        "message": format!(
            "Limite de requisições excedido. Acesso será liberado após as {}.",
            local.format("%H:%M:%S")
        )
    })
}
