//! Store behavior: transactional per-DUE writes, child replacement, link
//! upserts, and the typed queries the pipelines depend on.

mod support;

use chrono::{Duration, Utc};
use duesync_core::normalize::normalize;
use duesync_core::ports::{DueStore, LinkCache};
use duesync_domain::payload::DuePayload;
use duesync_domain::rows::LinkRow;
use tempfile::TempDir;

use support::{due_body, sqlite_store, DUE_NUMBER, INVOICE_KEY};

fn normalized(numero: &str, situacao: &str, revision: &str) -> duesync_domain::NormalizedDue {
    let payload: DuePayload =
        serde_json::from_value(due_body(numero, situacao, revision)).expect("payload");
    normalize(&payload, None, None, None).expect("normalizes")
}

fn link(key: &str, due: &str) -> LinkRow {
    LinkRow { chave_nf: key.to_string(), numero_due: due.to_string() }
}

#[tokio::test]
async fn upsert_persists_principal_children_and_links_atomically() {
    let dir = TempDir::new().expect("temp dir");
    let (db, store, links) = sqlite_store(&dir);

    let due = normalized(DUE_NUMBER, "REGISTRADA", "2024-03-01T10:00:00-03:00");
    store.upsert_due(&due, &[link(INVOICE_KEY, DUE_NUMBER)]).await.expect("upsert");

    let revision = store.due_revision(DUE_NUMBER).await.expect("query").expect("stored");
    assert_eq!(revision.data_de_registro.as_deref(), Some("2024-03-01T10:00:00-03:00"));
    assert_eq!(revision.situacao.as_deref(), Some("REGISTRADA"));
    assert!(revision.data_ultima_atualizacao.is_some());

    assert_eq!(links.get(INVOICE_KEY).await.expect("query"), Some(DUE_NUMBER.to_string()));

    let conn = db.get_connection().expect("connection");
    let items: i64 = conn
        .query_row("SELECT COUNT(*) FROM due_itens WHERE numero_due = ?1", [DUE_NUMBER], |r| {
            r.get(0)
        })
        .expect("count");
    assert_eq!(items, 1);
    let events: i64 = conn
        .query_row(
            "SELECT COUNT(*) FROM due_eventos_historico WHERE numero_due = ?1",
            [DUE_NUMBER],
            |r| r.get(0),
        )
        .expect("count");
    assert_eq!(events, 1);
}

#[tokio::test]
async fn reupserting_replaces_children_instead_of_duplicating() {
    let dir = TempDir::new().expect("temp dir");
    let (db, store, _links) = sqlite_store(&dir);

    let due = normalized(DUE_NUMBER, "REGISTRADA", "2024-03-01T10:00:00-03:00");
    store.upsert_due(&due, &[]).await.expect("first upsert");
    let updated = normalized(DUE_NUMBER, "AVERBADA_SEM_DIVERGENCIA", "2024-03-02T12:00:00-03:00");
    store.upsert_due(&updated, &[]).await.expect("second upsert");

    let conn = db.get_connection().expect("connection");
    let dues: i64 =
        conn.query_row("SELECT COUNT(*) FROM due_principal", [], |r| r.get(0)).expect("count");
    assert_eq!(dues, 1);
    let events: i64 = conn
        .query_row("SELECT COUNT(*) FROM due_eventos_historico", [], |r| r.get(0))
        .expect("count");
    assert_eq!(events, 1, "children replaced, not appended");

    let revision = store.due_revision(DUE_NUMBER).await.expect("query").expect("stored");
    assert_eq!(revision.data_de_registro.as_deref(), Some("2024-03-02T12:00:00-03:00"));
}

#[tokio::test]
async fn decimal_columns_round_trip_exactly() {
    let dir = TempDir::new().expect("temp dir");
    let (db, store, _links) = sqlite_store(&dir);

    let due = normalized(DUE_NUMBER, "REGISTRADA", "2024-03-01T10:00:00-03:00");
    store.upsert_due(&due, &[]).await.expect("upsert");

    let conn = db.get_connection().expect("connection");
    let total: String = conn
        .query_row(
            "SELECT valor_total_mercadoria FROM due_principal WHERE numero = ?1",
            [DUE_NUMBER],
            |r| r.get(0),
        )
        .expect("value");
    assert_eq!(
        total.parse::<rust_decimal::Decimal>().expect("decimal"),
        "15000.50".parse::<rust_decimal::Decimal>().expect("decimal")
    );
    let weight: String = conn
        .query_row(
            "SELECT peso_liquido_total FROM due_itens WHERE numero_due = ?1",
            [DUE_NUMBER],
            |r| r.get(0),
        )
        .expect("value");
    assert_eq!(
        weight.parse::<rust_decimal::Decimal>().expect("decimal"),
        "1200.5".parse::<rust_decimal::Decimal>().expect("decimal")
    );
}

#[tokio::test]
async fn link_upsert_is_idempotent_by_invoice_key() {
    let dir = TempDir::new().expect("temp dir");
    let (db, _store, links) = sqlite_store(&dir);

    links.put_batch(&[link(INVOICE_KEY, DUE_NUMBER)]).await.expect("first put");
    links.put_batch(&[link(INVOICE_KEY, "24BR0000000099")]).await.expect("second put");

    let conn = db.get_connection().expect("connection");
    let rows: i64 =
        conn.query_row("SELECT COUNT(*) FROM nf_due_vinculo", [], |r| r.get(0)).expect("count");
    assert_eq!(rows, 1);
    assert_eq!(
        links.get(INVOICE_KEY).await.expect("query"),
        Some("24BR0000000099".to_string())
    );
}

#[tokio::test]
async fn unlinked_keys_subtract_the_link_cache() {
    let dir = TempDir::new().expect("temp dir");
    let (_db, _store, links) = sqlite_store(&dir);

    let other_key = "98765432109876543210987654321098765432109876";
    links
        .insert_invoice_keys(&[INVOICE_KEY.to_string(), other_key.to_string()])
        .await
        .expect("seeded");
    links.put_batch(&[link(INVOICE_KEY, DUE_NUMBER)]).await.expect("linked");

    let unlinked = links.unlinked_invoice_keys(0).await.expect("query");
    assert_eq!(unlinked, vec![other_key.to_string()]);

    assert!(links.contains(INVOICE_KEY).await.expect("query"));
    assert!(!links.contains(other_key).await.expect("query"));
}

#[tokio::test]
async fn refresh_rows_exclude_cancelled_situations() {
    let dir = TempDir::new().expect("temp dir");
    let (_db, store, _links) = sqlite_store(&dir);

    store
        .upsert_due(&normalized(DUE_NUMBER, "EM_CARGA", "2024-03-01T10:00:00-03:00"), &[])
        .await
        .expect("pending upsert");
    store
        .upsert_due(
            &normalized("24BR0000000002", "CANCELADA_PELO_EXPORTADOR", "2024-03-01T10:00:00-03:00"),
            &[],
        )
        .await
        .expect("cancelled upsert");

    let cancelled = vec!["CANCELADA_PELO_EXPORTADOR".to_string()];
    let rows = store.list_refresh_rows(&cancelled).await.expect("query");
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].numero, DUE_NUMBER);
}

#[tokio::test]
async fn orphaned_links_surface_for_recovery() {
    let dir = TempDir::new().expect("temp dir");
    let (_db, store, links) = sqlite_store(&dir);

    links.put_batch(&[link(INVOICE_KEY, "24BR0000000077")]).await.expect("orphan link");
    store
        .upsert_due(&normalized(DUE_NUMBER, "EM_CARGA", "2024-03-01T10:00:00-03:00"), &[])
        .await
        .expect("stored due");

    let orphans = store.orphaned_links().await.expect("query");
    assert_eq!(orphans, vec!["24BR0000000077".to_string()]);
}

#[tokio::test]
async fn mark_synced_updates_only_the_sync_stamp() {
    let dir = TempDir::new().expect("temp dir");
    let (_db, store, _links) = sqlite_store(&dir);

    let due = normalized(DUE_NUMBER, "AVERBADA_SEM_DIVERGENCIA", "2024-03-01T10:00:00-03:00");
    store.upsert_due(&due, &[]).await.expect("upsert");

    let past = Utc::now() - Duration::hours(25);
    store.mark_synced(DUE_NUMBER, past).await.expect("backdate");
    let revision = store.due_revision(DUE_NUMBER).await.expect("query").expect("stored");
    let stamp = revision.data_ultima_atualizacao.expect("stamp");
    assert!((stamp - past).num_seconds().abs() <= 1);
    assert_eq!(revision.data_de_registro.as_deref(), Some("2024-03-01T10:00:00-03:00"));
}

#[tokio::test]
async fn counts_break_down_by_situation_class() {
    let dir = TempDir::new().expect("temp dir");
    let (_db, store, links) = sqlite_store(&dir);

    links.insert_invoice_keys(&[INVOICE_KEY.to_string()]).await.expect("seeded");
    store
        .upsert_due(
            &normalized(DUE_NUMBER, "EM_CARGA", "2024-03-01T10:00:00-03:00"),
            &[link(INVOICE_KEY, DUE_NUMBER)],
        )
        .await
        .expect("pending");
    store
        .upsert_due(
            &normalized(
                "24BR0000000002",
                "AVERBADA_SEM_DIVERGENCIA",
                "2024-03-01T10:00:00-03:00",
            ),
            &[],
        )
        .await
        .expect("settled");
    store
        .upsert_due(
            &normalized("24BR0000000003", "CANCELADA_PELO_SISCOMEX", "2024-03-01T10:00:00-03:00"),
            &[],
        )
        .await
        .expect("cancelled");

    let counts = store.counts().await.expect("counts");
    assert_eq!(counts.invoice_keys, 1);
    assert_eq!(counts.links, 1);
    assert_eq!(counts.dues, 3);
    assert_eq!(counts.items, 3);
    assert_eq!(counts.pending, 1);
    assert_eq!(counts.settled, 1);
    assert_eq!(counts.cancelled, 1);
}
