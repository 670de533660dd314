//! Link cache (vínculo) repository and the SAP mirror reads.
//!
//! The link table maps invoice keys to DUE numbers; a key present here is
//! never probed again during discovery. Writes are insert-or-update on
//! conflict by invoice key, so re-discovering an association is harmless.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{SecondsFormat, Utc};
use duesync_core::ports::LinkCache;
use duesync_domain::rows::LinkRow;
use duesync_domain::Result;
use rusqlite::{params, Transaction};
use tokio::task;
use tracing::debug;

use super::manager::DbManager;
use crate::errors::{map_join, map_sql};

/// SQLite-backed [`LinkCache`].
pub struct SqliteLinkCache {
    db: Arc<DbManager>,
}

impl SqliteLinkCache {
    pub fn new(db: Arc<DbManager>) -> Self {
        Self { db }
    }

    /// Seed invoice keys into the SAP mirror table. The warehouse importer
    /// that populates it in production is an external collaborator; this
    /// is the interface it (and the tests) write through.
    pub async fn insert_invoice_keys(&self, keys: &[String]) -> Result<usize> {
        let db = Arc::clone(&self.db);
        let keys = keys.to_vec();

        task::spawn_blocking(move || -> Result<usize> {
            let mut conn = db.get_connection()?;
            let now = Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true);
            let tx = conn.transaction().map_err(map_sql)?;
            let mut inserted = 0;
            {
                let mut stmt = tx
                    .prepare(
                        "INSERT INTO nfe_sap (chave_nf, data_importacao, ativo)
                         VALUES (?1, ?2, 1)
                         ON CONFLICT (chave_nf) DO UPDATE SET ativo = 1",
                    )
                    .map_err(map_sql)?;
                for key in &keys {
                    inserted += stmt.execute(params![key, now]).map_err(map_sql)?;
                }
            }
            tx.commit().map_err(map_sql)?;
            Ok(inserted)
        })
        .await
        .map_err(map_join)?
    }
}

#[async_trait]
impl LinkCache for SqliteLinkCache {
    async fn contains(&self, invoice_key: &str) -> Result<bool> {
        Ok(self.get(invoice_key).await?.is_some())
    }

    async fn get(&self, invoice_key: &str) -> Result<Option<String>> {
        let db = Arc::clone(&self.db);
        let invoice_key = invoice_key.to_string();

        task::spawn_blocking(move || -> Result<Option<String>> {
            let conn = db.get_connection()?;
            conn.query_row(
                "SELECT numero_due FROM nf_due_vinculo WHERE chave_nf = ?1",
                params![invoice_key],
                |row| row.get(0),
            )
            .map(Some)
            .or_else(|err| match err {
                rusqlite::Error::QueryReturnedNoRows => Ok(None),
                other => Err(other),
            })
            .map_err(map_sql)
        })
        .await
        .map_err(map_join)?
    }

    async fn put_batch(&self, batch: &[LinkRow]) -> Result<()> {
        if batch.is_empty() {
            return Ok(());
        }
        let db = Arc::clone(&self.db);
        let batch = batch.to_vec();

        task::spawn_blocking(move || -> Result<()> {
            let mut conn = db.get_connection()?;
            let now = Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true);
            let tx = conn.transaction().map_err(map_sql)?;
            upsert_links_tx(&tx, &batch, &now).map_err(map_sql)?;
            tx.commit().map_err(map_sql)?;
            debug!(links = batch.len(), "link batch persisted");
            Ok(())
        })
        .await
        .map_err(map_join)?
    }

    async fn unlinked_invoice_keys(&self, limit: usize) -> Result<Vec<String>> {
        let db = Arc::clone(&self.db);

        task::spawn_blocking(move || -> Result<Vec<String>> {
            let conn = db.get_connection()?;
            let sql = if limit > 0 {
                format!("{UNLINKED_SQL} LIMIT {limit}")
            } else {
                UNLINKED_SQL.to_string()
            };
            let mut stmt = conn.prepare(&sql).map_err(map_sql)?;
            let rows = stmt
                .query_map([], |row| row.get::<_, String>(0))
                .map_err(map_sql)?
                .collect::<rusqlite::Result<Vec<_>>>()
                .map_err(map_sql)?;
            Ok(rows)
        })
        .await
        .map_err(map_join)?
    }
}

const UNLINKED_SQL: &str = "SELECT chave_nf FROM nfe_sap
     WHERE ativo = 1
       AND chave_nf NOT IN (SELECT chave_nf FROM nf_due_vinculo)
     ORDER BY chave_nf";

/// Upsert link rows inside an existing transaction; shared with the DUE
/// repository so a DUE's links land in the same transaction as its rows.
pub(crate) fn upsert_links_tx(
    tx: &Transaction<'_>,
    links: &[LinkRow],
    now: &str,
) -> rusqlite::Result<()> {
    if links.is_empty() {
        return Ok(());
    }
    let mut stmt = tx.prepare(
        "INSERT INTO nf_due_vinculo (chave_nf, numero_due, data_vinculo, origem)
         VALUES (?1, ?2, ?3, 'SISCOMEX')
         ON CONFLICT (chave_nf) DO UPDATE SET
             numero_due = excluded.numero_due,
             data_vinculo = excluded.data_vinculo",
    )?;
    for link in links {
        stmt.execute(params![link.chave_nf, link.numero_due, now])?;
    }
    Ok(())
}
