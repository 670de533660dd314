//! DUE repository: transactional per-DUE writes and the typed queries the
//! pipelines run. All rusqlite work happens under `spawn_blocking`; the
//! async trait methods only marshal data in and out.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use duesync_core::ports::{DueStore, RefreshRow, StoreCounts, StoredRevision};
use duesync_domain::rows::{AtoConcessorioRow, ItemNotaRow, LinkRow};
use duesync_domain::situation::{SituationClass, SituationPartition};
use duesync_domain::{NormalizedDue, Result};
use rusqlite::{params, Connection, Transaction};
use rust_decimal::Decimal;
use tokio::task;
use tracing::debug;

use super::link_repository::upsert_links_tx;
use super::manager::DbManager;
use crate::errors::{map_join, map_sql};

/// Child tables replaced as a set on every re-normalization.
const CHILD_TABLES: &[&str] = &[
    "due_eventos_historico",
    "due_itens",
    "due_item_enquadramentos",
    "due_item_paises_destino",
    "due_item_tratamentos_administrativos",
    "due_item_tratamentos_administrativos_orgaos",
    "due_item_notas_remessa",
    "due_item_nota_fiscal_exportacao",
    "due_item_notas_complementares",
    "due_item_atributos",
    "due_item_documentos_importacao",
    "due_item_documentos_transformacao",
    "due_item_calculo_tributario_tratamentos",
    "due_item_calculo_tributario_quadros",
    "due_situacoes_carga",
    "due_solicitacoes",
    "due_declaracao_tributaria_compensacoes",
    "due_declaracao_tributaria_recolhimentos",
    "due_declaracao_tributaria_contestacoes",
    "due_atos_concessorios_suspensao",
    "due_atos_concessorios_isencao",
    "due_exigencias_fiscais",
];

/// SQLite-backed [`DueStore`].
pub struct SqliteDueStore {
    db: Arc<DbManager>,
    partition: SituationPartition,
}

impl SqliteDueStore {
    pub fn new(db: Arc<DbManager>, partition: SituationPartition) -> Self {
        Self { db, partition }
    }
}

#[async_trait]
impl DueStore for SqliteDueStore {
    async fn upsert_due(&self, due: &NormalizedDue, links: &[LinkRow]) -> Result<()> {
        let db = Arc::clone(&self.db);
        let due = due.clone();
        let links = links.to_vec();

        task::spawn_blocking(move || -> Result<()> {
            let mut conn = db.get_connection()?;
            let now = rfc3339_now();
            upsert_due_tx(&mut conn, &due, &links, &now).map_err(map_sql)?;
            debug!(due = due.numero(), rows = due.total_rows(), "DUE persisted");
            Ok(())
        })
        .await
        .map_err(map_join)?
    }

    async fn replace_bonded_suspension(
        &self,
        due_number: &str,
        rows: &[AtoConcessorioRow],
    ) -> Result<()> {
        let db = Arc::clone(&self.db);
        let due_number = due_number.to_string();
        let rows = rows.to_vec();

        task::spawn_blocking(move || -> Result<()> {
            let mut conn = db.get_connection()?;
            let tx = conn.transaction().map_err(map_sql)?;
            tx.execute(
                "DELETE FROM due_atos_concessorios_suspensao WHERE numero_due = ?1",
                params![due_number],
            )
            .map_err(map_sql)?;
            insert_atos(&tx, "due_atos_concessorios_suspensao", &rows).map_err(map_sql)?;
            tx.commit().map_err(map_sql)
        })
        .await
        .map_err(map_join)?
    }

    async fn mark_synced(&self, due_number: &str, at: DateTime<Utc>) -> Result<()> {
        let db = Arc::clone(&self.db);
        let due_number = due_number.to_string();
        let stamp = at.to_rfc3339_opts(SecondsFormat::Secs, true);

        task::spawn_blocking(move || -> Result<()> {
            let conn = db.get_connection()?;
            conn.execute(
                "UPDATE due_principal SET data_ultima_atualizacao = ?1 WHERE numero = ?2",
                params![stamp, due_number],
            )
            .map_err(map_sql)?;
            Ok(())
        })
        .await
        .map_err(map_join)?
    }

    async fn due_revision(&self, due_number: &str) -> Result<Option<StoredRevision>> {
        let db = Arc::clone(&self.db);
        let due_number = due_number.to_string();

        task::spawn_blocking(move || -> Result<Option<StoredRevision>> {
            let conn = db.get_connection()?;
            let row = conn
                .query_row(
                    "SELECT data_de_registro, situacao, data_ultima_atualizacao
                     FROM due_principal WHERE numero = ?1",
                    params![due_number],
                    |row| {
                        Ok(StoredRevision {
                            data_de_registro: row.get(0)?,
                            situacao: row.get(1)?,
                            data_ultima_atualizacao: parse_stamp(row.get::<_, Option<String>>(2)?),
                        })
                    },
                )
                .map(Some)
                .or_else(|err| match err {
                    rusqlite::Error::QueryReturnedNoRows => Ok(None),
                    other => Err(other),
                })
                .map_err(map_sql)?;
            Ok(row)
        })
        .await
        .map_err(map_join)?
    }

    async fn list_refresh_rows(&self, cancelled: &[String]) -> Result<Vec<RefreshRow>> {
        let db = Arc::clone(&self.db);
        let cancelled = cancelled.to_vec();

        task::spawn_blocking(move || -> Result<Vec<RefreshRow>> {
            let conn = db.get_connection()?;
            query_refresh_rows(&conn, &cancelled).map_err(map_sql)
        })
        .await
        .map_err(map_join)?
    }

    async fn orphaned_links(&self) -> Result<Vec<String>> {
        let db = Arc::clone(&self.db);

        task::spawn_blocking(move || -> Result<Vec<String>> {
            let conn = db.get_connection()?;
            let mut stmt = conn
                .prepare(
                    "SELECT DISTINCT v.numero_due
                     FROM nf_due_vinculo v
                     LEFT JOIN due_principal p ON v.numero_due = p.numero
                     WHERE p.numero IS NULL
                     ORDER BY v.numero_due",
                )
                .map_err(map_sql)?;
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

    async fn counts(&self) -> Result<StoreCounts> {
        let db = Arc::clone(&self.db);
        let partition = self.partition.clone();

        task::spawn_blocking(move || -> Result<StoreCounts> {
            let conn = db.get_connection()?;
            query_counts(&conn, &partition).map_err(map_sql)
        })
        .await
        .map_err(map_join)?
    }
}

// ============================================================================
// SQL operations (synchronous)
// ============================================================================

fn rfc3339_now() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true)
}

fn parse_stamp(raw: Option<String>) -> Option<DateTime<Utc>> {
    raw.as_deref()
        .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
        .map(|dt| dt.with_timezone(&Utc))
}

fn dec(value: Option<Decimal>) -> Option<String> {
    value.map(|d| d.to_string())
}

fn upsert_due_tx(
    conn: &mut Connection,
    due: &NormalizedDue,
    links: &[LinkRow],
    now: &str,
) -> rusqlite::Result<()> {
    let tx = conn.transaction()?;
    insert_principal(&tx, due, now)?;
    for table in CHILD_TABLES {
        tx.execute(
            &format!("DELETE FROM {table} WHERE numero_due = ?1"),
            params![due.numero()],
        )?;
    }
    insert_children(&tx, due)?;
    upsert_links_tx(&tx, links, now)?;
    tx.commit()
}

fn insert_principal(tx: &Transaction<'_>, due: &NormalizedDue, now: &str) -> rusqlite::Result<()> {
    let p = &due.principal;
    tx.execute(
        "INSERT INTO due_principal (
            numero, chave_de_acesso, data_de_registro, bloqueio, canal,
            embarque_em_recinto_alfandegado, despacho_em_recinto_alfandegado,
            despacho_em_recinto_domiciliar, forma_de_exportacao, impedido_de_embarque,
            informacoes_complementares, ruc, situacao,
            situacao_do_tratamento_administrativo, tipo, tratamento_prioritario,
            responsavel_pelo_acd, data_de_criacao, data_do_cce, data_do_desembaraco,
            data_do_acd, data_da_averbacao, valor_total_mercadoria, inclusao_nota_fiscal,
            exigencia_ativa, consorciada, dat, oea,
            declarante_numero_do_documento, declarante_tipo_do_documento, declarante_nome,
            declarante_estrangeiro, declarante_nacionalidade_codigo,
            declarante_nacionalidade_nome, declarante_nacionalidade_nome_resumido,
            moeda_codigo, pais_importador_codigo,
            recinto_aduaneiro_de_despacho_codigo, recinto_aduaneiro_de_embarque_codigo,
            unidade_local_de_despacho_codigo, unidade_local_de_embarque_codigo,
            declaracao_tributaria_divergente, data_ultima_atualizacao
        ) VALUES (
            ?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16,
            ?17, ?18, ?19, ?20, ?21, ?22, ?23, ?24, ?25, ?26, ?27, ?28, ?29, ?30,
            ?31, ?32, ?33, ?34, ?35, ?36, ?37, ?38, ?39, ?40, ?41, ?42, ?43
        )
        ON CONFLICT (numero) DO UPDATE SET
            chave_de_acesso = excluded.chave_de_acesso,
            data_de_registro = excluded.data_de_registro,
            bloqueio = excluded.bloqueio,
            canal = excluded.canal,
            embarque_em_recinto_alfandegado = excluded.embarque_em_recinto_alfandegado,
            despacho_em_recinto_alfandegado = excluded.despacho_em_recinto_alfandegado,
            despacho_em_recinto_domiciliar = excluded.despacho_em_recinto_domiciliar,
            forma_de_exportacao = excluded.forma_de_exportacao,
            impedido_de_embarque = excluded.impedido_de_embarque,
            informacoes_complementares = excluded.informacoes_complementares,
            ruc = excluded.ruc,
            situacao = excluded.situacao,
            situacao_do_tratamento_administrativo = excluded.situacao_do_tratamento_administrativo,
            tipo = excluded.tipo,
            tratamento_prioritario = excluded.tratamento_prioritario,
            responsavel_pelo_acd = excluded.responsavel_pelo_acd,
            data_de_criacao = excluded.data_de_criacao,
            data_do_cce = excluded.data_do_cce,
            data_do_desembaraco = excluded.data_do_desembaraco,
            data_do_acd = excluded.data_do_acd,
            data_da_averbacao = excluded.data_da_averbacao,
            valor_total_mercadoria = excluded.valor_total_mercadoria,
            inclusao_nota_fiscal = excluded.inclusao_nota_fiscal,
            exigencia_ativa = excluded.exigencia_ativa,
            consorciada = excluded.consorciada,
            dat = excluded.dat,
            oea = excluded.oea,
            declarante_numero_do_documento = excluded.declarante_numero_do_documento,
            declarante_tipo_do_documento = excluded.declarante_tipo_do_documento,
            declarante_nome = excluded.declarante_nome,
            declarante_estrangeiro = excluded.declarante_estrangeiro,
            declarante_nacionalidade_codigo = excluded.declarante_nacionalidade_codigo,
            declarante_nacionalidade_nome = excluded.declarante_nacionalidade_nome,
            declarante_nacionalidade_nome_resumido = excluded.declarante_nacionalidade_nome_resumido,
            moeda_codigo = excluded.moeda_codigo,
            pais_importador_codigo = excluded.pais_importador_codigo,
            recinto_aduaneiro_de_despacho_codigo = excluded.recinto_aduaneiro_de_despacho_codigo,
            recinto_aduaneiro_de_embarque_codigo = excluded.recinto_aduaneiro_de_embarque_codigo,
            unidade_local_de_despacho_codigo = excluded.unidade_local_de_despacho_codigo,
            unidade_local_de_embarque_codigo = excluded.unidade_local_de_embarque_codigo,
            declaracao_tributaria_divergente = excluded.declaracao_tributaria_divergente,
            data_ultima_atualizacao = excluded.data_ultima_atualizacao",
        params![
            p.numero,
            p.chave_de_acesso,
            p.data_de_registro,
            p.bloqueio,
            p.canal,
            p.embarque_em_recinto_alfandegado,
            p.despacho_em_recinto_alfandegado,
            p.despacho_em_recinto_domiciliar,
            p.forma_de_exportacao,
            p.impedido_de_embarque,
            p.informacoes_complementares,
            p.ruc,
            p.situacao,
            p.situacao_do_tratamento_administrativo,
            p.tipo,
            p.tratamento_prioritario,
            p.responsavel_pelo_acd,
            p.data_de_criacao,
            p.data_do_cce,
            p.data_do_desembaraco,
            p.data_do_acd,
            p.data_da_averbacao,
            dec(p.valor_total_mercadoria),
            p.inclusao_nota_fiscal,
            p.exigencia_ativa,
            p.consorciada,
            p.dat,
            p.oea,
            p.declarante_numero_do_documento,
            p.declarante_tipo_do_documento,
            p.declarante_nome,
            p.declarante_estrangeiro,
            p.declarante_nacionalidade_codigo,
            p.declarante_nacionalidade_nome,
            p.declarante_nacionalidade_nome_resumido,
            p.moeda_codigo,
            p.pais_importador_codigo,
            p.recinto_aduaneiro_de_despacho_codigo,
            p.recinto_aduaneiro_de_embarque_codigo,
            p.unidade_local_de_despacho_codigo,
            p.unidade_local_de_embarque_codigo,
            p.declaracao_tributaria_divergente,
            now,
        ],
    )?;
    Ok(())
}

fn insert_children(tx: &Transaction<'_>, due: &NormalizedDue) -> rusqlite::Result<()> {
    {
        let mut stmt = tx.prepare(
            "INSERT INTO due_eventos_historico
                (numero_due, data_e_hora_do_evento, evento, responsavel, informacoes_adicionais)
             VALUES (?1, ?2, ?3, ?4, ?5)",
        )?;
        for row in &due.eventos_historico {
            stmt.execute(params![
                row.numero_due,
                row.data_e_hora_do_evento,
                row.evento,
                row.responsavel,
                row.informacoes_adicionais,
            ])?;
        }
    }

    {
        let mut stmt = tx.prepare(
            "INSERT INTO due_itens (
                id, numero_due, numero, quantidade_na_unidade_estatistica,
                quantidade_na_unidade_comercializada, peso_liquido_total,
                valor_da_mercadoria_na_condicao_de_venda,
                valor_da_mercadoria_no_local_de_embarque,
                valor_da_mercadoria_no_local_de_embarque_em_reais,
                valor_da_mercadoria_na_condicao_de_venda_em_reais,
                valor_total_calculado_item, data_de_conversao, descricao_da_mercadoria,
                unidade_comercializada, nome_importador, endereco_importador,
                ncm_codigo, ncm_descricao, ncm_unidade_medida_estatistica,
                exportador_numero_do_documento, exportador_tipo_do_documento,
                codigo_condicao_venda, exportacao_temporaria
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14,
                      ?15, ?16, ?17, ?18, ?19, ?20, ?21, ?22, ?23)",
        )?;
        for row in &due.itens {
            stmt.execute(params![
                row.id,
                row.numero_due,
                row.numero,
                dec(row.quantidade_na_unidade_estatistica),
                dec(row.quantidade_na_unidade_comercializada),
                dec(row.peso_liquido_total),
                dec(row.valor_da_mercadoria_na_condicao_de_venda),
                dec(row.valor_da_mercadoria_no_local_de_embarque),
                dec(row.valor_da_mercadoria_no_local_de_embarque_em_reais),
                dec(row.valor_da_mercadoria_na_condicao_de_venda_em_reais),
                dec(row.valor_total_calculado_item),
                row.data_de_conversao,
                row.descricao_da_mercadoria,
                row.unidade_comercializada,
                row.nome_importador,
                row.endereco_importador,
                row.ncm_codigo,
                row.ncm_descricao,
                row.ncm_unidade_medida_estatistica,
                row.exportador_numero_do_documento,
                row.exportador_tipo_do_documento,
                row.codigo_condicao_venda,
                row.exportacao_temporaria,
            ])?;
        }
    }

    {
        let mut stmt = tx.prepare(
            "INSERT INTO due_item_enquadramentos
                (due_item_id, numero_due, item_numero, codigo, data_registro, descricao, grupo, tipo)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
        )?;
        for row in &due.item_enquadramentos {
            stmt.execute(params![
                row.due_item_id,
                row.numero_due,
                row.item_numero,
                row.codigo,
                row.data_registro,
                row.descricao,
                row.grupo,
                row.tipo,
            ])?;
        }
    }

    {
        let mut stmt = tx.prepare(
            "INSERT INTO due_item_paises_destino (due_item_id, numero_due, item_numero, codigo_pais)
             VALUES (?1, ?2, ?3, ?4)",
        )?;
        for row in &due.item_paises_destino {
            stmt.execute(params![row.due_item_id, row.numero_due, row.item_numero, row.codigo_pais])?;
        }
    }

    {
        let mut stmt = tx.prepare(
            "INSERT INTO due_item_tratamentos_administrativos
                (id, due_item_id, numero_due, item_numero, mensagem, impeditivo_de_embarque,
                 codigo_lpco, situacao)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
        )?;
        for row in &due.item_tratamentos_administrativos {
            stmt.execute(params![
                row.id,
                row.due_item_id,
                row.numero_due,
                row.item_numero,
                row.mensagem,
                row.impeditivo_de_embarque,
                row.codigo_lpco,
                row.situacao,
            ])?;
        }
    }

    {
        let mut stmt = tx.prepare(
            "INSERT INTO due_item_tratamentos_administrativos_orgaos
                (tratamento_administrativo_id, due_item_id, numero_due, orgao)
             VALUES (?1, ?2, ?3, ?4)",
        )?;
        for row in &due.item_tratamentos_orgaos {
            stmt.execute(params![
                row.tratamento_administrativo_id,
                row.due_item_id,
                row.numero_due,
                row.orgao,
            ])?;
        }
    }

    insert_notas(tx, "due_item_notas_remessa", &due.item_notas_remessa)?;
    insert_notas(tx, "due_item_nota_fiscal_exportacao", &due.item_nota_fiscal_exportacao)?;
    insert_notas(tx, "due_item_notas_complementares", &due.item_notas_complementares)?;

    {
        let mut stmt = tx.prepare(
            "INSERT INTO due_item_atributos
                (due_item_id, numero_due, item_numero, indice, codigo, valor, descricao)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        )?;
        for row in &due.item_atributos {
            stmt.execute(params![
                row.due_item_id,
                row.numero_due,
                row.item_numero,
                row.indice,
                row.codigo,
                row.valor,
                row.descricao,
            ])?;
        }
    }

    {
        let mut stmt = tx.prepare(
            "INSERT INTO due_item_documentos_importacao
                (due_item_id, numero_due, item_numero, indice, tipo, numero, data_registro,
                 item_documento, quantidade_utilizada)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
        )?;
        for row in &due.item_documentos_importacao {
            stmt.execute(params![
                row.due_item_id,
                row.numero_due,
                row.item_numero,
                row.indice,
                row.tipo,
                row.numero,
                row.data_registro,
                row.item_documento,
                dec(row.quantidade_utilizada),
            ])?;
        }
    }

    {
        let mut stmt = tx.prepare(
            "INSERT INTO due_item_documentos_transformacao
                (due_item_id, numero_due, item_numero, indice, tipo, numero, data_registro)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        )?;
        for row in &due.item_documentos_transformacao {
            stmt.execute(params![
                row.due_item_id,
                row.numero_due,
                row.item_numero,
                row.indice,
                row.tipo,
                row.numero,
                row.data_registro,
            ])?;
        }
    }

    {
        let mut stmt = tx.prepare(
            "INSERT INTO due_item_calculo_tributario_tratamentos
                (due_item_id, numero_due, item_numero, indice, codigo, descricao, tipo, tributo)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
        )?;
        for row in &due.item_calculo_tratamentos {
            stmt.execute(params![
                row.due_item_id,
                row.numero_due,
                row.item_numero,
                row.indice,
                row.codigo,
                row.descricao,
                row.tipo,
                row.tributo,
            ])?;
        }
    }

    {
        let mut stmt = tx.prepare(
            "INSERT INTO due_item_calculo_tributario_quadros
                (due_item_id, numero_due, item_numero, indice, tributo, base_de_calculo,
                 aliquota, valor_devido, valor_recolhido, valor_compensado)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
        )?;
        for row in &due.item_calculo_quadros {
            stmt.execute(params![
                row.due_item_id,
                row.numero_due,
                row.item_numero,
                row.indice,
                row.tributo,
                dec(row.base_de_calculo),
                dec(row.aliquota),
                dec(row.valor_devido),
                dec(row.valor_recolhido),
                dec(row.valor_compensado),
            ])?;
        }
    }

    {
        let mut stmt = tx.prepare(
            "INSERT INTO due_situacoes_carga (numero_due, codigo, descricao, carga_operada)
             VALUES (?1, ?2, ?3, ?4)",
        )?;
        for row in &due.situacoes_carga {
            stmt.execute(params![row.numero_due, row.codigo, row.descricao, row.carga_operada])?;
        }
    }

    {
        let mut stmt = tx.prepare(
            "INSERT INTO due_solicitacoes
                (numero_due, tipo_solicitacao, data_da_solicitacao, usuario_responsavel,
                 codigo_do_status_da_solicitacao, status_da_solicitacao, data_de_apreciacao, motivo)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
        )?;
        for row in &due.solicitacoes {
            stmt.execute(params![
                row.numero_due,
                row.tipo_solicitacao,
                row.data_da_solicitacao,
                row.usuario_responsavel,
                row.codigo_do_status_da_solicitacao,
                row.status_da_solicitacao,
                row.data_de_apreciacao,
                row.motivo,
            ])?;
        }
    }

    {
        let mut stmt = tx.prepare(
            "INSERT INTO due_declaracao_tributaria_compensacoes
                (numero_due, data_do_registro, numero_da_declaracao, valor_compensado)
             VALUES (?1, ?2, ?3, ?4)",
        )?;
        for row in &due.declaracao_compensacoes {
            stmt.execute(params![
                row.numero_due,
                row.data_do_registro,
                row.numero_da_declaracao,
                dec(row.valor_compensado),
            ])?;
        }
    }

    {
        let mut stmt = tx.prepare(
            "INSERT INTO due_declaracao_tributaria_recolhimentos
                (numero_due, data_do_pagamento, data_do_registro, valor_da_multa,
                 valor_do_imposto_recolhido, valor_do_juros_mora)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        )?;
        for row in &due.declaracao_recolhimentos {
            stmt.execute(params![
                row.numero_due,
                row.data_do_pagamento,
                row.data_do_registro,
                dec(row.valor_da_multa),
                dec(row.valor_do_imposto_recolhido),
                dec(row.valor_do_juros_mora),
            ])?;
        }
    }

    {
        let mut stmt = tx.prepare(
            "INSERT INTO due_declaracao_tributaria_contestacoes
                (numero_due, indice, data_do_registro, motivo, status, data_de_apreciacao, observacao)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        )?;
        for row in &due.declaracao_contestacoes {
            stmt.execute(params![
                row.numero_due,
                row.indice,
                row.data_do_registro,
                row.motivo,
                row.status,
                row.data_de_apreciacao,
                row.observacao,
            ])?;
        }
    }

    insert_atos(tx, "due_atos_concessorios_suspensao", &due.atos_concessorios_suspensao)?;
    insert_atos(tx, "due_atos_concessorios_isencao", &due.atos_concessorios_isencao)?;

    {
        let mut stmt = tx.prepare(
            "INSERT INTO due_exigencias_fiscais
                (numero_due, numero_exigencia, tipo_exigencia, data_criacao, data_limite,
                 status, orgao_responsavel, descricao, valor_exigido, valor_pago, observacoes)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
        )?;
        for row in &due.exigencias_fiscais {
            stmt.execute(params![
                row.numero_due,
                row.numero_exigencia,
                row.tipo_exigencia,
                row.data_criacao,
                row.data_limite,
                row.status,
                row.orgao_responsavel,
                row.descricao,
                dec(row.valor_exigido),
                dec(row.valor_pago),
                row.observacoes,
            ])?;
        }
    }

    Ok(())
}

fn insert_notas(tx: &Transaction<'_>, table: &str, rows: &[ItemNotaRow]) -> rusqlite::Result<()> {
    let mut stmt = tx.prepare(&format!(
        "INSERT INTO {table} (
            due_item_id, numero_due, item_numero, indice, numero_do_item, chave_de_acesso,
            modelo, serie, numero_do_documento, uf_do_emissor, identificacao_emitente,
            emitente_cnpj, emitente_cpf, finalidade, quantidade_de_itens,
            nota_fiscal_eletronica, cfop, codigo_do_produto, descricao,
            quantidade_estatistica, unidade_comercial, valor_total_bruto,
            valor_total_calculado, quantidade_consumida, ncm_codigo, ncm_descricao,
            ncm_unidade_medida_estatistica, apresentada_para_despacho
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15,
                  ?16, ?17, ?18, ?19, ?20, ?21, ?22, ?23, ?24, ?25, ?26, ?27, ?28)"
    ))?;
    for row in rows {
        stmt.execute(params![
            row.due_item_id,
            row.numero_due,
            row.item_numero,
            row.indice,
            row.numero_do_item,
            row.chave_de_acesso,
            row.modelo,
            row.serie,
            row.numero_do_documento,
            row.uf_do_emissor,
            row.identificacao_emitente,
            row.emitente_cnpj,
            row.emitente_cpf,
            row.finalidade,
            row.quantidade_de_itens,
            row.nota_fiscal_eletronica,
            row.cfop,
            row.codigo_do_produto,
            row.descricao,
            dec(row.quantidade_estatistica),
            row.unidade_comercial,
            dec(row.valor_total_bruto),
            dec(row.valor_total_calculado),
            dec(row.quantidade_consumida),
            row.ncm_codigo,
            row.ncm_descricao,
            row.ncm_unidade_medida_estatistica,
            row.apresentada_para_despacho,
        ])?;
    }
    Ok(())
}

fn insert_atos(
    tx: &Transaction<'_>,
    table: &str,
    rows: &[AtoConcessorioRow],
) -> rusqlite::Result<()> {
    let mut stmt = tx.prepare(&format!(
        "INSERT INTO {table} (
            numero_due, ato_numero, tipo_codigo, tipo_descricao, item_numero, item_ncm,
            beneficiario_cnpj, quantidade_exportada, valor_com_cobertura_cambial,
            valor_sem_cobertura_cambial, item_de_due_numero
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)"
    ))?;
    for row in rows {
        stmt.execute(params![
            row.numero_due,
            row.ato_numero,
            row.tipo_codigo,
            row.tipo_descricao,
            row.item_numero,
            row.item_ncm,
            row.beneficiario_cnpj,
            dec(row.quantidade_exportada),
            dec(row.valor_com_cobertura_cambial),
            dec(row.valor_sem_cobertura_cambial),
            row.item_de_due_numero,
        ])?;
    }
    Ok(())
}

fn query_refresh_rows(conn: &Connection, cancelled: &[String]) -> rusqlite::Result<Vec<RefreshRow>> {
    let placeholders = if cancelled.is_empty() {
        "''".to_string()
    } else {
        std::iter::repeat("?")
            .take(cancelled.len())
            .collect::<Vec<_>>()
            .join(", ")
    };
    let sql = format!(
        "SELECT numero, situacao, data_de_registro, data_da_averbacao, data_ultima_atualizacao
         FROM due_principal
         WHERE situacao IS NULL OR situacao NOT IN ({placeholders})
         ORDER BY data_ultima_atualizacao IS NOT NULL, data_ultima_atualizacao ASC"
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map(rusqlite::params_from_iter(cancelled.iter()), |row| {
        Ok(RefreshRow {
            numero: row.get(0)?,
            situacao: row.get(1)?,
            data_de_registro: row.get(2)?,
            data_da_averbacao: row.get(3)?,
            data_ultima_atualizacao: parse_stamp(row.get::<_, Option<String>>(4)?),
        })
    })?;
    rows.collect()
}

fn query_counts(conn: &Connection, partition: &SituationPartition) -> rusqlite::Result<StoreCounts> {
    let mut counts = StoreCounts {
        invoice_keys: count_table(conn, "nfe_sap")?,
        links: count_table(conn, "nf_due_vinculo")?,
        dues: count_table(conn, "due_principal")?,
        items: count_table(conn, "due_itens")?,
        ..StoreCounts::default()
    };

    let mut stmt = conn.prepare(
        "SELECT COALESCE(situacao, ''), COUNT(*) FROM due_principal GROUP BY situacao",
    )?;
    let groups = stmt.query_map([], |row| {
        Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)? as usize))
    })?;
    for group in groups {
        let (situacao, total) = group?;
        match partition.classify(&situacao) {
            SituationClass::Cancelled => counts.cancelled += total,
            SituationClass::Settled => counts.settled += total,
            SituationClass::Pending => counts.pending += total,
        }
    }
    Ok(counts)
}

fn count_table(conn: &Connection, table: &str) -> rusqlite::Result<usize> {
    conn.query_row(&format!("SELECT COUNT(*) FROM {table}"), [], |row| {
        row.get::<_, i64>(0).map(|n| n as usize)
    })
}
