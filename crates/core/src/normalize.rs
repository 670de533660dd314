//! JSON-to-relational normalizer.
//!
//! Pure fan-out of one DUE document (plus up to three auxiliary documents)
//! into the row batches of the 23 DUE tables. No I/O, no ambient state:
//! the same input always produces the same [`NormalizedDue`].

use duesync_domain::payload::{
    AtoConcessorio, DuePayload, EventoHistorico, ExigenciaFiscal, ItemNotaReferenciada,
    ItemPayload,
};
use duesync_domain::rows::{
    AtoConcessorioRow, CompensacaoRow, ContestacaoRow, DueEventoRow, DueItemRow,
    DuePrincipalRow, ExigenciaFiscalRow, ItemAtributoRow, ItemCalculoQuadroRow,
    ItemCalculoTratamentoRow, ItemDocImportacaoRow, ItemDocTransformacaoRow,
    ItemEnquadramentoRow, ItemNotaRow, ItemPaisDestinoRow, ItemTratamentoAdminRow,
    ItemTratamentoOrgaoRow, RecolhimentoRow, SituacaoCargaRow, SolicitacaoRow,
};
use duesync_domain::{DueSyncError, NormalizedDue, Result};

/// Normalize one DUE payload and its optional auxiliary documents.
pub fn normalize(
    due: &DuePayload,
    bonded_suspension: Option<&[AtoConcessorio]>,
    bonded_exemption: Option<&[AtoConcessorio]>,
    fiscal_requirements: Option<&[ExigenciaFiscal]>,
) -> Result<NormalizedDue> {
    let numero = due
        .numero
        .as_deref()
        .filter(|n| !n.is_empty())
        .ok_or_else(|| DueSyncError::Normalize("payload carries no DUE number".into()))?
        .to_string();

    let mut out = NormalizedDue { principal: map_principal(&numero, due), ..Default::default() };

    for evento in &due.eventos_do_historico {
        out.eventos_historico.push(map_evento(&numero, evento));
    }

    for item in &due.itens {
        map_item(&mut out, &numero, item);
    }

    for situacao in &due.situacoes_da_carga {
        out.situacoes_carga.push(SituacaoCargaRow {
            numero_due: numero.clone(),
            codigo: situacao.codigo,
            descricao: situacao.descricao.clone(),
            carga_operada: situacao.carga_operada,
        });
    }

    for solicitacao in &due.solicitacoes {
        out.solicitacoes.push(SolicitacaoRow {
            numero_due: numero.clone(),
            tipo_solicitacao: solicitacao.tipo_solicitacao.clone(),
            data_da_solicitacao: solicitacao.data_da_solicitacao.clone(),
            usuario_responsavel: solicitacao.usuario_responsavel.clone(),
            codigo_do_status_da_solicitacao: solicitacao.codigo_do_status_da_solicitacao,
            status_da_solicitacao: solicitacao.status_da_solicitacao.clone(),
            data_de_apreciacao: solicitacao.data_de_apreciacao.clone(),
            motivo: solicitacao.motivo.clone(),
        });
    }

    if let Some(declaracao) = &due.declaracao_tributaria {
        for compensacao in &declaracao.compensacoes {
            out.declaracao_compensacoes.push(CompensacaoRow {
                numero_due: numero.clone(),
                data_do_registro: compensacao.data_do_registro.clone(),
                numero_da_declaracao: compensacao.numero_da_declaracao.clone(),
                valor_compensado: compensacao.valor_compensado,
            });
        }
        for recolhimento in &declaracao.recolhimentos {
            out.declaracao_recolhimentos.push(RecolhimentoRow {
                numero_due: numero.clone(),
                data_do_pagamento: recolhimento.data_do_pagamento.clone(),
                data_do_registro: recolhimento.data_do_registro.clone(),
                valor_da_multa: recolhimento.valor_da_multa,
                valor_do_imposto_recolhido: recolhimento.valor_do_imposto_recolhido,
                valor_do_juros_mora: recolhimento.valor_do_juros_mora,
            });
        }
        for (indice, contestacao) in declaracao.contestacoes.iter().enumerate() {
            out.declaracao_contestacoes.push(ContestacaoRow {
                numero_due: numero.clone(),
                indice: indice as i64,
                data_do_registro: contestacao.data_do_registro.clone(),
                motivo: contestacao.motivo.clone(),
                status: contestacao.status.clone(),
                data_de_apreciacao: contestacao.data_de_apreciacao.clone(),
                observacao: contestacao.observacao.clone(),
            });
        }
    }

    if let Some(acts) = bonded_suspension {
        out.atos_concessorios_suspensao = normalize_bonded_acts(&numero, acts);
    }
    if let Some(acts) = bonded_exemption {
        out.atos_concessorios_isencao = normalize_bonded_acts(&numero, acts);
    }
    if let Some(exigencias) = fiscal_requirements {
        for exigencia in exigencias {
            out.exigencias_fiscais.push(map_exigencia(&numero, exigencia));
        }
    }

    Ok(out)
}

/// Normalize a bonded concessionary acts document on its own; used by the
/// targeted acts refresh as well as the full fetch.
pub fn normalize_bonded_acts(due_number: &str, acts: &[AtoConcessorio]) -> Vec<AtoConcessorioRow> {
    acts.iter()
        .map(|ato| AtoConcessorioRow {
            numero_due: due_number.to_string(),
            ato_numero: ato.numero.clone(),
            tipo_codigo: ato.tipo.as_ref().and_then(|t| t.codigo),
            tipo_descricao: ato.tipo.as_ref().and_then(|t| t.descricao.clone()),
            item_numero: ato.item.as_ref().and_then(|i| i.numero.clone()),
            item_ncm: ato.item.as_ref().and_then(|i| i.ncm.clone()),
            beneficiario_cnpj: ato.beneficiario.as_ref().and_then(|b| b.cnpj.clone()),
            quantidade_exportada: ato.quantidade_exportada,
            valor_com_cobertura_cambial: ato.valor_com_cobertura_cambial,
            valor_sem_cobertura_cambial: ato.valor_sem_cobertura_cambial,
            item_de_due_numero: ato.item_de_due.as_ref().and_then(|i| i.numero.clone()),
        })
        .collect()
}

fn map_principal(numero: &str, due: &DuePayload) -> DuePrincipalRow {
    let declarante = due.declarante.as_ref();
    let nacionalidade = declarante.and_then(|d| d.nacionalidade.as_ref());
    DuePrincipalRow {
        numero: numero.to_string(),
        chave_de_acesso: due.chave_de_acesso.clone(),
        data_de_registro: due.data_de_registro.clone(),
        bloqueio: due.bloqueio,
        canal: due.canal.clone(),
        embarque_em_recinto_alfandegado: due.embarque_em_recinto_alfandegado,
        despacho_em_recinto_alfandegado: due.despacho_em_recinto_alfandegado,
        despacho_em_recinto_domiciliar: due.despacho_em_recinto_domiciliar,
        forma_de_exportacao: due.forma_de_exportacao.clone(),
        impedido_de_embarque: due.impedido_de_embarque,
        informacoes_complementares: due.informacoes_complementares.clone(),
        ruc: due.ruc.clone(),
        situacao: due.situacao.clone(),
        situacao_do_tratamento_administrativo: due.situacao_do_tratamento_administrativo.clone(),
        tipo: due.tipo.clone(),
        tratamento_prioritario: due.tratamento_prioritario,
        responsavel_pelo_acd: due.responsavel_pelo_acd.clone(),
        data_de_criacao: due.data_de_criacao.clone(),
        data_do_cce: due.data_do_cce.clone(),
        data_do_desembaraco: due.data_do_desembaraco.clone(),
        data_do_acd: due.data_do_acd.clone(),
        data_da_averbacao: due.data_da_averbacao.clone(),
        valor_total_mercadoria: due.valor_total_mercadoria,
        inclusao_nota_fiscal: due.inclusao_nota_fiscal,
        exigencia_ativa: due.exigencia_ativa,
        consorciada: due.consorciada,
        dat: due.dat,
        oea: due.oea,
        declarante_numero_do_documento: declarante.and_then(|d| d.numero_do_documento.clone()),
        declarante_tipo_do_documento: declarante.and_then(|d| d.tipo_do_documento.clone()),
        declarante_nome: declarante.and_then(|d| d.nome.clone()),
        declarante_estrangeiro: declarante.and_then(|d| d.estrangeiro),
        declarante_nacionalidade_codigo: nacionalidade.and_then(|n| n.codigo),
        declarante_nacionalidade_nome: nacionalidade.and_then(|n| n.nome.clone()),
        declarante_nacionalidade_nome_resumido: nacionalidade
            .and_then(|n| n.nome_resumido.clone()),
        moeda_codigo: due.moeda.as_ref().and_then(|m| m.codigo),
        pais_importador_codigo: due.pais_importador.as_ref().and_then(|p| p.codigo),
        recinto_aduaneiro_de_despacho_codigo: due
            .recinto_aduaneiro_de_despacho
            .as_ref()
            .and_then(|r| r.codigo.clone()),
        recinto_aduaneiro_de_embarque_codigo: due
            .recinto_aduaneiro_de_embarque
            .as_ref()
            .and_then(|r| r.codigo.clone()),
        unidade_local_de_despacho_codigo: due
            .unidade_local_de_despacho
            .as_ref()
            .and_then(|u| u.codigo.clone()),
        unidade_local_de_embarque_codigo: due
            .unidade_local_de_embarque
            .as_ref()
            .and_then(|u| u.codigo.clone()),
        declaracao_tributaria_divergente: due
            .declaracao_tributaria
            .as_ref()
            .and_then(|d| d.divergente),
    }
}

fn map_evento(numero: &str, evento: &EventoHistorico) -> DueEventoRow {
    DueEventoRow {
        numero_due: numero.to_string(),
        data_e_hora_do_evento: evento.data_e_hora_do_evento.clone(),
        evento: evento.evento.clone(),
        responsavel: evento.responsavel.clone(),
        informacoes_adicionais: evento.informacoes_adicionais.clone(),
    }
}

fn map_item(out: &mut NormalizedDue, numero: &str, item: &ItemPayload) {
    let item_numero = item.numero.unwrap_or(0);
    let item_id = format!("{numero}_{item_numero}");
    let ncm = item.ncm.as_ref();
    let exportador = item.exportador.as_ref();

    out.itens.push(DueItemRow {
        id: item_id.clone(),
        numero_due: numero.to_string(),
        numero: item_numero,
        quantidade_na_unidade_estatistica: item.quantidade_na_unidade_estatistica,
        quantidade_na_unidade_comercializada: item.quantidade_na_unidade_comercializada,
        peso_liquido_total: item.peso_liquido_total,
        valor_da_mercadoria_na_condicao_de_venda: item.valor_da_mercadoria_na_condicao_de_venda,
        valor_da_mercadoria_no_local_de_embarque: item.valor_da_mercadoria_no_local_de_embarque,
        valor_da_mercadoria_no_local_de_embarque_em_reais: item
            .valor_da_mercadoria_no_local_de_embarque_em_reais,
        valor_da_mercadoria_na_condicao_de_venda_em_reais: item
            .valor_da_mercadoria_na_condicao_de_venda_em_reais,
        valor_total_calculado_item: item.valor_total_calculado_item,
        data_de_conversao: item.data_de_conversao.clone(),
        descricao_da_mercadoria: item.descricao_da_mercadoria.clone(),
        unidade_comercializada: item.unidade_comercializada.clone(),
        nome_importador: item.nome_importador.clone(),
        endereco_importador: item.endereco_importador.clone(),
        ncm_codigo: ncm.and_then(|n| n.codigo.clone()),
        ncm_descricao: ncm.and_then(|n| n.descricao.clone()),
        ncm_unidade_medida_estatistica: ncm.and_then(|n| n.unidade_medida_estatistica.clone()),
        exportador_numero_do_documento: exportador.and_then(|e| e.numero_do_documento.clone()),
        exportador_tipo_do_documento: exportador.and_then(|e| e.tipo_do_documento.clone()),
        codigo_condicao_venda: item.codigo_condicao_venda.as_ref().and_then(|c| c.codigo.clone()),
        exportacao_temporaria: item.exportacao_temporaria.as_ref().and_then(|e| e.temporaria),
    });

    for enquadramento in &item.lista_de_enquadramentos {
        out.item_enquadramentos.push(ItemEnquadramentoRow {
            due_item_id: item_id.clone(),
            numero_due: numero.to_string(),
            item_numero,
            codigo: enquadramento.codigo,
            data_registro: enquadramento.data_registro.clone(),
            descricao: enquadramento.descricao.clone(),
            grupo: enquadramento.grupo,
            tipo: enquadramento.tipo,
        });
    }

    for pais in &item.lista_pais_destino {
        out.item_paises_destino.push(ItemPaisDestinoRow {
            due_item_id: item_id.clone(),
            numero_due: numero.to_string(),
            item_numero,
            codigo_pais: pais.codigo,
        });
    }

    for (indice, tratamento) in item.tratamentos_administrativos.iter().enumerate() {
        let tratamento_id = format!("{item_id}_{indice}");
        out.item_tratamentos_administrativos.push(ItemTratamentoAdminRow {
            id: tratamento_id.clone(),
            due_item_id: item_id.clone(),
            numero_due: numero.to_string(),
            item_numero,
            mensagem: tratamento.mensagem.clone(),
            impeditivo_de_embarque: tratamento.impeditivo_de_embarque,
            codigo_lpco: tratamento.codigo_lpco.clone(),
            situacao: tratamento.situacao.clone(),
        });
        for orgao in &tratamento.orgaos {
            out.item_tratamentos_orgaos.push(ItemTratamentoOrgaoRow {
                tratamento_administrativo_id: tratamento_id.clone(),
                due_item_id: item_id.clone(),
                numero_due: numero.to_string(),
                orgao: orgao.clone(),
            });
        }
    }

    for nota in &item.itens_da_nota_de_remessa {
        out.item_notas_remessa.push(map_nota(&item_id, numero, item_numero, None, nota));
    }

    if let Some(nota) = &item.item_da_nota_fiscal_de_exportacao {
        out.item_nota_fiscal_exportacao.push(map_nota(&item_id, numero, item_numero, None, nota));
    }

    for (indice, nota) in item.itens_de_nota_complementar.iter().enumerate() {
        out.item_notas_complementares.push(map_nota(
            &item_id,
            numero,
            item_numero,
            Some(indice as i64),
            nota,
        ));
    }

    for (indice, atributo) in item.atributos.iter().enumerate() {
        out.item_atributos.push(ItemAtributoRow {
            due_item_id: item_id.clone(),
            numero_due: numero.to_string(),
            item_numero,
            indice: indice as i64,
            codigo: atributo.codigo.clone(),
            valor: atributo.valor.clone(),
            descricao: atributo.descricao.clone(),
        });
    }

    for (indice, doc) in item.documentos_importacao.iter().enumerate() {
        out.item_documentos_importacao.push(ItemDocImportacaoRow {
            due_item_id: item_id.clone(),
            numero_due: numero.to_string(),
            item_numero,
            indice: indice as i64,
            tipo: doc.tipo.clone(),
            numero: doc.numero.clone(),
            data_registro: doc.data_registro.clone(),
            item_documento: doc.item_documento,
            quantidade_utilizada: doc.quantidade_utilizada,
        });
    }

    for (indice, doc) in item.documentos_de_transformacao.iter().enumerate() {
        out.item_documentos_transformacao.push(ItemDocTransformacaoRow {
            due_item_id: item_id.clone(),
            numero_due: numero.to_string(),
            item_numero,
            indice: indice as i64,
            tipo: doc.tipo.clone(),
            numero: doc.numero.clone(),
            data_registro: doc.data_registro.clone(),
        });
    }

    if let Some(calculo) = &item.calculo_tributario {
        for (indice, tratamento) in calculo.tratamentos_tributarios.iter().enumerate() {
            out.item_calculo_tratamentos.push(ItemCalculoTratamentoRow {
                due_item_id: item_id.clone(),
                numero_due: numero.to_string(),
                item_numero,
                indice: indice as i64,
                codigo: tratamento.codigo.clone(),
                descricao: tratamento.descricao.clone(),
                tipo: tratamento.tipo.clone(),
                tributo: tratamento.tributo.clone(),
            });
        }
        for (indice, quadro) in calculo.quadro_de_calculos.iter().enumerate() {
            out.item_calculo_quadros.push(ItemCalculoQuadroRow {
                due_item_id: item_id.clone(),
                numero_due: numero.to_string(),
                item_numero,
                indice: indice as i64,
                tributo: quadro.tributo.clone(),
                base_de_calculo: quadro.base_de_calculo,
                aliquota: quadro.aliquota,
                valor_devido: quadro.valor_devido,
                valor_recolhido: quadro.valor_recolhido,
                valor_compensado: quadro.valor_compensado,
            });
        }
    }
}

fn map_nota(
    item_id: &str,
    numero: &str,
    item_numero: i64,
    indice: Option<i64>,
    nota: &ItemNotaReferenciada,
) -> ItemNotaRow {
    let nf = nota.nota_fiscal.as_ref();
    let emitente = nf.and_then(|n| n.identificacao_do_emitente.as_ref());
    let ncm = nota.ncm.as_ref();
    ItemNotaRow {
        due_item_id: item_id.to_string(),
        numero_due: numero.to_string(),
        item_numero,
        indice,
        numero_do_item: nota.numero_do_item,
        chave_de_acesso: nf.and_then(|n| n.chave_de_acesso.clone()),
        modelo: nf.and_then(|n| n.modelo.clone()),
        serie: nf.and_then(|n| n.serie),
        numero_do_documento: nf.and_then(|n| n.numero_do_documento),
        uf_do_emissor: nf.and_then(|n| n.uf_do_emissor.clone()),
        identificacao_emitente: emitente.and_then(|e| e.numero.clone()),
        emitente_cnpj: emitente.and_then(|e| e.cnpj),
        emitente_cpf: emitente.and_then(|e| e.cpf),
        finalidade: nf.and_then(|n| n.finalidade.clone()),
        quantidade_de_itens: nf.and_then(|n| n.quantidade_de_itens),
        nota_fiscal_eletronica: nf.and_then(|n| n.nota_fiscal_eletronica),
        cfop: nota.cfop,
        codigo_do_produto: nota.codigo_do_produto.clone(),
        descricao: nota.descricao.clone(),
        quantidade_estatistica: nota.quantidade_estatistica,
        unidade_comercial: nota.unidade_comercial.clone(),
        valor_total_bruto: nota.valor_total_bruto,
        valor_total_calculado: nota.valor_total_calculado,
        quantidade_consumida: nota.quantidade_consumida,
        ncm_codigo: ncm.and_then(|n| n.codigo.clone()),
        ncm_descricao: ncm.and_then(|n| n.descricao.clone()),
        ncm_unidade_medida_estatistica: ncm.and_then(|n| n.unidade_medida_estatistica.clone()),
        apresentada_para_despacho: nota.apresentada_para_despacho,
    }
}

fn map_exigencia(numero: &str, exigencia: &ExigenciaFiscal) -> ExigenciaFiscalRow {
    ExigenciaFiscalRow {
        numero_due: numero.to_string(),
        numero_exigencia: exigencia.numero.clone(),
        tipo_exigencia: exigencia.tipo.clone(),
        data_criacao: exigencia.data_criacao.clone(),
        data_limite: exigencia.data_limite.clone(),
        status: exigencia.status.clone(),
        orgao_responsavel: exigencia.orgao_responsavel.clone(),
        descricao: exigencia.descricao.clone(),
        valor_exigido: exigencia.valor_exigido,
        valor_pago: exigencia.valor_pago,
        observacoes: exigencia.observacoes.clone(),
    }
}
