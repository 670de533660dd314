//! Normalized row types.
//!
//! One struct per destination table, field names matching the store's
//! columns. The normalizer produces a [`NormalizedDue`] per declaration and
//! the store writes it in a single transaction. Upstream instants stay as
//! the raw strings the portal supplied (offset preserved); monetary values
//! are decimals.

use rust_decimal::Decimal;

/// `due_principal` — the authoritative record, keyed by `numero`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DuePrincipalRow {
    pub numero: String,
    pub chave_de_acesso: Option<String>,
    /// Remote revision: changes on any server-side amendment.
    pub data_de_registro: Option<String>,
    pub bloqueio: Option<bool>,
    pub canal: Option<String>,
    pub embarque_em_recinto_alfandegado: Option<bool>,
    pub despacho_em_recinto_alfandegado: Option<bool>,
    pub despacho_em_recinto_domiciliar: Option<bool>,
    pub forma_de_exportacao: Option<String>,
    pub impedido_de_embarque: Option<bool>,
    pub informacoes_complementares: Option<String>,
    pub ruc: Option<String>,
    pub situacao: Option<String>,
    pub situacao_do_tratamento_administrativo: Option<String>,
    pub tipo: Option<String>,
    pub tratamento_prioritario: Option<bool>,
    pub responsavel_pelo_acd: Option<String>,
    pub data_de_criacao: Option<String>,
    pub data_do_cce: Option<String>,
    pub data_do_desembaraco: Option<String>,
    pub data_do_acd: Option<String>,
    pub data_da_averbacao: Option<String>,
    pub valor_total_mercadoria: Option<Decimal>,
    pub inclusao_nota_fiscal: Option<bool>,
    pub exigencia_ativa: Option<bool>,
    pub consorciada: Option<bool>,
    pub dat: Option<bool>,
    pub oea: Option<bool>,
    pub declarante_numero_do_documento: Option<String>,
    pub declarante_tipo_do_documento: Option<String>,
    pub declarante_nome: Option<String>,
    pub declarante_estrangeiro: Option<bool>,
    pub declarante_nacionalidade_codigo: Option<i64>,
    pub declarante_nacionalidade_nome: Option<String>,
    pub declarante_nacionalidade_nome_resumido: Option<String>,
    pub moeda_codigo: Option<i64>,
    pub pais_importador_codigo: Option<i64>,
    pub recinto_aduaneiro_de_despacho_codigo: Option<String>,
    pub recinto_aduaneiro_de_embarque_codigo: Option<String>,
    pub unidade_local_de_despacho_codigo: Option<String>,
    pub unidade_local_de_embarque_codigo: Option<String>,
    pub declaracao_tributaria_divergente: Option<bool>,
}

/// `due_eventos_historico`
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DueEventoRow {
    pub numero_due: String,
    pub data_e_hora_do_evento: Option<String>,
    pub evento: Option<String>,
    pub responsavel: Option<String>,
    pub informacoes_adicionais: Option<String>,
}

/// `due_itens` — `id` is `{numero_due}_{numero}`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DueItemRow {
    pub id: String,
    pub numero_due: String,
    pub numero: i64,
    pub quantidade_na_unidade_estatistica: Option<Decimal>,
    pub quantidade_na_unidade_comercializada: Option<Decimal>,
    pub peso_liquido_total: Option<Decimal>,
    pub valor_da_mercadoria_na_condicao_de_venda: Option<Decimal>,
    pub valor_da_mercadoria_no_local_de_embarque: Option<Decimal>,
    pub valor_da_mercadoria_no_local_de_embarque_em_reais: Option<Decimal>,
    pub valor_da_mercadoria_na_condicao_de_venda_em_reais: Option<Decimal>,
    pub valor_total_calculado_item: Option<Decimal>,
    pub data_de_conversao: Option<String>,
    pub descricao_da_mercadoria: Option<String>,
    pub unidade_comercializada: Option<String>,
    pub nome_importador: Option<String>,
    pub endereco_importador: Option<String>,
    pub ncm_codigo: Option<String>,
    pub ncm_descricao: Option<String>,
    pub ncm_unidade_medida_estatistica: Option<String>,
    // The exporter's name is documented upstream but never populated, so the
    // row carries only the document identification.
    pub exportador_numero_do_documento: Option<String>,
    pub exportador_tipo_do_documento: Option<String>,
    pub codigo_condicao_venda: Option<String>,
    pub exportacao_temporaria: Option<bool>,
}

/// `due_item_enquadramentos`
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ItemEnquadramentoRow {
    pub due_item_id: String,
    pub numero_due: String,
    pub item_numero: i64,
    pub codigo: Option<i64>,
    pub data_registro: Option<String>,
    pub descricao: Option<String>,
    pub grupo: Option<i64>,
    pub tipo: Option<i64>,
}

/// `due_item_paises_destino`
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ItemPaisDestinoRow {
    pub due_item_id: String,
    pub numero_due: String,
    pub item_numero: i64,
    pub codigo_pais: Option<i64>,
}

/// `due_item_tratamentos_administrativos` — `id` is `{due_item_id}_{indice}`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ItemTratamentoAdminRow {
    pub id: String,
    pub due_item_id: String,
    pub numero_due: String,
    pub item_numero: i64,
    pub mensagem: Option<String>,
    pub impeditivo_de_embarque: Option<bool>,
    pub codigo_lpco: Option<String>,
    pub situacao: Option<String>,
}

/// `due_item_tratamentos_administrativos_orgaos`
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ItemTratamentoOrgaoRow {
    pub tratamento_administrativo_id: String,
    pub due_item_id: String,
    pub numero_due: String,
    pub orgao: String,
}

/// Shared shape of `due_item_notas_remessa`,
/// `due_item_nota_fiscal_exportacao` and `due_item_notas_complementares`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ItemNotaRow {
    pub due_item_id: String,
    pub numero_due: String,
    pub item_numero: i64,
    /// Positional index; only meaningful for the list-valued variants.
    pub indice: Option<i64>,
    pub numero_do_item: Option<i64>,
    pub chave_de_acesso: Option<String>,
    pub modelo: Option<String>,
    pub serie: Option<i64>,
    pub numero_do_documento: Option<i64>,
    pub uf_do_emissor: Option<String>,
    pub identificacao_emitente: Option<String>,
    pub emitente_cnpj: Option<bool>,
    pub emitente_cpf: Option<bool>,
    pub finalidade: Option<String>,
    pub quantidade_de_itens: Option<i64>,
    pub nota_fiscal_eletronica: Option<bool>,
    pub cfop: Option<i64>,
    pub codigo_do_produto: Option<String>,
    pub descricao: Option<String>,
    pub quantidade_estatistica: Option<Decimal>,
    pub unidade_comercial: Option<String>,
    pub valor_total_bruto: Option<Decimal>,
    pub valor_total_calculado: Option<Decimal>,
    pub quantidade_consumida: Option<Decimal>,
    pub ncm_codigo: Option<String>,
    pub ncm_descricao: Option<String>,
    pub ncm_unidade_medida_estatistica: Option<String>,
    pub apresentada_para_despacho: Option<bool>,
}

/// `due_item_atributos`
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ItemAtributoRow {
    pub due_item_id: String,
    pub numero_due: String,
    pub item_numero: i64,
    pub indice: i64,
    pub codigo: Option<String>,
    pub valor: Option<String>,
    pub descricao: Option<String>,
}

/// `due_item_documentos_importacao`
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ItemDocImportacaoRow {
    pub due_item_id: String,
    pub numero_due: String,
    pub item_numero: i64,
    pub indice: i64,
    pub tipo: Option<String>,
    pub numero: Option<String>,
    pub data_registro: Option<String>,
    pub item_documento: Option<i64>,
    pub quantidade_utilizada: Option<Decimal>,
}

/// `due_item_documentos_transformacao`
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ItemDocTransformacaoRow {
    pub due_item_id: String,
    pub numero_due: String,
    pub item_numero: i64,
    pub indice: i64,
    pub tipo: Option<String>,
    pub numero: Option<String>,
    pub data_registro: Option<String>,
}

/// `due_item_calculo_tributario_tratamentos`
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ItemCalculoTratamentoRow {
    pub due_item_id: String,
    pub numero_due: String,
    pub item_numero: i64,
    pub indice: i64,
    pub codigo: Option<String>,
    pub descricao: Option<String>,
    pub tipo: Option<String>,
    pub tributo: Option<String>,
}

/// `due_item_calculo_tributario_quadros`
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ItemCalculoQuadroRow {
    pub due_item_id: String,
    pub numero_due: String,
    pub item_numero: i64,
    pub indice: i64,
    pub tributo: Option<String>,
    pub base_de_calculo: Option<Decimal>,
    pub aliquota: Option<Decimal>,
    pub valor_devido: Option<Decimal>,
    pub valor_recolhido: Option<Decimal>,
    pub valor_compensado: Option<Decimal>,
}

/// `due_situacoes_carga`
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SituacaoCargaRow {
    pub numero_due: String,
    pub codigo: Option<i64>,
    pub descricao: Option<String>,
    pub carga_operada: Option<bool>,
}

/// `due_solicitacoes`
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SolicitacaoRow {
    pub numero_due: String,
    pub tipo_solicitacao: Option<String>,
    pub data_da_solicitacao: Option<String>,
    pub usuario_responsavel: Option<String>,
    pub codigo_do_status_da_solicitacao: Option<i64>,
    pub status_da_solicitacao: Option<String>,
    pub data_de_apreciacao: Option<String>,
    pub motivo: Option<String>,
}

/// `due_declaracao_tributaria_compensacoes`
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CompensacaoRow {
    pub numero_due: String,
    pub data_do_registro: Option<String>,
    pub numero_da_declaracao: Option<String>,
    pub valor_compensado: Option<Decimal>,
}

/// `due_declaracao_tributaria_recolhimentos`
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RecolhimentoRow {
    pub numero_due: String,
    pub data_do_pagamento: Option<String>,
    pub data_do_registro: Option<String>,
    pub valor_da_multa: Option<Decimal>,
    pub valor_do_imposto_recolhido: Option<Decimal>,
    pub valor_do_juros_mora: Option<Decimal>,
}

/// `due_declaracao_tributaria_contestacoes`
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ContestacaoRow {
    pub numero_due: String,
    pub indice: i64,
    pub data_do_registro: Option<String>,
    pub motivo: Option<String>,
    pub status: Option<String>,
    pub data_de_apreciacao: Option<String>,
    pub observacao: Option<String>,
}

/// `due_atos_concessorios_suspensao` / `due_atos_concessorios_isencao`
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AtoConcessorioRow {
    pub numero_due: String,
    pub ato_numero: Option<String>,
    pub tipo_codigo: Option<i64>,
    pub tipo_descricao: Option<String>,
    pub item_numero: Option<String>,
    pub item_ncm: Option<String>,
    pub beneficiario_cnpj: Option<String>,
    pub quantidade_exportada: Option<Decimal>,
    pub valor_com_cobertura_cambial: Option<Decimal>,
    pub valor_sem_cobertura_cambial: Option<Decimal>,
    pub item_de_due_numero: Option<String>,
}

/// `due_exigencias_fiscais`
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ExigenciaFiscalRow {
    pub numero_due: String,
    pub numero_exigencia: Option<String>,
    pub tipo_exigencia: Option<String>,
    pub data_criacao: Option<String>,
    pub data_limite: Option<String>,
    pub status: Option<String>,
    pub orgao_responsavel: Option<String>,
    pub descricao: Option<String>,
    pub valor_exigido: Option<Decimal>,
    pub valor_pago: Option<Decimal>,
    pub observacoes: Option<String>,
}

/// `nf_due_vinculo` — invoice key → DUE number.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LinkRow {
    pub chave_nf: String,
    pub numero_due: String,
}

/// Full normalized output for one DUE: the principal row plus every child
/// table's rows. Written atomically by the store.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NormalizedDue {
    pub principal: DuePrincipalRow,
    pub eventos_historico: Vec<DueEventoRow>,
    pub itens: Vec<DueItemRow>,
    pub item_enquadramentos: Vec<ItemEnquadramentoRow>,
    pub item_paises_destino: Vec<ItemPaisDestinoRow>,
    pub item_tratamentos_administrativos: Vec<ItemTratamentoAdminRow>,
    pub item_tratamentos_orgaos: Vec<ItemTratamentoOrgaoRow>,
    pub item_notas_remessa: Vec<ItemNotaRow>,
    pub item_nota_fiscal_exportacao: Vec<ItemNotaRow>,
    pub item_notas_complementares: Vec<ItemNotaRow>,
    pub item_atributos: Vec<ItemAtributoRow>,
    pub item_documentos_importacao: Vec<ItemDocImportacaoRow>,
    pub item_documentos_transformacao: Vec<ItemDocTransformacaoRow>,
    pub item_calculo_tratamentos: Vec<ItemCalculoTratamentoRow>,
    pub item_calculo_quadros: Vec<ItemCalculoQuadroRow>,
    pub situacoes_carga: Vec<SituacaoCargaRow>,
    pub solicitacoes: Vec<SolicitacaoRow>,
    pub declaracao_compensacoes: Vec<CompensacaoRow>,
    pub declaracao_recolhimentos: Vec<RecolhimentoRow>,
    pub declaracao_contestacoes: Vec<ContestacaoRow>,
    pub atos_concessorios_suspensao: Vec<AtoConcessorioRow>,
    pub atos_concessorios_isencao: Vec<AtoConcessorioRow>,
    pub exigencias_fiscais: Vec<ExigenciaFiscalRow>,
}

impl NormalizedDue {
    pub fn numero(&self) -> &str {
        &self.principal.numero
    }

    /// Row count per destination table, for logging and run summaries.
    pub fn row_counts(&self) -> Vec<(&'static str, usize)> {
        vec![
            ("due_principal", 1),
            ("due_eventos_historico", self.eventos_historico.len()),
            ("due_itens", self.itens.len()),
            ("due_item_enquadramentos", self.item_enquadramentos.len()),
            ("due_item_paises_destino", self.item_paises_destino.len()),
            (
                "due_item_tratamentos_administrativos",
                self.item_tratamentos_administrativos.len(),
            ),
            (
                "due_item_tratamentos_administrativos_orgaos",
                self.item_tratamentos_orgaos.len(),
            ),
            ("due_item_notas_remessa", self.item_notas_remessa.len()),
            ("due_item_nota_fiscal_exportacao", self.item_nota_fiscal_exportacao.len()),
            ("due_item_notas_complementares", self.item_notas_complementares.len()),
            ("due_item_atributos", self.item_atributos.len()),
            ("due_item_documentos_importacao", self.item_documentos_importacao.len()),
            (
                "due_item_documentos_transformacao",
                self.item_documentos_transformacao.len(),
            ),
            (
                "due_item_calculo_tributario_tratamentos",
                self.item_calculo_tratamentos.len(),
            ),
            ("due_item_calculo_tributario_quadros", self.item_calculo_quadros.len()),
            ("due_situacoes_carga", self.situacoes_carga.len()),
            ("due_solicitacoes", self.solicitacoes.len()),
            (
                "due_declaracao_tributaria_compensacoes",
                self.declaracao_compensacoes.len(),
            ),
            (
                "due_declaracao_tributaria_recolhimentos",
                self.declaracao_recolhimentos.len(),
            ),
            (
                "due_declaracao_tributaria_contestacoes",
                self.declaracao_contestacoes.len(),
            ),
            ("due_atos_concessorios_suspensao", self.atos_concessorios_suspensao.len()),
            ("due_atos_concessorios_isencao", self.atos_concessorios_isencao.len()),
            ("due_exigencias_fiscais", self.exigencias_fiscais.len()),
        ]
    }

    pub fn total_rows(&self) -> usize {
        self.row_counts().iter().map(|(_, n)| n).sum()
    }
}
