//! Upstream JSON documents.
//!
//! Deserialization targets for the portal's DUE API. Every field is
//! optional or defaulted: the upstream omits keys freely and the normalizer
//! decides what becomes a column and what stays out. Fields the upstream
//! documents but never populates (`eventosDoHistorico[].detalhes`,
//! `eventosDoHistorico[].motivo`, `itens[].exportador.nome`) are not
//! modeled at all so they can never leak into the store.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// One entry of the lookup-by-invoice response: a link object whose `rel`
/// carries the DUE number and `href` the canonical resource URL.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct DueLookupLink {
    pub rel: Option<String>,
    pub href: Option<String>,
}

/// Principal DUE document.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(rename_all = "camelCase", default)]
pub struct DuePayload {
    pub numero: Option<String>,
    pub chave_de_acesso: Option<String>,
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
    #[serde(rename = "responsavelPeloACD")]
    pub responsavel_pelo_acd: Option<String>,
    pub data_de_criacao: Option<String>,
    #[serde(rename = "dataDoCCE")]
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
    pub declarante: Option<Party>,
    pub moeda: Option<NumericCode>,
    pub pais_importador: Option<NumericCode>,
    pub recinto_aduaneiro_de_despacho: Option<TextCode>,
    pub recinto_aduaneiro_de_embarque: Option<TextCode>,
    pub unidade_local_de_despacho: Option<TextCode>,
    pub unidade_local_de_embarque: Option<TextCode>,
    pub declaracao_tributaria: Option<DeclaracaoTributaria>,
    pub eventos_do_historico: Vec<EventoHistorico>,
    pub itens: Vec<ItemPayload>,
    pub situacoes_da_carga: Vec<SituacaoCarga>,
    pub solicitacoes: Vec<Solicitacao>,
}

/// Reference object carrying a numeric domain code.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(rename_all = "camelCase", default)]
pub struct NumericCode {
    pub codigo: Option<i64>,
}

/// Reference object carrying a textual domain code.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(rename_all = "camelCase", default)]
pub struct TextCode {
    pub codigo: Option<String>,
}

/// Declarant or exporter identification.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Party {
    pub numero_do_documento: Option<String>,
    pub tipo_do_documento: Option<String>,
    pub nome: Option<String>,
    pub estrangeiro: Option<bool>,
    pub nacionalidade: Option<Nacionalidade>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Nacionalidade {
    pub codigo: Option<i64>,
    pub nome: Option<String>,
    pub nome_resumido: Option<String>,
}

/// History event. Only the populated fields are modeled.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(rename_all = "camelCase", default)]
pub struct EventoHistorico {
    pub data_e_hora_do_evento: Option<String>,
    pub evento: Option<String>,
    pub responsavel: Option<String>,
    pub informacoes_adicionais: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SituacaoCarga {
    pub codigo: Option<i64>,
    pub descricao: Option<String>,
    pub carga_operada: Option<bool>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Solicitacao {
    pub tipo_solicitacao: Option<String>,
    pub data_da_solicitacao: Option<String>,
    pub usuario_responsavel: Option<String>,
    pub codigo_do_status_da_solicitacao: Option<i64>,
    pub status_da_solicitacao: Option<String>,
    pub data_de_apreciacao: Option<String>,
    pub motivo: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(rename_all = "camelCase", default)]
pub struct DeclaracaoTributaria {
    pub divergente: Option<bool>,
    pub compensacoes: Vec<Compensacao>,
    pub recolhimentos: Vec<Recolhimento>,
    pub contestacoes: Vec<Contestacao>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Compensacao {
    pub data_do_registro: Option<String>,
    pub numero_da_declaracao: Option<String>,
    pub valor_compensado: Option<Decimal>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Recolhimento {
    pub data_do_pagamento: Option<String>,
    pub data_do_registro: Option<String>,
    pub valor_da_multa: Option<Decimal>,
    pub valor_do_imposto_recolhido: Option<Decimal>,
    pub valor_do_juros_mora: Option<Decimal>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Contestacao {
    pub data_do_registro: Option<String>,
    pub motivo: Option<String>,
    pub status: Option<String>,
    pub data_de_apreciacao: Option<String>,
    pub observacao: Option<String>,
}

/// One item of the DUE.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ItemPayload {
    pub numero: Option<i64>,
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
    pub ncm: Option<Ncm>,
    pub exportador: Option<Party>,
    pub codigo_condicao_venda: Option<TextCode>,
    pub exportacao_temporaria: Option<ExportacaoTemporaria>,
    pub lista_de_enquadramentos: Vec<Enquadramento>,
    pub lista_pais_destino: Vec<NumericCode>,
    pub tratamentos_administrativos: Vec<TratamentoAdministrativo>,
    pub itens_da_nota_de_remessa: Vec<ItemNotaReferenciada>,
    pub item_da_nota_fiscal_de_exportacao: Option<ItemNotaReferenciada>,
    pub itens_de_nota_complementar: Vec<ItemNotaReferenciada>,
    pub atributos: Vec<Atributo>,
    pub documentos_importacao: Vec<DocumentoImportacao>,
    pub documentos_de_transformacao: Vec<DocumentoTransformacao>,
    pub calculo_tributario: Option<CalculoTributario>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Ncm {
    pub codigo: Option<String>,
    pub descricao: Option<String>,
    pub unidade_medida_estatistica: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ExportacaoTemporaria {
    pub temporaria: Option<bool>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Enquadramento {
    pub codigo: Option<i64>,
    pub data_registro: Option<String>,
    pub descricao: Option<String>,
    pub grupo: Option<i64>,
    pub tipo: Option<i64>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(rename_all = "camelCase", default)]
pub struct TratamentoAdministrativo {
    pub mensagem: Option<String>,
    pub impeditivo_de_embarque: Option<bool>,
    #[serde(rename = "codigoLPCO")]
    pub codigo_lpco: Option<String>,
    pub situacao: Option<String>,
    pub orgaos: Vec<String>,
}

/// Item of a referenced fiscal invoice (remessa, exportação or
/// complementar — the three references share one shape, with fields the
/// variant does not carry simply absent).
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ItemNotaReferenciada {
    pub numero_do_item: Option<i64>,
    pub nota_fiscal: Option<NotaFiscal>,
    pub cfop: Option<i64>,
    pub codigo_do_produto: Option<String>,
    pub descricao: Option<String>,
    pub quantidade_estatistica: Option<Decimal>,
    pub unidade_comercial: Option<String>,
    pub valor_total_bruto: Option<Decimal>,
    pub valor_total_calculado: Option<Decimal>,
    pub quantidade_consumida: Option<Decimal>,
    pub ncm: Option<Ncm>,
    pub apresentada_para_despacho: Option<bool>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(rename_all = "camelCase", default)]
pub struct NotaFiscal {
    pub chave_de_acesso: Option<String>,
    pub modelo: Option<String>,
    pub serie: Option<i64>,
    pub numero_do_documento: Option<i64>,
    pub uf_do_emissor: Option<String>,
    pub identificacao_do_emitente: Option<IdentificacaoEmitente>,
    pub finalidade: Option<String>,
    pub quantidade_de_itens: Option<i64>,
    // The upstream misspells this key; the rename is deliberate.
    #[serde(rename = "notaFicalEletronica")]
    pub nota_fiscal_eletronica: Option<bool>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(rename_all = "camelCase", default)]
pub struct IdentificacaoEmitente {
    pub numero: Option<String>,
    pub cnpj: Option<bool>,
    pub cpf: Option<bool>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Atributo {
    pub codigo: Option<String>,
    pub valor: Option<String>,
    pub descricao: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(rename_all = "camelCase", default)]
pub struct DocumentoImportacao {
    pub tipo: Option<String>,
    pub numero: Option<String>,
    pub data_registro: Option<String>,
    pub item_documento: Option<i64>,
    pub quantidade_utilizada: Option<Decimal>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(rename_all = "camelCase", default)]
pub struct DocumentoTransformacao {
    pub tipo: Option<String>,
    pub numero: Option<String>,
    pub data_registro: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CalculoTributario {
    pub tratamentos_tributarios: Vec<TratamentoTributario>,
    pub quadro_de_calculos: Vec<QuadroCalculo>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(rename_all = "camelCase", default)]
pub struct TratamentoTributario {
    pub codigo: Option<String>,
    pub descricao: Option<String>,
    pub tipo: Option<String>,
    pub tributo: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(rename_all = "camelCase", default)]
pub struct QuadroCalculo {
    pub tributo: Option<String>,
    pub base_de_calculo: Option<Decimal>,
    pub aliquota: Option<Decimal>,
    pub valor_devido: Option<Decimal>,
    pub valor_recolhido: Option<Decimal>,
    pub valor_compensado: Option<Decimal>,
}

/// Bonded concessionary act (drawback), suspension or exemption flavour.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AtoConcessorio {
    pub numero: Option<String>,
    pub tipo: Option<AtoTipo>,
    pub item: Option<AtoItem>,
    pub beneficiario: Option<AtoBeneficiario>,
    pub quantidade_exportada: Option<Decimal>,
    pub valor_com_cobertura_cambial: Option<Decimal>,
    pub valor_sem_cobertura_cambial: Option<Decimal>,
    #[serde(rename = "itemDeDUE")]
    pub item_de_due: Option<AtoItemDue>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AtoTipo {
    pub codigo: Option<i64>,
    pub descricao: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AtoItem {
    pub numero: Option<String>,
    pub ncm: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AtoBeneficiario {
    pub cnpj: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AtoItemDue {
    pub numero: Option<String>,
}

/// Fiscal requirement attached to a DUE. The endpoint has been observed in
/// two naming conventions; aliases accept both.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ExigenciaFiscal {
    #[serde(alias = "numeroExigencia")]
    pub numero: Option<String>,
    #[serde(alias = "tipoExigencia")]
    pub tipo: Option<String>,
    #[serde(alias = "data_criacao")]
    pub data_criacao: Option<String>,
    #[serde(alias = "data_limite")]
    pub data_limite: Option<String>,
    pub status: Option<String>,
    #[serde(alias = "orgao_responsavel")]
    pub orgao_responsavel: Option<String>,
    pub descricao: Option<String>,
    #[serde(alias = "valor_exigido")]
    pub valor_exigido: Option<Decimal>,
    #[serde(alias = "valor_pago")]
    pub valor_pago: Option<Decimal>,
    #[serde(alias = "observacao")]
    pub observacoes: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn minimal_due_deserializes() {
        let payload: DuePayload = serde_json::from_str(
            r#"{
                "numero": "24BR0000000001",
                "situacao": "REGISTRADA",
                "dataDeRegistro": "2024-03-01T10:00:00-03:00",
                "itens": [{"numero": 1, "ncm": {"codigo": "09011110"}}],
                "eventosDoHistorico": [
                    {"dataEHoraDoEvento": "2024-03-01T10:00:00-03:00", "evento": "Registro"}
                ]
            }"#,
        )
        .expect("payload parses");

        assert_eq!(payload.numero.as_deref(), Some("24BR0000000001"));
        assert_eq!(payload.itens.len(), 1);
        assert_eq!(payload.itens[0].numero, Some(1));
        assert_eq!(payload.eventos_do_historico.len(), 1);
        assert!(payload.declaracao_tributaria.is_none());
    }

    #[test]
    fn monetary_values_parse_as_decimals() {
        let payload: DuePayload = serde_json::from_str(
            r#"{"numero": "24BR1", "valorTotalMercadoria": 1234.56}"#,
        )
        .expect("payload parses");
        assert_eq!(
            payload.valor_total_mercadoria,
            Some("1234.56".parse().expect("decimal"))
        );
    }

    #[test]
    fn upstream_typo_field_is_honoured() {
        let nf: NotaFiscal =
            serde_json::from_str(r#"{"notaFicalEletronica": true}"#).expect("parses");
        assert_eq!(nf.nota_fiscal_eletronica, Some(true));
    }

    #[test]
    fn exigencia_aliases_accept_both_conventions() {
        let a: ExigenciaFiscal =
            serde_json::from_str(r#"{"numero": "EX-1", "valorExigido": 10}"#).expect("parses");
        let b: ExigenciaFiscal =
            serde_json::from_str(r#"{"numeroExigencia": "EX-1", "valor_exigido": 10}"#)
                .expect("parses");
        assert_eq!(a.numero, b.numero);
        assert_eq!(a.valor_exigido, b.valor_exigido);
    }

    #[test]
    fn lookup_links_parse() {
        let links: Vec<DueLookupLink> = serde_json::from_str(
            r#"[{"rel": "24BR0000000001", "href": "https://example/due/24BR0000000001"}]"#,
        )
        .expect("parses");
        assert_eq!(links[0].rel.as_deref(), Some("24BR0000000001"));
    }
}
