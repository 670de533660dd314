//! Authenticated, rate-gated client for the DUE API.
//!
//! Every call acquires the global rate gate, attaches the bearer headers,
//! executes with a per-request timeout and classifies the response. Token
//! rejections invalidate the bearer and retry exactly once (the retry
//! takes its own gate slot). A lock-out body fails the call with
//! `RateLocked` after informing the gate — deliberately without any retry,
//! because traffic during a lock-out escalates the penalty.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{FixedOffset, Utc};
use duesync_common::RateGate;
use duesync_core::ports::{RevisionProbe, SiscomexGateway};
use duesync_domain::config::UpstreamConfig;
use duesync_domain::payload::{AtoConcessorio, DueLookupLink, DuePayload, ExigenciaFiscal};
use duesync_domain::{DueSyncError, Result};
use reqwest::StatusCode;
use serde_json::Value;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use super::lockout::lockout_release;
use crate::auth::TokenAuthority;
use crate::errors::classify_reqwest;

pub struct SiscomexClient {
    http: reqwest::Client,
    base_url: String,
    gate: Arc<RateGate>,
    auth: Arc<TokenAuthority>,
    lockout_offset: FixedOffset,
}

impl SiscomexClient {
    pub fn new(
        upstream: &UpstreamConfig,
        gate: Arc<RateGate>,
        auth: Arc<TokenAuthority>,
    ) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(upstream.effective_http_timeout())
            .build()
            .map_err(classify_reqwest)?;
        Ok(Self {
            http,
            base_url: upstream.base_url.trim_end_matches('/').to_string(),
            gate,
            auth,
            lockout_offset: upstream.lockout_offset,
        })
    }

    /// One gated, authenticated GET with response classification.
    async fn get_json(&self, url: &str, cancel: &CancellationToken) -> Result<Value> {
        // Attempt 0 plus one retry reserved for a rejected token.
        for attempt in 0..2 {
            self.gate.admit(cancel).await.map_err(|_| DueSyncError::Cancelled)?;
            let headers = self.auth.auth_headers(cancel).await?;

            debug!(url, attempt, "issuing upstream request");
            let response =
                self.http.get(url).headers(headers).send().await.map_err(classify_reqwest)?;
            let status = response.status();

            if matches!(status, StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN) {
                if attempt == 0 {
                    warn!(url, %status, "token rejected; re-authenticating once");
                    self.auth.invalidate().await;
                    continue;
                }
                return Err(DueSyncError::Auth(format!(
                    "upstream rejected the token twice ({status})"
                )));
            }

            let text = response.text().await.map_err(classify_reqwest)?;
            let body: Option<Value> = serde_json::from_str(&text).ok();

            // The lock-out marker can arrive under any status code.
            if let Some(body) = body.as_ref() {
                if let Some(until) = lockout_release(body, self.lockout_offset, Utc::now()) {
                    warn!(url, until = %until, "upstream lock-out detected");
                    self.gate.note_lockout(until);
                    return Err(DueSyncError::RateLocked { until });
                }
            }

            if status.is_success() {
                return body.ok_or_else(|| {
                    DueSyncError::Transient(format!("upstream returned non-JSON body for {url}"))
                });
            }
            return Err(classify_status(status, &text));
        }
        Err(DueSyncError::Internal("request loop exhausted".into()))
    }

    fn url(&self, suffix: &str) -> String {
        format!("{}{}", self.base_url, suffix)
    }
}

fn classify_status(status: StatusCode, body: &str) -> DueSyncError {
    let snippet: String = body.chars().take(120).collect();
    if status.is_server_error() {
        DueSyncError::Transient(format!("upstream error ({status}): {snippet}"))
    } else if status == StatusCode::UNPROCESSABLE_ENTITY {
        // 422 is how the portal throttles bursts short of a lock-out.
        DueSyncError::Transient(format!("upstream throttling (422): {snippet}"))
    } else {
        DueSyncError::Permanent(format!("upstream error ({status}): {snippet}"))
    }
}

fn decode<T: serde::de::DeserializeOwned>(value: Value, what: &str) -> Result<T> {
    serde_json::from_value(value)
        .map_err(|err| DueSyncError::Normalize(format!("malformed {what} document: {err}")))
}

#[async_trait]
impl SiscomexGateway for SiscomexClient {
    async fn lookup_due_numbers(
        &self,
        invoice_key: &str,
        cancel: &CancellationToken,
    ) -> Result<Vec<String>> {
        let url = self.url(&format!("?nota-fiscal={invoice_key}"));
        let body = self.get_json(&url, cancel).await?;
        let links: Vec<DueLookupLink> = decode(body, "lookup")?;

        let mut numbers = Vec::new();
        for link in links {
            if let Some(rel) = link.rel.filter(|rel| !rel.is_empty()) {
                if !numbers.contains(&rel) {
                    numbers.push(rel);
                }
            }
        }
        Ok(numbers)
    }

    async fn fetch_due(
        &self,
        due_number: &str,
        cancel: &CancellationToken,
    ) -> Result<DuePayload> {
        let url = self.url(&format!("/numero-da-due/{due_number}"));
        let body = self.get_json(&url, cancel).await?;
        decode(body, "DUE")
    }

    async fn fetch_bonded_suspension(
        &self,
        due_number: &str,
        cancel: &CancellationToken,
    ) -> Result<Vec<AtoConcessorio>> {
        let url = self.url(&format!("/{due_number}/drawback/suspensao/atos-concessorios"));
        let body = self.get_json(&url, cancel).await?;
        decode(body, "bonded suspension acts")
    }

    async fn fetch_bonded_exemption(
        &self,
        due_number: &str,
        cancel: &CancellationToken,
    ) -> Result<Vec<AtoConcessorio>> {
        let url = self.url(&format!("/{due_number}/drawback/isencao/atos-concessorios"));
        let body = self.get_json(&url, cancel).await?;
        decode(body, "bonded exemption acts")
    }

    async fn fetch_fiscal_requirements(
        &self,
        due_number: &str,
        cancel: &CancellationToken,
    ) -> Result<Vec<ExigenciaFiscal>> {
        let url = self.url(&format!("/{due_number}/exigencias-fiscais"));
        let body = self.get_json(&url, cancel).await?;
        decode(body, "fiscal requirements")
    }

    async fn probe_revision(
        &self,
        due_number: &str,
        cancel: &CancellationToken,
    ) -> Result<RevisionProbe> {
        let url = self.url(&format!("/numero-da-due/{due_number}"));
        let body = self.get_json(&url, cancel).await?;
        Ok(RevisionProbe {
            data_de_registro: body
                .get("dataDeRegistro")
                .and_then(Value::as_str)
                .map(str::to_string),
            situacao: body.get("situacao").and_then(Value::as_str).map(str::to_string),
        })
    }
}
