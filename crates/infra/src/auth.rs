//! Token authority for the Siscomex Single Portal.
//!
//! The credential exchange POSTs the client id/secret and receives the
//! bearer material in *response headers*: `set-token` (attached back as
//! `Authorization`), `x-csrf-token`, and `x-csrf-expiration` (epoch
//! millis). One authority instance is shared by every worker; refreshes
//! are single-flighted and respect the upstream's minimum interval between
//! exchanges. The exchange itself consumes a rate-gate slot.

use std::sync::Arc;

use chrono::{DateTime, TimeZone, Utc};
use duesync_common::RateGate;
use duesync_domain::config::{AuthConfig, CredentialsConfig, UpstreamConfig};
use duesync_domain::{DueSyncError, Result};
use reqwest::header::{HeaderMap, HeaderValue};
use reqwest::StatusCode;
use tokio::sync::{Mutex, RwLock};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::errors::classify_reqwest;

#[derive(Debug, Clone)]
struct Bearer {
    authorization: String,
    csrf: String,
    expires_at: DateTime<Utc>,
}

impl Bearer {
    fn is_valid(&self, margin: std::time::Duration, now: DateTime<Utc>) -> bool {
        let margin = chrono::Duration::from_std(margin).unwrap_or_else(|_| chrono::Duration::minutes(2));
        now < self.expires_at - margin
    }
}

/// Singleton holder of the bearer credential.
pub struct TokenAuthority {
    http: reqwest::Client,
    auth_url: String,
    credentials: CredentialsConfig,
    config: AuthConfig,
    gate: Arc<RateGate>,
    bearer: RwLock<Option<Bearer>>,
    /// Serializes refreshes; holds the instant of the last exchange.
    refresh: Mutex<Option<DateTime<Utc>>>,
}

impl TokenAuthority {
    pub fn new(
        upstream: &UpstreamConfig,
        credentials: CredentialsConfig,
        config: AuthConfig,
        gate: Arc<RateGate>,
    ) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(upstream.effective_http_timeout())
            .build()
            .map_err(classify_reqwest)?;
        Ok(Self {
            http,
            auth_url: upstream.auth_url.clone(),
            credentials,
            config,
            gate,
            bearer: RwLock::new(None),
            refresh: Mutex::new(None),
        })
    }

    /// Headers for the next authenticated request, refreshing the bearer
    /// when absent, expired or inside the safety margin.
    pub async fn auth_headers(&self, cancel: &CancellationToken) -> Result<HeaderMap> {
        {
            let bearer = self.bearer.read().await;
            if let Some(bearer) = bearer.as_ref() {
                if bearer.is_valid(self.config.safety_margin, Utc::now()) {
                    return build_headers(bearer);
                }
            }
        }
        let bearer = self.refresh(cancel).await?;
        build_headers(&bearer)
    }

    /// Drop the current bearer; the next call acquires a fresh one. Called
    /// when a response shows the upstream rejected the token early.
    pub async fn invalidate(&self) {
        let mut bearer = self.bearer.write().await;
        if bearer.take().is_some() {
            info!("bearer invalidated; next request re-authenticates");
        }
    }

    /// Single-flight refresh: concurrent callers collapse onto one
    /// exchange and all observe the same new bearer.
    async fn refresh(&self, cancel: &CancellationToken) -> Result<Bearer> {
        let mut last_auth = self.refresh.lock().await;

        // Another caller may have refreshed while this one waited.
        {
            let bearer = self.bearer.read().await;
            if let Some(bearer) = bearer.as_ref() {
                if bearer.is_valid(self.config.safety_margin, Utc::now()) {
                    return Ok(bearer.clone());
                }
            }
        }

        if self.credentials.client_id.is_empty() || self.credentials.client_secret.is_empty() {
            return Err(DueSyncError::Config("upstream credentials not configured".into()));
        }

        // Respect the minimum interval between credential exchanges.
        if let Some(last) = *last_auth {
            let since = Utc::now().signed_duration_since(last);
            let min = chrono::Duration::from_std(self.config.min_interval)
                .unwrap_or_else(|_| chrono::Duration::seconds(60));
            if since < min {
                let wait = (min - since).to_std().unwrap_or_default();
                debug!(wait_secs = wait.as_secs(), "holding for the minimum auth interval");
                tokio::select! {
                    _ = cancel.cancelled() => return Err(DueSyncError::Cancelled),
                    _ = tokio::time::sleep(wait) => {}
                }
            }
        }

        let mut throttled_once = false;
        let bearer = loop {
            match self.exchange(cancel).await {
                Ok(bearer) => break bearer,
                // A 422 on the exchange is auth throttling: wait the
                // minimum interval once, then try again.
                Err(DueSyncError::Transient(msg)) if msg.contains("422") && !throttled_once => {
                    throttled_once = true;
                    warn!("credential exchange throttled (422); waiting the minimum interval");
                    tokio::select! {
                        _ = cancel.cancelled() => return Err(DueSyncError::Cancelled),
                        _ = tokio::time::sleep(self.config.min_interval) => {}
                    }
                }
                Err(err) => return Err(err),
            }
        };

        *last_auth = Some(Utc::now());
        *self.bearer.write().await = Some(bearer.clone());
        info!(expires_at = %bearer.expires_at, "authenticated with the upstream");
        Ok(bearer)
    }

    async fn exchange(&self, cancel: &CancellationToken) -> Result<Bearer> {
        self.gate.admit(cancel).await.map_err(|_| DueSyncError::Cancelled)?;

        let response = self
            .http
            .post(&self.auth_url)
            .header("Client-Id", &self.credentials.client_id)
            .header("Client-Secret", &self.credentials.client_secret)
            .header("Role-Type", "IMPEXP")
            .header("Content-Type", "application/json")
            .header("Accept", "application/json")
            .json(&serde_json::json!({}))
            .send()
            .await
            .map_err(classify_reqwest)?;

        let status = response.status();
        match status {
            StatusCode::UNAUTHORIZED => {
                return Err(DueSyncError::Auth("credentials rejected (401)".into()));
            }
            StatusCode::FORBIDDEN => {
                return Err(DueSyncError::Auth("access denied (403); check permissions".into()));
            }
            s if s.is_server_error() => {
                return Err(DueSyncError::Transient(format!("credential exchange failed ({s})")));
            }
            s if !s.is_success() => {
                return Err(DueSyncError::Transient(format!("credential exchange failed ({s})")));
            }
            _ => {}
        }

        let headers = response.headers();
        let authorization = header_value(headers, "set-token").ok_or_else(|| {
            DueSyncError::Auth("credential exchange answered without a set-token header".into())
        })?;
        let csrf = header_value(headers, "x-csrf-token").ok_or_else(|| {
            DueSyncError::Auth("credential exchange answered without a csrf header".into())
        })?;
        let expires_at = header_value(headers, "x-csrf-expiration")
            .and_then(|raw| raw.parse::<i64>().ok())
            .and_then(|millis| Utc.timestamp_millis_opt(millis).single())
            .unwrap_or_else(|| {
                Utc::now()
                    + chrono::Duration::from_std(self.config.token_validity)
                        .unwrap_or_else(|_| chrono::Duration::minutes(60))
            });

        Ok(Bearer { authorization, csrf, expires_at })
    }
}

fn header_value(headers: &HeaderMap, name: &str) -> Option<String> {
    headers.get(name).and_then(|v| v.to_str().ok()).map(str::to_string)
}

fn build_headers(bearer: &Bearer) -> Result<HeaderMap> {
    let mut headers = HeaderMap::new();
    headers.insert(
        reqwest::header::AUTHORIZATION,
        HeaderValue::from_str(&bearer.authorization)
            .map_err(|_| DueSyncError::Auth("bearer contains invalid header bytes".into()))?,
    );
    headers.insert(
        "X-CSRF-Token",
        HeaderValue::from_str(&bearer.csrf)
            .map_err(|_| DueSyncError::Auth("csrf token contains invalid header bytes".into()))?,
    );
    headers.insert(reqwest::header::CONTENT_TYPE, HeaderValue::from_static("application/json"));
    headers.insert(reqwest::header::ACCEPT, HeaderValue::from_static("application/json"));
    Ok(headers)
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use wiremock::matchers::{header, method};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::*;

    fn authority(server_uri: &str, min_interval: Duration) -> TokenAuthority {
        let upstream = UpstreamConfig {
            auth_url: format!("{server_uri}/portal/api/autenticar/chave-acesso"),
            base_url: format!("{server_uri}/due/api/ext/due"),
            ..UpstreamConfig::default()
        };
        let credentials = CredentialsConfig {
            client_id: "client".to_string(),
            client_secret: "secret".to_string(),
        };
        let config = AuthConfig { min_interval, ..AuthConfig::default() };
        TokenAuthority::new(&upstream, credentials, config, Arc::new(RateGate::new(100)))
            .expect("authority builds")
    }

    fn token_response(expiration_millis: i64) -> ResponseTemplate {
        ResponseTemplate::new(200)
            .insert_header("set-token", "Bearer abc123")
            .insert_header("x-csrf-token", "csrf456")
            .insert_header("x-csrf-expiration", expiration_millis.to_string().as_str())
    }

    fn far_future_millis() -> i64 {
        (Utc::now() + chrono::Duration::hours(1)).timestamp_millis()
    }

    #[tokio::test]
    async fn exchanges_credentials_and_attaches_both_tokens() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(header("Client-Id", "client"))
            .and(header("Client-Secret", "secret"))
            .and(header("Role-Type", "IMPEXP"))
            .respond_with(token_response(far_future_millis()))
            .expect(1)
            .mount(&server)
            .await;

        let authority = authority(&server.uri(), Duration::ZERO);
        let headers =
            authority.auth_headers(&CancellationToken::new()).await.expect("headers");

        assert_eq!(headers.get("authorization").and_then(|v| v.to_str().ok()), Some("Bearer abc123"));
        assert_eq!(headers.get("x-csrf-token").and_then(|v| v.to_str().ok()), Some("csrf456"));
    }

    #[tokio::test]
    async fn reuses_a_valid_bearer_without_a_second_exchange() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(token_response(far_future_millis()))
            .expect(1)
            .mount(&server)
            .await;

        let authority = authority(&server.uri(), Duration::ZERO);
        let cancel = CancellationToken::new();
        authority.auth_headers(&cancel).await.expect("first");
        authority.auth_headers(&cancel).await.expect("second");
    }

    #[tokio::test]
    async fn invalidate_forces_a_fresh_exchange() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(token_response(far_future_millis()))
            .expect(2)
            .mount(&server)
            .await;

        let authority = authority(&server.uri(), Duration::ZERO);
        let cancel = CancellationToken::new();
        authority.auth_headers(&cancel).await.expect("first");
        authority.invalidate().await;
        authority.auth_headers(&cancel).await.expect("second");
    }

    #[tokio::test]
    async fn bad_credentials_fail_fast() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(401))
            .expect(1)
            .mount(&server)
            .await;

        let authority = authority(&server.uri(), Duration::ZERO);
        let err = authority
            .auth_headers(&CancellationToken::new())
            .await
            .expect_err("must fail");
        assert!(matches!(err, DueSyncError::Auth(_)));
    }

    #[tokio::test]
    async fn missing_expiration_header_assumes_configured_validity() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("set-token", "Bearer abc")
                    .insert_header("x-csrf-token", "csrf"),
            )
            .mount(&server)
            .await;

        let authority = authority(&server.uri(), Duration::ZERO);
        authority.auth_headers(&CancellationToken::new()).await.expect("headers");
        let bearer = authority.bearer.read().await;
        let expires_at = bearer.as_ref().expect("bearer stored").expires_at;
        let validity = Utc::now() + chrono::Duration::minutes(59);
        assert!(expires_at > validity);
    }

    #[tokio::test]
    async fn concurrent_callers_collapse_to_one_exchange() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(token_response(far_future_millis()))
            .expect(1)
            .mount(&server)
            .await;

        let authority = Arc::new(authority(&server.uri(), Duration::ZERO));
        let cancel = CancellationToken::new();

        let tasks: Vec<_> = (0..8)
            .map(|_| {
                let authority = Arc::clone(&authority);
                let cancel = cancel.clone();
                tokio::spawn(async move { authority.auth_headers(&cancel).await })
            })
            .collect();
        for task in tasks {
            task.await.expect("joined").expect("headers");
        }
    }
}
