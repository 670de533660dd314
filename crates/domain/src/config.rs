//! Configuration types.
//!
//! Values are populated from the environment by the infra loader; the
//! structs here only define shape and defaults.

use std::time::Duration;

use chrono::FixedOffset;
use serde::{Deserialize, Serialize};

use crate::situation::SituationPartition;

/// Application configuration
#[derive(Debug, Clone)]
pub struct Config {
    pub credentials: CredentialsConfig,
    pub rate: RateConfig,
    pub auth: AuthConfig,
    pub fetch: FetchFlags,
    pub run: RunLimits,
    pub database: DatabaseConfig,
    pub upstream: UpstreamConfig,
    pub situations: SituationPartition,
}

/// Siscomex API credentials
#[derive(Debug, Clone)]
pub struct CredentialsConfig {
    pub client_id: String,
    pub client_secret: String,
}

/// Rate limiting configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateConfig {
    /// Hourly ceiling declared by the upstream.
    pub rate_limit_hour: u32,
    /// Local ceiling enforced by the rate gate; kept below the upstream's.
    pub safe_request_limit: u32,
}

impl Default for RateConfig {
    fn default() -> Self {
        let rate_limit_hour = 1000;
        Self { rate_limit_hour, safe_request_limit: rate_limit_hour * 9 / 10 }
    }
}

/// Token lifecycle configuration
#[derive(Debug, Clone)]
pub struct AuthConfig {
    /// Minimum interval between credential exchanges.
    pub min_interval: Duration,
    /// Assumed validity when the upstream omits the expiry header.
    pub token_validity: Duration,
    /// Refresh this long before the claimed expiry.
    pub safety_margin: Duration,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            min_interval: Duration::from_secs(60),
            token_validity: Duration::from_secs(60 * 60),
            safety_margin: Duration::from_secs(2 * 60),
        }
    }
}

/// Toggles for the auxiliary calls of the full-fetch protocol
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct FetchFlags {
    pub bonded_suspension: bool,
    pub bonded_exemption: bool,
    pub fiscal_requirements: bool,
}

impl Default for FetchFlags {
    fn default() -> Self {
        Self { bonded_suspension: true, bonded_exemption: false, fiscal_requirements: true }
    }
}

impl FetchFlags {
    /// All auxiliary calls disabled; one upstream call per DUE.
    pub fn none() -> Self {
        Self { bonded_suspension: false, bonded_exemption: false, fiscal_requirements: false }
    }

    /// Upstream calls a full fetch of one DUE will issue.
    pub fn calls_per_due(&self) -> usize {
        1 + usize::from(self.bonded_suspension)
            + usize::from(self.bonded_exemption)
            + usize::from(self.fiscal_requirements)
    }
}

/// Per-run limits and pacing
#[derive(Debug, Clone)]
pub struct RunLimits {
    /// Discovery cap; 0 means unlimited.
    pub max_discovery_per_run: usize,
    /// Refresh cap.
    pub max_refresh_per_run: usize,
    /// Settled DUEs older than this get a revision probe.
    pub staleness: Duration,
    /// Settled DUEs averbada within this window refresh without probing.
    pub recent_settled: Duration,
    /// Worker pool size for both pipelines.
    pub workers: usize,
    /// Link rows are flushed in batches of this size.
    pub link_flush_size: usize,
    /// Timeout for the call group of one DUE.
    pub due_timeout: Duration,
    /// Wall-clock ceiling for a whole run; `None` means no ceiling.
    pub run_timeout: Option<Duration>,
}

impl Default for RunLimits {
    fn default() -> Self {
        Self {
            max_discovery_per_run: 0,
            max_refresh_per_run: 500,
            staleness: Duration::from_secs(24 * 60 * 60),
            recent_settled: Duration::from_secs(7 * 24 * 60 * 60),
            workers: 5,
            link_flush_size: 50,
            due_timeout: Duration::from_secs(30),
            run_timeout: None,
        }
    }
}

/// Store configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    pub path: String,
    pub pool_size: u32,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self { path: "duesync.db".to_string(), pool_size: 8 }
    }
}

/// Upstream endpoints and wire-level settings
#[derive(Debug, Clone)]
pub struct UpstreamConfig {
    /// Base URL of the DUE API, without trailing slash.
    pub base_url: String,
    /// Credential exchange URL.
    pub auth_url: String,
    /// Per-request timeout; clamped to five minutes.
    pub http_timeout: Duration,
    /// Fixed offset used to interpret lock-out release clock times.
    pub lockout_offset: FixedOffset,
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            base_url: "https://portalunico.siscomex.gov.br/due/api/ext/due".to_string(),
            auth_url: "https://portalunico.siscomex.gov.br/portal/api/autenticar/chave-acesso"
                .to_string(),
            http_timeout: Duration::from_secs(30),
            lockout_offset: FixedOffset::west_opt(3 * 3600).expect("static -03:00 offset"),
        }
    }
}

impl UpstreamConfig {
    /// Per-request timeout, never above the five-minute ceiling.
    pub fn effective_http_timeout(&self) -> Duration {
        self.http_timeout.min(Duration::from_secs(300))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn safe_limit_defaults_to_ninety_percent() {
        let rate = RateConfig::default();
        assert_eq!(rate.rate_limit_hour, 1000);
        assert_eq!(rate.safe_request_limit, 900);
    }

    #[test]
    fn fetch_flags_count_calls() {
        assert_eq!(FetchFlags::none().calls_per_due(), 1);
        assert_eq!(FetchFlags::default().calls_per_due(), 3);
        let all = FetchFlags { bonded_suspension: true, bonded_exemption: true, fiscal_requirements: true };
        assert_eq!(all.calls_per_due(), 4);
    }

    #[test]
    fn http_timeout_is_clamped() {
        let upstream = UpstreamConfig {
            http_timeout: Duration::from_secs(3600),
            ..UpstreamConfig::default()
        };
        assert_eq!(upstream.effective_http_timeout(), Duration::from_secs(300));
    }
}
