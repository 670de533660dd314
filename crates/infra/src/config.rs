//! Environment configuration loader.
//!
//! Every recognized variable has a default except the credentials, which
//! are only required by commands that reach the network. `TZ` is parsed as
//! a fixed UTC offset (e.g. `-03:00`) and governs how lock-out release
//! clock times are interpreted.

use std::time::Duration;

use chrono::FixedOffset;
use duesync_domain::config::{
    AuthConfig, Config, CredentialsConfig, DatabaseConfig, FetchFlags, RateConfig, RunLimits,
    UpstreamConfig,
};
use duesync_domain::situation::SituationPartition;
use duesync_domain::{DueSyncError, Result};

/// Load the full configuration from the process environment.
pub fn load() -> Result<Config> {
    load_from(&|key| std::env::var(key).ok())
}

/// Load from an arbitrary key/value source; tests inject maps here instead
/// of mutating the process environment.
pub fn load_from(env: &dyn Fn(&str) -> Option<String>) -> Result<Config> {
    let rate = load_rate(env)?;
    Ok(Config {
        credentials: CredentialsConfig {
            client_id: env("CLIENT_ID").unwrap_or_default(),
            client_secret: env("CLIENT_SECRET").unwrap_or_default(),
        },
        rate,
        auth: load_auth(env)?,
        fetch: load_fetch(env),
        run: load_run(env)?,
        database: load_database(env)?,
        upstream: load_upstream(env)?,
        situations: load_situations(env),
    })
}

/// Commands that talk to the upstream need credentials; `status` does not.
pub fn require_credentials(config: &Config) -> Result<()> {
    if config.credentials.client_id.is_empty() || config.credentials.client_secret.is_empty() {
        return Err(DueSyncError::Config(
            "CLIENT_ID and CLIENT_SECRET must be set for commands that call the upstream".into(),
        ));
    }
    Ok(())
}

fn load_rate(env: &dyn Fn(&str) -> Option<String>) -> Result<RateConfig> {
    let defaults = RateConfig::default();
    let rate_limit_hour = env_u32(env, "RATE_LIMIT_HOUR", defaults.rate_limit_hour)?;
    let safe_request_limit =
        env_u32(env, "SAFE_REQUEST_LIMIT", rate_limit_hour.saturating_mul(9) / 10)?;
    if safe_request_limit == 0 {
        return Err(DueSyncError::Config("SAFE_REQUEST_LIMIT must be positive".into()));
    }
    Ok(RateConfig { rate_limit_hour, safe_request_limit })
}

fn load_auth(env: &dyn Fn(&str) -> Option<String>) -> Result<AuthConfig> {
    let defaults = AuthConfig::default();
    Ok(AuthConfig {
        min_interval: Duration::from_secs(env_u64(
            env,
            "AUTH_INTERVAL_SEC",
            defaults.min_interval.as_secs(),
        )?),
        token_validity: Duration::from_secs(
            env_u64(env, "TOKEN_VALIDITY_MIN", defaults.token_validity.as_secs() / 60)? * 60,
        ),
        safety_margin: Duration::from_secs(
            env_u64(env, "TOKEN_SAFETY_MARGIN_MIN", defaults.safety_margin.as_secs() / 60)? * 60,
        ),
    })
}

fn load_fetch(env: &dyn Fn(&str) -> Option<String>) -> FetchFlags {
    let defaults = FetchFlags::default();
    FetchFlags {
        bonded_suspension: env_bool(env, "FETCH_BONDED_SUSPENSION", defaults.bonded_suspension),
        bonded_exemption: env_bool(env, "FETCH_BONDED_EXEMPTION", defaults.bonded_exemption),
        fiscal_requirements: env_bool(
            env,
            "FETCH_FISCAL_REQUIREMENTS",
            defaults.fiscal_requirements,
        ),
    }
}

fn load_run(env: &dyn Fn(&str) -> Option<String>) -> Result<RunLimits> {
    let defaults = RunLimits::default();
    let run_timeout_secs = env_u64(env, "RUN_TIMEOUT_SEC", 0)?;
    Ok(RunLimits {
        max_discovery_per_run: env_u64(
            env,
            "MAX_DISCOVERY_PER_RUN",
            defaults.max_discovery_per_run as u64,
        )? as usize,
        max_refresh_per_run: env_u64(
            env,
            "MAX_REFRESH_PER_RUN",
            defaults.max_refresh_per_run as u64,
        )? as usize,
        staleness: Duration::from_secs(
            env_u64(env, "STALENESS_HOURS", defaults.staleness.as_secs() / 3600)? * 3600,
        ),
        recent_settled: Duration::from_secs(
            env_u64(env, "RECENT_SETTLED_DAYS", defaults.recent_settled.as_secs() / 86_400)?
                * 86_400,
        ),
        workers: env_u64(env, "WORKERS", defaults.workers as u64)?.max(1) as usize,
        link_flush_size: env_u64(env, "LINK_FLUSH_SIZE", defaults.link_flush_size as u64)?.max(1)
            as usize,
        due_timeout: Duration::from_secs(env_u64(
            env,
            "DUE_TIMEOUT_SEC",
            defaults.due_timeout.as_secs(),
        )?),
        run_timeout: (run_timeout_secs > 0).then(|| Duration::from_secs(run_timeout_secs)),
    })
}

fn load_database(env: &dyn Fn(&str) -> Option<String>) -> Result<DatabaseConfig> {
    let defaults = DatabaseConfig::default();
    Ok(DatabaseConfig {
        path: env("DATABASE_PATH").unwrap_or(defaults.path),
        pool_size: env_u32(env, "DATABASE_POOL_SIZE", defaults.pool_size)?.max(1),
    })
}

fn load_upstream(env: &dyn Fn(&str) -> Option<String>) -> Result<UpstreamConfig> {
    let defaults = UpstreamConfig::default();
    Ok(UpstreamConfig {
        base_url: env("SISCOMEX_BASE_URL")
            .map(|url| url.trim_end_matches('/').to_string())
            .unwrap_or(defaults.base_url),
        auth_url: env("SISCOMEX_AUTH_URL").unwrap_or(defaults.auth_url),
        http_timeout: Duration::from_secs(env_u64(
            env,
            "HTTP_TIMEOUT_SEC",
            defaults.http_timeout.as_secs(),
        )?),
        // The OS often sets TZ to a zone name; only a fixed offset is
        // usable here, so anything else falls back to the default.
        lockout_offset: env("TZ")
            .and_then(|raw| match parse_offset(&raw) {
                Ok(offset) => Some(offset),
                Err(_) => {
                    tracing::warn!(tz = %raw, "TZ is not a fixed offset; using -03:00");
                    None
                }
            })
            .unwrap_or(defaults.lockout_offset),
    })
}

fn load_situations(env: &dyn Fn(&str) -> Option<String>) -> SituationPartition {
    let cancelled = env("SITUACOES_CANCELADAS").map(split_csv);
    let settled = env("SITUACOES_AVERBADAS").map(split_csv);
    match (cancelled, settled) {
        (None, None) => SituationPartition::default(),
        (cancelled, settled) => {
            let defaults = SituationPartition::default();
            SituationPartition::new(
                cancelled
                    .unwrap_or_else(|| defaults.cancelled_set().map(str::to_string).collect()),
                settled.unwrap_or_else(|| defaults.settled_set().map(str::to_string).collect()),
            )
        }
    }
}

/// Parse a fixed offset like `-03:00`, `+05:30` or `-0300`.
fn parse_offset(raw: &str) -> Result<FixedOffset> {
    let trimmed = raw.trim();
    let (sign, rest) = match trimmed.as_bytes().first() {
        Some(b'-') => (-1i32, &trimmed[1..]),
        Some(b'+') => (1i32, &trimmed[1..]),
        _ => (1i32, trimmed),
    };
    let digits: String = rest.chars().filter(|c| c.is_ascii_digit()).collect();
    let (hours, minutes) = match digits.len() {
        4 => (digits[..2].parse::<i32>(), digits[2..].parse::<i32>()),
        2 | 1 => (digits.parse::<i32>(), Ok(0)),
        _ => {
            return Err(DueSyncError::Config(format!("TZ is not a fixed offset: {raw}")));
        }
    };
    let (hours, minutes) = match (hours, minutes) {
        (Ok(h), Ok(m)) => (h, m),
        _ => return Err(DueSyncError::Config(format!("TZ is not a fixed offset: {raw}"))),
    };
    FixedOffset::east_opt(sign * (hours * 3600 + minutes * 60))
        .ok_or_else(|| DueSyncError::Config(format!("TZ offset out of range: {raw}")))
}

fn split_csv(raw: String) -> Vec<String> {
    raw.split(',').map(|s| s.trim().to_string()).filter(|s| !s.is_empty()).collect()
}

fn env_u32(env: &dyn Fn(&str) -> Option<String>, key: &str, default: u32) -> Result<u32> {
    match env(key) {
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|_| DueSyncError::Config(format!("{key} is not a number: {raw}"))),
        None => Ok(default),
    }
}

fn env_u64(env: &dyn Fn(&str) -> Option<String>, key: &str, default: u64) -> Result<u64> {
    match env(key) {
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|_| DueSyncError::Config(format!("{key} is not a number: {raw}"))),
        None => Ok(default),
    }
}

fn env_bool(env: &dyn Fn(&str) -> Option<String>, key: &str, default: bool) -> bool {
    env(key)
        .map(|s| matches!(s.trim().to_ascii_lowercase().as_str(), "1" | "true" | "yes" | "on"))
        .unwrap_or(default)
}
