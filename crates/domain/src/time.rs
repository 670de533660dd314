//! Upstream datetime handling.
//!
//! The portal emits RFC 3339-ish instants with a compact offset
//! (`2026-01-07T11:29:42.000-0300`). Timestamps are persisted verbatim so
//! the upstream offset survives round trips; parsing only happens where an
//! ordering comparison is needed (the revision probe).

use chrono::{DateTime, FixedOffset, Timelike, Utc};

/// Parse an upstream instant. Accepts proper RFC 3339 offsets (`-03:00`),
/// the portal's compact form (`-0300`), and a trailing `Z`.
pub fn parse_upstream_datetime(raw: &str) -> Option<DateTime<FixedOffset>> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return None;
    }
    if let Ok(parsed) = DateTime::parse_from_rfc3339(trimmed) {
        return Some(parsed);
    }
    // Compact offset without a colon.
    for fmt in ["%Y-%m-%dT%H:%M:%S%.f%z", "%Y-%m-%dT%H:%M:%S%z"] {
        if let Ok(parsed) = DateTime::parse_from_str(trimmed, fmt) {
            return Some(parsed);
        }
    }
    None
}

/// Compare two upstream revision strings. Returns `None` when either side
/// fails to parse, which callers treat as "changed" (refresh to be safe).
pub fn compare_revisions(remote: &str, stored: &str) -> Option<std::cmp::Ordering> {
    let remote = parse_upstream_datetime(remote)?;
    let stored = parse_upstream_datetime(stored)?;
    Some(remote.cmp(&stored))
}

/// Start of the wall-clock hour containing `instant`.
pub fn hour_start(instant: DateTime<Utc>) -> DateTime<Utc> {
    instant
        .with_minute(0)
        .and_then(|t| t.with_second(0))
        .and_then(|t| t.with_nanosecond(0))
        .unwrap_or(instant)
}

/// Start of the next wall-clock hour after `instant`.
pub fn next_hour_start(instant: DateTime<Utc>) -> DateTime<Utc> {
    hour_start(instant) + chrono::Duration::hours(1)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_rfc3339_offsets() {
        let parsed = parse_upstream_datetime("2024-03-01T10:00:00-03:00").expect("parsed");
        assert_eq!(parsed.to_rfc3339(), "2024-03-01T10:00:00-03:00");
    }

    #[test]
    fn parses_compact_portal_offsets() {
        let parsed = parse_upstream_datetime("2026-01-07T11:29:42.000-0300").expect("parsed");
        assert_eq!(parsed.offset().local_minus_utc(), -3 * 3600);
        assert_eq!(parsed.second(), 42);
    }

    #[test]
    fn rejects_garbage() {
        assert!(parse_upstream_datetime("").is_none());
        assert!(parse_upstream_datetime("not-a-date").is_none());
    }

    #[test]
    fn revision_comparison_orders_instants() {
        use std::cmp::Ordering;

        assert_eq!(
            compare_revisions("2024-03-02T12:00:00-03:00", "2024-03-01T10:00:00-03:00"),
            Some(Ordering::Greater)
        );
        assert_eq!(
            compare_revisions("2024-03-01T10:00:00-03:00", "2024-03-01T10:00:00-03:00"),
            Some(Ordering::Equal)
        );
        // Offset-aware: 10:00-03:00 == 13:00Z
        assert_eq!(
            compare_revisions("2024-03-01T13:00:00Z", "2024-03-01T10:00:00-03:00"),
            Some(Ordering::Equal)
        );
        assert_eq!(compare_revisions("bad", "2024-03-01T10:00:00-03:00"), None);
    }

    #[test]
    fn hour_boundaries() {
        let instant = parse_upstream_datetime("2024-03-01T10:45:31-00:00")
            .expect("parsed")
            .with_timezone(&Utc);
        assert_eq!(hour_start(instant).to_rfc3339(), "2024-03-01T10:00:00+00:00");
        assert_eq!(next_hour_start(instant).to_rfc3339(), "2024-03-01T11:00:00+00:00");
    }
}
