//! Lock-out detection.
//!
//! The upstream signals a rate-limit lock-out with the literal error code
//! `PUCX-ER1001` in the response body and a human-readable message that
//! embeds the release clock time ("... liberado após as 15:30:00"). The
//! clock time is interpreted in the configured fixed offset; a time
//! already behind the clock rolls to the next day, and a message without a
//! parsable time falls back to the next hour boundary.

use chrono::{DateTime, FixedOffset, NaiveTime, TimeZone, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;

use duesync_domain::time::next_hour_start;

const LOCKOUT_CODE: &str = "PUCX-ER1001";

static RELEASE_TIME: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"ap\u{f3}s as (\d{1,2}):(\d{2})(?::(\d{2}))?").expect("static release-time pattern")
});

/// If the body carries the lock-out code, return the release instant.
pub fn lockout_release(
    body: &Value,
    offset: FixedOffset,
    now: DateTime<Utc>,
) -> Option<DateTime<Utc>> {
    let code = body.get("code").and_then(Value::as_str)?;
    if code != LOCKOUT_CODE {
        return None;
    }
    let message = body.get("message").and_then(Value::as_str).unwrap_or("");
    Some(parse_release_clock(message, offset, now).unwrap_or_else(|| next_hour_start(now)))
}

fn parse_release_clock(
    message: &str,
    offset: FixedOffset,
    now: DateTime<Utc>,
) -> Option<DateTime<Utc>> {
    let captures = RELEASE_TIME.captures(message)?;
    let hour: u32 = captures.get(1)?.as_str().parse().ok()?;
    let minute: u32 = captures.get(2)?.as_str().parse().ok()?;
    let second: u32 = captures.get(3).map_or(Some(0), |m| m.as_str().parse().ok())?;

    let clock = NaiveTime::from_hms_opt(hour, minute, second)?;
    let local_now = now.with_timezone(&offset);
    let mut release = offset
        .from_local_datetime(&local_now.date_naive().and_time(clock))
        .single()?
        .with_timezone(&Utc);
    if release <= now {
        release += chrono::Duration::days(1);
    }
    Some(release)
}
