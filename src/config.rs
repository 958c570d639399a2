//! Pure resolution helpers that turn raw CLI flags into the values the
//! commands actually run with: parallelism from `--ncpu`, a db-accept
//! predicate from `--db`, and an expiry shift in milliseconds from
//! `--unixtime-in-milliseconds`.

use std::sync::Arc;

use crate::errors::{AppError, AppResult};
use crate::migration::EntryFilter;

/// Worker count from cpu count: small hosts get proportionally more
/// parallelism (their RDB loads tend to be small too, so there's headroom
/// to spare), larger hosts back off to twice the cpu count rather than
/// saturating every core with network-bound workers.
pub fn resolve_parallel(ncpu: usize) -> usize {
    match ncpu {
        0 | 1 => 8,
        2..=8 => 4 * ncpu,
        _ => 2 * ncpu,
    }
}

pub fn parse_db_filter(db: Option<u64>) -> EntryFilter {
    match db {
        Some(n) => Arc::new(move |d: u64| d == n),
        None => Arc::new(|_: u64| true),
    }
}

/// Parse `--unixtime-in-milliseconds`. Three forms:
/// - `@<ms>`: an absolute unix-millisecond timestamp; the returned shift is
///   `now - target`, so an expiry of exactly `target` lands at `now`.
/// - `+<ms>` / `-<ms>`: a literal millisecond offset applied to every
///   expiry as-is.
/// - `"YYYY-MM-DD HH:MM:SS"`: same re-basing as `@<ms>`, parsed as UTC.
pub fn parse_expire_shift(expr: &str, now_ms: i64) -> AppResult<i64> {
    let expr = expr.trim();
    let bad = |reason: &str| AppError::semantic(format!("bad --unixtime-in-milliseconds {expr:?}: {reason}"));

    if let Some(rest) = expr.strip_prefix('@') {
        let target: i64 = rest.parse().map_err(|_| bad("not an integer"))?;
        return Ok(now_ms - target);
    }
    if let Some(rest) = expr.strip_prefix('+') {
        let ms: i64 = rest.parse().map_err(|_| bad("not an integer"))?;
        return Ok(ms);
    }
    if let Some(rest) = expr.strip_prefix('-') {
        let ms: i64 = rest.parse().map_err(|_| bad("not an integer"))?;
        return Ok(-ms);
    }
    let dt = chrono::NaiveDateTime::parse_from_str(expr, "%Y-%m-%d %H:%M:%S").map_err(|_| bad("not a recognized timestamp"))?;
    let target_ms = dt.and_utc().timestamp_millis();
    Ok(now_ms - target_ms)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parallel_defaults_scale_with_small_hosts_getting_more_headroom() {
        assert_eq!(resolve_parallel(1), 8);
        assert_eq!(resolve_parallel(4), 16);
        assert_eq!(resolve_parallel(16), 32);
    }

    #[test]
    fn db_filter_none_accepts_everything() {
        let f = parse_db_filter(None);
        assert!(f(0));
        assert!(f(42));
    }

    #[test]
    fn db_filter_some_accepts_only_that_db() {
        let f = parse_db_filter(Some(3));
        assert!(f(3));
        assert!(!f(4));
    }

    #[test]
    fn absolute_shift_rebases_to_now() {
        let shift = parse_expire_shift("@1000", 5000).unwrap();
        assert_eq!(shift, 4000);
    }

    #[test]
    fn relative_shift_is_used_directly() {
        assert_eq!(parse_expire_shift("+2500", 0).unwrap(), 2500);
        assert_eq!(parse_expire_shift("-2500", 0).unwrap(), -2500);
    }

    #[test]
    fn literal_timestamp_is_parsed_as_utc() {
        let shift = parse_expire_shift("2026-07-28 00:00:00", 0).unwrap();
        assert!(shift < 0);
    }

    #[test]
    fn malformed_expression_is_rejected() {
        assert!(parse_expire_shift("not-a-time", 0).is_err());
    }
}
