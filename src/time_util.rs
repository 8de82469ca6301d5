//! C11 — small, pure time/range helpers shared by the scheduler, rollup,
//! status builder and analytics. All timestamps are integer unix seconds.

pub const SECS_PER_DAY: i64 = 86_400;
pub const SECS_PER_MINUTE: i64 = 60;

/// Floor `t` to the start of its current minute.
pub fn floor_minute(t: i64) -> i64 {
    t - t.rem_euclid(SECS_PER_MINUTE)
}

/// Floor `t` to UTC midnight of the day containing it.
pub fn day_start(t: i64) -> i64 {
    t - t.rem_euclid(SECS_PER_DAY)
}

/// UTC-midnight start of the day following the one containing `t`.
pub fn day_end(t: i64) -> i64 {
    day_start(t) + SECS_PER_DAY
}

/// `[rangeStart, rangeEnd)` for a named lookback range ending at `now`,
/// e.g. "24h" -> last 24 hours ending at the current minute, "7d" -> last
/// 7 UTC-aligned days ending at the start of today.
pub fn range_bounds(range: &str, now: i64) -> Option<(i64, i64)> {
    match range {
        "24h" => {
            let end = floor_minute(now);
            Some((end - SECS_PER_DAY, end))
        }
        "7d" => {
            let end = day_start(now);
            Some((end - 7 * SECS_PER_DAY, end))
        }
        "30d" => {
            let end = day_start(now);
            Some((end - 30 * SECS_PER_DAY, end))
        }
        "90d" => {
            let end = day_start(now);
            Some((end - 90 * SECS_PER_DAY, end))
        }
        _ => None,
    }
}

/// Total seconds spanned by a half-open range; zero if inverted.
pub fn range_seconds(start: i64, end: i64) -> i64 {
    (end - start).max(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn floor_minute_truncates_seconds() {
        assert_eq!(floor_minute(125), 120);
        assert_eq!(floor_minute(120), 120);
        assert_eq!(floor_minute(0), 0);
    }

    #[test]
    fn day_start_and_end_are_86400_apart() {
        let t = 1_700_000_123;
        let s = day_start(t);
        let e = day_end(t);
        assert_eq!(e - s, SECS_PER_DAY);
        assert!(s <= t && t < e);
    }

    #[test]
    fn range_bounds_7d_is_day_aligned() {
        let now = 1_700_000_123;
        let (start, end) = range_bounds("7d", now).unwrap();
        assert_eq!(end, day_start(now));
        assert_eq!(end - start, 7 * SECS_PER_DAY);
    }

    #[test]
    fn range_bounds_rejects_unknown_range() {
        assert!(range_bounds("13w", 0).is_none());
    }
}
