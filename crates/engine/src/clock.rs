//! Time source for the engine. Prefers the wall clock; when that is marked
//! unavailable (RTC not yet synced), day-of-year is estimated from uptime so
//! the seasonal terms stay roughly right instead of pinning to January 1st.

use chrono::{Datelike, Utc};

/// Timestamps before this (2023-01-01) mean the clock was never synced and
/// is counting up from the epoch, i.e. it is really an uptime counter.
const CLOCK_SANE_AFTER_S: u64 = 1_672_531_200;

pub fn unix_now() -> u64 {
    Utc::now().timestamp().max(0) as u64
}

/// Calendar day of year, 1..=366. An unsynced clock degrades to the
/// uptime estimate.
pub fn day_of_year() -> u32 {
    let now = unix_now();
    if now < CLOCK_SANE_AFTER_S {
        return day_of_year_from_uptime(now);
    }
    Utc::now().ordinal()
}

/// Rough day-of-year from seconds of uptime, for systems without a synced
/// clock. Wraps every 365 days.
pub fn day_of_year_from_uptime(uptime_s: u64) -> u32 {
    ((uptime_s / 86_400) % 365) as u32 + 1
}

// ===========================================================================
// Tests
// ===========================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn day_of_year_in_calendar_range() {
        let d = day_of_year();
        assert!((1..=366).contains(&d));
    }

    #[test]
    fn uptime_estimate_starts_at_day_one() {
        assert_eq!(day_of_year_from_uptime(0), 1);
        assert_eq!(day_of_year_from_uptime(86_399), 1);
        assert_eq!(day_of_year_from_uptime(86_400), 2);
    }

    #[test]
    fn uptime_estimate_wraps_after_a_year() {
        assert_eq!(day_of_year_from_uptime(365 * 86_400), 1);
        assert_eq!(day_of_year_from_uptime(366 * 86_400), 2);
    }
}
