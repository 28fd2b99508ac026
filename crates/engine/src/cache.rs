//! Per-channel calculation cache. ET0, crop-coefficient, and water-balance
//! intermediates are expensive relative to a control tick, and their inputs
//! drift slowly, so results are reused while the inputs stay within sensor
//! tolerance and the entry is fresh.
//!
//! All entry points take an explicit `now_s` so freshness is deterministic
//! under test.

use std::collections::HashMap;

use serde::Serialize;
use tracing::{debug, info};

use crate::balance::WaterBalanceState;

/// Maximum age for ET0 and Kc entries [s].
const MAX_AGE_ET0_S: u64 = 3600;
const MAX_AGE_KC_S: u64 = 3600;
/// Water balance moves faster; keep it fresher [s].
const MAX_AGE_BALANCE_S: u64 = 900;

// Input tolerances: differences below these are sensor noise, not change.
const TOL_TEMP_C: f64 = 0.5;
const TOL_HUMIDITY_PCT: f64 = 5.0;
const TOL_PRESSURE_HPA: f64 = 2.0;
const TOL_LATITUDE_RAD: f64 = 0.01;
const TOL_ROOT_DEPTH_M: f64 = 0.01;

/// Hit ratio below this (over a meaningful sample) means the cache is
/// churning and should be cleared.
const MIN_HEALTHY_HIT_RATIO: f64 = 0.5;
const HEALTH_MIN_SAMPLES: u64 = 100;

// ---------------------------------------------------------------------------
// Fingerprints
// ---------------------------------------------------------------------------

/// Inputs that determine an ET0 result.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Et0Inputs {
    pub temp_min_c: f64,
    pub temp_max_c: f64,
    pub humidity_pct: f64,
    pub pressure_hpa: f64,
    pub latitude_rad: f64,
    pub day_of_year: u32,
}

impl Et0Inputs {
    fn matches(&self, other: &Self) -> bool {
        (self.temp_min_c - other.temp_min_c).abs() <= TOL_TEMP_C
            && (self.temp_max_c - other.temp_max_c).abs() <= TOL_TEMP_C
            && (self.humidity_pct - other.humidity_pct).abs() <= TOL_HUMIDITY_PCT
            && (self.pressure_hpa - other.pressure_hpa).abs() <= TOL_PRESSURE_HPA
            && (self.latitude_rad - other.latitude_rad).abs() <= TOL_LATITUDE_RAD
            && self.day_of_year == other.day_of_year
    }
}

/// Inputs that determine a Kc / root-depth pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KcInputs {
    pub plant_index: usize,
    pub days_after_planting: u32,
}

/// Inputs that determine a cached water-balance snapshot.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BalanceInputs {
    pub plant_index: usize,
    pub soil_index: usize,
    pub method_index: usize,
    pub root_depth_m: f64,
}

impl BalanceInputs {
    fn matches(&self, other: &Self) -> bool {
        self.plant_index == other.plant_index
            && self.soil_index == other.soil_index
            && self.method_index == other.method_index
            && (self.root_depth_m - other.root_depth_m).abs() <= TOL_ROOT_DEPTH_M
    }
}

// ---------------------------------------------------------------------------
// Entries
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy)]
struct Et0Entry {
    inputs: Et0Inputs,
    value_mm_day: f64,
    stored_at_s: u64,
}

#[derive(Debug, Clone, Copy)]
struct KcEntry {
    inputs: KcInputs,
    kc: f64,
    root_depth_m: f64,
    stored_at_s: u64,
}

#[derive(Debug, Clone, Copy)]
struct BalanceEntry {
    inputs: BalanceInputs,
    state: WaterBalanceState,
    stored_at_s: u64,
}

#[derive(Debug, Default)]
struct ChannelSlots {
    et0: Option<Et0Entry>,
    kc: Option<KcEntry>,
    balance: Option<BalanceEntry>,
}

// ---------------------------------------------------------------------------
// Cache
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, Serialize)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub entries: usize,
    pub enabled: bool,
}

impl CacheStats {
    pub fn hit_ratio(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum CacheHealth {
    Healthy,
    /// Hit ratio too low over a meaningful sample; the cache was cleared.
    Churning,
    Disabled,
}

#[derive(Debug, Default)]
pub struct CalculationCache {
    channels: HashMap<u32, ChannelSlots>,
    hits: u64,
    misses: u64,
    disabled: bool,
}

impl CalculationCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Disabling drops every entry; lookups then always miss without
    /// counting against the hit ratio.
    pub fn set_enabled(&mut self, enabled: bool) {
        if !enabled {
            self.channels.clear();
            info!("calculation cache disabled, entries dropped");
        }
        self.disabled = !enabled;
    }

    pub fn is_enabled(&self) -> bool {
        !self.disabled
    }

    // -- ET0 ----------------------------------------------------------------

    pub fn get_et0(&mut self, channel: u32, inputs: &Et0Inputs, now_s: u64) -> Option<f64> {
        if self.disabled {
            return None;
        }
        let hit = self
            .channels
            .get(&channel)
            .and_then(|s| s.et0)
            .filter(|e| {
                now_s.saturating_sub(e.stored_at_s) < MAX_AGE_ET0_S && e.inputs.matches(inputs)
            })
            .map(|e| e.value_mm_day);
        match hit {
            Some(v) => {
                self.hits += 1;
                Some(v)
            }
            None => {
                // Stale or mismatched entries are dropped on miss.
                if let Some(c) = self.channels.get_mut(&channel) {
                    c.et0 = None;
                }
                self.misses += 1;
                None
            }
        }
    }

    pub fn store_et0(&mut self, channel: u32, inputs: Et0Inputs, value_mm_day: f64, now_s: u64) {
        if self.disabled {
            return;
        }
        self.channels.entry(channel).or_default().et0 = Some(Et0Entry {
            inputs,
            value_mm_day,
            stored_at_s: now_s,
        });
    }

    // -- Kc / root depth ------------------------------------------------------

    pub fn get_kc(&mut self, channel: u32, inputs: &KcInputs, now_s: u64) -> Option<(f64, f64)> {
        if self.disabled {
            return None;
        }
        let hit = self
            .channels
            .get(&channel)
            .and_then(|s| s.kc)
            .filter(|e| now_s.saturating_sub(e.stored_at_s) < MAX_AGE_KC_S && e.inputs == *inputs)
            .map(|e| (e.kc, e.root_depth_m));
        match hit {
            Some(v) => {
                self.hits += 1;
                Some(v)
            }
            None => {
                if let Some(c) = self.channels.get_mut(&channel) {
                    c.kc = None;
                }
                self.misses += 1;
                None
            }
        }
    }

    pub fn store_kc(
        &mut self,
        channel: u32,
        inputs: KcInputs,
        kc: f64,
        root_depth_m: f64,
        now_s: u64,
    ) {
        if self.disabled {
            return;
        }
        self.channels.entry(channel).or_default().kc = Some(KcEntry {
            inputs,
            kc,
            root_depth_m,
            stored_at_s: now_s,
        });
    }

    // -- Water balance --------------------------------------------------------

    pub fn get_balance(
        &mut self,
        channel: u32,
        inputs: &BalanceInputs,
        now_s: u64,
    ) -> Option<WaterBalanceState> {
        if self.disabled {
            return None;
        }
        let hit = self
            .channels
            .get(&channel)
            .and_then(|s| s.balance)
            .filter(|e| {
                now_s.saturating_sub(e.stored_at_s) < MAX_AGE_BALANCE_S
                    && e.inputs.matches(inputs)
            })
            .map(|e| e.state);
        match hit {
            Some(v) => {
                self.hits += 1;
                Some(v)
            }
            None => {
                if let Some(c) = self.channels.get_mut(&channel) {
                    c.balance = None;
                }
                self.misses += 1;
                None
            }
        }
    }

    pub fn store_balance(
        &mut self,
        channel: u32,
        inputs: BalanceInputs,
        state: WaterBalanceState,
        now_s: u64,
    ) {
        if self.disabled {
            return;
        }
        self.channels.entry(channel).or_default().balance = Some(BalanceEntry {
            inputs,
            state,
            stored_at_s: now_s,
        });
    }

    // -- Maintenance ----------------------------------------------------------

    /// Drop every entry older than `max_age_s`.
    pub fn invalidate_older_than(&mut self, max_age_s: u64, now_s: u64) {
        let expired = |stored_at_s: u64| now_s.saturating_sub(stored_at_s) >= max_age_s;
        let mut dropped = 0usize;
        for slots in self.channels.values_mut() {
            if slots.et0.is_some_and(|e| expired(e.stored_at_s)) {
                slots.et0 = None;
                dropped += 1;
            }
            if slots.kc.is_some_and(|e| expired(e.stored_at_s)) {
                slots.kc = None;
                dropped += 1;
            }
            if slots.balance.is_some_and(|e| expired(e.stored_at_s)) {
                slots.balance = None;
                dropped += 1;
            }
        }
        if dropped > 0 {
            debug!(dropped, max_age_s, "cache entries invalidated by age");
        }
    }

    /// Drop all entries for one channel (plant replaced, config changed).
    pub fn invalidate_channel(&mut self, channel: u32) {
        self.channels.remove(&channel);
    }

    pub fn clear(&mut self) {
        self.channels.clear();
        self.hits = 0;
        self.misses = 0;
    }

    pub fn stats(&self) -> CacheStats {
        let entries = self
            .channels
            .values()
            .map(|s| {
                s.et0.is_some() as usize + s.kc.is_some() as usize + s.balance.is_some() as usize
            })
            .sum();
        CacheStats {
            hits: self.hits,
            misses: self.misses,
            entries,
            enabled: !self.disabled,
        }
    }

    /// Rough heap footprint in bytes.
    pub fn memory_estimate_bytes(&self) -> usize {
        self.channels.len()
            * (std::mem::size_of::<u32>() + std::mem::size_of::<ChannelSlots>())
    }

    /// Clear the cache when the hit ratio shows it is doing more harm than
    /// good. The counters reset with the entries so recovery is observable.
    pub fn health_check(&mut self) -> CacheHealth {
        if self.disabled {
            return CacheHealth::Disabled;
        }
        let stats = self.stats();
        if stats.hits + stats.misses > HEALTH_MIN_SAMPLES
            && stats.hit_ratio() < MIN_HEALTHY_HIT_RATIO
        {
            info!(
                hits = stats.hits,
                misses = stats.misses,
                "cache hit ratio too low, clearing"
            );
            self.clear();
            return CacheHealth::Churning;
        }
        CacheHealth::Healthy
    }
}

// ===========================================================================
// Tests
// ===========================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn et0_inputs() -> Et0Inputs {
        Et0Inputs {
            temp_min_c: 15.0,
            temp_max_c: 30.0,
            humidity_pct: 50.0,
            pressure_hpa: 1013.0,
            latitude_rad: 0.78,
            day_of_year: 172,
        }
    }

    // -- Freshness: hit at 1800 s, expired at 3700 s -----------------------

    #[test]
    fn et0_hit_within_max_age() {
        let mut c = CalculationCache::new();
        c.store_et0(1, et0_inputs(), 5.2, 0);
        let hit = c.get_et0(1, &et0_inputs(), 1800);
        assert_eq!(hit, Some(5.2));
        assert_eq!(c.stats().hits, 1);
    }

    #[test]
    fn et0_miss_after_max_age() {
        let mut c = CalculationCache::new();
        c.store_et0(1, et0_inputs(), 5.2, 0);
        assert_eq!(c.get_et0(1, &et0_inputs(), 3700), None);
        assert_eq!(c.stats().misses, 1);
        // The stale entry is gone: a later in-tolerance probe still misses.
        assert_eq!(c.get_et0(1, &et0_inputs(), 3701), None);
    }

    // -- Tolerance matching -------------------------------------------------

    #[test]
    fn et0_hit_within_tolerance() {
        let mut c = CalculationCache::new();
        c.store_et0(1, et0_inputs(), 5.2, 0);
        let mut probe = et0_inputs();
        probe.temp_max_c += 0.4;
        probe.humidity_pct += 4.0;
        probe.pressure_hpa -= 1.5;
        assert_eq!(c.get_et0(1, &probe, 100), Some(5.2));
    }

    #[test]
    fn et0_miss_outside_tolerance() {
        let mut c = CalculationCache::new();
        c.store_et0(1, et0_inputs(), 5.2, 0);
        let mut probe = et0_inputs();
        probe.temp_max_c += 0.6;
        assert_eq!(c.get_et0(1, &probe, 100), None);
    }

    #[test]
    fn et0_miss_on_different_day() {
        let mut c = CalculationCache::new();
        c.store_et0(1, et0_inputs(), 5.2, 0);
        let mut probe = et0_inputs();
        probe.day_of_year += 1;
        assert_eq!(c.get_et0(1, &probe, 100), None);
    }

    #[test]
    fn channels_are_independent() {
        let mut c = CalculationCache::new();
        c.store_et0(1, et0_inputs(), 5.2, 0);
        assert_eq!(c.get_et0(2, &et0_inputs(), 100), None);
        assert_eq!(c.get_et0(1, &et0_inputs(), 100), Some(5.2));
    }

    // -- Kc slot -------------------------------------------------------------

    #[test]
    fn kc_exact_match_required() {
        let mut c = CalculationCache::new();
        let inputs = KcInputs {
            plant_index: 0,
            days_after_planting: 45,
        };
        c.store_kc(1, inputs, 0.9, 0.35, 0);
        assert_eq!(c.get_kc(1, &inputs, 100), Some((0.9, 0.35)));
        let other = KcInputs {
            days_after_planting: 46,
            ..inputs
        };
        assert_eq!(c.get_kc(1, &other, 100), None);
    }

    // -- Balance slot ----------------------------------------------------------

    #[test]
    fn balance_root_depth_tolerance() {
        let mut c = CalculationCache::new();
        let inputs = BalanceInputs {
            plant_index: 0,
            soil_index: 2,
            method_index: 0,
            root_depth_m: 0.400,
        };
        let state = WaterBalanceState {
            wetted_awc_mm: 50.0,
            deficit_mm: 12.0,
            ..WaterBalanceState::default()
        };
        c.store_balance(1, inputs, state, 0);

        let near = BalanceInputs {
            root_depth_m: 0.405,
            ..inputs
        };
        let got = c.get_balance(1, &near, 100).unwrap();
        assert_relative_eq!(got.deficit_mm, 12.0);

        let far = BalanceInputs {
            root_depth_m: 0.42,
            ..inputs
        };
        assert!(c.get_balance(1, &far, 100).is_none());
    }

    #[test]
    fn balance_expires_faster_than_et0() {
        let mut c = CalculationCache::new();
        let inputs = BalanceInputs {
            plant_index: 0,
            soil_index: 2,
            method_index: 0,
            root_depth_m: 0.4,
        };
        c.store_balance(1, inputs, WaterBalanceState::default(), 0);
        assert!(c.get_balance(1, &inputs, 899).is_some());
        c.store_balance(1, inputs, WaterBalanceState::default(), 0);
        assert!(c.get_balance(1, &inputs, 900).is_none());
    }

    // -- Maintenance ----------------------------------------------------------

    #[test]
    fn disable_clears_and_stops_serving() {
        let mut c = CalculationCache::new();
        c.store_et0(1, et0_inputs(), 5.2, 0);
        c.set_enabled(false);
        assert_eq!(c.get_et0(1, &et0_inputs(), 10), None);
        assert_eq!(c.stats().entries, 0);
        // Disabled misses do not skew the counters.
        assert_eq!(c.stats().misses, 0);
    }

    #[test]
    fn reenable_serves_again() {
        let mut c = CalculationCache::new();
        c.set_enabled(false);
        c.set_enabled(true);
        c.store_et0(1, et0_inputs(), 4.0, 0);
        assert_eq!(c.get_et0(1, &et0_inputs(), 10), Some(4.0));
    }

    #[test]
    fn invalidate_by_age() {
        let mut c = CalculationCache::new();
        c.store_et0(1, et0_inputs(), 5.2, 0);
        c.store_et0(2, et0_inputs(), 5.3, 500);
        c.invalidate_older_than(400, 600);
        assert_eq!(c.get_et0(1, &et0_inputs(), 600), None); // age 600, dropped
        assert_eq!(c.get_et0(2, &et0_inputs(), 600), Some(5.3)); // age 100
    }

    #[test]
    fn invalidate_channel_drops_all_slots() {
        let mut c = CalculationCache::new();
        c.store_et0(1, et0_inputs(), 5.2, 0);
        c.store_kc(
            1,
            KcInputs {
                plant_index: 0,
                days_after_planting: 1,
            },
            0.6,
            0.1,
            0,
        );
        c.invalidate_channel(1);
        assert_eq!(c.stats().entries, 0);
    }

    // -- Stats and health -------------------------------------------------------

    #[test]
    fn stats_track_hits_and_misses() {
        let mut c = CalculationCache::new();
        c.store_et0(1, et0_inputs(), 5.2, 0);
        c.get_et0(1, &et0_inputs(), 10);
        c.get_et0(1, &et0_inputs(), 5000);
        let s = c.stats();
        assert_eq!((s.hits, s.misses), (1, 1));
        assert_relative_eq!(s.hit_ratio(), 0.5);
    }

    #[test]
    fn health_check_clears_churning_cache() {
        let mut c = CalculationCache::new();
        // 101 misses, zero hits.
        for i in 0..101 {
            c.get_et0(1, &et0_inputs(), i);
        }
        assert_eq!(c.health_check(), CacheHealth::Churning);
        assert_eq!(c.stats().misses, 0); // counters reset with the entries
        assert_eq!(c.health_check(), CacheHealth::Healthy);
    }

    #[test]
    fn health_check_small_sample_is_healthy() {
        let mut c = CalculationCache::new();
        for i in 0..50 {
            c.get_et0(1, &et0_inputs(), i);
        }
        assert_eq!(c.health_check(), CacheHealth::Healthy);
    }

    #[test]
    fn memory_estimate_grows_with_channels() {
        let mut c = CalculationCache::new();
        let base = c.memory_estimate_bytes();
        c.store_et0(1, et0_inputs(), 5.0, 0);
        c.store_et0(2, et0_inputs(), 5.0, 0);
        assert!(c.memory_estimate_bytes() > base);
    }
}
