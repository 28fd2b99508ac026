//! Root-zone water balance: effective precipitation, stress-adjusted
//! management allowed depletion (MAD), deficit bookkeeping, and the
//! irrigation trigger.
//!
//! The balance is a simple bucket. Crop evapotranspiration empties it,
//! effective rain and irrigation refill it, and the deficit is always kept
//! within [0, wetted available water].

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::catalog::{PlantRecord, SoilRecord, SoilTexture};
use crate::envdata::EnvironmentalSample;

/// Deficits below this are noise, never a trigger [mm].
const MIN_TRIGGER_DEFICIT_MM: f64 = 2.0;
/// Root zones holding less than this are too shallow to schedule [mm].
const MIN_TRIGGER_AWC_MM: f64 = 5.0;
/// Upper bound on the time-to-trigger estimate [h].
const MAX_TRIGGER_HORIZON_H: f64 = 168.0;

// ---------------------------------------------------------------------------
// Per-channel balance state
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct WaterBalanceState {
    /// Available water capacity of the full root zone [mm].
    pub root_zone_awc_mm: f64,
    /// Capacity of the actually wetted part of the root zone [mm].
    pub wetted_awc_mm: f64,
    /// Readily available water threshold [mm].
    pub raw_mm: f64,
    /// Current depletion below field capacity [mm].
    pub deficit_mm: f64,
    /// Effective rain figure for the current 24-hour gauge window [mm];
    /// the baseline for crediting further growth of the window.
    pub effective_rain_mm: f64,
    pub irrigation_needed: bool,
    pub updated_at_s: u64,
}

impl WaterBalanceState {
    /// Apply one day's fluxes. The deficit grows with crop ET and shrinks
    /// with effective rain and applied irrigation, clamped to the bucket.
    pub fn update(&mut self, etc_mm: f64, effective_rain_mm: f64, irrigation_mm: f64) {
        self.deficit_mm = (self.deficit_mm + etc_mm - effective_rain_mm - irrigation_mm)
            .clamp(0.0, self.wetted_awc_mm.max(0.0));
    }

    /// Rescale the deficit proportionally when the wetted capacity changes
    /// (root growth, reconfiguration), preserving relative depletion.
    pub fn rescale_for_capacity(&mut self, new_wetted_awc_mm: f64) {
        if self.wetted_awc_mm > 0.0 && new_wetted_awc_mm > 0.0 {
            self.deficit_mm *= new_wetted_awc_mm / self.wetted_awc_mm;
        }
        self.wetted_awc_mm = new_wetted_awc_mm.max(0.0);
        self.deficit_mm = self.deficit_mm.clamp(0.0, self.wetted_awc_mm);
    }

    /// Whether the deficit has crossed the adjusted MAD threshold. Tiny
    /// deficits and near-empty buckets never trigger.
    pub fn mad_trigger(&self, adjusted_fraction: f64) -> bool {
        if self.deficit_mm < MIN_TRIGGER_DEFICIT_MM || self.wetted_awc_mm < MIN_TRIGGER_AWC_MM {
            return false;
        }
        self.deficit_mm >= self.wetted_awc_mm * adjusted_fraction
    }

    /// Estimated hours until the MAD threshold is crossed at the current
    /// daily ET rate, minus a safety margin. Zero when already due.
    pub fn hours_until_trigger(&self, daily_et_mm: f64, adjusted_fraction: f64) -> f64 {
        let threshold = self.wetted_awc_mm * adjusted_fraction;
        if self.deficit_mm >= threshold {
            return 0.0;
        }
        let hourly_et = daily_et_mm.max(1e-9) / 24.0;
        let margin_h = if daily_et_mm > 8.0 {
            2.0
        } else if daily_et_mm < 3.0 {
            4.0
        } else {
            3.0
        };
        ((threshold - self.deficit_mm) / hourly_et - margin_h).clamp(0.0, MAX_TRIGGER_HORIZON_H)
    }
}

// ---------------------------------------------------------------------------
// Effective precipitation
// ---------------------------------------------------------------------------

/// Assumed storm duration [h] and intensity [mm/h] for a 24-hour rain total.
/// Gauges report totals only, so duration is estimated from typical event
/// sizes.
pub fn rainfall_characteristics(rain_mm: f64) -> (f64, f64) {
    let duration_h = if rain_mm < 2.0 {
        0.5
    } else if rain_mm < 5.0 {
        1.0
    } else if rain_mm < 10.0 {
        1.5
    } else if rain_mm < 25.0 {
        3.0
    } else if rain_mm < 50.0 {
        6.0
    } else {
        12.0
    };
    let intensity = (rain_mm / duration_h).clamp(0.1, 100.0);
    (duration_h, intensity)
}

/// Fraction of rainfall lost to runoff, from the intensity excess over the
/// soil's effective infiltration rate. Wet antecedent conditions shrink the
/// intake; clay sheds a little more, sand a little less.
pub fn runoff_coefficient(intensity_mm_h: f64, soil: &SoilRecord, antecedent_moisture: f64) -> f64 {
    let m = antecedent_moisture.clamp(0.0, 1.0);
    let effective_infiltration = soil.infiltration_mm_h * (0.6 + 0.4 * (1.0 - m));

    let mut coef = if intensity_mm_h > effective_infiltration {
        (intensity_mm_h - effective_infiltration) / intensity_mm_h
    } else {
        0.0
    };
    coef += match soil.texture {
        SoilTexture::Clay => 0.05,
        SoilTexture::Sand => -0.05,
        SoilTexture::Loam => 0.0,
    };
    coef.clamp(0.0, 0.8)
}

/// Water evaporated back off the surface during and shortly after the storm
/// [mm], capped at 30% of the post-runoff amount.
pub fn evaporation_losses(after_runoff_mm: f64, duration_h: f64, temp_c: f64) -> f64 {
    let t = if (-40.0..=60.0).contains(&temp_c) {
        temp_c
    } else {
        20.0
    };
    let rate = if t > 25.0 {
        0.1 + 0.02 * (t - 25.0)
    } else if t < 15.0 {
        (0.1 - 0.01 * (15.0 - t)).max(0.0)
    } else {
        0.1
    };
    // Surfaces stay wet a while after the rain stops.
    let exposure_h = (duration_h + 2.0).min(6.0);
    let size_factor = if after_runoff_mm < 5.0 {
        1.5
    } else if after_runoff_mm > 20.0 {
        0.7
    } else {
        1.0
    };
    (rate * exposure_h * size_factor).min(0.3 * after_runoff_mm)
}

/// Effective precipitation [mm]: the part of a 24-hour rain total that
/// actually reaches the root zone after runoff and evaporation.
pub fn effective_precipitation(
    rain_mm: f64,
    soil: &SoilRecord,
    antecedent_moisture: f64,
    temp_c: f64,
) -> f64 {
    if rain_mm <= 0.0 {
        return 0.0;
    }
    // Traces wet foliage and mulch, not soil.
    if rain_mm < 1.0 {
        return rain_mm * 0.3;
    }

    let (duration_h, intensity) = rainfall_characteristics(rain_mm);
    let runoff = runoff_coefficient(intensity, soil, antecedent_moisture);
    let after_runoff = rain_mm * (1.0 - runoff);
    let evap = evaporation_losses(after_runoff, duration_h, temp_c);
    let effective = (after_runoff - evap).max(0.0);

    debug!(
        rain = rain_mm,
        runoff_coef = runoff,
        evap_mm = evap,
        effective_mm = effective,
        "effective precipitation"
    );
    effective
}

// ---------------------------------------------------------------------------
// Stress-adjusted depletion
// ---------------------------------------------------------------------------

/// MAD fraction tightened for heat and dry-air stress. Hot days above the
/// plant's comfort band and very dry air both call for earlier irrigation.
/// Never below 20% of the base fraction, never above it.
pub fn stress_adjusted_depletion(
    base_fraction: f64,
    env: &EnvironmentalSample,
    plant: &PlantRecord,
) -> f64 {
    let heat_threshold = plant.optimal_temp_max_c + 5.0;
    let temp_stress = if env.temp_max_c > heat_threshold {
        ((env.temp_max_c - heat_threshold) / 10.0).min(0.3)
    } else {
        0.0
    };
    let humidity_stress = if env.humidity_pct < 30.0 {
        ((30.0 - env.humidity_pct) / 30.0).min(0.2)
    } else {
        0.0
    };
    let adjusted = base_fraction * (1.0 - temp_stress - humidity_stress);
    adjusted.clamp(0.2 * base_fraction, base_fraction)
}

// ===========================================================================
// Tests
// ===========================================================================
