//! Environmental sample validation. Raw sensor data is repaired rather than
//! rejected: the calculation must always be able to proceed, so inverted
//! ranges are swapped, out-of-band values clamped, and dead sensors replaced
//! with conservative defaults.

use serde::{Deserialize, Serialize};
use tracing::warn;

// Plausibility bands for physical sensors.
const TEMP_PLAUSIBLE_C: (f64, f64) = (-40.0, 60.0);
const PRESSURE_PLAUSIBLE_HPA: (f64, f64) = (800.0, 1200.0);

// Conservative substitutes used when a sensor has failed outright.
const FALLBACK_TEMP_MIN_C: f64 = 15.0;
const FALLBACK_TEMP_MEAN_C: f64 = 20.0;
const FALLBACK_TEMP_MAX_C: f64 = 25.0;
const FALLBACK_HUMIDITY_PCT: f64 = 60.0;
const FALLBACK_PRESSURE_HPA: f64 = 1013.25;

/// One 24-hour environmental observation window.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EnvironmentalSample {
    pub temp_min_c: f64,
    pub temp_max_c: f64,
    pub temp_mean_c: f64,
    pub humidity_pct: f64,
    pub pressure_hpa: f64,
    pub rain_24h_mm: f64,
    pub temp_valid: bool,
    pub humidity_valid: bool,
    pub pressure_valid: bool,
    pub rain_valid: bool,
}

impl EnvironmentalSample {
    /// Repair internal inconsistencies without touching validity flags:
    /// swap an inverted min/max pair, recompute a mean that escaped the
    /// min..max band, clamp humidity to [0, 100] and rainfall to >= 0.
    pub fn validated(&self) -> Self {
        let mut s = *self;

        if s.temp_min_c > s.temp_max_c {
            warn!(
                min = s.temp_min_c,
                max = s.temp_max_c,
                "temperature min/max inverted, swapping"
            );
            std::mem::swap(&mut s.temp_min_c, &mut s.temp_max_c);
        }
        if s.temp_mean_c < s.temp_min_c || s.temp_mean_c > s.temp_max_c {
            s.temp_mean_c = (s.temp_min_c + s.temp_max_c) / 2.0;
        }

        s.humidity_pct = s.humidity_pct.clamp(0.0, 100.0);

        if s.rain_24h_mm < 0.0 {
            s.rain_24h_mm = 0.0;
        }

        s
    }

    /// Substitute conservative defaults for any field whose sensor failed or
    /// whose value is physically implausible, and mark it valid so the
    /// calculation can proceed.
    pub fn with_sensor_fallbacks(&self) -> Self {
        let mut s = *self;

        let temp_implausible = s.temp_min_c < TEMP_PLAUSIBLE_C.0
            || s.temp_max_c > TEMP_PLAUSIBLE_C.1
            || !s.temp_min_c.is_finite()
            || !s.temp_max_c.is_finite()
            || !s.temp_mean_c.is_finite();
        if !s.temp_valid || temp_implausible {
            warn!(
                valid = s.temp_valid,
                min = s.temp_min_c,
                max = s.temp_max_c,
                "temperature sensor unusable, substituting defaults"
            );
            s.temp_min_c = FALLBACK_TEMP_MIN_C;
            s.temp_mean_c = FALLBACK_TEMP_MEAN_C;
            s.temp_max_c = FALLBACK_TEMP_MAX_C;
            s.temp_valid = true;
        }

        if !s.humidity_valid
            || !s.humidity_pct.is_finite()
            || !(0.0..=100.0).contains(&s.humidity_pct)
        {
            warn!(
                valid = s.humidity_valid,
                humidity = s.humidity_pct,
                "humidity sensor unusable, substituting default"
            );
            s.humidity_pct = FALLBACK_HUMIDITY_PCT;
            s.humidity_valid = true;
        }

        if !s.pressure_valid
            || !s.pressure_hpa.is_finite()
            || s.pressure_hpa < PRESSURE_PLAUSIBLE_HPA.0
            || s.pressure_hpa > PRESSURE_PLAUSIBLE_HPA.1
        {
            warn!(
                valid = s.pressure_valid,
                pressure = s.pressure_hpa,
                "pressure sensor unusable, substituting default"
            );
            s.pressure_hpa = FALLBACK_PRESSURE_HPA;
            s.pressure_valid = true;
        }

        if !s.rain_valid || !s.rain_24h_mm.is_finite() || s.rain_24h_mm < 0.0 {
            s.rain_24h_mm = 0.0;
            s.rain_valid = true;
        }

        s
    }

    /// Repaired and fallback-substituted sample, ready for calculation.
    pub fn sanitized(&self) -> Self {
        self.with_sensor_fallbacks().validated()
    }
}

impl Default for EnvironmentalSample {
    fn default() -> Self {
        Self {
            temp_min_c: FALLBACK_TEMP_MIN_C,
            temp_max_c: FALLBACK_TEMP_MAX_C,
            temp_mean_c: FALLBACK_TEMP_MEAN_C,
            humidity_pct: FALLBACK_HUMIDITY_PCT,
            pressure_hpa: FALLBACK_PRESSURE_HPA,
            rain_24h_mm: 0.0,
            temp_valid: true,
            humidity_valid: true,
            pressure_valid: true,
            rain_valid: true,
        }
    }
}

// ===========================================================================
// Tests
// ===========================================================================
