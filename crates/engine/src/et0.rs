//! Reference evapotranspiration (ET0) per FAO-56.
//!
//! Two estimators are provided: Hargreaves-Samani (temperature only) and a
//! simplified Penman-Monteith that fills the unmeasured inputs (wind,
//! sunshine, albedo) from configured assumptions. All functions are pure;
//! results are in mm/day.

use tracing::warn;

use crate::config::EnvironmentalAssumptions;
use crate::envdata::EnvironmentalSample;

/// Solar constant [MJ m⁻² min⁻¹].
const SOLAR_CONSTANT: f64 = 0.0820;
/// Stefan-Boltzmann constant [MJ K⁻⁴ m⁻² day⁻¹].
const STEFAN_BOLTZMANN: f64 = 4.903e-9;
/// Standard atmospheric pressure at sea level [kPa].
const STANDARD_PRESSURE_KPA: f64 = 101.3;
/// Hargreaves radiation adjustment coefficient for interior locations.
const K_RS: f64 = 0.16;
/// Ceiling for the simplified (resource-constrained) estimator [mm/day].
const SIMPLIFIED_ET0_MAX: f64 = 12.0;
/// Fallback when neither estimator produces a usable value [mm/day].
pub const DEFAULT_ET0: f64 = 3.0;

/// Monthly climatological ET0 fallback [mm/day], temperate mid-latitude.
const MONTHLY_DEFAULT_ET0: [f64; 12] = [
    1.0, 1.5, 2.5, 3.5, 4.5, 5.5, 6.0, 5.5, 4.0, 2.5, 1.5, 1.0,
];

// ---------------------------------------------------------------------------
// Radiation terms
// ---------------------------------------------------------------------------

/// Extraterrestrial radiation Ra [MJ m⁻² day⁻¹] (FAO-56 eq. 21).
pub fn extraterrestrial_radiation(latitude_rad: f64, day_of_year: u32) -> f64 {
    let j = day_of_year as f64;
    // Solar declination [rad] and inverse relative Earth-Sun distance.
    let decl = 0.409 * (2.0 * std::f64::consts::PI * j / 365.0 - 1.39).sin();
    let dr = 1.0 + 0.033 * (2.0 * std::f64::consts::PI * j / 365.0).cos();

    // Sunset hour angle; the argument leaves [-1, 1] at polar latitudes.
    let x = (-latitude_rad.tan() * decl.tan()).clamp(-1.0, 1.0);
    let ws = x.acos();

    (24.0 * 60.0 / std::f64::consts::PI)
        * SOLAR_CONSTANT
        * dr
        * (ws * latitude_rad.sin() * decl.sin() + latitude_rad.cos() * decl.cos() * ws.sin())
}

/// Station altitude [m] estimated from barometric pressure [kPa].
fn altitude_from_pressure(pressure_kpa: f64) -> f64 {
    44_331.0 * (1.0 - (pressure_kpa / STANDARD_PRESSURE_KPA).powf(0.1903))
}

/// Saturation vapour pressure at temperature T [kPa] (FAO-56 eq. 11).
fn saturation_vapour_pressure(temp_c: f64) -> f64 {
    0.6108 * (17.27 * temp_c / (temp_c + 237.3)).exp()
}

// ---------------------------------------------------------------------------
// Estimators
// ---------------------------------------------------------------------------

/// Hargreaves-Samani ET0 [mm/day] (FAO-56 eq. 52). Needs only the daily
/// temperature extremes and latitude.
pub fn hargreaves_samani(
    env: &EnvironmentalSample,
    latitude_rad: f64,
    day_of_year: u32,
    et0_abs_max: f64,
) -> f64 {
    let ra = extraterrestrial_radiation(latitude_rad, day_of_year);
    let trange = (env.temp_max_c - env.temp_min_c).max(0.0);
    // 0.408 converts MJ m⁻² day⁻¹ to mm/day.
    let et0 = 0.0023 * (env.temp_mean_c + 17.8) * trange.sqrt() * ra * 0.408;
    et0.clamp(0.0, et0_abs_max)
}

/// Simplified Penman-Monteith ET0 [mm/day] (FAO-56 eq. 6), with wind,
/// sunshine ratio, and albedo taken from the configured assumptions and
/// solar radiation estimated from the diurnal temperature range.
///
/// Falls back to Hargreaves-Samani when the humidity reading is unusable.
pub fn penman_monteith(
    env: &EnvironmentalSample,
    latitude_rad: f64,
    day_of_year: u32,
    assumptions: &EnvironmentalAssumptions,
) -> f64 {
    if !env.humidity_valid || !(0.0..=100.0).contains(&env.humidity_pct) {
        warn!(
            humidity = env.humidity_pct,
            "humidity unusable, falling back to Hargreaves-Samani"
        );
        return hargreaves_samani(env, latitude_rad, day_of_year, assumptions.et0_abs_max_mm_day);
    }

    let tmean = env.temp_mean_c;
    let trange = (env.temp_max_c - env.temp_min_c).max(0.0);

    // Vapour pressure terms [kPa].
    let es = (saturation_vapour_pressure(env.temp_max_c)
        + saturation_vapour_pressure(env.temp_min_c))
        / 2.0;
    let ea = (es * env.humidity_pct / 100.0).min(es);

    // Slope of the saturation curve at the mean temperature [kPa/°C].
    let delta = 4098.0 * saturation_vapour_pressure(tmean) / (tmean + 237.3).powi(2);

    // Psychrometric constant from station pressure [kPa/°C]. Pressure far
    // outside the barometric range means a bad reading; use sea level.
    let mut pressure_kpa = env.pressure_hpa / 10.0;
    if !(50.0..=110.0).contains(&pressure_kpa) {
        pressure_kpa = STANDARD_PRESSURE_KPA;
    }
    let gamma = 0.000665 * pressure_kpa;

    // Radiation balance. Rs is estimated from the temperature range
    // (Hargreaves kRs), bounded by the clear-sky envelope. A degenerate
    // range falls back to the Angstrom form with the assumed sunshine ratio.
    let ra = extraterrestrial_radiation(latitude_rad, day_of_year);
    let altitude_m = altitude_from_pressure(pressure_kpa);
    let rso = (0.75 + 2e-5 * altitude_m) * ra;
    let rs_estimate = if trange >= 0.1 {
        K_RS * trange.sqrt() * ra
    } else {
        (0.25 + 0.50 * assumptions.sunshine_ratio) * ra
    };
    let rs = rs_estimate.clamp(0.05 * rso, rso);

    let rns = (1.0 - assumptions.albedo) * rs;
    let tmax_k4 = (env.temp_max_c + 273.16).powi(4);
    let tmin_k4 = (env.temp_min_c + 273.16).powi(4);
    let rnl = STEFAN_BOLTZMANN
        * ((tmax_k4 + tmin_k4) / 2.0)
        * (0.34 - 0.14 * ea.sqrt())
        * (1.35 * rs / rso - 0.35);
    let rn = rns - rnl;

    let u2 = assumptions.wind_speed_m_s;
    let et0 = (0.408 * delta * rn + gamma * 900.0 / (tmean + 273.0) * u2 * (es - ea))
        / (delta + gamma * (1.0 + 0.34 * u2));

    et0.clamp(0.0, assumptions.et0_abs_max_mm_day)
}

/// Resource-constrained ET0 [mm/day]: Hargreaves form with the radiation
/// term reduced to a seasonal mid-latitude approximation. Ra here is
/// already in evaporation-equivalent mm/day.
pub fn simplified_et0(temp_min_c: f64, temp_max_c: f64, day_of_year: u32) -> f64 {
    let j = day_of_year as f64;
    let dr = 1.0 + 0.033 * (2.0 * std::f64::consts::PI * j / 365.0).cos();
    let ra_mm = 15.0 * dr;
    let tmean = (temp_min_c + temp_max_c) / 2.0;
    let trange = (temp_max_c - temp_min_c).max(0.0);
    let et0 = 0.0023 * (tmean + 17.8) * trange.sqrt() * ra_mm;
    et0.clamp(0.0, SIMPLIFIED_ET0_MAX)
}

/// Climatological fallback for a month 1..=12; out-of-range months get the
/// annual default.
pub fn default_et0_for_month(month: u32) -> f64 {
    match month {
        1..=12 => MONTHLY_DEFAULT_ET0[(month - 1) as usize],
        _ => DEFAULT_ET0,
    }
}

// ===========================================================================
// Tests
// ===========================================================================
