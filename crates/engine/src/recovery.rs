//! Degraded calculation paths. When the full FAO-56 pipeline fails, the
//! engine walks an ordered list of cheaper strategies and takes the first
//! one that produces a plan. Every outcome is tagged with the tier that
//! produced it so consumers can tell a full calculation from a guess.

use chrono::NaiveDate;
use serde::Serialize;
use tracing::{error, warn};

use crate::catalog::{self, PlantType};
use crate::config::ChannelConfig;
use crate::envdata::EnvironmentalSample;
use crate::error::{EngineError, Result};
use crate::et0;
use crate::phenology;
use crate::planner::IrrigationPlan;

/// Eco mode scaling, shared with the full planner.
const ECO_FACTOR: f64 = 0.7;
/// The degraded paths assume replacing half of one day's crop water use.
const SIMPLIFIED_DEPLETION_FACTOR: f64 = 0.5;
/// Fixed efficiency assumption when the method record is not consulted.
const SIMPLIFIED_EFFICIENCY: f64 = 0.8;
/// Nominal ground area per plant when only a count is known [m²].
const SIMPLIFIED_AREA_PER_PLANT_M2: f64 = 0.5;
/// Nominal delivery rates for run-duration estimates [L/min].
const SIMPLIFIED_FLOW_L_MIN: f64 = 10.0;
const DEFAULTS_FLOW_L_MIN: f64 = 5.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum RecoveryTier {
    /// Complete FAO-56 pipeline.
    Full,
    /// Simplified ET0 + plant-category coefficients, no catalog detail.
    Simplified,
    /// Fixed per-category volume table.
    Defaults,
    /// Nothing worked; water nothing and ask for manual operation.
    Manual,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct RecoveryOutcome {
    pub tier: RecoveryTier,
    pub plan: IrrigationPlan,
    pub recommend_manual: bool,
}

impl RecoveryOutcome {
    pub fn full(plan: IrrigationPlan) -> Self {
        Self {
            tier: RecoveryTier::Full,
            plan,
            recommend_manual: false,
        }
    }
}

// ---------------------------------------------------------------------------
// Tier 2: simplified calculation
// ---------------------------------------------------------------------------

fn plant_type_for(cfg: &ChannelConfig) -> PlantType {
    catalog::plant_by_index(cfg.plant_index)
        .map(|p| p.plant_type)
        .unwrap_or(PlantType::Other)
}

fn coverage_area_m2(cfg: &ChannelConfig) -> Result<f64> {
    match (cfg.area_m2, cfg.plant_count) {
        (Some(a), _) if a > 0.0 => Ok(a),
        (_, Some(n)) if n > 0 => Ok(n as f64 * SIMPLIFIED_AREA_PER_PLANT_M2),
        _ => Err(EngineError::ConfigurationError(
            "channel has no usable coverage".to_string(),
        )),
    }
}

/// Temperature-only requirement: simplified ET0, category Kc, and a flat
/// 50% replacement assumption. No soil, cache, or method record involved.
pub fn simplified_requirement(
    cfg: &ChannelConfig,
    env: &EnvironmentalSample,
    day_of_year: u32,
    today: NaiveDate,
) -> Result<IrrigationPlan> {
    let env = env.sanitized();
    let et0 = et0::simplified_et0(env.temp_min_c, env.temp_max_c, day_of_year);
    let et0 = if et0 > 0.01 { et0 } else { et0::DEFAULT_ET0 };

    let dap = cfg.days_after_planting(today);
    let kc = phenology::simplified_crop_coefficient(plant_type_for(cfg), dap);

    let etc = et0 * kc;
    let mut net = etc * SIMPLIFIED_DEPLETION_FACTOR;
    if cfg.eco_mode() {
        net *= ECO_FACTOR;
    }
    let gross = net / SIMPLIFIED_EFFICIENCY;

    let area = coverage_area_m2(cfg)?;
    let mut volume_l = gross * area;
    if !volume_l.is_finite() {
        return Err(EngineError::InvalidData(
            "simplified volume not finite".to_string(),
        ));
    }

    let mut limited = false;
    if let Some(limit) = cfg.max_volume_l {
        if limit > 0.0 && volume_l > limit {
            volume_l = limit;
            limited = true;
        }
    }

    Ok(IrrigationPlan {
        net_mm: net,
        gross_mm: gross,
        volume_l,
        per_plant_l: cfg
            .plant_count
            .filter(|&n| n > 0)
            .map(|n| volume_l / n as f64)
            .unwrap_or(0.0),
        cycle_count: 1,
        cycle_duration_min: (volume_l / SIMPLIFIED_FLOW_L_MIN).max(1.0),
        soak_interval_min: 0.0,
        volume_limited: limited,
    })
}

// ---------------------------------------------------------------------------
// Tier 3: fixed defaults
// ---------------------------------------------------------------------------

/// Nominal daily volume per plant (or per m² for area channels) [L].
fn default_volume_for_type(plant_type: PlantType) -> f64 {
    match plant_type {
        PlantType::Vegetables => 2.0,
        PlantType::Herbs => 1.0,
        PlantType::Flowers => 1.5,
        PlantType::Shrubs => 3.0,
        PlantType::Trees => 5.0,
        PlantType::Lawn => 4.0,
        PlantType::Succulents => 0.5,
        PlantType::Other => 1.5,
    }
}

/// Table-driven requirement: no environmental input at all, just the plant
/// category and coverage.
pub fn defaults_requirement(cfg: &ChannelConfig) -> Result<IrrigationPlan> {
    let per_unit = default_volume_for_type(plant_type_for(cfg));

    let mut volume_l = match (cfg.area_m2, cfg.plant_count) {
        (Some(a), _) if a > 0.0 => per_unit * a,
        (_, Some(n)) if n > 0 => per_unit * n as f64,
        _ => {
            return Err(EngineError::ConfigurationError(
                "channel has no usable coverage".to_string(),
            ))
        }
    };
    if cfg.eco_mode() {
        volume_l *= ECO_FACTOR;
    }

    let mut limited = false;
    if let Some(limit) = cfg.max_volume_l {
        if limit > 0.0 && volume_l > limit {
            volume_l = limit;
            limited = true;
        }
    }

    Ok(IrrigationPlan {
        volume_l,
        per_plant_l: cfg
            .plant_count
            .filter(|&n| n > 0)
            .map(|n| volume_l / n as f64)
            .unwrap_or(0.0),
        cycle_count: 1,
        cycle_duration_min: (volume_l / DEFAULTS_FLOW_L_MIN).max(1.0),
        volume_limited: limited,
        ..IrrigationPlan::default()
    })
}

// ---------------------------------------------------------------------------
// Chain
// ---------------------------------------------------------------------------

/// Walk the degraded tiers in order after a full-calculation failure.
/// Transitions are logged with the channel and the error that forced them.
pub fn recover(
    cfg: &ChannelConfig,
    env: &EnvironmentalSample,
    day_of_year: u32,
    today: NaiveDate,
    cause: &EngineError,
) -> RecoveryOutcome {
    warn!(
        channel = cfg.id,
        error = %cause,
        "full calculation failed, trying simplified path"
    );
    match simplified_requirement(cfg, env, day_of_year, today) {
        Ok(plan) => {
            return RecoveryOutcome {
                tier: RecoveryTier::Simplified,
                plan,
                recommend_manual: false,
            }
        }
        Err(e) => {
            warn!(
                channel = cfg.id,
                error = %e,
                "simplified path failed, trying default volumes"
            );
        }
    }

    match defaults_requirement(cfg) {
        Ok(plan) => RecoveryOutcome {
            tier: RecoveryTier::Defaults,
            plan,
            recommend_manual: false,
        },
        Err(e) => {
            error!(
                channel = cfg.id,
                error = %e,
                "all calculation paths failed, recommending manual mode"
            );
            RecoveryOutcome {
                tier: RecoveryTier::Manual,
                plan: IrrigationPlan::default(),
                recommend_manual: true,
            }
        }
    }
}

// ===========================================================================
// Tests
// ===========================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ChannelMode;
    use approx::assert_relative_eq;

    fn channel() -> ChannelConfig {
        ChannelConfig {
            id: 1,
            name: "bed".into(),
            plant_index: 0, // tomato → Vegetables
            soil_index: 2,
            method_index: 0,
            area_m2: Some(10.0),
            plant_count: None,
            mode: ChannelMode::Quality,
            max_volume_l: None,
            sun_exposure_pct: 100.0,
            planting_date: "2026-05-01".into(),
            start_time: "sunrise".into(),
        }
    }

    fn warm_env() -> EnvironmentalSample {
        EnvironmentalSample {
            temp_min_c: 15.0,
            temp_max_c: 30.0,
            temp_mean_c: 22.5,
            ..EnvironmentalSample::default()
        }
    }

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 7, 15).unwrap()
    }

    // -- Simplified tier -----------------------------------------------------

    #[test]
    fn simplified_produces_positive_volume() {
        let plan = simplified_requirement(&channel(), &warm_env(), 196, today()).unwrap();
        assert!(plan.volume_l > 0.0);
        assert_eq!(plan.cycle_count, 1);
        assert!(plan.cycle_duration_min >= 1.0);
    }

    #[test]
    fn simplified_eco_scales_down() {
        let mut cfg = channel();
        let quality = simplified_requirement(&cfg, &warm_env(), 196, today()).unwrap();
        cfg.mode = ChannelMode::Eco;
        let eco = simplified_requirement(&cfg, &warm_env(), 196, today()).unwrap();
        assert_relative_eq!(eco.volume_l, quality.volume_l * 0.7, epsilon = 1e-9);
    }

    #[test]
    fn simplified_respects_volume_limit() {
        let mut cfg = channel();
        cfg.max_volume_l = Some(1.0);
        let plan = simplified_requirement(&cfg, &warm_env(), 196, today()).unwrap();
        assert_relative_eq!(plan.volume_l, 1.0);
        assert!(plan.volume_limited);
    }

    #[test]
    fn simplified_plant_count_coverage() {
        let mut cfg = channel();
        cfg.area_m2 = None;
        cfg.plant_count = Some(8);
        let plan = simplified_requirement(&cfg, &warm_env(), 196, today()).unwrap();
        // 8 plants × 0.5 m² nominal area.
        assert!(plan.volume_l > 0.0);
        assert_relative_eq!(plan.per_plant_l * 8.0, plan.volume_l, epsilon = 1e-9);
    }

    #[test]
    fn simplified_no_coverage_fails() {
        let mut cfg = channel();
        cfg.area_m2 = None;
        cfg.plant_count = None;
        assert!(simplified_requirement(&cfg, &warm_env(), 196, today()).is_err());
    }

    #[test]
    fn simplified_zero_range_uses_default_et0() {
        // Identical min/max temperature gives ET0 = 0; the default kicks in.
        let env = EnvironmentalSample {
            temp_min_c: 20.0,
            temp_max_c: 20.0,
            temp_mean_c: 20.0,
            ..EnvironmentalSample::default()
        };
        let plan = simplified_requirement(&channel(), &env, 196, today()).unwrap();
        assert!(plan.volume_l > 0.0);
    }

    // -- Defaults tier --------------------------------------------------------

    #[test]
    fn defaults_vegetables_area_scaled() {
        let plan = defaults_requirement(&channel()).unwrap();
        // 2 L per m² × 10 m².
        assert_relative_eq!(plan.volume_l, 20.0);
        assert_eq!(plan.cycle_count, 1);
    }

    #[test]
    fn defaults_per_plant_scaled() {
        let mut cfg = channel();
        cfg.area_m2 = None;
        cfg.plant_count = Some(3);
        let plan = defaults_requirement(&cfg).unwrap();
        assert_relative_eq!(plan.volume_l, 6.0);
        assert_relative_eq!(plan.per_plant_l, 2.0);
    }

    #[test]
    fn defaults_eco_and_limit() {
        let mut cfg = channel();
        cfg.mode = ChannelMode::Eco;
        cfg.max_volume_l = Some(10.0);
        let plan = defaults_requirement(&cfg).unwrap();
        // 20 × 0.7 = 14, capped at 10.
        assert_relative_eq!(plan.volume_l, 10.0);
    }

    #[test]
    fn defaults_unknown_plant_uses_other_category() {
        let mut cfg = channel();
        cfg.plant_index = 999;
        let plan = defaults_requirement(&cfg).unwrap();
        assert_relative_eq!(plan.volume_l, 15.0); // 1.5 L/m² × 10
    }

    // -- Chain ------------------------------------------------------------------

    #[test]
    fn chain_prefers_simplified() {
        let out = recover(
            &channel(),
            &warm_env(),
            196,
            today(),
            &EngineError::Timeout("sensor".into()),
        );
        assert_eq!(out.tier, RecoveryTier::Simplified);
        assert!(!out.recommend_manual);
        assert!(out.plan.volume_l > 0.0);
    }

    #[test]
    fn chain_falls_through_to_manual() {
        let mut cfg = channel();
        cfg.area_m2 = None;
        cfg.plant_count = None; // simplified and defaults both fail
        let out = recover(
            &cfg,
            &warm_env(),
            196,
            today(),
            &EngineError::HardwareFailure("i2c".into()),
        );
        assert_eq!(out.tier, RecoveryTier::Manual);
        assert!(out.recommend_manual);
        assert_relative_eq!(out.plan.volume_l, 0.0);
    }
}
