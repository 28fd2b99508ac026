//! Crop phenology: growth stage from days after planting, crop coefficient
//! (Kc) interpolation across stages, and root depth growth.

use serde::Serialize;

use crate::catalog::{PlantRecord, PlantType};

const KC_MIN: f64 = 0.1;
const KC_MAX: f64 = 2.0;
const SIMPLIFIED_KC_MIN: f64 = 0.3;
const SIMPLIFIED_KC_MAX: f64 = 1.5;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum GrowthStage {
    Initial,
    Development,
    MidSeason,
    EndSeason,
}

// ---------------------------------------------------------------------------
// Stage boundaries
// ---------------------------------------------------------------------------

/// Growth stage for a given day after planting, from cumulative stage
/// lengths. Days past the end of the season stay in EndSeason.
pub fn stage_for_day(plant: &PlantRecord, days_after_planting: u32) -> GrowthStage {
    let [ini, dev, mid, _end] = plant.stage_days;
    if days_after_planting < ini {
        GrowthStage::Initial
    } else if days_after_planting < ini + dev {
        GrowthStage::Development
    } else if days_after_planting < ini + dev + mid {
        GrowthStage::MidSeason
    } else {
        GrowthStage::EndSeason
    }
}

/// Total season length in days.
pub fn season_length(plant: &PlantRecord) -> u32 {
    plant.stage_days.iter().sum()
}

// ---------------------------------------------------------------------------
// Crop coefficient
// ---------------------------------------------------------------------------

/// Kc for a given day after planting. Constant in the initial and
/// mid-season stages, linearly interpolated through development
/// (kc_ini → kc_mid) and end-season (kc_mid → kc_end), so the curve is
/// continuous at every stage boundary.
pub fn crop_coefficient(plant: &PlantRecord, days_after_planting: u32) -> f64 {
    let [ini, dev, mid, end] = plant.stage_days;
    let kc = match stage_for_day(plant, days_after_planting) {
        GrowthStage::Initial => plant.kc_ini,
        GrowthStage::Development => {
            let into = (days_after_planting - ini) as f64;
            let span = dev.max(1) as f64;
            plant.kc_ini + (plant.kc_mid - plant.kc_ini) * (into / span).min(1.0)
        }
        GrowthStage::MidSeason => plant.kc_mid,
        GrowthStage::EndSeason => {
            let into = (days_after_planting - (ini + dev + mid)) as f64;
            let span = end.max(1) as f64;
            plant.kc_mid + (plant.kc_end - plant.kc_mid) * (into / span).min(1.0)
        }
    };
    kc.clamp(KC_MIN, KC_MAX)
}

/// Coarse Kc from the plant category alone, for the degraded calculation
/// path. A growth factor scales the base value by crop age.
pub fn simplified_crop_coefficient(plant_type: PlantType, days_after_planting: u32) -> f64 {
    let base = match plant_type {
        PlantType::Vegetables => 1.1,
        PlantType::Herbs => 0.9,
        PlantType::Flowers => 1.0,
        PlantType::Shrubs => 0.8,
        PlantType::Trees => 0.7,
        PlantType::Lawn => 1.2,
        PlantType::Succulents => 0.4,
        PlantType::Other => 1.0,
    };
    let d = days_after_planting as f64;
    let growth = if d < 30.0 {
        0.7
    } else if d < 90.0 {
        1.0 + (d - 30.0) / 60.0 * 0.3
    } else if d < 150.0 {
        1.3
    } else {
        1.0
    };
    (base * growth).clamp(SIMPLIFIED_KC_MIN, SIMPLIFIED_KC_MAX)
}

// ---------------------------------------------------------------------------
// Root depth
// ---------------------------------------------------------------------------

/// Effective root depth [m] for a given day after planting. Logistic growth
/// from the minimum to the maximum depth, centred at half the season.
pub fn root_depth(plant: &PlantRecord, days_after_planting: u32) -> f64 {
    let total = season_length(plant).max(1) as f64;
    let progress = (days_after_planting as f64 / total).clamp(0.0, 1.0);
    let sigmoid = 1.0 / (1.0 + (-6.0 * (progress - 0.5)).exp());
    plant.root_depth_min_m + (plant.root_depth_max_m - plant.root_depth_min_m) * sigmoid
}

// ===========================================================================
// Tests
// ===========================================================================
