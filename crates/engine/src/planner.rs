//! Volume and cycle planning: converts a root-zone deficit into litres to
//! apply, then splits the application into cycles the soil can absorb.

use serde::Serialize;
use tracing::{debug, info};

use crate::balance::WaterBalanceState;
use crate::catalog::{IrrigationMethodRecord, PlantRecord, SoilRecord, SoilTexture};

/// Eco mode refills this fraction of the deficit.
const ECO_FACTOR: f64 = 0.7;
/// Used when a method record carries a broken efficiency.
const FALLBACK_EFFICIENCY: f64 = 0.8;
/// Results below the minimum volume are noise; skip the run entirely [L].
const MIN_VOLUME_L: f64 = 0.5;
const MIN_VOLUME_L_PER_M2: f64 = 0.1;
/// Per-plant effective area clamp [m²].
const PLANT_AREA_MIN_M2: f64 = 0.002;
const PLANT_AREA_MAX_M2: f64 = 100.0;
/// Single-cycle threshold: rates up to this multiple of the soil intake
/// are applied in one pass.
const SINGLE_CYCLE_RATE_FACTOR: f64 = 1.2;
/// Multi-cycle applications target this fraction of the intake rate.
const CYCLE_TARGET_RATE_FACTOR: f64 = 0.8;

/// One planned irrigation run.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize)]
pub struct IrrigationPlan {
    /// Water the root zone actually needs [mm].
    pub net_mm: f64,
    /// Water to apply, after efficiency and uniformity losses [mm].
    pub gross_mm: f64,
    pub volume_l: f64,
    /// Volume per plant [L]; zero for area-based channels.
    pub per_plant_l: f64,
    pub cycle_count: u32,
    pub cycle_duration_min: f64,
    pub soak_interval_min: f64,
    /// True when the configured max-volume cap truncated the run.
    pub volume_limited: bool,
}

// ---------------------------------------------------------------------------
// Volume conversion
// ---------------------------------------------------------------------------

fn gross_depth_mm(deficit_mm: f64, method: &IrrigationMethodRecord, eco: bool) -> (f64, f64) {
    let net = if eco {
        deficit_mm * ECO_FACTOR
    } else {
        deficit_mm
    };
    let efficiency = if method.efficiency > 0.0 && method.efficiency <= 1.0 {
        method.efficiency
    } else {
        FALLBACK_EFFICIENCY
    };
    let mut gross = net / efficiency;
    if method.distribution_uniformity > 0.0 && method.distribution_uniformity < 1.0 {
        gross /= method.distribution_uniformity;
    }
    (net, gross)
}

fn apply_volume_limit(
    plan: &mut IrrigationPlan,
    area_m2: f64,
    efficiency: f64,
    max_volume_l: Option<f64>,
) {
    if let Some(limit) = max_volume_l {
        if limit > 0.0 && plan.volume_l > limit {
            info!(
                requested_l = plan.volume_l,
                limit_l = limit,
                "volume capped by configured limit"
            );
            plan.volume_l = limit;
            plan.volume_limited = true;
            // Back out the depths actually delivered under the cap.
            if area_m2 > 0.0 {
                plan.gross_mm = plan.volume_l / area_m2;
                plan.net_mm = plan.gross_mm * efficiency;
            }
        }
    }
}

/// Plan a run for an area-based channel. 1 mm over 1 m² is 1 L.
pub fn volume_for_area(
    state: &WaterBalanceState,
    method: &IrrigationMethodRecord,
    area_m2: f64,
    eco: bool,
    max_volume_l: Option<f64>,
) -> IrrigationPlan {
    let (net, gross) = gross_depth_mm(state.deficit_mm, method, eco);
    let mut plan = IrrigationPlan {
        net_mm: net,
        gross_mm: gross,
        volume_l: gross * area_m2.max(0.0),
        ..IrrigationPlan::default()
    };

    if plan.volume_l < MIN_VOLUME_L {
        debug!(volume_l = plan.volume_l, "volume below minimum, skipping run");
        return IrrigationPlan::default();
    }
    apply_volume_limit(&mut plan, area_m2, method.efficiency, max_volume_l);
    plan
}

/// Effective ground area one plant draws from [m²], from row/plant spacing,
/// else planting density, else a 1 m² default.
fn area_per_plant_m2(plant: &PlantRecord) -> f64 {
    let raw = if plant.row_spacing_m > 0.0 && plant.plant_spacing_m > 0.0 {
        plant.row_spacing_m * plant.plant_spacing_m
    } else if plant.density_per_m2 > 0.0 {
        1.0 / plant.density_per_m2
    } else {
        1.0
    };
    raw.clamp(PLANT_AREA_MIN_M2, PLANT_AREA_MAX_M2)
}

/// Plan a run for a plant-count channel. The per-plant area and canopy
/// cover translate the depth into litres per plant.
pub fn volume_for_plants(
    state: &WaterBalanceState,
    method: &IrrigationMethodRecord,
    plant: &PlantRecord,
    count: u32,
    eco: bool,
    max_volume_l: Option<f64>,
) -> IrrigationPlan {
    if count == 0 {
        return IrrigationPlan::default();
    }
    let (net, gross) = gross_depth_mm(state.deficit_mm, method, eco);

    let canopy = if plant.canopy_cover > 0.0 && plant.canopy_cover <= 1.0 {
        plant.canopy_cover
    } else {
        1.0
    };
    let total_area = area_per_plant_m2(plant) * count as f64;
    let volume_l = gross * total_area * canopy;

    let mut plan = IrrigationPlan {
        net_mm: net,
        gross_mm: gross,
        volume_l,
        per_plant_l: volume_l / count as f64,
        ..IrrigationPlan::default()
    };

    let min_volume = (MIN_VOLUME_L_PER_M2 * total_area).max(MIN_VOLUME_L);
    if plan.volume_l < min_volume {
        debug!(volume_l = plan.volume_l, min_volume, "volume below minimum, skipping run");
        return IrrigationPlan::default();
    }
    apply_volume_limit(&mut plan, total_area, method.efficiency, max_volume_l);
    plan.per_plant_l = plan.volume_l / count as f64;
    plan
}

// ---------------------------------------------------------------------------
// Cycle and soak
// ---------------------------------------------------------------------------

/// Split the gross application into cycles the soil can take without
/// runoff, with texture-dependent soak intervals between them.
///
/// `application_rate_mm_h` defaults to the midpoint of the method's typical
/// range.
pub fn cycle_and_soak(
    method: &IrrigationMethodRecord,
    soil: &SoilRecord,
    application_rate_mm_h: Option<f64>,
    plan: &mut IrrigationPlan,
) {
    if plan.volume_l <= 0.0 || plan.gross_mm <= 0.0 {
        return;
    }
    let rate = application_rate_mm_h
        .unwrap_or((method.rate_min_mm_h + method.rate_max_mm_h) / 2.0)
        .max(0.1);
    let intake = soil.infiltration_mm_h.max(0.1);

    if rate <= SINGLE_CYCLE_RATE_FACTOR * intake {
        plan.cycle_count = 1;
        plan.cycle_duration_min = plan.gross_mm / rate * 60.0;
        plan.soak_interval_min = 0.0;
        return;
    }

    let target_rate = CYCLE_TARGET_RATE_FACTOR * intake;
    let cycles = ((rate / target_rate).ceil() as u32).clamp(2, 6);
    let total_min = plan.gross_mm / target_rate * 60.0;
    let duration = (total_min / cycles as f64).clamp(5.0, 60.0);

    let texture_multiplier = match soil.texture {
        SoilTexture::Clay => 4.0,
        SoilTexture::Loam => 3.0,
        SoilTexture::Sand => 2.0,
    };
    plan.cycle_count = cycles;
    plan.cycle_duration_min = duration;
    plan.soak_interval_min = (duration * texture_multiplier).clamp(10.0, 240.0);
}

// ===========================================================================
// Tests
// ===========================================================================
