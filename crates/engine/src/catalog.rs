//! Built-in agronomic reference tables: plants, soils, and irrigation
//! methods. Records are read-only; channels reference them by index and all
//! lookups are bounds-checked.

use serde::Serialize;

use crate::error::{EngineError, Result};

// ---------------------------------------------------------------------------
// Plant records
// ---------------------------------------------------------------------------

/// Broad plant category, used by the degraded calculation paths when the
/// full per-species record cannot be consulted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum PlantType {
    Vegetables,
    Herbs,
    Flowers,
    Shrubs,
    Trees,
    Lawn,
    Succulents,
    Other,
}

/// FAO-56 crop parameters for one species.
#[derive(Debug, Clone)]
pub struct PlantRecord {
    pub name: &'static str,
    pub plant_type: PlantType,
    /// Crop coefficients for the initial, mid-season, and end-season stages.
    pub kc_ini: f64,
    pub kc_mid: f64,
    pub kc_end: f64,
    /// Stage lengths in days (initial, development, mid-season, end-season).
    pub stage_days: [u32; 4],
    /// Root depth range, metres.
    pub root_depth_min_m: f64,
    pub root_depth_max_m: f64,
    /// Management allowed depletion fraction of available water.
    pub depletion_fraction: f64,
    /// Upper end of the comfortable temperature band, °C. Heat stress
    /// tightens the depletion fraction above this.
    pub optimal_temp_max_c: f64,
    /// Planting geometry; zero means "not applicable".
    pub row_spacing_m: f64,
    pub plant_spacing_m: f64,
    /// Plants per square metre, used when spacing is not given.
    pub density_per_m2: f64,
    /// Fraction of ground shaded by the canopy at maturity, (0, 1].
    pub canopy_cover: f64,
}

/// Soil hydraulic properties for one texture class.
#[derive(Debug, Clone)]
pub struct SoilRecord {
    pub name: &'static str,
    pub texture: SoilTexture,
    /// Available water capacity, mm of water per metre of soil depth.
    pub awc_mm_per_m: f64,
    /// Basic (steady-state) infiltration rate, mm/h.
    pub infiltration_mm_h: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum SoilTexture {
    Sand,
    Loam,
    Clay,
}

/// Delivery characteristics of one irrigation method.
#[derive(Debug, Clone)]
pub struct IrrigationMethodRecord {
    pub name: &'static str,
    /// Application efficiency, fraction of gross water reaching the root
    /// zone, (0, 1].
    pub efficiency: f64,
    /// Distribution uniformity, (0, 1].
    pub distribution_uniformity: f64,
    /// Fraction of the surface actually wetted, (0, 1]. Localized methods
    /// (drip) wet only part of the root zone.
    pub wetting_fraction: f64,
    /// Typical application rate range, mm/h.
    pub rate_min_mm_h: f64,
    pub rate_max_mm_h: f64,
}

// ---------------------------------------------------------------------------
// Built-in tables
// ---------------------------------------------------------------------------

const PLANTS: &[PlantRecord] = &[
    PlantRecord {
        name: "tomato",
        plant_type: PlantType::Vegetables,
        kc_ini: 0.60,
        kc_mid: 1.15,
        kc_end: 0.80,
        stage_days: [30, 40, 45, 30],
        root_depth_min_m: 0.10,
        root_depth_max_m: 0.70,
        depletion_fraction: 0.40,
        optimal_temp_max_c: 29.0,
        row_spacing_m: 1.0,
        plant_spacing_m: 0.5,
        density_per_m2: 2.0,
        canopy_cover: 0.85,
    },
    PlantRecord {
        name: "lettuce",
        plant_type: PlantType::Vegetables,
        kc_ini: 0.70,
        kc_mid: 1.00,
        kc_end: 0.95,
        stage_days: [20, 30, 15, 10],
        root_depth_min_m: 0.05,
        root_depth_max_m: 0.30,
        depletion_fraction: 0.30,
        optimal_temp_max_c: 24.0,
        row_spacing_m: 0.3,
        plant_spacing_m: 0.25,
        density_per_m2: 13.0,
        canopy_cover: 0.90,
    },
    PlantRecord {
        name: "basil",
        plant_type: PlantType::Herbs,
        kc_ini: 0.60,
        kc_mid: 1.00,
        kc_end: 0.90,
        stage_days: [15, 25, 40, 20],
        root_depth_min_m: 0.05,
        root_depth_max_m: 0.35,
        depletion_fraction: 0.35,
        optimal_temp_max_c: 30.0,
        row_spacing_m: 0.0,
        plant_spacing_m: 0.0,
        density_per_m2: 16.0,
        canopy_cover: 0.70,
    },
    PlantRecord {
        name: "rose",
        plant_type: PlantType::Flowers,
        kc_ini: 0.50,
        kc_mid: 0.95,
        kc_end: 0.80,
        stage_days: [30, 45, 90, 60],
        root_depth_min_m: 0.20,
        root_depth_max_m: 0.60,
        depletion_fraction: 0.45,
        optimal_temp_max_c: 28.0,
        row_spacing_m: 0.8,
        plant_spacing_m: 0.6,
        density_per_m2: 2.0,
        canopy_cover: 0.60,
    },
    PlantRecord {
        name: "boxwood",
        plant_type: PlantType::Shrubs,
        kc_ini: 0.40,
        kc_mid: 0.70,
        kc_end: 0.65,
        stage_days: [60, 90, 120, 95],
        root_depth_min_m: 0.25,
        root_depth_max_m: 0.80,
        depletion_fraction: 0.50,
        optimal_temp_max_c: 30.0,
        row_spacing_m: 0.0,
        plant_spacing_m: 0.0,
        density_per_m2: 1.0,
        canopy_cover: 0.75,
    },
    PlantRecord {
        name: "apple",
        plant_type: PlantType::Trees,
        kc_ini: 0.45,
        kc_mid: 0.95,
        kc_end: 0.70,
        stage_days: [30, 50, 130, 30],
        root_depth_min_m: 0.50,
        root_depth_max_m: 1.50,
        depletion_fraction: 0.50,
        optimal_temp_max_c: 30.0,
        row_spacing_m: 4.0,
        plant_spacing_m: 3.0,
        density_per_m2: 0.08,
        canopy_cover: 0.65,
    },
    PlantRecord {
        name: "cool-season lawn",
        plant_type: PlantType::Lawn,
        kc_ini: 0.90,
        kc_mid: 0.95,
        kc_end: 0.95,
        stage_days: [10, 20, 300, 35],
        root_depth_min_m: 0.10,
        root_depth_max_m: 0.30,
        depletion_fraction: 0.40,
        optimal_temp_max_c: 26.0,
        row_spacing_m: 0.0,
        plant_spacing_m: 0.0,
        density_per_m2: 0.0,
        canopy_cover: 1.0,
    },
    PlantRecord {
        name: "sedum",
        plant_type: PlantType::Succulents,
        kc_ini: 0.25,
        kc_mid: 0.35,
        kc_end: 0.30,
        stage_days: [30, 60, 180, 95],
        root_depth_min_m: 0.05,
        root_depth_max_m: 0.20,
        depletion_fraction: 0.70,
        optimal_temp_max_c: 35.0,
        row_spacing_m: 0.0,
        plant_spacing_m: 0.0,
        density_per_m2: 10.0,
        canopy_cover: 0.50,
    },
];

const SOILS: &[SoilRecord] = &[
    SoilRecord {
        name: "sand",
        texture: SoilTexture::Sand,
        awc_mm_per_m: 70.0,
        infiltration_mm_h: 30.0,
    },
    SoilRecord {
        name: "sandy loam",
        texture: SoilTexture::Sand,
        awc_mm_per_m: 120.0,
        infiltration_mm_h: 20.0,
    },
    SoilRecord {
        name: "loam",
        texture: SoilTexture::Loam,
        awc_mm_per_m: 170.0,
        infiltration_mm_h: 10.0,
    },
    SoilRecord {
        name: "clay loam",
        texture: SoilTexture::Clay,
        awc_mm_per_m: 190.0,
        infiltration_mm_h: 5.0,
    },
    SoilRecord {
        name: "clay",
        texture: SoilTexture::Clay,
        awc_mm_per_m: 200.0,
        infiltration_mm_h: 3.0,
    },
];

const METHODS: &[IrrigationMethodRecord] = &[
    IrrigationMethodRecord {
        name: "drip",
        efficiency: 0.90,
        distribution_uniformity: 0.90,
        wetting_fraction: 0.30,
        rate_min_mm_h: 1.0,
        rate_max_mm_h: 4.0,
    },
    IrrigationMethodRecord {
        name: "micro-sprinkler",
        efficiency: 0.85,
        distribution_uniformity: 0.85,
        wetting_fraction: 0.60,
        rate_min_mm_h: 4.0,
        rate_max_mm_h: 10.0,
    },
    IrrigationMethodRecord {
        name: "sprinkler",
        efficiency: 0.75,
        distribution_uniformity: 0.80,
        wetting_fraction: 1.0,
        rate_min_mm_h: 8.0,
        rate_max_mm_h: 20.0,
    },
    IrrigationMethodRecord {
        name: "hand watering",
        efficiency: 0.80,
        distribution_uniformity: 0.70,
        wetting_fraction: 1.0,
        rate_min_mm_h: 10.0,
        rate_max_mm_h: 40.0,
    },
];

// ---------------------------------------------------------------------------
// Lookups
// ---------------------------------------------------------------------------

pub fn plant_by_index(index: usize) -> Result<&'static PlantRecord> {
    PLANTS
        .get(index)
        .ok_or_else(|| EngineError::InvalidData(format!("plant index {index} out of range")))
}

pub fn soil_by_index(index: usize) -> Result<&'static SoilRecord> {
    SOILS
        .get(index)
        .ok_or_else(|| EngineError::InvalidData(format!("soil index {index} out of range")))
}

pub fn method_by_index(index: usize) -> Result<&'static IrrigationMethodRecord> {
    METHODS
        .get(index)
        .ok_or_else(|| EngineError::InvalidData(format!("method index {index} out of range")))
}

pub fn plant_count() -> usize {
    PLANTS.len()
}

pub fn soil_count() -> usize {
    SOILS.len()
}

pub fn method_count() -> usize {
    METHODS.len()
}

// ===========================================================================
// Tests
// ===========================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plant_lookup_in_range() {
        let p = plant_by_index(0).unwrap();
        assert_eq!(p.name, "tomato");
    }

    #[test]
    fn plant_lookup_out_of_range() {
        let err = plant_by_index(999).unwrap_err();
        assert!(matches!(err, EngineError::InvalidData(_)));
    }

    #[test]
    fn soil_lookup_out_of_range() {
        assert!(soil_by_index(SOILS.len()).is_err());
    }

    #[test]
    fn method_lookup_out_of_range() {
        assert!(method_by_index(METHODS.len()).is_err());
    }

    #[test]
    fn all_plant_records_are_sane() {
        for p in PLANTS {
            assert!(p.kc_ini > 0.0 && p.kc_ini <= 2.0, "{}", p.name);
            assert!(p.kc_mid > 0.0 && p.kc_mid <= 2.0, "{}", p.name);
            assert!(p.kc_end > 0.0 && p.kc_end <= 2.0, "{}", p.name);
            assert!(p.root_depth_max_m >= p.root_depth_min_m, "{}", p.name);
            assert!(
                p.depletion_fraction > 0.0 && p.depletion_fraction < 1.0,
                "{}",
                p.name
            );
            assert!(p.stage_days.iter().sum::<u32>() > 0, "{}", p.name);
            assert!(p.canopy_cover > 0.0 && p.canopy_cover <= 1.0, "{}", p.name);
        }
    }

    #[test]
    fn all_soil_records_are_sane() {
        for s in SOILS {
            assert!(s.awc_mm_per_m > 0.0, "{}", s.name);
            assert!(s.infiltration_mm_h > 0.0, "{}", s.name);
        }
    }

    #[test]
    fn all_method_records_are_sane() {
        for m in METHODS {
            assert!(m.efficiency > 0.0 && m.efficiency <= 1.0, "{}", m.name);
            assert!(
                m.distribution_uniformity > 0.0 && m.distribution_uniformity <= 1.0,
                "{}",
                m.name
            );
            assert!(
                m.wetting_fraction > 0.0 && m.wetting_fraction <= 1.0,
                "{}",
                m.name
            );
            assert!(m.rate_max_mm_h >= m.rate_min_mm_h, "{}", m.name);
        }
    }
}
