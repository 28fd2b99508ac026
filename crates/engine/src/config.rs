//! TOML configuration: site location, environmental assumptions, and the
//! per-channel growing setup. Validation reports every violation at once.

use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::collections::HashSet;

use crate::catalog;

// ---------------------------------------------------------------------------
// Config file structures
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
pub struct Config {
    pub site: SiteConfig,
    #[serde(default)]
    pub assumptions: EnvironmentalAssumptions,
    #[serde(default)]
    pub channels: Vec<ChannelConfig>,
    /// Control loop period, seconds.
    #[serde(default = "default_tick_interval")]
    pub tick_interval_sec: u64,
}

fn default_tick_interval() -> u64 {
    300
}

#[derive(Debug, Deserialize)]
pub struct SiteConfig {
    pub latitude_deg: f64,
    pub longitude_deg: f64,
    /// Offset from UTC in hours, east positive.
    pub tz_offset_hours: f64,
}

impl SiteConfig {
    pub fn latitude_rad(&self) -> f64 {
        self.latitude_deg.to_radians()
    }
}

/// Stand-ins for quantities the station does not measure. These feed the
/// Penman-Monteith terms that would otherwise need an anemometer and a
/// pyranometer.
#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(default)]
pub struct EnvironmentalAssumptions {
    /// Wind speed at 2 m [m/s].
    pub wind_speed_m_s: f64,
    /// Actual over potential sunshine hours, (0, 1].
    pub sunshine_ratio: f64,
    /// Canopy reflectance; 0.23 is the FAO-56 reference crop value.
    pub albedo: f64,
    /// Hard ceiling on any computed ET0 [mm/day].
    pub et0_abs_max_mm_day: f64,
}

impl Default for EnvironmentalAssumptions {
    fn default() -> Self {
        Self {
            wind_speed_m_s: 2.0,
            sunshine_ratio: 0.5,
            albedo: 0.23,
            et0_abs_max_mm_day: 15.0,
        }
    }
}

/// Eco trims volumes, quality waters in full, manual never auto-triggers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChannelMode {
    Quality,
    Eco,
    Manual,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ChannelConfig {
    pub id: u32,
    pub name: String,
    pub plant_index: usize,
    pub soil_index: usize,
    pub method_index: usize,
    /// Exactly one of `area_m2` / `plant_count` must be set.
    pub area_m2: Option<f64>,
    pub plant_count: Option<u32>,
    pub mode: ChannelMode,
    /// Per-run volume cap [L]; absent means unlimited.
    pub max_volume_l: Option<f64>,
    #[serde(default = "default_sun_exposure")]
    pub sun_exposure_pct: f64,
    /// Planting date, `YYYY-MM-DD`.
    pub planting_date: String,
    /// Watering start: `"HH:MM"`, `"sunrise+N"`, or `"sunset-N"` (minutes).
    #[serde(default = "default_start_time")]
    pub start_time: String,
}

fn default_sun_exposure() -> f64 {
    100.0
}

fn default_start_time() -> String {
    "sunrise+0".to_string()
}

impl ChannelConfig {
    pub fn is_automatic(&self) -> bool {
        self.mode != ChannelMode::Manual
    }

    pub fn eco_mode(&self) -> bool {
        self.mode == ChannelMode::Eco
    }

    /// Days elapsed since the configured planting date, saturating at zero
    /// for dates in the future.
    pub fn days_after_planting(&self, today: chrono::NaiveDate) -> u32 {
        match chrono::NaiveDate::parse_from_str(&self.planting_date, "%Y-%m-%d") {
            Ok(planted) => (today - planted).num_days().max(0) as u32,
            Err(_) => 0,
        }
    }
}

// ---------------------------------------------------------------------------
// Validation
// ---------------------------------------------------------------------------

impl Config {
    /// Validate all config entries. Returns `Ok(())` or an error describing
    /// every violation found (not just the first one).
    pub fn validate(&self) -> Result<()> {
        let mut errors: Vec<String> = Vec::new();

        self.validate_site(&mut errors);
        self.validate_assumptions(&mut errors);
        self.validate_channels(&mut errors);

        if self.tick_interval_sec == 0 {
            errors.push("tick_interval_sec must be positive".to_string());
        }

        if errors.is_empty() {
            Ok(())
        } else {
            bail!(
                "config validation failed ({} error{}):\n  - {}",
                errors.len(),
                if errors.len() == 1 { "" } else { "s" },
                errors.join("\n  - ")
            );
        }
    }

    fn validate_site(&self, errors: &mut Vec<String>) {
        if !(-90.0..=90.0).contains(&self.site.latitude_deg) {
            errors.push(format!(
                "site: latitude_deg {} out of range [-90, 90]",
                self.site.latitude_deg
            ));
        }
        if !(-180.0..=180.0).contains(&self.site.longitude_deg) {
            errors.push(format!(
                "site: longitude_deg {} out of range [-180, 180]",
                self.site.longitude_deg
            ));
        }
        if !(-12.0..=14.0).contains(&self.site.tz_offset_hours) {
            errors.push(format!(
                "site: tz_offset_hours {} out of range [-12, 14]",
                self.site.tz_offset_hours
            ));
        }
    }

    fn validate_assumptions(&self, errors: &mut Vec<String>) {
        let a = &self.assumptions;
        if !(0.1..=20.0).contains(&a.wind_speed_m_s) {
            errors.push(format!(
                "assumptions: wind_speed_m_s {} out of range [0.1, 20]",
                a.wind_speed_m_s
            ));
        }
        if !(a.sunshine_ratio > 0.0 && a.sunshine_ratio <= 1.0) {
            errors.push(format!(
                "assumptions: sunshine_ratio {} out of range (0, 1]",
                a.sunshine_ratio
            ));
        }
        if !(0.0..1.0).contains(&a.albedo) {
            errors.push(format!(
                "assumptions: albedo {} out of range [0, 1)",
                a.albedo
            ));
        }
        if !(a.et0_abs_max_mm_day > 0.0 && a.et0_abs_max_mm_day <= 20.0) {
            errors.push(format!(
                "assumptions: et0_abs_max_mm_day {} out of range (0, 20]",
                a.et0_abs_max_mm_day
            ));
        }
    }

    fn validate_channels(&self, errors: &mut Vec<String>) {
        let mut seen_ids: HashSet<u32> = HashSet::new();

        for (i, ch) in self.channels.iter().enumerate() {
            let ctx = || {
                if ch.name.is_empty() {
                    format!("channels[{i}]")
                } else {
                    format!("channel '{}'", ch.name)
                }
            };

            // ── Identity ────────────────────────────────────────
            if ch.name.trim().is_empty() {
                errors.push(format!("{}: name is empty", ctx()));
            }
            if !seen_ids.insert(ch.id) {
                errors.push(format!("{}: duplicate channel id {}", ctx(), ch.id));
            }

            // ── Catalog references ──────────────────────────────
            if ch.plant_index >= catalog::plant_count() {
                errors.push(format!(
                    "{}: plant_index {} out of range [0, {})",
                    ctx(),
                    ch.plant_index,
                    catalog::plant_count()
                ));
            }
            if ch.soil_index >= catalog::soil_count() {
                errors.push(format!(
                    "{}: soil_index {} out of range [0, {})",
                    ctx(),
                    ch.soil_index,
                    catalog::soil_count()
                ));
            }
            if ch.method_index >= catalog::method_count() {
                errors.push(format!(
                    "{}: method_index {} out of range [0, {})",
                    ctx(),
                    ch.method_index,
                    catalog::method_count()
                ));
            }

            // ── Coverage: exactly one of area / count ───────────
            match (ch.area_m2, ch.plant_count) {
                (None, None) => {
                    errors.push(format!(
                        "{}: either area_m2 or plant_count must be set",
                        ctx()
                    ));
                }
                (Some(_), Some(_)) => {
                    errors.push(format!(
                        "{}: area_m2 and plant_count are mutually exclusive",
                        ctx()
                    ));
                }
                (Some(a), None) if a <= 0.0 => {
                    errors.push(format!("{}: area_m2 must be positive, got {a}", ctx()));
                }
                (None, Some(0)) => {
                    errors.push(format!("{}: plant_count must be positive", ctx()));
                }
                _ => {}
            }

            // ── Limits and exposure ─────────────────────────────
            if let Some(v) = ch.max_volume_l {
                if v <= 0.0 {
                    errors.push(format!("{}: max_volume_l must be positive, got {v}", ctx()));
                }
            }
            if !(0.0..=100.0).contains(&ch.sun_exposure_pct) {
                errors.push(format!(
                    "{}: sun_exposure_pct {} out of range [0, 100]",
                    ctx(),
                    ch.sun_exposure_pct
                ));
            }

            // ── Dates and times ─────────────────────────────────
            if chrono::NaiveDate::parse_from_str(&ch.planting_date, "%Y-%m-%d").is_err() {
                errors.push(format!(
                    "{}: planting_date '{}' is not a valid YYYY-MM-DD date",
                    ctx(),
                    ch.planting_date
                ));
            }
            if crate::solar::parse_start_time(&ch.start_time).is_none() {
                errors.push(format!(
                    "{}: start_time '{}' is not HH:MM, sunrise±N, or sunset±N",
                    ctx(),
                    ch.start_time
                ));
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Load
// ---------------------------------------------------------------------------

/// Read, parse, and validate a TOML config file.
pub fn load(path: &str) -> Result<Config> {
    let contents =
        std::fs::read_to_string(path).with_context(|| format!("failed to read config: {path}"))?;
    let config: Config =
        toml::from_str(&contents).with_context(|| format!("failed to parse config: {path}"))?;
    config
        .validate()
        .with_context(|| format!("invalid config: {path}"))?;
    Ok(config)
}

// ===========================================================================
// Tests
// ===========================================================================

#[cfg(test)]
mod tests {
    use super::*;

    // -- Helper: build a valid baseline config that passes validation ------

    pub(crate) fn valid_channel() -> ChannelConfig {
        ChannelConfig {
            id: 1,
            name: "tomato bed".into(),
            plant_index: 0,
            soil_index: 2,
            method_index: 0,
            area_m2: Some(10.0),
            plant_count: None,
            mode: ChannelMode::Quality,
            max_volume_l: None,
            sun_exposure_pct: 100.0,
            planting_date: "2026-05-01".into(),
            start_time: "sunrise+30".into(),
        }
    }

    fn valid_config() -> Config {
        Config {
            site: SiteConfig {
                latitude_deg: 45.0,
                longitude_deg: 9.0,
                tz_offset_hours: 1.0,
            },
            assumptions: EnvironmentalAssumptions::default(),
            channels: vec![valid_channel()],
            tick_interval_sec: 300,
        }
    }

    /// Assert validation fails and the error message contains `needle`.
    fn assert_validation_err(cfg: &Config, needle: &str) {
        let err = cfg.validate().unwrap_err();
        let msg = format!("{err:#}");
        assert!(
            msg.contains(needle),
            "expected error containing {needle:?}, got: {msg}"
        );
    }

    // -- Parsing ----------------------------------------------------------

    #[test]
    fn parse_minimal_config() {
        let toml_str = r#"
[site]
latitude_deg = 45.0
longitude_deg = 9.0
tz_offset_hours = 1.0

[[channels]]
id = 1
name = "tomato bed"
plant_index = 0
soil_index = 2
method_index = 0
area_m2 = 10.0
mode = "quality"
planting_date = "2026-05-01"
"#;
        let config: Config = toml::from_str(toml_str).unwrap();
        assert_eq!(config.channels.len(), 1);
        assert_eq!(config.channels[0].name, "tomato bed");
        assert_eq!(config.tick_interval_sec, 300);
        assert_eq!(config.channels[0].start_time, "sunrise+0");
        assert_eq!(config.assumptions.wind_speed_m_s, 2.0);
        config.validate().unwrap();
    }

    #[test]
    fn parse_assumption_overrides() {
        let toml_str = r#"
[site]
latitude_deg = 45.0
longitude_deg = 9.0
tz_offset_hours = 1.0

[assumptions]
wind_speed_m_s = 3.5
albedo = 0.20
"#;
        let config: Config = toml::from_str(toml_str).unwrap();
        assert_eq!(config.assumptions.wind_speed_m_s, 3.5);
        assert_eq!(config.assumptions.albedo, 0.20);
        // Unset fields keep their defaults.
        assert_eq!(config.assumptions.sunshine_ratio, 0.5);
    }

    // -- Validation: valid configs pass -----------------------------------

    #[test]
    fn valid_config_passes() {
        valid_config().validate().unwrap();
    }

    #[test]
    fn no_channels_passes() {
        let mut cfg = valid_config();
        cfg.channels.clear();
        cfg.validate().unwrap();
    }

    // -- Site -------------------------------------------------------------

    #[test]
    fn latitude_out_of_range_rejected() {
        let mut cfg = valid_config();
        cfg.site.latitude_deg = 91.0;
        assert_validation_err(&cfg, "latitude_deg");
    }

    #[test]
    fn longitude_out_of_range_rejected() {
        let mut cfg = valid_config();
        cfg.site.longitude_deg = -200.0;
        assert_validation_err(&cfg, "longitude_deg");
    }

    #[test]
    fn timezone_out_of_range_rejected() {
        let mut cfg = valid_config();
        cfg.site.tz_offset_hours = 15.0;
        assert_validation_err(&cfg, "tz_offset_hours");
    }

    // -- Assumptions -------------------------------------------------------

    #[test]
    fn zero_wind_rejected() {
        let mut cfg = valid_config();
        cfg.assumptions.wind_speed_m_s = 0.0;
        assert_validation_err(&cfg, "wind_speed_m_s");
    }

    #[test]
    fn albedo_of_one_rejected() {
        let mut cfg = valid_config();
        cfg.assumptions.albedo = 1.0;
        assert_validation_err(&cfg, "albedo");
    }

    #[test]
    fn sunshine_ratio_zero_rejected() {
        let mut cfg = valid_config();
        cfg.assumptions.sunshine_ratio = 0.0;
        assert_validation_err(&cfg, "sunshine_ratio");
    }

    // -- Channels ----------------------------------------------------------

    #[test]
    fn empty_name_rejected() {
        let mut cfg = valid_config();
        cfg.channels[0].name = "  ".into();
        assert_validation_err(&cfg, "name is empty");
    }

    #[test]
    fn duplicate_channel_id_rejected() {
        let mut cfg = valid_config();
        cfg.channels.push(valid_channel());
        assert_validation_err(&cfg, "duplicate channel id");
    }

    #[test]
    fn plant_index_out_of_range_rejected() {
        let mut cfg = valid_config();
        cfg.channels[0].plant_index = 999;
        assert_validation_err(&cfg, "plant_index 999 out of range");
    }

    #[test]
    fn soil_index_out_of_range_rejected() {
        let mut cfg = valid_config();
        cfg.channels[0].soil_index = 999;
        assert_validation_err(&cfg, "soil_index 999 out of range");
    }

    #[test]
    fn method_index_out_of_range_rejected() {
        let mut cfg = valid_config();
        cfg.channels[0].method_index = 999;
        assert_validation_err(&cfg, "method_index 999 out of range");
    }

    #[test]
    fn missing_coverage_rejected() {
        let mut cfg = valid_config();
        cfg.channels[0].area_m2 = None;
        cfg.channels[0].plant_count = None;
        assert_validation_err(&cfg, "either area_m2 or plant_count");
    }

    #[test]
    fn both_coverages_rejected() {
        let mut cfg = valid_config();
        cfg.channels[0].plant_count = Some(5);
        assert_validation_err(&cfg, "mutually exclusive");
    }

    #[test]
    fn negative_area_rejected() {
        let mut cfg = valid_config();
        cfg.channels[0].area_m2 = Some(-1.0);
        assert_validation_err(&cfg, "area_m2 must be positive");
    }

    #[test]
    fn zero_plant_count_rejected() {
        let mut cfg = valid_config();
        cfg.channels[0].area_m2 = None;
        cfg.channels[0].plant_count = Some(0);
        assert_validation_err(&cfg, "plant_count must be positive");
    }

    #[test]
    fn negative_volume_limit_rejected() {
        let mut cfg = valid_config();
        cfg.channels[0].max_volume_l = Some(-5.0);
        assert_validation_err(&cfg, "max_volume_l must be positive");
    }

    #[test]
    fn sun_exposure_out_of_range_rejected() {
        let mut cfg = valid_config();
        cfg.channels[0].sun_exposure_pct = 120.0;
        assert_validation_err(&cfg, "sun_exposure_pct");
    }

    #[test]
    fn bad_planting_date_rejected() {
        let mut cfg = valid_config();
        cfg.channels[0].planting_date = "05/01/2026".into();
        assert_validation_err(&cfg, "planting_date");
    }

    #[test]
    fn bad_start_time_rejected() {
        let mut cfg = valid_config();
        cfg.channels[0].start_time = "noonish".into();
        assert_validation_err(&cfg, "start_time");
    }

    // -- Multiple errors reported at once ---------------------------------

    #[test]
    fn multiple_errors_collected() {
        let mut cfg = valid_config();
        cfg.site.latitude_deg = 100.0;
        cfg.channels[0].name = "".into();
        cfg.channels[0].plant_index = 999;
        cfg.channels[0].area_m2 = None;
        let err = cfg.validate().unwrap_err();
        let msg = format!("{err:#}");
        assert!(msg.contains("latitude_deg"), "{msg}");
        assert!(msg.contains("name is empty"), "{msg}");
        assert!(msg.contains("plant_index"), "{msg}");
        assert!(msg.contains("either area_m2 or plant_count"), "{msg}");
    }

    // -- Derived accessors --------------------------------------------------

    #[test]
    fn days_after_planting_counts_forward() {
        let ch = valid_channel();
        let today = chrono::NaiveDate::from_ymd_opt(2026, 5, 31).unwrap();
        assert_eq!(ch.days_after_planting(today), 30);
    }

    #[test]
    fn days_after_planting_future_date_is_zero() {
        let ch = valid_channel();
        let today = chrono::NaiveDate::from_ymd_opt(2026, 4, 1).unwrap();
        assert_eq!(ch.days_after_planting(today), 0);
    }

    #[test]
    fn mode_flags() {
        let mut ch = valid_channel();
        assert!(ch.is_automatic());
        assert!(!ch.eco_mode());
        ch.mode = ChannelMode::Eco;
        assert!(ch.eco_mode());
        ch.mode = ChannelMode::Manual;
        assert!(!ch.is_automatic());
    }
}
