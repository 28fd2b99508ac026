//! Engine orchestration: owns the per-channel water-balance states, the
//! calculation cache, and the collaborator seams, and drives one full
//! FAO-56 evaluation per channel per tick.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

use chrono::{Datelike, NaiveDate};
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::balance::{self, WaterBalanceState};
use crate::cache::{BalanceInputs, CacheHealth, CacheStats, CalculationCache, Et0Inputs, KcInputs};
use crate::catalog;
use crate::clock;
use crate::config::{ChannelConfig, Config, EnvironmentalAssumptions, SiteConfig};
use crate::envdata::EnvironmentalSample;
use crate::error::{EngineError, Result};
use crate::et0;
use crate::phenology;
use crate::planner::{self, IrrigationPlan};
use crate::recovery::{self, RecoveryOutcome, RecoveryTier};

/// Computed ET0 below this is treated as a failed estimate and replaced by
/// the monthly climatological default [mm/day].
const ET0_EPSILON: f64 = 0.1;
/// Shade floor: even a fully shaded bed keeps some evaporative demand.
const MIN_EXPOSURE_FACTOR: f64 = 0.2;

// ---------------------------------------------------------------------------
// Collaborator seams
// ---------------------------------------------------------------------------

/// Persists water-balance snapshots. Failures are the implementation's
/// problem; the engine treats persistence as best-effort.
pub trait BalanceStore: Send + Sync {
    fn persist(&self, channel: u32, state: &WaterBalanceState);
}

/// Receives a notification whenever a configured volume cap truncates a run.
pub trait ConstraintLog: Send + Sync {
    fn volume_capped(&self, channel: u32, plan: &IrrigationPlan, limit_l: f64);
}

/// Default store: log the snapshot as structured JSON.
pub struct TracingBalanceStore;

impl BalanceStore for TracingBalanceStore {
    fn persist(&self, channel: u32, state: &WaterBalanceState) {
        match serde_json::to_string(state) {
            Ok(json) => debug!(channel, state = %json, "balance snapshot"),
            Err(e) => warn!(channel, "balance snapshot serialization failed: {e}"),
        }
    }
}

pub struct TracingConstraintLog;

impl ConstraintLog for TracingConstraintLog {
    fn volume_capped(&self, channel: u32, plan: &IrrigationPlan, limit_l: f64) {
        info!(
            channel,
            applied_l = plan.volume_l,
            limit_l,
            "irrigation volume capped"
        );
    }
}

// ---------------------------------------------------------------------------
// Results
// ---------------------------------------------------------------------------

/// Summary of one auto-watering evaluation.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct AutoDecision {
    pub should_water: bool,
    pub volume_liters: f64,
    pub current_deficit_mm: f64,
    pub raw_threshold_mm: f64,
    pub daily_etc_mm: f64,
    pub effective_rain_mm: f64,
    /// Stress-adjusted MAD fraction actually in force.
    pub stress_factor: f64,
}

/// Point-in-time view of one channel for operators.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ChannelDiagnostics {
    pub state: WaterBalanceState,
    pub hours_until_trigger: f64,
    pub days_after_planting: u32,
}

struct Evaluation {
    outcome: RecoveryOutcome,
    state: WaterBalanceState,
    daily_etc_mm: f64,
    effective_rain_mm: f64,
    stress_fraction: f64,
    triggered: bool,
}

// ---------------------------------------------------------------------------
// Engine
// ---------------------------------------------------------------------------

pub struct Engine {
    site: SiteConfig,
    assumptions: EnvironmentalAssumptions,
    channels: HashMap<u32, ChannelConfig>,
    states: Mutex<HashMap<u32, WaterBalanceState>>,
    cache: Mutex<CalculationCache>,
    resource_constrained: AtomicBool,
    store: Box<dyn BalanceStore>,
    constraint_log: Box<dyn ConstraintLog>,
}

impl Engine {
    pub fn new(config: Config) -> Self {
        let channels = config.channels.into_iter().map(|c| (c.id, c)).collect();
        Self {
            site: config.site,
            assumptions: config.assumptions,
            channels,
            states: Mutex::new(HashMap::new()),
            cache: Mutex::new(CalculationCache::new()),
            resource_constrained: AtomicBool::new(false),
            store: Box::new(TracingBalanceStore),
            constraint_log: Box::new(TracingConstraintLog),
        }
    }

    pub fn with_store(mut self, store: Box<dyn BalanceStore>) -> Self {
        self.store = store;
        self
    }

    pub fn with_constraint_log(mut self, log: Box<dyn ConstraintLog>) -> Self {
        self.constraint_log = log;
        self
    }

    pub fn channel_ids(&self) -> Vec<u32> {
        let mut ids: Vec<u32> = self.channels.keys().copied().collect();
        ids.sort_unstable();
        ids
    }

    fn channel(&self, id: u32) -> Result<&ChannelConfig> {
        self.channels
            .get(&id)
            .ok_or_else(|| EngineError::InvalidData(format!("unknown channel {id}")))
    }

    fn states_lock(&self) -> std::sync::MutexGuard<'_, HashMap<u32, WaterBalanceState>> {
        self.states.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn cache_lock(&self) -> std::sync::MutexGuard<'_, CalculationCache> {
        self.cache.lock().unwrap_or_else(|e| e.into_inner())
    }

    // -- Public operations --------------------------------------------------

    /// Full watering requirement for one channel, degraded tiers included.
    pub fn compute_irrigation_requirement(
        &self,
        channel_id: u32,
        env: &EnvironmentalSample,
    ) -> Result<RecoveryOutcome> {
        let now_s = clock::unix_now();
        let today = chrono::Utc::now().date_naive();
        self.compute_requirement_at(channel_id, env, now_s, today)
    }

    /// Requirement at an explicit instant; the entry point the tests use.
    pub fn compute_requirement_at(
        &self,
        channel_id: u32,
        env: &EnvironmentalSample,
        now_s: u64,
        today: NaiveDate,
    ) -> Result<RecoveryOutcome> {
        self.evaluate(channel_id, env, now_s, today)
            .map(|e| e.outcome)
    }

    /// Auto-watering decision: trigger state plus the numbers behind it.
    pub fn compute_auto_decision(
        &self,
        channel_id: u32,
        env: &EnvironmentalSample,
    ) -> Result<AutoDecision> {
        let now_s = clock::unix_now();
        let today = chrono::Utc::now().date_naive();
        self.compute_decision_at(channel_id, env, now_s, today)
    }

    pub fn compute_decision_at(
        &self,
        channel_id: u32,
        env: &EnvironmentalSample,
        now_s: u64,
        today: NaiveDate,
    ) -> Result<AutoDecision> {
        let eval = self.evaluate(channel_id, env, now_s, today)?;
        Ok(AutoDecision {
            should_water: eval.triggered,
            volume_liters: if eval.triggered {
                eval.outcome.plan.volume_l
            } else {
                0.0
            },
            current_deficit_mm: eval.state.deficit_mm,
            raw_threshold_mm: eval.state.raw_mm,
            daily_etc_mm: eval.daily_etc_mm,
            effective_rain_mm: eval.effective_rain_mm,
            stress_factor: eval.stress_fraction,
        })
    }

    /// Record water actually applied, shrinking the deficit.
    pub fn record_irrigation(&self, channel_id: u32, depth_mm: f64) -> Result<()> {
        self.channel(channel_id)?;
        let mut states = self.states_lock();
        if let Some(state) = states.get_mut(&channel_id) {
            state.update(0.0, 0.0, depth_mm.max(0.0));
            self.store.persist(channel_id, state);
        }
        drop(states);
        // The cached balance predates the watering.
        self.cache_lock().invalidate_channel(channel_id);
        Ok(())
    }

    /// Drop the channel's balance state and cached results.
    pub fn reset_channel(&self, channel_id: u32) -> Result<()> {
        self.channel(channel_id)?;
        self.states_lock().remove(&channel_id);
        self.cache_lock().invalidate_channel(channel_id);
        info!(channel = channel_id, "channel state reset");
        Ok(())
    }

    pub fn diagnostics(&self, channel_id: u32, today: NaiveDate) -> Result<ChannelDiagnostics> {
        let cfg = self.channel(channel_id)?;
        let plant = catalog::plant_by_index(cfg.plant_index)?;
        let state = self
            .states_lock()
            .get(&channel_id)
            .copied()
            .unwrap_or_default();
        Ok(ChannelDiagnostics {
            state,
            hours_until_trigger: state
                .hours_until_trigger(et0::DEFAULT_ET0, plant.depletion_fraction),
            days_after_planting: cfg.days_after_planting(today),
        })
    }

    /// Low-memory mode: skip straight to the simplified tier and stop
    /// caching.
    pub fn set_resource_constrained(&self, constrained: bool) {
        self.resource_constrained.store(constrained, Ordering::SeqCst);
        self.cache_lock().set_enabled(!constrained);
        info!(constrained, "resource-constrained mode");
    }

    pub fn is_resource_constrained(&self) -> bool {
        self.resource_constrained.load(Ordering::SeqCst)
    }

    pub fn cache_stats(&self) -> CacheStats {
        self.cache_lock().stats()
    }

    pub fn cache_health_check(&self) -> CacheHealth {
        self.cache_lock().health_check()
    }

    pub fn cache_memory_estimate(&self) -> usize {
        self.cache_lock().memory_estimate_bytes()
    }

    /// Drop cached results older than `max_age_s`.
    pub fn sweep_cache(&self, max_age_s: u64) {
        self.cache_lock()
            .invalidate_older_than(max_age_s, clock::unix_now());
    }

    // -- Evaluation ----------------------------------------------------------

    fn evaluate(
        &self,
        channel_id: u32,
        env: &EnvironmentalSample,
        now_s: u64,
        today: NaiveDate,
    ) -> Result<Evaluation> {
        let cfg = self.channel(channel_id)?;
        if !cfg.is_automatic() {
            return Err(EngineError::ConfigurationError(format!(
                "channel {channel_id} is in manual mode"
            )));
        }

        let env = env.sanitized();
        let day_of_year = today.ordinal();

        if self.is_resource_constrained() {
            let outcome = match recovery::simplified_requirement(cfg, &env, day_of_year, today) {
                Ok(plan) => RecoveryOutcome {
                    tier: RecoveryTier::Simplified,
                    plan,
                    recommend_manual: false,
                },
                Err(e) => recovery::recover(cfg, &env, day_of_year, today, &e),
            };
            return Ok(Evaluation {
                triggered: outcome.plan.volume_l > 0.0,
                state: WaterBalanceState::default(),
                daily_etc_mm: 0.0,
                effective_rain_mm: 0.0,
                stress_fraction: 0.0,
                outcome,
            });
        }

        match self.full_evaluation(cfg, &env, now_s, today) {
            Ok(eval) => Ok(eval),
            Err(e) => {
                let outcome = recovery::recover(cfg, &env, day_of_year, today, &e);
                Ok(Evaluation {
                    triggered: outcome.plan.volume_l > 0.0,
                    state: self
                        .states_lock()
                        .get(&channel_id)
                        .copied()
                        .unwrap_or_default(),
                    daily_etc_mm: 0.0,
                    effective_rain_mm: 0.0,
                    stress_fraction: 0.0,
                    outcome,
                })
            }
        }
    }

    fn full_evaluation(
        &self,
        cfg: &ChannelConfig,
        env: &EnvironmentalSample,
        now_s: u64,
        today: NaiveDate,
    ) -> Result<Evaluation> {
        let plant = catalog::plant_by_index(cfg.plant_index)?;
        let soil = catalog::soil_by_index(cfg.soil_index)?;
        let method = catalog::method_by_index(cfg.method_index)?;

        let latitude_rad = self.site.latitude_rad();
        let day_of_year = today.ordinal();
        let dap = cfg.days_after_planting(today);

        // ── Crop coefficient and root depth (cached per plant/day) ──
        let kc_inputs = KcInputs {
            plant_index: cfg.plant_index,
            days_after_planting: dap,
        };
        let (kc, root_depth_m) = {
            let mut cache = self.cache_lock();
            match cache.get_kc(cfg.id, &kc_inputs, now_s) {
                Some(pair) => pair,
                None => {
                    let kc = phenology::crop_coefficient(plant, dap);
                    let depth = phenology::root_depth(plant, dap);
                    cache.store_kc(cfg.id, kc_inputs, kc, depth, now_s);
                    (kc, depth)
                }
            }
        };

        // ── Reference ET (cached while inputs stay in tolerance) ──
        let et0_inputs = Et0Inputs {
            temp_min_c: env.temp_min_c,
            temp_max_c: env.temp_max_c,
            humidity_pct: env.humidity_pct,
            pressure_hpa: env.pressure_hpa,
            latitude_rad,
            day_of_year,
        };
        let et0_mm = {
            let mut cache = self.cache_lock();
            match cache.get_et0(cfg.id, &et0_inputs, now_s) {
                Some(v) => v,
                None => {
                    let mut v =
                        et0::penman_monteith(env, latitude_rad, day_of_year, &self.assumptions);
                    if v < ET0_EPSILON {
                        v = et0::default_et0_for_month(today.month());
                        debug!(channel = cfg.id, et0 = v, "using monthly default ET0");
                    }
                    cache.store_et0(cfg.id, et0_inputs, v, now_s);
                    v
                }
            }
        };

        // ── Water balance ──
        let balance_inputs = BalanceInputs {
            plant_index: cfg.plant_index,
            soil_index: cfg.soil_index,
            method_index: cfg.method_index,
            root_depth_m,
        };
        let mut state = {
            let cached = self.cache_lock().get_balance(cfg.id, &balance_inputs, now_s);
            match cached {
                Some(s) => s,
                None => self
                    .states_lock()
                    .get(&cfg.id)
                    .copied()
                    .unwrap_or(WaterBalanceState {
                        updated_at_s: now_s,
                        ..WaterBalanceState::default()
                    }),
            }
        };

        let root_zone_awc = soil.awc_mm_per_m * root_depth_m;
        state.root_zone_awc_mm = root_zone_awc;
        state.rescale_for_capacity(root_zone_awc * method.wetting_fraction);

        let stress_fraction =
            balance::stress_adjusted_depletion(plant.depletion_fraction, env, plant);
        state.raw_mm = state.wetted_awc_mm * stress_fraction;

        // Shade reduces demand; a fully shaded bed still transpires some.
        let exposure = (cfg.sun_exposure_pct / 100.0).clamp(MIN_EXPOSURE_FACTOR, 1.0);
        let daily_etc_mm = et0_mm * kc * exposure;

        // Antecedent moisture drives the runoff estimate.
        let moisture = if state.wetted_awc_mm > 0.0 {
            (1.0 - state.deficit_mm / state.wetted_awc_mm).clamp(0.0, 1.0)
        } else {
            0.5
        };
        let effective_rain_mm =
            balance::effective_precipitation(env.rain_24h_mm, soil, moisture, env.temp_mean_c);

        // The rain gauge reports a rolling 24-hour total; only credit growth
        // since the last tick, and restart the credit when the window drops.
        let rain_credit = if effective_rain_mm >= state.effective_rain_mm {
            effective_rain_mm - state.effective_rain_mm
        } else {
            effective_rain_mm
        };

        let dt_days = now_s.saturating_sub(state.updated_at_s) as f64 / 86_400.0;
        state.update(daily_etc_mm * dt_days, rain_credit, 0.0);
        state.effective_rain_mm = effective_rain_mm;
        state.updated_at_s = now_s;

        let triggered = state.mad_trigger(stress_fraction);
        state.irrigation_needed = triggered;

        // ── Volume and cycles ──
        let mut plan = match (cfg.area_m2, cfg.plant_count) {
            (Some(area), _) => {
                planner::volume_for_area(&state, method, area, cfg.eco_mode(), cfg.max_volume_l)
            }
            (None, Some(count)) => planner::volume_for_plants(
                &state,
                method,
                plant,
                count,
                cfg.eco_mode(),
                cfg.max_volume_l,
            ),
            (None, None) => {
                return Err(EngineError::ConfigurationError(format!(
                    "channel {} has no usable coverage",
                    cfg.id
                )))
            }
        };
        planner::cycle_and_soak(method, soil, None, &mut plan);

        if plan.volume_limited {
            if let Some(limit) = cfg.max_volume_l {
                self.constraint_log.volume_capped(cfg.id, &plan, limit);
            }
        }

        // ── Publish state ──
        self.cache_lock()
            .store_balance(cfg.id, balance_inputs, state, now_s);
        self.states_lock().insert(cfg.id, state);
        self.store.persist(cfg.id, &state);

        debug!(
            channel = cfg.id,
            et0 = et0_mm,
            kc,
            deficit = state.deficit_mm,
            raw = state.raw_mm,
            triggered,
            volume_l = plan.volume_l,
            "channel evaluated"
        );

        Ok(Evaluation {
            outcome: RecoveryOutcome::full(plan),
            state,
            daily_etc_mm,
            effective_rain_mm,
            stress_fraction,
            triggered,
        })
    }
}

// ===========================================================================
// Tests
// ===========================================================================
