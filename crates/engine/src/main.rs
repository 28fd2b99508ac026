mod balance;
mod cache;
mod catalog;
mod clock;
mod config;
mod engine;
mod envdata;
mod error;
mod et0;
mod phenology;
mod planner;
mod recovery;
mod solar;

use anyhow::{Context, Result};
use std::{env, time::Duration};
use tokio::time::interval;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use engine::Engine;
use envdata::EnvironmentalSample;

/// Stale cache entries older than this get swept each tick [s].
const CACHE_SWEEP_AGE_S: u64 = 3600;

/// Latest environmental sample, written by whatever feeds the engine
/// (weather station poller, home-automation bridge). Missing or bad data
/// falls back to the built-in plausible defaults.
fn read_environment(path: &str) -> EnvironmentalSample {
    match std::fs::read_to_string(path) {
        Ok(raw) => match serde_json::from_str::<EnvironmentalSample>(&raw) {
            Ok(sample) => sample.sanitized(),
            Err(e) => {
                warn!(path, "bad environment json: {e}, using defaults");
                EnvironmentalSample::default()
            }
        },
        Err(e) => {
            warn!(path, "environment file unreadable: {e}, using defaults");
            EnvironmentalSample::default()
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    // ── Env config ──────────────────────────────────────────────────
    let config_path = env::var("CONFIG_PATH").unwrap_or_else(|_| "config.toml".to_string());
    let env_path = env::var("ENV_DATA_PATH").unwrap_or_else(|_| "environment.json".to_string());

    let cfg = config::load(&config_path)
        .with_context(|| format!("loading config from {config_path}"))?;

    let site = (cfg.site.latitude_deg, cfg.site.longitude_deg, cfg.site.tz_offset_hours);
    let tick_secs = cfg.tick_interval_sec;
    let start_times: Vec<(u32, String)> = cfg
        .channels
        .iter()
        .map(|c| (c.id, c.start_time.clone()))
        .collect();

    let engine = Engine::new(cfg);
    info!(
        channels = engine.channel_ids().len(),
        tick_secs,
        "irrigation engine started"
    );

    // ── Control loop ────────────────────────────────────────────────
    let mut ticker = interval(Duration::from_secs(tick_secs));
    loop {
        ticker.tick().await;

        let sample = read_environment(&env_path);
        let day_of_year = clock::day_of_year();

        for id in engine.channel_ids() {
            match engine.compute_auto_decision(id, &sample) {
                Ok(decision) => {
                    info!(
                        channel = id,
                        should_water = decision.should_water,
                        deficit_mm = decision.current_deficit_mm,
                        raw_mm = decision.raw_threshold_mm,
                        etc_mm = decision.daily_etc_mm,
                        "channel tick"
                    );
                    if decision.should_water {
                        let start = start_times
                            .iter()
                            .find(|(cid, _)| *cid == id)
                            .and_then(|(_, s)| solar::parse_start_time(s));
                        match start {
                            Some(st) => {
                                match solar::effective_start_time(
                                    st, site.0, site.1, day_of_year, site.2,
                                ) {
                                    Ok(at) => info!(
                                        channel = id,
                                        volume_l = decision.volume_liters,
                                        start = %format!("{:02}:{:02}", at.hour, at.minute),
                                        fallback = at.used_fallback,
                                        "watering planned"
                                    ),
                                    Err(e) => warn!(channel = id, "start time failed: {e}"),
                                }
                            }
                            None => warn!(channel = id, "unparseable start time"),
                        }
                    }
                }
                Err(e) => warn!(channel = id, "evaluation failed: {e}"),
            }
        }

        engine_maintenance(&engine);
    }
}

/// Sweep stale cache entries and log cache health once per tick.
fn engine_maintenance(engine: &Engine) {
    engine.sweep_cache(CACHE_SWEEP_AGE_S);
    let stats = engine.cache_stats();
    if stats.enabled {
        let health = engine.cache_health_check();
        info!(
            hits = stats.hits,
            misses = stats.misses,
            entries = stats.entries,
            memory_bytes = engine.cache_memory_estimate(),
            ?health,
            "cache status"
        );
    }
}
