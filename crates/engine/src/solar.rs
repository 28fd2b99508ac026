//! Sunrise/sunset timing from the NOAA solar position algorithm, and the
//! mapping from a configured watering start ("sunrise+30") to a concrete
//! local time.

use serde::Serialize;
use tracing::warn;

use crate::error::{EngineError, Result};

/// Official sunrise/sunset zenith: 90° plus refraction and solar radius.
const SUNRISE_ZENITH_DEG: f64 = 90.833;
/// Local fallback times when the sun never rises or never sets [min].
const FALLBACK_SUNRISE_MIN: f64 = 6.0 * 60.0;
const FALLBACK_SUNSET_MIN: f64 = 18.0 * 60.0;
/// Largest allowed sunrise/sunset offset for a watering start [min].
const MAX_START_OFFSET_MIN: i32 = 120;

// ---------------------------------------------------------------------------
// NOAA solar times
// ---------------------------------------------------------------------------

/// Solar event times in minutes after local midnight.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct SolarTimes {
    pub sunrise_min: f64,
    pub sunset_min: f64,
    pub solar_noon_min: f64,
    pub day_length_min: f64,
    /// False when the site is in polar day or polar night and the times are
    /// the configured fallbacks.
    pub valid: bool,
}

/// Sunrise, sunset, and solar noon for a site and day of year.
///
/// `tz_offset_hours` is the local offset from UTC, east positive. Polar day
/// and polar night yield fixed fallback times with `valid = false`.
pub fn solar_times(
    latitude_deg: f64,
    longitude_deg: f64,
    day_of_year: u32,
    tz_offset_hours: f64,
) -> Result<SolarTimes> {
    if !(-90.0..=90.0).contains(&latitude_deg) {
        return Err(EngineError::InvalidParameter(format!(
            "latitude {latitude_deg} out of range [-90, 90]"
        )));
    }
    if !(-180.0..=180.0).contains(&longitude_deg) {
        return Err(EngineError::InvalidParameter(format!(
            "longitude {longitude_deg} out of range [-180, 180]"
        )));
    }
    if !(1..=366).contains(&day_of_year) {
        return Err(EngineError::InvalidParameter(format!(
            "day of year {day_of_year} out of range [1, 366]"
        )));
    }

    // Fractional year [rad].
    let g = 2.0 * std::f64::consts::PI / 365.0 * (day_of_year as f64 - 1.0);

    // Equation of time [min] and solar declination [rad], NOAA series.
    let eqtime = 229.18
        * (0.000075 + 0.001868 * g.cos()
            - 0.032077 * g.sin()
            - 0.014615 * (2.0 * g).cos()
            - 0.040849 * (2.0 * g).sin());
    let decl = 0.006918 - 0.399912 * g.cos() + 0.070257 * g.sin() - 0.006758 * (2.0 * g).cos()
        + 0.000907 * (2.0 * g).sin()
        - 0.002697 * (3.0 * g).cos()
        + 0.00148 * (3.0 * g).sin();

    let lat = latitude_deg.to_radians();
    let cos_ha = SUNRISE_ZENITH_DEG.to_radians().cos() / (lat.cos() * decl.cos())
        - lat.tan() * decl.tan();

    let solar_noon_min = 720.0 - 4.0 * longitude_deg - eqtime + 60.0 * tz_offset_hours;

    if cos_ha > 1.0 || cos_ha < -1.0 {
        // Sun never rises (polar night) or never sets (polar day).
        warn!(
            latitude_deg,
            day_of_year, cos_ha, "no sunrise/sunset, using fallback times"
        );
        return Ok(SolarTimes {
            sunrise_min: FALLBACK_SUNRISE_MIN,
            sunset_min: FALLBACK_SUNSET_MIN,
            solar_noon_min: normalize_minutes(solar_noon_min),
            day_length_min: if cos_ha < -1.0 { 1440.0 } else { 0.0 },
            valid: false,
        });
    }

    let ha_min = cos_ha.acos().to_degrees() * 4.0;
    Ok(SolarTimes {
        sunrise_min: normalize_minutes(solar_noon_min - ha_min),
        sunset_min: normalize_minutes(solar_noon_min + ha_min),
        solar_noon_min: normalize_minutes(solar_noon_min),
        day_length_min: 2.0 * ha_min,
        valid: true,
    })
}

fn normalize_minutes(min: f64) -> f64 {
    min.rem_euclid(1440.0)
}

// ---------------------------------------------------------------------------
// Watering start times
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StartTime {
    /// A literal wall-clock time.
    Clock { hour: u8, minute: u8 },
    /// Minutes relative to sunrise (negative = before).
    Sunrise { offset_min: i32 },
    /// Minutes relative to sunset.
    Sunset { offset_min: i32 },
}

/// Parse `"HH:MM"`, `"sunrise"`, `"sunrise+N"`, `"sunset-N"`. Offsets are
/// in minutes.
pub fn parse_start_time(s: &str) -> Option<StartTime> {
    let s = s.trim();

    for (prefix, solar) in [("sunrise", true), ("sunset", false)] {
        if let Some(rest) = s.strip_prefix(prefix) {
            let offset_min = if rest.is_empty() {
                0
            } else {
                let (sign, digits) = match rest.as_bytes()[0] {
                    b'+' => (1, &rest[1..]),
                    b'-' => (-1, &rest[1..]),
                    _ => return None,
                };
                sign * digits.parse::<i32>().ok()?
            };
            return Some(if solar {
                StartTime::Sunrise { offset_min }
            } else {
                StartTime::Sunset { offset_min }
            });
        }
    }

    let (h, m) = s.split_once(':')?;
    let hour: u8 = h.parse().ok()?;
    let minute: u8 = m.parse().ok()?;
    if hour > 23 || minute > 59 {
        return None;
    }
    Some(StartTime::Clock { hour, minute })
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct EffectiveStart {
    pub hour: u8,
    pub minute: u8,
    /// True when the solar times were unavailable and the fallback
    /// sunrise/sunset anchored the start instead.
    pub used_fallback: bool,
}

/// Concrete local start time for one day. Sunrise/sunset offsets are
/// clamped to ±2 h; polar conditions anchor the start to the fallback
/// sunrise/sunset and flag it.
pub fn effective_start_time(
    start: StartTime,
    latitude_deg: f64,
    longitude_deg: f64,
    day_of_year: u32,
    tz_offset_hours: f64,
) -> Result<EffectiveStart> {
    let (anchor_needed, offset_min) = match start {
        StartTime::Clock { hour, minute } => {
            return Ok(EffectiveStart {
                hour,
                minute,
                used_fallback: false,
            });
        }
        StartTime::Sunrise { offset_min } => (true, offset_min),
        StartTime::Sunset { offset_min } => (false, offset_min),
    };

    let clamped = offset_min.clamp(-MAX_START_OFFSET_MIN, MAX_START_OFFSET_MIN);
    if clamped != offset_min {
        warn!(offset_min, clamped, "start offset clamped");
    }

    let times = solar_times(latitude_deg, longitude_deg, day_of_year, tz_offset_hours)?;
    let anchor = if anchor_needed {
        times.sunrise_min
    } else {
        times.sunset_min
    };
    let start_min = normalize_minutes(anchor + clamped as f64);

    Ok(EffectiveStart {
        hour: (start_min / 60.0) as u8,
        minute: (start_min % 60.0) as u8,
        used_fallback: !times.valid,
    })
}

// ===========================================================================
// Tests
// ===========================================================================

#[cfg(test)]
mod tests {
    use super::*;

    // -- NOAA solar times ---------------------------------------------------

    #[test]
    fn equinox_at_greenwich_roughly_six_to_six() {
        // March 20 at 51.5°N, 0°E, UTC.
        let t = solar_times(51.5, 0.0, 79, 0.0).unwrap();
        assert!(t.valid);
        assert!((t.sunrise_min - 360.0).abs() < 20.0, "sunrise {}", t.sunrise_min);
        assert!((t.sunset_min - 1080.0).abs() < 20.0, "sunset {}", t.sunset_min);
        assert!((t.day_length_min - 720.0).abs() < 30.0);
    }

    #[test]
    fn summer_day_longer_than_winter_day() {
        let summer = solar_times(45.0, 9.0, 172, 1.0).unwrap();
        let winter = solar_times(45.0, 9.0, 355, 1.0).unwrap();
        assert!(summer.day_length_min > winter.day_length_min + 120.0);
    }

    #[test]
    fn longitude_shifts_solar_noon() {
        // 15° of longitude is one hour of solar time.
        let east = solar_times(45.0, 15.0, 100, 1.0).unwrap();
        let west = solar_times(45.0, 0.0, 100, 1.0).unwrap();
        assert!((west.solar_noon_min - east.solar_noon_min - 60.0).abs() < 1.0);
    }

    #[test]
    fn polar_night_uses_fallback() {
        // 80°N at winter solstice: sun never rises.
        let t = solar_times(80.0, 0.0, 355, 0.0).unwrap();
        assert!(!t.valid);
        assert_eq!(t.sunrise_min, 360.0);
        assert_eq!(t.sunset_min, 1080.0);
        assert_eq!(t.day_length_min, 0.0);
    }

    #[test]
    fn polar_day_uses_fallback() {
        let t = solar_times(80.0, 0.0, 172, 0.0).unwrap();
        assert!(!t.valid);
        assert_eq!(t.day_length_min, 1440.0);
    }

    #[test]
    fn invalid_inputs_rejected() {
        assert!(matches!(
            solar_times(91.0, 0.0, 100, 0.0),
            Err(EngineError::InvalidParameter(_))
        ));
        assert!(matches!(
            solar_times(45.0, 181.0, 100, 0.0),
            Err(EngineError::InvalidParameter(_))
        ));
        assert!(matches!(
            solar_times(45.0, 0.0, 0, 0.0),
            Err(EngineError::InvalidParameter(_))
        ));
        assert!(matches!(
            solar_times(45.0, 0.0, 367, 0.0),
            Err(EngineError::InvalidParameter(_))
        ));
    }

    #[test]
    fn times_normalized_to_day_range() {
        // Far-west longitude with UTC pushes raw minutes past midnight.
        let t = solar_times(45.0, -170.0, 172, 0.0).unwrap();
        for v in [t.sunrise_min, t.sunset_min, t.solar_noon_min] {
            assert!((0.0..1440.0).contains(&v), "{v}");
        }
    }

    // -- Start time parsing --------------------------------------------------

    #[test]
    fn parse_clock_times() {
        assert_eq!(
            parse_start_time("06:30"),
            Some(StartTime::Clock { hour: 6, minute: 30 })
        );
        assert_eq!(parse_start_time("24:00"), None);
        assert_eq!(parse_start_time("12:60"), None);
        assert_eq!(parse_start_time("noonish"), None);
    }

    #[test]
    fn parse_solar_anchors() {
        assert_eq!(
            parse_start_time("sunrise"),
            Some(StartTime::Sunrise { offset_min: 0 })
        );
        assert_eq!(
            parse_start_time("sunrise+30"),
            Some(StartTime::Sunrise { offset_min: 30 })
        );
        assert_eq!(
            parse_start_time("sunset-45"),
            Some(StartTime::Sunset { offset_min: -45 })
        );
        assert_eq!(parse_start_time("sunrise*30"), None);
    }

    // -- Effective start ------------------------------------------------------

    #[test]
    fn clock_start_passes_through() {
        let s = effective_start_time(
            StartTime::Clock { hour: 5, minute: 45 },
            45.0,
            9.0,
            172,
            1.0,
        )
        .unwrap();
        assert_eq!((s.hour, s.minute), (5, 45));
        assert!(!s.used_fallback);
    }

    #[test]
    fn sunrise_offset_lands_after_sunrise() {
        let t = solar_times(45.0, 9.0, 172, 1.0).unwrap();
        let s = effective_start_time(
            StartTime::Sunrise { offset_min: 30 },
            45.0,
            9.0,
            172,
            1.0,
        )
        .unwrap();
        let start_min = s.hour as f64 * 60.0 + s.minute as f64;
        assert!((start_min - (t.sunrise_min + 30.0)).abs() < 1.0);
    }

    #[test]
    fn oversized_offset_clamped_to_two_hours() {
        let t = solar_times(45.0, 9.0, 172, 1.0).unwrap();
        let s = effective_start_time(
            StartTime::Sunrise { offset_min: 600 },
            45.0,
            9.0,
            172,
            1.0,
        )
        .unwrap();
        let start_min = s.hour as f64 * 60.0 + s.minute as f64;
        assert!((start_min - (t.sunrise_min + 120.0)).abs() < 1.0);
    }

    #[test]
    fn polar_start_flags_fallback() {
        let s = effective_start_time(
            StartTime::Sunrise { offset_min: 0 },
            80.0,
            0.0,
            355,
            0.0,
        )
        .unwrap();
        assert!(s.used_fallback);
        assert_eq!((s.hour, s.minute), (6, 0));
    }

    #[test]
    fn invalid_site_propagates_error() {
        assert!(effective_start_time(
            StartTime::Sunset { offset_min: 0 },
            95.0,
            0.0,
            100,
            0.0
        )
        .is_err());
    }
}
