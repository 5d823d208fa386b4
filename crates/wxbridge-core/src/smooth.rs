use serde::{Deserialize, Serialize};

use crate::combine::TargetWeather;
use crate::metar::{CloudCover, CloudLayer, WindDir};
use crate::sim::AircraftState;
use crate::stations::Scope;

pub const METERS_PER_NM: f64 = 1852.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransitionMode {
    StepLimited,
    TimeBased,
}

fn default_transition_mode() -> TransitionMode {
    TransitionMode::TimeBased
}
fn default_transition_interval() -> f64 {
    30.0
}
fn default_max_wind_dir_change() -> f64 {
    10.0
}
fn default_max_wind_speed_change() -> f64 {
    5.0
}
fn default_max_qnh_change() -> f64 {
    1.0
}
fn default_max_visibility_change() -> f64 {
    1.0
}
fn default_wind_dir_step() -> f64 {
    5.0
}
fn default_wind_speed_step() -> f64 {
    2.0
}
fn default_qnh_step() -> f64 {
    0.5
}
fn default_visibility_step_m() -> f64 {
    800.0
}
fn default_cloud_change_threshold() -> f64 {
    1000.0
}
fn default_approach_freeze_alt() -> f64 {
    1000.0
}
fn default_big_change_wind_deg() -> f64 {
    30.0
}
fn default_big_change_wind_speed() -> f64 {
    10.0
}
fn default_big_change_qnh() -> f64 {
    5.0
}
fn default_big_change_visibility() -> f64 {
    5.0
}

/// Knobs for the transition state machine. Step-limited mode caps movement
/// per tick; time-based mode releases `*_step_*` deltas once per
/// `transition_interval_seconds` of accumulated elapsed time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SmoothingConfig {
    #[serde(default = "default_transition_mode")]
    pub transition_mode: TransitionMode,
    #[serde(default = "default_transition_interval")]
    pub transition_interval_seconds: f64,
    #[serde(default = "default_max_wind_dir_change")]
    pub max_wind_dir_change_deg: f64,
    #[serde(default = "default_max_wind_speed_change")]
    pub max_wind_speed_change_kt: f64,
    #[serde(default = "default_max_qnh_change")]
    pub max_qnh_change_hpa: f64,
    #[serde(default = "default_max_visibility_change")]
    pub max_visibility_change: f64,
    #[serde(default = "default_wind_dir_step")]
    pub wind_dir_step_deg: f64,
    #[serde(default = "default_wind_speed_step")]
    pub wind_speed_step_kt: f64,
    #[serde(default = "default_qnh_step")]
    pub qnh_step_hpa: f64,
    #[serde(default = "default_visibility_step_m")]
    pub visibility_step_m: f64,
    #[serde(default = "default_cloud_change_threshold")]
    pub cloud_change_threshold: f64,
    /// Compared directly to the altitude the aircraft-state source supplies
    /// (AGL or MSL is the source's business).
    #[serde(default = "default_approach_freeze_alt")]
    pub approach_freeze_alt_ft: f64,
    #[serde(default = "default_big_change_wind_deg")]
    pub big_change_wind_deg: f64,
    #[serde(default = "default_big_change_wind_speed")]
    pub big_change_wind_speed_kt: f64,
    #[serde(default = "default_big_change_qnh")]
    pub big_change_qnh_hpa: f64,
    #[serde(default = "default_big_change_visibility")]
    pub big_change_visibility_sm: f64,
}

impl Default for SmoothingConfig {
    fn default() -> Self {
        Self {
            transition_mode: default_transition_mode(),
            transition_interval_seconds: default_transition_interval(),
            max_wind_dir_change_deg: default_max_wind_dir_change(),
            max_wind_speed_change_kt: default_max_wind_speed_change(),
            max_qnh_change_hpa: default_max_qnh_change(),
            max_visibility_change: default_max_visibility_change(),
            wind_dir_step_deg: default_wind_dir_step(),
            wind_speed_step_kt: default_wind_speed_step(),
            qnh_step_hpa: default_qnh_step(),
            visibility_step_m: default_visibility_step_m(),
            cloud_change_threshold: default_cloud_change_threshold(),
            approach_freeze_alt_ft: default_approach_freeze_alt(),
            big_change_wind_deg: default_big_change_wind_deg(),
            big_change_wind_speed_kt: default_big_change_wind_speed(),
            big_change_qnh_hpa: default_big_change_qnh(),
            big_change_visibility_sm: default_big_change_visibility(),
        }
    }
}

/// The smoothed state actually injected into the simulator. Mutated only by
/// `Smoother::tick`; one instance per scope.
#[derive(Debug, Clone, PartialEq)]
pub struct CurrentWeather {
    pub scope: Scope,
    pub wind_dir_deg: Option<f64>,
    pub wind_variable: bool,
    pub wind_speed_kt: Option<f64>,
    pub wind_gust_kt: Option<f64>,
    pub visibility_sm: Option<f64>,
    pub temperature_c: Option<i16>,
    pub dewpoint_c: Option<i16>,
    pub qnh_hpa: Option<f64>,
    pub clouds: Option<Vec<CloudLayer>>,
    pub weather: Option<Vec<String>>,
}

impl CurrentWeather {
    fn from_target(target: &TargetWeather) -> Self {
        Self {
            scope: target.scope.clone(),
            wind_dir_deg: match target.wind_dir {
                Some(WindDir::Degrees(d)) => Some(f64::from(d)),
                _ => None,
            },
            wind_variable: matches!(target.wind_dir, Some(WindDir::Variable)),
            wind_speed_kt: target.wind_speed_kt,
            wind_gust_kt: target.wind_gust_kt,
            visibility_sm: target.visibility_sm,
            temperature_c: target.temperature_c,
            dewpoint_c: target.dewpoint_c,
            qnh_hpa: target.qnh_hpa,
            clouds: target.clouds.clone(),
            weather: target.weather.clone(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeClass {
    Normal,
    Big,
    VeryBig,
}

impl ChangeClass {
    pub fn multiplier(self) -> f64 {
        match self {
            ChangeClass::Normal => 1.0,
            ChangeClass::Big => 10.0,
            ChangeClass::VeryBig => 50.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TickResult {
    pub changed: bool,
    pub frozen: bool,
    pub multiplier: f64,
}

/// Signed shortest-arc distance from `from` to `to`, in (-180, 180].
fn shortest_arc(from: f64, to: f64) -> f64 {
    let d = (to - from + 540.0).rem_euclid(360.0) - 180.0;
    if d == -180.0 {
        180.0
    } else {
        d
    }
}

fn step_toward(current: f64, target: f64, limit: f64) -> f64 {
    let diff = target - current;
    if diff.abs() <= limit {
        target
    } else {
        current + limit * diff.signum()
    }
}

fn step_angle(current: f64, target: f64, limit: f64) -> f64 {
    let diff = shortest_arc(current, target);
    if diff.abs() <= limit {
        target.rem_euclid(360.0)
    } else {
        (current + limit * diff.signum()).rem_euclid(360.0)
    }
}

fn has_overcast(clouds: Option<&[CloudLayer]>) -> bool {
    clouds
        .map(|layers| layers.iter().any(|l| l.cover == CloudCover::Overcast))
        .unwrap_or(false)
}

fn is_clear(clouds: Option<&[CloudLayer]>) -> bool {
    clouds.map(|layers| layers.is_empty()).unwrap_or(false)
}

/// Per-scope smoothing state machine: holds the injected weather, advances
/// it toward each tick's target under the configured limits, freezes on
/// approach, and accelerates through big changes.
pub struct Smoother {
    current: Option<CurrentWeather>,
    frozen: bool,
    carry_secs: f64,
}

impl Default for Smoother {
    fn default() -> Self {
        Self::new()
    }
}

impl Smoother {
    pub fn new() -> Self {
        Self {
            current: None,
            frozen: false,
            carry_secs: 0.0,
        }
    }

    pub fn current(&self) -> Option<&CurrentWeather> {
        self.current.as_ref()
    }

    pub fn is_frozen(&self) -> bool {
        self.frozen
    }

    /// Classifies the target-vs-current delta. Any single predicate makes the
    /// change big; big plus a drastic wind or visibility swing makes it very
    /// big.
    fn classify(&self, target: &TargetWeather, cfg: &SmoothingConfig) -> ChangeClass {
        let Some(current) = self.current.as_ref() else {
            return ChangeClass::Normal;
        };

        let dir_delta = match (current.wind_dir_deg, target.wind_dir) {
            (Some(c), Some(WindDir::Degrees(t))) => shortest_arc(c, f64::from(t)).abs(),
            _ => 0.0,
        };
        let speed_delta = match (current.wind_speed_kt, target.wind_speed_kt) {
            (Some(c), Some(t)) => (t - c).abs(),
            _ => 0.0,
        };
        let qnh_delta = match (current.qnh_hpa, target.qnh_hpa) {
            (Some(c), Some(t)) => (t - c).abs(),
            _ => 0.0,
        };
        let (vis_delta, vis_crosses) = match (current.visibility_sm, target.visibility_sm) {
            (Some(c), Some(t)) => (
                (t - c).abs(),
                (c < cfg.big_change_visibility_sm) != (t < cfg.big_change_visibility_sm),
            ),
            _ => (0.0, false),
        };
        let sky_flips = match &target.clouds {
            Some(t) => {
                let cur = current.clouds.as_deref();
                (is_clear(cur) && t.iter().any(|l| l.cover == CloudCover::Overcast))
                    || (has_overcast(cur) && t.is_empty())
            }
            None => false,
        };

        let big = dir_delta > cfg.big_change_wind_deg
            || speed_delta > cfg.big_change_wind_speed_kt
            || qnh_delta > cfg.big_change_qnh_hpa
            || vis_delta > cfg.big_change_visibility_sm
            || vis_crosses
            || sky_flips;
        if !big {
            ChangeClass::Normal
        } else if speed_delta > 20.0 || vis_delta > 10.0 {
            ChangeClass::VeryBig
        } else {
            ChangeClass::Big
        }
    }

    pub fn tick(
        &mut self,
        target: &TargetWeather,
        aircraft: &AircraftState,
        cfg: &SmoothingConfig,
        elapsed_secs: f64,
    ) -> TickResult {
        self.frozen = aircraft.altitude_ft <= cfg.approach_freeze_alt_ft && !aircraft.on_ground;

        // first sample: copy the target verbatim, bypassing every limit
        if self.current.is_none() {
            self.current = Some(CurrentWeather::from_target(target));
            self.carry_secs = 0.0;
            return TickResult {
                changed: true,
                frozen: self.frozen,
                multiplier: 1.0,
            };
        }

        let class = self.classify(target, cfg);
        if self.frozen && class == ChangeClass::Normal {
            // elapsed time is not banked while frozen, so thawing does not
            // release a burst of accumulated steps
            return TickResult {
                changed: false,
                frozen: true,
                multiplier: class.multiplier(),
            };
        }

        let mult = class.multiplier();
        let steps = match cfg.transition_mode {
            TransitionMode::StepLimited => 1.0,
            TransitionMode::TimeBased => {
                self.carry_secs += elapsed_secs.max(0.0);
                let interval = cfg.transition_interval_seconds.max(f64::EPSILON);
                let whole = (self.carry_secs / interval).floor();
                self.carry_secs -= whole * interval;
                whole
            }
        };

        let (dir_limit, speed_limit, qnh_limit, vis_limit) = match cfg.transition_mode {
            TransitionMode::StepLimited => (
                cfg.max_wind_dir_change_deg * mult,
                cfg.max_wind_speed_change_kt * mult,
                cfg.max_qnh_change_hpa * mult,
                cfg.max_visibility_change * mult,
            ),
            TransitionMode::TimeBased => (
                cfg.wind_dir_step_deg * steps * mult,
                cfg.wind_speed_step_kt * steps * mult,
                cfg.qnh_step_hpa * steps * mult,
                cfg.visibility_step_m / METERS_PER_NM * steps * mult,
            ),
        };

        let Some(current) = self.current.as_mut() else {
            return TickResult {
                changed: false,
                frozen: self.frozen,
                multiplier: mult,
            };
        };
        let before = current.clone();

        // wind direction: shortest arc, wrap at north
        match target.wind_dir {
            Some(WindDir::Degrees(t)) => {
                let t = f64::from(t);
                current.wind_variable = false;
                current.wind_dir_deg = Some(match current.wind_dir_deg {
                    Some(c) => step_angle(c, t, dir_limit),
                    None => t,
                });
            }
            Some(WindDir::Variable) => {
                current.wind_variable = true;
                current.wind_dir_deg = None;
            }
            None => {}
        }

        // wind speed and gust, linear; a gust never survives at or below the
        // sustained speed
        if let Some(t) = target.wind_speed_kt {
            let c = current.wind_speed_kt.unwrap_or(t);
            current.wind_speed_kt = Some(step_toward(c, t, speed_limit));
        }
        let speed_now = current.wind_speed_kt;
        let gust_target = target.wind_gust_kt.or(target.wind_speed_kt);
        if let Some(tg) = gust_target {
            let start = current.wind_gust_kt.or(speed_now);
            if let Some(start) = start {
                let g = step_toward(start, tg, speed_limit);
                current.wind_gust_kt = match speed_now {
                    Some(s) if g <= s => None,
                    _ => Some(g),
                };
            }
        }

        if let Some(t) = target.qnh_hpa {
            let c = current.qnh_hpa.unwrap_or(t);
            current.qnh_hpa = Some(step_toward(c, t, qnh_limit));
        }

        if let Some(t) = target.visibility_sm {
            let c = current.visibility_sm.unwrap_or(t);
            current.visibility_sm = Some(step_toward(c, t, vis_limit));
        }

        // temperature and dewpoint jump; token sets swap atomically
        if target.temperature_c.is_some() {
            current.temperature_c = target.temperature_c;
        }
        if target.dewpoint_c.is_some() {
            current.dewpoint_c = target.dewpoint_c;
        }
        if let Some(weather) = &target.weather {
            if current.weather.as_ref() != Some(weather) {
                current.weather = Some(weather.clone());
            }
        }

        smooth_clouds(
            &mut current.clouds,
            target.clouds.as_deref(),
            cfg.cloud_change_threshold,
            cfg.cloud_change_threshold * mult,
        );

        let changed = *current != before;
        TickResult {
            changed,
            frozen: self.frozen,
            multiplier: mult,
        }
    }
}

/// Threshold-based cloud transition: target layers pair with the nearest
/// current layer within `threshold_ft` (base interpolates at `rate_ft` per
/// tick, coverage snaps), unpaired target layers appear, unpaired current
/// layers disappear.
fn smooth_clouds(
    current: &mut Option<Vec<CloudLayer>>,
    target: Option<&[CloudLayer]>,
    threshold_ft: f64,
    rate_ft: f64,
) {
    let Some(target_layers) = target else {
        return;
    };
    let existing = current.take().unwrap_or_default();
    let mut used = vec![false; existing.len()];
    let mut next: Vec<CloudLayer> = Vec::with_capacity(target_layers.len());

    for t in target_layers {
        let mut best: Option<(usize, f64)> = None;
        for (i, c) in existing.iter().enumerate() {
            if used[i] {
                continue;
            }
            let diff = (f64::from(c.base_ft) - f64::from(t.base_ft)).abs();
            if diff <= threshold_ft && best.map_or(true, |(_, d)| diff < d) {
                best = Some((i, diff));
            }
        }
        match best {
            Some((i, _)) => {
                used[i] = true;
                let base = step_toward(f64::from(existing[i].base_ft), f64::from(t.base_ft), rate_ft);
                next.push(CloudLayer {
                    cover: t.cover,
                    base_ft: base.round().max(0.0) as u32,
                });
            }
            None => next.push(*t),
        }
    }

    next.sort_by_key(|l| l.base_ft);
    *current = Some(next);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::combine::Provenance;

    fn airborne(altitude_ft: f64) -> AircraftState {
        AircraftState {
            lat: 42.0,
            lon: -71.0,
            altitude_ft,
            ground_speed_kt: 120.0,
            heading_deg: 270.0,
            on_ground: false,
        }
    }

    fn target(scope: &str) -> TargetWeather {
        TargetWeather {
            scope: Scope::Station(scope.into()),
            provenance: Provenance::MetarOnly,
            wind_dir: Some(WindDir::Degrees(240)),
            wind_speed_kt: Some(15.0),
            wind_gust_kt: None,
            visibility_sm: Some(10.0),
            temperature_c: Some(12),
            dewpoint_c: Some(8),
            qnh_hpa: Some(1015.0),
            clouds: Some(vec![CloudLayer {
                cover: CloudCover::Overcast,
                base_ft: 3000,
            }]),
            weather: Some(Vec::new()),
        }
    }

    fn step_cfg() -> SmoothingConfig {
        SmoothingConfig {
            transition_mode: TransitionMode::StepLimited,
            ..SmoothingConfig::default()
        }
    }

    #[test]
    fn test_first_tick_copies_target_verbatim() {
        let mut smoother = Smoother::new();
        let t = target("KBOS");
        let result = smoother.tick(&t, &airborne(5000.0), &step_cfg(), 1.0);
        assert!(result.changed);
        let c = smoother.current().unwrap();
        assert_eq!(c.wind_dir_deg, Some(240.0));
        assert_eq!(c.wind_speed_kt, Some(15.0));
        assert_eq!(c.qnh_hpa, Some(1015.0));
        assert_eq!(c.clouds.as_ref().unwrap()[0].base_ft, 3000);
    }

    #[test]
    fn test_converges_then_reports_unchanged() {
        let mut smoother = Smoother::new();
        let mut t = target("KBOS");
        smoother.tick(&t, &airborne(5000.0), &step_cfg(), 1.0);
        t.wind_speed_kt = Some(24.0);
        let cfg = step_cfg();
        let mut ticks = 0;
        loop {
            let result = smoother.tick(&t, &airborne(5000.0), &cfg, 1.0);
            ticks += 1;
            if !result.changed {
                break;
            }
            assert!(ticks < 20, "did not converge");
        }
        assert_eq!(smoother.current().unwrap().wind_speed_kt, Some(24.0));
    }

    #[test]
    fn test_no_overshoot_on_scalar_fields() {
        let mut smoother = Smoother::new();
        let mut t = target("KBOS");
        smoother.tick(&t, &airborne(5000.0), &step_cfg(), 1.0);
        t.wind_speed_kt = Some(17.0);
        t.qnh_hpa = Some(1015.4);
        let cfg = step_cfg();
        smoother.tick(&t, &airborne(5000.0), &cfg, 1.0);
        let c = smoother.current().unwrap();
        // both within one step of the target: landed exactly, no overshoot
        assert_eq!(c.wind_speed_kt, Some(17.0));
        assert_eq!(c.qnh_hpa, Some(1015.4));
    }

    #[test]
    fn test_time_based_wind_speed_ramp() {
        let mut smoother = Smoother::new();
        let mut t = target("KBOS");
        t.wind_speed_kt = Some(10.0);
        // big-change acceleration disabled so the bare ramp is observable
        let mut cfg = SmoothingConfig::default();
        cfg.big_change_wind_speed_kt = 100.0;
        smoother.tick(&t, &airborne(5000.0), &cfg, 1.0);

        t.wind_speed_kt = Some(30.0);
        // 30 s elapsed: one 2 kt step
        smoother.tick(&t, &airborne(5000.0), &cfg, 30.0);
        assert_eq!(smoother.current().unwrap().wind_speed_kt, Some(12.0));
        // another 270 s: nine more steps, clamped at the target
        smoother.tick(&t, &airborne(5000.0), &cfg, 270.0);
        assert_eq!(smoother.current().unwrap().wind_speed_kt, Some(30.0));
        let result = smoother.tick(&t, &airborne(5000.0), &cfg, 30.0);
        assert!(!result.changed);
    }

    #[test]
    fn test_time_based_banks_partial_intervals() {
        let mut smoother = Smoother::new();
        let mut t = target("KBOS");
        t.wind_speed_kt = Some(10.0);
        let mut cfg = SmoothingConfig::default();
        cfg.big_change_wind_speed_kt = 100.0;
        smoother.tick(&t, &airborne(5000.0), &cfg, 1.0);

        t.wind_speed_kt = Some(30.0);
        // 20 s is less than one interval: no movement yet
        let result = smoother.tick(&t, &airborne(5000.0), &cfg, 20.0);
        assert!(!result.changed);
        // 10 more seconds completes the interval
        smoother.tick(&t, &airborne(5000.0), &cfg, 10.0);
        assert_eq!(smoother.current().unwrap().wind_speed_kt, Some(12.0));
    }

    #[test]
    fn test_wind_direction_wraps_shortest_arc() {
        let mut smoother = Smoother::new();
        let mut t = target("KBOS");
        t.wind_dir = Some(WindDir::Degrees(350));
        let mut cfg = step_cfg();
        cfg.max_wind_dir_change_deg = 5.0;
        smoother.tick(&t, &airborne(5000.0), &cfg, 1.0);

        t.wind_dir = Some(WindDir::Degrees(10));
        let mut seen = Vec::new();
        for _ in 0..4 {
            smoother.tick(&t, &airborne(5000.0), &cfg, 1.0);
            seen.push(smoother.current().unwrap().wind_dir_deg.unwrap());
        }
        assert_eq!(seen, vec![355.0, 0.0, 5.0, 10.0]);
    }

    #[test]
    fn test_freeze_holds_state_on_approach() {
        let mut smoother = Smoother::new();
        let mut t = target("KBOS");
        smoother.tick(&t, &airborne(5000.0), &step_cfg(), 1.0);

        t.wind_speed_kt = Some(18.0);
        let before = smoother.current().unwrap().clone();
        let result = smoother.tick(&t, &airborne(500.0), &step_cfg(), 1.0);
        assert!(result.frozen);
        assert!(!result.changed);
        assert_eq!(smoother.current().unwrap(), &before);

        // on the ground the freeze does not apply
        let mut on_ground = airborne(0.0);
        on_ground.on_ground = true;
        let result = smoother.tick(&t, &on_ground, &step_cfg(), 1.0);
        assert!(!result.frozen);
        assert!(result.changed);
    }

    #[test]
    fn test_big_change_overrides_freeze() {
        let mut smoother = Smoother::new();
        let mut t = target("KBOS");
        t.qnh_hpa = Some(1013.0);
        let cfg = SmoothingConfig::default();
        smoother.tick(&t, &airborne(5000.0), &cfg, 1.0);

        // 17 hPa delta is a big change; freeze at 500 ft is bypassed and the
        // step runs at ten times the 0.5 hPa rate
        t.qnh_hpa = Some(1030.0);
        let result = smoother.tick(&t, &airborne(500.0), &cfg, 30.0);
        assert!(result.frozen);
        assert!(result.changed);
        assert!(result.multiplier >= 10.0);
        assert_eq!(smoother.current().unwrap().qnh_hpa, Some(1018.0));
    }

    #[test]
    fn test_very_big_change_runs_at_fifty_x() {
        let mut smoother = Smoother::new();
        let mut t = target("KBOS");
        t.wind_speed_kt = Some(5.0);
        let cfg = SmoothingConfig::default();
        smoother.tick(&t, &airborne(5000.0), &cfg, 1.0);

        t.wind_speed_kt = Some(40.0);
        let result = smoother.tick(&t, &airborne(5000.0), &cfg, 30.0);
        assert_eq!(result.multiplier, 50.0);
        // one 2 kt step at 50x covers the whole 35 kt delta, clamped
        assert_eq!(smoother.current().unwrap().wind_speed_kt, Some(40.0));
    }

    #[test]
    fn test_visibility_crossing_five_is_big() {
        let mut smoother = Smoother::new();
        let mut t = target("KBOS");
        t.visibility_sm = Some(6.0);
        let cfg = SmoothingConfig::default();
        smoother.tick(&t, &airborne(5000.0), &cfg, 1.0);

        t.visibility_sm = Some(2.0);
        let result = smoother.tick(&t, &airborne(500.0), &cfg, 30.0);
        assert!(result.changed, "crossing 5 sm must bypass the freeze");
        assert!(result.multiplier >= 10.0);
    }

    #[test]
    fn test_temperature_jumps_and_weather_swaps_atomically() {
        let mut smoother = Smoother::new();
        let mut t = target("KBOS");
        smoother.tick(&t, &airborne(5000.0), &step_cfg(), 1.0);

        t.temperature_c = Some(-4);
        t.dewpoint_c = Some(-7);
        t.weather = Some(vec!["-SN".into(), "BR".into()]);
        smoother.tick(&t, &airborne(5000.0), &step_cfg(), 1.0);
        let c = smoother.current().unwrap();
        assert_eq!(c.temperature_c, Some(-4));
        assert_eq!(c.dewpoint_c, Some(-7));
        assert_eq!(
            c.weather.as_deref(),
            Some(&["-SN".to_string(), "BR".to_string()][..])
        );
    }

    #[test]
    fn test_gust_decays_and_drops_at_speed() {
        let mut smoother = Smoother::new();
        let mut t = target("KBOS");
        t.wind_speed_kt = Some(15.0);
        t.wind_gust_kt = Some(19.0);
        let mut cfg = step_cfg();
        cfg.max_wind_speed_change_kt = 2.0;
        smoother.tick(&t, &airborne(5000.0), &cfg, 1.0);

        // target loses its gust: current gust walks down to the sustained
        // speed and is then dropped
        t.wind_gust_kt = None;
        smoother.tick(&t, &airborne(5000.0), &cfg, 1.0);
        assert_eq!(smoother.current().unwrap().wind_gust_kt, Some(17.0));
        smoother.tick(&t, &airborne(5000.0), &cfg, 1.0);
        assert_eq!(smoother.current().unwrap().wind_gust_kt, None);
    }

    #[test]
    fn test_variable_wind_applies_immediately() {
        let mut smoother = Smoother::new();
        let mut t = target("KBOS");
        smoother.tick(&t, &airborne(5000.0), &step_cfg(), 1.0);

        t.wind_dir = Some(WindDir::Variable);
        let result = smoother.tick(&t, &airborne(5000.0), &step_cfg(), 1.0);
        assert!(result.changed);
        let c = smoother.current().unwrap();
        assert!(c.wind_variable);
        assert_eq!(c.wind_dir_deg, None);
    }

    #[test]
    fn test_absent_target_fields_leave_current_alone() {
        let mut smoother = Smoother::new();
        let t = target("KBOS");
        smoother.tick(&t, &airborne(5000.0), &step_cfg(), 1.0);

        let hollow = TargetWeather {
            scope: Scope::Station("KBOS".into()),
            provenance: Provenance::MetarOnly,
            wind_dir: None,
            wind_speed_kt: None,
            wind_gust_kt: None,
            visibility_sm: None,
            temperature_c: None,
            dewpoint_c: None,
            qnh_hpa: None,
            clouds: None,
            weather: None,
        };
        let result = smoother.tick(&hollow, &airborne(5000.0), &step_cfg(), 1.0);
        assert!(!result.changed);
        assert_eq!(smoother.current().unwrap().wind_dir_deg, Some(240.0));
    }

    #[test]
    fn test_cloud_layer_interpolates_within_threshold() {
        let mut smoother = Smoother::new();
        let mut t = target("KBOS");
        t.clouds = Some(vec![CloudLayer {
            cover: CloudCover::Broken,
            base_ft: 3000,
        }]);
        let mut cfg = step_cfg();
        cfg.cloud_change_threshold = 1000.0;
        smoother.tick(&t, &airborne(5000.0), &cfg, 1.0);

        // 800 ft away is within the threshold: base walks, coverage snaps
        t.clouds = Some(vec![CloudLayer {
            cover: CloudCover::Overcast,
            base_ft: 3800,
        }]);
        smoother.tick(&t, &airborne(5000.0), &cfg, 1.0);
        let clouds = smoother.current().unwrap().clouds.clone().unwrap();
        assert_eq!(clouds.len(), 1);
        assert_eq!(clouds[0].cover, CloudCover::Overcast);
        assert_eq!(clouds[0].base_ft, 3800);
    }

    #[test]
    fn test_cloud_layers_add_and_remove_past_threshold() {
        let mut smoother = Smoother::new();
        let mut t = target("KBOS");
        t.clouds = Some(vec![CloudLayer {
            cover: CloudCover::Few,
            base_ft: 2000,
        }]);
        let cfg = step_cfg();
        smoother.tick(&t, &airborne(5000.0), &cfg, 1.0);

        // 12000 ft is far outside the threshold: old layer out, new layer in
        t.clouds = Some(vec![CloudLayer {
            cover: CloudCover::Broken,
            base_ft: 12000,
        }]);
        let result = smoother.tick(&t, &airborne(5000.0), &cfg, 1.0);
        assert!(result.changed);
        let clouds = smoother.current().unwrap().clouds.clone().unwrap();
        assert_eq!(clouds.len(), 1);
        assert_eq!(clouds[0].base_ft, 12000);
        assert_eq!(clouds[0].cover, CloudCover::Broken);
    }

    #[test]
    fn test_clear_to_overcast_is_big_change() {
        let mut smoother = Smoother::new();
        let mut t = target("KBOS");
        t.clouds = Some(Vec::new());
        let cfg = SmoothingConfig::default();
        smoother.tick(&t, &airborne(5000.0), &cfg, 1.0);

        t.clouds = Some(vec![CloudLayer {
            cover: CloudCover::Overcast,
            base_ft: 800,
        }]);
        let result = smoother.tick(&t, &airborne(500.0), &cfg, 30.0);
        assert!(result.changed, "clear to overcast must bypass the freeze");
        assert!(result.multiplier >= 10.0);
    }
}
