use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::combine::CombiningMode;
use crate::smooth::SmoothingConfig;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path:?}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to parse config file {path:?}: {source}")]
    Parse {
        path: PathBuf,
        source: serde_json::Error,
    },
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

fn default_combining_mode() -> CombiningMode {
    CombiningMode::MetarTafAssist
}
fn default_stale_seconds() -> i64 {
    300
}
fn default_tick_interval() -> f64 {
    1.0
}
fn default_fetch_timeout() -> u64 {
    10
}
fn default_radius_nm() -> f64 {
    80.0
}
fn default_max_stations() -> usize {
    5
}
fn default_fallback_to_global() -> bool {
    true
}
fn default_cache_ttl() -> u64 {
    900
}

/// Engine configuration, persisted as JSON. Every field has a default, so an
/// empty object is a valid config; `validate` runs before the engine starts
/// and a failure there keeps it from starting at all.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineConfig {
    #[serde(default = "default_combining_mode")]
    pub combining_mode: CombiningMode,
    /// METAR age in seconds beyond which fallback mode reaches for the TAF.
    #[serde(default = "default_stale_seconds")]
    pub taf_fallback_stale_seconds: i64,
    #[serde(default = "default_tick_interval")]
    pub tick_interval_seconds: f64,
    #[serde(default = "default_fetch_timeout")]
    pub fetch_timeout_seconds: u64,
    #[serde(default = "default_radius_nm")]
    pub radius_nm: f64,
    #[serde(default = "default_max_stations")]
    pub max_stations: usize,
    #[serde(default = "default_fallback_to_global")]
    pub fallback_to_global: bool,
    /// How long a downloaded report cache stays fresh.
    #[serde(default = "default_cache_ttl")]
    pub cache_ttl_seconds: u64,
    #[serde(flatten)]
    pub smoothing: SmoothingConfig,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            combining_mode: default_combining_mode(),
            taf_fallback_stale_seconds: default_stale_seconds(),
            tick_interval_seconds: default_tick_interval(),
            fetch_timeout_seconds: default_fetch_timeout(),
            radius_nm: default_radius_nm(),
            max_stations: default_max_stations(),
            fallback_to_global: default_fallback_to_global(),
            cache_ttl_seconds: default_cache_ttl(),
            smoothing: SmoothingConfig::default(),
        }
    }
}

impl EngineConfig {
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let config: Self =
            serde_json::from_str(&content).map_err(|source| ConfigError::Parse {
                path: path.to_path_buf(),
                source,
            })?;
        config.validate()?;
        log::info!("Configuration loaded — path={:?}", path);
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let mut problems = Vec::new();
        if self.tick_interval_seconds <= 0.0 {
            problems.push("tick_interval_seconds must be positive");
        }
        if self.taf_fallback_stale_seconds < 0 {
            problems.push("taf_fallback_stale_seconds must not be negative");
        }
        if self.radius_nm <= 0.0 {
            problems.push("radius_nm must be positive");
        }
        if self.max_stations == 0 {
            problems.push("max_stations must be at least 1");
        }
        if self.fetch_timeout_seconds == 0 {
            problems.push("fetch_timeout_seconds must be positive");
        }
        let s = &self.smoothing;
        if s.transition_interval_seconds <= 0.0 {
            problems.push("transition_interval_seconds must be positive");
        }
        if s.max_wind_dir_change_deg <= 0.0
            || s.max_wind_speed_change_kt <= 0.0
            || s.max_qnh_change_hpa <= 0.0
            || s.max_visibility_change <= 0.0
        {
            problems.push("step-limited ceilings must be positive");
        }
        if s.wind_dir_step_deg <= 0.0
            || s.wind_speed_step_kt <= 0.0
            || s.qnh_step_hpa <= 0.0
            || s.visibility_step_m <= 0.0
        {
            problems.push("time-based step sizes must be positive");
        }
        if s.cloud_change_threshold <= 0.0 {
            problems.push("cloud_change_threshold must be positive");
        }
        if s.approach_freeze_alt_ft < 0.0 {
            problems.push("approach_freeze_alt_ft must not be negative");
        }
        if s.big_change_wind_deg <= 0.0
            || s.big_change_wind_speed_kt <= 0.0
            || s.big_change_qnh_hpa <= 0.0
            || s.big_change_visibility_sm <= 0.0
        {
            problems.push("big-change thresholds must be positive");
        }
        if problems.is_empty() {
            Ok(())
        } else {
            Err(ConfigError::Invalid(problems.join("; ")))
        }
    }
}
