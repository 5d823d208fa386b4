// SPDX-License-Identifier: MIT
// Copyright (c) 2026 StarTuz

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::path::Path;

/// Spherical Earth radius in nautical miles.
pub const EARTH_RADIUS_NM: f64 = 3440.065;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Station {
    pub icao: String,
    pub lat: f64,
    pub lon: f64,
    pub elevation_ft: Option<f64>,
    pub name: Option<String>,
}

/// Injection target: a concrete station, or the global pseudo-station used
/// when nothing qualifies near the aircraft.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Scope {
    Station(String),
    Global,
}

impl Scope {
    pub fn id(&self) -> &str {
        match self {
            Scope::Station(icao) => icao,
            Scope::Global => "GLOB",
        }
    }
}

impl fmt::Display for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.id())
    }
}

/// Great-circle distance between two points in nautical miles.
pub fn great_circle_nm(lat1: f64, lon1: f64, lat2: f64, lon2: f64) -> f64 {
    let d_lat = (lat2 - lat1).to_radians();
    let d_lon = (lon2 - lon1).to_radians();
    let a = (d_lat / 2.0).sin().powi(2)
        + lat1.to_radians().cos() * lat2.to_radians().cos() * (d_lon / 2.0).sin().powi(2);
    let c = 2.0 * a.sqrt().atan2((1.0 - a).sqrt());
    EARTH_RADIUS_NM * c
}

/// Immutable set of known stations. A linear scan answers nearest-K queries;
/// registries top out around 60k entries, which a scan handles comfortably.
pub struct StationRegistry {
    stations: Vec<Station>,
    by_icao: HashMap<String, usize>,
}

impl StationRegistry {
    pub fn from_stations(stations: Vec<Station>) -> Self {
        let mut kept: Vec<Station> = Vec::with_capacity(stations.len());
        let mut by_icao = HashMap::with_capacity(stations.len());
        for mut station in stations {
            station.icao = station.icao.trim().to_uppercase();
            if station.icao.len() != 4 || !station.icao.chars().all(|c| c.is_ascii_alphabetic()) {
                continue;
            }
            if by_icao.contains_key(&station.icao) {
                continue;
            }
            by_icao.insert(station.icao.clone(), kept.len());
            kept.push(station);
        }
        Self {
            stations: kept,
            by_icao,
        }
    }

    /// Loads an OurAirports-style CSV. Column names are resolved from the
    /// header row; rows without a 4-letter ident or coordinates are skipped.
    pub fn load_csv<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let mut rdr = csv::Reader::from_path(path)
            .with_context(|| format!("failed to open station file {:?}", path))?;

        let headers = rdr.headers()?.clone();
        let col = |names: &[&str]| -> Option<usize> {
            headers
                .iter()
                .position(|h| names.iter().any(|n| h.eq_ignore_ascii_case(n)))
        };
        let idx_ident = col(&["ident", "icao", "station_id"]).context("no ident column")?;
        let idx_lat = col(&["latitude_deg", "lat", "latitude"]).context("no latitude column")?;
        let idx_lon = col(&["longitude_deg", "lon", "longitude"]).context("no longitude column")?;
        let idx_elev = col(&["elevation_ft", "elevation"]);
        let idx_name = col(&["name"]);

        let mut stations = Vec::new();
        for record in rdr.records() {
            let record = match record {
                Ok(r) => r,
                Err(e) => {
                    log::warn!("[stations] skipping malformed row: {}", e);
                    continue;
                }
            };
            let icao = match record.get(idx_ident) {
                Some(s) => s.trim().to_uppercase(),
                None => continue,
            };
            let lat: f64 = match record.get(idx_lat).and_then(|s| s.trim().parse().ok()) {
                Some(v) => v,
                None => continue,
            };
            let lon: f64 = match record.get(idx_lon).and_then(|s| s.trim().parse().ok()) {
                Some(v) => v,
                None => continue,
            };
            let elevation_ft = idx_elev
                .and_then(|i| record.get(i))
                .and_then(|s| s.trim().parse().ok());
            let name = idx_name
                .and_then(|i| record.get(i))
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty());
            stations.push(Station {
                icao,
                lat,
                lon,
                elevation_ft,
                name,
            });
        }

        let registry = Self::from_stations(stations);
        log::info!(
            "Station registry loaded — path={:?} station_count={}",
            path,
            registry.len()
        );
        Ok(registry)
    }

    pub fn get(&self, icao: &str) -> Option<&Station> {
        self.by_icao.get(icao).map(|&i| &self.stations[i])
    }

    pub fn len(&self) -> usize {
        self.stations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stations.is_empty()
    }

    /// All stations within `radius_nm`, nearest first, capped at `max`.
    /// Distance ties fall back to ICAO order, so results are deterministic.
    pub fn nearest_within(
        &self,
        lat: f64,
        lon: f64,
        radius_nm: f64,
        max: usize,
    ) -> Vec<(&Station, f64)> {
        let mut hits: Vec<(&Station, f64)> = self
            .stations
            .iter()
            .map(|s| (s, great_circle_nm(lat, lon, s.lat, s.lon)))
            .filter(|(_, d)| *d <= radius_nm)
            .collect();
        hits.sort_by(|a, b| {
            a.1.partial_cmp(&b.1)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.0.icao.cmp(&b.0.icao))
        });
        hits.truncate(max);
        hits
    }

    /// The single nearest station with no radius bound (used to source data
    /// for the global scope).
    pub fn nearest(&self, lat: f64, lon: f64) -> Option<&Station> {
        self.stations
            .iter()
            .map(|s| (s, great_circle_nm(lat, lon, s.lat, s.lon)))
            .min_by(|a, b| {
                a.1.partial_cmp(&b.1)
                    .unwrap_or(std::cmp::Ordering::Equal)
                    .then_with(|| a.0.icao.cmp(&b.0.icao))
            })
            .map(|(s, _)| s)
    }
}

/// Picks the scopes to drive this tick: up to `max_stations` stations within
/// `radius_nm` of the aircraft, else the global pseudo-scope when allowed.
pub fn select_scopes(
    registry: &StationRegistry,
    lat: f64,
    lon: f64,
    radius_nm: f64,
    max_stations: usize,
    fallback_to_global: bool,
) -> Vec<Scope> {
    let hits = registry.nearest_within(lat, lon, radius_nm, max_stations);
    if hits.is_empty() {
        if fallback_to_global {
            return vec![Scope::Global];
        }
        return Vec::new();
    }
    hits.into_iter()
        .map(|(s, _)| Scope::Station(s.icao.clone()))
        .collect()
}
