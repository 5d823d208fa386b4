// SPDX-License-Identifier: MIT
// Copyright (c) 2026 StarTuz

use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use crate::combine::{combine, CombiningMode};
use crate::config::{ConfigError, EngineConfig};
use crate::fetch::{RawReport, WeatherFetcher};
use crate::metar::{parse_metar_at, ParsedMetar};
use crate::sim::{AircraftStateSource, InjectionSink};
use crate::smooth::{CurrentWeather, Smoother};
use crate::stations::{select_scopes, Scope, StationRegistry};
use crate::synth::{encode_wire, synthesize};
use crate::taf::{parse_taf_at, ParsedTaf};

/// What one tick did, for logging and tests.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TickReport {
    pub had_aircraft: bool,
    pub scopes: usize,
    pub injected: usize,
}

/// Drives the whole cycle: aircraft state → station selection → fetch →
/// parse → combine → smooth → synthesize → inject. Owns every piece of
/// mutable weather state; collaborators only see their own interfaces.
pub struct Engine<F, A, K> {
    config: EngineConfig,
    registry: StationRegistry,
    fetcher: F,
    aircraft: A,
    sink: K,
    smoothers: HashMap<Scope, Smoother>,
    selected: Vec<Scope>,
    last_injected: HashMap<Scope, String>,
}

impl<F, A, K> Engine<F, A, K>
where
    F: WeatherFetcher,
    A: AircraftStateSource,
    K: InjectionSink,
{
    /// Fails on an invalid configuration; the engine never starts degraded.
    pub fn new(
        config: EngineConfig,
        registry: StationRegistry,
        fetcher: F,
        aircraft: A,
        sink: K,
    ) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self {
            config,
            registry,
            fetcher,
            aircraft,
            sink,
            smoothers: HashMap::new(),
            selected: Vec::new(),
            last_injected: HashMap::new(),
        })
    }

    pub fn sink(&self) -> &K {
        &self.sink
    }

    pub fn current(&self, scope: &Scope) -> Option<&CurrentWeather> {
        self.smoothers.get(scope).and_then(|s| s.current())
    }

    pub fn selected_scopes(&self) -> &[Scope] {
        &self.selected
    }

    pub fn last_injected(&self, scope: &Scope) -> Option<&str> {
        self.last_injected.get(scope).map(String::as_str)
    }

    /// The station whose reports feed a scope. The global pseudo-scope reads
    /// from the nearest station regardless of the selection radius.
    fn source_icao(&self, scope: &Scope, lat: f64, lon: f64) -> Option<String> {
        match scope {
            Scope::Station(icao) => Some(icao.clone()),
            Scope::Global => self.registry.nearest(lat, lon).map(|s| s.icao.clone()),
        }
    }

    fn parse_metar_report(report: &RawReport, now: DateTime<Utc>) -> Option<ParsedMetar> {
        match parse_metar_at(&report.text, now) {
            Ok(mut metar) => {
                // the provider's issue time is authoritative when present
                if report.issued_at.is_some() {
                    metar.issued_at = report.issued_at;
                }
                Some(metar)
            }
            Err(e) => {
                log::warn!("Dropping unparseable METAR — raw={:?} err={}", report.text, e);
                None
            }
        }
    }

    fn parse_taf_report(report: &RawReport, now: DateTime<Utc>) -> Option<ParsedTaf> {
        match parse_taf_at(&report.text, now) {
            Ok(taf) => Some(taf),
            Err(e) => {
                log::warn!("Dropping unparseable TAF — raw={:?} err={}", report.text, e);
                None
            }
        }
    }

    pub fn tick(&mut self, now: DateTime<Utc>, elapsed_secs: f64) -> TickReport {
        let mut report = TickReport::default();

        let Some(state) = self.aircraft.fetch_state() else {
            log::debug!("[engine] no aircraft state, tick skipped");
            return report;
        };
        report.had_aircraft = true;

        let scopes = select_scopes(
            &self.registry,
            state.lat,
            state.lon,
            self.config.radius_nm,
            self.config.max_stations,
            self.config.fallback_to_global,
        );
        if scopes != self.selected {
            log::info!(
                "Scope set changed — old={:?} new={:?}",
                self.selected,
                scopes
            );
            self.smoothers.retain(|scope, _| scopes.contains(scope));
            self.last_injected.retain(|scope, _| scopes.contains(scope));
            self.selected = scopes.clone();
        }
        report.scopes = scopes.len();
        if scopes.is_empty() {
            return report;
        }

        // fetch everything first; smoother state is never held across a fetch
        let sources: Vec<(Scope, Option<String>)> = scopes
            .iter()
            .map(|scope| (scope.clone(), self.source_icao(scope, state.lat, state.lon)))
            .collect();
        let icaos: Vec<String> = sources.iter().filter_map(|(_, i)| i.clone()).collect();

        let metars = match self.fetcher.fetch_metars(&icaos) {
            Ok(map) => map,
            Err(e) => {
                log::warn!("METAR fetch failed, scopes skip this tick — err={:#}", e);
                HashMap::new()
            }
        };
        let want_tafs = self.config.combining_mode != CombiningMode::MetarOnly;
        let tafs = if want_tafs {
            match self.fetcher.fetch_tafs(&icaos) {
                Ok(map) => map,
                Err(e) => {
                    log::warn!("TAF fetch failed, continuing on METARs — err={:#}", e);
                    HashMap::new()
                }
            }
        } else {
            HashMap::new()
        };

        for (scope, icao) in sources {
            let Some(icao) = icao else {
                log::debug!("[engine] no source station for {}", scope);
                continue;
            };
            let metar = metars
                .get(&icao)
                .and_then(|r| Self::parse_metar_report(r, now));
            let taf = tafs.get(&icao).and_then(|r| Self::parse_taf_report(r, now));

            let Some(target) = combine(
                scope.clone(),
                metar.as_ref(),
                taf.as_ref(),
                self.config.combining_mode,
                self.config.taf_fallback_stale_seconds,
                now,
            ) else {
                log::debug!("[engine] no data for {}, nothing injected", scope);
                continue;
            };

            let smoother = self.smoothers.entry(scope.clone()).or_default();
            let outcome = smoother.tick(&target, &state, &self.config.smoothing, elapsed_secs);
            if !outcome.changed {
                continue;
            }
            let Some(current) = smoother.current() else {
                continue;
            };
            let metar_text = synthesize(current, now);
            let record = encode_wire(&metar_text);
            match self.sink.inject(&scope, &record) {
                Ok(()) => {
                    log::debug!("[engine] injected {} — {}", scope, metar_text);
                    self.last_injected.insert(scope, metar_text);
                    report.injected += 1;
                }
                Err(e) => {
                    // smoothed state has advanced regardless; the next
                    // successful write converges on the latest state
                    log::error!("Injection failed — scope={} err={:#}", scope, e);
                }
            }
        }

        report
    }

    /// Ticks until `stop` is raised (the in-flight tick always completes) or
    /// `max_ticks` runs out. Pacing uses a logical clock: the next tick is
    /// due one interval after the previous one *started*, and fires
    /// immediately after an overrun, with elapsed time measured honestly
    /// either way.
    pub fn run(&mut self, stop: &AtomicBool, max_ticks: Option<u64>) {
        let interval = Duration::from_secs_f64(self.config.tick_interval_seconds);
        let mut last_start: Option<Instant> = None;
        let mut ticks = 0u64;

        loop {
            if stop.load(Ordering::SeqCst) {
                log::info!("Stop requested, engine shutting down");
                break;
            }
            if let Some(max) = max_ticks {
                if ticks >= max {
                    break;
                }
            }

            let start = Instant::now();
            let elapsed = last_start
                .map(|t| start.duration_since(t).as_secs_f64())
                .unwrap_or(0.0);
            last_start = Some(start);

            let report = self.tick(Utc::now(), elapsed);
            log::debug!(
                "[engine] tick done — scopes={} injected={} elapsed={:.2}s",
                report.scopes,
                report.injected,
                elapsed
            );
            ticks += 1;

            let next = start + interval;
            let now = Instant::now();
            if next > now {
                std::thread::sleep(next - now);
            }
        }
    }
}
