// SPDX-License-Identifier: MIT
// Copyright (c) 2026 StarTuz

//! Live-weather engine for the simulator bridge: fetches METAR/TAF reports
//! for stations near the aircraft, combines and smooths them, and re-emits a
//! canonical METAR record for injection.

pub mod combine;
pub mod config;
pub mod engine;
pub mod fetch;
pub mod metar;
pub mod sim;
pub mod smooth;
pub mod stations;
pub mod synth;
pub mod taf;

pub use combine::{CombiningMode, Provenance, TargetWeather};
pub use config::{ConfigError, EngineConfig};
pub use engine::{Engine, TickReport};
pub use fetch::{AwcFetcher, RawReport, WeatherFetcher};
pub use sim::{AircraftState, AircraftStateSource, BufferSink, FileSink, FileStateSource,
    FixedStateSource, InjectionSink};
pub use smooth::{CurrentWeather, Smoother, SmoothingConfig, TransitionMode};
pub use stations::{Scope, Station, StationRegistry};
