use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;

use crate::stations::Scope;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AircraftState {
    pub lat: f64,
    pub lon: f64,
    pub altitude_ft: f64,
    #[serde(default)]
    pub ground_speed_kt: f64,
    #[serde(default)]
    pub heading_deg: f64,
    #[serde(default)]
    pub on_ground: bool,
}

/// Where the engine learns the aircraft position each tick.
pub trait AircraftStateSource {
    /// `None` when the simulator has nothing to report; the engine skips
    /// the tick and keeps its state.
    fn fetch_state(&mut self) -> Option<AircraftState>;
}

/// Where synthesized METAR records go. `record` is always the full 256-byte
/// null-terminated buffer.
pub trait InjectionSink {
    fn inject(&mut self, scope: &Scope, record: &[u8]) -> Result<()>;
}

/// A parked aircraft: always reports the same state. Useful for demo runs
/// and for driving the engine from a known position.
pub struct FixedStateSource {
    pub state: AircraftState,
}

impl FixedStateSource {
    pub fn new(lat: f64, lon: f64, altitude_ft: f64) -> Self {
        Self {
            state: AircraftState {
                lat,
                lon,
                altitude_ft,
                ground_speed_kt: 0.0,
                heading_deg: 0.0,
                on_ground: true,
            },
        }
    }
}

impl AircraftStateSource for FixedStateSource {
    fn fetch_state(&mut self) -> Option<AircraftState> {
        Some(self.state)
    }
}

/// Re-reads a JSON state file on every tick. A simulator-side plugin keeps
/// the file current; a missing or garbled file reads as "no state".
pub struct FileStateSource {
    path: PathBuf,
}

impl FileStateSource {
    pub fn new<P: Into<PathBuf>>(path: P) -> Self {
        Self { path: path.into() }
    }
}

impl AircraftStateSource for FileStateSource {
    fn fetch_state(&mut self) -> Option<AircraftState> {
        let content = match fs::read_to_string(&self.path) {
            Ok(c) => c,
            Err(e) => {
                log::debug!("[sim] state file unreadable — path={:?} err={}", self.path, e);
                return None;
            }
        };
        match serde_json::from_str(&content) {
            Ok(state) => Some(state),
            Err(e) => {
                log::debug!("[sim] state file unparseable — path={:?} err={}", self.path, e);
                None
            }
        }
    }
}

/// Writes each scope's record to `<dir>/<scope>.wx`, standing in for the
/// simulator's shared-memory offset. The file always holds exactly one
/// 256-byte record; the latest write wins.
pub struct FileSink {
    dir: PathBuf,
}

impl FileSink {
    pub fn new<P: Into<PathBuf>>(dir: P) -> Self {
        Self { dir: dir.into() }
    }
}

impl InjectionSink for FileSink {
    fn inject(&mut self, scope: &Scope, record: &[u8]) -> Result<()> {
        fs::create_dir_all(&self.dir)
            .with_context(|| format!("failed to create sink dir {:?}", self.dir))?;
        let path = self.dir.join(format!("{}.wx", scope.id()));
        fs::write(&path, record).with_context(|| format!("failed to write {:?}", path))?;
        Ok(())
    }
}

/// Captures injections in memory; test harness sink.
#[derive(Default)]
pub struct BufferSink {
    pub records: Vec<(Scope, Vec<u8>)>,
}

impl BufferSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// The most recent record for a scope, with the zero fill stripped.
    pub fn last_metar(&self, scope: &Scope) -> Option<String> {
        self.records
            .iter()
            .rev()
            .find(|(s, _)| s == scope)
            .map(|(_, bytes)| {
                let end = bytes.iter().position(|&b| b == 0).unwrap_or(bytes.len());
                String::from_utf8_lossy(&bytes[..end]).into_owned()
            })
    }
}

impl InjectionSink for BufferSink {
    fn inject(&mut self, scope: &Scope, record: &[u8]) -> Result<()> {
        self.records.push((scope.clone(), record.to_vec()));
        Ok(())
    }
}
