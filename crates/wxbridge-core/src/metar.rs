// SPDX-License-Identifier: MIT
// Copyright (c) 2026 StarTuz

use chrono::{DateTime, Datelike, Months, TimeZone, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::OnceLock;
use thiserror::Error;

pub const KT_PER_MPS: f64 = 1.94384;
pub const KT_PER_KMH: f64 = 0.53996;
pub const METERS_PER_SM: f64 = 1609.344;

#[derive(Debug, Error)]
#[error("METAR parse error at token {position}: {reason}")]
pub struct ParseError {
    pub position: usize,
    pub reason: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum WindDir {
    Degrees(u16),
    Variable,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum CloudCover {
    Few,
    Scattered,
    Broken,
    Overcast,
}

impl CloudCover {
    pub fn code(&self) -> &'static str {
        match self {
            CloudCover::Few => "FEW",
            CloudCover::Scattered => "SCT",
            CloudCover::Broken => "BKN",
            CloudCover::Overcast => "OVC",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CloudLayer {
    pub cover: CloudCover,
    pub base_ft: u32,
}

/// The wind/visibility/clouds/weather subset shared by METAR bodies and TAF
/// change groups. `None` means "not stated"; `Some(vec![])` for clouds or
/// weather means an explicit "clear" / "no significant weather".
#[derive(Debug, Clone, Default, PartialEq)]
pub struct WeatherBlock {
    pub wind_dir: Option<WindDir>,
    pub wind_speed_kt: Option<f64>,
    pub wind_gust_kt: Option<f64>,
    pub wind_range: Option<(u16, u16)>,
    pub visibility_sm: Option<f64>,
    pub clouds: Option<Vec<CloudLayer>>,
    pub weather: Option<Vec<String>>,
    pub cavok: bool,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ParsedMetar {
    pub icao: String,
    pub issued_at: Option<DateTime<Utc>>,
    pub auto: bool,
    pub wind_dir: Option<WindDir>,
    pub wind_speed_kt: Option<f64>,
    pub wind_gust_kt: Option<f64>,
    pub wind_range: Option<(u16, u16)>,
    pub visibility_sm: Option<f64>,
    pub temperature_c: Option<i16>,
    pub dewpoint_c: Option<i16>,
    pub qnh_hpa: Option<f64>,
    pub clouds: Option<Vec<CloudLayer>>,
    pub weather: Option<Vec<String>>,
    pub cavok: bool,
    pub raw: String,
}

fn icao_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^[A-Z]{4}$").unwrap())
}

fn time_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^(\d{2})(\d{2})(\d{2})Z$").unwrap())
}

fn wind_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^(\d{3}|VRB)(\d{2,3})(?:G(\d{2,3}))?(KT|MPS|KMH)$").unwrap()
    })
}

fn wind_range_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^(\d{3})V(\d{3})$").unwrap())
}

fn vis_meters_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^(\d{4})(?:NDV)?$").unwrap())
}

/// Parses "10SM", "1/2SM", "1 1/2SM" (pre-joined by the tokenizer), and the
/// M/P-prefixed variants. Returns statute miles.
fn parse_vis_sm(token: &str) -> Option<f64> {
    let body = token
        .strip_suffix("SM")?
        .trim_start_matches(['M', 'P']);
    if body.is_empty() {
        return None;
    }
    let mut value = 0.0;
    for part in body.split(' ') {
        if let Some((num, den)) = part.split_once('/') {
            let num: f64 = num.parse().ok()?;
            let den: f64 = den.parse().ok()?;
            if den == 0.0 {
                return None;
            }
            value += num / den;
        } else {
            value += part.parse::<f64>().ok()?;
        }
    }
    Some(value)
}

fn rvr_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^R\d{2}[LCR]?/").unwrap())
}

fn weather_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(
            r"^[+-]?(VC)?(MI|BC|PR|DR|BL|SH|TS|FZ){0,2}(DZ|RA|SN|SG|IC|PL|GR|GS|UP|BR|FG|FU|VA|DU|SA|HZ|PY|PO|SQ|FC|SS|DS){0,3}$",
        )
        .unwrap()
    })
}

fn cloud_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^(FEW|SCT|BKN|OVC)(\d{3})(?:CB|TCU)?$").unwrap())
}

fn vv_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^VV(\d{3})$").unwrap())
}

fn temp_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^(M?\d{2})/(M?\d{2})?$").unwrap())
}

fn pressure_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^([QA])(\d{4})$").unwrap())
}

/// Splits a report on whitespace and re-joins split statute-mile fractions
/// ("1 1/2SM" arrives as two tokens).
pub(crate) fn tokenize(raw: &str) -> Vec<String> {
    let parts: Vec<&str> = raw.split_whitespace().collect();
    let mut tokens = Vec::with_capacity(parts.len());
    let mut i = 0;
    while i < parts.len() {
        let tok = parts[i];
        let whole = tok.len() <= 2 && tok.chars().all(|c| c.is_ascii_digit());
        if whole {
            if let Some(next) = parts.get(i + 1) {
                if next.ends_with("SM") && next.contains('/') {
                    tokens.push(format!("{} {}", tok, next));
                    i += 2;
                    continue;
                }
            }
        }
        tokens.push(tok.to_string());
        i += 1;
    }
    tokens
}

/// Reconstructs a `DDHHMM` Zulu stamp against `now`, picking the month whose
/// candidate lies closest to it. Handles month rollover in both directions.
pub(crate) fn zulu_daytime(
    day: u32,
    hour: u32,
    minute: u32,
    now: DateTime<Utc>,
) -> Option<DateTime<Utc>> {
    if day == 0 || day > 31 || minute > 59 || hour > 24 {
        return None;
    }
    // TAF validity uses hour 24 for "end of day".
    let (hour, extra_day) = if hour == 24 { (0, 1) } else { (hour, 0) };

    let mut best: Option<DateTime<Utc>> = None;
    for base in [
        now.checked_sub_months(Months::new(1)),
        Some(now),
        now.checked_add_months(Months::new(1)),
    ]
    .into_iter()
    .flatten()
    {
        let candidate = Utc
            .with_ymd_and_hms(base.year(), base.month(), day, hour, minute, 0)
            .single()
            .map(|t| t + chrono::Duration::days(extra_day));
        if let Some(c) = candidate {
            let better = match best {
                Some(b) => (c - now).num_seconds().abs() < (b - now).num_seconds().abs(),
                None => true,
            };
            if better {
                best = Some(c);
            }
        }
    }
    best
}

/// Tries to consume one token into the block. Returns false for tokens the
/// block does not recognize (callers skip those).
pub(crate) fn parse_block_token(block: &mut WeatherBlock, token: &str) -> bool {
    if token == "CAVOK" {
        block.cavok = true;
        block.visibility_sm = Some(10.0);
        block.clouds = Some(Vec::new());
        block.weather = Some(Vec::new());
        return true;
    }
    if token == "NSW" {
        block.weather = Some(Vec::new());
        return true;
    }
    if matches!(token, "SKC" | "CLR" | "NSC" | "NCD") {
        block.clouds = Some(Vec::new());
        return true;
    }
    if let Some(cap) = wind_re().captures(token) {
        let speed_raw: f64 = cap[2].parse().unwrap_or(0.0);
        let gust_raw: Option<f64> = cap.get(3).and_then(|g| g.as_str().parse().ok());
        let factor = match &cap[4] {
            "MPS" => KT_PER_MPS,
            "KMH" => KT_PER_KMH,
            _ => 1.0,
        };
        let speed = speed_raw * factor;
        let gust = gust_raw.map(|g| g * factor);
        block.wind_dir = if &cap[1] == "VRB" {
            Some(WindDir::Variable)
        } else {
            let deg: u16 = cap[1].parse().unwrap_or(0);
            if deg == 0 && speed == 0.0 {
                // calm: 00000KT reports no direction
                None
            } else {
                Some(WindDir::Degrees(deg % 360))
            }
        };
        block.wind_speed_kt = Some(speed);
        // drop a gust that does not exceed the sustained speed
        block.wind_gust_kt = gust.filter(|g| *g >= speed);
        return true;
    }
    if let Some(cap) = wind_range_re().captures(token) {
        let from: u16 = cap[1].parse().unwrap_or(0);
        let to: u16 = cap[2].parse().unwrap_or(0);
        block.wind_range = Some((from % 360, to % 360));
        return true;
    }
    if let Some(cap) = vis_meters_re().captures(token) {
        let meters: f64 = cap[1].parse().unwrap_or(0.0);
        block.visibility_sm = Some(if meters >= 9999.0 {
            10.0
        } else {
            meters / METERS_PER_SM
        });
        return true;
    }
    if token.ends_with("SM") {
        if let Some(vis) = parse_vis_sm(token) {
            block.visibility_sm = Some(vis);
            return true;
        }
        return false;
    }
    if rvr_re().is_match(token) {
        // runway visual range: consumed, not retained
        return true;
    }
    if let Some(cap) = cloud_re().captures(token) {
        let cover = match &cap[1] {
            "FEW" => CloudCover::Few,
            "SCT" => CloudCover::Scattered,
            "BKN" => CloudCover::Broken,
            _ => CloudCover::Overcast,
        };
        let base_ft: u32 = cap[2].parse::<u32>().unwrap_or(0) * 100;
        block
            .clouds
            .get_or_insert_with(Vec::new)
            .push(CloudLayer { cover, base_ft });
        return true;
    }
    if let Some(cap) = vv_re().captures(token) {
        // vertical visibility reads as an overcast deck at that height
        let base_ft: u32 = cap[1].parse::<u32>().unwrap_or(0) * 100;
        block.clouds.get_or_insert_with(Vec::new).push(CloudLayer {
            cover: CloudCover::Overcast,
            base_ft,
        });
        return true;
    }
    if token.len() >= 2 && weather_re().is_match(token) {
        let body = token.trim_start_matches(['+', '-']);
        if !body.is_empty() {
            block
                .weather
                .get_or_insert_with(Vec::new)
                .push(token.to_string());
            return true;
        }
    }
    false
}

fn parse_signed_temp(s: &str) -> Option<i16> {
    if let Some(rest) = s.strip_prefix('M') {
        rest.parse::<i16>().ok().map(|v| -v)
    } else {
        s.parse().ok()
    }
}

pub fn parse_metar(raw: &str) -> Result<ParsedMetar, ParseError> {
    parse_metar_at(raw, Utc::now())
}

pub fn parse_metar_at(raw: &str, now: DateTime<Utc>) -> Result<ParsedMetar, ParseError> {
    let tokens = tokenize(raw);
    let mut metar = ParsedMetar {
        raw: raw.trim().to_string(),
        ..Default::default()
    };
    let mut block = WeatherBlock::default();
    let mut idx = 0;

    if matches!(tokens.first().map(String::as_str), Some("METAR" | "SPECI")) {
        idx += 1;
    }
    match tokens.get(idx) {
        Some(tok) if icao_re().is_match(tok) => {
            metar.icao = tok.clone();
            idx += 1;
        }
        _ => {
            return Err(ParseError {
                position: idx,
                reason: "no station identifier".to_string(),
            })
        }
    }

    for (pos, tok) in tokens.iter().enumerate().skip(idx) {
        let tok = tok.as_str();
        match tok {
            // trend and remark sections end structured consumption
            "NOSIG" | "BECMG" | "TEMPO" | "RMK" => break,
            "AUTO" => {
                metar.auto = true;
                continue;
            }
            "COR" | "NIL" => continue,
            _ => {}
        }
        if let Some(cap) = time_re().captures(tok) {
            if metar.issued_at.is_none() {
                let day: u32 = cap[1].parse().unwrap_or(0);
                let hour: u32 = cap[2].parse().unwrap_or(0);
                let minute: u32 = cap[3].parse().unwrap_or(0);
                metar.issued_at = zulu_daytime(day, hour, minute, now);
            }
            continue;
        }
        if let Some(cap) = temp_re().captures(tok) {
            metar.temperature_c = parse_signed_temp(&cap[1]);
            metar.dewpoint_c = cap.get(2).and_then(|d| parse_signed_temp(d.as_str()));
            continue;
        }
        if let Some(cap) = pressure_re().captures(tok) {
            let value: f64 = cap[2].parse().unwrap_or(0.0);
            metar.qnh_hpa = Some(match &cap[1] {
                "Q" => value,
                // Annnn is inches of mercury times 100
                _ => (value / 100.0 * 33.8639).round(),
            });
            continue;
        }
        if !parse_block_token(&mut block, tok) {
            log::debug!("[metar] skipping unrecognized token {:?} at {}", tok, pos);
        }
    }

    metar.wind_dir = block.wind_dir;
    metar.wind_speed_kt = block.wind_speed_kt;
    metar.wind_gust_kt = block.wind_gust_kt;
    metar.wind_range = block.wind_range;
    metar.visibility_sm = block.visibility_sm;
    metar.clouds = block.clouds;
    metar.weather = block.weather;
    metar.cavok = block.cavok;
    Ok(metar)
}
