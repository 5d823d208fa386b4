use chrono::{DateTime, Months, Utc};
use regex::Regex;
use std::sync::OnceLock;

use crate::metar::{parse_block_token, tokenize, zulu_daytime, ParseError, WeatherBlock};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TafGroupKind {
    From,
    Becoming,
    Tempo,
    Prob,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TafGroup {
    pub kind: TafGroupKind,
    pub from: DateTime<Utc>,
    pub to: DateTime<Utc>,
    pub probability: Option<u8>,
    pub block: WeatherBlock,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ParsedTaf {
    pub icao: String,
    pub issued_at: Option<DateTime<Utc>>,
    pub valid_from: DateTime<Utc>,
    pub valid_to: DateTime<Utc>,
    pub prevailing: WeatherBlock,
    pub groups: Vec<TafGroup>,
    pub raw: String,
}

fn issue_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^(\d{2})(\d{2})(\d{2})Z$").unwrap())
}

fn validity_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    // DDHH/DDHH, with the legacy run-together DDHHDDHH form
    RE.get_or_init(|| Regex::new(r"^(\d{2})(\d{2})/?(\d{2})(\d{2})$").unwrap())
}

fn fm_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^FM(\d{2})(\d{2})(\d{2})$").unwrap())
}

fn prob_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^PROB(\d{2})$").unwrap())
}

fn is_icao(token: &str) -> bool {
    token.len() == 4 && token.chars().all(|c| c.is_ascii_uppercase())
}

/// Resolves a DDHH window endpoint so that `to` always lands after `from`.
fn window_end(day: u32, hour: u32, from: DateTime<Utc>) -> Option<DateTime<Utc>> {
    let mut to = zulu_daytime(day, hour, 0, from)?;
    if to <= from {
        to = to.checked_add_months(Months::new(1))?;
    }
    Some(to)
}

pub fn parse_taf(raw: &str) -> Result<ParsedTaf, ParseError> {
    parse_taf_at(raw, Utc::now())
}

/// Parses a TAF (single or multi-line; lines are joined on whitespace).
/// Validity and group windows are reconstructed against `now`, assuming the
/// validity starts no more than about a month away in either direction.
pub fn parse_taf_at(raw: &str, now: DateTime<Utc>) -> Result<ParsedTaf, ParseError> {
    let tokens = tokenize(raw);
    let mut idx = 0;

    if tokens.get(idx).map(String::as_str) == Some("TAF") {
        idx += 1;
    }
    if matches!(tokens.get(idx).map(String::as_str), Some("AMD" | "COR")) {
        idx += 1;
    }

    let icao = match tokens.get(idx) {
        Some(tok) if is_icao(tok) => {
            idx += 1;
            tok.clone()
        }
        _ => {
            return Err(ParseError {
                position: idx,
                reason: "no station identifier".to_string(),
            })
        }
    };

    let mut issued_at = None;
    if let Some(cap) = tokens.get(idx).and_then(|t| issue_re().captures(t)) {
        let day: u32 = cap[1].parse().unwrap_or(0);
        let hour: u32 = cap[2].parse().unwrap_or(0);
        let minute: u32 = cap[3].parse().unwrap_or(0);
        issued_at = zulu_daytime(day, hour, minute, now);
        idx += 1;
    }

    let (valid_from, valid_to) = match tokens.get(idx).and_then(|t| validity_re().captures(t)) {
        Some(cap) => {
            let d1: u32 = cap[1].parse().unwrap_or(0);
            let h1: u32 = cap[2].parse().unwrap_or(0);
            let d2: u32 = cap[3].parse().unwrap_or(0);
            let h2: u32 = cap[4].parse().unwrap_or(0);
            let from = zulu_daytime(d1, h1, 0, now).ok_or_else(|| ParseError {
                position: idx,
                reason: "bad validity start".to_string(),
            })?;
            let to = window_end(d2, h2, from).ok_or_else(|| ParseError {
                position: idx,
                reason: "bad validity end".to_string(),
            })?;
            idx += 1;
            (from, to)
        }
        None => {
            return Err(ParseError {
                position: idx,
                reason: "no validity window".to_string(),
            })
        }
    };

    let mut prevailing = WeatherBlock::default();
    let mut groups: Vec<TafGroup> = Vec::new();
    // None while filling the prevailing block, Some while inside a group
    let mut open: Option<TafGroup> = None;

    let mut i = idx;
    while i < tokens.len() {
        let tok = tokens[i].as_str();

        if tok == "RMK" {
            break;
        }
        if let Some(cap) = fm_re().captures(tok) {
            if let Some(group) = open.take() {
                groups.push(group);
            }
            let day: u32 = cap[1].parse().unwrap_or(0);
            let hour: u32 = cap[2].parse().unwrap_or(0);
            let minute: u32 = cap[3].parse().unwrap_or(0);
            if let Some(from) = zulu_daytime(day, hour, minute, valid_from) {
                open = Some(TafGroup {
                    kind: TafGroupKind::From,
                    from,
                    to: valid_to,
                    probability: None,
                    block: WeatherBlock::default(),
                });
            }
            i += 1;
            continue;
        }

        if tok == "BECMG" || tok == "TEMPO" {
            if let Some(group) = open.take() {
                groups.push(group);
            }
            let kind = if tok == "BECMG" {
                TafGroupKind::Becoming
            } else {
                TafGroupKind::Tempo
            };
            let window = tokens
                .get(i + 1)
                .and_then(|t| validity_re().captures(t))
                .and_then(|cap| {
                    let d1: u32 = cap[1].parse().ok()?;
                    let h1: u32 = cap[2].parse().ok()?;
                    let d2: u32 = cap[3].parse().ok()?;
                    let h2: u32 = cap[4].parse().ok()?;
                    let from = zulu_daytime(d1, h1, 0, valid_from)?;
                    let to = window_end(d2, h2, from)?;
                    Some((from, to))
                });
            let (from, to) = match window {
                Some(w) => {
                    i += 2;
                    w
                }
                None => {
                    i += 1;
                    (valid_from, valid_to)
                }
            };
            open = Some(TafGroup {
                kind,
                from,
                to,
                probability: None,
                block: WeatherBlock::default(),
            });
            continue;
        }

        if let Some(cap) = prob_re().captures(tok) {
            if let Some(group) = open.take() {
                groups.push(group);
            }
            let probability: Option<u8> = cap[1].parse().ok();
            let mut j = i + 1;
            if tokens.get(j).map(String::as_str) == Some("TEMPO") {
                j += 1;
            }
            let window = tokens
                .get(j)
                .and_then(|t| validity_re().captures(t))
                .and_then(|cap| {
                    let d1: u32 = cap[1].parse().ok()?;
                    let h1: u32 = cap[2].parse().ok()?;
                    let d2: u32 = cap[3].parse().ok()?;
                    let h2: u32 = cap[4].parse().ok()?;
                    let from = zulu_daytime(d1, h1, 0, valid_from)?;
                    let to = window_end(d2, h2, from)?;
                    Some((from, to))
                });
            // a bare PROBnn applies to the rest of the validity window
            let (from, to) = match window {
                Some(w) => {
                    j += 1;
                    w
                }
                None => (valid_from, valid_to),
            };
            open = Some(TafGroup {
                kind: TafGroupKind::Prob,
                from,
                to,
                probability,
                block: WeatherBlock::default(),
            });
            i = j;
            continue;
        }

        let block = match open.as_mut() {
            Some(group) => &mut group.block,
            None => &mut prevailing,
        };
        if !parse_block_token(block, tok) {
            log::debug!("[taf] skipping unrecognized token {:?} at {}", tok, i);
        }
        i += 1;
    }
    if let Some(group) = open.take() {
        groups.push(group);
    }

    // FM groups run until the next FM begins
    let fm_starts: Vec<DateTime<Utc>> = groups
        .iter()
        .filter(|g| g.kind == TafGroupKind::From)
        .map(|g| g.from)
        .collect();
    for group in groups.iter_mut().filter(|g| g.kind == TafGroupKind::From) {
        if let Some(next) = fm_starts.iter().filter(|s| **s > group.from).min() {
            group.to = *next;
        }
    }

    groups.sort_by_key(|g| g.from);

    Ok(ParsedTaf {
        icao,
        issued_at,
        valid_from,
        valid_to,
        prevailing,
        groups,
        raw: raw.trim().to_string(),
    })
}

/// Collapses a TAF to the block in force at `now`: FM groups replace the
/// whole block, BECMG overlays its stated fields once its window has begun,
/// TEMPO/PROB overlay only while their window contains `now`.
pub fn resolve_at(taf: &ParsedTaf, now: DateTime<Utc>) -> WeatherBlock {
    let mut block = taf.prevailing.clone();
    for group in &taf.groups {
        match group.kind {
            TafGroupKind::From => {
                if group.from <= now {
                    block = group.block.clone();
                }
            }
            TafGroupKind::Becoming => {
                if group.from <= now {
                    overlay(&mut block, &group.block);
                }
            }
            TafGroupKind::Tempo | TafGroupKind::Prob => {
                if group.from <= now && now <= group.to {
                    overlay(&mut block, &group.block);
                }
            }
        }
    }
    block
}

/// Copies the stated fields of `over` onto `base`. Wind moves as one triple
/// so a direction never pairs with a speed from a different source.
pub fn overlay(base: &mut WeatherBlock, over: &WeatherBlock) {
    if over.wind_dir.is_some() || over.wind_speed_kt.is_some() {
        base.wind_dir = over.wind_dir;
        base.wind_speed_kt = over.wind_speed_kt;
        base.wind_gust_kt = over.wind_gust_kt;
        base.wind_range = over.wind_range;
    }
    if over.visibility_sm.is_some() {
        base.visibility_sm = over.visibility_sm;
    }
    if over.clouds.is_some() {
        base.clouds = over.clouds.clone();
    }
    if over.weather.is_some() {
        base.weather = over.weather.clone();
    }
    if over.cavok {
        base.cavok = true;
    }
}
