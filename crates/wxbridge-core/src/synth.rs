use chrono::{DateTime, Utc};

use crate::smooth::CurrentWeather;

/// Wire record size: 255 bytes of ASCII METAR plus the NUL terminator.
pub const WIRE_LEN: usize = 256;

// substituted where METAR syntax requires a value the state does not have
const DEFAULT_QNH_HPA: f64 = 1013.0;
const DEFAULT_VISIBILITY_SM: f64 = 10.0;
const DEFAULT_TEMPERATURE_C: i16 = 15;
const DEFAULT_DEWPOINT_C: i16 = 10;

fn format_wind(current: &CurrentWeather) -> String {
    let speed = current.wind_speed_kt.unwrap_or(0.0).round().max(0.0) as u32;
    if speed == 0 {
        return "00000KT".to_string();
    }
    let gust = current
        .wind_gust_kt
        .map(|g| format!("G{:02}", g.round() as u32))
        .unwrap_or_default();
    match current.wind_dir_deg {
        Some(dir) if !current.wind_variable => {
            let dir = (dir.round() as u32) % 360;
            format!("{:03}{:02}{}KT", dir, speed, gust)
        }
        _ => format!("VRB{:02}{}KT", speed, gust),
    }
}

fn format_visibility(visibility_sm: Option<f64>) -> String {
    let vis = visibility_sm.unwrap_or(DEFAULT_VISIBILITY_SM);
    if vis >= 10.0 {
        "10SM".to_string()
    } else if vis < 0.25 {
        "M1/4SM".to_string()
    } else {
        format!("{}SM", (vis.round() as u32).max(1))
    }
}

fn format_clouds(current: &CurrentWeather) -> String {
    let layers = match current.clouds.as_deref() {
        Some(layers) if !layers.is_empty() => layers,
        _ => return "CLR".to_string(),
    };
    let mut sorted: Vec<_> = layers.to_vec();
    sorted.sort_by_key(|l| l.base_ft);
    sorted
        .iter()
        .take(3)
        .map(|l| format!("{}{:03}", l.cover.code(), l.base_ft / 100))
        .collect::<Vec<_>>()
        .join(" ")
}

fn format_celsius(value: i16) -> String {
    if value < 0 {
        format!("M{:02}", -value)
    } else {
        format!("{:02}", value)
    }
}

/// Renders the smoothed state as a canonical METAR:
/// `METAR <ICAO> <DDHHMM>Z <WIND> <VIS> <WX?> <CLOUDS> <T/D> <Q>`.
pub fn synthesize(current: &CurrentWeather, now: DateTime<Utc>) -> String {
    let mut parts: Vec<String> = Vec::with_capacity(10);
    parts.push("METAR".to_string());
    parts.push(current.scope.id().to_string());
    parts.push(now.format("%d%H%MZ").to_string());
    parts.push(format_wind(current));
    parts.push(format_visibility(current.visibility_sm));
    if let Some(weather) = &current.weather {
        parts.extend(weather.iter().cloned());
    }
    parts.push(format_clouds(current));
    parts.push(format!(
        "{}/{}",
        format_celsius(current.temperature_c.unwrap_or(DEFAULT_TEMPERATURE_C)),
        format_celsius(current.dewpoint_c.unwrap_or(DEFAULT_DEWPOINT_C)),
    ));
    parts.push(format!(
        "Q{:04}",
        current.qnh_hpa.unwrap_or(DEFAULT_QNH_HPA).round() as u32
    ));
    parts.join(" ")
}

/// Packs a METAR into the fixed 256-byte wire record: ASCII, NUL terminator,
/// zero fill. Anything past 255 bytes is cut (unreachable for synthesized
/// reports, defended anyway).
pub fn encode_wire(metar: &str) -> [u8; WIRE_LEN] {
    let mut record = [0u8; WIRE_LEN];
    let bytes = metar.as_bytes();
    let len = bytes.len().min(WIRE_LEN - 1);
    record[..len].copy_from_slice(&bytes[..len]);
    record
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metar::{parse_metar_at, CloudCover, CloudLayer, WindDir};
    use crate::stations::Scope;
    use chrono::TimeZone;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 3, 19, 14, 30, 0).unwrap()
    }

    fn current() -> CurrentWeather {
        CurrentWeather {
            scope: Scope::Station("KBOS".into()),
            wind_dir_deg: Some(240.0),
            wind_variable: false,
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

    #[test]
    fn test_synthesize_canonical_form() {
        let metar = synthesize(&current(), now());
        assert_eq!(metar, "METAR KBOS 191430Z 24015KT 10SM OVC030 12/08 Q1015");
    }

    #[test]
    fn test_synthesize_gust_weather_and_layers() {
        let mut c = current();
        c.wind_gust_kt = Some(25.0);
        c.weather = Some(vec!["-RA".into(), "BR".into()]);
        c.clouds = Some(vec![
            CloudLayer {
                cover: CloudCover::Broken,
                base_ft: 4000,
            },
            CloudLayer {
                cover: CloudCover::Few,
                base_ft: 1200,
            },
        ]);
        let metar = synthesize(&c, now());
        assert_eq!(
            metar,
            "METAR KBOS 191430Z 24015G25KT 10SM -RA BR FEW012 BKN040 12/08 Q1015"
        );
    }

    #[test]
    fn test_synthesize_calm_variable_and_low_visibility() {
        let mut c = current();
        c.wind_speed_kt = Some(0.0);
        assert!(synthesize(&c, now()).contains(" 00000KT "));

        c.wind_speed_kt = Some(4.0);
        c.wind_variable = true;
        c.wind_dir_deg = None;
        assert!(synthesize(&c, now()).contains(" VRB04KT "));

        c.visibility_sm = Some(0.1);
        assert!(synthesize(&c, now()).contains(" M1/4SM "));
    }

    #[test]
    fn test_synthesize_negative_temps_and_global_scope() {
        let mut c = current();
        c.scope = Scope::Global;
        c.temperature_c = Some(-3);
        c.dewpoint_c = Some(-7);
        let metar = synthesize(&c, now());
        assert!(metar.starts_with("METAR GLOB 191430Z"));
        assert!(metar.contains(" M03/M07 "));
    }

    #[test]
    fn test_synthesize_defaults_for_absent_fields() {
        let c = CurrentWeather {
            scope: Scope::Station("KBOS".into()),
            wind_dir_deg: None,
            wind_variable: false,
            wind_speed_kt: None,
            wind_gust_kt: None,
            visibility_sm: None,
            temperature_c: None,
            dewpoint_c: None,
            qnh_hpa: None,
            clouds: None,
            weather: None,
        };
        let metar = synthesize(&c, now());
        assert_eq!(metar, "METAR KBOS 191430Z 00000KT 10SM CLR 15/10 Q1013");
    }

    #[test]
    fn test_wire_record_is_nul_terminated_and_zero_filled() {
        let metar = synthesize(&current(), now());
        let record = encode_wire(&metar);
        assert_eq!(record.len(), WIRE_LEN);
        assert_eq!(&record[..metar.len()], metar.as_bytes());
        assert!(record[metar.len()..].iter().all(|&b| b == 0));

        let long = "X".repeat(400);
        let record = encode_wire(&long);
        assert_eq!(record[WIRE_LEN - 1], 0);
        assert_eq!(record[WIRE_LEN - 2], b'X');
    }

    #[test]
    fn test_synthesis_parses_back_identically() {
        let mut c = current();
        c.wind_gust_kt = Some(22.0);
        c.visibility_sm = Some(4.0);
        c.weather = Some(vec!["-RA".into()]);
        let metar = synthesize(&c, now());
        let parsed = parse_metar_at(&metar, now()).unwrap();
        assert_eq!(parsed.icao, "KBOS");
        assert_eq!(parsed.wind_dir, Some(WindDir::Degrees(240)));
        assert_eq!(parsed.wind_speed_kt, Some(15.0));
        assert_eq!(parsed.wind_gust_kt, Some(22.0));
        assert_eq!(parsed.visibility_sm, Some(4.0));
        assert_eq!(parsed.temperature_c, Some(12));
        assert_eq!(parsed.dewpoint_c, Some(8));
        assert_eq!(parsed.qnh_hpa, Some(1015.0));
        assert_eq!(parsed.clouds.unwrap(), c.clouds.unwrap());
        assert_eq!(parsed.weather.unwrap(), vec!["-RA".to_string()]);
    }
}
