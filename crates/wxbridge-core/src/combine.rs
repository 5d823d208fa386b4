use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::metar::{CloudLayer, ParsedMetar, WeatherBlock, WindDir};
use crate::stations::Scope;
use crate::taf::{resolve_at, ParsedTaf};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CombiningMode {
    MetarOnly,
    MetarTafFallback,
    MetarTafAssist,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Provenance {
    MetarOnly,
    TafFallback,
    ForecastAssisted,
}

/// The fully-resolved desired weather for one scope at this tick.
#[derive(Debug, Clone, PartialEq)]
pub struct TargetWeather {
    pub scope: Scope,
    pub provenance: Provenance,
    pub wind_dir: Option<WindDir>,
    pub wind_speed_kt: Option<f64>,
    pub wind_gust_kt: Option<f64>,
    pub visibility_sm: Option<f64>,
    pub temperature_c: Option<i16>,
    pub dewpoint_c: Option<i16>,
    pub qnh_hpa: Option<f64>,
    pub clouds: Option<Vec<CloudLayer>>,
    pub weather: Option<Vec<String>>,
}

fn from_metar(scope: Scope, metar: &ParsedMetar, provenance: Provenance) -> TargetWeather {
    TargetWeather {
        scope,
        provenance,
        wind_dir: metar.wind_dir,
        wind_speed_kt: metar.wind_speed_kt,
        wind_gust_kt: metar.wind_gust_kt,
        visibility_sm: metar.visibility_sm,
        temperature_c: metar.temperature_c,
        dewpoint_c: metar.dewpoint_c,
        qnh_hpa: metar.qnh_hpa,
        clouds: metar.clouds.clone(),
        weather: metar.weather.clone(),
    }
}

fn from_block(scope: Scope, block: WeatherBlock, provenance: Provenance) -> TargetWeather {
    TargetWeather {
        scope,
        provenance,
        wind_dir: block.wind_dir,
        wind_speed_kt: block.wind_speed_kt,
        wind_gust_kt: block.wind_gust_kt,
        visibility_sm: block.visibility_sm,
        temperature_c: None,
        dewpoint_c: None,
        qnh_hpa: None,
        clouds: block.clouds,
        weather: block.weather,
    }
}

/// Merges the parsed sources for one scope into a target. Returns `None`
/// when no source can supply data — the engine skips the injection rather
/// than invent weather.
pub fn combine(
    scope: Scope,
    metar: Option<&ParsedMetar>,
    taf: Option<&ParsedTaf>,
    mode: CombiningMode,
    stale_after_secs: i64,
    now: DateTime<Utc>,
) -> Option<TargetWeather> {
    // age is a function of the report's own issue time, not of fetch time;
    // a report without one is taken at face value
    let age_secs = metar
        .and_then(|m| m.issued_at)
        .map(|t| (now - t).num_seconds());
    let metar_fresh = age_secs.map_or(true, |age| age <= stale_after_secs);

    match mode {
        CombiningMode::MetarOnly => metar.map(|m| from_metar(scope, m, Provenance::MetarOnly)),
        CombiningMode::MetarTafFallback => match (metar, taf) {
            (Some(m), _) if metar_fresh => Some(from_metar(scope, m, Provenance::MetarOnly)),
            (_, Some(t)) => Some(from_block(
                scope,
                resolve_at(t, now),
                Provenance::TafFallback,
            )),
            (Some(m), None) => Some(from_metar(scope, m, Provenance::MetarOnly)),
            (None, None) => None,
        },
        CombiningMode::MetarTafAssist => match (metar, taf) {
            (Some(m), Some(t)) => {
                let mut target = from_metar(scope, m, Provenance::MetarOnly);
                let block = resolve_at(t, now);
                let mut assisted = false;
                if target.visibility_sm.is_none() && block.visibility_sm.is_some() {
                    target.visibility_sm = block.visibility_sm;
                    assisted = true;
                }
                if target.clouds.is_none() && block.clouds.is_some() {
                    target.clouds = block.clouds;
                    assisted = true;
                }
                if target.weather.is_none() && block.weather.is_some() {
                    target.weather = block.weather;
                    assisted = true;
                }
                // wind moves as one triple: only when the METAR reported no
                // wind at all does the forecast's dir/speed/gust come in
                if target.wind_dir.is_none()
                    && target.wind_speed_kt.is_none()
                    && (block.wind_dir.is_some() || block.wind_speed_kt.is_some())
                {
                    target.wind_dir = block.wind_dir;
                    target.wind_speed_kt = block.wind_speed_kt;
                    target.wind_gust_kt = block.wind_gust_kt;
                    assisted = true;
                }
                if assisted {
                    target.provenance = Provenance::ForecastAssisted;
                }
                Some(target)
            }
            (Some(m), None) => Some(from_metar(scope, m, Provenance::MetarOnly)),
            (None, Some(t)) => Some(from_block(
                scope,
                resolve_at(t, now),
                Provenance::TafFallback,
            )),
            (None, None) => None,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metar::{parse_metar_at, CloudCover};
    use crate::taf::parse_taf_at;
    use chrono::TimeZone;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 3, 19, 14, 0, 0).unwrap()
    }

    fn scope() -> Scope {
        Scope::Station("KBOS".into())
    }

    #[test]
    fn test_metar_only_passes_through() {
        let m = parse_metar_at("KBOS 191354Z 24015KT 10SM OVC030 12/08 Q1015", now()).unwrap();
        let t = combine(scope(), Some(&m), None, CombiningMode::MetarOnly, 300, now()).unwrap();
        assert_eq!(t.provenance, Provenance::MetarOnly);
        assert_eq!(t.wind_dir, Some(WindDir::Degrees(240)));
        assert_eq!(t.qnh_hpa, Some(1015.0));
    }

    #[test]
    fn test_metar_only_without_metar_is_none() {
        let taf = parse_taf_at("TAF KBOS 191130Z 1912/2018 24012KT P6SM SCT035", now()).unwrap();
        assert!(combine(
            scope(),
            None,
            Some(&taf),
            CombiningMode::MetarOnly,
            300,
            now()
        )
        .is_none());
    }

    #[test]
    fn test_fallback_stale_metar_uses_active_taf_group() {
        // METAR issued 13:53:20 against "now" 14:00:00 is 400 s old, past
        // the 300 s threshold
        let m = parse_metar_at("KBOS 191353Z 24015KT 10SM OVC030 12/08 Q1015", now()).unwrap();
        let m = ParsedMetar {
            issued_at: Some(Utc.with_ymd_and_hms(2025, 3, 19, 13, 53, 20).unwrap()),
            ..m
        };
        let at = Utc.with_ymd_and_hms(2025, 3, 19, 14, 0, 0).unwrap();
        let taf = parse_taf_at(
            "TAF KBOS 191130Z 1912/2018 31020G30KT 9999 BKN040",
            now(),
        )
        .unwrap();
        let t = combine(
            scope(),
            Some(&m),
            Some(&taf),
            CombiningMode::MetarTafFallback,
            300,
            at,
        )
        .unwrap();
        assert_eq!(t.provenance, Provenance::TafFallback);
        assert_eq!(t.wind_dir, Some(WindDir::Degrees(310)));
        assert_eq!(t.wind_speed_kt, Some(20.0));
        assert_eq!(t.wind_gust_kt, Some(30.0));
        assert_eq!(t.visibility_sm, Some(10.0));
        let clouds = t.clouds.unwrap();
        assert_eq!(clouds[0].cover, CloudCover::Broken);
        assert_eq!(clouds[0].base_ft, 4000);
    }

    #[test]
    fn test_fallback_fresh_metar_wins() {
        let m = parse_metar_at("KBOS 191358Z 24015KT 10SM OVC030 12/08 Q1015", now()).unwrap();
        let taf = parse_taf_at(
            "TAF KBOS 191130Z 1912/2018 31020G30KT 9999 BKN040",
            now(),
        )
        .unwrap();
        let t = combine(
            scope(),
            Some(&m),
            Some(&taf),
            CombiningMode::MetarTafFallback,
            300,
            now(),
        )
        .unwrap();
        assert_eq!(t.provenance, Provenance::MetarOnly);
        assert_eq!(t.wind_dir, Some(WindDir::Degrees(240)));
    }

    #[test]
    fn test_assist_fills_only_absent_fields() {
        // METAR with wind and pressure but no visibility or clouds
        let m = parse_metar_at("KBOS 191354Z 24015KT 12/08 Q1015", now()).unwrap();
        let taf = parse_taf_at(
            "TAF KBOS 191130Z 1912/2018 31020G30KT 6SM BKN040",
            now(),
        )
        .unwrap();
        let t = combine(
            scope(),
            Some(&m),
            Some(&taf),
            CombiningMode::MetarTafAssist,
            300,
            now(),
        )
        .unwrap();
        assert_eq!(t.provenance, Provenance::ForecastAssisted);
        // wind stays the METAR triple even though the TAF has one
        assert_eq!(t.wind_dir, Some(WindDir::Degrees(240)));
        assert_eq!(t.wind_speed_kt, Some(15.0));
        assert_eq!(t.wind_gust_kt, None);
        // visibility and clouds came from the forecast
        assert_eq!(t.visibility_sm, Some(6.0));
        assert_eq!(t.clouds.unwrap()[0].base_ft, 4000);
        // temperature and pressure are METAR-only concerns
        assert_eq!(t.temperature_c, Some(12));
        assert_eq!(t.qnh_hpa, Some(1015.0));
    }

    #[test]
    fn test_assist_takes_wind_triple_atomically() {
        let m = parse_metar_at("KBOS 191354Z 10SM CLR 12/08 Q1015", now()).unwrap();
        assert!(m.wind_dir.is_none() && m.wind_speed_kt.is_none());
        let taf = parse_taf_at(
            "TAF KBOS 191130Z 1912/2018 31020G30KT 6SM BKN040",
            now(),
        )
        .unwrap();
        let t = combine(
            scope(),
            Some(&m),
            Some(&taf),
            CombiningMode::MetarTafAssist,
            300,
            now(),
        )
        .unwrap();
        assert_eq!(t.wind_dir, Some(WindDir::Degrees(310)));
        assert_eq!(t.wind_speed_kt, Some(20.0));
        assert_eq!(t.wind_gust_kt, Some(30.0));
    }

    #[test]
    fn test_both_sources_absent_yields_none() {
        for mode in [
            CombiningMode::MetarOnly,
            CombiningMode::MetarTafFallback,
            CombiningMode::MetarTafAssist,
        ] {
            assert!(combine(scope(), None, None, mode, 300, now()).is_none());
        }
    }
}
