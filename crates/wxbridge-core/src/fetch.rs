use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use flate2::read::GzDecoder;
use std::collections::{HashMap, HashSet};
use std::fs;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::time::Duration;

const METAR_CACHE_URL: &str = "https://aviationweather.gov/data/cache/metars.cache.csv.gz";
const TAF_CACHE_URL: &str = "https://aviationweather.gov/data/cache/tafs.cache.csv.gz";

/// One raw report as fetched. `issued_at` comes from the provider's own
/// metadata so staleness is a property of the data, not of fetch timing.
#[derive(Debug, Clone, PartialEq)]
pub struct RawReport {
    pub text: String,
    pub issued_at: Option<DateTime<Utc>>,
}

/// The upstream weather provider. Missing stations in a result map are not
/// errors; a station simply has no current report.
pub trait WeatherFetcher {
    fn fetch_metars(&mut self, icaos: &[String]) -> Result<HashMap<String, RawReport>>;
    fn fetch_tafs(&mut self, icaos: &[String]) -> Result<HashMap<String, RawReport>>;
}

/// Fetches the NOAA Aviation Weather Center bulk caches
/// (`metars.cache.csv.gz` / `tafs.cache.csv.gz`), keeps the decompressed CSV
/// on disk, and re-downloads only when the local copy outlives the TTL.
pub struct AwcFetcher {
    cache_dir: PathBuf,
    ttl: Duration,
    timeout: Duration,
}

impl AwcFetcher {
    pub fn new<P: Into<PathBuf>>(cache_dir: P, ttl_seconds: u64, timeout_seconds: u64) -> Self {
        Self {
            cache_dir: cache_dir.into(),
            ttl: Duration::from_secs(ttl_seconds),
            timeout: Duration::from_secs(timeout_seconds),
        }
    }

    fn cache_is_fresh(&self, path: &Path) -> bool {
        if let Ok(metadata) = fs::metadata(path) {
            if let Ok(modified) = metadata.modified() {
                if let Ok(elapsed) = modified.elapsed() {
                    return elapsed < self.ttl;
                }
            }
        }
        false
    }

    /// Downloads and decompresses one bulk cache if the local copy expired.
    fn refresh(&self, url: &str, path: &Path) -> Result<()> {
        if self.cache_is_fresh(path) {
            log::debug!("Using valid cached report data — cache_path={:?}", path);
            return Ok(());
        }

        log::info!(
            "Report cache expired or missing; fetching live data — cache_path={:?} url={}",
            path,
            url
        );
        let client = reqwest::blocking::Client::builder()
            .timeout(self.timeout)
            .build()?;
        let response = client.get(url).send()?.error_for_status()?;
        let bytes = response.bytes()?;
        log::debug!("Downloaded gzipped report data — compressed_bytes={}", bytes.len());

        let mut decoder = GzDecoder::new(&bytes[..]);
        let mut csv_data = String::new();
        decoder.read_to_string(&mut csv_data)?;

        fs::create_dir_all(&self.cache_dir)
            .with_context(|| format!("failed to create cache dir {:?}", self.cache_dir))?;
        fs::write(path, &csv_data)?;
        log::info!(
            "Report cache updated — cache_path={:?} uncompressed_bytes={}",
            path,
            csv_data.len()
        );
        Ok(())
    }

    fn fetch(&self, url: &str, file: &str, icaos: &[String]) -> Result<HashMap<String, RawReport>> {
        let path = self.cache_dir.join(file);
        if let Err(e) = self.refresh(url, &path) {
            // a stale cache still beats no data; only fail without one
            if !path.exists() {
                return Err(e);
            }
            log::warn!("Refresh failed, serving stale cache — cache_path={:?} err={:#}", path, e);
        }
        Ok(extract_reports(&path, icaos))
    }
}

impl WeatherFetcher for AwcFetcher {
    fn fetch_metars(&mut self, icaos: &[String]) -> Result<HashMap<String, RawReport>> {
        self.fetch(METAR_CACHE_URL, "metars.cache.csv", icaos)
    }

    fn fetch_tafs(&mut self, icaos: &[String]) -> Result<HashMap<String, RawReport>> {
        self.fetch(TAF_CACHE_URL, "tafs.cache.csv", icaos)
    }
}

/// Pulls the raw report and issue time for each requested station out of a
/// bulk cache CSV. NOAA prepends a few comment lines, so the header row is
/// located by its `raw_text` lead column and indexes are mapped from it.
/// Returns an empty map if the file is missing or unreadable.
pub(crate) fn extract_reports(path: &Path, icaos: &[String]) -> HashMap<String, RawReport> {
    let targets: HashSet<String> = icaos.iter().map(|s| s.trim().to_uppercase()).collect();
    let mut result = HashMap::new();

    let mut rdr = match csv::ReaderBuilder::new()
        .flexible(true)
        .has_headers(false)
        .from_path(path)
    {
        Ok(r) => r,
        Err(e) => {
            log::warn!("Report cache unreadable — cache_path={:?} err={}", path, e);
            return result;
        }
    };

    let mut headers_found = false;
    let mut idx_raw_text = 0usize;
    let mut idx_station = 1usize;
    let mut idx_time: Option<usize> = None;

    for record in rdr.records().flatten() {
        if !headers_found {
            if !record.is_empty() && record[0].starts_with("raw_text") {
                for (i, field) in record.iter().enumerate() {
                    match field {
                        "raw_text" => idx_raw_text = i,
                        "station_id" => idx_station = i,
                        "observation_time" | "issue_time" => {
                            if idx_time.is_none() {
                                idx_time = Some(i);
                            }
                        }
                        _ => {}
                    }
                }
                headers_found = true;
            }
            continue;
        }

        let station = match record.get(idx_station) {
            Some(s) => s.trim().to_uppercase(),
            None => continue,
        };
        if !targets.contains(&station) {
            continue;
        }
        let text = match record.get(idx_raw_text).map(str::trim) {
            Some(t) if !t.is_empty() => t.to_string(),
            _ => continue,
        };
        let issued_at = idx_time
            .and_then(|i| record.get(i))
            .and_then(|s| DateTime::parse_from_rfc3339(s.trim()).ok())
            .map(|t| t.with_timezone(&Utc));
        result.insert(station, RawReport { text, issued_at });
    }

    log::debug!(
        "extract_reports — cache_path={:?} requested={} found={}",
        path,
        targets.len(),
        result.len()
    );
    result
}
