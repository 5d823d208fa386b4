// SPDX-License-Identifier: MIT
// Copyright (c) 2026 StarTuz

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use simplelog::{ColorChoice, Config as LogConfig, LevelFilter, TermLogger, TerminalMode};
use std::path::PathBuf;
use std::sync::atomic::AtomicBool;

use wxbridge_core::fetch::AwcFetcher;
use wxbridge_core::sim::{BufferSink, FileSink, FileStateSource, FixedStateSource};
use wxbridge_core::{Engine, EngineConfig, StationRegistry};

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Engine configuration (JSON). Defaults apply when omitted.
    #[arg(short, long, env = "WXBRIDGE_CONFIG")]
    config: Option<PathBuf>,

    /// Station database CSV (OurAirports layout); required to run the bridge
    #[arg(short, long, env = "WXBRIDGE_STATIONS")]
    stations: Option<PathBuf>,

    /// Verbose logging
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the bridge loop against a simulator state file
    Run {
        /// JSON file the simulator plugin keeps current
        #[arg(long)]
        state_file: PathBuf,
        /// Directory receiving the injected 256-byte records
        #[arg(long, default_value = "wx-out")]
        out_dir: PathBuf,
        /// Directory for the downloaded report caches
        #[arg(long, default_value = "wx-cache")]
        cache_dir: PathBuf,
        /// Stop after this many ticks (0 = run until interrupted)
        #[arg(long, default_value_t = 0)]
        ticks: u64,
    },
    /// Synthesize once for a fixed position and print the result
    Once {
        #[arg(long)]
        lat: f64,
        #[arg(long)]
        lon: f64,
        #[arg(long, default_value_t = 0.0)]
        altitude_ft: f64,
        #[arg(long, default_value = "wx-cache")]
        cache_dir: PathBuf,
    },
    /// Parse a METAR string and dump the structured result
    Parse { metar: String },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let level = if cli.verbose {
        LevelFilter::Debug
    } else {
        LevelFilter::Info
    };
    TermLogger::init(
        level,
        LogConfig::default(),
        TerminalMode::Mixed,
        ColorChoice::Auto,
    )
    .context("failed to initialize logging")?;

    let config = match &cli.config {
        Some(path) => EngineConfig::load(path)?,
        None => EngineConfig::default(),
    };

    match cli.command {
        Commands::Run {
            state_file,
            out_dir,
            cache_dir,
            ticks,
        } => {
            let stations = cli
                .stations
                .context("--stations (or WXBRIDGE_STATIONS) is required to run")?;
            let registry = StationRegistry::load_csv(&stations)?;
            let fetcher = AwcFetcher::new(
                cache_dir,
                config.cache_ttl_seconds,
                config.fetch_timeout_seconds,
            );
            let aircraft = FileStateSource::new(state_file);
            let sink = FileSink::new(out_dir);
            let mut engine = Engine::new(config, registry, fetcher, aircraft, sink)?;

            let stop = AtomicBool::new(false);
            let max_ticks = if ticks == 0 { None } else { Some(ticks) };
            log::info!("Bridge running — press Ctrl-C to stop");
            engine.run(&stop, max_ticks);
        }
        Commands::Once {
            lat,
            lon,
            altitude_ft,
            cache_dir,
        } => {
            let stations = cli
                .stations
                .context("--stations (or WXBRIDGE_STATIONS) is required to run")?;
            let registry = StationRegistry::load_csv(&stations)?;
            let fetcher = AwcFetcher::new(
                cache_dir,
                config.cache_ttl_seconds,
                config.fetch_timeout_seconds,
            );
            let aircraft = FixedStateSource::new(lat, lon, altitude_ft);
            let mut engine = Engine::new(config, registry, fetcher, aircraft, BufferSink::new())?;

            engine.tick(chrono::Utc::now(), 0.0);
            let scopes: Vec<_> = engine.selected_scopes().to_vec();
            if scopes.is_empty() {
                println!("No stations in range and global fallback is disabled.");
            }
            for scope in scopes {
                match engine.sink().last_metar(&scope) {
                    Some(metar) => println!("{}", metar),
                    None => println!("{}: no report available", scope),
                }
            }
        }
        Commands::Parse { metar } => {
            let parsed = wxbridge_core::metar::parse_metar(&metar)?;
            println!("{:#?}", parsed);
        }
    }

    Ok(())
}
