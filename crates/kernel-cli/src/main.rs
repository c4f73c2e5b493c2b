use std::net::SocketAddr;
use std::path::PathBuf;
use std::process::ExitCode;

use chrono::{Duration, Local, Timelike, Utc};
use clap::{Parser, Subcommand};
use contracts::SimulationConfig;
use kernel_api::{load_config, serve};
use kernel_core::{CrowdMonitor, SeriesKind, SimulationEngine};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "crowdwatch", version, about = "Stadium-district crowd safety simulator")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run producers and serve the dashboard feed.
    Serve {
        #[arg(long, default_value = "127.0.0.1:8000")]
        addr: SocketAddr,
        /// JSON config file layered over the defaults.
        #[arg(long)]
        config: Option<PathBuf>,
        #[arg(long)]
        seed: Option<u64>,
    },
    /// Advance the simulation headless for a fixed number of density ticks.
    Simulate {
        #[arg(long, default_value_t = 120)]
        ticks: u64,
        #[arg(long)]
        seed: Option<u64>,
        #[arg(long)]
        config: Option<PathBuf>,
        /// Print one JSON line per tick instead of a text summary.
        #[arg(long)]
        json: bool,
    },
    /// List the monitored zones.
    Zones,
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();
}

fn load(path: Option<PathBuf>, seed: Option<u64>) -> Result<SimulationConfig, String> {
    let mut config =
        load_config(path.as_deref()).map_err(|err| format!("config error: {err}"))?;
    if let Some(seed) = seed {
        config.seed = seed;
    }
    Ok(config)
}

fn run_simulation(config: &SimulationConfig, ticks: u64, json: bool) -> Result<(), String> {
    let mut monitor = CrowdMonitor::new(SimulationEngine::bengaluru(config.seed), config.thresholds);
    let tick_secs = config.intervals.density_secs;
    let start = Utc::now();
    let mut total_alerts = 0_usize;

    for _ in 0..ticks {
        let elapsed = i64::try_from(monitor.engine.tick() * tick_secs).unwrap_or(i64::MAX);
        let now = start + Duration::seconds(elapsed);

        // Metro samples at half the density rate, as with the default producer intervals.
        if monitor.engine.tick() % 2 == 1 {
            let metro = monitor.metro_tick(now.with_timezone(&Local).hour(), now);
            total_alerts += usize::from(metro.alert.is_some());
        }

        let outcome = monitor
            .density_tick(now, tick_secs)
            .map_err(|err| format!("simulation error: {err}"))?;
        total_alerts += outcome.alerts.len();

        let density = &outcome.tick;
        if json {
            let line = serde_json::json!({
                "tick": density.tick,
                "summary": density.summary,
                "transitions": density.transitions,
                "alerts": outcome.alerts,
            });
            println!("{line}");
        } else {
            println!(
                "tick={} max={} critical={} warning={} transitions={} alerts={}",
                density.tick,
                density.summary.max_density_overall,
                density.summary.critical_zones.len(),
                density.summary.warning_zones.len(),
                density.transitions.len(),
                outcome.alerts.len(),
            );
        }
    }

    if !json {
        let history = &monitor.history;
        let counts = history.counts();
        println!(
            "seed={} ticks={} alerts={} transitions_kept={} density_trend={:?} metro_trend={:?}",
            config.seed,
            monitor.engine.tick(),
            total_alerts,
            counts.total_phase_transitions,
            history.trend(SeriesKind::Density),
            history.trend(SeriesKind::Metro),
        );
        if let Some(prediction) = history.predict_next_alert(&monitor.thresholds, tick_secs) {
            println!(
                "next {:?} alert in ~{} min (density {} rising {:.1}/tick)",
                prediction.level,
                prediction.estimated_minutes,
                prediction.current_density,
                prediction.rate,
            );
        }
    }
    Ok(())
}

fn print_zones() {
    let engine = SimulationEngine::bengaluru(0);
    let registry = engine.registry();
    for zone in registry.zones() {
        let marker = if zone.id == registry.primary_zone().id { "*" } else { " " };
        println!(
            "{marker} {:<16} {:<24} {:?} capacity={} max_intensity={:.0}",
            zone.id,
            zone.name,
            zone.zone_type,
            zone.capacity,
            zone.max_intensity(),
        );
    }
    for station in engine.metro().stations() {
        println!(
            "  metro {:<16} {:<14} capacity={} zone={}",
            station.id,
            station.line,
            station.capacity,
            station.coupled_zone.as_deref().unwrap_or("-"),
        );
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    init_tracing();
    let cli = Cli::parse();

    let result = match cli.command {
        Command::Serve { addr, config, seed } => match load(config, seed) {
            Ok(config) => {
                info!(addr = %addr, seed = config.seed, "cli.serve");
                serve(addr, config)
                    .await
                    .map_err(|err| format!("server error: {err}"))
            }
            Err(err) => Err(err),
        },
        Command::Simulate {
            ticks,
            seed,
            config,
            json,
        } => load(config, seed).and_then(|config| run_simulation(&config, ticks, json)),
        Command::Zones => {
            print_zones();
            Ok(())
        }
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("error: {err}");
            ExitCode::FAILURE
        }
    }
}
