//! acperf - aircraft performance figures from the command line

mod config;
mod dataset;

use acperf_core::atmosphere;
use acperf_core::{
    EngineConfig, FlightConditions, LoadSheet, PerformanceEngine, SurfaceCondition, WindInput,
};
use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::filter::Directive;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::config::Config;

#[derive(Parser, Debug)]
#[command(author, version, about = "Aircraft performance computation engine")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Compute performance figures for one flight leg
    Compute(ComputeArgs),
    /// Load datasets and report any integrity errors
    Check {
        /// Dataset file or directory
        #[arg(long)]
        dataset: Option<PathBuf>,
    },
    /// List loaded aircraft and their metrics
    List {
        /// Dataset file or directory
        #[arg(long)]
        dataset: Option<PathBuf>,
    },
}

#[derive(Args, Debug)]
struct ComputeArgs {
    /// Dataset file or directory
    #[arg(long)]
    dataset: Option<PathBuf>,

    /// Aircraft id as declared in the dataset
    #[arg(long)]
    aircraft: String,

    /// Metric to compute (repeatable)
    #[arg(long = "metric", required = true)]
    metrics: Vec<String>,

    /// Flight conditions as a JSON document; replaces the condition flags
    #[arg(long)]
    conditions: Option<PathBuf>,

    /// Load sheet JSON; takeoff/landing weight and CG come from mass and balance
    #[arg(long)]
    load_sheet: Option<PathBuf>,

    /// Takeoff weight (kg)
    #[arg(long)]
    weight: Option<f64>,

    /// CG position (m aft of datum)
    #[arg(long)]
    cg: Option<f64>,

    /// Pressure altitude (ft)
    #[arg(long, conflicts_with_all = ["elevation", "qnh"])]
    pressure_altitude: Option<f64>,

    /// Field elevation (ft), combined with --qnh
    #[arg(long, requires = "qnh")]
    elevation: Option<f64>,

    /// QNH (hPa)
    #[arg(long, requires = "elevation")]
    qnh: Option<f64>,

    /// Outside air temperature (C); defaults to ISA at the pressure altitude
    #[arg(long)]
    temperature: Option<f64>,

    /// Runway wind component (kt), negative for tailwind
    #[arg(long, conflicts_with_all = ["wind_dir", "wind_speed"])]
    headwind: Option<f64>,

    /// Reported wind direction (deg)
    #[arg(long, requires_all = ["wind_speed", "runway_heading"])]
    wind_dir: Option<f64>,

    /// Reported wind speed (kt)
    #[arg(long, requires = "wind_dir")]
    wind_speed: Option<f64>,

    /// Runway heading (deg)
    #[arg(long)]
    runway_heading: Option<f64>,

    /// Runway slope (%), positive uphill
    #[arg(long, default_value_t = 0.0)]
    slope: f64,

    /// Runway surface: paved_dry, paved_wet, grass_dry, grass_wet, contaminated
    #[arg(long, value_parser = parse_surface, default_value = "paved_dry")]
    surface: SurfaceCondition,

    /// Landing weight (kg)
    #[arg(long)]
    landing_weight: Option<f64>,

    /// Trip fuel (kg), used to derive landing weight
    #[arg(long)]
    trip_fuel: Option<f64>,

    /// Evaluate metrics one after another
    #[arg(long)]
    sequential: bool,

    /// Exit with status 2 when the result is not valid
    #[arg(long)]
    strict: bool,

    /// Pretty-print the JSON output
    #[arg(long)]
    pretty: bool,
}

fn parse_surface(value: &str) -> Result<SurfaceCondition, String> {
    serde_json::from_value(serde_json::Value::String(value.to_string()))
        .map_err(|_| format!("unknown surface '{value}'"))
}

impl ComputeArgs {
    fn flight_conditions(&self) -> Result<FlightConditions> {
        if let Some(path) = &self.conditions {
            return dataset::read_json(path);
        }

        let weight = match (self.weight, &self.load_sheet) {
            (Some(weight), _) => weight,
            // Replaced by the mass and balance result
            (None, Some(_)) => 0.0,
            (None, None) => bail!("--weight is required without --conditions or --load-sheet"),
        };
        let pressure_altitude = match (self.pressure_altitude, self.elevation, self.qnh) {
            (Some(pa), _, _) => pa,
            (None, Some(elevation), Some(qnh)) => atmosphere::pressure_altitude_ft(elevation, qnh),
            _ => bail!("--pressure-altitude or --elevation/--qnh is required without --conditions"),
        };
        let temperature = self
            .temperature
            .unwrap_or_else(|| atmosphere::isa_temperature_c(pressure_altitude));

        let wind = match (self.headwind, self.wind_dir, self.wind_speed, self.runway_heading) {
            (Some(headwind_kt), ..) => WindInput::Component { headwind_kt },
            (None, Some(direction_deg), Some(speed_kt), Some(runway_heading_deg)) => {
                WindInput::Reported {
                    direction_deg,
                    speed_kt,
                    runway_heading_deg,
                }
            }
            _ => WindInput::Calm,
        };

        let mut conditions = FlightConditions::new(weight, pressure_altitude, temperature)
            .with_wind(wind)
            .with_runway(self.slope, self.surface);
        conditions.cg_m = self.cg;
        conditions.landing_weight_kg = self.landing_weight;
        conditions.trip_fuel_kg = self.trip_fuel;
        Ok(conditions)
    }
}

fn print_json<T: serde::Serialize>(value: &T, pretty: bool) -> Result<()> {
    let text = if pretty {
        serde_json::to_string_pretty(value)?
    } else {
        serde_json::to_string(value)?
    };
    println!("{text}");
    Ok(())
}

fn compute(args: ComputeArgs, config: &Config) -> Result<bool> {
    let path = dataset::resolve_path(args.dataset.as_deref(), config)?;
    let store = Arc::new(dataset::load_store(&path)?);
    let engine = PerformanceEngine::with_config(
        store,
        EngineConfig {
            parallel_metrics: config.parallel && !args.sequential,
            ..EngineConfig::default()
        },
    );

    let conditions = args.flight_conditions()?;
    match &args.load_sheet {
        Some(sheet_path) => {
            let sheet: LoadSheet = dataset::read_json(sheet_path)?;
            let (loading, result) = engine
                .compute_with_loading(&args.aircraft, &args.metrics, &conditions, &sheet)
                .with_context(|| format!("mass and balance failed for '{}'", args.aircraft))?;
            print_json(
                &serde_json::json!({ "loading": loading, "performance": result }),
                args.pretty,
            )?;
            Ok(result.valid)
        }
        None => {
            let result = engine.compute_performance(&args.aircraft, &args.metrics, &conditions);
            print_json(&result, args.pretty)?;
            Ok(result.valid)
        }
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = Config::from_env();

    let mut filter = tracing_subscriber::EnvFilter::from_default_env();
    for directive in config.log_directive.split(',').filter(|d| !d.trim().is_empty()) {
        filter = filter.add_directive(
            directive
                .trim()
                .parse::<Directive>()
                .with_context(|| format!("invalid ACPERF_LOG directive '{directive}'"))?,
        );
    }
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(filter)
        .init();

    match cli.command {
        Command::Compute(args) => {
            let strict = args.strict;
            let valid = compute(args, &config)?;
            if strict && !valid {
                std::process::exit(2);
            }
        }
        Command::Check { dataset: location } => {
            let path = dataset::resolve_path(location.as_deref(), &config)?;
            let store = dataset::load_store(&path)?;
            tracing::info!(aircraft = store.len(), path = %path.display(), "all datasets valid");
        }
        Command::List { dataset: location } => {
            let path = dataset::resolve_path(location.as_deref(), &config)?;
            let store = dataset::load_store(&path)?;
            for aircraft in store.aircraft_ids() {
                if let Some(snapshot) = store.snapshot(&aircraft) {
                    println!(
                        "{aircraft} ({}): {}",
                        snapshot.version.as_deref().unwrap_or("unversioned"),
                        snapshot.metrics().join(", ")
                    );
                }
            }
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn compute_args(args: &[&str]) -> ComputeArgs {
        let argv = ["acperf", "compute", "--aircraft", "C172S", "--metric", "takeoff_distance"];
        let cli = Cli::try_parse_from(argv.iter().chain(args)).unwrap();
        match cli.command {
            Command::Compute(args) => args,
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn test_missing_altitude_is_rejected() {
        let err = compute_args(&["--weight", "1100"]).flight_conditions().unwrap_err();
        assert!(err.to_string().contains("--pressure-altitude"));
    }

    #[test]
    fn test_missing_weight_is_rejected() {
        let args = compute_args(&["--pressure-altitude", "2000"]);
        assert!(args.flight_conditions().is_err());
    }

    #[test]
    fn test_altitude_from_elevation_and_qnh() {
        let args = compute_args(&["--weight", "1100", "--elevation", "1000", "--qnh", "1003.25"]);
        let conditions = args.flight_conditions().unwrap();
        assert!((conditions.pressure_altitude_ft - 1300.0).abs() < 1e-6);
        assert!((conditions.temperature_c - 12.4).abs() < 1e-6);
    }

    #[test]
    fn test_explicit_pressure_altitude() {
        let args = compute_args(&["--weight", "1100", "--pressure-altitude", "4000"]);
        let conditions = args.flight_conditions().unwrap();
        assert_eq!(conditions.pressure_altitude_ft, 4000.0);
        assert_eq!(conditions.weight_kg, 1100.0);
    }
}
