use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, ValueEnum};
use polars::prelude::*;
use tracing::info;

use windwatts_engine::aggregate::MonthlyProduction;
use windwatts_engine::config::EngineConfig;
use windwatts_engine::power_curve::PowerCurveManager;
use windwatts_engine::production::EnergyProductionComputer;
use windwatts_engine::schema::SchemaRegistry;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Period {
    /// Just the average-year kWh figure.
    All,
    /// Lowest/average/highest year summary.
    Summary,
    /// Per-year statistics.
    Annual,
    /// Per-month statistics (timeseries models only).
    Monthly,
    /// Summary plus per-year statistics.
    Full,
}

#[derive(Parser, Debug)]
#[command(name = "windwatts_engine")]
#[command(about = "Wind turbine energy production estimates from modeled wind data", long_about = None)]
struct Args {
    /// CSV file holding the wind-speed table for one location
    #[arg(long)]
    wind_data: PathBuf,

    /// Data model the table belongs to (era5, wtk, ensemble)
    #[arg(long)]
    model: String,

    /// Hub height in meters
    #[arg(long)]
    height: u32,

    /// Name of the power curve to apply
    #[arg(long)]
    powercurve: String,

    /// Directory containing power curve CSV files
    #[arg(long, env = "WINDWATTS_POWERCURVE_DIR")]
    powercurve_dir: PathBuf,

    /// Which aggregate to compute
    #[arg(long, value_enum, default_value_t = Period::Summary)]
    period: Period,

    /// Optional model configuration override (JSON)
    #[arg(long)]
    config: Option<PathBuf>,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("windwatts_engine=info".parse()?),
        )
        .init();

    let args = Args::parse();

    let config = match &args.config {
        Some(path) => EngineConfig::from_json_file(path)?,
        None => EngineConfig::default(),
    };
    let registry = SchemaRegistry::builtin()?;
    let curves = PowerCurveManager::from_dir(&args.powercurve_dir)?;
    info!(curves = ?curves.available(), "loaded power curves");

    config.validate_height(&args.model, args.height)?;

    let df = CsvReadOptions::default()
        .with_has_header(true)
        .try_into_reader_with_file_path(Some(args.wind_data.clone()))?
        .finish()?;
    info!(rows = df.height(), cols = df.width(), "loaded wind data table");

    let computer = EnergyProductionComputer::new(&config, &registry, &curves);

    let output = match args.period {
        Period::All => {
            let summary = computer.calculate_energy_production_summary(
                &df,
                args.height,
                &args.powercurve,
                &args.model,
            )?;
            serde_json::json!({ "energy_production": summary.average.production.kwh })
        }
        Period::Summary => {
            let summary = computer.calculate_energy_production_summary(
                &df,
                args.height,
                &args.powercurve,
                &args.model,
            )?;
            serde_json::json!({ "summary_avg_energy_production": summary })
        }
        Period::Annual => {
            let yearly = computer.calculate_yearly_energy_production(
                &df,
                args.height,
                &args.powercurve,
                &args.model,
            )?;
            serde_json::json!({ "yearly_avg_energy_production": yearly })
        }
        Period::Monthly => {
            let monthly = computer.calculate_monthly_energy_production(
                &df,
                args.height,
                &args.powercurve,
                &args.model,
            )?;
            serde_json::json!({ "monthly_avg_energy_production": monthly_map(&monthly)? })
        }
        Period::Full => {
            let summary = computer.calculate_energy_production_summary(
                &df,
                args.height,
                &args.powercurve,
                &args.model,
            )?;
            let yearly = computer.calculate_yearly_energy_production(
                &df,
                args.height,
                &args.powercurve,
                &args.model,
            )?;
            serde_json::json!({
                "energy_production": summary.average.production.kwh,
                "summary_avg_energy_production": summary,
                "yearly_avg_energy_production": yearly,
            })
        }
    };

    println!("{}", serde_json::to_string_pretty(&output)?);
    Ok(())
}

/// Month-keyed object in calendar order (serde_json preserves insertion
/// order here).
fn monthly_map(monthly: &[MonthlyProduction]) -> Result<serde_json::Value> {
    let mut map = serde_json::Map::new();
    for entry in monthly {
        map.insert(
            entry.month.clone(),
            serde_json::to_value(&entry.production)?,
        );
    }
    Ok(serde_json::Value::Object(map))
}
