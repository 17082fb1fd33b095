use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{ArgAction, Args, Parser, Subcommand};
use greenstats::{
    common::table_reader::CycleCatalog,
    config::DashboardConfig,
    dashboard::{self, HourlyHumidity, IrrigationReport, Prediction, RangeRequest, Response},
    init_tracing, load_config, DuckDbStore, ForecastParams,
};
use serde::Serialize;
use tracing::{debug, warn};

fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = load_config(cli.config.as_deref()).context("failed to load configuration")?;
    init_tracing(&config.log_level, config.log_json);
    config.log_summary(cli.config.as_deref());

    let store = DuckDbStore::open(&config.database_path).with_context(|| {
        format!("failed to open database {}", config.database_path.display())
    })?;
    debug!(database = %config.database_path.display(), "Database opened");

    match cli.command {
        Commands::InitDb => {
            store.init_schema().context("failed to create tables")?;
            println!("Schema ready in {}", config.database_path.display());
            Ok(())
        }
        Commands::Hourly(args) => {
            let source = store.source(vec![config.storage.humidity.clone()]);
            let result = dashboard::hourly_humidity(&source, &args.request());
            render(result, cli.json, print_hourly)
        }
        Commands::Forecast(args) => {
            let params = ForecastParams::resolve(&config.forecast, args.strategy.as_deref(), args.horizon);
            let result = params.and_then(|params| {
                let source = store.source(vec![config.storage.humidity.clone()]);
                dashboard::predict_humidity(&source, &args.range.request(), &params)
            });
            render(result, cli.json, print_prediction)
        }
        Commands::Irrigation(args) => {
            let result = irrigation(&store, &config, args.cycle);
            render(result, cli.json, print_irrigation)
        }
    }
}

#[derive(Parser)]
#[command(name = "greenstats", about = "Greenhouse humidity and irrigation statistics", version)]
struct Cli {
    #[arg(long, global = true, help = "Configuration file (TOML, YAML or JSON)")]
    config: Option<PathBuf>,
    #[arg(
        long,
        global = true,
        action = ArgAction::SetTrue,
        help = "Render command output as pretty JSON"
    )]
    json: bool,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create the reading and catalog tables if missing
    InitDb,
    /// Hour-of-day humidity profile of a bed
    Hourly(RangeArgs),
    /// Forecast the daily mean humidity of a bed
    Forecast(ForecastArgs),
    /// Per-crop irrigation statistics of a cycle
    Irrigation(IrrigationArgs),
}

#[derive(Args)]
struct RangeArgs {
    #[arg(long, help = "Bed id")]
    bed: String,
    #[arg(long, help = "First day, inclusive (YYYY-MM-DD)")]
    from: String,
    #[arg(long, help = "Last day, inclusive (YYYY-MM-DD)")]
    to: String,
}

impl RangeArgs {
    fn request(&self) -> RangeRequest {
        RangeRequest::new(&self.bed, &self.from, &self.to)
    }
}

#[derive(Args)]
struct ForecastArgs {
    #[command(flatten)]
    range: RangeArgs,
    #[arg(long, help = "linear or support_vector; defaults to the configured strategy")]
    strategy: Option<String>,
    #[arg(long, help = "Days to predict past the last observation")]
    horizon: Option<i64>,
}

#[derive(Args)]
struct IrrigationArgs {
    #[arg(long, help = "Cycle id")]
    cycle: i64,
}

fn irrigation(store: &DuckDbStore, config: &DashboardConfig, cycle_id: i64) -> greenstats::Result<IrrigationReport> {
    let catalog = store.catalog(&config.storage.cycles_table, &config.storage.crops_table);
    let source = store.source(config.storage.irrigation.clone());
    let cycle = catalog.cycle(cycle_id)?;
    dashboard::irrigation_statistics(&catalog, &source, &cycle)
}

/// Print a use-case result. Failures are still printed as a response in
/// JSON mode; the process exits non-zero either way.
fn render<T, F>(result: greenstats::Result<T>, json: bool, print_text: F) -> Result<()>
where
    T: Serialize,
    F: FnOnce(&T),
{
    let failed = result.as_ref().err().map(|err| err.to_string());
    if json {
        print_json(&Response::from_result(result))?;
    } else if let Ok(data) = &result {
        print_text(data);
    }

    match failed {
        Some(message) => {
            warn!(%message, "Request failed");
            Err(anyhow::anyhow!(message))
        }
        None => Ok(()),
    }
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    let rendered = serde_json::to_string_pretty(value).context("failed to serialize response")?;
    println!("{}", rendered);
    Ok(())
}

fn print_hourly(hourly: &HourlyHumidity) {
    println!("{:>4} {:>10} {:>10} {:>10} {:>10}", "hour", "mean", "min", "max", "stddev");
    for hour in 0..hourly.means.len() {
        println!(
            "{:>4} {:>10.2} {:>10.2} {:>10.2} {:>10.2}",
            hour, hourly.means[hour], hourly.minima[hour], hourly.maxima[hour], hourly.stddevs[hour]
        );
    }
}

fn print_prediction(prediction: &Prediction) {
    for line in prediction_lines(prediction) {
        println!("{}", line);
    }
}

/// One line per historical day and per forecast step. Steps without a
/// calendar date are labelled by their offset.
fn prediction_lines(prediction: &Prediction) -> Vec<String> {
    let mut lines = vec![format!("History ({} days):", prediction.history.len())];
    for day in &prediction.history {
        lines.push(format!("  {} {:>8.2}", day.date, day.mean_humidity));
    }
    lines.push(format!(
        "Forecast ({}, {} steps):",
        prediction.strategy,
        prediction.forecasts.len()
    ));
    for (step, value) in prediction.forecasts.iter().enumerate() {
        match prediction.forecast_dates.get(step) {
            Some(date) => lines.push(format!("  {} {:>8.2}", date, value)),
            None => lines.push(format!("  +{:<9} {:>8.2}", step + 1, value)),
        }
    }
    lines
}

fn print_irrigation(report: &IrrigationReport) {
    println!(
        "Cycle {} ({}): {} to {}",
        report.cycle.id, report.cycle.description, report.cycle.start_date, report.cycle.end_date
    );
    println!("{:<20} {:>6} {:>10} {:>10} {:>10} {:>10}", "crop", "events", "mean", "min", "max", "stddev");
    for crop in &report.metrics {
        println!(
            "{:<20} {:>6} {:>10.2} {:>10.2} {:>10.2} {:>10.2}",
            crop.name, crop.events, crop.mean, crop.min, crop.max, crop.stddev
        );
    }
}
