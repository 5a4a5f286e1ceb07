//! Carbonexia MRV - Main entry point
//!
//! Command line front end for baseline calculation and savings / credit
//! estimation against a local SQLite database.

use anyhow::{Context, Result};
use carbonexia_mrv_lib::baseline::{BaselineRequest, BaselineService};
use carbonexia_mrv_lib::core::{Config, Error, MonthSample};
use carbonexia_mrv_lib::db::Database;
use carbonexia_mrv_lib::mrv::{SavingsCalculator, SavingsOutcome};
use chrono::{DateTime, NaiveDate, Utc};
use clap::{Parser, Subcommand};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use uuid::Uuid;

#[derive(Parser)]
#[command(name = "carbonexia-mrv", version, about = "Energy baselines and carbon-credit estimates for buildings")]
struct Cli {
    /// Configuration file (defaults to the platform config directory)
    #[arg(long, env = "CARBONEXIA_CONFIG")]
    config: Option<PathBuf>,

    /// SQLite database file, overrides the configured one
    #[arg(long, env = "CARBONEXIA_DB")]
    database: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Calculate and record a baseline for a building
    Baseline {
        #[arg(long)]
        building: Uuid,
        /// JSON file with [{"period": "YYYY-MM", "kwh": ...}] to use instead of stored readings
        #[arg(long)]
        months: Option<PathBuf>,
        /// Method label stored with the baseline
        #[arg(long)]
        method: Option<String>,
        /// Period to record the baseline under (defaults to the current month)
        #[arg(long)]
        period: Option<String>,
    },
    /// Estimate savings, avoided CO2 and credits for a date range
    Savings {
        #[arg(long)]
        building: Uuid,
        /// Start of the range, YYYY-MM-DD or RFC 3339
        #[arg(long)]
        start: String,
        /// End of the range (inclusive), YYYY-MM-DD or RFC 3339
        #[arg(long)]
        end: String,
    },
    /// List every baseline recorded for a building
    History {
        #[arg(long)]
        building: Uuid,
    },
    /// Record a baseline value for a period by hand
    SetBaseline {
        #[arg(long)]
        building: Uuid,
        #[arg(long)]
        period: String,
        #[arg(long)]
        kwh: f64,
    },
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            log::error!("{:#}", err);
            eprintln!("Error: {:#}", err);
            let input_error = err
                .downcast_ref::<Error>()
                .map(Error::is_input_error)
                .unwrap_or(false);
            ExitCode::from(if input_error { 2 } else { 1 })
        }
    }
}

fn run(cli: Cli) -> Result<()> {
    let config = match &cli.config {
        Some(path) => Config::load_from(path)
            .with_context(|| format!("Failed to load config from {}", path.display()))?,
        None => Config::load().unwrap_or_else(|e| {
            eprintln!("Failed to load config, using defaults: {}", e);
            Config::default()
        }),
    };

    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(config.general.log_level.as_str())).init();
    log::info!("Starting Carbonexia MRV v{}", env!("CARGO_PKG_VERSION"));

    let db_path = match cli.database {
        Some(path) => path,
        None => config.database_path()?,
    };
    let db = Database::open(&db_path)
        .with_context(|| format!("Failed to open database {}", db_path.display()))?;

    match cli.command {
        Command::Baseline { building, months, method, period } => {
            let mut request = BaselineRequest::new(building);
            if let Some(path) = months {
                request = request.with_months(read_months(&path)?);
            }
            request.method = method;
            request.period = period;

            let service = BaselineService::from_config(&db, &db, &config.baseline)?;
            print_json(&service.calculate(&request)?)
        }
        Command::Savings { building, start, end } => {
            let start = parse_instant(&start, false)?;
            let end = parse_instant(&end, true)?;

            let calculator = SavingsCalculator::from_config(&db, &db, &db, &db, &config.mrv);
            let outcome = calculator.calculate(building, start, end)?;
            if let Some(message) = outcome.not_found_message() {
                log::warn!("{}", message);
            }
            if let SavingsOutcome::Computed(result) = &outcome {
                log::debug!("Emission factor source: {:?}", result.factor_source);
            }
            print_json(&outcome)
        }
        Command::History { building } => {
            let service = BaselineService::from_config(&db, &db, &config.baseline)?;
            print_json(&service.history(building)?)
        }
        Command::SetBaseline { building, period, kwh } => {
            let service = BaselineService::from_config(&db, &db, &config.baseline)?;
            print_json(&service.set_manual(building, &period, kwh)?)
        }
    }
}

fn read_months(path: &Path) -> Result<Vec<MonthSample>> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read months file {}", path.display()))?;
    let months = serde_json::from_str(&content)
        .map_err(|e| Error::InvalidInput(format!("months file {}: {}", path.display(), e)))?;
    Ok(months)
}

/// Accepts RFC 3339 or a bare date; bare end dates cover the whole day,
/// down to the last microsecond readings are stored with
fn parse_instant(value: &str, end_of_day: bool) -> Result<DateTime<Utc>> {
    if let Ok(time) = DateTime::parse_from_rfc3339(value) {
        return Ok(time.with_timezone(&Utc));
    }

    let date = NaiveDate::parse_from_str(value, "%Y-%m-%d")
        .map_err(|_| Error::InvalidInput(format!("'{}' is neither YYYY-MM-DD nor RFC 3339", value)))?;
    let time = if end_of_day {
        date.and_hms_micro_opt(23, 59, 59, 999_999)
    } else {
        date.and_hms_opt(0, 0, 0)
    };
    time.map(|t| t.and_utc())
        .ok_or_else(|| Error::InvalidInput(format!("'{}' is not a valid date", value)).into())
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    let json = serde_json::to_string_pretty(value).context("Failed to serialize output")?;
    println!("{}", json);
    Ok(())
}
