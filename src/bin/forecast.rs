//! Health-card demand forecast CLI
//!
//! Reads completed appointments from a JSON file, runs one forecast against the
//! configured upstream service and prints the validated result as JSON.
//!
//! Usage:
//!   forecast --records <file.json> --start <YYYY-MM-DD> --end <YYYY-MM-DD> \
//!            [--horizon <days>] [--category <category>] [--pretty]
//!
//! Upstream settings come from `HEALTHCARD_FORECAST_*` environment variables.

use std::path::PathBuf;
use std::process::ExitCode;

use chrono::NaiveDate;
use clap::Parser;

use healthcard_forecast::config::{self, ForecastConfig};
use healthcard_forecast::models::{load_records, CardCategory, DateRange};
use healthcard_forecast::pipeline::forecasting::{
    aggregate, completions_for, ForecastError, ForecastOrchestrator, HttpForecastClient,
    SeriesSummary,
};

#[derive(Parser)]
#[command(name = "forecast")]
#[command(version)]
#[command(about = "Forecast daily health-card appointment demand", long_about = None)]
struct Cli {
    /// JSON array of completed appointments ({"completed_at", "service_category"})
    #[arg(short, long)]
    records: PathBuf,

    /// First day of history (YYYY-MM-DD, reporting timezone)
    #[arg(long)]
    start: NaiveDate,

    /// Last day of history, inclusive
    #[arg(long)]
    end: NaiveDate,

    /// Days to forecast (1-90)
    #[arg(long, default_value = "7", allow_negative_numbers = true)]
    horizon: i64,

    /// food_handler, non_food_handler, entertainment or all
    #[arg(short, long, default_value = "all")]
    category: CardCategory,

    /// Pretty-print the JSON result
    #[arg(long)]
    pretty: bool,
}

#[tokio::main]
async fn main() -> ExitCode {
    healthcard_forecast::init_tracing();
    let cli = Cli::parse();

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {e}");
            if e.is_retryable() {
                eprintln!("(transient upstream failure; retrying later may succeed)");
            }
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> Result<(), ForecastError> {
    tracing::info!("{} v{}", config::APP_NAME, config::APP_VERSION);

    let config = ForecastConfig::from_env()?;
    let records = load_records(&cli.records)?;
    tracing::info!(
        records = records.len(),
        provider = config.provider.as_str(),
        endpoint = %config.endpoint,
        model = %config.model,
        "Loaded appointment records"
    );

    log_history_digest(&records, &cli, &config);

    let client = HttpForecastClient::new(&config)?;
    let orchestrator = ForecastOrchestrator::new(client, config);
    let range = DateRange::new(cli.start, cli.end);
    let result = orchestrator
        .run(&records, range, cli.horizon, cli.category)
        .await?;

    let json = if cli.pretty {
        serde_json::to_string_pretty(&result)
    } else {
        serde_json::to_string(&result)
    }
    .map_err(|e| ForecastError::Io(e.into()))?;
    println!("{json}");

    Ok(())
}

/// Log what the history looks like before spending an upstream call on it.
fn log_history_digest(
    records: &[healthcard_forecast::models::AppointmentRecord],
    cli: &Cli,
    config: &ForecastConfig,
) {
    let series = match aggregate(
        completions_for(records, cli.category),
        cli.start,
        cli.end,
        &config.reporting_offset,
    ) {
        Ok(series) => series,
        // The orchestrator reports the same error
        Err(_) => return,
    };

    let summary = SeriesSummary::from_series(&series);
    tracing::info!(
        days = summary.days,
        total = summary.total,
        mean_per_day = summary.mean_per_day,
        active_days = summary.non_zero_days,
        peak = ?summary.peak.map(|p| p.date),
        weekday_spread = summary.weekday_spread(),
        "History digest"
    );
}
