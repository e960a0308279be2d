use anyhow::Result;
use clap::{Parser, Subcommand};
use log::info;
use pangan_engine::{
    commands::{alerts, batch, export_training_pairs, forecast, health, quality, stats},
    config::ForecastSettings,
    context::AppContext,
};
use std::path::PathBuf;

const DEFAULT_DAYS_AHEAD: usize = 7;

#[derive(Parser)]
#[command(name = "pangan-engine")]
#[command(about = "Food commodity price forecasting per commodity and region")]
struct Cli {
    /// Price dataset CSV (overrides DATASET_PATH)
    #[arg(long = "data-file", value_name = "PATH", global = true)]
    data_file: Option<PathBuf>,
    /// LSTM model artifact (overrides MODEL_PATH)
    #[arg(long = "model-file", value_name = "PATH", global = true)]
    model_file: Option<PathBuf>,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Forecast daily prices for one commodity in one region
    Forecast {
        /// Commodity name as it appears in the dataset
        commodity: String,
        /// Region name as it appears in the dataset
        region: String,
        /// Number of days to forecast
        #[arg(short, long, default_value_t = DEFAULT_DAYS_AHEAD)]
        days: usize,
    },
    /// Forecast every commodity and region pair and summarize the market
    Batch {
        /// Number of days to forecast
        #[arg(short, long, default_value_t = DEFAULT_DAYS_AHEAD)]
        days: usize,
        /// Write the batch report to a file instead of stdout
        #[arg(short, long, value_name = "PATH")]
        output: Option<PathBuf>,
    },
    /// Report data and model readiness
    Health,
    /// Historical price statistics for one commodity in one region
    Stats { commodity: String, region: String },
    /// Week-over-week price movements above a threshold
    Alerts {
        /// Minimum absolute change in percent (defaults to ALERT_THRESHOLD_PCT)
        #[arg(long)]
        threshold: Option<f64>,
    },
    /// Dataset coverage, gaps and missing weather counts
    Quality,
    /// Export scaled training windows for one commodity in one region as CSV
    ExportTrainingPairs {
        commodity: String,
        region: String,
        /// Destination CSV file
        #[arg(short, long, value_name = "PATH")]
        output: PathBuf,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let Cli {
        data_file,
        model_file,
        command,
    } = Cli::parse();

    let mut settings = ForecastSettings::from_env()?;
    if let Some(path) = data_file {
        settings.dataset_path = path;
    }
    if let Some(path) = model_file {
        settings.model_path = path;
    }

    info!(
        "Starting pangan-engine with dataset {} and model {}",
        settings.dataset_path.display(),
        settings.model_path.display()
    );
    let app_context = AppContext::initialize(settings).await?;

    match command {
        Commands::Forecast {
            commodity,
            region,
            days,
        } => {
            forecast::run(&app_context, &commodity, &region, days).await?;
        }
        Commands::Batch { days, output } => {
            batch::run(&app_context, days, output.as_deref()).await?;
        }
        Commands::Health => {
            health::run(&app_context).await?;
        }
        Commands::Stats { commodity, region } => {
            stats::run(&app_context, &commodity, &region).await?;
        }
        Commands::Alerts { threshold } => {
            alerts::run(&app_context, threshold).await?;
        }
        Commands::Quality => {
            quality::run(&app_context).await?;
        }
        Commands::ExportTrainingPairs {
            commodity,
            region,
            output,
        } => {
            export_training_pairs::run(&app_context, &commodity, &region, &output).await?;
        }
    }

    Ok(())
}
