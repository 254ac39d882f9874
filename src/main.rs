mod config;
mod data;
mod error;
mod metrics;
mod portfolio;
mod report;
mod stats;

use anyhow::Context;
use clap::{Parser, ValueEnum};
use config::{ExecutionMode, IngestLimits, SearchConfig};
use portfolio::Sampler;
use report::Report;
use stats::Estimates;
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[derive(Clone, Debug, ValueEnum)]
enum SamplerChoice {
    Uniform,
    Dirichlet,
}

#[derive(Parser, Debug)]
#[command(
    author,
    version,
    about = "Monte Carlo search for minimum-risk, maximum-return and maximum-Sharpe portfolios",
    after_help = "EXAMPLES:
    # Default search (100000 trials on all cores)
    cargo run --release -- prices.csv

    # Reproducible single-threaded run
    cargo run --release -- prices.csv --serial --seed 42

    # Larger budget, machine-readable output
    cargo run --release -- prices.csv --trials 1000000 --json"
)]
struct Args {
    /// CSV with a header `date,NAME_1,...,NAME_S` and one row of closing prices per day
    input: PathBuf,

    /// Number of random portfolios to sample
    #[arg(long, default_value_t = config::SIMULATIONS)]
    trials: usize,

    /// Seed for the random streams (default: derived from the clock)
    #[arg(long)]
    seed: Option<u64>,

    /// Annual risk-free rate used in the Sharpe ratio
    #[arg(long, default_value_t = config::RISK_FREE_RATE, allow_negative_numbers = true)]
    risk_free_rate: f64,

    /// Trading days per year used to annualize returns and covariance
    #[arg(long, default_value_t = config::TRADING_DAYS)]
    trading_days: f64,

    /// Maximum number of instruments accepted in the header
    #[arg(long, default_value_t = config::MAX_INSTRUMENTS)]
    max_instruments: usize,

    /// Maximum number of trading days accepted
    #[arg(long, default_value_t = config::MAX_DAYS)]
    max_days: usize,

    /// Worker threads (default: all logical CPU cores)
    #[arg(long)]
    threads: Option<usize>,

    /// Run all trials on the calling thread
    #[arg(long)]
    serial: bool,

    /// How random weights are drawn
    #[arg(long, value_enum, default_value_t = SamplerChoice::Uniform)]
    sampler: SamplerChoice,

    /// Print the report as JSON
    #[arg(long)]
    json: bool,
}

fn main() -> ExitCode {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("portfolio_mc=info"));
    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr)
        .init();
    let args = Args::parse();

    match run(&args) {
        Ok(output) => {
            println!("{}", output);
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!("Portfolio optimization failed: {:#}", e);
            ExitCode::FAILURE
        }
    }
}

/// Full pipeline: load prices → estimate → search → render. Nothing is
/// printed here, so a failure leaves no partial report behind.
fn run(args: &Args) -> anyhow::Result<String> {
    let limits = IngestLimits {
        max_instruments: args.max_instruments,
        max_days: args.max_days,
    };
    limits.validate()?;

    let mode = if args.serial {
        ExecutionMode::Serial
    } else {
        ExecutionMode::Parallel
    };
    let workers = match mode {
        ExecutionMode::Serial => 1,
        ExecutionMode::Parallel => config::init_cpu_parallelism(args.threads),
    };
    let seed = args.seed.unwrap_or_else(|| {
        let seed = config::seed_from_clock();
        info!("No --seed given, using {} (pass --seed {} to replay)", seed, seed);
        seed
    });
    let search_config = SearchConfig {
        trials: args.trials,
        seed,
        risk_free_rate: args.risk_free_rate,
        trading_days: args.trading_days,
        sampler: match args.sampler {
            SamplerChoice::Uniform => Sampler::Uniform,
            SamplerChoice::Dirichlet => Sampler::Dirichlet,
        },
        mode,
        workers,
    };
    search_config.validate()?;

    let prices = data::load_price_table(&args.input, &limits)
        .with_context(|| format!("loading {}", args.input.display()))?;
    let estimates = Estimates::from_prices(&prices)
        .context("estimating returns and covariance")?
        .annualized(search_config.trading_days);
    let outcome = portfolio::search(&estimates, &search_config)?;

    let report = Report::new(&prices, &estimates, search_config.risk_free_rate, &outcome);
    if args.json {
        Ok(report.to_json()?)
    } else {
        Ok(report.to_string())
    }
}
