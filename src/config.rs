use crate::error::{OptimizerError, Result};
use crate::portfolio::Sampler;
use chrono::Utc;
use rayon::ThreadPoolBuilder;
use serde::Serialize;
use std::sync::OnceLock;
use tracing::{info, warn};

static RAYON_INIT: OnceLock<usize> = OnceLock::new();

/// Maximum number of instruments accepted from the input header.
pub const MAX_INSTRUMENTS: usize = 10;
/// Maximum number of trading days accepted from the input.
pub const MAX_DAYS: usize = 1500;
/// Number of random portfolios sampled per run.
pub const SIMULATIONS: usize = 100_000;
/// Annual risk-free rate used in Sharpe calculations.
pub const RISK_FREE_RATE: f64 = 0.01;
/// Annual trading days for annualization.
pub const TRADING_DAYS: f64 = 252.0;
/// Trials per chunk. Each chunk owns one generator, so this also fixes the
/// random stream layout independently of the worker count.
pub const CHUNK_TRIALS: usize = 4096;

/// Sizes the global Rayon pool once and returns the thread count in use.
pub fn init_cpu_parallelism(requested: Option<usize>) -> usize {
    *RAYON_INIT.get_or_init(|| {
        let num_threads = requested.unwrap_or_else(num_cpus::get).max(1);
        match ThreadPoolBuilder::new().num_threads(num_threads).build_global() {
            Ok(_) => {
                info!("Initialized Rayon thread pool with {} threads", num_threads);
                num_threads
            }
            Err(e) => {
                warn!(
                    "Rayon thread pool already initialized or unavailable ({}). Using existing configuration.",
                    e
                );
                rayon::current_num_threads()
            }
        }
    })
}

/// Seed derived from the wall clock, for runs where none was given.
pub fn seed_from_clock() -> u64 {
    Utc::now().timestamp_nanos_opt().unwrap_or_default() as u64
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ExecutionMode {
    Serial,
    Parallel,
}

/// Capacity limits applied while loading a price table.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct IngestLimits {
    pub max_instruments: usize,
    pub max_days: usize,
}

impl Default for IngestLimits {
    fn default() -> Self {
        Self {
            max_instruments: MAX_INSTRUMENTS,
            max_days: MAX_DAYS,
        }
    }
}

impl IngestLimits {
    pub fn validate(&self) -> Result<()> {
        if self.max_instruments == 0 {
            return Err(OptimizerError::invalid_config("instrument cap must be positive"));
        }
        if self.max_days == 0 {
            return Err(OptimizerError::invalid_config("day cap must be positive"));
        }
        Ok(())
    }
}

/// Runtime parameters of the Monte Carlo search.
#[derive(Clone, Debug, Serialize)]
pub struct SearchConfig {
    pub trials: usize,
    pub seed: u64,
    pub risk_free_rate: f64,
    pub trading_days: f64,
    pub sampler: Sampler,
    pub mode: ExecutionMode,
    /// Worker count for `ExecutionMode::Parallel`; ignored when serial.
    pub workers: usize,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            trials: SIMULATIONS,
            seed: 0,
            risk_free_rate: RISK_FREE_RATE,
            trading_days: TRADING_DAYS,
            sampler: Sampler::Uniform,
            mode: ExecutionMode::Parallel,
            workers: num_cpus::get().max(1),
        }
    }
}

impl SearchConfig {
    pub fn validate(&self) -> Result<()> {
        if self.trials == 0 {
            return Err(OptimizerError::invalid_config("trial budget must be positive"));
        }
        if self.workers == 0 {
            return Err(OptimizerError::invalid_config("worker count must be positive"));
        }
        if !(self.trading_days.is_finite() && self.trading_days > 0.0) {
            return Err(OptimizerError::invalid_config(format!(
                "trading days per year must be positive, got {}",
                self.trading_days
            )));
        }
        if !self.risk_free_rate.is_finite() {
            return Err(OptimizerError::invalid_config("risk-free rate must be finite"));
        }
        Ok(())
    }
}
