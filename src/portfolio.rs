use crate::config::{ExecutionMode, SearchConfig, CHUNK_TRIALS};
use crate::error::{OptimizerError, Result};
use crate::metrics::{self, Metrics};
use crate::stats::Estimates;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rand_distr::{Distribution, Exp1};
use rayon::prelude::*;
use serde::Serialize;
use std::ops::Range;
use std::sync::{Mutex, PoisonError};
use std::time::{Duration, Instant};
use tracing::{debug, info};

// ──────────────────────────────────────────────────────────────────────────────
// Weight Sampling
// ──────────────────────────────────────────────────────────────────────────────

/// How a random point on the weight simplex is drawn.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Sampler {
    /// Uniform draws in `[0, 1)` divided by their sum. Cheap and reproducible,
    /// but biased toward the centre of the simplex.
    Uniform,
    /// Exp(1) draws divided by their sum, i.e. a flat Dirichlet sample.
    Dirichlet,
}

impl Sampler {
    /// Overwrites `weights` with a fresh long-only, fully-invested vector.
    pub fn sample_weights<R: Rng>(self, rng: &mut R, weights: &mut [f64]) {
        match self {
            Sampler::Uniform => weights.iter_mut().for_each(|w| *w = rng.gen_range(0.0..1.0)),
            Sampler::Dirichlet => weights.iter_mut().for_each(|w| *w = Exp1.sample(&mut *rng)),
        }
        normalize_weights(weights);
    }
}

/// Divides by the sum; an all-zero draw becomes equal weights.
pub fn normalize_weights(weights: &mut [f64]) {
    let sum: f64 = weights.iter().sum();
    if sum > 0.0 {
        weights.iter_mut().for_each(|w| *w /= sum);
    } else {
        let equal = 1.0 / weights.len() as f64;
        weights.fill(equal);
    }
}

// ──────────────────────────────────────────────────────────────────────────────
// Best-So-Far Tracking
// ──────────────────────────────────────────────────────────────────────────────

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Objective {
    MinRisk,
    MaxReturn,
    MaxSharpe,
}

impl Objective {
    pub const ALL: [Objective; 3] = [Objective::MinRisk, Objective::MaxReturn, Objective::MaxSharpe];

    pub fn label(self) -> &'static str {
        match self {
            Objective::MinRisk => "Minimum Risk",
            Objective::MaxReturn => "Maximum Return",
            Objective::MaxSharpe => "Maximum Sharpe Ratio",
        }
    }

    pub fn value(self, m: &Metrics) -> f64 {
        match self {
            Objective::MinRisk => m.risk,
            Objective::MaxReturn => m.ret,
            Objective::MaxSharpe => m.sharpe,
        }
    }

    /// Strict improvement of `candidate` over `incumbent`.
    fn improves(self, candidate: f64, incumbent: f64) -> bool {
        match self {
            Objective::MinRisk => candidate < incumbent,
            Objective::MaxReturn | Objective::MaxSharpe => candidate > incumbent,
        }
    }
}

/// One sampled allocation and the trial that produced it.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Candidate {
    pub weights: Vec<f64>,
    #[serde(flatten)]
    pub metrics: Metrics,
    pub trial: usize,
}

/// Best allocation per objective. Slots are empty until the first trial.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct BestPortfolios {
    pub min_risk: Option<Candidate>,
    pub max_return: Option<Candidate>,
    pub max_sharpe: Option<Candidate>,
}

impl BestPortfolios {
    pub fn get(&self, objective: Objective) -> Option<&Candidate> {
        match objective {
            Objective::MinRisk => self.min_risk.as_ref(),
            Objective::MaxReturn => self.max_return.as_ref(),
            Objective::MaxSharpe => self.max_sharpe.as_ref(),
        }
    }

    fn slot_mut(&mut self, objective: Objective) -> &mut Option<Candidate> {
        match objective {
            Objective::MinRisk => &mut self.min_risk,
            Objective::MaxReturn => &mut self.max_return,
            Objective::MaxSharpe => &mut self.max_sharpe,
        }
    }

    /// Records a trial. Trials must be offered in increasing index order;
    /// only strict improvements replace, so ties keep the earlier trial.
    pub fn offer(&mut self, weights: &[f64], metrics: Metrics, trial: usize) {
        for objective in Objective::ALL {
            let slot = self.slot_mut(objective);
            let replace = match slot {
                None => true,
                Some(best) => objective.improves(objective.value(&metrics), objective.value(&best.metrics)),
            };
            if replace {
                *slot = Some(Candidate {
                    weights: weights.to_vec(),
                    metrics,
                    trial,
                });
            }
        }
    }

    /// Folds another accumulator in. Equal objective values resolve to the
    /// lower trial index, so the result does not depend on merge order.
    pub fn merge(&mut self, other: BestPortfolios) {
        let BestPortfolios {
            min_risk,
            max_return,
            max_sharpe,
        } = other;
        let incoming = [
            (Objective::MinRisk, min_risk),
            (Objective::MaxReturn, max_return),
            (Objective::MaxSharpe, max_sharpe),
        ];

        for (objective, candidate) in incoming {
            let Some(candidate) = candidate else { continue };
            let slot = self.slot_mut(objective);
            let replace = match slot {
                None => true,
                Some(best) => {
                    let (c, b) = (objective.value(&candidate.metrics), objective.value(&best.metrics));
                    objective.improves(c, b) || (c == b && candidate.trial < best.trial)
                }
            };
            if replace {
                *slot = Some(candidate);
            }
        }
    }
}

// ──────────────────────────────────────────────────────────────────────────────
// Monte Carlo Search
// ──────────────────────────────────────────────────────────────────────────────

#[derive(Clone, Debug, Serialize)]
pub struct SearchOutcome {
    pub best: BestPortfolios,
    pub trials: usize,
    pub seed: u64,
    pub mode: ExecutionMode,
    pub workers: usize,
    #[serde(skip)]
    pub elapsed: Duration,
}

fn num_chunks(trials: usize) -> usize {
    trials.div_ceil(CHUNK_TRIALS)
}

fn chunk_trials(chunk: usize, trials: usize) -> Range<usize> {
    let start = chunk * CHUNK_TRIALS;
    start..(start + CHUNK_TRIALS).min(trials)
}

fn chunk_rng(seed: u64, chunk: usize) -> StdRng {
    StdRng::seed_from_u64(seed ^ (chunk as u64).wrapping_mul(0x9E37_79B9_7F4A_7C15))
}

/// Runs one chunk of trials against its own generator.
fn search_chunk(
    rng: &mut StdRng,
    trials: Range<usize>,
    estimates: &Estimates,
    config: &SearchConfig,
    weights: &mut [f64],
    best: &mut BestPortfolios,
) {
    for trial in trials {
        config.sampler.sample_weights(rng, weights);
        let m = metrics::evaluate(weights, estimates, config.risk_free_rate);
        best.offer(weights, m, trial);
    }
}

/// Runs chunks `first, first + stride, ...` into a private accumulator.
fn search_partition(
    first: usize,
    stride: usize,
    estimates: &Estimates,
    config: &SearchConfig,
) -> BestPortfolios {
    let mut best = BestPortfolios::default();
    let mut weights = vec![0.0; estimates.num_instruments()];
    for chunk in (first..num_chunks(config.trials)).step_by(stride) {
        let mut rng = chunk_rng(config.seed, chunk);
        search_chunk(
            &mut rng,
            chunk_trials(chunk, config.trials),
            estimates,
            config,
            &mut weights,
            &mut best,
        );
    }
    best
}

fn search_serial(estimates: &Estimates, config: &SearchConfig) -> BestPortfolios {
    search_partition(0, 1, estimates, config)
}

/// Each worker searches its share of chunks privately and merges into the
/// shared result once, under the lock, when it is done.
fn search_parallel(estimates: &Estimates, config: &SearchConfig, workers: usize) -> BestPortfolios {
    let shared = Mutex::new(BestPortfolios::default());

    (0..workers).into_par_iter().for_each(|worker| {
        let local = search_partition(worker, workers, estimates, config);
        debug!("Worker {} finished, merging", worker);
        shared
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .merge(local);
    });

    shared.into_inner().unwrap_or_else(PoisonError::into_inner)
}

/// Samples `config.trials` random allocations and keeps the best one per
/// objective. The full budget is always consumed.
///
/// Trials are grouped in fixed-size chunks, each with a generator seeded from
/// `(config.seed, chunk index)`. The sampled weights therefore depend only on
/// the seed and the trial index: serial and parallel runs agree exactly, and
/// a larger budget samples a superset of a smaller one.
pub fn search(estimates: &Estimates, config: &SearchConfig) -> Result<SearchOutcome> {
    config.validate()?;
    let n = estimates.num_instruments();
    if n == 0 {
        return Err(OptimizerError::invalid_config("no instruments to allocate"));
    }
    if estimates.cov.len() != n || estimates.cov.iter().any(|row| row.len() != n) {
        return Err(OptimizerError::invalid_config(format!(
            "covariance matrix does not match {} instruments",
            n
        )));
    }
    estimates.check_finite()?;

    let chunks = num_chunks(config.trials);
    let workers = match config.mode {
        ExecutionMode::Serial => 1,
        ExecutionMode::Parallel => config.workers.min(chunks),
    };
    info!(
        "Searching {} random portfolios over {} instruments ({:?}, {} workers, {} chunks, seed {})",
        config.trials, n, config.mode, workers, chunks, config.seed
    );

    let start = Instant::now();
    let best = match config.mode {
        ExecutionMode::Serial => search_serial(estimates, config),
        ExecutionMode::Parallel => search_parallel(estimates, config, workers),
    };
    let elapsed = start.elapsed();
    info!("Search finished in {:.3}s", elapsed.as_secs_f64());

    Ok(SearchOutcome {
        best,
        trials: config.trials,
        seed: config.seed,
        mode: config.mode,
        workers,
        elapsed,
    })
}

// ──────────────────────────────────────────────────────────────────────────────
// Tests
// ──────────────────────────────────────────────────────────────────────────────
