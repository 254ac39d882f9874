use crate::data::PriceTable;
use crate::metrics::Metrics;
use crate::portfolio::{Objective, SearchOutcome};
use crate::stats::Estimates;
use serde::Serialize;
use std::fmt;

const WIDTH: usize = 60;

#[derive(Debug, Serialize)]
pub struct InstrumentSummary<'a> {
    pub name: &'a str,
    pub annual_return: f64,
    pub annual_vol: f64,
}

/// Everything the console report shows, borrowed from the pipeline.
#[derive(Debug, Serialize)]
pub struct Report<'a> {
    pub instruments: Vec<InstrumentSummary<'a>>,
    pub days: usize,
    pub risk_free_rate: f64,
    pub search: &'a SearchOutcome,
    #[serde(skip)]
    names: &'a [String],
}

impl<'a> Report<'a> {
    pub fn new(
        prices: &'a PriceTable,
        estimates: &Estimates,
        risk_free_rate: f64,
        search: &'a SearchOutcome,
    ) -> Self {
        let instruments = prices
            .instruments()
            .iter()
            .zip(estimates.means.iter().zip(estimates.volatilities()))
            .map(|(name, (&annual_return, annual_vol))| InstrumentSummary {
                name,
                annual_return,
                annual_vol,
            })
            .collect();

        Self {
            instruments,
            days: prices.num_days(),
            risk_free_rate,
            search,
            names: prices.instruments(),
        }
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }
}

fn rule(f: &mut fmt::Formatter<'_>, left: char, right: char) -> fmt::Result {
    writeln!(f, "{}{}{}", left, "═".repeat(WIDTH), right)
}

/// One boxed row. Text wider than the box is cut and marked with `…`.
fn line(f: &mut fmt::Formatter<'_>, text: &str) -> fmt::Result {
    let width = WIDTH - 2;
    if text.chars().count() > width {
        let cut: String = text.chars().take(width - 1).collect();
        writeln!(f, "║  {}…║", cut)
    } else {
        writeln!(f, "║  {:<width$}║", text, width = width)
    }
}

fn format_sharpe(m: &Metrics) -> String {
    if m.sharpe_is_defined() {
        format!("{:.4}", m.sharpe)
    } else {
        "undefined (zero risk)".to_string()
    }
}

impl fmt::Display for Report<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        rule(f, '╔', '╗')?;
        line(f, "Monte Carlo Portfolio Allocation")?;
        rule(f, '╠', '╣')?;
        line(
            f,
            &format!(
                "Instruments: {}   Days: {}   Trials: {}",
                self.instruments.len(),
                self.days,
                self.search.trials
            ),
        )?;
        line(
            f,
            &format!(
                "Seed: {}   Workers: {}   Time: {:.3}s",
                self.search.seed,
                self.search.workers,
                self.search.elapsed.as_secs_f64()
            ),
        )?;
        line(f, &format!("Risk-free rate: {:.2}%", self.risk_free_rate * 100.0))?;

        rule(f, '╠', '╣')?;
        line(f, &format!("{:<12} {:>14} {:>14}", "Instrument", "Ann. Return", "Ann. Vol"))?;
        for s in &self.instruments {
            line(
                f,
                &format!(
                    "{:<12} {:>13.2}% {:>13.2}%",
                    s.name,
                    s.annual_return * 100.0,
                    s.annual_vol * 100.0
                ),
            )?;
        }

        for objective in Objective::ALL {
            rule(f, '╠', '╣')?;
            let Some(best) = self.search.best.get(objective) else {
                line(f, &format!("{} Portfolio: no trials", objective.label()))?;
                continue;
            };
            line(f, &format!("{} Portfolio Allocation:", objective.label()))?;
            for (name, w) in self.names.iter().zip(best.weights.iter()) {
                line(f, &format!("  {:<12} {:>7.2}%", name, w * 100.0))?;
            }
            line(f, &format!("  Risk (Std Dev) : {:>7.2}%", best.metrics.risk * 100.0))?;
            line(f, &format!("  Return         : {:>+7.2}%", best.metrics.ret * 100.0))?;
            line(f, &format!("  Sharpe Ratio   : {}", format_sharpe(&best.metrics)))?;
        }
        rule(f, '╚', '╝')
    }
}
