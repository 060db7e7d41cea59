//! Backtest replay loop.
//!
//! Rebalance dates are processed strictly in order. Each step takes the
//! previous [`BacktestState`] and returns a [`RebalanceRecord`] plus the next
//! state; nothing else is carried between dates.

use chrono::NaiveDate;
use std::collections::HashMap;

use super::alpha::combine_scores;
use super::constraints::{build_constraints, ConstraintSpec, ExposureMatrix};
use super::error::AlphaTraderError;
use super::execution::{ExecutionKind, ExecutionPolicy};
use super::frequency::Frequency;
use super::optimizer::{
    optimize_with_fallback, BuildMethod, OptimizationOutcome, OptimizationProblem,
    PortfolioBuilder, TurnoverBudget,
};
use super::position::Position;
use super::signal::{ScoreVector, SignalSource};
use super::universe::{schedule_rebalance_dates, UniverseSnapshot};
use crate::ports::data_port::FactorDataPort;

pub const DEFAULT_COST_RATE: f64 = 0.002;

/// Weights at or below this magnitude count as not traded.
const UNTRADED_WEIGHT: f64 = 1e-12;

/// Slack allowed on realized constraint values after a solve.
const CONSTRAINT_TOLERANCE: f64 = 1e-6;

#[derive(Debug, Clone, PartialEq)]
pub struct BacktestConfig {
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub frequency: Frequency,
    pub horizon: usize,
    /// Transaction cost per unit of turnover.
    pub cost_rate: f64,
    pub method: BuildMethod,
    /// Maximum L1 weight change per rebalance; `None` always fully rebalances.
    pub turnover_target: Option<f64>,
    pub constraints: ConstraintSpec,
    pub execution: ExecutionKind,
}

/// The previous period's executed position.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BacktestState {
    previous: Position,
}

impl BacktestState {
    pub fn previous_position(&self) -> &Position {
        &self.previous
    }

    /// The state after executing `position`.
    pub fn advance(self, position: Position) -> Self {
        BacktestState { previous: position }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct RebalanceRecord {
    pub date: NaiveDate,
    pub ret: f64,
    pub turnover: f64,
    pub leverage: f64,
    /// The turnover budget was infeasible and ignored on this date.
    pub full_rebalance: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ReportRow {
    pub date: NaiveDate,
    pub ret: f64,
    pub turnover: f64,
    pub leverage: f64,
    pub transaction_cost: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct BacktestResult {
    pub records: Vec<RebalanceRecord>,
    pub series: Vec<ReportRow>,
    pub final_position: Position,
}

impl BacktestResult {
    pub fn full_rebalances(&self) -> usize {
        self.records.iter().filter(|r| r.full_rebalance).count()
    }
}

/// Collaborators and settings for one run.
pub struct Backtest<'a> {
    pub data: &'a dyn FactorDataPort,
    pub sources: &'a [SignalSource],
    pub builder: &'a dyn PortfolioBuilder,
    pub executor: &'a dyn ExecutionPolicy,
    pub config: &'a BacktestConfig,
}

impl Backtest<'_> {
    /// Rebalance dates for the configured window and frequency.
    pub fn schedule(&self) -> Result<Vec<NaiveDate>, AlphaTraderError> {
        let available = self
            .data
            .available_dates(self.config.start_date, self.config.end_date)?;
        Ok(schedule_rebalance_dates(&available, &self.config.frequency))
    }

    /// Run over the scheduled dates.
    pub fn run(&self) -> Result<BacktestResult, AlphaTraderError> {
        let dates = self.schedule()?;
        self.run_dates(&dates)
    }

    /// Run over explicit dates. Dates are sorted and deduplicated first.
    pub fn run_dates(&self, dates: &[NaiveDate]) -> Result<BacktestResult, AlphaTraderError> {
        let mut dates = dates.to_vec();
        dates.sort();
        dates.dedup();

        let mut state = BacktestState::default();
        let mut records = Vec::with_capacity(dates.len());
        for date in dates {
            let (record, next) = self.rebalance(date, &state)?;
            records.push(record);
            state = next;
        }

        let series = build_series(&records, &self.config.frequency, self.config.cost_rate)?;
        Ok(BacktestResult {
            records,
            series,
            final_position: state.previous,
        })
    }

    /// One rebalance step.
    pub fn rebalance(
        &self,
        date: NaiveDate,
        state: &BacktestState,
    ) -> Result<(RebalanceRecord, BacktestState), AlphaTraderError> {
        let snapshot = self.data.fetch_universe(date)?;
        if snapshot.assets.is_empty() {
            return Err(AlphaTraderError::NoData { date });
        }
        log::info!("{}: {} assets", date, snapshot.count());

        let codes = snapshot.codes();
        let industries = snapshot.industries();
        let benchmark = snapshot.benchmark_weights();

        let exposures = ExposureMatrix::from_snapshot(&snapshot, &self.config.constraints)?;
        let (constraints, bounds) =
            build_constraints(&exposures, &benchmark, &self.config.constraints)?;

        let scored = self
            .sources
            .iter()
            .map(|s| s.score(&snapshot))
            .collect::<Result<Vec<ScoreVector>, _>>()?;
        let scores = combine_scores(&codes, &scored);

        let previous = state.previous_position();
        let remained = previous.aligned_to(&codes);
        let turnover = match self.config.turnover_target {
            Some(budget) if !previous.is_empty() => Some(TurnoverBudget {
                previous: &remained,
                budget,
            }),
            _ => None,
        };

        let problem = OptimizationProblem {
            scores: &scores,
            constraints: &constraints,
            bounds: &bounds,
            industries: &industries,
            benchmark: &benchmark,
            turnover,
        };
        let outcome = optimize_with_fallback(self.builder, &problem);
        log::debug!("{}: optimization {}", date, outcome);
        let full_rebalance = outcome.is_fallback();
        let weights = match outcome {
            OptimizationOutcome::Solved(w) => w,
            OptimizationOutcome::SolvedWithFallback(w) => {
                log::warn!("{} full rebalance", date);
                w
            }
            OptimizationOutcome::Failed(reason) => {
                return Err(AlphaTraderError::InfeasibleOptimization {
                    date,
                    reason: reason.to_string(),
                });
            }
        };

        let violated = constraints.violations(&weights, CONSTRAINT_TOLERANCE);
        if !violated.is_empty() {
            log::warn!(
                "{}: solved weights break constraints {}",
                date,
                violated.join(", ")
            );
        }

        let target = Position::from_weights(&codes, &weights);
        log::debug!(
            "{}: target net {:.4}, gross {:.4}",
            date,
            target.total(),
            target.leverage()
        );
        let execution = self.executor.execute(&target, state);

        let executed_codes = execution.position.codes();
        let forward =
            self.data
                .fetch_forward_returns(date, &executed_codes, self.config.horizon)?;
        let (ret, leverage) = active_return(date, &execution.position, &snapshot, &forward)?;

        let record = RebalanceRecord {
            date,
            ret,
            turnover: execution.turnover,
            leverage,
            full_rebalance,
        };
        log::info!(
            "{} is finished: return {:.6}, turnover {:.4}, leverage {:.4}",
            date,
            record.ret,
            record.turnover,
            record.leverage
        );

        Ok((record, state.clone().advance(execution.position)))
    }
}

/// Leverage-normalized active return of `executed` over the forward horizon.
///
/// The benchmark leg is scaled so its total weight matches the portfolio's
/// gross exposure. Returns `(return, leverage)`.
pub fn active_return(
    date: NaiveDate,
    executed: &Position,
    snapshot: &UniverseSnapshot,
    forward: &HashMap<String, f64>,
) -> Result<(f64, f64), AlphaTraderError> {
    let benchmark: HashMap<&str, f64> = snapshot
        .assets
        .iter()
        .map(|a| (a.code.as_str(), a.benchmark_weight))
        .collect();

    let mut joined: Vec<(f64, f64, f64)> = Vec::with_capacity(executed.len());
    for (code, weight) in executed.iter() {
        let bench = benchmark.get(code).copied();
        let dx = forward.get(code).copied().filter(|v| v.is_finite());
        match (bench, dx) {
            (Some(b), Some(dx)) => joined.push((weight, b, dx)),
            _ if weight.abs() <= UNTRADED_WEIGHT => {}
            (None, _) => {
                return Err(AlphaTraderError::MissingJoinData {
                    date,
                    code: code.to_string(),
                    field: "benchmark weight".into(),
                });
            }
            (_, None) => {
                return Err(AlphaTraderError::MissingJoinData {
                    date,
                    code: code.to_string(),
                    field: "forward return".into(),
                });
            }
        }
    }

    let leverage: f64 = joined.iter().map(|(w, _, _)| w.abs()).sum();
    let bench_total: f64 = joined.iter().map(|(_, b, _)| b).sum();
    let scale = if bench_total != 0.0 {
        leverage / bench_total
    } else {
        0.0
    };
    let ret: f64 = joined
        .iter()
        .map(|(w, b, dx)| (w - b * scale) * dx)
        .sum();
    Ok((ret, leverage))
}

/// Turn per-date records into the reported series.
///
/// A zero row dated one period after the last record is appended, then every
/// value is shifted down one row and the first row zeroed, so each row shows
/// what was realized over the period ending on its date.
pub fn build_series(
    records: &[RebalanceRecord],
    frequency: &Frequency,
    cost_rate: f64,
) -> Result<Vec<ReportRow>, AlphaTraderError> {
    let Some(last) = records.last() else {
        return Ok(Vec::new());
    };
    let closing_date = frequency
        .advance(last.date)
        .ok_or_else(|| AlphaTraderError::Data {
            reason: format!("cannot advance {} by {}", last.date, frequency),
        })?;

    let dates = records
        .iter()
        .map(|r| r.date)
        .chain(std::iter::once(closing_date));
    let values = std::iter::once((0.0, 0.0, 0.0))
        .chain(records.iter().map(|r| (r.ret, r.turnover, r.leverage)));

    Ok(dates
        .zip(values)
        .map(|(date, (ret, turnover, leverage))| ReportRow {
            date,
            ret,
            turnover,
            leverage,
            transaction_cost: turnover * cost_rate,
        })
        .collect())
}
