//! Turnover-aware portfolio construction.
//!
//! Maximizes `score · w` subject to the exposure constraints, per-asset bounds
//! and an optional L1 turnover budget against the previous position. The
//! turnover term is linearized with one slack per asset
//! (`s_i >= |w_i - p_i|`, `Σ s_i <= budget`), so every problem is an LP.

use std::collections::HashMap;
use std::fmt;

use minilp::{ComparisonOp, LinearExpr, OptimizationDirection, Problem, Variable};

use super::constraints::{ConstraintSet, WeightBounds};

/// Previous weights (aligned to the problem's assets) and the allowed L1 change.
#[derive(Debug, Clone, Copy)]
pub struct TurnoverBudget<'a> {
    pub previous: &'a [f64],
    pub budget: f64,
}

#[derive(Debug, Clone, Copy)]
pub struct OptimizationProblem<'a> {
    pub scores: &'a [f64],
    pub constraints: &'a ConstraintSet,
    pub bounds: &'a WeightBounds,
    pub industries: &'a [String],
    pub benchmark: &'a [f64],
    pub turnover: Option<TurnoverBudget<'a>>,
}

impl OptimizationProblem<'_> {
    /// The same problem with the turnover budget dropped.
    pub fn without_turnover(&self) -> Self {
        OptimizationProblem {
            turnover: None,
            ..*self
        }
    }

    fn check_shapes(&self) -> Result<(), SolveError> {
        let n = self.scores.len();
        let mut lengths = vec![
            ("bounds", self.bounds.lower.len()),
            ("bounds", self.bounds.upper.len()),
            ("constraint exposures", self.constraints.asset_count()),
            ("industries", self.industries.len()),
            ("benchmark", self.benchmark.len()),
        ];
        if let Some(t) = &self.turnover {
            lengths.push(("previous position", t.previous.len()));
        }
        match lengths.into_iter().find(|(_, len)| *len != n) {
            Some((what, actual)) => Err(SolveError::ShapeMismatch {
                what,
                expected: n,
                actual,
            }),
            None => Ok(()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum SolveError {
    #[error("problem is infeasible")]
    Infeasible,

    #[error("problem is unbounded")]
    Unbounded,

    #[error("{what} has {actual} entries, expected {expected}")]
    ShapeMismatch {
        what: &'static str,
        expected: usize,
        actual: usize,
    },
}

/// Configured portfolio construction method.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BuildMethod {
    RiskNeutral,
    Rank { use_rank: usize },
}

impl BuildMethod {
    pub fn parse(name: &str, use_rank: usize) -> Option<Self> {
        match name.trim().to_lowercase().as_str() {
            "risk_neutral" => Some(BuildMethod::RiskNeutral),
            "rank" => Some(BuildMethod::Rank { use_rank }),
            _ => None,
        }
    }

    pub fn builder(&self) -> Box<dyn PortfolioBuilder> {
        match *self {
            BuildMethod::RiskNeutral => Box::new(RiskNeutralBuilder),
            BuildMethod::Rank { use_rank } => Box::new(RankTruncationBuilder { use_rank }),
        }
    }
}

impl fmt::Display for BuildMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BuildMethod::RiskNeutral => write!(f, "risk_neutral"),
            BuildMethod::Rank { use_rank } => write!(f, "rank (top {use_rank} per industry)"),
        }
    }
}

/// A portfolio construction strategy.
pub trait PortfolioBuilder {
    fn solve(&self, problem: &OptimizationProblem<'_>) -> Result<Vec<f64>, SolveError>;
}

/// Full LP over every asset.
#[derive(Debug, Clone, Copy, Default)]
pub struct RiskNeutralBuilder;

impl PortfolioBuilder for RiskNeutralBuilder {
    fn solve(&self, problem: &OptimizationProblem<'_>) -> Result<Vec<f64>, SolveError> {
        problem.check_shapes()?;
        solve_linear(problem, &problem.bounds.lower, &problem.bounds.upper)
    }
}

/// LP restricted to the top `use_rank` scored assets within each industry;
/// every other asset is pinned to zero weight.
#[derive(Debug, Clone, Copy)]
pub struct RankTruncationBuilder {
    pub use_rank: usize,
}

impl RankTruncationBuilder {
    /// `true` for assets among the top `use_rank` scores of their industry.
    /// Ties keep the earlier asset.
    pub fn tradable_mask(&self, scores: &[f64], industries: &[String]) -> Vec<bool> {
        let mut groups: HashMap<&str, Vec<usize>> = HashMap::new();
        for (i, industry) in industries.iter().enumerate() {
            groups.entry(industry.as_str()).or_default().push(i);
        }

        let mut mask = vec![false; scores.len()];
        for members in groups.values_mut() {
            members.sort_by(|&a, &b| scores[b].total_cmp(&scores[a]).then(a.cmp(&b)));
            for &i in members.iter().take(self.use_rank) {
                mask[i] = true;
            }
        }
        mask
    }
}

impl PortfolioBuilder for RankTruncationBuilder {
    fn solve(&self, problem: &OptimizationProblem<'_>) -> Result<Vec<f64>, SolveError> {
        problem.check_shapes()?;
        let mask = self.tradable_mask(problem.scores, problem.industries);
        let (mut lower, mut upper) = (problem.bounds.lower.clone(), problem.bounds.upper.clone());
        for (i, tradable) in mask.iter().enumerate() {
            if !tradable {
                let pinned = lower[i].max(0.0).min(upper[i]);
                lower[i] = pinned;
                upper[i] = pinned;
            }
        }
        solve_linear(problem, &lower, &upper)
    }
}

const ZERO_ROW_TOLERANCE: f64 = 1e-12;

fn expr(terms: impl IntoIterator<Item = (Variable, f64)>) -> LinearExpr {
    let mut e = LinearExpr::empty();
    for (var, coeff) in terms {
        e.add(var, coeff);
    }
    e
}

fn solve_linear(
    problem: &OptimizationProblem<'_>,
    lower: &[f64],
    upper: &[f64],
) -> Result<Vec<f64>, SolveError> {
    let n = problem.scores.len();
    let mut lp = Problem::new(OptimizationDirection::Maximize);

    let weights: Vec<Variable> = (0..n)
        .map(|i| lp.add_var(problem.scores[i], (lower[i], upper[i])))
        .collect();

    for (k, c) in problem.constraints.constraints().iter().enumerate() {
        let terms: Vec<(Variable, f64)> = weights
            .iter()
            .enumerate()
            .map(|(i, &w)| (w, problem.constraints.coefficient(i, k)))
            .filter(|(_, coeff)| *coeff != 0.0)
            .collect();
        if terms.is_empty() {
            // an all-zero row constrains nothing but its own bounds
            if c.lower > ZERO_ROW_TOLERANCE || c.upper < -ZERO_ROW_TOLERANCE {
                return Err(SolveError::Infeasible);
            }
            continue;
        }
        let row = || expr(terms.iter().copied());
        if c.is_equality() {
            lp.add_constraint(row(), ComparisonOp::Eq, c.lower);
            continue;
        }
        if c.lower.is_finite() {
            lp.add_constraint(row(), ComparisonOp::Ge, c.lower);
        }
        if c.upper.is_finite() {
            lp.add_constraint(row(), ComparisonOp::Le, c.upper);
        }
    }

    if let Some(turnover) = &problem.turnover {
        let slacks: Vec<Variable> = (0..n)
            .map(|_| lp.add_var(0.0, (0.0, f64::INFINITY)))
            .collect();
        for i in 0..n {
            let prev = turnover.previous[i];
            lp.add_constraint(
                expr([(slacks[i], 1.0), (weights[i], -1.0)]),
                ComparisonOp::Ge,
                -prev,
            );
            lp.add_constraint(
                expr([(slacks[i], 1.0), (weights[i], 1.0)]),
                ComparisonOp::Ge,
                prev,
            );
        }
        lp.add_constraint(
            expr(slacks.iter().map(|&s| (s, 1.0))),
            ComparisonOp::Le,
            turnover.budget,
        );
    }

    let solution = lp.solve().map_err(|e| match e {
        minilp::Error::Infeasible => SolveError::Infeasible,
        minilp::Error::Unbounded => SolveError::Unbounded,
    })?;
    log::debug!("lp solved: {} assets, objective {:.6}", n, solution.objective());

    Ok(weights
        .iter()
        .enumerate()
        .map(|(i, &w)| solution[w].clamp(lower[i], upper[i]))
        .collect())
}

/// Result of the two-attempt optimization.
#[derive(Debug, Clone, PartialEq)]
pub enum OptimizationOutcome {
    Solved(Vec<f64>),
    /// The turnover budget was infeasible; weights come from a full rebalance.
    SolvedWithFallback(Vec<f64>),
    Failed(SolveError),
}

impl OptimizationOutcome {
    pub fn is_fallback(&self) -> bool {
        matches!(self, OptimizationOutcome::SolvedWithFallback(_))
    }
}

impl fmt::Display for OptimizationOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OptimizationOutcome::Solved(_) => write!(f, "solved"),
            OptimizationOutcome::SolvedWithFallback(_) => write!(f, "solved with full rebalance"),
            OptimizationOutcome::Failed(e) => write!(f, "failed: {e}"),
        }
    }
}

/// Solve with the turnover budget; if that is infeasible, solve once more
/// without it.
pub fn optimize_with_fallback(
    builder: &dyn PortfolioBuilder,
    problem: &OptimizationProblem<'_>,
) -> OptimizationOutcome {
    match builder.solve(problem) {
        Ok(weights) => OptimizationOutcome::Solved(weights),
        Err(SolveError::Infeasible) if problem.turnover.is_some() => {
            match builder.solve(&problem.without_turnover()) {
                Ok(weights) => OptimizationOutcome::SolvedWithFallback(weights),
                Err(e) => OptimizationOutcome::Failed(e),
            }
        }
        Err(e) => OptimizationOutcome::Failed(e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::constraints::{
        build_constraints, ConstraintSpec, ExposureMatrix, IndustryBand, StyleBand, TOTAL,
    };
    use crate::domain::universe::{AssetSnapshot, UniverseSnapshot};
    use approx::assert_abs_diff_eq;
    use chrono::NaiveDate;

    struct Fixture {
        constraints: ConstraintSet,
        bounds: WeightBounds,
        industries: Vec<String>,
        benchmark: Vec<f64>,
    }

    fn fixture(assets: &[(&str, &str, f64, f64)], spec: &ConstraintSpec) -> Fixture {
        let snapshot = UniverseSnapshot {
            date: NaiveDate::from_ymd_opt(2024, 1, 5).unwrap(),
            risk_names: vec!["SIZE".into()],
            factor_names: vec![],
            assets: assets
                .iter()
                .map(|&(code, industry, bw, size)| AssetSnapshot {
                    code: code.into(),
                    industry: industry.into(),
                    benchmark_weight: bw,
                    exposures: vec![size],
                    factors: vec![],
                })
                .collect(),
        };
        let matrix = ExposureMatrix::from_snapshot(&snapshot, spec).unwrap();
        let benchmark = snapshot.benchmark_weights();
        let (constraints, bounds) = build_constraints(&matrix, &benchmark, spec).unwrap();
        Fixture {
            constraints,
            bounds,
            industries: snapshot.industries(),
            benchmark,
        }
    }

    fn size_spec(cap: f64) -> ConstraintSpec {
        ConstraintSpec {
            styles: vec![StyleBand {
                name: "SIZE".into(),
                lower: 0.0,
                upper: 0.0,
            }],
            industry: None,
            weight_cap: cap,
        }
    }

    fn problem<'a>(f: &'a Fixture, scores: &'a [f64]) -> OptimizationProblem<'a> {
        OptimizationProblem {
            scores,
            constraints: &f.constraints,
            bounds: &f.bounds,
            industries: &f.industries,
            benchmark: &f.benchmark,
            turnover: None,
        }
    }

    fn l1(a: &[f64], b: &[f64]) -> f64 {
        a.iter().zip(b).map(|(x, y)| (x - y).abs()).sum()
    }

    #[test]
    fn two_asset_equalities_pin_solution() {
        let f = fixture(&[("A", "X", 0.6, 1.0), ("B", "X", 0.4, -1.0)], &size_spec(1.0));
        let scores = [1.0, -1.0];
        let w = RiskNeutralBuilder.solve(&problem(&f, &scores)).unwrap();
        assert_abs_diff_eq!(w[0], 0.6, epsilon = 1e-7);
        assert_abs_diff_eq!(w[1], 0.4, epsilon = 1e-7);
    }

    #[test]
    fn lp_prefers_high_scores_within_constraints() {
        let assets = [
            ("A", "X", 0.25, 0.0),
            ("B", "X", 0.25, 0.0),
            ("C", "X", 0.25, 0.0),
            ("D", "X", 0.25, 0.0),
        ];
        let f = fixture(&assets, &size_spec(0.5));
        let scores = [4.0, 3.0, 2.0, 1.0];
        let w = RiskNeutralBuilder.solve(&problem(&f, &scores)).unwrap();
        assert_abs_diff_eq!(w[0], 0.5, epsilon = 1e-7);
        assert_abs_diff_eq!(w[1], 0.5, epsilon = 1e-7);
        assert_abs_diff_eq!(w[2], 0.0, epsilon = 1e-7);
        assert_abs_diff_eq!(w[3], 0.0, epsilon = 1e-7);

        let total = f.constraints.realized(&w)[f.constraints.len() - 1];
        assert_abs_diff_eq!(total, 1.0, epsilon = 1e-7);
        assert_eq!(f.constraints.constraints().last().unwrap().name, TOTAL);
    }

    #[test]
    fn turnover_budget_is_respected() {
        let assets = [
            ("A", "X", 0.25, 0.0),
            ("B", "X", 0.25, 0.0),
            ("C", "X", 0.25, 0.0),
            ("D", "X", 0.25, 0.0),
        ];
        let f = fixture(&assets, &size_spec(0.5));
        let scores = [4.0, 3.0, 2.0, 1.0];
        let previous = [0.0, 0.0, 0.5, 0.5];
        let mut p = problem(&f, &scores);
        p.turnover = Some(TurnoverBudget {
            previous: &previous,
            budget: 0.4,
        });
        let w = RiskNeutralBuilder.solve(&p).unwrap();
        assert!(l1(&w, &previous) <= 0.4 + 1e-7);
        // best use of the budget: move 0.2 from D into A
        assert_abs_diff_eq!(w[0], 0.2, epsilon = 1e-7);
        assert_abs_diff_eq!(w[3], 0.3, epsilon = 1e-7);
    }

    #[test]
    fn zero_budget_keeps_previous() {
        let assets = [
            ("A", "X", 0.25, 0.0),
            ("B", "X", 0.25, 0.0),
            ("C", "X", 0.25, 0.0),
            ("D", "X", 0.25, 0.0),
        ];
        let f = fixture(&assets, &size_spec(0.5));
        let scores = [4.0, 3.0, 2.0, 1.0];
        let previous = [0.1, 0.2, 0.3, 0.4];
        let mut p = problem(&f, &scores);
        p.turnover = Some(TurnoverBudget {
            previous: &previous,
            budget: 0.0,
        });
        let w = RiskNeutralBuilder.solve(&p).unwrap();
        assert!(l1(&w, &previous) < 1e-7);
    }

    #[test]
    fn fallback_when_turnover_infeasible() {
        let f = fixture(&[("A", "X", 0.6, 1.0), ("B", "X", 0.4, -1.0)], &size_spec(1.0));
        let scores = [1.0, -1.0];
        // previous position cannot reach (0.6, 0.4) within the budget
        let previous = [0.0, 1.0];
        let mut p = problem(&f, &scores);
        p.turnover = Some(TurnoverBudget {
            previous: &previous,
            budget: 0.1,
        });

        let outcome = optimize_with_fallback(&RiskNeutralBuilder, &p);
        assert!(outcome.is_fallback());
        match outcome {
            OptimizationOutcome::SolvedWithFallback(w) => {
                assert_abs_diff_eq!(w[0], 0.6, epsilon = 1e-7);
                assert_abs_diff_eq!(w[1], 0.4, epsilon = 1e-7);
            }
            other => panic!("unexpected outcome {other}"),
        }
    }

    #[test]
    fn feasible_turnover_is_plain_solve() {
        let f = fixture(&[("A", "X", 0.6, 1.0), ("B", "X", 0.4, -1.0)], &size_spec(1.0));
        let scores = [1.0, -1.0];
        let previous = [0.6, 0.4];
        let mut p = problem(&f, &scores);
        p.turnover = Some(TurnoverBudget {
            previous: &previous,
            budget: 0.0,
        });
        assert!(matches!(
            optimize_with_fallback(&RiskNeutralBuilder, &p),
            OptimizationOutcome::Solved(_)
        ));
    }

    #[test]
    fn infeasible_without_turnover_fails() {
        // cap 1.5% cannot reach a total weight of 1.0 with two assets
        let f = fixture(&[("A", "X", 0.6, 1.0), ("B", "X", 0.4, -1.0)], &size_spec(0.015));
        let scores = [1.0, -1.0];
        let outcome = optimize_with_fallback(&RiskNeutralBuilder, &problem(&f, &scores));
        assert_eq!(outcome, OptimizationOutcome::Failed(SolveError::Infeasible));

        let previous = [0.0, 0.0];
        let mut p = problem(&f, &scores);
        p.turnover = Some(TurnoverBudget {
            previous: &previous,
            budget: 1.0,
        });
        assert_eq!(
            optimize_with_fallback(&RiskNeutralBuilder, &p),
            OptimizationOutcome::Failed(SolveError::Infeasible)
        );
    }

    #[test]
    fn shape_mismatch_is_reported() {
        let f = fixture(&[("A", "X", 0.6, 1.0), ("B", "X", 0.4, -1.0)], &size_spec(1.0));
        let scores = [1.0];
        let err = RiskNeutralBuilder.solve(&problem(&f, &scores)).unwrap_err();
        assert!(matches!(err, SolveError::ShapeMismatch { expected: 1, actual: 2, .. }));
    }

    #[test]
    fn build_method_parse() {
        assert_eq!(BuildMethod::parse("risk_neutral", 5), Some(BuildMethod::RiskNeutral));
        assert_eq!(BuildMethod::parse(" RANK ", 5), Some(BuildMethod::Rank { use_rank: 5 }));
        assert_eq!(BuildMethod::parse("mean_variance", 5), None);
    }

    #[test]
    fn rank_mask_is_per_industry() {
        let builder = RankTruncationBuilder { use_rank: 1 };
        let industries: Vec<String> = ["X", "X", "Y", "Y"].iter().map(|s| s.to_string()).collect();
        let mask = builder.tradable_mask(&[1.0, 2.0, 5.0, 5.0], &industries);
        assert_eq!(mask, vec![false, true, true, false]);
    }

    #[test]
    fn rank_builder_only_holds_top_names() {
        let spec = ConstraintSpec {
            industry: Some(IndustryBand::default()),
            ..size_spec(0.5)
        };
        let assets = [
            ("A", "X", 0.25, 0.0),
            ("B", "X", 0.25, 0.0),
            ("C", "Y", 0.25, 0.0),
            ("D", "Y", 0.25, 0.0),
        ];
        let f = fixture(&assets, &spec);
        let scores = [1.0, 2.0, 4.0, 3.0];
        let w = RankTruncationBuilder { use_rank: 1 }
            .solve(&problem(&f, &scores))
            .unwrap();
        assert_abs_diff_eq!(w[0], 0.0, epsilon = 1e-7);
        assert_abs_diff_eq!(w[1], 0.5, epsilon = 1e-7);
        assert_abs_diff_eq!(w[2], 0.5, epsilon = 1e-7);
        assert_abs_diff_eq!(w[3], 0.0, epsilon = 1e-7);
    }
}
