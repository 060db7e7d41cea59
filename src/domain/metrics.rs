//! Summary statistics over the reported series.

use super::backtest::ReportRow;
use super::frequency::Frequency;

#[derive(Debug, Clone, PartialEq)]
pub struct Metrics {
    pub periods: usize,
    /// Sum of active returns before costs.
    pub total_return: f64,
    pub total_cost: f64,
    pub net_return: f64,
    pub average_turnover: f64,
    pub average_leverage: f64,
    /// Largest fall of the cumulative net return from its running peak.
    pub max_drawdown: f64,
    pub max_drawdown_duration: usize,
    pub information_ratio: f64,
}

impl Metrics {
    /// The leading zero row of the series is excluded from averages.
    pub fn compute(series: &[ReportRow], frequency: &Frequency) -> Self {
        let realized = series.get(1..).unwrap_or(&[]);
        let periods = realized.len();

        let total_return: f64 = realized.iter().map(|r| r.ret).sum();
        let total_cost: f64 = realized.iter().map(|r| r.transaction_cost).sum();
        let net_return = total_return - total_cost;

        let average_turnover = mean(realized.iter().map(|r| r.turnover), periods);
        let average_leverage = mean(realized.iter().map(|r| r.leverage), periods);

        let net: Vec<f64> = series
            .iter()
            .map(|r| r.ret - r.transaction_cost)
            .collect();
        let (max_drawdown, max_drawdown_duration) = compute_drawdown(&net);
        let information_ratio =
            compute_information_ratio(&net[net.len().min(1)..], frequency.periods_per_year());

        Metrics {
            periods,
            total_return,
            total_cost,
            net_return,
            average_turnover,
            average_leverage,
            max_drawdown,
            max_drawdown_duration,
            information_ratio,
        }
    }
}

fn mean(values: impl Iterator<Item = f64>, n: usize) -> f64 {
    if n == 0 {
        return 0.0;
    }
    values.sum::<f64>() / n as f64
}

/// Drawdown of the cumulative sum of `returns`, in return units.
fn compute_drawdown(returns: &[f64]) -> (f64, usize) {
    let mut cumulative = 0.0_f64;
    let mut peak = 0.0_f64;
    let mut max_dd = 0.0_f64;
    let mut max_dd_duration = 0usize;
    let mut current_dd_duration = 0usize;

    for r in returns {
        cumulative += r;
        if cumulative >= peak {
            peak = cumulative;
            current_dd_duration = 0;
        } else {
            let dd = peak - cumulative;
            if dd > max_dd {
                max_dd = dd;
            }
            current_dd_duration += 1;
            if current_dd_duration > max_dd_duration {
                max_dd_duration = current_dd_duration;
            }
        }
    }

    (max_dd, max_dd_duration)
}

fn compute_information_ratio(returns: &[f64], periods_per_year: f64) -> f64 {
    if returns.len() < 2 {
        return 0.0;
    }
    let n = returns.len() as f64;
    let mean = returns.iter().sum::<f64>() / n;
    let variance = returns.iter().map(|r| (r - mean).powi(2)).sum::<f64>() / n;
    let stddev = variance.sqrt();

    if stddev > 0.0 {
        mean / stddev * periods_per_year.sqrt()
    } else {
        0.0
    }
}
