//! Per-date investable universe snapshots and rebalance scheduling.

use chrono::NaiveDate;

use super::frequency::Frequency;

/// One asset's data on a rebalance date.
#[derive(Debug, Clone, PartialEq)]
pub struct AssetSnapshot {
    pub code: String,
    pub industry: String,
    pub benchmark_weight: f64,
    /// Risk exposures aligned to [`UniverseSnapshot::risk_names`].
    pub exposures: Vec<f64>,
    /// Raw factor values aligned to [`UniverseSnapshot::factor_names`].
    pub factors: Vec<Option<f64>>,
}

/// Everything the data service knows about the universe on one date.
#[derive(Debug, Clone, PartialEq)]
pub struct UniverseSnapshot {
    pub date: NaiveDate,
    pub risk_names: Vec<String>,
    pub factor_names: Vec<String>,
    pub assets: Vec<AssetSnapshot>,
}

impl UniverseSnapshot {
    pub fn codes(&self) -> Vec<String> {
        self.assets.iter().map(|a| a.code.clone()).collect()
    }

    pub fn industries(&self) -> Vec<String> {
        self.assets.iter().map(|a| a.industry.clone()).collect()
    }

    pub fn benchmark_weights(&self) -> Vec<f64> {
        self.assets.iter().map(|a| a.benchmark_weight).collect()
    }

    pub fn count(&self) -> usize {
        self.assets.len()
    }

    pub fn risk_index(&self, name: &str) -> Option<usize> {
        self.risk_names.iter().position(|n| n == name)
    }

    pub fn factor_index(&self, name: &str) -> Option<usize> {
        self.factor_names.iter().position(|n| n == name)
    }
}

/// Thin the available data dates down to the rebalance frequency.
///
/// The first date is always kept; each following kept date is the first
/// available one on or after the previous kept date advanced by one period.
pub fn schedule_rebalance_dates(available: &[NaiveDate], frequency: &Frequency) -> Vec<NaiveDate> {
    let mut dates = available.to_vec();
    dates.sort();
    dates.dedup();

    let mut schedule: Vec<NaiveDate> = Vec::new();
    let mut next_due: Option<NaiveDate> = None;
    for date in dates {
        if next_due.is_some_and(|due| date < due) {
            continue;
        }
        schedule.push(date);
        match frequency.advance(date) {
            Some(due) => next_due = Some(due),
            None => break,
        }
    }
    schedule
}
