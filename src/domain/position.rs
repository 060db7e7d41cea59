//! Portfolio positions as asset code → signed weight.

use std::collections::BTreeMap;

/// Target or executed portfolio weights keyed by asset code.
///
/// Backed by a `BTreeMap` so iteration order, and everything derived from
/// it, is deterministic across runs.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Position {
    weights: BTreeMap<String, f64>,
}

impl Position {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a position from parallel code and weight slices.
    pub fn from_weights(codes: &[String], weights: &[f64]) -> Self {
        Position {
            weights: codes
                .iter()
                .cloned()
                .zip(weights.iter().copied())
                .collect(),
        }
    }

    pub fn set(&mut self, code: &str, weight: f64) {
        self.weights.insert(code.to_string(), weight);
    }

    /// Weight held in `code`, zero when absent.
    pub fn weight(&self, code: &str) -> f64 {
        self.weights.get(code).copied().unwrap_or(0.0)
    }

    pub fn contains(&self, code: &str) -> bool {
        self.weights.contains_key(code)
    }

    pub fn is_empty(&self) -> bool {
        self.weights.is_empty()
    }

    pub fn len(&self) -> usize {
        self.weights.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, f64)> {
        self.weights.iter().map(|(code, &w)| (code.as_str(), w))
    }

    pub fn codes(&self) -> Vec<String> {
        self.weights.keys().cloned().collect()
    }

    /// Weights re-indexed onto `codes`; codes not held get zero.
    pub fn aligned_to(&self, codes: &[String]) -> Vec<f64> {
        codes.iter().map(|c| self.weight(c)).collect()
    }

    /// Net exposure.
    pub fn total(&self) -> f64 {
        self.weights.values().sum()
    }

    /// Gross exposure (sum of absolute weights).
    pub fn leverage(&self) -> f64 {
        self.weights.values().map(|w| w.abs()).sum()
    }

    /// L1 distance over the union of both positions' codes.
    pub fn l1_distance(&self, other: &Position) -> f64 {
        let mine: f64 = self
            .weights
            .iter()
            .map(|(code, &w)| (w - other.weight(code)).abs())
            .sum();
        let theirs: f64 = other
            .weights
            .iter()
            .filter(|(code, _)| !self.weights.contains_key(*code))
            .map(|(_, &w)| w.abs())
            .sum();
        mine + theirs
    }
}
