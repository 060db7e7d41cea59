//! Exposure constraint construction.
//!
//! Turns per-asset risk/industry exposures and benchmark weights into a named
//! set of linear constraints, each bounding `exposure_column · weights`.

use std::collections::{BTreeSet, HashSet};

use super::error::AlphaTraderError;
use super::universe::UniverseSnapshot;

pub const TOTAL: &str = "total";
pub const DEFAULT_WEIGHT_CAP: f64 = 0.015;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnKind {
    Style,
    Industry,
    Total,
}

/// Tolerance band for a style factor, as fractions of |benchmark exposure|.
#[derive(Debug, Clone, PartialEq)]
pub struct StyleBand {
    pub name: String,
    pub lower: f64,
    pub upper: f64,
}

/// Multipliers on the benchmark's industry exposure.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct IndustryBand {
    pub lower: f64,
    pub upper: f64,
}

impl Default for IndustryBand {
    fn default() -> Self {
        IndustryBand {
            lower: 1.0,
            upper: 1.0,
        }
    }
}

/// Which exposures to constrain and how tightly.
#[derive(Debug, Clone, PartialEq)]
pub struct ConstraintSpec {
    pub styles: Vec<StyleBand>,
    /// `None` disables industry constraints.
    pub industry: Option<IndustryBand>,
    pub weight_cap: f64,
}

impl Default for ConstraintSpec {
    fn default() -> Self {
        ConstraintSpec {
            styles: vec![StyleBand {
                name: "SIZE".into(),
                lower: 0.0,
                upper: 0.0,
            }],
            industry: Some(IndustryBand::default()),
            weight_cap: DEFAULT_WEIGHT_CAP,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ExposureColumn {
    pub name: String,
    pub kind: ColumnKind,
}

/// Asset-major exposure matrix: `rows[asset][column]`.
#[derive(Debug, Clone, PartialEq)]
pub struct ExposureMatrix {
    pub columns: Vec<ExposureColumn>,
    pub rows: Vec<Vec<f64>>,
}

impl ExposureMatrix {
    /// Select the configured style columns from a snapshot and append one-hot
    /// industry columns (sorted by label) when industry constraints are on.
    pub fn from_snapshot(
        snapshot: &UniverseSnapshot,
        spec: &ConstraintSpec,
    ) -> Result<Self, AlphaTraderError> {
        let mut style_idx = Vec::with_capacity(spec.styles.len());
        for band in &spec.styles {
            let idx = snapshot
                .risk_index(&band.name)
                .ok_or_else(|| AlphaTraderError::ShapeMismatch {
                    what: format!("risk column {}", band.name),
                    expected: 1,
                    actual: 0,
                })?;
            style_idx.push(idx);
        }

        let industries: Vec<String> = if spec.industry.is_some() {
            snapshot
                .assets
                .iter()
                .map(|a| a.industry.clone())
                .collect::<BTreeSet<_>>()
                .into_iter()
                .collect()
        } else {
            Vec::new()
        };

        let mut columns: Vec<ExposureColumn> = spec
            .styles
            .iter()
            .map(|b| ExposureColumn {
                name: b.name.clone(),
                kind: ColumnKind::Style,
            })
            .collect();
        columns.extend(industries.iter().map(|name| ExposureColumn {
            name: name.clone(),
            kind: ColumnKind::Industry,
        }));

        let mut rows = Vec::with_capacity(snapshot.count());
        for asset in &snapshot.assets {
            if asset.exposures.len() != snapshot.risk_names.len() {
                return Err(AlphaTraderError::ShapeMismatch {
                    what: format!("risk exposures of {}", asset.code),
                    expected: snapshot.risk_names.len(),
                    actual: asset.exposures.len(),
                });
            }
            let mut row: Vec<f64> = style_idx.iter().map(|&i| asset.exposures[i]).collect();
            row.extend(
                industries
                    .iter()
                    .map(|ind| if *ind == asset.industry { 1.0 } else { 0.0 }),
            );
            rows.push(row);
        }

        Ok(ExposureMatrix { columns, rows })
    }

    pub fn asset_count(&self) -> usize {
        self.rows.len()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct LinearConstraint {
    pub name: String,
    pub kind: ColumnKind,
    pub lower: f64,
    pub upper: f64,
}

impl LinearConstraint {
    pub fn is_equality(&self) -> bool {
        self.lower == self.upper
    }
}

/// Named linear constraints over the weight vector.
///
/// `exposures[asset][k]` is the coefficient of asset `asset` in constraint `k`.
#[derive(Debug, Clone, PartialEq)]
pub struct ConstraintSet {
    constraints: Vec<LinearConstraint>,
    exposures: Vec<Vec<f64>>,
}

impl ConstraintSet {
    pub fn len(&self) -> usize {
        self.constraints.len()
    }

    pub fn is_empty(&self) -> bool {
        self.constraints.is_empty()
    }

    pub fn asset_count(&self) -> usize {
        self.exposures.len()
    }

    pub fn constraints(&self) -> &[LinearConstraint] {
        &self.constraints
    }

    pub fn get(&self, name: &str) -> Option<&LinearConstraint> {
        self.constraints.iter().find(|c| c.name == name)
    }

    pub fn coefficient(&self, asset: usize, constraint: usize) -> f64 {
        self.exposures[asset][constraint]
    }

    /// Realized value of every constraint under `weights`.
    pub fn realized(&self, weights: &[f64]) -> Vec<f64> {
        (0..self.constraints.len())
            .map(|k| {
                self.exposures
                    .iter()
                    .zip(weights)
                    .map(|(row, w)| row[k] * w)
                    .sum()
            })
            .collect()
    }

    /// Names of constraints violated by more than `tolerance`.
    pub fn violations(&self, weights: &[f64], tolerance: f64) -> Vec<String> {
        self.constraints
            .iter()
            .zip(self.realized(weights))
            .filter(|(c, value)| *value < c.lower - tolerance || *value > c.upper + tolerance)
            .map(|(c, _)| c.name.clone())
            .collect()
    }
}

/// Per-asset weight bounds.
#[derive(Debug, Clone, PartialEq)]
pub struct WeightBounds {
    pub lower: Vec<f64>,
    pub upper: Vec<f64>,
}

impl WeightBounds {
    pub fn uniform(n: usize, lower: f64, upper: f64) -> Self {
        WeightBounds {
            lower: vec![lower; n],
            upper: vec![upper; n],
        }
    }

    pub fn len(&self) -> usize {
        self.lower.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lower.is_empty()
    }
}

/// Build the constraint set and long-only bounds for one rebalance date.
///
/// A `"total"` column fixed at 1.0 is appended and pinned to the benchmark's
/// total weight.
pub fn build_constraints(
    exposures: &ExposureMatrix,
    benchmark: &[f64],
    spec: &ConstraintSpec,
) -> Result<(ConstraintSet, WeightBounds), AlphaTraderError> {
    let n = benchmark.len();
    if exposures.asset_count() != n {
        return Err(AlphaTraderError::ShapeMismatch {
            what: "exposure matrix rows".into(),
            expected: n,
            actual: exposures.asset_count(),
        });
    }
    let width = exposures.columns.len();
    if let Some(row) = exposures.rows.iter().find(|r| r.len() != width) {
        return Err(AlphaTraderError::ShapeMismatch {
            what: "exposure matrix columns".into(),
            expected: width,
            actual: row.len(),
        });
    }

    let mut seen = HashSet::new();
    let mut constraints = Vec::with_capacity(width + 1);
    let total_column = ExposureColumn {
        name: TOTAL.to_string(),
        kind: ColumnKind::Total,
    };
    let columns = exposures
        .columns
        .iter()
        .chain(std::iter::once(&total_column));

    for (k, column) in columns.enumerate() {
        if !seen.insert(column.name.clone()) {
            return Err(AlphaTraderError::DuplicateConstraint {
                name: column.name.clone(),
            });
        }

        let target: f64 = if column.kind == ColumnKind::Total {
            benchmark.iter().sum()
        } else {
            exposures
                .rows
                .iter()
                .zip(benchmark)
                .map(|(row, w)| row[k] * w)
                .sum()
        };

        let (lower, upper) = match column.kind {
            ColumnKind::Total => (target, target),
            ColumnKind::Style => {
                let band = spec.styles.iter().find(|b| b.name == column.name);
                let (lo, hi) = band.map(|b| (b.lower, b.upper)).unwrap_or((0.0, 0.0));
                let base = target.abs();
                (target - base * lo, target + base * hi)
            }
            ColumnKind::Industry => {
                let band = spec.industry.unwrap_or_default();
                (target * band.lower, target * band.upper)
            }
        };

        constraints.push(LinearConstraint {
            name: column.name.clone(),
            kind: column.kind,
            lower,
            upper,
        });
    }

    let rows = exposures
        .rows
        .iter()
        .map(|row| {
            let mut row = row.clone();
            row.push(1.0);
            row
        })
        .collect();

    Ok((
        ConstraintSet {
            constraints,
            exposures: rows,
        },
        WeightBounds::uniform(n, 0.0, spec.weight_cap),
    ))
}
