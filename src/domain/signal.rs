//! Signal models and the sources that feed them.
//!
//! A [`SignalModel`] is an opaque `predict(features) -> scores` function. A
//! [`SignalSource`] pairs a model schedule with the preprocessing it needs and
//! knows how to pull its feature matrix out of a universe snapshot.

use chrono::NaiveDate;
use std::collections::{BTreeMap, BTreeSet};

use super::error::AlphaTraderError;
use super::preprocess::Pipeline;
use super::universe::UniverseSnapshot;

pub trait SignalModel {
    /// Factor names, in the column order `predict` expects.
    fn features(&self) -> &[String];

    /// One score per row of `features`.
    fn predict(&self, features: &[Vec<f64>]) -> Vec<f64>;
}

/// Fixed linear combination of factors.
#[derive(Debug, Clone, PartialEq)]
pub struct ConstLinearModel {
    features: Vec<String>,
    weights: Vec<f64>,
}

impl ConstLinearModel {
    pub fn new(features: Vec<String>, weights: Vec<f64>) -> Result<Self, AlphaTraderError> {
        if features.len() != weights.len() {
            return Err(AlphaTraderError::ShapeMismatch {
                what: "linear model weights".into(),
                expected: features.len(),
                actual: weights.len(),
            });
        }
        Ok(ConstLinearModel { features, weights })
    }
}

impl SignalModel for ConstLinearModel {
    fn features(&self) -> &[String] {
        &self.features
    }

    fn predict(&self, features: &[Vec<f64>]) -> Vec<f64> {
        features
            .iter()
            .map(|row| row.iter().zip(&self.weights).map(|(x, w)| x * w).sum())
            .collect()
    }
}

/// Which model to use on a given date.
pub enum ModelSchedule {
    Static(Box<dyn SignalModel>),
    /// Models keyed by the first date they may be used on; the latest one
    /// not after the rebalance date wins.
    DateScoped(BTreeMap<NaiveDate, Box<dyn SignalModel>>),
}

impl ModelSchedule {
    pub fn model_for(&self, date: NaiveDate) -> Option<&dyn SignalModel> {
        match self {
            ModelSchedule::Static(model) => Some(model.as_ref()),
            ModelSchedule::DateScoped(models) => {
                models.range(..=date).next_back().map(|(_, m)| m.as_ref())
            }
        }
    }
}

/// Per-asset scores from one source, over the codes it could score.
#[derive(Debug, Clone, PartialEq)]
pub struct ScoreVector {
    pub source: String,
    pub codes: Vec<String>,
    pub scores: Vec<f64>,
}

pub struct SignalSource {
    pub name: String,
    pub schedule: ModelSchedule,
    pub pipeline: Pipeline,
}

impl SignalSource {
    pub fn new(name: impl Into<String>, schedule: ModelSchedule, pipeline: Pipeline) -> Self {
        SignalSource {
            name: name.into(),
            schedule,
            pipeline,
        }
    }

    /// Score every asset that has all of this source's features on the
    /// snapshot date. Assets with a missing or non-finite feature are left
    /// out of the result rather than scored.
    pub fn score(&self, snapshot: &UniverseSnapshot) -> Result<ScoreVector, AlphaTraderError> {
        let model = self
            .schedule
            .model_for(snapshot.date)
            .ok_or_else(|| AlphaTraderError::NoModel {
                source_name: self.name.clone(),
                date: snapshot.date,
            })?;

        let columns = model
            .features()
            .iter()
            .map(|f| {
                snapshot
                    .factor_index(f)
                    .ok_or_else(|| AlphaTraderError::MissingFactor {
                        source_name: self.name.clone(),
                        factor: f.clone(),
                    })
            })
            .collect::<Result<Vec<_>, _>>()?;

        let mut codes = Vec::with_capacity(snapshot.count());
        let mut kept = Vec::with_capacity(snapshot.count());
        let mut rows = Vec::with_capacity(snapshot.count());
        for (i, asset) in snapshot.assets.iter().enumerate() {
            let row: Option<Vec<f64>> = columns
                .iter()
                .map(|&j| asset.factors.get(j).copied().flatten().filter(|v| v.is_finite()))
                .collect();
            if let Some(row) = row {
                codes.push(asset.code.clone());
                kept.push(i);
                rows.push(row);
            }
        }

        let basis = if self.pipeline.needs_basis() {
            self.basis_rows(snapshot, &kept)?
        } else {
            Vec::new()
        };
        self.pipeline.apply(&mut rows, &basis);
        let scores = model.predict(&rows);
        if scores.len() != codes.len() {
            return Err(AlphaTraderError::ShapeMismatch {
                what: format!("scores from {}", self.name),
                expected: codes.len(),
                actual: scores.len(),
            });
        }

        log::debug!(
            "{}: source {} scored {} of {} assets",
            snapshot.date,
            self.name,
            codes.len(),
            snapshot.count()
        );

        Ok(ScoreVector {
            source: self.name.clone(),
            codes,
            scores,
        })
    }

    /// Risk basis rows for the assets at `kept`: the pipeline's style
    /// exposures followed by one dummy per industry among those assets.
    fn basis_rows(
        &self,
        snapshot: &UniverseSnapshot,
        kept: &[usize],
    ) -> Result<Vec<Vec<f64>>, AlphaTraderError> {
        let basis = &self.pipeline.basis;
        let style_idx = basis
            .styles
            .iter()
            .map(|name| {
                snapshot
                    .risk_index(name)
                    .ok_or_else(|| AlphaTraderError::ShapeMismatch {
                        what: format!("risk column {} for {}", name, self.name),
                        expected: 1,
                        actual: 0,
                    })
            })
            .collect::<Result<Vec<_>, _>>()?;

        let industries: Vec<&str> = if basis.industry {
            kept.iter()
                .map(|&i| snapshot.assets[i].industry.as_str())
                .collect::<BTreeSet<_>>()
                .into_iter()
                .collect()
        } else {
            Vec::new()
        };

        Ok(kept
            .iter()
            .map(|&i| {
                let asset = &snapshot.assets[i];
                style_idx
                    .iter()
                    .map(|&j| asset.exposures.get(j).copied().unwrap_or(0.0))
                    .chain(
                        industries
                            .iter()
                            .map(|ind| if asset.industry == *ind { 1.0 } else { 0.0 }),
                    )
                    .collect()
            })
            .collect())
    }
}
