#![allow(dead_code)]

use alphatrader::domain::backtest::BacktestConfig;
use alphatrader::domain::constraints::{ConstraintSpec, StyleBand};
use alphatrader::domain::error::AlphaTraderError;
use alphatrader::domain::execution::ExecutionKind;
use alphatrader::domain::frequency::Frequency;
use alphatrader::domain::optimizer::BuildMethod;
use alphatrader::domain::preprocess::Pipeline;
use alphatrader::domain::signal::{ConstLinearModel, ModelSchedule, SignalSource};
pub use alphatrader::domain::universe::{AssetSnapshot, UniverseSnapshot};
use alphatrader::ports::data_port::FactorDataPort;
use chrono::NaiveDate;
use std::collections::{BTreeMap, HashMap};

pub struct MockDataPort {
    pub universes: BTreeMap<NaiveDate, UniverseSnapshot>,
    pub returns: HashMap<NaiveDate, HashMap<String, f64>>,
}

impl MockDataPort {
    pub fn new() -> Self {
        Self {
            universes: BTreeMap::new(),
            returns: HashMap::new(),
        }
    }

    pub fn with_universe(mut self, snapshot: UniverseSnapshot) -> Self {
        self.universes.insert(snapshot.date, snapshot);
        self
    }

    pub fn with_returns(mut self, date: NaiveDate, returns: &[(&str, f64)]) -> Self {
        self.returns.insert(
            date,
            returns.iter().map(|(c, dx)| (c.to_string(), *dx)).collect(),
        );
        self
    }
}

impl FactorDataPort for MockDataPort {
    fn available_dates(
        &self,
        start_date: NaiveDate,
        end_date: NaiveDate,
    ) -> Result<Vec<NaiveDate>, AlphaTraderError> {
        Ok(self
            .universes
            .range(start_date..=end_date)
            .map(|(d, _)| *d)
            .collect())
    }

    fn fetch_universe(&self, date: NaiveDate) -> Result<UniverseSnapshot, AlphaTraderError> {
        Ok(self
            .universes
            .get(&date)
            .cloned()
            .unwrap_or_else(|| UniverseSnapshot {
                date,
                risk_names: vec![],
                factor_names: vec![],
                assets: vec![],
            }))
    }

    fn fetch_forward_returns(
        &self,
        date: NaiveDate,
        codes: &[String],
        _horizon: usize,
    ) -> Result<HashMap<String, f64>, AlphaTraderError> {
        let Some(by_code) = self.returns.get(&date) else {
            return Ok(HashMap::new());
        };
        Ok(codes
            .iter()
            .filter_map(|c| by_code.get(c).map(|dx| (c.clone(), *dx)))
            .collect())
    }
}

pub fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

/// `(code, industry, benchmark_weight, SIZE exposure, ALPHA factor)`.
pub fn make_snapshot(
    date: NaiveDate,
    assets: &[(&str, &str, f64, f64, Option<f64>)],
) -> UniverseSnapshot {
    UniverseSnapshot {
        date,
        risk_names: vec!["SIZE".to_string()],
        factor_names: vec!["ALPHA".to_string()],
        assets: assets
            .iter()
            .map(|&(code, industry, bw, size, alpha)| AssetSnapshot {
                code: code.to_string(),
                industry: industry.to_string(),
                benchmark_weight: bw,
                exposures: vec![size],
                factors: vec![alpha],
            })
            .collect(),
    }
}

/// Source scoring raw `ALPHA` with no preprocessing.
pub fn alpha_source(name: &str) -> SignalSource {
    let model = ConstLinearModel::new(vec!["ALPHA".to_string()], vec![1.0]).unwrap();
    SignalSource::new(name, ModelSchedule::Static(Box::new(model)), Pipeline::default())
}

/// Weekly config with a SIZE band of +/-20%, industry off and a full-weight cap.
pub fn make_config(start: NaiveDate, end: NaiveDate) -> BacktestConfig {
    BacktestConfig {
        start_date: start,
        end_date: end,
        frequency: Frequency::parse("1w").unwrap(),
        horizon: 4,
        cost_rate: 0.002,
        method: BuildMethod::RiskNeutral,
        turnover_target: None,
        constraints: ConstraintSpec {
            styles: vec![StyleBand {
                name: "SIZE".to_string(),
                lower: 0.2,
                upper: 0.2,
            }],
            industry: None,
            weight_cap: 1.0,
        },
        execution: ExecutionKind::Naive,
    }
}
