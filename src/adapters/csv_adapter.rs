//! CSV file data adapter.
//!
//! Reads `universe.csv` and `returns.csv` from a data directory once, at open,
//! and serves snapshots out of memory.

use crate::domain::error::AlphaTraderError;
use crate::domain::signal::{ConstLinearModel, ModelSchedule, SignalModel};
use crate::domain::universe::{AssetSnapshot, UniverseSnapshot};
use crate::ports::data_port::FactorDataPort;
use chrono::NaiveDate;
use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::path::Path;

pub const UNIVERSE_FILE: &str = "universe.csv";
pub const RETURNS_FILE: &str = "returns.csv";

const RISK_PREFIX: &str = "risk:";
const FACTOR_PREFIX: &str = "factor:";

pub struct CsvAdapter {
    universes: BTreeMap<NaiveDate, UniverseSnapshot>,
    returns: HashMap<(NaiveDate, usize), HashMap<String, f64>>,
}

impl CsvAdapter {
    pub fn open<P: AsRef<Path>>(data_dir: P) -> Result<Self, AlphaTraderError> {
        let dir = data_dir.as_ref();
        let universes = parse_universe(&read_file(&dir.join(UNIVERSE_FILE))?)?;
        let returns = parse_returns(&read_file(&dir.join(RETURNS_FILE))?)?;
        log::debug!(
            "loaded {} universe dates and {} return sets from {}",
            universes.len(),
            returns.len(),
            dir.display()
        );
        Ok(Self { universes, returns })
    }

    pub fn from_strings(universe: &str, returns: &str) -> Result<Self, AlphaTraderError> {
        Ok(Self {
            universes: parse_universe(universe)?,
            returns: parse_returns(returns)?,
        })
    }

    /// First and last universe dates, if any.
    pub fn date_range(&self) -> Option<(NaiveDate, NaiveDate)> {
        let first = self.universes.keys().next()?;
        let last = self.universes.keys().next_back()?;
        Some((*first, *last))
    }

    pub fn date_count(&self) -> usize {
        self.universes.len()
    }

    /// Risk and factor column names carried by the universe file.
    pub fn column_names(&self) -> (Vec<String>, Vec<String>) {
        self.universes
            .values()
            .next()
            .map(|s| (s.risk_names.clone(), s.factor_names.clone()))
            .unwrap_or_default()
    }
}

impl FactorDataPort for CsvAdapter {
    fn available_dates(
        &self,
        start_date: NaiveDate,
        end_date: NaiveDate,
    ) -> Result<Vec<NaiveDate>, AlphaTraderError> {
        if start_date > end_date {
            return Ok(Vec::new());
        }
        Ok(self
            .universes
            .range(start_date..=end_date)
            .map(|(d, _)| *d)
            .collect())
    }

    fn fetch_universe(&self, date: NaiveDate) -> Result<UniverseSnapshot, AlphaTraderError> {
        self.universes
            .get(&date)
            .cloned()
            .ok_or(AlphaTraderError::NoData { date })
    }

    fn fetch_forward_returns(
        &self,
        date: NaiveDate,
        codes: &[String],
        horizon: usize,
    ) -> Result<HashMap<String, f64>, AlphaTraderError> {
        let Some(by_code) = self.returns.get(&(date, horizon)) else {
            return Ok(HashMap::new());
        };
        Ok(codes
            .iter()
            .filter_map(|c| by_code.get(c).map(|dx| (c.clone(), *dx)))
            .collect())
    }
}

/// Load a date-scoped linear model file: header `date,<feature>...`, one row
/// of weights per valid-from date.
pub fn load_weight_schedule<P: AsRef<Path>>(path: P) -> Result<ModelSchedule, AlphaTraderError> {
    parse_weight_schedule(&read_file(path.as_ref())?)
}

pub fn parse_weight_schedule(content: &str) -> Result<ModelSchedule, AlphaTraderError> {
    let mut rdr = reader(content);
    let headers = rdr.headers().map_err(csv_error)?.clone();
    if headers.get(0) != Some("date") || headers.len() < 2 {
        return Err(AlphaTraderError::Data {
            reason: "weight file header must be date,<feature>...".into(),
        });
    }
    let features: Vec<String> = headers.iter().skip(1).map(|h| h.to_string()).collect();

    let mut models: BTreeMap<NaiveDate, Box<dyn SignalModel>> = BTreeMap::new();
    for result in rdr.records() {
        let record = result.map_err(csv_error)?;
        let date = parse_date_field(record.get(0))?;
        let weights = (1..headers.len())
            .map(|i| parse_finite_f64(record.get(i), &headers[i]))
            .collect::<Result<Vec<_>, _>>()?;
        let model = ConstLinearModel::new(features.clone(), weights)?;
        if models.insert(date, Box::new(model)).is_some() {
            return Err(AlphaTraderError::Data {
                reason: format!("duplicate weight row for {}", date),
            });
        }
    }

    if models.is_empty() {
        return Err(AlphaTraderError::Data {
            reason: "weight file has no rows".into(),
        });
    }
    Ok(ModelSchedule::DateScoped(models))
}

fn read_file(path: &Path) -> Result<String, AlphaTraderError> {
    fs::read_to_string(path).map_err(|e| AlphaTraderError::Data {
        reason: format!("failed to read {}: {}", path.display(), e),
    })
}

fn reader(content: &str) -> csv::Reader<&[u8]> {
    csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .from_reader(content.as_bytes())
}

fn csv_error(e: csv::Error) -> AlphaTraderError {
    AlphaTraderError::Data {
        reason: format!("CSV parse error: {}", e),
    }
}

fn parse_date_field(value: Option<&str>) -> Result<NaiveDate, AlphaTraderError> {
    let s = value.ok_or_else(|| AlphaTraderError::Data {
        reason: "missing date column".into(),
    })?;
    NaiveDate::parse_from_str(s, "%Y-%m-%d").map_err(|e| AlphaTraderError::Data {
        reason: format!("invalid date {}: {}", s, e),
    })
}

fn parse_f64(value: Option<&str>, column: &str) -> Result<f64, AlphaTraderError> {
    value
        .ok_or_else(|| AlphaTraderError::Data {
            reason: format!("missing {} column", column),
        })?
        .parse()
        .map_err(|e| AlphaTraderError::Data {
            reason: format!("invalid {} value: {}", column, e),
        })
}

/// Like `parse_f64`, but `NaN` and infinities are rejected.
fn parse_finite_f64(value: Option<&str>, column: &str) -> Result<f64, AlphaTraderError> {
    let v = parse_f64(value, column)?;
    if !v.is_finite() {
        return Err(AlphaTraderError::Data {
            reason: format!("non-finite {} value: {}", column, v),
        });
    }
    Ok(v)
}

fn parse_optional_f64(value: Option<&str>, column: &str) -> Result<Option<f64>, AlphaTraderError> {
    match value {
        None | Some("") => Ok(None),
        Some(_) => parse_f64(value, column).map(Some),
    }
}

fn parse_universe(content: &str) -> Result<BTreeMap<NaiveDate, UniverseSnapshot>, AlphaTraderError> {
    let mut rdr = reader(content);
    let headers = rdr.headers().map_err(csv_error)?.clone();

    let fixed = ["date", "code", "industry", "benchmark_weight"];
    for (i, name) in fixed.iter().enumerate() {
        if headers.get(i) != Some(*name) {
            return Err(AlphaTraderError::Data {
                reason: format!("universe column {} must be {}", i + 1, name),
            });
        }
    }

    let mut risk_names = Vec::new();
    let mut risk_cols = Vec::new();
    let mut factor_names = Vec::new();
    let mut factor_cols = Vec::new();
    for (i, header) in headers.iter().enumerate().skip(fixed.len()) {
        if let Some(name) = header.strip_prefix(RISK_PREFIX) {
            risk_names.push(name.to_string());
            risk_cols.push(i);
        } else if let Some(name) = header.strip_prefix(FACTOR_PREFIX) {
            factor_names.push(name.to_string());
            factor_cols.push(i);
        } else {
            return Err(AlphaTraderError::Data {
                reason: format!("unrecognised universe column {}", header),
            });
        }
    }

    let mut universes: BTreeMap<NaiveDate, UniverseSnapshot> = BTreeMap::new();
    for result in rdr.records() {
        let record = result.map_err(csv_error)?;
        let date = parse_date_field(record.get(0))?;
        let code = record.get(1).unwrap_or_default().to_string();
        if code.is_empty() {
            return Err(AlphaTraderError::Data {
                reason: format!("empty code on {}", date),
            });
        }

        let exposures = risk_cols
            .iter()
            .map(|&i| parse_finite_f64(record.get(i), &headers[i]))
            .collect::<Result<Vec<_>, _>>()?;
        let factors = factor_cols
            .iter()
            .map(|&i| parse_optional_f64(record.get(i), &headers[i]))
            .collect::<Result<Vec<_>, _>>()?;

        let asset = AssetSnapshot {
            code,
            industry: record.get(2).unwrap_or_default().to_string(),
            benchmark_weight: parse_finite_f64(record.get(3), "benchmark_weight")?,
            exposures,
            factors,
        };

        let snapshot = universes.entry(date).or_insert_with(|| UniverseSnapshot {
            date,
            risk_names: risk_names.clone(),
            factor_names: factor_names.clone(),
            assets: Vec::new(),
        });
        if snapshot.assets.iter().any(|a| a.code == asset.code) {
            return Err(AlphaTraderError::Data {
                reason: format!("duplicate code {} on {}", asset.code, date),
            });
        }
        snapshot.assets.push(asset);
    }
    Ok(universes)
}

fn parse_returns(
    content: &str,
) -> Result<HashMap<(NaiveDate, usize), HashMap<String, f64>>, AlphaTraderError> {
    let mut rdr = reader(content);
    let headers = rdr.headers().map_err(csv_error)?.clone();
    if headers.iter().collect::<Vec<_>>() != ["date", "code", "horizon", "dx"] {
        return Err(AlphaTraderError::Data {
            reason: "returns header must be date,code,horizon,dx".into(),
        });
    }

    let mut returns: HashMap<(NaiveDate, usize), HashMap<String, f64>> = HashMap::new();
    for result in rdr.records() {
        let record = result.map_err(csv_error)?;
        let date = parse_date_field(record.get(0))?;
        let code = record.get(1).unwrap_or_default().to_string();
        let horizon: usize = record
            .get(2)
            .unwrap_or_default()
            .parse()
            .map_err(|e| AlphaTraderError::Data {
                reason: format!("invalid horizon value: {}", e),
            })?;
        let dx = parse_f64(record.get(3), "dx")?;
        returns.entry((date, horizon)).or_default().insert(code, dx);
    }
    Ok(returns)
}
