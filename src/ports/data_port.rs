//! Historical factor data port trait.

use crate::domain::error::AlphaTraderError;
use crate::domain::universe::UniverseSnapshot;
use chrono::NaiveDate;
use std::collections::HashMap;

pub trait FactorDataPort {
    /// Dates with universe data in `[start_date, end_date]`, ascending.
    fn available_dates(
        &self,
        start_date: NaiveDate,
        end_date: NaiveDate,
    ) -> Result<Vec<NaiveDate>, AlphaTraderError>;

    fn fetch_universe(&self, date: NaiveDate) -> Result<UniverseSnapshot, AlphaTraderError>;

    /// Realized return over `horizon` trading days after `date`, per code.
    /// Codes without a return are absent from the map.
    fn fetch_forward_returns(
        &self,
        date: NaiveDate,
        codes: &[String],
        horizon: usize,
    ) -> Result<HashMap<String, f64>, AlphaTraderError>;
}
