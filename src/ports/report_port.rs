//! Report generation port trait.

use crate::domain::backtest::ReportRow;
use crate::domain::error::AlphaTraderError;

/// Port for writing the backtest output series.
pub trait ReportPort {
    fn write(&self, series: &[ReportRow], output_path: &str) -> Result<(), AlphaTraderError>;
}
