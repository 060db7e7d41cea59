//! CSV report adapter: writes the output series.

use crate::domain::backtest::ReportRow;
use crate::domain::error::AlphaTraderError;
use crate::ports::report_port::ReportPort;

pub const HEADER: [&str; 5] = ["date", "returns", "turnover", "leverage", "tc_cost"];

#[derive(Debug, Clone, Copy, Default)]
pub struct CsvReportAdapter;

impl CsvReportAdapter {
    /// Render the series into CSV bytes.
    pub fn render(series: &[ReportRow]) -> Result<Vec<u8>, AlphaTraderError> {
        let mut wtr = csv::Writer::from_writer(Vec::new());
        wtr.write_record(HEADER).map_err(csv_error)?;
        for row in series {
            wtr.write_record([
                row.date.format("%Y-%m-%d").to_string(),
                row.ret.to_string(),
                row.turnover.to_string(),
                row.leverage.to_string(),
                row.transaction_cost.to_string(),
            ])
            .map_err(csv_error)?;
        }
        wtr.into_inner().map_err(|e| AlphaTraderError::Data {
            reason: format!("CSV write error: {}", e),
        })
    }
}

impl ReportPort for CsvReportAdapter {
    fn write(&self, series: &[ReportRow], output_path: &str) -> Result<(), AlphaTraderError> {
        let bytes = Self::render(series)?;
        std::fs::write(output_path, bytes)?;
        Ok(())
    }
}

fn csv_error(e: csv::Error) -> AlphaTraderError {
    AlphaTraderError::Data {
        reason: format!("CSV write error: {}", e),
    }
}
