//! Rebalance frequency: parsing, return horizon, and date advancement.
//!
//! Frequencies are written as a count followed by a unit: `d` (trading
//! day), `b` (business day), `w` (week) or `m` (month), e.g. `1w`, `5b`.
//! Trading and business days both skip weekends; exchange holidays are not
//! modelled.

use chrono::{Datelike, Duration, Months, NaiveDate, Weekday};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrequencyUnit {
    Day,
    BusinessDay,
    Week,
    Month,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Frequency {
    pub count: u32,
    pub unit: FrequencyUnit,
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("invalid frequency '{0}': expected <count><d|b|w|m>, e.g. 1w")]
pub struct FrequencyError(pub String);

impl Frequency {
    pub fn parse(input: &str) -> Result<Self, FrequencyError> {
        let trimmed = input.trim().to_lowercase();
        let err = || FrequencyError(input.to_string());

        let unit_char = trimmed.chars().last().ok_or_else(err)?;
        let unit = match unit_char {
            'd' => FrequencyUnit::Day,
            'b' => FrequencyUnit::BusinessDay,
            'w' => FrequencyUnit::Week,
            'm' => FrequencyUnit::Month,
            _ => return Err(err()),
        };
        let count: u32 = trimmed[..trimmed.len() - 1].parse().map_err(|_| err())?;
        if count == 0 {
            return Err(err());
        }
        Ok(Frequency { count, unit })
    }

    /// Forward-return horizon in trading days, minus the entry day.
    pub fn horizon(&self) -> usize {
        let n = self.count as usize;
        match self.unit {
            FrequencyUnit::Day | FrequencyUnit::BusinessDay => n - 1,
            FrequencyUnit::Week => 5 * n - 1,
            FrequencyUnit::Month => 21 * n,
        }
    }

    /// Approximate number of periods per year, for annualizing statistics.
    pub fn periods_per_year(&self) -> f64 {
        let n = self.count as f64;
        match self.unit {
            FrequencyUnit::Day | FrequencyUnit::BusinessDay => 252.0 / n,
            FrequencyUnit::Week => 52.0 / n,
            FrequencyUnit::Month => 12.0 / n,
        }
    }

    /// The date one period after `date`, or `None` past the calendar range.
    pub fn advance(&self, date: NaiveDate) -> Option<NaiveDate> {
        match self.unit {
            FrequencyUnit::Day | FrequencyUnit::BusinessDay => {
                let mut current = date;
                let mut remaining = self.count;
                while remaining > 0 {
                    current = current.checked_add_signed(Duration::days(1))?;
                    if !matches!(current.weekday(), Weekday::Sat | Weekday::Sun) {
                        remaining -= 1;
                    }
                }
                Some(current)
            }
            FrequencyUnit::Week => {
                date.checked_add_signed(Duration::weeks(i64::from(self.count)))
            }
            FrequencyUnit::Month => date.checked_add_months(Months::new(self.count)),
        }
    }
}

impl fmt::Display for Frequency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let unit = match self.unit {
            FrequencyUnit::Day => 'd',
            FrequencyUnit::BusinessDay => 'b',
            FrequencyUnit::Week => 'w',
            FrequencyUnit::Month => 'm',
        };
        write!(f, "{}{}", self.count, unit)
    }
}
