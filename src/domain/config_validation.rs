//! Configuration validation.
//!
//! Validates all config fields before a backtest runs. Values are parsed from
//! their raw strings so that a malformed number is reported rather than
//! silently replaced by its default.

use crate::domain::error::AlphaTraderError;
use crate::domain::execution::ExecutionKind;
use crate::domain::frequency::Frequency;
use crate::domain::optimizer::BuildMethod;
use crate::domain::preprocess::{Pipeline, RiskBasis};
use crate::ports::config_port::ConfigPort;
use chrono::NaiveDate;

pub fn validate_backtest_config(config: &dyn ConfigPort) -> Result<(), AlphaTraderError> {
    validate_dates(config)?;
    validate_frequency(config)?;
    validate_horizon(config)?;
    validate_cost_rate(config)?;
    Ok(())
}

pub fn validate_portfolio_config(config: &dyn ConfigPort) -> Result<(), AlphaTraderError> {
    validate_method(config)?;
    validate_weight_cap(config)?;
    validate_turnover_target(config)?;
    validate_constraints(config)?;
    validate_execution(config)?;
    Ok(())
}

pub fn validate_signal_config(config: &dyn ConfigPort) -> Result<(), AlphaTraderError> {
    parse_pipeline(config, "preprocess", "pipeline")?;
    parse_risk_basis(config)?;

    let sources = source_names(config);
    if sources.is_empty() {
        return Err(AlphaTraderError::ConfigMissing {
            section: "signals".to_string(),
            key: "sources".to_string(),
        });
    }
    for name in &sources {
        validate_signal_source(config, name)?;
    }
    Ok(())
}

/// Comma-separated list with blanks removed.
pub fn split_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(|s| s.trim())
        .filter(|s| !s.is_empty())
        .map(|s| s.to_string())
        .collect()
}

pub fn source_names(config: &dyn ConfigPort) -> Vec<String> {
    config
        .get_string("signals", "sources")
        .map(|s| split_list(&s))
        .unwrap_or_default()
}

pub fn signal_section(name: &str) -> String {
    format!("signal.{}", name)
}

fn invalid(section: &str, key: &str, reason: impl Into<String>) -> AlphaTraderError {
    AlphaTraderError::ConfigInvalid {
        section: section.to_string(),
        key: key.to_string(),
        reason: reason.into(),
    }
}

fn non_blank(config: &dyn ConfigPort, section: &str, key: &str) -> Option<String> {
    config
        .get_string(section, key)
        .filter(|s| !s.trim().is_empty())
}

pub fn read_float(
    config: &dyn ConfigPort,
    section: &str,
    key: &str,
) -> Result<Option<f64>, AlphaTraderError> {
    match non_blank(config, section, key) {
        None => Ok(None),
        Some(s) => match s.trim().parse::<f64>() {
            Ok(v) if v.is_finite() => Ok(Some(v)),
            _ => Err(invalid(section, key, format!("{} is not a number", s.trim()))),
        },
    }
}

pub fn read_usize(
    config: &dyn ConfigPort,
    section: &str,
    key: &str,
) -> Result<Option<usize>, AlphaTraderError> {
    match non_blank(config, section, key) {
        None => Ok(None),
        Some(s) => s
            .trim()
            .parse::<usize>()
            .map(Some)
            .map_err(|_| invalid(section, key, format!("{} is not a non-negative integer", s.trim()))),
    }
}

pub fn parse_date(
    config: &dyn ConfigPort,
    section: &str,
    key: &str,
) -> Result<NaiveDate, AlphaTraderError> {
    match non_blank(config, section, key) {
        None => Err(AlphaTraderError::ConfigMissing {
            section: section.to_string(),
            key: key.to_string(),
        }),
        Some(s) => NaiveDate::parse_from_str(s.trim(), "%Y-%m-%d")
            .map_err(|_| invalid(section, key, format!("invalid {} format, expected YYYY-MM-DD", key))),
    }
}

pub fn parse_frequency(config: &dyn ConfigPort) -> Result<Frequency, AlphaTraderError> {
    let raw = non_blank(config, "backtest", "frequency").unwrap_or_else(|| "1w".to_string());
    Frequency::parse(&raw).map_err(|e| invalid("backtest", "frequency", e.to_string()))
}

pub fn parse_pipeline(
    config: &dyn ConfigPort,
    section: &str,
    key: &str,
) -> Result<Option<Pipeline>, AlphaTraderError> {
    match config.get_string(section, key) {
        None => Ok(None),
        Some(s) => Pipeline::parse(&s)
            .map(Some)
            .map_err(|e| invalid(section, key, e.to_string())),
    }
}

/// Risk basis for `neutralize`: `[preprocess] neutralize` (style list,
/// default `SIZE`) and `neutralize_industry` (default true).
pub fn parse_risk_basis(config: &dyn ConfigPort) -> Result<RiskBasis, AlphaTraderError> {
    let default = RiskBasis::default();
    let styles = match config.get_string("preprocess", "neutralize") {
        Some(s) => split_list(&s),
        None => default.styles,
    };
    if styles.iter().any(|s| s.contains(char::is_whitespace)) {
        return Err(invalid(
            "preprocess",
            "neutralize",
            "style names must not contain spaces",
        ));
    }
    let industry = config.get_bool("preprocess", "neutralize_industry", default.industry);
    if styles.is_empty() && !industry {
        return Err(invalid(
            "preprocess",
            "neutralize",
            "risk basis is empty; list styles or enable neutralize_industry",
        ));
    }
    Ok(RiskBasis { styles, industry })
}

pub fn parse_method(config: &dyn ConfigPort) -> Result<BuildMethod, AlphaTraderError> {
    let use_rank = read_usize(config, "portfolio", "use_rank")?.unwrap_or(100);
    if use_rank == 0 {
        return Err(invalid("portfolio", "use_rank", "use_rank must be at least 1"));
    }
    let name = non_blank(config, "portfolio", "method").unwrap_or_else(|| "risk_neutral".into());
    BuildMethod::parse(&name, use_rank).ok_or_else(|| {
        invalid(
            "portfolio",
            "method",
            format!("unknown method {}, expected risk_neutral or rank", name.trim()),
        )
    })
}

pub fn parse_execution(config: &dyn ConfigPort) -> Result<ExecutionKind, AlphaTraderError> {
    let fill_ratio = read_float(config, "execution", "fill_ratio")?.unwrap_or(1.0);
    if fill_ratio <= 0.0 || fill_ratio > 1.0 {
        return Err(invalid(
            "execution",
            "fill_ratio",
            "fill_ratio must be in (0, 1]",
        ));
    }
    let name = non_blank(config, "execution", "policy").unwrap_or_else(|| "naive".into());
    ExecutionKind::parse(&name, fill_ratio).ok_or_else(|| {
        invalid(
            "execution",
            "policy",
            format!("unknown policy {}, expected naive or partial", name.trim()),
        )
    })
}

fn validate_dates(config: &dyn ConfigPort) -> Result<(), AlphaTraderError> {
    let start_date = parse_date(config, "backtest", "start_date")?;
    let end_date = parse_date(config, "backtest", "end_date")?;

    if start_date >= end_date {
        return Err(invalid(
            "backtest",
            "start_date",
            "start_date must be before end_date",
        ));
    }
    Ok(())
}

fn validate_frequency(config: &dyn ConfigPort) -> Result<(), AlphaTraderError> {
    parse_frequency(config).map(|_| ())
}

fn validate_horizon(config: &dyn ConfigPort) -> Result<(), AlphaTraderError> {
    read_usize(config, "backtest", "horizon").map(|_| ())
}

fn validate_cost_rate(config: &dyn ConfigPort) -> Result<(), AlphaTraderError> {
    if let Some(value) = read_float(config, "backtest", "cost_rate")? {
        if value < 0.0 {
            return Err(invalid(
                "backtest",
                "cost_rate",
                "cost_rate must be non-negative",
            ));
        }
    }
    Ok(())
}

fn validate_method(config: &dyn ConfigPort) -> Result<(), AlphaTraderError> {
    parse_method(config).map(|_| ())
}

fn validate_weight_cap(config: &dyn ConfigPort) -> Result<(), AlphaTraderError> {
    if let Some(value) = read_float(config, "portfolio", "weight_cap")? {
        if value <= 0.0 {
            return Err(invalid(
                "portfolio",
                "weight_cap",
                "weight_cap must be positive",
            ));
        }
    }
    Ok(())
}

fn validate_turnover_target(config: &dyn ConfigPort) -> Result<(), AlphaTraderError> {
    if let Some(value) = read_float(config, "portfolio", "turnover_target")? {
        if value < 0.0 {
            return Err(invalid(
                "portfolio",
                "turnover_target",
                "turnover_target must be non-negative",
            ));
        }
    }
    Ok(())
}

fn validate_constraints(config: &dyn ConfigPort) -> Result<(), AlphaTraderError> {
    let styles = config
        .get_string("constraints", "styles")
        .map(|s| split_list(&s))
        .unwrap_or_else(|| vec!["SIZE".to_string()]);

    for style in &styles {
        for side in ["lower", "upper"] {
            let key = format!("{}_{}", style.to_lowercase(), side);
            if let Some(value) = read_float(config, "constraints", &key)? {
                if value < 0.0 {
                    return Err(invalid(
                        "constraints",
                        &key,
                        "tolerance fractions must be non-negative",
                    ));
                }
            }
        }
    }

    let lower = read_float(config, "constraints", "industry_lower")?.unwrap_or(1.0);
    let upper = read_float(config, "constraints", "industry_upper")?.unwrap_or(1.0);
    if lower < 0.0 {
        return Err(invalid(
            "constraints",
            "industry_lower",
            "industry_lower must be non-negative",
        ));
    }
    if lower > upper {
        return Err(invalid(
            "constraints",
            "industry_lower",
            "industry_lower must not exceed industry_upper",
        ));
    }
    Ok(())
}

fn validate_execution(config: &dyn ConfigPort) -> Result<(), AlphaTraderError> {
    parse_execution(config).map(|_| ())
}

fn validate_signal_source(config: &dyn ConfigPort, name: &str) -> Result<(), AlphaTraderError> {
    let section = signal_section(name);
    parse_pipeline(config, &section, "pipeline")?;

    if non_blank(config, &section, "weights_file").is_some() {
        return Ok(());
    }

    let features = match non_blank(config, &section, "features") {
        Some(s) => split_list(&s),
        None => {
            return Err(AlphaTraderError::ConfigMissing {
                section,
                key: "features".to_string(),
            })
        }
    };
    let weights = match non_blank(config, &section, "weights") {
        Some(s) => parse_weights(&section, &s)?,
        None => {
            return Err(AlphaTraderError::ConfigMissing {
                section,
                key: "weights".to_string(),
            })
        }
    };
    if features.len() != weights.len() {
        return Err(invalid(
            &section,
            "weights",
            format!(
                "{} weights given for {} features",
                weights.len(),
                features.len()
            ),
        ));
    }
    Ok(())
}

pub fn parse_weights(section: &str, value: &str) -> Result<Vec<f64>, AlphaTraderError> {
    split_list(value)
        .iter()
        .map(|w| {
            w.parse::<f64>()
                .ok()
                .filter(|v| v.is_finite())
                .ok_or_else(|| invalid(section, "weights", format!("{} is not a number", w)))
        })
        .collect()
}
