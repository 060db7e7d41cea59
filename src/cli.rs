//! CLI definition and dispatch.

use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use crate::adapters::csv_adapter::{load_weight_schedule, CsvAdapter};
use crate::adapters::csv_report_adapter::CsvReportAdapter;
use crate::adapters::file_config_adapter::FileConfigAdapter;
use crate::domain::backtest::{Backtest, BacktestConfig, DEFAULT_COST_RATE};
use crate::domain::config_validation::{
    parse_date, parse_execution, parse_frequency, parse_method, parse_pipeline, parse_risk_basis,
    parse_weights, read_float, read_usize, signal_section, source_names, split_list,
    validate_backtest_config, validate_portfolio_config, validate_signal_config,
};
use crate::domain::constraints::{ConstraintSpec, IndustryBand, StyleBand, DEFAULT_WEIGHT_CAP};
use crate::domain::error::AlphaTraderError;
use crate::domain::metrics::Metrics;
use crate::domain::preprocess::Pipeline;
use crate::domain::signal::{ConstLinearModel, ModelSchedule, SignalSource};
use crate::ports::config_port::ConfigPort;
use crate::ports::data_port::FactorDataPort;
use crate::ports::report_port::ReportPort;

const DEFAULT_PIPELINE: &str = "winsorize,standardize";
const DEFAULT_OUTPUT: &str = "backtest.csv";

#[derive(Parser, Debug)]
#[command(name = "alphatrader", about = "Multi-factor portfolio rebalancing backtester")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run a backtest
    Backtest {
        #[arg(short, long)]
        config: PathBuf,
        #[arg(short, long)]
        output: Option<PathBuf>,
        #[arg(long)]
        dry_run: bool,
    },
    /// Validate a configuration file
    Validate {
        #[arg(short, long)]
        config: PathBuf,
    },
    /// Show the data available to a configuration
    Info {
        #[arg(short, long)]
        config: PathBuf,
    },
}

pub fn run(cli: Cli) -> ExitCode {
    match cli.command {
        Command::Backtest {
            config,
            output,
            dry_run,
        } => {
            if dry_run {
                run_dry_run(&config)
            } else {
                run_backtest(&config, output.as_ref())
            }
        }
        Command::Validate { config } => run_validate(&config),
        Command::Info { config } => run_info(&config),
    }
}

fn fail(err: AlphaTraderError) -> ExitCode {
    eprintln!("error: {err}");
    (&err).into()
}

pub fn load_config(path: &Path) -> Result<FileConfigAdapter, ExitCode> {
    FileConfigAdapter::from_file(path).map_err(fail)
}

/// Run every config validator.
pub fn validate_all(config: &dyn ConfigPort) -> Result<(), AlphaTraderError> {
    validate_backtest_config(config)?;
    validate_portfolio_config(config)?;
    validate_signal_config(config)?;
    Ok(())
}

fn run_backtest(config_path: &Path, output_path: Option<&PathBuf>) -> ExitCode {
    // Stage 1: Load and validate config
    eprintln!("Loading config from {}", config_path.display());
    let adapter = match load_config(config_path) {
        Ok(a) => a,
        Err(code) => return code,
    };
    if let Err(e) = validate_all(&adapter) {
        return fail(e);
    }

    // Stage 2: Build settings and signal sources
    let bt_config = match build_backtest_config(&adapter) {
        Ok(c) => c,
        Err(e) => return fail(e),
    };
    let base_dir = config_dir(config_path);
    let sources = match build_signal_sources(&adapter, &base_dir) {
        Ok(s) => s,
        Err(e) => return fail(e),
    };

    // Stage 3: Open data
    let data_dir = match resolve_data_dir(&adapter, &base_dir) {
        Ok(d) => d,
        Err(e) => return fail(e),
    };
    eprintln!("Loading data from {}", data_dir.display());
    let data_port = match CsvAdapter::open(&data_dir) {
        Ok(a) => a,
        Err(e) => return fail(e),
    };

    let output = output_path
        .cloned()
        .unwrap_or_else(|| PathBuf::from(DEFAULT_OUTPUT));
    run_backtest_pipeline(&data_port, &sources, &bt_config, &CsvReportAdapter, &output)
}

pub fn build_backtest_config(adapter: &dyn ConfigPort) -> Result<BacktestConfig, AlphaTraderError> {
    let start_date = parse_date(adapter, "backtest", "start_date")?;
    let end_date = parse_date(adapter, "backtest", "end_date")?;
    let frequency = parse_frequency(adapter)?;
    let horizon = read_usize(adapter, "backtest", "horizon")?.unwrap_or_else(|| frequency.horizon());

    Ok(BacktestConfig {
        start_date,
        end_date,
        frequency,
        horizon,
        cost_rate: read_float(adapter, "backtest", "cost_rate")?.unwrap_or(DEFAULT_COST_RATE),
        method: parse_method(adapter)?,
        turnover_target: read_float(adapter, "portfolio", "turnover_target")?,
        constraints: build_constraint_spec(adapter)?,
        execution: parse_execution(adapter)?,
    })
}

pub fn build_constraint_spec(adapter: &dyn ConfigPort) -> Result<ConstraintSpec, AlphaTraderError> {
    let names = adapter
        .get_string("constraints", "styles")
        .map(|s| split_list(&s))
        .unwrap_or_else(|| vec!["SIZE".to_string()]);

    let mut styles = Vec::with_capacity(names.len());
    for name in names {
        let prefix = name.to_lowercase();
        let lower = read_float(adapter, "constraints", &format!("{prefix}_lower"))?;
        let upper = read_float(adapter, "constraints", &format!("{prefix}_upper"))?;
        styles.push(StyleBand {
            name,
            lower: lower.unwrap_or(0.0),
            upper: upper.unwrap_or(0.0),
        });
    }

    let industry = if adapter.get_bool("constraints", "industry", true) {
        let default = IndustryBand::default();
        Some(IndustryBand {
            lower: read_float(adapter, "constraints", "industry_lower")?.unwrap_or(default.lower),
            upper: read_float(adapter, "constraints", "industry_upper")?.unwrap_or(default.upper),
        })
    } else {
        None
    };

    Ok(ConstraintSpec {
        styles,
        industry,
        weight_cap: read_float(adapter, "portfolio", "weight_cap")?.unwrap_or(DEFAULT_WEIGHT_CAP),
    })
}

/// Build every configured signal source. Relative weight-file paths resolve
/// against `base_dir`.
pub fn build_signal_sources(
    adapter: &dyn ConfigPort,
    base_dir: &Path,
) -> Result<Vec<SignalSource>, AlphaTraderError> {
    let basis = parse_risk_basis(adapter)?;
    let default_pipeline = match parse_pipeline(adapter, "preprocess", "pipeline")? {
        Some(p) => p,
        None => Pipeline::parse(DEFAULT_PIPELINE).map_err(|e| AlphaTraderError::ConfigInvalid {
            section: "preprocess".into(),
            key: "pipeline".into(),
            reason: e.to_string(),
        })?,
    };

    source_names(adapter)
        .into_iter()
        .map(|name| -> Result<SignalSource, AlphaTraderError> {
            let section = signal_section(&name);
            let pipeline = parse_pipeline(adapter, &section, "pipeline")?
                .unwrap_or_else(|| default_pipeline.clone())
                .with_basis(basis.clone());

            let schedule = match adapter.get_string(&section, "weights_file") {
                Some(file) if !file.trim().is_empty() => {
                    let path = base_dir.join(file.trim());
                    log::debug!("source {} reads weights from {}", name, path.display());
                    load_weight_schedule(&path)?
                }
                _ => {
                    let features = adapter
                        .get_string(&section, "features")
                        .map(|s| split_list(&s))
                        .ok_or_else(|| AlphaTraderError::ConfigMissing {
                            section: section.clone(),
                            key: "features".into(),
                        })?;
                    let weights = match adapter.get_string(&section, "weights") {
                        Some(w) => parse_weights(&section, &w)?,
                        None => {
                            return Err(AlphaTraderError::ConfigMissing {
                                section,
                                key: "weights".into(),
                            })
                        }
                    };
                    ModelSchedule::Static(Box::new(ConstLinearModel::new(features, weights)?))
                }
            };
            Ok(SignalSource::new(name, schedule, pipeline))
        })
        .collect()
}

pub fn resolve_data_dir(adapter: &dyn ConfigPort, base_dir: &Path) -> Result<PathBuf, AlphaTraderError> {
    match adapter.get_string("backtest", "data_dir") {
        Some(dir) if !dir.trim().is_empty() => Ok(base_dir.join(dir.trim())),
        _ => Err(AlphaTraderError::ConfigMissing {
            section: "backtest".into(),
            key: "data_dir".into(),
        }),
    }
}

fn config_dir(config_path: &Path) -> PathBuf {
    config_path
        .parent()
        .map(Path::to_path_buf)
        .unwrap_or_default()
}

pub fn run_backtest_pipeline(
    data_port: &dyn FactorDataPort,
    sources: &[SignalSource],
    bt_config: &BacktestConfig,
    report: &dyn ReportPort,
    output_path: &Path,
) -> ExitCode {
    let builder = bt_config.method.builder();
    let executor = bt_config.execution.policy();
    let backtest = Backtest {
        data: data_port,
        sources,
        builder: builder.as_ref(),
        executor: executor.as_ref(),
        config: bt_config,
    };

    // Stage 4: Schedule rebalance dates
    let dates = match backtest.schedule() {
        Ok(d) => d,
        Err(e) => return fail(e),
    };
    if dates.is_empty() {
        return fail(AlphaTraderError::Data {
            reason: format!(
                "no universe data between {} and {}",
                bt_config.start_date, bt_config.end_date
            ),
        });
    }
    eprintln!(
        "Running backtest: {} sources, {} rebalances from {} to {} ({}, horizon {})",
        sources.len(),
        dates.len(),
        bt_config.start_date,
        bt_config.end_date,
        bt_config.frequency,
        bt_config.horizon,
    );

    // Stage 5: Replay
    let result = match backtest.run_dates(&dates) {
        Ok(r) => r,
        Err(e) => return fail(e),
    };

    // Stage 6: Summary
    let metrics = Metrics::compute(&result.series, &bt_config.frequency);
    eprintln!("\n=== Results ===");
    eprintln!("Periods:          {}", metrics.periods);
    eprintln!("Active Return:    {:.2}%", metrics.total_return * 100.0);
    eprintln!("Costs:            {:.2}%", metrics.total_cost * 100.0);
    eprintln!("Net Return:       {:.2}%", metrics.net_return * 100.0);
    eprintln!("Info Ratio:       {:.2}", metrics.information_ratio);
    eprintln!("Max Drawdown:     -{:.2}%", metrics.max_drawdown * 100.0);
    eprintln!("Avg Turnover:     {:.3}", metrics.average_turnover);
    eprintln!("Avg Leverage:     {:.3}", metrics.average_leverage);
    eprintln!("Full Rebalances:  {}", result.full_rebalances());

    // Stage 7: Write series
    match report.write(&result.series, &output_path.to_string_lossy()) {
        Ok(()) => {
            eprintln!("\nSeries written to: {}", output_path.display());
            ExitCode::SUCCESS
        }
        Err(e) => fail(e),
    }
}

pub fn run_dry_run(config_path: &Path) -> ExitCode {
    eprintln!("Loading config from {}", config_path.display());
    let adapter = match load_config(config_path) {
        Ok(a) => a,
        Err(code) => return code,
    };
    if let Err(e) = validate_all(&adapter) {
        return fail(e);
    }
    let bt_config = match build_backtest_config(&adapter) {
        Ok(c) => c,
        Err(e) => return fail(e),
    };
    let sources = match build_signal_sources(&adapter, &config_dir(config_path)) {
        Ok(s) => s,
        Err(e) => return fail(e),
    };

    eprintln!("Config validated successfully");
    print_settings(&bt_config, &sources);
    eprintln!("\nDry run complete: configuration is valid");
    ExitCode::SUCCESS
}

fn print_settings(bt_config: &BacktestConfig, sources: &[SignalSource]) {
    eprintln!("\nBacktest:");
    eprintln!("  window:     {} to {}", bt_config.start_date, bt_config.end_date);
    eprintln!("  frequency:  {} (horizon {})", bt_config.frequency, bt_config.horizon);
    eprintln!("  cost rate:  {}", bt_config.cost_rate);
    eprintln!("  method:     {}", bt_config.method);
    match bt_config.turnover_target {
        Some(t) => eprintln!("  turnover:   <= {}", t),
        None => eprintln!("  turnover:   unconstrained"),
    }
    eprintln!("  execution:  {:?}", bt_config.execution);

    eprintln!("\nConstraints:");
    for style in &bt_config.constraints.styles {
        eprintln!("  {}: -{} / +{}", style.name, style.lower, style.upper);
    }
    match bt_config.constraints.industry {
        Some(band) => eprintln!("  industry: x{} .. x{}", band.lower, band.upper),
        None => eprintln!("  industry: off"),
    }
    eprintln!("  weight cap: {}", bt_config.constraints.weight_cap);

    eprintln!("\nSignal sources:");
    for source in sources {
        let pipeline: Vec<String> = source
            .pipeline
            .transforms
            .iter()
            .map(|t| t.to_string())
            .collect();
        eprintln!("  {} [{}]", source.name, pipeline.join(", "));
        if source.pipeline.needs_basis() {
            let basis = &source.pipeline.basis;
            eprintln!(
                "    neutralize against: {}{}",
                basis.styles.join(", "),
                if basis.industry { " + industries" } else { "" }
            );
        }
    }
}

fn run_validate(config_path: &Path) -> ExitCode {
    eprintln!("Validating config: {}", config_path.display());
    let adapter = match load_config(config_path) {
        Ok(a) => a,
        Err(code) => return code,
    };

    if let Err(e) = validate_all(&adapter) {
        return fail(e);
    }
    // Weight files are only opened here, not by the validators.
    if let Err(e) = build_signal_sources(&adapter, &config_dir(config_path)) {
        return fail(e);
    }

    eprintln!("\nSections:");
    for section in adapter.sections() {
        eprintln!("  [{}]", section);
    }
    eprintln!("\nConfiguration is valid.");
    ExitCode::SUCCESS
}

fn run_info(config_path: &Path) -> ExitCode {
    let adapter = match load_config(config_path) {
        Ok(a) => a,
        Err(code) => return code,
    };
    let data_dir = match resolve_data_dir(&adapter, &config_dir(config_path)) {
        Ok(d) => d,
        Err(e) => return fail(e),
    };
    let data = match CsvAdapter::open(&data_dir) {
        Ok(a) => a,
        Err(e) => return fail(e),
    };

    let Some((first, last)) = data.date_range() else {
        eprintln!("No universe data in {}", data_dir.display());
        return ExitCode::SUCCESS;
    };
    let (risk_names, factor_names) = data.column_names();

    println!("Data directory: {}", data_dir.display());
    println!("Dates:          {} ({} to {})", data.date_count(), first, last);
    println!("Risk columns:   {}", risk_names.join(", "));
    println!("Factor columns: {}", factor_names.join(", "));
    ExitCode::SUCCESS
}
