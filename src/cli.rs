//! CLI definition and dispatch.

use chrono::{Duration, NaiveDate, NaiveDateTime};
use clap::{Args, Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use crate::adapters::csv_adapter::{parse_timestamp, CsvAdapter};
use crate::adapters::file_config_adapter::FileConfigAdapter;
use crate::domain::config_validation::load_strategy_config;
use crate::domain::engine::StrategyEngine;
use crate::domain::error::{ParseError, SigtraderError};
use crate::domain::feature_table::FeatureRow;
use crate::domain::presets;
use crate::domain::risk::TradeContext;
use crate::domain::rule::Rule;
use crate::domain::rule_parser;
use crate::domain::signal::SignalFrame;
use crate::domain::strategy::StrategyConfig;
use crate::ports::config_port::ConfigPort;
use crate::ports::data_port::DataPort;

#[derive(Parser, Debug)]
#[command(name = "sigtrader", about = "Strategy signal and risk evaluator")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

/// Where the strategy comes from: an INI file or a built-in preset.
#[derive(Args, Debug)]
#[group(required = true, multiple = false)]
pub struct StrategySource {
    #[arg(short, long)]
    pub strategy: Option<PathBuf>,
    #[arg(short, long)]
    pub preset: Option<String>,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Evaluate a strategy over a CSV history and print the flagged rows
    Signals {
        #[command(flatten)]
        source: StrategySource,
        /// Directory holding `<instrument>.csv` files
        #[arg(short, long)]
        data: PathBuf,
        #[arg(short, long)]
        instrument: String,
        #[arg(long)]
        start: Option<String>,
        #[arg(long)]
        end: Option<String>,
        /// Extra feature columns to print
        #[arg(long, value_delimiter = ',')]
        columns: Vec<String>,
        /// Print every row, not only flagged ones
        #[arg(long)]
        all: bool,
    },
    /// Validate a strategy file
    Validate {
        #[arg(short, long)]
        strategy: PathBuf,
    },
    /// List presets, or show one
    Presets { name: Option<String> },
    /// Resolve leverage, stop-loss, custom exit and ROI for a trade
    Risk {
        #[command(flatten)]
        source: StrategySource,
        #[arg(short, long)]
        instrument: String,
        #[arg(long, allow_negative_numbers = true)]
        profit: f64,
        /// Minutes since the trade opened
        #[arg(long, default_value_t = 0)]
        minutes: i64,
        /// Feature rows come from the latest candle in this CSV directory
        #[arg(short, long)]
        data: Option<PathBuf>,
    },
}

pub fn run(cli: Cli) -> ExitCode {
    match cli.command {
        Command::Signals {
            source,
            data,
            instrument,
            start,
            end,
            columns,
            all,
        } => run_signals(
            &source,
            &data,
            &instrument,
            start.as_deref(),
            end.as_deref(),
            &columns,
            all,
        ),
        Command::Validate { strategy } => run_validate(&strategy),
        Command::Presets { name } => run_presets(name.as_deref()),
        Command::Risk {
            source,
            instrument,
            profit,
            minutes,
            data,
        } => run_risk(&source, &instrument, profit, minutes, data.as_deref()),
    }
}

fn fail(err: SigtraderError) -> ExitCode {
    eprintln!("error: {err}");
    (&err).into()
}

pub fn load_config(path: &Path) -> Result<FileConfigAdapter, ExitCode> {
    FileConfigAdapter::from_file(path).map_err(fail)
}

pub fn build_strategy(source: &StrategySource) -> Result<StrategyConfig, SigtraderError> {
    match (&source.strategy, &source.preset) {
        (Some(path), _) => {
            let adapter = FileConfigAdapter::from_file(path)?;
            load_strategy_config(&adapter)
        }
        (None, Some(name)) => presets::by_name(name),
        (None, None) => Err(SigtraderError::ConfigMissing {
            section: "cli".into(),
            key: "strategy".into(),
        }),
    }
}

fn build_engine(source: &StrategySource) -> Result<StrategyEngine, ExitCode> {
    build_strategy(source)
        .and_then(StrategyEngine::new)
        .map_err(fail)
}

/// `YYYY-MM-DD`, `YYYY-MM-DD HH:MM:SS` or unix milliseconds.
fn parse_bound(value: &str, key: &str) -> Result<NaiveDateTime, SigtraderError> {
    parse_timestamp(value)
        .or_else(|| {
            NaiveDate::parse_from_str(value.trim(), "%Y-%m-%d")
                .ok()
                .and_then(|d| d.and_hms_opt(0, 0, 0))
        })
        .ok_or_else(|| SigtraderError::ConfigInvalid {
            section: "cli".into(),
            key: key.into(),
            reason: format!("invalid timestamp '{}'", value),
        })
}

fn evaluate(
    engine: &mut StrategyEngine,
    data: &Path,
    instrument: &str,
    start: Option<&str>,
    end: Option<&str>,
) -> Result<SignalFrame, SigtraderError> {
    let start = start.map(|s| parse_bound(s, "start")).transpose()?;
    let end = end.map(|s| parse_bound(s, "end")).transpose()?;
    let series = CsvAdapter::new(data.to_path_buf()).fetch_series(instrument, start, end)?;
    Ok(engine.populate(instrument, &series))
}

fn format_cell(value: Option<f64>) -> String {
    value.map(|v| format!("{:.6}", v)).unwrap_or_default()
}

fn format_timestamp(value: Option<f64>) -> String {
    value
        .and_then(|secs| chrono::DateTime::from_timestamp(secs as i64, 0))
        .map(|dt| dt.naive_utc().format("%Y-%m-%d %H:%M:%S").to_string())
        .unwrap_or_default()
}

fn run_signals(
    source: &StrategySource,
    data: &Path,
    instrument: &str,
    start: Option<&str>,
    end: Option<&str>,
    columns: &[String],
    all: bool,
) -> ExitCode {
    let mut engine = match build_engine(source) {
        Ok(e) => e,
        Err(code) => return code,
    };
    eprintln!(
        "Evaluating {} on {} ({})",
        engine.config().name,
        instrument,
        engine.config().timeframe
    );

    let frame = match evaluate(&mut engine, data, instrument, start, end) {
        Ok(f) => f,
        Err(e) => return fail(e),
    };

    if let Some(missing) = columns.iter().find(|c| !frame.table.has_column(c)) {
        return fail(SigtraderError::FeatureInvalid {
            name: missing.clone(),
            reason: "no such column".into(),
        });
    }

    let mut header = vec!["timestamp", "close", "enter_long", "exit"];
    header.extend(columns.iter().map(String::as_str));
    println!("{}", header.join(","));

    for row in 0..frame.len() {
        let (enter, exit) = (frame.enter_long[row], frame.exit[row]);
        if !(all || enter || exit) {
            continue;
        }
        let mut cells = vec![
            format_timestamp(frame.table.value("timestamp", row)),
            format_cell(frame.table.value("close", row)),
            enter.to_string(),
            exit.to_string(),
        ];
        cells.extend(columns.iter().map(|c| format_cell(frame.table.value(c, row))));
        println!("{}", cells.join(","));
    }

    if frame.table.is_insufficient() {
        eprintln!(
            "warning: {} candles is fewer than the {} the pipeline needs",
            frame.len(),
            engine.pipeline().min_rows()
        );
    }
    eprintln!(
        "{} candles, {} entries, {} exits",
        frame.len(),
        frame.entry_rows().len(),
        frame.exit_rows().len()
    );
    ExitCode::SUCCESS
}

fn report_rule_error(adapter: &FileConfigAdapter, key: &str) -> Option<ParseError> {
    let text = adapter.get_string("strategy", key)?;
    let err = rule_parser::parse(&text).err()?;
    eprintln!("\n{} rule:", key);
    eprintln!("  error: {}", err.display_with_context(&text));
    Some(err)
}

fn run_validate(strategy_path: &Path) -> ExitCode {
    eprintln!("Validating strategy: {}", strategy_path.display());
    let adapter = match load_config(strategy_path) {
        Ok(a) => a,
        Err(code) => return code,
    };

    for key in ["entry", "exit"] {
        if let Some(err) = report_rule_error(&adapter, key) {
            return (&SigtraderError::from(err)).into();
        }
    }

    let engine = match load_strategy_config(&adapter).and_then(StrategyEngine::new) {
        Ok(e) => e,
        Err(e) => return fail(e),
    };
    print_strategy(&engine);
    eprintln!("\nStrategy is valid.");
    ExitCode::SUCCESS
}

fn print_strategy(engine: &StrategyEngine) {
    let config = engine.config();
    println!("Name:            {}", config.name);
    if !config.description.is_empty() {
        println!("Description:     {}", config.description);
    }
    println!("Timeframe:       {}", config.timeframe);
    println!(
        "Startup:         {} candles (gate: {})",
        config.startup_candles, config.startup_gate
    );
    println!("Max open trades: {}", config.max_open_trades);
    println!("Warm-up:         {} candles", engine.pipeline().warmup());

    println!("\nFeatures:");
    for name in engine.pipeline().feature_names() {
        let warmup = engine.pipeline().feature_warmup(name).unwrap_or(0);
        println!("  {:<20} warm-up {}", name, warmup);
    }

    println!("\nEntry: {}", rule_text(config.entry.as_ref()));
    println!("Exit:  {}", rule_text(config.exit.as_ref()));

    let risk = &config.risk;
    println!(
        "\nLeverage: default {} cap {} ({} instruments, {} stages)",
        risk.default_leverage(),
        risk.max_leverage(),
        risk.leverage_table().len(),
        risk.stages().len()
    );
    println!("Stop-loss floor: {}", config.stoploss.floor());
    if !config.roi.is_empty() {
        let steps: Vec<String> = config
            .roi
            .steps()
            .map(|(m, r)| format!("{}m: {}", m, r))
            .collect();
        println!("ROI: {}", steps.join(", "));
    }
    if let Some(t) = &config.trailing {
        println!(
            "Trailing: {} once {} is reached (only offset: {})",
            t.positive, t.offset, t.only_offset_is_reached
        );
    }
    if let Some(buffer) = &config.buffer {
        println!("Price buffer: {} candles -> {}", buffer.size, buffer.column);
    }
    if let Some(classifier) = &config.classifier {
        println!(
            "Classifier: {} features, confidence > {}",
            classifier.features.len(),
            classifier.confidence
        );
    }
}

fn rule_text(rule: Option<&Rule>) -> String {
    rule.map(|r| r.to_string())
        .unwrap_or_else(|| "(none)".to_string())
}

fn run_presets(name: Option<&str>) -> ExitCode {
    match name {
        Some(name) => match presets::by_name(name).and_then(StrategyEngine::new) {
            Ok(engine) => {
                print_strategy(&engine);
                ExitCode::SUCCESS
            }
            Err(e) => fail(e),
        },
        None => {
            for name in presets::names() {
                match presets::by_name(name) {
                    Ok(config) => println!(
                        "{:<20} {:>4}  {}",
                        name, config.timeframe, config.description
                    ),
                    Err(e) => return fail(e),
                }
            }
            ExitCode::SUCCESS
        }
    }
}

fn run_risk(
    source: &StrategySource,
    instrument: &str,
    profit: f64,
    minutes: i64,
    data: Option<&Path>,
) -> ExitCode {
    let mut engine = match build_engine(source) {
        Ok(e) => e,
        Err(code) => return code,
    };

    let latest: Option<FeatureRow> = match data {
        Some(dir) => match evaluate(&mut engine, dir, instrument, None, None) {
            Ok(frame) => frame.table.last_row(),
            Err(e) => return fail(e),
        },
        None => None,
    };

    let close = latest.as_ref().and_then(|r| r.get("close")).unwrap_or(0.0);
    let current_time = latest
        .as_ref()
        .and_then(|r| r.get("timestamp"))
        .and_then(|secs| chrono::DateTime::from_timestamp(secs as i64, 0))
        .map(|dt| dt.naive_utc())
        .unwrap_or_default();
    let ctx = TradeContext {
        current_profit: profit,
        entry_time: current_time - Duration::minutes(minutes.max(0)),
        current_time,
        min_rate: close,
        max_rate: close,
    };

    println!("leverage     {:.4}", engine.leverage(instrument, &ctx, latest.as_ref()));
    println!("stop_loss    {:.4}", engine.stop_loss(&ctx, latest.as_ref()));
    println!("custom_exit  {}", engine.custom_exit(&ctx));
    match engine.minimal_roi(&ctx) {
        Some(roi) => println!("minimal_roi  {:.4}", roi),
        None => println!("minimal_roi  none"),
    }
    ExitCode::SUCCESS
}
