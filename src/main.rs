//! # Run a single backtest
//! overlay-backtest run --config config/default.toml --data data/market
//!
//! # Check a configuration file without running
//! overlay-backtest check --config config/default.toml

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::Context;
use clap::{Parser, Subcommand};
use tracing::info;
use tracing_subscriber::EnvFilter;

use overlay_backtest::engine::{Backtest, MarketInputs};
use overlay_backtest::market::ForwardFilled;
use overlay_backtest::{load_close_series, load_trading_days, BacktestConfig, CsvChainSource};

#[derive(Parser)]
#[command(name = "overlay-backtest")]
#[command(about = "Rolling option overlay backtesting engine")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a single backtest with given configuration
    Run {
        /// Path to configuration file
        #[arg(short, long)]
        config: PathBuf,

        /// Path to data directory
        #[arg(short, long, default_value = "data/market")]
        data: PathBuf,

        /// Output directory for CSV results
        #[arg(short, long, default_value = "results")]
        output: PathBuf,
    },

    /// Validate a configuration file without running
    Check {
        /// Path to configuration file
        #[arg(short, long)]
        config: PathBuf,
    },
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let cli = Cli::parse();
    match cli.command {
        Commands::Run {
            config,
            data,
            output,
        } => run(&config, &data, &output),
        Commands::Check { config } => check(&config),
    }
}

fn load_config(path: &Path) -> anyhow::Result<BacktestConfig> {
    let raw = fs::read_to_string(path)
        .with_context(|| format!("reading config file {}", path.display()))?;
    let config: BacktestConfig =
        toml::from_str(&raw).with_context(|| format!("parsing {}", path.display()))?;
    Ok(config)
}

fn check(config_path: &Path) -> anyhow::Result<()> {
    let config = load_config(config_path)?;
    let legs = config.validate()?;
    println!(
        "{}: ok ({} leg{}, {} to {})",
        config_path.display(),
        legs.len(),
        if legs.len() == 1 { "" } else { "s" },
        config.start_date,
        config.end_date
    );
    Ok(())
}

fn run(config_path: &Path, data_dir: &Path, output_dir: &Path) -> anyhow::Result<()> {
    let config = load_config(config_path)?;
    let close_time = config.close_time;
    let underlying = config.underlying.clone();
    let vol_index_name = config.vol_index.clone();

    let spot_path = data_dir.join(format!("{underlying}_close.csv"));
    let spot = load_close_series(&spot_path, "Close", close_time)
        .with_context(|| format!("loading spot series {}", spot_path.display()))?;
    let trading_days = load_trading_days(&spot_path)?;

    let vol_path = data_dir.join(format!("{vol_index_name}_close.csv"));
    let vol_index = if vol_path.exists() {
        Some(load_close_series(&vol_path, "Close", close_time)?)
    } else {
        info!(path = %vol_path.display(), "no vol index file, skipping");
        None
    };

    let rate_path = data_dir.join("rates.csv");
    let rate = if rate_path.exists() {
        load_close_series(&rate_path, "Rate", close_time)?
    } else {
        info!("no rates.csv, assuming zero rates");
        ForwardFilled::flat(0.0)
    };

    let dividend_path = data_dir.join("dividends.csv");
    let dividend = if dividend_path.exists() {
        load_close_series(&dividend_path, "Yield", close_time)?
    } else {
        info!("no dividends.csv, assuming zero dividend yield");
        ForwardFilled::flat(0.0)
    };

    let backtest = Backtest::new(config)?;
    let report = backtest.run(MarketInputs {
        chains: CsvChainSource::new(data_dir, &underlying),
        trading_days,
        spot,
        vol_index,
        rate,
        dividend,
    })?;

    let summary = report.summary();
    println!("Final index level : {:.4}", summary.final_level);
    println!("Total PnL         : {:.4}", summary.total_pnl);
    println!("Max drawdown      : {:.2}%", summary.max_drawdown * 100.0);
    println!("Transaction fees  : {:.4}", summary.total_fees);
    println!("Hedge fees        : {:.4}", summary.total_hedge_fees);
    println!("Positions opened  : {}", summary.positions_opened);

    fs::create_dir_all(output_dir)
        .with_context(|| format!("creating {}", output_dir.display()))?;
    fs::write(output_dir.join("ledger.csv"), report.ledger_csv())?;
    fs::write(output_dir.join("positions.csv"), report.positions_csv())?;
    let attribution = report.attribution_csv();
    if !attribution.is_empty() {
        fs::write(output_dir.join("attribution.csv"), attribution)?;
    }
    info!(output = %output_dir.display(), "results written");
    Ok(())
}
