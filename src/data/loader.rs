//! CSV loaders for chain files and scalar close series.
//!
//! Chain data lives in one file per month, `{ticker}_eod_{YYYYMM}.csv`, with
//! one row per contract quote:
//! - Date, Maturity, Type, Strike, Bid, Ask, Spot, Volume
//! - Implied Vol, Delta, Gamma, Vega, Theta, Rho
//!
//! Scalar series (underlying close, vol index, rates) are two-column CSVs
//! with a Date column and one value column.

use std::path::{Path, PathBuf};

use chrono::{NaiveDate, NaiveTime};
use polars::prelude::*;
use thiserror::Error;

use crate::market::series::ForwardFilled;
use crate::market::{
    month_key, ContractQuote, Greeks, MarketDataError, MarketSnapshot, MonthlyChain,
    OptionType, SnapshotSource,
};

/// Expected columns in a monthly chain file.
pub const CHAIN_COLUMNS: &[&str] = &[
    "Date",
    "Maturity",
    "Type",
    "Strike",
    "Bid",
    "Ask",
    "Spot",
    "Volume",
    "Implied Vol",
    "Delta",
    "Gamma",
    "Vega",
    "Theta",
    "Rho",
];

#[derive(Error, Debug)]
pub enum LoaderError {
    #[error("File not found: {0}")]
    FileNotFound(String),

    #[error("Polars error: {0}")]
    Polars(#[from] PolarsError),

    #[error("Invalid data: {0}")]
    InvalidData(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Monthly chain files on disk, consumed through the snapshot cache.
pub struct CsvChainSource {
    data_dir: PathBuf,
    ticker: String,
}

impl CsvChainSource {
    pub fn new(data_dir: impl Into<PathBuf>, ticker: &str) -> Self {
        Self {
            data_dir: data_dir.into(),
            ticker: ticker.to_string(),
        }
    }

    fn month_path(&self, key: &str) -> PathBuf {
        self.data_dir
            .join(format!("{}_eod_{}.csv", self.ticker, key))
    }

    fn read_month(&self, date: NaiveDate) -> Result<MonthlyChain, LoaderError> {
        let key = month_key(date);
        let path = self.month_path(&key);
        let df = read_csv(&path)?;

        let dates = date_column(&df, "Date")?;
        let maturities = date_column(&df, "Maturity")?;
        let types = string_column(&df, "Type")?;
        let strikes = float_column(&df, "Strike")?;
        let bids = float_column(&df, "Bid")?;
        let asks = float_column(&df, "Ask")?;
        let spots = float_column(&df, "Spot")?;
        let volumes = float_column(&df, "Volume")?;
        let ivs = float_column(&df, "Implied Vol")?;
        let deltas = float_column(&df, "Delta")?;
        let gammas = float_column(&df, "Gamma")?;
        let vegas = float_column(&df, "Vega")?;
        let thetas = float_column(&df, "Theta")?;
        let rhos = float_column(&df, "Rho")?;

        let mut chain = MonthlyChain {
            key,
            days: Default::default(),
        };

        for row in 0..df.height() {
            let date = dates[row];
            let spot = spots[row];
            let snapshot = chain
                .days
                .entry(date)
                .or_insert_with(|| MarketSnapshot::new(date, spot));

            let option_type = OptionType::parse(&types[row]).ok_or_else(|| {
                LoaderError::InvalidData(format!(
                    "unrecognized option type '{}' at row {}",
                    types[row], row
                ))
            })?;

            snapshot.push(ContractQuote {
                strike: strikes[row],
                maturity: maturities[row],
                option_type,
                bid: bids[row],
                ask: asks[row],
                volume: volumes[row],
                implied_vol: ivs[row],
                greeks: Greeks {
                    delta: deltas[row],
                    gamma: gammas[row],
                    vega: vegas[row],
                    theta: thetas[row],
                    rho: rhos[row],
                },
            });
        }

        Ok(chain)
    }
}

impl SnapshotSource for CsvChainSource {
    fn load_month(&mut self, date: NaiveDate) -> Result<MonthlyChain, MarketDataError> {
        self.read_month(date)
            .map_err(|e| MarketDataError::Source(e.to_string()))
    }
}

/// Load a scalar close series, stamped at the configured close time.
pub fn load_close_series(
    path: &Path,
    value_column: &str,
    close_time: NaiveTime,
) -> Result<ForwardFilled, LoaderError> {
    let df = read_csv(path)?;
    let dates = date_column(&df, "Date")?;
    let values = float_column(&df, value_column)?;
    Ok(ForwardFilled::new(
        dates
            .into_iter()
            .zip(values)
            .map(|(date, value)| (date.and_time(close_time), value))
            .collect(),
    ))
}

/// Trading days from the Date column of a series file, sorted and unique.
pub fn load_trading_days(path: &Path) -> Result<Vec<NaiveDate>, LoaderError> {
    let df = read_csv(path)?;
    let mut days = date_column(&df, "Date")?;
    days.sort();
    days.dedup();
    Ok(days)
}

fn read_csv(path: &Path) -> Result<DataFrame, LoaderError> {
    if !path.exists() {
        return Err(LoaderError::FileNotFound(path.display().to_string()));
    }
    let df = CsvReadOptions::default()
        .with_has_header(true)
        .try_into_reader_with_file_path(Some(path.to_path_buf()))?
        .finish()?;
    Ok(df)
}

/// Convert days since Unix epoch to NaiveDate.
fn date_from_days(days: i32) -> NaiveDate {
    NaiveDate::from_num_days_from_ce_opt(days + 719_163).unwrap_or_default()
}

/// A date column, whether stored as strings or native dates.
fn date_column(df: &DataFrame, name: &str) -> Result<Vec<NaiveDate>, LoaderError> {
    let column = df.column(name)?;
    if let Ok(str_col) = column.str() {
        str_col
            .into_iter()
            .map(|s| {
                s.and_then(|s| NaiveDate::parse_from_str(s, "%Y-%m-%d").ok())
                    .ok_or_else(|| {
                        LoaderError::InvalidData(format!("unparseable date in column {name}"))
                    })
            })
            .collect()
    } else if let Ok(date_col) = column.date() {
        date_col
            .into_iter()
            .map(|d| {
                d.map(date_from_days).ok_or_else(|| {
                    LoaderError::InvalidData(format!("null date in column {name}"))
                })
            })
            .collect()
    } else {
        Err(LoaderError::InvalidData(format!(
            "column {name} has unexpected type"
        )))
    }
}

fn float_column(df: &DataFrame, name: &str) -> Result<Vec<f64>, LoaderError> {
    let column = df.column(name)?.cast(&DataType::Float64)?;
    Ok(column
        .f64()?
        .into_iter()
        .map(|v| v.unwrap_or(f64::NAN))
        .collect())
}

fn string_column(df: &DataFrame, name: &str) -> Result<Vec<String>, LoaderError> {
    let column = df.column(name)?.cast(&DataType::String)?;
    Ok(column
        .str()?
        .into_iter()
        .map(|v| v.unwrap_or_default().to_string())
        .collect())
}
