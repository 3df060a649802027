//! File-based data ingestion.

pub mod loader;

pub use loader::{
    load_close_series, load_trading_days, CsvChainSource, LoaderError, CHAIN_COLUMNS,
};
