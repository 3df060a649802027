pub mod config;
pub mod data;
pub mod engine;
pub mod market;
pub mod pricing;
pub mod report;
pub mod schedule;

// Re-export commonly used types
pub use config::{BacktestConfig, ConfigError, Leg, LegSpec, StrikeSelection, VegaAttribution};
pub use data::{load_close_series, load_trading_days, CsvChainSource, LoaderError};
pub use engine::{Backtest, EngineError, LedgerRecord, MarketInputs};
pub use market::{ContractQuote, ForwardFilled, Greeks, MarketSnapshot, OptionType};
pub use pricing::BlackScholes;
pub use report::{BacktestReport, Summary};
pub use schedule::{Frequency, RecurrenceRule};
