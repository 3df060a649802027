//! Market data: chain snapshots, scalar series, and quote binding.

pub mod binder;
pub mod selector;
pub mod series;
pub mod source;
pub mod types;

pub use binder::MarketDataBinder;
pub use selector::{select_contract, NoEligibleContract, SelectedContract};
pub use series::ForwardFilled;
pub use source::{month_key, InMemorySource, MarketDataError, SnapshotCache, SnapshotSource};
pub use types::{ContractQuote, Greeks, MarketSnapshot, MonthlyChain, OptionType};
