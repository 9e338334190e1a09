pub mod batch;
pub mod config;
pub mod domain;
pub mod engine;
pub mod error;
pub mod portfolio;

pub use config::Config;
pub use domain::{
    AccountId, Currency, FormatOptions, InstrumentKind, Money, MoneyError, NormalizedTransaction,
    RawTransaction, Side, Ticker, Timestamp, TxnId, UserId,
};
pub use engine::{
    aggregate_episodes, build_ledger, normalize, normalize_batch, ActionTerm, AggregationConfig,
    EpisodeTxn, Ledger, LedgerConfig, LedgerRow, PositionEpisode, RollDetection,
};
pub use error::EngineError;
pub use portfolio::{process_batch, EngineConfig, PortfolioResult};
