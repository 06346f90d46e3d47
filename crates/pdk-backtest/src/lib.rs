//! pdk-backtest
//!
//! Historical-replay backtesting with the same rule semantics as the live
//! engine.
//!
//! The core loop ([`engine::run`]) is a pure function of (rules, bars,
//! initial capital): no IO, no clock, no randomness. Running it twice over
//! identical bars yields byte-identical trades and metrics. The service
//! layer around it fetches bars, owns validation, and persists the result
//! exactly once.

pub mod engine;
pub mod metrics;
pub mod service;
mod types;

pub use engine::run;
pub use service::{run_to_completion, validate_params, BacktestParams, ValidationError};
pub use types::{BacktestReport, EquityPoint, Metrics, Trade};
