//! Polymarket Insider: wallet flow and consensus analytics
//!
//! Root crate used by the benchmarks and cross-crate integration tests.
//! Functionality lives in the workspace crates:
//!
//! - `polymarket-core`: domain types, configuration, snapshot storage
//! - `wallet-analytics`: metrics, ranking, flow and consensus engines
//! - `insider-runner`: command-line runner

// Re-export for benchmarks
pub use polymarket_core as core;
pub use wallet_analytics as analytics;
