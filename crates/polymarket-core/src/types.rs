//! Core domain types for the insider analytics system.

pub mod consensus;
pub mod flow;
pub mod holder;
pub mod market;
pub mod score;
pub mod wallet;

pub use consensus::*;
pub use flow::*;
pub use holder::*;
pub use market::*;
pub use score::*;
pub use wallet::*;
