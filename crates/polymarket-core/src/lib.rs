//! Polymarket Core Library
//!
//! Shared types, configuration and snapshot storage for the insider analytics
//! workspace.

pub mod config;
pub mod db;
pub mod error;
pub mod types;

pub use error::{Error, Result};
