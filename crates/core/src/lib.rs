//! Core types and utilities for ratewatch
//!
//! This crate provides the pieces shared by every component:
//! - Ticker, asset price and exchange records
//! - Spread presets and the spread-adjusted price formula
//! - Display formatting helpers
//! - Configuration loading and validation
//! - Error types and tracing setup

pub mod models;
pub mod spreads;
pub mod format;
pub mod settings;
pub mod errors;
pub mod telemetry;

pub use models::*;
pub use spreads::*;
pub use format::*;
pub use settings::*;
pub use errors::*;
