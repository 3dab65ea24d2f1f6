//! Shared price registry and feed aggregator
//!
//! Features:
//! - Per-exchange locking for concurrent connector writes
//! - Case-insensitive exchange lookup with optional auto-registration
//! - Spread presets refreshed on every quote
//! - Automatic feed reconnection
//! - Price staleness detection

pub mod aggregator;
pub mod feeds;
pub mod state;

pub use aggregator::{apply_update, AggregatorConfig, AggregatorStats, PriceAggregator};
pub use feeds::{run_with_reconnect, FeedConfig, PriceFeed, PriceUpdate};
pub use state::{PriceRegistry, RegistryStats, StaleAsset};
