//! Spread presets and the spread-adjusted price formula

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Commission applied when an exchange has no explicit one
pub const DEFAULT_COMMISSION_PCT: f64 = 0.7;

/// Inclusive percentage bounds accepted by configuration
pub const MAX_SPREAD_PCT: f64 = 10.0;
pub const MAX_COMMISSION_PCT: f64 = 5.0;

/// `base * (1 - (spread_pct + commission) / 100)`
pub fn spread_adjusted(base: f64, spread_pct: f64, commission: f64) -> f64 {
    base * (1.0 - (spread_pct + commission) / 100.0)
}

/// A named spread percentage shown next to every price
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpreadPreset {
    pub label: String,
    pub pct: f64,
}

impl SpreadPreset {
    pub fn new(label: impl Into<String>, pct: f64) -> Self {
        Self {
            label: label.into(),
            pct,
        }
    }
}

/// The three presets the monitor starts with
pub fn default_presets() -> Vec<SpreadPreset> {
    vec![
        SpreadPreset::new("Spread 1", 0.5),
        SpreadPreset::new("Spread 2", 1.0),
        SpreadPreset::new("Spread 3", 1.5),
    ]
}

/// Presets plus per-exchange commissions, keyed by lowercase exchange name
#[derive(Debug, Clone, PartialEq)]
pub struct SpreadProfile {
    pub presets: Vec<SpreadPreset>,
    pub commissions: HashMap<String, f64>,
    pub default_commission: f64,
}

impl SpreadProfile {
    pub fn new(presets: Vec<SpreadPreset>) -> Self {
        Self {
            presets,
            commissions: HashMap::new(),
            default_commission: DEFAULT_COMMISSION_PCT,
        }
    }

    pub fn with_commission(mut self, exchange: &str, pct: f64) -> Self {
        self.commissions.insert(exchange.to_lowercase(), pct);
        self
    }

    pub fn commission_for(&self, exchange: &str) -> f64 {
        self.commissions
            .get(&exchange.to_lowercase())
            .copied()
            .unwrap_or(self.default_commission)
    }
}

impl Default for SpreadProfile {
    fn default() -> Self {
        Self::new(default_presets())
    }
}
