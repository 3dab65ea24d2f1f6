//! Price records kept per exchange and per asset

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;

use crate::{spread_adjusted, SpreadPreset, Trend};

/// Current wall-clock time, never earlier than `prev`.
fn refreshed(prev: DateTime<Utc>) -> DateTime<Utc> {
    prev.max(Utc::now())
}

fn elapsed_since(ts: DateTime<Utc>) -> Duration {
    (Utc::now() - ts).to_std().unwrap_or(Duration::ZERO)
}

/// Market stats snapshot for a traded symbol
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TickerData {
    pub symbol: String,
    pub last_price: f64,
    pub volume_24h: Option<f64>,
    pub price_change_24h: Option<f64>,
    pub high_24h: Option<f64>,
    pub low_24h: Option<f64>,
    pub timestamp: DateTime<Utc>,
}

impl TickerData {
    pub fn new(symbol: impl Into<String>, last_price: f64) -> Self {
        Self {
            symbol: symbol.into(),
            last_price,
            volume_24h: None,
            price_change_24h: None,
            high_24h: None,
            low_24h: None,
            timestamp: Utc::now(),
        }
    }

    pub fn with_volume(mut self, volume: f64) -> Self {
        self.volume_24h = Some(volume);
        self
    }

    pub fn with_change(mut self, change: f64) -> Self {
        self.price_change_24h = Some(change);
        self
    }

    pub fn with_range(mut self, low: f64, high: f64) -> Self {
        self.low_24h = Some(low);
        self.high_24h = Some(high);
        self
    }

    /// Direction of the 24h move; flat when unknown
    pub fn trend(&self) -> Trend {
        self.price_change_24h
            .map(Trend::from_change)
            .unwrap_or(Trend::Flat)
    }
}

/// Authoritative price of one asset on one exchange
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssetPrice {
    pub symbol: String,
    pub base_price: f64,
    pub spot_price: Option<f64>,
    pub usd_price: Option<f64>,
    /// Spread label -> spread-adjusted price
    pub spreads: HashMap<String, f64>,
    pub last_update: DateTime<Utc>,
}

impl AssetPrice {
    pub fn new(symbol: impl Into<String>, base_price: f64) -> Self {
        Self {
            symbol: symbol.into(),
            base_price,
            spot_price: None,
            usd_price: None,
            spreads: HashMap::new(),
            last_update: Utc::now(),
        }
    }

    /// Base price reduced by `spread_pct + commission` percent.
    ///
    /// Inputs are not range-checked: a combined percentage of 100 or more
    /// yields zero or a negative price.
    pub fn calculate_spread(&self, spread_pct: f64, commission: f64) -> f64 {
        spread_adjusted(self.base_price, spread_pct, commission)
    }

    /// Compute a spread price and keep it under `label`
    pub fn store_spread(&mut self, label: &str, spread_pct: f64, commission: f64) -> f64 {
        let value = self.calculate_spread(spread_pct, commission);
        self.spreads.insert(label.to_string(), value);
        self.touch();
        value
    }

    /// Store every preset with the same commission
    pub fn apply_presets(&mut self, presets: &[SpreadPreset], commission: f64) {
        for preset in presets {
            let value = self.calculate_spread(preset.pct, commission);
            self.spreads.insert(preset.label.clone(), value);
        }
        self.touch();
    }

    pub fn age(&self) -> Duration {
        elapsed_since(self.last_update)
    }

    pub fn is_stale(&self, max_age: Duration) -> bool {
        self.age() > max_age
    }

    fn touch(&mut self) {
        self.last_update = refreshed(self.last_update);
    }
}

/// State of a single exchange and the assets it quotes
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExchangeData {
    pub name: String,
    pub assets: HashMap<String, AssetPrice>,
    pub enabled: bool,
    pub connected: bool,
    pub last_update: DateTime<Utc>,
}

impl ExchangeData {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            assets: HashMap::new(),
            enabled: true,
            connected: false,
            last_update: Utc::now(),
        }
    }

    pub fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    /// Insert or refresh an asset quote.
    ///
    /// Optional prices that are `None` keep their previous value on an
    /// existing asset.
    pub fn update_asset(
        &mut self,
        symbol: &str,
        price: f64,
        usd_price: Option<f64>,
        spot_price: Option<f64>,
    ) {
        match self.assets.get_mut(symbol) {
            Some(asset) => {
                asset.base_price = price;
                if usd_price.is_some() {
                    asset.usd_price = usd_price;
                }
                if spot_price.is_some() {
                    asset.spot_price = spot_price;
                }
                asset.touch();
            }
            None => {
                let mut asset = AssetPrice::new(symbol, price);
                asset.usd_price = usd_price;
                asset.spot_price = spot_price;
                self.assets.insert(symbol.to_string(), asset);
            }
        }

        self.touch();
    }

    pub fn get_asset(&self, symbol: &str) -> Option<&AssetPrice> {
        self.assets.get(symbol)
    }

    pub fn get_asset_mut(&mut self, symbol: &str) -> Option<&mut AssetPrice> {
        self.assets.get_mut(symbol)
    }

    pub fn set_connected(&mut self, connected: bool) {
        self.connected = connected;
        self.touch();
    }

    pub fn set_enabled(&mut self, enabled: bool) {
        self.enabled = enabled;
        self.touch();
    }

    /// Symbols sorted alphabetically
    pub fn asset_symbols(&self) -> Vec<String> {
        let mut symbols: Vec<String> = self.assets.keys().cloned().collect();
        symbols.sort();
        symbols
    }

    /// Refresh `last_update` after an in-place change to an asset
    pub fn touch(&mut self) {
        self.last_update = refreshed(self.last_update);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration as ChronoDuration;
    use proptest::prelude::*;

    #[test]
    fn test_calculate_spread() {
        let asset = AssetPrice::new("BTC", 100.0);
        assert!((asset.calculate_spread(1.0, 0.5) - 98.5).abs() < 1e-9);
        assert!((asset.calculate_spread(0.0, 0.0) - 100.0).abs() < 1e-9);
        // Out-of-range inputs are accepted as is
        assert!(asset.calculate_spread(60.0, 50.0) < 0.0);
        assert!((asset.calculate_spread(-1.0, 0.0) - 101.0).abs() < 1e-9);
    }

    #[test]
    fn test_calculate_spread_does_not_store() {
        let asset = AssetPrice::new("ETH", 3300.0);
        let _ = asset.calculate_spread(0.5, 0.2);
        assert!(asset.spreads.is_empty());
    }

    #[test]
    fn test_store_spread_and_presets() {
        let mut asset = AssetPrice::new("USDT", 200.0);
        let value = asset.store_spread("tight", 0.5, 0.5);
        assert!((value - 198.0).abs() < 1e-9);
        assert_eq!(asset.spreads.get("tight"), Some(&value));

        let presets = vec![
            SpreadPreset::new("a", 1.0),
            SpreadPreset::new("b", 2.0),
        ];
        asset.apply_presets(&presets, 0.0);
        assert!((asset.spreads["a"] - 198.0).abs() < 1e-9);
        assert!((asset.spreads["b"] - 196.0).abs() < 1e-9);
        assert_eq!(asset.spreads.len(), 3);
    }

    #[test]
    fn test_update_asset_creates_then_merges() {
        let mut exchange = ExchangeData::new("bybit");
        exchange.update_asset("USDT", 100.0, Some(100.0), None);

        let asset = exchange.get_asset("USDT").unwrap();
        assert_eq!(asset.base_price, 100.0);
        assert_eq!(asset.usd_price, Some(100.0));
        assert_eq!(asset.spot_price, None);

        exchange.update_asset("USDT", 101.0, None, Some(99.5));
        let asset = exchange.get_asset("USDT").unwrap();
        assert_eq!(asset.base_price, 101.0);
        assert_eq!(asset.usd_price, Some(100.0), "omitted usd price must survive");
        assert_eq!(asset.spot_price, Some(99.5));

        exchange.update_asset("BTC", 1.0, None, None);
        assert_eq!(exchange.asset_symbols(), vec!["BTC", "USDT"]);
    }

    #[test]
    fn test_get_asset_never_creates() {
        let exchange = ExchangeData::new("garantex");
        assert!(exchange.get_asset("BTC").is_none());
        assert!(exchange.assets.is_empty());
    }

    #[test]
    fn test_exchange_defaults() {
        let exchange = ExchangeData::new("commex");
        assert!(exchange.enabled);
        assert!(!exchange.connected);
        assert!(!ExchangeData::new("x").with_enabled(false).enabled);
    }

    #[test]
    fn test_timestamps_never_go_backwards() {
        let mut exchange = ExchangeData::new("binance");
        exchange.update_asset("BTC", 1.0, None, None);

        // Pretend the previous update came from a clock that ran ahead
        let future = Utc::now() + ChronoDuration::hours(1);
        exchange.last_update = future;
        exchange.assets.get_mut("BTC").unwrap().last_update = future;

        exchange.update_asset("BTC", 2.0, None, None);
        assert_eq!(exchange.last_update, future);
        assert_eq!(exchange.get_asset("BTC").unwrap().last_update, future);
    }

    #[test]
    fn test_staleness() {
        let mut asset = AssetPrice::new("BTC", 1.0);
        assert!(!asset.is_stale(Duration::from_secs(60)));
        asset.last_update = Utc::now() - ChronoDuration::seconds(120);
        assert!(asset.is_stale(Duration::from_secs(60)));
    }

    #[test]
    fn test_ticker_trend() {
        let ticker = TickerData::new("BTCUSDT", 59_000.0).with_change(-1.2);
        assert_eq!(ticker.trend(), Trend::Down);
        assert_eq!(TickerData::new("ETHUSDT", 1.0).trend(), Trend::Flat);

        let ticker = TickerData::new("ETHUSDT", 3300.0)
            .with_volume(10.0)
            .with_range(3200.0, 3400.0);
        assert_eq!(ticker.low_24h, Some(3200.0));
        assert_eq!(ticker.high_24h, Some(3400.0));
        assert_eq!(ticker.volume_24h, Some(10.0));
    }

    #[test]
    fn test_asset_serializes_for_ui() {
        let mut asset = AssetPrice::new("BTC", 10.0);
        asset.store_spread("Spread 1", 0.5, 0.0);
        let json = serde_json::to_value(&asset).unwrap();
        assert_eq!(json["symbol"], "BTC");
        assert!(json["spreads"]["Spread 1"].is_number());
    }

    proptest! {
        #[test]
        fn prop_spread_matches_formula(
            base in -1.0e6f64..1.0e6,
            spread in -50.0f64..150.0,
            commission in -10.0f64..10.0,
        ) {
            let asset = AssetPrice::new("X", base);
            let expected = base * (1.0 - (spread + commission) / 100.0);
            let first = asset.calculate_spread(spread, commission);
            prop_assert_eq!(first, asset.calculate_spread(spread, commission));
            prop_assert!((first - expected).abs() <= 1e-9 * expected.abs().max(1.0));
        }

        #[test]
        fn prop_partial_update_keeps_omitted_fields(
            first in 0.0f64..1.0e6,
            second in 0.0f64..1.0e6,
            usd in 0.0f64..1.0e6,
            spot in 0.0f64..1.0e6,
        ) {
            let mut exchange = ExchangeData::new("bybit");
            exchange.update_asset("ETH", first, Some(usd), Some(spot));
            exchange.update_asset("ETH", second, None, None);
            let asset = exchange.get_asset("ETH").unwrap();
            prop_assert_eq!(asset.base_price, second);
            prop_assert_eq!(asset.usd_price, Some(usd));
            prop_assert_eq!(asset.spot_price, Some(spot));
        }
    }
}
