//! Shared per-exchange price registry
//!
//! Exchanges live in a DashMap keyed by lowercase name. Each exchange sits
//! behind its own lock, so one connector's update never interleaves with
//! another write to the same exchange, while readers of other exchanges
//! are not blocked.

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use parking_lot::RwLock;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use ratewatch_core::{
    AppConfig, AssetPrice, ExchangeData, RegistrationPolicy, RegistryError, RegistryResult,
    SpreadProfile, TickerData,
};

type ExchangeEntry = Arc<RwLock<ExchangeData>>;

/// An asset whose last update is older than the allowed age
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StaleAsset {
    pub exchange: String,
    pub symbol: String,
    pub age: Duration,
}

/// Latest known prices for every tracked exchange
#[derive(Debug)]
pub struct PriceRegistry {
    exchanges: DashMap<String, ExchangeEntry>,
    policy: RegistrationPolicy,

    /// Stats
    update_count: AtomicU64,
    last_update: RwLock<Option<DateTime<Utc>>>,
}

impl PriceRegistry {
    pub fn new() -> Self {
        Self::with_policy(RegistrationPolicy::default())
    }

    pub fn with_policy(policy: RegistrationPolicy) -> Self {
        Self {
            exchanges: DashMap::new(),
            policy,
            update_count: AtomicU64::new(0),
            last_update: RwLock::new(None),
        }
    }

    /// Registry with the configured policy and every configured exchange
    pub fn from_config(config: &AppConfig) -> Self {
        let registry = Self::with_policy(config.registry.policy);
        registry.register_from_config(config);
        registry
    }

    pub fn policy(&self) -> RegistrationPolicy {
        self.policy
    }

    fn key(name: &str) -> String {
        name.to_lowercase()
    }

    fn entry(&self, name: &str) -> Option<ExchangeEntry> {
        self.exchanges
            .get(&Self::key(name))
            .map(|r| Arc::clone(r.value()))
    }

    /// Snapshot of one exchange (case-insensitive)
    pub fn get_exchange(&self, name: &str) -> Option<ExchangeData> {
        self.entry(name).map(|e| e.read().clone())
    }

    /// Read an exchange in place without cloning it
    pub fn with_exchange<R>(&self, name: &str, f: impl FnOnce(&ExchangeData) -> R) -> Option<R> {
        self.entry(name).map(|e| f(&e.read()))
    }

    /// Register an exchange, replacing any existing record under that name
    pub fn add_exchange(&self, name: &str, enabled: bool) -> ExchangeData {
        let key = Self::key(name);
        let data = ExchangeData::new(key.clone()).with_enabled(enabled);

        if self
            .exchanges
            .insert(key.clone(), Arc::new(RwLock::new(data.clone())))
            .is_some()
        {
            info!("Replaced exchange {}", key);
        } else {
            info!("Registered exchange {} (enabled={})", key, enabled);
        }

        data
    }

    /// Add every exchange from the configuration with its enabled flag
    pub fn register_from_config(&self, config: &AppConfig) {
        for (name, exchange) in &config.exchanges {
            self.add_exchange(name, exchange.enabled);
        }
    }

    /// Store a quote for `symbol` on `exchange_name`.
    ///
    /// Unknown exchanges are registered (enabled) under
    /// `RegistrationPolicy::AutoRegister` and rejected under `Strict`.
    pub fn update_asset(
        &self,
        exchange_name: &str,
        symbol: &str,
        price: f64,
        usd_price: Option<f64>,
        spot_price: Option<f64>,
    ) -> RegistryResult<()> {
        self.write_quote(exchange_name, symbol, price, usd_price, spot_price, None)
    }

    /// `update_asset` plus a refresh of the profile's spreads on that asset.
    ///
    /// Both happen under one exchange write lock, so a reader never sees the
    /// new base price next to spreads computed from the old one.
    pub fn update_asset_with_spreads(
        &self,
        exchange_name: &str,
        symbol: &str,
        price: f64,
        usd_price: Option<f64>,
        spot_price: Option<f64>,
        profile: &SpreadProfile,
    ) -> RegistryResult<()> {
        self.write_quote(exchange_name, symbol, price, usd_price, spot_price, Some(profile))
    }

    fn write_quote(
        &self,
        exchange_name: &str,
        symbol: &str,
        price: f64,
        usd_price: Option<f64>,
        spot_price: Option<f64>,
        profile: Option<&SpreadProfile>,
    ) -> RegistryResult<()> {
        let entry = match self.entry(exchange_name) {
            Some(entry) => entry,
            None => self.register_on_write(exchange_name)?,
        };

        {
            let mut exchange = entry.write();
            exchange.update_asset(symbol, price, usd_price, spot_price);
            if let Some(profile) = profile {
                let commission = profile.commission_for(exchange_name);
                if let Some(asset) = exchange.get_asset_mut(symbol) {
                    asset.apply_presets(&profile.presets, commission);
                }
            }
        }
        self.record_update();

        debug!(
            "Updated {}/{}: price={} usd={:?} spot={:?}",
            exchange_name, symbol, price, usd_price, spot_price
        );
        Ok(())
    }

    fn register_on_write(&self, exchange_name: &str) -> RegistryResult<ExchangeEntry> {
        match self.policy {
            RegistrationPolicy::AutoRegister => {
                let key = Self::key(exchange_name);
                // Entry API so racing writers create the exchange only once
                let entry = self
                    .exchanges
                    .entry(key.clone())
                    .or_insert_with(|| {
                        info!("Auto-registered exchange {} on first quote", key);
                        Arc::new(RwLock::new(ExchangeData::new(key.clone())))
                    })
                    .value()
                    .clone();
                Ok(entry)
            }
            RegistrationPolicy::Strict => {
                warn!("Rejected quote for unregistered exchange {}", exchange_name);
                Err(RegistryError::UnknownExchange(exchange_name.to_string()))
            }
        }
    }

    /// Store a ticker's last price as the asset's base price
    pub fn apply_ticker(&self, exchange_name: &str, ticker: &TickerData) -> RegistryResult<()> {
        self.update_asset(exchange_name, &ticker.symbol, ticker.last_price, None, None)
    }

    /// `apply_ticker` with the profile's spreads refreshed under the same lock
    pub fn apply_ticker_with_spreads(
        &self,
        exchange_name: &str,
        ticker: &TickerData,
        profile: &SpreadProfile,
    ) -> RegistryResult<()> {
        self.update_asset_with_spreads(
            exchange_name,
            &ticker.symbol,
            ticker.last_price,
            None,
            None,
            profile,
        )
    }

    /// `Some(false)` for a registered but disabled exchange
    pub fn is_enabled(&self, exchange_name: &str) -> Option<bool> {
        self.with_exchange(exchange_name, |e| e.enabled)
    }

    /// Snapshots of all exchanges, sorted by name
    pub fn get_exchanges(&self) -> Vec<ExchangeData> {
        let entries: Vec<ExchangeEntry> = self
            .exchanges
            .iter()
            .map(|r| Arc::clone(r.value()))
            .collect();

        let mut exchanges: Vec<ExchangeData> =
            entries.iter().map(|e| e.read().clone()).collect();
        exchanges.sort_by(|a, b| a.name.cmp(&b.name));
        exchanges
    }

    pub fn exchange_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.exchanges.iter().map(|r| r.key().clone()).collect();
        names.sort();
        names
    }

    /// One entry per registered exchange; `None` where the symbol is missing
    pub fn get_asset_from_all_exchanges(&self, symbol: &str) -> HashMap<String, Option<AssetPrice>> {
        let entries: Vec<(String, ExchangeEntry)> = self
            .exchanges
            .iter()
            .map(|r| (r.key().clone(), Arc::clone(r.value())))
            .collect();

        entries
            .into_iter()
            .map(|(name, entry)| {
                let asset = entry.read().get_asset(symbol).cloned();
                (name, asset)
            })
            .collect()
    }

    /// Returns false when the exchange is unknown
    pub fn set_connected(&self, exchange_name: &str, connected: bool) -> bool {
        match self.entry(exchange_name) {
            Some(entry) => {
                entry.write().set_connected(connected);
                info!(
                    "Exchange {} {}",
                    exchange_name,
                    if connected { "connected" } else { "disconnected" }
                );
                true
            }
            None => false,
        }
    }

    /// Returns false when the exchange is unknown
    pub fn set_enabled(&self, exchange_name: &str, enabled: bool) -> bool {
        match self.entry(exchange_name) {
            Some(entry) => {
                entry.write().set_enabled(enabled);
                true
            }
            None => false,
        }
    }

    /// Compute and keep one spread price; `None` if the asset is unknown
    pub fn store_spread(
        &self,
        exchange_name: &str,
        symbol: &str,
        label: &str,
        spread_pct: f64,
        commission: f64,
    ) -> Option<f64> {
        let entry = self.entry(exchange_name)?;
        let mut exchange = entry.write();
        let value = exchange
            .get_asset_mut(symbol)?
            .store_spread(label, spread_pct, commission);
        exchange.touch();
        Some(value)
    }

    /// Refresh every preset on every asset; returns the number of assets touched
    pub fn apply_spread_profile(&self, profile: &SpreadProfile) -> usize {
        let entries: Vec<(String, ExchangeEntry)> = self
            .exchanges
            .iter()
            .map(|r| (r.key().clone(), Arc::clone(r.value())))
            .collect();

        let mut touched = 0;
        for (name, entry) in entries {
            let commission = profile.commission_for(&name);
            let mut exchange = entry.write();
            if exchange.assets.is_empty() {
                continue;
            }
            for asset in exchange.assets.values_mut() {
                asset.apply_presets(&profile.presets, commission);
                touched += 1;
            }
            exchange.touch();
        }
        touched
    }

    /// Assets not updated within `max_age`, oldest first
    pub fn stale_assets(&self, max_age: Duration) -> Vec<StaleAsset> {
        let mut stale: Vec<StaleAsset> = self
            .get_exchanges()
            .into_iter()
            .flat_map(|exchange| {
                let name = exchange.name;
                exchange
                    .assets
                    .into_values()
                    .filter(|asset| asset.is_stale(max_age))
                    .map(move |asset| StaleAsset {
                        exchange: name.clone(),
                        age: asset.age(),
                        symbol: asset.symbol,
                    })
            })
            .collect();
        stale.sort_by(|a, b| b.age.cmp(&a.age));
        stale
    }

    pub fn len(&self) -> usize {
        self.exchanges.len()
    }

    pub fn is_empty(&self) -> bool {
        self.exchanges.is_empty()
    }

    fn record_update(&self) {
        self.update_count.fetch_add(1, Ordering::Relaxed);
        *self.last_update.write() = Some(Utc::now());
    }

    /// Stats
    pub fn stats(&self) -> RegistryStats {
        let asset_count = self
            .exchanges
            .iter()
            .map(|r| r.value().read().assets.len())
            .sum();

        RegistryStats {
            exchange_count: self.exchanges.len(),
            asset_count,
            update_count: self.update_count.load(Ordering::Relaxed),
            last_update: *self.last_update.read(),
        }
    }
}

impl Default for PriceRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Statistics about the registry
#[derive(Debug, Clone, Serialize)]
pub struct RegistryStats {
    pub exchange_count: usize,
    pub asset_count: usize,
    pub update_count: u64,
    pub last_update: Option<DateTime<Utc>>,
}
