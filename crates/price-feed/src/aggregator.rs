//! Price aggregator - applies feed updates to the shared registry

use anyhow::Context;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch, RwLock};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use ratewatch_core::{AppConfig, ExchangeData, SpreadProfile};
use crate::feeds::{run_with_reconnect, FeedConfig, PriceFeed, PriceUpdate};
use crate::state::{PriceRegistry, RegistryStats};

/// Shortest period used for the timer tasks
const MIN_TICK: Duration = Duration::from_millis(1);

/// Aggregator configuration
#[derive(Debug, Clone)]
pub struct AggregatorConfig {
    pub channel_capacity: usize,
    pub max_price_age: Duration,
    pub stale_check_interval: Duration,
    /// How often a registry snapshot is published to `snapshots()` receivers
    pub snapshot_interval: Duration,
    pub spread_profile: SpreadProfile,
}

impl AggregatorConfig {
    pub fn from_app(config: &AppConfig) -> Self {
        Self {
            max_price_age: config.registry.max_price_age(),
            stale_check_interval: config.registry.stale_check_interval(),
            snapshot_interval: config.update_interval(),
            spread_profile: config.spread_profile(),
            ..Self::default()
        }
    }
}

/// `tokio::time::interval` panics on a zero period
fn tick_period(name: &str, period: Duration) -> Duration {
    if period < MIN_TICK {
        warn!("{} of {:?} raised to {:?}", name, period, MIN_TICK);
        MIN_TICK
    } else {
        period
    }
}

impl Default for AggregatorConfig {
    fn default() -> Self {
        Self {
            channel_capacity: 10_000,
            max_price_age: Duration::from_secs(30),
            stale_check_interval: Duration::from_secs(5),
            snapshot_interval: Duration::from_secs(1),
            spread_profile: SpreadProfile::default(),
        }
    }
}

/// Apply one update to the registry.
///
/// Quotes and tickers also refresh the touched asset's spread presets.
/// Prices for a registered but disabled exchange are dropped.
pub fn apply_update(registry: &PriceRegistry, profile: &SpreadProfile, update: PriceUpdate) {
    match update {
        PriceUpdate::Quote {
            exchange,
            symbol,
            price,
            usd_price,
            spot_price,
        } => {
            if registry.is_enabled(&exchange) == Some(false) {
                debug!("Ignoring quote {}/{} from disabled exchange", exchange, symbol);
                return;
            }
            if let Err(e) = registry
                .update_asset_with_spreads(&exchange, &symbol, price, usd_price, spot_price, profile)
            {
                warn!("Dropping quote {}/{}: {}", exchange, symbol, e);
            }
        }
        PriceUpdate::Ticker { exchange, ticker } => {
            if registry.is_enabled(&exchange) == Some(false) {
                debug!("Ignoring ticker {}/{} from disabled exchange", exchange, ticker.symbol);
                return;
            }
            if let Err(e) = registry.apply_ticker_with_spreads(&exchange, &ticker, profile) {
                warn!("Dropping ticker {}/{}: {}", exchange, ticker.symbol, e);
            }
        }
        PriceUpdate::Connection { exchange, connected } => {
            if !registry.set_connected(&exchange, connected) {
                debug!("Connection state for unregistered exchange {}", exchange);
            }
        }
        PriceUpdate::Error { exchange, message } => {
            warn!("Feed {} reported: {}", exchange, message);
        }
    }
}

/// Main price aggregator
pub struct PriceAggregator {
    config: AggregatorConfig,
    registry: Arc<PriceRegistry>,
    update_rx: Option<mpsc::Receiver<PriceUpdate>>,
    update_tx: mpsc::Sender<PriceUpdate>,
    feeds: Vec<(FeedConfig, Box<dyn PriceFeed>)>,
    handles: Vec<JoinHandle<()>>,
    running: Arc<RwLock<bool>>,
    snapshot_tx: watch::Sender<Vec<ExchangeData>>,
}

impl PriceAggregator {
    pub fn new(config: AggregatorConfig, registry: Arc<PriceRegistry>) -> Self {
        let (update_tx, update_rx) = mpsc::channel(config.channel_capacity);
        let (snapshot_tx, _) = watch::channel(registry.get_exchanges());

        Self {
            config,
            registry,
            update_rx: Some(update_rx),
            update_tx,
            feeds: vec![],
            handles: vec![],
            running: Arc::new(RwLock::new(false)),
            snapshot_tx,
        }
    }

    /// Aggregator over a fresh registry holding every configured exchange
    pub fn from_app_config(config: &AppConfig) -> Self {
        Self::new(
            AggregatorConfig::from_app(config),
            Arc::new(PriceRegistry::from_config(config)),
        )
    }

    /// Get shared registry reference
    pub fn registry(&self) -> Arc<PriceRegistry> {
        Arc::clone(&self.registry)
    }

    /// Sender for connectors that push updates themselves
    pub fn sender(&self) -> mpsc::Sender<PriceUpdate> {
        self.update_tx.clone()
    }

    /// Registry snapshots, refreshed every `snapshot_interval` while running
    pub fn snapshots(&self) -> watch::Receiver<Vec<ExchangeData>> {
        self.snapshot_tx.subscribe()
    }

    /// Queue a feed; it is spawned by `start` unless its exchange is disabled
    pub fn attach_feed(&mut self, config: FeedConfig, feed: Box<dyn PriceFeed>) {
        debug!("Attached feed for {}", feed.exchange());
        self.feeds.push((config, feed));
    }

    /// Start the apply loop, the staleness monitor, the snapshot publisher
    /// and every attached feed of an enabled exchange
    pub async fn start(&mut self) -> anyhow::Result<()> {
        if self.is_running().await {
            anyhow::bail!("price aggregator already running");
        }

        let mut update_rx = self
            .update_rx
            .take()
            .context("update receiver already consumed by a previous start")?;

        info!("Starting price aggregator");
        *self.running.write().await = true;

        let registry = Arc::clone(&self.registry);
        let profile = self.config.spread_profile.clone();
        self.handles.push(tokio::spawn(async move {
            while let Some(update) = update_rx.recv().await {
                apply_update(&registry, &profile, update);
            }
            debug!("Updates channel closed");
        }));

        let registry = Arc::clone(&self.registry);
        let running = Arc::clone(&self.running);
        let max_age = self.config.max_price_age;
        let check_interval = tick_period("stale check interval", self.config.stale_check_interval);
        self.handles.push(tokio::spawn(async move {
            let mut interval = tokio::time::interval(check_interval);

            loop {
                interval.tick().await;

                if !*running.read().await {
                    break;
                }

                for stale in registry.stale_assets(max_age) {
                    warn!(
                        "Stale price {}/{}: last update {:?} ago",
                        stale.exchange, stale.symbol, stale.age
                    );
                }

                let stats = registry.stats();
                debug!(
                    "Registry: {} exchanges, {} assets, {} updates",
                    stats.exchange_count, stats.asset_count, stats.update_count
                );
            }
        }));

        let registry = Arc::clone(&self.registry);
        let snapshot_tx = self.snapshot_tx.clone();
        let snapshot_interval = tick_period("snapshot interval", self.config.snapshot_interval);
        self.handles.push(tokio::spawn(async move {
            let mut interval = tokio::time::interval(snapshot_interval);
            loop {
                interval.tick().await;
                snapshot_tx.send_replace(registry.get_exchanges());
            }
        }));

        for (feed_config, mut feed) in self.feeds.drain(..) {
            if self.registry.is_enabled(&feed_config.exchange) == Some(false) {
                info!("Skipping feed for disabled exchange {}", feed_config.exchange);
                continue;
            }
            let tx = self.update_tx.clone();
            info!("Started feed for {}", feed_config.exchange);
            self.handles.push(tokio::spawn(async move {
                run_with_reconnect(feed.as_mut(), &feed_config, tx).await;
            }));
        }

        Ok(())
    }

    /// Stop all tasks
    pub async fn stop(&mut self) {
        info!("Stopping price aggregator");
        *self.running.write().await = false;

        for handle in &self.handles {
            handle.abort();
        }
        futures::future::join_all(self.handles.drain(..)).await;
    }

    /// Check if running
    pub async fn is_running(&self) -> bool {
        *self.running.read().await
    }

    /// Get statistics
    pub fn stats(&self) -> AggregatorStats {
        AggregatorStats {
            task_count: self.handles.len(),
            pending_feeds: self.feeds.len(),
            registry: self.registry.stats(),
        }
    }
}

/// Aggregator statistics
#[derive(Debug, Clone)]
pub struct AggregatorStats {
    pub task_count: usize,
    pub pending_feeds: usize,
    pub registry: RegistryStats,
}
