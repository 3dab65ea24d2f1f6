//! Feed seam for exchange connectors
//!
//! Connectors implement [`PriceFeed`] and push [`PriceUpdate`]s into the
//! aggregator's channel; the registry is only written by the aggregator.

use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use ratewatch_core::{AppConfig, ExchangeConfig, FeedError, FeedResult, TickerData};

/// Price update message
#[derive(Debug, Clone)]
pub enum PriceUpdate {
    Quote {
        exchange: String,
        symbol: String,
        price: f64,
        usd_price: Option<f64>,
        spot_price: Option<f64>,
    },
    Ticker {
        exchange: String,
        ticker: TickerData,
    },
    Connection {
        exchange: String,
        connected: bool,
    },
    Error {
        exchange: String,
        message: String,
    },
}

impl PriceUpdate {
    /// Quote with only a base price
    pub fn quote(exchange: &str, symbol: &str, price: f64) -> Self {
        PriceUpdate::Quote {
            exchange: exchange.to_string(),
            symbol: symbol.to_string(),
            price,
            usd_price: None,
            spot_price: None,
        }
    }

    pub fn exchange(&self) -> &str {
        match self {
            PriceUpdate::Quote { exchange, .. }
            | PriceUpdate::Ticker { exchange, .. }
            | PriceUpdate::Connection { exchange, .. }
            | PriceUpdate::Error { exchange, .. } => exchange,
        }
    }
}

/// Feed configuration
#[derive(Debug, Clone)]
pub struct FeedConfig {
    pub exchange: String,
    pub base_url: String,
    pub ws_url: Option<String>,
    pub trading_pairs: Vec<String>,
    pub reconnect_delay: Duration,
    pub max_reconnects: u32,
}

impl FeedConfig {
    pub fn from_exchange(name: &str, config: &ExchangeConfig) -> Self {
        Self {
            exchange: name.to_lowercase(),
            base_url: config.base_url.clone(),
            ws_url: config.ws_url.clone(),
            trading_pairs: config.trading_pairs(),
            reconnect_delay: config.reconnect_delay(),
            max_reconnects: config.max_reconnects,
        }
    }

    /// One config per enabled exchange, in name order
    pub fn enabled(config: &AppConfig) -> Vec<Self> {
        config
            .enabled_exchanges()
            .map(|(name, exchange)| Self::from_exchange(name, exchange))
            .collect()
    }
}

/// Base trait for exchange feeds
#[async_trait::async_trait]
pub trait PriceFeed: Send + Sync {
    fn exchange(&self) -> &str;

    /// Stream updates into `tx` until the connection ends.
    ///
    /// `Ok(())` means a clean shutdown and is not retried.
    async fn run(&mut self, tx: mpsc::Sender<PriceUpdate>) -> FeedResult<()>;
}

/// Run a feed, restarting it after failures until `max_reconnects` is hit.
///
/// Returns the number of failed attempts.
pub async fn run_with_reconnect<F>(
    feed: &mut F,
    config: &FeedConfig,
    tx: mpsc::Sender<PriceUpdate>,
) -> u32
where
    F: PriceFeed + ?Sized,
{
    let mut failures = 0;

    loop {
        let result = feed.run(tx.clone()).await;

        let disconnected = PriceUpdate::Connection {
            exchange: config.exchange.clone(),
            connected: false,
        };
        if tx.send(disconnected).await.is_err() {
            debug!("Updates channel closed");
            break;
        }

        let delay = match result {
            Ok(()) => {
                info!("Feed {} disconnected normally", config.exchange);
                break;
            }
            Err(FeedError::RateLimited { retry_after }) => {
                warn!("Feed {} rate limited", config.exchange);
                retry_after.unwrap_or(config.reconnect_delay)
            }
            Err(e) => {
                error!("Feed {} error: {}", config.exchange, e);
                let report = PriceUpdate::Error {
                    exchange: config.exchange.clone(),
                    message: e.to_string(),
                };
                if tx.send(report).await.is_err() {
                    break;
                }
                config.reconnect_delay
            }
        };

        failures += 1;
        if failures >= config.max_reconnects {
            error!("Max reconnects reached for {}", config.exchange);
            break;
        }

        warn!(
            "Reconnecting {} in {:?} (attempt {}/{})",
            config.exchange, delay, failures, config.max_reconnects
        );
        tokio::time::sleep(delay).await;
    }

    failures
}
