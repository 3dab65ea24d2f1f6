//! Configuration types and loading
//!
//! Layers, lowest priority first: built-in defaults, an optional TOML file,
//! then `RATEWATCH__*` environment variables (`__` separates nesting, e.g.
//! `RATEWATCH__EXCHANGES__BINANCE__ENABLED=true`).

use ::config::{Config, Environment, File, FileFormat};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::env;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::debug;

use crate::{
    default_presets, ConfigError, ConfigResult, SpreadPreset, SpreadProfile,
    DEFAULT_COMMISSION_PCT, MAX_COMMISSION_PCT, MAX_SPREAD_PCT,
};

pub const ENV_PREFIX: &str = "RATEWATCH";
pub const CONFIG_PATH_VAR: &str = "RATEWATCH_CONFIG";
pub const DEFAULT_CONFIG_FILE: &str = "ratewatch.toml";

/// What the registry does with a quote for an exchange it has never seen
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RegistrationPolicy {
    /// Register the exchange (enabled) and store the quote
    #[default]
    AutoRegister,
    /// Reject the quote; exchanges must be added up front
    Strict,
}

/// Per-exchange connection settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExchangeConfig {
    pub enabled: bool,
    pub base_url: String,
    pub ws_url: Option<String>,
    pub assets: Vec<String>,
    pub commission_pct: f64,
    pub reconnect_delay_ms: u64,
    pub max_reconnects: u32,
}

impl ExchangeConfig {
    fn preset(enabled: bool, base_url: &str, ws_url: Option<&str>) -> Self {
        Self {
            enabled,
            base_url: base_url.to_string(),
            ws_url: ws_url.map(str::to_string),
            ..Self::default()
        }
    }

    /// `{ASSET}USDT` for every tracked asset except USDT itself
    pub fn trading_pairs(&self) -> Vec<String> {
        self.assets
            .iter()
            .filter(|a| !a.eq_ignore_ascii_case("USDT"))
            .map(|a| format!("{}USDT", a.to_uppercase()))
            .collect()
    }

    pub fn reconnect_delay(&self) -> Duration {
        Duration::from_millis(self.reconnect_delay_ms)
    }
}

impl Default for ExchangeConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            base_url: String::new(),
            ws_url: None,
            assets: vec!["USDT".to_string(), "BTC".to_string(), "ETH".to_string()],
            commission_pct: DEFAULT_COMMISSION_PCT,
            reconnect_delay_ms: 5_000,
            max_reconnects: 10,
        }
    }
}

/// Registry behaviour
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RegistryConfig {
    pub policy: RegistrationPolicy,
    pub max_price_age_ms: u64,
    pub stale_check_interval_ms: u64,
}

impl RegistryConfig {
    pub fn max_price_age(&self) -> Duration {
        Duration::from_millis(self.max_price_age_ms)
    }

    pub fn stale_check_interval(&self) -> Duration {
        Duration::from_millis(self.stale_check_interval_ms)
    }
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            policy: RegistrationPolicy::AutoRegister,
            max_price_age_ms: 30_000,
            stale_check_interval_ms: 5_000,
        }
    }
}

/// Log output settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Filter used when `RUST_LOG` is unset
    pub level: String,
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
        }
    }
}

/// Complete application configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub update_interval_ms: u64,
    pub exchanges: BTreeMap<String, ExchangeConfig>,
    pub spreads: Vec<SpreadPreset>,
    pub registry: RegistryConfig,
    pub logging: LoggingConfig,
}

impl Default for AppConfig {
    fn default() -> Self {
        let mut exchanges = BTreeMap::new();
        exchanges.insert(
            "bybit".to_string(),
            ExchangeConfig::preset(
                true,
                "https://api.bybit.com",
                Some("wss://stream.bybit.com/v5/public"),
            ),
        );
        exchanges.insert(
            "binance".to_string(),
            ExchangeConfig::preset(
                false,
                "https://api.binance.com",
                Some("wss://stream.binance.com:9443/ws"),
            ),
        );
        exchanges.insert(
            "garantex".to_string(),
            ExchangeConfig::preset(false, "https://garantex.io/api/v2", None),
        );
        exchanges.insert(
            "commex".to_string(),
            ExchangeConfig::preset(
                false,
                "https://api.commex.com",
                Some("wss://stream.commex.com/stream"),
            ),
        );

        Self {
            update_interval_ms: 1_000,
            exchanges,
            spreads: default_presets(),
            registry: RegistryConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl AppConfig {
    /// Load `.env`, then the config file named by `RATEWATCH_CONFIG`
    /// (default `ratewatch.toml`, optional) and the process environment.
    pub fn load() -> ConfigResult<Self> {
        dotenvy::dotenv().ok();

        let path = env::var(CONFIG_PATH_VAR)
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from(DEFAULT_CONFIG_FILE));

        Self::from_sources(Some(&path), None)
    }

    /// Build from an optional TOML file and an environment map.
    ///
    /// `env_vars: None` reads the process environment.
    pub fn from_sources(
        file: Option<&Path>,
        env_vars: Option<HashMap<String, String>>,
    ) -> ConfigResult<Self> {
        let defaults = Config::try_from(&AppConfig::default())?;
        let mut builder = Config::builder().add_source(defaults);

        if let Some(path) = file {
            debug!("Reading configuration from {}", path.display());
            builder = builder.add_source(
                File::from(path)
                    .format(FileFormat::Toml)
                    .required(false),
            );
        }

        builder = builder.add_source(
            Environment::with_prefix(ENV_PREFIX)
                .prefix_separator("__")
                .separator("__")
                .try_parsing(true)
                .source(env_vars),
        );

        let cfg: AppConfig = builder.build()?.try_deserialize()?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn validate(&self) -> ConfigResult<()> {
        if self.update_interval_ms == 0 {
            return Err(ConfigError::Invalid(
                "update_interval_ms must be greater than zero".to_string(),
            ));
        }

        if self.registry.stale_check_interval_ms == 0 {
            return Err(ConfigError::Invalid(
                "registry.stale_check_interval_ms must be greater than zero".to_string(),
            ));
        }

        for preset in &self.spreads {
            if !(0.0..=MAX_SPREAD_PCT).contains(&preset.pct) {
                return Err(ConfigError::Invalid(format!(
                    "spread '{}' is {}%, expected 0-{}%",
                    preset.label, preset.pct, MAX_SPREAD_PCT
                )));
            }
        }

        for (name, exchange) in &self.exchanges {
            if !(0.0..=MAX_COMMISSION_PCT).contains(&exchange.commission_pct) {
                return Err(ConfigError::Invalid(format!(
                    "commission for {} is {}%, expected 0-{}%",
                    name, exchange.commission_pct, MAX_COMMISSION_PCT
                )));
            }
        }

        Ok(())
    }

    /// Case-insensitive exchange lookup
    pub fn exchange(&self, name: &str) -> Option<&ExchangeConfig> {
        let key = name.to_lowercase();
        self.exchanges
            .iter()
            .find(|(k, _)| k.to_lowercase() == key)
            .map(|(_, v)| v)
    }

    pub fn enabled_exchanges(&self) -> impl Iterator<Item = (&String, &ExchangeConfig)> {
        self.exchanges.iter().filter(|(_, e)| e.enabled)
    }

    pub fn update_interval(&self) -> Duration {
        Duration::from_millis(self.update_interval_ms)
    }

    /// Presets plus each configured exchange's commission
    pub fn spread_profile(&self) -> SpreadProfile {
        self.exchanges.iter().fold(
            SpreadProfile::new(self.spreads.clone()),
            |profile, (name, exchange)| profile.with_commission(name, exchange.commission_pct),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn env(pairs: &[(&str, &str)]) -> Option<HashMap<String, String>> {
        Some(
            pairs
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
        )
    }

    #[test]
    fn test_defaults() {
        let cfg = AppConfig::from_sources(None, env(&[])).unwrap();
        assert_eq!(cfg, AppConfig::default());
        assert_eq!(cfg.update_interval_ms, 1_000);
        assert!(cfg.exchanges["bybit"].enabled);
        assert!(!cfg.exchanges["binance"].enabled);
        assert!(!cfg.exchanges["garantex"].enabled);
        assert!(!cfg.exchanges["commex"].enabled);
        assert_eq!(cfg.spreads.len(), 3);
        assert_eq!(cfg.registry.policy, RegistrationPolicy::AutoRegister);
    }

    #[test]
    fn test_env_overrides() {
        let cfg = AppConfig::from_sources(
            None,
            env(&[
                ("RATEWATCH__UPDATE_INTERVAL_MS", "250"),
                ("RATEWATCH__EXCHANGES__BINANCE__ENABLED", "true"),
                ("RATEWATCH__REGISTRY__POLICY", "strict"),
                ("RATEWATCH__LOGGING__LEVEL", "debug"),
            ]),
        )
        .unwrap();

        assert_eq!(cfg.update_interval(), Duration::from_millis(250));
        assert!(cfg.exchanges["binance"].enabled);
        assert_eq!(cfg.registry.policy, RegistrationPolicy::Strict);
        assert_eq!(cfg.logging.level, "debug");
    }

    #[test]
    fn test_file_layer() {
        let path = std::env::temp_dir().join(format!("ratewatch-test-{}.toml", std::process::id()));
        let mut file = std::fs::File::create(&path).unwrap();
        writeln!(
            file,
            r#"
update_interval_ms = 2000

[exchanges.kraken]
base_url = "https://api.kraken.com"
commission_pct = 0.26
"#
        )
        .unwrap();

        let cfg = AppConfig::from_sources(Some(&path), env(&[])).unwrap();
        std::fs::remove_file(&path).ok();

        assert_eq!(cfg.update_interval_ms, 2_000);
        let kraken = cfg.exchange("Kraken").unwrap();
        assert!(kraken.enabled);
        assert_eq!(kraken.assets, vec!["USDT", "BTC", "ETH"]);
        assert!(cfg.exchanges.contains_key("bybit"));
    }

    #[test]
    fn test_missing_file_is_optional() {
        let cfg = AppConfig::from_sources(
            Some(Path::new("/nonexistent/ratewatch.toml")),
            env(&[]),
        );
        assert!(cfg.is_ok());
    }

    #[test]
    fn test_validation() {
        let mut cfg = AppConfig::default();
        cfg.spreads.push(SpreadPreset::new("wide", 12.0));
        assert!(matches!(cfg.validate(), Err(ConfigError::Invalid(_))));

        let mut cfg = AppConfig::default();
        cfg.exchanges.get_mut("bybit").unwrap().commission_pct = 7.5;
        assert!(matches!(cfg.validate(), Err(ConfigError::Invalid(_))));

        let result = AppConfig::from_sources(None, env(&[("RATEWATCH__UPDATE_INTERVAL_MS", "0")]));
        assert!(matches!(result, Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn test_zero_stale_check_interval_rejected() {
        let result = AppConfig::from_sources(
            None,
            env(&[("RATEWATCH__REGISTRY__STALE_CHECK_INTERVAL_MS", "0")]),
        );
        assert!(matches!(result, Err(ConfigError::Invalid(msg)) if msg.contains("stale_check")));

        let mut cfg = AppConfig::default();
        cfg.registry.stale_check_interval_ms = 1;
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn test_load_reads_file_named_by_env() {
        let path = std::env::temp_dir().join(format!("ratewatch-load-{}.toml", std::process::id()));
        std::fs::write(&path, "update_interval_ms = 4321\n[registry]\npolicy = \"strict\"\n").unwrap();

        std::env::set_var(CONFIG_PATH_VAR, &path);
        let cfg = AppConfig::load();
        std::env::remove_var(CONFIG_PATH_VAR);
        std::fs::remove_file(&path).ok();

        let cfg = cfg.unwrap();
        assert_eq!(cfg.update_interval_ms, 4_321);
        assert_eq!(cfg.registry.policy, RegistrationPolicy::Strict);
    }

    #[test]
    fn test_enabled_exchanges() {
        let binding = AppConfig::default();
        let names: Vec<&String> = binding.enabled_exchanges().map(|(n, _)| n).collect();
        assert_eq!(names, vec!["bybit"]);
    }

    #[test]
    fn test_trading_pairs() {
        let cfg = AppConfig::default();
        assert_eq!(cfg.exchanges["bybit"].trading_pairs(), vec!["BTCUSDT", "ETHUSDT"]);
    }

    #[test]
    fn test_spread_profile_uses_exchange_commission() {
        let mut cfg = AppConfig::default();
        cfg.exchanges.get_mut("garantex").unwrap().commission_pct = 0.2;
        let profile = cfg.spread_profile();
        assert_eq!(profile.commission_for("GARANTEX"), 0.2);
        assert_eq!(profile.commission_for("bybit"), DEFAULT_COMMISSION_PCT);
        assert_eq!(profile.presets, default_presets());
    }
}
