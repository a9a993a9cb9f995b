// Configuration management for the AMPL ladder manager

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use tracing::info;

use crate::core::ladder::Ladder;

pub const ENV_API_KEY: &str = "KUCOIN_API_KEY";
pub const ENV_API_SECRET: &str = "KUCOIN_API_SECRET";
pub const ENV_API_PASSPHRASE: &str = "KUCOIN_API_PASSPHRASE";

/// How the balance snapshot is consumed across fills in one monitoring pass
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BalancePolicy {
    /// Every fill is judged against the single read taken at the start of the pass
    Snapshot,
    /// Each placed sell is deducted from the pass-local snapshot
    Reserve,
}

impl Default for BalancePolicy {
    fn default() -> Self {
        BalancePolicy::Snapshot
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LadderSettings {
    #[serde(default = "default_symbol")]
    pub symbol: String,
    #[serde(default = "default_base_asset")]
    pub base_asset: String,
    #[serde(default = "default_buy_levels")]
    pub buy_levels: Vec<f64>,
    #[serde(default = "default_order_size")]
    pub order_size: f64,
    #[serde(default = "default_markup")]
    pub markup: f64,          // 1.03 = sell 3% above the purchase price
    #[serde(default = "default_price_decimals")]
    pub price_decimals: u32,
    #[serde(default = "default_match_tolerance")]
    pub match_tolerance: f64, // absolute, matching only
    #[serde(default = "default_health_threshold")]
    pub health_threshold: usize,
    #[serde(default = "default_detection_threshold")]
    pub detection_threshold: usize,
    #[serde(default = "default_client_oid_prefix")]
    pub client_oid_prefix: String,
    #[serde(default)]
    pub balance_policy: BalancePolicy,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExchangeKind {
    Paper,
    Kucoin,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExchangeConfig {
    #[serde(default = "default_exchange_kind")]
    pub kind: ExchangeKind,
    #[serde(default = "default_rest_url")]
    pub rest_url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_secret: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_passphrase: Option<String>,
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
    #[serde(default = "default_paper_price")]
    pub paper_price: f64,
    #[serde(default)]
    pub paper_balance: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MonitoringConfig {
    #[serde(default = "default_check_interval")]
    pub check_interval_seconds: u64,
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// Ladder state carried between one-shot commands
    #[serde(default = "default_state_file")]
    pub state_file: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LadderConfig {
    pub ladder: LadderSettings,
    pub exchange: ExchangeConfig,
    #[serde(default)]
    pub monitoring: MonitoringConfig,
}

/// Resolved KuCoin API credentials
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    pub api_key: String,
    pub api_secret: String,
    pub api_passphrase: String,
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("api_key", &mask(&self.api_key))
            .field("api_secret", &"***")
            .field("api_passphrase", &"***")
            .finish()
    }
}

fn mask(value: &str) -> String {
    let visible: String = value.chars().take(4).collect();
    format!("{}***", visible)
}

// Default value functions
fn default_symbol() -> String { "AMPL-USDT".to_string() }
fn default_base_asset() -> String { "AMPL".to_string() }
fn default_buy_levels() -> Vec<f64> { vec![1.16, 1.12, 1.08, 1.04, 1.00, 0.96, 0.92, 0.85] }
fn default_order_size() -> f64 { 10.0 }
fn default_markup() -> f64 { 1.03 }
fn default_price_decimals() -> u32 { 4 }
fn default_match_tolerance() -> f64 { 0.01 }
fn default_health_threshold() -> usize { 6 }
fn default_detection_threshold() -> usize { 3 }
fn default_client_oid_prefix() -> String { "ampl".to_string() }
fn default_exchange_kind() -> ExchangeKind { ExchangeKind::Paper }
fn default_rest_url() -> String { "https://api.kucoin.com".to_string() }
fn default_request_timeout() -> u64 { 10 }
fn default_paper_price() -> f64 { 1.10 }
fn default_check_interval() -> u64 { 30 }
fn default_log_level() -> String { "info".to_string() }
fn default_state_file() -> String { "ladder_state.json".to_string() }

impl Default for LadderSettings {
    fn default() -> Self {
        Self {
            symbol: default_symbol(),
            base_asset: default_base_asset(),
            buy_levels: default_buy_levels(),
            order_size: default_order_size(),
            markup: default_markup(),
            price_decimals: default_price_decimals(),
            match_tolerance: default_match_tolerance(),
            health_threshold: default_health_threshold(),
            detection_threshold: default_detection_threshold(),
            client_oid_prefix: default_client_oid_prefix(),
            balance_policy: BalancePolicy::default(),
        }
    }
}

impl Default for ExchangeConfig {
    fn default() -> Self {
        Self {
            kind: default_exchange_kind(),
            rest_url: default_rest_url(),
            api_key: None,
            api_secret: None,
            api_passphrase: None,
            request_timeout_secs: default_request_timeout(),
            paper_price: default_paper_price(),
            paper_balance: 0.0,
        }
    }
}

impl Default for MonitoringConfig {
    fn default() -> Self {
        Self {
            check_interval_seconds: default_check_interval(),
            log_level: default_log_level(),
            state_file: default_state_file(),
        }
    }
}

impl Default for LadderConfig {
    fn default() -> Self {
        Self {
            ladder: LadderSettings::default(),
            exchange: ExchangeConfig::default(),
            monitoring: MonitoringConfig::default(),
        }
    }
}

impl LadderSettings {
    /// Validate ladder values, including level spacing against the match tolerance
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.symbol.trim().is_empty() {
            return Err(ConfigError::Validation("symbol must not be empty".to_string()));
        }

        if self.base_asset.trim().is_empty() {
            return Err(ConfigError::Validation("base_asset must not be empty".to_string()));
        }

        Ladder::new(self.buy_levels.clone(), self.match_tolerance)
            .map_err(|e| ConfigError::Validation(e.to_string()))?;

        if !(self.order_size > 0.0) {
            return Err(ConfigError::Validation("order_size must be positive".to_string()));
        }

        if !(self.markup > 1.0) {
            return Err(ConfigError::Validation("markup must be greater than 1.0".to_string()));
        }

        if self.price_decimals > 10 {
            return Err(ConfigError::Validation("price_decimals must be at most 10".to_string()));
        }

        let levels = self.buy_levels.len();
        if self.health_threshold == 0 || self.health_threshold > levels {
            return Err(ConfigError::Validation(format!(
                "health_threshold must be between 1 and {}", levels
            )));
        }

        if self.detection_threshold == 0 || self.detection_threshold > levels {
            return Err(ConfigError::Validation(format!(
                "detection_threshold must be between 1 and {}", levels
            )));
        }

        if self.client_oid_prefix.trim().is_empty() {
            return Err(ConfigError::Validation("client_oid_prefix must not be empty".to_string()));
        }

        Ok(())
    }
}

impl ExchangeConfig {
    /// Resolve credentials, letting environment variables override the file
    pub fn credentials(&self) -> Result<Credentials, ConfigError> {
        let resolve = |env_name: &str, file_value: &Option<String>| -> Result<String, ConfigError> {
            std::env::var(env_name)
                .ok()
                .filter(|v| !v.trim().is_empty())
                .or_else(|| file_value.clone().filter(|v| !v.trim().is_empty()))
                .ok_or_else(|| ConfigError::MissingCredential(env_name.to_string()))
        };

        Ok(Credentials {
            api_key: resolve(ENV_API_KEY, &self.api_key)?,
            api_secret: resolve(ENV_API_SECRET, &self.api_secret)?,
            api_passphrase: resolve(ENV_API_PASSPHRASE, &self.api_passphrase)?,
        })
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.request_timeout_secs == 0 {
            return Err(ConfigError::Validation("request_timeout_secs must be greater than 0".to_string()));
        }

        match self.kind {
            ExchangeKind::Kucoin => {
                if !self.rest_url.starts_with("http") {
                    return Err(ConfigError::Validation(format!("invalid rest_url: {}", self.rest_url)));
                }
                self.credentials()?;
            }
            ExchangeKind::Paper => {
                if !(self.paper_price > 0.0) {
                    return Err(ConfigError::Validation("paper_price must be positive".to_string()));
                }
                if self.paper_balance < 0.0 {
                    return Err(ConfigError::Validation("paper_balance must be non-negative".to_string()));
                }
            }
        }

        Ok(())
    }
}

impl LadderConfig {
    /// Load configuration from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path)
            .map_err(|e| ConfigError::FileRead(e.to_string()))?;

        let config: LadderConfig = toml::from_str(&content)
            .map_err(|e| ConfigError::Parse(e.to_string()))?;

        config.validate()?;
        Ok(config)
    }

    /// Save configuration to a TOML file
    pub fn to_file<P: AsRef<Path>>(&self, path: P) -> Result<(), ConfigError> {
        let content = toml::to_string_pretty(self)
            .map_err(|e| ConfigError::Serialize(e.to_string()))?;

        fs::write(path, content)
            .map_err(|e| ConfigError::FileWrite(e.to_string()))?;

        Ok(())
    }

    /// Load configuration from file, or create default if file doesn't exist
    pub fn load_or_create<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        if path.as_ref().exists() {
            Self::from_file(path)
        } else {
            let config = Self::default();
            config.to_file(&path)?;
            info!("📁 Created default config file: {}", path.as_ref().display());
            Ok(config)
        }
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.ladder.validate()?;
        self.exchange.validate()?;

        if self.monitoring.check_interval_seconds == 0 {
            return Err(ConfigError::Validation("check_interval_seconds must be greater than 0".to_string()));
        }

        if self.monitoring.state_file.trim().is_empty() {
            return Err(ConfigError::Validation("state_file must not be empty".to_string()));
        }

        Ok(())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    FileRead(String),

    #[error("Failed to write config file: {0}")]
    FileWrite(String),

    #[error("Failed to parse config: {0}")]
    Parse(String),

    #[error("Failed to serialize config: {0}")]
    Serialize(String),

    #[error("Configuration validation error: {0}")]
    Validation(String),

    #[error("Missing credential: set {0} or the matching [exchange] field")]
    MissingCredential(String),
}
