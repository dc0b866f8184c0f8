//! Configuration Loader
//!
//! Loads and validates configuration from TOML files matching config.toml structure.
//! Only `[solana]` is required; every other section falls back to defaults.

use serde::Deserialize;
use solana_sdk::pubkey::Pubkey;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

use crate::adapters::pump_fun::portal::DEFAULT_API_URL;
use crate::adapters::pump_fun::stream::{DEFAULT_WS_URL, MAX_MESSAGE_SIZE};
use crate::application::fees::FeeSettings;
use crate::application::liquidation::{LiquidationConfig, USDC_MINT};
use crate::application::pipeline::PipelineSettings;
use crate::application::subscription::SessionConfig;
use crate::domain::curve::{CurveParams, LAMPORTS_PER_SOL, PUMP_TOKEN_DECIMALS, SOL_DECIMALS};
use crate::domain::retry::RetryPolicy;
use crate::domain::trade::{TradeMode, TradePool};

/// Main configuration structure matching config.toml
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub solana: SolanaSection,
    #[serde(default)]
    pub pump_fun: PumpFunSection,
    #[serde(default)]
    pub trading: TradingSection,
    #[serde(default)]
    pub fees: FeeSettings,
    #[serde(default)]
    pub pipeline: PipelineSection,
    #[serde(default)]
    pub stream: StreamSection,
    #[serde(default)]
    pub liquidation: LiquidationSection,
    #[serde(default)]
    pub logging: LoggingSection,
}

/// Solana RPC configuration section
#[derive(Debug, Clone, Deserialize)]
pub struct SolanaSection {
    /// RPC endpoint (use private RPC for production)
    pub rpc_url: String,
    /// Wallet keypair path (NEVER commit this file!)
    pub keypair_path: String,
    /// Per-request RPC timeout in seconds
    #[serde(default = "default_rpc_timeout_secs")]
    pub request_timeout_secs: u64,
}

fn default_rpc_timeout_secs() -> u64 {
    30
}

impl SolanaSection {
    /// Get RPC URL with environment variable override
    /// Checks SOLANA_RPC_URL env var first, falls back to config value
    pub fn get_rpc_url(&self) -> String {
        std::env::var("SOLANA_RPC_URL").unwrap_or_else(|_| self.rpc_url.clone())
    }

    /// Get keypair path with environment variable override and `~` expanded
    /// Checks SOLANA_KEYPAIR_PATH env var first, falls back to config value
    pub fn get_keypair_path(&self) -> String {
        let raw = std::env::var("SOLANA_KEYPAIR_PATH").unwrap_or_else(|_| self.keypair_path.clone());
        shellexpand::tilde(&raw).into_owned()
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

/// PumpPortal endpoints and bonding curve constants
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PumpFunSection {
    /// PumpPortal HTTP API base URL
    pub api_url: String,
    /// PumpPortal data socket URL
    pub ws_url: String,
    /// Required for lightning trades; also sent with socket connections
    pub api_key: Option<String>,
    /// Override of the pump.fun program id
    pub program_id: Option<String>,
    pub token_decimals: u8,
    /// Real SOL reserves at which curves migrate
    pub migration_threshold_sol: f64,
    /// SOL/USD and fallback token price API
    pub price_api_url: String,
}

impl Default for PumpFunSection {
    fn default() -> Self {
        Self {
            api_url: DEFAULT_API_URL.to_string(),
            ws_url: DEFAULT_WS_URL.to_string(),
            api_key: None,
            program_id: None,
            token_decimals: PUMP_TOKEN_DECIMALS,
            migration_threshold_sol: 85.0,
            price_api_url: crate::adapters::market_data::JUPITER_PRICE_API.to_string(),
        }
    }
}

impl PumpFunSection {
    /// Get API key with environment variable fallback
    /// Checks PUMPPORTAL_API_KEY env var if config value is empty/None
    pub fn get_api_key(&self) -> Option<String> {
        if let Some(ref key) = self.api_key {
            if !key.trim().is_empty() {
                return Some(key.clone());
            }
        }
        std::env::var("PUMPPORTAL_API_KEY")
            .ok()
            .filter(|k| !k.trim().is_empty())
    }

    pub fn program_id(&self) -> Result<Option<Pubkey>, ConfigError> {
        self.program_id
            .as_deref()
            .map(|id| {
                Pubkey::from_str(id.trim())
                    .map_err(|_| ConfigError::ValidationError(format!("invalid program_id: {}", id)))
            })
            .transpose()
    }

    pub fn curve_params(&self) -> CurveParams {
        CurveParams {
            token_decimals: self.token_decimals,
            sol_decimals: SOL_DECIMALS,
            migration_threshold_lamports: (self.migration_threshold_sol * LAMPORTS_PER_SOL as f64).round()
                as u64,
        }
    }
}

/// Trade defaults
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct TradingSection {
    pub mode: TradeMode,
    /// Default slippage tolerance in percent
    pub slippage_pct: f64,
    pub pool: TradePool,
    /// Lightning only: skip preflight simulation
    pub skip_preflight: bool,
    /// Lightning only: send through Jito exclusively
    pub jito_only: bool,
}

impl Default for TradingSection {
    fn default() -> Self {
        Self {
            mode: TradeMode::Local,
            slippage_pct: 10.0,
            pool: TradePool::Pump,
            skip_preflight: true,
            jito_only: false,
        }
    }
}

/// Retry and confirmation settings
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PipelineSection {
    /// Total submission attempts including the first
    pub max_attempts: u32,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
    pub jitter: bool,
    pub confirm_timeout_secs: u64,
    pub poll_interval_ms: u64,
}

impl Default for PipelineSection {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay_ms: 500,
            max_delay_ms: 8_000,
            jitter: true,
            confirm_timeout_secs: 60,
            poll_interval_ms: 2_000,
        }
    }
}

impl PipelineSection {
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.max_attempts,
            base_delay: Duration::from_millis(self.base_delay_ms),
            max_delay: Duration::from_millis(self.max_delay_ms),
            jitter: self.jitter,
        }
    }
}

/// Data socket settings
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct StreamSection {
    pub ack_timeout_secs: u64,
    /// Ping interval, 0 disables keepalive
    pub keepalive_secs: u64,
    pub max_message_size: usize,
    pub connect_timeout_secs: u64,
}

impl Default for StreamSection {
    fn default() -> Self {
        Self {
            ack_timeout_secs: 5,
            keepalive_secs: 30,
            max_message_size: MAX_MESSAGE_SIZE,
            connect_timeout_secs: 10,
        }
    }
}

/// Liquidation settings
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LiquidationSection {
    /// Mints never sold
    pub exclusions: Vec<String>,
    pub slippage_pct: f64,
    pub pool: TradePool,
}

impl Default for LiquidationSection {
    fn default() -> Self {
        Self {
            exclusions: vec![USDC_MINT.to_string()],
            slippage_pct: 25.0,
            pool: TradePool::Auto,
        }
    }
}

/// Logging configuration section
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LoggingSection {
    /// Log level: "trace", "debug", "info", "warn", "error"
    pub level: String,
}

impl Default for LoggingSection {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

/// Configuration errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    IoError(#[from] std::io::Error),
    #[error("Failed to parse TOML: {0}")]
    ParseError(#[from] toml::de::Error),
    #[error("Validation failed: {0}")]
    ValidationError(String),
}

/// Load configuration from a TOML file
pub fn load_config<P: AsRef<Path>>(path: P) -> Result<Config, ConfigError> {
    let content = std::fs::read_to_string(path)?;
    let config: Config = toml::from_str(&content)?;
    config.validate()?;
    Ok(config)
}

fn check_pct(name: &str, value: f64) -> Result<(), ConfigError> {
    if !(0.0..=100.0).contains(&value) || value.is_nan() {
        return Err(ConfigError::ValidationError(format!(
            "{} must be 0-100, got {}",
            name, value
        )));
    }
    Ok(())
}

impl Config {
    /// Validate all configuration parameters
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.solana.rpc_url.is_empty() {
            return Err(ConfigError::ValidationError("rpc_url cannot be empty".to_string()));
        }

        if self.solana.keypair_path.is_empty() {
            return Err(ConfigError::ValidationError(
                "keypair_path cannot be empty".to_string(),
            ));
        }

        if self.pump_fun.api_url.is_empty() || self.pump_fun.ws_url.is_empty() {
            return Err(ConfigError::ValidationError(
                "pump_fun api_url and ws_url cannot be empty".to_string(),
            ));
        }

        if self.pump_fun.migration_threshold_sol <= 0.0 {
            return Err(ConfigError::ValidationError(format!(
                "migration_threshold_sol must be > 0, got {}",
                self.pump_fun.migration_threshold_sol
            )));
        }

        self.pump_fun.program_id()?;

        check_pct("trading.slippage_pct", self.trading.slippage_pct)?;
        check_pct("liquidation.slippage_pct", self.liquidation.slippage_pct)?;

        if self.fees.percentile > 100 {
            return Err(ConfigError::ValidationError(format!(
                "fees.percentile must be 0-100, got {}",
                self.fees.percentile
            )));
        }

        if self.fees.cu_limit == 0 {
            return Err(ConfigError::ValidationError("fees.cu_limit must be > 0".to_string()));
        }

        if self.pipeline.max_attempts == 0 {
            return Err(ConfigError::ValidationError(
                "pipeline.max_attempts must be > 0".to_string(),
            ));
        }

        if self.pipeline.poll_interval_ms == 0 || self.pipeline.confirm_timeout_secs == 0 {
            return Err(ConfigError::ValidationError(
                "pipeline poll interval and confirm timeout must be > 0".to_string(),
            ));
        }

        if self.stream.max_message_size == 0 {
            return Err(ConfigError::ValidationError(
                "stream.max_message_size must be > 0".to_string(),
            ));
        }

        Ok(())
    }

    pub fn pipeline_settings(&self) -> PipelineSettings {
        PipelineSettings {
            mode: self.trading.mode,
            retry: self.pipeline.retry_policy(),
            confirm_timeout: Duration::from_secs(self.pipeline.confirm_timeout_secs),
            poll_interval: Duration::from_millis(self.pipeline.poll_interval_ms),
            token_decimals: self.pump_fun.token_decimals,
        }
    }

    /// Session settings; `url` already carries the API key if one is configured
    pub fn session_config(&self, url: String, duration: Option<Duration>) -> SessionConfig {
        SessionConfig {
            url,
            ack_timeout: Duration::from_secs(self.stream.ack_timeout_secs),
            duration,
            keepalive: (self.stream.keepalive_secs > 0)
                .then(|| Duration::from_secs(self.stream.keepalive_secs)),
            max_message_size: self.stream.max_message_size,
        }
    }

    pub fn liquidation_config(&self, dry_run: bool) -> LiquidationConfig {
        LiquidationConfig {
            exclusions: self.liquidation.exclusions.clone(),
            slippage_pct: self.liquidation.slippage_pct,
            pool: self.liquidation.pool,
            dry_run,
        }
    }

    /// Starter config written by `init-config`
    pub fn example_toml() -> &'static str {
        EXAMPLE_CONFIG
    }
}

const EXAMPLE_CONFIG: &str = r#"# pump-desk configuration

[solana]
# Use a private RPC for trading; SOLANA_RPC_URL overrides this
rpc_url = "https://api.mainnet-beta.solana.com"
# NEVER commit this file; SOLANA_KEYPAIR_PATH overrides this
keypair_path = "~/.config/solana/id.json"
request_timeout_secs = 30

[pump_fun]
api_url = "https://pumpportal.fun/api"
ws_url = "wss://pumpportal.fun/api/data"
# Needed for lightning trades; PUMPPORTAL_API_KEY works too
# api_key = ""
token_decimals = 6
migration_threshold_sol = 85.0
price_api_url = "https://lite-api.jup.ag/price/v3"

[trading]
# "local" signs with your keypair, "lightning" lets PumpPortal execute
mode = "local"
slippage_pct = 10.0
pool = "pump"
skip_preflight = true
jito_only = false

[fees]
cu_limit = 200000
static_cu_price_micro_lamports = 100000
percentile = 75
max_cu_price_micro_lamports = 5000000
use_network = true

[pipeline]
max_attempts = 3
base_delay_ms = 500
max_delay_ms = 8000
jitter = true
confirm_timeout_secs = 60
poll_interval_ms = 2000

[stream]
ack_timeout_secs = 5
keepalive_secs = 30
max_message_size = 1048576
connect_timeout_secs = 10

[liquidation]
exclusions = ["EPjFWdd5AufqSSqeM2qN1xzybapC8G4wEGGkZwyTDt1v"]
slippage_pct = 25.0
pool = "auto"

[logging]
level = "info"
"#;

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn write_config(content: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(content.as_bytes()).unwrap();
        file
    }

    const MINIMAL: &str = r#"
[solana]
rpc_url = "https://api.mainnet-beta.solana.com"
keypair_path = "~/.config/solana/id.json"
"#;

    #[test]
    fn test_example_config_loads() {
        let file = write_config(Config::example_toml());
        let config = load_config(file.path()).unwrap();

        assert_eq!(config.trading.mode, TradeMode::Local);
        assert_eq!(config.trading.pool, TradePool::Pump);
        assert_eq!(config.liquidation.pool, TradePool::Auto);
        assert_eq!(config.fees.percentile, 75);
        assert_eq!(config.pipeline.max_attempts, 3);
        assert_eq!(config.liquidation.exclusions, vec![USDC_MINT.to_string()]);
    }

    #[test]
    fn test_minimal_config_uses_defaults() {
        let file = write_config(MINIMAL);
        let config = load_config(file.path()).unwrap();

        assert_eq!(config.pump_fun.ws_url, DEFAULT_WS_URL);
        assert_eq!(config.fees, FeeSettings::default());
        assert_eq!(config.logging.level, "info");
        assert_eq!(
            config.pump_fun.curve_params().migration_threshold_lamports,
            85 * LAMPORTS_PER_SOL
        );

        let settings = config.pipeline_settings();
        assert_eq!(settings.confirm_timeout, Duration::from_secs(60));
        assert_eq!(settings.retry.max_attempts, 3);
    }

    #[test]
    fn test_partial_section_keeps_other_defaults() {
        let file = write_config(&format!("{}\n[fees]\npercentile = 90\n", MINIMAL));
        let config = load_config(file.path()).unwrap();
        assert_eq!(config.fees.percentile, 90);
        assert_eq!(config.fees.cu_limit, 200_000);
    }

    #[test]
    fn test_load_missing_file() {
        let result = load_config("/nonexistent/path/config.toml");
        assert!(matches!(result.unwrap_err(), ConfigError::IoError(_)));
    }

    #[test]
    fn test_missing_solana_section() {
        let file = write_config("[trading]\nslippage_pct = 5.0\n");
        assert!(matches!(
            load_config(file.path()).unwrap_err(),
            ConfigError::ParseError(_)
        ));
    }

    #[test]
    fn test_invalid_slippage() {
        let file = write_config(&format!("{}\n[trading]\nslippage_pct = 150.0\n", MINIMAL));
        assert!(matches!(
            load_config(file.path()).unwrap_err(),
            ConfigError::ValidationError(_)
        ));
    }

    #[test]
    fn test_invalid_percentile() {
        let file = write_config(&format!("{}\n[fees]\npercentile = 101\n", MINIMAL));
        assert!(matches!(
            load_config(file.path()).unwrap_err(),
            ConfigError::ValidationError(_)
        ));
    }

    #[test]
    fn test_invalid_program_id() {
        let file = write_config(&format!("{}\n[pump_fun]\nprogram_id = \"not-a-key\"\n", MINIMAL));
        assert!(matches!(
            load_config(file.path()).unwrap_err(),
            ConfigError::ValidationError(_)
        ));
    }

    #[test]
    fn test_lightning_mode_parses() {
        let file = write_config(&format!("{}\n[trading]\nmode = \"lightning\"\n", MINIMAL));
        let config = load_config(file.path()).unwrap();
        assert_eq!(config.pipeline_settings().mode, TradeMode::Lightning);
    }

    #[test]
    fn test_keepalive_zero_disables() {
        let file = write_config(&format!("{}\n[stream]\nkeepalive_secs = 0\n", MINIMAL));
        let config = load_config(file.path()).unwrap();
        let session = config.session_config("wss://x".into(), None);
        assert!(session.keepalive.is_none());
        assert_eq!(session.ack_timeout, Duration::from_secs(5));
    }

    #[test]
    fn test_keypair_path_expands_tilde() {
        let file = write_config(MINIMAL);
        let config = load_config(file.path()).unwrap();
        if std::env::var("SOLANA_KEYPAIR_PATH").is_err() && std::env::var("HOME").is_ok() {
            let path = config.solana.get_keypair_path();
            assert!(!path.starts_with('~'));
            assert!(path.ends_with(".config/solana/id.json"));
        }
    }
}
