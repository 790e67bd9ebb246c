//! # Engine Configuration
//!
//! Configuration for one terminal's cart and checkout engine.
//!
//! ## Configuration Sources
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Configuration Priority                               │
//! │                                                                         │
//! │  1. Environment Variables (highest priority)                           │
//! │     TILL_TERMINAL_ID=front-till-2                                      │
//! │     TILL_SERVICE_URL=https://pos.example.com/api/                      │
//! │                                                                         │
//! │  2. TOML Config File                                                   │
//! │     ~/.config/till-pos/engine.toml (Linux)                             │
//! │     ~/Library/Application Support/com.till.pos/engine.toml (macOS)     │
//! │                                                                         │
//! │  3. Default Values (lowest priority)                                   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Configuration File Format
//! ```toml
//! [terminal]
//! id = "front-till-2"
//! name = "Front Till 2"
//!
//! [services]
//! base_url = "https://pos.example.com/api/"
//! pin_timeout_ms = 8000
//! transaction_timeout_ms = 15000
//!
//! [persistence]
//! debounce_ms = 400
//! warning_threshold = 5
//!
//! [discounts]
//! stacking = "additive"   # additive | largest_only
//! cap_percent = 50
//!
//! [currency]
//! symbol = "₱"
//! ```

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;
use tracing::{debug, info, warn};
use url::Url;

use till_core::discount::{StackingMode, StackingPolicy};
use till_core::Money;

use crate::error::{EngineError, EngineResult};

// =============================================================================
// Terminal
// =============================================================================

/// Identity of this till. The cart is shared by everyone using it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TerminalConfig {
    /// Stable key the shared cart is stored under.
    pub id: String,

    #[serde(default = "default_terminal_name")]
    pub name: String,
}

fn default_terminal_name() -> String {
    "POS Terminal".to_string()
}

impl Default for TerminalConfig {
    fn default() -> Self {
        TerminalConfig {
            id: "default-terminal".to_string(),
            name: default_terminal_name(),
        }
    }
}

// =============================================================================
// Services
// =============================================================================

/// Where the backend lives and how long to wait for it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceSettings {
    /// Base URL every endpoint path is appended to.
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Bearer token sent with every request.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_token: Option<String>,

    /// Transport-level timeout for any request (catalog, cart store).
    #[serde(default = "default_request_timeout")]
    pub request_timeout_ms: u64,

    #[serde(default = "default_pin_timeout")]
    pub pin_timeout_ms: u64,

    #[serde(default = "default_transaction_timeout")]
    pub transaction_timeout_ms: u64,

    #[serde(default = "default_stock_timeout")]
    pub stock_timeout_ms: u64,
}

fn default_base_url() -> String {
    "http://localhost:8080/api/".to_string()
}
fn default_request_timeout() -> u64 {
    10_000
}
fn default_pin_timeout() -> u64 {
    8_000
}
fn default_transaction_timeout() -> u64 {
    15_000
}
fn default_stock_timeout() -> u64 {
    10_000
}

impl Default for ServiceSettings {
    fn default() -> Self {
        ServiceSettings {
            base_url: default_base_url(),
            api_token: None,
            request_timeout_ms: default_request_timeout(),
            pin_timeout_ms: default_pin_timeout(),
            transaction_timeout_ms: default_transaction_timeout(),
            stock_timeout_ms: default_stock_timeout(),
        }
    }
}

impl ServiceSettings {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    pub fn pin_timeout(&self) -> Duration {
        Duration::from_millis(self.pin_timeout_ms)
    }

    pub fn transaction_timeout(&self) -> Duration {
        Duration::from_millis(self.transaction_timeout_ms)
    }

    pub fn stock_timeout(&self) -> Duration {
        Duration::from_millis(self.stock_timeout_ms)
    }
}

// =============================================================================
// Persistence
// =============================================================================

/// How the cart is written to the local cache and the remote store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PersistenceSettings {
    /// Quiet period after the last mutation before writing.
    #[serde(default = "default_debounce")]
    pub debounce_ms: u64,

    /// First retry delay for a failed remote write.
    #[serde(default = "default_initial_backoff")]
    pub initial_backoff_ms: u64,

    /// Longest retry delay for a failed remote write.
    #[serde(default = "default_max_backoff")]
    pub max_backoff_secs: u64,

    /// Consecutive remote failures before a PersistenceWarning is raised.
    #[serde(default = "default_warning_threshold")]
    pub warning_threshold: u32,

    /// SQLite file for the local mirror. Defaults to the platform data dir.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cache_path: Option<PathBuf>,
}

fn default_debounce() -> u64 {
    400
}
fn default_initial_backoff() -> u64 {
    500
}
fn default_max_backoff() -> u64 {
    30
}
fn default_warning_threshold() -> u32 {
    5
}

impl Default for PersistenceSettings {
    fn default() -> Self {
        PersistenceSettings {
            debounce_ms: default_debounce(),
            initial_backoff_ms: default_initial_backoff(),
            max_backoff_secs: default_max_backoff(),
            warning_threshold: default_warning_threshold(),
            cache_path: None,
        }
    }
}

impl PersistenceSettings {
    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }

    pub fn initial_backoff(&self) -> Duration {
        Duration::from_millis(self.initial_backoff_ms)
    }

    pub fn max_backoff(&self) -> Duration {
        Duration::from_secs(self.max_backoff_secs)
    }

    /// Configured cache path, else `<data dir>/till.db`, else `./till.db`.
    pub fn resolved_cache_path(&self) -> PathBuf {
        self.cache_path.clone().unwrap_or_else(|| {
            directories::ProjectDirs::from("com", "till", "pos")
                .map(|dirs| dirs.data_dir().join("till.db"))
                .unwrap_or_else(|| PathBuf::from("./till.db"))
        })
    }
}

// =============================================================================
// Discounts
// =============================================================================

/// How several applied discounts combine.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DiscountSettings {
    #[serde(default)]
    pub stacking: StackingMode,

    /// Ceiling on the combined discount, in percent of the subtotal.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cap_percent: Option<u32>,
}

impl DiscountSettings {
    pub fn policy(&self) -> StackingPolicy {
        StackingPolicy {
            mode: self.stacking,
            cap_bps: self.cap_percent.map(|percent| percent.saturating_mul(100)),
        }
    }
}

// =============================================================================
// Currency
// =============================================================================

/// Display settings for amounts.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CurrencySettings {
    #[serde(default = "default_symbol")]
    pub symbol: String,
}

fn default_symbol() -> String {
    "₱".to_string()
}

impl Default for CurrencySettings {
    fn default() -> Self {
        CurrencySettings {
            symbol: default_symbol(),
        }
    }
}

impl CurrencySettings {
    /// Formats an amount for receipts and prompts: `₱1234.50`, `-₱5.00`.
    pub fn format(&self, amount: Money) -> String {
        if amount.is_negative() {
            format!("-{}{}", self.symbol, Money::zero() - amount)
        } else {
            format!("{}{}", self.symbol, amount)
        }
    }
}

// =============================================================================
// Main Engine Configuration
// =============================================================================

/// Complete engine configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EngineConfig {
    #[serde(default)]
    pub terminal: TerminalConfig,

    #[serde(default)]
    pub services: ServiceSettings,

    #[serde(default)]
    pub persistence: PersistenceSettings,

    #[serde(default)]
    pub discounts: DiscountSettings,

    #[serde(default)]
    pub currency: CurrencySettings,
}

impl EngineConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Loads configuration from file, environment, and defaults.
    ///
    /// ## Load Order (later overrides earlier)
    /// 1. Default values
    /// 2. Config file (engine.toml)
    /// 3. Environment variables
    pub fn load(config_path: Option<PathBuf>) -> EngineResult<Self> {
        let mut config = Self::default();

        if let Some(path) = config_path.or_else(Self::default_config_path) {
            if path.exists() {
                info!(?path, "Loading engine config from file");
                let contents = std::fs::read_to_string(&path)?;
                config = toml::from_str(&contents)?;
            } else {
                debug!(?path, "Config file not found, using defaults");
            }
        }

        config.apply_env_overrides();
        config.validate()?;

        Ok(config)
    }

    /// Loads config or returns default if load fails.
    pub fn load_or_default(config_path: Option<PathBuf>) -> Self {
        Self::load(config_path).unwrap_or_else(|e| {
            warn!("Failed to load engine config: {}. Using defaults.", e);
            Self::default()
        })
    }

    /// Saves configuration to file.
    pub fn save(&self, config_path: Option<PathBuf>) -> EngineResult<()> {
        let path = config_path
            .or_else(Self::default_config_path)
            .ok_or_else(|| EngineError::ConfigSaveFailed("No config path available".into()))?;

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| EngineError::ConfigSaveFailed(e.to_string()))?;
        }

        let contents = toml::to_string_pretty(self)?;
        std::fs::write(&path, contents).map_err(|e| EngineError::ConfigSaveFailed(e.to_string()))?;

        info!(?path, "Engine config saved");
        Ok(())
    }

    /// Validates the configuration.
    pub fn validate(&self) -> EngineResult<()> {
        if self.terminal.id.trim().is_empty() {
            return Err(EngineError::InvalidConfig(
                "terminal.id must not be empty".into(),
            ));
        }

        let url = Url::parse(&self.services.base_url)?;
        if url.scheme() != "http" && url.scheme() != "https" {
            return Err(EngineError::InvalidUrl(format!(
                "Service URL must start with http:// or https://, got: {}",
                self.services.base_url
            )));
        }
        if url.cannot_be_a_base() {
            return Err(EngineError::InvalidUrl(format!(
                "Service URL cannot carry a path: {}",
                self.services.base_url
            )));
        }

        let timeouts = [
            ("request_timeout_ms", self.services.request_timeout_ms),
            ("pin_timeout_ms", self.services.pin_timeout_ms),
            ("transaction_timeout_ms", self.services.transaction_timeout_ms),
            ("stock_timeout_ms", self.services.stock_timeout_ms),
        ];
        if let Some((name, _)) = timeouts.iter().find(|(_, ms)| *ms == 0) {
            return Err(EngineError::InvalidConfig(format!(
                "services.{} must be greater than 0",
                name
            )));
        }

        if self.persistence.warning_threshold == 0 {
            return Err(EngineError::InvalidConfig(
                "persistence.warning_threshold must be greater than 0".into(),
            ));
        }

        if self.persistence.initial_backoff_ms == 0 {
            return Err(EngineError::InvalidConfig(
                "persistence.initial_backoff_ms must be greater than 0".into(),
            ));
        }

        if let Some(cap) = self.discounts.cap_percent {
            if cap > 100 {
                return Err(EngineError::InvalidConfig(format!(
                    "discounts.cap_percent must be at most 100, got {}",
                    cap
                )));
            }
        }

        Ok(())
    }

    /// Applies environment variable overrides.
    fn apply_env_overrides(&mut self) {
        if let Ok(id) = std::env::var("TILL_TERMINAL_ID") {
            debug!(terminal = %id, "Overriding terminal ID from environment");
            self.terminal.id = id;
        }

        if let Ok(name) = std::env::var("TILL_TERMINAL_NAME") {
            self.terminal.name = name;
        }

        if let Ok(url) = std::env::var("TILL_SERVICE_URL") {
            debug!(url = %url, "Overriding service URL from environment");
            self.services.base_url = url;
        }

        if let Ok(token) = std::env::var("TILL_API_TOKEN") {
            self.services.api_token = Some(token);
        }

        if let Ok(ms) = std::env::var("TILL_PIN_TIMEOUT_MS") {
            if let Ok(ms) = ms.parse::<u64>() {
                self.services.pin_timeout_ms = ms;
            }
        }

        if let Ok(ms) = std::env::var("TILL_TRANSACTION_TIMEOUT_MS") {
            if let Ok(ms) = ms.parse::<u64>() {
                self.services.transaction_timeout_ms = ms;
            }
        }

        if let Ok(path) = std::env::var("TILL_CACHE_PATH") {
            self.persistence.cache_path = Some(PathBuf::from(path));
        }

        if let Ok(mode) = std::env::var("TILL_DISCOUNT_STACKING") {
            match mode.to_lowercase().as_str() {
                "additive" => self.discounts.stacking = StackingMode::Additive,
                "largest_only" | "largest" => self.discounts.stacking = StackingMode::LargestOnly,
                _ => warn!(mode = %mode, "Unknown discount stacking mode in environment"),
            }
        }
    }

    /// Returns the default config file path.
    pub fn default_config_path() -> Option<PathBuf> {
        directories::ProjectDirs::from("com", "till", "pos")
            .map(|dirs| dirs.config_dir().join("engine.toml"))
    }

    // =========================================================================
    // Convenience Methods
    // =========================================================================

    pub fn terminal_id(&self) -> &str {
        &self.terminal.id
    }

    pub fn stacking_policy(&self) -> StackingPolicy {
        self.discounts.policy()
    }

    pub fn format_currency(&self, amount: Money) -> String {
        self.currency.format(amount)
    }
}
