use anyhow::{Context, Result};
use cryptopay_core::SupportedCurrency;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

const APP_NAME: &str = "cryptopay";
const KEYCHAIN_SERVICE: &str = "cryptopay.credentials";

pub const DEFAULT_API_BASE_URL: &str = "http://localhost:3000/api";
pub const API_BASE_URL_ENV: &str = "CRYPTOPAY_API_BASE_URL";
pub const PRICE_API_KEY_ENV: &str = "COINGECKO_API_KEY";
pub const PRICE_API_KEY_SECRET: &str = "coingecko_api_key";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub backend: BackendConfig,
    #[serde(default)]
    pub price_feed: PriceFeedConfig,
    #[serde(default)]
    pub widget: WidgetDefaults,
    #[serde(default)]
    pub journal: JournalConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackendConfig {
    #[serde(default = "default_backend_kind")]
    pub kind: String, // "mock" | "http"
    pub base_url: Option<String>,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            kind: default_backend_kind(),
            base_url: None,
        }
    }
}

fn default_backend_kind() -> String {
    "mock".to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PriceFeedConfig {
    #[serde(default = "default_price_kind")]
    pub kind: String, // "coingecko" | "fixed"
    pub base_url: Option<String>,
}

impl Default for PriceFeedConfig {
    fn default() -> Self {
        Self {
            kind: default_price_kind(),
            base_url: None,
        }
    }
}

fn default_price_kind() -> String {
    "coingecko".to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WidgetDefaults {
    #[serde(default = "default_fiat_currency")]
    pub fiat_currency: String,
    #[serde(default = "default_accepted")]
    pub accepted_currencies: Vec<SupportedCurrency>,
}

impl Default for WidgetDefaults {
    fn default() -> Self {
        Self {
            fiat_currency: default_fiat_currency(),
            accepted_currencies: default_accepted(),
        }
    }
}

fn default_fiat_currency() -> String {
    "USD".to_string()
}

fn default_accepted() -> Vec<SupportedCurrency> {
    SupportedCurrency::ALL.to_vec()
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct JournalConfig {
    /// Session events are appended here as JSON lines when set.
    pub path: Option<PathBuf>,
}

pub fn load() -> Result<AppConfig> {
    let cfg: AppConfig = confy::load(APP_NAME, None).context("Failed to load app config")?;
    Ok(cfg)
}

pub fn store(cfg: &AppConfig) -> Result<()> {
    confy::store(APP_NAME, None, cfg).context("Failed to store app config")?;
    Ok(())
}

/// Location of the config file on this machine.
pub fn config_path() -> Result<PathBuf> {
    confy::get_configuration_file_path(APP_NAME, None).context("Failed to locate app config")
}

/// Base URL of the payment service.
///
/// Precedence: explicit override, then `CRYPTOPAY_API_BASE_URL`, then the
/// stored config, then [`DEFAULT_API_BASE_URL`].
pub fn api_base_url(explicit: Option<&str>, cfg: &AppConfig) -> String {
    resolve_api_base_url(explicit, std::env::var(API_BASE_URL_ENV).ok(), cfg)
}

fn resolve_api_base_url(explicit: Option<&str>, env: Option<String>, cfg: &AppConfig) -> String {
    explicit
        .map(str::to_string)
        .or(env)
        .or_else(|| cfg.backend.base_url.clone())
        .filter(|url| !url.trim().is_empty())
        .unwrap_or_else(|| DEFAULT_API_BASE_URL.to_string())
}

/// Price feed API key from env or keychain. Absent is fine, the feed works
/// keyless at lower rate limits.
pub fn price_api_key() -> Option<String> {
    std::env::var(PRICE_API_KEY_ENV)
        .ok()
        .filter(|k| !k.is_empty())
        .or_else(|| get_secret(PRICE_API_KEY_SECRET).ok())
}

/// Store a secret in the OS keychain
pub fn store_secret(key: &str, value: &str) -> Result<()> {
    let entry = keyring::Entry::new(KEYCHAIN_SERVICE, key)?;
    entry.set_password(value)?;
    Ok(())
}

/// Retrieve a secret from the OS keychain
pub fn get_secret(key: &str) -> Result<String> {
    let entry = keyring::Entry::new(KEYCHAIN_SERVICE, key)?;
    let password = entry.get_password()?;
    Ok(password)
}

/// Delete a secret from the OS keychain
pub fn delete_secret(key: &str) -> Result<()> {
    let entry = keyring::Entry::new(KEYCHAIN_SERVICE, key)?;
    entry.delete_password()?;
    Ok(())
}
