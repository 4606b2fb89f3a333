use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    pub config_file: Option<String>,
    pub backend_kind: String,
    pub api_base_url: String,
    pub price_feed_kind: String,
    pub price_api_key_set: bool,
    pub fiat_currency: String,
    pub accepted_currencies: Vec<String>,
    pub journal_path: Option<String>,
}

pub fn show_settings() -> anyhow::Result<()> {
    let cfg = config::load()?;
    let settings = Settings {
        config_file: config::config_path()
            .ok()
            .map(|p| p.display().to_string()),
        backend_kind: cfg.backend.kind.clone(),
        api_base_url: config::api_base_url(None, &cfg),
        price_feed_kind: cfg.price_feed.kind.clone(),
        price_api_key_set: config::price_api_key().is_some(),
        fiat_currency: cfg.widget.fiat_currency.clone(),
        accepted_currencies: cfg
            .widget
            .accepted_currencies
            .iter()
            .map(ToString::to_string)
            .collect(),
        journal_path: cfg.journal.path.map(|p| p.display().to_string()),
    };
    println!("{}", serde_json::to_string_pretty(&settings)?);
    Ok(())
}

/// Point the widget at a payment service and switch to the HTTP backend.
pub fn set_api_url(url: String) -> anyhow::Result<()> {
    if !(url.starts_with("http://") || url.starts_with("https://")) {
        anyhow::bail!("API base URL must be http(s), got {url:?}");
    }
    let mut cfg = config::load().unwrap_or_default();
    cfg.backend.kind = "http".to_string();
    cfg.backend.base_url = Some(url);
    config::store(&cfg)?;
    tracing::info!("Settings updated");
    Ok(())
}

pub fn set_price_key(key: String) -> anyhow::Result<()> {
    if key.is_empty() {
        config::delete_secret(config::PRICE_API_KEY_SECRET)?;
        tracing::info!("Price API key removed from keychain");
    } else {
        config::store_secret(config::PRICE_API_KEY_SECRET, &key)?;
        tracing::info!("Price API key stored in keychain");
    }
    Ok(())
}
