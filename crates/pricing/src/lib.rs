//! Fiat to crypto conversion.

use async_trait::async_trait;
use cryptopay_core::{Pricing, SupportedCurrency};
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;

pub mod coingecko;

pub use coingecko::CoinGeckoFeed;

/// Price used when the feed cannot be reached; the quote then equals the fiat amount.
pub const FALLBACK_PRICE: f64 = 1.0;

#[derive(Debug, Error)]
pub enum PriceFeedError {
    #[error("price feed rate limit exceeded")]
    RateLimited,

    #[error("price feed returned status {0}")]
    Status(u16),

    #[error("price feed request failed: {0}")]
    Network(String),

    #[error("malformed price feed response: {0}")]
    Malformed(String),

    #[error("no price available for {0}")]
    Unsupported(SupportedCurrency),
}

/// Source of USD spot prices.
#[async_trait]
pub trait PriceFeed: Send + Sync {
    async fn spot_usd(&self, currency: SupportedCurrency) -> Result<f64, PriceFeedError>;
}

/// In-memory prices, for offline runs and tests.
#[derive(Debug, Clone, Default)]
pub struct FixedPriceFeed {
    prices: HashMap<SupportedCurrency, f64>,
}

impl FixedPriceFeed {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_price(mut self, currency: SupportedCurrency, usd: f64) -> Self {
        self.prices.insert(currency, usd);
        self
    }
}

#[async_trait]
impl PriceFeed for FixedPriceFeed {
    async fn spot_usd(&self, currency: SupportedCurrency) -> Result<f64, PriceFeedError> {
        self.prices
            .get(&currency)
            .copied()
            .ok_or(PriceFeedError::Unsupported(currency))
    }
}

/// Converts fiat amounts into crypto amounts, never failing.
#[derive(Clone)]
pub struct PriceConverter {
    feed: Arc<dyn PriceFeed>,
}

impl PriceConverter {
    pub fn new(feed: Arc<dyn PriceFeed>) -> Self {
        Self { feed }
    }

    /// USD price of one unit of `currency`, or [`FALLBACK_PRICE`] on any feed failure.
    pub async fn price_per_unit(&self, currency: SupportedCurrency) -> f64 {
        if let Pricing::Pegged = currency.profile().pricing {
            return 1.0;
        }

        match self.feed.spot_usd(currency).await {
            Ok(price) if price.is_finite() && price > 0.0 => price,
            Ok(price) => {
                tracing::warn!(%currency, price, "Price feed returned an unusable price, using fallback");
                FALLBACK_PRICE
            }
            Err(PriceFeedError::RateLimited) => {
                tracing::warn!(%currency, "Price feed rate limit exceeded, using fallback price");
                FALLBACK_PRICE
            }
            Err(e) => {
                tracing::warn!(%currency, error = %e, "Error fetching price, using fallback");
                FALLBACK_PRICE
            }
        }
    }

    pub async fn convert(&self, fiat_amount: f64, currency: SupportedCurrency) -> f64 {
        fiat_amount / self.price_per_unit(currency).await
    }
}
