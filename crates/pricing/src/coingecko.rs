use crate::{PriceFeed, PriceFeedError};
use async_trait::async_trait;
use cryptopay_core::{Pricing, SupportedCurrency};
use reqwest::{Client, StatusCode, Url};
use std::collections::HashMap;

pub const DEFAULT_BASE_URL: &str = "https://api.coingecko.com/api/v3";
const API_KEY_HEADER: &str = "x-cg-demo-api-key";

/// CoinGecko-backed price feed.
/// Fetches USD spot prices via `/simple/price`.
pub struct CoinGeckoFeed {
    client: Client,
    base: Url,
    api_key: Option<String>,
}

impl CoinGeckoFeed {
    pub fn new(api_key: Option<String>) -> Result<Self, PriceFeedError> {
        Self::with_base_url(DEFAULT_BASE_URL, api_key, Client::new())
    }

    pub fn with_base_url(
        base_url: &str,
        api_key: Option<String>,
        client: Client,
    ) -> Result<Self, PriceFeedError> {
        let base = Url::parse(&format!("{}/simple/price", base_url.trim_end_matches('/')))
            .map_err(|e| PriceFeedError::Malformed(format!("bad base url {base_url}: {e}")))?;
        Ok(Self {
            client,
            base,
            api_key,
        })
    }

    fn coin_id(currency: SupportedCurrency) -> Result<&'static str, PriceFeedError> {
        match currency.profile().pricing {
            Pricing::Spot { coingecko_id } => Ok(coingecko_id),
            Pricing::Pegged => Err(PriceFeedError::Unsupported(currency)),
        }
    }

    fn request_url(&self, id: &str) -> Url {
        let mut url = self.base.clone();
        url.query_pairs_mut()
            .append_pair("ids", id)
            .append_pair("vs_currencies", "usd");
        url
    }
}

/// Maps a non-success status to a feed error; 429 is the rate limit.
pub(crate) fn status_error(status: StatusCode) -> Option<PriceFeedError> {
    if status == StatusCode::TOO_MANY_REQUESTS {
        Some(PriceFeedError::RateLimited)
    } else if !status.is_success() {
        Some(PriceFeedError::Status(status.as_u16()))
    } else {
        None
    }
}

/// Parse like: { "ethereum": {"usd": 3000.0} }
pub(crate) fn extract_usd(body: &[u8], id: &str) -> Result<f64, PriceFeedError> {
    let parsed: HashMap<String, HashMap<String, f64>> =
        serde_json::from_slice(body).map_err(|e| PriceFeedError::Malformed(e.to_string()))?;
    let rec = parsed
        .get(id)
        .ok_or_else(|| PriceFeedError::Malformed(format!("id missing in response: {id}")))?;
    rec.get("usd")
        .copied()
        .ok_or_else(|| PriceFeedError::Malformed(format!("usd missing for id: {id}")))
}

#[async_trait]
impl PriceFeed for CoinGeckoFeed {
    async fn spot_usd(&self, currency: SupportedCurrency) -> Result<f64, PriceFeedError> {
        let id = Self::coin_id(currency)?;

        let mut req = self
            .client
            .get(self.request_url(id))
            .header("accept", "application/json");
        if let Some(key) = &self.api_key {
            req = req.header(API_KEY_HEADER, key);
        }

        let resp = req
            .send()
            .await
            .map_err(|e| PriceFeedError::Network(e.to_string()))?;

        if let Some(err) = status_error(resp.status()) {
            return Err(err);
        }

        let body = resp
            .bytes()
            .await
            .map_err(|e| PriceFeedError::Network(e.to_string()))?;
        let price = extract_usd(&body, id)?;

        tracing::debug!(%currency, price, "Fetched spot price");
        Ok(price)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builds_simple_price_query() {
        let feed = CoinGeckoFeed::new(None).unwrap();
        let url = feed.request_url("ethereum");
        assert_eq!(
            url.as_str(),
            "https://api.coingecko.com/api/v3/simple/price?ids=ethereum&vs_currencies=usd"
        );
    }

    #[test]
    fn maps_symbols_through_profile_table() {
        assert_eq!(CoinGeckoFeed::coin_id(SupportedCurrency::Btc).unwrap(), "bitcoin");
        assert_eq!(CoinGeckoFeed::coin_id(SupportedCurrency::Eth).unwrap(), "ethereum");
        assert!(CoinGeckoFeed::coin_id(SupportedCurrency::Usdc).is_err());
    }

    #[test]
    fn too_many_requests_is_rate_limited() {
        assert!(matches!(
            status_error(StatusCode::TOO_MANY_REQUESTS),
            Some(PriceFeedError::RateLimited)
        ));
        assert!(matches!(
            status_error(StatusCode::UNAUTHORIZED),
            Some(PriceFeedError::Status(401))
        ));
        assert!(status_error(StatusCode::OK).is_none());
    }

    #[test]
    fn extracts_usd_price() {
        let body = br#"{"ethereum":{"usd":3000.5}}"#;
        assert_eq!(extract_usd(body, "ethereum").unwrap(), 3000.5);
    }

    #[test]
    fn missing_id_or_usd_is_malformed() {
        assert!(matches!(
            extract_usd(br#"{"bitcoin":{"usd":1.0}}"#, "ethereum"),
            Err(PriceFeedError::Malformed(_))
        ));
        assert!(matches!(
            extract_usd(br#"{"bitcoin":{"eur":1.0}}"#, "bitcoin"),
            Err(PriceFeedError::Malformed(_))
        ));
        assert!(matches!(
            extract_usd(b"<html>", "bitcoin"),
            Err(PriceFeedError::Malformed(_))
        ));
    }
}
