use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Crypto currencies the widget can collect.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SupportedCurrency {
    #[serde(rename = "ETH")]
    Eth,
    #[serde(rename = "BTC")]
    Btc,
    #[serde(rename = "USDC")]
    Usdc,
}

/// How a currency is priced against the fiat amount.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Pricing {
    /// Fixed 1:1 against USD, no feed lookup.
    Pegged,
    /// Spot price from the feed, keyed by the CoinGecko asset id.
    Spot { coingecko_id: &'static str },
}

/// Per-currency behaviour, looked up from [`PROFILES`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CurrencyProfile {
    pub currency: SupportedCurrency,
    pub symbol: &'static str,
    pub name: &'static str,
    pub pricing: Pricing,
    /// URI scheme used for the QR payload, if the chain has one.
    pub uri_scheme: Option<&'static str>,
}

pub const PROFILES: [CurrencyProfile; 3] = [
    CurrencyProfile {
        currency: SupportedCurrency::Eth,
        symbol: "ETH",
        name: "Ethereum",
        pricing: Pricing::Spot {
            coingecko_id: "ethereum",
        },
        uri_scheme: Some("ethereum"),
    },
    CurrencyProfile {
        currency: SupportedCurrency::Btc,
        symbol: "BTC",
        name: "Bitcoin",
        pricing: Pricing::Spot {
            coingecko_id: "bitcoin",
        },
        uri_scheme: Some("bitcoin"),
    },
    CurrencyProfile {
        currency: SupportedCurrency::Usdc,
        symbol: "USDC",
        name: "USD Coin",
        pricing: Pricing::Pegged,
        uri_scheme: None,
    },
];

impl SupportedCurrency {
    pub const ALL: [SupportedCurrency; 3] = [
        SupportedCurrency::Eth,
        SupportedCurrency::Btc,
        SupportedCurrency::Usdc,
    ];

    pub fn profile(self) -> &'static CurrencyProfile {
        // PROFILES is ordered like the enum discriminants
        &PROFILES[self as usize]
    }

    pub fn symbol(self) -> &'static str {
        self.profile().symbol
    }

    pub fn is_pegged(self) -> bool {
        matches!(self.profile().pricing, Pricing::Pegged)
    }
}

impl CurrencyProfile {
    /// Content for the deposit QR code.
    pub fn payment_uri(&self, address: &str) -> String {
        match self.uri_scheme {
            Some(scheme) => format!("{}:{}", scheme, address),
            None => address.to_string(),
        }
    }
}

impl fmt::Display for SupportedCurrency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.symbol())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unsupported currency: {0}")]
pub struct UnsupportedCurrency(pub String);

impl FromStr for SupportedCurrency {
    type Err = UnsupportedCurrency;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let upper = s.trim().to_ascii_uppercase();
        PROFILES
            .iter()
            .find(|p| p.symbol == upper)
            .map(|p| p.currency)
            .ok_or(UnsupportedCurrency(s.to_string()))
    }
}
