//! JSON bodies exchanged with the payment service.

use chrono::{DateTime, Utc};
use cryptopay_core::{PaymentStatus, SupportedCurrency};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreatePaymentRequest {
    /// Crypto units, already converted from the fiat amount.
    pub amount: f64,
    pub currency: SupportedCurrency,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentIntent {
    pub id: String,
    pub address: String,
    pub currency: SupportedCurrency,
    pub amount: f64,
    #[serde(default)]
    pub expires_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckPaymentRequest {
    pub address: String,
    pub currency: SupportedCurrency,
    pub expected_amount: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RemoteState {
    Pending,
    Completed,
    Expired,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckPaymentResponse {
    pub is_received: bool,
    #[serde(default)]
    pub status: Option<RemoteState>,
    #[serde(default)]
    pub tx_hash: Option<String>,
    #[serde(default)]
    pub confirmations: Option<u32>,
}

impl From<CheckPaymentResponse> for PaymentStatus {
    fn from(resp: CheckPaymentResponse) -> Self {
        PaymentStatus::new(resp.is_received, resp.tx_hash, resp.confirmations)
    }
}
