use super::{
    CheckPaymentRequest, CheckPaymentResponse, CreatePaymentRequest, PaymentGateway, PaymentIntent,
};
use async_trait::async_trait;
use cryptopay_core::{PaymentError, PaymentResult};
use serde::{de::DeserializeOwned, Serialize};
use std::sync::Arc;
use std::time::Duration;

/// Payment service reached over HTTP/JSON.
#[derive(Clone)]
pub struct HttpGateway {
    /// Base URL without trailing slash, e.g. `http://localhost:3000/api`
    pub base_url: String,
    http_client: reqwest::Client,
}

impl HttpGateway {
    pub fn new(base_url: impl Into<String>) -> PaymentResult<Arc<Self>> {
        let http_client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| PaymentError::Network(format!("failed to create HTTP client: {e}")))?;
        Ok(Self::with_client(base_url, http_client))
    }

    pub fn with_client(base_url: impl Into<String>, http_client: reqwest::Client) -> Arc<Self> {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        Arc::new(Self {
            base_url,
            http_client,
        })
    }

    async fn post_json<Req, Resp>(&self, path: &str, payload: &Req) -> PaymentResult<Resp>
    where
        Req: Serialize + Sync,
        Resp: DeserializeOwned,
    {
        let url = format!("{}{}", self.base_url, path);

        let resp = self
            .http_client
            .post(&url)
            .json(payload)
            .send()
            .await
            .map_err(|e| PaymentError::Network(format!("POST {url}: {e}")))?;

        if resp.status() == reqwest::StatusCode::TOO_MANY_REQUESTS {
            tracing::warn!(%url, "Payment service rate limit exceeded");
            return Err(PaymentError::RateLimited);
        }

        if !resp.status().is_success() {
            let status = resp.status().as_u16();
            let body = resp.text().await.unwrap_or_default();
            return Err(PaymentError::BackendRejected { status, body });
        }

        resp.json::<Resp>()
            .await
            .map_err(|e| PaymentError::InvalidResponse(format!("{path}: {e}")))
    }
}

#[async_trait]
impl PaymentGateway for HttpGateway {
    async fn create_payment(&self, req: &CreatePaymentRequest) -> PaymentResult<PaymentIntent> {
        let intent: PaymentIntent = self.post_json("/payment/create", req).await?;

        if intent.address.is_empty() {
            return Err(PaymentError::InvalidResponse(
                "payment service returned an empty address".to_string(),
            ));
        }

        tracing::info!(
            payment_id = %intent.id,
            currency = %intent.currency,
            "Payment created"
        );
        Ok(intent)
    }

    async fn check_payment(&self, req: &CheckPaymentRequest) -> PaymentResult<CheckPaymentResponse> {
        let resp: CheckPaymentResponse = self.post_json("/payment/check", req).await?;

        tracing::debug!(
            address = %req.address,
            is_received = resp.is_received,
            "Polled payment status"
        );
        Ok(resp)
    }
}
