use super::{
    CheckPaymentRequest, CheckPaymentResponse, CreatePaymentRequest, PaymentGateway, PaymentIntent,
    RemoteState,
};
use async_trait::async_trait;
use chrono::Utc;
use cryptopay_core::{PaymentError, PaymentResult, SupportedCurrency, PAYMENT_WINDOW_MINUTES};
use rand::{distributions::Alphanumeric, Rng};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use tokio::time::{sleep, Duration};

/// In-process payment service for demos and tests.
///
/// Issues random addresses, and by default never reports a payment. Use
/// [`MockGateway::confirm_after`] or queue explicit check results to drive a
/// session forward.
#[derive(Default)]
pub struct MockGateway {
    state: Mutex<MockState>,
}

#[derive(Default)]
struct MockState {
    latency: Duration,
    expires_in_minutes: Option<i64>,
    create_failure: Option<PaymentError>,
    confirm_after: Option<usize>,
    scripted_checks: VecDeque<PaymentResult<CheckPaymentResponse>>,
    creates: Vec<CreatePaymentRequest>,
    checks: Vec<CheckPaymentRequest>,
}

impl MockGateway {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    fn state(&self) -> std::sync::MutexGuard<'_, MockState> {
        // a panicking test thread must not hide the recorded calls
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Simulated network latency for every call.
    pub fn set_latency(&self, latency: Duration) {
        self.state().latency = latency;
    }

    pub fn set_expires_in_minutes(&self, minutes: i64) {
        self.state().expires_in_minutes = Some(minutes);
    }

    /// Every following `create_payment` fails with `err`.
    pub fn fail_create(&self, err: PaymentError) {
        self.state().create_failure = Some(err);
    }

    /// Report the payment as received from the `checks`-th check onwards.
    pub fn confirm_after(&self, checks: usize) {
        self.state().confirm_after = Some(checks);
    }

    /// Queue one check result, consumed before the default behaviour applies.
    pub fn push_check(&self, result: PaymentResult<CheckPaymentResponse>) {
        self.state().scripted_checks.push_back(result);
    }

    pub fn create_calls(&self) -> usize {
        self.state().creates.len()
    }

    pub fn check_calls(&self) -> usize {
        self.state().checks.len()
    }

    pub fn check_requests(&self) -> Vec<CheckPaymentRequest> {
        self.state().checks.clone()
    }

    pub fn create_requests(&self) -> Vec<CreatePaymentRequest> {
        self.state().creates.clone()
    }

    fn random_address(currency: SupportedCurrency) -> String {
        let mut rng = rand::thread_rng();
        match currency {
            SupportedCurrency::Btc => {
                let tail: String = (&mut rng)
                    .sample_iter(&Alphanumeric)
                    .take(38)
                    .map(|b| char::from(b).to_ascii_lowercase())
                    .collect();
                format!("bc1q{}", tail)
            }
            SupportedCurrency::Eth | SupportedCurrency::Usdc => {
                let bytes: [u8; 20] = rng.gen();
                format!("0x{}", hex::encode(bytes))
            }
        }
    }

    fn random_tx_hash() -> String {
        let bytes: [u8; 32] = rand::thread_rng().gen();
        format!("0x{}", hex::encode(bytes))
    }
}

#[async_trait]
impl PaymentGateway for MockGateway {
    async fn create_payment(&self, req: &CreatePaymentRequest) -> PaymentResult<PaymentIntent> {
        let (latency, failure, expires_in) = {
            let mut state = self.state();
            state.creates.push(req.clone());
            (
                state.latency,
                state.create_failure.clone(),
                state.expires_in_minutes.unwrap_or(PAYMENT_WINDOW_MINUTES),
            )
        };
        if !latency.is_zero() {
            sleep(latency).await;
        }
        if let Some(err) = failure {
            return Err(err);
        }

        Ok(PaymentIntent {
            id: uuid::Uuid::new_v4().to_string(),
            address: Self::random_address(req.currency),
            currency: req.currency,
            amount: req.amount,
            expires_at: Some(Utc::now() + chrono::Duration::minutes(expires_in)),
        })
    }

    async fn check_payment(&self, req: &CheckPaymentRequest) -> PaymentResult<CheckPaymentResponse> {
        let (latency, scripted, confirmed) = {
            let mut state = self.state();
            state.checks.push(req.clone());
            let confirmed = state
                .confirm_after
                .map(|n| state.checks.len() >= n)
                .unwrap_or(false);
            (state.latency, state.scripted_checks.pop_front(), confirmed)
        };
        if !latency.is_zero() {
            sleep(latency).await;
        }
        if let Some(result) = scripted {
            return result;
        }

        if confirmed {
            Ok(CheckPaymentResponse {
                is_received: true,
                status: Some(RemoteState::Completed),
                tx_hash: Some(Self::random_tx_hash()),
                confirmations: Some(1),
            })
        } else {
            Ok(CheckPaymentResponse {
                is_received: false,
                status: Some(RemoteState::Pending),
                tx_hash: None,
                confirmations: Some(0),
            })
        }
    }
}
