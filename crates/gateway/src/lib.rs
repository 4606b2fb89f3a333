use async_trait::async_trait;
use cryptopay_core::PaymentResult;

pub mod http;
pub mod mock;
pub mod types;

pub use types::{
    CheckPaymentRequest, CheckPaymentResponse, CreatePaymentRequest, PaymentIntent, RemoteState,
};

/// Backend payment service: issues deposit addresses and reports confirmations.
#[async_trait]
pub trait PaymentGateway: Send + Sync {
    async fn create_payment(&self, req: &CreatePaymentRequest) -> PaymentResult<PaymentIntent>;
    async fn check_payment(&self, req: &CheckPaymentRequest) -> PaymentResult<CheckPaymentResponse>;
}
