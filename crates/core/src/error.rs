//! Payment error types

use thiserror::Error;

/// Errors surfaced to the embedding application.
///
/// Carries owned strings only so one value can be handed to the error
/// callback, emitted as an event and returned to the caller.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum PaymentError {
    #[error("network error: {0}")]
    Network(String),

    #[error("payment service rejected the request: {status} - {body}")]
    BackendRejected { status: u16, body: String },

    #[error("invalid response from payment service: {0}")]
    InvalidResponse(String),

    #[error("payment service rate limit exceeded")]
    RateLimited,

    #[error("Payment window expired")]
    Expired,

    #[error("a payment session is already in progress")]
    SessionBusy,

    #[error("invalid widget options: {}", .0.join("; "))]
    InvalidOptions(Vec<String>),
}

impl PaymentError {
    /// Whether the next natural poll or timer cycle may clear this error.
    pub fn is_transient(&self) -> bool {
        matches!(self, PaymentError::Network(_) | PaymentError::RateLimited)
            || matches!(self, PaymentError::BackendRejected { status, .. } if *status >= 500)
    }
}

pub type PaymentResult<T> = Result<T, PaymentError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn expired_message_matches_widget_text() {
        assert_eq!(PaymentError::Expired.to_string(), "Payment window expired");
    }

    #[test]
    fn server_errors_are_transient_client_errors_are_not() {
        let server = PaymentError::BackendRejected {
            status: 503,
            body: String::new(),
        };
        let client = PaymentError::BackendRejected {
            status: 400,
            body: "bad amount".into(),
        };
        assert!(server.is_transient());
        assert!(!client.is_transient());
        assert!(!PaymentError::Expired.is_transient());
    }

    #[test]
    fn invalid_options_lists_every_problem() {
        let err = PaymentError::InvalidOptions(vec!["a".into(), "b".into()]);
        assert_eq!(err.to_string(), "invalid widget options: a; b");
    }
}
