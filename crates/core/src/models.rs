use crate::currency::SupportedCurrency;
use crate::error::PaymentError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// Length of the payment window when the backend does not report one.
pub const PAYMENT_WINDOW_MINUTES: i64 = 30;

/// Address issued by the payment service. Address and expiry only ever
/// travel together.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Deposit {
    pub session_id: String,
    pub address: String,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

/// The one in-progress payment attempt of a widget.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PaymentSession {
    pub fiat_amount: f64,
    pub selected_currency: Option<SupportedCurrency>,
    pub converted_amount: Option<f64>,
    pub deposit: Option<Deposit>,
    /// Set once the backend call for the current selection has been made.
    pub created: bool,
}

impl PaymentSession {
    pub fn new(fiat_amount: f64) -> Self {
        Self {
            fiat_amount,
            selected_currency: None,
            converted_amount: None,
            deposit: None,
            created: false,
        }
    }

    pub fn session_id(&self) -> Option<&str> {
        self.deposit.as_ref().map(|d| d.session_id.as_str())
    }

    pub fn address(&self) -> Option<&str> {
        self.deposit.as_ref().map(|d| d.address.as_str())
    }

    pub fn expires_at(&self) -> Option<DateTime<Utc>> {
        self.deposit.as_ref().map(|d| d.expires_at)
    }

    /// Back to empty; the fiat amount belongs to the widget and survives.
    pub fn reset(&mut self) {
        *self = Self::new(self.fiat_amount);
    }
}

/// Confirmation state of the deposit address as last reported by the backend.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentStatus {
    is_received: bool,
    tx_hash: Option<String>,
    confirmations: Option<u32>,
}

impl PaymentStatus {
    pub fn not_received() -> Self {
        Self::default()
    }

    /// A transaction hash on a not-received status is dropped.
    pub fn new(is_received: bool, tx_hash: Option<String>, confirmations: Option<u32>) -> Self {
        Self {
            is_received,
            tx_hash: tx_hash.filter(|_| is_received),
            confirmations,
        }
    }

    pub fn is_received(&self) -> bool {
        self.is_received
    }

    pub fn tx_hash(&self) -> Option<&str> {
        self.tx_hash.as_deref()
    }

    pub fn confirmations(&self) -> Option<u32> {
        self.confirmations
    }

    /// Received with a transaction hash: the session can complete.
    pub fn is_confirmed(&self) -> bool {
        self.is_received && self.tx_hash.is_some()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionPhase {
    Idle,
    PriceResolving,
    AddressRequesting,
    Active,
    Completed,
    Expired,
    Failed,
}

impl SessionPhase {
    pub fn as_str(self) -> &'static str {
        match self {
            SessionPhase::Idle => "idle",
            SessionPhase::PriceResolving => "price_resolving",
            SessionPhase::AddressRequesting => "address_requesting",
            SessionPhase::Active => "active",
            SessionPhase::Completed => "completed",
            SessionPhase::Expired => "expired",
            SessionPhase::Failed => "failed",
        }
    }
}

/// Remaining time of the payment window.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Countdown {
    pub minutes: u64,
    pub seconds: u64,
}

impl Countdown {
    pub fn from_remaining(remaining: Duration) -> Self {
        let total = remaining.as_secs();
        Self {
            minutes: total / 60,
            seconds: total % 60,
        }
    }
}

impl fmt::Display for Countdown {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:02}:{:02}", self.minutes, self.seconds)
    }
}

/// Notifications emitted by the session manager.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    Pending { session_id: String },
    Countdown(Countdown),
    StatusChanged(PaymentStatus),
    Completed { tx_hash: String },
    Error(PaymentError),
    Closed,
}

impl SessionEvent {
    pub fn kind(&self) -> &'static str {
        match self {
            SessionEvent::Pending { .. } => "pending",
            SessionEvent::Countdown(_) => "countdown",
            SessionEvent::StatusChanged(_) => "status_changed",
            SessionEvent::Completed { .. } => "completed",
            SessionEvent::Error(_) => "error",
            SessionEvent::Closed => "closed",
        }
    }
}

/// Options the embedding application configures the widget with.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WidgetOptions {
    pub fiat_amount: f64,
    #[serde(default = "default_fiat_currency")]
    pub fiat_currency: String,
    #[serde(default = "default_accepted_currencies")]
    pub accepted_currencies: Vec<SupportedCurrency>,
    #[serde(default)]
    pub description: Option<String>,
    /// Overrides the configured payment service base URL.
    #[serde(default)]
    pub api_base_url: Option<String>,
}

fn default_fiat_currency() -> String {
    "USD".to_string()
}

fn default_accepted_currencies() -> Vec<SupportedCurrency> {
    SupportedCurrency::ALL.to_vec()
}

impl WidgetOptions {
    pub fn new(fiat_amount: f64) -> Self {
        Self {
            fiat_amount,
            fiat_currency: default_fiat_currency(),
            accepted_currencies: default_accepted_currencies(),
            description: None,
            api_base_url: None,
        }
    }

    pub fn accepts(&self, currency: SupportedCurrency) -> bool {
        self.accepted_currencies.contains(&currency)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn not_received_status_never_carries_hash() {
        let status = PaymentStatus::new(false, Some("0xdead".into()), Some(0));
        assert!(!status.is_received());
        assert_eq!(status.tx_hash(), None);
        assert_eq!(status.confirmations(), Some(0));
    }

    #[test]
    fn confirmed_requires_hash() {
        assert!(!PaymentStatus::new(true, None, Some(1)).is_confirmed());
        assert!(PaymentStatus::new(true, Some("0xdead".into()), None).is_confirmed());
    }

    #[test]
    fn reset_keeps_fiat_amount_only() {
        let now = Utc::now();
        let mut session = PaymentSession::new(99.99);
        session.selected_currency = Some(SupportedCurrency::Eth);
        session.converted_amount = Some(0.033);
        session.created = true;
        session.deposit = Some(Deposit {
            session_id: "s1".into(),
            address: "0xabc".into(),
            created_at: now,
            expires_at: now,
        });

        session.reset();
        assert_eq!(session, PaymentSession::new(99.99));
        assert_eq!(session.address(), None);
        assert_eq!(session.expires_at(), None);
    }

    #[test]
    fn countdown_renders_minutes_and_seconds() {
        let c = Countdown::from_remaining(Duration::from_secs(29 * 60 + 5));
        assert_eq!(c, Countdown { minutes: 29, seconds: 5 });
        assert_eq!(c.to_string(), "29:05");
        assert_eq!(Countdown::from_remaining(Duration::ZERO).to_string(), "00:00");
    }

    #[test]
    fn options_deserialize_with_defaults() {
        let opts: WidgetOptions = serde_json::from_str(r#"{"fiat_amount": 10.0}"#).unwrap();
        assert_eq!(opts, WidgetOptions::new(10.0));
        assert!(opts.accepts(SupportedCurrency::Usdc));
    }
}
