pub mod currency;
pub mod error;
pub mod format;
pub mod models;
pub mod validation;

pub use currency::{CurrencyProfile, Pricing, SupportedCurrency};
pub use error::{PaymentError, PaymentResult};
pub use format::format_crypto_amount;
pub use models::{
    Countdown, Deposit, PaymentSession, PaymentStatus, SessionEvent, SessionPhase, WidgetOptions,
    PAYMENT_WINDOW_MINUTES,
};
