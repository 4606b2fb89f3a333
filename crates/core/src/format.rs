use crate::currency::SupportedCurrency;

/// Amount as shown to the payer, e.g. `0.0333433333 ETH`.
pub fn format_crypto_amount(amount: f64, currency: SupportedCurrency) -> String {
    format!("{:.10} {}", amount, currency.symbol())
}
