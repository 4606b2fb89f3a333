use crate::models::WidgetOptions;
use std::collections::HashSet;

pub fn amount_checks(options: &WidgetOptions) -> Result<(), Vec<String>> {
    let mut errs = Vec::new();

    if !options.fiat_amount.is_finite() || options.fiat_amount <= 0.0 {
        errs.push(format!(
            "Fiat amount must be a positive number, got {}",
            options.fiat_amount
        ));
    }

    // ISO 4217 style code
    let code = options.fiat_currency.as_str();
    if code.len() != 3 || !code.chars().all(|c| c.is_ascii_uppercase()) {
        errs.push(format!(
            "Fiat currency must be a 3-letter uppercase code, got {:?}",
            code
        ));
    }

    if errs.is_empty() {
        Ok(())
    } else {
        Err(errs)
    }
}

pub fn currency_checks(options: &WidgetOptions) -> Result<(), Vec<String>> {
    let mut errs = Vec::new();

    if options.accepted_currencies.is_empty() {
        errs.push("At least one accepted currency is required".to_string());
    }

    let mut seen = HashSet::new();
    for currency in &options.accepted_currencies {
        if !seen.insert(*currency) {
            errs.push(format!("Currency {} is listed more than once", currency));
        }
    }

    if errs.is_empty() {
        Ok(())
    } else {
        Err(errs)
    }
}

pub fn api_url_check(options: &WidgetOptions) -> Result<(), String> {
    match options.api_base_url.as_deref() {
        Some(url) if !(url.starts_with("http://") || url.starts_with("https://")) => {
            Err(format!("API base URL must be http(s), got {:?}", url))
        }
        _ => Ok(()),
    }
}
