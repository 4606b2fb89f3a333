mod rules;

use crate::models::WidgetOptions;

/// Check widget options, collecting every problem rather than stopping at the first.
pub fn validate(options: &WidgetOptions) -> Result<(), Vec<String>> {
    let mut errs = Vec::new();
    if let Err(mut re) = rules::amount_checks(options) {
        errs.append(&mut re);
    }
    if let Err(mut re) = rules::currency_checks(options) {
        errs.append(&mut re);
    }
    if let Err(e) = rules::api_url_check(options) {
        errs.push(e);
    }
    if errs.is_empty() {
        Ok(())
    } else {
        Err(errs)
    }
}
