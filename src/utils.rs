use tracing_subscriber::EnvFilter;

use crate::models::Currency;

pub fn round2(v: f64) -> f64 {
    round_to(v, 2)
}

pub fn round_to(v: f64, decimals: i32) -> f64 {
    let scale = 10f64.powi(decimals);
    (v * scale).round() / scale
}

/// Trimmed, upper-cased code; `None` for blank input.
pub fn parse_currency(raw: &str) -> Option<Currency> {
    let code = raw.trim();
    if code.is_empty() {
        None
    } else {
        Some(Currency::new(code.to_uppercase()))
    }
}

/// "usd, eur,,gbp" -> [USD, EUR, GBP]
pub fn parse_currency_list(raw: &str) -> Vec<Currency> {
    raw.split(',').filter_map(parse_currency).collect()
}

pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}
