use std::collections::BTreeMap;

use crate::history::{DailySeries, MIN_OBSERVATIONS};
use crate::models::Currency;
use crate::utils::round_to;

/// Symbols shown on the volatility heatmap, quoted against USD.
pub const HEATMAP_SYMBOLS: [&str; 20] = [
    "EUR", "GBP", "JPY", "AUD", "CAD", "CHF", "CNY", "HKD", "NZD", "KRW", "SGD", "NOK", "MXN",
    "INR", "BRL", "ZAR", "TRY", "SEK", "IDR", "MYR",
];

pub const VOLATILITY_DAYS: i64 = 7;
pub const FORECAST_DAYS: usize = 7;

/// Mean absolute day-over-day change in percent, per currency, 3 dp.
///
/// Currencies come from the earliest date. A pair of days only counts when
/// both rates are present; a currency with no usable pair is left out.
pub fn compute_volatility(series: &DailySeries) -> BTreeMap<Currency, f64> {
    let mut out = BTreeMap::new();
    let days: Vec<_> = series.values().collect();
    let Some(first) = days.first() else {
        return out;
    };
    if days.len() < 2 {
        return out;
    }

    for currency in first.keys() {
        let changes: Vec<f64> = days
            .windows(2)
            .filter_map(|w| {
                let prev = *w[0].get(currency)?;
                let curr = *w[1].get(currency)?;
                (prev != 0.0 && curr != 0.0).then(|| ((curr - prev) / prev * 100.0).abs())
            })
            .collect();
        if !changes.is_empty() {
            let mean = changes.iter().sum::<f64>() / changes.len() as f64;
            out.insert(currency.clone(), round_to(mean, 3));
        }
    }
    out
}

/// Least-squares line through `(i, values[i])`: (intercept, slope).
fn fit_line(values: &[f64]) -> (f64, f64) {
    let n = values.len() as f64;
    let mean_x = (n - 1.0) / 2.0;
    let mean_y = values.iter().sum::<f64>() / n;

    let (mut sxy, mut sxx) = (0.0, 0.0);
    for (i, y) in values.iter().enumerate() {
        let dx = i as f64 - mean_x;
        sxy += dx * (y - mean_y);
        sxx += dx * dx;
    }
    let slope = if sxx == 0.0 { 0.0 } else { sxy / sxx };
    (mean_y - slope * mean_x, slope)
}

/// Extend the linear trend `horizon` steps past the last observation, 4 dp.
/// Empty when fewer than [`MIN_OBSERVATIONS`] values are given.
pub fn predict_next(values: &[f64], horizon: usize) -> Vec<f64> {
    if values.len() < MIN_OBSERVATIONS {
        return Vec::new();
    }
    let (intercept, slope) = fit_line(values);
    (values.len()..values.len() + horizon)
        .map(|x| round_to(intercept + slope * x as f64, 4))
        .collect()
}
