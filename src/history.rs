use async_trait::async_trait;
use chrono::{Duration as ChronoDuration, NaiveDate, Utc};
use serde::Deserialize;
use std::collections::{BTreeMap, HashMap};
use std::time::Duration;
use tracing::{debug, warn};
use url::Url;

use crate::error::FetchError;
use crate::models::Currency;

/// date -> (symbol -> rate of 1 base unit)
pub type DailySeries = BTreeMap<NaiveDate, HashMap<Currency, f64>>;

/// Observations the forecaster wants.
pub const FORECAST_WINDOW: usize = 60;
/// Shortest usable series for a forecast.
pub const MIN_OBSERVATIONS: usize = 10;

/// Daily time-series lookup.
#[async_trait]
pub trait HistorySource: Send + Sync {
    async fn fetch_series(
        &self,
        base: &Currency,
        symbols: &[Currency],
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<DailySeries, FetchError>;
}

#[derive(Debug, Deserialize)]
struct TimeSeries {
    #[serde(default)]
    rates: BTreeMap<NaiveDate, HashMap<String, f64>>,
}

/// Frankfurter: GET {base_url}/{start}..{end}?from=BASE&to=A,B
pub struct Frankfurter {
    client: reqwest::Client,
    base_url: Url,
}

impl Frankfurter {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, FetchError> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            base_url: Url::parse(base_url)?,
        })
    }

    fn series_url(
        &self,
        base: &Currency,
        symbols: &[Currency],
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Url, FetchError> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| FetchError::Malformed(format!("{} cannot take a path", self.base_url)))?
            .pop_if_empty()
            .push(&format!("{}..{}", start, end));
        {
            let mut query = url.query_pairs_mut();
            query.append_pair("from", base.as_str());
            if !symbols.is_empty() {
                let to = symbols.iter().map(Currency::as_str).collect::<Vec<_>>().join(",");
                query.append_pair("to", &to);
            }
        }
        Ok(url)
    }
}

#[async_trait]
impl HistorySource for Frankfurter {
    async fn fetch_series(
        &self,
        base: &Currency,
        symbols: &[Currency],
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<DailySeries, FetchError> {
        let url = self.series_url(base, symbols, start, end)?;
        debug!("history: GET {}", url);

        let resp = self.client.get(url).send().await?;
        let status = resp.status();
        if status == reqwest::StatusCode::NOT_FOUND {
            return Err(FetchError::UnknownCurrency(base.clone()));
        }
        if !status.is_success() {
            return Err(FetchError::Status {
                status: status.as_u16(),
                what: format!("series {}", base),
            });
        }

        let body: TimeSeries = resp.json().await?;
        Ok(body
            .rates
            .into_iter()
            .map(|(day, row)| {
                let row = row.into_iter().map(|(c, r)| (Currency::new(c), r)).collect();
                (day, row)
            })
            .collect())
    }
}

/// Inclusive window of `days` calendar days ending today (UTC).
pub fn trailing_window(days: i64) -> (NaiveDate, NaiveDate) {
    let end = Utc::now().date_naive();
    (end - ChronoDuration::days((days - 1).max(0)), end)
}

/// Per-date values of one symbol, oldest first.
fn column(series: &DailySeries, symbol: &Currency) -> BTreeMap<NaiveDate, f64> {
    series
        .iter()
        .filter_map(|(day, row)| row.get(symbol).map(|r| (*day, *r)))
        .collect()
}

fn tail(mut values: Vec<f64>, keep: usize) -> Vec<f64> {
    if values.len() > keep {
        values.drain(..values.len() - keep);
    }
    values
}

/// Up to [`FORECAST_WINDOW`] daily `base -> target` rates, oldest first.
///
/// Tries the direct pair, then a cross through USD. An empty vector means
/// neither route produced [`MIN_OBSERVATIONS`] points.
pub async fn load_pair_series(
    source: &dyn HistorySource,
    base: &Currency,
    target: &Currency,
) -> Vec<f64> {
    if base == target {
        return vec![1.0; FORECAST_WINDOW];
    }

    // calendar window wide enough to cover weekends and holidays
    let (start, end) = trailing_window(FORECAST_WINDOW as i64 * 2);

    match source.fetch_series(base, std::slice::from_ref(target), start, end).await {
        Ok(series) => {
            let direct: Vec<f64> = column(&series, target).into_values().collect();
            if direct.len() >= MIN_OBSERVATIONS {
                return tail(direct, FORECAST_WINDOW);
            }
            debug!("history: {}/{} direct series too short ({})", base, target, direct.len());
        }
        Err(e) => warn!("history: {}/{} direct fetch failed: {}", base, target, e),
    }

    let usd = Currency::from("USD");
    let legs: Vec<Currency> = [base, target]
        .into_iter()
        .filter(|c| **c != usd)
        .cloned()
        .collect();
    let series = match source.fetch_series(&usd, &legs, start, end).await {
        Ok(s) => s,
        Err(e) => {
            warn!("history: USD bridge for {}/{} failed: {}", base, target, e);
            return Vec::new();
        }
    };

    // 1 USD buys `b` base and `t` target, so 1 base buys t / b target
    let leg = |c: &Currency| -> Option<BTreeMap<NaiveDate, f64>> {
        if *c == usd {
            None
        } else {
            Some(column(&series, c))
        }
    };
    let (base_leg, target_leg) = (leg(base), leg(target));
    let days: Vec<NaiveDate> = match (&base_leg, &target_leg) {
        (Some(b), _) => b.keys().copied().collect(),
        (None, Some(t)) => t.keys().copied().collect(),
        (None, None) => Vec::new(),
    };
    let value = |side: &Option<BTreeMap<NaiveDate, f64>>, day: &NaiveDate| -> Option<f64> {
        match side {
            None => Some(1.0),
            Some(col) => col.get(day).copied(),
        }
    };
    let cross: Vec<f64> = days
        .iter()
        .filter_map(|day| {
            let b = value(&base_leg, day)?;
            let t = value(&target_leg, day)?;
            (b > 0.0).then(|| t / b)
        })
        .collect();

    if cross.len() >= MIN_OBSERVATIONS {
        tail(cross, FORECAST_WINDOW)
    } else {
        debug!("history: {}/{} bridge too short ({})", base, target, cross.len());
        Vec::new()
    }
}

/// Canned series for tests.
#[cfg(test)]
#[derive(Debug, Clone, Default)]
pub struct StaticHistory {
    series: HashMap<Currency, DailySeries>,
}

#[cfg(test)]
impl StaticHistory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_point(mut self, base: &str, day: NaiveDate, symbol: &str, rate: f64) -> Self {
        self.series
            .entry(Currency::from(base))
            .or_default()
            .entry(day)
            .or_default()
            .insert(Currency::from(symbol), rate);
        self
    }
}

#[cfg(test)]
#[async_trait]
impl HistorySource for StaticHistory {
    async fn fetch_series(
        &self,
        base: &Currency,
        symbols: &[Currency],
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<DailySeries, FetchError> {
        let all = self
            .series
            .get(base)
            .ok_or_else(|| FetchError::UnknownCurrency(base.clone()))?;
        Ok(all
            .range(start..=end)
            .map(|(day, row)| {
                let row = row
                    .iter()
                    .filter(|(c, _)| symbols.is_empty() || symbols.contains(c))
                    .map(|(c, r)| (c.clone(), *r))
                    .collect();
                (*day, row)
            })
            .collect())
    }
}
