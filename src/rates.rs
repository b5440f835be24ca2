use async_trait::async_trait;
use futures_util::stream::{self, StreamExt};
use serde::Deserialize;
use std::collections::{HashMap, HashSet};
use std::time::Duration;
use tracing::{debug, info, warn};
use url::Url;

use crate::error::FetchError;
use crate::models::Currency;

/// One currency's outbound rates: 1 unit of the base buys `rate` of each key.
pub type RateTable = HashMap<Currency, f64>;

/// Remote lookup of a full rate table.
#[async_trait]
pub trait RateSource: Send + Sync {
    async fn fetch_rate_table(&self, base: &Currency) -> Result<RateTable, FetchError>;
}

#[derive(Debug, Deserialize)]
struct LatestRates {
    rates: HashMap<String, f64>,
}

/// exchangerate-api style endpoint: GET {base_url}/{CODE} -> {"rates": {...}}
pub struct ExchangeRateApi {
    client: reqwest::Client,
    base_url: Url,
}

impl ExchangeRateApi {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, FetchError> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            base_url: Url::parse(base_url)?,
        })
    }

    fn table_url(&self, base: &Currency) -> Result<Url, FetchError> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| FetchError::Malformed(format!("{} cannot take a path", self.base_url)))?
            .pop_if_empty()
            .push(base.as_str());
        Ok(url)
    }
}

#[async_trait]
impl RateSource for ExchangeRateApi {
    async fn fetch_rate_table(&self, base: &Currency) -> Result<RateTable, FetchError> {
        let url = self.table_url(base)?;
        debug!("rates: GET {}", url);

        let resp = self.client.get(url).send().await?;
        let status = resp.status();
        if status == reqwest::StatusCode::NOT_FOUND {
            return Err(FetchError::UnknownCurrency(base.clone()));
        }
        if !status.is_success() {
            return Err(FetchError::Status {
                status: status.as_u16(),
                what: format!("rate table {}", base),
            });
        }

        let body: LatestRates = resp.json().await?;
        Ok(body
            .rates
            .into_iter()
            .map(|(code, rate)| (Currency::new(code), rate))
            .collect())
    }
}

/// Best-known rate per ordered pair for a single detection pass.
#[derive(Debug, Clone, Default)]
pub struct RateMatrix {
    universe: Vec<Currency>,
    rates: HashMap<(Currency, Currency), f64>,
    unavailable: Vec<Currency>,
}

impl RateMatrix {
    /// Merge per-currency retrieval outcomes. A failed currency adds no
    /// entries and is recorded as unavailable; only finite positive rates
    /// towards other universe members are kept.
    pub fn from_results(
        universe: Vec<Currency>,
        results: Vec<(Currency, Result<RateTable, FetchError>)>,
    ) -> Self {
        let members: HashSet<&Currency> = universe.iter().collect();
        let mut rates = HashMap::new();
        let mut unavailable = Vec::new();

        for (from, outcome) in results {
            match outcome {
                Ok(table) => {
                    for (to, rate) in table {
                        if to == from || !members.contains(&to) {
                            continue;
                        }
                        if !rate.is_finite() || rate <= 0.0 {
                            warn!("rates: dropping {}/{} = {}", from, to, rate);
                            continue;
                        }
                        rates.insert((from.clone(), to), rate);
                    }
                }
                Err(e) => {
                    warn!("rates: {} unavailable: {}", from, e);
                    unavailable.push(from);
                }
            }
        }

        // keep the report in universe order regardless of completion order
        unavailable.sort_by_key(|c| universe.iter().position(|u| u == c));

        Self {
            universe,
            rates,
            unavailable,
        }
    }

    /// Query every currency independently, at most `concurrency` at a time.
    pub async fn build(
        source: &dyn RateSource,
        universe: Vec<Currency>,
        concurrency: usize,
    ) -> Self {
        let results: Vec<(Currency, Result<RateTable, FetchError>)> =
            stream::iter(universe.iter().cloned())
                .map(|currency| async move {
                    let outcome = source.fetch_rate_table(&currency).await;
                    (currency, outcome)
                })
                .buffer_unordered(concurrency.max(1))
                .collect()
                .await;

        let matrix = Self::from_results(universe, results);
        info!(
            "rates: {} pairs from {}/{} currencies",
            matrix.len(),
            matrix.universe.len() - matrix.unavailable.len(),
            matrix.universe.len()
        );
        matrix
    }

    pub fn rate(&self, from: &Currency, to: &Currency) -> Option<f64> {
        self.rates.get(&(from.clone(), to.clone())).copied()
    }

    pub fn universe(&self) -> &[Currency] {
        &self.universe
    }

    /// Universe members whose table was retrieved, in universe order.
    pub fn available(&self) -> Vec<Currency> {
        self.universe
            .iter()
            .filter(|c| !self.unavailable.contains(c))
            .cloned()
            .collect()
    }

    pub fn unavailable(&self) -> &[Currency] {
        &self.unavailable
    }

    pub fn len(&self) -> usize {
        self.rates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rates.is_empty()
    }

    /// Every requested currency failed to load.
    pub fn total_failure(&self) -> bool {
        !self.universe.is_empty() && self.unavailable.len() == self.universe.len()
    }
}

/// In-memory tables for tests.
#[cfg(test)]
#[derive(Debug, Clone, Default)]
pub struct StaticRates {
    tables: HashMap<Currency, RateTable>,
}

#[cfg(test)]
impl StaticRates {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_rate(mut self, from: &str, to: &str, rate: f64) -> Self {
        self.tables
            .entry(Currency::from(from))
            .or_default()
            .insert(Currency::from(to), rate);
        self
    }

    pub fn without_rate(mut self, from: &str, to: &str) -> Self {
        if let Some(table) = self.tables.get_mut(&Currency::from(from)) {
            table.remove(&Currency::from(to));
        }
        self
    }
}

#[cfg(test)]
#[async_trait]
impl RateSource for StaticRates {
    async fn fetch_rate_table(&self, base: &Currency) -> Result<RateTable, FetchError> {
        self.tables
            .get(base)
            .cloned()
            .ok_or_else(|| FetchError::UnknownCurrency(base.clone()))
    }
}
