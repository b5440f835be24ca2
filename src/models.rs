use serde::ser::SerializeMap;
use serde::{Deserialize, Serialize, Serializer};
use std::fmt;
use std::sync::Arc;

use crate::engine::ArbitrageEngine;
use crate::history::HistorySource;
use crate::utils::round2;

/// Starting notional pushed through every loop.
pub const START_AMOUNT: f64 = 100.0;

/// Opaque currency code. Ordered by the code string.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Currency(String);

impl Currency {
    pub fn new(code: impl Into<String>) -> Self {
        Self(code.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Currency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Currency {
    fn from(code: &str) -> Self {
        Self::new(code)
    }
}

/// Loop c1 -> c2 -> c3 -> c1 over three distinct currencies.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Cycle(pub [Currency; 3]);

impl Cycle {
    pub fn new(a: Currency, b: Currency, c: Currency) -> Self {
        Self([a, b, c])
    }

    pub fn currencies(&self) -> &[Currency; 3] {
        &self.0
    }

    /// Rotation starting at the smallest code. Rotations share it, the
    /// reversed loop does not.
    pub fn canonical(&self) -> Cycle {
        let mut rotated = self.0.clone();
        rotated.rotate_left(self.canonical_offset());
        Cycle(rotated)
    }

    /// Position of the smallest code.
    pub fn canonical_offset(&self) -> usize {
        (0..3)
            .min_by(|&i, &j| self.0[i].cmp(&self.0[j]))
            .unwrap_or(0)
    }

    /// Ordered legs (from, to) of the loop.
    pub fn legs(&self) -> [(&Currency, &Currency); 3] {
        let [a, b, c] = &self.0;
        [(a, b), (b, c), (c, a)]
    }

    pub fn contains(&self, currency: &Currency) -> bool {
        self.currencies().contains(currency)
    }
}

impl fmt::Display for Cycle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let [a, b, c] = &self.0;
        write!(f, "{} -> {} -> {} -> {}", a, b, c, a)
    }
}

/// A profitable loop, kept at full precision.
#[derive(Debug, Clone, PartialEq)]
pub struct Opportunity {
    pub cycle: Cycle,
    pub rates: [f64; 3],
    pub start_amount: f64,
    pub final_amount: f64,
    pub profit_pct: f64,
}

impl Opportunity {
    pub fn chain(&self) -> String {
        self.cycle.to_string()
    }
}

/// Wire shape of an opportunity. Amounts are rounded here and nowhere else.
#[derive(Debug, Clone, Serialize)]
pub struct OpportunityView {
    pub chain: String,
    pub start_amount: f64,
    pub final_amount: f64,
    pub profit_percent: f64,
    pub rates: RateLegs,
}

impl From<&Opportunity> for OpportunityView {
    fn from(opp: &Opportunity) -> Self {
        let legs = opp.cycle.legs();
        let mut labelled = Vec::with_capacity(3);
        for ((from, to), rate) in legs.iter().zip(opp.rates) {
            labelled.push((format!("{}/{}", from, to), rate));
        }
        Self {
            chain: opp.chain(),
            start_amount: opp.start_amount,
            final_amount: round2(opp.final_amount),
            profit_percent: round2(opp.profit_pct),
            rates: RateLegs(labelled),
        }
    }
}

/// "X/Y" -> rate, serialized as an object in traversal order.
#[derive(Debug, Clone, PartialEq)]
pub struct RateLegs(pub Vec<(String, f64)>);

impl Serialize for RateLegs {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.0.len()))?;
        for (pair, rate) in &self.0 {
            map.serialize_entry(pair, rate)?;
        }
        map.end()
    }
}

/// Shared by every handler; holds no per-request state.
#[derive(Clone)]
pub struct AppState {
    pub engine: ArbitrageEngine,
    pub history: Arc<dyn HistorySource>,
    pub min_profit: f64,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ArbitrageQuery {
    pub base: Option<String>,
    pub target: Option<String>,
    /// Comma separated universe override.
    pub currencies: Option<String>,
    pub min_profit: Option<f64>,
}

#[derive(Debug, Serialize)]
pub struct ArbitrageResponse {
    pub count: usize,
    pub opportunities: Vec<OpportunityView>,
    pub degraded: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PredictQuery {
    pub base: Option<String>,
    pub target: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct PredictResponse {
    pub base: Currency,
    pub target: Currency,
    pub predictions: Vec<f64>,
}
