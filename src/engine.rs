use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::logic::scan_triangles;
use crate::models::{Currency, Opportunity};
use crate::rates::{RateMatrix, RateSource};

/// Checked when the caller names no universe.
pub const DEFAULT_UNIVERSE: [&str; 12] = [
    "USD", "EUR", "GBP", "INR", "JPY", "AUD", "CAD", "CHF", "CNY", "BRL", "MXN", "ZAR",
];

pub const DEFAULT_MIN_PROFIT: f64 = 0.5;

#[derive(Debug, Clone)]
pub struct DetectRequest {
    /// `None` or empty falls back to [`DEFAULT_UNIVERSE`].
    pub universe: Option<Vec<Currency>>,
    /// Merged into the universe and used as the ranking priority.
    pub must_include: Vec<Currency>,
    pub min_profit_pct: f64,
}

impl Default for DetectRequest {
    fn default() -> Self {
        Self {
            universe: None,
            must_include: Vec::new(),
            min_profit_pct: DEFAULT_MIN_PROFIT,
        }
    }
}

impl DetectRequest {
    /// Deduplicated universe with `must_include` appended, first occurrence wins.
    pub fn resolved_universe(&self) -> Vec<Currency> {
        let base: Vec<Currency> = match &self.universe {
            Some(list) if !list.is_empty() => list.clone(),
            _ => DEFAULT_UNIVERSE.iter().map(|c| Currency::from(*c)).collect(),
        };
        let mut seen = HashSet::new();
        base.into_iter()
            .chain(self.must_include.iter().cloned())
            .filter(|c| seen.insert(c.clone()))
            .collect()
    }

    fn priority(&self) -> Option<HashSet<Currency>> {
        if self.must_include.is_empty() {
            None
        } else {
            Some(self.must_include.iter().cloned().collect())
        }
    }
}

/// Outcome of one detection pass.
#[derive(Debug, Clone, Default)]
pub struct Detection {
    pub opportunities: Vec<Opportunity>,
    /// Currencies whose rate table could not be retrieved.
    pub unavailable: Vec<Currency>,
    pub requested: usize,
}

impl Detection {
    /// Nothing could be retrieved at all.
    pub fn is_degraded(&self) -> bool {
        self.requested > 0 && self.unavailable.len() == self.requested
    }
}

/// Builds a fresh matrix per call and runs the scan over it. Holds no
/// state between calls.
#[derive(Clone)]
pub struct ArbitrageEngine {
    source: Arc<dyn RateSource>,
    concurrency: usize,
}

impl ArbitrageEngine {
    pub fn new(source: Arc<dyn RateSource>, concurrency: usize) -> Self {
        Self {
            source,
            concurrency: concurrency.max(1),
        }
    }

    pub async fn detect(&self, req: &DetectRequest) -> Detection {
        let universe = req.resolved_universe();
        let requested = universe.len();
        if requested < 3 {
            debug!("engine: universe of {} cannot form a loop", requested);
        }

        let matrix = RateMatrix::build(self.source.as_ref(), universe, self.concurrency).await;
        if matrix.total_failure() {
            warn!("engine: every rate table failed, returning empty result");
        } else if matrix.is_empty() {
            debug!("engine: no usable pairs in this pass");
        }

        let priority = req.priority();
        let opportunities = scan_triangles(&matrix, req.min_profit_pct, priority.as_ref());
        info!(
            "engine: {} opportunities over {} currencies (min {}%)",
            opportunities.len(),
            requested,
            req.min_profit_pct
        );

        Detection {
            opportunities,
            unavailable: matrix.unavailable().to_vec(),
            requested,
        }
    }
}
