use crate::models::{Currency, Cycle, Opportunity, START_AMOUNT};
use crate::rates::RateMatrix;
use itertools::Itertools;
use std::cmp::Ordering;
use std::collections::{BTreeMap, HashSet};

/// Every ordered triple of distinct currencies, n·(n-1)·(n-2) of them.
/// Lazy; call again to restart.
pub fn enumerate_cycles(universe: &[Currency]) -> impl Iterator<Item = Cycle> + '_ {
    universe
        .iter()
        .permutations(3)
        .map(|combo| Cycle::new(combo[0].clone(), combo[1].clone(), combo[2].clone()))
}

/// Push 100 units around the loop. `None` when a leg is missing or the
/// loop does not clear `min_profit_pct` (strictly).
pub fn evaluate_cycle(cycle: Cycle, matrix: &RateMatrix, min_profit_pct: f64) -> Option<Opportunity> {
    let [(a, b), (b2, c), (c2, a2)] = cycle.legs();
    let r1 = matrix.rate(a, b)?;
    let r2 = matrix.rate(b2, c)?;
    let r3 = matrix.rate(c2, a2)?;

    // compound in canonical leg order so every rotation scores bit-identically
    let rates = [r1, r2, r3];
    let k = cycle.canonical_offset();
    let final_amount = START_AMOUNT * rates[k] * rates[(k + 1) % 3] * rates[(k + 2) % 3];
    let profit_pct = (final_amount - START_AMOUNT) / START_AMOUNT * 100.0;
    if !profit_pct.is_finite() || !(profit_pct > min_profit_pct) {
        return None;
    }

    Some(Opportunity {
        cycle,
        rates,
        start_amount: START_AMOUNT,
        final_amount,
        profit_pct,
    })
}

/// Collapse rotations of one loop, keeping the strictly more profitable
/// one. Output is ordered by canonical key.
pub fn dedup_rotations(opps: impl IntoIterator<Item = Opportunity>) -> Vec<Opportunity> {
    let mut best: BTreeMap<Cycle, Opportunity> = BTreeMap::new();
    for opp in opps {
        let key = opp.cycle.canonical();
        match best.get(&key) {
            Some(seen) if seen.profit_pct >= opp.profit_pct => {}
            _ => {
                best.insert(key, opp);
            }
        }
    }
    best.into_values().collect()
}

/// How many of the caller's currencies the loop touches.
pub fn match_count(opp: &Opportunity, priority: &HashSet<Currency>) -> usize {
    priority.iter().filter(|c| opp.cycle.contains(c)).count()
}

fn by_profit_desc(x: &Opportunity, y: &Opportunity) -> Ordering {
    y.profit_pct.total_cmp(&x.profit_pct)
}

/// Profit descending, or (matches desc, profit desc) when a priority set
/// is given. Stable.
pub fn rank(mut opps: Vec<Opportunity>, priority: Option<&HashSet<Currency>>) -> Vec<Opportunity> {
    match priority.filter(|p| !p.is_empty()) {
        Some(priority) => opps.sort_by(|x, y| {
            match_count(y, priority)
                .cmp(&match_count(x, priority))
                .then_with(|| by_profit_desc(x, y))
        }),
        None => opps.sort_by(by_profit_desc),
    }
    opps
}

/// Enumerate, evaluate, dedup and rank over one matrix. Currencies whose
/// table failed to load are left out of the enumeration.
pub fn scan_triangles(
    matrix: &RateMatrix,
    min_profit_pct: f64,
    priority: Option<&HashSet<Currency>>,
) -> Vec<Opportunity> {
    let available = matrix.available();
    let evaluated = enumerate_cycles(&available)
        .filter_map(|cycle| evaluate_cycle(cycle, matrix, min_profit_pct));
    rank(dedup_rotations(evaluated), priority)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::FetchError;
    use crate::rates::RateTable;

    fn codes(list: &[&str]) -> Vec<Currency> {
        list.iter().map(|c| Currency::from(*c)).collect()
    }

    fn matrix(universe: &[&str], legs: &[(&str, &str, f64)]) -> RateMatrix {
        let mut tables: BTreeMap<Currency, RateTable> = BTreeMap::new();
        for code in universe {
            tables.entry(Currency::from(*code)).or_default();
        }
        for (from, to, rate) in legs {
            tables
                .entry(Currency::from(*from))
                .or_default()
                .insert(Currency::from(*to), *rate);
        }
        RateMatrix::from_results(
            codes(universe),
            tables.into_iter().map(|(c, t)| (c, Ok(t))).collect(),
        )
    }

    fn cycle(a: &str, b: &str, c: &str) -> Cycle {
        Cycle::new(a.into(), b.into(), c.into())
    }

    fn opp(c: Cycle, profit_pct: f64) -> Opportunity {
        Opportunity {
            cycle: c,
            rates: [1.0, 1.0, 1.0],
            start_amount: START_AMOUNT,
            final_amount: START_AMOUNT + profit_pct,
            profit_pct,
        }
    }

    fn usd_eur_gbp_tables() -> Vec<(Currency, Result<RateTable, FetchError>)> {
        [("USD", "EUR", 0.90), ("EUR", "GBP", 0.85), ("GBP", "USD", 1.35)]
            .into_iter()
            .map(|(from, to, rate)| {
                let table: RateTable = [(Currency::from(to), rate)].into_iter().collect();
                (Currency::from(from), Ok(table))
            })
            .collect()
    }

    fn usd_eur_gbp() -> RateMatrix {
        matrix(
            &["USD", "EUR", "GBP"],
            &[("USD", "EUR", 0.90), ("EUR", "GBP", 0.85), ("GBP", "USD", 1.35)],
        )
    }

    #[test]
    fn enumerates_all_ordered_triples() {
        let universe = codes(&["A", "B", "C", "D", "E"]);
        let cycles: Vec<Cycle> = enumerate_cycles(&universe).collect();
        assert_eq!(cycles.len(), 5 * 4 * 3);
        assert!(cycles.iter().all(|c| {
            let [a, b, x] = c.currencies();
            a != b && b != x && a != x
        }));
        assert_eq!(cycles.iter().collect::<HashSet<_>>().len(), cycles.len());
        // restartable
        assert_eq!(enumerate_cycles(&universe).count(), 60);
    }

    #[test]
    fn fewer_than_three_currencies_yield_nothing() {
        assert_eq!(enumerate_cycles(&codes(&["USD", "EUR"])).count(), 0);
        assert_eq!(enumerate_cycles(&[]).count(), 0);
    }

    #[test]
    fn literal_usd_eur_gbp_scenario() {
        let found = scan_triangles(&usd_eur_gbp(), 0.5, None);
        assert_eq!(found.len(), 1);
        let best = &found[0];
        assert_eq!(best.chain(), "USD -> EUR -> GBP -> USD");
        assert!((best.final_amount - 103.275).abs() < 1e-9);
        assert!((best.profit_pct - 3.275).abs() < 1e-9);
        assert_eq!(best.rates, [0.90, 0.85, 1.35]);
    }

    #[test]
    fn rotations_score_identically() {
        let m = usd_eur_gbp();
        let profits: Vec<f64> = [
            cycle("USD", "EUR", "GBP"),
            cycle("EUR", "GBP", "USD"),
            cycle("GBP", "USD", "EUR"),
        ]
        .into_iter()
        .map(|c| evaluate_cycle(c, &m, 0.5).unwrap().profit_pct)
        .collect();
        assert_eq!(profits[0], profits[1]);
        assert_eq!(profits[1], profits[2]);
    }

    #[test]
    fn threshold_is_strict() {
        let m = usd_eur_gbp();
        let exact = evaluate_cycle(cycle("USD", "EUR", "GBP"), &m, 0.0)
            .unwrap()
            .profit_pct;
        assert!(evaluate_cycle(cycle("USD", "EUR", "GBP"), &m, exact).is_none());
        assert!(evaluate_cycle(cycle("USD", "EUR", "GBP"), &m, exact - 1e-9).is_some());

        let flat = matrix(
            &["A", "B", "C"],
            &[("A", "B", 2.0), ("B", "C", 0.5), ("C", "A", 1.0)],
        );
        assert!(evaluate_cycle(cycle("A", "B", "C"), &flat, 0.0).is_none());
    }

    #[test]
    fn nan_threshold_admits_nothing() {
        let losing = matrix(
            &["A", "B", "C"],
            &[
                ("A", "B", 0.5),
                ("B", "C", 0.5),
                ("C", "A", 0.5),
                ("A", "C", 0.5),
                ("C", "B", 0.5),
                ("B", "A", 0.5),
            ],
        );
        assert!(evaluate_cycle(cycle("A", "B", "C"), &losing, f64::NAN).is_none());
        assert!(scan_triangles(&losing, f64::NAN, None).is_empty());
        assert!(scan_triangles(&usd_eur_gbp(), f64::NAN, None).is_empty());
    }

    #[test]
    fn failed_currencies_are_not_enumerated() {
        let mut tables: Vec<(Currency, Result<RateTable, FetchError>)> = usd_eur_gbp_tables();
        tables.push(("XXX".into(), Err(FetchError::UnknownCurrency("XXX".into()))));
        let m = RateMatrix::from_results(codes(&["USD", "XXX", "EUR", "GBP"]), tables);

        assert_eq!(m.available(), codes(&["USD", "EUR", "GBP"]));
        assert_eq!(enumerate_cycles(&m.available()).count(), 6);
        let found = scan_triangles(&m, 0.5, None);
        assert_eq!(found.len(), 1);
        assert!(!found[0].cycle.contains(&"XXX".into()));
    }

    #[test]
    fn missing_leg_skips_cycle() {
        let legs = [("USD", "EUR", 0.90), ("EUR", "GBP", 0.85), ("GBP", "USD", 1.35)];
        for skip in 0..legs.len() {
            let kept: Vec<_> = legs
                .iter()
                .enumerate()
                .filter(|(i, _)| *i != skip)
                .map(|(_, l)| *l)
                .collect();
            let m = matrix(&["USD", "EUR", "GBP"], &kept);
            assert!(evaluate_cycle(cycle("USD", "EUR", "GBP"), &m, 0.5).is_none());
            assert!(scan_triangles(&m, 0.5, None).is_empty());
        }
    }

    #[test]
    fn rotations_collapse_reverse_stays() {
        let opps = vec![
            opp(cycle("USD", "EUR", "GBP"), 1.0),
            opp(cycle("EUR", "GBP", "USD"), 1.0),
            opp(cycle("GBP", "USD", "EUR"), 1.0),
            opp(cycle("USD", "GBP", "EUR"), 0.7),
        ];
        let kept = dedup_rotations(opps);
        assert_eq!(kept.len(), 2);
        let keys: HashSet<Cycle> = kept.iter().map(|o| o.cycle.canonical()).collect();
        assert!(keys.contains(&cycle("EUR", "GBP", "USD")));
        assert!(keys.contains(&cycle("EUR", "USD", "GBP")));
    }

    #[test]
    fn dedup_keeps_higher_profit_either_order() {
        let low = opp(cycle("USD", "EUR", "GBP"), 1.0);
        let high = opp(cycle("GBP", "USD", "EUR"), 1.0000001);

        let kept = dedup_rotations(vec![low.clone(), high.clone()]);
        assert_eq!(kept, vec![high.clone()]);
        let kept = dedup_rotations(vec![high.clone(), low]);
        assert_eq!(kept, vec![high]);
    }

    #[test]
    fn dedup_tie_keeps_first_seen() {
        let first = opp(cycle("USD", "EUR", "GBP"), 2.0);
        let second = opp(cycle("EUR", "GBP", "USD"), 2.0);
        assert_eq!(dedup_rotations(vec![first.clone(), second]), vec![first]);
    }

    #[test]
    fn unweighted_rank_is_profit_desc() {
        let ranked = rank(
            vec![
                opp(cycle("A", "B", "C"), 1.0),
                opp(cycle("A", "B", "D"), 3.0),
                opp(cycle("A", "C", "D"), 2.0),
            ],
            None,
        );
        let profits: Vec<f64> = ranked.iter().map(|o| o.profit_pct).collect();
        assert_eq!(profits, vec![3.0, 2.0, 1.0]);
    }

    #[test]
    fn priority_beats_raw_profit() {
        let priority: HashSet<Currency> = ["JPY".into()].into_iter().collect();
        let ranked = rank(
            vec![
                opp(cycle("USD", "EUR", "GBP"), 9.0),
                opp(cycle("USD", "JPY", "EUR"), 0.6),
            ],
            Some(&priority),
        );
        assert!(ranked[0].cycle.contains(&"JPY".into()));
        assert_eq!(ranked[1].profit_pct, 9.0);
    }

    #[test]
    fn priority_ties_fall_back_to_profit() {
        let priority: HashSet<Currency> = ["USD".into(), "JPY".into()].into_iter().collect();
        let ranked = rank(
            vec![
                opp(cycle("USD", "EUR", "GBP"), 1.0),
                opp(cycle("USD", "JPY", "EUR"), 0.6),
                opp(cycle("USD", "CHF", "GBP"), 4.0),
            ],
            Some(&priority),
        );
        let chains: Vec<String> = ranked.iter().map(|o| o.chain()).collect();
        assert_eq!(
            chains,
            vec![
                "USD -> JPY -> EUR -> USD",
                "USD -> CHF -> GBP -> USD",
                "USD -> EUR -> GBP -> USD",
            ]
        );
    }

    #[test]
    fn empty_priority_set_ranks_by_profit() {
        let empty = HashSet::new();
        let ranked = rank(
            vec![opp(cycle("A", "B", "C"), 1.0), opp(cycle("A", "B", "D"), 2.0)],
            Some(&empty),
        );
        assert_eq!(ranked[0].profit_pct, 2.0);
    }

    #[test]
    fn scan_is_idempotent() {
        let m = matrix(
            &["USD", "EUR", "GBP", "JPY"],
            &[
                ("USD", "EUR", 0.90),
                ("EUR", "GBP", 0.85),
                ("GBP", "USD", 1.35),
                ("USD", "JPY", 150.0),
                ("JPY", "EUR", 0.0062),
                ("EUR", "USD", 1.12),
                ("JPY", "GBP", 0.0055),
                ("GBP", "JPY", 190.0),
            ],
        );
        let first = scan_triangles(&m, 0.5, None);
        let second = scan_triangles(&m, 0.5, None);
        assert!(!first.is_empty());
        assert_eq!(first, second);
    }
}
