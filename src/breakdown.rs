use std::collections::{BTreeMap, BTreeSet};

use crate::models::{BreakdownItem, BreakdownMode, Issue, Signal, SignalBreakdown};
use crate::timeline::round_to;

pub fn build_breakdown(issues: &[Issue], mode: BreakdownMode) -> SignalBreakdown {
    let mut totals: BTreeMap<Signal, (f64, usize)> = BTreeMap::new();

    for issue in issues {
        let mut seen = BTreeSet::new();
        for signal in &issue.signals_triggered {
            if !seen.insert(*signal) {
                continue;
            }
            let weight = match mode {
                BreakdownMode::Count => 1.0,
                BreakdownMode::Weighted => issue
                    .signal_contributions
                    .iter()
                    .filter(|c| c.signal == *signal)
                    .map(|c| c.contribution)
                    .sum(),
            };
            let entry = totals.entry(*signal).or_insert((0.0, 0));
            entry.0 += weight;
            entry.1 += 1;
        }
    }

    let total_weight: f64 = totals.values().map(|(weight, _)| weight).sum();
    if total_weight <= 0.0 {
        return SignalBreakdown {
            mode,
            total_weight: 0.0,
            items: Vec::new(),
        };
    }

    let mut ranked: Vec<(Signal, f64, usize)> = totals
        .into_iter()
        .filter(|(_, (weight, _))| *weight > 0.0)
        .map(|(signal, (weight, segments))| (signal, weight, segments))
        .collect();
    // BTreeMap iteration is canonical, so the stable sort breaks ties by signal.
    ranked.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));

    let items = ranked
        .into_iter()
        .map(|(signal, weight, segments)| BreakdownItem {
            signal,
            weight: round_to(weight, 2),
            percent: round_to(100.0 * weight / total_weight, 2),
            segments,
        })
        .collect();

    SignalBreakdown {
        mode,
        total_weight: round_to(total_weight, 2),
        items,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Contribution, Evidence, SeverityTier, Tone};
    use proptest::prelude::*;

    fn sample_issue(segment_id: usize, contributions: &[(Signal, f64)]) -> Issue {
        Issue {
            segment_id,
            start_sec: segment_id as f64 * 10.0,
            end_sec: (segment_id + 1) as f64 * 10.0,
            risk: contributions.iter().map(|(_, c)| c).sum(),
            severity_tier: SeverityTier::Low,
            signals_triggered: contributions.iter().map(|(s, _)| *s).collect(),
            signal_contributions: contributions
                .iter()
                .map(|(signal, contribution)| Contribution {
                    signal: *signal,
                    contribution: *contribution,
                })
                .collect(),
            label: "label".to_string(),
            explanation: String::new(),
            evidence: Evidence::default(),
            fix: String::new(),
            tone: Tone {
                kind: String::new(),
                honest: String::new(),
                brutal: String::new(),
            },
        }
    }

    #[test]
    fn weights_accumulate_per_signal() {
        let issues = vec![
            sample_issue(1, &[(Signal::ConceptSpike, 3.0), (Signal::GroundingGap, 2.6)]),
            sample_issue(3, &[(Signal::GroundingGap, 1.3), (Signal::Tmb, 2.4)]),
        ];
        let breakdown = build_breakdown(&issues, BreakdownMode::Weighted);

        assert_eq!(breakdown.total_weight, 9.3);
        let signals: Vec<Signal> = breakdown.items.iter().map(|i| i.signal).collect();
        assert_eq!(
            signals,
            vec![Signal::GroundingGap, Signal::ConceptSpike, Signal::Tmb]
        );
        assert_eq!(breakdown.items[0].weight, 3.9);
        assert_eq!(breakdown.items[0].segments, 2);
        assert_eq!(breakdown.items[0].percent, 41.94);
    }

    #[test]
    fn count_mode_counts_segments() {
        let issues = vec![
            sample_issue(0, &[(Signal::Tmb, 2.4)]),
            sample_issue(1, &[(Signal::Tmb, 1.2), (Signal::RambleRatio, 1.6)]),
        ];
        let breakdown = build_breakdown(&issues, BreakdownMode::Count);
        assert_eq!(breakdown.total_weight, 3.0);
        assert_eq!(breakdown.items[0].signal, Signal::Tmb);
        assert_eq!(breakdown.items[0].weight, 2.0);
        assert_eq!(breakdown.items[1].percent, 33.33);
    }

    #[test]
    fn ties_use_canonical_order() {
        let issues = vec![sample_issue(
            0,
            &[(Signal::RambleRatio, 2.0), (Signal::ConceptSpike, 2.0)],
        )];
        let breakdown = build_breakdown(&issues, BreakdownMode::Weighted);
        assert_eq!(breakdown.items[0].signal, Signal::ConceptSpike);
        assert_eq!(breakdown.items[1].signal, Signal::RambleRatio);
    }

    #[test]
    fn no_issues_yield_an_empty_breakdown() {
        let breakdown = build_breakdown(&[], BreakdownMode::Weighted);
        assert_eq!(breakdown.total_weight, 0.0);
        assert!(breakdown.items.is_empty());
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(100))]

        #[test]
        fn prop_percentages_sum_to_one_hundred(
            rows in prop::collection::vec(prop::collection::vec((0usize..6, 0.1f64..3.0), 1..6), 1..10),
        ) {
            let issues: Vec<Issue> = rows
                .iter()
                .enumerate()
                .map(|(id, row)| {
                    let mut contributions: Vec<(Signal, f64)> = Vec::new();
                    for (index, value) in row {
                        let signal = Signal::ALL[*index];
                        if contributions.iter().all(|(s, _)| *s != signal) {
                            contributions.push((signal, *value));
                        }
                    }
                    sample_issue(id, &contributions)
                })
                .collect();

            let breakdown = build_breakdown(&issues, BreakdownMode::Weighted);
            prop_assert!(!breakdown.items.is_empty());
            let sum: f64 = breakdown.items.iter().map(|i| i.percent).sum();
            prop_assert!((sum - 100.0).abs() <= 0.05);
        }
    }
}
