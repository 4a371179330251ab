use crate::config::{AnalysisConfig, SignalWeights};
use crate::error::{AnalysisError, Result};
use crate::models::{Contribution, RiskScore, Signal, SignalObservation, Window};

pub fn score(
    window: &Window,
    observation: &SignalObservation,
    weights: &SignalWeights,
    trigger_floor: f64,
) -> Result<RiskScore> {
    let mut total = 0.0;
    let mut triggered = Vec::new();

    for signal in Signal::ALL {
        let Some(severity) = observation.severities.get(&signal).copied() else {
            continue;
        };
        if !severity.is_finite() || severity < 0.0 {
            return Err(AnalysisError::InvalidSeverity {
                window_id: observation.window_id,
                signal,
                value: severity,
            });
        }
        if !observation.is_available(signal) {
            continue;
        }

        let contribution = severity * weights.get(signal);
        total += contribution;
        if contribution > 0.0 && contribution >= trigger_floor {
            triggered.push(Contribution {
                signal,
                contribution,
            });
        }
    }

    // Signal::ALL is already canonical, so a stable sort keeps ties in that order.
    triggered.sort_by(|a, b| {
        b.contribution
            .partial_cmp(&a.contribution)
            .unwrap_or(std::cmp::Ordering::Equal)
    });

    Ok(RiskScore {
        window_id: window.id,
        start_sec: window.start_sec,
        end_sec: window.end_sec,
        score: total,
        triggered,
    })
}

pub fn score_all(
    windows: &[Window],
    observations: &[SignalObservation],
    config: &AnalysisConfig,
) -> Result<Vec<RiskScore>> {
    windows
        .iter()
        .zip(observations)
        .map(|(window, observation)| {
            score(window, observation, &config.weights, config.trigger_floor)
        })
        .collect()
}

pub fn flagged(scores: &[RiskScore], risk_threshold: f64) -> Vec<&RiskScore> {
    scores
        .iter()
        .filter(|score| score.is_flagged(risk_threshold))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use std::collections::{BTreeMap, BTreeSet};

    fn sample_window(id: usize) -> Window {
        Window {
            id,
            start_sec: id as f64 * 10.0,
            end_sec: (id + 1) as f64 * 10.0,
            text: String::new(),
        }
    }

    fn sample_observation(window_id: usize, severities: &[(Signal, f64)]) -> SignalObservation {
        let mut map: BTreeMap<Signal, f64> = Signal::ALL.iter().map(|s| (*s, 0.0)).collect();
        for (signal, severity) in severities {
            map.insert(*signal, *severity);
        }
        SignalObservation {
            window_id,
            severities: map,
            unavailable: BTreeSet::new(),
            context: Default::default(),
        }
    }

    #[test]
    fn weighted_sum_flags_the_worked_example() {
        let observation = sample_observation(
            3,
            &[(Signal::ConceptSpike, 3.0), (Signal::GroundingGap, 2.0)],
        );
        let scored = score(&sample_window(3), &observation, &SignalWeights::default(), 0.0).unwrap();

        assert!((scored.score - 5.6).abs() < 1e-9);
        assert!(scored.is_flagged(4.0));
        assert_eq!(
            scored.triggered_signals(),
            vec![Signal::ConceptSpike, Signal::GroundingGap]
        );
        assert!((scored.triggered[1].contribution - 2.6).abs() < 1e-9);
    }

    #[test]
    fn ties_follow_canonical_order() {
        let mut weights = SignalWeights::default();
        weights.set(Signal::RambleRatio, 1.0);
        weights.set(Signal::Tmb, 1.0);
        let observation =
            sample_observation(0, &[(Signal::RambleRatio, 2.0), (Signal::Tmb, 2.0)]);
        let scored = score(&sample_window(0), &observation, &weights, 0.0).unwrap();
        assert_eq!(scored.triggered_signals(), vec![Signal::Tmb, Signal::RambleRatio]);
    }

    #[test]
    fn unavailable_signals_contribute_nothing() {
        let mut observation = sample_observation(0, &[(Signal::Tmb, 2.0)]);
        observation.unavailable.insert(Signal::Tmb);
        let scored = score(&sample_window(0), &observation, &SignalWeights::default(), 0.0).unwrap();
        assert_eq!(scored.score, 0.0);
        assert!(scored.triggered.is_empty());
        assert!(!scored.is_flagged(4.0));
    }

    #[test]
    fn failed_observation_scores_zero() {
        let scored = score(
            &sample_window(2),
            &SignalObservation::failed(2),
            &SignalWeights::default(),
            0.0,
        )
        .unwrap();
        assert_eq!(scored.score, 0.0);
        assert!(scored.triggered.is_empty());
    }

    #[test]
    fn trigger_floor_filters_small_contributions() {
        let observation =
            sample_observation(0, &[(Signal::RambleRatio, 1.0), (Signal::Tmb, 2.0)]);
        let scored = score(&sample_window(0), &observation, &SignalWeights::default(), 1.0).unwrap();
        assert_eq!(scored.triggered_signals(), vec![Signal::Tmb]);
        assert!((scored.score - 3.2).abs() < 1e-9);
    }

    #[test]
    fn negative_severity_is_rejected() {
        let observation = sample_observation(5, &[(Signal::Tmb, -1.0)]);
        let err = score(&sample_window(5), &observation, &SignalWeights::default(), 0.0).unwrap_err();
        assert!(matches!(
            err,
            AnalysisError::InvalidSeverity {
                window_id: 5,
                signal: Signal::Tmb,
                ..
            }
        ));
    }

    #[test]
    fn flagged_keeps_only_scores_at_or_above_threshold() {
        let windows: Vec<Window> = (0..3).map(sample_window).collect();
        let observations = vec![
            sample_observation(0, &[(Signal::Tmb, 2.0)]),
            sample_observation(1, &[(Signal::VisualMismatch, 2.0), (Signal::Tmb, 1.0)]),
            sample_observation(2, &[(Signal::ConceptSpike, 4.0)]),
        ];
        let scores = score_all(&windows, &observations, &AnalysisConfig::default()).unwrap();
        let flagged: Vec<usize> = flagged(&scores, 4.0).iter().map(|s| s.window_id).collect();
        assert_eq!(flagged, vec![1, 2]);
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(100))]

        #[test]
        fn prop_raising_a_weight_never_lowers_the_score(
            severities in prop::collection::vec(0.0f64..=2.0, 6),
            bump in 0.0f64..5.0,
            target in 0usize..6,
        ) {
            let signal = Signal::ALL[target];
            let pairs: Vec<(Signal, f64)> =
                Signal::ALL.iter().copied().zip(severities.iter().copied()).collect();
            let observation = sample_observation(0, &pairs);
            let weights = SignalWeights::default();
            let mut raised = weights.clone();
            raised.set(signal, weights.get(signal) + bump);

            let before = score(&sample_window(0), &observation, &weights, 0.0).unwrap();
            let after = score(&sample_window(0), &observation, &raised, 0.0).unwrap();

            prop_assert!(after.score + 1e-9 >= before.score);
            if before.is_flagged(4.0) {
                prop_assert!(after.is_flagged(4.0));
            }
        }
    }
}
