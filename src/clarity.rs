use crate::config::ClarityConfig;
use crate::models::{ClaritySummary, RiskScore};
use crate::timeline::round_to;

const NEUTRAL_SCORE: u8 = 50;

pub fn tier_label(score: u8, config: &ClarityConfig) -> String {
    config
        .tiers
        .iter()
        .find(|tier| score >= tier.min_score)
        .or_else(|| config.tiers.last())
        .map(|tier| tier.label.clone())
        .unwrap_or_else(|| "Unrated".to_string())
}

pub fn summarize(scores: &[RiskScore], config: &ClarityConfig) -> ClaritySummary {
    let total_risk: f64 = scores.iter().map(|score| score.score).sum();

    let score = if scores.is_empty() {
        NEUTRAL_SCORE
    } else {
        let average = total_risk / scores.len() as f64;
        (100.0 - average * config.normalization_factor).clamp(0.0, 100.0) as u8
    };

    ClaritySummary {
        score,
        tier: tier_label(score, config),
        total_risk: round_to(total_risk, 2),
        window_count: scores.len(),
    }
}
