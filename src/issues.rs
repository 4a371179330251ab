use tracing::warn;

use crate::collaborators::Collaborators;
use crate::config::AnalysisConfig;
use crate::models::{
    Evidence, Issue, LabelFix, RiskScore, RunWarning, Signal, SignalObservation, Tone, Window,
};

const MAX_TERMS_IN_FIX: usize = 3;

fn term_list(terms: &[String]) -> Option<String> {
    if terms.is_empty() {
        None
    } else {
        Some(
            terms
                .iter()
                .take(MAX_TERMS_IN_FIX)
                .cloned()
                .collect::<Vec<_>>()
                .join(", "),
        )
    }
}

/// Deterministic remediation used when the label writer is unavailable.
pub fn fallback_remediation(signal: Signal, terms: &[String]) -> LabelFix {
    let listed = term_list(terms);
    let (label, explanation, fix) = match signal {
        Signal::ConceptSpike => (
            "Concept overload",
            "Too many new ideas arrive at once for the audience to absorb.",
            match &listed {
                Some(list) => format!("Introduce {list} one at a time, each with a plain-language line."),
                None => "Introduce new concepts one at a time, each with a plain-language line.".to_string(),
            },
        ),
        Signal::GroundingGap => (
            "Undefined jargon",
            "Terms are used before anyone has explained them.",
            match &listed {
                Some(list) => format!("Define {list} the first time you say them."),
                None => "Define each technical term the first time you say it.".to_string(),
            },
        ),
        Signal::Tmb => (
            "Trust me bro",
            "Claims are made without anything to back them up.",
            "Back each claim with a number, a benchmark or a live demo moment.".to_string(),
        ),
        Signal::VisualMismatch => (
            "Slides and speech disagree",
            "What is on screen does not match what is being said.",
            "Make the screen show exactly what you are talking about right now.".to_string(),
        ),
        Signal::StructureOrder => (
            "Out of order",
            "The pitch jumps ahead before the audience knows the problem.",
            "State the problem first, then the solution, then the demo and metrics.".to_string(),
        ),
        Signal::RambleRatio => (
            "Rambling",
            "Filler words and repetition dilute the message.",
            "Cut the filler words and make each point once.".to_string(),
        ),
    };

    LabelFix {
        label: label.to_string(),
        explanation: explanation.to_string(),
        fix,
    }
}

pub fn fallback_tone(remediation: &LabelFix) -> Tone {
    Tone {
        kind: remediation.fix.clone(),
        honest: format!("{} {}", remediation.explanation, remediation.fix),
        brutal: format!("{}. {}", remediation.label, remediation.fix),
    }
}

pub fn excerpt(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((cut, _)) => format!("{}...", text[..cut].trim_end()),
        None => text.to_string(),
    }
}

pub fn build_evidence(window: &Window, observation: &SignalObservation, excerpt_chars: usize) -> Evidence {
    let context = &observation.context;
    Evidence {
        excerpt: excerpt(&window.text, excerpt_chars),
        terms: context.terms.clone(),
        ungrounded_terms: context.ungrounded_terms.clone(),
        claims: context.claims.clone(),
        evidence_cues: context.evidence.clone(),
        structure_violations: context.structure_violations.clone(),
        filler_ratio: context.ramble.filler_ratio,
    }
}

async fn remediate(
    window: &Window,
    score: &RiskScore,
    terms: &[String],
    collaborators: &dyn Collaborators,
    warnings: &mut Vec<RunWarning>,
) -> (LabelFix, Tone) {
    let triggered = score.triggered_signals();

    let remediation = match collaborators.label_and_fix(window, &triggered, terms).await {
        Ok(remediation) => remediation,
        Err(err) => {
            warn!(window_id = window.id, error = %err, "label writer failed, using fallback label");
            warnings.push(RunWarning {
                window_id: window.id,
                source: "label_and_fix".to_string(),
                message: err.to_string(),
            });
            match triggered.first() {
                Some(dominant) => fallback_remediation(*dominant, terms),
                None => LabelFix {
                    label: "Clarity risk".to_string(),
                    explanation: "This segment scored above the risk threshold.".to_string(),
                    fix: "Tighten this segment around one clear point.".to_string(),
                },
            }
        }
    };

    let tone = match collaborators.roast_variants(&remediation).await {
        Ok(tone) => tone,
        Err(err) => {
            warn!(window_id = window.id, error = %err, "tone writer failed, using fallback tone");
            warnings.push(RunWarning {
                window_id: window.id,
                source: "roast_variants".to_string(),
                message: err.to_string(),
            });
            fallback_tone(&remediation)
        }
    };

    (remediation, tone)
}

/// Builds one issue per flagged window, in window order. Writer failures fall
/// back to deterministic text and never drop the issue.
pub async fn build_issues(
    windows: &[Window],
    observations: &[SignalObservation],
    scores: &[RiskScore],
    collaborators: &dyn Collaborators,
    config: &AnalysisConfig,
) -> (Vec<Issue>, Vec<RunWarning>) {
    let mut issues = Vec::new();
    let mut warnings = Vec::new();

    let rows = windows.iter().zip(observations).zip(scores);
    for ((window, observation), score) in rows {
        if !score.is_flagged(config.risk_threshold) {
            continue;
        }

        let terms = &observation.context.terms;
        let (remediation, tone) =
            remediate(window, score, terms, collaborators, &mut warnings).await;

        issues.push(Issue {
            segment_id: window.id,
            start_sec: window.start_sec,
            end_sec: window.end_sec,
            risk: score.score,
            severity_tier: config.tiers.tier_for(score.score),
            signals_triggered: score.triggered_signals(),
            signal_contributions: score.triggered.clone(),
            label: remediation.label,
            explanation: remediation.explanation,
            evidence: build_evidence(window, observation, config.excerpt_chars),
            fix: remediation.fix,
            tone,
        });
    }

    warnings.sort();
    (issues, warnings)
}
