//! Per-window signal collection.
//!
//! Collaborator calls run concurrently across windows (phase 1). Severities
//! that depend on other windows, such as the term-count baseline and the
//! role sequence, are derived afterwards in window order (phase 2), so the
//! result never depends on which call finished first. Structure violations
//! are charged to the first window playing the out-of-place role.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use tokio::sync::{watch, Semaphore};
use tokio::task::JoinSet;
use tracing::{debug, warn};

use crate::collaborators::{
    CallResult, ClaimsEvidence, Collaborators, RoleTag, TermExtraction, VisualCheck,
};
use crate::config::AnalysisConfig;
use crate::models::{
    ObservationContext, RambleResult, Role, RunWarning, Signal, SignalObservation, Window,
};
use crate::signals::{self, StructureViolation};

#[derive(Debug, Clone)]
pub struct Collection {
    pub observations: Vec<SignalObservation>,
    pub warnings: Vec<RunWarning>,
}

struct RawExtraction {
    terms: CallResult<TermExtraction>,
    definitions: Vec<(String, CallResult<bool>)>,
    claims: CallResult<ClaimsEvidence>,
    role: CallResult<RoleTag>,
    visual: CallResult<VisualCheck>,
    ramble: RambleResult,
}

struct WindowInputs<'a> {
    raw: &'a RawExtraction,
    previous_term_avg: f64,
    charged_violations: Option<&'a [StructureViolation]>,
}

/// One extractor per signal category, each answering `Some(severity)` or
/// `None` when its inputs are unavailable for the window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Extractor {
    ConceptSpike,
    GroundingGap,
    Tmb,
    VisualMismatch,
    StructureOrder,
    RambleRatio,
}

impl Extractor {
    pub const ALL: [Extractor; 6] = [
        Extractor::ConceptSpike,
        Extractor::GroundingGap,
        Extractor::Tmb,
        Extractor::VisualMismatch,
        Extractor::StructureOrder,
        Extractor::RambleRatio,
    ];

    pub fn signal(self) -> Signal {
        match self {
            Self::ConceptSpike => Signal::ConceptSpike,
            Self::GroundingGap => Signal::GroundingGap,
            Self::Tmb => Signal::Tmb,
            Self::VisualMismatch => Signal::VisualMismatch,
            Self::StructureOrder => Signal::StructureOrder,
            Self::RambleRatio => Signal::RambleRatio,
        }
    }

    fn severity(self, inputs: &WindowInputs<'_>) -> Option<f64> {
        let raw = inputs.raw;
        match self {
            Self::ConceptSpike => raw.terms.as_ref().ok().map(|extraction| {
                signals::concept_spike_severity(extraction.terms.len(), inputs.previous_term_avg)
            }),
            Self::GroundingGap => {
                raw.terms.as_ref().ok()?;
                let checked: Vec<bool> = raw
                    .definitions
                    .iter()
                    .filter_map(|(_, defined)| defined.as_ref().ok().copied())
                    .collect();
                if !raw.definitions.is_empty() && checked.is_empty() {
                    return None;
                }
                let ungrounded = checked.iter().filter(|defined| !**defined).count();
                Some(signals::grounding_gap_severity(ungrounded))
            }
            Self::Tmb => raw
                .claims
                .as_ref()
                .ok()
                .map(|found| signals::tmb_severity(found.claims.len(), found.evidence.len())),
            Self::VisualMismatch => raw
                .visual
                .as_ref()
                .ok()
                .map(|check| check.severity)
                .filter(|severity| severity.is_finite() && *severity >= 0.0),
            Self::StructureOrder => inputs
                .charged_violations
                .map(|violations| signals::structure_severity(violations)),
            Self::RambleRatio => Some(raw.ramble.severity),
        }
    }
}

async fn fetch_raw(
    window: &Window,
    collaborators: &dyn Collaborators,
    max_definition_checks: usize,
) -> RawExtraction {
    let (terms, claims, role, visual) = tokio::join!(
        collaborators.extract_terms(window),
        collaborators.classify_claims_evidence(window),
        collaborators.role_tag(window),
        collaborators.visual_mismatch(window),
    );

    let mut definitions = Vec::new();
    if let Ok(extraction) = &terms {
        for term in extraction.terms.iter().take(max_definition_checks) {
            let defined = collaborators.check_term_definition(window, term).await;
            definitions.push((term.clone(), defined));
        }
    }

    RawExtraction {
        terms,
        definitions,
        claims,
        role,
        visual,
        ramble: signals::analyze_ramble(&window.text),
    }
}

async fn cancelled(mut cancel: watch::Receiver<bool>) {
    loop {
        if *cancel.borrow_and_update() {
            return;
        }
        if cancel.changed().await.is_err() {
            std::future::pending::<()>().await;
        }
    }
}

fn record_failures(window_id: usize, raw: &RawExtraction, warnings: &mut Vec<RunWarning>) {
    let mut push = |source: String, message: String| {
        warn!(window_id, source = %source, error = %message, "signal extractor failed");
        warnings.push(RunWarning {
            window_id,
            source,
            message,
        });
    };

    if let Err(err) = &raw.terms {
        push("extract_terms".to_string(), err.to_string());
    }
    for (term, defined) in &raw.definitions {
        if let Err(err) = defined {
            push("check_term_definition".to_string(), format!("{term}: {err}"));
        }
    }
    if let Err(err) = &raw.claims {
        push("classify_claims_evidence".to_string(), err.to_string());
    }
    if let Err(err) = &raw.role {
        push("role_tag".to_string(), err.to_string());
    }
    match &raw.visual {
        Err(err) => push("visual_mismatch".to_string(), err.to_string()),
        Ok(check) if !(check.severity.is_finite() && check.severity >= 0.0) => push(
            "visual_mismatch".to_string(),
            format!("malformed response: severity {}", check.severity),
        ),
        Ok(_) => {}
    }
}

fn mean(values: &[usize]) -> f64 {
    if values.is_empty() {
        0.0
    } else {
        values.iter().sum::<usize>() as f64 / values.len() as f64
    }
}

pub async fn collect(
    windows: &[Window],
    collaborators: Arc<dyn Collaborators>,
    config: &AnalysisConfig,
    cancel: watch::Receiver<bool>,
) -> Collection {
    let semaphore = Arc::new(Semaphore::new(config.collector.max_concurrency.max(1)));
    let mut tasks = JoinSet::new();

    for (index, window) in windows.iter().enumerate() {
        let window = window.clone();
        let collaborators = Arc::clone(&collaborators);
        let semaphore = Arc::clone(&semaphore);
        let cancel = cancel.clone();
        let max_checks = config.max_definition_checks;

        tasks.spawn(async move {
            let raw = tokio::select! {
                biased;
                _ = cancelled(cancel) => None,
                raw = async {
                    let _permit = semaphore.acquire_owned().await.ok()?;
                    Some(fetch_raw(&window, collaborators.as_ref(), max_checks).await)
                } => raw,
            };
            (index, raw)
        });
    }

    let mut raws: Vec<Option<RawExtraction>> = windows.iter().map(|_| None).collect();
    while let Some(joined) = tasks.join_next().await {
        match joined {
            Ok((index, raw)) => raws[index] = raw,
            Err(err) => warn!(error = %err, "window extraction task did not complete"),
        }
    }

    let mut observations = Vec::with_capacity(windows.len());
    let mut warnings = Vec::new();
    let mut term_counts: Vec<usize> = Vec::new();
    let roles: Vec<(usize, Role)> = windows
        .iter()
        .zip(&raws)
        .filter_map(|(window, raw)| {
            let tag = raw.as_ref()?.role.as_ref().ok()?;
            Some((window.id, tag.role))
        })
        .collect();
    let charged = signals::attribute_violations(&roles);

    for (window, raw) in windows.iter().zip(raws) {
        let Some(raw) = raw else {
            warn!(window_id = window.id, "window extraction incomplete, treating as failed");
            warnings.push(RunWarning {
                window_id: window.id,
                source: "collector".to_string(),
                message: "extraction cancelled or aborted".to_string(),
            });
            observations.push(SignalObservation::failed(window.id));
            continue;
        };

        record_failures(window.id, &raw, &mut warnings);

        let previous_term_avg = mean(&term_counts);
        if let Ok(extraction) = &raw.terms {
            term_counts.push(extraction.terms.len());
        }

        let charged_violations: Option<Vec<StructureViolation>> = raw
            .role
            .as_ref()
            .ok()
            .map(|_| charged.get(&window.id).cloned().unwrap_or_default());

        let inputs = WindowInputs {
            raw: &raw,
            previous_term_avg,
            charged_violations: charged_violations.as_deref(),
        };

        let mut severities = BTreeMap::new();
        let mut unavailable = BTreeSet::new();
        for extractor in Extractor::ALL {
            match extractor.severity(&inputs) {
                Some(severity) => {
                    severities.insert(extractor.signal(), severity.min(config.max_severity));
                }
                None => {
                    severities.insert(extractor.signal(), 0.0);
                    unavailable.insert(extractor.signal());
                }
            }
        }

        let observation = SignalObservation {
            window_id: window.id,
            severities,
            unavailable,
            context: build_context(&raw, charged_violations.as_deref()),
        };
        debug!(
            window_id = window.id,
            unavailable = observation.unavailable.len(),
            "collected signal observation"
        );
        observations.push(observation);
    }

    warnings.sort();
    Collection {
        observations,
        warnings,
    }
}

fn build_context(raw: &RawExtraction, charged_violations: Option<&[StructureViolation]>) -> ObservationContext {
    let terms = raw
        .terms
        .as_ref()
        .map(|extraction| extraction.terms.clone())
        .unwrap_or_default();
    let ungrounded_terms = raw
        .definitions
        .iter()
        .filter(|(_, defined)| matches!(defined, Ok(false)))
        .map(|(term, _)| term.clone())
        .collect();
    let (claims, evidence) = raw
        .claims
        .as_ref()
        .map(|found| (found.claims.clone(), found.evidence.clone()))
        .unwrap_or_default();

    ObservationContext {
        terms,
        ungrounded_terms,
        claims,
        evidence,
        role: raw.role.as_ref().ok().map(|tag| tag.role),
        structure_violations: charged_violations
            .unwrap_or_default()
            .iter()
            .map(|violation| violation.description().to_string())
            .collect(),
        ramble: raw.ramble.clone(),
    }
}
