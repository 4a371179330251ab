//! Local severity helpers. None of these make external calls, so none can fail.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use once_cell::sync::Lazy;
use regex::Regex;

use crate::models::{RambleResult, Role};

static WORD: Lazy<Regex> = Lazy::new(|| Regex::new(r"\b\w+\b").expect("valid word regex"));

const FILLER_WORDS: &[&str] = &[
    "um", "uh", "like", "basically", "actually", "literally", "honestly", "right", "okay",
    "so", "well", "yeah",
];

const FILLER_PHRASES: &[&str] = &["you know", "kind of", "sort of", "i mean", "you see"];

const RAMBLE_RATIO_LOW: f64 = 0.03;
const RAMBLE_RATIO_HIGH: f64 = 0.07;
const MAX_REPEATED_PHRASES: usize = 5;

pub fn tokenize(text: &str) -> Vec<String> {
    let lowered = text.to_lowercase();
    WORD.find_iter(&lowered)
        .map(|m| m.as_str().to_string())
        .collect()
}

pub fn analyze_ramble(text: &str) -> RambleResult {
    let words = tokenize(text);
    let total_words = words.len();

    if total_words == 0 {
        return RambleResult::default();
    }

    let single = words
        .iter()
        .filter(|word| FILLER_WORDS.contains(&word.as_str()))
        .count();
    let phrases = words
        .windows(2)
        .filter(|pair| FILLER_PHRASES.contains(&pair.join(" ").as_str()))
        .count();
    let filler_count = single + phrases;
    let filler_ratio = filler_count as f64 / total_words as f64;

    let repeated_phrases = find_repeated_phrases(&words);

    let severity = if filler_ratio >= RAMBLE_RATIO_HIGH || repeated_phrases.len() >= 3 {
        2.0
    } else if filler_ratio >= RAMBLE_RATIO_LOW || !repeated_phrases.is_empty() {
        1.0
    } else {
        0.0
    };

    RambleResult {
        filler_ratio,
        filler_count,
        total_words,
        repeated_phrases,
        severity,
    }
}

/// 2- and 3-word sequences that occur more than once, in first-seen order.
fn find_repeated_phrases(words: &[String]) -> Vec<String> {
    let mut order: Vec<String> = Vec::new();
    let mut counts: HashMap<String, usize> = HashMap::new();

    for n in [2, 3] {
        for chunk in words.windows(n) {
            let phrase = chunk.join(" ");
            let count = counts.entry(phrase.clone()).or_insert(0);
            if *count == 0 {
                order.push(phrase);
            }
            *count += 1;
        }
    }

    order
        .into_iter()
        .filter(|phrase| counts.get(phrase).copied().unwrap_or(0) > 1)
        .take(MAX_REPEATED_PHRASES)
        .collect()
}

pub fn concept_spike_severity(current_terms: usize, previous_avg: f64) -> f64 {
    let baseline = if previous_avg <= 0.0 { 1.0 } else { previous_avg };
    let ratio = current_terms as f64 / baseline;

    if ratio > 2.5 {
        2.0
    } else if ratio > 1.5 {
        1.0
    } else {
        0.0
    }
}

pub fn grounding_gap_severity(ungrounded_terms: usize) -> f64 {
    match ungrounded_terms {
        0 => 0.0,
        1 => 1.0,
        _ => 2.0,
    }
}

pub fn tmb_severity(claims: usize, evidence: usize) -> f64 {
    if claims == 0 {
        0.0
    } else if evidence == 0 {
        2.0
    } else if evidence < claims {
        1.0
    } else {
        0.0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum StructureViolation {
    SolutionBeforeProblem,
    DemoBeforeProblem,
    MetricsBeforeProblem,
    ArchitectureBeforeSolution,
    MetricsWithoutContext,
}

impl StructureViolation {
    pub fn description(self) -> &'static str {
        match self {
            Self::SolutionBeforeProblem => "Solution presented before problem",
            Self::DemoBeforeProblem => "Demo shown before problem explained",
            Self::MetricsBeforeProblem => "Metrics shown before problem context",
            Self::ArchitectureBeforeSolution => "Architecture details before high-level solution",
            Self::MetricsWithoutContext => "Metrics without context or baseline",
        }
    }

    pub fn is_critical(self) -> bool {
        matches!(self, Self::DemoBeforeProblem)
    }

    /// The out-of-place role the violation is charged to.
    pub fn offending_role(self) -> Role {
        match self {
            Self::SolutionBeforeProblem => Role::Solution,
            Self::DemoBeforeProblem => Role::Demo,
            Self::MetricsBeforeProblem | Self::MetricsWithoutContext => Role::Metrics,
            Self::ArchitectureBeforeSolution => Role::Architecture,
        }
    }
}

/// Ordering violations in a role sequence of `(window_id, role)` pairs.
pub fn structure_violations(roles: &[(usize, Role)]) -> BTreeSet<StructureViolation> {
    let mut first_seen: HashMap<Role, usize> = HashMap::new();
    for (window_id, role) in roles {
        first_seen.entry(*role).or_insert(*window_id);
    }

    let mut violations = BTreeSet::new();
    let before = |a: Role, b: Role| match (first_seen.get(&a), first_seen.get(&b)) {
        (Some(a), Some(b)) => a < b,
        _ => false,
    };

    if before(Role::Solution, Role::Problem) {
        violations.insert(StructureViolation::SolutionBeforeProblem);
    }
    if before(Role::Demo, Role::Problem) {
        violations.insert(StructureViolation::DemoBeforeProblem);
    }
    if before(Role::Metrics, Role::Problem) {
        violations.insert(StructureViolation::MetricsBeforeProblem);
    }
    if before(Role::Architecture, Role::Solution) {
        violations.insert(StructureViolation::ArchitectureBeforeSolution);
    }
    if first_seen.contains_key(&Role::Metrics)
        && !first_seen.contains_key(&Role::Problem)
        && !first_seen.contains_key(&Role::UserContext)
    {
        violations.insert(StructureViolation::MetricsWithoutContext);
    }

    violations
}

/// Violations of the whole role sequence, keyed by the first window that
/// plays the offending role.
pub fn attribute_violations(
    roles: &[(usize, Role)],
) -> BTreeMap<usize, Vec<StructureViolation>> {
    let mut charged: BTreeMap<usize, Vec<StructureViolation>> = BTreeMap::new();
    for violation in structure_violations(roles) {
        let culprit = roles
            .iter()
            .find(|(_, role)| *role == violation.offending_role())
            .map(|(window_id, _)| *window_id);
        if let Some(window_id) = culprit {
            charged.entry(window_id).or_default().push(violation);
        }
    }
    charged
}

pub fn structure_severity<'a>(violations: impl IntoIterator<Item = &'a StructureViolation>) -> f64 {
    let violations: Vec<_> = violations.into_iter().collect();
    match violations.as_slice() {
        [] => 0.0,
        [single] if !single.is_critical() => 1.0,
        _ => 2.0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn filler_heavy_text_rambles() {
        let result = analyze_ramble(
            "Um, so like, you know, we basically, um, built this thing, like, you know what I mean?",
        );
        assert_eq!(result.total_words, 17);
        assert!(result.filler_ratio > RAMBLE_RATIO_HIGH);
        assert_eq!(result.severity, 2.0);
    }

    #[test]
    fn dense_text_does_not_ramble() {
        let result = analyze_ramble("Retrieval augmented generation combines search with a language model.");
        assert_eq!(result.filler_count, 0);
        assert!(result.repeated_phrases.is_empty());
        assert_eq!(result.severity, 0.0);
    }

    #[test]
    fn empty_text_has_zero_ramble() {
        assert_eq!(analyze_ramble("   "), RambleResult::default());
    }

    #[test]
    fn repeated_phrases_are_detected_in_order() {
        let words = tokenize("the cache layer the cache layer again");
        let repeated = find_repeated_phrases(&words);
        assert_eq!(repeated, vec!["the cache", "cache layer", "the cache layer"]);
    }

    #[test]
    fn concept_spike_uses_ratio_to_history() {
        assert_eq!(concept_spike_severity(5, 2.0), 1.0);
        assert_eq!(concept_spike_severity(6, 2.0), 2.0);
        assert_eq!(concept_spike_severity(3, 2.0), 0.0);
        assert_eq!(concept_spike_severity(3, 0.0), 2.0);
    }

    #[test]
    fn tmb_needs_evidence_for_each_claim() {
        assert_eq!(tmb_severity(0, 0), 0.0);
        assert_eq!(tmb_severity(2, 0), 2.0);
        assert_eq!(tmb_severity(2, 1), 1.0);
        assert_eq!(tmb_severity(2, 2), 0.0);
    }

    #[test]
    fn demo_before_problem_is_critical() {
        let roles = vec![(0, Role::Demo), (1, Role::Solution), (2, Role::Problem)];
        let violations = structure_violations(&roles);
        assert!(violations.contains(&StructureViolation::DemoBeforeProblem));
        assert!(violations.contains(&StructureViolation::SolutionBeforeProblem));
        assert_eq!(structure_severity(&violations), 2.0);

        let only_demo = [StructureViolation::DemoBeforeProblem];
        assert_eq!(structure_severity(&only_demo), 2.0);
    }

    #[test]
    fn metrics_without_context_is_a_single_violation() {
        let roles = vec![(0, Role::Hook), (1, Role::Metrics)];
        let violations = structure_violations(&roles);
        assert_eq!(
            violations.into_iter().collect::<Vec<_>>(),
            vec![StructureViolation::MetricsWithoutContext]
        );
        assert_eq!(
            structure_severity(&[StructureViolation::MetricsWithoutContext]),
            1.0
        );
    }

    #[test]
    fn violations_are_charged_to_the_out_of_place_window() {
        let roles = vec![(0, Role::Demo), (1, Role::Problem)];
        let charged = attribute_violations(&roles);
        assert_eq!(
            charged.into_iter().collect::<Vec<_>>(),
            vec![(0, vec![StructureViolation::DemoBeforeProblem])]
        );

        let roles = vec![
            (0, Role::Hook),
            (1, Role::Architecture),
            (2, Role::Metrics),
            (3, Role::Solution),
            (4, Role::Problem),
        ];
        let charged = attribute_violations(&roles);
        assert_eq!(charged[&1], vec![StructureViolation::ArchitectureBeforeSolution]);
        assert_eq!(charged[&2], vec![StructureViolation::MetricsBeforeProblem]);
        assert_eq!(charged[&3], vec![StructureViolation::SolutionBeforeProblem]);
        assert!(!charged.contains_key(&4));
    }

    #[test]
    fn well_ordered_pitch_has_no_violations() {
        let roles = vec![
            (0, Role::Problem),
            (1, Role::Solution),
            (2, Role::Demo),
            (3, Role::Metrics),
        ];
        assert!(structure_violations(&roles).is_empty());
    }
}
