//! Offline collaborators built from keyword heuristics.
//!
//! Used when no recorded LLM responses are supplied. Visual checks need the
//! video itself, so they always report unavailable here.

use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::Regex;

use crate::collaborators::{
    CallResult, ClaimsEvidence, Collaborators, RoleTag, TermExtraction, VisualCheck,
};
use crate::error::CollaboratorError;
use crate::issues::fallback_remediation;
use crate::models::{LabelFix, Role, Signal, Tone, Window};

static CANDIDATE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[A-Za-z][A-Za-z0-9\-]*").expect("valid term regex"));
static SENTENCE: Lazy<Regex> = Lazy::new(|| Regex::new(r"[^.!?]+[.!?]?").expect("valid sentence regex"));
static MULTIPLIER: Lazy<Regex> = Lazy::new(|| Regex::new(r"\b\d+(\.\d+)?x\b").expect("valid multiplier regex"));

const CLAIM_KEYWORDS: &[&str] = &[
    "faster", "better", "improved", "reduced", "increased", "scalable", "secure", "efficient",
    "optimized", "enhanced", "superior", "best", "revolutionary", "innovative", "cutting-edge",
    "powerful", "robust", "reliable", "seamless",
];

const EVIDENCE_KEYWORDS: &[&str] = &[
    "graph", "chart", "demo", "show", "see", "benchmark", "result", "data", "measured", "tested",
    "proof", "evidence", "screenshot", "here", "look at",
];

const ROLE_KEYWORDS: &[(Role, &[&str])] = &[
    (Role::Problem, &["problem", "pain", "struggle", "frustrated", "frustrating", "challenge", "broken"]),
    (Role::UserContext, &["users", "customers", "students", "teams", "people who"]),
    (Role::Solution, &["we built", "our solution", "introducing", "solution", "our app"]),
    (Role::Demo, &["demo", "let me show", "click", "as you can see", "on screen"]),
    (Role::Architecture, &["architecture", "pipeline", "backend", "database", "embedding", "api"]),
    (Role::Metrics, &["percent", "%", "latency", "accuracy", "benchmark", "per second"]),
    (Role::Closing, &["thank you", "thanks", "in summary", "to wrap up", "questions"]),
];

const COMMON_CAPITALISED: &[&str] = &["I", "OK", "So", "And", "But", "The", "We", "Our", "This"];

#[derive(Debug, Clone, Default)]
pub struct HeuristicCollaborators;

fn is_acronym(word: &str) -> bool {
    word.len() >= 2
        && word.chars().any(|c| c.is_ascii_alphabetic())
        && word
            .chars()
            .all(|c| c.is_ascii_uppercase() || c.is_ascii_digit() || c == '-')
}

fn words(haystack: &str) -> impl Iterator<Item = &str> {
    haystack.split(|c: char| !c.is_alphanumeric() && c != '-')
}

fn contains_word(haystack: &str, word: &str) -> bool {
    words(haystack).any(|token| token == word)
}

/// Whole-word hits for plain keywords, substring hits for phrases and symbols.
fn keyword_hits(haystack: &str, keyword: &str) -> usize {
    if keyword.chars().all(|c| c.is_alphanumeric() || c == '-') {
        words(haystack).filter(|token| *token == keyword).count()
    } else {
        haystack.matches(keyword).count()
    }
}

pub fn extract_terms(text: &str) -> TermExtraction {
    let mut terms: Vec<String> = Vec::new();
    let mut acronyms: Vec<String> = Vec::new();

    for sentence in SENTENCE.find_iter(text) {
        for (index, found) in CANDIDATE.find_iter(sentence.as_str()).enumerate() {
            let word = found.as_str();
            if COMMON_CAPITALISED.contains(&word) {
                continue;
            }
            let acronym = is_acronym(word);
            let mid_sentence_capital =
                index > 0 && word.chars().next().is_some_and(|c| c.is_ascii_uppercase());
            if !(acronym || mid_sentence_capital) {
                continue;
            }
            if !terms.iter().any(|t| t == word) {
                terms.push(word.to_string());
            }
            if acronym && !acronyms.iter().any(|a| a == word) {
                acronyms.push(word.to_string());
            }
        }
    }

    TermExtraction { terms, acronyms }
}

pub fn classify_claims_evidence(text: &str) -> ClaimsEvidence {
    let mut result = ClaimsEvidence::default();

    for sentence in SENTENCE.find_iter(text) {
        let trimmed = sentence.as_str().trim();
        if trimmed.is_empty() {
            continue;
        }
        let lowered = trimmed.to_lowercase();

        let is_claim = MULTIPLIER.is_match(&lowered)
            || CLAIM_KEYWORDS.iter().any(|k| contains_word(&lowered, k));
        let is_evidence = EVIDENCE_KEYWORDS.iter().any(|k| {
            if k.contains(' ') {
                lowered.contains(k)
            } else {
                contains_word(&lowered, k)
            }
        });

        if is_claim {
            result.claims.push(trimmed.to_string());
        }
        if is_evidence {
            result.evidence.push(trimmed.to_string());
        }
    }

    result
}

pub fn role_tag(window: &Window) -> RoleTag {
    let lowered = window.text.to_lowercase();
    let mut best: Option<(Role, usize)> = None;
    let mut total = 0usize;

    for (role, keywords) in ROLE_KEYWORDS {
        let hits = keywords
            .iter()
            .map(|keyword| keyword_hits(&lowered, keyword))
            .sum::<usize>();
        total += hits;
        if hits > 0 && best.map_or(true, |(_, top)| hits > top) {
            best = Some((*role, hits));
        }
    }

    match best {
        Some((role, hits)) => RoleTag {
            role,
            confidence: hits as f64 / total as f64,
        },
        None if window.id == 0 => RoleTag {
            role: Role::Hook,
            confidence: 0.5,
        },
        None => RoleTag {
            role: Role::Other,
            confidence: 0.0,
        },
    }
}

pub fn is_term_defined(text: &str, term: &str) -> bool {
    let escaped = regex::escape(&term.to_lowercase());
    let pattern = format!(
        r"\b{escaped}\b(\s+(is|are|stands for|means|refers to)\b|,\s*or\b|\s*\()|\({escaped}\)"
    );
    match Regex::new(&pattern) {
        Ok(re) => re.is_match(&text.to_lowercase()),
        Err(_) => false,
    }
}

#[async_trait]
impl Collaborators for HeuristicCollaborators {
    async fn extract_terms(&self, window: &Window) -> CallResult<TermExtraction> {
        Ok(extract_terms(&window.text))
    }

    async fn classify_claims_evidence(&self, window: &Window) -> CallResult<ClaimsEvidence> {
        Ok(classify_claims_evidence(&window.text))
    }

    async fn role_tag(&self, window: &Window) -> CallResult<RoleTag> {
        Ok(role_tag(window))
    }

    async fn check_term_definition(&self, window: &Window, term: &str) -> CallResult<bool> {
        Ok(is_term_defined(&window.text, term))
    }

    async fn visual_mismatch(&self, _window: &Window) -> CallResult<VisualCheck> {
        Err(CollaboratorError::Unavailable(
            "visual context is not available offline".to_string(),
        ))
    }

    async fn label_and_fix(
        &self,
        _window: &Window,
        triggered: &[Signal],
        terms: &[String],
    ) -> CallResult<LabelFix> {
        let Some(dominant) = triggered.first() else {
            return Err(CollaboratorError::Malformed(
                "no triggered signals to label".to_string(),
            ));
        };

        let mut remediation = fallback_remediation(*dominant, terms);
        if triggered.len() > 1 {
            let names: Vec<&str> = triggered.iter().map(|s| s.display_name()).collect();
            remediation.label = names.join(" + ");
        }
        Ok(remediation)
    }

    async fn roast_variants(&self, remediation: &LabelFix) -> CallResult<Tone> {
        Ok(Tone {
            kind: format!("Quick polish: {}", remediation.fix),
            honest: format!("{} {}", remediation.explanation, remediation.fix),
            brutal: format!(
                "{}. The judges stopped listening three slides ago. {}",
                remediation.label, remediation.fix
            ),
        })
    }
}
